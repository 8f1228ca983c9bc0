//! Common types, traits, and error definitions for mcl_slam
//!
//! This module provides the foundational building blocks shared by the
//! localization and mapping components.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;

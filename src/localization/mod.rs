//! Monte Carlo Localization against an occupancy grid

pub mod action_model;
pub mod particle_filter;
pub mod random_pose;
pub mod sampling_augmentation;
pub mod sensor_model;

pub use action_model::{ActionModel, ActionModelConfig, OdometryMotion};
pub use particle_filter::{
    CycleOutcome, FilterState, ParticleFilter, ParticleFilterConfig, ResamplingStrategy,
};
pub use random_pose::RandomPoseSampler;
pub use sampling_augmentation::SamplingAugmentation;
pub use sensor_model::{LikelihoodMode, ScanScore, SensorModel, SensorModelConfig};

//! Odometry action model
//!
//! Decomposes the motion between two odometry readings into an initial
//! rotation, a translation and a final rotation, then samples noisy versions
//! of that motion for each particle. Noise standard deviations grow with the
//! square root of the motion magnitude:
//!
//! ```text
//! rot_std   = sqrt(k1 * |rot|)
//! trans_std = sqrt(k2 * |trans|)
//! ```

use std::f64::consts::{FRAC_PI_2, PI};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::common::{Particle, Pose2D, SlamError, SlamResult};
use crate::utils::angles::{angle_diff, wrap_to_pi};

/// Action model parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionModelConfig {
    /// Rotation variance per radian turned
    pub k1: f64,
    /// Translation variance per meter driven
    pub k2: f64,
    /// Translation below which the robot counts as stationary [m]
    pub min_dist: f64,
    /// Heading change below which the robot counts as stationary [rad]
    pub min_theta: f64,
    /// Generator seed, entropy when unset
    pub seed: Option<u64>,
}

impl Default for ActionModelConfig {
    fn default() -> Self {
        Self {
            k1: 0.005,
            k2: 0.025,
            min_dist: 0.0025,
            min_theta: 0.02,
            seed: None,
        }
    }
}

impl ActionModelConfig {
    pub fn validate(&self) -> SlamResult<()> {
        let params = [
            ("k1", self.k1),
            ("k2", self.k2),
            ("min_dist", self.min_dist),
            ("min_theta", self.min_theta),
        ];
        for (name, value) in params {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(SlamError::InvalidParameter(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Rotate-translate-rotate decomposition of one odometry step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OdometryMotion {
    pub rot1: f64,
    /// Negative when driving backward
    pub trans: f64,
    pub rot2: f64,
    pub rot1_std: f64,
    pub trans_std: f64,
    pub rot2_std: f64,
}

/// Odometry action model with an owned generator.
#[derive(Debug, Clone)]
pub struct ActionModel {
    config: ActionModelConfig,
    previous_odometry: Option<Pose2D>,
    motion: OdometryMotion,
    moved: bool,
    utime: i64,
    rng: StdRng,
}

impl ActionModel {
    pub fn new(config: ActionModelConfig) -> SlamResult<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(ActionModel {
            config,
            previous_odometry: None,
            motion: OdometryMotion::default(),
            moved: false,
            utime: 0,
            rng,
        })
    }

    pub fn config(&self) -> &ActionModelConfig {
        &self.config
    }

    /// Motion computed by the last [`update_action`](Self::update_action).
    pub fn motion(&self) -> OdometryMotion {
        self.motion
    }

    pub fn moved(&self) -> bool {
        self.moved
    }

    /// Timestamp of the latest odometry reading.
    pub fn utime(&self) -> i64 {
        self.utime
    }

    pub fn previous_odometry(&self) -> Option<Pose2D> {
        self.previous_odometry
    }

    /// Re-anchor the model so the next motion is measured from `odometry`.
    pub fn reset_previous(&mut self, odometry: &Pose2D) {
        self.previous_odometry = Some(*odometry);
        self.utime = odometry.utime;
    }

    /// Compute the motion since the previous reading.
    ///
    /// Returns true if the robot moved more than the stationary thresholds.
    /// The very first reading only anchors the model.
    pub fn update_action(&mut self, odometry: &Pose2D) -> bool {
        let previous = match self.previous_odometry {
            Some(previous) => previous,
            None => {
                self.reset_previous(odometry);
                self.motion = OdometryMotion::default();
                self.moved = false;
                return false;
            }
        };

        let dx = odometry.x - previous.x;
        let dy = odometry.y - previous.y;
        let dtheta = angle_diff(odometry.theta, previous.theta);

        let mut trans = dx.hypot(dy);
        let mut rot1 = if trans < self.config.min_dist {
            0.0
        } else {
            angle_diff(dy.atan2(dx), previous.theta)
        };

        // driving backward
        if rot1.abs() > FRAC_PI_2 {
            rot1 = wrap_to_pi(rot1 - PI);
            trans = -trans;
        }
        let rot2 = angle_diff(dtheta, rot1);

        self.moved = trans.abs() > self.config.min_dist || dtheta.abs() > self.config.min_theta;

        let (rot1_std, trans_std, rot2_std) = if self.moved {
            (
                (self.config.k1 * rot1.abs()).sqrt(),
                (self.config.k2 * trans.abs()).sqrt(),
                (self.config.k1 * rot2.abs()).sqrt(),
            )
        } else {
            (self.motion.rot1_std, self.motion.trans_std, self.motion.rot2_std)
        };

        self.motion = OdometryMotion {
            rot1,
            trans,
            rot2,
            rot1_std,
            trans_std,
            rot2_std,
        };
        self.reset_previous(odometry);
        self.moved
    }

    /// Sample a new particle using the model's own generator.
    pub fn apply_action(&mut self, particle: &Particle) -> Particle {
        sample_particle(&self.motion, self.utime, particle, &mut self.rng)
    }

    /// Sample a new particle drawing noise from `rng`.
    pub fn apply_action_with<R: Rng + ?Sized>(&self, particle: &Particle, rng: &mut R) -> Particle {
        sample_particle(&self.motion, self.utime, particle, rng)
    }

    /// Apply the mean motion to `pose` without noise.
    pub fn apply_mean(&self, pose: &Pose2D) -> Pose2D {
        let m = &self.motion;
        compose(pose, m.rot1, m.trans, m.rot2, self.utime)
    }
}

fn sample_particle<R: Rng + ?Sized>(
    motion: &OdometryMotion,
    utime: i64,
    particle: &Particle,
    rng: &mut R,
) -> Particle {
    let rot1 = motion.rot1 + motion.rot1_std * rng.sample::<f64, _>(StandardNormal);
    let trans = motion.trans + motion.trans_std * rng.sample::<f64, _>(StandardNormal);
    let rot2 = motion.rot2 + motion.rot2_std * rng.sample::<f64, _>(StandardNormal);

    Particle {
        pose: compose(&particle.pose, rot1, trans, rot2, utime),
        parent_pose: particle.pose,
        weight: particle.weight,
    }
}

fn compose(pose: &Pose2D, rot1: f64, trans: f64, rot2: f64, utime: i64) -> Pose2D {
    let heading = pose.theta + rot1;
    Pose2D::with_time(
        pose.x + trans * heading.cos(),
        pose.y + trans * heading.sin(),
        pose.theta + rot1 + rot2,
        utime,
    )
}

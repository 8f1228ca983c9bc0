//! Monte Carlo Localization
//!
//! Each cycle the filter:
//!
//! 1. resamples the posterior into a prior (low-variance or importance),
//!    optionally replacing part of it with random free-space particles,
//! 2. samples a proposal by pushing every particle through the action model,
//! 3. weights the proposal with the sensor model and normalizes,
//! 4. estimates the pose from the best weighted particles.
//!
//! Steps 2 and 3 run in parallel over particles with `rayon`. Per-particle
//! generators are seeded sequentially from the filter's own generator, so a
//! seeded filter reproduces the same particles regardless of thread count.

use std::cmp::Reverse;

use log::{debug, info, warn};
use nalgebra::{Matrix3, Vector3};
use ordered_float::OrderedFloat;
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::{LaserScan, LikelihoodModel, Particle, Pose2D, SlamError, SlamResult};
use crate::localization::action_model::{ActionModel, ActionModelConfig};
use crate::localization::random_pose::RandomPoseSampler;
use crate::localization::sampling_augmentation::SamplingAugmentation;
use crate::localization::sensor_model::{SensorModel, SensorModelConfig};
use crate::mapping::OccupancyGrid;
use crate::utils::angles::angle_diff;

/// How the posterior is turned into the next prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplingStrategy {
    /// Systematic resampling with a single random offset
    #[default]
    LowVariance,
    /// Independent draws proportional to weight
    Importance,
}

/// Particle filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleFilterConfig {
    pub num_particles: usize,
    pub resampling: ResamplingStrategy,
    /// Share of the best particles averaged into the pose estimate
    pub estimate_fraction: f64,
    /// Replace part of the prior when the quality falls below the threshold
    pub reinvigorate: bool,
    pub reinvigoration_threshold: f64,
    /// Share of the prior replaced on reinvigoration
    pub reinvigoration_fraction: f64,
    /// Weight of the newest scan in the quality moving average
    pub quality_smoothing: f64,
    /// Generator seed, entropy when unset
    pub seed: Option<u64>,
    pub action_model: ActionModelConfig,
    pub sensor_model: SensorModelConfig,
}

impl Default for ParticleFilterConfig {
    fn default() -> Self {
        Self {
            num_particles: 500,
            resampling: ResamplingStrategy::LowVariance,
            estimate_fraction: 0.1,
            reinvigorate: true,
            reinvigoration_threshold: 0.15,
            reinvigoration_fraction: 0.1,
            quality_smoothing: 0.5,
            seed: None,
            action_model: ActionModelConfig::default(),
            sensor_model: SensorModelConfig::default(),
        }
    }
}

impl ParticleFilterConfig {
    pub fn validate(&self) -> SlamResult<()> {
        if self.num_particles == 0 {
            return Err(SlamError::InvalidParameter(
                "num_particles must be positive".to_string(),
            ));
        }
        let fractions = [
            ("estimate_fraction", self.estimate_fraction),
            ("reinvigoration_fraction", self.reinvigoration_fraction),
            ("quality_smoothing", self.quality_smoothing),
        ];
        for (name, value) in fractions {
            if !(value > 0.0 && value <= 1.0) {
                return Err(SlamError::InvalidParameter(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.reinvigoration_threshold) {
            return Err(SlamError::InvalidParameter(format!(
                "reinvigoration_threshold must be in [0, 1], got {}",
                self.reinvigoration_threshold
            )));
        }
        self.action_model.validate()?;
        self.sensor_model.validate()
    }
}

/// What one filter cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Robot did not move; nothing was resampled
    Stationary,
    /// Full resample, propose, weight, estimate
    Updated,
    /// Motion only, pose taken from odometry
    ActionOnly,
    /// Every particle scored zero; previous pose kept
    DegenerateWeights,
    /// Scan carried no usable rays; pose propagated by the mean motion
    NoSensorEvidence,
}

/// Diagnostics of the latest cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterState {
    /// Cycles in which the robot moved
    pub iterations: u64,
    pub last_outcome: Option<CycleOutcome>,
    pub effective_sample_size: f64,
    pub max_weight: f64,
    pub distribution_quality: f64,
    /// Particles replaced by reinvigoration in the latest cycle
    pub reinvigorated: usize,
}

/// Particle filter over 2D poses.
///
/// Generic over the likelihood model so alternative sensor models can be
/// plugged in; [`SensorModel`] is the default.
pub struct ParticleFilter<M: LikelihoodModel = SensorModel> {
    config: ParticleFilterConfig,
    action_model: ActionModel,
    sensor_model: M,
    augmentation: SamplingAugmentation,
    posterior: Vec<Particle>,
    pose: Pose2D,
    state: FilterState,
    rng: StdRng,
}

impl ParticleFilter<SensorModel> {
    pub fn new(config: ParticleFilterConfig) -> SlamResult<Self> {
        let sensor_model = SensorModel::new(config.sensor_model)?;
        Self::with_model(config, sensor_model)
    }
}

impl<M: LikelihoodModel> ParticleFilter<M> {
    /// Filter using a custom likelihood model. Particles start at the origin.
    pub fn with_model(config: ParticleFilterConfig, sensor_model: M) -> SlamResult<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let n = config.num_particles;

        Ok(ParticleFilter {
            action_model: ActionModel::new(config.action_model)?,
            sensor_model,
            augmentation: SamplingAugmentation::new(
                config.quality_smoothing,
                config.reinvigoration_threshold,
            ),
            posterior: vec![Particle::new(Pose2D::origin(), 1.0 / n as f64); n],
            pose: Pose2D::origin(),
            state: FilterState {
                iterations: 0,
                last_outcome: None,
                effective_sample_size: n as f64,
                max_weight: 1.0 / n as f64,
                distribution_quality: 1.0,
                reinvigorated: 0,
            },
            rng,
            config,
        })
    }

    pub fn config(&self) -> &ParticleFilterConfig {
        &self.config
    }

    pub fn num_particles(&self) -> usize {
        self.config.num_particles
    }

    pub fn action_model(&self) -> &ActionModel {
        &self.action_model
    }

    pub fn sensor_model(&self) -> &M {
        &self.sensor_model
    }

    /// Put every particle at `pose` with uniform weight.
    pub fn initialize_filter_at_pose(&mut self, pose: &Pose2D) {
        let n = self.config.num_particles;
        self.posterior = vec![Particle::new(*pose, 1.0 / n as f64); n];
        self.pose = *pose;
        self.augmentation.reset();
        self.refresh_state();
        info!(
            "particle filter initialized with {} particles at ({:.3}, {:.3}, {:.3})",
            n, pose.x, pose.y, pose.theta
        );
    }

    /// Scatter particles uniformly over the free space of `map`.
    pub fn initialize_filter_randomly(&mut self, map: &OccupancyGrid) -> SlamResult<()> {
        let sampler = RandomPoseSampler::new(map, self.config.sensor_model.occupancy_threshold)?;
        let n = self.config.num_particles;
        let weight = 1.0 / n as f64;
        let utime = self.pose.utime;

        self.posterior = (0..n)
            .map(|_| sampler.sample_particle(&mut self.rng, weight, utime))
            .collect();
        self.pose = estimate_posterior_pose(&self.posterior, self.config.estimate_fraction);
        self.augmentation.reset();
        self.refresh_state();
        info!(
            "particle filter initialized with {} particles over {} free cells",
            n,
            sampler.len()
        );
        Ok(())
    }

    /// Measure the next motion from `odometry`.
    pub fn reset_odometry(&mut self, odometry: &Pose2D) {
        self.action_model.reset_previous(odometry);
    }

    /// Run one localization cycle and return the new pose estimate.
    pub fn update_filter(&mut self, odometry: &Pose2D, scan: &LaserScan, map: &OccupancyGrid) -> Pose2D {
        if !self.action_model.update_action(odometry) {
            return self.finish_cycle(CycleOutcome::Stationary, odometry.utime);
        }
        self.state.iterations += 1;

        let prior = self.resample_posterior_distribution(Some(map));
        let proposal = self.compute_proposal_distribution(&prior);

        if self.sensor_model.valid_ray_count(scan) == 0 {
            self.posterior = proposal;
            self.pose = self.action_model.apply_mean(&self.pose);
            return self.finish_cycle(CycleOutcome::NoSensorEvidence, odometry.utime);
        }

        let outcome = match compute_normalized_posterior(&self.sensor_model, &proposal, scan, map) {
            Ok((posterior, total)) => {
                let rays = self.sensor_model.valid_ray_count(scan) as f64;
                let observed = total / (rays * posterior.len() as f64);
                self.augmentation.update(observed);
                self.posterior = posterior;
                self.pose = estimate_posterior_pose(&self.posterior, self.config.estimate_fraction);
                CycleOutcome::Updated
            }
            Err(_) => {
                warn!("all particle weights vanished, keeping previous pose estimate");
                let weight = 1.0 / proposal.len() as f64;
                self.posterior = proposal
                    .into_iter()
                    .map(|p| Particle { weight, ..p })
                    .collect();
                self.augmentation.invalidate();
                CycleOutcome::DegenerateWeights
            }
        };
        self.finish_cycle(outcome, odometry.utime)
    }

    /// Propagate particles with odometry alone; the estimate is the odometry.
    pub fn update_filter_action_only(&mut self, odometry: &Pose2D) -> Pose2D {
        if self.action_model.update_action(odometry) {
            self.state.iterations += 1;
            let prior = self.resample_posterior_distribution(None);
            self.posterior = self.compute_proposal_distribution(&prior);
        }
        self.pose = *odometry;
        self.finish_cycle(CycleOutcome::ActionOnly, odometry.utime)
    }

    pub fn pose_estimate(&self) -> Pose2D {
        self.pose
    }

    pub fn particles(&self) -> &[Particle] {
        &self.posterior
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Weighted covariance of the particle set around the pose estimate.
    pub fn estimate_covariance(&self) -> Matrix3<f64> {
        let total: f64 = self.posterior.iter().map(|p| p.weight).sum();
        if !(total > 0.0) {
            return Matrix3::zeros();
        }

        self.posterior.iter().fold(Matrix3::zeros(), |cov, p| {
            let d = Vector3::new(
                p.pose.x - self.pose.x,
                p.pose.y - self.pose.y,
                angle_diff(p.pose.theta, self.pose.theta),
            );
            cov + d * d.transpose() * (p.weight / total)
        })
    }

    fn resample_posterior_distribution(&mut self, map: Option<&OccupancyGrid>) -> Vec<Particle> {
        let n = self.config.num_particles;
        let mut prior = match self.config.resampling {
            ResamplingStrategy::LowVariance => low_variance_sample(&self.posterior, n, &mut self.rng),
            ResamplingStrategy::Importance => importance_sample(&self.posterior, n, &mut self.rng),
        };

        self.state.reinvigorated = 0;
        if let Some(map) = map {
            if self.config.reinvigorate && self.augmentation.needs_reinvigoration() {
                self.state.reinvigorated = self.reinvigorate_prior_distribution(&mut prior, map);
            }
        }
        prior
    }

    /// Replace evenly spaced prior particles with random free-space ones.
    fn reinvigorate_prior_distribution(&mut self, prior: &mut [Particle], map: &OccupancyGrid) -> usize {
        let count = (self.config.reinvigoration_fraction * prior.len() as f64).floor() as usize;
        if count == 0 {
            return 0;
        }
        let sampler = match RandomPoseSampler::new(map, self.config.sensor_model.occupancy_threshold) {
            Ok(sampler) => sampler,
            Err(e) => {
                warn!("skipping reinvigoration: {}", e);
                return 0;
            }
        };

        let step = prior.len() / count;
        let start = self.rng.gen_range(0..step);
        let weight = 1.0 / prior.len() as f64;
        let utime = self.pose.utime;
        for i in 0..count {
            prior[start + i * step] = sampler.sample_particle(&mut self.rng, weight, utime);
        }

        warn!(
            "distribution quality {:.3} below {:.3}, reinvigorated {} particles",
            self.augmentation.quality(),
            self.augmentation.threshold(),
            count
        );
        count
    }

    fn compute_proposal_distribution(&mut self, prior: &[Particle]) -> Vec<Particle> {
        let seeds: Vec<u64> = (0..prior.len()).map(|_| self.rng.gen()).collect();
        let action_model = &self.action_model;

        prior
            .par_iter()
            .zip(seeds.par_iter())
            .map(|(particle, &seed)| {
                let mut rng = StdRng::seed_from_u64(seed);
                action_model.apply_action_with(particle, &mut rng)
            })
            .collect()
    }

    fn finish_cycle(&mut self, outcome: CycleOutcome, utime: i64) -> Pose2D {
        self.pose.utime = utime;
        self.state.last_outcome = Some(outcome);
        self.refresh_state();
        debug!(
            "cycle {:?}: pose ({:.3}, {:.3}, {:.3}), quality {:.3}, ess {:.1}",
            outcome,
            self.pose.x,
            self.pose.y,
            self.pose.theta,
            self.state.distribution_quality,
            self.state.effective_sample_size
        );
        self.pose
    }

    fn refresh_state(&mut self) {
        self.state.effective_sample_size = effective_sample_size(&self.posterior);
        self.state.max_weight = self
            .posterior
            .iter()
            .map(|p| p.weight)
            .fold(0.0, f64::max);
        self.state.distribution_quality = self.augmentation.quality();
    }
}

/// Systematic resampling: one random offset, `n` evenly spaced pointers.
///
/// Output weights are uniform. Non-positive total weight is treated as a
/// uniform posterior.
pub fn low_variance_sample<R: Rng + ?Sized>(particles: &[Particle], n: usize, rng: &mut R) -> Vec<Particle> {
    if particles.is_empty() || n == 0 {
        return Vec::new();
    }

    let uniform = 1.0 / particles.len() as f64;
    let weights: Vec<f64> = particles.iter().map(|p| sanitize(p.weight)).collect();
    let total: f64 = weights.iter().sum();
    let weights: Vec<f64> = if total > 0.0 {
        weights.iter().map(|w| w / total).collect()
    } else {
        vec![uniform; particles.len()]
    };

    let step = 1.0 / n as f64;
    let r = rng.gen::<f64>() * step;
    let mut c = weights[0];
    let mut i = 0;

    (0..n)
        .map(|m| {
            let u = r + m as f64 * step;
            while u > c && i < particles.len() - 1 {
                i += 1;
                c += weights[i];
            }
            Particle { weight: step, ..particles[i] }
        })
        .collect()
}

/// Draw `n` particles independently in proportion to their weight.
pub fn importance_sample<R: Rng + ?Sized>(particles: &[Particle], n: usize, rng: &mut R) -> Vec<Particle> {
    if particles.is_empty() || n == 0 {
        return Vec::new();
    }

    let weight = 1.0 / n as f64;
    match WeightedIndex::new(particles.iter().map(|p| sanitize(p.weight))) {
        Ok(dist) => (0..n)
            .map(|_| Particle { weight, ..particles[dist.sample(rng)] })
            .collect(),
        Err(_) => (0..n)
            .map(|_| Particle { weight, ..particles[rng.gen_range(0..particles.len())] })
            .collect(),
    }
}

/// Weight every proposal particle by `model` and normalize.
///
/// Returns the posterior and the raw likelihood sum. Fails with
/// [`SlamError::DegenerateWeights`] if the sum is not positive and finite.
pub fn compute_normalized_posterior<M: LikelihoodModel>(
    model: &M,
    proposal: &[Particle],
    scan: &LaserScan,
    map: &OccupancyGrid,
) -> SlamResult<(Vec<Particle>, f64)> {
    let likelihoods: Vec<f64> = proposal
        .par_iter()
        .map(|p| sanitize(model.likelihood(p, scan, map)))
        .collect();

    let total: f64 = likelihoods.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        return Err(SlamError::DegenerateWeights);
    }

    let posterior = proposal
        .iter()
        .zip(&likelihoods)
        .map(|(p, &l)| Particle { weight: l / total, ..*p })
        .collect();
    Ok((posterior, total))
}

/// Weighted mean of the best `fraction` of particles, circular mean for heading.
pub fn estimate_posterior_pose(posterior: &[Particle], fraction: f64) -> Pose2D {
    if posterior.is_empty() {
        return Pose2D::origin();
    }

    let mut sorted: Vec<&Particle> = posterior.iter().collect();
    sorted.sort_by_key(|p| Reverse(OrderedFloat(p.weight)));

    let count = ((posterior.len() as f64 * fraction).floor() as usize).clamp(1, posterior.len());
    let best = &sorted[..count];

    let total: f64 = best.iter().map(|p| sanitize(p.weight)).sum();
    let weight_of = |p: &Particle| {
        if total > 0.0 {
            sanitize(p.weight) / total
        } else {
            1.0 / count as f64
        }
    };

    let (mut x, mut y, mut cos_sum, mut sin_sum) = (0.0, 0.0, 0.0, 0.0);
    for p in best {
        let w = weight_of(*p);
        x += w * p.pose.x;
        y += w * p.pose.y;
        cos_sum += w * p.pose.theta.cos();
        sin_sum += w * p.pose.theta.sin();
    }

    Pose2D::with_time(x, y, sin_sum.atan2(cos_sum), best[0].pose.utime)
}

/// `1 / sum(w^2)` of normalized weights.
pub fn effective_sample_size(particles: &[Particle]) -> f64 {
    let total: f64 = particles.iter().map(|p| sanitize(p.weight)).sum();
    if !(total > 0.0) {
        return 0.0;
    }
    let sum_sq: f64 = particles
        .iter()
        .map(|p| (sanitize(p.weight) / total).powi(2))
        .sum();
    1.0 / sum_sq
}

fn sanitize(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

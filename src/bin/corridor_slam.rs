// Corridor SLAM sample
//
// A robot drives down a simulated corridor with a few pillars. Odometry
// over-reports translation and carries Gaussian noise; the filter corrects it
// against the map it builds on the way.
//
// usage: corridor_slam [config.yaml]
// set RUST_LOG=debug for per-cycle output

use std::f64::consts::PI;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use mcl_slam::utils::interpolate_pose;
use mcl_slam::utils::ray_trace::cast_ray;
use mcl_slam::{
    LaserReturn, LaserScan, OccupancyGrid, OccupancyGridSlam, Point2D, Pose2D, SlamConfig, SlamError,
    SlamMode, SlamResult,
};

const BEAMS: usize = 180;
const MAX_RANGE: f64 = 4.9;
const STEP: f64 = 0.05; // forward motion per cycle [m]
const STEPS: usize = 160;
const ODOM_SCALE: f64 = 1.03; // odometry over-reports translation
const CYCLE_US: i64 = 100_000;

/// 10m x 2m corridor with pillars every 2m.
fn build_world() -> SlamResult<OccupancyGrid> {
    let mut world = OccupancyGrid::with_origin(240, 60, 0.05, Point2D::new(-1.0, -1.5))?;
    let (w, h) = (world.width() as i32, world.height() as i32);
    for x in 0..w {
        world.set_log_odds(x, 10, 100);
        world.set_log_odds(x, h - 11, 100);
    }
    for y in 10..h - 10 {
        world.set_log_odds(0, y, 100);
        world.set_log_odds(w - 1, y, 100);
    }
    for px in (40..w - 20).step_by(40) {
        for dx in 0..3 {
            for dy in 0..3 {
                world.set_log_odds(px + dx, 11 + dy, 100);
            }
        }
    }
    Ok(world)
}

fn sweep(world: &OccupancyGrid, from: &Pose2D, to: &Pose2D) -> LaserScan {
    let returns = (0..BEAMS)
        .map(|i| {
            let pose = interpolate_pose(from, to, i as f64 / (BEAMS - 1) as f64);
            let bearing = -PI + 2.0 * PI * i as f64 / BEAMS as f64;
            let range = cast_ray(world, pose.position(), pose.theta + bearing, MAX_RANGE, 10).unwrap_or(MAX_RANGE);
            LaserReturn { range, bearing, utime: pose.utime }
        })
        .collect();
    LaserScan::new(from.utime, returns)
}

fn load_config() -> SlamResult<SlamConfig> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => {
            info!("loading configuration from {}", path);
            SlamConfig::from_yaml_file(path)?
        }
        None => SlamConfig::default(),
    };
    if config.mode == SlamMode::ActionOnly {
        warn!("action-only mode ignores every scan");
    }
    config.grid.width = 240;
    config.grid.height = 60;
    config.grid.origin = Point2D::new(-1.0, -1.5);
    config.mapping.max_laser_distance = MAX_RANGE;
    config.particle_filter.sensor_model.max_range = MAX_RANGE;
    config.validate()?;
    Ok(config)
}

fn main() -> SlamResult<()> {
    env_logger::init();
    println!("Corridor SLAM start!!");

    let config = load_config()?;
    let world = build_world()?;
    let mut slam = OccupancyGridSlam::new(config)?;

    let mut rng = StdRng::seed_from_u64(2024);
    let noise = Normal::new(0.0, 0.005).map_err(|e| SlamError::InvalidParameter(e.to_string()))?;

    let mut truth = Pose2D::origin();
    let mut odometry = Pose2D::origin();
    slam.process(&odometry, Some(&sweep(&world, &truth, &truth)))?;

    for k in 1..=STEPS {
        let utime = k as i64 * CYCLE_US;
        let previous = truth;
        truth = Pose2D::with_time(truth.x + STEP, 0.0, 0.0, utime);
        odometry = Pose2D::with_time(
            odometry.x + STEP * ODOM_SCALE + noise.sample(&mut rng),
            odometry.y + noise.sample(&mut rng),
            odometry.theta + noise.sample(&mut rng),
            utime,
        );

        let pose = slam.process(&odometry, Some(&sweep(&world, &previous, &truth)))?;

        if k % 20 == 0 {
            println!(
                "step {:3}: est ({:.3}, {:.3}, {:.3}) true ({:.3}, {:.3}) odom ({:.3}, {:.3})",
                k, pose.x, pose.y, pose.theta, truth.x, truth.y, odometry.x, odometry.y
            );
        }
    }

    let pose = slam.pose();
    let map = slam.map();
    println!(
        "final error: slam {:.3} m, odometry {:.3} m",
        pose.distance(&truth),
        odometry.distance(&truth)
    );
    println!(
        "map: {}x{} cells, {} occupied, {} free, {} updates",
        map.width(),
        map.height(),
        map.occupied_cell_count(10),
        map.free_cells().len(),
        slam.map_updates()
    );

    println!("Corridor SLAM completed!");
    Ok(())
}

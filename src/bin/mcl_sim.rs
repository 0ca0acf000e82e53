// Monte Carlo Localization simulation
//
// A virtual robot drives around a polygon arena. The driver thread feeds its
// motion and sensor events into the filter while a presentation thread polls
// snapshots, the same split a robot link and a UI would have.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use mcl_localization::localization::sensor::VisionReading;
use mcl_localization::localization::{
    DriverRequest, LocalizationConfig, Particle, SensorReading, SharedLocalizer,
    UltrasonicDirection,
};
use mcl_localization::mapping::{Landmark, PolygonMap};
use mcl_localization::utils::{colors, plot_world_state, PointStyle};
use mcl_localization::{LocalizationError, LocalizationResult, Point2D, Pose};

#[derive(Parser)]
#[command(author, version, about = "Simulated Monte Carlo Localization run", long_about = None)]
struct Cli {
    /// TOML file with the localization config
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Overrides the configured particle count
    #[arg(short, long)]
    particles: Option<usize>,
    /// Give up after this many drive steps
    #[arg(long, default_value_t = 80)]
    steps: usize,
    /// Standard deviation of the simulated ultrasonic noise
    #[arg(long, default_value_t = 1.0)]
    sensor_noise: f64,
    /// Seed for the virtual robot's sensor noise
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Render the final state to this PNG file
    #[arg(long)]
    render: Option<PathBuf>,
}

fn arena() -> LocalizationResult<PolygonMap> {
    Ok(PolygonMap::rectangle("arena", 300.0, 200.0)?
        .with_obstacle(vec![
            Point2D::new(80.0, 60.0),
            Point2D::new(120.0, 60.0),
            Point2D::new(120.0, 90.0),
            Point2D::new(80.0, 90.0),
        ])?
        .with_obstacle(vec![
            Point2D::new(200.0, 120.0),
            Point2D::new(250.0, 140.0),
            Point2D::new(210.0, 170.0),
        ])?
        .with_landmark(Landmark::new(1, Point2D::new(300.0, 40.0), 12.0))
        .with_landmark(Landmark::new(3, Point2D::new(0.0, 150.0), 12.0))
        .with_landmark(Landmark::new(5, Point2D::new(150.0, 0.0), 12.0))
        .with_max_range(250.0))
}

/// Ground truth robot with noisy sensors
struct VirtualRobot {
    pose: Pose,
    noise: Normal<f64>,
    rng: StdRng,
}

impl VirtualRobot {
    fn new(pose: Pose, sensor_noise: f64, seed: u64) -> LocalizationResult<Self> {
        let noise = Normal::new(0.0, sensor_noise)
            .map_err(|e| LocalizationError::InvalidParameter(e.to_string()))?;
        Ok(VirtualRobot {
            pose,
            noise,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    fn sense(&mut self, map: &PolygonMap, with_vision: bool) -> SensorReading {
        let probe = Particle::new(self.pose);
        let mut measure = |direction| {
            let d = probe.simulated_distance(map, direction);
            if d > 0.0 {
                Some((d + self.noise.sample(&mut self.rng)).max(0.1))
            } else {
                None
            }
        };
        let reading = SensorReading::new(
            measure(UltrasonicDirection::Left),
            measure(UltrasonicDirection::Center),
            measure(UltrasonicDirection::Right),
        );
        if !with_vision {
            return reading;
        }
        let vision = match probe.simulated_vision(map) {
            Some((id, seen)) => VisionReading::new().with_signature(id, seen.angle_offset, seen.width),
            None => VisionReading::new(),
        };
        reading.with_vision(vision)
    }

    fn translate(&mut self, distance: f64) {
        let mut probe = Particle::new(self.pose);
        probe.translate(distance, 0.0);
        self.pose = probe.pose;
    }

    fn rotate(&mut self, degrees: f64) {
        self.pose = Pose::new(self.pose.x, self.pose.y, self.pose.heading + degrees);
    }
}

fn drive(
    localizer: &SharedLocalizer<PolygonMap>,
    map: &PolygonMap,
    robot: &mut VirtualRobot,
    steps: usize,
    with_vision: bool,
) -> LocalizationResult<()> {
    let mut step = 0;
    while step < steps {
        match localizer.next_request() {
            DriverRequest::Idle => {
                thread::sleep(Duration::from_millis(20));
                continue;
            }
            DriverRequest::Finish => break,
            DriverRequest::Proceed => {}
        }
        step += 1;

        let reading = robot.sense(map, with_vision);
        localizer.apply_measurement(&reading)?;

        let ahead = reading.center.unwrap_or(f64::INFINITY);
        if ahead < 35.0 {
            robot.rotate(90.0);
            localizer.apply_rotation(90.0)?;
            continue;
        }
        robot.translate(15.0);
        match localizer.apply_translation(15.0) {
            Ok(_) => {}
            Err(LocalizationError::DegeneratePopulation(n)) => {
                warn!("all {} particles lost, drawing a new population", n);
                localizer.with_engine(|engine| engine.reinitialize())?;
            }
            Err(e) => return Err(e),
        }
    }
    info!("driver stopped after {} steps", step);
    Ok(())
}

fn run(cli: Cli) -> LocalizationResult<()> {
    let mut config = match &cli.config {
        Some(path) => LocalizationConfig::load(path)?,
        None => LocalizationConfig::default(),
    };
    if let Some(count) = cli.particles {
        config.particle_count = count;
    }
    let with_vision = config.mode.vision_enabled();
    let history_dir = config.history_dir.clone();

    let map = arena()?;
    std::fs::create_dir_all(&history_dir)?;
    map.save(history_dir.join("arena.json"))?;

    let truth = Pose::new(40.0, 160.0, 0.0);
    let mut robot = VirtualRobot::new(truth, cli.sensor_noise, cli.seed)?;
    let localizer = SharedLocalizer::new(map.clone(), config)?;

    let done = Arc::new(AtomicBool::new(false));
    let presenter = {
        let localizer = localizer.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                let view = localizer.view();
                info!(
                    "[{}] estimate ({:.1}, {:.1}, {:.0} deg) spreading {:.1} {:?}",
                    view.causative_instruction,
                    view.estimated_pose.x,
                    view.estimated_pose.y,
                    view.estimated_pose.heading,
                    view.estimated_spreading,
                    view.convergence
                );
                thread::sleep(Duration::from_millis(100));
            }
        })
    };

    let driven = drive(&localizer, &map, &mut robot, cli.steps, with_vision);
    done.store(true, Ordering::Relaxed);
    if presenter.join().is_err() {
        warn!("presentation thread panicked");
    }
    driven?;

    if let Some(outcome) = localizer.finalize() {
        if let Some(e) = &outcome.resample_error {
            warn!("final resample failed: {}", e);
        }
        match outcome.save.join() {
            Ok(Some(path)) => info!("history written to {}", path.display()),
            Ok(None) => warn!("history was not written"),
            Err(_) => warn!("history writer panicked"),
        }
    }

    let estimate = localizer.estimated_pose();
    info!(
        "true pose ({:.1}, {:.1}, {:.0} deg), estimate ({:.1}, {:.1}, {:.0} deg), error {:.2}",
        robot.pose.x,
        robot.pose.y,
        robot.pose.heading,
        estimate.x,
        estimate.y,
        estimate.heading,
        robot.pose.distance(&estimate)
    );

    if let Some(path) = &cli.render {
        let view = localizer.view();
        let index = localizer.with_engine(|engine| engine.history().len().saturating_sub(1));
        let mut vis = plot_world_state(&map, &view, index);
        vis.plot_pose(
            &robot.pose,
            15.0,
            &PointStyle::new(colors::GROUND_TRUTH, "Robot").with_size(1.5),
        );
        vis.save_png(path, 900, 600)?;
        info!("rendered final state to {}", path.display());
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    if let Err(e) = run(Cli::parse()) {
        error!("{}", e);
        std::process::exit(1);
    }
}

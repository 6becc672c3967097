use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orientcam::error::EventBusError;
use orientcam::events::{EventFilter, EventReceiver};
use orientcam::platform::{MockPermissions, MockPlatformCamera};
use orientcam::sensor::{SensorKind, SimulatedMotionSensors, Vector3};
use orientcam::{
    AppLifecycleEvent, CameraLifecycleController, DeviceOrientation, OrientationNotification,
    OrientcamConfig, TransitionOutcome,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const GRAVITY: f64 = 9.81;

#[derive(Parser, Debug)]
#[command(name = "orientcam")]
#[command(about = "Camera lifecycle and capture orientation controller")]
#[command(version)]
#[command(long_about = "Reconciles device orientation with camera sensor mounting to compute \
capture rotation, and drives a camera session through permission, initialization, \
backgrounding, lens switching and recovery. The simulate command runs a scripted session \
against simulated hardware.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "orientcam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scripted session against simulated camera, sensors and permissions
    Simulate(SimulateArgs),
}

#[derive(clap::Args, Debug, Default)]
struct SimulateArgs {
    /// Directory for captured media (overrides capture.path)
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Make the preview resume hang so foregrounding falls back to reinitializing
    #[arg(long)]
    hang_resume: bool,

    /// Drop the camera session while backgrounded
    #[arg(long)]
    lose_session: bool,

    /// Start with camera permission not yet granted
    #[arg(long)]
    prompt_permissions: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting orientcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match OrientcamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    match args.command {
        Some(Command::Simulate(simulate)) => run_simulation(config, simulate).await,
        None => run_simulation(config, SimulateArgs::default()).await,
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("orientcam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") | None => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

fn print_default_config() -> Result<()> {
    println!("# orientcam configuration file");
    println!("# Every key can be overridden with ORIENTCAM_<SECTION>__<KEY>");
    println!();
    let toml = OrientcamConfig::default()
        .to_toml()
        .context("Failed to serialize default configuration")?;
    println!("{}", toml);
    Ok(())
}

/// Gravity as the accelerometer reports it when held in `orientation`
fn gravity_for(orientation: DeviceOrientation) -> Vector3 {
    match orientation {
        DeviceOrientation::PortraitUp => Vector3::new(0.0, GRAVITY, 0.3),
        DeviceOrientation::LandscapeLeft => Vector3::new(GRAVITY, 0.0, 0.3),
        DeviceOrientation::PortraitDown => Vector3::new(0.0, -GRAVITY, 0.3),
        DeviceOrientation::LandscapeRight => Vector3::new(-GRAVITY, 0.0, 0.3),
    }
}

#[derive(Debug, Default)]
struct OutcomeTally {
    completed: usize,
    ignored: usize,
    rejected: usize,
    other: usize,
}

struct Simulation {
    controller: CameraLifecycleController,
    platform: Arc<MockPlatformCamera>,
    sensors: Arc<SimulatedMotionSensors>,
    settle: Duration,
    outcomes: Mutex<OutcomeTally>,
}

impl Simulation {
    async fn tilt(&self, orientation: DeviceOrientation) {
        // The sampler subscribes from its own task; retry until it listens.
        for _ in 0..50 {
            if self
                .sensors
                .push(SensorKind::Accelerometer, gravity_for(orientation))
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(self.settle).await;
    }

    async fn rotate(&self, orientation: DeviceOrientation, priority: bool) {
        self.tilt(orientation).await;
        let notification = if priority {
            OrientationNotification::priority()
        } else {
            OrientationNotification::new()
        };
        let outcome = self.controller.on_orientation_changed(notification).await;
        self.report(&format!("rotate to {}", orientation), &outcome);
    }

    fn report(&self, step: &str, outcome: &TransitionOutcome) {
        println!("  {:<34} {:?}", step, outcome);
        let mut tally = self.outcomes.lock();
        if outcome.is_completed() {
            tally.completed += 1;
        } else if outcome.is_ignored() {
            tally.ignored += 1;
        } else if outcome.is_rejected() {
            tally.rejected += 1;
        } else {
            tally.other += 1;
        }
    }
}

async fn run_simulation(mut config: OrientcamConfig, args: SimulateArgs) -> Result<()> {
    if let Some(output) = &args.output {
        config.capture.path = output.to_string_lossy().into_owned();
    }
    config.validate().context("Invalid configuration")?;
    tokio::fs::create_dir_all(&config.capture.path)
        .await
        .with_context(|| format!("Failed to create capture directory {}", config.capture.path))?;

    let scratch = PathBuf::from(&config.capture.path).join(".scratch");
    let platform = Arc::new(MockPlatformCamera::with_media_dir(scratch.clone()));
    let sensors = Arc::new(SimulatedMotionSensors::new());
    let permissions = if args.prompt_permissions {
        MockPermissions::denied(true)
    } else {
        MockPermissions::granted()
    };
    let settle = config.sensor.sampling_period() * 2;
    let debounce = config.lifecycle.orientation_debounce();

    let controller = CameraLifecycleController::builder()
        .config(config)
        .platform(platform.clone())
        .permissions(Arc::new(permissions))
        .sensors(sensors.clone())
        .build()
        .await
        .map_err(|e| {
            error!("Failed to create camera controller: {}", e);
            e
        })?;

    let shutdown = CancellationToken::new();
    let tally = tokio::spawn(count_events(
        EventReceiver::new(controller.events(), EventFilter::All, "simulator"),
        shutdown.clone(),
    ));

    let sim = Simulation {
        controller: controller.clone(),
        platform,
        sensors,
        settle,
        outcomes: Mutex::new(OutcomeTally::default()),
    };

    let identity = controller.estimator().identity();
    println!(
        "Simulating {} {} (OS {})",
        identity.manufacturer, identity.model, identity.os_version
    );

    println!("Startup");
    sim.tilt(DeviceOrientation::PortraitUp).await;
    sim.report("initialize", &controller.initialize().await);

    println!("Rotation");
    sim.rotate(DeviceOrientation::LandscapeLeft, false).await;
    sim.rotate(DeviceOrientation::PortraitUp, false).await;
    sim.rotate(DeviceOrientation::PortraitUp, true).await;
    tokio::time::sleep(debounce).await;
    sim.rotate(DeviceOrientation::LandscapeLeft, false).await;
    sim.rotate(DeviceOrientation::LandscapeRight, false).await;

    println!("Capture");
    let photo = controller.take_photo().await;
    match &photo {
        Ok(photo) => println!(
            "  photo {} at {}°",
            photo.path.display(),
            photo.rotation.final_rotation_degrees
        ),
        Err(e) => warn!("Photo failed: {}", e),
    }

    match controller.start_recording().await {
        Ok(rotation) => {
            println!(
                "  recording locked at {}° ({})",
                rotation.final_rotation_degrees, rotation.device_orientation
            );
            sim.rotate(DeviceOrientation::PortraitUp, true).await;
            tokio::time::sleep(Duration::from_millis(250)).await;
            if let Some(elapsed) = controller.recording_duration() {
                println!("  recorded {:?} so far", elapsed);
            }
            match controller.stop_recording().await {
                Ok(video) => println!(
                    "  video {} ({:?})",
                    video.path.display(),
                    video.duration
                ),
                Err(e) => warn!("Stopping recording failed: {}", e),
            }
        }
        Err(e) => warn!("Recording failed to start: {}", e),
    }

    println!("Background");
    sim.report(
        "background",
        &controller
            .on_app_lifecycle(AppLifecycleEvent::Backgrounding)
            .await,
    );
    if args.hang_resume {
        sim.platform.hang_on("resume", true);
    }
    if args.lose_session {
        sim.platform.invalidate_handles();
    }
    sim.report(
        "foreground",
        &controller
            .on_app_lifecycle(AppLifecycleEvent::Foregrounding)
            .await,
    );
    sim.platform.hang_on("resume", false);

    println!("Lens switch");
    sim.report("switch camera", &controller.switch_camera().await);
    if let Some(rotation) = controller.capture_rotation() {
        println!(
            "  {:?} lens now captures at {}°",
            rotation.lens, rotation.final_rotation_degrees
        );
    }
    sim.report("switch back", &controller.switch_camera().await);

    println!("Shutdown");
    let final_state = controller.state();
    if let Some(kind) = controller.transition_in_flight() {
        warn!("Disposing while {:?} is still in flight", kind);
    }
    sim.report("dispose", &controller.dispose().await);

    shutdown.cancel();
    let counts = tally.await.context("Event counter task failed")?;

    println!();
    println!("Summary");
    let outcomes = std::mem::take(&mut *sim.outcomes.lock());
    println!("  state before dispose   {}", final_state);
    println!(
        "  session torn down      {}",
        controller.state().is_terminal()
    );
    println!(
        "  transitions            {} completed, {} ignored, {} rejected, {} other",
        outcomes.completed, outcomes.ignored, outcomes.rejected, outcomes.other
    );
    println!("  platform initializes   {}", sim.platform.initialize_count());
    println!("  open camera handles    {}", sim.platform.live_handle_count());
    if let Some(failure) = controller.last_error() {
        println!("  last error             {}", failure.message);
    }
    for (event_type, count) in &counts {
        println!("  {:<22} {}", event_type, count);
    }

    if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
        debug!("Scratch directory not removed: {}", e);
    }
    Ok(())
}

async fn count_events(
    mut receiver: EventReceiver,
    shutdown: CancellationToken,
) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    loop {
        tokio::select! {
            biased;
            received = receiver.recv() => match received {
                Ok(event) => *counts.entry(event.event_type()).or_insert(0) += 1,
                Err(EventBusError::Lagged { skipped }) => {
                    *counts.entry("lagged").or_insert(0) += skipped as usize;
                }
                Err(e) => {
                    warn!("Event counter stopped: {}", e);
                    break;
                }
            },
            _ = shutdown.cancelled() => break,
        }
    }
    while let Ok(Some(event)) = receiver.try_recv() {
        *counts.entry(event.event_type()).or_insert(0) += 1;
    }
    counts
}

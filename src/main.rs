//! RideLink command line.
//!
//! `ridelink scan` lists nearby trainers; `ridelink ride` connects to one and
//! follows an interval schedule or a GPX track.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ridelink::sensors::manager::SharedHub;
use ridelink::sensors::types::{DiscoveredSensor, Protocol, SensorEvent};
use ridelink::session::hub::{HubEvent, HubSettings, TelemetryHub};
use ridelink::storage::config::{load_config, load_config_from, AppConfig};
use ridelink::track::gpx::read_gpx_file;
use ridelink::workouts::types::{IntervalSchedule, Workout};
use ridelink::SensorManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ridelink", version, about = "Smart trainer telemetry and control")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan for trainers and sensors
    Scan,
    /// Connect to a trainer and ride a workout
    Ride {
        /// Interval schedule (TOML or JSON)
        #[arg(long, conflicts_with = "gpx", required_unless_present = "gpx")]
        schedule: Option<PathBuf>,

        /// GPX track whose elevation drives resistance
        #[arg(long)]
        gpx: Option<PathBuf>,

        /// Device id from `ridelink scan`; the first FTMS trainer otherwise
        #[arg(long)]
        device: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting RideLink v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Scan => scan(&config).await,
        Command::Ride {
            schedule,
            gpx,
            device,
        } => ride(&config, schedule, gpx, device).await,
    }
}

async fn scan(config: &AppConfig) -> Result<()> {
    let mut manager = SensorManager::new(config.sensors.to_sensor_config());
    manager
        .initialize()
        .await
        .context("Bluetooth unavailable")?;

    let found = manager.discover().await.context("Scan failed")?;
    if found.is_empty() {
        println!("No trainers found");
    }
    for sensor in found {
        println!(
            "{}  {:<24} {:<22} {}",
            sensor.device_id,
            sensor.name,
            sensor
                .protocol
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            sensor
                .signal_strength
                .map(|rssi| format!("{} dBm", rssi))
                .unwrap_or_default()
        );
    }

    manager.shutdown().await;
    Ok(())
}

fn load_workout(
    config: &AppConfig,
    schedule: Option<PathBuf>,
    gpx: Option<PathBuf>,
) -> Result<Workout> {
    if let Some(path) = schedule {
        let schedule = IntervalSchedule::from_file(&path)
            .with_context(|| format!("Invalid schedule {}", path.display()))?;
        return Ok(Workout::Intervals(schedule));
    }

    if let Some(path) = gpx {
        let track = read_gpx_file(&path)
            .and_then(|route| route.into_track())
            .with_context(|| format!("Invalid GPX file {}", path.display()))?;
        tracing::info!(
            name = track.name(),
            distance_km = track.total_distance_m() / 1000.0,
            elevation_gain_m = track.elevation_gain_m(),
            estimated_min = track.estimated_duration_s(config.workout.gpx_average_speed_kmh) / 60,
            "Track loaded"
        );
        return Ok(Workout::Track(track));
    }

    bail!("Either --schedule or --gpx is required")
}

fn pick_trainer(found: &[DiscoveredSensor]) -> Option<&DiscoveredSensor> {
    found
        .iter()
        .find(|s| s.protocol == Some(Protocol::BleFtms))
        .or_else(|| found.first())
}

async fn ride(
    config: &AppConfig,
    schedule: Option<PathBuf>,
    gpx: Option<PathBuf>,
    device: Option<String>,
) -> Result<()> {
    let workout = load_workout(config, schedule, gpx)?;

    let mut hub = TelemetryHub::new(HubSettings::from_config(config));
    let events = hub.event_receiver();
    let hub: SharedHub = Arc::new(Mutex::new(hub));

    std::thread::spawn(move || {
        for event in events {
            match event {
                HubEvent::Tick(state) => tracing::info!(
                    t = state.elapsed_s,
                    power = state.power_watts,
                    cadence = state.cadence_rpm,
                    speed = %format!(
                        "{:.1}{}",
                        state.speed_kmh,
                        if state.speed_estimated { "~" } else { "" }
                    ),
                    hr = state.heart_rate_bpm,
                    distance_m = state.accumulated_distance_m as u32,
                    target = ?state.target,
                ),
                HubEvent::RideFinished(summary) => println!(
                    "Ride finished: {:.2} km in {} s, avg {} W (max {} W), avg {:.1} km/h",
                    summary.distance_meters / 1000.0,
                    summary.duration_seconds,
                    summary.avg_power,
                    summary.max_power,
                    summary.avg_speed_kmh
                ),
                other => tracing::debug!(?other, "Hub event"),
            }
        }
    });

    let mut manager = SensorManager::new(config.sensors.to_sensor_config());
    let sensor_events = manager.event_receiver();
    std::thread::spawn(move || {
        for event in sensor_events {
            match event {
                SensorEvent::ConnectionChanged { device_id, state } => {
                    tracing::info!(device = %device_id, "Trainer {}", state)
                }
                other => tracing::debug!(?other, "Sensor event"),
            }
        }
    });
    manager
        .initialize()
        .await
        .context("Bluetooth unavailable")?;

    let device_id = match device {
        Some(id) => {
            // The adapter only knows peripherals it has seen advertise.
            manager.discover().await.context("Scan failed")?;
            id
        }
        None => {
            let found = manager.discover().await.context("Scan failed")?;
            pick_trainer(&found)
                .map(|s| s.device_id.clone())
                .context("No trainer found")?
        }
    };

    hub.lock()
        .await
        .start_workout(workout)
        .context("Failed to start workout")?;

    manager
        .connect(&device_id, hub.clone())
        .await
        .with_context(|| format!("Failed to connect to {}", device_id))?;

    let mut poll = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping workout");
                let command = hub.lock().await.stop_workout().ok().flatten();
                if let Err(e) = manager.submit(command) {
                    tracing::warn!("Could not reset resistance: {}", e);
                }
                break;
            }
            _ = poll.tick() => {
                let (finished, connected) = {
                    let hub = hub.lock().await;
                    (hub.engine().status().is_finished(), hub.is_connected())
                };
                if finished {
                    break;
                }
                if !connected || manager.connected_device().is_none() {
                    manager.shutdown().await;
                    bail!("Trainer disconnected");
                }
            }
        }
    }

    // Let the writer flush the reset target before the link goes down.
    tokio::time::sleep(Duration::from_secs(2)).await;
    manager.shutdown().await;
    Ok(())
}

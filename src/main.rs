use color_eyre::{eyre::eyre, Result};
use scroller::config::{LogSettings, Settings};
use scroller::sensor::scripted::ScriptedSensor;
use scroller::sensor::{AngularSensor, SensorKind, SensorSettings};
use scroller::transport::setup::TransportSet;
use scroller::ScrollerHandle;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = Settings::config_path();
    let settings = {
        // Until the configured subscriber is installed
        let _bootstrap = tracing::subscriber::set_default(
            FmtSubscriber::builder()
                .with_max_level(Level::INFO)
                .with_target(false)
                .finish(),
        );
        Settings::load_or_create(&config_path).await?
    };
    setup_logging_env(&settings.log);
    info!("Settings loaded from {}", config_path.display());

    let sensor = open_sensor(&settings.sensor)?;
    let transports = TransportSet::open(&settings.wired, &settings.wireless).await;

    let handle = ScrollerHandle::spawn(settings.scroller(), sensor, transports.transports())
        .map_err(|e| eyre!("Failed to start scroller: {}", e))?;
    let link_tasks = transports.attach(&handle);

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to wait for ctrl-c: {}", e))?;
    for task in link_tasks {
        task.abort();
    }
    handle.shutdown().await;
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging_env(log: &LogSettings) {
    let level = Level::from_str(&log.level).unwrap_or(Level::INFO);
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(log.thread_ids)
        .with_file(log.file_and_line)
        .with_line_number(log.file_and_line)
        .init();
    if level.as_str() != log.level.to_uppercase() {
        warn!("Unknown log level {:?}, using {}", log.level, level);
    }
}

fn open_sensor(settings: &SensorSettings) -> Result<Arc<dyn AngularSensor>> {
    match settings.kind {
        SensorKind::Simulated => {
            info!(
                "Using simulated sensor resting at {}",
                settings.simulated_position
            );
            Ok(Arc::new(ScriptedSensor::resting(settings.simulated_position)))
        }
        #[cfg(target_os = "linux")]
        SensorKind::As5600 => {
            let sensor = scroller::sensor::as5600::As5600::open(&settings.as5600)
                .map_err(|e| eyre!("Sensor unavailable: {}", e))?;
            Ok(Arc::new(sensor))
        }
        #[cfg(not(target_os = "linux"))]
        SensorKind::As5600 => Err(eyre!("AS5600 sensor needs Linux I2C support")),
    }
}

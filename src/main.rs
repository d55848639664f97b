use color_eyre::{eyre::eyre, Result};
use fireshock_bridge::config::ServiceConfig;
use fireshock_bridge::io::{DeviceOpener, DeviceSource};
use fireshock_bridge::service::BridgeService;
use fireshock_bridge::sink::TracingSink;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let config = setup().await?;
    info!(
        "Starting fireshock-bridge, class {}, config at {}",
        config.device_class,
        ServiceConfig::default_path().display()
    );

    let (source, opener) = backend()?;
    let service = BridgeService::start(&config, source, opener, Arc::new(TracingSink));

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;
    info!("Ctrl-C received");

    service.stop().await;
    Ok(())
}

async fn setup() -> Result<ServiceConfig> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;

    let config = ServiceConfig::load().await?;
    setup_logging(config.log_level()?);
    Ok(config)
}

fn setup_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

#[cfg(windows)]
fn backend() -> Result<(Arc<dyn DeviceSource>, Arc<dyn DeviceOpener>)> {
    use fireshock_bridge::io::windows::{SetupDiSource, Win32Opener};
    Ok((Arc::new(SetupDiSource), Arc::new(Win32Opener)))
}

#[cfg(not(windows))]
fn backend() -> Result<(Arc<dyn DeviceSource>, Arc<dyn DeviceOpener>)> {
    Err(eyre!("The FireShock driver is only available on Windows"))
}

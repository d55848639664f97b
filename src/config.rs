use crate::codec::ds3;
use crate::device::EngineSettings;
use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn, Level};
use uuid::Uuid;

const CONFIG_DIR: &str = "fireshock-bridge";
const CONFIG_FILE: &str = "config.toml";

/// Interface class the FireShock driver registers its devices under
pub const FIRESHOCK_DEVICE_CLASS: Uuid = Uuid::from_u128(0x2409EA50_9ECA_410E_AC9E_F9AC798C4D9C);

/// Service settings, read from `<config dir>/fireshock-bridge/config.toml`
///
/// Every field is optional in the file; missing ones take the defaults.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Device interface class GUID to enumerate
    pub device_class: Uuid,
    pub poll_interval_ms: u64,
    pub output_interval_ms: u64,
    pub read_buffer_size: usize,
    /// One of trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            device_class: FIRESHOCK_DEVICE_CLASS,
            poll_interval_ms: 2000,
            output_interval_ms: 10,
            read_buffer_size: 512,
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Loads from the default location
    pub async fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()).await
    }

    /// Loads and validates `path`, falling back to defaults if it is missing
    pub async fn load_from(path: &Path) -> Result<Self> {
        let config = if tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
            debug!("Loaded config from {}", path.display());

            toml::from_str(&content)
                .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?
        } else {
            info!("No config at {}, using defaults", path.display());
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(eyre!("poll_interval_ms must be greater than zero"));
        }
        if self.output_interval_ms == 0 {
            return Err(eyre!("output_interval_ms must be greater than zero"));
        }
        if self.read_buffer_size < ds3::MIN_REPORT_LEN {
            return Err(eyre!(
                "read_buffer_size must be at least {} bytes, got {}",
                ds3::MIN_REPORT_LEN,
                self.read_buffer_size
            ));
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level> {
        self.log_level
            .parse::<Level>()
            .map_err(|_| eyre!("Unknown log level '{}'", self.log_level))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            output_interval: Duration::from_millis(self.output_interval_ms),
            read_buffer_size: self.read_buffer_size,
        }
    }
}

//! Periodic discovery of FireShock device interfaces
//!
//! Every poll the enumerator lists the present paths for the device class,
//! skips paths the registry already holds and tries to bring up the rest.
//! A path that fails is simply tried again on the next poll. Removal is not
//! the enumerator's business; engines report their own disconnects.

use crate::device::{self, EngineSettings};
use crate::io::{DeviceOpener, DeviceSource};
use crate::registry::{DeviceRegistry, RegistryError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct EnumeratorSettings {
    pub device_class: Uuid,
    pub poll_interval: Duration,
    pub engine: EngineSettings,
}

/// What one poll did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub listed: usize,
    pub attempted: usize,
    pub registered: usize,
    pub failed: usize,
}

pub struct DeviceEnumerator {
    source: Arc<dyn DeviceSource>,
    opener: Arc<dyn DeviceOpener>,
    registry: DeviceRegistry,
    settings: EnumeratorSettings,
}

impl DeviceEnumerator {
    pub fn new(
        source: Arc<dyn DeviceSource>,
        opener: Arc<dyn DeviceOpener>,
        registry: DeviceRegistry,
        settings: EnumeratorSettings,
    ) -> Self {
        Self {
            source,
            opener,
            registry,
            settings,
        }
    }

    /// Runs one discovery pass
    pub async fn tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();

        let source = self.source.clone();
        let class = self.settings.device_class;
        let listed =
            match tokio::task::spawn_blocking(move || source.list_device_paths(&class)).await {
                Ok(Ok(paths)) => paths,
                Ok(Err(e)) => {
                    warn!("Listing devices of class {} failed: {}", class, e);
                    return summary;
                }
                Err(e) => {
                    error!("Device listing task failed: {}", e);
                    return summary;
                }
            };
        summary.listed = listed.len();

        let mut seen = HashSet::new();
        for path in listed {
            if !seen.insert(path.clone()) || self.registry.contains(&path).await {
                continue;
            }

            summary.attempted += 1;
            if self.bring_up(&path).await {
                summary.registered += 1;
            } else {
                summary.failed += 1;
            }
        }

        summary
    }

    async fn bring_up(&self, path: &str) -> bool {
        debug!("New device path {}", path);

        let opener = self.opener.clone();
        let settings = self.settings.engine.clone();
        let owned_path = path.to_string();
        let connected = tokio::task::spawn_blocking(move || {
            device::connect(&owned_path, opener.as_ref(), settings)
        })
        .await;

        let engine = match connected {
            Ok(Ok(engine)) => engine,
            Ok(Err(e)) => {
                warn!("Skipping {} until next poll: {}", path, e);
                return false;
            }
            Err(e) => {
                error!("Connect task for {} failed: {}", path, e);
                return false;
            }
        };

        match self.registry.register(engine).await {
            Ok(_) => true,
            Err(RegistryError::AlreadyRegistered(_)) => {
                debug!("{} was registered concurrently", path);
                false
            }
            Err(e) => {
                warn!("Registering {} failed: {}", path, e);
                false
            }
        }
    }

    /// Polls until `cancel` fires, starting with an immediate pass
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.settings.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                "Enumerating class {} every {:?}",
                self.settings.device_class, self.settings.poll_interval
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let summary = self.tick().await;
                        if summary.attempted > 0 {
                            info!(
                                "Poll: {} listed, {} new, {} registered, {} failed",
                                summary.listed, summary.attempted, summary.registered, summary.failed
                            );
                        }
                    }
                }
            }

            debug!("Enumerator stopped");
        })
    }
}

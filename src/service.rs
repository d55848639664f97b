//! Service wiring: enumerator plus registry under one cancellation token

use crate::config::ServiceConfig;
use crate::enumerator::{DeviceEnumerator, EnumeratorSettings};
use crate::io::{DeviceOpener, DeviceSource};
use crate::registry::DeviceRegistry;
use crate::sink::SinkHost;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct BridgeService {
    registry: DeviceRegistry,
    cancel: CancellationToken,
    enumerator: JoinHandle<()>,
}

impl BridgeService {
    /// Starts polling for devices; must be called within a tokio runtime
    pub fn start(
        config: &ServiceConfig,
        source: Arc<dyn DeviceSource>,
        opener: Arc<dyn DeviceOpener>,
        sink: Arc<dyn SinkHost>,
    ) -> Self {
        let registry = DeviceRegistry::new(sink);
        let cancel = CancellationToken::new();

        let settings = EnumeratorSettings {
            device_class: config.device_class,
            poll_interval: config.poll_interval(),
            engine: config.engine_settings(),
        };
        let enumerator = DeviceEnumerator::new(source, opener, registry.clone(), settings)
            .spawn(cancel.child_token());

        info!("Bridge service started");
        Self {
            registry,
            cancel,
            enumerator,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Stops discovery, then disposes every device
    pub async fn stop(self) {
        info!("Stopping bridge service");
        self.cancel.cancel();
        if let Err(e) = self.enumerator.await {
            error!("Enumerator task failed: {}", e);
        }
        self.registry.shutdown().await;
        info!("Bridge service stopped");
    }
}

//! Live device map and sink dispatch
//!
//! The registry owns every running engine, keyed by device path. Each engine
//! gets one consumer on the blocking pool that drains its channel, decodes reports with the
//! device profile and hands them to the sink. The consumer also turns the
//! engine's disconnect into map removal plus a single `removed` call.
//!
//! ```text
//! register ─► insert ─► sink.arrived ─► spawn consumer
//!                                         │
//!   EngineMessage::InputReport ──decode──►├─► sink.input_report
//!   EngineMessage::Disconnected ─────────►└─► remove entry ─► sink.removed
//! ```

use crate::device::{Active, DeviceEngine, DeviceError, DeviceHandle, DeviceIdentity, EngineMessage};
use crate::protocol::BdAddr;
use crate::sink::{SinkDispatch, SinkHost};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{0} is already registered")]
    AlreadyRegistered(String),

    #[error("No device registered at {0}")]
    NotFound(String),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Blocking task failed: {0}")]
    TaskFailed(String),
}

struct RegistryInner {
    devices: RwLock<HashMap<String, Arc<DeviceHandle>>>,
    sink: SinkDispatch,
    consumers: Mutex<JoinSet<()>>,
}

impl RegistryInner {
    /// Removes `handle`'s entry unless the path already belongs to someone else
    ///
    /// Blocking; only called from consumer threads.
    fn remove_if_current(&self, handle: &Arc<DeviceHandle>) -> bool {
        let mut devices = self.devices.blocking_write();
        match devices.get(handle.path()) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                devices.remove(handle.path());
                true
            }
            _ => false,
        }
    }
}

/// Shared handle to the device map
#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new(sink: Arc<dyn SinkHost>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                devices: RwLock::new(HashMap::new()),
                sink: SinkDispatch::new(sink),
                consumers: Mutex::new(JoinSet::new()),
            }),
        }
    }

    /// Starts `engine` and makes it visible to sinks
    ///
    /// A second engine for a path that is already registered is disposed
    /// and refused.
    pub async fn register(
        &self,
        engine: DeviceEngine<Active>,
    ) -> Result<DeviceIdentity, RegistryError> {
        let path = engine.path().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = {
            let mut devices = self.inner.devices.write().await;
            if devices.contains_key(&path) {
                drop(devices);
                warn!("Refusing second engine for {}", path);
                engine.abandon();
                return Err(RegistryError::AlreadyRegistered(path));
            }

            let handle = Arc::new(engine.start(tx)?);
            devices.insert(path.clone(), handle.clone());
            handle
        };

        let identity = handle.identity();
        info!("Registered {}", identity);
        let sink = self.inner.sink.clone();
        let arrived = identity.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || sink.arrived(&arrived)).await {
            error!("Arrival dispatch for {} failed: {}", path, e);
        }

        let registry = Arc::downgrade(&self.inner);
        let sink = self.inner.sink.clone();
        let mut consumers = self
            .inner
            .consumers
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        // Reap consumers of devices that are already gone
        while consumers.try_join_next().is_some() {}
        consumers.spawn_blocking(move || consume(registry, sink, handle, rx));
        drop(consumers);

        Ok(identity)
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.inner.devices.read().await.contains_key(path)
    }

    pub async fn len(&self) -> usize {
        self.inner.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.devices.read().await.is_empty()
    }

    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.inner.devices.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub async fn identities(&self) -> Vec<DeviceIdentity> {
        let mut identities: Vec<DeviceIdentity> = self
            .inner
            .devices
            .read()
            .await
            .values()
            .map(|handle| handle.identity())
            .collect();
        identities.sort_by(|a, b| a.path.cmp(&b.path));
        identities
    }

    pub async fn get(&self, path: &str) -> Option<Arc<DeviceHandle>> {
        self.inner.devices.read().await.get(path).cloned()
    }

    async fn require(&self, path: &str) -> Result<Arc<DeviceHandle>, RegistryError> {
        self.get(path)
            .await
            .ok_or_else(|| RegistryError::NotFound(path.to_string()))
    }

    pub async fn rumble(
        &self,
        path: &str,
        large_motor: u8,
        small_motor: u8,
    ) -> Result<(), RegistryError> {
        self.require(path).await?.rumble(large_motor, small_motor)?;
        Ok(())
    }

    pub async fn set_leds(&self, path: &str, mask: u8) -> Result<(), RegistryError> {
        self.require(path).await?.set_leds(mask)?;
        Ok(())
    }

    /// Pairs the device at `path` to `host` without blocking the runtime
    pub async fn pair_to(&self, path: &str, host: BdAddr) -> Result<(), RegistryError> {
        let handle = self.require(path).await?;
        tokio::task::spawn_blocking(move || handle.pair_to(host))
            .await
            .map_err(|e| RegistryError::TaskFailed(e.to_string()))??;
        Ok(())
    }

    /// Disposes every engine and waits for their consumers to finish
    ///
    /// Each device still gets exactly one `removed` call.
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<DeviceHandle>> =
            self.inner.devices.read().await.values().cloned().collect();
        info!("Shutting down {} device(s)", handles.len());
        for handle in &handles {
            handle.shutdown();
        }
        drop(handles);

        let mut consumers = std::mem::take(
            &mut *self
                .inner
                .consumers
                .lock()
                .unwrap_or_else(|p| p.into_inner()),
        );
        while let Some(result) = consumers.join_next().await {
            if let Err(e) = result {
                error!("Device consumer task failed: {}", e);
            }
        }
        debug!("All device consumers finished");
    }
}

/// Drains one engine's channel until it reports a disconnect
///
/// Runs on the blocking pool, so a slow sink holds up only its own device.
fn consume(
    registry: Weak<RegistryInner>,
    sink: SinkDispatch,
    handle: Arc<DeviceHandle>,
    mut events: mpsc::UnboundedReceiver<EngineMessage>,
) {
    let decode = handle.profile().decode;

    while let Some(message) = events.blocking_recv() {
        match message {
            EngineMessage::InputReport(bytes) => match decode(&bytes) {
                Ok(report) => sink.input_report(&handle.identity(), &report),
                Err(e) => debug!("Dropping report from {}: {}", handle.path(), e),
            },
            EngineMessage::Disconnected(reason) => {
                let identity = handle.identity();
                if let Some(registry) = registry.upgrade() {
                    if !registry.remove_if_current(&handle) {
                        debug!("{} was already replaced in the registry", identity.path);
                    }
                }
                info!("Unregistered {} ({})", identity, reason);
                sink.removed(&identity);
                return;
            }
        }
    }

    warn!("Engine channel of {} closed without a disconnect", handle.path());
}

#[cfg(test)]
mod tests;

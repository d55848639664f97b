//! Consumer boundary for device lifecycle and input reports
//!
//! Sinks re-expose controller state elsewhere. The registry calls them from
//! its blocking consumer threads through [`SinkDispatch`], which logs failures and
//! contains panics so a misbehaving sink never reaches an engine.

#[cfg(test)]
pub(crate) mod recording;

use crate::codec::InputReport;
use crate::device::DeviceIdentity;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink rejected event: {0}")]
    Rejected(String),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Receives device lifecycle events and decoded reports
///
/// Calls for one device arrive in order: `arrived`, any number of
/// `input_report`, then `removed` at most once. Calls are made from blocking
/// threads, never from the async runtime, so an implementation may block;
/// doing so delays only the device it is handling.
pub trait SinkHost: Send + Sync {
    fn on_device_arrived(&self, identity: &DeviceIdentity) -> Result<(), SinkError>;

    fn on_device_removed(&self, identity: &DeviceIdentity) -> Result<(), SinkError>;

    fn on_input_report(
        &self,
        identity: &DeviceIdentity,
        report: &InputReport,
    ) -> Result<(), SinkError>;
}

/// Panic and error guard around a shared sink
#[derive(Clone)]
pub struct SinkDispatch {
    sink: Arc<dyn SinkHost>,
}

impl SinkDispatch {
    pub fn new(sink: Arc<dyn SinkHost>) -> Self {
        Self { sink }
    }

    pub fn arrived(&self, identity: &DeviceIdentity) {
        self.guard("on_device_arrived", identity, |sink| {
            sink.on_device_arrived(identity)
        });
    }

    pub fn removed(&self, identity: &DeviceIdentity) {
        self.guard("on_device_removed", identity, |sink| {
            sink.on_device_removed(identity)
        });
    }

    pub fn input_report(&self, identity: &DeviceIdentity, report: &InputReport) {
        self.guard("on_input_report", identity, |sink| {
            sink.on_input_report(identity, report)
        });
    }

    fn guard<F>(&self, call: &str, identity: &DeviceIdentity, f: F)
    where
        F: FnOnce(&dyn SinkHost) -> Result<(), SinkError>,
    {
        let sink = self.sink.as_ref();
        match panic::catch_unwind(AssertUnwindSafe(|| f(sink))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{} failed for {}: {}", call, identity.path, e),
            Err(_) => error!("{} panicked for {}", call, identity.path),
        }
    }
}

/// Sink that writes everything to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl SinkHost for TracingSink {
    fn on_device_arrived(&self, identity: &DeviceIdentity) -> Result<(), SinkError> {
        info!("Device arrived: {}", identity);
        Ok(())
    }

    fn on_device_removed(&self, identity: &DeviceIdentity) -> Result<(), SinkError> {
        info!("Device removed: {}", identity);
        Ok(())
    }

    fn on_input_report(
        &self,
        identity: &DeviceIdentity,
        report: &InputReport,
    ) -> Result<(), SinkError> {
        let state = &report.state;
        debug!(
            "{}: buttons={:?} ps={} L=({},{}) R=({},{}) L2={} R2={}",
            identity.client_address,
            state.buttons,
            state.ps_button,
            state.left_stick.x,
            state.left_stick.y,
            state.right_stick.x,
            state.right_stick.y,
            state.left_trigger,
            state.right_trigger
        );
        Ok(())
    }
}

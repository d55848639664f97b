//! Running engine: command surface and teardown
//!
//! [`DeviceHandle`] is what the registry keeps per device. Workers hold an
//! `Arc` of the shared engine state, never the handle itself, so dropping
//! the last handle shuts the engine down.

use super::output::OutputReport;
use super::{
    reader, writer, DeviceError, DeviceIdentity, DisconnectReason, EngineMessage, EngineSettings,
    EngineStatus, READ_WORKERS,
};
use crate::io::DeviceIo;
use crate::protocol::{self, BdAddr, DeviceProfile};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters since start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub reports_read: u64,
    pub writes_submitted: u64,
    pub writes_failed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct EngineCounters {
    pub(crate) reports_read: AtomicU64,
    pub(crate) writes_submitted: AtomicU64,
    pub(crate) writes_failed: AtomicU64,
}

/// State shared by the handle, the read workers and the output timer
pub(crate) struct EngineShared {
    pub(crate) path: String,
    pub(crate) profile: &'static DeviceProfile,
    pub(crate) io: Arc<dyn DeviceIo>,
    pub(crate) settings: EngineSettings,
    pub(crate) output: OutputReport,
    pub(crate) cancel: CancellationToken,
    pub(crate) write_now: Notify,
    pub(crate) write_in_flight: AtomicBool,
    pub(crate) write_requested: AtomicBool,
    pub(crate) counters: EngineCounters,
    identity: RwLock<DeviceIdentity>,
    lifecycle: Mutex<EngineStatus>,
    events: mpsc::UnboundedSender<EngineMessage>,
}

impl EngineShared {
    fn status_guard(&self) -> MutexGuard<'_, EngineStatus> {
        self.lifecycle.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn is_active(&self) -> bool {
        *self.status_guard() == EngineStatus::Active
    }

    /// Forwards one report to the owner, false once nobody listens
    pub(crate) fn forward(&self, report: Vec<u8>) -> bool {
        self.events.send(EngineMessage::InputReport(report)).is_ok()
    }

    /// Asks the output timer for a write outside the regular period
    fn request_write(&self) {
        self.write_requested.store(true, Ordering::SeqCst);
        self.write_now.notify_one();
    }

    /// The single `Active -> Disconnected` transition
    ///
    /// Cancels the workers, closes the handle and notifies the owner. Only
    /// the first caller does any of that; the rest get `false`.
    pub(crate) fn disconnect(&self, reason: DisconnectReason) -> bool {
        let mut status = self.status_guard();
        if *status == EngineStatus::Disconnected {
            return false;
        }
        *status = EngineStatus::Disconnected;

        self.cancel.cancel();
        self.io.close();
        info!("{} disconnected: {}", self.path, reason);

        if self.events.send(EngineMessage::Disconnected(reason)).is_err() {
            debug!("No owner left to notify about {}", self.path);
        }
        true
    }
}

/// A started engine
pub struct DeviceHandle {
    shared: Arc<EngineShared>,
}

impl DeviceHandle {
    pub(crate) fn spawn(
        identity: DeviceIdentity,
        profile: &'static DeviceProfile,
        io: Arc<dyn DeviceIo>,
        settings: EngineSettings,
        events: mpsc::UnboundedSender<EngineMessage>,
    ) -> Self {
        let path = identity.path.clone();
        let shared = Arc::new(EngineShared {
            path: path.clone(),
            profile,
            io,
            output: OutputReport::from_profile(profile),
            settings,
            cancel: CancellationToken::new(),
            write_now: Notify::new(),
            write_in_flight: AtomicBool::new(false),
            write_requested: AtomicBool::new(false),
            counters: EngineCounters::default(),
            identity: RwLock::new(identity),
            lifecycle: Mutex::new(EngineStatus::Active),
            events,
        });

        for worker in 0..READ_WORKERS {
            let shared = shared.clone();
            tokio::task::spawn_blocking(move || reader::run_reader(shared, worker));
        }
        tokio::spawn(writer::run_output_timer(shared.clone()));

        info!(
            "Engine started for {} with {} read workers, output every {:?}",
            path, READ_WORKERS, shared.settings.output_interval
        );
        Self { shared }
    }

    pub fn path(&self) -> &str {
        &self.shared.path
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.shared
            .identity
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn profile(&self) -> &'static DeviceProfile {
        self.shared.profile
    }

    pub fn status(&self) -> EngineStatus {
        *self.shared.status_guard()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    pub fn stats(&self) -> EngineStats {
        let counters = &self.shared.counters;
        EngineStats {
            reports_read: counters.reports_read.load(Ordering::Relaxed),
            writes_submitted: counters.writes_submitted.load(Ordering::Relaxed),
            writes_failed: counters.writes_failed.load(Ordering::Relaxed),
        }
    }

    /// Bytes the next output write will carry
    pub fn output_snapshot(&self) -> Vec<u8> {
        self.shared.output.snapshot()
    }

    fn ensure_active(&self) -> Result<(), DeviceError> {
        if self.shared.is_active() {
            Ok(())
        } else {
            Err(DeviceError::Disconnected {
                path: self.shared.path.clone(),
            })
        }
    }

    /// Sets motor intensities and requests an immediate write
    ///
    /// The small motor is binary on this family, any non-zero value turns it on.
    pub fn rumble(&self, large_motor: u8, small_motor: u8) -> Result<(), DeviceError> {
        self.ensure_active()?;
        debug!(
            "Rumble on {}: large={} small={}",
            self.shared.path, large_motor, small_motor
        );
        self.shared
            .output
            .apply_rumble(&self.shared.profile.rumble, large_motor, small_motor);
        self.shared.request_write();
        Ok(())
    }

    /// Lights the player LEDs named by the low four bits of `mask`
    pub fn set_leds(&self, mask: u8) -> Result<(), DeviceError> {
        self.ensure_active()?;
        let offset = self
            .shared
            .profile
            .led_offset
            .ok_or_else(|| DeviceError::CommandUnsupported {
                path: self.shared.path.clone(),
                command: "set_leds",
            })?;
        debug!("LEDs on {}: mask={:#06b}", self.shared.path, mask & 0x0F);
        self.shared.output.apply_leds(offset, mask);
        self.shared.request_write();
        Ok(())
    }

    /// Pairs the device to `host`
    ///
    /// Blocks until the driver answers. The cached host address only changes
    /// when the request succeeds.
    pub fn pair_to(&self, host: BdAddr) -> Result<(), DeviceError> {
        self.ensure_active()?;
        let client = self.identity().client_address;

        protocol::set_host_address(self.shared.io.as_ref(), host).map_err(|source| {
            warn!("Pairing {} to {} failed: {}", client, host, source);
            DeviceError::PairingFailed {
                client,
                target: host,
                source,
            }
        })?;

        self.shared
            .identity
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .host_address = host;
        info!("Paired {} to host {}", client, host);
        Ok(())
    }

    /// Stops the engine; safe to call any number of times
    pub fn shutdown(&self) {
        if self.shared.disconnect(DisconnectReason::Shutdown) {
            debug!("Shutdown of {} requested by owner", self.shared.path);
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("path", &self.shared.path)
            .field("status", &self.status())
            .finish()
    }
}

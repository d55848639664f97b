//! Open and handshake with statum typestates
//!
//! A [`DeviceEngine<Opening>`] holds a freshly opened handle. Only a
//! successful [`DeviceEngine::handshake`] yields a [`DeviceEngine<Active>`],
//! and only an active engine can be started. Every failure past `open`
//! closes the handle before returning.

use super::handle::DeviceHandle;
use super::{DeviceError, DeviceIdentity, EngineMessage, EngineSettings};
use crate::io::{DeviceIo, DeviceOpener};
use crate::protocol::{self, profile_for, DeviceProfile, DeviceType};
use statum::{machine, state};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[state]
#[derive(Debug, Clone)]
pub enum EnginePhase {
    Opening, // Handle open, nothing queried yet
    Active,  // Identity known, ready to start workers
}

#[machine]
pub struct DeviceEngine<S: EnginePhase> {
    path: String,
    io: Arc<dyn DeviceIo>,
    settings: EngineSettings,
    identity: Option<DeviceIdentity>,
    profile: Option<&'static DeviceProfile>,
}

impl<S: EnginePhase> DeviceEngine<S> {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl<S: EnginePhase> fmt::Debug for DeviceEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEngine")
            .field("path", &self.path)
            .field("identity", &self.identity)
            .finish()
    }
}

impl DeviceEngine<Opening> {
    /// Opens `path` for overlapped read/write
    pub fn open(
        path: &str,
        opener: &dyn DeviceOpener,
        settings: EngineSettings,
    ) -> Result<Self, DeviceError> {
        debug!("Opening device {}", path);
        let io = opener.open(path).map_err(|source| DeviceError::OpenFailed {
            path: path.to_string(),
            source,
        })?;

        Ok(Self::new(path.to_string(), io, settings, None, None))
    }

    /// Queries type, device address and host address, in that order
    ///
    /// On any failure the handle is closed and no engine survives.
    pub fn handshake(mut self) -> Result<DeviceEngine<Active>, DeviceError> {
        match self.query_identity() {
            Ok((identity, profile)) => {
                info!("Handshake complete: {}", identity);
                self.identity = Some(identity);
                self.profile = Some(profile);
                Ok(self.transition())
            }
            Err(e) => {
                error!("Handshake with {} failed: {}", self.path, e);
                self.io.close();
                Err(e)
            }
        }
    }

    fn query_identity(&self) -> Result<(DeviceIdentity, &'static DeviceProfile), DeviceError> {
        let path = self.path.clone();

        let tag = protocol::query_device_type(self.io.as_ref()).map_err(|source| {
            DeviceError::DeviceTypeQueryFailed {
                path: path.clone(),
                source,
            }
        })?;

        let profile = DeviceType::from_tag(tag)
            .and_then(profile_for)
            .ok_or_else(|| DeviceError::UnsupportedDeviceType {
                path: path.clone(),
                tag,
            })?;
        debug!("{} reports device type {}", path, profile.device_type);

        let client_address = protocol::query_device_address(self.io.as_ref()).map_err(|source| {
            DeviceError::DeviceAddressQueryFailed {
                path: path.clone(),
                source,
            }
        })?;

        let host_address = protocol::query_host_address(self.io.as_ref()).map_err(|source| {
            DeviceError::HostAddressQueryFailed {
                path: path.clone(),
                source,
            }
        })?;

        let identity = DeviceIdentity {
            path,
            device_type: profile.device_type,
            client_address,
            host_address,
        };
        Ok((identity, profile))
    }
}

impl DeviceEngine<Active> {
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Starts the read workers and the output timer
    ///
    /// Must be called from within a tokio runtime. `events` receives every
    /// input report and, once, the disconnect notification.
    pub fn start(
        self,
        events: mpsc::UnboundedSender<EngineMessage>,
    ) -> Result<DeviceHandle, DeviceError> {
        let (identity, profile) = match (self.identity, self.profile) {
            (Some(identity), Some(profile)) => (identity, profile),
            _ => {
                self.io.close();
                return Err(DeviceError::InvalidState(format!(
                    "{} reached Active without an identity",
                    self.path
                )));
            }
        };

        Ok(DeviceHandle::spawn(
            identity,
            profile,
            self.io,
            self.settings,
            events,
        ))
    }

    /// Closes the handle without ever starting I/O
    pub fn abandon(self) {
        warn!("Abandoning {} before start", self.path);
        self.io.close();
    }
}

/// Opens and handshakes `path` in one step
///
/// Blocking. Callers on the runtime run this through `spawn_blocking`.
pub fn connect(
    path: &str,
    opener: &dyn DeviceOpener,
    settings: EngineSettings,
) -> Result<DeviceEngine<Active>, DeviceError> {
    DeviceEngine::<Opening>::open(path, opener, settings)?.handshake()
}

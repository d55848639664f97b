//! Handle ownership and the OS facing seams
//!
//! The engine never touches an OS handle directly. It talks to a
//! [`DeviceIo`], which owns the handle and exposes exactly four operations.
//! Discovery and opening go through [`DeviceSource`] and [`DeviceOpener`] so
//! the whole core runs against scripted devices in tests.
//!
//! ```text
//! DeviceSource ──paths──► Enumerator ──path──► DeviceOpener ──► Arc<dyn DeviceIo>
//! ```

#[cfg(test)]
pub(crate) mod mock;
#[cfg(windows)]
pub mod windows;

use std::sync::Arc;
use uuid::Uuid;

/// Win32 `ERROR_OPERATION_ABORTED`, reported when a pending request was
/// cancelled because its handle went away
pub const ERROR_OPERATION_ABORTED: u32 = 0x3E3;

/// Win32 `ERROR_IO_PENDING`
pub const ERROR_IO_PENDING: u32 = 0x3E5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IoError {
    /// The request was cancelled under us, the device is gone
    #[error("operation aborted")]
    Aborted,

    #[error("device handle already closed")]
    Closed,

    #[error("os error 0x{0:X}")]
    Os(u32),

    #[error("short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    #[error("unexpected control response: {0}")]
    UnexpectedResponse(String),
}

impl IoError {
    /// Whether this completion means the handle was closed from under the request
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Aborted | Self::Closed)
    }
}

/// Owner of one device handle
///
/// All calls block until the request completes. A handle supports any number
/// of independent requests in flight at once, so implementations must be
/// callable from several threads without extra locking.
pub trait DeviceIo: Send + Sync {
    /// Reads one input report into `buffer`, returning the number of bytes
    fn issue_read(&self, buffer: &mut [u8]) -> Result<usize, IoError>;

    /// Writes one output report, returning the number of bytes accepted
    fn issue_write(&self, report: &[u8]) -> Result<usize, IoError>;

    /// Sends a control request, filling `output` with the reply
    fn issue_control(&self, code: u32, input: &[u8], output: &mut [u8])
        -> Result<usize, IoError>;

    /// Shuts the device down. Requests still pending complete with
    /// [`IoError::Aborted`] and later ones fail with [`IoError::Closed`].
    /// The OS handle is released when the last owner drops the device.
    fn close(&self);
}

/// Opens device paths for overlapped read/write
pub trait DeviceOpener: Send + Sync {
    fn open(&self, path: &str) -> Result<Arc<dyn DeviceIo>, IoError>;
}

/// Lists the device interface paths currently present for a device class
pub trait DeviceSource: Send + Sync {
    fn list_device_paths(&self, device_class: &Uuid) -> Result<Vec<String>, IoError>;
}

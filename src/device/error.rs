//! Errors raised by the device engine

use crate::io::IoError;
use crate::protocol::BdAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    /// The path could not be opened for overlapped I/O
    #[error("failed to open {path}: {source}")]
    OpenFailed { path: String, source: IoError },

    #[error("device type query failed on {path}: {source}")]
    DeviceTypeQueryFailed { path: String, source: IoError },

    /// The driver reported a family without a profile row
    #[error("{path} reported unsupported device type tag {tag}")]
    UnsupportedDeviceType { path: String, tag: u32 },

    #[error("device address query failed on {path}: {source}")]
    DeviceAddressQueryFailed { path: String, source: IoError },

    #[error("host address query failed on {path}: {source}")]
    HostAddressQueryFailed { path: String, source: IoError },

    #[error("pairing {client} to host {target} failed: {source}")]
    PairingFailed {
        client: BdAddr,
        target: BdAddr,
        source: IoError,
    },

    /// Diagnostic only, the output timer keeps running
    #[error("output report write failed on {path}: {source}")]
    OutputWriteFailed { path: String, source: IoError },

    /// A read failed for a reason other than the handle going away
    #[error("unexpected I/O failure on {path}: {source}")]
    UnexpectedIoFailure { path: String, source: IoError },

    #[error("{path} is disconnected")]
    Disconnected { path: String },

    #[error("{command} is not supported by {path}")]
    CommandUnsupported { path: String, command: &'static str },

    #[error("invalid engine state: {0}")]
    InvalidState(String),
}

//! Per-device I/O engine
//!
//! Owns one open device handle from handshake to teardown:
//!
//! 1. [`engine`] - open and handshake, typed `Opening -> Active`
//! 2. [`reader`] - two blocking read workers keeping reads in flight
//! 3. [`writer`] - periodic output report writes
//! 4. [`handle`] - command surface and the exactly-once disconnect
//!
//! # Architecture
//!
//! ```text
//!              ┌── read worker 0 ──┐
//! DeviceIo ◄───┼── read worker 1 ──┼──► EngineMessage ──► registry
//!              └── output timer ◄──┴─── rumble / set_leds
//! ```
//!
//! Everything the engine reports to its owner goes through one unbounded
//! channel of [`EngineMessage`]. A disconnect is delivered exactly once, no
//! matter how many workers observe it.

pub mod engine;
pub mod error;
pub mod handle;
pub mod output;
mod reader;
mod writer;


pub use engine::{connect, Active, DeviceEngine, EnginePhase, Opening};
pub use error::DeviceError;
pub use handle::{DeviceHandle, EngineStats};
pub use output::OutputReport;

use crate::io::IoError;
use crate::protocol::{BdAddr, DeviceType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Number of reads each engine keeps in flight
pub const READ_WORKERS: usize = 2;

/// Who a device is, as learned during the handshake
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub path: String,
    pub device_type: DeviceType,
    pub client_address: BdAddr,
    pub host_address: BdAddr,
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (host {}) at {}",
            self.device_type, self.client_address, self.host_address, self.path
        )
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Period of the output report timer
    pub output_interval: Duration,
    /// Size of each read worker's buffer
    pub read_buffer_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            output_interval: Duration::from_millis(10),
            read_buffer_size: 512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Active,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// A pending read was aborted, the device went away
    Removed,
    /// A read failed for another reason
    IoFailure(IoError),
    /// The owner shut the engine down
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Removed => write!(f, "device removed"),
            Self::IoFailure(e) => write!(f, "I/O failure: {}", e),
            Self::Shutdown => write!(f, "shut down"),
        }
    }
}

/// Notifications an engine sends to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Raw bytes of one completed read
    InputReport(Vec<u8>),
    /// Sent once, after which the engine sends nothing else of interest
    Disconnected(DisconnectReason),
}

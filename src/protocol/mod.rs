//! Control protocol spoken with the FireShock driver
//!
//! Every request is a single `DeviceIoControl` round trip on the device
//! handle. Payloads are fixed size and allocated per request, so a buffer
//! never outlives the call that filled it.
//!
//! | Request          | Code         | In      | Out           |
//! |------------------|--------------|---------|---------------|
//! | GetHostAddress   | `0x80006004` | -       | 6 byte BD addr |
//! | GetDeviceAddress | `0x80006008` | -       | 6 byte BD addr |
//! | SetHostAddress   | `0x8000A00C` | 6 bytes | -             |
//! | GetDeviceType    | `0x80006010` | -       | 4 byte LE tag |

pub mod address;
pub mod profile;

pub use address::{BdAddr, BdAddrParseError, BD_ADDR_LEN};
pub use profile::{profile_for, DeviceProfile, RumbleLayout};

use crate::io::{DeviceIo, IoError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub const IOCTL_FIRESHOCK_GET_HOST_BD_ADDR: u32 = 0x8000_6004;
pub const IOCTL_FIRESHOCK_GET_DEVICE_BD_ADDR: u32 = 0x8000_6008;
pub const IOCTL_FIRESHOCK_SET_HOST_BD_ADDR: u32 = 0x8000_A00C;
pub const IOCTL_FIRESHOCK_GET_DEVICE_TYPE: u32 = 0x8000_6010;

/// Size of the device type tag returned by the driver (a C enum)
pub const DEVICE_TYPE_TAG_LEN: usize = 4;

/// Controller families the driver can report
///
/// The discriminants are the raw tags of the driver's `DS_DEVICE_TYPE` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    DualShock3,
    DualShock4,
}

impl DeviceType {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::DualShock3),
            1 => Some(Self::DualShock4),
            _ => None,
        }
    }

    pub fn tag(self) -> u32 {
        match self {
            Self::DualShock3 => 0,
            Self::DualShock4 => 1,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DualShock3 => write!(f, "DualShock 3"),
            Self::DualShock4 => write!(f, "DualShock 4"),
        }
    }
}

/// A single control request understood by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    GetDeviceType,
    GetDeviceAddress,
    GetHostAddress,
    SetHostAddress(BdAddr),
}

/// Decoded answer to a [`ControlRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlResponse {
    /// Raw type tag, validated by the caller against the profile table
    DeviceTypeTag(u32),
    Address(BdAddr),
    Done,
}

impl ControlRequest {
    pub fn code(&self) -> u32 {
        match self {
            Self::GetDeviceType => IOCTL_FIRESHOCK_GET_DEVICE_TYPE,
            Self::GetDeviceAddress => IOCTL_FIRESHOCK_GET_DEVICE_BD_ADDR,
            Self::GetHostAddress => IOCTL_FIRESHOCK_GET_HOST_BD_ADDR,
            Self::SetHostAddress(_) => IOCTL_FIRESHOCK_SET_HOST_BD_ADDR,
        }
    }

    /// Exact size of the output buffer the driver fills
    pub fn response_len(&self) -> usize {
        match self {
            Self::GetDeviceType => DEVICE_TYPE_TAG_LEN,
            Self::GetDeviceAddress | Self::GetHostAddress => BD_ADDR_LEN,
            Self::SetHostAddress(_) => 0,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            Self::SetHostAddress(addr) => addr.as_bytes(),
            _ => &[],
        }
    }

    /// Sends the request over `io` and decodes the reply
    pub fn execute(&self, io: &dyn DeviceIo) -> Result<ControlResponse, IoError> {
        let mut response = vec![0u8; self.response_len()];
        let returned = io.issue_control(self.code(), self.payload(), &mut response)?;
        debug!(
            "Control request {:?} (0x{:08X}) returned {} bytes",
            self,
            self.code(),
            returned
        );

        if returned < response.len() {
            return Err(IoError::ShortTransfer {
                expected: response.len(),
                actual: returned,
            });
        }

        match self {
            Self::GetDeviceType => Ok(ControlResponse::DeviceTypeTag(u32::from_le_bytes([
                response[0],
                response[1],
                response[2],
                response[3],
            ]))),
            Self::GetDeviceAddress | Self::GetHostAddress => BdAddr::from_slice(&response)
                .map(ControlResponse::Address)
                .ok_or(IoError::ShortTransfer {
                    expected: BD_ADDR_LEN,
                    actual: returned,
                }),
            Self::SetHostAddress(_) => Ok(ControlResponse::Done),
        }
    }
}

pub fn query_device_type(io: &dyn DeviceIo) -> Result<u32, IoError> {
    match ControlRequest::GetDeviceType.execute(io)? {
        ControlResponse::DeviceTypeTag(tag) => Ok(tag),
        other => Err(IoError::UnexpectedResponse(format!("{:?}", other))),
    }
}

pub fn query_device_address(io: &dyn DeviceIo) -> Result<BdAddr, IoError> {
    match ControlRequest::GetDeviceAddress.execute(io)? {
        ControlResponse::Address(addr) => Ok(addr),
        other => Err(IoError::UnexpectedResponse(format!("{:?}", other))),
    }
}

pub fn query_host_address(io: &dyn DeviceIo) -> Result<BdAddr, IoError> {
    match ControlRequest::GetHostAddress.execute(io)? {
        ControlResponse::Address(addr) => Ok(addr),
        other => Err(IoError::UnexpectedResponse(format!("{:?}", other))),
    }
}

pub fn set_host_address(io: &dyn DeviceIo, host: BdAddr) -> Result<(), IoError> {
    ControlRequest::SetHostAddress(host).execute(io).map(|_| ())
}

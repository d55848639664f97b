use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of a Bluetooth device address in bytes
pub const BD_ADDR_LEN: usize = 6;

/// Bluetooth device address of a controller or of the host it is paired to
///
/// Stored in the byte order the driver reports it. Equality is byte-wise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BdAddr([u8; BD_ADDR_LEN]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BdAddrParseError {
    #[error("expected 6 colon separated octets, got {0}")]
    WrongLength(usize),

    #[error("invalid octet '{0}'")]
    InvalidOctet(String),
}

impl BdAddr {
    pub const fn new(bytes: [u8; BD_ADDR_LEN]) -> Self {
        Self(bytes)
    }

    /// Builds an address from a driver response, `None` if the payload is too short
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; BD_ADDR_LEN] = bytes.get(..BD_ADDR_LEN)?.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; BD_ADDR_LEN] {
        &self.0
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

impl fmt::Debug for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BdAddr({})", self)
    }
}

impl FromStr for BdAddr {
    type Err = BdAddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.trim().split(':').collect();
        if octets.len() != BD_ADDR_LEN {
            return Err(BdAddrParseError::WrongLength(octets.len()));
        }

        let mut bytes = [0u8; BD_ADDR_LEN];
        for (slot, octet) in bytes.iter_mut().zip(octets) {
            if octet.len() != 2 {
                return Err(BdAddrParseError::InvalidOctet(octet.to_string()));
            }
            *slot = u8::from_str_radix(octet, 16)
                .map_err(|_| BdAddrParseError::InvalidOctet(octet.to_string()))?;
        }

        Ok(Self(bytes))
    }
}

impl Serialize for BdAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BdAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

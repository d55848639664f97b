//! Per device family parameters
//!
//! Supporting another controller family means adding one row to
//! [`PROFILES`]: its output report template, write size, byte layout for
//! rumble and LEDs, and the decoder for its input reports.

use super::DeviceType;
use crate::codec::{self, CodecError, InputReport};
use std::fmt;

/// Output report size of a DualShock 3
pub const DS3_OUTPUT_REPORT_SIZE: usize = 0x30;

/// Default DualShock 3 output report: motors off, LEDs off, standard LED
/// blink parameters for all four LEDs.
pub const DS3_OUTPUT_TEMPLATE: [u8; DS3_OUTPUT_REPORT_SIZE] = [
    0x00, 0xFF, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0xFF, 0x27, 0x10, 0x00, 0x32, //
    0xFF, 0x27, 0x10, 0x00, 0x32, //
    0xFF, 0x27, 0x10, 0x00, 0x32, //
    0xFF, 0x27, 0x10, 0x00, 0x32, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Where the motor intensities live inside an output report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RumbleLayout {
    /// Byte receiving 0x01 when the small motor should spin, 0x00 otherwise
    pub small_motor_offset: usize,
    /// Byte receiving the large motor intensity (0-255)
    pub large_motor_offset: usize,
}

pub type DecodeFn = fn(&[u8]) -> Result<InputReport, CodecError>;

/// Everything the engine needs to know about one controller family
pub struct DeviceProfile {
    pub device_type: DeviceType,
    pub output_template: &'static [u8],
    /// Number of bytes submitted per output write
    pub write_size: usize,
    pub rumble: RumbleLayout,
    /// Byte holding the player LED bitmask, if the family has one
    pub led_offset: Option<usize>,
    pub decode: DecodeFn,
}

impl fmt::Debug for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceProfile")
            .field("device_type", &self.device_type)
            .field("write_size", &self.write_size)
            .field("rumble", &self.rumble)
            .field("led_offset", &self.led_offset)
            .finish_non_exhaustive()
    }
}

pub static PROFILES: &[DeviceProfile] = &[DeviceProfile {
    device_type: DeviceType::DualShock3,
    output_template: &DS3_OUTPUT_TEMPLATE,
    write_size: DS3_OUTPUT_REPORT_SIZE,
    rumble: RumbleLayout {
        small_motor_offset: 2,
        large_motor_offset: 4,
    },
    led_offset: Some(9),
    decode: codec::ds3::decode,
}];

/// Looks up the profile row for a device family
pub fn profile_for(device_type: DeviceType) -> Option<&'static DeviceProfile> {
    PROFILES.iter().find(|p| p.device_type == device_type)
}

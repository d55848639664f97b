//! Input report decoding
//!
//! Raw input reports leave the engine as plain bytes. The registry turns them
//! into [`InputReport`] values with the decoder of the device's profile
//! before they reach a sink.

pub mod ds3;

use bitflags::bitflags;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

bitflags! {
    /// Digital buttons, laid out like the driver's `FS3_BUTTON` flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Buttons: u16 {
        const DPAD_UP = 0x0001;
        const DPAD_RIGHT = 0x0002;
        const DPAD_DOWN = 0x0004;
        const DPAD_LEFT = 0x0008;
        const TRIANGLE = 0x0010;
        const CIRCLE = 0x0020;
        const CROSS = 0x0040;
        const SQUARE = 0x0080;
        const SELECT = 0x0100;
        const LEFT_THUMB = 0x0200;
        const RIGHT_THUMB = 0x0400;
        const START = 0x0800;
        const LEFT_TRIGGER = 0x1000;
        const RIGHT_TRIGGER = 0x2000;
        const LEFT_SHOULDER = 0x4000;
        const RIGHT_SHOULDER = 0x8000;
    }
}

// Stick position, 0x80 is centered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StickPosition {
    pub x: u8,
    pub y: u8,
}

/// Analog pressure of the pressure sensitive buttons (0 = released)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PressureState {
    pub up: u8,
    pub right: u8,
    pub down: u8,
    pub left: u8,
    pub left_shoulder: u8,
    pub right_shoulder: u8,
    pub triangle: u8,
    pub circle: u8,
    pub cross: u8,
    pub square: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GamepadState {
    pub buttons: Buttons,
    pub ps_button: bool,
    pub left_stick: StickPosition,
    pub right_stick: StickPosition,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub pressure: PressureState,
}

/// A decoded input report as delivered to sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputReport {
    /// Bytes as returned by the read completion
    pub raw: Vec<u8>,
    pub state: GamepadState,
    pub received_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("input report too short: need {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("unexpected report id 0x{0:02X}")]
    UnexpectedReportId(u8),
}

//! DualShock 3 input report decoder
//!
//! USB input report 0x01 layout (offsets into the read buffer):
//!
//! ```text
//! 0      report id (0x01)
//! 2      select, L3, R3, start, up, right, down, left   (bit 0..7)
//! 3      L2, R2, L1, R1, triangle, circle, cross, square (bit 0..7)
//! 4      PS button (bit 0)
//! 6..10  left X, left Y, right X, right Y
//! 14..18 pressure up, right, down, left
//! 18, 19 L2, R2 analog
//! 20, 21 L1, R1 pressure
//! 22..26 pressure triangle, circle, cross, square
//! ```

use super::{Buttons, CodecError, GamepadState, InputReport, PressureState, StickPosition};
use chrono::Local;

pub const REPORT_ID: u8 = 0x01;

/// Shortest buffer that still contains every decoded field
pub const MIN_REPORT_LEN: usize = 26;

pub fn decode(raw: &[u8]) -> Result<InputReport, CodecError> {
    if raw.len() < MIN_REPORT_LEN {
        return Err(CodecError::TooShort {
            expected: MIN_REPORT_LEN,
            actual: raw.len(),
        });
    }
    if raw[0] != REPORT_ID {
        return Err(CodecError::UnexpectedReportId(raw[0]));
    }

    Ok(InputReport {
        raw: raw.to_vec(),
        state: decode_state(raw),
        received_at: Local::now(),
    })
}

fn decode_state(raw: &[u8]) -> GamepadState {
    let mut buttons = Buttons::empty();

    // byte 2
    buttons.set(Buttons::SELECT, raw[2] & 0x01 != 0);
    buttons.set(Buttons::LEFT_THUMB, raw[2] & 0x02 != 0);
    buttons.set(Buttons::RIGHT_THUMB, raw[2] & 0x04 != 0);
    buttons.set(Buttons::START, raw[2] & 0x08 != 0);
    buttons.set(Buttons::DPAD_UP, raw[2] & 0x10 != 0);
    buttons.set(Buttons::DPAD_RIGHT, raw[2] & 0x20 != 0);
    buttons.set(Buttons::DPAD_DOWN, raw[2] & 0x40 != 0);
    buttons.set(Buttons::DPAD_LEFT, raw[2] & 0x80 != 0);

    // byte 3
    buttons.set(Buttons::LEFT_TRIGGER, raw[3] & 0x01 != 0);
    buttons.set(Buttons::RIGHT_TRIGGER, raw[3] & 0x02 != 0);
    buttons.set(Buttons::LEFT_SHOULDER, raw[3] & 0x04 != 0);
    buttons.set(Buttons::RIGHT_SHOULDER, raw[3] & 0x08 != 0);
    buttons.set(Buttons::TRIANGLE, raw[3] & 0x10 != 0);
    buttons.set(Buttons::CIRCLE, raw[3] & 0x20 != 0);
    buttons.set(Buttons::CROSS, raw[3] & 0x40 != 0);
    buttons.set(Buttons::SQUARE, raw[3] & 0x80 != 0);

    GamepadState {
        buttons,
        ps_button: raw[4] & 0x01 != 0,
        left_stick: StickPosition {
            x: raw[6],
            y: raw[7],
        },
        right_stick: StickPosition {
            x: raw[8],
            y: raw[9],
        },
        left_trigger: raw[18],
        right_trigger: raw[19],
        pressure: PressureState {
            up: raw[14],
            right: raw[15],
            down: raw[16],
            left: raw[17],
            left_shoulder: raw[20],
            right_shoulder: raw[21],
            triangle: raw[22],
            circle: raw[23],
            cross: raw[24],
            square: raw[25],
        },
    }
}

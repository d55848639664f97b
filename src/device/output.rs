use crate::protocol::{DeviceProfile, RumbleLayout};
use std::sync::{Mutex, MutexGuard};

/// Current rumble/LED intent of one device
///
/// Commands mutate it in place, the output timer copies it out. Both sides
/// go through the same mutex so a write never sees a half applied command.
#[derive(Debug)]
pub struct OutputReport {
    buffer: Mutex<Vec<u8>>,
    write_size: usize,
}

impl OutputReport {
    pub fn from_profile(profile: &DeviceProfile) -> Self {
        let mut buffer = profile.output_template.to_vec();
        buffer.resize(profile.write_size, 0);
        Self {
            buffer: Mutex::new(buffer),
            write_size: profile.write_size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the bytes the next write will carry
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock()[..self.write_size].to_vec()
    }

    /// Large motor takes the full intensity, the small motor is on/off only
    pub fn apply_rumble(&self, layout: &RumbleLayout, large_motor: u8, small_motor: u8) {
        let mut buffer = self.lock();
        buffer[layout.small_motor_offset] = if small_motor > 0 { 0x01 } else { 0x00 };
        buffer[layout.large_motor_offset] = large_motor;
    }

    /// Sets the player LEDs from a 4 bit mask (bit 0 = LED 1)
    pub fn apply_leds(&self, offset: usize, mask: u8) {
        self.lock()[offset] = (mask & 0x0F) << 1;
    }
}

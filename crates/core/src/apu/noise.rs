//! Noise channel with Linear Feedback Shift Register (LFSR).
//!
//! The noise channel generates pseudo-random noise for percussion and sound effects.

use super::{Envelope, LengthCounter};
use crate::state::{Serializer, StateError, SyncState};

/// NTSC noise period lookup table (CPU cycles)
pub const NOISE_PERIOD_TABLE_NTSC: [u16; 16] = [
    4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068,
];

/// PAL noise period lookup table (CPU cycles)
pub const NOISE_PERIOD_TABLE_PAL: [u16; 16] = [
    4, 8, 14, 30, 60, 88, 118, 148, 188, 236, 354, 472, 708, 944, 1890, 3778,
];

/// Noise channel that generates pseudo-random noise.
///
/// The noise channel uses a 15-bit LFSR to generate pseudo-random bit sequences.
/// It supports:
/// - Two noise modes (normal and periodic/metallic)
/// - 16 preset period values
/// - Length counter
/// - Envelope generator for volume control
#[derive(Debug, Clone)]
pub struct NoiseChannel {
    /// Mode flag: false = normal, true = periodic (short LFSR period)
    pub mode: bool,
    /// Period index (0-15) into period lookup table
    pub period_index: u8,
    timer: u16,
    /// 15-bit Linear Feedback Shift Register
    shift_register: u16,
    pub envelope: Envelope,
    pub length: LengthCounter,
}

impl NoiseChannel {
    pub fn new() -> Self {
        Self {
            mode: false,
            period_index: 0,
            timer: 0,
            shift_register: 1,
            envelope: Envelope::new(),
            length: LengthCounter::new(),
        }
    }

    /// `$400C`: length halt and envelope.
    pub fn write_control(&mut self, val: u8) {
        self.length.set_halt(val & 0x20 != 0);
        self.envelope.write_control(val);
    }

    /// `$400E`: mode and period index.
    pub fn write_period(&mut self, val: u8) {
        self.mode = val & 0x80 != 0;
        self.period_index = val & 0x0F;
    }

    /// `$400F`: length load and envelope restart.
    pub fn write_length(&mut self, val: u8) {
        self.length.load(val >> 3);
        self.envelope.restart();
    }

    /// Clock the timer for one CPU cycle with the region's period table.
    pub fn clock_timer(&mut self, period_table: &[u16; 16]) {
        if self.timer > 0 {
            self.timer -= 1;
            return;
        }
        self.timer = period_table[self.period_index as usize & 0x0F] - 1;

        let tap = if self.mode { 6 } else { 1 };
        let feedback = (self.shift_register ^ (self.shift_register >> tap)) & 1;
        self.shift_register >>= 1;
        self.shift_register |= feedback << 14;
    }

    pub fn clock_quarter_frame(&mut self) {
        self.envelope.clock();
    }

    pub fn clock_half_frame(&mut self) {
        self.length.clock();
    }

    /// Current output level (0-15)
    pub fn output(&self) -> u8 {
        if self.length.is_active() && self.shift_register & 1 == 0 {
            self.envelope.volume()
        } else {
            0
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.length.set_enabled(enabled);
    }
}

impl Default for NoiseChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncState for NoiseChannel {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("Noise")?;
        s.sync_bool("Mode", &mut self.mode)?;
        s.sync_u8("Period", &mut self.period_index)?;
        s.sync_u16("Timer", &mut self.timer)?;
        s.sync_u16("Lfsr", &mut self.shift_register)?;
        self.envelope.sync_state(s)?;
        self.length.sync_state(s)?;
        s.end_section("Noise")
    }
}

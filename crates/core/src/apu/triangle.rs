//! Triangle wave generator for the RP2A03/RP2A07 APU.
//!
//! The triangle channel produces a quantized triangle wave with 32 steps.

use super::LengthCounter;
use crate::state::{Serializer, StateError, SyncState};

const TRIANGLE_TABLE: [u8; 32] = [
    15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, //
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
];

/// Triangle channel.
///
/// The triangle channel has:
/// - 32-step triangle wave (no volume control)
/// - Length counter for note duration
/// - Linear counter for additional duration control
///
/// Unlike the other channels the timer runs at the CPU rate.
#[derive(Debug, Clone, Default)]
pub struct TriangleChannel {
    /// 11-bit timer reload value
    pub timer_reload: u16,
    timer: u16,
    /// Current step in the triangle sequence (0-31)
    sequence_pos: u8,
    pub length: LengthCounter,
    /// Linear counter (7-bit)
    pub linear_counter: u8,
    /// Linear counter reload value
    pub linear_counter_reload: u8,
    pub linear_counter_reload_flag: bool,
    /// Control flag (halt length counter and linear counter)
    pub control_flag: bool,
}

impl TriangleChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// `$4008`: control flag and linear counter reload.
    pub fn write_linear(&mut self, val: u8) {
        self.control_flag = val & 0x80 != 0;
        self.length.set_halt(self.control_flag);
        self.linear_counter_reload = val & 0x7F;
    }

    pub fn write_timer_low(&mut self, val: u8) {
        self.timer_reload = (self.timer_reload & 0x0700) | val as u16;
    }

    pub fn write_timer_high(&mut self, val: u8) {
        self.timer_reload = (self.timer_reload & 0x00FF) | (((val & 7) as u16) << 8);
        self.length.load(val >> 3);
        self.linear_counter_reload_flag = true;
    }

    /// Clock the timer for one CPU cycle
    pub fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_reload;
            // Only advance the sequencer while both counters are non-zero
            if self.linear_counter > 0 && self.length.is_active() {
                self.sequence_pos = (self.sequence_pos + 1) & 31;
            }
        } else {
            self.timer -= 1;
        }
    }

    /// Clock the linear counter (quarter frames)
    pub fn clock_linear_counter(&mut self) {
        if self.linear_counter_reload_flag {
            self.linear_counter = self.linear_counter_reload;
        } else if self.linear_counter > 0 {
            self.linear_counter -= 1;
        }

        if !self.control_flag {
            self.linear_counter_reload_flag = false;
        }
    }

    pub fn clock_half_frame(&mut self) {
        self.length.clock();
    }

    /// Current output level (0-15). A silenced channel outputs 0.
    pub fn output(&self) -> u8 {
        if self.length.is_active() && self.linear_counter > 0 {
            TRIANGLE_TABLE[self.sequence_pos as usize]
        } else {
            0
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.length.set_enabled(enabled);
    }
}

impl SyncState for TriangleChannel {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("Triangle")?;
        s.sync_u16("TimerReload", &mut self.timer_reload)?;
        s.sync_u16("Timer", &mut self.timer)?;
        s.sync_u8("Sequence", &mut self.sequence_pos)?;
        s.sync_u8("Linear", &mut self.linear_counter)?;
        s.sync_u8("LinearReload", &mut self.linear_counter_reload)?;
        s.sync_bool("LinearReloadFlag", &mut self.linear_counter_reload_flag)?;
        s.sync_bool("Control", &mut self.control_flag)?;
        self.length.sync_state(s)?;
        s.end_section("Triangle")
    }
}

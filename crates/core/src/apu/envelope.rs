//! Envelope generator for volume control.
//!
//! The envelope generator provides automatic volume fade-out for pulse and noise channels.

use crate::state::{Serializer, StateError, SyncState};

/// Envelope generator component.
///
/// Provides automatic volume control with decay from 15 to 0,
/// or a constant volume taken straight from the register.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Start flag (set when a note is triggered)
    start_flag: bool,
    /// Decay level counter (0-15)
    decay_level: u8,
    /// Divider counter
    divider: u8,
    /// Divider period, doubling as the constant volume
    period: u8,
    /// Loop flag (restart envelope when it reaches 0)
    loop_flag: bool,
    /// Output `period` instead of the decay level
    constant_volume: bool,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock the envelope (quarter frames from the frame counter)
    pub fn clock(&mut self) {
        if self.start_flag {
            self.start_flag = false;
            self.decay_level = 15;
            self.divider = self.period;
        } else if self.divider > 0 {
            self.divider -= 1;
        } else {
            self.divider = self.period;
            if self.decay_level > 0 {
                self.decay_level -= 1;
            } else if self.loop_flag {
                self.decay_level = 15;
            }
        }
    }

    /// Register bits `--LC VVVV`: loop, constant volume, volume/period.
    pub fn write_control(&mut self, value: u8) {
        self.loop_flag = value & 0x20 != 0;
        self.constant_volume = value & 0x10 != 0;
        self.period = value & 0x0F;
    }

    /// Get the current decay level (0-15)
    pub fn level(&self) -> u8 {
        self.decay_level
    }

    /// Volume fed to the channel output (0-15)
    pub fn volume(&self) -> u8 {
        if self.constant_volume {
            self.period
        } else {
            self.decay_level
        }
    }

    /// Restart the envelope
    pub fn restart(&mut self) {
        self.start_flag = true;
    }

    /// Set the period (divider reload value)
    pub fn set_period(&mut self, period: u8) {
        self.period = period & 0x0F;
    }

    /// Set the loop flag
    pub fn set_loop(&mut self, loop_flag: bool) {
        self.loop_flag = loop_flag;
    }
}

impl SyncState for Envelope {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("Envelope")?;
        s.sync_bool("Start", &mut self.start_flag)?;
        s.sync_u8("Decay", &mut self.decay_level)?;
        s.sync_u8("Divider", &mut self.divider)?;
        s.sync_u8("Period", &mut self.period)?;
        s.sync_bool("Loop", &mut self.loop_flag)?;
        s.sync_bool("Constant", &mut self.constant_volume)?;
        s.end_section("Envelope")
    }
}

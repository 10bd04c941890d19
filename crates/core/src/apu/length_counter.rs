//! Length counter used by pulse, triangle, and noise channels.
//!
//! The length counter provides automatic note duration control.

use crate::state::{Serializer, StateError, SyncState};

/// NES length counter lookup table.
///
/// This table is indexed by a 5-bit value (0-31) and returns the length counter value.
/// The counter is clocked on half frames (~120Hz NTSC, ~100Hz PAL).
pub const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, //
    12, 16, 24, 18, 48, 20, 96, 22, 192, 24, 72, 26, 16, 28, 32, 30,
];

/// Length counter component.
///
/// Automatically decrements and can be halted. When it reaches zero,
/// the associated channel is silenced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LengthCounter {
    /// Current counter value
    value: u8,
    /// Halt flag (when true, counter doesn't decrement)
    halt: bool,
    /// Enabled flag from $4015 (when false, counter is held at 0)
    enabled: bool,
}

impl LengthCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock the length counter (decrement if not halted)
    pub fn clock(&mut self) {
        if !self.halt && self.value > 0 {
            self.value -= 1;
        }
    }

    /// Load a new value from the length table (ignored while disabled)
    pub fn load(&mut self, index: u8) {
        if self.enabled {
            self.value = LENGTH_TABLE[(index & 0x1F) as usize];
        }
    }

    /// Get the current counter value
    pub fn value(&self) -> u8 {
        self.value
    }

    /// Set the halt flag
    pub fn set_halt(&mut self, halt: bool) {
        self.halt = halt;
    }

    /// Set the enabled flag
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.value = 0;
        }
    }

    /// Check if the counter is non-zero (channel should be active)
    pub fn is_active(&self) -> bool {
        self.value > 0
    }
}

impl SyncState for LengthCounter {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("Length")?;
        s.sync_u8("Value", &mut self.value)?;
        s.sync_bool("Halt", &mut self.halt)?;
        s.sync_bool("Enabled", &mut self.enabled)?;
        s.end_section("Length")
    }
}

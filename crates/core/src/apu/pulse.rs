//! Pulse wave generator for the RP2A03/RP2A07 APU.
//!
//! Each pulse channel combines a duty sequencer, an envelope, a length
//! counter and a sweep unit. The timer is clocked once per APU cycle
//! (every other CPU cycle).

use super::{Envelope, LengthCounter};
use crate::state::{Serializer, StateError, SyncState};

/// Duty patterns indexed by (duty, phase).
const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 1, 0, 0, 0, 0, 0, 0], // 12.5%
    [0, 1, 1, 0, 0, 0, 0, 0], // 25%
    [0, 1, 1, 1, 1, 0, 0, 0], // 50%
    [1, 0, 0, 1, 1, 1, 1, 1], // 25% negated
];

/// Which of the two pulse channels this is. Only the sweep negate differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseId {
    /// Ones'-complement negate (`period - change - 1`)
    One,
    /// Twos'-complement negate (`period - change`)
    Two,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Sweep {
    enabled: bool,
    period: u8,
    negate: bool,
    shift: u8,
    divider: u8,
    reload: bool,
}

/// Pulse channel that generates square wave levels (0-15).
#[derive(Debug, Clone)]
pub struct PulseChannel {
    id: PulseId,
    /// Duty cycle (0-3)
    pub duty: u8,
    /// 11-bit timer reload value from registers
    pub timer_reload: u16,
    timer: u16,
    /// Current phase of the duty cycle (0-7)
    phase: u8,
    pub envelope: Envelope,
    pub length: LengthCounter,
    sweep: Sweep,
}

impl PulseChannel {
    pub fn new(id: PulseId) -> Self {
        Self {
            id,
            duty: 0,
            timer_reload: 0,
            timer: 0,
            phase: 0,
            envelope: Envelope::new(),
            length: LengthCounter::new(),
            sweep: Sweep::default(),
        }
    }

    /// `$4000`/`$4004`: duty, length halt, envelope.
    pub fn write_control(&mut self, val: u8) {
        self.duty = (val >> 6) & 3;
        self.length.set_halt(val & 0x20 != 0);
        self.envelope.write_control(val);
    }

    /// `$4001`/`$4005`: sweep unit.
    pub fn write_sweep(&mut self, val: u8) {
        self.sweep.enabled = val & 0x80 != 0;
        self.sweep.period = (val >> 4) & 7;
        self.sweep.negate = val & 0x08 != 0;
        self.sweep.shift = val & 7;
        self.sweep.reload = true;
    }

    /// `$4002`/`$4006`: timer low bits.
    pub fn write_timer_low(&mut self, val: u8) {
        self.timer_reload = (self.timer_reload & 0x0700) | val as u16;
    }

    /// `$4003`/`$4007`: timer high bits and length load. Restarts the note.
    pub fn write_timer_high(&mut self, val: u8) {
        self.timer_reload = (self.timer_reload & 0x00FF) | (((val & 7) as u16) << 8);
        self.length.load(val >> 3);
        self.envelope.restart();
        self.phase = 0;
    }

    /// Clock the timer for one APU cycle.
    pub fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_reload;
            self.phase = (self.phase + 1) & 7;
        } else {
            self.timer -= 1;
        }
    }

    pub fn clock_quarter_frame(&mut self) {
        self.envelope.clock();
    }

    pub fn clock_half_frame(&mut self) {
        self.length.clock();

        if self.sweep.divider == 0 && self.sweep.enabled && self.sweep.shift > 0 && !self.muted() {
            self.timer_reload = self.sweep_target();
        }
        if self.sweep.divider == 0 || self.sweep.reload {
            self.sweep.divider = self.sweep.period;
            self.sweep.reload = false;
        } else {
            self.sweep.divider -= 1;
        }
    }

    fn sweep_target(&self) -> u16 {
        let change = self.timer_reload >> self.sweep.shift;
        if self.sweep.negate {
            match self.id {
                PulseId::One => self.timer_reload.wrapping_sub(change).wrapping_sub(1),
                PulseId::Two => self.timer_reload.wrapping_sub(change),
            }
        } else {
            self.timer_reload + change
        }
    }

    /// Sweep muting applies even when the sweep unit is disabled.
    fn muted(&self) -> bool {
        self.timer_reload < 8 || (!self.sweep.negate && self.sweep_target() > 0x7FF)
    }

    /// Current output level (0-15).
    pub fn output(&self) -> u8 {
        if !self.length.is_active() || self.muted() {
            return 0;
        }
        DUTY_TABLE[(self.duty & 3) as usize][self.phase as usize] * self.envelope.volume()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.length.set_enabled(enabled);
    }
}

impl SyncState for PulseChannel {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("Pulse")?;
        s.sync_u8("Duty", &mut self.duty)?;
        s.sync_u16("TimerReload", &mut self.timer_reload)?;
        s.sync_u16("Timer", &mut self.timer)?;
        s.sync_u8("Phase", &mut self.phase)?;
        s.sync_bool("SweepEnabled", &mut self.sweep.enabled)?;
        s.sync_u8("SweepPeriod", &mut self.sweep.period)?;
        s.sync_bool("SweepNegate", &mut self.sweep.negate)?;
        s.sync_u8("SweepShift", &mut self.sweep.shift)?;
        s.sync_u8("SweepDivider", &mut self.sweep.divider)?;
        s.sync_bool("SweepReload", &mut self.sweep.reload)?;
        self.envelope.sync_state(s)?;
        self.length.sync_state(s)?;
        s.end_section("Pulse")
    }
}

//! Audio chip trait for pluggable audio implementations.
//!
//! This module defines a common interface for sound chips clocked by a host
//! CPU. Chips never produce samples themselves: output level changes are
//! queued as timestamped events and resampled by
//! [`AudioBridge`](crate::audio_bridge::AudioBridge).

use crate::audio_bridge::AudioQueue;
use crate::state::SyncState;
use crate::timing::TimingMode;

/// A sound chip clocked once per CPU cycle.
pub trait AudioChip: SyncState {
    /// Write to a register on the audio chip
    fn write_register(&mut self, addr: u16, val: u8);

    /// Read from a register. May have side effects (e.g. clearing IRQ flags).
    fn read_register(&mut self, addr: u16) -> u8 {
        self.peek_register(addr)
    }

    /// Read a register without side effects.
    fn peek_register(&self, addr: u16) -> u8 {
        let _ = addr;
        0
    }

    /// Clock the chip for one CPU cycle
    fn clock(&mut self);

    /// Clock the chip for `cycles` CPU cycles
    fn advance(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.clock();
        }
    }

    /// Get the timing mode of this chip (NTSC/PAL)
    fn timing(&self) -> TimingMode;

    /// Reset the chip as the console's reset line does
    fn reset(&mut self);

    /// Interrupt output level
    fn irq(&self) -> bool {
        false
    }

    /// Pending output level changes
    fn queue(&self) -> &AudioQueue;

    fn queue_mut(&mut self) -> &mut AudioQueue;

    /// Rate of the clock that timestamps queued events (in Hz)
    fn clock_rate(&self) -> u32 {
        self.timing().cpu_clock_hz()
    }
}

//! Frame counter that drives envelope, length counter, and sweep units.
//!
//! The sequencer counts CPU cycles and emits quarter-frame and half-frame
//! clocks at fixed cycle offsets that depend on the region.

use crate::state::{Serializer, StateError, SyncState};
use crate::timing::TimingMode;

/// Clocks produced by one frame counter cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameClocks {
    pub quarter: bool,
    pub half: bool,
}

impl FrameClocks {
    const NONE: Self = Self {
        quarter: false,
        half: false,
    };
    const QUARTER: Self = Self {
        quarter: true,
        half: false,
    };
    const BOTH: Self = Self {
        quarter: true,
        half: true,
    };
}

/// Step offsets in CPU cycles: 4 steps shared by both modes, the 5-step
/// mode's final step, and the period of each mode.
struct StepTable {
    steps: [u32; 4],
    fifth: u32,
    period4: u32,
    period5: u32,
}

const NTSC_STEPS: StepTable = StepTable {
    steps: [7457, 14913, 22371, 29829],
    fifth: 37281,
    period4: 29830,
    period5: 37282,
};

const PAL_STEPS: StepTable = StepTable {
    steps: [8313, 16627, 24939, 33253],
    fifth: 41565,
    period4: 33254,
    period5: 41566,
};

/// Frame counter component.
///
/// Supports two modes:
/// - 4-step mode: Q, QH, Q, QH + IRQ
/// - 5-step mode: Q, QH, Q, -, QH (no IRQ)
#[derive(Debug, Clone)]
pub struct FrameCounter {
    pal: bool,
    mode_5_step: bool,
    irq_inhibit: bool,
    irq_pending: bool,
    cycle: u32,
}

impl FrameCounter {
    pub fn new(timing: TimingMode) -> Self {
        Self {
            pal: timing.uses_pal_apu_tables(),
            mode_5_step: false,
            irq_inhibit: false,
            irq_pending: false,
            cycle: 0,
        }
    }

    fn table(&self) -> &'static StepTable {
        if self.pal {
            &PAL_STEPS
        } else {
            &NTSC_STEPS
        }
    }

    /// Clock the frame counter for one CPU cycle.
    pub fn clock(&mut self) -> FrameClocks {
        self.cycle += 1;
        let table = self.table();

        let clocks = if self.cycle == table.steps[0] || self.cycle == table.steps[2] {
            FrameClocks::QUARTER
        } else if self.cycle == table.steps[1] {
            FrameClocks::BOTH
        } else if self.cycle == table.steps[3] && !self.mode_5_step {
            if !self.irq_inhibit {
                self.irq_pending = true;
            }
            FrameClocks::BOTH
        } else if self.cycle == table.fifth && self.mode_5_step {
            FrameClocks::BOTH
        } else {
            FrameClocks::NONE
        };

        let period = if self.mode_5_step {
            table.period5
        } else {
            table.period4
        };
        if self.cycle >= period {
            self.cycle = 0;
        }
        clocks
    }

    /// Write to `$4017`. Restarts the sequence; 5-step mode clocks every unit
    /// immediately, which the returned value reports.
    pub fn write_control(&mut self, value: u8) -> FrameClocks {
        self.mode_5_step = (value & 0x80) != 0;
        self.irq_inhibit = (value & 0x40) != 0;
        if self.irq_inhibit {
            self.irq_pending = false;
        }
        self.cycle = 0;

        if self.mode_5_step {
            FrameClocks::BOTH
        } else {
            FrameClocks::NONE
        }
    }

    pub fn is_irq_pending(&self) -> bool {
        self.irq_pending
    }

    pub fn clear_irq(&mut self) {
        self.irq_pending = false;
    }
}

impl SyncState for FrameCounter {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("FrameCounter")?;
        s.sync_bool("FiveStep", &mut self.mode_5_step)?;
        s.sync_bool("IrqInhibit", &mut self.irq_inhibit)?;
        s.sync_bool("IrqPending", &mut self.irq_pending)?;
        s.sync_u32("Cycle", &mut self.cycle)?;
        s.end_section("FrameCounter")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(fc: &mut FrameCounter, cycles: u32) -> Vec<(u32, FrameClocks)> {
        (1..=cycles)
            .filter_map(|c| {
                let clocks = fc.clock();
                (clocks != FrameClocks::NONE).then_some((c, clocks))
            })
            .collect()
    }

    #[test]
    fn ntsc_4_step_sequence() {
        let mut fc = FrameCounter::new(TimingMode::Ntsc);
        let events = collect(&mut fc, 29830);
        let cycles: Vec<u32> = events.iter().map(|(c, _)| *c).collect();
        assert_eq!(cycles, vec![7457, 14913, 22371, 29829]);
        assert!(events[1].1.half && events[3].1.half);
        assert!(!events[0].1.half && !events[2].1.half);
        assert!(fc.is_irq_pending());
    }

    #[test]
    fn sequence_repeats_with_period() {
        let mut fc = FrameCounter::new(TimingMode::Ntsc);
        collect(&mut fc, 29830);
        let events = collect(&mut fc, 7457);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, 7457);
    }

    #[test]
    fn five_step_mode_has_no_irq() {
        let mut fc = FrameCounter::new(TimingMode::Ntsc);
        let immediate = fc.write_control(0x80);
        assert_eq!(immediate, FrameClocks::BOTH);
        let events = collect(&mut fc, 37282);
        let cycles: Vec<u32> = events.iter().map(|(c, _)| *c).collect();
        assert_eq!(cycles, vec![7457, 14913, 22371, 37281]);
        assert!(!fc.is_irq_pending());
    }

    #[test]
    fn irq_inhibit_clears_pending() {
        let mut fc = FrameCounter::new(TimingMode::Ntsc);
        collect(&mut fc, 29830);
        assert!(fc.is_irq_pending());
        fc.write_control(0x40);
        assert!(!fc.is_irq_pending());
        collect(&mut fc, 29830);
        assert!(!fc.is_irq_pending());
    }

    #[test]
    fn pal_uses_longer_steps() {
        let mut fc = FrameCounter::new(TimingMode::Pal);
        let events = collect(&mut fc, 33254);
        let cycles: Vec<u32> = events.iter().map(|(c, _)| *c).collect();
        assert_eq!(cycles, vec![8313, 16627, 24939, 33253]);
    }
}

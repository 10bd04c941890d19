//! Cycle-stepped scheduler.
//!
//! The CPU drives time: each of its bus accesses is one CPU cycle, and the
//! bus advances the PPU, APU and board after every access
//! ([`NesBus::clock_cycle`]). The scheduler adds what the CPU does not see:
//! the PPU dot ratio of the region, the OAM DMA stall and the DMC fetch
//! stalls, plus interrupt line merging between instructions.

use crate::bus::NesBus;
use crate::NesError;
use emu_core::cpu_6502::Cpu6502;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::state::{Serializer, StateError, SyncState};
use emu_core::timing::TimingMode;

/// CPU cycles the CPU is suspended for by a $4014 write.
pub const OAM_DMA_DEAD_CYCLES: u16 = 514;

/// CPU cycles stolen by each DMC sample fetch.
pub const DMC_FETCH_DEAD_CYCLES: u32 = 4;

/// Upper bound on CPU cycles in one frame (PAL is about 33 250).
pub const MAX_CYCLES_PER_FRAME: u64 = 200_000;

/// PPU dots per CPU cycle, 32 entries indexed by the sequence position.
const NTSC_DOTS: [u8; 32] = [3; 32];
const PAL_DOTS: [u8; 32] = [
    4, 3, 3, 3, 3, 4, 3, 3, 3, 3, 4, 3, 3, 3, 3, 4, 3, 3, 3, 3, 4, 3, 3, 3, 3, 4, 3, 3, 3, 3,
    4, 3,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Between frames
    Idle,
    Running,
    /// OAM DMA in progress; the copy happens when `remaining` reaches zero
    TransferInFlight { page: u8, remaining: u16 },
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    region: TimingMode,
    state: SchedulerState,
    seq_step: u8,
    cpu_cycles: u64,
    dead_cycles: u32,
}

impl Scheduler {
    pub fn new(region: TimingMode) -> Self {
        Self {
            region,
            state: SchedulerState::Idle,
            seq_step: 0,
            cpu_cycles: 0,
            dead_cycles: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn set_state(&mut self, state: SchedulerState) {
        self.state = state;
    }

    /// CPU cycles since power-on, including dead cycles.
    pub fn cpu_cycles(&self) -> u64 {
        self.cpu_cycles
    }

    pub fn pending_dead_cycles(&self) -> u32 {
        self.dead_cycles
    }

    fn dot_table(&self) -> &'static [u8; 32] {
        match self.region {
            TimingMode::Pal => &PAL_DOTS,
            TimingMode::Ntsc | TimingMode::Dendy => &NTSC_DOTS,
        }
    }

    /// PPU dots for the next CPU cycle.
    pub fn next_ppu_dots(&mut self) -> u32 {
        let dots = self.dot_table()[(self.seq_step & 31) as usize];
        self.seq_step = (self.seq_step + 1) & 31;
        dots as u32
    }

    pub(crate) fn end_cycle(&mut self) {
        self.cpu_cycles += 1;
    }

    pub fn start_oam_dma(&mut self, page: u8) {
        log(LogCategory::Bus, LogLevel::Trace, || {
            format!("OAM DMA from ${:02X}00 at cycle {}", page, self.cpu_cycles)
        });
        self.state = SchedulerState::TransferInFlight {
            page,
            remaining: OAM_DMA_DEAD_CYCLES,
        };
    }

    pub fn add_dead_cycles(&mut self, cycles: u32) {
        self.dead_cycles += cycles;
    }
}

impl SyncState for Scheduler {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        let (mut tag, mut page, mut remaining) = match self.state {
            SchedulerState::Idle => (0u8, 0u8, 0u16),
            SchedulerState::Running => (1, 0, 0),
            SchedulerState::TransferInFlight { page, remaining } => (2, page, remaining),
        };

        s.begin_section("Scheduler")?;
        s.sync_u8("State", &mut tag)?;
        s.sync_u8("DmaPage", &mut page)?;
        s.sync_u16("DmaRemaining", &mut remaining)?;
        s.sync_u8("SeqStep", &mut self.seq_step)?;
        s.sync_u64("CpuCycles", &mut self.cpu_cycles)?;
        s.sync_u32("DeadCycles", &mut self.dead_cycles)?;
        s.end_section("Scheduler")?;

        if s.is_reader() {
            if self.seq_step > 31 {
                return Err(StateError::InvalidValue("Scheduler.SeqStep".into()));
            }
            self.state = match tag {
                0 => SchedulerState::Idle,
                1 => SchedulerState::Running,
                2 if remaining > 0 && remaining <= OAM_DMA_DEAD_CYCLES => {
                    SchedulerState::TransferInFlight { page, remaining }
                }
                _ => return Err(StateError::InvalidValue("Scheduler.State".into())),
            };
        }
        Ok(())
    }
}

/// One scheduler step: a dead cycle, or one whole CPU instruction.
///
/// Returns the CPU cycles that elapsed.
pub fn run_cpu_one(cpu: &mut Cpu6502<NesBus>) -> Result<u32, NesError> {
    let irq = cpu.memory.irq_level();
    cpu.set_irq_line(irq);
    if cpu.memory.ppu.take_nmi_edge() {
        cpu.trigger_nmi();
    }

    if let SchedulerState::TransferInFlight { page, remaining } = cpu.memory.scheduler.state {
        let remaining = remaining
            .checked_sub(1)
            .ok_or(NesError::TimingInvariant("OAM DMA countdown underflow"))?;
        cpu.memory.clock_cycle();
        if remaining == 0 {
            cpu.memory.finish_oam_dma(page);
            cpu.memory.scheduler.state = SchedulerState::Running;
        } else {
            cpu.memory.scheduler.state = SchedulerState::TransferInFlight { page, remaining };
        }
        return Ok(1);
    }

    if cpu.memory.scheduler.dead_cycles > 0 {
        cpu.memory.scheduler.dead_cycles = cpu
            .memory
            .scheduler
            .dead_cycles
            .checked_sub(1)
            .ok_or(NesError::TimingInvariant("dead cycle underflow"))?;
        cpu.memory.clock_cycle();
        return Ok(1);
    }

    Ok(cpu.step()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntsc_is_three_dots_per_cycle() {
        let mut s = Scheduler::new(TimingMode::Ntsc);
        let total: u32 = (0..3000).map(|_| s.next_ppu_dots()).sum();
        assert_eq!(total, 9000);
    }

    #[test]
    fn pal_sequence_repeats_every_32_cycles() {
        let mut s = Scheduler::new(TimingMode::Pal);
        let first: Vec<u32> = (0..32).map(|_| s.next_ppu_dots()).collect();
        let second: Vec<u32> = (0..32).map(|_| s.next_ppu_dots()).collect();
        assert_eq!(first, second);
        assert_eq!(first.iter().sum::<u32>(), 103);
        assert_eq!(&first[..5], &[4, 3, 3, 3, 3]);
    }

    #[test]
    fn tables_have_no_zero_entries() {
        assert!(NTSC_DOTS.iter().chain(PAL_DOTS.iter()).all(|&d| d > 0));
    }

    #[test]
    fn dma_state_round_trip() {
        use emu_core::state::StateFormat;

        let mut s = Scheduler::new(TimingMode::Ntsc);
        s.start_oam_dma(0x02);
        s.add_dead_cycles(4);
        let mut w = Serializer::writer(StateFormat::Text, "nes", 1);
        s.sync_state(&mut w).unwrap();
        let text = String::from_utf8(w.into_bytes().unwrap()).unwrap();

        let mut restored = Scheduler::new(TimingMode::Ntsc);
        let mut r = Serializer::text_reader(&text, "nes", 1).unwrap();
        restored.sync_state(&mut r).unwrap();
        assert_eq!(
            restored.state(),
            SchedulerState::TransferInFlight {
                page: 0x02,
                remaining: OAM_DMA_DEAD_CYCLES
            }
        );
        assert_eq!(restored.pending_dead_cycles(), 4);
    }
}

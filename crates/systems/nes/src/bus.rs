//! CPU address space of the NES.
//!
//! `NesBus` owns everything the CPU can reach. Every `read`/`write` is one
//! CPU cycle: the access happens first, then [`NesBus::clock_cycle`] advances
//! the PPU, APU and board, so a register write is visible to the chip at the
//! cycle it occurs. `peek`/`poke` never clock and never touch latches.

use crate::cartridge::Mirroring;
use crate::config::NesSettings;
use crate::input::ControllerDeck;
use crate::mappers::Board;
use crate::ppu::Ppu;
use crate::scheduler::{Scheduler, DMC_FETCH_DEAD_CYCLES};
use emu_core::apu::{AudioChip, Rp2a03Apu};
use emu_core::bus_map::{BusError, BusEvent, BusMap, BusMapBuilder, HookKind, MemoryHooks, Watch, WatchTable};
use emu_core::cpu_6502::Memory6502;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::ppu::CompiledPalette;
use std::fmt;

pub const RAM_SIZE: usize = 0x800;

/// Handler tags of the CPU decode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NesRegion {
    Ram,
    PpuRegs,
    /// APU, OAM DMA and controller ports
    Io,
    /// Cartridge space below work RAM
    Expansion,
    Wram,
    Prg,
    Open,
}

/// The 32-byte granularity table every NES board shares.
pub fn nes_bus_map() -> Result<BusMap<NesRegion>, BusError> {
    Ok(BusMapBuilder::new(16, 5, NesRegion::Open)
        .map(0x0000..=0x1FFF, NesRegion::Ram)?
        .map(0x2000..=0x3FFF, NesRegion::PpuRegs)?
        .map(0x4000..=0x401F, NesRegion::Io)?
        .map(0x4020..=0x5FFF, NesRegion::Expansion)?
        .map(0x6000..=0x7FFF, NesRegion::Wram)?
        .map(0x8000..=0xFFFF, NesRegion::Prg)?
        .build())
}

pub struct NesBus {
    pub(crate) ram: Vec<u8>,
    pub(crate) ppu: Ppu,
    pub(crate) apu: Rp2a03Apu,
    pub(crate) board: Box<dyn Board>,
    pub(crate) input: ControllerDeck,
    pub(crate) scheduler: Scheduler,
    map: BusMap<NesRegion>,
    /// Last value driven on the CPU data bus
    pub(crate) db: u8,
    /// Cleared by any controller read during the frame
    pub(crate) lagged: bool,
    watches: WatchTable,
    hooks: MemoryHooks,
}

impl fmt::Debug for NesBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NesBus")
            .field("board", &self.board.name())
            .field("ppu", &self.ppu)
            .field("db", &self.db)
            .field("cycle", &self.scheduler.cpu_cycles())
            .field("watches", &self.watches.len())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl NesBus {
    pub fn new(
        board: Box<dyn Board>,
        settings: &NesSettings,
        colors: CompiledPalette,
    ) -> Result<Self, BusError> {
        let region = settings.region;
        let ram = (0..RAM_SIZE).map(|i| settings.ram_init.byte_at(i)).collect();
        Ok(Self {
            ram,
            ppu: Ppu::new(region, colors),
            apu: Rp2a03Apu::new(region, settings.max_audio_events, settings.max_audio_clocks),
            board,
            input: ControllerDeck::new(),
            scheduler: Scheduler::new(region),
            map: nes_bus_map()?,
            db: 0,
            lagged: false,
            watches: WatchTable::new(),
            hooks: MemoryHooks::new(),
        })
    }

    pub fn map(&self) -> &BusMap<NesRegion> {
        &self.map
    }

    pub fn board(&self) -> &dyn Board {
        self.board.as_ref()
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn apu(&self) -> &Rp2a03Apu {
        &self.apu
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn hooks_mut(&mut self) -> &mut MemoryHooks {
        &mut self.hooks
    }

    pub fn watches_mut(&mut self) -> &mut WatchTable {
        &mut self.watches
    }

    /// Merged IRQ line: the APU and the board share it wired-OR.
    pub fn irq_level(&self) -> bool {
        self.apu.irq() || self.board.irq_signal()
    }

    fn event(&self, addr: u16, value: u8) -> BusEvent {
        BusEvent {
            addr: addr as u32,
            value,
            cycle: self.scheduler.cpu_cycles(),
        }
    }

    /// Advance every peripheral by one CPU cycle.
    pub fn clock_cycle(&mut self) {
        let dots = self.scheduler.next_ppu_dots();
        self.ppu.advance(dots, self.board.as_mut());

        self.apu.clock();
        if let Some(addr) = self.apu.dmc_fetch_request() {
            let byte = self.read_raw(addr);
            self.apu.dmc_fill(byte);
            self.scheduler.add_dead_cycles(DMC_FETCH_DEAD_CYCLES);
        }

        self.board.clock_cpu();
        self.scheduler.end_cycle();
    }

    /// Deferred OAM DMA copy: 256 bytes from `page` into OAM through $2004.
    pub(crate) fn finish_oam_dma(&mut self, page: u8) {
        let base = (page as u16) << 8;
        for i in 0..256u16 {
            let byte = self.read_raw(base | i);
            self.db = byte;
            self.ppu.write_register(0x2004, byte, self.board.as_mut());
        }
    }

    /// Dispatch a read with its side effects but without a clock or hooks.
    fn read_raw(&mut self, addr: u16) -> u8 {
        match self.map.lookup(addr as usize) {
            NesRegion::Ram => self.ram[addr as usize & (RAM_SIZE - 1)],
            NesRegion::PpuRegs => self.ppu.read_register(addr, self.board.as_mut()),
            NesRegion::Io => match addr {
                // Bit 5 of $4015 is not driven.
                0x4015 => (self.apu.read_register(addr) & 0xDF) | (self.db & 0x20),
                0x4016 | 0x4017 => {
                    self.lagged = false;
                    let bit = self.input.read((addr - 0x4016) as usize);
                    (bit & 0x1F) | (self.db & 0xE0)
                }
                _ => self.db,
            },
            NesRegion::Expansion => self.board.read_exp(addr).unwrap_or(self.db),
            NesRegion::Wram => self.board.read_wram(addr).unwrap_or(self.db),
            NesRegion::Prg => self.board.read_prg(addr),
            NesRegion::Open => self.db,
        }
    }

    fn write_raw(&mut self, addr: u16, val: u8) {
        match self.map.lookup(addr as usize) {
            NesRegion::Ram => self.ram[addr as usize & (RAM_SIZE - 1)] = val,
            NesRegion::PpuRegs => self.ppu.write_register(addr, val, self.board.as_mut()),
            NesRegion::Io => match addr {
                0x4014 => self.scheduler.start_oam_dma(val),
                0x4016 => self.input.write_strobe(val),
                0x4000..=0x4013 | 0x4015 | 0x4017 => self.apu.write_register(addr, val),
                _ => log(LogCategory::Bus, LogLevel::Trace, || {
                    format!("write to unused I/O ${:04X} = {:02X}", addr, val)
                }),
            },
            NesRegion::Expansion => self.board.write_exp(addr, val),
            NesRegion::Wram => self.board.write_wram(addr, val),
            NesRegion::Prg => self.board.write_prg(addr, val),
            NesRegion::Open => {}
        }
    }

    /// Debug write into the address space. Never clocks.
    ///
    /// RAM and work RAM are stored directly and PPU registers take the raw
    /// value. ROM space gets a value override, since there is nothing to
    /// store into.
    pub fn poke(&mut self, addr: u16, val: u8) {
        match self.map.lookup(addr as usize) {
            NesRegion::Ram => self.ram[addr as usize & (RAM_SIZE - 1)] = val,
            NesRegion::PpuRegs => self.ppu.poke_register(addr, val, self.board.as_mut()),
            NesRegion::Io | NesRegion::Open => {}
            NesRegion::Wram if self.board.peek_wram(addr).is_some() => {
                self.board.core_mut().write_wram(addr, val)
            }
            NesRegion::Expansion | NesRegion::Wram | NesRegion::Prg => self.watches.insert(
                addr as u32,
                Watch {
                    value: val,
                    compare: None,
                },
            ),
        }
    }

    pub fn mirroring(&self) -> Mirroring {
        self.board.mirroring()
    }
}

impl Memory6502 for NesBus {
    fn read(&mut self, addr: u16) -> u8 {
        let real = self.read_raw(addr);
        let value = self.watches.apply(addr as u32, real);
        self.db = value;
        if !self.hooks.is_empty() {
            let event = self.event(addr, value);
            self.hooks.fire(HookKind::Read, event);
        }
        self.clock_cycle();
        value
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.db = val;
        if !self.hooks.is_empty() {
            let event = self.event(addr, val);
            self.hooks.fire(HookKind::Write, event);
        }
        self.write_raw(addr, val);
        self.clock_cycle();
    }

    fn peek(&self, addr: u16) -> u8 {
        let real = match self.map.lookup(addr as usize) {
            NesRegion::Ram => self.ram[addr as usize & (RAM_SIZE - 1)],
            NesRegion::PpuRegs => self.ppu.peek_register(addr),
            NesRegion::Io => match addr {
                0x4015 => (self.apu.peek_register(addr) & 0xDF) | (self.db & 0x20),
                0x4016 | 0x4017 => {
                    (self.input.peek((addr - 0x4016) as usize) & 0x1F) | (self.db & 0xE0)
                }
                _ => self.db,
            },
            NesRegion::Expansion => self.board.peek_exp(addr).unwrap_or(self.db),
            NesRegion::Wram => self.board.peek_wram(addr).unwrap_or(self.db),
            NesRegion::Prg => self.board.peek_prg(addr),
            NesRegion::Open => self.db,
        };
        self.watches.apply(addr as u32, real)
    }

    fn on_opcode_fetch(&mut self, pc: u16) {
        if !self.hooks.is_empty() {
            let value = self.peek(pc);
            let event = self.event(pc, value);
            self.hooks.fire(HookKind::Execute, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappers::{create_board, test_cart};
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    fn bus() -> NesBus {
        let settings = NesSettings::default();
        let board = create_board(test_cart(0, 2, 1), &settings).unwrap();
        NesBus::new(board, &settings, CompiledPalette::default()).unwrap()
    }

    #[test]
    fn map_is_exhaustive() {
        let map = nes_bus_map().unwrap();
        let ranges = map.ranges();
        assert_eq!(ranges.first().unwrap().0, 0);
        assert_eq!(ranges.last().unwrap().1, 0xFFFF);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].1 + 1, pair[1].0);
        }
        assert!(ranges.iter().all(|r| r.2 != NesRegion::Open));
        assert_eq!(map.resolve(0x4016).unwrap(), NesRegion::Io);
        assert!(map.resolve(0x10000).is_err());
    }

    #[test]
    fn ram_is_mirrored() {
        let mut b = bus();
        b.write(0x0002, 0x42);
        assert_eq!(b.read(0x0802), 0x42);
        assert_eq!(b.peek(0x1802), 0x42);
    }

    #[test]
    fn each_access_is_one_cycle() {
        let mut b = bus();
        b.read(0x8000);
        b.write(0x0000, 1);
        assert_eq!(b.scheduler().cpu_cycles(), 2);
        b.peek(0x8000);
        b.poke(0x0001, 2);
        assert_eq!(b.scheduler().cpu_cycles(), 2);
        assert_eq!(b.ppu().dot(), 6);
    }

    #[test]
    fn controller_read_merges_open_bus() {
        let mut b = bus();
        b.input.set_buttons([0x01, 0]);
        b.write(0x4016, 1);
        b.write(0x4016, 0);
        b.db = 0x40;
        b.lagged = true;
        // Data bus holds $40 from the high byte of the operand
        assert_eq!(b.read(0x4016), 0x41);
        assert!(!b.lagged);
        assert_eq!(b.peek(0x4016) & 0x1F, 0);
    }

    #[test]
    fn unmapped_io_returns_open_bus() {
        let mut b = bus();
        b.write(0x0000, 0x5C);
        assert_eq!(b.read(0x4018), 0x5C);
    }

    #[test]
    fn oam_dma_write_starts_transfer() {
        let mut b = bus();
        b.write(0x4014, 0x02);
        assert!(matches!(
            b.scheduler().state(),
            crate::scheduler::SchedulerState::TransferInFlight { page: 2, remaining: 514 }
        ));
        for i in 0..256u16 {
            b.ram[0x200 + i as usize] = i as u8;
        }
        b.finish_oam_dma(0x02);
        assert_eq!(b.ppu().oam()[0x10], 0x10);
        assert_eq!(b.ppu().oam()[0xFF], 0xFF);
    }

    #[test]
    fn poke_rom_installs_override() {
        let mut b = bus();
        let before = b.peek(0x8123);
        b.poke(0x8123, before.wrapping_add(1));
        assert_eq!(b.peek(0x8123), before.wrapping_add(1));
        assert_eq!(b.read(0x8123), before.wrapping_add(1));
        assert_eq!(b.board().peek_prg(0x8123), before);
    }

    #[test]
    fn hooks_see_accesses_with_cycle() {
        let mut b = bus();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        b.hooks_mut().add(HookKind::Write, Some(0x0010), move |e| {
            sink.lock().unwrap().push(e)
        });
        b.write(0x0011, 1);
        b.write(0x0010, 7);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].value, 7);
        assert_eq!(seen[0].cycle, 1);
    }

    #[test]
    fn wram_through_board() {
        let mut b = bus();
        b.write(0x6000, 0x99);
        assert_eq!(b.read(0x7FFF - 0x1FFF), 0x99);
        b.poke(0x6001, 0x12);
        assert_eq!(b.peek(0x6001), 0x12);
    }

    proptest! {
        #[test]
        fn peek_never_changes_state(addrs in proptest::collection::vec(any::<u16>(), 1..64)) {
            let mut b = bus();
            b.write(0x2000, 0x80);
            b.write(0x2006, 0x3F);
            let cycles = b.scheduler().cpu_cycles();
            let db = b.db;
            let ram = b.ram.clone();
            let status = b.ppu().peek_register(0x2002);
            for addr in addrs {
                b.peek(addr);
            }
            prop_assert_eq!(b.scheduler().cpu_cycles(), cycles);
            prop_assert_eq!(b.db, db);
            prop_assert_eq!(&b.ram, &ram);
            prop_assert_eq!(b.ppu().peek_register(0x2002), status);
        }

        #[test]
        fn every_address_resolves(addr in 0usize..0x10000) {
            let map = nes_bus_map().unwrap();
            prop_assert!(map.resolve(addr).is_ok());
        }
    }
}

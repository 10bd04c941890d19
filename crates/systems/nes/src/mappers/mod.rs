//! NES boards (cartridge mappers).
//!
//! Every board implements [`Board`], a flat set of capabilities with default
//! implementations: CPU-side PRG/WRAM/expansion access, PPU-side CHR access,
//! nametable mirroring, an A12 observer, a per-CPU-cycle clock, an IRQ output
//! and expansion audio. A board overrides only what its hardware has.
//!
//! Shared storage and bank windows live in [`BoardCore`]. Windows are derived
//! from the board's registers, so they are rebuilt after a state load instead
//! of being serialized.

mod axrom;
mod cnrom;
mod fme7;
mod mmc1;
mod mmc3;
mod nrom;
mod uxrom;

pub use axrom::Axrom;
pub use cnrom::Cnrom;
pub use fme7::Fme7;
pub use mmc1::Mmc1;
pub use mmc3::Mmc3;
pub use nrom::Nrom;
pub use uxrom::Uxrom;

use crate::cartridge::{Cartridge, Mirroring};
use crate::config::NesSettings;
use crate::NesError;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::state::{Serializer, StateError, SyncState};

/// Storage and bank windows shared by all boards.
#[derive(Debug, Clone)]
pub struct BoardCore {
    pub prg_rom: Vec<u8>,
    /// CHR ROM, or CHR RAM when `chr_is_ram`
    pub chr: Vec<u8>,
    pub chr_is_ram: bool,
    pub wram: Vec<u8>,
    pub mirroring: Mirroring,
    /// Byte offsets into `prg_rom` for the four 8 KB windows at $8000-$FFFF
    prg_map: [usize; 4],
    /// Byte offsets into `chr` for the eight 1 KB windows at $0000-$1FFF
    chr_map: [usize; 8],
}

impl BoardCore {
    pub fn new(cart: Cartridge) -> Self {
        let chr_is_ram = cart.chr_rom.is_empty();
        let chr = if chr_is_ram {
            vec![0; cart.chr_ram_size.max(0x2000)]
        } else {
            cart.chr_rom
        };
        let mut core = Self {
            prg_rom: cart.prg_rom,
            chr,
            chr_is_ram,
            wram: vec![0; cart.prg_ram_size],
            mirroring: cart.mirroring,
            prg_map: [0; 4],
            chr_map: [0; 8],
        };
        core.set_prg_32k(0);
        core.set_chr_8k(0);
        core
    }

    pub fn prg_banks_8k(&self) -> usize {
        (self.prg_rom.len() / 0x2000).max(1)
    }

    pub fn chr_banks_1k(&self) -> usize {
        (self.chr.len() / 0x0400).max(1)
    }

    /// Map 8 KB PRG bank `bank` (modulo the ROM size) into window `slot` (0-3).
    pub fn set_prg_8k(&mut self, slot: usize, bank: usize) {
        let bank = bank % self.prg_banks_8k();
        self.prg_map[slot & 3] = (bank * 0x2000) % self.prg_rom.len().max(1);
    }

    pub fn set_prg_16k(&mut self, slot: usize, bank: usize) {
        self.set_prg_8k(slot * 2, bank * 2);
        self.set_prg_8k(slot * 2 + 1, bank * 2 + 1);
    }

    pub fn set_prg_32k(&mut self, bank: usize) {
        for slot in 0..4 {
            self.set_prg_8k(slot, bank * 4 + slot);
        }
    }

    pub fn set_chr_1k(&mut self, slot: usize, bank: usize) {
        let bank = bank % self.chr_banks_1k();
        self.chr_map[slot & 7] = bank * 0x0400;
    }

    pub fn set_chr_2k(&mut self, slot: usize, bank: usize) {
        self.set_chr_1k(slot * 2, bank * 2);
        self.set_chr_1k(slot * 2 + 1, bank * 2 + 1);
    }

    pub fn set_chr_4k(&mut self, slot: usize, bank: usize) {
        for i in 0..4 {
            self.set_chr_1k(slot * 4 + i, bank * 4 + i);
        }
    }

    pub fn set_chr_8k(&mut self, bank: usize) {
        for i in 0..8 {
            self.set_chr_1k(i, bank * 8 + i);
        }
    }

    pub fn read_prg(&self, addr: u16) -> u8 {
        if self.prg_rom.is_empty() {
            return 0;
        }
        let slot = ((addr >> 13) & 3) as usize;
        let index = self.prg_map[slot] + (addr & 0x1FFF) as usize;
        self.prg_rom[index % self.prg_rom.len()]
    }

    pub fn read_chr(&self, addr: u16) -> u8 {
        let slot = ((addr >> 10) & 7) as usize;
        let index = self.chr_map[slot] + (addr & 0x03FF) as usize;
        self.chr.get(index).copied().unwrap_or(0)
    }

    pub fn write_chr(&mut self, addr: u16, val: u8) {
        if !self.chr_is_ram {
            return;
        }
        let slot = ((addr >> 10) & 7) as usize;
        let index = self.chr_map[slot] + (addr & 0x03FF) as usize;
        if let Some(byte) = self.chr.get_mut(index) {
            *byte = val;
        }
    }

    pub fn read_wram(&self, addr: u16) -> Option<u8> {
        if self.wram.is_empty() {
            return None;
        }
        Some(self.wram[(addr as usize - 0x6000) % self.wram.len()])
    }

    pub fn write_wram(&mut self, addr: u16, val: u8) {
        if self.wram.is_empty() {
            return;
        }
        let len = self.wram.len();
        self.wram[(addr as usize - 0x6000) % len] = val;
    }
}

impl SyncState for BoardCore {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        let mut mirroring = self.mirroring.to_u8();
        s.begin_section("Core")?;
        s.sync_u8("Mirroring", &mut mirroring)?;
        if self.chr_is_ram {
            s.sync_bytes("ChrRam", &mut self.chr)?;
        }
        s.sync_bytes("Wram", &mut self.wram)?;
        s.end_section("Core")?;
        if s.is_reader() {
            self.mirroring = Mirroring::from_u8(mirroring)
                .ok_or_else(|| StateError::InvalidValue("Core.Mirroring".into()))?;
        }
        Ok(())
    }
}

/// Cartridge hardware as seen from the CPU and PPU buses.
///
/// `read_*` calls are bus cycles and may have side effects; `peek_*` must not.
/// `read_wram`/`read_exp` return `None` where the board does not drive the
/// data bus, which the system bus turns into open bus.
pub trait Board: SyncState + Send {
    fn core(&self) -> &BoardCore;

    fn core_mut(&mut self) -> &mut BoardCore;

    fn mapper_number(&self) -> u16;

    fn name(&self) -> &'static str;

    /// CPU read in $8000-$FFFF
    fn read_prg(&mut self, addr: u16) -> u8 {
        self.peek_prg(addr)
    }

    fn peek_prg(&self, addr: u16) -> u8 {
        self.core().read_prg(addr)
    }

    /// CPU write in $8000-$FFFF (mapper registers)
    fn write_prg(&mut self, _addr: u16, _val: u8) {}

    /// CPU read in $6000-$7FFF
    fn read_wram(&mut self, addr: u16) -> Option<u8> {
        self.peek_wram(addr)
    }

    fn peek_wram(&self, addr: u16) -> Option<u8> {
        self.core().read_wram(addr)
    }

    fn write_wram(&mut self, addr: u16, val: u8) {
        self.core_mut().write_wram(addr, val);
    }

    /// CPU read in $4020-$5FFF
    fn read_exp(&mut self, addr: u16) -> Option<u8> {
        self.peek_exp(addr)
    }

    fn peek_exp(&self, _addr: u16) -> Option<u8> {
        None
    }

    fn write_exp(&mut self, _addr: u16, _val: u8) {}

    /// PPU read in $0000-$1FFF
    fn read_chr(&mut self, addr: u16) -> u8 {
        self.peek_chr(addr)
    }

    fn peek_chr(&self, addr: u16) -> u8 {
        self.core().read_chr(addr)
    }

    fn write_chr(&mut self, addr: u16, val: u8) {
        self.core_mut().write_chr(addr, val);
    }

    fn mirroring(&self) -> Mirroring {
        self.core().mirroring
    }

    /// Every address the PPU drives onto its bus (A12 observers).
    fn ppu_address(&mut self, _addr: u16) {}

    /// Called once per CPU cycle.
    fn clock_cpu(&mut self) {}

    /// IRQ output level
    fn irq_signal(&self) -> bool {
        false
    }

    /// Add expansion audio for the span being drained into `out`.
    fn mix_audio(&mut self, _out: &mut [i16]) {}

    /// Console reset button.
    fn soft_reset(&mut self) {}

    /// Rebuild bank windows from the register state.
    fn update_banks(&mut self) {}

    /// Fix-up after the board's registers were restored from a snapshot.
    fn post_load_state(&mut self) {
        self.update_banks();
    }
}

/// Instantiate the board named by the cartridge header.
pub fn create_board(cart: Cartridge, settings: &NesSettings) -> Result<Box<dyn Board>, NesError> {
    let mapper = cart.mapper;
    let board: Box<dyn Board> = match mapper {
        0 => Box::new(Nrom::new(cart)),
        1 => Box::new(Mmc1::new(cart)),
        2 => Box::new(Uxrom::new(cart)),
        3 => Box::new(Cnrom::new(cart)),
        4 => Box::new(Mmc3::new(cart)),
        7 => Box::new(Axrom::new(cart)),
        69 => Box::new(Fme7::new(cart, settings)),
        _ => return Err(NesError::UnsupportedMapper(mapper)),
    };
    log(LogCategory::Bus, LogLevel::Info, || {
        format!("board: mapper {} ({})", board.mapper_number(), board.name())
    });
    Ok(board)
}

#[cfg(test)]
pub(crate) fn test_cart(mapper: u16, prg_banks_16k: usize, chr_banks_8k: usize) -> Cartridge {
    // Each 1 KB of ROM is filled with its bank index so tests can see the mapping.
    let prg_rom = (0..prg_banks_16k * 0x4000)
        .map(|i| (i / 0x2000) as u8)
        .collect();
    let chr_rom = (0..chr_banks_8k * 0x2000)
        .map(|i| (i / 0x0400) as u8)
        .collect();
    Cartridge {
        prg_rom,
        chr_rom,
        mapper,
        mirroring: Mirroring::Horizontal,
        battery: false,
        prg_ram_size: 0x2000,
        chr_ram_size: if chr_banks_8k == 0 { 0x2000 } else { 0 },
    }
}

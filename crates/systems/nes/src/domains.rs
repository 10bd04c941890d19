//! Named memory regions for debuggers, cheat searches and scripting.
//!
//! Reads never have side effects. Writes store straight into the backing
//! memory and never advance time.

use crate::bus::{NesBus, RAM_SIZE};
use crate::NesError;
use emu_core::cpu_6502::Memory6502;
use emu_core::MemoryDomainInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Ram,
    /// The CPU address space through peek/poke
    SystemBus,
    Ciram,
    PaletteRam,
    Oam,
    PrgRom,
    Chr,
    Wram,
}

impl Domain {
    pub const ALL: [Domain; 8] = [
        Domain::Ram,
        Domain::SystemBus,
        Domain::Ciram,
        Domain::PaletteRam,
        Domain::Oam,
        Domain::PrgRom,
        Domain::Chr,
        Domain::Wram,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Domain::Ram => "RAM",
            Domain::SystemBus => "System Bus",
            Domain::Ciram => "CIRAM",
            Domain::PaletteRam => "PALRAM",
            Domain::Oam => "OAM",
            Domain::PrgRom => "PRG ROM",
            Domain::Chr => "CHR",
            Domain::Wram => "WRAM",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.name() == name)
    }

    fn size(self, bus: &NesBus) -> usize {
        match self {
            Domain::Ram => RAM_SIZE,
            Domain::SystemBus => 0x10000,
            Domain::Ciram => bus.ppu.ciram().len(),
            Domain::PaletteRam => bus.ppu.palette_ram().len(),
            Domain::Oam => bus.ppu.oam().len(),
            Domain::PrgRom => bus.board.core().prg_rom.len(),
            Domain::Chr => bus.board.core().chr.len(),
            Domain::Wram => bus.board.core().wram.len(),
        }
    }

    fn writable(self, bus: &NesBus) -> bool {
        match self {
            Domain::PrgRom => false,
            Domain::Chr => bus.board.core().chr_is_ram,
            _ => true,
        }
    }

    /// Present on this cartridge
    fn present(self, bus: &NesBus) -> bool {
        self != Domain::Wram || !bus.board.core().wram.is_empty()
    }
}

pub fn list(bus: &NesBus) -> Vec<MemoryDomainInfo> {
    Domain::ALL
        .iter()
        .filter(|d| d.present(bus))
        .map(|&d| MemoryDomainInfo {
            name: d.name().to_string(),
            size: d.size(bus),
            writable: d.writable(bus),
        })
        .collect()
}

fn resolve(bus: &NesBus, name: &str, addr: usize) -> Result<Domain, NesError> {
    let domain = Domain::from_name(name)
        .filter(|d| d.present(bus))
        .ok_or_else(|| NesError::UnknownDomain(name.to_string()))?;
    let size = domain.size(bus);
    if addr >= size {
        return Err(NesError::AddressOutOfRange {
            domain: domain.name(),
            addr,
            size,
        });
    }
    Ok(domain)
}

pub fn read(bus: &NesBus, name: &str, addr: usize) -> Result<u8, NesError> {
    let value = match resolve(bus, name, addr)? {
        Domain::Ram => bus.ram[addr],
        Domain::SystemBus => bus.peek(addr as u16),
        Domain::Ciram => bus.ppu.ciram()[addr],
        Domain::PaletteRam => bus.ppu.palette_ram()[addr],
        Domain::Oam => bus.ppu.oam()[addr],
        Domain::PrgRom => bus.board.core().prg_rom[addr],
        Domain::Chr => bus.board.core().chr[addr],
        Domain::Wram => bus.board.core().wram[addr],
    };
    Ok(value)
}

pub fn write(bus: &mut NesBus, name: &str, addr: usize, value: u8) -> Result<(), NesError> {
    let domain = resolve(bus, name, addr)?;
    match domain {
        Domain::Ram => bus.ram[addr] = value,
        Domain::SystemBus => bus.poke(addr as u16, value),
        Domain::Ciram => bus.ppu.ciram_mut()[addr] = value,
        Domain::PaletteRam => bus.ppu.palette_ram_mut()[addr] = value,
        Domain::Oam => bus.ppu.oam_mut()[addr] = value,
        Domain::PrgRom => return Err(NesError::ReadOnlyDomain(domain.name())),
        Domain::Chr if !domain.writable(bus) => {
            return Err(NesError::ReadOnlyDomain(domain.name()))
        }
        Domain::Chr => bus.board.core_mut().chr[addr] = value,
        Domain::Wram => bus.board.core_mut().wram[addr] = value,
    }
    Ok(())
}

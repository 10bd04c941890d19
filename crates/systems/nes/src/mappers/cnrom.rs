use super::{Board, BoardCore};
use crate::cartridge::Cartridge;
use emu_core::state::{Serializer, StateError, SyncState};

/// CNROM (Mapper 3) - Fixed PRG, switchable 8KB CHR bank.
#[derive(Debug)]
pub struct Cnrom {
    core: BoardCore,
    chr_bank: u8,
}

impl Cnrom {
    pub fn new(cart: Cartridge) -> Self {
        Self {
            core: BoardCore::new(cart),
            chr_bank: 0,
        }
    }
}

impl Board for Cnrom {
    fn core(&self) -> &BoardCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BoardCore {
        &mut self.core
    }

    fn mapper_number(&self) -> u16 {
        3
    }

    fn name(&self) -> &'static str {
        "CNROM"
    }

    fn write_prg(&mut self, _addr: u16, val: u8) {
        self.chr_bank = val & 0x03;
        self.update_banks();
    }

    fn update_banks(&mut self) {
        self.core.set_chr_8k(self.chr_bank as usize);
    }
}

impl SyncState for Cnrom {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("CNROM")?;
        s.sync_u8("ChrBank", &mut self.chr_bank)?;
        self.core.sync_state(s)?;
        s.end_section("CNROM")
    }
}

use super::{Board, BoardCore};
use crate::cartridge::Cartridge;
use emu_core::state::{Serializer, StateError, SyncState};

/// UxROM (Mapper 2) - Switchable 16KB bank at $8000, last bank fixed at $C000.
#[derive(Debug)]
pub struct Uxrom {
    core: BoardCore,
    bank: u8,
}

impl Uxrom {
    pub fn new(cart: Cartridge) -> Self {
        let mut m = Self {
            core: BoardCore::new(cart),
            bank: 0,
        };
        m.update_banks();
        m
    }
}

impl Board for Uxrom {
    fn core(&self) -> &BoardCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BoardCore {
        &mut self.core
    }

    fn mapper_number(&self) -> u16 {
        2
    }

    fn name(&self) -> &'static str {
        "UxROM"
    }

    fn write_prg(&mut self, _addr: u16, val: u8) {
        self.bank = val;
        self.update_banks();
    }

    fn update_banks(&mut self) {
        let last = self.core.prg_banks_8k() / 2 - 1;
        self.core.set_prg_16k(0, self.bank as usize);
        self.core.set_prg_16k(1, last);
    }
}

impl SyncState for Uxrom {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("UxROM")?;
        s.sync_u8("Bank", &mut self.bank)?;
        self.core.sync_state(s)?;
        s.end_section("UxROM")
    }
}

use super::{Board, BoardCore};
use crate::cartridge::{Cartridge, Mirroring};
use emu_core::state::{Serializer, StateError, SyncState};

/// AxROM (Mapper 7) - 32KB PRG switching with single-screen mirroring select.
#[derive(Debug)]
pub struct Axrom {
    core: BoardCore,
    reg: u8,
}

impl Axrom {
    pub fn new(cart: Cartridge) -> Self {
        let mut m = Self {
            core: BoardCore::new(cart),
            reg: 0,
        };
        m.update_banks();
        m
    }
}

impl Board for Axrom {
    fn core(&self) -> &BoardCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BoardCore {
        &mut self.core
    }

    fn mapper_number(&self) -> u16 {
        7
    }

    fn name(&self) -> &'static str {
        "AxROM"
    }

    fn write_prg(&mut self, _addr: u16, val: u8) {
        self.reg = val;
        self.update_banks();
    }

    fn update_banks(&mut self) {
        self.core.set_prg_32k((self.reg & 0x07) as usize);
        self.core.mirroring = if self.reg & 0x10 != 0 {
            Mirroring::SingleScreenUpper
        } else {
            Mirroring::SingleScreenLower
        };
    }
}

impl SyncState for Axrom {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("AxROM")?;
        s.sync_u8("Reg", &mut self.reg)?;
        self.core.sync_state(s)?;
        s.end_section("AxROM")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappers::test_cart;

    #[test]
    fn axrom_banks_and_mirroring() {
        let mut m = Axrom::new(test_cart(7, 8, 0));
        assert_eq!(m.mirroring(), Mirroring::SingleScreenLower);
        m.write_prg(0x8000, 0x12);
        assert_eq!(m.peek_prg(0x8000), 8);
        assert_eq!(m.peek_prg(0xE000), 11);
        assert_eq!(m.mirroring(), Mirroring::SingleScreenUpper);
    }
}

use super::{Board, BoardCore};
use crate::cartridge::{Cartridge, Mirroring};
use emu_core::state::{Serializer, StateError, SyncState};

/// Serial writes closer together than this are dropped by the chip, which
/// is what makes read-modify-write instructions only land one bit.
const MIN_WRITE_SPACING: u8 = 2;

/// MMC1 (Mapper 1/SxROM) - Serial-loaded PRG/CHR banking with configurable mirroring.
#[derive(Debug)]
pub struct Mmc1 {
    core: BoardCore,
    /// Load register; the marker bit reaching bit 0 means the fifth write completes it
    shift: u8,
    control: u8,
    chr_bank0: u8,
    chr_bank1: u8,
    prg_bank: u8,
    cycles_since_write: u8,
}

impl Mmc1 {
    pub fn new(cart: Cartridge) -> Self {
        let mut m = Self {
            core: BoardCore::new(cart),
            shift: 0x10,
            control: 0x0C,
            chr_bank0: 0,
            chr_bank1: 0,
            prg_bank: 0,
            cycles_since_write: u8::MAX,
        };
        m.update_banks();
        m
    }

    /// SUROM and friends select a 256 KB PRG half with CHR bank 0 bit 4.
    fn prg_outer(&self) -> usize {
        if self.core.prg_rom.len() > 0x40000 {
            (self.chr_bank0 & 0x10) as usize
        } else {
            0
        }
    }

    fn wram_enabled(&self) -> bool {
        self.prg_bank & 0x10 == 0
    }

    fn commit(&mut self, addr: u16, data: u8) {
        match (addr >> 13) & 0x03 {
            0 => self.control = data,
            1 => self.chr_bank0 = data,
            2 => self.chr_bank1 = data,
            _ => self.prg_bank = data,
        }
        self.update_banks();
    }
}

impl Board for Mmc1 {
    fn core(&self) -> &BoardCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BoardCore {
        &mut self.core
    }

    fn mapper_number(&self) -> u16 {
        1
    }

    fn name(&self) -> &'static str {
        "MMC1"
    }

    fn write_prg(&mut self, addr: u16, val: u8) {
        let spacing = self.cycles_since_write;
        self.cycles_since_write = 0;
        if spacing < MIN_WRITE_SPACING {
            return;
        }

        if val & 0x80 != 0 {
            self.shift = 0x10;
            self.control |= 0x0C;
            self.update_banks();
            return;
        }

        let complete = self.shift & 1 != 0;
        self.shift = (self.shift >> 1) | ((val & 1) << 4);
        if complete {
            let data = self.shift & 0x1F;
            self.shift = 0x10;
            self.commit(addr, data);
        }
    }

    fn read_wram(&mut self, addr: u16) -> Option<u8> {
        self.peek_wram(addr)
    }

    fn peek_wram(&self, addr: u16) -> Option<u8> {
        if self.wram_enabled() {
            self.core.read_wram(addr)
        } else {
            None
        }
    }

    fn write_wram(&mut self, addr: u16, val: u8) {
        if self.wram_enabled() {
            self.core.write_wram(addr, val);
        }
    }

    fn clock_cpu(&mut self) {
        self.cycles_since_write = self.cycles_since_write.saturating_add(1);
    }

    fn update_banks(&mut self) {
        let outer = self.prg_outer();
        let select = (self.prg_bank & 0x0F) as usize;
        match (self.control >> 2) & 0x03 {
            0 | 1 => {
                let even = select & 0x0E;
                self.core.set_prg_16k(0, outer | even);
                self.core.set_prg_16k(1, outer | even | 1);
            }
            2 => {
                self.core.set_prg_16k(0, outer);
                self.core.set_prg_16k(1, outer | select);
            }
            _ => {
                self.core.set_prg_16k(0, outer | select);
                self.core.set_prg_16k(1, outer | 0x0F);
            }
        }

        if self.control & 0x10 == 0 {
            let bank = (self.chr_bank0 & 0x1E) as usize;
            self.core.set_chr_4k(0, bank);
            self.core.set_chr_4k(1, bank | 1);
        } else {
            self.core.set_chr_4k(0, self.chr_bank0 as usize);
            self.core.set_chr_4k(1, self.chr_bank1 as usize);
        }

        self.core.mirroring = match self.control & 0x03 {
            0 => Mirroring::SingleScreenLower,
            1 => Mirroring::SingleScreenUpper,
            2 => Mirroring::Vertical,
            _ => Mirroring::Horizontal,
        };
    }
}

impl SyncState for Mmc1 {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("MMC1")?;
        s.sync_u8("Shift", &mut self.shift)?;
        s.sync_u8("Control", &mut self.control)?;
        s.sync_u8("ChrBank0", &mut self.chr_bank0)?;
        s.sync_u8("ChrBank1", &mut self.chr_bank1)?;
        s.sync_u8("PrgBank", &mut self.prg_bank)?;
        s.sync_u8("CyclesSinceWrite", &mut self.cycles_since_write)?;
        self.core.sync_state(s)?;
        s.end_section("MMC1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::state::StateFormat;

    use crate::mappers::test_cart;

    /// Five spaced serial writes, LSB first.
    fn load(m: &mut Mmc1, addr: u16, value: u8) {
        for i in 0..5 {
            m.write_prg(addr, (value >> i) & 1);
            m.clock_cpu();
            m.clock_cpu();
        }
    }

    #[test]
    fn power_on_fixes_last_bank() {
        let m = Mmc1::new(test_cart(1, 8, 2));
        assert_eq!(m.peek_prg(0x8000), 0);
        assert_eq!(m.peek_prg(0xC000), 14);
        assert_eq!(m.mirroring(), Mirroring::SingleScreenLower);
    }

    #[test]
    fn serial_load_switches_prg() {
        let mut m = Mmc1::new(test_cart(1, 8, 2));
        load(&mut m, 0xE000, 3);
        assert_eq!(m.peek_prg(0x8000), 6);
        assert_eq!(m.peek_prg(0xC000), 14);

        // Fix first bank, switch $C000
        load(&mut m, 0x8000, 0x08 | 0x02);
        assert_eq!(m.peek_prg(0x8000), 0);
        assert_eq!(m.peek_prg(0xC000), 6);
        assert_eq!(m.mirroring(), Mirroring::Vertical);
    }

    #[test]
    fn chr_4k_mode() {
        let mut m = Mmc1::new(test_cart(1, 8, 2));
        load(&mut m, 0x8000, 0x10 | 0x0C);
        load(&mut m, 0xA000, 1);
        load(&mut m, 0xC000, 2);
        assert_eq!(m.peek_chr(0x0000), 4);
        assert_eq!(m.peek_chr(0x1000), 8);
    }

    #[test]
    fn consecutive_cycle_writes_are_ignored() {
        let mut m = Mmc1::new(test_cart(1, 8, 2));
        m.write_prg(0xE000, 1);
        m.clock_cpu();
        // Second write of a read-modify-write lands one cycle later
        m.write_prg(0xE000, 1);
        m.clock_cpu();
        m.clock_cpu();
        for _ in 0..4 {
            m.write_prg(0xE000, 0);
            m.clock_cpu();
            m.clock_cpu();
        }
        // Only five writes counted: value 0b00001
        assert_eq!(m.peek_prg(0x8000), 2);
    }

    #[test]
    fn reset_bit_restores_fixed_last_mode() {
        let mut m = Mmc1::new(test_cart(1, 8, 2));
        load(&mut m, 0x8000, 0x08);
        m.write_prg(0x8000, 0x80);
        m.clock_cpu();
        m.clock_cpu();
        assert_eq!(m.peek_prg(0xC000), 14);
    }

    #[test]
    fn wram_disable_bit() {
        let mut m = Mmc1::new(test_cart(1, 8, 2));
        m.write_wram(0x6000, 0x42);
        assert_eq!(m.peek_wram(0x6000), Some(0x42));
        load(&mut m, 0xE000, 0x10);
        assert_eq!(m.peek_wram(0x6000), None);
    }

    #[test]
    fn state_round_trip_restores_banks() {
        let mut m = Mmc1::new(test_cart(1, 8, 2));
        load(&mut m, 0xE000, 5);
        let mut s = Serializer::writer(StateFormat::Binary, "nes", 1);
        m.sync_state(&mut s).unwrap();
        let bytes = s.into_bytes().unwrap();

        let mut restored = Mmc1::new(test_cart(1, 8, 2));
        let mut r = Serializer::binary_reader(&bytes, "nes", 1).unwrap();
        restored.sync_state(&mut r).unwrap();
        r.finish().unwrap();
        restored.post_load_state();
        assert_eq!(restored.peek_prg(0x8000), 10);
    }
}

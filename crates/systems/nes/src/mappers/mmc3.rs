use super::{Board, BoardCore};
use crate::cartridge::{Cartridge, Mirroring};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::state::{Serializer, StateError, SyncState};

/// A12 must stay low this many CPU cycles before a rise clocks the counter.
const A12_LOW_CYCLES: u64 = 3;

/// MMC3 (Mapper 4/TxROM) - 8KB PRG and 1/2KB CHR banking with a scanline IRQ.
///
/// The IRQ counter is clocked by filtered rising edges of PPU A12, which the
/// PPU reports through [`Board::ppu_address`] on every pattern fetch.
#[derive(Debug)]
pub struct Mmc3 {
    core: BoardCore,
    four_screen: bool,
    bank_select: u8,
    /// R0-R7
    regs: [u8; 8],
    wram_control: u8,
    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq_pending: bool,
    a12_high: bool,
    a12_low_since: u64,
    cpu_cycle: u64,
}

impl Mmc3 {
    pub fn new(cart: Cartridge) -> Self {
        let four_screen = cart.mirroring == Mirroring::FourScreen;
        let mut m = Self {
            core: BoardCore::new(cart),
            four_screen,
            bank_select: 0,
            regs: [0, 2, 4, 5, 6, 7, 0, 1],
            wram_control: 0x80,
            irq_latch: 0,
            irq_counter: 0,
            irq_reload: false,
            irq_enabled: false,
            irq_pending: false,
            a12_high: false,
            a12_low_since: 0,
            cpu_cycle: 0,
        };
        if four_screen {
            // The board carries the extra 2 KB of nametable RAM.
            log(LogCategory::Bus, LogLevel::Debug, || {
                "MMC3: four-screen nametables".to_string()
            });
        }
        m.update_banks();
        m
    }

    fn clock_irq_counter(&mut self) {
        if self.irq_counter == 0 || self.irq_reload {
            self.irq_counter = self.irq_latch;
            self.irq_reload = false;
        } else {
            self.irq_counter -= 1;
        }
        if self.irq_counter == 0 && self.irq_enabled {
            self.irq_pending = true;
        }
    }
}

impl Board for Mmc3 {
    fn core(&self) -> &BoardCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BoardCore {
        &mut self.core
    }

    fn mapper_number(&self) -> u16 {
        4
    }

    fn name(&self) -> &'static str {
        "MMC3"
    }

    fn write_prg(&mut self, addr: u16, val: u8) {
        let even = addr & 1 == 0;
        match (addr & 0xE000, even) {
            (0x8000, true) => {
                self.bank_select = val;
                self.update_banks();
            }
            (0x8000, false) => {
                self.regs[(self.bank_select & 0x07) as usize] = val;
                self.update_banks();
            }
            (0xA000, true) => {
                if !self.four_screen {
                    self.core.mirroring = if val & 1 == 0 {
                        Mirroring::Vertical
                    } else {
                        Mirroring::Horizontal
                    };
                }
            }
            (0xA000, false) => self.wram_control = val,
            (0xC000, true) => self.irq_latch = val,
            (0xC000, false) => {
                self.irq_counter = 0;
                self.irq_reload = true;
            }
            (0xE000, true) => {
                self.irq_enabled = false;
                self.irq_pending = false;
            }
            (0xE000, false) => self.irq_enabled = true,
            _ => {}
        }
    }

    fn read_wram(&mut self, addr: u16) -> Option<u8> {
        self.peek_wram(addr)
    }

    fn peek_wram(&self, addr: u16) -> Option<u8> {
        if self.wram_control & 0x80 != 0 {
            self.core.read_wram(addr)
        } else {
            None
        }
    }

    fn write_wram(&mut self, addr: u16, val: u8) {
        if self.wram_control & 0xC0 == 0x80 {
            self.core.write_wram(addr, val);
        }
    }

    fn ppu_address(&mut self, addr: u16) {
        let a12 = addr & 0x1000 != 0;
        if a12 && !self.a12_high {
            if self.cpu_cycle.wrapping_sub(self.a12_low_since) >= A12_LOW_CYCLES {
                self.clock_irq_counter();
            }
        } else if !a12 && self.a12_high {
            self.a12_low_since = self.cpu_cycle;
        }
        self.a12_high = a12;
    }

    fn clock_cpu(&mut self) {
        self.cpu_cycle += 1;
    }

    fn irq_signal(&self) -> bool {
        self.irq_pending
    }

    fn update_banks(&mut self) {
        let second_last = self.core.prg_banks_8k().saturating_sub(2);
        let r6 = (self.regs[6] & 0x3F) as usize;
        let r7 = (self.regs[7] & 0x3F) as usize;
        if self.bank_select & 0x40 == 0 {
            self.core.set_prg_8k(0, r6);
            self.core.set_prg_8k(2, second_last);
        } else {
            self.core.set_prg_8k(0, second_last);
            self.core.set_prg_8k(2, r6);
        }
        self.core.set_prg_8k(1, r7);
        self.core.set_prg_8k(3, second_last + 1);

        // Inversion swaps the 2 KB and 1 KB halves of the pattern space.
        let (two_k, one_k) = if self.bank_select & 0x80 == 0 {
            (0, 4)
        } else {
            (4, 0)
        };
        for i in 0..2 {
            let bank = (self.regs[i] & 0xFE) as usize;
            self.core.set_chr_1k(two_k + i * 2, bank);
            self.core.set_chr_1k(two_k + i * 2 + 1, bank | 1);
        }
        for i in 0..4 {
            self.core.set_chr_1k(one_k + i, self.regs[2 + i] as usize);
        }
    }
}

impl SyncState for Mmc3 {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("MMC3")?;
        s.sync_u8("BankSelect", &mut self.bank_select)?;
        s.sync_bytes("Regs", &mut self.regs)?;
        s.sync_u8("WramControl", &mut self.wram_control)?;
        s.sync_u8("IrqLatch", &mut self.irq_latch)?;
        s.sync_u8("IrqCounter", &mut self.irq_counter)?;
        s.sync_bool("IrqReload", &mut self.irq_reload)?;
        s.sync_bool("IrqEnabled", &mut self.irq_enabled)?;
        s.sync_bool("IrqPending", &mut self.irq_pending)?;
        s.sync_bool("A12High", &mut self.a12_high)?;
        s.sync_u64("A12LowSince", &mut self.a12_low_since)?;
        s.sync_u64("CpuCycle", &mut self.cpu_cycle)?;
        self.core.sync_state(s)?;
        s.end_section("MMC3")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappers::test_cart;

    /// One scanline worth of A12 activity: low for a while, then a rise.
    fn scanline(m: &mut Mmc3) {
        m.ppu_address(0x0000);
        for _ in 0..100 {
            m.clock_cpu();
        }
        m.ppu_address(0x1000);
        for _ in 0..10 {
            m.clock_cpu();
        }
    }

    #[test]
    fn prg_modes() {
        let mut m = Mmc3::new(test_cart(4, 8, 8));
        m.write_prg(0x8000, 6);
        m.write_prg(0x8001, 3);
        m.write_prg(0x8000, 7);
        m.write_prg(0x8001, 5);
        assert_eq!(m.peek_prg(0x8000), 3);
        assert_eq!(m.peek_prg(0xA000), 5);
        assert_eq!(m.peek_prg(0xC000), 14);
        assert_eq!(m.peek_prg(0xE000), 15);

        m.write_prg(0x8000, 0x40);
        assert_eq!(m.peek_prg(0x8000), 14);
        assert_eq!(m.peek_prg(0xC000), 3);
        assert_eq!(m.peek_prg(0xE000), 15);
    }

    #[test]
    fn chr_inversion() {
        let mut m = Mmc3::new(test_cart(4, 8, 8));
        m.write_prg(0x8000, 0);
        m.write_prg(0x8001, 9);
        m.write_prg(0x8000, 2);
        m.write_prg(0x8001, 20);
        assert_eq!(m.peek_chr(0x0000), 8);
        assert_eq!(m.peek_chr(0x0400), 9);
        assert_eq!(m.peek_chr(0x1000), 20);

        m.write_prg(0x8000, 0x80);
        assert_eq!(m.peek_chr(0x1000), 8);
        assert_eq!(m.peek_chr(0x0000), 20);
    }

    #[test]
    fn mirroring_register() {
        let mut m = Mmc3::new(test_cart(4, 8, 8));
        m.write_prg(0xA000, 0);
        assert_eq!(m.mirroring(), Mirroring::Vertical);
        m.write_prg(0xA000, 1);
        assert_eq!(m.mirroring(), Mirroring::Horizontal);
    }

    #[test]
    fn irq_after_latch_plus_one_lines() {
        let mut m = Mmc3::new(test_cart(4, 8, 8));
        m.write_prg(0xC000, 2);
        m.write_prg(0xC001, 0);
        m.write_prg(0xE001, 0);
        scanline(&mut m); // reload to 2
        assert!(!m.irq_signal());
        scanline(&mut m); // 1
        assert!(!m.irq_signal());
        scanline(&mut m); // 0
        assert!(m.irq_signal());

        m.write_prg(0xE000, 0);
        assert!(!m.irq_signal());
    }

    #[test]
    fn a12_rises_close_together_are_filtered() {
        let mut m = Mmc3::new(test_cart(4, 8, 8));
        m.write_prg(0xC000, 5);
        m.write_prg(0xC001, 0);
        scanline(&mut m);
        assert_eq!(m.irq_counter, 5);
        // Low for a single cycle between sprite fetches
        m.ppu_address(0x0000);
        m.clock_cpu();
        m.ppu_address(0x1000);
        assert_eq!(m.irq_counter, 5);
    }

    #[test]
    fn wram_protect() {
        let mut m = Mmc3::new(test_cart(4, 8, 8));
        m.write_wram(0x6000, 0x11);
        m.write_prg(0xA001, 0xC0);
        m.write_wram(0x6000, 0x22);
        assert_eq!(m.peek_wram(0x6000), Some(0x11));
        m.write_prg(0xA001, 0x00);
        assert_eq!(m.peek_wram(0x6000), None);
    }
}

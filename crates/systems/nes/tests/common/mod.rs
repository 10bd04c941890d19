//! Hand-assembled test cartridges.

#![allow(dead_code)]

use emu_nes::{NesSettings, NesSystem};
use sha2::{Digest, Sha256};

/// Minimal 6502 assembler for building PRG images in tests.
pub struct Asm {
    origin: u16,
    code: Vec<u8>,
}

impl Asm {
    pub fn new(origin: u16) -> Self {
        Self {
            origin,
            code: Vec::new(),
        }
    }

    pub fn pc(&self) -> u16 {
        self.origin + self.code.len() as u16
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    fn abs(&mut self, opcode: u8, addr: u16) -> &mut Self {
        self.bytes(&[opcode, addr as u8, (addr >> 8) as u8])
    }

    pub fn lda_imm(&mut self, v: u8) -> &mut Self {
        self.bytes(&[0xA9, v])
    }

    pub fn ldx_imm(&mut self, v: u8) -> &mut Self {
        self.bytes(&[0xA2, v])
    }

    pub fn ldy_imm(&mut self, v: u8) -> &mut Self {
        self.bytes(&[0xA0, v])
    }

    pub fn lda(&mut self, addr: u16) -> &mut Self {
        self.abs(0xAD, addr)
    }

    pub fn sta(&mut self, addr: u16) -> &mut Self {
        self.abs(0x8D, addr)
    }

    pub fn sta_x(&mut self, addr: u16) -> &mut Self {
        self.abs(0x9D, addr)
    }

    pub fn stx(&mut self, addr: u16) -> &mut Self {
        self.abs(0x8E, addr)
    }

    pub fn inc(&mut self, addr: u16) -> &mut Self {
        self.abs(0xEE, addr)
    }

    pub fn bit(&mut self, addr: u16) -> &mut Self {
        self.abs(0x2C, addr)
    }

    pub fn jmp(&mut self, addr: u16) -> &mut Self {
        self.abs(0x4C, addr)
    }

    pub fn and_imm(&mut self, v: u8) -> &mut Self {
        self.bytes(&[0x29, v])
    }

    pub fn cpx_imm(&mut self, v: u8) -> &mut Self {
        self.bytes(&[0xE0, v])
    }

    /// Relative branch to an address already emitted.
    pub fn branch(&mut self, opcode: u8, target: u16) -> &mut Self {
        let next = self.pc().wrapping_add(2);
        let offset = target.wrapping_sub(next) as i16;
        assert!((-128..=127).contains(&offset), "branch out of range");
        self.bytes(&[opcode, offset as i8 as u8])
    }

    /// Forward branch; resolve with [`Asm::land`].
    pub fn branch_forward(&mut self, opcode: u8) -> usize {
        self.bytes(&[opcode, 0]);
        self.code.len() - 1
    }

    pub fn land(&mut self, patch: usize) {
        let offset = self.code.len() - (patch + 1);
        assert!(offset <= 127, "branch out of range");
        self.code[patch] = offset as u8;
    }

    pub fn finish(&self) -> Vec<u8> {
        self.code.clone()
    }
}

pub const BPL: u8 = 0x10;
pub const BNE: u8 = 0xD0;
pub const BEQ: u8 = 0xF0;

/// Place `code` at $8000 of a 32 KB PRG image with all three vectors set.
pub fn prg_image(code: &[u8], reset: u16, nmi: u16, irq: u16) -> Vec<u8> {
    let mut prg = vec![0xEA; 0x8000];
    prg[..code.len()].copy_from_slice(code);
    for (offset, vector) in [(0x7FFA, nmi), (0x7FFC, reset), (0x7FFE, irq)] {
        prg[offset] = vector as u8;
        prg[offset + 1] = (vector >> 8) as u8;
    }
    prg
}

/// iNES NROM-256 wrapper with one 8 KB CHR ROM bank.
pub fn ines(prg: &[u8]) -> Vec<u8> {
    let mut rom = b"NES\x1A".to_vec();
    rom.extend_from_slice(&[2, 1, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    rom.extend_from_slice(prg);
    rom.extend((0..0x2000u32).map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8));
    rom
}

/// A program that exercises PPU, APU, OAM DMA and the controller port.
///
/// The NMI handler polls the pad only on odd frames, so lag frames alternate.
/// The image starts with `EOR $AA,X` (`55 AA`).
pub fn demo_prg() -> Vec<u8> {
    let mut a = Asm::new(0x8000);
    a.bytes(&[0x55, 0xAA]);
    let reset = 0x8000;
    a.bytes(&[0x78, 0xD8]); // SEI, CLD
    a.ldx_imm(0xFF).bytes(&[0x9A, 0xE8]); // TXS, INX
    a.stx(0x2000).stx(0x2001);
    for _ in 0..2 {
        let wait = a.pc();
        a.bit(0x2002).branch(BPL, wait);
    }

    // Palette
    a.lda_imm(0x3F).sta(0x2006).lda_imm(0x00).sta(0x2006);
    a.ldx_imm(0);
    let pal = a.pc();
    a.bytes(&[0x8A]).sta(0x2007).bytes(&[0xE8]); // TXA, STA, INX
    a.cpx_imm(0x20).branch(BNE, pal);

    // Nametable 0 with a tile ramp
    a.lda_imm(0x20).sta(0x2006).lda_imm(0x00).sta(0x2006);
    a.ldy_imm(4).ldx_imm(0);
    let nt = a.pc();
    a.bytes(&[0x8A]).sta(0x2007).bytes(&[0xE8]);
    a.branch(BNE, nt);
    a.bytes(&[0x88]); // DEY
    a.branch(BNE, nt);

    // Sprite page
    a.ldx_imm(0);
    let spr = a.pc();
    a.bytes(&[0x8A]).sta_x(0x0200).bytes(&[0xE8]);
    a.branch(BNE, spr);

    // Pulse 1 tone
    a.lda_imm(0x01).sta(0x4015);
    a.lda_imm(0xBF).sta(0x4000);
    a.lda_imm(0x40).sta(0x4002);
    a.lda_imm(0x02).sta(0x4003);

    a.lda_imm(0x80).sta(0x2000);
    a.lda_imm(0x1E).sta(0x2001);
    let main = a.pc();
    a.inc(0x0010).jmp(main);

    let nmi = a.pc();
    a.bytes(&[0x48]); // PHA
    a.inc(0x0011);
    a.lda_imm(0x02).sta(0x4014);
    a.lda(0x0011).sta(0x2005).lda_imm(0x00).sta(0x2005);
    a.lda(0x0011).and_imm(0x01);
    let skip = a.branch_forward(BEQ);
    a.lda_imm(0x01).sta(0x4016).lda_imm(0x00).sta(0x4016);
    a.lda(0x4016).and_imm(0x01);
    let released = a.branch_forward(BEQ);
    a.inc(0x0012);
    a.land(released);
    a.land(skip);
    a.bytes(&[0x68, 0x40]); // PLA, RTI

    let irq = a.pc();
    a.bytes(&[0x40]);

    prg_image(&a.finish(), reset, nmi, irq)
}

/// Raw 32 KB image starting with `55 AA`: enables NMI, then spins while the
/// NMI handler counts frames in $11.
pub fn counter_prg() -> Vec<u8> {
    let mut a = Asm::new(0x8000);
    a.bytes(&[0x55, 0xAA]);
    a.bytes(&[0x78, 0xD8]); // SEI, CLD
    a.ldx_imm(0xFF).bytes(&[0x9A]); // TXS
    a.lda_imm(0x80).sta(0x2000);
    let main = a.pc();
    a.jmp(main);
    let nmi = a.pc();
    a.inc(0x0011).bytes(&[0x40]);
    let irq = a.pc();
    a.bytes(&[0x40]);
    prg_image(&a.finish(), 0x8000, nmi, irq)
}

pub fn demo_system() -> NesSystem {
    NesSystem::new(&ines(&demo_prg()), NesSettings::default()).expect("demo ROM loads")
}

fn hash_registers_and_ram(hasher: &mut Sha256, nes: &NesSystem) {
    use emu_core::System;

    for (name, value) in nes.registers() {
        hasher.update(name.as_bytes());
        hasher.update(value.to_le_bytes());
    }
    for addr in 0..0x800 {
        hasher.update([nes.read_memory_domain("RAM", addr).unwrap()]);
    }
}

/// Digest of the CPU registers and work RAM.
pub fn register_ram_checksum(nes: &NesSystem) -> String {
    let mut hasher = Sha256::new();
    hash_registers_and_ram(&mut hasher, nes);
    format!("{:x}", hasher.finalize())
}

/// Digest of everything a frame-by-frame comparison cares about.
pub fn checksum(nes: &NesSystem) -> String {
    use emu_core::System;

    let mut hasher = Sha256::new();
    hash_registers_and_ram(&mut hasher, nes);
    for pixel in &nes.frame_buffer().pixels {
        hasher.update(pixel.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

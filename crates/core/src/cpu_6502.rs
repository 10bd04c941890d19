//! MOS 6502 CPU core implementation
//!
//! This module provides a reusable, generic 6502 CPU implementation that can be used
//! by any system by implementing the `Memory6502` trait.
//!
//! The core is cycle exact at the bus level: every cycle of every instruction
//! performs exactly one `read` or `write`, including the dummy accesses real
//! hardware makes (page-cross fix-ups, read-modify-write double writes,
//! stack pre-reads). Systems clock their other chips from inside those
//! callbacks, so peripherals observe accesses at the correct cycle.
//!
//! Decimal mode is not implemented; the flag is stored but ADC/SBC are binary,
//! as on the Ricoh 2A03. Stable undocumented opcodes (LAX, SAX, DCP, ISC, SLO,
//! RLA, SRE, RRA, ANC, ALR, ARR, AXS and the NOP variants) are supported. The
//! JAM family and the unstable store/transfer opcodes stop the CPU with
//! [`CpuError::IllegalOpcode`].

use crate::logging::{log, LogCategory, LogLevel};
use crate::state::{Serializer, StateError, SyncState};
use crate::{Cpu, CpuError};

/// Memory interface trait for the 6502 CPU
///
/// Systems using the 6502 must implement this trait to provide memory access.
/// `read` and `write` are bus cycles and may have side effects; `peek` must not.
pub trait Memory6502 {
    /// Read a byte from memory at the given address (one bus cycle)
    fn read(&mut self, addr: u16) -> u8;

    /// Write a byte to memory at the given address (one bus cycle)
    fn write(&mut self, addr: u16, val: u8);

    /// Side-effect free read used for vectors at power-on and debuggers
    fn peek(&self, addr: u16) -> u8;

    /// Called before the opcode fetch of every instruction
    fn on_opcode_fetch(&mut self, _pc: u16) {}
}

pub const FLAG_C: u8 = 0x01;
pub const FLAG_Z: u8 = 0x02;
pub const FLAG_I: u8 = 0x04;
pub const FLAG_D: u8 = 0x08;
pub const FLAG_B: u8 = 0x10;
pub const FLAG_U: u8 = 0x20;
pub const FLAG_V: u8 = 0x40;
pub const FLAG_N: u8 = 0x80;

const NMI_VECTOR: u16 = 0xFFFA;
const RESET_VECTOR: u16 = 0xFFFC;
const IRQ_VECTOR: u16 = 0xFFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Imp,
    Acc,
    Imm,
    Zp,
    Zpx,
    Zpy,
    Abs,
    Abx,
    Aby,
    Izx,
    Izy,
    Rel,
    Ind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs, Clc,
    Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Jmp,
    Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp, Rol, Ror, Rti,
    Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay, Tsx, Txa, Txs, Tya,
    // Stable undocumented opcodes
    Alr, Anc, Arr, Axs, Dcp, Isc, Lax, Rla, Rra, Sax, Slo, Sre,
    Illegal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

use Mode::*;
use Op::*;

#[rustfmt::skip]
const OPCODES: [(Op, Mode); 256] = [
    // 0x00
    (Brk, Imp), (Ora, Izx), (Illegal, Imp), (Slo, Izx), (Nop, Zp), (Ora, Zp), (Asl, Zp), (Slo, Zp),
    (Php, Imp), (Ora, Imm), (Asl, Acc), (Anc, Imm), (Nop, Abs), (Ora, Abs), (Asl, Abs), (Slo, Abs),
    // 0x10
    (Bpl, Rel), (Ora, Izy), (Illegal, Imp), (Slo, Izy), (Nop, Zpx), (Ora, Zpx), (Asl, Zpx), (Slo, Zpx),
    (Clc, Imp), (Ora, Aby), (Nop, Imp), (Slo, Aby), (Nop, Abx), (Ora, Abx), (Asl, Abx), (Slo, Abx),
    // 0x20
    (Jsr, Abs), (And, Izx), (Illegal, Imp), (Rla, Izx), (Bit, Zp), (And, Zp), (Rol, Zp), (Rla, Zp),
    (Plp, Imp), (And, Imm), (Rol, Acc), (Anc, Imm), (Bit, Abs), (And, Abs), (Rol, Abs), (Rla, Abs),
    // 0x30
    (Bmi, Rel), (And, Izy), (Illegal, Imp), (Rla, Izy), (Nop, Zpx), (And, Zpx), (Rol, Zpx), (Rla, Zpx),
    (Sec, Imp), (And, Aby), (Nop, Imp), (Rla, Aby), (Nop, Abx), (And, Abx), (Rol, Abx), (Rla, Abx),
    // 0x40
    (Rti, Imp), (Eor, Izx), (Illegal, Imp), (Sre, Izx), (Nop, Zp), (Eor, Zp), (Lsr, Zp), (Sre, Zp),
    (Pha, Imp), (Eor, Imm), (Lsr, Acc), (Alr, Imm), (Jmp, Abs), (Eor, Abs), (Lsr, Abs), (Sre, Abs),
    // 0x50
    (Bvc, Rel), (Eor, Izy), (Illegal, Imp), (Sre, Izy), (Nop, Zpx), (Eor, Zpx), (Lsr, Zpx), (Sre, Zpx),
    (Cli, Imp), (Eor, Aby), (Nop, Imp), (Sre, Aby), (Nop, Abx), (Eor, Abx), (Lsr, Abx), (Sre, Abx),
    // 0x60
    (Rts, Imp), (Adc, Izx), (Illegal, Imp), (Rra, Izx), (Nop, Zp), (Adc, Zp), (Ror, Zp), (Rra, Zp),
    (Pla, Imp), (Adc, Imm), (Ror, Acc), (Arr, Imm), (Jmp, Ind), (Adc, Abs), (Ror, Abs), (Rra, Abs),
    // 0x70
    (Bvs, Rel), (Adc, Izy), (Illegal, Imp), (Rra, Izy), (Nop, Zpx), (Adc, Zpx), (Ror, Zpx), (Rra, Zpx),
    (Sei, Imp), (Adc, Aby), (Nop, Imp), (Rra, Aby), (Nop, Abx), (Adc, Abx), (Ror, Abx), (Rra, Abx),
    // 0x80
    (Nop, Imm), (Sta, Izx), (Nop, Imm), (Sax, Izx), (Sty, Zp), (Sta, Zp), (Stx, Zp), (Sax, Zp),
    (Dey, Imp), (Nop, Imm), (Txa, Imp), (Illegal, Imm), (Sty, Abs), (Sta, Abs), (Stx, Abs), (Sax, Abs),
    // 0x90
    (Bcc, Rel), (Sta, Izy), (Illegal, Imp), (Illegal, Izy), (Sty, Zpx), (Sta, Zpx), (Stx, Zpy), (Sax, Zpy),
    (Tya, Imp), (Sta, Aby), (Txs, Imp), (Illegal, Aby), (Illegal, Abx), (Sta, Abx), (Illegal, Aby), (Illegal, Aby),
    // 0xA0
    (Ldy, Imm), (Lda, Izx), (Ldx, Imm), (Lax, Izx), (Ldy, Zp), (Lda, Zp), (Ldx, Zp), (Lax, Zp),
    (Tay, Imp), (Lda, Imm), (Tax, Imp), (Illegal, Imm), (Ldy, Abs), (Lda, Abs), (Ldx, Abs), (Lax, Abs),
    // 0xB0
    (Bcs, Rel), (Lda, Izy), (Illegal, Imp), (Lax, Izy), (Ldy, Zpx), (Lda, Zpx), (Ldx, Zpy), (Lax, Zpy),
    (Clv, Imp), (Lda, Aby), (Tsx, Imp), (Illegal, Aby), (Ldy, Abx), (Lda, Abx), (Ldx, Aby), (Lax, Aby),
    // 0xC0
    (Cpy, Imm), (Cmp, Izx), (Nop, Imm), (Dcp, Izx), (Cpy, Zp), (Cmp, Zp), (Dec, Zp), (Dcp, Zp),
    (Iny, Imp), (Cmp, Imm), (Dex, Imp), (Axs, Imm), (Cpy, Abs), (Cmp, Abs), (Dec, Abs), (Dcp, Abs),
    // 0xD0
    (Bne, Rel), (Cmp, Izy), (Illegal, Imp), (Dcp, Izy), (Nop, Zpx), (Cmp, Zpx), (Dec, Zpx), (Dcp, Zpx),
    (Cld, Imp), (Cmp, Aby), (Nop, Imp), (Dcp, Aby), (Nop, Abx), (Cmp, Abx), (Dec, Abx), (Dcp, Abx),
    // 0xE0
    (Cpx, Imm), (Sbc, Izx), (Nop, Imm), (Isc, Izx), (Cpx, Zp), (Sbc, Zp), (Inc, Zp), (Isc, Zp),
    (Inx, Imp), (Sbc, Imm), (Nop, Imp), (Sbc, Imm), (Cpx, Abs), (Sbc, Abs), (Inc, Abs), (Isc, Abs),
    // 0xF0
    (Beq, Rel), (Sbc, Izy), (Illegal, Imp), (Isc, Izy), (Nop, Zpx), (Sbc, Zpx), (Inc, Zpx), (Isc, Zpx),
    (Sed, Imp), (Sbc, Aby), (Nop, Imp), (Isc, Aby), (Nop, Abx), (Sbc, Abx), (Inc, Abx), (Isc, Abx),
];

/// MOS 6502 CPU state and execution engine
///
/// This is a generic, reusable 6502 CPU implementation that works with any
/// system through the `Memory6502` trait.
#[derive(Debug)]
pub struct Cpu6502<M: Memory6502> {
    /// Accumulator register
    pub a: u8,
    /// X index register
    pub x: u8,
    /// Y index register
    pub y: u8,
    /// Stack pointer (points to 0x0100 + sp)
    pub sp: u8,
    /// Status register (NV-BDIZC)
    pub status: u8,
    /// Program counter
    pub pc: u16,
    /// Total cycles executed
    pub cycles: u64,
    /// Memory interface
    pub memory: M,
    /// IRQ input level
    irq_line: bool,
    /// Latched NMI edge, serviced before the next instruction
    nmi_pending: bool,
}

impl<M: Memory6502> Cpu6502<M> {
    /// Create a new 6502 CPU with the given memory interface
    pub fn new(memory: M) -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            status: 0x34,
            pc: 0,
            cycles: 0,
            memory,
            irq_line: false,
            nmi_pending: false,
        }
    }

    /// Power-on state: registers cleared, PC loaded from $FFFC without bus cycles.
    pub fn power_on(&mut self) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0xFD;
        self.status = 0x34;
        self.cycles = 0;
        self.irq_line = false;
        self.nmi_pending = false;
        self.pc = self.peek_u16(RESET_VECTOR);
    }

    /// Reset button: S decrements by 3, I is set, PC reloads from $FFFC.
    pub fn reset(&mut self) {
        self.sp = self.sp.wrapping_sub(3);
        self.status |= FLAG_I;
        self.nmi_pending = false;
        self.pc = self.peek_u16(RESET_VECTOR);
    }

    /// Latch an NMI edge; the handler runs before the next instruction.
    pub fn trigger_nmi(&mut self) {
        self.nmi_pending = true;
    }

    pub fn set_irq_line(&mut self, asserted: bool) {
        self.irq_line = asserted;
    }

    pub fn irq_line(&self) -> bool {
        self.irq_line
    }

    pub fn nmi_pending(&self) -> bool {
        self.nmi_pending
    }

    #[inline]
    fn read(&mut self, addr: u16) -> u8 {
        self.cycles = self.cycles.wrapping_add(1);
        self.memory.read(addr)
    }

    #[inline]
    fn write(&mut self, addr: u16, val: u8) {
        self.cycles = self.cycles.wrapping_add(1);
        self.memory.write(addr, val);
    }

    fn peek_u16(&self, addr: u16) -> u16 {
        let lo = self.memory.peek(addr) as u16;
        let hi = self.memory.peek(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    #[inline]
    fn fetch_u8(&mut self) -> u8 {
        let v = self.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        v
    }

    #[inline]
    fn fetch_u16(&mut self) -> u16 {
        let lo = self.fetch_u8() as u16;
        let hi = self.fetch_u8() as u16;
        (hi << 8) | lo
    }

    #[inline]
    fn push_u8(&mut self, v: u8) {
        let addr = 0x0100 | self.sp as u16;
        self.write(addr, v);
        self.sp = self.sp.wrapping_sub(1);
    }

    #[inline]
    fn pop_u8(&mut self) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        self.read(0x0100 | self.sp as u16)
    }

    /// Stack read the 6502 performs before incrementing S.
    #[inline]
    fn dummy_stack_read(&mut self) {
        self.read(0x0100 | self.sp as u16);
    }

    #[inline]
    fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.status |= flag;
        } else {
            self.status &= !flag;
        }
    }

    fn set_zero_and_negative(&mut self, v: u8) {
        self.set_flag(FLAG_Z, v == 0);
        self.set_flag(FLAG_N, v & 0x80 != 0);
    }

    /// Index `base`, issuing the dummy read at the un-carried address when
    /// the page changes (reads) or always (writes and read-modify-write).
    #[inline]
    fn indexed(&mut self, base: u16, index: u8, access: Access) -> u16 {
        let addr = base.wrapping_add(index as u16);
        if (base ^ addr) & 0xFF00 != 0 || access == Access::Write {
            self.read((base & 0xFF00) | (addr & 0x00FF));
        }
        addr
    }

    fn operand_addr(&mut self, mode: Mode, access: Access) -> u16 {
        match mode {
            Zp => self.fetch_u8() as u16,
            Zpx | Zpy => {
                let zp = self.fetch_u8();
                self.read(zp as u16);
                let index = if mode == Zpx { self.x } else { self.y };
                zp.wrapping_add(index) as u16
            }
            Abs => self.fetch_u16(),
            Abx => {
                let base = self.fetch_u16();
                self.indexed(base, self.x, access)
            }
            Aby => {
                let base = self.fetch_u16();
                self.indexed(base, self.y, access)
            }
            Izx => {
                let zp = self.fetch_u8();
                self.read(zp as u16);
                let ptr = zp.wrapping_add(self.x);
                let lo = self.read(ptr as u16) as u16;
                let hi = self.read(ptr.wrapping_add(1) as u16) as u16;
                (hi << 8) | lo
            }
            Izy => {
                let zp = self.fetch_u8();
                let lo = self.read(zp as u16) as u16;
                let hi = self.read(zp.wrapping_add(1) as u16) as u16;
                self.indexed((hi << 8) | lo, self.y, access)
            }
            Imp | Acc | Imm | Rel | Ind => unreachable!("{mode:?} has no memory operand"),
        }
    }

    fn read_operand(&mut self, mode: Mode) -> u8 {
        if mode == Imm {
            return self.fetch_u8();
        }
        let addr = self.operand_addr(mode, Access::Read);
        self.read(addr)
    }

    fn adc(&mut self, v: u8) {
        let carry = (self.status & FLAG_C) as u16;
        let sum = self.a as u16 + v as u16 + carry;
        let result = sum as u8;
        self.set_flag(FLAG_C, sum > 0xFF);
        self.set_flag(FLAG_V, (!(self.a ^ v) & (self.a ^ result) & 0x80) != 0);
        self.a = result;
        self.set_zero_and_negative(result);
    }

    fn compare(&mut self, reg: u8, v: u8) {
        self.set_flag(FLAG_C, reg >= v);
        self.set_zero_and_negative(reg.wrapping_sub(v));
    }

    fn asl(&mut self, v: u8) -> u8 {
        self.set_flag(FLAG_C, v & 0x80 != 0);
        let r = v << 1;
        self.set_zero_and_negative(r);
        r
    }

    fn lsr(&mut self, v: u8) -> u8 {
        self.set_flag(FLAG_C, v & 0x01 != 0);
        let r = v >> 1;
        self.set_zero_and_negative(r);
        r
    }

    fn rol(&mut self, v: u8) -> u8 {
        let carry_in = self.status & FLAG_C;
        self.set_flag(FLAG_C, v & 0x80 != 0);
        let r = (v << 1) | carry_in;
        self.set_zero_and_negative(r);
        r
    }

    fn ror(&mut self, v: u8) -> u8 {
        let carry_in = (self.status & FLAG_C) << 7;
        self.set_flag(FLAG_C, v & 0x01 != 0);
        let r = (v >> 1) | carry_in;
        self.set_zero_and_negative(r);
        r
    }

    /// Apply a read-modify-write operation to `v`, returning the stored value.
    fn modify(&mut self, op: Op, v: u8) -> u8 {
        match op {
            Asl => self.asl(v),
            Lsr => self.lsr(v),
            Rol => self.rol(v),
            Ror => self.ror(v),
            Inc => {
                let r = v.wrapping_add(1);
                self.set_zero_and_negative(r);
                r
            }
            Dec => {
                let r = v.wrapping_sub(1);
                self.set_zero_and_negative(r);
                r
            }
            Slo => {
                let r = self.asl(v);
                self.a |= r;
                self.set_zero_and_negative(self.a);
                r
            }
            Rla => {
                let r = self.rol(v);
                self.a &= r;
                self.set_zero_and_negative(self.a);
                r
            }
            Sre => {
                let r = self.lsr(v);
                self.a ^= r;
                self.set_zero_and_negative(self.a);
                r
            }
            Rra => {
                let r = self.ror(v);
                self.adc(r);
                r
            }
            Dcp => {
                let r = v.wrapping_sub(1);
                self.compare(self.a, r);
                r
            }
            Isc => {
                let r = v.wrapping_add(1);
                self.adc(!r);
                r
            }
            _ => v,
        }
    }

    fn branch(&mut self, taken: bool) {
        let offset = self.fetch_u8() as i8;
        if !taken {
            return;
        }
        self.read(self.pc);
        let target = self.pc.wrapping_add(offset as i16 as u16);
        if (target ^ self.pc) & 0xFF00 != 0 {
            self.read((self.pc & 0xFF00) | (target & 0x00FF));
        }
        self.pc = target;
    }

    /// Hardware interrupt entry: two dummy reads, three pushes, vector fetch.
    fn interrupt(&mut self, vector: u16) {
        self.read(self.pc);
        self.read(self.pc);
        self.push_u8((self.pc >> 8) as u8);
        self.push_u8(self.pc as u8);
        self.push_u8((self.status & !FLAG_B) | FLAG_U);
        self.status |= FLAG_I;
        let lo = self.read(vector) as u16;
        let hi = self.read(vector.wrapping_add(1)) as u16;
        self.pc = (hi << 8) | lo;
    }

    /// Execute one instruction (or interrupt entry) and return cycles used.
    pub fn step(&mut self) -> Result<u32, CpuError> {
        let start = self.cycles;

        if self.nmi_pending {
            self.nmi_pending = false;
            log(LogCategory::Interrupts, LogLevel::Trace, || {
                format!("NMI at PC={:04X}", self.pc)
            });
            self.interrupt(NMI_VECTOR);
            return Ok((self.cycles - start) as u32);
        }
        if self.irq_line && self.status & FLAG_I == 0 {
            log(LogCategory::Interrupts, LogLevel::Trace, || {
                format!("IRQ at PC={:04X}", self.pc)
            });
            self.interrupt(IRQ_VECTOR);
            return Ok((self.cycles - start) as u32);
        }

        let opcode_pc = self.pc;
        self.memory.on_opcode_fetch(opcode_pc);
        let opcode = self.fetch_u8();
        let (op, mode) = OPCODES[opcode as usize];

        match op {
            Illegal => {
                log(LogCategory::CPU, LogLevel::Error, || {
                    format!("illegal opcode {:02X} at PC={:04X}", opcode, opcode_pc)
                });
                return Err(CpuError::IllegalOpcode {
                    opcode,
                    pc: opcode_pc,
                });
            }

            // Loads, arithmetic and other read instructions
            Lda | Ldx | Ldy | Lax | Adc | Sbc | And | Ora | Eor | Cmp | Cpx | Cpy | Bit
            | Anc | Alr | Arr | Axs | Nop
                if mode != Imp =>
            {
                let v = self.read_operand(mode);
                match op {
                    Lda => {
                        self.a = v;
                        self.set_zero_and_negative(v);
                    }
                    Ldx => {
                        self.x = v;
                        self.set_zero_and_negative(v);
                    }
                    Ldy => {
                        self.y = v;
                        self.set_zero_and_negative(v);
                    }
                    Lax => {
                        self.a = v;
                        self.x = v;
                        self.set_zero_and_negative(v);
                    }
                    Adc => self.adc(v),
                    Sbc => self.adc(!v),
                    And => {
                        self.a &= v;
                        self.set_zero_and_negative(self.a);
                    }
                    Ora => {
                        self.a |= v;
                        self.set_zero_and_negative(self.a);
                    }
                    Eor => {
                        self.a ^= v;
                        self.set_zero_and_negative(self.a);
                    }
                    Cmp => self.compare(self.a, v),
                    Cpx => self.compare(self.x, v),
                    Cpy => self.compare(self.y, v),
                    Bit => {
                        self.set_flag(FLAG_Z, self.a & v == 0);
                        self.set_flag(FLAG_N, v & 0x80 != 0);
                        self.set_flag(FLAG_V, v & 0x40 != 0);
                    }
                    Anc => {
                        self.a &= v;
                        self.set_zero_and_negative(self.a);
                        self.set_flag(FLAG_C, self.a & 0x80 != 0);
                    }
                    Alr => {
                        let t = self.a & v;
                        self.a = self.lsr(t);
                    }
                    Arr => {
                        let t = self.a & v;
                        self.a = (t >> 1) | ((self.status & FLAG_C) << 7);
                        self.set_zero_and_negative(self.a);
                        self.set_flag(FLAG_C, self.a & 0x40 != 0);
                        self.set_flag(FLAG_V, ((self.a >> 6) ^ (self.a >> 5)) & 1 != 0);
                    }
                    Axs => {
                        let t = self.a & self.x;
                        self.set_flag(FLAG_C, t >= v);
                        self.x = t.wrapping_sub(v);
                        self.set_zero_and_negative(self.x);
                    }
                    _ => {}
                }
            }

            Sta | Stx | Sty | Sax => {
                let addr = self.operand_addr(mode, Access::Write);
                let v = match op {
                    Sta => self.a,
                    Stx => self.x,
                    Sty => self.y,
                    _ => self.a & self.x,
                };
                self.write(addr, v);
            }

            Asl | Lsr | Rol | Ror if mode == Acc => {
                self.read(self.pc);
                self.a = self.modify(op, self.a);
            }

            Asl | Lsr | Rol | Ror | Inc | Dec | Slo | Rla | Sre | Rra | Dcp | Isc => {
                let addr = self.operand_addr(mode, Access::Write);
                let v = self.read(addr);
                self.write(addr, v);
                let r = self.modify(op, v);
                self.write(addr, r);
            }

            Bpl => self.branch(self.status & FLAG_N == 0),
            Bmi => self.branch(self.status & FLAG_N != 0),
            Bvc => self.branch(self.status & FLAG_V == 0),
            Bvs => self.branch(self.status & FLAG_V != 0),
            Bcc => self.branch(self.status & FLAG_C == 0),
            Bcs => self.branch(self.status & FLAG_C != 0),
            Bne => self.branch(self.status & FLAG_Z == 0),
            Beq => self.branch(self.status & FLAG_Z != 0),

            Jmp if mode == Abs => {
                self.pc = self.fetch_u16();
            }
            Jmp => {
                let ptr = self.fetch_u16();
                let lo = self.read(ptr) as u16;
                // The high byte never carries into the next page.
                let hi = self.read((ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF)) as u16;
                self.pc = (hi << 8) | lo;
            }
            Jsr => {
                let lo = self.fetch_u8() as u16;
                self.dummy_stack_read();
                self.push_u8((self.pc >> 8) as u8);
                self.push_u8(self.pc as u8);
                let hi = self.read(self.pc) as u16;
                self.pc = (hi << 8) | lo;
            }
            Rts => {
                self.read(self.pc);
                self.dummy_stack_read();
                let lo = self.pop_u8() as u16;
                let hi = self.pop_u8() as u16;
                self.pc = (hi << 8) | lo;
                self.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
            }
            Rti => {
                self.read(self.pc);
                self.dummy_stack_read();
                self.status = (self.pop_u8() & !FLAG_B) | FLAG_U;
                let lo = self.pop_u8() as u16;
                let hi = self.pop_u8() as u16;
                self.pc = (hi << 8) | lo;
            }
            Brk => {
                log(LogCategory::CPU, LogLevel::Debug, || {
                    format!("BRK at PC={:04X}", opcode_pc)
                });
                self.fetch_u8();
                self.push_u8((self.pc >> 8) as u8);
                self.push_u8(self.pc as u8);
                self.push_u8(self.status | FLAG_B | FLAG_U);
                self.status |= FLAG_I;
                let lo = self.read(IRQ_VECTOR) as u16;
                let hi = self.read(IRQ_VECTOR + 1) as u16;
                self.pc = (hi << 8) | lo;
            }
            Pha => {
                self.read(self.pc);
                self.push_u8(self.a);
            }
            Php => {
                self.read(self.pc);
                self.push_u8(self.status | FLAG_B | FLAG_U);
            }
            Pla => {
                self.read(self.pc);
                self.dummy_stack_read();
                self.a = self.pop_u8();
                self.set_zero_and_negative(self.a);
            }
            Plp => {
                self.read(self.pc);
                self.dummy_stack_read();
                self.status = (self.pop_u8() & !FLAG_B) | FLAG_U;
            }

            // Implied instructions: one dummy read of the next byte
            _ => {
                self.read(self.pc);
                match op {
                    Clc => self.status &= !FLAG_C,
                    Sec => self.status |= FLAG_C,
                    Cli => self.status &= !FLAG_I,
                    Sei => self.status |= FLAG_I,
                    Clv => self.status &= !FLAG_V,
                    Cld => self.status &= !FLAG_D,
                    Sed => self.status |= FLAG_D,
                    Tax => {
                        self.x = self.a;
                        self.set_zero_and_negative(self.x);
                    }
                    Tay => {
                        self.y = self.a;
                        self.set_zero_and_negative(self.y);
                    }
                    Txa => {
                        self.a = self.x;
                        self.set_zero_and_negative(self.a);
                    }
                    Tya => {
                        self.a = self.y;
                        self.set_zero_and_negative(self.a);
                    }
                    Tsx => {
                        self.x = self.sp;
                        self.set_zero_and_negative(self.x);
                    }
                    Txs => self.sp = self.x,
                    Inx => {
                        self.x = self.x.wrapping_add(1);
                        self.set_zero_and_negative(self.x);
                    }
                    Iny => {
                        self.y = self.y.wrapping_add(1);
                        self.set_zero_and_negative(self.y);
                    }
                    Dex => {
                        self.x = self.x.wrapping_sub(1);
                        self.set_zero_and_negative(self.x);
                    }
                    Dey => {
                        self.y = self.y.wrapping_sub(1);
                        self.set_zero_and_negative(self.y);
                    }
                    _ => {}
                }
            }
        }

        Ok((self.cycles - start) as u32)
    }

    /// Registers as (name, value) pairs, in display order.
    pub fn registers(&self) -> Vec<(String, u32)> {
        let mut regs = vec![
            ("A".to_string(), self.a as u32),
            ("X".to_string(), self.x as u32),
            ("Y".to_string(), self.y as u32),
            ("S".to_string(), self.sp as u32),
            ("PC".to_string(), self.pc as u32),
            ("P".to_string(), self.status as u32),
        ];
        for (name, flag) in [
            ("Flag C", FLAG_C),
            ("Flag Z", FLAG_Z),
            ("Flag I", FLAG_I),
            ("Flag D", FLAG_D),
            ("Flag B", FLAG_B),
            ("Flag T", FLAG_U),
            ("Flag V", FLAG_V),
            ("Flag N", FLAG_N),
        ] {
            regs.push((name.to_string(), u32::from(self.status & flag != 0)));
        }
        regs
    }
}

impl<M: Memory6502> SyncState for Cpu6502<M> {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("CPU")?;
        s.sync_u8("A", &mut self.a)?;
        s.sync_u8("X", &mut self.x)?;
        s.sync_u8("Y", &mut self.y)?;
        s.sync_u8("S", &mut self.sp)?;
        s.sync_u8("P", &mut self.status)?;
        s.sync_u16("PC", &mut self.pc)?;
        s.sync_u64("Cycles", &mut self.cycles)?;
        s.sync_bool("IrqLine", &mut self.irq_line)?;
        s.sync_bool("NmiPending", &mut self.nmi_pending)?;
        s.end_section("CPU")
    }
}

impl<M: Memory6502> Cpu for Cpu6502<M> {
    type Bus = M;

    fn power_on(&mut self) {
        Cpu6502::power_on(self)
    }

    fn reset(&mut self) {
        Cpu6502::reset(self)
    }

    fn step(&mut self) -> Result<u32, CpuError> {
        Cpu6502::step(self)
    }

    fn set_irq_line(&mut self, asserted: bool) {
        Cpu6502::set_irq_line(self, asserted)
    }

    fn trigger_nmi(&mut self) {
        Cpu6502::trigger_nmi(self)
    }

    fn registers(&self) -> Vec<(String, u32)> {
        Cpu6502::registers(self)
    }

    fn total_cycles(&self) -> u64 {
        self.cycles
    }

    fn bus(&self) -> &M {
        &self.memory
    }

    fn bus_mut(&mut self) -> &mut M {
        &mut self.memory
    }
}

/// Flat 64 KB RAM, useful for tests and benchmarks.
#[derive(Debug)]
pub struct ArrayMemory {
    pub data: [u8; 0x10000],
    /// Every bus access in order: (address, value, is_write)
    pub trace: Vec<(u16, u8, bool)>,
    pub tracing: bool,
}

impl ArrayMemory {
    pub fn new() -> Self {
        Self {
            data: [0; 0x10000],
            trace: Vec::new(),
            tracing: false,
        }
    }

    /// Load a program into memory and set reset vector
    pub fn load_program(&mut self, offset: u16, data: &[u8]) {
        let off = offset as usize;
        self.data[off..off + data.len()].copy_from_slice(data);
        self.data[0xFFFC] = offset as u8;
        self.data[0xFFFD] = (offset >> 8) as u8;
    }
}

impl Default for ArrayMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory6502 for ArrayMemory {
    fn read(&mut self, addr: u16) -> u8 {
        let v = self.data[addr as usize];
        if self.tracing {
            self.trace.push((addr, v, false));
        }
        v
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.data[addr as usize] = val;
        if self.tracing {
            self.trace.push((addr, val, true));
        }
    }

    fn peek(&self, addr: u16) -> u8 {
        self.data[addr as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateFormat;

    fn cpu_with(program: &[u8]) -> Cpu6502<ArrayMemory> {
        let mut cpu = Cpu6502::new(ArrayMemory::new());
        cpu.memory.load_program(0x8000, program);
        cpu.power_on();
        cpu
    }

    #[test]
    fn lda_immediate_sets_a_and_flags() {
        let mut cpu = cpu_with(&[0xA9, 0x05, 0xEA]);
        assert_eq!(cpu.step(), Ok(2));
        assert_eq!(cpu.a, 5);
        assert_eq!(cpu.status & FLAG_Z, 0);
        assert_eq!(cpu.step(), Ok(2));
    }

    #[test]
    fn lda_zero_sets_zero_flag() {
        let mut cpu = cpu_with(&[0xA9, 0x00]);
        cpu.step().unwrap();
        assert_eq!(cpu.a, 0);
        assert_eq!(cpu.status & FLAG_Z, FLAG_Z);
    }

    #[test]
    fn power_on_register_values() {
        let cpu = cpu_with(&[0xEA]);
        assert_eq!(cpu.pc, 0x8000);
        assert_eq!(cpu.sp, 0xFD);
        assert_eq!(cpu.status, 0x34);
        assert_eq!(cpu.cycles, 0);
    }

    #[test]
    fn adc_immediate_and_carry_overflow() {
        let mut cpu = cpu_with(&[0x69, 0x10]); // ADC #$10
        cpu.a = 0x50;
        assert_eq!(cpu.step(), Ok(2));
        assert_eq!(cpu.a, 0x60);
        assert_eq!(cpu.status & FLAG_V, 0);

        let mut cpu = cpu_with(&[0x69, 0x01]);
        cpu.a = 0xFF;
        cpu.status |= FLAG_C;
        cpu.step().unwrap();
        assert_eq!(cpu.a, 0x01);
        assert_eq!(cpu.status & FLAG_C, FLAG_C);

        let mut cpu = cpu_with(&[0x69, 0x50]);
        cpu.a = 0x50;
        cpu.step().unwrap();
        assert_eq!(cpu.a, 0xA0);
        assert_eq!(cpu.status & FLAG_V, FLAG_V);
    }

    #[test]
    fn decimal_flag_does_not_change_arithmetic() {
        // SED ; LDA #$09 ; CLC ; ADC #$01
        let mut cpu = cpu_with(&[0xF8, 0xA9, 0x09, 0x18, 0x69, 0x01]);
        for _ in 0..4 {
            cpu.step().unwrap();
        }
        assert_eq!(cpu.status & FLAG_D, FLAG_D);
        assert_eq!(cpu.a, 0x0A);
    }

    #[test]
    fn beq_branch_cycle_counts() {
        // LDA #0; BEQ +2; LDA #1; LDA #2
        let mut cpu = cpu_with(&[0xA9, 0x00, 0xF0, 0x02, 0xA9, 0x01, 0xA9, 0x02]);
        assert_eq!(cpu.step(), Ok(2));
        assert_eq!(cpu.step(), Ok(3)); // taken, same page
        assert_eq!(cpu.step(), Ok(2));
        assert_eq!(cpu.a, 2);

        // BNE not taken
        let mut cpu = cpu_with(&[0xA9, 0x00, 0xD0, 0x10]);
        cpu.step().unwrap();
        assert_eq!(cpu.step(), Ok(2));
        assert_eq!(cpu.pc, 0x8004);
    }

    #[test]
    fn branch_across_page_takes_four_cycles() {
        let mut cpu = Cpu6502::new(ArrayMemory::new());
        // BCS -4 from $8001 crosses into $7Fxx
        cpu.memory.load_program(0x8000, &[0xB0, 0xFC]);
        cpu.power_on();
        cpu.status |= FLAG_C;
        assert_eq!(cpu.step(), Ok(4));
        assert_eq!(cpu.pc, 0x7FFE);
    }

    #[test]
    fn pha_pla_roundtrip() {
        let mut cpu = cpu_with(&[0x48, 0xA9, 0x00, 0x68]); // PHA; LDA #0; PLA
        cpu.a = 0x7F;
        assert_eq!(cpu.step(), Ok(3));
        assert_eq!(cpu.step(), Ok(2));
        assert_eq!(cpu.step(), Ok(4));
        assert_eq!(cpu.a, 0x7F);
    }

    #[test]
    fn php_sets_break_and_unused_bits() {
        let mut cpu = cpu_with(&[0x08, 0x28]); // PHP ; PLP
        cpu.status = 0x01;
        cpu.step().unwrap();
        assert_eq!(cpu.memory.data[0x01FD], 0x31);
        cpu.step().unwrap();
        assert_eq!(cpu.status, 0x21);
    }

    #[test]
    fn jsr_rts_returns() {
        let mut cpu = cpu_with(&[0x20, 0x10, 0x80, 0xA9, 0x01]);
        cpu.memory.data[0x8010] = 0x60;
        assert_eq!(cpu.step(), Ok(6)); // JSR
        assert_eq!(cpu.pc, 0x8010);
        assert_eq!(cpu.memory.data[0x01FD], 0x80);
        assert_eq!(cpu.memory.data[0x01FC], 0x02);
        assert_eq!(cpu.step(), Ok(6)); // RTS
        assert_eq!(cpu.step(), Ok(2));
        assert_eq!(cpu.a, 1);
    }

    #[test]
    fn absolute_x_page_cross_adds_cycle() {
        // LDA $80F0,X with X=$20 crosses into $8110
        let mut cpu = cpu_with(&[0xBD, 0xF0, 0x80]);
        cpu.memory.data[0x8110] = 0x44;
        cpu.x = 0x20;
        assert_eq!(cpu.step(), Ok(5));
        assert_eq!(cpu.a, 0x44);

        let mut cpu = cpu_with(&[0xBD, 0x00, 0x02]);
        cpu.x = 0x01;
        assert_eq!(cpu.step(), Ok(4));
    }

    #[test]
    fn store_absolute_x_always_has_dummy_read() {
        let mut cpu = cpu_with(&[0x9D, 0x00, 0x02]); // STA $0200,X
        cpu.x = 0x05;
        cpu.a = 0x99;
        cpu.memory.tracing = true;
        assert_eq!(cpu.step(), Ok(5));
        let trace = &cpu.memory.trace;
        assert_eq!(trace.len(), 5);
        assert_eq!(trace[3], (0x0205, 0x00, false));
        assert_eq!(trace[4], (0x0205, 0x99, true));
    }

    #[test]
    fn read_modify_write_writes_twice() {
        let mut cpu = cpu_with(&[0xEE, 0x00, 0x03]); // INC $0300
        cpu.memory.data[0x0300] = 0x41;
        cpu.memory.tracing = true;
        assert_eq!(cpu.step(), Ok(6));
        let writes: Vec<_> = cpu.memory.trace.iter().filter(|t| t.2).collect();
        assert_eq!(writes, vec![&(0x0300, 0x41, true), &(0x0300, 0x42, true)]);
    }

    #[test]
    fn indirect_modes_and_cycles() {
        let mut cpu = cpu_with(&[0xA1, 0x10, 0xB1, 0x20]); // LDA ($10,X) ; LDA ($20),Y
        cpu.x = 0x04;
        cpu.memory.data[0x14] = 0x00;
        cpu.memory.data[0x15] = 0x03;
        cpu.memory.data[0x0300] = 0x11;
        assert_eq!(cpu.step(), Ok(6));
        assert_eq!(cpu.a, 0x11);

        cpu.y = 0x10;
        cpu.memory.data[0x20] = 0xF8;
        cpu.memory.data[0x21] = 0x03;
        cpu.memory.data[0x0408] = 0x22;
        assert_eq!(cpu.step(), Ok(6)); // page crossed
        assert_eq!(cpu.a, 0x22);
    }

    #[test]
    fn jmp_indirect_page_wrap_bug() {
        let mut cpu = cpu_with(&[]);
        cpu.memory.data[0x8100..0x8103].copy_from_slice(&[0x6C, 0xFF, 0x80]);
        cpu.memory.data[0x80FF] = 0x34;
        cpu.memory.data[0x8000] = 0x12;
        cpu.pc = 0x8100;
        assert_eq!(cpu.step(), Ok(5));
        assert_eq!(cpu.pc, 0x1234);
    }

    #[test]
    fn undocumented_lax_and_dcp() {
        // LAX $10 ; DCP $11
        let mut cpu = cpu_with(&[0xA7, 0x10, 0xC7, 0x11]);
        cpu.memory.data[0x10] = 0x5A;
        cpu.memory.data[0x11] = 0x5B;
        assert_eq!(cpu.step(), Ok(3));
        assert_eq!((cpu.a, cpu.x), (0x5A, 0x5A));
        assert_eq!(cpu.step(), Ok(5));
        assert_eq!(cpu.memory.data[0x11], 0x5A);
        assert_eq!(cpu.status & (FLAG_Z | FLAG_C), FLAG_Z | FLAG_C);
    }

    #[test]
    fn jam_opcode_is_fatal() {
        let mut cpu = cpu_with(&[0xEA, 0x02]);
        cpu.step().unwrap();
        assert_eq!(
            cpu.step(),
            Err(CpuError::IllegalOpcode {
                opcode: 0x02,
                pc: 0x8001
            })
        );
    }

    #[test]
    fn nmi_entry_pushes_state_and_takes_seven_cycles() {
        let mut cpu = cpu_with(&[0xEA]);
        cpu.memory.data[0xFFFA] = 0x00;
        cpu.memory.data[0xFFFB] = 0x90;
        cpu.trigger_nmi();
        assert_eq!(cpu.step(), Ok(7));
        assert_eq!(cpu.pc, 0x9000);
        assert_eq!(cpu.status & FLAG_I, FLAG_I);
        assert_eq!(cpu.memory.data[0x01FB] & FLAG_B, 0);
        assert!(!cpu.nmi_pending());
    }

    #[test]
    fn irq_respects_interrupt_disable() {
        let mut cpu = cpu_with(&[0xEA, 0x58, 0xEA]); // NOP ; CLI ; NOP
        cpu.memory.data[0xFFFE] = 0x00;
        cpu.memory.data[0xFFFF] = 0xA0;
        cpu.set_irq_line(true);
        assert_eq!(cpu.step(), Ok(2)); // I set at power-on: masked
        assert_eq!(cpu.step(), Ok(2)); // CLI
        assert_eq!(cpu.step(), Ok(7)); // IRQ taken
        assert_eq!(cpu.pc, 0xA000);
    }

    #[test]
    fn rti_restores_status_and_pc() {
        let mut cpu = cpu_with(&[0x40]);
        cpu.sp = 0xFA;
        cpu.memory.data[0x01FB] = 0xC3;
        cpu.memory.data[0x01FC] = 0x34;
        cpu.memory.data[0x01FD] = 0x12;
        assert_eq!(cpu.step(), Ok(6));
        assert_eq!(cpu.pc, 0x1234);
        assert_eq!(cpu.status, 0xE3);
    }

    #[test]
    fn soft_reset_keeps_registers() {
        let mut cpu = cpu_with(&[0xA9, 0x33]);
        cpu.step().unwrap();
        cpu.reset();
        assert_eq!(cpu.a, 0x33);
        assert_eq!(cpu.sp, 0xFA);
        assert_eq!(cpu.pc, 0x8000);
    }

    #[test]
    fn register_list_order() {
        let cpu = cpu_with(&[]);
        let names: Vec<_> = cpu.registers().into_iter().map(|(n, _)| n).collect();
        assert_eq!(&names[..6], &["A", "X", "Y", "S", "PC", "P"]);
        assert_eq!(names.len(), 14);
    }

    #[test]
    fn state_roundtrip_restores_registers() {
        let mut cpu = cpu_with(&[0xA2, 0x07, 0xE8]);
        cpu.step().unwrap();
        cpu.set_irq_line(true);
        let mut w = Serializer::writer(StateFormat::Binary, "cpu", 1);
        cpu.sync_state(&mut w).unwrap();
        let blob = w.into_bytes().unwrap();

        cpu.step().unwrap();
        cpu.set_irq_line(false);
        let mut r = Serializer::binary_reader(&blob, "cpu", 1).unwrap();
        cpu.sync_state(&mut r).unwrap();
        r.finish().unwrap();
        assert_eq!(cpu.x, 0x07);
        assert_eq!(cpu.pc, 0x8002);
        assert_eq!(cpu.cycles, 2);
        assert!(cpu.irq_line());
    }
}

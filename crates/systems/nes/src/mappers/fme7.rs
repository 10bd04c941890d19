use super::{Board, BoardCore};
use crate::cartridge::{Cartridge, Mirroring};
use crate::config::NesSettings;
use emu_core::apu::AudioChip;
use emu_core::audio_bridge::{AudioBridge, AudioQueue};
use emu_core::state::{Serializer, StateError, SyncState};
use emu_core::timing::TimingMode;

/// Output of one channel at full volume.
const TONE_FULL_SCALE: f64 = 4000.0;

/// Sunsoft 5B expansion audio: the three square-wave tone channels of the
/// AY-3-8910 it is derived from. Tones are clocked at CPU/16.
///
/// The noise generator and the envelope unit are not modelled.
#[derive(Debug)]
pub struct Sunsoft5b {
    timing: TimingMode,
    select: u8,
    regs: [u8; 16],
    prescaler: u8,
    counters: [u16; 3],
    steps: [bool; 3],
    volume_table: [i32; 16],
    queue: AudioQueue,
}

impl Sunsoft5b {
    pub fn new(timing: TimingMode, max_events: usize, max_clocks: u32) -> Self {
        // 3 dB per volume step, 0 is silent.
        let mut volume_table = [0i32; 16];
        for (v, entry) in volume_table.iter_mut().enumerate().skip(1) {
            let db = (v as f64 - 15.0) * 3.0;
            *entry = (TONE_FULL_SCALE * 10f64.powf(db / 20.0)) as i32;
        }
        Self {
            timing,
            select: 0,
            regs: [0; 16],
            prescaler: 0,
            counters: [0; 3],
            steps: [false; 3],
            volume_table,
            queue: AudioQueue::new(max_events, max_clocks),
        }
    }

    fn period(&self, channel: usize) -> u16 {
        let lo = self.regs[channel * 2] as u16;
        let hi = (self.regs[channel * 2 + 1] & 0x0F) as u16;
        ((hi << 8) | lo).max(1)
    }

    fn output_level(&self) -> i32 {
        let mixer = self.regs[7];
        (0..3)
            .map(|ch| {
                let tone_enabled = mixer & (1 << ch) == 0;
                if tone_enabled && !self.steps[ch] {
                    0
                } else {
                    self.volume_table[(self.regs[8 + ch] & 0x0F) as usize]
                }
            })
            .sum()
    }
}

impl AudioChip for Sunsoft5b {
    fn write_register(&mut self, addr: u16, val: u8) {
        match addr & 0xE000 {
            0xC000 => self.select = val & 0x0F,
            0xE000 => self.regs[self.select as usize] = val,
            _ => {}
        }
    }

    fn clock(&mut self) {
        self.prescaler += 1;
        if self.prescaler == 16 {
            self.prescaler = 0;
            for ch in 0..3 {
                self.counters[ch] += 1;
                if self.counters[ch] >= self.period(ch) {
                    self.counters[ch] = 0;
                    self.steps[ch] = !self.steps[ch];
                }
            }
        }
        let level = self.output_level();
        self.queue.record(level);
        self.queue.tick();
    }

    fn timing(&self) -> TimingMode {
        self.timing
    }

    fn reset(&mut self) {
        self.regs = [0; 16];
        self.select = 0;
    }

    fn queue(&self) -> &AudioQueue {
        &self.queue
    }

    fn queue_mut(&mut self) -> &mut AudioQueue {
        &mut self.queue
    }
}

impl SyncState for Sunsoft5b {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("5B")?;
        s.sync_u8("Select", &mut self.select)?;
        s.sync_bytes("Regs", &mut self.regs)?;
        s.sync_u8("Prescaler", &mut self.prescaler)?;
        for (i, counter) in self.counters.iter_mut().enumerate() {
            s.sync_u16(["Counter0", "Counter1", "Counter2"][i], counter)?;
        }
        for (i, step) in self.steps.iter_mut().enumerate() {
            s.sync_bool(["Step0", "Step1", "Step2"][i], step)?;
        }
        self.queue.sync_state(s)?;
        s.end_section("5B")?;
        if s.is_reader() && (self.prescaler >= 16 || self.select >= 16) {
            return Err(StateError::InvalidValue("5B.Prescaler".into()));
        }
        Ok(())
    }
}

/// Sunsoft FME-7 (Mapper 69) - command/parameter banking, a CPU-cycle IRQ
/// counter and Sunsoft 5B audio.
#[derive(Debug)]
pub struct Fme7 {
    core: BoardCore,
    command: u8,
    chr: [u8; 8],
    /// $6000 select: bit 7 RAM enable, bit 6 RAM (vs ROM), bits 0-5 bank
    low_select: u8,
    prg: [u8; 3],
    mirror: u8,
    irq_control: u8,
    irq_counter: u16,
    irq_pending: bool,
    audio: Sunsoft5b,
    bridge: AudioBridge,
}

impl Fme7 {
    pub fn new(cart: Cartridge, settings: &NesSettings) -> Self {
        let region = settings.region;
        let mut m = Self {
            core: BoardCore::new(cart),
            command: 0,
            chr: [0; 8],
            low_select: 0,
            prg: [0, 1, 2],
            mirror: 0,
            irq_control: 0,
            irq_counter: 0,
            irq_pending: false,
            audio: Sunsoft5b::new(region, settings.max_audio_events, settings.max_audio_clocks),
            bridge: AudioBridge::new(settings.sample_rate, region.cpu_clock_hz()),
        };
        m.update_banks();
        m
    }

    fn low_is_ram(&self) -> bool {
        self.low_select & 0x40 != 0
    }

    fn write_parameter(&mut self, val: u8) {
        match self.command {
            0..=7 => self.chr[self.command as usize] = val,
            8 => self.low_select = val,
            9..=0x0B => self.prg[(self.command - 9) as usize] = val,
            0x0C => self.mirror = val & 0x03,
            0x0D => {
                self.irq_control = val;
                self.irq_pending = false;
            }
            0x0E => self.irq_counter = (self.irq_counter & 0xFF00) | val as u16,
            _ => self.irq_counter = (self.irq_counter & 0x00FF) | (val as u16) << 8,
        }
        self.update_banks();
    }
}

impl Board for Fme7 {
    fn core(&self) -> &BoardCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BoardCore {
        &mut self.core
    }

    fn mapper_number(&self) -> u16 {
        69
    }

    fn name(&self) -> &'static str {
        "FME-7"
    }

    fn write_prg(&mut self, addr: u16, val: u8) {
        match addr & 0xE000 {
            0x8000 => self.command = val & 0x0F,
            0xA000 => self.write_parameter(val),
            _ => self.audio.write_register(addr, val),
        }
    }

    fn peek_wram(&self, addr: u16) -> Option<u8> {
        if !self.low_is_ram() {
            let bank = (self.low_select & 0x3F) as usize % self.core.prg_banks_8k();
            let index = bank * 0x2000 + (addr & 0x1FFF) as usize;
            return self.core.prg_rom.get(index).copied();
        }
        if self.low_select & 0x80 != 0 {
            self.core.read_wram(addr)
        } else {
            None
        }
    }

    fn write_wram(&mut self, addr: u16, val: u8) {
        if self.low_select & 0xC0 == 0xC0 {
            self.core.write_wram(addr, val);
        }
    }

    fn clock_cpu(&mut self) {
        if self.irq_control & 0x80 != 0 {
            self.irq_counter = self.irq_counter.wrapping_sub(1);
            if self.irq_counter == 0xFFFF && self.irq_control & 0x01 != 0 {
                self.irq_pending = true;
            }
        }
        self.audio.clock();
    }

    fn irq_signal(&self) -> bool {
        self.irq_pending
    }

    fn mix_audio(&mut self, out: &mut [i16]) {
        let (events, clocks) = self.audio.queue_mut().take();
        let samples = self.bridge.pull(&events, clocks, out.len());
        for (dst, src) in out.iter_mut().zip(samples) {
            *dst = dst.saturating_add(src);
        }
    }

    fn soft_reset(&mut self) {
        self.audio.reset();
    }

    fn update_banks(&mut self) {
        for (slot, &bank) in self.chr.iter().enumerate() {
            self.core.set_chr_1k(slot, bank as usize);
        }
        for (slot, &bank) in self.prg.iter().enumerate() {
            self.core.set_prg_8k(slot, (bank & 0x3F) as usize);
        }
        let last = self.core.prg_banks_8k() - 1;
        self.core.set_prg_8k(3, last);
        self.core.mirroring = match self.mirror {
            0 => Mirroring::Vertical,
            1 => Mirroring::Horizontal,
            2 => Mirroring::SingleScreenLower,
            _ => Mirroring::SingleScreenUpper,
        };
    }

    fn post_load_state(&mut self) {
        self.update_banks();
    }
}

impl SyncState for Fme7 {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("FME7")?;
        s.sync_u8("Command", &mut self.command)?;
        s.sync_bytes("Chr", &mut self.chr)?;
        s.sync_u8("LowSelect", &mut self.low_select)?;
        s.sync_bytes("Prg", &mut self.prg)?;
        s.sync_u8("Mirror", &mut self.mirror)?;
        s.sync_u8("IrqControl", &mut self.irq_control)?;
        s.sync_u16("IrqCounter", &mut self.irq_counter)?;
        s.sync_bool("IrqPending", &mut self.irq_pending)?;
        self.audio.sync_state(s)?;
        self.bridge.sync_state(s)?;
        self.core.sync_state(s)?;
        s.end_section("FME7")
    }
}

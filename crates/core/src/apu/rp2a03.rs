//! RP2A03/RP2A07 audio (NES NTSC and PAL).
//!
//! The 2A03 is the main chip in the NES/Famicom, containing:
//! - MOS 6502 CPU (implemented separately in core)
//! - 2 Pulse channels
//! - 1 Triangle channel
//! - 1 Noise channel
//! - 1 DMC (Delta Modulation Channel)
//!
//! This module implements just the audio portion. The PAL 2A07 differs only
//! in its noise, DMC and frame counter tables, selected by [`TimingMode`].

use super::{
    audio_chip::AudioChip, noise, DmcChannel, FrameClocks, FrameCounter, NoiseChannel,
    PulseChannel, PulseId, TriangleChannel,
};
use crate::audio_bridge::AudioQueue;
use crate::state::{Serializer, StateError, SyncState};
use crate::timing::TimingMode;

/// Full-scale output of the mixer.
const MIX_SCALE: f64 = 30_000.0;

/// 2A03 APU.
#[derive(Debug)]
pub struct Rp2a03Apu {
    pub pulse1: PulseChannel,
    pub pulse2: PulseChannel,
    pub triangle: TriangleChannel,
    pub noise: NoiseChannel,
    pub dmc: DmcChannel,
    frame_counter: FrameCounter,
    timing: TimingMode,
    /// Set on the CPU cycles where the APU-rate timers are clocked
    odd_cycle: bool,
    queue: AudioQueue,
    pulse_table: [i32; 31],
    tnd_table: [i32; 203],
}

impl Rp2a03Apu {
    pub fn new(timing: TimingMode, max_events: usize, max_clocks: u32) -> Self {
        let mut pulse_table = [0i32; 31];
        for (n, entry) in pulse_table.iter_mut().enumerate().skip(1) {
            *entry = (95.52 / (8128.0 / n as f64 + 100.0) * MIX_SCALE) as i32;
        }
        let mut tnd_table = [0i32; 203];
        for (n, entry) in tnd_table.iter_mut().enumerate().skip(1) {
            *entry = (163.67 / (24329.0 / n as f64 + 100.0) * MIX_SCALE) as i32;
        }

        Self {
            pulse1: PulseChannel::new(PulseId::One),
            pulse2: PulseChannel::new(PulseId::Two),
            triangle: TriangleChannel::new(),
            noise: NoiseChannel::new(),
            dmc: DmcChannel::new(),
            frame_counter: FrameCounter::new(timing),
            timing,
            odd_cycle: false,
            queue: AudioQueue::new(max_events, max_clocks),
            pulse_table,
            tnd_table,
        }
    }

    fn pal(&self) -> bool {
        self.timing.uses_pal_apu_tables()
    }

    fn apply_frame_clocks(&mut self, clocks: FrameClocks) {
        if clocks.quarter {
            self.pulse1.clock_quarter_frame();
            self.pulse2.clock_quarter_frame();
            self.triangle.clock_linear_counter();
            self.noise.clock_quarter_frame();
        }
        if clocks.half {
            self.pulse1.clock_half_frame();
            self.pulse2.clock_half_frame();
            self.triangle.clock_half_frame();
            self.noise.clock_half_frame();
        }
    }

    /// Mixed output level through the non-linear lookup tables.
    pub fn output_level(&self) -> i32 {
        let pulse = self.pulse1.output() + self.pulse2.output();
        let tnd = 3 * self.triangle.output() as usize
            + 2 * self.noise.output() as usize
            + self.dmc.output() as usize;
        self.pulse_table[pulse as usize] + self.tnd_table[tnd]
    }

    /// Address the DMC reader wants fetched, if any.
    pub fn dmc_fetch_request(&self) -> Option<u16> {
        self.dmc.fetch_request()
    }

    /// Complete a DMC fetch with the byte read from the CPU bus.
    pub fn dmc_fill(&mut self, byte: u8) {
        self.dmc.fill(byte);
    }

    fn status(&self) -> u8 {
        let mut status = 0u8;
        if self.pulse1.length.is_active() {
            status |= 0x01;
        }
        if self.pulse2.length.is_active() {
            status |= 0x02;
        }
        if self.triangle.length.is_active() {
            status |= 0x04;
        }
        if self.noise.length.is_active() {
            status |= 0x08;
        }
        if self.dmc.has_bytes_remaining() {
            status |= 0x10;
        }
        if self.frame_counter.is_irq_pending() {
            status |= 0x40;
        }
        if self.dmc.irq_pending {
            status |= 0x80;
        }
        status
    }
}

impl AudioChip for Rp2a03Apu {
    fn write_register(&mut self, addr: u16, val: u8) {
        match addr {
            0x4000 => self.pulse1.write_control(val),
            0x4001 => self.pulse1.write_sweep(val),
            0x4002 => self.pulse1.write_timer_low(val),
            0x4003 => self.pulse1.write_timer_high(val),
            0x4004 => self.pulse2.write_control(val),
            0x4005 => self.pulse2.write_sweep(val),
            0x4006 => self.pulse2.write_timer_low(val),
            0x4007 => self.pulse2.write_timer_high(val),
            0x4008 => self.triangle.write_linear(val),
            0x400A => self.triangle.write_timer_low(val),
            0x400B => self.triangle.write_timer_high(val),
            0x400C => self.noise.write_control(val),
            0x400E => self.noise.write_period(val),
            0x400F => self.noise.write_length(val),
            0x4010 => self.dmc.write_flags_rate(val),
            0x4011 => self.dmc.write_direct_load(val),
            0x4012 => self.dmc.write_sample_address(val),
            0x4013 => self.dmc.write_sample_length(val),
            0x4015 => {
                self.pulse1.set_enabled(val & 0x01 != 0);
                self.pulse2.set_enabled(val & 0x02 != 0);
                self.triangle.set_enabled(val & 0x04 != 0);
                self.noise.set_enabled(val & 0x08 != 0);
                self.dmc.set_enabled(val & 0x10 != 0);
            }
            0x4017 => {
                let clocks = self.frame_counter.write_control(val);
                self.apply_frame_clocks(clocks);
            }
            _ => {}
        }
    }

    fn read_register(&mut self, addr: u16) -> u8 {
        let value = self.peek_register(addr);
        if addr == 0x4015 {
            self.frame_counter.clear_irq();
        }
        value
    }

    fn peek_register(&self, addr: u16) -> u8 {
        if addr == 0x4015 {
            self.status()
        } else {
            0
        }
    }

    fn clock(&mut self) {
        let clocks = self.frame_counter.clock();
        self.apply_frame_clocks(clocks);

        self.triangle.clock_timer();
        if self.odd_cycle {
            self.pulse1.clock_timer();
            self.pulse2.clock_timer();
        }
        self.odd_cycle = !self.odd_cycle;

        let table = if self.pal() {
            &noise::NOISE_PERIOD_TABLE_PAL
        } else {
            &noise::NOISE_PERIOD_TABLE_NTSC
        };
        self.noise.clock_timer(table);
        let pal = self.pal();
        self.dmc.clock(pal);

        let level = self.output_level();
        self.queue.record(level);
        self.queue.tick();
    }

    fn timing(&self) -> TimingMode {
        self.timing
    }

    fn reset(&mut self) {
        self.write_register(0x4015, 0);
        self.frame_counter.clear_irq();
        self.dmc.irq_pending = false;
    }

    fn irq(&self) -> bool {
        self.frame_counter.is_irq_pending() || self.dmc.irq_pending
    }

    fn queue(&self) -> &AudioQueue {
        &self.queue
    }

    fn queue_mut(&mut self) -> &mut AudioQueue {
        &mut self.queue
    }
}

impl SyncState for Rp2a03Apu {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("APU")?;
        s.begin_section("Pulse1")?;
        self.pulse1.sync_state(s)?;
        s.end_section("Pulse1")?;
        s.begin_section("Pulse2")?;
        self.pulse2.sync_state(s)?;
        s.end_section("Pulse2")?;
        self.triangle.sync_state(s)?;
        self.noise.sync_state(s)?;
        self.dmc.sync_state(s)?;
        self.frame_counter.sync_state(s)?;
        s.sync_bool("OddCycle", &mut self.odd_cycle)?;
        self.queue.sync_state(s)?;
        s.end_section("APU")
    }
}

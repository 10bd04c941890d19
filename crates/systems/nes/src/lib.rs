//! Cycle-exact NES session.
//!
//! [`NesSystem`] owns one 2A03 CPU whose bus ([`bus::NesBus`]) owns
//! everything else: RAM, PPU, APU, the cartridge board, the controller deck
//! and the scheduler counters. Time only moves when the CPU touches the bus,
//! so given the same ROM, settings and per-frame input every run produces the
//! same frames, audio and state.

pub mod bus;
pub mod cartridge;
pub mod config;
pub mod domains;
pub mod input;
pub mod mappers;
pub mod ppu;
pub mod scheduler;

pub use config::{NesSettings, RamInit};
pub use input::{buttons, InputState};

use bus::NesBus;
use cartridge::Cartridge;
use emu_core::apu::AudioChip;
use emu_core::audio_bridge::AudioBridge;
use emu_core::bus_map::{BusError, MemoryHooks, Watch};
use emu_core::cpu_6502::Cpu6502;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::ppu::CompiledPalette;
use emu_core::state::{Serializer, StateError, StateFormat, SyncState};
use emu_core::types::{AudioSample, Frame};
use emu_core::{CpuError, MemoryDomainInfo, System};
use scheduler::{run_cpu_one, SchedulerState, MAX_CYCLES_PER_FRAME};

/// Layout version of the snapshot format
pub const STATE_VERSION: u32 = 1;

pub const SYSTEM_ID: &str = "nes";

#[derive(Debug, thiserror::Error)]
pub enum NesError {
    #[error("unsupported mapper {0}")]
    UnsupportedMapper(u16),
    #[error("invalid ROM: {0}")]
    InvalidRom(String),
    #[error(transparent)]
    Cpu(#[from] CpuError),
    #[error("timing invariant violated: {0}")]
    TimingInvariant(&'static str),
    #[error("save state: {0}")]
    State(#[from] StateError),
    #[error("bus map: {0}")]
    Bus(#[from] BusError),
    #[error("unknown memory domain {0:?}")]
    UnknownDomain(String),
    #[error("memory domain {0} is read-only")]
    ReadOnlyDomain(&'static str),
    #[error("address {addr:#X} is outside {domain} (size {size:#X})")]
    AddressOutOfRange {
        domain: &'static str,
        addr: usize,
        size: usize,
    },
    #[error("settings: {0}")]
    Settings(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error("session halted by an earlier fatal error")]
    Halted,
}

impl NesError {
    /// Errors after which emulation cannot continue until a reset or load.
    pub fn is_fatal(&self) -> bool {
        matches!(self, NesError::Cpu(_) | NesError::TimingInvariant(_))
    }
}

pub struct NesSystem {
    cpu: Cpu6502<NesBus>,
    /// Kept for power cycling
    rom: Vec<u8>,
    settings: NesSettings,
    battery: bool,
    bridge: AudioBridge,
    input: InputState,
    frame: u64,
    lag_count: u64,
    is_lag: bool,
    halted: bool,
}

impl std::fmt::Debug for NesSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NesSystem")
            .field("pc", &self.cpu.pc)
            .field("bus", &self.cpu.memory)
            .field("frame", &self.frame)
            .field("lag_count", &self.lag_count)
            .field("halted", &self.halted)
            .finish()
    }
}

impl NesSystem {
    /// Build a powered-on session from an iNES image or a raw PRG image.
    pub fn new(rom: &[u8], settings: NesSettings) -> Result<Self, NesError> {
        settings.validate()?;
        let cart = Cartridge::from_bytes(rom)?;
        let battery = cart.battery;
        let board = mappers::create_board(cart, &settings)?;
        let colors = settings
            .palette_table()
            .map(|table| CompiledPalette::compile(&table))
            .unwrap_or_default();
        let bus = NesBus::new(board, &settings, colors)?;

        let mut cpu = Cpu6502::new(bus);
        cpu.power_on();
        log(LogCategory::CPU, LogLevel::Info, || {
            format!("power on, reset vector ${:04X}", cpu.pc)
        });

        Ok(Self {
            cpu,
            rom: rom.to_vec(),
            bridge: AudioBridge::new(settings.sample_rate, settings.region.cpu_clock_hz()),
            settings,
            battery,
            input: InputState::default(),
            frame: 0,
            lag_count: 0,
            is_lag: false,
            halted: false,
        })
    }

    pub fn settings(&self) -> &NesSettings {
        &self.settings
    }

    pub fn cpu(&self) -> &Cpu6502<NesBus> {
        &self.cpu
    }

    pub fn bus(&self) -> &NesBus {
        &self.cpu.memory
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Input for the next frame. Reset and power requests fire once.
    pub fn set_input(&mut self, input: InputState) {
        self.input = input;
    }

    /// Run until the PPU publishes the next frame.
    pub fn run_frame(&mut self) -> Result<(), NesError> {
        if self.halted {
            return Err(NesError::Halted);
        }
        if std::mem::take(&mut self.input.power) {
            self.hard_reset()?;
        } else if std::mem::take(&mut self.input.reset) {
            self.soft_reset();
        }

        match self.run_until_vblank() {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.is_fatal() {
                    log(LogCategory::CPU, LogLevel::Error, || {
                        format!("halting at frame {}: {}", self.frame, err)
                    });
                    self.halted = true;
                }
                Err(err)
            }
        }
    }

    fn run_until_vblank(&mut self) -> Result<(), NesError> {
        let bus = &mut self.cpu.memory;
        bus.lagged = true;
        bus.input.set_buttons(self.input.pads);
        if bus.scheduler.state() == SchedulerState::Idle {
            bus.scheduler.set_state(SchedulerState::Running);
        }
        self.frame += 1;

        let start = bus.scheduler.cpu_cycles();
        while !self.cpu.memory.ppu.take_frame_ready() {
            run_cpu_one(&mut self.cpu)?;
            if self.cpu.memory.scheduler.cpu_cycles() - start > MAX_CYCLES_PER_FRAME {
                return Err(NesError::TimingInvariant("frame never reached vblank"));
            }
        }

        // A transfer in flight carries over into the next frame.
        if self.cpu.memory.scheduler.state() == SchedulerState::Running {
            self.cpu.memory.scheduler.set_state(SchedulerState::Idle);
        }
        self.is_lag = self.cpu.memory.lagged;
        if self.is_lag {
            self.lag_count += 1;
        }
        Ok(())
    }

    /// Reset button: CPU, PPU and APU reset lines plus the board's reset hook.
    pub fn soft_reset(&mut self) {
        log(LogCategory::CPU, LogLevel::Info, || "soft reset".to_string());
        let bus = &mut self.cpu.memory;
        bus.ppu.reset();
        bus.apu.reset();
        bus.board.soft_reset();
        bus.scheduler.set_state(SchedulerState::Idle);
        self.cpu.reset();
    }

    /// Power cycle. Instrumentation and battery-backed RAM survive.
    pub fn hard_reset(&mut self) -> Result<(), NesError> {
        log(LogCategory::CPU, LogLevel::Info, || "power cycle".to_string());
        let mut fresh = NesSystem::new(&self.rom, self.settings.clone())?;
        let old = &mut self.cpu.memory;
        let new = &mut fresh.cpu.memory;
        *new.hooks_mut() = std::mem::take(old.hooks_mut());
        *new.watches_mut() = std::mem::take(old.watches_mut());
        if self.battery {
            new.board.core_mut().wram = std::mem::take(&mut old.board.core_mut().wram);
        }
        self.cpu = fresh.cpu;
        self.bridge = fresh.bridge;
        self.halted = false;
        Ok(())
    }

    /// Resample all audio since the last drain into exactly `count` samples.
    pub fn drain_audio(&mut self, count: usize) -> Vec<AudioSample> {
        let bus = &mut self.cpu.memory;
        let (events, clocks) = bus.apu.queue_mut().take();
        let mut out = self.bridge.pull(&events, clocks, count);
        bus.board.mix_audio(&mut out);
        out
    }

    /// Resample what the elapsed time covers at the output rate.
    pub fn drain_available_audio(&mut self) -> Vec<AudioSample> {
        let bus = &mut self.cpu.memory;
        let (events, clocks) = bus.apu.queue_mut().take();
        let mut out = self.bridge.drain(&events, clocks);
        bus.board.mix_audio(&mut out);
        out
    }

    fn sync_all(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        self.cpu.sync_state(s)?;
        let bus = &mut self.cpu.memory;
        bus.ppu.sync_state(s)?;
        bus.apu.sync_state(s)?;

        s.begin_section("RAM")?;
        s.sync_bytes("Data", &mut bus.ram)?;
        s.end_section("RAM")?;

        s.begin_section("Board")?;
        bus.board.sync_state(s)?;
        s.end_section("Board")?;

        s.begin_section("Bus")?;
        s.sync_u8("DB", &mut bus.db)?;
        s.sync_bool("Lagged", &mut bus.lagged)?;
        bus.input.sync_state(s)?;
        s.end_section("Bus")?;

        bus.scheduler.sync_state(s)?;

        s.begin_section("Session")?;
        s.sync_u64("Frame", &mut self.frame)?;
        s.sync_u64("LagCount", &mut self.lag_count)?;
        s.sync_bool("IsLag", &mut self.is_lag)?;
        self.bridge.sync_state(s)?;
        s.end_section("Session")
    }

    fn post_load(&mut self) {
        let bus = &mut self.cpu.memory;
        bus.board.post_load_state();
        bus.ppu.post_load();
        self.halted = false;
    }

    fn snapshot(&mut self, format: StateFormat) -> Result<Vec<u8>, StateError> {
        let mut s = Serializer::writer(format, SYSTEM_ID, STATE_VERSION);
        self.sync_all(&mut s)?;
        s.into_bytes()
    }

    /// The same snapshot as a JSON document.
    pub fn save_state_text(&mut self) -> Result<String, NesError> {
        let bytes = self.snapshot(StateFormat::Text)?;
        String::from_utf8(bytes).map_err(|e| StateError::Text(e.to_string()).into())
    }

    /// Apply a prepared reader. On any failure the previous state is put back.
    fn restore(&mut self, mut reader: Serializer<'_>) -> Result<(), NesError> {
        let backup = self.snapshot(StateFormat::Binary)?;
        let result = self.sync_all(&mut reader).and_then(|()| reader.finish());
        match result {
            Ok(()) => {
                self.post_load();
                log(LogCategory::State, LogLevel::Info, || {
                    format!("state loaded at frame {}", self.frame)
                });
                Ok(())
            }
            Err(err) => {
                log(LogCategory::State, LogLevel::Warn, || {
                    format!("state rejected, restoring previous state: {}", err)
                });
                let halted = self.halted;
                let mut undo = Serializer::binary_reader(&backup, SYSTEM_ID, STATE_VERSION)?;
                self.sync_all(&mut undo)?;
                self.post_load();
                self.halted = halted;
                Err(err.into())
            }
        }
    }

    pub fn load_state_bytes(&mut self, blob: &[u8]) -> Result<(), NesError> {
        let reader = Serializer::binary_reader(blob, SYSTEM_ID, STATE_VERSION)?;
        self.restore(reader)
    }

    pub fn load_state_text(&mut self, text: &str) -> Result<(), NesError> {
        let reader = Serializer::text_reader(text, SYSTEM_ID, STATE_VERSION)?;
        self.restore(reader)
    }

    /// Override reads of `addr`, optionally only while the real byte is `compare`.
    pub fn apply_cheat(&mut self, addr: u16, value: u8, compare: Option<u8>) {
        self.cpu
            .memory
            .watches_mut()
            .insert(addr as u32, Watch { value, compare });
    }

    pub fn remove_cheat(&mut self, addr: u16) -> bool {
        self.cpu.memory.watches_mut().remove(addr as u32).is_some()
    }

    pub fn clear_cheats(&mut self) {
        self.cpu.memory.watches_mut().clear();
    }

    /// Read/write/execute callbacks. They survive resets and state loads.
    pub fn hooks_mut(&mut self) -> &mut MemoryHooks {
        self.cpu.memory.hooks_mut()
    }
}

impl System for NesSystem {
    type Error = NesError;

    fn reset(&mut self) {
        self.soft_reset();
    }

    fn frame_advance(&mut self) -> Result<(), Self::Error> {
        self.run_frame()
    }

    fn frame_buffer(&self) -> &Frame {
        self.cpu.memory.ppu.frame()
    }

    fn drain_audio(&mut self, count: usize) -> Vec<AudioSample> {
        NesSystem::drain_audio(self, count)
    }

    fn save_state(&mut self) -> Result<Vec<u8>, Self::Error> {
        Ok(self.snapshot(StateFormat::Binary)?)
    }

    fn load_state(&mut self, blob: &[u8]) -> Result<(), Self::Error> {
        self.load_state_bytes(blob)
    }

    fn memory_domains(&self) -> Vec<MemoryDomainInfo> {
        domains::list(&self.cpu.memory)
    }

    fn read_memory_domain(&self, domain: &str, addr: usize) -> Result<u8, Self::Error> {
        domains::read(&self.cpu.memory, domain, addr)
    }

    fn write_memory_domain(
        &mut self,
        domain: &str,
        addr: usize,
        value: u8,
    ) -> Result<(), Self::Error> {
        domains::write(&mut self.cpu.memory, domain, addr, value)
    }

    fn registers(&self) -> Vec<(String, u32)> {
        self.cpu.registers()
    }

    fn frame_count(&self) -> u64 {
        self.frame
    }

    fn lag_count(&self) -> u64 {
        self.lag_count
    }

    fn is_lag(&self) -> bool {
        self.is_lag
    }
}

//! Core emulator primitives and traits.

pub mod apu;
pub mod audio_bridge;
pub mod bus_map;
pub mod cpu_6502;
pub mod logging;
pub mod ppu;
pub mod state;
pub mod timing;

pub mod types {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        pub pixels: Vec<u32>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![0; (width * height) as usize],
            }
        }
    }

    pub type AudioSample = i16;
}

use state::SyncState;

/// Fatal conditions raised by a CPU core while executing an instruction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CpuError {
    /// Opcode with no defined behavior (including the JAM/KIL family).
    #[error("illegal opcode ${opcode:02X} at ${pc:04X}")]
    IllegalOpcode { opcode: u8, pc: u16 },
}

/// A CPU that owns its bus and can be stepped one instruction at a time.
///
/// Every bus access the CPU performs is one machine cycle, so the bus
/// implementation is where the rest of the machine gets clocked.
pub trait Cpu: SyncState {
    type Bus;

    /// Power-on initialization (registers to their documented reset values).
    fn power_on(&mut self);

    /// Soft reset through the reset vector.
    fn reset(&mut self);

    /// Execute one instruction (or one interrupt entry) and return cycles used.
    fn step(&mut self) -> Result<u32, CpuError>;

    /// Level-triggered maskable interrupt input.
    fn set_irq_line(&mut self, asserted: bool);

    /// Latch a non-maskable interrupt edge.
    fn trigger_nmi(&mut self);

    /// Ordered (name, value) pairs for debugging displays.
    fn registers(&self) -> Vec<(String, u32)>;

    /// Total cycles executed since power-on.
    fn total_cycles(&self) -> u64;

    fn bus(&self) -> &Self::Bus;

    fn bus_mut(&mut self) -> &mut Self::Bus;
}

/// Description of an addressable memory region exposed for tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDomainInfo {
    /// Unique name (e.g., "RAM", "System Bus")
    pub name: String,
    /// Size in bytes; valid addresses are `0..size`
    pub size: usize,
    /// Whether `write_memory_domain` is accepted
    pub writable: bool,
}

/// A high-level System trait tying components together.
pub trait System {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Soft reset, as if the console's reset button was pressed
    fn reset(&mut self);

    /// Emulate until the video chip completes exactly one frame.
    fn frame_advance(&mut self) -> Result<(), Self::Error>;

    /// The most recently completed frame.
    fn frame_buffer(&self) -> &types::Frame;

    /// Resample everything produced since the last drain into exactly `count` samples.
    fn drain_audio(&mut self, count: usize) -> Vec<types::AudioSample>;

    /// Serialize all emulation state into a versioned binary snapshot.
    /// Save states never include ROM/cartridge data.
    fn save_state(&mut self) -> Result<Vec<u8>, Self::Error>;

    /// Restore a snapshot produced by `save_state`. On error the system is unchanged.
    fn load_state(&mut self, blob: &[u8]) -> Result<(), Self::Error>;

    /// Memory regions available to debugging tools
    fn memory_domains(&self) -> Vec<MemoryDomainInfo>;

    /// Side-effect free read from a named memory domain
    fn read_memory_domain(&self, domain: &str, addr: usize) -> Result<u8, Self::Error>;

    /// Debug write into a named memory domain. Does not advance time.
    fn write_memory_domain(&mut self, domain: &str, addr: usize, value: u8)
        -> Result<(), Self::Error>;

    /// CPU registers as ordered (name, value) pairs
    fn registers(&self) -> Vec<(String, u32)>;

    /// Frames emulated since power-on
    fn frame_count(&self) -> u64;

    /// Frames in which the game never polled its input
    fn lag_count(&self) -> u64;

    /// Whether the most recent frame was a lag frame
    fn is_lag(&self) -> bool;
}

//! Console region timing configuration.

use serde::{Deserialize, Serialize};

/// Console region timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingMode {
    /// NTSC (North America, Japan) - 1.789773 MHz CPU clock
    #[default]
    Ntsc,
    /// PAL (Europe, Australia) - 1.662607 MHz CPU clock
    Pal,
    /// Dendy (PAL famiclones) - 1.773448 MHz CPU clock, NTSC-like APU
    Dendy,
}

impl TimingMode {
    /// CPU clock frequency in whole Hz. Audio resampling uses this exact value.
    pub fn cpu_clock_hz(&self) -> u32 {
        match self {
            TimingMode::Ntsc => 1_789_773,
            TimingMode::Pal => 1_662_607,
            TimingMode::Dendy => 1_773_448,
        }
    }

    /// Get the frame rate in Hz for this timing mode
    pub fn frame_rate_hz(&self) -> f64 {
        match self {
            TimingMode::Ntsc => 60.0988,
            TimingMode::Pal => 50.0070,
            TimingMode::Dendy => 50.0070,
        }
    }

    /// Whether the APU uses the PAL period and frame-sequencer tables.
    pub fn uses_pal_apu_tables(&self) -> bool {
        matches!(self, TimingMode::Pal)
    }

    /// Stable numeric id used in save states.
    pub fn to_u8(self) -> u8 {
        match self {
            TimingMode::Ntsc => 0,
            TimingMode::Pal => 1,
            TimingMode::Dendy => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TimingMode::Ntsc),
            1 => Some(TimingMode::Pal),
            2 => Some(TimingMode::Dendy),
            _ => None,
        }
    }
}

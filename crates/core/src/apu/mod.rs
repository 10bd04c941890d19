//! NES APU components.
//!
//! Channels are built from shared units:
//!
//! - **Pulse Channel**: Square wave generator with duty cycle control and sweep
//! - **Triangle Channel**: Triangle wave generator with linear counter
//! - **Noise Channel**: Pseudo-random noise generator using LFSR
//! - **DMC**: Delta-modulated sample playback fetched over the CPU bus
//! - **Length Counter**: Automatic note duration control
//! - **Envelope**: Volume envelope generator with decay
//! - **Frame Counter**: Timing controller for envelope and length counter units
//!
//! [`Rp2a03Apu`] combines them and implements [`AudioChip`]. NTSC and PAL
//! parts share the implementation and differ by [`TimingMode`].

pub mod audio_chip;
pub mod dmc;
pub mod envelope;
pub mod frame_counter;
pub mod length_counter;
pub mod noise;
pub mod pulse;
pub mod rp2a03;
pub mod triangle;

pub use crate::timing::TimingMode;
pub use audio_chip::AudioChip;
pub use dmc::DmcChannel;
pub use envelope::Envelope;
pub use frame_counter::{FrameClocks, FrameCounter};
pub use length_counter::{LengthCounter, LENGTH_TABLE};
pub use noise::NoiseChannel;
pub use pulse::{PulseChannel, PulseId};
pub use rp2a03::Rp2a03Apu;
pub use triangle::TriangleChannel;

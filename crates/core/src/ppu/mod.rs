//! Reusable video building blocks.

pub mod palette;

pub use palette::{CompiledPalette, IndexedPalette, NES_MASTER_PALETTE};

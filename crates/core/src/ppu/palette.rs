//! Indexed palettes for retro video hardware.
//!
//! Video chips produce palette indices; a host-facing frame needs ARGB.
//! [`CompiledPalette`] expands a 64-entry master palette into every
//! emphasis/tint combination once, so converting a frame is a table lookup
//! per pixel.

/// Maps color indices to 32-bit ARGB colors (0xAARRGGBB).
pub trait IndexedPalette {
    /// Get the ARGB color for a palette index.
    fn get_color(&self, index: usize) -> u32;

    /// Get the number of colors in this palette.
    fn len(&self) -> usize;

    /// Check if the palette is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 2C02 master palette (RGB), packed as 0xFFRRGGBB.
/// This is a commonly used approximation; exact values vary by decoder.
pub const NES_MASTER_PALETTE: [u32; 64] = [
    0xFF545454, 0xFF001E74, 0xFF081090, 0xFF300088, 0xFF440064, 0xFF5C0030, 0xFF540400, 0xFF3C1800,
    0xFF202A00, 0xFF083A00, 0xFF004000, 0xFF003C00, 0xFF00323C, 0xFF000000, 0xFF000000, 0xFF000000,
    0xFF989698, 0xFF084CC4, 0xFF3032EC, 0xFF5C1EE4, 0xFF8814B0, 0xFFA01464, 0xFF982220, 0xFF783C00,
    0xFF545A00, 0xFF287200, 0xFF087C00, 0xFF007628, 0xFF006678, 0xFF000000, 0xFF000000, 0xFF000000,
    0xFFECEEEC, 0xFF4C9AEC, 0xFF787CEC, 0xFFB062EC, 0xFFE454EC, 0xFFEC58B4, 0xFFEC6A64, 0xFFD48820,
    0xFFA0AA00, 0xFF74C400, 0xFF4CD020, 0xFF38CC6C, 0xFF38B4CC, 0xFF3C3C3C, 0xFF000000, 0xFF000000,
    0xFFECEEEC, 0xFFA8CCEC, 0xFFBCBCEC, 0xFFD4B2EC, 0xFFECAEEC, 0xFFECAED4, 0xFFECC4B0, 0xFFE4D4A0,
    0xFFCCDCA0, 0xFFB4E4A0, 0xFFA8E4B4, 0xFFA0E4CC, 0xFFA0D4E4, 0xFFA0A2A0, 0xFF000000, 0xFF000000,
];

/// Attenuation applied to the channels that are not emphasized, in 1/1000.
const EMPHASIS_ATTENUATION: u32 = 816;

/// A master palette expanded over the 8 emphasis combinations.
///
/// Index layout is `color | emphasis << 6`, where emphasis bit 0 emphasizes
/// red, bit 1 green and bit 2 blue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPalette {
    colors: Vec<u32>,
}

impl CompiledPalette {
    pub const ENTRIES: usize = 64 * 8;

    pub fn compile(base: &[u32; 64]) -> Self {
        let mut colors = Vec::with_capacity(Self::ENTRIES);
        for emphasis in 0..8u32 {
            for &color in base.iter() {
                colors.push(apply_emphasis(color, emphasis));
            }
        }
        Self { colors }
    }

    /// Convert an indexed buffer into ARGB pixels.
    pub fn convert(&self, indices: &[u16], out: &mut [u32]) {
        for (dst, &index) in out.iter_mut().zip(indices) {
            *dst = self.get_color(index as usize);
        }
    }
}

impl Default for CompiledPalette {
    fn default() -> Self {
        Self::compile(&NES_MASTER_PALETTE)
    }
}

impl IndexedPalette for CompiledPalette {
    fn get_color(&self, index: usize) -> u32 {
        self.colors[index % Self::ENTRIES]
    }

    fn len(&self) -> usize {
        self.colors.len()
    }
}

fn apply_emphasis(color: u32, emphasis: u32) -> u32 {
    if emphasis == 0 {
        return color;
    }
    let channels = [(color >> 16) & 0xFF, (color >> 8) & 0xFF, color & 0xFF];
    let mut out = 0xFF00_0000;
    for (i, &value) in channels.iter().enumerate() {
        let value = if emphasis & (1 << i) == 0 {
            value * EMPHASIS_ATTENUATION / 1000
        } else {
            value
        };
        out |= value << (16 - 8 * i);
    }
    out
}

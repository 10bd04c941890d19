//! Cartridge images: iNES headers and raw PRG dumps.

use crate::NesError;
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

const INES_MAGIC: &[u8; 4] = b"NES\x1A";
const HEADER_LEN: usize = 16;
const TRAINER_LEN: usize = 512;

/// Largest raw PRG image mapped without a header (NROM-256).
const RAW_PRG_SIZE: usize = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    FourScreen,
    SingleScreenLower,
    SingleScreenUpper,
}

impl Mirroring {
    /// 1 KB CIRAM page backing logical nametable `table` (0-3).
    pub fn nametable_page(self, table: u16) -> usize {
        let table = (table & 3) as usize;
        match self {
            Mirroring::Horizontal => table >> 1,
            Mirroring::Vertical => table & 1,
            Mirroring::FourScreen => table,
            Mirroring::SingleScreenLower => 0,
            Mirroring::SingleScreenUpper => 1,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Mirroring::Horizontal => 0,
            Mirroring::Vertical => 1,
            Mirroring::FourScreen => 2,
            Mirroring::SingleScreenLower => 3,
            Mirroring::SingleScreenUpper => 4,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Mirroring::Horizontal),
            1 => Some(Mirroring::Vertical),
            2 => Some(Mirroring::FourScreen),
            3 => Some(Mirroring::SingleScreenLower),
            4 => Some(Mirroring::SingleScreenUpper),
            _ => None,
        }
    }
}

/// Decoded cartridge contents. ROM data never enters a save state.
#[derive(Debug, Clone)]
pub struct Cartridge {
    pub prg_rom: Vec<u8>,
    /// Empty when the board uses CHR RAM.
    pub chr_rom: Vec<u8>,
    pub mapper: u16,
    pub mirroring: Mirroring,
    /// Battery-backed save RAM present
    pub battery: bool,
    pub prg_ram_size: usize,
    pub chr_ram_size: usize,
}

impl Cartridge {
    /// Accept an iNES image, or treat anything else as a raw PRG dump.
    pub fn from_bytes(data: &[u8]) -> Result<Self, NesError> {
        if data.starts_with(INES_MAGIC) {
            Self::from_ines(data)
        } else {
            Self::from_prg_image(data)
        }
    }

    /// iNES loader (NES 2.0 headers contribute the high mapper bits).
    pub fn from_ines(data: &[u8]) -> Result<Self, NesError> {
        if data.len() < HEADER_LEN || !data.starts_with(INES_MAGIC) {
            return Err(NesError::InvalidRom("missing iNES header".into()));
        }
        let header = &data[..HEADER_LEN];
        let prg_size = header[4] as usize * 16 * 1024;
        let chr_size = header[5] as usize * 8 * 1024;
        let nes2 = header[7] & 0x0C == 0x08;

        let mut mapper = u16::from((header[6] >> 4) | (header[7] & 0xF0));
        if nes2 {
            mapper |= u16::from(header[8] & 0x0F) << 8;
        }

        // iNES flags 6:
        // bit 0 = mirroring (0 horizontal, 1 vertical)
        // bit 1 = battery
        // bit 2 = trainer
        // bit 3 = four-screen VRAM
        let mirroring = if header[6] & 0x08 != 0 {
            Mirroring::FourScreen
        } else if header[6] & 0x01 != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };
        let battery = header[6] & 0x02 != 0;
        let mut offset = HEADER_LEN;
        if header[6] & 0x04 != 0 {
            offset += TRAINER_LEN;
        }

        if prg_size == 0 {
            return Err(NesError::InvalidRom("header declares no PRG ROM".into()));
        }
        let prg_end = offset + prg_size;
        let chr_end = prg_end + chr_size;
        if data.len() < chr_end {
            return Err(NesError::InvalidRom(format!(
                "image is {} bytes, header needs {}",
                data.len(),
                chr_end
            )));
        }

        let prg_ram_size = if nes2 {
            let shift = header[10] & 0x0F;
            let nv_shift = header[10] >> 4;
            let volatile = if shift == 0 { 0 } else { 64usize << shift };
            let battery_backed = if nv_shift == 0 { 0 } else { 64usize << nv_shift };
            (volatile + battery_backed).max(0x2000)
        } else {
            (header[8] as usize).max(1) * 0x2000
        };

        Ok(Self {
            prg_rom: data[offset..prg_end].to_vec(),
            chr_rom: data[prg_end..chr_end].to_vec(),
            mapper,
            mirroring,
            battery,
            prg_ram_size,
            chr_ram_size: if chr_size == 0 { 0x2000 } else { 0 },
        })
    }

    /// Headerless PRG image on an NROM board with CHR RAM. Short images are
    /// tiled to fill 32 KB; longer ones are truncated.
    pub fn from_prg_image(data: &[u8]) -> Result<Self, NesError> {
        if data.is_empty() {
            return Err(NesError::InvalidRom("empty ROM image".into()));
        }
        if data.len() > RAW_PRG_SIZE {
            log(LogCategory::Bus, LogLevel::Warn, || {
                format!(
                    "raw PRG image is {} bytes, truncating to {}",
                    data.len(),
                    RAW_PRG_SIZE
                )
            });
        }
        let prg_rom = (0..RAW_PRG_SIZE).map(|i| data[i % data.len()]).collect();

        Ok(Self {
            prg_rom,
            chr_rom: Vec::new(),
            mapper: 0,
            mirroring: Mirroring::Vertical,
            battery: false,
            prg_ram_size: 0x2000,
            chr_ram_size: 0x2000,
        })
    }
}

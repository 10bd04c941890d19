//! Session settings.
//!
//! Settings are plain data with a default for every field, so a partial JSON
//! document (or none at all) is always accepted.

use crate::NesError;
use emu_core::timing::TimingMode;
use serde::{Deserialize, Serialize};

/// Power-on contents of the 2 KB internal RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RamInit {
    /// `$FF` where address bit 2 is set, `$00` elsewhere (common on real consoles)
    #[default]
    Pattern,
    Zero,
    Fill(u8),
}

impl RamInit {
    pub fn byte_at(self, addr: usize) -> u8 {
        match self {
            RamInit::Pattern => {
                if addr & 4 != 0 {
                    0xFF
                } else {
                    0x00
                }
            }
            RamInit::Zero => 0,
            RamInit::Fill(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NesSettings {
    pub region: TimingMode,
    /// Output rate of `drain_available_audio` and board expansion audio
    pub sample_rate: u32,
    /// Pending audio events kept per chip before changes are dropped
    pub max_audio_events: usize,
    /// CPU cycles an undrained audio span may cover before it is discarded
    pub max_audio_clocks: u32,
    pub ram_init: RamInit,
    /// 64 ARGB colors replacing the built-in palette
    pub palette: Option<Vec<u32>>,
}

impl Default for NesSettings {
    fn default() -> Self {
        Self {
            region: TimingMode::Ntsc,
            sample_rate: 44_100,
            max_audio_events: 1 << 16,
            // About ten NTSC frames.
            max_audio_clocks: 300_000,
            ram_init: RamInit::Pattern,
            palette: None,
        }
    }
}

impl NesSettings {
    pub fn from_json(text: &str) -> Result<Self, NesError> {
        let settings: Self = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, NesError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), NesError> {
        if let Some(palette) = &self.palette {
            if palette.len() != 64 {
                return Err(NesError::InvalidSettings(format!(
                    "palette needs 64 colors, got {}",
                    palette.len()
                )));
            }
        }
        if self.sample_rate == 0 {
            return Err(NesError::InvalidSettings("sample_rate must be non-zero".into()));
        }
        Ok(())
    }

    /// The custom palette as a fixed table, if one is configured.
    pub fn palette_table(&self) -> Option<[u32; 64]> {
        let colors = self.palette.as_ref()?;
        let mut table = [0u32; 64];
        if colors.len() != table.len() {
            return None;
        }
        table.copy_from_slice(colors);
        Some(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let settings = NesSettings::from_json("{}").unwrap();
        assert_eq!(settings, NesSettings::default());
    }

    #[test]
    fn partial_document() {
        let settings =
            NesSettings::from_json(r#"{"region":"pal","ram_init":{"fill":170}}"#).unwrap();
        assert_eq!(settings.region, TimingMode::Pal);
        assert_eq!(settings.ram_init, RamInit::Fill(0xAA));
        assert_eq!(settings.sample_rate, 44_100);
    }

    #[test]
    fn short_palette_rejected() {
        let err = NesSettings::from_json(r#"{"palette":[0,1,2]}"#).unwrap_err();
        assert!(matches!(err, NesError::InvalidSettings(_)));
    }

    #[test]
    fn malformed_json_is_a_settings_error() {
        assert!(matches!(
            NesSettings::from_json("{region"),
            Err(NesError::Settings(_))
        ));
    }

    #[test]
    fn ram_pattern() {
        assert_eq!(RamInit::Pattern.byte_at(0), 0x00);
        assert_eq!(RamInit::Pattern.byte_at(4), 0xFF);
        assert_eq!(RamInit::Pattern.byte_at(0x0B), 0x00);
        assert_eq!(RamInit::Pattern.byte_at(0x0C), 0xFF);
    }

    #[test]
    fn json_round_trip() {
        let mut settings = NesSettings::default();
        settings.region = TimingMode::Dendy;
        let text = settings.to_json().unwrap();
        assert_eq!(NesSettings::from_json(&text).unwrap(), settings);
    }
}

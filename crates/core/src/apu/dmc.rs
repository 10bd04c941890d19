//! Delta Modulation Channel (DMC) for NES APU.
//!
//! The DMC channel plays 1-bit delta-encoded samples from memory.
//!
//! ## Features
//!
//! - 7-bit output level (0-127)
//! - Sample playback from CPU memory; the bus performs the fetch and stalls the CPU
//! - 16 different sample rates
//! - Loop support
//! - IRQ generation on sample completion
//!
//! ## Register Interface
//!
//! - **$4010**: Flags and rate (IRQ enable, loop, rate index)
//! - **$4011**: Direct load (7-bit output level)
//! - **$4012**: Sample address ($C000 + address * 64)
//! - **$4013**: Sample length (length * 16 + 1 bytes)

use crate::state::{Serializer, StateError, SyncState};

/// NTSC DMC rate table (CPU cycles between output changes)
pub const DMC_RATE_TABLE_NTSC: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];

/// PAL DMC rate table (CPU cycles between output changes)
pub const DMC_RATE_TABLE_PAL: [u16; 16] = [
    398, 354, 316, 298, 276, 236, 210, 198, 176, 148, 132, 118, 98, 78, 66, 50,
];

/// NES DMC (Delta Modulation Channel).
#[derive(Debug, Clone)]
pub struct DmcChannel {
    pub irq_enabled: bool,
    pub loop_enabled: bool,
    /// Sample rate index (0-15)
    pub rate_index: u8,
    /// Current output level (7-bit, 0-127)
    pub output_level: u8,
    /// Sample start address ($C000 + address * 64)
    pub sample_address: u16,
    /// Sample length in bytes (length * 16 + 1)
    pub sample_length: u16,

    current_address: u16,
    bytes_remaining: u16,
    /// Byte fetched by the reader, waiting for the output unit
    sample_buffer: Option<u8>,
    shift_register: u8,
    bits_remaining: u8,
    timer: u16,
    silence: bool,
    pub irq_pending: bool,
}

impl DmcChannel {
    pub fn new() -> Self {
        Self {
            irq_enabled: false,
            loop_enabled: false,
            rate_index: 0,
            output_level: 0,
            sample_address: 0xC000,
            sample_length: 1,
            current_address: 0xC000,
            bytes_remaining: 0,
            sample_buffer: None,
            shift_register: 0,
            bits_remaining: 8,
            timer: 0,
            silence: true,
            irq_pending: false,
        }
    }

    /// Write to $4010 - flags and rate
    pub fn write_flags_rate(&mut self, val: u8) {
        self.irq_enabled = (val & 0x80) != 0;
        self.loop_enabled = (val & 0x40) != 0;
        self.rate_index = val & 0x0F;
        if !self.irq_enabled {
            self.irq_pending = false;
        }
    }

    /// Write to $4011 - direct load
    pub fn write_direct_load(&mut self, val: u8) {
        self.output_level = val & 0x7F;
    }

    /// Write to $4012 - sample address
    pub fn write_sample_address(&mut self, val: u8) {
        self.sample_address = 0xC000 + (val as u16) * 64;
    }

    /// Write to $4013 - sample length
    pub fn write_sample_length(&mut self, val: u8) {
        self.sample_length = (val as u16) * 16 + 1;
    }

    /// $4015 bit 4. Enabling restarts an idle sample; disabling stops the reader.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.irq_pending = false;
        if !enabled {
            self.bytes_remaining = 0;
        } else if self.bytes_remaining == 0 {
            self.current_address = self.sample_address;
            self.bytes_remaining = self.sample_length;
        }
    }

    pub fn has_bytes_remaining(&self) -> bool {
        self.bytes_remaining > 0
    }

    /// Address the memory reader wants next, if the sample buffer is empty.
    pub fn fetch_request(&self) -> Option<u16> {
        if self.sample_buffer.is_none() && self.bytes_remaining > 0 {
            Some(self.current_address)
        } else {
            None
        }
    }

    /// Deliver the byte read for the last `fetch_request`.
    pub fn fill(&mut self, byte: u8) {
        self.sample_buffer = Some(byte);
        self.current_address = if self.current_address == 0xFFFF {
            0x8000
        } else {
            self.current_address + 1
        };
        self.bytes_remaining = self.bytes_remaining.saturating_sub(1);

        if self.bytes_remaining == 0 {
            if self.loop_enabled {
                self.current_address = self.sample_address;
                self.bytes_remaining = self.sample_length;
            } else if self.irq_enabled {
                self.irq_pending = true;
            }
        }
    }

    /// Clock the output unit for one CPU cycle.
    pub fn clock(&mut self, pal: bool) {
        if self.timer > 0 {
            self.timer -= 1;
            return;
        }
        let table = if pal {
            &DMC_RATE_TABLE_PAL
        } else {
            &DMC_RATE_TABLE_NTSC
        };
        self.timer = table[self.rate_index as usize] - 1;

        if !self.silence {
            if self.shift_register & 1 != 0 {
                if self.output_level <= 125 {
                    self.output_level += 2;
                }
            } else if self.output_level >= 2 {
                self.output_level -= 2;
            }
        }
        self.shift_register >>= 1;
        self.bits_remaining -= 1;

        if self.bits_remaining == 0 {
            self.bits_remaining = 8;
            match self.sample_buffer.take() {
                Some(byte) => {
                    self.shift_register = byte;
                    self.silence = false;
                }
                None => self.silence = true,
            }
        }
    }

    /// Current output level (0-127).
    pub fn output(&self) -> u8 {
        self.output_level
    }
}

impl Default for DmcChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncState for DmcChannel {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        let mut has_buffer = self.sample_buffer.is_some();
        let mut buffer = self.sample_buffer.unwrap_or(0);

        s.begin_section("DMC")?;
        s.sync_bool("IrqEnabled", &mut self.irq_enabled)?;
        s.sync_bool("Loop", &mut self.loop_enabled)?;
        s.sync_u8("Rate", &mut self.rate_index)?;
        s.sync_u8("Output", &mut self.output_level)?;
        s.sync_u16("SampleAddress", &mut self.sample_address)?;
        s.sync_u16("SampleLength", &mut self.sample_length)?;
        s.sync_u16("CurrentAddress", &mut self.current_address)?;
        s.sync_u16("BytesRemaining", &mut self.bytes_remaining)?;
        s.sync_bool("HasBuffer", &mut has_buffer)?;
        s.sync_u8("Buffer", &mut buffer)?;
        s.sync_u8("Shift", &mut self.shift_register)?;
        s.sync_u8("BitsRemaining", &mut self.bits_remaining)?;
        s.sync_u16("Timer", &mut self.timer)?;
        s.sync_bool("Silence", &mut self.silence)?;
        s.sync_bool("IrqPending", &mut self.irq_pending)?;
        s.end_section("DMC")?;

        if s.is_reader() {
            self.sample_buffer = has_buffer.then_some(buffer);
            if !(1..=8).contains(&self.bits_remaining) {
                return Err(StateError::InvalidValue(format!(
                    "DMC bits remaining {}",
                    self.bits_remaining
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dmc_direct_load() {
        let mut dmc = DmcChannel::new();
        dmc.write_direct_load(0xFF);
        assert_eq!(dmc.output_level, 0x7F); // Only 7 bits used

        dmc.write_direct_load(0x40);
        assert_eq!(dmc.output_level, 0x40);
    }

    #[test]
    fn test_dmc_sample_address_and_length() {
        let mut dmc = DmcChannel::new();
        dmc.write_sample_address(0x80);
        assert_eq!(dmc.sample_address, 0xC000 + 0x80 * 64);
        dmc.write_sample_length(0x10);
        assert_eq!(dmc.sample_length, 16 * 16 + 1);
    }

    #[test]
    fn test_fetch_request_follows_buffer() {
        let mut dmc = DmcChannel::new();
        assert_eq!(dmc.fetch_request(), None);

        dmc.write_sample_address(0x00);
        dmc.write_sample_length(0x00);
        dmc.set_enabled(true);
        assert_eq!(dmc.fetch_request(), Some(0xC000));

        dmc.fill(0xAA);
        assert_eq!(dmc.fetch_request(), None);
        assert!(!dmc.has_bytes_remaining());
    }

    #[test]
    fn test_irq_on_completion() {
        let mut dmc = DmcChannel::new();
        dmc.write_flags_rate(0x80);
        dmc.set_enabled(true);
        dmc.fill(0);
        assert!(dmc.irq_pending);

        dmc.write_flags_rate(0x00);
        assert!(!dmc.irq_pending);
    }

    #[test]
    fn test_loop_restarts_sample() {
        let mut dmc = DmcChannel::new();
        dmc.write_flags_rate(0xC0);
        dmc.set_enabled(true);
        dmc.fill(0);
        assert!(!dmc.irq_pending);
        assert!(dmc.has_bytes_remaining());
    }

    #[test]
    fn test_dmc_output_changes() {
        let mut dmc = DmcChannel::new();
        dmc.write_flags_rate(0x0F);
        dmc.output_level = 64;
        dmc.set_enabled(true);
        dmc.fill(0b1111_1111);

        // Drain the initial silent byte so the buffered one is loaded.
        for _ in 0..(8 * 54) {
            dmc.clock(false);
        }
        for _ in 0..(8 * 54) {
            dmc.clock(false);
        }
        assert_eq!(dmc.output(), 64 + 16);
    }
}

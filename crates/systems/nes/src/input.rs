//! Standard controllers on $4016/$4017 and the per-frame input record.

use emu_core::state::{Serializer, StateError, SyncState};
use serde::{Deserialize, Serialize};

/// Button bits of a pad byte, in the order the shift register reports them.
pub mod buttons {
    pub const A: u8 = 0x01;
    pub const B: u8 = 0x02;
    pub const SELECT: u8 = 0x04;
    pub const START: u8 = 0x08;
    pub const UP: u8 = 0x10;
    pub const DOWN: u8 = 0x20;
    pub const LEFT: u8 = 0x40;
    pub const RIGHT: u8 = 0x80;
}

/// Everything the host supplies for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputState {
    pub pads: [u8; 2],
    /// Console reset button, applied at the start of the frame
    pub reset: bool,
    /// Power cycle, applied at the start of the frame
    pub power: bool,
}

/// Two standard pads behind a shared strobe line.
#[derive(Debug, Clone, Default)]
pub struct ControllerDeck {
    buttons: [u8; 2],
    shift: [u8; 2],
    strobe: bool,
}

impl ControllerDeck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_buttons(&mut self, pads: [u8; 2]) {
        self.buttons = pads;
        if self.strobe {
            self.shift = self.buttons;
        }
    }

    /// $4016 write
    pub fn write_strobe(&mut self, val: u8) {
        self.strobe = val & 1 != 0;
        if self.strobe {
            self.shift = self.buttons;
        }
    }

    /// Serial read of `port` (0 or 1). Returns bit 0 only.
    pub fn read(&mut self, port: usize) -> u8 {
        let port = port & 1;
        if self.strobe {
            return self.buttons[port] & 1;
        }
        let bit = self.shift[port] & 1;
        // Official pads report 1 once all eight buttons are shifted out.
        self.shift[port] = (self.shift[port] >> 1) | 0x80;
        bit
    }

    pub fn peek(&self, port: usize) -> u8 {
        let port = port & 1;
        if self.strobe {
            self.buttons[port] & 1
        } else {
            self.shift[port] & 1
        }
    }
}

impl SyncState for ControllerDeck {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("Controllers")?;
        s.sync_bytes("Buttons", &mut self.buttons)?;
        s.sync_bytes("Shift", &mut self.shift)?;
        s.sync_bool("Strobe", &mut self.strobe)?;
        s.end_section("Controllers")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_out_buttons_in_order() {
        let mut deck = ControllerDeck::new();
        deck.set_buttons([buttons::A | buttons::START | buttons::RIGHT, 0]);
        deck.write_strobe(1);
        deck.write_strobe(0);
        let bits: Vec<u8> = (0..8).map(|_| deck.read(0)).collect();
        assert_eq!(bits, vec![1, 0, 0, 1, 0, 0, 0, 1]);
        assert_eq!(deck.read(0), 1);
        assert_eq!(deck.read(1), 0);
    }

    #[test]
    fn strobe_high_reports_a() {
        let mut deck = ControllerDeck::new();
        deck.write_strobe(1);
        deck.set_buttons([buttons::A, 0]);
        assert_eq!(deck.read(0), 1);
        assert_eq!(deck.read(0), 1);
    }

    #[test]
    fn peek_does_not_shift() {
        let mut deck = ControllerDeck::new();
        deck.set_buttons([buttons::B, 0]);
        deck.write_strobe(1);
        deck.write_strobe(0);
        assert_eq!(deck.peek(0), 0);
        assert_eq!(deck.peek(0), 0);
        deck.read(0);
        assert_eq!(deck.peek(0), 1);
    }

    #[test]
    fn input_state_json() {
        let input = InputState {
            pads: [buttons::UP, 0],
            reset: true,
            power: false,
        };
        let text = serde_json::to_string(&input).unwrap();
        assert_eq!(serde_json::from_str::<InputState>(&text).unwrap(), input);
    }
}

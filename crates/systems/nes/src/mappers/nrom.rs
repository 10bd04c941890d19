use super::{Board, BoardCore};
use crate::cartridge::Cartridge;
use emu_core::state::{Serializer, StateError, SyncState};

/// NROM (Mapper 0) - Basic mapper with no banking.
///
/// 16 KB images are mirrored into both halves of $8000-$FFFF.
#[derive(Debug)]
pub struct Nrom {
    core: BoardCore,
}

impl Nrom {
    pub fn new(cart: Cartridge) -> Self {
        Self {
            core: BoardCore::new(cart),
        }
    }
}

impl Board for Nrom {
    fn core(&self) -> &BoardCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BoardCore {
        &mut self.core
    }

    fn mapper_number(&self) -> u16 {
        0
    }

    fn name(&self) -> &'static str {
        "NROM"
    }
}

impl SyncState for Nrom {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("NROM")?;
        self.core.sync_state(s)?;
        s.end_section("NROM")
    }
}

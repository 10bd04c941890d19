//! Category-scoped logging for emulator components.
//!
//! Components log through [`log`] with a [`LogCategory`] and a [`LogLevel`].
//! Messages are built lazily, so a disabled category costs one level check.
//! Everything is forwarded to the `log` facade under a per-category target
//! (`emu::cpu`, `emu::ppu`, ...), which lets a frontend filter components with
//! the usual `RUST_LOG=emu::ppu=debug` syntax once it installs a logger.
//!
//! # Usage
//!
//! ```rust
//! use emu_core::logging::{log, LogLevel, LogCategory};
//!
//! // Log with lazy evaluation (zero cost when disabled)
//! log(LogCategory::CPU, LogLevel::Debug, || {
//!     format!("CPU: BRK at PC={:04X}", 0x1234)
//! });
//! ```

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// The matching `log` level, or `None` for `Off`.
    pub fn to_level(self) -> Option<log::Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(log::Level::Error),
            LogLevel::Warn => Some(log::Level::Warn),
            LogLevel::Info => Some(log::Level::Info),
            LogLevel::Debug => Some(log::Level::Debug),
            LogLevel::Trace => Some(log::Level::Trace),
        }
    }

    /// The matching `log` filter, used by frontends when building a logger.
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self.to_level() {
            Some(level) => level.to_level_filter(),
            None => log::LevelFilter::Off,
        }
    }
}

/// Log category for different emulator components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// CPU execution (instruction execution, PC tracing)
    CPU,
    /// Bus/memory access
    Bus,
    /// PPU (register writes, rendering)
    PPU,
    /// APU/audio
    APU,
    /// Interrupts (IRQ, NMI)
    Interrupts,
    /// Save state serialization and restore
    State,
    /// Unimplemented features/stubs
    Stubs,
}

impl LogCategory {
    pub const ALL: [LogCategory; 7] = [
        LogCategory::CPU,
        LogCategory::Bus,
        LogCategory::PPU,
        LogCategory::APU,
        LogCategory::Interrupts,
        LogCategory::State,
        LogCategory::Stubs,
    ];

    /// `log` target used for this category
    pub fn target(self) -> &'static str {
        match self {
            LogCategory::CPU => "emu::cpu",
            LogCategory::Bus => "emu::bus",
            LogCategory::PPU => "emu::ppu",
            LogCategory::APU => "emu::apu",
            LogCategory::Interrupts => "emu::irq",
            LogCategory::State => "emu::state",
            LogCategory::Stubs => "emu::stubs",
        }
    }
}

/// Whether a message for `category` at `level` would be emitted.
pub fn enabled(category: LogCategory, level: LogLevel) -> bool {
    match level.to_level() {
        Some(level) => log::log_enabled!(target: category.target(), level),
        None => false,
    }
}

/// Log a message built by `message` if the category is enabled at `level`.
pub fn log<F>(category: LogCategory, level: LogLevel, message: F)
where
    F: FnOnce() -> String,
{
    if let Some(lvl) = level.to_level() {
        if log::log_enabled!(target: category.target(), lvl) {
            log::log!(target: category.target(), lvl, "{}", message());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::from_str("off"), Some(LogLevel::Off));
        assert_eq!(LogLevel::from_str("ERROR"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_str("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("3"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("Debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("trace"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("loud"), None);
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Off < LogLevel::Error);
        assert!(LogLevel::Warn < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_level_filter_mapping() {
        assert_eq!(LogLevel::Off.to_level_filter(), log::LevelFilter::Off);
        assert_eq!(LogLevel::Warn.to_level_filter(), log::LevelFilter::Warn);
        assert_eq!(LogLevel::Trace.to_level(), Some(log::Level::Trace));
    }

    #[test]
    fn test_targets_are_distinct() {
        let mut targets: Vec<_> = LogCategory::ALL.iter().map(|c| c.target()).collect();
        targets.sort_unstable();
        targets.dedup();
        assert_eq!(targets.len(), LogCategory::ALL.len());
    }

    #[test]
    fn test_off_is_never_enabled() {
        for category in LogCategory::ALL {
            assert!(!enabled(category, LogLevel::Off));
        }
        // No logger installed: the message closure must not run.
        log(LogCategory::CPU, LogLevel::Trace, || {
            panic!("message built while logging is disabled")
        });
    }
}

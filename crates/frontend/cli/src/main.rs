use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use emu_core::timing::TimingMode;
use emu_core::System;
use emu_nes::{InputState, NesSettings, NesSystem};
use log::info;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Region {
    Ntsc,
    Pal,
    Dendy,
}

impl From<Region> for TimingMode {
    fn from(region: Region) -> Self {
        match region {
            Region::Ntsc => TimingMode::Ntsc,
            Region::Pal => TimingMode::Pal,
            Region::Dendy => TimingMode::Dendy,
        }
    }
}

/// Headless NES runner: emulates N frames and prints checksums.
#[derive(Parser)]
struct Args {
    /// iNES image or raw PRG dump
    rom: PathBuf,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// JSON settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Override the settings' region
    #[arg(long, value_enum)]
    region: Option<Region>,

    /// Pad 1 buttons held for the whole run (A=01 B=02 Select=04 Start=08 ...)
    #[arg(long, value_parser = parse_hex_u8, default_value = "0")]
    pad: u8,

    /// Restore this save state before running
    #[arg(long)]
    load: Option<PathBuf>,

    /// Write a save state after the run
    #[arg(long)]
    save: Option<PathBuf>,

    /// Use the JSON state format for --save and --load
    #[arg(long, default_value_t = false)]
    text: bool,

    /// Print registers after every frame
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Only print the final checksum line
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let digits = s.trim_start_matches("0x");
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid pad byte {s:?}: {e}"))
}

fn load_settings(args: &Args) -> Result<NesSettings> {
    let mut settings = match &args.settings {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading settings {}", path.display()))?;
            NesSettings::from_json(&text)?
        }
        None => NesSettings::default(),
    };
    if let Some(region) = args.region {
        settings.region = region.into();
    }
    Ok(settings)
}

fn frame_digest(nes: &NesSystem) -> String {
    let mut hasher = Sha256::new();
    for pixel in &nes.frame_buffer().pixels {
        hasher.update(pixel.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn format_registers(nes: &NesSystem) -> String {
    nes.registers()
        .iter()
        .filter(|(name, _)| !name.starts_with("Flag"))
        .map(|(name, value)| format!("{name}={value:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let rom = fs::read(&args.rom).with_context(|| format!("reading {}", args.rom.display()))?;
    let settings = load_settings(&args)?;
    let sample_rate = settings.sample_rate;
    let mut nes = NesSystem::new(&rom, settings)?;
    info!("loaded {} ({} bytes)", args.rom.display(), rom.len());

    if let Some(path) = &args.load {
        if args.text {
            let text = fs::read_to_string(path)?;
            nes.load_state_text(&text)?;
        } else {
            let blob = fs::read(path)?;
            nes.load_state(&blob)?;
        }
        info!("restored state from {}", path.display());
    }

    let mut audio = Sha256::new();
    let mut samples = 0usize;
    for _ in 0..args.frames {
        nes.set_input(InputState {
            pads: [args.pad, 0],
            ..InputState::default()
        });
        nes.frame_advance()
            .with_context(|| format!("frame {}", nes.frame_count()))?;
        for sample in nes.drain_available_audio() {
            audio.update(sample.to_le_bytes());
            samples += 1;
        }
        if args.debug && !args.quiet {
            println!("frame {:>5}: {}", nes.frame_count(), format_registers(&nes));
        }
    }

    if !args.quiet {
        println!(
            "frames {} lag {} audio {} samples @ {} Hz",
            nes.frame_count(),
            nes.lag_count(),
            samples,
            sample_rate
        );
        println!("audio sha256 {:x}", audio.finalize());
    }
    println!("frame sha256 {}", frame_digest(&nes));

    if let Some(path) = &args.save {
        if args.text {
            fs::write(path, nes.save_state_text()?)?;
        } else {
            fs::write(path, nes.save_state()?)?;
        }
        info!("wrote state to {}", path.display());
    }

    Ok(())
}

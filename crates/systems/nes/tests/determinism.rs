mod common;

use common::{checksum, counter_prg, demo_prg, demo_system, register_ram_checksum};
use emu_core::System;
use emu_nes::{InputState, NesSettings, NesSystem};

fn run(frames: usize) -> (String, Vec<u8>) {
    let mut nes = demo_system();
    for frame in 0..frames {
        nes.set_input(InputState {
            pads: [if frame % 3 == 0 { 0x01 } else { 0x00 }, 0],
            ..InputState::default()
        });
        nes.frame_advance().unwrap();
    }
    (checksum(&nes), nes.save_state().unwrap())
}

#[test]
fn identical_runs_are_identical() {
    let (sum_a, state_a) = run(40);
    let (sum_b, state_b) = run(40);
    assert_eq!(sum_a, sum_b);
    assert_eq!(state_a, state_b);
}

/// Registers and RAM after 60 frames of `counter_prg`: A=$80 X=$FF Y=0
/// S=$FF PC=$800C P=$A4, $11 = 59 NMIs, the last NMI frame at $01FD-$01FF,
/// everything else still the power-on pattern.
const COUNTER_PRG_60_FRAMES: &str =
    "e069e14cde1d7f502e648b1aa68ffcd459d7916b422be3fe8c943ca2849304dd";

#[test]
fn raw_prg_with_55aa_prefix_matches_recorded_checksum() {
    let prg = counter_prg();
    assert_eq!(&prg[..2], &[0x55, 0xAA]);
    assert_eq!(prg.len(), 0x8000);

    let mut nes = NesSystem::new(&prg, NesSettings::default()).unwrap();
    for _ in 0..60 {
        nes.frame_advance().unwrap();
    }
    assert_eq!(nes.frame_count(), 60);
    assert_eq!(nes.cpu().pc, 0x800C);
    assert_eq!(nes.read_memory_domain("RAM", 0x11).unwrap(), 59);
    assert_eq!(register_ram_checksum(&nes), COUNTER_PRG_60_FRAMES);
}

#[test]
fn demo_prg_replays_identically_over_60_frames() {
    let digest = || {
        let mut nes = NesSystem::new(&demo_prg(), NesSettings::default()).unwrap();
        for _ in 0..60 {
            nes.frame_advance().unwrap();
        }
        checksum(&nes)
    };
    assert_eq!(digest(), digest());
}

#[test]
fn program_actually_runs() {
    let mut nes = demo_system();
    for _ in 0..10 {
        nes.frame_advance().unwrap();
    }
    // NMI counter and main-loop counter both moved
    assert!(nes.read_memory_domain("RAM", 0x11).unwrap() > 0);
    let spins = nes.read_memory_domain("RAM", 0x10).unwrap();
    nes.frame_advance().unwrap();
    assert_ne!(nes.read_memory_domain("RAM", 0x10).unwrap(), spins);
    // Palette upload reached the PPU
    assert_eq!(nes.read_memory_domain("PALRAM", 0x05).unwrap(), 0x05);
    // Sprite page was copied by OAM DMA
    assert_eq!(nes.read_memory_domain("OAM", 0x41).unwrap(), 0x41);
}

#[test]
fn regions_differ_in_frame_length() {
    let cycles = |settings: NesSettings| {
        let mut nes = NesSystem::new(&common::ines(&demo_prg()), settings).unwrap();
        for _ in 0..5 {
            nes.frame_advance().unwrap();
        }
        let before = nes.bus().scheduler().cpu_cycles();
        nes.frame_advance().unwrap();
        nes.bus().scheduler().cpu_cycles() - before
    };
    let ntsc = cycles(NesSettings::default());
    let pal = cycles(NesSettings {
        region: emu_core::timing::TimingMode::Pal,
        ..NesSettings::default()
    });
    // 341 * 262 dots at 3 per cycle; 341 * 312 at 103 per 32 cycles
    assert!((29_765..29_800).contains(&ntsc), "ntsc frame {ntsc}");
    assert!((33_030..33_080).contains(&pal), "pal frame {pal}");
}

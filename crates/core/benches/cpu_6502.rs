use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use emu_core::audio_bridge::{AudioBridge, AudioEvent};
use emu_core::bus_map::{BusMap, BusMapBuilder, WatchTable};
use emu_core::cpu_6502::{Cpu6502, Memory6502};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Region {
    Ram,
    Io,
    Rom,
    Open,
}

/// Decoded bus with a per-access clock, shaped like a console bus.
struct BenchBus {
    map: BusMap<Region>,
    ram: [u8; 0x800],
    rom: Vec<u8>,
    watches: WatchTable,
    clocks: u64,
}

impl BenchBus {
    fn new() -> Self {
        let map = BusMapBuilder::new(16, 5, Region::Open)
            .map(0x0000..=0x1FFF, Region::Ram)
            .and_then(|b| b.map(0x4000..=0x401F, Region::Io))
            .and_then(|b| b.map(0x8000..=0xFFFF, Region::Rom))
            .map(|b| b.build())
            .unwrap();

        // LDA #$42; STA $0200; LDX $0200; INX; STX $4000; ADC #$01; JMP $8000
        let program = [
            0xA9, 0x42, 0x8D, 0x00, 0x02, 0xAE, 0x00, 0x02, 0xE8, 0x8E, 0x00, 0x40, 0x69, 0x01,
            0x4C, 0x00, 0x80,
        ];
        let mut rom = vec![0xEA; 0x8000];
        rom[..program.len()].copy_from_slice(&program);
        rom[0x7FFC] = 0x00;
        rom[0x7FFD] = 0x80;

        Self {
            map,
            ram: [0; 0x800],
            rom,
            watches: WatchTable::new(),
            clocks: 0,
        }
    }
}

impl Memory6502 for BenchBus {
    fn read(&mut self, addr: u16) -> u8 {
        self.clocks += 1;
        let value = self.peek(addr);
        self.watches.apply(addr as u32, value)
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.clocks += 1;
        if self.map.lookup(addr as usize) == Region::Ram {
            self.ram[addr as usize & 0x7FF] = val;
        }
    }

    fn peek(&self, addr: u16) -> u8 {
        match self.map.lookup(addr as usize) {
            Region::Ram => self.ram[addr as usize & 0x7FF],
            Region::Rom => self.rom[addr as usize & 0x7FFF],
            Region::Io | Region::Open => 0,
        }
    }
}

fn bench_cpu_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_6502_steps");

    for step_count in [10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(step_count),
            &step_count,
            |b, &count| {
                let mut cpu = Cpu6502::new(BenchBus::new());
                b.iter(|| {
                    cpu.power_on();
                    for _ in 0..count {
                        let _ = cpu.step();
                    }
                    black_box(cpu.memory.clocks);
                });
            },
        );
    }

    group.finish();
}

fn bench_bus_lookup(c: &mut Criterion) {
    let bus = BenchBus::new();
    c.bench_function("bus_map_lookup_64k", |b| {
        b.iter(|| {
            let mut hits = 0u32;
            for addr in 0..0x10000usize {
                if bus.map.lookup(black_box(addr)) == Region::Rom {
                    hits += 1;
                }
            }
            black_box(hits)
        });
    });
}

fn bench_audio_pull(c: &mut Criterion) {
    // One NTSC frame of a 440 Hz square wave
    let events: Vec<AudioEvent> = (0..60)
        .map(|i| AudioEvent {
            time: i * 496,
            delta: if i % 2 == 0 { 2000 } else { -2000 },
        })
        .collect();
    c.bench_function("audio_bridge_pull_frame", |b| {
        let mut bridge = AudioBridge::new(44_100, 1_789_773);
        b.iter(|| black_box(bridge.pull(&events, 29_781, 735)));
    });
}

criterion_group!(benches, bench_cpu_steps, bench_bus_lookup, bench_audio_pull);
criterion_main!(benches);

//! Conversion of timestamped amplitude changes into PCM samples.
//!
//! Sound chips do not produce samples. Each time a chip's mixed output level
//! changes it records an [`AudioEvent`] in its [`AudioQueue`], timestamped in
//! chip clocks since the last drain. The host side owns an [`AudioBridge`]
//! that turns a drained span into `i16` samples at the output rate, either
//! as an exact count ([`AudioBridge::pull`]) or as whatever the elapsed time
//! covers ([`AudioBridge::drain`]).
//!
//! Every delta is split linearly between the two output samples around its
//! position and then integrated, which gives first-order band limiting
//! without a filter kernel.

use crate::logging::{log, LogCategory, LogLevel};
use crate::state::{Serializer, StateError, SyncState};
use crate::types::AudioSample;

/// Fixed-point scale for sub-sample positions.
const FRAC: u64 = 1 << 16;

/// A change of the output level at `time` clocks into the current span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioEvent {
    pub time: u32,
    pub delta: i32,
}

/// Bounded queue of pending amplitude changes for one chip.
#[derive(Debug, Clone)]
pub struct AudioQueue {
    events: Vec<AudioEvent>,
    clock: u32,
    level: i32,
    max_events: usize,
    max_clocks: u32,
    dropped: u64,
}

impl AudioQueue {
    pub fn new(max_events: usize, max_clocks: u32) -> Self {
        Self {
            events: Vec::with_capacity(max_events.min(4096)),
            clock: 0,
            level: 0,
            max_events,
            max_clocks: max_clocks.max(1),
            dropped: 0,
        }
    }

    /// Advance the span by one chip clock. A span that reaches `max_clocks`
    /// without being drained is discarded.
    pub fn tick(&mut self) {
        self.clock += 1;
        if self.clock >= self.max_clocks {
            if !self.events.is_empty() {
                self.dropped += self.events.len() as u64;
                log(LogCategory::APU, LogLevel::Warn, || {
                    format!(
                        "audio span of {} clocks never drained, discarding {} events",
                        self.clock,
                        self.events.len()
                    )
                });
            }
            self.events.clear();
            self.clock = 0;
        }
    }

    /// Record the chip's current output level. No-op when it did not change.
    pub fn record(&mut self, level: i32) {
        if level == self.level {
            return;
        }
        if self.events.len() >= self.max_events {
            self.dropped += 1;
            log(LogCategory::APU, LogLevel::Warn, || {
                format!("audio queue full ({} events), dropping change", self.max_events)
            });
            return;
        }
        self.events.push(AudioEvent {
            time: self.clock,
            delta: level - self.level,
        });
        self.level = level;
    }

    /// Take the pending events and the span length in clocks.
    pub fn take(&mut self) -> (Vec<AudioEvent>, u32) {
        let clocks = std::mem::replace(&mut self.clock, 0);
        (std::mem::take(&mut self.events), clocks)
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clocks(&self) -> u32 {
        self.clock
    }

    /// Events lost to overflow since construction.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.clock = 0;
        self.level = 0;
    }
}

impl SyncState for AudioQueue {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        let mut packed: Vec<u8> = self
            .events
            .iter()
            .flat_map(|e| {
                let mut entry = [0u8; 8];
                entry[..4].copy_from_slice(&e.time.to_le_bytes());
                entry[4..].copy_from_slice(&e.delta.to_le_bytes());
                entry
            })
            .collect();

        s.begin_section("AudioQueue")?;
        s.sync_u32("Clock", &mut self.clock)?;
        s.sync_i32("Level", &mut self.level)?;
        s.sync_byte_vec("Events", &mut packed)?;
        s.end_section("AudioQueue")?;

        if s.is_reader() {
            if packed.len() % 8 != 0 {
                return Err(StateError::InvalidValue("AudioQueue.Events".into()));
            }
            self.events = packed
                .chunks_exact(8)
                .map(|c| AudioEvent {
                    time: u32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                    delta: i32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                })
                .collect();
        }
        Ok(())
    }
}

/// Host-side resampler from chip clocks to output samples.
#[derive(Debug, Clone)]
pub struct AudioBridge {
    sample_rate: u32,
    clock_rate: u32,
    level: i32,
    carry: [i32; 2],
    phase: u64,
}

impl AudioBridge {
    pub fn new(sample_rate: u32, clock_rate: u32) -> Self {
        Self {
            sample_rate,
            clock_rate: clock_rate.max(1),
            level: 0,
            carry: [0; 2],
            phase: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    /// Map a span of `clocks` onto exactly `n` samples.
    pub fn pull(&mut self, events: &[AudioEvent], clocks: u32, n: usize) -> Vec<AudioSample> {
        let n64 = n as u64;
        let clocks = u64::from(clocks);
        self.render(events, n, |time| {
            if clocks == 0 {
                0
            } else {
                u64::from(time) * n64 * FRAC / clocks
            }
        })
    }

    /// Produce as many samples as `clocks` covers at the output rate. The
    /// fractional remainder carries into the next call.
    pub fn drain(&mut self, events: &[AudioEvent], clocks: u32) -> Vec<AudioSample> {
        let sr = u64::from(self.sample_rate);
        let cr = u64::from(self.clock_rate);
        let start = self.phase;
        let total = start + u64::from(clocks) * sr;
        let n = (total / cr) as usize;
        self.phase = total % cr;
        self.render(events, n, |time| (start + u64::from(time) * sr) * FRAC / cr)
    }

    fn render<F>(&mut self, events: &[AudioEvent], n: usize, position: F) -> Vec<AudioSample>
    where
        F: Fn(u32) -> u64,
    {
        let mut acc = vec![0i32; n + 2];
        acc[0] = self.carry[0];
        acc[1] = self.carry[1];

        for event in events {
            let pos = position(event.time);
            let idx = ((pos / FRAC) as usize).min(n);
            let frac = (pos % FRAC) as i64;
            let late = (i64::from(event.delta) * frac / FRAC as i64) as i32;
            acc[idx] += event.delta - late;
            acc[idx + 1] += late;
        }

        let mut out = Vec::with_capacity(n);
        for step in &acc[..n] {
            self.level += step;
            out.push(self.level.clamp(i16::MIN as i32, i16::MAX as i32) as AudioSample);
        }
        if n == 0 {
            self.carry = [acc[0], acc[1]];
        } else {
            self.carry = [acc[n], acc[n + 1]];
        }
        out
    }

    /// Integrated output level before clamping.
    pub fn level(&self) -> i32 {
        self.level
    }
}

impl SyncState for AudioBridge {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        s.begin_section("AudioBridge")?;
        s.sync_i32("Level", &mut self.level)?;
        s.sync_i32("Carry0", &mut self.carry[0])?;
        s.sync_i32("Carry1", &mut self.carry[1])?;
        s.sync_u64("Phase", &mut self.phase)?;
        s.end_section("AudioBridge")?;
        if s.is_reader() && self.phase >= u64::from(self.clock_rate) {
            return Err(StateError::InvalidValue("AudioBridge.Phase".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_pulls_zeros() {
        let mut bridge = AudioBridge::new(44_100, 1_789_773);
        let out = bridge.pull(&[], 29_780, 735);
        assert_eq!(out.len(), 735);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn pull_returns_exact_count_for_empty_span() {
        let mut bridge = AudioBridge::new(44_100, 1_789_773);
        let events = [AudioEvent { time: 0, delta: 100 }];
        let out = bridge.pull(&events, 0, 4);
        assert_eq!(out, vec![100; 4]);
    }

    #[test]
    fn step_is_integrated_and_held() {
        let mut bridge = AudioBridge::new(10, 100);
        let events = [AudioEvent { time: 50, delta: 1000 }];
        let out = bridge.pull(&events, 100, 10);
        assert_eq!(&out[..5], &[0, 0, 0, 0, 0]);
        assert!(out[5..].iter().all(|&s| s == 1000));

        let next = bridge.pull(&[], 100, 3);
        assert_eq!(next, vec![1000; 3]);
    }

    #[test]
    fn delta_between_samples_is_split() {
        let mut bridge = AudioBridge::new(10, 100);
        // time 15 maps to 1.5 samples
        let events = [AudioEvent { time: 15, delta: 1000 }];
        let out = bridge.pull(&events, 100, 10);
        assert_eq!(out[0], 0);
        assert_eq!(out[1], 500);
        assert_eq!(out[2], 1000);
    }

    #[test]
    fn zero_sample_pull_keeps_deltas() {
        let mut bridge = AudioBridge::new(10, 100);
        let events = [AudioEvent { time: 3, delta: 250 }];
        assert!(bridge.pull(&events, 10, 0).is_empty());
        assert_eq!(bridge.pull(&[], 10, 2), vec![250, 250]);
    }

    #[test]
    fn drain_carries_fractional_phase() {
        let mut bridge = AudioBridge::new(3, 10);
        let mut total = 0;
        for _ in 0..10 {
            total += bridge.drain(&[], 1).len();
        }
        assert_eq!(total, 3);
    }

    #[test]
    fn output_is_clamped() {
        let mut bridge = AudioBridge::new(10, 10);
        let events = [AudioEvent {
            time: 0,
            delta: 100_000,
        }];
        let out = bridge.pull(&events, 10, 2);
        assert_eq!(out, vec![i16::MAX; 2]);
    }

    #[test]
    fn bridge_state_resumes_mid_step() {
        use crate::state::StateFormat;

        let mut bridge = AudioBridge::new(7, 100);
        let events = [AudioEvent { time: 99, delta: 900 }];
        bridge.drain(&events, 50);
        bridge.drain(&[], 33);

        let mut w = Serializer::writer(StateFormat::Binary, "test", 1);
        bridge.sync_state(&mut w).unwrap();
        let blob = w.into_bytes().unwrap();
        let mut restored = AudioBridge::new(7, 100);
        let mut r = Serializer::binary_reader(&blob, "test", 1).unwrap();
        restored.sync_state(&mut r).unwrap();
        r.finish().unwrap();

        for clocks in [10, 41, 77] {
            assert_eq!(restored.drain(&[], clocks), bridge.drain(&[], clocks));
        }
        assert_eq!(restored.level(), bridge.level());
    }

    #[test]
    fn queue_records_only_changes() {
        let mut q = AudioQueue::new(16, 1000);
        q.record(0);
        q.tick();
        q.record(40);
        q.record(40);
        q.tick();
        q.record(10);
        let (events, clocks) = q.take();
        assert_eq!(
            events,
            vec![
                AudioEvent { time: 1, delta: 40 },
                AudioEvent { time: 2, delta: -30 },
            ]
        );
        assert_eq!(clocks, 2);
        assert!(q.is_empty());
        assert_eq!(q.level(), 10);
    }

    #[test]
    fn queue_overflow_drops_and_counts() {
        let mut q = AudioQueue::new(2, 1000);
        q.record(1);
        q.record(2);
        q.record(3);
        assert_eq!(q.len(), 2);
        assert_eq!(q.dropped(), 1);
        // The next accepted change carries the full difference.
        q.take();
        q.record(5);
        let (events, _) = q.take();
        assert_eq!(events[0].delta, 3);
    }

    #[test]
    fn undrained_span_is_discarded() {
        let mut q = AudioQueue::new(16, 4);
        q.record(7);
        for _ in 0..4 {
            q.tick();
        }
        assert_eq!(q.clocks(), 0);
        assert!(q.is_empty());
        assert_eq!(q.dropped(), 1);
    }

    #[test]
    fn queue_state_round_trip() {
        use crate::state::StateFormat;

        let mut q = AudioQueue::new(16, 1000);
        q.tick();
        q.record(12);
        q.tick();
        q.record(-4);

        let mut w = Serializer::writer(StateFormat::Binary, "test", 1);
        q.sync_state(&mut w).unwrap();
        let blob = w.into_bytes().unwrap();

        let mut restored = AudioQueue::new(16, 1000);
        let mut r = Serializer::binary_reader(&blob, "test", 1).unwrap();
        restored.sync_state(&mut r).unwrap();
        r.finish().unwrap();
        assert_eq!(restored.take(), q.take());
        assert_eq!(restored.level(), -4);
    }
}

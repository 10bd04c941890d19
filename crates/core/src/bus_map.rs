//! Address decode tables and bus instrumentation.
//!
//! A [`BusMap`] translates an address into a handler tag in O(1). The address
//! space is split into fixed-size blocks (`1 << block_shift` bytes) and every
//! block holds exactly one tag, so the table is exhaustive by construction:
//! blocks nobody claimed resolve to the open-bus tag given to the builder.
//!
//! Instrumentation sits on top of the decode table rather than inside the
//! handlers. [`WatchTable`] overrides values returned by reads (cheat codes)
//! and [`MemoryHooks`] observes reads, writes and opcode fetches.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("address ${addr:X} is outside the {size:#X}-byte address space")]
    OutOfRange { addr: usize, size: usize },
    #[error("range ${start:04X}-${end:04X} overlaps an existing mapping")]
    Overlap { start: usize, end: usize },
    #[error("range ${start:04X}-${end:04X} is not aligned to {block}-byte blocks")]
    Misaligned { start: usize, end: usize, block: usize },
}

/// Incrementally describes a decode table. Ranges may be given in any order.
#[derive(Debug, Clone)]
pub struct BusMapBuilder<H> {
    address_bits: u32,
    block_shift: u32,
    open_bus: H,
    ranges: Vec<(usize, usize, H)>,
}

impl<H: Copy> BusMapBuilder<H> {
    pub fn new(address_bits: u32, block_shift: u32, open_bus: H) -> Self {
        assert!(block_shift <= address_bits && address_bits <= 24);
        Self {
            address_bits,
            block_shift,
            open_bus,
            ranges: Vec::new(),
        }
    }

    /// Claim `range` for `handler`. Fails if the range overlaps a previous
    /// claim, falls outside the address space or is not block aligned.
    pub fn map(mut self, range: RangeInclusive<usize>, handler: H) -> Result<Self, BusError> {
        let (start, end) = (*range.start(), *range.end());
        let size = 1usize << self.address_bits;
        if end >= size || start > end {
            return Err(BusError::OutOfRange { addr: end, size });
        }
        let block = 1usize << self.block_shift;
        if start % block != 0 || (end + 1) % block != 0 {
            return Err(BusError::Misaligned { start, end, block });
        }
        if self
            .ranges
            .iter()
            .any(|&(s, e, _)| start <= e && s <= end)
        {
            return Err(BusError::Overlap { start, end });
        }
        self.ranges.push((start, end, handler));
        Ok(self)
    }

    pub fn build(self) -> BusMap<H> {
        let blocks = 1usize << (self.address_bits - self.block_shift);
        let mut table = vec![self.open_bus; blocks];
        for &(start, end, handler) in &self.ranges {
            for slot in &mut table[start >> self.block_shift..=end >> self.block_shift] {
                *slot = handler;
            }
        }
        BusMap {
            address_bits: self.address_bits,
            block_shift: self.block_shift,
            open_bus: self.open_bus,
            table,
        }
    }
}

/// Immutable decode table produced by [`BusMapBuilder`].
#[derive(Debug, Clone)]
pub struct BusMap<H> {
    address_bits: u32,
    block_shift: u32,
    open_bus: H,
    table: Vec<H>,
}

impl<H: Copy + PartialEq> BusMap<H> {
    /// Number of addressable bytes.
    pub fn size(&self) -> usize {
        1usize << self.address_bits
    }

    pub fn open_bus(&self) -> H {
        self.open_bus
    }

    /// Resolve an address, rejecting addresses beyond the address space.
    pub fn resolve(&self, addr: usize) -> Result<H, BusError> {
        if addr >= self.size() {
            return Err(BusError::OutOfRange {
                addr,
                size: self.size(),
            });
        }
        Ok(self.table[addr >> self.block_shift])
    }

    /// Hot-path lookup. The address is masked to the address space.
    #[inline]
    pub fn lookup(&self, addr: usize) -> H {
        self.table[(addr & (self.size() - 1)) >> self.block_shift]
    }

    /// Merged `(start, end, handler)` runs covering the whole address space.
    pub fn ranges(&self) -> Vec<(usize, usize, H)> {
        let block = 1usize << self.block_shift;
        let mut runs: Vec<(usize, usize, H)> = Vec::new();
        for (i, &handler) in self.table.iter().enumerate() {
            let start = i * block;
            let end = start + block - 1;
            match runs.last_mut() {
                Some(last) if last.2 == handler && last.1 + 1 == start => last.1 = end,
                _ => runs.push((start, end, handler)),
            }
        }
        runs
    }
}

/// A value override installed on one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watch {
    /// Value returned instead of the real one
    pub value: u8,
    /// Only override when the real value equals this byte
    pub compare: Option<u8>,
}

/// Read overrides keyed by address (Game Genie style codes).
#[derive(Debug, Clone, Default)]
pub struct WatchTable {
    entries: BTreeMap<u32, Watch>,
}

impl WatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, addr: u32, watch: Watch) {
        self.entries.insert(addr, watch);
    }

    pub fn remove(&mut self, addr: u32) -> Option<Watch> {
        self.entries.remove(&addr)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Value the CPU sees at `addr` when the bus carries `real`.
    #[inline]
    pub fn apply(&self, addr: u32, real: u8) -> u8 {
        if self.entries.is_empty() {
            return real;
        }
        match self.entries.get(&addr) {
            Some(w) if w.compare.map_or(true, |c| c == real) => w.value,
            _ => real,
        }
    }
}

/// One observed bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusEvent {
    pub addr: u32,
    pub value: u8,
    /// CPU cycle counter at the time of the access
    pub cycle: u64,
}

type HookFn = Box<dyn FnMut(BusEvent) + Send>;

struct Hook {
    addr: Option<u32>,
    callback: HookFn,
}

/// Kinds of access a hook can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Read,
    Write,
    Execute,
}

/// Read, write and execute callbacks.
///
/// Hooks only observe. They cannot change the value on the bus and they do
/// not affect timing.
#[derive(Default)]
pub struct MemoryHooks {
    reads: Vec<Hook>,
    writes: Vec<Hook>,
    execs: Vec<Hook>,
}

impl fmt::Debug for MemoryHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHooks")
            .field("reads", &self.reads.len())
            .field("writes", &self.writes.len())
            .field("execs", &self.execs.len())
            .finish()
    }
}

impl MemoryHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `kind`; `addr` of `None` matches every address.
    pub fn add<F>(&mut self, kind: HookKind, addr: Option<u32>, callback: F)
    where
        F: FnMut(BusEvent) + Send + 'static,
    {
        let hook = Hook {
            addr,
            callback: Box::new(callback),
        };
        match kind {
            HookKind::Read => self.reads.push(hook),
            HookKind::Write => self.writes.push(hook),
            HookKind::Execute => self.execs.push(hook),
        }
    }

    pub fn clear(&mut self) {
        self.reads.clear();
        self.writes.clear();
        self.execs.clear();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty() && self.execs.is_empty()
    }

    #[inline]
    pub fn fire(&mut self, kind: HookKind, event: BusEvent) {
        let hooks = match kind {
            HookKind::Read => &mut self.reads,
            HookKind::Write => &mut self.writes,
            HookKind::Execute => &mut self.execs,
        };
        for hook in hooks.iter_mut() {
            if hook.addr.map_or(true, |a| a == event.addr) {
                (hook.callback)(event);
            }
        }
    }
}

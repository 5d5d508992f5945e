//! Pass scheduling and pass bookkeeping types.
//!
//! The engine resolves connectivity in discrete passes. A host simulation
//! either calls [`Engine::update`](crate::engine::Engine::update) directly
//! once per step, or calls [`Engine::tick`](crate::engine::Engine::tick)
//! every step and lets the [`PassSchedule`] coalesce work across
//! `pass_interval` ticks.

use crate::id::UpdateIter;

// ---------------------------------------------------------------------------
// Pass schedule
// ---------------------------------------------------------------------------

/// Tick and pass counters tracked by the engine.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PassSchedule {
    /// Host simulation ticks observed through `Engine::tick`.
    pub tick: u64,
    /// The most recent resolution pass.
    pub iter: UpdateIter,
    /// Ticks since the last pass ran.
    pub ticks_since_pass: u32,
}

impl PassSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one host tick. Returns `true` if a pass is due.
    pub fn advance_tick(&mut self, pass_interval: u32) -> bool {
        self.tick += 1;
        self.ticks_since_pass += 1;
        self.ticks_since_pass >= pass_interval.max(1)
    }

    /// Start a new pass and return its counter.
    pub fn begin_pass(&mut self) -> UpdateIter {
        self.iter = self.iter.next();
        self.ticks_since_pass = 0;
        self.iter
    }
}

// ---------------------------------------------------------------------------
// Pass report
// ---------------------------------------------------------------------------

/// What one resolution pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub iter: UpdateIter,
    /// Nodes whose edges were reconciled.
    pub edge_updates: usize,
    /// Edge reconciliations left queued because of the pass budget.
    pub deferred_edge_updates: usize,
    /// Nodes that received their first graph.
    pub initialized_nodes: usize,
    /// Graphs absorbed into another graph.
    pub merges: usize,
    /// Graphs created by splitting.
    pub splits: usize,
    /// Graphs destroyed (absorbed or emptied).
    pub graphs_destroyed: usize,
}

impl PassReport {
    /// Whether the pass changed any graph membership.
    pub fn changed_membership(&self) -> bool {
        self.initialized_nodes > 0 || self.merges > 0 || self.splits > 0 || self.graphs_destroyed > 0
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash for reproducibility checks.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    /// Start a new hash.
    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    /// Feed bytes into the hash.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    /// Feed a u64 into the hash.
    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    /// Feed a u32 into the hash.
    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    /// Finalize and return the hash value.
    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

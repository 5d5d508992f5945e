use serde::{Deserialize, Serialize};

/// Tunables for the resolution engine. Every field has a default so partial
/// config files deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run a pass every N calls to `Engine::tick`. Work queued in between is
    /// coalesced into the next pass.
    pub pass_interval: u32,
    /// Max edge reconciliations per pass. Excess stays queued for later
    /// passes. `None` drains the queue every pass; `Some(0)` is treated as 1.
    pub edge_update_budget: Option<usize>,
    /// Initial ring buffer capacity per event kind. Buffers grow rather than
    /// drop events within a pass.
    pub event_buffer_capacity: usize,
    /// Check every invariant after each pass and log violations.
    pub validate_after_pass: bool,
    /// Repair membership mismatches by re-queuing the nodes involved.
    pub self_heal: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pass_interval: 1,
            edge_update_budget: None,
            event_buffer_capacity: 1024,
            validate_after_pass: cfg!(debug_assertions),
            self_heal: true,
        }
    }
}

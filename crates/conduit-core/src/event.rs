//! Typed graph events with pre-allocated ring buffers.
//!
//! The engine records membership and edge changes while a pass runs and
//! delivers them in batch when the pass ends. Domain consumers (fluid
//! solvers, power solvers) subscribe to the kinds they care about and
//! recompute their payload for the graphs named in the event.
//!
//! Each event kind has its own [`EventBuffer`] ring buffer, so delivery is
//! grouped by kind (in [`GraphEventKind`] order) and ordered oldest to newest
//! within a kind.
//!
//! # Suppression
//!
//! Event kinds can be suppressed via [`EventBus::suppress`], which prevents
//! any allocation or recording for that kind. Suppressed events have zero cost.

use crate::flags::EdgeFlags;
use crate::id::*;
use tracing::debug;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A connectivity event. All events carry the pass in which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    // -- Graph lifecycle --
    GraphCreated {
        graph: GraphId,
        proto: GraphProtoId,
        pass: UpdateIter,
    },
    GraphDestroyed {
        graph: GraphId,
        pass: UpdateIter,
    },
    /// Every node of `from` moved into `into`; `from` is destroyed.
    GraphMerged {
        into: GraphId,
        from: GraphId,
        pass: UpdateIter,
    },
    /// `moved` nodes left `from` for the freshly created `into`.
    GraphSplit {
        from: GraphId,
        into: GraphId,
        moved: usize,
        pass: UpdateIter,
    },

    // -- Membership --
    NodeAdded {
        graph: GraphId,
        node: NodeId,
        pass: UpdateIter,
    },
    NodeRemoved {
        graph: GraphId,
        node: NodeId,
        pass: UpdateIter,
    },

    // -- Edges (reported from `from`'s side) --
    EdgeAdded {
        from: NodeId,
        to: NodeId,
        flags: EdgeFlags,
        pass: UpdateIter,
    },
    EdgeRemoved {
        from: NodeId,
        to: NodeId,
        flags: EdgeFlags,
        pass: UpdateIter,
    },
    EdgeChanged {
        from: NodeId,
        to: NodeId,
        new: EdgeFlags,
        old: EdgeFlags,
        pass: UpdateIter,
    },
}

/// Discriminant tag for event types, used for suppression and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphEventKind {
    GraphCreated,
    GraphDestroyed,
    GraphMerged,
    GraphSplit,
    NodeAdded,
    NodeRemoved,
    EdgeAdded,
    EdgeRemoved,
    EdgeChanged,
}

/// Total number of event kinds.
const EVENT_KIND_COUNT: usize = 9;

impl GraphEvent {
    /// Get the discriminant kind for this event.
    pub fn kind(&self) -> GraphEventKind {
        match self {
            GraphEvent::GraphCreated { .. } => GraphEventKind::GraphCreated,
            GraphEvent::GraphDestroyed { .. } => GraphEventKind::GraphDestroyed,
            GraphEvent::GraphMerged { .. } => GraphEventKind::GraphMerged,
            GraphEvent::GraphSplit { .. } => GraphEventKind::GraphSplit,
            GraphEvent::NodeAdded { .. } => GraphEventKind::NodeAdded,
            GraphEvent::NodeRemoved { .. } => GraphEventKind::NodeRemoved,
            GraphEvent::EdgeAdded { .. } => GraphEventKind::EdgeAdded,
            GraphEvent::EdgeRemoved { .. } => GraphEventKind::EdgeRemoved,
            GraphEvent::EdgeChanged { .. } => GraphEventKind::EdgeChanged,
        }
    }

    /// The pass in which the event occurred.
    pub fn pass(&self) -> UpdateIter {
        match self {
            GraphEvent::GraphCreated { pass, .. }
            | GraphEvent::GraphDestroyed { pass, .. }
            | GraphEvent::GraphMerged { pass, .. }
            | GraphEvent::GraphSplit { pass, .. }
            | GraphEvent::NodeAdded { pass, .. }
            | GraphEvent::NodeRemoved { pass, .. }
            | GraphEvent::EdgeAdded { pass, .. }
            | GraphEvent::EdgeRemoved { pass, .. }
            | GraphEvent::EdgeChanged { pass, .. } => *pass,
        }
    }
}

impl GraphEventKind {
    pub const ALL: [GraphEventKind; EVENT_KIND_COUNT] = [
        GraphEventKind::GraphCreated,
        GraphEventKind::GraphDestroyed,
        GraphEventKind::GraphMerged,
        GraphEventKind::GraphSplit,
        GraphEventKind::NodeAdded,
        GraphEventKind::NodeRemoved,
        GraphEventKind::EdgeAdded,
        GraphEventKind::EdgeRemoved,
        GraphEventKind::EdgeChanged,
    ];

    /// Convert to usize index for array lookups.
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventBuffer — pre-allocated ring buffer
// ---------------------------------------------------------------------------

/// A pre-allocated ring buffer for events. When full, [`push`](Self::push)
/// drops the oldest event; [`grow`](Self::grow) makes room instead.
#[derive(Debug)]
pub struct EventBuffer {
    /// Pre-allocated storage.
    events: Vec<Option<GraphEvent>>,
    /// Write position (wraps around).
    head: usize,
    /// Number of events currently stored (may be less than capacity).
    len: usize,
    /// Total events ever written (including dropped).
    total_written: u64,
    /// Events overwritten before they were read.
    dropped: u64,
}

impl EventBuffer {
    /// Create a new ring buffer with the given capacity.
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
            dropped: 0,
        }
    }

    /// Push an event into the ring buffer. If full, the oldest event is dropped.
    pub fn push(&mut self, event: GraphEvent) {
        if self.is_full() {
            self.dropped += 1;
        }
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        self.total_written += 1;
    }

    /// Double the capacity, keeping stored events in order.
    pub fn grow(&mut self) {
        let capacity = self.capacity() * 2;
        let mut events: Vec<Option<GraphEvent>> = Vec::with_capacity(capacity);
        let start = if self.is_full() { self.head } else { 0 };
        for i in 0..self.len {
            let idx = (start + i) % self.capacity();
            events.push(self.events[idx].take());
        }
        self.head = events.len();
        events.resize_with(capacity, || None);
        self.events = events;
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// The total capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    /// Number of events currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total events written since creation (including dropped).
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Number of events that were dropped because the buffer was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Iterate over events in order from oldest to newest.
    pub fn iter(&self) -> EventBufferIter<'_> {
        let start = if self.len < self.capacity() {
            0
        } else {
            // head points to the next write position, which is the oldest entry
            self.head
        };
        EventBufferIter {
            buffer: self,
            index: start,
            remaining: self.len,
        }
    }

    /// Clear all events from the buffer.
    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

/// Iterator over events in an [`EventBuffer`], from oldest to newest.
pub struct EventBufferIter<'a> {
    buffer: &'a EventBuffer,
    index: usize,
    remaining: usize,
}

impl<'a> Iterator for EventBufferIter<'a> {
    type Item = &'a GraphEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let event = self.buffer.events[self.index].as_ref();
        self.index = (self.index + 1) % self.buffer.capacity();
        self.remaining -= 1;
        event
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for EventBufferIter<'_> {}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// A listener receives events read-only. Consumers never mutate engine
/// state from inside delivery.
pub type GraphListener = Box<dyn FnMut(&GraphEvent)>;

/// Optional predicate that filters events for a listener.
pub type EventFilter = Box<dyn Fn(&GraphEvent) -> bool>;

/// Priority level for listeners. Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListenerPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

struct ListenerEntry {
    listener: GraphListener,
    priority: ListenerPriority,
    filter: Option<EventFilter>,
    insertion_order: u64,
}

impl std::fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("priority", &self.priority)
            .field("filtered", &self.filter.is_some())
            .field("insertion_order", &self.insertion_order)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Holds one ring buffer per event kind, listener lists, and suppression
/// flags.
pub struct EventBus {
    buffers: [Option<EventBuffer>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    listeners: [Vec<ListenerEntry>; EVENT_KIND_COUNT],
    default_capacity: usize,
    /// Monotonically increasing counter for stable sort ordering.
    next_insertion_order: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffers", &self.buffers)
            .field("suppressed", &self.suppressed)
            .field("default_capacity", &self.default_capacity)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create a new event bus with the given default buffer capacity per kind.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            buffers: Default::default(),
            suppressed: [false; EVENT_KIND_COUNT],
            listeners: Default::default(),
            default_capacity,
            next_insertion_order: 0,
        }
    }

    /// Suppress an event kind. Suppressed events are never allocated or buffered.
    pub fn suppress(&mut self, kind: GraphEventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()] = None;
    }

    /// Re-enable a suppressed event kind.
    pub fn unsuppress(&mut self, kind: GraphEventKind) {
        self.suppressed[kind.index()] = false;
    }

    pub fn is_suppressed(&self, kind: GraphEventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Record an event. No-ops if the event kind is suppressed.
    ///
    /// Nothing is dropped between deliveries: a full buffer doubles, and the
    /// larger capacity is kept for later passes.
    pub fn emit(&mut self, event: GraphEvent) {
        let kind = event.kind();
        let idx = kind.index();
        if self.suppressed[idx] {
            return;
        }

        let capacity = self.default_capacity;
        let buffer = self.buffers[idx].get_or_insert_with(|| EventBuffer::new(capacity));
        if buffer.is_full() {
            buffer.grow();
            debug!(?kind, capacity = buffer.capacity(), "event buffer grown");
        }
        buffer.push(event);
    }

    /// Register a listener for an event kind with Normal priority and no filter.
    pub fn subscribe(&mut self, kind: GraphEventKind, listener: GraphListener) {
        self.subscribe_filtered(kind, ListenerPriority::Normal, None, listener);
    }

    /// Register a listener with explicit priority and optional filter.
    pub fn subscribe_filtered(
        &mut self,
        kind: GraphEventKind,
        priority: ListenerPriority,
        filter: Option<EventFilter>,
        listener: GraphListener,
    ) {
        let order = self.next_insertion_order;
        self.next_insertion_order += 1;
        let list = &mut self.listeners[kind.index()];
        list.push(ListenerEntry {
            listener,
            priority,
            filter,
            insertion_order: order,
        });
        list.sort_by_key(|entry| (entry.priority, entry.insertion_order));
    }

    /// Deliver all buffered events to listeners, then clear the buffers.
    pub fn deliver(&mut self) {
        for idx in 0..EVENT_KIND_COUNT {
            let Some(buffer) = self.buffers[idx].as_mut() else {
                continue;
            };
            if buffer.is_empty() {
                continue;
            }

            for entry in &mut self.listeners[idx] {
                for event in buffer.iter() {
                    if let Some(ref filter) = entry.filter
                        && !filter(event)
                    {
                        continue;
                    }
                    (entry.listener)(event);
                }
            }

            buffer.clear();
        }
    }

    /// Get the event buffer for a specific event kind (read-only).
    pub fn buffer(&self, kind: GraphEventKind) -> Option<&EventBuffer> {
        self.buffers[kind.index()].as_ref()
    }

    /// Iterate buffered (not yet delivered) events of one kind.
    pub fn buffered(&self, kind: GraphEventKind) -> impl Iterator<Item = &GraphEvent> {
        self.buffers[kind.index()].iter().flat_map(|b| b.iter())
    }

    /// Get the count of events currently buffered for a kind.
    pub fn buffered_count(&self, kind: GraphEventKind) -> usize {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.len())
            .unwrap_or(0)
    }

    /// Get the total events ever emitted for a kind (including dropped).
    pub fn total_emitted(&self, kind: GraphEventKind) -> u64 {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.total_written())
            .unwrap_or(0)
    }

    /// Clear all buffers. Does not remove listeners or suppression settings.
    pub fn clear_all(&mut self) {
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.clear();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

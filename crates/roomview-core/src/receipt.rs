use std::collections::HashMap;

use crate::types::TimelineEvent;

/// Rendered bounding position of one event node, relative to the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeBounds {
    /// Bottom edge of the node in viewport coordinates.
    pub bottom_px: f32,
}

/// Side table from event ID to rendered node bounds, owned by the view and
/// invalidated on detach.
///
/// Events missing from this table have not been rendered and are never
/// treated as read.
#[derive(Debug, Clone, Default)]
pub struct RenderedNodeTable {
    nodes: HashMap<String, NodeBounds>,
}

impl RenderedNodeTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole table with a fresh layout report.
    pub fn replace_all<I>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = (String, NodeBounds)>,
    {
        self.nodes = nodes.into_iter().collect();
    }

    /// Record bounds for one rendered event.
    pub fn insert(&mut self, event_id: impl Into<String>, bounds: NodeBounds) {
        self.nodes.insert(event_id.into(), bounds);
    }

    /// Bounds for an event, when it has been rendered.
    pub fn get(&self, event_id: &str) -> Option<NodeBounds> {
        self.nodes.get(event_id).copied()
    }

    /// Drop all recorded nodes.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Number of rendered nodes currently known.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no nodes are recorded.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Read receipt the view should forward to the chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReceipt {
    /// Timeline index of the acknowledged event.
    pub index: usize,
    /// Event ID of the acknowledged event.
    pub event_id: String,
}

/// Monotonic read-position tracker for one room attachment.
///
/// The acknowledged position is stored as an event ID and re-resolved
/// against the current timeline on every scan. Raw indices shift whenever
/// backfill prepends older history; the ID does not.
#[derive(Debug, Clone, Default)]
pub struct ReadMarker {
    last_acknowledged: Option<String>,
}

impl ReadMarker {
    /// Tracker with no acknowledged position yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker seeded from the client's server-side read-up-to event.
    pub fn seeded(event_id: Option<String>) -> Self {
        Self {
            last_acknowledged: event_id,
        }
    }

    /// Event ID of the last acknowledged read position, if any.
    pub fn last_acknowledged(&self) -> Option<&str> {
        self.last_acknowledged.as_deref()
    }

    /// Record an externally acknowledged event (server-side marker).
    pub fn note_acknowledged(&mut self, event_id: impl Into<String>) {
        self.last_acknowledged = Some(event_id.into());
    }

    /// Scan the timeline newest to oldest for the newest event, not authored
    /// by the local user, whose rendered bottom edge lies fully above the
    /// viewport bottom. Unrendered events are skipped, never "last read".
    ///
    /// Returns a receipt only when the resolved event sits strictly after
    /// the acknowledged event in the current timeline; the read position
    /// never regresses, even after prepends have shifted every index. An
    /// acknowledged event absent from the local timeline is treated as older
    /// than the loaded history.
    pub fn resolve(
        &mut self,
        timeline: &[TimelineEvent],
        own_user_id: &str,
        nodes: &RenderedNodeTable,
        viewport_bottom_px: f32,
    ) -> Option<ReadReceipt> {
        let acked_index = self
            .last_acknowledged
            .as_deref()
            .and_then(|id| timeline.iter().position(|ev| ev.event_id == id));

        for index in (0..timeline.len()).rev() {
            let event = &timeline[index];
            if event.sender == own_user_id {
                continue;
            }

            let Some(bounds) = nodes.get(&event.event_id) else {
                continue;
            };

            if bounds.bottom_px < viewport_bottom_px {
                if acked_index.is_none_or(|acked| index > acked) {
                    self.last_acknowledged = Some(event.event_id.clone());
                    return Some(ReadReceipt {
                        index,
                        event_id: event.event_id.clone(),
                    });
                }
                return None;
            }
        }

        None
    }
}

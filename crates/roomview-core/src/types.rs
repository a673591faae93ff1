use serde::{Deserialize, Serialize};

/// Canonical timeline event payload supplied by the chat client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimelineEvent {
    /// Event ID, unique within the room.
    pub event_id: String,
    /// Sender user ID.
    pub sender: String,
    /// Display-ready text body.
    pub body: String,
    /// Event timestamp in milliseconds since Unix epoch.
    pub timestamp_ms: u64,
}

/// Saved scroll position of a room view, captured on room switch and
/// replayed when the view re-attaches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrollState {
    /// Whether the view was pinned to the newest event.
    pub at_bottom: bool,
    /// Scroll token (event ID) of the last fully displayed event, when not
    /// at the bottom.
    pub last_displayed_token: Option<String>,
    /// Pixels between the bottom of that event and the viewport bottom.
    pub pixel_offset: f32,
}

impl ScrollState {
    /// Scroll state representing a view pinned to the newest event.
    pub fn pinned_to_bottom() -> Self {
        Self {
            at_bottom: true,
            last_displayed_token: None,
            pixel_offset: 0.0,
        }
    }

    /// Scroll state anchored to a specific event.
    pub fn anchored_to(token: impl Into<String>, pixel_offset: f32) -> Self {
        Self {
            at_bottom: false,
            last_displayed_token: Some(token.into()),
            pixel_offset,
        }
    }
}

use async_trait::async_trait;
use roomview_core::{TimelineEvent, ViewError};
use tokio::sync::broadcast;

/// Update pushed by the chat client for a subscribed room.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomUpdate {
    /// A new event was appended to the live end of the timeline.
    TimelineAppended {
        /// The appended event.
        event: TimelineEvent,
    },
    /// Older history was prepended (backfill landed).
    TimelinePrepended {
        /// Number of events prepended.
        count: usize,
    },
    /// Another user's read receipt moved.
    ReceiptChanged,
    /// The room display name changed.
    NameChanged {
        /// New display name.
        name: String,
    },
    /// The set of typing users changed.
    TypingChanged {
        /// User IDs currently typing.
        user_ids: Vec<String>,
    },
}

/// Room update subscription scoped to one view attachment.
///
/// Dropping the subscription releases the registration; the view drops it
/// on detach, which is the deterministic unsubscribe.
#[derive(Debug)]
pub struct RoomSubscription {
    receiver: broadcast::Receiver<RoomUpdate>,
}

impl RoomSubscription {
    /// Wrap a broadcast receiver handed out by a chat client.
    pub fn new(receiver: broadcast::Receiver<RoomUpdate>) -> Self {
        Self { receiver }
    }

    /// Next room update, or `None` once the client side is gone.
    ///
    /// Lagged updates are skipped; the view re-reads the timeline snapshot
    /// on every command, so dropped updates only cost a repaint.
    pub async fn recv(&mut self) -> Option<RoomUpdate> {
        loop {
            match self.receiver.recv().await {
                Ok(update) => return Some(update),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Chat-protocol client consumed by the room view, interface only.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// User ID of the local account.
    fn own_user_id(&self) -> String;

    /// Current timeline snapshot for a room, oldest first.
    fn timeline(&self, room_id: &str) -> Vec<TimelineEvent>;

    /// Whether the room holds a pagination token (more history on the
    /// server). Presence only; the token is opaque.
    fn has_more_history(&self, room_id: &str) -> bool;

    /// Event ID the server already considers read, when known.
    fn read_up_to_event_id(&self, room_id: &str) -> Option<String>;

    /// Subscribe to room updates for the attachment lifetime.
    fn subscribe(&self, room_id: &str) -> RoomSubscription;

    /// Fetch `page_size` older events into the room's local timeline.
    async fn scrollback(&self, room_id: &str, page_size: usize) -> Result<(), ViewError>;

    /// Acknowledge `event_id` as read.
    async fn send_read_receipt(&self, room_id: &str, event_id: &str) -> Result<(), ViewError>;
}

/// Rendering surface consumed by the room view, interface only.
pub trait RenderSurface: Send + Sync {
    /// Whether the viewport is pinned to the newest event.
    fn is_at_bottom(&self) -> bool;

    /// Scroll to the newest event.
    fn scroll_to_bottom(&self);

    /// Scroll to the oldest materialized position.
    fn scroll_to_top(&self);

    /// Scroll so the event carrying `token` sits `pixel_offset` pixels above
    /// the viewport bottom.
    fn scroll_to_token(&self, token: &str, pixel_offset: f32);
}

/// Dialog/notification surface for user-visible failures.
pub trait ErrorNotifier: Send + Sync {
    /// Surface one error to the user. No retry is attempted by the view.
    fn notify(&self, title: &str, detail: &str);
}

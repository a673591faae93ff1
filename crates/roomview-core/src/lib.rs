//! Core view-state logic shared between the room-view runtime and frontend
//! consumers.
//!
//! This crate defines the timeline window manager, read-position tracker,
//! unread counter, search-session bookkeeping, and common error types. It is
//! purely synchronous; all async wiring lives in `roomview-runtime`.

/// Stable view error types.
pub mod error;
/// Read-position tracking and the rendered-node side table.
pub mod receipt;
/// Search result accumulation with stale-batch discarding.
pub mod search;
/// Shared event and scroll-state types.
pub mod types;
/// Unread-message counting.
pub mod unread;
/// Timeline window cap and backfill state machine.
pub mod window;

pub use error::{ViewError, ViewErrorCategory};
pub use receipt::{NodeBounds, ReadMarker, ReadReceipt, RenderedNodeTable};
pub use search::{BatchDisposition, SearchBatch, SearchResult, SearchScope, SearchSession};
pub use types::{ScrollState, TimelineEvent};
pub use unread::UnreadCounter;
pub use window::{
    DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_PAGE_SIZE, FillAction, FillSettlement, FillStatus,
    ScrollTarget, TimelineWindow, WindowConfig,
};

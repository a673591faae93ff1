use crate::types::TimelineEvent;

/// Default number of timeline entries materialized when a view attaches.
pub const DEFAULT_INITIAL_WINDOW_SIZE: usize = 20;
/// Default page increment for reveals and backfill fetches.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Sizing knobs for a [`TimelineWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Window cap assigned when the view attaches; also the extra page of
    /// older context wound back when scrolling to a specific event.
    pub initial_size: usize,
    /// Fixed increment for local reveals and backfill fetch sizes.
    pub page_size: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            initial_size: DEFAULT_INITIAL_WINDOW_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Backfill fill status. `Filling` is entered only from `Idle` and exits on
/// settlement regardless of fetch outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    /// No backfill outstanding.
    Idle,
    /// Exactly one backfill outstanding, tagged with its request ID.
    Filling {
        /// ID the settlement must carry to be accepted.
        request_id: u64,
    },
}

/// Action decided by [`TimelineWindow::request_fill_older`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillAction {
    /// Enough local history exists; the cap was grown without any fetch.
    Reveal {
        /// Cap after the local reveal.
        new_cap: usize,
    },
    /// Local history is exhausted but the server has more; issue exactly one
    /// backfill fetch of `page_size` events tagged with `request_id`.
    Fetch {
        /// Tag the eventual settlement must carry.
        request_id: u64,
        /// Fixed fetch size.
        page_size: usize,
    },
    /// A fill is already in flight; the request is coalesced.
    Coalesced,
    /// No local headroom and no more server history; nothing to do.
    Exhausted,
}

/// Outcome of applying a fetch settlement to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillSettlement {
    /// The settlement's request ID was superseded; discard silently.
    Stale,
    /// The in-flight fetch settled and the window reconciled against the new
    /// timeline length.
    Settled {
        /// Events gained by the fetch (zero is possible and legal).
        events_gained: usize,
        /// Cap after reconciliation.
        new_cap: usize,
    },
}

/// Scroll destination resolved by [`TimelineWindow::scroll_to_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScrollTarget {
    /// The event is not in the local timeline; scroll to the oldest
    /// available position instead of failing.
    OldestAvailable,
    /// Scroll so the event's bottom edge sits `pixel_offset` pixels above
    /// the viewport bottom.
    Event {
        /// Scroll token (event ID).
        event_id: String,
        /// Offset from the viewport bottom in pixels.
        pixel_offset: f32,
    },
}

/// Tracks how many of a room's most-recent timeline entries are materialized
/// for rendering, and owns the single-fetch backfill state machine.
///
/// The cap may exceed the timeline length (a short timeline is rendered in
/// full); it never shrinks within one attachment.
#[derive(Debug, Clone)]
pub struct TimelineWindow {
    cap: usize,
    initial_size: usize,
    page_size: usize,
    fill: FillStatus,
    next_request_id: u64,
    filling_from_len: usize,
}

impl TimelineWindow {
    /// Create a window with the configured initial cap (`>= 1`).
    pub fn new(config: WindowConfig) -> Self {
        let initial_size = config.initial_size.max(1);
        Self {
            cap: initial_size,
            initial_size,
            page_size: config.page_size.max(1),
            fill: FillStatus::Idle,
            next_request_id: 0,
            filling_from_len: 0,
        }
    }

    /// Current window cap.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Current fill status.
    pub fn fill_status(&self) -> FillStatus {
        self.fill
    }

    /// Whether a backfill fetch is outstanding.
    pub fn is_filling(&self) -> bool {
        matches!(self.fill, FillStatus::Filling { .. })
    }

    /// First timeline index eligible for rendering.
    pub fn visible_start(&self, timeline_len: usize) -> usize {
        timeline_len.saturating_sub(self.cap)
    }

    /// Whether older entries exist that the view is not displaying.
    pub fn can_reveal_or_fetch(&self, timeline_len: usize, has_more_history: bool) -> bool {
        self.cap < timeline_len || has_more_history
    }

    /// Decide how to satisfy a scroll-to-top fill demand.
    ///
    /// At most one backfill is ever outstanding; requests arriving while a
    /// fetch is in flight coalesce to [`FillAction::Coalesced`].
    pub fn request_fill_older(&mut self, timeline_len: usize, has_more_history: bool) -> FillAction {
        if self.is_filling() {
            return FillAction::Coalesced;
        }

        if self.cap < timeline_len {
            self.cap = (self.cap + self.page_size).min(timeline_len);
            return FillAction::Reveal { new_cap: self.cap };
        }

        if has_more_history {
            let request_id = self.next_request_id;
            self.next_request_id += 1;
            self.fill = FillStatus::Filling { request_id };
            self.filling_from_len = timeline_len;
            return FillAction::Fetch {
                request_id,
                page_size: self.page_size,
            };
        }

        FillAction::Exhausted
    }

    /// Apply a fetch settlement (success or failure alike release the
    /// in-flight slot). Settlements tagged with a superseded request ID are
    /// reported as [`FillSettlement::Stale`] and change nothing.
    pub fn settle_fill(&mut self, request_id: u64, new_timeline_len: usize) -> FillSettlement {
        match self.fill {
            FillStatus::Filling { request_id: current } if current == request_id => {
                self.fill = FillStatus::Idle;
                let events_gained = new_timeline_len.saturating_sub(self.filling_from_len);
                // Grow by what the fetch actually gained; a cap already past
                // the timeline length stays put.
                self.cap = self.cap.max((self.cap + events_gained).min(new_timeline_len));
                FillSettlement::Settled {
                    events_gained,
                    new_cap: self.cap,
                }
            }
            _ => FillSettlement::Stale,
        }
    }

    /// Force the window back to `Idle` so any outstanding fetch settles as
    /// stale. Used on detach and on search/room-switch invalidation.
    pub fn invalidate_pending(&mut self) {
        self.fill = FillStatus::Idle;
    }

    /// Resolve a scroll destination for `event_id`, growing the cap (never
    /// shrinking) to bring the event into the window plus an extra initial
    /// page of older context above it.
    ///
    /// An event missing from the timeline is recovered locally by targeting
    /// the oldest available position.
    pub fn scroll_to_event(
        &mut self,
        timeline: &[TimelineEvent],
        event_id: &str,
        pixel_offset: f32,
    ) -> ScrollTarget {
        let Some(index) = timeline.iter().position(|ev| ev.event_id == event_id) else {
            return ScrollTarget::OldestAvailable;
        };

        // Wind back slightly further than the event itself so the reader
        // lands with history rendered above the target.
        let needed_cap = (timeline.len() - index + self.initial_size).min(timeline.len());
        if needed_cap > self.cap {
            self.cap = needed_cap;
        }

        ScrollTarget::Event {
            event_id: event_id.to_owned(),
            pixel_offset,
        }
    }
}

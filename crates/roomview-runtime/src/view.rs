use std::sync::Arc;

use roomview_core::{
    FillAction, FillSettlement, NodeBounds, ReadMarker, RenderedNodeTable, ScrollState,
    ScrollTarget, TimelineWindow, UnreadCounter, ViewError,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    channel::{ViewChannelError, ViewChannels, ViewEventStream},
    client::{ChatClient, ErrorNotifier, RenderSurface, RoomUpdate},
    config::ViewConfig,
};

/// Command channel input accepted by an attached room view.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewCommand {
    /// The surface's edge callback asked for older content.
    FillOlder,
    /// The surface reported a fresh layout of rendered event nodes.
    SyncNodeBounds {
        /// Viewport bottom boundary in the same coordinates as the bounds.
        viewport_bottom_px: f32,
        /// Bounds per rendered event ID, replacing the previous table.
        nodes: Vec<(String, NodeBounds)>,
    },
    /// The user interacted with the view; reconcile receipts and unread.
    UserActivity,
    /// Scroll so the event sits `pixel_offset` pixels above the viewport
    /// bottom, growing the window if needed.
    ScrollToEvent {
        /// Target event ID.
        event_id: String,
        /// Offset from the viewport bottom in pixels.
        pixel_offset: f32,
    },
    /// Replay a saved scroll position.
    RestoreScroll {
        /// Saved position captured before the room was switched away.
        state: ScrollState,
    },
    /// A results overlay covering the live timeline was shown or hidden.
    SetOverlayActive {
        /// Whether the overlay currently hides the live timeline.
        active: bool,
    },
    /// Internal: a backfill fetch settled. Settlements tagged with a
    /// superseded request ID are discarded.
    FillSettled {
        /// Request ID assigned when the fetch was issued.
        request_id: u64,
        /// Fetch outcome; failure still releases the in-flight slot.
        outcome: Result<(), ViewError>,
    },
}

/// Event channel output emitted by an attached room view.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// The window cap changed; the frontend should re-render the visible
    /// range.
    WindowChanged {
        /// New window cap.
        cap: usize,
    },
    /// The unread counter changed.
    UnreadChanged {
        /// New unread count.
        count: u64,
    },
    /// A backfill fetch was issued.
    FillStarted {
        /// Request ID tagging the fetch.
        request_id: u64,
    },
    /// A backfill fetch settled (success or failure).
    FillSettled {
        /// Request ID of the settled fetch.
        request_id: u64,
        /// Events gained by the fetch.
        events_gained: usize,
    },
    /// A read receipt was forwarded to the chat client.
    ReceiptSent {
        /// Acknowledged event ID.
        event_id: String,
        /// Acknowledged timeline index.
        index: usize,
    },
    /// Room metadata changed (name, receipts, typing); repaint only.
    Refreshed,
}

/// Handle to an attached room view.
///
/// Dropping the handle does not detach the view; call [`detach`] to stop the
/// task and release its subscriptions deterministically.
///
/// [`detach`]: RoomViewHandle::detach
#[derive(Debug, Clone)]
pub struct RoomViewHandle {
    channels: ViewChannels,
    cancel: CancellationToken,
}

impl RoomViewHandle {
    /// Send one command to the view.
    pub async fn send(&self, command: ViewCommand) -> Result<(), ViewChannelError> {
        self.channels.send_command(command).await
    }

    /// Subscribe to view events.
    pub fn subscribe(&self) -> ViewEventStream {
        self.channels.subscribe()
    }

    /// Stop the view task, invalidating any outstanding backfill.
    pub fn detach(&self) {
        self.cancel.cancel();
    }
}

/// Attach a view to a room and spawn its event loop.
pub fn attach(
    room_id: impl Into<String>,
    client: Arc<dyn ChatClient>,
    surface: Arc<dyn RenderSurface>,
    notifier: Arc<dyn ErrorNotifier>,
    config: ViewConfig,
) -> RoomViewHandle {
    let (channels, command_rx) = ViewChannels::new(config.command_buffer, config.event_buffer);
    let cancel = CancellationToken::new();

    let view = AttachedView {
        room_id: room_id.into(),
        own_user_id: client.own_user_id(),
        client,
        surface,
        notifier,
        channels: channels.clone(),
        window: TimelineWindow::new(config.window_config()),
        marker: ReadMarker::new(),
        nodes: RenderedNodeTable::new(),
        unread: UnreadCounter::new(),
        viewport_bottom_px: 0.0,
        overlay_active: false,
        refill_wanted: false,
        cancel: cancel.child_token(),
    };

    tokio::spawn(view.run(command_rx));

    RoomViewHandle { channels, cancel }
}

struct AttachedView {
    room_id: String,
    own_user_id: String,
    client: Arc<dyn ChatClient>,
    surface: Arc<dyn RenderSurface>,
    notifier: Arc<dyn ErrorNotifier>,
    channels: ViewChannels,
    window: TimelineWindow,
    marker: ReadMarker,
    nodes: RenderedNodeTable,
    unread: UnreadCounter,
    viewport_bottom_px: f32,
    overlay_active: bool,
    refill_wanted: bool,
    cancel: CancellationToken,
}

impl AttachedView {
    async fn run(mut self, mut command_rx: mpsc::Receiver<ViewCommand>) {
        let mut subscription = self.client.subscribe(&self.room_id);
        let mut subscription_open = true;
        let cancel = self.cancel.clone();

        if let Some(event_id) = self.client.read_up_to_event_id(&self.room_id) {
            self.marker.note_acknowledged(event_id);
        }
        debug!(room_id = %self.room_id, cap = self.window.cap(), "room view attached");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                update = subscription.recv(), if subscription_open => match update {
                    Some(update) => self.handle_room_update(update),
                    None => subscription_open = false,
                },
            }
        }

        // Detach: outstanding fetches settle as stale, the node table is
        // gone, and dropping the subscription releases the registration.
        self.window.invalidate_pending();
        self.nodes.clear();
        debug!(room_id = %self.room_id, "room view detached");
    }

    async fn handle_command(&mut self, command: ViewCommand) {
        match command {
            ViewCommand::FillOlder => self.request_fill(),
            ViewCommand::FillSettled {
                request_id,
                outcome,
            } => self.handle_fill_settled(request_id, outcome),
            ViewCommand::SyncNodeBounds {
                viewport_bottom_px,
                nodes,
            } => {
                self.viewport_bottom_px = viewport_bottom_px;
                self.nodes.replace_all(nodes);
            }
            ViewCommand::UserActivity => self.handle_user_activity().await,
            ViewCommand::ScrollToEvent {
                event_id,
                pixel_offset,
            } => self.handle_scroll_to_event(&event_id, pixel_offset),
            ViewCommand::SetOverlayActive { active } => self.overlay_active = active,
            ViewCommand::RestoreScroll { state } => {
                if state.at_bottom {
                    self.surface.scroll_to_bottom();
                } else if let Some(token) = state.last_displayed_token {
                    // The saved token may have fallen out of the window, so
                    // take the cap-growing path rather than scrolling blind.
                    self.handle_scroll_to_event(&token, state.pixel_offset);
                }
            }
        }
    }

    fn request_fill(&mut self) {
        let timeline_len = self.client.timeline(&self.room_id).len();
        let has_more = self.client.has_more_history(&self.room_id);

        match self.window.request_fill_older(timeline_len, has_more) {
            FillAction::Reveal { new_cap } => {
                debug!(room_id = %self.room_id, new_cap, "revealed local history");
                self.channels.emit(ViewEvent::WindowChanged { cap: new_cap });
            }
            FillAction::Fetch {
                request_id,
                page_size,
            } => {
                debug!(room_id = %self.room_id, request_id, page_size, "starting backfill fetch");
                self.channels.emit(ViewEvent::FillStarted { request_id });

                let client = Arc::clone(&self.client);
                let channels = self.channels.clone();
                let room_id = self.room_id.clone();
                tokio::spawn(async move {
                    let outcome = client.scrollback(&room_id, page_size).await;
                    let _ = channels
                        .send_command(ViewCommand::FillSettled {
                            request_id,
                            outcome,
                        })
                        .await;
                });
            }
            FillAction::Coalesced => {
                trace!(room_id = %self.room_id, "backfill already in flight, coalescing");
                self.refill_wanted = true;
            }
            FillAction::Exhausted => {
                trace!(room_id = %self.room_id, "no more history to fill");
            }
        }
    }

    fn handle_fill_settled(&mut self, request_id: u64, outcome: Result<(), ViewError>) {
        let new_len = self.client.timeline(&self.room_id).len();
        let cap_before = self.window.cap();

        match self.window.settle_fill(request_id, new_len) {
            FillSettlement::Stale => {
                debug!(room_id = %self.room_id, request_id, "discarding stale backfill settlement");
            }
            FillSettlement::Settled {
                events_gained,
                new_cap,
            } => {
                self.channels.emit(ViewEvent::FillSettled {
                    request_id,
                    events_gained,
                });
                if new_cap != cap_before {
                    self.channels.emit(ViewEvent::WindowChanged { cap: new_cap });
                }

                match outcome {
                    Ok(()) => {
                        // The fetch may have returned zero usable events, or
                        // fill requests may have been coalesced while it was
                        // in flight; either way demand must be re-evaluated.
                        let wants_more = std::mem::take(&mut self.refill_wanted)
                            || (events_gained == 0
                                && self.client.has_more_history(&self.room_id));
                        if wants_more {
                            self.request_fill();
                        }
                    }
                    Err(err) => {
                        warn!(room_id = %self.room_id, request_id, %err, "backfill fetch failed");
                        // No automatic retry; drop any coalesced demand and
                        // let the surface ask again.
                        self.refill_wanted = false;
                        self.notifier
                            .notify("Failed to load older messages", &err.to_string());
                    }
                }
            }
        }
    }

    async fn handle_user_activity(&mut self) {
        if self.surface.is_at_bottom() && !self.overlay_active && self.unread.count() > 0 {
            let count = self.unread.clear();
            self.channels.emit(ViewEvent::UnreadChanged { count });
        }

        let timeline = self.client.timeline(&self.room_id);
        let Some(receipt) = self.marker.resolve(
            &timeline,
            &self.own_user_id,
            &self.nodes,
            self.viewport_bottom_px,
        ) else {
            return;
        };

        match self
            .client
            .send_read_receipt(&self.room_id, &receipt.event_id)
            .await
        {
            Ok(()) => {
                trace!(room_id = %self.room_id, event_id = %receipt.event_id, "read receipt sent");
                self.channels.emit(ViewEvent::ReceiptSent {
                    event_id: receipt.event_id,
                    index: receipt.index,
                });
            }
            Err(err) => {
                warn!(room_id = %self.room_id, %err, "failed to send read receipt");
            }
        }
    }

    fn handle_scroll_to_event(&mut self, event_id: &str, pixel_offset: f32) {
        let timeline = self.client.timeline(&self.room_id);
        let cap_before = self.window.cap();

        match self.window.scroll_to_event(&timeline, event_id, pixel_offset) {
            ScrollTarget::OldestAvailable => {
                debug!(
                    room_id = %self.room_id,
                    %event_id,
                    "refusing to scroll to unknown event, falling back to top of buffer"
                );
                self.surface.scroll_to_top();
            }
            ScrollTarget::Event {
                event_id,
                pixel_offset,
            } => {
                if self.window.cap() != cap_before {
                    self.channels.emit(ViewEvent::WindowChanged {
                        cap: self.window.cap(),
                    });
                }
                self.surface.scroll_to_token(&event_id, pixel_offset);
            }
        }
    }

    fn handle_room_update(&mut self, update: RoomUpdate) {
        match update {
            RoomUpdate::TimelineAppended { event } => {
                let from_own = event.sender == self.own_user_id;
                let before = self.unread.count();
                let count = self.unread.on_incoming_event(
                    from_own,
                    self.surface.is_at_bottom(),
                    self.overlay_active,
                );
                if count != before {
                    self.channels.emit(ViewEvent::UnreadChanged { count });
                }
            }
            RoomUpdate::TimelinePrepended { count } => {
                trace!(room_id = %self.room_id, count, "older history landed");
            }
            RoomUpdate::ReceiptChanged
            | RoomUpdate::NameChanged { .. }
            | RoomUpdate::TypingChanged { .. } => {
                self.channels.emit(ViewEvent::Refreshed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };
    use std::time::Duration;

    use async_trait::async_trait;
    use roomview_core::TimelineEvent;
    use tokio::sync::{Semaphore, broadcast};
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::client::RoomSubscription;

    const OWN: &str = "@alice:example.org";
    const OTHER: &str = "@bob:example.org";
    const ROOM: &str = "!room:example.org";

    fn event(event_id: &str, sender: &str) -> TimelineEvent {
        TimelineEvent {
            event_id: event_id.to_owned(),
            sender: sender.to_owned(),
            body: "hello".to_owned(),
            timestamp_ms: 1_731_000_000,
        }
    }

    struct FakeClient {
        timeline: Mutex<Vec<TimelineEvent>>,
        reserve: Mutex<Vec<TimelineEvent>>,
        fetch_calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_scrollback: AtomicBool,
        gate: Semaphore,
        receipts: Mutex<Vec<String>>,
        update_tx: broadcast::Sender<RoomUpdate>,
    }

    impl FakeClient {
        fn new(timeline_len: usize, reserve_len: usize) -> Self {
            let timeline = (reserve_len..reserve_len + timeline_len)
                .map(|i| event(&format!("${i}"), OTHER))
                .collect();
            let reserve = (0..reserve_len)
                .map(|i| event(&format!("${i}"), OTHER))
                .collect();
            let (update_tx, _) = broadcast::channel(16);

            Self {
                timeline: Mutex::new(timeline),
                reserve: Mutex::new(reserve),
                fetch_calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                fail_scrollback: AtomicBool::new(false),
                gate: Semaphore::new(0),
                receipts: Mutex::new(Vec::new()),
                update_tx,
            }
        }

        fn open_gate(&self) {
            self.gate.add_permits(1);
        }

        fn push_live_event(&self, event: TimelineEvent) {
            self.timeline.lock().expect("lock").push(event.clone());
            let _ = self.update_tx.send(RoomUpdate::TimelineAppended { event });
        }
    }

    #[async_trait]
    impl ChatClient for FakeClient {
        fn own_user_id(&self) -> String {
            OWN.to_owned()
        }

        fn timeline(&self, _room_id: &str) -> Vec<TimelineEvent> {
            self.timeline.lock().expect("lock").clone()
        }

        fn has_more_history(&self, _room_id: &str) -> bool {
            !self.reserve.lock().expect("lock").is_empty()
        }

        fn read_up_to_event_id(&self, _room_id: &str) -> Option<String> {
            None
        }

        fn subscribe(&self, _room_id: &str) -> RoomSubscription {
            RoomSubscription::new(self.update_tx.subscribe())
        }

        async fn scrollback(&self, _room_id: &str, page_size: usize) -> Result<(), ViewError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            let permit = self.gate.acquire().await.expect("gate semaphore closed");
            permit.forget();

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail_scrollback.load(Ordering::SeqCst) {
                return Err(ViewError::backfill_failed("connection reset"));
            }

            let mut reserve = self.reserve.lock().expect("lock");
            let take = page_size.min(reserve.len());
            let split = reserve.len() - take;
            let mut fetched = reserve.split_off(split);
            drop(reserve);

            let mut timeline = self.timeline.lock().expect("lock");
            fetched.append(&mut std::mem::take(&mut *timeline));
            *timeline = fetched;
            Ok(())
        }

        async fn send_read_receipt(&self, _room_id: &str, event_id: &str) -> Result<(), ViewError> {
            self.receipts.lock().expect("lock").push(event_id.to_owned());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSurface {
        at_bottom: AtomicBool,
        calls: Mutex<Vec<String>>,
    }

    impl RenderSurface for FakeSurface {
        fn is_at_bottom(&self) -> bool {
            self.at_bottom.load(Ordering::SeqCst)
        }

        fn scroll_to_bottom(&self) {
            self.calls.lock().expect("lock").push("bottom".to_owned());
        }

        fn scroll_to_top(&self) {
            self.calls.lock().expect("lock").push("top".to_owned());
        }

        fn scroll_to_token(&self, token: &str, pixel_offset: f32) {
            self.calls
                .lock()
                .expect("lock")
                .push(format!("token:{token}@{pixel_offset}"));
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        notices: Mutex<Vec<(String, String)>>,
    }

    impl ErrorNotifier for FakeNotifier {
        fn notify(&self, title: &str, detail: &str) {
            self.notices
                .lock()
                .expect("lock")
                .push((title.to_owned(), detail.to_owned()));
        }
    }

    struct Harness {
        client: Arc<FakeClient>,
        surface: Arc<FakeSurface>,
        notifier: Arc<FakeNotifier>,
        handle: RoomViewHandle,
        events: ViewEventStream,
    }

    fn harness(client: FakeClient, config: ViewConfig) -> Harness {
        let client = Arc::new(client);
        let surface = Arc::new(FakeSurface::default());
        let notifier = Arc::new(FakeNotifier::default());
        let handle = attach(
            ROOM,
            Arc::clone(&client) as Arc<dyn ChatClient>,
            Arc::clone(&surface) as Arc<dyn RenderSurface>,
            Arc::clone(&notifier) as Arc<dyn ErrorNotifier>,
            config,
        );
        let events = handle.subscribe();

        Harness {
            client,
            surface,
            notifier,
            handle,
            events,
        }
    }

    async fn next_event(events: &mut ViewEventStream) -> ViewEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event timeout")
            .expect("event receive")
    }

    async fn wait_until<F>(mut condition: F)
    where
        F: FnMut() -> bool,
    {
        timeout(Duration::from_secs(2), async {
            while !condition() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition timeout");
    }

    fn config(initial: usize, page: usize) -> ViewConfig {
        ViewConfig {
            initial_window_size: initial,
            page_size: page,
            ..ViewConfig::default()
        }
    }

    #[tokio::test]
    async fn coalesces_fill_requests_to_one_outstanding_fetch() {
        let mut h = harness(FakeClient::new(20, 40), config(20, 20));

        for _ in 0..4 {
            h.handle
                .send(ViewCommand::FillOlder)
                .await
                .expect("command should enqueue");
        }

        assert!(matches!(
            next_event(&mut h.events).await,
            ViewEvent::FillStarted { request_id: 0 }
        ));
        wait_until(|| h.client.fetch_calls.load(Ordering::SeqCst) == 1).await;

        // Release the gated fetch; the coalesced demand re-evaluates and
        // issues exactly one follow-up.
        h.client.open_gate();
        loop {
            if let ViewEvent::FillSettled { events_gained, .. } = next_event(&mut h.events).await {
                assert_eq!(events_gained, 20);
                break;
            }
        }

        wait_until(|| h.client.fetch_calls.load(Ordering::SeqCst) == 2).await;
        h.client.open_gate();
        loop {
            if let ViewEvent::FillSettled { request_id, .. } = next_event(&mut h.events).await {
                assert_eq!(request_id, 1);
                break;
            }
        }

        assert_eq!(h.client.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(h.client.fetch_calls.load(Ordering::SeqCst), 2);
        h.handle.detach();
    }

    #[tokio::test]
    async fn reveals_local_history_without_fetching() {
        let mut h = harness(FakeClient::new(60, 0), config(20, 20));

        h.handle
            .send(ViewCommand::FillOlder)
            .await
            .expect("command should enqueue");

        assert_eq!(
            next_event(&mut h.events).await,
            ViewEvent::WindowChanged { cap: 40 }
        );
        assert_eq!(h.client.fetch_calls.load(Ordering::SeqCst), 0);
        h.handle.detach();
    }

    #[tokio::test]
    async fn short_timeline_without_token_is_a_noop() {
        let h = harness(FakeClient::new(5, 0), config(20, 20));

        h.handle
            .send(ViewCommand::FillOlder)
            .await
            .expect("command should enqueue");

        // Give the loop a chance to misbehave before asserting nothing did.
        sleep(Duration::from_millis(50)).await;
        assert_eq!(h.client.fetch_calls.load(Ordering::SeqCst), 0);
        h.handle.detach();
    }

    #[tokio::test]
    async fn fetch_failure_reaches_notifier_without_retry() {
        let mut h = harness(FakeClient::new(20, 40), config(20, 20));
        h.client.fail_scrollback.store(true, Ordering::SeqCst);
        h.client.open_gate();

        h.handle
            .send(ViewCommand::FillOlder)
            .await
            .expect("command should enqueue");

        loop {
            if let ViewEvent::FillSettled { events_gained, .. } = next_event(&mut h.events).await {
                assert_eq!(events_gained, 0);
                break;
            }
        }

        wait_until(|| !h.notifier.notices.lock().expect("lock").is_empty()).await;
        let notices = h.notifier.notices.lock().expect("lock").clone();
        assert_eq!(notices[0].0, "Failed to load older messages");
        assert!(notices[0].1.contains("backfill_failed"));

        sleep(Duration::from_millis(50)).await;
        assert_eq!(h.client.fetch_calls.load(Ordering::SeqCst), 1);
        h.handle.detach();
    }

    #[tokio::test]
    async fn scroll_to_unknown_event_falls_back_to_top_of_buffer() {
        let h = harness(FakeClient::new(10, 0), config(20, 20));

        h.handle
            .send(ViewCommand::ScrollToEvent {
                event_id: "$unknown".to_owned(),
                pixel_offset: 0.0,
            })
            .await
            .expect("command should enqueue");

        wait_until(|| h.surface.calls.lock().expect("lock").contains(&"top".to_owned())).await;
        h.handle.detach();
    }

    #[tokio::test]
    async fn scroll_to_present_event_grows_window_and_targets_token() {
        let mut h = harness(FakeClient::new(50, 0), config(5, 20));

        h.handle
            .send(ViewCommand::ScrollToEvent {
                event_id: "$10".to_owned(),
                pixel_offset: 24.0,
            })
            .await
            .expect("command should enqueue");

        assert_eq!(
            next_event(&mut h.events).await,
            ViewEvent::WindowChanged { cap: 45 }
        );
        wait_until(|| {
            h.surface
                .calls
                .lock()
                .expect("lock")
                .contains(&"token:$10@24".to_owned())
        })
        .await;
        h.handle.detach();
    }

    #[tokio::test]
    async fn read_receipts_are_monotonic_across_activity() {
        let mut h = harness(FakeClient::new(3, 0), config(20, 20));

        h.handle
            .send(ViewCommand::SyncNodeBounds {
                viewport_bottom_px: 500.0,
                nodes: vec![
                    ("$0".to_owned(), NodeBounds { bottom_px: 100.0 }),
                    ("$1".to_owned(), NodeBounds { bottom_px: 200.0 }),
                    ("$2".to_owned(), NodeBounds { bottom_px: 300.0 }),
                ],
            })
            .await
            .expect("command should enqueue");
        h.handle
            .send(ViewCommand::UserActivity)
            .await
            .expect("command should enqueue");

        assert_eq!(
            next_event(&mut h.events).await,
            ViewEvent::ReceiptSent {
                event_id: "$2".to_owned(),
                index: 2
            }
        );

        // Scrolled back up: only older events are above the boundary now, so
        // no further receipt may be emitted.
        h.handle
            .send(ViewCommand::SyncNodeBounds {
                viewport_bottom_px: 500.0,
                nodes: vec![("$0".to_owned(), NodeBounds { bottom_px: 100.0 })],
            })
            .await
            .expect("command should enqueue");
        h.handle
            .send(ViewCommand::UserActivity)
            .await
            .expect("command should enqueue");

        sleep(Duration::from_millis(50)).await;
        let receipts = h.client.receipts.lock().expect("lock").clone();
        assert_eq!(receipts, vec!["$2".to_owned()]);
        h.handle.detach();
    }

    #[tokio::test]
    async fn backfill_prepend_does_not_regress_read_receipts() {
        let mut h = harness(FakeClient::new(20, 10), config(20, 20));
        h.client.open_gate();

        // Everything currently loaded is rendered above the fold; the
        // newest event gets acknowledged.
        let nodes = (10..30)
            .map(|i| (format!("${i}"), NodeBounds { bottom_px: 100.0 }))
            .collect();
        h.handle
            .send(ViewCommand::SyncNodeBounds {
                viewport_bottom_px: 500.0,
                nodes,
            })
            .await
            .expect("command should enqueue");
        h.handle
            .send(ViewCommand::UserActivity)
            .await
            .expect("command should enqueue");
        assert_eq!(
            next_event(&mut h.events).await,
            ViewEvent::ReceiptSent {
                event_id: "$29".to_owned(),
                index: 19
            }
        );

        // Backfill prepends ten older events, shifting every index.
        h.handle
            .send(ViewCommand::FillOlder)
            .await
            .expect("command should enqueue");
        loop {
            if let ViewEvent::FillSettled { events_gained, .. } = next_event(&mut h.events).await {
                assert_eq!(events_gained, 10);
                break;
            }
        }

        // The user scrolls up to a prepended event. Its index (5 of 30) sits
        // where acknowledged content used to, but it is chronologically
        // older, so no receipt may be sent.
        h.handle
            .send(ViewCommand::SyncNodeBounds {
                viewport_bottom_px: 500.0,
                nodes: vec![("$5".to_owned(), NodeBounds { bottom_px: 100.0 })],
            })
            .await
            .expect("command should enqueue");
        h.handle
            .send(ViewCommand::UserActivity)
            .await
            .expect("command should enqueue");

        sleep(Duration::from_millis(50)).await;
        let receipts = h.client.receipts.lock().expect("lock").clone();
        assert_eq!(receipts, vec!["$29".to_owned()]);
        h.handle.detach();
    }

    #[tokio::test]
    async fn overlay_keeps_counting_unread_at_the_bottom() {
        let mut h = harness(FakeClient::new(3, 0), config(20, 20));
        h.surface.at_bottom.store(true, Ordering::SeqCst);

        h.handle
            .send(ViewCommand::SetOverlayActive { active: true })
            .await
            .expect("command should enqueue");
        wait_until(|| h.client.update_tx.receiver_count() > 0).await;

        // The live timeline is hidden behind the overlay, so being at the
        // bottom does not mean the event was seen.
        h.client.push_live_event(event("$100", OTHER));
        assert_eq!(
            next_event(&mut h.events).await,
            ViewEvent::UnreadChanged { count: 1 }
        );

        // Activity while the overlay is up must not clear the counter.
        h.handle
            .send(ViewCommand::UserActivity)
            .await
            .expect("command should enqueue");
        sleep(Duration::from_millis(50)).await;

        // Overlay dismissed: activity at the bottom clears it.
        h.handle
            .send(ViewCommand::SetOverlayActive { active: false })
            .await
            .expect("command should enqueue");
        h.handle
            .send(ViewCommand::UserActivity)
            .await
            .expect("command should enqueue");
        assert_eq!(
            next_event(&mut h.events).await,
            ViewEvent::UnreadChanged { count: 0 }
        );
        h.handle.detach();
    }

    #[tokio::test]
    async fn incoming_events_drive_the_unread_counter() {
        let mut h = harness(FakeClient::new(3, 0), config(20, 20));
        h.surface.at_bottom.store(false, Ordering::SeqCst);

        // Wait for the view task to register its room subscription before
        // pushing live events through the broadcast.
        wait_until(|| h.client.update_tx.receiver_count() > 0).await;

        h.client.push_live_event(event("$100", OTHER));
        assert_eq!(
            next_event(&mut h.events).await,
            ViewEvent::UnreadChanged { count: 1 }
        );

        // Own events never count.
        h.client.push_live_event(event("$101", OWN));
        h.client.push_live_event(event("$102", OTHER));
        assert_eq!(
            next_event(&mut h.events).await,
            ViewEvent::UnreadChanged { count: 2 }
        );

        // Back at the bottom, activity clears the counter.
        h.surface.at_bottom.store(true, Ordering::SeqCst);
        h.handle
            .send(ViewCommand::UserActivity)
            .await
            .expect("command should enqueue");
        assert_eq!(
            next_event(&mut h.events).await,
            ViewEvent::UnreadChanged { count: 0 }
        );
        h.handle.detach();
    }

    #[tokio::test]
    async fn restore_scroll_replays_saved_positions() {
        let h = harness(FakeClient::new(50, 0), config(5, 20));

        h.handle
            .send(ViewCommand::RestoreScroll {
                state: ScrollState::pinned_to_bottom(),
            })
            .await
            .expect("command should enqueue");
        wait_until(|| {
            h.surface
                .calls
                .lock()
                .expect("lock")
                .contains(&"bottom".to_owned())
        })
        .await;

        h.handle
            .send(ViewCommand::RestoreScroll {
                state: ScrollState::anchored_to("$10", 12.0),
            })
            .await
            .expect("command should enqueue");
        wait_until(|| {
            h.surface
                .calls
                .lock()
                .expect("lock")
                .contains(&"token:$10@12".to_owned())
        })
        .await;
        h.handle.detach();
    }

    #[tokio::test]
    async fn detach_stops_accepting_commands() {
        let h = harness(FakeClient::new(10, 0), config(20, 20));

        h.handle.detach();
        // Detached views drop the command receiver, after which sends fail.
        timeout(Duration::from_secs(2), async {
            while h.handle.send(ViewCommand::FillOlder).await.is_ok() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("detach should close the command channel");
    }
}

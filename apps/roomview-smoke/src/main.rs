//! Offline smoke binary: attaches a room view to an in-memory chat client,
//! drives fills and scrolls through the command channel, and prints the
//! resulting view events.

mod logging;

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use roomview_core::{
    BatchDisposition, NodeBounds, SearchBatch, SearchResult, SearchScope, SearchSession,
    TimelineEvent, ViewError,
};
use roomview_runtime::{
    ChatClient, ErrorNotifier, RenderSurface, RoomSubscription, RoomUpdate, ViewCommand,
    ViewConfig, ViewEvent, ViewEventStream, attach,
};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

const ROOM: &str = "!smoke:example.org";
const OWN_USER: &str = "@smoke:example.org";
const PEER_USER: &str = "@peer:example.org";

/// In-memory chat client: a live timeline plus a reserve of older history
/// that `scrollback` moves across in pages.
struct MemoryClient {
    timeline: Mutex<Vec<TimelineEvent>>,
    reserve: Mutex<Vec<TimelineEvent>>,
    update_tx: broadcast::Sender<RoomUpdate>,
}

impl MemoryClient {
    fn new(timeline_len: usize, reserve_len: usize) -> Self {
        let event = |i: usize| TimelineEvent {
            event_id: format!("${i}"),
            sender: PEER_USER.to_owned(),
            body: format!("message {i}"),
            timestamp_ms: 1_731_000_000_000 + i as u64,
        };
        let reserve = (0..reserve_len).map(event).collect();
        let timeline = (reserve_len..reserve_len + timeline_len).map(event).collect();
        let (update_tx, _) = broadcast::channel(64);

        Self {
            timeline: Mutex::new(timeline),
            reserve: Mutex::new(reserve),
            update_tx,
        }
    }

    fn push_live_event(&self, body: &str) {
        let event = {
            let mut timeline = self.timeline.lock().expect("timeline lock");
            let event = TimelineEvent {
                event_id: format!("$live-{}", timeline.len()),
                sender: PEER_USER.to_owned(),
                body: body.to_owned(),
                timestamp_ms: 1_731_100_000_000,
            };
            timeline.push(event.clone());
            event
        };
        let _ = self.update_tx.send(RoomUpdate::TimelineAppended { event });
    }
}

#[async_trait]
impl ChatClient for MemoryClient {
    fn own_user_id(&self) -> String {
        OWN_USER.to_owned()
    }

    fn timeline(&self, _room_id: &str) -> Vec<TimelineEvent> {
        self.timeline.lock().expect("timeline lock").clone()
    }

    fn has_more_history(&self, _room_id: &str) -> bool {
        !self.reserve.lock().expect("reserve lock").is_empty()
    }

    fn read_up_to_event_id(&self, _room_id: &str) -> Option<String> {
        None
    }

    fn subscribe(&self, _room_id: &str) -> RoomSubscription {
        RoomSubscription::new(self.update_tx.subscribe())
    }

    async fn scrollback(&self, _room_id: &str, page_size: usize) -> Result<(), ViewError> {
        // Simulated network latency.
        sleep(Duration::from_millis(30)).await;

        let mut reserve = self.reserve.lock().expect("reserve lock");
        let take = page_size.min(reserve.len());
        let split_at = reserve.len() - take;
        let mut fetched = reserve.split_off(split_at);
        drop(reserve);

        let mut timeline = self.timeline.lock().expect("timeline lock");
        let count = fetched.len();
        fetched.append(&mut std::mem::take(&mut *timeline));
        *timeline = fetched;
        drop(timeline);

        let _ = self.update_tx.send(RoomUpdate::TimelinePrepended { count });
        Ok(())
    }

    async fn send_read_receipt(&self, _room_id: &str, event_id: &str) -> Result<(), ViewError> {
        info!(%event_id, "client acknowledged read receipt");
        Ok(())
    }
}

struct LoggingSurface {
    at_bottom: AtomicBool,
}

impl RenderSurface for LoggingSurface {
    fn is_at_bottom(&self) -> bool {
        self.at_bottom.load(Ordering::SeqCst)
    }

    fn scroll_to_bottom(&self) {
        info!("surface: scroll to bottom");
    }

    fn scroll_to_top(&self) {
        info!("surface: scroll to top of buffer");
    }

    fn scroll_to_token(&self, token: &str, pixel_offset: f32) {
        info!(%token, pixel_offset, "surface: scroll to token");
    }
}

struct LoggingNotifier;

impl ErrorNotifier for LoggingNotifier {
    fn notify(&self, title: &str, detail: &str) {
        warn!(%title, %detail, "user-visible error");
    }
}

async fn drain_events(mut events: ViewEventStream) {
    while let Ok(Ok(event)) = timeout(Duration::from_millis(200), events.recv()).await {
        match event {
            ViewEvent::WindowChanged { cap } => info!(cap, "window changed"),
            ViewEvent::UnreadChanged { count } => info!(count, "unread changed"),
            ViewEvent::FillStarted { request_id } => info!(request_id, "fill started"),
            ViewEvent::FillSettled {
                request_id,
                events_gained,
            } => info!(request_id, events_gained, "fill settled"),
            ViewEvent::ReceiptSent { event_id, index } => {
                info!(%event_id, index, "receipt sent")
            }
            ViewEvent::Refreshed => info!("room metadata refreshed"),
        }
    }
}

fn search_demo() {
    let mut session = SearchSession::new();
    let first = session.begin("cake", SearchScope::Room);
    let second = session.begin("carrot cake", SearchScope::All);

    // The response to the superseded search arrives late and is discarded.
    let stale = session.accept_batch(SearchBatch {
        search_id: first,
        results: vec![SearchResult {
            event_id: "$old".to_owned(),
            room_id: ROOM.to_owned(),
            body: "cake".to_owned(),
        }],
        highlights: vec!["cake".to_owned()],
        count: Some(1),
        next_batch: None,
    });
    assert_eq!(stale, BatchDisposition::Stale);

    let accepted = session.accept_batch(SearchBatch {
        search_id: second,
        results: vec![SearchResult {
            event_id: "$42".to_owned(),
            room_id: ROOM.to_owned(),
            body: "carrot cake recipe".to_owned(),
        }],
        highlights: vec!["cake".to_owned(), "carrot cake".to_owned()],
        count: Some(1),
        next_batch: None,
    });
    assert_eq!(accepted, BatchDisposition::Accepted);

    info!(
        results = session.results().len(),
        highlights = ?session.highlights(),
        "search session settled"
    );
}

#[tokio::main]
async fn main() {
    logging::init();

    let config = match ViewConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    let client = Arc::new(MemoryClient::new(30, 50));
    let surface = Arc::new(LoggingSurface {
        at_bottom: AtomicBool::new(false),
    });
    let handle = attach(
        ROOM,
        Arc::clone(&client) as Arc<dyn ChatClient>,
        Arc::clone(&surface) as Arc<dyn RenderSurface>,
        Arc::new(LoggingNotifier) as Arc<dyn ErrorNotifier>,
        config,
    );
    let events = handle.subscribe();

    // Reveal local history, then run the reserve down with backfill fetches.
    for _ in 0..4 {
        if handle.send(ViewCommand::FillOlder).await.is_err() {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }

    // A live event while scrolled up bumps the unread counter.
    client.push_live_event("hello from the live end");

    // Report a layout and let user activity resolve a read receipt.
    let nodes = client
        .timeline(ROOM)
        .iter()
        .enumerate()
        .map(|(i, event)| {
            (
                event.event_id.clone(),
                NodeBounds {
                    bottom_px: i as f32 * 20.0,
                },
            )
        })
        .collect();
    let _ = handle
        .send(ViewCommand::SyncNodeBounds {
            viewport_bottom_px: 400.0,
            nodes,
        })
        .await;
    let _ = handle.send(ViewCommand::UserActivity).await;

    let _ = handle
        .send(ViewCommand::ScrollToEvent {
            event_id: "$55".to_owned(),
            pixel_offset: 24.0,
        })
        .await;

    drain_events(events).await;
    search_demo();

    handle.detach();
    info!("smoke run complete");
}

//! Async wiring for room views.
//!
//! A view is attached to a room with [`attach`], which spawns a task driving
//! the window, read-position, and unread state from `roomview-core` against
//! the collaborator traits in [`client`]. Frontends talk to the task through
//! the command/event channels behind [`RoomViewHandle`].

/// Command/event channel plumbing between a view task and its frontend.
pub mod channel;
/// Collaborator traits: chat client, render surface, error notifier.
pub mod client;
/// Environment-backed runtime configuration.
pub mod config;
/// The attached view task and its command/event vocabulary.
pub mod view;

pub use channel::{ViewChannelError, ViewChannels, ViewEventStream};
pub use client::{ChatClient, ErrorNotifier, RenderSurface, RoomSubscription, RoomUpdate};
pub use config::{ConfigError, ViewConfig};
pub use view::{RoomViewHandle, ViewCommand, ViewEvent, attach};

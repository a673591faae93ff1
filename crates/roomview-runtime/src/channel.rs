use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::view::{ViewCommand, ViewEvent};

/// Broadcast event stream type used by frontend subscribers.
pub type ViewEventStream = broadcast::Receiver<ViewEvent>;

/// Errors returned by view channel operations.
#[derive(Debug, Error)]
pub enum ViewChannelError {
    /// The command receiver side is closed (the view has detached).
    #[error("view command channel is closed")]
    CommandChannelClosed,
}

/// Command/event channel pair shared between an attached view task and its
/// frontend.
#[derive(Clone, Debug)]
pub struct ViewChannels {
    command_tx: mpsc::Sender<ViewCommand>,
    event_tx: broadcast::Sender<ViewEvent>,
}

impl ViewChannels {
    /// Create a new channel set and return it with the command receiver.
    pub fn new(
        command_buffer: usize,
        event_buffer: usize,
    ) -> (Self, mpsc::Receiver<ViewCommand>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));

        (
            Self {
                command_tx,
                event_tx,
            },
            command_rx,
        )
    }

    /// Subscribe to emitted view events.
    pub fn subscribe(&self) -> ViewEventStream {
        self.event_tx.subscribe()
    }

    /// Send one command to the attached view.
    pub async fn send_command(&self, command: ViewCommand) -> Result<(), ViewChannelError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ViewChannelError::CommandChannelClosed)
    }

    /// Emit an event to all subscribers.
    ///
    /// Emission is best-effort; lagged subscribers are handled by `broadcast`.
    pub fn emit(&self, event: ViewEvent) {
        let _ = self.event_tx.send(event);
    }
}

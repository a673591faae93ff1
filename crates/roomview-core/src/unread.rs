/// Unread-message counter for a room view.
///
/// Counts incoming events from other users while the surface is scrolled
/// away from the bottom (or a results overlay hides the live timeline);
/// being at the bottom clears it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnreadCounter {
    count: u64,
}

impl UnreadCounter {
    /// Counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current unread count.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Apply one incoming timeline event and return the new count.
    pub fn on_incoming_event(
        &mut self,
        from_own_user: bool,
        at_bottom: bool,
        overlay_active: bool,
    ) -> u64 {
        if from_own_user {
            return self.count;
        }

        if at_bottom && !overlay_active {
            self.count = 0;
        } else {
            self.count += 1;
        }
        self.count
    }

    /// Reset the counter (the user scrolled back to the bottom).
    pub fn clear(&mut self) -> u64 {
        self.count = 0;
        self.count
    }

    /// Human-readable label, empty at zero.
    pub fn label(&self) -> Option<String> {
        match self.count {
            0 => None,
            1 => Some("1 new message".to_owned()),
            n => Some(format!("{n} new messages")),
        }
    }
}

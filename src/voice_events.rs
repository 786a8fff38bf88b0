//! Publish/subscribe channel for voice-note events.
//!
//! The bus is an ordinary value handed to whoever needs it. Cloning it shares
//! the underlying channel, so the recorder and the entry store can each hold one.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::journal_entry::EntryId;

const CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    /// A transcript is ready and should become a new entry.
    CreateVoiceNote { transcript: String },
    /// The voice note has been committed to the backend under `id`.
    VoiceNoteCreated { id: EntryId },
}

#[derive(Debug, Clone)]
pub struct VoiceEvents {
    sender: broadcast::Sender<VoiceEvent>,
}

impl Default for VoiceEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CAPACITY);
        VoiceEvents { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VoiceEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of subscribers that will see the event.
    pub fn publish(&self, event: VoiceEvent) -> usize {
        debug!(?event, "publishing voice event");
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                warn!(?event, "voice event dropped, nobody is subscribed");
                0
            }
        }
    }
}

use async_trait::async_trait;
use std::io;
use thiserror::Error;
use tokio::sync::mpsc;

use super::PlayerEvent;
use crate::api::ApiError;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech command is empty")]
    EmptyCommand,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechFailure {
    /// Audio stopped without anyone asking it to.
    Interrupted,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEventKind {
    Started,
    Finished,
    Failed(SpeechFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechEvent {
    pub utterance: u64,
    pub kind: SpeechEventKind,
}

/// Where a backend reports progress of one utterance.
#[derive(Debug, Clone)]
pub struct SpeechSink {
    utterance: u64,
    tx: mpsc::UnboundedSender<PlayerEvent>,
}

impl SpeechSink {
    pub(crate) fn new(utterance: u64, tx: mpsc::UnboundedSender<PlayerEvent>) -> Self {
        SpeechSink { utterance, tx }
    }

    pub fn started(&self) {
        self.send(SpeechEventKind::Started);
    }

    pub fn finished(&self) {
        self.send(SpeechEventKind::Finished);
    }

    pub fn failed(&self, failure: SpeechFailure) {
        self.send(SpeechEventKind::Failed(failure));
    }

    fn send(&self, kind: SpeechEventKind) {
        let _ = self.tx.send(PlayerEvent::Speech(SpeechEvent {
            utterance: self.utterance,
            kind,
        }));
    }
}

/// One way of turning text into sound.
///
/// Implementations own at most one active utterance. `speak` must tear the
/// previous one down before the new one can make a sound, and must return
/// without waiting for the audio itself.
#[async_trait]
pub trait SpeechBackend: Send {
    async fn speak(&mut self, text: &str, sink: SpeechSink) -> Result<(), SpeechError>;

    /// Stops the active utterance. No events are reported for it afterwards.
    fn cancel(&mut self);

    /// Returns false when the backend cannot pause.
    fn pause(&mut self) -> bool {
        false
    }

    fn resume(&mut self) {}

    fn is_speaking(&self) -> bool;
}

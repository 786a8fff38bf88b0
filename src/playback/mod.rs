//! Read-aloud playback of entries and shared stories.
//!
//! [`Player`] owns one [`SpeechBackend`] and tracks whether it is loading,
//! playing, or paused because the app went out of view. Backends report
//! progress as [`PlayerEvent`]s tagged with an utterance number; anything
//! tagged with an older number belongs to audio we already stopped and is
//! dropped, which is how our own cancellations are told apart from real
//! interruptions.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, error, info, warn};

pub mod backend;
pub mod command;
mod process;
pub mod remote;

pub use backend::{SpeechBackend, SpeechError, SpeechEvent, SpeechEventKind, SpeechFailure, SpeechSink};
pub use command::CommandSpeech;
pub use remote::RemoteSpeech;

use crate::api::SpeechApi;
use crate::config::{BackendKind, PlaybackConfig};

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused(PauseReason),
}

/// Preconditions for starting playback of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayGate {
    pub saved: bool,
    pub ready: bool,
}

impl PlayGate {
    /// For text that has no save cycle, such as community stories.
    pub fn open() -> Self {
        PlayGate {
            saved: true,
            ready: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.saved && self.ready
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Started,
    Stopped,
    /// Not saved or not ready yet; nothing changed.
    Rejected,
}

#[derive(Debug)]
pub enum PlayerEvent {
    Speech(SpeechEvent),
    Tick { session: u64 },
    VerifyResume { utterance: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct PlaybackSettings {
    pub resume_verify: Duration,
    pub max_restarts: u32,
}

impl From<&PlaybackConfig> for PlaybackSettings {
    fn from(config: &PlaybackConfig) -> Self {
        PlaybackSettings {
            resume_verify: config.resume_verify(),
            max_restarts: config.max_restarts,
        }
    }
}

/// Builds the backend named by the configuration.
pub fn backend_from_config(
    config: &PlaybackConfig,
    api: Arc<dyn SpeechApi>,
) -> Result<Box<dyn SpeechBackend>, SpeechError> {
    Ok(match config.backend {
        BackendKind::Remote => Box::new(RemoteSpeech::new(
            api,
            &config.player_command,
            &config.clip_extension,
        )?),
        BackendKind::Local => Box::new(CommandSpeech::new(&config.speech_command)?),
    })
}

/// `m:ss`, minutes unpadded.
pub fn format_elapsed(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

pub struct Player {
    backend: Box<dyn SpeechBackend>,
    settings: PlaybackSettings,
    state: PlaybackState,
    text: Option<String>,
    elapsed_secs: u64,
    utterance: u64,
    session: u64,
    restarts: u32,
    ticker: Option<JoinHandle<()>>,
    verifier: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<PlayerEvent>,
    rx: mpsc::UnboundedReceiver<PlayerEvent>,
}

impl Player {
    pub fn new(backend: Box<dyn SpeechBackend>, settings: PlaybackSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Player {
            backend,
            settings,
            state: PlaybackState::Idle,
            text: None,
            elapsed_secs: 0,
            utterance: 0,
            session: 0,
            restarts: 0,
            ticker: None,
            verifier: None,
            tx,
            rx,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// True while audio is playing or held paused.
    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlaybackState::Playing | PlaybackState::Paused(_))
    }

    pub fn is_loading(&self) -> bool {
        self.state == PlaybackState::Loading
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn elapsed_label(&self) -> String {
        format_elapsed(self.elapsed_secs)
    }

    /// Starts reading `text`, or stops whatever is active.
    ///
    /// Stopping is always allowed. Starting requires an open gate; a closed
    /// gate leaves the player untouched.
    pub async fn toggle(&mut self, text: &str, gate: PlayGate) -> PlayOutcome {
        if self.state != PlaybackState::Idle {
            self.stop();
            return PlayOutcome::Stopped;
        }
        if !gate.is_open() {
            debug!(?gate, "playback refused, entry not ready");
            return PlayOutcome::Rejected;
        }

        self.session += 1;
        self.restarts = 0;
        self.elapsed_secs = 0;
        self.text = Some(text.to_string());
        self.start_ticker();
        if self.start_utterance().await {
            PlayOutcome::Started
        } else {
            PlayOutcome::Stopped
        }
    }

    pub fn stop(&mut self) {
        if self.state != PlaybackState::Idle {
            info!(elapsed = self.elapsed_secs, "playback stopped");
        }
        self.utterance += 1;
        self.backend.cancel();
        self.reset();
    }

    /// Tears down audio and timers; call when the owning view goes away.
    pub fn shutdown(&mut self) {
        self.stop();
    }

    /// Reacts to the app going out of or coming back into view.
    pub fn set_visible(&mut self, visible: bool) {
        match (visible, self.state) {
            (false, PlaybackState::Playing) => {
                if self.backend.pause() {
                    debug!("playback paused while hidden");
                    self.state = PlaybackState::Paused(PauseReason::Hidden);
                }
            }
            (true, PlaybackState::Paused(PauseReason::Hidden)) => {
                debug!("resuming playback");
                self.backend.resume();
                self.schedule_verify();
            }
            _ => {}
        }
    }

    pub async fn next_event(&mut self) -> Option<PlayerEvent> {
        self.rx.recv().await
    }

    /// Waits for and handles one event.
    pub async fn step(&mut self) {
        if let Some(event) = self.next_event().await {
            self.handle(event).await;
        }
    }

    pub async fn handle(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::Tick { session } => {
                if session == self.session && self.state == PlaybackState::Playing {
                    self.elapsed_secs += 1;
                }
            }
            PlayerEvent::VerifyResume { utterance } => {
                if utterance != self.utterance || self.state == PlaybackState::Idle {
                    return;
                }
                if self.backend.is_speaking() {
                    self.state = PlaybackState::Playing;
                } else {
                    warn!("audio did not come back after resume");
                    self.restart().await;
                }
            }
            PlayerEvent::Speech(event) => {
                if event.utterance != self.utterance {
                    debug!(?event, "ignoring event from stopped audio");
                    return;
                }
                self.on_speech(event.kind).await;
            }
        }
    }

    async fn on_speech(&mut self, kind: SpeechEventKind) {
        match kind {
            SpeechEventKind::Started => {
                if self.state != PlaybackState::Idle {
                    self.state = PlaybackState::Playing;
                }
            }
            SpeechEventKind::Finished => {
                info!(elapsed = self.elapsed_secs, "playback finished");
                self.reset();
            }
            SpeechEventKind::Failed(SpeechFailure::Interrupted) => {
                if self.state == PlaybackState::Idle {
                    return;
                }
                warn!(state = ?self.state, "playback interrupted");
                self.recover().await;
            }
            SpeechEventKind::Failed(SpeechFailure::Error(message)) => {
                error!(%message, "playback failed");
                self.reset();
            }
        }
    }

    async fn recover(&mut self) {
        if self.state != PlaybackState::Loading && self.backend.pause() {
            self.backend.resume();
            self.schedule_verify();
        } else {
            self.restart().await;
        }
    }

    async fn restart(&mut self) {
        if self.restarts >= self.settings.max_restarts {
            warn!(restarts = self.restarts, "giving up on playback");
            self.stop();
            return;
        }
        self.restarts += 1;
        info!(attempt = self.restarts, "restarting speech");
        self.utterance += 1;
        self.backend.cancel();
        self.start_utterance().await;
    }

    /// Returns false when the backend refused to start.
    async fn start_utterance(&mut self) -> bool {
        let Some(text) = self.text.clone() else {
            self.reset();
            return false;
        };
        self.utterance += 1;
        self.state = PlaybackState::Loading;
        let sink = SpeechSink::new(self.utterance, self.tx.clone());
        match self.backend.speak(&text, sink).await {
            Ok(()) => true,
            Err(err) => {
                error!(%err, "could not start speech");
                self.reset();
                false
            }
        }
    }

    fn start_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        let tx = self.tx.clone();
        let session = self.session;
        self.ticker = Some(tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + TICK, TICK);
            loop {
                ticks.tick().await;
                if tx.send(PlayerEvent::Tick { session }).is_err() {
                    break;
                }
            }
        }));
    }

    fn schedule_verify(&mut self) {
        if let Some(verifier) = self.verifier.take() {
            verifier.abort();
        }
        let tx = self.tx.clone();
        let utterance = self.utterance;
        let delay = self.settings.resume_verify;
        self.verifier = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(PlayerEvent::VerifyResume { utterance });
        }));
    }

    fn reset(&mut self) {
        self.session += 1;
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Some(verifier) = self.verifier.take() {
            verifier.abort();
        }
        self.state = PlaybackState::Idle;
        self.elapsed_secs = 0;
        self.restarts = 0;
        self.text = None;
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shutdown();
    }
}

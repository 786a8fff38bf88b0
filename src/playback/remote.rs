//! Speech synthesized by the backend and played through a local player.
//!
//! The synthesized clip is written to a temporary file that lives until it is
//! replaced by a clip for different text or the backend is dropped. Asking for
//! the same text again replays the existing clip without another request.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::backend::{SpeechBackend, SpeechError, SpeechFailure, SpeechSink};
use super::process::{run_to_end, ProcessSlot};
use crate::api::SpeechApi;

struct Clip {
    text: String,
    file: Arc<NamedTempFile>,
}

type ClipCell = Arc<Mutex<Option<Clip>>>;

pub struct RemoteSpeech {
    api: Arc<dyn SpeechApi>,
    program: String,
    args: Vec<String>,
    extension: String,
    clip: ClipCell,
    slot: ProcessSlot,
    last: Option<SpeechSink>,
    paused: bool,
}

impl RemoteSpeech {
    /// `player` is the program and arguments; the clip path is appended last.
    pub fn new(
        api: Arc<dyn SpeechApi>,
        player: &[String],
        extension: &str,
    ) -> Result<Self, SpeechError> {
        let (program, args) = player.split_first().ok_or(SpeechError::EmptyCommand)?;
        Ok(RemoteSpeech {
            api,
            program: program.clone(),
            args: args.to_vec(),
            extension: extension.trim_start_matches('.').to_string(),
            clip: Arc::new(Mutex::new(None)),
            slot: ProcessSlot::default(),
            last: None,
            paused: false,
        })
    }

    /// Path of the clip currently held, if any.
    pub fn clip_path(&self) -> Option<PathBuf> {
        lock(&self.clip)
            .as_ref()
            .map(|clip| clip.file.path().to_path_buf())
    }

    fn cached_clip(&self, text: &str) -> Option<Arc<NamedTempFile>> {
        lock(&self.clip)
            .as_ref()
            .filter(|clip| clip.text == text)
            .map(|clip| Arc::clone(&clip.file))
    }

    fn player(&self) -> PlayerCommand {
        PlayerCommand {
            program: self.program.clone(),
            args: self.args.clone(),
        }
    }
}

#[derive(Clone)]
struct PlayerCommand {
    program: String,
    args: Vec<String>,
}

impl PlayerCommand {
    fn play(&self, clip: &NamedTempFile) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(clip.path());
        command
    }
}

fn lock(cell: &ClipCell) -> std::sync::MutexGuard<'_, Option<Clip>> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn fetch_clip(
    api: &dyn SpeechApi,
    text: &str,
    extension: &str,
) -> Result<NamedTempFile, SpeechError> {
    let audio = api.generate_speech(text).await?;
    let file = tempfile::Builder::new()
        .prefix("voice-journal-")
        .suffix(&format!(".{extension}"))
        .tempfile()?;
    tokio::fs::write(file.path(), &audio).await?;
    debug!(path = %file.path().display(), bytes = audio.len(), "speech clip written");
    Ok(file)
}

struct SpeakJob {
    api: Arc<dyn SpeechApi>,
    text: String,
    extension: String,
    cell: ClipCell,
    cached: Option<Arc<NamedTempFile>>,
    player: PlayerCommand,
    sink: SpeechSink,
}

impl SpeakJob {
    async fn run(self, token: CancellationToken, speaking: Arc<std::sync::atomic::AtomicBool>) {
        let file = match self.cached {
            Some(file) => file,
            None => {
                let fetched = tokio::select! {
                    fetched = fetch_clip(self.api.as_ref(), &self.text, &self.extension) => fetched,
                    _ = token.cancelled() => return,
                };
                match fetched {
                    Ok(file) => {
                        let file = Arc::new(file);
                        *lock(&self.cell) = Some(Clip {
                            text: self.text,
                            file: Arc::clone(&file),
                        });
                        file
                    }
                    Err(err) => {
                        self.sink.failed(SpeechFailure::Error(err.to_string()));
                        return;
                    }
                }
            }
        };
        run_to_end(self.player.play(&file), self.sink, speaking, token).await;
        drop(file);
    }
}

#[async_trait]
impl SpeechBackend for RemoteSpeech {
    async fn speak(&mut self, text: &str, sink: SpeechSink) -> Result<(), SpeechError> {
        let cached = self.cached_clip(text);
        if cached.is_none() {
            info!(chars = text.chars().count(), "requesting synthesized speech");
        }
        let job = SpeakJob {
            api: Arc::clone(&self.api),
            text: text.to_string(),
            extension: self.extension.clone(),
            cell: Arc::clone(&self.clip),
            cached,
            player: self.player(),
            sink: sink.clone(),
        };
        self.slot
            .replace(move |token, speaking| job.run(token, speaking))
            .await;
        self.last = Some(sink);
        self.paused = false;
        Ok(())
    }

    fn cancel(&mut self) {
        self.slot.cancel();
        self.last = None;
        self.paused = false;
    }

    fn pause(&mut self) -> bool {
        if !self.slot.is_speaking() {
            return false;
        }
        self.slot.cancel();
        self.paused = true;
        true
    }

    fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        let Some(sink) = self.last.clone() else {
            return;
        };
        let Some(file) = lock(&self.clip).as_ref().map(|clip| Arc::clone(&clip.file)) else {
            return;
        };
        let command = self.player().play(&file);
        self.slot.spawn(move |token, speaking| async move {
            run_to_end(command, sink, speaking, token).await;
            drop(file);
        });
    }

    fn is_speaking(&self) -> bool {
        self.slot.is_speaking()
    }
}

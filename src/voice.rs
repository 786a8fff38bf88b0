use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiError, TranscriptionApi, VoiceProfileApi};
use crate::voice_events::{VoiceEvent, VoiceEvents};

const FALLBACK_FILE_NAME: &str = "recording.webm";
const SAMPLE_FILE_NAME: &str = "voice-calibration.wav";

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("transcription was empty, please try again")]
    EmptyTranscription,

    #[error("could not read recording {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("voice sample was not accepted")]
    NoVoiceId,

    #[error("voice service failed: {0}")]
    Api(#[from] ApiError),
}

async fn read_clip<'a>(path: &'a Path, fallback: &'a str) -> Result<(&'a str, Vec<u8>), VoiceError> {
    let audio = tokio::fs::read(path).await.map_err(|source| VoiceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(fallback);
    Ok((file_name, audio))
}

/// Turns a recorded clip into a `CreateVoiceNote` event.
pub struct Transcriber {
    api: Arc<dyn TranscriptionApi>,
    events: VoiceEvents,
}

impl Transcriber {
    pub fn new(api: Arc<dyn TranscriptionApi>, events: VoiceEvents) -> Self {
        Transcriber { api, events }
    }

    /// Returns the transcript that was published.
    pub async fn transcribe_file(&self, path: &Path) -> Result<String, VoiceError> {
        let (file_name, audio) = read_clip(path, FALLBACK_FILE_NAME).await?;
        info!(file_name, bytes = audio.len(), "transcribing recording");

        let transcription = self.api.transcribe(file_name, audio).await?;
        let transcript = transcription.full_text.trim().to_string();
        if transcript.is_empty() {
            warn!(file_name, "recording produced no speech");
            return Err(VoiceError::EmptyTranscription);
        }

        self.events.publish(VoiceEvent::CreateVoiceNote {
            transcript: transcript.clone(),
        });
        Ok(transcript)
    }
}

/// Clones the user's voice from a sample so narration can use it.
pub struct VoiceCalibrator {
    api: Arc<dyn VoiceProfileApi>,
}

impl VoiceCalibrator {
    pub fn new(api: Arc<dyn VoiceProfileApi>) -> Self {
        VoiceCalibrator { api }
    }

    /// True when the logged-in user has no cloned voice yet.
    pub async fn needs_calibration(&self) -> Result<bool, ApiError> {
        let user = self.api.current_user().await?;
        Ok(user.voice_id.map_or(true, |id| id.is_empty()))
    }

    /// Uploads the sample at `path` and returns the new voice id.
    pub async fn calibrate_file(&self, path: &Path) -> Result<String, VoiceError> {
        let (file_name, sample) = read_clip(path, SAMPLE_FILE_NAME).await?;
        info!(file_name, bytes = sample.len(), "uploading voice sample");

        let cloned = self.api.clone_voice(file_name, sample).await?;
        if cloned.voice_id.is_empty() {
            warn!(status = %cloned.status, "voice clone returned no id");
            return Err(VoiceError::NoVoiceId);
        }
        info!(voice_id = %cloned.voice_id, "voice calibrated");
        Ok(cloned.voice_id)
    }
}

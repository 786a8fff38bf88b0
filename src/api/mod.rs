//! Remote collaborators of the journal core, and the reqwest-backed client that implements them.

use async_trait::async_trait;

mod client;
mod error;
mod types;

pub use client::ApiClient;
pub use error::ApiError;
pub use types::{
    CreateEntryRequest, CurrentUser, RemoteEntry, Resource, SharedEntry, Transcription, UpdateEntryRequest,
    VoiceClone,
};

#[async_trait]
pub trait JournalApi: Send + Sync {
    async fn list_entries(&self) -> Result<Vec<RemoteEntry>, ApiError>;
    async fn get_entry(&self, id: &str) -> Result<RemoteEntry, ApiError>;
    /// Returns the id the backend issued for the new record.
    async fn create_entry(&self, request: CreateEntryRequest) -> Result<String, ApiError>;
    async fn update_entry(&self, request: UpdateEntryRequest) -> Result<RemoteEntry, ApiError>;
    async fn delete_entry(&self, id: &str) -> Result<(), ApiError>;
}

#[async_trait]
pub trait SpeechApi: Send + Sync {
    /// Synthesized audio clip for `text`, in whatever container the backend produces.
    async fn generate_speech(&self, text: &str) -> Result<Vec<u8>, ApiError>;
}

#[async_trait]
pub trait TranscriptionApi: Send + Sync {
    async fn transcribe(&self, file_name: &str, audio: Vec<u8>) -> Result<Transcription, ApiError>;
}

/// The user's cloned narration voice.
#[async_trait]
pub trait VoiceProfileApi: Send + Sync {
    async fn current_user(&self) -> Result<CurrentUser, ApiError>;
    async fn clone_voice(&self, file_name: &str, sample: Vec<u8>) -> Result<VoiceClone, ApiError>;
}

#[async_trait]
pub trait CommunityApi: Send + Sync {
    async fn shared_entries(&self, category: Option<&str>) -> Result<Vec<SharedEntry>, ApiError>;
}

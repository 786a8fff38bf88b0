//! Wire shapes of the journal backend. Field names follow the backend's JSON.

use serde::{Deserialize, Serialize};

/// Journal record as the backend stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub entry_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub shared: Option<bool>,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<String>,
    #[serde(default, rename = "feelingRating")]
    pub feeling_rating: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EntriesResponse {
    #[serde(default)]
    pub entries: Vec<RemoteEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedEntry {
    pub entry_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateEntryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "feelingRating", skip_serializing_if = "Option::is_none")]
    pub feeling_rating: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateEntryRequest {
    pub entry_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    #[serde(rename = "feelingRating", skip_serializing_if = "Option::is_none")]
    pub feeling_rating: Option<u8>,
}

impl From<UpdateEntryRequest> for RemoteEntry {
    fn from(request: UpdateEntryRequest) -> Self {
        RemoteEntry {
            entry_id: request.entry_id,
            title: request.title,
            note: request.note,
            shared: request.shared,
            classification: request.classification,
            created_at: None,
            feeling_rating: request.feeling_rating.map(f64::from),
        }
    }
}

/// Envelope used by the community and auth endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SharedEntry {
    #[serde(default)]
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Transcription {
    pub full_text: String,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TranscriptionResponse {
    pub transcription: Transcription,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub focus: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResourcesResponse {
    #[serde(default)]
    pub resources: Vec<Resource>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthResponse {
    pub token: String,
}

/// The logged-in user; `voice_id` is set once a voice sample has been cloned.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CurrentUser {
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub onboarded: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VoiceClone {
    #[serde(default)]
    pub voice_id: String,
    #[serde(default)]
    pub status: String,
}

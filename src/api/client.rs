use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use super::types::{
    AuthResponse, CreatedEntry, EntriesResponse, Envelope, LoginRequest, ResourcesResponse, TranscriptionResponse,
};
use super::{
    ApiError, CommunityApi, CreateEntryRequest, CurrentUser, JournalApi, RemoteEntry, Resource, SharedEntry,
    SpeechApi, Transcription, TranscriptionApi, UpdateEntryRequest, VoiceClone, VoiceProfileApi,
};
use crate::config::ApiConfig;

/// REST client for the journal backend. Cloning shares the connection pool and token.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(ApiClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(config.token.clone())),
        })
    }

    pub fn set_token(&self, token: Option<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match self.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, method: &'static str, path: &str) -> Result<Response, ApiError> {
        debug!(method, path, "api request");
        let response = builder.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                method,
                path: path.to_string(),
                status,
            });
        }
        Ok(response)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let path = "/auth/login";
        let builder = self
            .request(Method::POST, path)
            .json(&LoginRequest { username, password });
        let envelope: Envelope<AuthResponse> = self.send(builder, "POST", path).await?.json().await?;
        match envelope.data {
            Some(auth) if envelope.success => {
                self.set_token(Some(auth.token));
                Ok(())
            }
            _ => Err(ApiError::Rejected(
                envelope.message.unwrap_or_else(|| "login failed".to_string()),
            )),
        }
    }

    /// Support organisations relevant to the text of an entry.
    pub async fn resources_for(&self, journal_entry: &str) -> Result<Vec<Resource>, ApiError> {
        let path = "/resources/get";
        let builder = self
            .request(Method::POST, path)
            .json(&serde_json::json!({ "journal_entry": journal_entry }));
        let response: ResourcesResponse = self.send(builder, "POST", path).await?.json().await?;
        Ok(response.resources)
    }
}

#[async_trait]
impl JournalApi for ApiClient {
    async fn list_entries(&self) -> Result<Vec<RemoteEntry>, ApiError> {
        let path = "/journal/get_entries";
        let response: EntriesResponse = self
            .send(self.request(Method::GET, path), "GET", path)
            .await?
            .json()
            .await?;
        Ok(response.entries)
    }

    // The backend has no single-entry endpoint; detail comes from the full list.
    async fn get_entry(&self, id: &str) -> Result<RemoteEntry, ApiError> {
        self.list_entries()
            .await?
            .into_iter()
            .find(|entry| entry.entry_id == id)
            .ok_or_else(|| ApiError::NotFound(id.to_string()))
    }

    async fn create_entry(&self, request: CreateEntryRequest) -> Result<String, ApiError> {
        let path = "/journal/create_entry";
        let builder = self.request(Method::GET, path).query(&request);
        let created: CreatedEntry = self.send(builder, "GET", path).await?.json().await?;
        Ok(created.entry_id)
    }

    async fn update_entry(&self, request: UpdateEntryRequest) -> Result<RemoteEntry, ApiError> {
        let path = "/journal/update_entry";
        let builder = self.request(Method::POST, path).json(&request);
        let body = self.send(builder, "POST", path).await?.bytes().await?;
        Ok(serde_json::from_slice(&body).unwrap_or_else(|_| RemoteEntry::from(request)))
    }

    async fn delete_entry(&self, id: &str) -> Result<(), ApiError> {
        let path = "/journal/delete_entry";
        let builder = self.request(Method::DELETE, path).query(&[("entry_id", id)]);
        self.send(builder, "DELETE", path).await?;
        Ok(())
    }
}

#[async_trait]
impl SpeechApi for ApiClient {
    async fn generate_speech(&self, text: &str) -> Result<Vec<u8>, ApiError> {
        let path = "/tts/generate";
        let builder = self.request(Method::GET, path).query(&[("text", text)]);
        let audio = self.send(builder, "GET", path).await?.bytes().await?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl TranscriptionApi for ApiClient {
    async fn transcribe(&self, file_name: &str, audio: Vec<u8>) -> Result<Transcription, ApiError> {
        let path = "/spt/transcribe";
        let form = Form::new().part("file", Part::bytes(audio).file_name(file_name.to_string()));
        let builder = self.request(Method::POST, path).multipart(form);
        let response: TranscriptionResponse = self.send(builder, "POST", path).await?.json().await?;
        debug!(status = %response.status, language = %response.transcription.language, "transcription finished");
        Ok(response.transcription)
    }
}

#[async_trait]
impl VoiceProfileApi for ApiClient {
    async fn current_user(&self) -> Result<CurrentUser, ApiError> {
        let path = "/auth/me";
        let user: CurrentUser = self
            .send(self.request(Method::GET, path), "GET", path)
            .await?
            .json()
            .await?;
        Ok(user)
    }

    async fn clone_voice(&self, file_name: &str, sample: Vec<u8>) -> Result<VoiceClone, ApiError> {
        let path = "/tts/clone_voice";
        let form = Form::new().part("file", Part::bytes(sample).file_name(file_name.to_string()));
        let builder = self.request(Method::POST, path).multipart(form);
        let cloned: VoiceClone = self.send(builder, "POST", path).await?.json().await?;
        debug!(status = %cloned.status, "voice sample processed");
        Ok(cloned)
    }
}

#[async_trait]
impl CommunityApi for ApiClient {
    async fn shared_entries(&self, category: Option<&str>) -> Result<Vec<SharedEntry>, ApiError> {
        let path = "/community";
        let mut builder = self.request(Method::GET, path);
        if let Some(category) = category {
            builder = builder.query(&[("category", category)]);
        }
        let envelope: Envelope<Vec<SharedEntry>> = self.send(builder, "GET", path).await?.json().await?;
        if !envelope.success {
            return Err(ApiError::Rejected(
                envelope.message.unwrap_or_else(|| "community feed unavailable".to_string()),
            ));
        }
        Ok(envelope.data.unwrap_or_default())
    }
}

//! In-memory stand-ins for the backend and the audio stack.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::api::{
    ApiError, CommunityApi, CreateEntryRequest, CurrentUser, JournalApi, RemoteEntry, SharedEntry, SpeechApi,
    Transcription, TranscriptionApi, UpdateEntryRequest, VoiceClone, VoiceProfileApi,
};
use crate::playback::{SpeechBackend, SpeechError, SpeechFailure, SpeechSink};

fn refused(method: &'static str, path: &str) -> ApiError {
    ApiError::Status {
        method,
        path: path.to_string(),
        status: StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List,
    Get(String),
    Create(CreateEntryRequest),
    Update(UpdateEntryRequest),
    Delete(String),
}

#[derive(Default)]
pub struct FakeJournalApi {
    records: Mutex<Vec<RemoteEntry>>,
    calls: Mutex<Vec<Call>>,
    issued: AtomicUsize,
    fail_list: AtomicBool,
    fail_create: AtomicBool,
    fail_update: AtomicBool,
    fail_delete: AtomicBool,
}

impl FakeJournalApi {
    pub fn with_records(records: Vec<RemoteEntry>) -> Self {
        FakeJournalApi {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    pub fn record(
        id: &str,
        title: &str,
        note: &str,
        created_at: &str,
        rating: Option<f64>,
    ) -> RemoteEntry {
        RemoteEntry {
            entry_id: id.to_string(),
            title: Some(title.to_string()),
            note: Some(note.to_string()),
            shared: Some(false),
            classification: None,
            created_at: Some(created_at.to_string()),
            feeling_rating: rating,
        }
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Changes a record behind the client's back.
    pub fn edit_record(&self, id: &str, title: &str, note: &str) {
        let mut records = self.records.lock().unwrap();
        let record = records.iter_mut().find(|r| r.entry_id == id).unwrap();
        record.title = Some(title.to_string());
        record.note = Some(note.to_string());
    }

    pub fn note_of(&self, id: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.entry_id == id)
            .and_then(|r| r.note.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl JournalApi for FakeJournalApi {
    async fn list_entries(&self) -> Result<Vec<RemoteEntry>, ApiError> {
        self.log(Call::List);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(refused("GET", "/journal/get_entries"));
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn get_entry(&self, id: &str) -> Result<RemoteEntry, ApiError> {
        self.log(Call::Get(id.to_string()));
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.entry_id == id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(id.to_string()))
    }

    async fn create_entry(&self, request: CreateEntryRequest) -> Result<String, ApiError> {
        self.log(Call::Create(request.clone()));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(refused("GET", "/journal/create_entry"));
        }
        let id = format!("srv-{}", self.issued.fetch_add(1, Ordering::SeqCst) + 1);
        self.records.lock().unwrap().push(RemoteEntry {
            entry_id: id.clone(),
            title: None,
            note: request.content,
            shared: Some(false),
            classification: None,
            created_at: Some("2024-04-10T12:00:00Z".to_string()),
            feeling_rating: request.feeling_rating.map(f64::from),
        });
        Ok(id)
    }

    async fn update_entry(&self, request: UpdateEntryRequest) -> Result<RemoteEntry, ApiError> {
        self.log(Call::Update(request.clone()));
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(refused("POST", "/journal/update_entry"));
        }
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.entry_id == request.entry_id)
            .ok_or_else(|| ApiError::NotFound(request.entry_id.clone()))?;
        if request.title.is_some() {
            record.title = request.title;
        }
        if request.note.is_some() {
            record.note = request.note;
        }
        if request.shared.is_some() {
            record.shared = request.shared;
        }
        if request.classification.is_some() {
            record.classification = request.classification;
        }
        if let Some(rating) = request.feeling_rating {
            record.feeling_rating = Some(f64::from(rating));
        }
        Ok(record.clone())
    }

    async fn delete_entry(&self, id: &str) -> Result<(), ApiError> {
        self.log(Call::Delete(id.to_string()));
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(refused("DELETE", "/journal/delete_entry"));
        }
        self.records.lock().unwrap().retain(|r| r.entry_id != id);
        Ok(())
    }
}

pub struct FakeTranscriptionApi {
    text: String,
    uploads: Mutex<Vec<(String, usize)>>,
}

impl FakeTranscriptionApi {
    pub fn returning(text: &str) -> Self {
        FakeTranscriptionApi {
            text: text.to_string(),
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// File name and byte length of every upload.
    pub fn uploads(&self) -> Vec<(String, usize)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranscriptionApi for FakeTranscriptionApi {
    async fn transcribe(&self, file_name: &str, audio: Vec<u8>) -> Result<Transcription, ApiError> {
        self.uploads
            .lock()
            .unwrap()
            .push((file_name.to_string(), audio.len()));
        Ok(Transcription {
            full_text: self.text.clone(),
            language: "en".to_string(),
        })
    }
}

pub struct FakeSpeechApi {
    audio: Option<Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl FakeSpeechApi {
    pub fn returning(audio: &[u8]) -> Self {
        FakeSpeechApi {
            audio: Some(audio.to_vec()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        FakeSpeechApi {
            audio: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechApi for FakeSpeechApi {
    async fn generate_speech(&self, text: &str) -> Result<Vec<u8>, ApiError> {
        self.requests.lock().unwrap().push(text.to_string());
        self.audio
            .clone()
            .ok_or_else(|| refused("GET", "/tts/generate"))
    }
}

pub struct FakeVoiceProfileApi {
    voice_id: Option<String>,
    cloned_id: String,
    samples: Mutex<Vec<(String, usize)>>,
}

impl FakeVoiceProfileApi {
    pub fn with_voice(voice_id: Option<&str>) -> Self {
        FakeVoiceProfileApi {
            voice_id: voice_id.map(str::to_string),
            cloned_id: "voice-1".to_string(),
            samples: Mutex::new(Vec::new()),
        }
    }

    /// Id handed back for uploaded samples; empty means the clone was refused.
    pub fn cloning(mut self, voice_id: &str) -> Self {
        self.cloned_id = voice_id.to_string();
        self
    }

    pub fn samples(&self) -> Vec<(String, usize)> {
        self.samples.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceProfileApi for FakeVoiceProfileApi {
    async fn current_user(&self) -> Result<CurrentUser, ApiError> {
        Ok(CurrentUser {
            user_id: "u-1".to_string(),
            email: "writer@example.com".to_string(),
            name: "Writer".to_string(),
            voice_id: self.voice_id.clone(),
            onboarded: Some(true),
        })
    }

    async fn clone_voice(&self, file_name: &str, sample: Vec<u8>) -> Result<VoiceClone, ApiError> {
        self.samples
            .lock()
            .unwrap()
            .push((file_name.to_string(), sample.len()));
        Ok(VoiceClone {
            voice_id: self.cloned_id.clone(),
            status: "completed".to_string(),
        })
    }
}

pub struct FakeCommunityApi {
    entries: Vec<SharedEntry>,
    categories: Mutex<Vec<Option<String>>>,
    fail: bool,
}

impl FakeCommunityApi {
    pub fn with_entries(entries: Vec<SharedEntry>) -> Self {
        FakeCommunityApi {
            entries,
            categories: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        FakeCommunityApi {
            fail: true,
            ..Self::with_entries(Vec::new())
        }
    }

    pub fn shared(id: &str, content: &str, category: &str, created_at: Option<&str>) -> SharedEntry {
        SharedEntry {
            id: id.to_string(),
            content: content.to_string(),
            category: category.to_string(),
            title: None,
            created_at: created_at.map(str::to_string),
        }
    }

    /// Category requested by each call.
    pub fn categories(&self) -> Vec<Option<String>> {
        self.categories.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommunityApi for FakeCommunityApi {
    async fn shared_entries(&self, category: Option<&str>) -> Result<Vec<SharedEntry>, ApiError> {
        self.categories
            .lock()
            .unwrap()
            .push(category.map(str::to_string));
        if self.fail {
            return Err(refused("GET", "/community"));
        }
        Ok(self
            .entries
            .iter()
            .filter(|entry| category.map_or(true, |wanted| entry.category == wanted))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct Script {
    spoken: Vec<String>,
    sink: Option<SpeechSink>,
    cancels: usize,
    resumes: usize,
    pausable: bool,
    speaking: bool,
    refuse: bool,
}

/// Backend whose audio is driven by a [`BackendProbe`].
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
}

#[derive(Clone)]
pub struct BackendProbe {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    pub fn new() -> (ScriptedBackend, BackendProbe) {
        let script = Arc::new(Mutex::new(Script::default()));
        (
            ScriptedBackend {
                script: Arc::clone(&script),
            },
            BackendProbe { script },
        )
    }

    fn record(&self, text: &str, sink: SpeechSink) -> Result<(), SpeechError> {
        let mut script = self.script.lock().unwrap();
        if script.refuse {
            return Err(SpeechError::EmptyCommand);
        }
        script.spoken.push(text.to_string());
        script.sink = Some(sink);
        script.speaking = false;
        Ok(())
    }
}

#[async_trait]
impl SpeechBackend for ScriptedBackend {
    async fn speak(&mut self, text: &str, sink: SpeechSink) -> Result<(), SpeechError> {
        self.record(text, sink)
    }

    fn cancel(&mut self) {
        let mut script = self.script.lock().unwrap();
        script.cancels += 1;
        script.speaking = false;
    }

    fn pause(&mut self) -> bool {
        let mut script = self.script.lock().unwrap();
        if script.pausable {
            script.speaking = false;
        }
        script.pausable
    }

    fn resume(&mut self) {
        self.script.lock().unwrap().resumes += 1;
    }

    fn is_speaking(&self) -> bool {
        self.script.lock().unwrap().speaking
    }
}

impl BackendProbe {
    pub fn spoken(&self) -> Vec<String> {
        self.script.lock().unwrap().spoken.clone()
    }

    pub fn cancels(&self) -> usize {
        self.script.lock().unwrap().cancels
    }

    pub fn resumes(&self) -> usize {
        self.script.lock().unwrap().resumes
    }

    /// Sink of the most recent utterance.
    pub fn sink(&self) -> SpeechSink {
        self.script.lock().unwrap().sink.clone().unwrap()
    }

    pub fn set_pausable(&self, pausable: bool) {
        self.script.lock().unwrap().pausable = pausable;
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.script.lock().unwrap().speaking = speaking;
    }

    pub fn refuse_speak(&self) {
        self.script.lock().unwrap().refuse = true;
    }

    pub fn start(&self) {
        self.set_speaking(true);
        self.sink().started();
    }

    pub fn finish(&self) {
        self.set_speaking(false);
        self.sink().finished();
    }

    pub fn interrupt(&self) {
        self.set_speaking(false);
        self.sink().failed(SpeechFailure::Interrupted);
    }

    pub fn fail(&self, message: &str) {
        self.set_speaking(false);
        self.sink().failed(SpeechFailure::Error(message.to_string()));
    }
}

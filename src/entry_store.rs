//! Entry store: the single owner of the entry list and the open entry.
//!
//! Everything that completes later (API calls, the autosave debounce, playback
//! readiness delays) is spawned onto the runtime and reports back as a
//! [`StoreEvent`] on the store's own channel. The owner drives the store by
//! awaiting [`EntryStore::next_event`] and feeding the result to
//! [`EntryStore::handle`], so every state transition happens on one task.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, CreateEntryRequest, JournalApi, RemoteEntry, UpdateEntryRequest};
use crate::config::TimingConfig;
use crate::journal_entry::{EntryId, JournalEntry, MoodRating, NEUTRAL_MOOD, VOICE_NOTE_TITLE};
use crate::voice::VoiceError;
use crate::voice_events::{VoiceEvent, VoiceEvents};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreTimings {
    pub autosave_debounce: Duration,
    pub saved_ready_delay: Duration,
    pub selected_ready_delay: Duration,
}

impl Default for StoreTimings {
    fn default() -> Self {
        StoreTimings::from(&TimingConfig::default())
    }
}

impl From<&TimingConfig> for StoreTimings {
    fn from(config: &TimingConfig) -> Self {
        StoreTimings {
            autosave_debounce: Duration::from_millis(config.autosave_debounce_ms),
            saved_ready_delay: Duration::from_millis(config.saved_ready_delay_ms),
            selected_ready_delay: Duration::from_millis(config.selected_ready_delay_ms),
        }
    }
}

/// What a save call carried, applied to the list copy once the backend accepts it.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedFields {
    pub title: String,
    pub content: String,
    pub mood: Option<MoodRating>,
}

#[derive(Debug)]
pub enum StoreEvent {
    Loaded(Result<Vec<RemoteEntry>, ApiError>),
    DetailFetched {
        id: EntryId,
        revision: u64,
        result: Result<RemoteEntry, ApiError>,
    },
    Committed {
        local: EntryId,
        result: Result<String, ApiError>,
    },
    Saved {
        id: EntryId,
        revision: u64,
        fields: SavedFields,
        result: Result<(), ApiError>,
    },
    Deleted {
        id: EntryId,
        result: Result<(), ApiError>,
    },
    AutosaveDue {
        revision: u64,
    },
    PlaybackReadyDue {
        revision: u64,
    },
    Voice(VoiceEvent),
}

pub struct EntryStore {
    api: Arc<dyn JournalApi>,
    timings: StoreTimings,
    voice_events: VoiceEvents,
    voice_rx: Option<broadcast::Receiver<VoiceEvent>>,
    events_tx: mpsc::UnboundedSender<StoreEvent>,
    events_rx: mpsc::UnboundedReceiver<StoreEvent>,

    entries: Vec<JournalEntry>,
    current: Option<JournalEntry>,
    saved: bool,
    playback_ready: bool,
    loading: bool,
    /// Bumped on every mutation of the open entry and on every switch.
    revision: u64,
    committing: HashSet<EntryId>,
    voice_notes: HashSet<EntryId>,
    autosave_timer: Option<JoinHandle<()>>,
    ready_timer: Option<JoinHandle<()>>,
}

impl EntryStore {
    pub fn new(api: Arc<dyn JournalApi>, timings: StoreTimings, voice_events: VoiceEvents) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let voice_rx = Some(voice_events.subscribe());
        EntryStore {
            api,
            timings,
            voice_events,
            voice_rx,
            events_tx,
            events_rx,
            entries: Vec::new(),
            current: None,
            saved: true,
            playback_ready: false,
            loading: false,
            revision: 0,
            committing: HashSet::new(),
            voice_notes: HashSet::new(),
            autosave_timer: None,
            ready_timer: None,
        }
    }

    pub fn get_entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn current(&self) -> Option<&JournalEntry> {
        self.current.as_ref()
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn is_playback_ready(&self) -> bool {
        self.playback_ready
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn search_entries(&self, query: &str) -> Vec<JournalEntry> {
        self.entries.iter().filter(|e| e.matches(query)).cloned().collect()
    }

    /// Waits for the next timer or API completion. Never resolves while nothing is pending.
    pub async fn next_event(&mut self) -> StoreEvent {
        loop {
            let received = tokio::select! {
                Some(event) = self.events_rx.recv() => return event,
                received = recv_voice(self.voice_rx.as_mut()) => received,
            };
            match received {
                Ok(event @ VoiceEvent::CreateVoiceNote { .. }) => return StoreEvent::Voice(event),
                // Our own announcements come back on the shared bus.
                Ok(VoiceEvent::VoiceNoteCreated { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => warn!(skipped, "voice events lagged"),
                Err(broadcast::error::RecvError::Closed) => self.voice_rx = None,
            }
        }
    }

    pub async fn step(&mut self) {
        let event = self.next_event().await;
        self.handle(event);
    }

    pub fn handle(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::Loaded(result) => self.on_loaded(result),
            StoreEvent::DetailFetched { id, revision, result } => self.on_detail(id, revision, result),
            StoreEvent::Committed { local, result } => self.on_committed(local, result),
            StoreEvent::Saved {
                id,
                revision,
                fields,
                result,
            } => self.on_saved(id, revision, fields, result),
            StoreEvent::Deleted { id, result } => match result {
                Ok(()) => info!(%id, "entry deleted remotely"),
                Err(err) => error!(%id, %err, "remote delete failed, entry stays removed locally"),
            },
            StoreEvent::AutosaveDue { revision } => self.on_autosave_due(revision),
            StoreEvent::PlaybackReadyDue { revision } => {
                if revision == self.revision && self.saved {
                    debug!(revision, "playback ready");
                    self.playback_ready = true;
                }
            }
            StoreEvent::Voice(VoiceEvent::CreateVoiceNote { transcript }) => {
                if let Err(err) = self.create_voice_note(&transcript) {
                    warn!(%err, "voice note not created");
                }
            }
            StoreEvent::Voice(VoiceEvent::VoiceNoteCreated { .. }) => {}
        }
    }

    pub fn load(&mut self) {
        self.loading = true;
        let api = Arc::clone(&self.api);
        self.spawn_call(async move { StoreEvent::Loaded(api.list_entries().await) });
    }

    /// Opens a fresh local entry. It is committed to the backend by the autosave cycle.
    pub fn new_entry(&mut self) -> EntryId {
        self.leave_current();
        let entry = JournalEntry::new(None, String::new(), None);
        let id = entry.id.clone();
        info!(%id, "new local entry");
        self.entries.insert(0, entry.clone());
        self.current = Some(entry);
        self.mark_dirty();
        id
    }

    /// Adds an entry and commits it right away: create, then populate.
    pub fn add_entry(&mut self, title: Option<String>, content: String, mood: Option<u8>) -> EntryId {
        self.leave_current();
        let mood = MoodRating::new(mood.unwrap_or(NEUTRAL_MOOD));
        let entry = JournalEntry::new(title, content, Some(mood));
        let id = entry.id.clone();
        self.entries.insert(0, entry.clone());
        self.current = Some(entry.clone());
        self.revision += 1;
        self.saved = false;
        self.playback_ready = false;
        self.cancel_timers();
        self.spawn_commit(&entry);
        id
    }

    pub fn create_voice_note(&mut self, transcript: &str) -> Result<EntryId, VoiceError> {
        if transcript.trim().is_empty() {
            return Err(VoiceError::EmptyTranscription);
        }
        let id = self.add_entry(Some(VOICE_NOTE_TITLE.to_string()), transcript.to_string(), None);
        self.voice_notes.insert(id.clone());
        Ok(id)
    }

    pub fn select_entry(&mut self, id: &EntryId) {
        if self.current.as_ref().is_some_and(|current| &current.id == id) {
            return;
        }
        let Some(index) = self.entries.iter().position(|e| &e.id == id) else {
            warn!(%id, "selected entry is not in the list");
            return;
        };
        self.leave_current();
        self.open(index, true);
    }

    /// Saves the open entry now instead of waiting out the debounce, and
    /// drives the store until the save lands or `timeout` passes.
    ///
    /// Returns whether the open entry ended up saved.
    pub async fn flush(&mut self, timeout: Duration) -> bool {
        let Some(current) = self.current.clone() else {
            return true;
        };
        if self.saved {
            return true;
        }
        if let Some(timer) = self.autosave_timer.take() {
            timer.abort();
        }
        info!(id = %current.id, "flushing unsaved edits");
        self.push(&current);

        let drained = tokio::time::timeout(timeout, async {
            while !self.saved {
                self.step().await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(id = %current.id, "flush timed out");
        }
        self.saved
    }

    pub fn update_title(&mut self, title: String) {
        if let Some(current) = self.current.as_mut() {
            current.title = title;
            self.mark_dirty();
        }
    }

    pub fn update_content(&mut self, content: String) {
        if let Some(current) = self.current.as_mut() {
            current.content = content;
            self.mark_dirty();
        }
    }

    pub fn set_mood(&mut self, value: u8) {
        if let Some(current) = self.current.as_mut() {
            current.mood = Some(MoodRating::new(value));
            self.mark_dirty();
        }
    }

    /// Removes the entry locally at once; committed entries are also deleted remotely.
    pub fn delete_entry(&mut self, id: &EntryId) {
        let Some(index) = self.entries.iter().position(|e| &e.id == id) else {
            return;
        };
        let removed = self.entries.remove(index);
        self.voice_notes.remove(&removed.id);
        if let Some(server_id) = removed.id.server_id() {
            self.spawn_delete(server_id.to_string());
        }

        let was_current = self.current.as_ref().is_some_and(|current| &current.id == id);
        if was_current {
            self.current = None;
            if self.entries.is_empty() {
                self.new_entry();
            } else {
                self.open(0, true);
            }
        }
    }

    fn on_loaded(&mut self, result: Result<Vec<RemoteEntry>, ApiError>) {
        self.loading = false;
        let records = match result {
            Ok(records) => records,
            Err(err) => {
                error!(%err, "failed to load entries, starting a local entry");
                if self.current.is_none() {
                    self.new_entry();
                }
                return;
            }
        };
        info!(count = records.len(), "entries loaded");

        let mut loaded: Vec<JournalEntry> = records.into_iter().map(JournalEntry::from).collect();
        loaded.sort_by(|a, b| b.date.cmp(&a.date));
        // Entries created before the list arrived have no server copy yet.
        self.entries.retain(|entry| entry.id.is_pending());
        self.entries.extend(loaded);

        let current_listed = self
            .current
            .as_ref()
            .is_some_and(|current| self.entries.iter().any(|e| e.id == current.id));
        if !current_listed {
            self.current = None;
            if self.entries.is_empty() {
                self.new_entry();
            } else {
                self.open(0, false);
            }
        }
    }

    fn on_detail(&mut self, id: EntryId, revision: u64, result: Result<RemoteEntry, ApiError>) {
        let remote = match result {
            Ok(remote) => remote,
            Err(err) => {
                warn!(%id, %err, "could not refresh entry detail");
                return;
            }
        };
        // Local edits made after the selection win over the fetched copy.
        if revision != self.revision || self.current.as_ref().map(|c| &c.id) != Some(&id) {
            return;
        }
        let fresh = JournalEntry::from(remote);
        if let Some(listed) = self.entries.iter_mut().find(|e| e.id == id) {
            *listed = fresh.clone();
        }
        let had_content = self.current.as_ref().is_some_and(|c| !c.content.is_empty());
        self.current = Some(fresh.clone());
        if !had_content && !fresh.content.is_empty() && !self.playback_ready {
            self.schedule_ready(self.timings.selected_ready_delay);
        }
    }

    fn on_committed(&mut self, local: EntryId, result: Result<String, ApiError>) {
        self.committing.remove(&local);
        let server_id = match result {
            Ok(server_id) => server_id,
            Err(err) => {
                error!(%local, %err, "create failed, entry stays unsaved");
                return;
            }
        };
        let committed = EntryId::committed(server_id.clone());

        let Some(listed) = self.entries.iter_mut().find(|e| e.id == local) else {
            info!(%local, %committed, "entry deleted before its create returned, removing server copy");
            self.spawn_delete(server_id);
            return;
        };
        listed.id = committed.clone();
        if let Some(current) = self.current.as_mut().filter(|c| c.id == local) {
            current.id = committed.clone();
        }
        info!(%local, %committed, "entry committed");

        if self.voice_notes.remove(&local) {
            self.voice_events.publish(VoiceEvent::VoiceNoteCreated { id: committed.clone() });
        }
        self.spawn_update(&committed);
    }

    fn on_saved(&mut self, id: EntryId, revision: u64, fields: SavedFields, result: Result<(), ApiError>) {
        if let Err(err) = result {
            error!(%id, %err, "save failed, entry stays unsaved");
            return;
        }
        if let Some(listed) = self.entries.iter_mut().find(|e| e.id == id) {
            listed.title = fields.title;
            listed.content = fields.content;
            listed.mood = fields.mood;
        }

        let is_current = self.current.as_ref().is_some_and(|c| c.id == id);
        if !is_current || self.saved {
            return;
        }
        if revision == self.revision {
            debug!(%id, revision, "entry saved");
            self.saved = true;
            self.playback_ready = false;
            self.schedule_ready(self.timings.saved_ready_delay);
        } else {
            // Edits landed while this save was in flight.
            self.arm_autosave();
        }
    }

    fn on_autosave_due(&mut self, revision: u64) {
        if revision != self.revision || self.saved {
            return;
        }
        let Some(current) = self.current.clone() else {
            return;
        };
        self.push(&current);
    }

    /// Writes the working copy back to the list and flushes it when unsaved.
    fn leave_current(&mut self) {
        let Some(current) = self.current.take() else {
            return;
        };
        if let Some(listed) = self.entries.iter_mut().find(|e| e.id == current.id) {
            *listed = current.clone();
        }
        if !self.saved {
            self.push(&current);
        }
    }

    /// Sends `entry` to the backend: create-then-update while pending, update once committed.
    fn push(&mut self, entry: &JournalEntry) {
        if entry.id.is_pending() {
            if !self.committing.contains(&entry.id) {
                self.spawn_commit(entry);
            }
        } else {
            self.spawn_update(&entry.id);
        }
    }

    fn open(&mut self, index: usize, refresh: bool) {
        let entry = self.entries[index].clone();
        debug!(id = %entry.id, "opening entry");
        self.current = Some(entry.clone());
        self.revision += 1;
        self.cancel_timers();
        self.playback_ready = false;

        if entry.id.is_pending() {
            self.saved = false;
            self.arm_autosave();
            return;
        }
        self.saved = true;
        if !entry.content.is_empty() {
            self.schedule_ready(self.timings.selected_ready_delay);
        }
        if refresh {
            let api = Arc::clone(&self.api);
            let revision = self.revision;
            let id = entry.id.clone();
            self.spawn_call(async move {
                let result = api.get_entry(id.as_str()).await;
                StoreEvent::DetailFetched { id, revision, result }
            });
        }
    }

    fn mark_dirty(&mut self) {
        self.revision += 1;
        self.saved = false;
        self.playback_ready = false;
        if let Some(timer) = self.ready_timer.take() {
            timer.abort();
        }
        self.arm_autosave();
    }

    fn arm_autosave(&mut self) {
        if let Some(timer) = self.autosave_timer.take() {
            timer.abort();
        }
        let revision = self.revision;
        let delay = self.timings.autosave_debounce;
        self.autosave_timer = Some(self.spawn_timer(delay, StoreEvent::AutosaveDue { revision }));
    }

    fn schedule_ready(&mut self, delay: Duration) {
        if let Some(timer) = self.ready_timer.take() {
            timer.abort();
        }
        let revision = self.revision;
        self.ready_timer = Some(self.spawn_timer(delay, StoreEvent::PlaybackReadyDue { revision }));
    }

    fn cancel_timers(&mut self) {
        for timer in [self.autosave_timer.take(), self.ready_timer.take()].into_iter().flatten() {
            timer.abort();
        }
    }

    fn spawn_timer(&self, delay: Duration, event: StoreEvent) -> JoinHandle<()> {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        })
    }

    fn spawn_call<F>(&self, call: F)
    where
        F: std::future::Future<Output = StoreEvent> + Send + 'static,
    {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(call.await);
        });
    }

    fn spawn_commit(&mut self, entry: &JournalEntry) {
        self.committing.insert(entry.id.clone());
        let api = Arc::clone(&self.api);
        let local = entry.id.clone();
        let request = CreateEntryRequest {
            content: Some(entry.content.clone()).filter(|content| !content.is_empty()),
            feeling_rating: entry.mood.as_ref().map(|mood| mood.value),
        };
        debug!(%local, "creating entry remotely");
        self.spawn_call(async move {
            let result = api.create_entry(request).await;
            StoreEvent::Committed { local, result }
        });
    }

    /// Pushes the freshest local copy of `id`: the working copy when it is open.
    fn spawn_update(&self, id: &EntryId) {
        let Some(server_id) = id.server_id() else {
            return;
        };
        let source = match self.current.as_ref().filter(|c| &c.id == id) {
            Some(current) => current,
            None => match self.entries.iter().find(|e| &e.id == id) {
                Some(listed) => listed,
                None => return,
            },
        };
        let fields = SavedFields {
            title: source.title.clone(),
            content: source.content.clone(),
            mood: source.mood.clone(),
        };
        let request = UpdateEntryRequest {
            entry_id: server_id.to_string(),
            note: Some(fields.content.clone()),
            title: Some(fields.title.clone()),
            feeling_rating: fields.mood.as_ref().map(|mood| mood.value),
            ..Default::default()
        };
        let api = Arc::clone(&self.api);
        let id = id.clone();
        let revision = self.revision;
        debug!(%id, revision, "saving entry");
        self.spawn_call(async move {
            let result = api.update_entry(request).await.map(|_| ());
            StoreEvent::Saved {
                id,
                revision,
                fields,
                result,
            }
        });
    }

    fn spawn_delete(&self, server_id: String) {
        let api = Arc::clone(&self.api);
        self.spawn_call(async move {
            let result = api.delete_entry(&server_id).await;
            StoreEvent::Deleted {
                id: EntryId::committed(server_id),
                result,
            }
        });
    }
}

async fn recv_voice(
    rx: Option<&mut broadcast::Receiver<VoiceEvent>>,
) -> Result<VoiceEvent, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Drop for EntryStore {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}

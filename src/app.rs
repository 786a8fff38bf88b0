//! Interactive shell around the entry store and the player.
//!
//! Input, store events, player events, and background task results are
//! multiplexed in one loop, so nothing here blocks while a request is out.

use chrono::Local;
use color_eyre::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError, Resource};
use crate::community::CommunityFeed;
use crate::config::CommunityConfig;
use crate::entry_store::{EntryStore, StoreEvent};
use crate::journal_entry::{EntryId, JournalEntry, NEUTRAL_MOOD};
use crate::playback::{PlayGate, PlayOutcome, Player};
use crate::text_input::TextInput;
use crate::ui::{self, Tui};
use crate::voice::{Transcriber, VoiceCalibrator, VoiceError};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Journal,
    Insights,
    Community,
    Resources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Entries,
    Title,
    Content,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Modal {
    Mood { selected: u8 },
    ConfirmDelete { id: EntryId, title: String },
    Search { query: TextInput, selected: usize },
    Record { path: TextInput },
    /// Path of a voice sample to clone for narration.
    Calibrate { path: TextInput },
    Login {
        username: TextInput,
        password: TextInput,
        on_password: bool,
    },
}

#[derive(Debug)]
pub enum TaskEvent {
    Transcribed(Result<String, VoiceError>),
    CommunityLoaded(Result<CommunityFeed, ApiError>),
    ResourcesLoaded(Result<Vec<Resource>, ApiError>),
    LoggedIn(Result<(), ApiError>),
    VoiceChecked(Result<bool, ApiError>),
    Calibrated(Result<String, VoiceError>),
}

/// Collaborators the screens reach beyond the store.
pub struct Services {
    pub client: ApiClient,
    pub transcriber: Arc<Transcriber>,
    pub calibrator: Arc<VoiceCalibrator>,
    pub community: CommunityConfig,
}

pub struct App {
    pub(crate) store: EntryStore,
    pub(crate) player: Player,
    services: Services,
    pub(crate) screen: Screen,
    pub(crate) focus: Focus,
    pub(crate) modal: Option<Modal>,
    pub(crate) title: TextInput,
    pub(crate) content: TextInput,
    /// Highlighted row of the entry list.
    pub(crate) highlighted: usize,
    pub(crate) community: CommunityFeed,
    pub(crate) community_loading: bool,
    pub(crate) resources: Vec<Resource>,
    pub(crate) resources_loading: bool,
    pub(crate) status: Option<String>,
    quit: bool,
    tasks_tx: mpsc::UnboundedSender<TaskEvent>,
    tasks_rx: mpsc::UnboundedReceiver<TaskEvent>,
}

impl App {
    pub fn new(store: EntryStore, player: Player, services: Services) -> Self {
        let (tasks_tx, tasks_rx) = mpsc::unbounded_channel();
        App {
            store,
            player,
            services,
            screen: Screen::Journal,
            focus: Focus::Entries,
            modal: None,
            title: TextInput::default(),
            content: TextInput::default(),
            highlighted: 0,
            community: CommunityFeed::default(),
            community_loading: false,
            resources: Vec::new(),
            resources_loading: false,
            status: None,
            quit: false,
            tasks_tx,
            tasks_rx,
        }
    }

    pub async fn run(&mut self, tui: &mut Tui) -> Result<()> {
        let mut terminal_events = EventStream::new();
        self.store.load();
        self.check_voice();

        while !self.quit {
            tui.draw(|frame| ui::draw(frame, self))?;

            tokio::select! {
                event = terminal_events.next() => match event {
                    Some(Ok(event)) => self.on_terminal_event(event).await,
                    Some(Err(err)) => return Err(err.into()),
                    None => break,
                },
                event = self.store.next_event() => self.on_store_event(event),
                Some(event) = self.player.next_event() => self.player.handle(event).await,
                Some(event) = self.tasks_rx.recv() => self.on_task(event),
            }
        }

        self.shutdown().await;
        info!("leaving journal");
        Ok(())
    }

    /// Saves edits still inside the debounce window and silences the player.
    pub async fn shutdown(&mut self) {
        self.player.shutdown();
        if !self.store.flush(FLUSH_TIMEOUT).await {
            warn!("quit before the last edits were saved");
        }
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub(crate) fn visible_entries(&self) -> &[JournalEntry] {
        self.store.get_entries()
    }

    pub(crate) fn search_results(&self) -> Vec<JournalEntry> {
        match &self.modal {
            Some(Modal::Search { query, .. }) => self.store.search_entries(query.text()),
            _ => Vec::new(),
        }
    }

    async fn on_terminal_event(&mut self, event: Event) {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.on_key(key).await,
            Event::FocusLost => self.player.set_visible(false),
            Event::FocusGained => self.player.set_visible(true),
            _ => {}
        }
    }

    fn on_store_event(&mut self, event: StoreEvent) {
        // Only a load or a new voice note can open a different entry; a commit
        // renames the open one.
        let may_switch = matches!(event, StoreEvent::Loaded(_) | StoreEvent::Voice(_));
        let previous = self.current_id();
        self.store.handle(event);
        if may_switch && self.current_id() != previous {
            self.player.stop();
        }
        self.sync_inputs();
    }

    fn current_id(&self) -> Option<EntryId> {
        self.store.current().map(|entry| entry.id.clone())
    }

    /// Narration belongs to the open entry, so opening another one ends it.
    fn after_switch(&mut self, previous: Option<EntryId>) {
        if self.current_id() != previous {
            self.player.stop();
        }
        self.sync_inputs();
        self.highlight_current();
    }

    /// Pulls the current entry into the inputs when the store changed it underneath them.
    fn sync_inputs(&mut self) {
        let (title, content) = match self.store.current() {
            Some(entry) => (entry.title.clone(), entry.content.clone()),
            None => (String::new(), String::new()),
        };
        if self.title.text() != title {
            self.title.set_text(&title);
        }
        if self.content.text() != content {
            self.content.set_text(&content);
        }
        let count = self.store.get_entries().len();
        if count == 0 {
            self.highlighted = 0;
        } else if self.highlighted >= count {
            self.highlighted = count - 1;
        }
    }

    fn highlight_current(&mut self) {
        if let Some(current) = self.store.current() {
            if let Some(index) = self.store.get_entries().iter().position(|e| e.id == current.id) {
                self.highlighted = index;
            }
        }
    }

    fn on_task(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Transcribed(Ok(transcript)) => {
                info!(chars = transcript.chars().count(), "voice note transcribed");
                self.status = Some("Voice note added".to_string());
            }
            TaskEvent::Transcribed(Err(err)) => {
                warn!(%err, "transcription failed");
                self.status = Some(err.to_string());
            }
            TaskEvent::CommunityLoaded(result) => {
                self.community_loading = false;
                match result {
                    Ok(feed) => self.community = feed,
                    Err(err) => {
                        warn!(%err, "could not load community stories");
                        self.status = Some(format!("Could not load stories: {err}"));
                    }
                }
            }
            TaskEvent::ResourcesLoaded(result) => {
                self.resources_loading = false;
                match result {
                    Ok(resources) => self.resources = resources,
                    Err(err) => {
                        warn!(%err, "could not load resources");
                        self.status = Some(format!("Could not load resources: {err}"));
                    }
                }
            }
            TaskEvent::LoggedIn(Ok(())) => {
                self.status = Some("Logged in".to_string());
                self.store.load();
                self.check_voice();
            }
            TaskEvent::LoggedIn(Err(err)) => {
                self.status = Some(err.to_string());
            }
            TaskEvent::VoiceChecked(Ok(true)) => {
                if self.modal.is_none() {
                    self.modal = Some(Modal::Calibrate {
                        path: TextInput::default(),
                    });
                }
            }
            TaskEvent::VoiceChecked(Ok(false)) => {}
            TaskEvent::VoiceChecked(Err(err)) => warn!(%err, "could not check the narration voice"),
            TaskEvent::Calibrated(Ok(voice_id)) => {
                self.status = Some(format!("Voice calibrated ({voice_id})"));
            }
            TaskEvent::Calibrated(Err(err)) => {
                warn!(%err, "voice calibration failed");
                self.status = Some(err.to_string());
            }
        }
    }

    fn spawn_task<F>(&self, task: F)
    where
        F: Future<Output = TaskEvent> + Send + 'static,
    {
        let tx = self.tasks_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(task.await);
        });
    }

    pub async fn on_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit = true;
            return;
        }
        if self.modal.is_some() {
            self.on_modal_key(key);
            return;
        }
        match self.screen {
            Screen::Journal => self.on_journal_key(key).await,
            Screen::Insights => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('i')) {
                    self.screen = Screen::Journal;
                }
            }
            Screen::Community => self.on_community_key(key).await,
            Screen::Resources => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('q')) {
                    self.screen = Screen::Journal;
                }
            }
        }
    }

    async fn on_journal_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('p') {
            self.toggle_entry_playback().await;
            return;
        }
        match self.focus {
            Focus::Entries => self.on_entries_key(key).await,
            Focus::Title => self.on_title_key(key),
            Focus::Content => self.on_content_key(key),
        }
    }

    async fn on_entries_key(&mut self, key: KeyEvent) {
        let count = self.store.get_entries().len();
        match key.code {
            KeyCode::Char('q') => self.quit = true,
            KeyCode::Up | KeyCode::Char('k') => self.highlighted = self.highlighted.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                if self.highlighted + 1 < count {
                    self.highlighted += 1;
                }
            }
            KeyCode::Enter => {
                if let Some(entry) = self.store.get_entries().get(self.highlighted) {
                    let id = entry.id.clone();
                    let previous = self.current_id();
                    self.store.select_entry(&id);
                    self.after_switch(previous);
                    self.focus = Focus::Content;
                }
            }
            KeyCode::Tab => self.focus = Focus::Title,
            KeyCode::Char('n') => {
                let previous = self.current_id();
                self.store.new_entry();
                self.after_switch(previous);
                self.focus = Focus::Title;
            }
            KeyCode::Char('d') => {
                if let Some(entry) = self.store.get_entries().get(self.highlighted) {
                    self.modal = Some(Modal::ConfirmDelete {
                        id: entry.id.clone(),
                        title: entry.title.clone(),
                    });
                }
            }
            KeyCode::Char('m') if self.store.current().is_some() => {
                let selected = self
                    .store
                    .current()
                    .and_then(|entry| entry.mood.as_ref())
                    .map_or(NEUTRAL_MOOD, |mood| mood.value);
                self.modal = Some(Modal::Mood { selected });
            }
            KeyCode::Char('p') | KeyCode::Char(' ') => self.toggle_entry_playback().await,
            KeyCode::Char('/') => {
                self.modal = Some(Modal::Search {
                    query: TextInput::default(),
                    selected: 0,
                })
            }
            KeyCode::Char('r') => {
                self.modal = Some(Modal::Record {
                    path: TextInput::default(),
                })
            }
            KeyCode::Char('v') => {
                self.modal = Some(Modal::Calibrate {
                    path: TextInput::default(),
                })
            }
            KeyCode::Char('l') => {
                self.modal = Some(Modal::Login {
                    username: TextInput::default(),
                    password: TextInput::default(),
                    on_password: false,
                })
            }
            KeyCode::Char('i') => self.screen = Screen::Insights,
            KeyCode::Char('c') => self.open_community().await,
            KeyCode::Char('h') => self.open_resources(),
            _ => {}
        }
    }

    fn on_title_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.focus = Focus::Entries,
            KeyCode::Enter | KeyCode::Tab | KeyCode::Down => self.focus = Focus::Content,
            KeyCode::Char(c) => {
                self.title.insert(c);
                self.push_title();
            }
            KeyCode::Backspace => {
                if self.title.backspace() {
                    self.push_title();
                }
            }
            KeyCode::Delete => {
                if self.title.delete() {
                    self.push_title();
                }
            }
            KeyCode::Left => self.title.left(),
            KeyCode::Right => self.title.right(),
            KeyCode::Home => self.title.home(),
            KeyCode::End => self.title.end(),
            _ => {}
        }
    }

    fn on_content_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Tab => self.focus = Focus::Entries,
            KeyCode::Char(c) => {
                self.content.insert(c);
                self.push_content();
            }
            KeyCode::Enter => {
                self.content.insert('\n');
                self.push_content();
            }
            KeyCode::Backspace => {
                if self.content.backspace() {
                    self.push_content();
                }
            }
            KeyCode::Delete => {
                if self.content.delete() {
                    self.push_content();
                }
            }
            KeyCode::Left => self.content.left(),
            KeyCode::Right => self.content.right(),
            KeyCode::Up => self.content.up(),
            KeyCode::Down => self.content.down(),
            KeyCode::Home => self.content.home(),
            KeyCode::End => self.content.end(),
            _ => {}
        }
    }

    fn push_title(&mut self) {
        self.store.update_title(self.title.text().to_string());
    }

    fn push_content(&mut self) {
        self.store.update_content(self.content.text().to_string());
    }

    async fn toggle_entry_playback(&mut self) {
        let Some(text) = self.store.current().map(|entry| entry.content.clone()) else {
            return;
        };
        let gate = PlayGate {
            saved: self.store.is_saved(),
            ready: self.store.is_playback_ready(),
        };
        if self.player.toggle(&text, gate).await == PlayOutcome::Rejected {
            self.status = Some(if !gate.saved {
                "Saving, try again in a moment".to_string()
            } else {
                "Preparing audio, try again in a moment".to_string()
            });
        }
    }

    async fn open_community(&mut self) {
        self.player.stop();
        self.screen = Screen::Community;
        self.community_loading = true;
        let client = self.services.client.clone();
        let config = self.services.community.clone();
        self.spawn_task(async move {
            TaskEvent::CommunityLoaded(CommunityFeed::fetch(&client, &config, Local::now()).await)
        });
    }

    fn open_resources(&mut self) {
        let Some(text) = self.store.current().map(|entry| entry.content.clone()) else {
            return;
        };
        self.screen = Screen::Resources;
        self.resources_loading = true;
        let client = self.services.client.clone();
        self.spawn_task(async move { TaskEvent::ResourcesLoaded(client.resources_for(&text).await) });
    }

    async fn on_community_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                self.player.stop();
                self.screen = Screen::Journal;
            }
            KeyCode::Up | KeyCode::Char('k') => self.community.previous(),
            KeyCode::Down | KeyCode::Char('j') => self.community.next(),
            KeyCode::Char('r') => self.open_community().await,
            KeyCode::Char('p') | KeyCode::Char(' ') | KeyCode::Enter => {
                if let Some(story) = self.community.current() {
                    let text = story.content.clone();
                    self.player.toggle(&text, PlayGate::open()).await;
                }
            }
            _ => {}
        }
    }

    fn on_modal_key(&mut self, key: KeyEvent) {
        let Some(modal) = self.modal.take() else {
            return;
        };
        if key.code == KeyCode::Esc {
            return;
        }
        self.modal = match modal {
            Modal::Mood { selected } => match key.code {
                KeyCode::Left | KeyCode::Char('h') => Some(Modal::Mood {
                    selected: selected.saturating_sub(1).max(1),
                }),
                KeyCode::Right | KeyCode::Char('l') => Some(Modal::Mood {
                    selected: (selected + 1).min(5),
                }),
                KeyCode::Char(c @ '1'..='5') => Some(Modal::Mood {
                    selected: c as u8 - b'0',
                }),
                KeyCode::Enter => {
                    self.store.set_mood(selected);
                    None
                }
                _ => Some(Modal::Mood { selected }),
            },
            Modal::ConfirmDelete { id, title } => match key.code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    let previous = self.current_id();
                    self.store.delete_entry(&id);
                    self.after_switch(previous);
                    None
                }
                KeyCode::Char('n') => None,
                _ => Some(Modal::ConfirmDelete { id, title }),
            },
            Modal::Search {
                mut query,
                mut selected,
            } => {
                match key.code {
                    KeyCode::Enter => {
                        let results = self.store.search_entries(query.text());
                        if let Some(entry) = results.get(selected) {
                            let previous = self.current_id();
                            self.store.select_entry(&entry.id);
                            self.after_switch(previous);
                        }
                        return;
                    }
                    KeyCode::Up => selected = selected.saturating_sub(1),
                    KeyCode::Down => selected += 1,
                    KeyCode::Char(c) => {
                        query.insert(c);
                        selected = 0;
                    }
                    KeyCode::Backspace => {
                        query.backspace();
                        selected = 0;
                    }
                    _ => {}
                }
                let found = self.store.search_entries(query.text()).len();
                selected = selected.min(found.saturating_sub(1));
                Some(Modal::Search { query, selected })
            }
            Modal::Record { mut path } => match key.code {
                KeyCode::Enter if !path.text().trim().is_empty() => {
                    self.transcribe(PathBuf::from(path.text().trim()));
                    None
                }
                code => {
                    edit_line(&mut path, code);
                    Some(Modal::Record { path })
                }
            },
            Modal::Calibrate { mut path } => match key.code {
                KeyCode::Enter if !path.text().trim().is_empty() => {
                    self.calibrate(PathBuf::from(path.text().trim()));
                    None
                }
                code => {
                    edit_line(&mut path, code);
                    Some(Modal::Calibrate { path })
                }
            },
            Modal::Login {
                mut username,
                mut password,
                mut on_password,
            } => {
                let field = if on_password { &mut password } else { &mut username };
                match key.code {
                    KeyCode::Tab => on_password = !on_password,
                    KeyCode::Enter if on_password => {
                        self.login(username.text().to_string(), password.text().to_string());
                        return;
                    }
                    KeyCode::Enter => on_password = true,
                    KeyCode::Char(c) => field.insert(c),
                    KeyCode::Backspace => {
                        field.backspace();
                    }
                    _ => {}
                }
                Some(Modal::Login {
                    username,
                    password,
                    on_password,
                })
            }
        };
    }

    fn transcribe(&mut self, path: PathBuf) {
        self.status = Some("Transcribing...".to_string());
        let transcriber = Arc::clone(&self.services.transcriber);
        self.spawn_task(async move { TaskEvent::Transcribed(transcriber.transcribe_file(&path).await) });
    }

    fn check_voice(&mut self) {
        let calibrator = Arc::clone(&self.services.calibrator);
        self.spawn_task(async move { TaskEvent::VoiceChecked(calibrator.needs_calibration().await) });
    }

    fn calibrate(&mut self, path: PathBuf) {
        self.status = Some("Uploading voice sample...".to_string());
        let calibrator = Arc::clone(&self.services.calibrator);
        self.spawn_task(async move { TaskEvent::Calibrated(calibrator.calibrate_file(&path).await) });
    }

    fn login(&mut self, username: String, password: String) {
        self.status = Some("Logging in...".to_string());
        let client = self.services.client.clone();
        self.spawn_task(async move { TaskEvent::LoggedIn(client.login(&username, &password).await) });
    }
}

fn edit_line(input: &mut TextInput, code: KeyCode) {
    match code {
        KeyCode::Char(c) => input.insert(c),
        KeyCode::Backspace => {
            input.backspace();
        }
        KeyCode::Delete => {
            input.delete();
        }
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::entry_store::StoreTimings;
    use crate::playback::{PlaybackSettings, PlaybackState};
    use crate::test_support::{
        BackendProbe, FakeJournalApi, FakeTranscriptionApi, FakeVoiceProfileApi, ScriptedBackend,
    };
    use crate::voice_events::VoiceEvents;

    fn app_with(api: Arc<FakeJournalApi>) -> (App, BackendProbe) {
        let bus = VoiceEvents::new();
        let store = EntryStore::new(api, StoreTimings::default(), bus.clone());
        let (backend, probe) = ScriptedBackend::new();
        let player = Player::new(
            Box::new(backend),
            PlaybackSettings {
                resume_verify: Duration::from_millis(500),
                max_restarts: 3,
            },
        );
        let services = Services {
            client: ApiClient::new(&ApiConfig::default()).unwrap(),
            transcriber: Arc::new(Transcriber::new(
                Arc::new(FakeTranscriptionApi::returning("spoken words")),
                bus,
            )),
            calibrator: Arc::new(VoiceCalibrator::new(Arc::new(
                FakeVoiceProfileApi::with_voice(None).cloning("voice-7"),
            ))),
            community: CommunityConfig::default(),
        };
        (App::new(store, player, services), probe)
    }

    async fn loaded(api: Arc<FakeJournalApi>) -> (App, BackendProbe) {
        let (mut app, probe) = app_with(api);
        app.store.load();
        step_store(&mut app).await;
        (app, probe)
    }

    async fn step_store(app: &mut App) {
        let event = app.store.next_event().await;
        app.on_store_event(event);
    }

    fn two_entries() -> Arc<FakeJournalApi> {
        Arc::new(FakeJournalApi::with_records(vec![
            FakeJournalApi::record("a", "Alpha", "gamma rays", "2024-04-01T09:00:00Z", None),
            FakeJournalApi::record("b", "Beta", "beta blues", "2024-04-09T09:00:00Z", None),
        ]))
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    async fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.on_key(press(KeyCode::Char(c))).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn inputs_follow_the_loaded_current_entry() {
        let (app, _) = loaded(two_entries()).await;
        assert_eq!(app.title.text(), "Beta");
        assert_eq!(app.content.text(), "beta blues");
    }

    #[tokio::test(start_paused = true)]
    async fn typing_edits_the_current_entry() {
        let (mut app, _) = loaded(two_entries()).await;

        app.on_key(press(KeyCode::Tab)).await;
        app.on_key(press(KeyCode::Tab)).await;
        assert_eq!(app.focus, Focus::Content);
        type_text(&mut app, " quietly").await;

        assert_eq!(app.store.current().unwrap().content, "beta blues quietly");
        assert!(!app.store.is_saved());
        assert!(!app.should_quit(), "q while editing is text");
    }

    #[tokio::test(start_paused = true)]
    async fn list_navigation_selects_entries() {
        let (mut app, _) = loaded(two_entries()).await;

        app.on_key(press(KeyCode::Down)).await;
        app.on_key(press(KeyCode::Enter)).await;

        assert_eq!(app.store.current().unwrap().id, EntryId::committed("a"));
        assert_eq!(app.content.text(), "gamma rays");
        assert_eq!(app.focus, Focus::Content);
    }

    #[tokio::test(start_paused = true)]
    async fn mood_picker_sets_the_rating() {
        let (mut app, _) = loaded(two_entries()).await;

        app.on_key(press(KeyCode::Char('m'))).await;
        assert_eq!(app.modal, Some(Modal::Mood { selected: 3 }));
        app.on_key(press(KeyCode::Right)).await;
        app.on_key(press(KeyCode::Enter)).await;

        assert!(app.modal.is_none());
        assert_eq!(app.store.current().unwrap().mood.as_ref().unwrap().value, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_asks_first() {
        let (mut app, _) = loaded(two_entries()).await;

        app.on_key(press(KeyCode::Char('d'))).await;
        app.on_key(press(KeyCode::Char('n'))).await;
        assert_eq!(app.store.get_entries().len(), 2);

        app.on_key(press(KeyCode::Char('d'))).await;
        app.on_key(press(KeyCode::Char('y'))).await;
        assert_eq!(app.store.get_entries().len(), 1);
        assert_eq!(app.title.text(), "Alpha");
    }

    #[tokio::test(start_paused = true)]
    async fn search_jumps_to_a_match() {
        let (mut app, _) = loaded(two_entries()).await;

        app.on_key(press(KeyCode::Char('/'))).await;
        type_text(&mut app, "GAMMA").await;
        assert_eq!(app.search_results().len(), 1);
        app.on_key(press(KeyCode::Enter)).await;

        assert!(app.modal.is_none());
        assert_eq!(app.store.current().unwrap().id, EntryId::committed("a"));
        assert_eq!(app.highlighted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn playback_waits_for_readiness() {
        let (mut app, probe) = loaded(two_entries()).await;

        app.on_key(press(KeyCode::Char('p'))).await;
        assert_eq!(app.player.state(), PlaybackState::Idle);
        assert!(app.status.is_some());

        step_store(&mut app).await; // readiness delay
        app.on_key(press(KeyCode::Char('p'))).await;

        assert!(app.player.is_loading());
        assert_eq!(probe.spoken(), vec!["beta blues".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn losing_focus_pauses_playback() {
        let (mut app, probe) = loaded(two_entries()).await;
        probe.set_pausable(true);
        step_store(&mut app).await;
        app.on_key(press(KeyCode::Char('p'))).await;
        probe.start();
        app.player.step().await;

        app.on_terminal_event(Event::FocusLost).await;

        assert!(matches!(app.player.state(), PlaybackState::Paused(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn new_entry_starts_on_the_title() {
        let (mut app, _) = loaded(two_entries()).await;

        app.on_key(press(KeyCode::Char('n'))).await;

        assert_eq!(app.focus, Focus::Title);
        assert_eq!(app.title.text(), "New Entry");
        assert!(app.content.text().is_empty());
        assert_eq!(app.store.get_entries().len(), 3);
        assert_eq!(app.store.get_entries()[app.highlighted].id, app.store.current().unwrap().id);
    }

    #[tokio::test(start_paused = true)]
    async fn quitting() {
        let (mut app, _) = loaded(two_entries()).await;
        app.on_key(press(KeyCode::Tab)).await;
        app.on_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)).await;
        assert!(app.should_quit());

        let (mut app, _) = loaded(two_entries()).await;
        app.on_key(press(KeyCode::Char('q'))).await;
        assert!(app.should_quit());
    }

    #[tokio::test(start_paused = true)]
    async fn recorded_file_becomes_a_voice_note() {
        let (mut app, _) = loaded(two_entries()).await;
        let clip = tempfile::Builder::new().suffix(".webm").tempfile().unwrap();
        std::fs::write(clip.path(), b"audio").unwrap();

        app.on_key(press(KeyCode::Char('r'))).await;
        type_text(&mut app, &clip.path().display().to_string()).await;
        app.on_key(press(KeyCode::Enter)).await;

        let done = app.tasks_rx.recv().await.unwrap();
        app.on_task(done);
        assert_eq!(app.status.as_deref(), Some("Voice note added"));

        for _ in 0..3 {
            step_store(&mut app).await;
            if app.title.text() == "Voice Note" {
                break;
            }
        }
        assert_eq!(app.title.text(), "Voice Note");
        assert_eq!(app.content.text(), "spoken words");
    }

    async fn playing(app: &mut App, probe: &BackendProbe) {
        step_store(app).await; // readiness delay
        app.on_key(press(KeyCode::Char('p'))).await;
        probe.start();
        app.player.step().await;
        assert_eq!(app.player.state(), PlaybackState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn opening_another_entry_stops_narration() {
        let (mut app, probe) = loaded(two_entries()).await;
        playing(&mut app, &probe).await;

        app.on_key(press(KeyCode::Down)).await;
        assert_eq!(app.player.state(), PlaybackState::Playing, "moving the highlight is not a switch");
        app.on_key(press(KeyCode::Enter)).await;

        assert_eq!(app.player.state(), PlaybackState::Idle);
        assert_eq!(app.player.elapsed_secs(), 0);
        assert!(probe.cancels() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_entry_and_delete_stop_narration() {
        let (mut app, probe) = loaded(two_entries()).await;
        playing(&mut app, &probe).await;
        app.on_key(press(KeyCode::Char('n'))).await;
        assert_eq!(app.player.state(), PlaybackState::Idle);

        let (mut app, probe) = loaded(two_entries()).await;
        playing(&mut app, &probe).await;
        app.on_key(press(KeyCode::Char('d'))).await;
        app.on_key(press(KeyCode::Char('y'))).await;
        assert_eq!(app.player.state(), PlaybackState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn search_selection_stops_narration() {
        let (mut app, probe) = loaded(two_entries()).await;
        playing(&mut app, &probe).await;

        app.on_key(press(KeyCode::Char('/'))).await;
        type_text(&mut app, "gamma").await;
        app.on_key(press(KeyCode::Enter)).await;

        assert_eq!(app.store.current().unwrap().id, EntryId::committed("a"));
        assert_eq!(app.player.state(), PlaybackState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn editing_while_playing_keeps_playing() {
        let (mut app, probe) = loaded(two_entries()).await;
        playing(&mut app, &probe).await;
        let cancels = probe.cancels();

        app.on_key(press(KeyCode::Tab)).await;
        app.on_key(press(KeyCode::Tab)).await;
        type_text(&mut app, " tonight").await;

        assert_eq!(app.store.current().unwrap().content, "beta blues tonight");
        assert!(!app.store.is_saved());
        assert!(!app.store.is_playback_ready());
        assert_eq!(app.player.state(), PlaybackState::Playing);
        assert_eq!(probe.cancels(), cancels);

        app.on_key(KeyEvent::new(KeyCode::Char('p'), KeyModifiers::CONTROL)).await;
        assert_eq!(app.player.state(), PlaybackState::Idle, "stopping ignores the gate");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_saves_edits_inside_the_debounce_window() {
        let api = two_entries();
        let (mut app, _) = loaded(api.clone()).await;

        app.on_key(press(KeyCode::Tab)).await;
        app.on_key(press(KeyCode::Tab)).await;
        type_text(&mut app, " again").await;
        app.shutdown().await;

        assert!(app.store.is_saved());
        assert_eq!(api.note_of("b").as_deref(), Some("beta blues again"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_voice_prompts_for_a_sample() {
        let (mut app, _) = loaded(two_entries()).await;

        app.check_voice();
        let checked = app.tasks_rx.recv().await.unwrap();
        app.on_task(checked);
        assert!(matches!(app.modal, Some(Modal::Calibrate { .. })));

        let sample = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        std::fs::write(sample.path(), b"hello").unwrap();
        type_text(&mut app, &sample.path().display().to_string()).await;
        app.on_key(press(KeyCode::Enter)).await;
        assert!(app.modal.is_none());

        let done = app.tasks_rx.recv().await.unwrap();
        app.on_task(done);
        assert_eq!(app.status.as_deref(), Some("Voice calibrated (voice-7)"));
    }

    #[tokio::test(start_paused = true)]
    async fn calibrated_voice_leaves_the_journal_alone() {
        let (mut app, _) = loaded(two_entries()).await;

        app.on_task(TaskEvent::VoiceChecked(Ok(false)));
        assert!(app.modal.is_none());

        app.on_key(press(KeyCode::Char('v'))).await;
        assert!(matches!(app.modal, Some(Modal::Calibrate { .. })));
        app.on_key(press(KeyCode::Esc)).await;
        assert!(app.modal.is_none());
    }
}

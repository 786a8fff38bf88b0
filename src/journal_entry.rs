use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::api::RemoteEntry;

pub const DEFAULT_TITLE: &str = "New Entry";
pub const VOICE_NOTE_TITLE: &str = "Voice Note";
pub const NEUTRAL_MOOD: u8 = 3;
pub const MOOD_LABELS: [&str; 5] = ["Very Bad", "Bad", "Okay", "Good", "Very Good"];

const PREVIEW_CHARS: usize = 100;
const EMPTY_PREVIEW: &str = "Empty entry";

static LAST_LOCAL_ID: AtomicI64 = AtomicI64::new(0);

/// Identity of an entry across its two commit phases.
///
/// A `Pending` id is generated locally from the clock and lives only until the
/// backend answers the create call; it is then replaced, never merged, by the
/// `Committed` id the server issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryId {
    Pending(String),
    Committed(String),
}

impl EntryId {
    /// Timestamp-based local id, strictly increasing within the process.
    pub fn local() -> Self {
        let now = Local::now().timestamp_millis();
        let mut last = LAST_LOCAL_ID.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match LAST_LOCAL_ID.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return EntryId::Pending(next.to_string()),
                Err(actual) => last = actual,
            }
        }
    }

    pub fn committed(id: impl Into<String>) -> Self {
        EntryId::Committed(id.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            EntryId::Pending(id) | EntryId::Committed(id) => id,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, EntryId::Pending(_))
    }

    pub fn server_id(&self) -> Option<&str> {
        match self {
            EntryId::Committed(id) => Some(id),
            EntryId::Pending(_) => None,
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodRating {
    pub date: DateTime<Local>,
    pub value: u8,
    pub label: String,
}

impl MoodRating {
    pub fn new(value: u8) -> Self {
        MoodRating::at(value, Local::now())
    }

    /// Values outside 1..=5 are clamped onto the scale.
    pub fn at(value: u8, date: DateTime<Local>) -> Self {
        let value = value.clamp(1, 5);
        MoodRating {
            date,
            value,
            label: MOOD_LABELS[usize::from(value - 1)].to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: EntryId,
    pub title: String,
    pub content: String,
    pub date: DateTime<Local>,
    pub mood: Option<MoodRating>,
}

impl JournalEntry {
    pub fn new(title: Option<String>, content: String, mood: Option<MoodRating>) -> Self {
        JournalEntry {
            id: EntryId::local(),
            title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            content,
            date: Local::now(),
            mood,
        }
    }

    /// Derived from `content` on every call; there is no stored preview to drift.
    pub fn preview(&self) -> String {
        if self.content.is_empty() {
            return EMPTY_PREVIEW.to_string();
        }
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }

    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.title.to_lowercase().contains(&query) || self.content.to_lowercase().contains(&query)
    }
}

impl From<RemoteEntry> for JournalEntry {
    fn from(remote: RemoteEntry) -> Self {
        let date = remote
            .created_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Local))
            .unwrap_or_else(Local::now);
        let mood = remote
            .feeling_rating
            .filter(|rating| *rating >= 1.0)
            .map(|rating| MoodRating::at(rating.round().min(5.0) as u8, date));

        JournalEntry {
            id: EntryId::committed(remote.entry_id),
            title: remote.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            content: remote.note.unwrap_or_default(),
            date,
            mood,
        }
    }
}

//! Statistics over the entry list for the insights screen.
//!
//! Everything here is a pure function of the entries and the current day, so
//! the screen can recompute it whenever the list changes.

use chrono::{Datelike, Days, NaiveDate};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::journal_entry::JournalEntry;

pub const ACTIVITY_DAYS: u64 = 22;
pub const MOOD_TREND_DAYS: u64 = 14;
pub const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

const MAX_THEMES: usize = 10;
const MIN_THEME_WORD_LEN: usize = 4;
const MIN_THEME_COUNT: usize = 3;

const STOP_WORDS: &[&str] = &[
    "the", "and", "a", "to", "of", "in", "is", "it", "that", "for", "you", "with", "on", "at",
    "this", "my", "was", "but", "not", "be", "are", "have", "had", "from", "they", "were",
    "their", "she", "he", "about", "been", "has", "would", "could", "should", "will", "can",
    "do", "did", "done", "am", "i", "me", "we", "us",
];

#[derive(Debug, Clone, PartialEq)]
pub struct DayValue {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Consistency {
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Distinct days with at least one entry.
    pub writing_days: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub word: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insights {
    pub writing_activity: Vec<DayValue>,
    pub mood_trend: Vec<DayValue>,
    pub consistency: Consistency,
    pub weekly_activity: [usize; 7],
    pub most_active_day: Option<&'static str>,
    pub themes: Vec<Theme>,
}

impl Insights {
    pub fn compute(entries: &[JournalEntry], today: NaiveDate) -> Self {
        let weekly_activity = weekly_activity(entries);
        Insights {
            writing_activity: writing_activity(entries, today),
            mood_trend: mood_trend(entries, today),
            consistency: consistency(entries, today),
            most_active_day: most_active_day(&weekly_activity),
            weekly_activity,
            themes: recurring_themes(entries),
        }
    }
}

pub fn day_label(day: NaiveDate) -> String {
    day.format("%b %-d").to_string()
}

fn days_back(today: NaiveDate, count: u64) -> impl Iterator<Item = NaiveDate> {
    (0..count)
        .rev()
        .filter_map(move |back| today.checked_sub_days(Days::new(back)))
}

/// Words written per day over the last [`ACTIVITY_DAYS`] days, oldest first.
pub fn writing_activity(entries: &[JournalEntry], today: NaiveDate) -> Vec<DayValue> {
    let mut words: HashMap<NaiveDate, usize> = HashMap::new();
    for entry in entries {
        *words.entry(entry.date.date_naive()).or_default() += entry.content.split_whitespace().count();
    }
    days_back(today, ACTIVITY_DAYS)
        .map(|day| DayValue {
            label: day_label(day),
            value: words.get(&day).copied().unwrap_or(0) as f64,
        })
        .collect()
}

/// Average mood per day over the last [`MOOD_TREND_DAYS`] days; days without a rating are skipped.
pub fn mood_trend(entries: &[JournalEntry], today: NaiveDate) -> Vec<DayValue> {
    let mut moods: HashMap<NaiveDate, Vec<u8>> = HashMap::new();
    for mood in entries.iter().filter_map(|entry| entry.mood.as_ref()) {
        moods.entry(mood.date.date_naive()).or_default().push(mood.value);
    }
    days_back(today, MOOD_TREND_DAYS)
        .filter_map(|day| {
            let values = moods.get(&day)?;
            let total: u32 = values.iter().map(|v| u32::from(*v)).sum();
            Some(DayValue {
                label: day_label(day),
                value: f64::from(total) / values.len() as f64,
            })
        })
        .collect()
}

/// Today counts toward the current streak when written; otherwise the streak
/// may still run through yesterday.
pub fn consistency(entries: &[JournalEntry], today: NaiveDate) -> Consistency {
    let days: BTreeSet<NaiveDate> = entries.iter().map(|entry| entry.date.date_naive()).collect();

    let mut current_streak = 0;
    let mut cursor = if days.contains(&today) {
        Some(today)
    } else {
        today.pred_opt()
    };
    while let Some(day) = cursor.filter(|day| days.contains(day)) {
        current_streak += 1;
        cursor = day.pred_opt();
    }

    let mut longest_streak = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;
    for day in &days {
        run = match previous {
            Some(prev) if prev.succ_opt() == Some(*day) => run + 1,
            _ => 1,
        };
        longest_streak = longest_streak.max(run);
        previous = Some(*day);
    }

    Consistency {
        current_streak,
        longest_streak,
        writing_days: days.len(),
    }
}

/// Entry counts indexed Sunday first.
pub fn weekly_activity(entries: &[JournalEntry]) -> [usize; 7] {
    let mut counts = [0; 7];
    for entry in entries {
        counts[entry.date.weekday().num_days_from_sunday() as usize] += 1;
    }
    counts
}

/// The earliest day of the week among those with the most entries.
pub fn most_active_day(weekly: &[usize; 7]) -> Option<&'static str> {
    let (index, count) = weekly
        .iter()
        .enumerate()
        .fold((0, 0), |best, (index, count)| {
            if *count > best.1 {
                (index, *count)
            } else {
                best
            }
        });
    (count > 0).then_some(WEEKDAYS[index])
}

pub fn recurring_themes(entries: &[JournalEntry]) -> Vec<Theme> {
    let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        let cleaned: String = entry
            .content
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || c.is_whitespace())
            .collect();
        for word in cleaned.split_whitespace() {
            if word.chars().count() < MIN_THEME_WORD_LEN || stop_words.contains(word) {
                continue;
            }
            let count = counts.entry(word.to_string()).or_insert_with(|| {
                order.push(word.to_string());
                0
            });
            *count += 1;
        }
    }

    let mut themes: Vec<Theme> = order
        .into_iter()
        .filter_map(|word| {
            let count = counts[&word];
            (count >= MIN_THEME_COUNT).then_some(Theme { word, count })
        })
        .collect();
    themes.sort_by(|a, b| b.count.cmp(&a.count));
    themes.truncate(MAX_THEMES);
    themes
}

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::api::{ApiError, CommunityApi, SharedEntry};
use crate::config::CommunityConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct Story {
    pub id: String,
    pub title: String,
    pub content: String,
    pub time_ago: String,
}

impl Story {
    pub fn from_shared(entry: SharedEntry, now: DateTime<Local>) -> Self {
        Story {
            time_ago: time_ago(entry.created_at.as_deref(), now),
            id: entry.id,
            title: entry.title.unwrap_or_default(),
            content: entry.content,
        }
    }
}

/// Relative age of an RFC 3339 timestamp, counted in whole days.
pub fn time_ago(created_at: Option<&str>, now: DateTime<Local>) -> String {
    let Some(created) = created_at.and_then(|raw| DateTime::parse_from_rfc3339(raw).ok()) else {
        return "Recently".to_string();
    };
    let days = (now.signed_duration_since(created)).num_days().max(0);
    match days {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2..=6 => format!("{days} days ago"),
        7..=29 => format!("{} weeks ago", days / 7),
        _ => format!("{} months ago", days / 30),
    }
}

/// Shared stories, browsed one at a time.
#[derive(Debug, Default)]
pub struct CommunityFeed {
    stories: Vec<Story>,
    index: usize,
}

impl CommunityFeed {
    pub async fn fetch(
        api: &dyn CommunityApi,
        config: &CommunityConfig,
        now: DateTime<Local>,
    ) -> Result<Self, ApiError> {
        let shared = api.shared_entries(config.category.as_deref()).await?;
        let stories: Vec<Story> = shared
            .into_iter()
            .take(config.limit)
            .map(|entry| Story::from_shared(entry, now))
            .collect();
        if stories.is_empty() {
            warn!(category = ?config.category, "no shared stories");
        } else {
            info!(count = stories.len(), "community stories loaded");
        }
        Ok(CommunityFeed { stories, index: 0 })
    }

    pub fn stories(&self) -> &[Story] {
        &self.stories
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&Story> {
        self.stories.get(self.index)
    }

    pub fn next(&mut self) {
        if self.index + 1 < self.stories.len() {
            self.index += 1;
        }
    }

    pub fn previous(&mut self) {
        self.index = self.index.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeCommunityApi;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 4, 20, 12, 0, 0).single().unwrap()
    }

    fn days_before(days: i64) -> String {
        (now() - chrono::Duration::days(days)).to_rfc3339()
    }

    #[test]
    fn relative_labels() {
        let now = now();
        assert_eq!(time_ago(Some(&days_before(0)), now), "Today");
        assert_eq!(time_ago(Some(&days_before(1)), now), "Yesterday");
        assert_eq!(time_ago(Some(&days_before(3)), now), "3 days ago");
        assert_eq!(time_ago(Some(&days_before(7)), now), "1 weeks ago");
        assert_eq!(time_ago(Some(&days_before(20)), now), "2 weeks ago");
        assert_eq!(time_ago(Some(&days_before(45)), now), "1 months ago");
        assert_eq!(time_ago(Some(&days_before(-2)), now), "Today");
        assert_eq!(time_ago(Some("yesterday-ish"), now), "Recently");
        assert_eq!(time_ago(None, now), "Recently");
    }

    #[tokio::test]
    async fn feed_is_limited_and_filtered_by_category() {
        let api = FakeCommunityApi::with_entries(
            (0..8)
                .map(|n| FakeCommunityApi::shared(&n.to_string(), &format!("story {n}"), "Control", None))
                .chain([FakeCommunityApi::shared("x", "elsewhere", "Grief", None)])
                .collect(),
        );
        let config = CommunityConfig::default();

        let feed = CommunityFeed::fetch(&api, &config, now()).await.unwrap();

        assert_eq!(feed.stories().len(), 5);
        assert!(feed.stories().iter().all(|s| s.content.starts_with("story")));
        assert_eq!(api.categories(), vec![Some("Control".to_string())]);
    }

    #[tokio::test]
    async fn browsing_stays_in_bounds() {
        let api = FakeCommunityApi::with_entries(vec![
            FakeCommunityApi::shared("a", "first", "Control", Some(&days_before(1))),
            FakeCommunityApi::shared("b", "second", "Control", None),
        ]);
        let mut feed = CommunityFeed::fetch(&api, &CommunityConfig::default(), now())
            .await
            .unwrap();

        assert_eq!(feed.current().unwrap().time_ago, "Yesterday");
        feed.previous();
        assert_eq!(feed.index(), 0);
        feed.next();
        feed.next();
        assert_eq!(feed.current().unwrap().content, "second");
    }

    #[tokio::test]
    async fn fetch_errors_propagate() {
        let api = FakeCommunityApi::failing();
        let result = CommunityFeed::fetch(&api, &CommunityConfig::default(), now()).await;
        assert!(result.is_err());
    }
}

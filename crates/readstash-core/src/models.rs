//! Data models for readstash
//!
//! Defines the core data structures: Bookmark, its article content, the
//! list projection, and aggregate counts. Bookmark identifiers are assigned
//! by the remote source; the store never generates one locally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content type of a bookmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkType {
    Article,
    Picture,
    Video,
}

impl BookmarkType {
    /// Text value used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookmarkType::Article => "article",
            BookmarkType::Picture => "picture",
            BookmarkType::Video => "video",
        }
    }
}

/// Error returned when parsing an unknown bookmark type value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown bookmark type '{0}'")]
pub struct ParseBookmarkTypeError(String);

impl std::str::FromStr for BookmarkType {
    type Err = ParseBookmarkTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "article" => Ok(BookmarkType::Article),
            "picture" => Ok(BookmarkType::Picture),
            "video" => Ok(BookmarkType::Video),
            other => Err(ParseBookmarkTypeError(other.to_string())),
        }
    }
}

/// Content-extraction lifecycle stage of a bookmark, as reported by the
/// remote source. Aggregate counts only ever consider `Loaded` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkState {
    Loaded,
    Loading,
    Error,
}

impl BookmarkState {
    /// Numeric value used in the database. `Loaded` must stay 0.
    pub fn as_i64(&self) -> i64 {
        match self {
            BookmarkState::Loaded => 0,
            BookmarkState::Loading => 1,
            BookmarkState::Error => 2,
        }
    }

    /// Decode the database value.
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(BookmarkState::Loaded),
            1 => Some(BookmarkState::Loading),
            2 => Some(BookmarkState::Error),
            _ => None,
        }
    }
}

/// A bookmark mirrored from the remote collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bookmark {
    /// Remote-assigned unique identifier
    pub id: String,
    /// The bookmarked URL
    pub url: String,
    /// Display title
    pub title: String,
    /// Name of the originating site
    pub site_name: String,
    /// Content type
    #[serde(rename = "type")]
    pub kind: BookmarkType,
    /// Content-extraction state
    pub state: BookmarkState,
    /// Favorite flag
    pub is_marked: bool,
    /// Archived flag
    pub is_archived: bool,
    /// Reading progress, 0-100; 100 means fully read
    pub read_progress: u8,
    /// Whether the remote source promises an article body exists
    pub has_article: bool,
    /// Labels, ordered and duplicate-free
    pub labels: Vec<String>,
    /// Content language
    pub lang: Option<String>,
    /// Word count of the extracted article
    pub word_count: Option<i64>,
    /// Estimated reading time in minutes
    pub reading_time: Option<i64>,
    /// Author(s) of the content
    pub authors: Vec<String>,
    /// Site-provided description
    pub description: Option<String>,
    /// Favicon URL
    pub icon_src: Option<String>,
    /// Main image URL
    pub image_src: Option<String>,
    /// Thumbnail URL
    pub thumbnail_src: Option<String>,
    /// When this bookmark was created; drives default ordering
    pub created: DateTime<Utc>,
    /// When this bookmark last changed
    pub updated: DateTime<Utc>,
}

impl Bookmark {
    /// Create a bookmark with the given remote id and URL
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let now = Utc::now();
        Self {
            id: id.into(),
            title: url.clone(),
            url,
            site_name: String::new(),
            kind: BookmarkType::Article,
            state: BookmarkState::Loaded,
            is_marked: false,
            is_archived: false,
            read_progress: 0,
            has_article: false,
            labels: Vec::new(),
            lang: None,
            word_count: None,
            reading_time: None,
            authors: Vec::new(),
            description: None,
            icon_src: None,
            image_src: None,
            thumbnail_src: None,
            created: now,
            updated: now,
        }
    }

    /// Update the title
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.updated = Utc::now();
    }

    /// Add a label, keeping the set duplicate-free
    pub fn add_label(&mut self, label: impl Into<String>) {
        let label = label.into();
        if !self.labels.contains(&label) {
            self.labels.push(label);
            self.updated = Utc::now();
        }
    }

    /// Remove a label
    pub fn remove_label(&mut self, label: &str) {
        if let Some(pos) = self.labels.iter().position(|l| l == label) {
            self.labels.remove(pos);
            self.updated = Utc::now();
        }
    }

    /// Set all labels (replacing existing)
    pub fn set_labels(&mut self, labels: Vec<String>) {
        self.labels = labels;
        self.updated = Utc::now();
    }

    /// Set reading progress, clamped to 0-100
    pub fn set_read_progress(&mut self, progress: u8) {
        self.read_progress = progress.min(100);
        self.updated = Utc::now();
    }
}

/// A bookmark paired with its optional extracted article body, as handed
/// over by the sync layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookmarkWithContent {
    pub bookmark: Bookmark,
    pub article_content: Option<String>,
}

/// Read-only projection of a bookmark used for list rendering.
/// Always derived live from the bookmark row; it has no lifecycle of its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookmarkListItem {
    pub id: String,
    pub url: String,
    pub title: String,
    pub site_name: String,
    pub is_marked: bool,
    pub is_archived: bool,
    pub read_progress: u8,
    pub labels: Vec<String>,
    pub icon_src: Option<String>,
    pub image_src: Option<String>,
    pub thumbnail_src: Option<String>,
    #[serde(rename = "type")]
    pub kind: BookmarkType,
}

/// Aggregate bookmark counts, restricted to `Loaded` rows.
/// Recomputed from the store, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkCounts {
    pub unread: i64,
    pub archived: i64,
    pub favorite: i64,
    pub article: i64,
    pub video: i64,
    pub picture: i64,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookmark_new() {
        let bookmark = Bookmark::new("bk-1", "https://example.com");
        assert_eq!(bookmark.id, "bk-1");
        assert_eq!(bookmark.url, "https://example.com");
        assert_eq!(bookmark.title, "https://example.com");
        assert_eq!(bookmark.kind, BookmarkType::Article);
        assert_eq!(bookmark.state, BookmarkState::Loaded);
        assert_eq!(bookmark.read_progress, 0);
        assert!(bookmark.labels.is_empty());
        assert!(bookmark.authors.is_empty());
    }

    #[test]
    fn test_bookmark_set_title() {
        let mut bookmark = Bookmark::new("bk-1", "https://example.com");
        let original_updated = bookmark.updated;
        std::thread::sleep(std::time::Duration::from_millis(10));
        bookmark.set_title("Example Site");
        assert_eq!(bookmark.title, "Example Site");
        assert!(bookmark.updated > original_updated);
    }

    #[test]
    fn test_bookmark_labels() {
        let mut bookmark = Bookmark::new("bk-1", "https://example.com");
        bookmark.add_label("rust");
        bookmark.add_label("news");
        assert_eq!(bookmark.labels, vec!["rust", "news"]);

        // Adding duplicate should not add again
        bookmark.add_label("rust");
        assert_eq!(bookmark.labels.len(), 2);

        bookmark.remove_label("rust");
        assert_eq!(bookmark.labels, vec!["news"]);

        bookmark.set_labels(vec!["ai".to_string()]);
        assert_eq!(bookmark.labels, vec!["ai"]);
    }

    #[test]
    fn test_read_progress_clamped() {
        let mut bookmark = Bookmark::new("bk-1", "https://example.com");
        bookmark.set_read_progress(250);
        assert_eq!(bookmark.read_progress, 100);
        bookmark.set_read_progress(42);
        assert_eq!(bookmark.read_progress, 42);
    }

    #[test]
    fn test_type_str_roundtrip() {
        for kind in [
            BookmarkType::Article,
            BookmarkType::Picture,
            BookmarkType::Video,
        ] {
            assert_eq!(kind.as_str().parse::<BookmarkType>().unwrap(), kind);
        }
        assert!("photo".parse::<BookmarkType>().is_err());
    }

    #[test]
    fn test_state_encoding() {
        // Loaded must encode to 0: aggregate counts filter on state = 0
        assert_eq!(BookmarkState::Loaded.as_i64(), 0);
        for state in [
            BookmarkState::Loaded,
            BookmarkState::Loading,
            BookmarkState::Error,
        ] {
            assert_eq!(BookmarkState::from_i64(state.as_i64()), Some(state));
        }
        assert_eq!(BookmarkState::from_i64(7), None);
    }

    #[test]
    fn test_bookmark_serialization() {
        let mut bookmark = Bookmark::new("bk-1", "https://example.com");
        bookmark.add_label("rust");
        let json = serde_json::to_string(&bookmark).unwrap();
        let deserialized: Bookmark = serde_json::from_str(&json).unwrap();
        assert_eq!(bookmark, deserialized);
    }

    #[test]
    fn test_counts_default() {
        let counts = BookmarkCounts::default();
        assert_eq!(counts.total, 0);
        assert_eq!(counts.unread, 0);
    }
}

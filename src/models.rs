//! Data models for the movie catalog, feed sources, and scraped articles.
//!
//! This module defines the core data structures used throughout the application:
//! - [`MovieRecord`]: One known film in the persisted catalog
//! - [`SourceRef`]: A news article cited by a catalog record
//! - [`FeedSource`]: A polled alert feed and its update watermark
//! - [`CandidateMention`]: A film mention extracted by the LLM from one article
//! - [`NewsArticle`], [`Feed`], [`FeedItem`]: Raw scraped inputs
//!
//! Persisted types use camelCase field names so the JSON documents stay
//! readable by the static site templates and by hand-curation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A film tracked in the catalog.
///
/// Records are created the first time a slug is seen and updated by every
/// later mention coming from a strictly newer source. They are never deleted.
///
/// # JSON Schema
///
/// ```json
/// {
///   "slug": "ken-il-guerriero-il-film",
///   "title": "Ken il guerriero – Il film",
///   "aliases": ["ken-il-guerriero"],
///   "theaterReleaseDate": "2024-10-14",
///   "theaterEndDate": "2024-10-16",
///   "lastSourceDate": "2024-09-30T08:12:00Z",
///   "sources": [ ... ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieRecord {
    /// Unique catalog key derived from the title.
    pub slug: String,
    /// Display title, fixed when the record is created.
    pub title: String,
    /// Alternate slugs that resolve to this record.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub aliases: BTreeSet<String>,
    /// First day of the theatrical window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theater_release_date: Option<NaiveDate>,
    /// Last day of the theatrical window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theater_end_date: Option<NaiveDate>,
    /// Publication time of the newest source that updated this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_source_date: Option<DateTime<Utc>>,
    /// Articles citing this film, unique by URL.
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    /// TMDB movie id, when a poster lookup matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<u64>,
    /// Site-relative path of the downloaded poster image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_path: Option<String>,
}

impl MovieRecord {
    /// Returns `true` if `url` is already cited by this record.
    pub fn has_source(&self, url: &str) -> bool {
        self.sources.iter().any(|s| s.url == url)
    }
}

/// A news article cited as the source of a catalog update.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    /// Canonical article URL.
    pub url: String,
    /// Headline as reported by the feed.
    pub title: String,
    /// Snippet as reported by the feed.
    pub description: String,
    /// When the article was published.
    pub published_date: DateTime<Utc>,
}

/// A polled alert feed.
///
/// `last_update_date` only lets the walker skip feeds that have not changed
/// since the previous run; reprocessing a feed is always safe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSource {
    /// Human-readable name used in logs.
    pub name: String,
    /// Feed URL.
    pub url: String,
    /// Feed-level update time seen on the last successful poll.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_date: Option<DateTime<Utc>>,
}

/// A film mention extracted from one article, after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMention {
    pub title: String,
    pub theater_release_date: Option<NaiveDate>,
    pub theater_end_date: Option<NaiveDate>,
}

/// A raw article as returned by the text extractor.
#[derive(Debug)]
pub struct NewsArticle {
    /// The URL the article was fetched from.
    pub source: String,
    /// The HTML of the article body.
    pub content: String,
    /// Publication time found in the page metadata.
    pub published: Option<DateTime<Utc>>,
}

/// A parsed alert feed.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    /// Feed-level last update time.
    pub updated: Option<DateTime<Utc>>,
    pub items: Vec<FeedItem>,
}

/// One entry of an alert feed, with HTML already stripped from text fields.
#[derive(Debug, Clone)]
pub struct FeedItem {
    /// Link exactly as it appears in the feed (possibly a redirector URL).
    pub link: Option<String>,
    pub title: String,
    pub description: String,
    pub published: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movie_record_deserialization_minimal() {
        let json = r#"{ "slug": "flow", "title": "Flow" }"#;
        let record: MovieRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.slug, "flow");
        assert!(record.aliases.is_empty());
        assert!(record.sources.is_empty());
        assert_eq!(record.last_source_date, None);
    }

    #[test]
    fn test_movie_record_uses_camel_case() {
        let record = MovieRecord {
            slug: "flow".to_string(),
            title: "Flow".to_string(),
            aliases: BTreeSet::new(),
            theater_release_date: NaiveDate::from_ymd_opt(2024, 11, 7),
            theater_end_date: None,
            last_source_date: None,
            sources: vec![],
            tmdb_id: None,
            poster_path: None,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""theaterReleaseDate":"2024-11-07""#));
        assert!(!json.contains("theaterEndDate"));
        assert!(!json.contains("aliases"));
        assert!(!json.contains("posterPath"));
    }

    #[test]
    fn test_source_ref_published_date_accepts_offsets() {
        let json = r#"{
            "url": "https://example.com/a",
            "title": "A",
            "description": "",
            "publishedDate": "2024-12-01T10:00:00+01:00"
        }"#;
        let source: SourceRef = serde_json::from_str(json).unwrap();
        assert_eq!(source.published_date.to_rfc3339(), "2024-12-01T09:00:00+00:00");
    }

    #[test]
    fn test_has_source() {
        let record: MovieRecord = serde_json::from_str(
            r#"{
                "slug": "flow",
                "title": "Flow",
                "sources": [{
                    "url": "https://example.com/a",
                    "title": "A",
                    "description": "",
                    "publishedDate": "2024-12-01T10:00:00Z"
                }]
            }"#,
        )
        .unwrap();
        assert!(record.has_source("https://example.com/a"));
        assert!(!record.has_source("https://example.com/b"));
    }

    #[test]
    fn test_feed_source_without_watermark() {
        let json = r#"[{ "name": "alert", "url": "https://www.google.com/alerts/feeds/1/2" }]"#;
        let sources: Vec<FeedSource> = serde_json::from_str(json).unwrap();
        assert_eq!(sources[0].last_update_date, None);
        let back = serde_json::to_string(&sources[0]).unwrap();
        assert!(!back.contains("lastUpdateDate"));
    }
}

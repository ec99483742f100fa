//! Alert feed fetching and parsing.
//!
//! Google Alerts publishes Atom feeds whose entry links point at a Google
//! redirector (`https://www.google.com/url?...&url=<article>`). This module
//! parses Atom and RSS 2.0 documents into a [`Feed`] and unwraps redirector
//! links into the real article URL.

use quick_xml::de::from_str;
use reqwest::Client;
use serde::Deserialize;
use std::error::Error;
use tracing::{debug, info, instrument};
use url::Url;

use crate::models::{Feed, FeedItem};
use crate::utils::{html_to_text, parse_timestamp};

/// Source of parsed alert feeds.
pub trait FeedFetcher {
    async fn fetch_feed(&self, url: &str) -> Result<Feed, Box<dyn Error>>;
}

/// Fetches feeds over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    http: Client,
}

impl HttpFeedFetcher {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

impl FeedFetcher for HttpFeedFetcher {
    #[instrument(level = "info", skip(self))]
    async fn fetch_feed(&self, url: &str) -> Result<Feed, Box<dyn Error>> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;
        let feed = parse_feed(&body)?;
        info!(items = feed.items.len(), updated = ?feed.updated, "Fetched feed");
        Ok(feed)
    }
}

#[derive(Debug, Default, Deserialize)]
struct XmlText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: Option<String>,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    title: Option<XmlText>,
    #[serde(default)]
    link: Vec<AtomLink>,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(default)]
    content: Option<XmlText>,
    #[serde(default)]
    summary: Option<XmlText>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(default)]
    title: Option<XmlText>,
    #[serde(default)]
    link: Option<XmlText>,
    #[serde(default)]
    description: Option<XmlText>,
    #[serde(rename = "pubDate", default)]
    pub_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(rename = "lastBuildDate", default)]
    last_build_date: Option<String>,
    #[serde(rename = "pubDate", default)]
    pub_date: Option<String>,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

/// Root of either an Atom `<feed>` or an RSS `<rss>` document.
#[derive(Debug, Deserialize)]
struct XmlFeed {
    #[serde(default)]
    updated: Option<String>,
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
    #[serde(default)]
    channel: Option<RssChannel>,
}

fn text_of(field: Option<XmlText>) -> String {
    field.map(|t| html_to_text(&t.value)).unwrap_or_default()
}

impl From<AtomEntry> for FeedItem {
    fn from(entry: AtomEntry) -> Self {
        // Prefer the alternate link; Atom allows several.
        let link = entry
            .link
            .iter()
            .find(|l| l.rel.as_deref().is_none_or(|rel| rel == "alternate"))
            .or_else(|| entry.link.first())
            .and_then(|l| l.href.clone());
        let published = entry
            .published
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| entry.updated.as_deref().and_then(parse_timestamp));
        FeedItem {
            link,
            title: text_of(entry.title),
            description: text_of(entry.content.or(entry.summary)),
            published,
        }
    }
}

impl From<RssItem> for FeedItem {
    fn from(item: RssItem) -> Self {
        FeedItem {
            link: item.link.map(|l| l.value.trim().to_string()).filter(|l| !l.is_empty()),
            title: text_of(item.title),
            description: text_of(item.description),
            published: item.pub_date.as_deref().and_then(parse_timestamp),
        }
    }
}

/// Parse an Atom or RSS 2.0 document.
pub fn parse_feed(xml: &str) -> Result<Feed, Box<dyn Error>> {
    let raw: XmlFeed = from_str(xml)?;

    let feed = match raw.channel {
        Some(channel) => Feed {
            updated: channel
                .last_build_date
                .as_deref()
                .or(channel.pub_date.as_deref())
                .and_then(parse_timestamp),
            items: channel.items.into_iter().map(FeedItem::from).collect(),
        },
        None => Feed {
            updated: raw.updated.as_deref().and_then(parse_timestamp),
            items: raw.entries.into_iter().map(FeedItem::from).collect(),
        },
    };
    debug!(items = feed.items.len(), "Parsed feed");
    Ok(feed)
}

/// Returns `true` for Google's `/url` click-through redirector.
fn is_redirector(url: &Url) -> bool {
    let host = url.host_str().unwrap_or_default();
    let google = host.starts_with("google.") || host.starts_with("www.google.");
    google && url.path() == "/url"
}

/// Resolve a feed link to the article URL.
///
/// Redirector links yield the decoded `url` (or `q`) query parameter; other
/// links are returned unchanged. Links that are not absolute http(s) URLs, and
/// redirectors without a destination, resolve to `None`.
pub fn resolve_link(link: &str) -> Option<String> {
    let link = link.trim();
    let parsed = Url::parse(link).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    if !is_redirector(&parsed) {
        return Some(link.to_string());
    }

    let destination = parsed
        .query_pairs()
        .find(|(k, _)| k == "url" || k == "q")
        .map(|(_, v)| v.into_owned())?;
    let target = Url::parse(&destination).ok()?;
    matches!(target.scheme(), "http" | "https").then_some(destination)
}

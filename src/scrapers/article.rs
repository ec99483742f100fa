//! Article text extraction.
//!
//! Fetches an article page and returns the HTML of its main content together
//! with the publication time found in the page metadata. Pages that cannot be
//! fetched or have no recognizable content (paywalls, landing pages, dead
//! links) yield `None`; callers log and move on.
//!
//! # Content selection
//!
//! 1. The first `<article>` element with text
//! 2. Otherwise every `<p>` element, concatenated
//! 3. Otherwise `<body>`
//!
//! # Publication date
//!
//! Checked in order: publication meta tags (`article:published_time` and
//! friends), JSON-LD `datePublished`, then the first `<time datetime>`.

use chrono::{DateTime, Utc};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::error::Error;
use tracing::{debug, info, instrument, warn};

use crate::models::NewsArticle;
use crate::utils::{html_to_text, parse_timestamp};

const PUBLISHED_META_NAMES: &[&str] = &[
    "article:published_time",
    "og:article:published_time",
    "article:published",
    "datepublished",
    "dc.date.issued",
    "dc.date",
    "dcterms.created",
    "date",
    "pubdate",
    "publishdate",
    "publish_date",
    "parsely-pub-date",
    "sailthru.date",
];

/// Source of article content.
pub trait TextExtractor {
    async fn extract(&self, url: &str) -> Option<NewsArticle>;
}

/// Fetches and parses articles over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTextExtractor {
    http: Client,
}

impl HttpTextExtractor {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    async fn fetch(&self, url: &str) -> Result<String, Box<dyn Error>> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

impl TextExtractor for HttpTextExtractor {
    #[instrument(level = "info", skip(self))]
    async fn extract(&self, url: &str) -> Option<NewsArticle> {
        let body = match self.fetch(url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Article fetch failed");
                return None;
            }
        };
        let article = parse_article(url, &body);
        match &article {
            Some(a) => info!(bytes = a.content.len(), published = ?a.published, "Parsed article"),
            None => warn!("Page has no article content"),
        }
        article
    }
}

/// Extract the main content and publication time from a fetched page.
pub fn parse_article(url: &str, html: &str) -> Option<NewsArticle> {
    let document = Html::parse_document(html);
    let content = main_content(&document)?;
    let published = published_date(&document);
    debug!(%url, bytes = content.len(), ?published, "Selected article content");
    Some(NewsArticle {
        source: url.to_string(),
        content,
        published,
    })
}

fn has_text(element: &ElementRef<'_>) -> bool {
    element.text().any(|t| !t.trim().is_empty())
}

fn main_content(document: &Html) -> Option<String> {
    let article = Selector::parse("article").ok()?;
    if let Some(element) = document.select(&article).find(has_text) {
        return Some(element.html());
    }

    let paragraph = Selector::parse("p").ok()?;
    let paragraphs: Vec<String> = document
        .select(&paragraph)
        .filter(has_text)
        .map(|p| p.html())
        .collect();
    if !paragraphs.is_empty() {
        return Some(paragraphs.join("\n"));
    }

    let body = Selector::parse("body").ok()?;
    document
        .select(&body)
        .next()
        .filter(|b| !html_to_text(&b.inner_html()).is_empty())
        .map(|b| b.inner_html())
}

fn published_date(document: &Html) -> Option<DateTime<Utc>> {
    meta_published(document)
        .or_else(|| json_ld_published(document))
        .or_else(|| time_published(document))
}

fn meta_published(document: &Html) -> Option<DateTime<Utc>> {
    let meta = Selector::parse("meta[content]").ok()?;
    let mut candidates: Vec<(usize, DateTime<Utc>)> = document
        .select(&meta)
        .filter_map(|m| {
            let el = m.value();
            let name = el
                .attr("property")
                .or_else(|| el.attr("name"))
                .or_else(|| el.attr("itemprop"))?
                .to_lowercase();
            let rank = PUBLISHED_META_NAMES.iter().position(|n| *n == name)?;
            let date = parse_timestamp(el.attr("content")?)?;
            Some((rank, date))
        })
        .collect();
    candidates.sort_by_key(|(rank, _)| *rank);
    candidates.into_iter().next().map(|(_, date)| date)
}

fn find_date_published(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Object(map) => map
            .get("datePublished")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .or_else(|| map.values().find_map(find_date_published)),
        Value::Array(items) => items.iter().find_map(find_date_published),
        _ => None,
    }
}

fn json_ld_published(document: &Html) -> Option<DateTime<Utc>> {
    let script = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    document.select(&script).find_map(|s| {
        let raw: String = s.text().collect();
        serde_json::from_str::<Value>(raw.trim())
            .ok()
            .as_ref()
            .and_then(find_date_published)
    })
}

fn time_published(document: &Html) -> Option<DateTime<Utc>> {
    let time = Selector::parse("time[datetime]").ok()?;
    document
        .select(&time)
        .find_map(|t| t.value().attr("datetime").and_then(parse_timestamp))
}

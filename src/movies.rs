//! Movie extraction: ask the LLM which anime films an article announces.
//!
//! The model is asked for a bare JSON array of
//! `{"title", "theaterReleaseDate"?, "theaterEndDate"?}` objects. Replies are
//! handled loosely: a surrounding markdown code fence is stripped, every field
//! is optional, and unusable entries are dropped one by one instead of
//! rejecting the whole reply.
//!
//! Failures never propagate. A transport error or an unparseable reply is
//! written to the [`RunLog`] and reported as `None`, meaning "no usable
//! extraction for this article".

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::api::AskAsync;
use crate::models::CandidateMention;
use crate::run_log::RunLog;
use crate::utils::{collapse_whitespace, parse_timestamp, truncate_for_log};

/// A mention exactly as the model wrote it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMention {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "release_date")]
    theater_release_date: Option<String>,
    #[serde(default, alias = "end_date")]
    theater_end_date: Option<String>,
}

/// Build the extraction instruction for one article.
///
/// `country` names the market whose theaters matter. When `reference_date` is
/// known it is stated up front so relative dates ("next Monday") resolve.
pub fn build_prompt(
    country: &str,
    article_text: &str,
    reference_date: Option<NaiveDate>,
) -> String {
    let current_date = reference_date
        .map(|d| format!("Current date is {}.", d.format("%Y-%m-%d")))
        .unwrap_or_default();

    let prompt = format!(
        r#"{current_date}
        Extract all Japanese anime movies mentioned in this article that you are sure are going to be released,
        or are already showing, in {country} movie theaters, with their next release date and their last date
        in {country} movie theaters, as a JSON array.
        If you are not sure that a movie will be released in {country} movie theaters do not add it to the array.
        Format: [{{"title": "Movie Title", "theaterReleaseDate": "YYYY-MM-DD", "theaterEndDate": "YYYY-MM-DD"}}].
        If you are not confident about a date, do not return that field.
        Always respond with only JSON, never wrap it in markdown.
        Article: {article_text}"#
    );
    collapse_whitespace(&prompt)
}

/// Remove a markdown code fence wrapped around a model reply.
///
/// Handles both a bare fence and one carrying a language tag (```` ```json ````).
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag, if any, up to the end of the opening line.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a date the model produced for a theatrical window.
fn parse_mention_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(raw).map(|dt| dt.date_naive()))
}

/// Parse a (fence-stripped) model reply into validated mentions.
///
/// Returns the JSON error when the reply is not an array of objects. Entries
/// without a usable title are dropped; dates that do not parse are dropped
/// while the entry itself is kept. Each dropped item is described in the
/// returned notes.
pub fn parse_mentions(
    reply: &str,
) -> Result<(Vec<CandidateMention>, Vec<String>), serde_json::Error> {
    let raw: Vec<RawMention> = serde_json::from_str(strip_code_fence(reply))?;
    let mut mentions = Vec::with_capacity(raw.len());
    let mut notes = Vec::new();

    for entry in raw {
        let title = entry.title.as_deref().map(str::trim).unwrap_or_default();
        if title.is_empty() {
            notes.push(format!("Dropped mention without title: {entry:?}"));
            continue;
        }

        let theater_release_date = parse_mention_date(entry.theater_release_date.as_deref());
        if entry.theater_release_date.is_some() && theater_release_date.is_none() {
            notes.push(format!(
                "Ignored unparseable release date {:?} for \"{title}\"",
                entry.theater_release_date
            ));
        }
        let theater_end_date = parse_mention_date(entry.theater_end_date.as_deref());
        if entry.theater_end_date.is_some() && theater_end_date.is_none() {
            notes.push(format!(
                "Ignored unparseable end date {:?} for \"{title}\"",
                entry.theater_end_date
            ));
        }

        mentions.push(CandidateMention {
            title: title.to_string(),
            theater_release_date,
            theater_end_date,
        });
    }

    Ok((mentions, notes))
}

/// Ask the model for the anime films `article_text` announces.
///
/// Returns `None` when the call fails or the reply is not a JSON array; both
/// cases are logged with the available diagnostic payload.
#[instrument(level = "info", skip_all, fields(bytes = article_text.len()))]
pub async fn extract_movies<A: AskAsync>(
    ask: &A,
    country: &str,
    article_text: &str,
    reference_date: Option<NaiveDate>,
    log: &mut RunLog,
) -> Option<Vec<CandidateMention>> {
    let prompt = build_prompt(country, article_text, reference_date);
    debug!(prompt = %truncate_for_log(&prompt, 500), "Built extraction prompt");

    let reply = match ask.ask(&prompt).await {
        Ok(reply) => reply,
        Err(e) => {
            log.error(format!("API request failed: {e}")).await;
            return None;
        }
    };

    match parse_mentions(&reply) {
        Ok((mentions, notes)) => {
            for note in notes {
                log.warn(note).await;
            }
            let titles: Vec<&str> = mentions.iter().map(|m| m.title.as_str()).collect();
            log.info(format!("Extracted anime movies: {titles:?}")).await;
            Some(mentions)
        }
        Err(e) => {
            warn!(
                error = %e,
                reply = %truncate_for_log(&reply, 300),
                "Model returned non-conforming JSON"
            );
            log.error(format!("Error parsing response as JSON: {reply}")).await;
            None
        }
    }
}

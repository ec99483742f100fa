//! Static site rendering.
//!
//! The site is three generated documents plus the copied image assets:
//!
//! ```text
//! _site/
//! ├── index.html      # movies opening in the upcoming window
//! ├── archivio.html   # the whole catalog
//! ├── feed.xml        # Atom feed of the upcoming window
//! └── images/         # copied verbatim from _input/images
//! ```
//!
//! Every page is rewritten from scratch on each render. Dates are shown in
//! Italian long form ("lunedì 9 dicembre 2024").

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, TimeDelta, Utc};
use itertools::Itertools;
use quick_xml::escape::escape;
use std::error::Error;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::models::{MovieRecord, SourceRef};
use crate::outputs::atom;

pub const INDEX_FILE: &str = "index.html";
pub const ARCHIVE_FILE: &str = "archivio.html";
pub const FEED_FILE: &str = "feed.xml";

const WEEKDAYS: [&str; 7] = [
    "lunedì",
    "martedì",
    "mercoledì",
    "giovedì",
    "venerdì",
    "sabato",
    "domenica",
];

const MONTHS: [&str; 12] = [
    "gennaio",
    "febbraio",
    "marzo",
    "aprile",
    "maggio",
    "giugno",
    "luglio",
    "agosto",
    "settembre",
    "ottobre",
    "novembre",
    "dicembre",
];

/// Format a date as "lunedì 9 dicembre 2024".
pub fn format_date_italian(date: NaiveDate) -> String {
    format!(
        "{} {} {} {}",
        WEEKDAYS[date.weekday().num_days_from_monday() as usize],
        date.day(),
        MONTHS[date.month0() as usize],
        date.year()
    )
}

/// Movies whose release date falls in `[today, today + window_days]`,
/// earliest first. Movies without a release date are never upcoming.
pub fn upcoming_movies<'a>(
    records: impl IntoIterator<Item = &'a MovieRecord>,
    today: NaiveDate,
    window_days: i64,
) -> Vec<&'a MovieRecord> {
    let last_day = today
        .checked_add_signed(TimeDelta::days(window_days))
        .unwrap_or(NaiveDate::MAX);
    records
        .into_iter()
        .filter(|r| {
            r.theater_release_date
                .is_some_and(|d| d >= today && d <= last_day)
        })
        .sorted_by_key(|r| r.theater_release_date)
        .collect()
}

/// The newest `lastSourceDate` in the catalog, or `now` when no record has one.
pub fn newest_source_date<'a>(
    records: impl IntoIterator<Item = &'a MovieRecord>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    records
        .into_iter()
        .filter_map(|r| r.last_source_date)
        .max()
        .unwrap_or(now)
}

/// Sources ordered newest first.
pub fn sources_by_date_desc(sources: &[SourceRef]) -> Vec<&SourceRef> {
    sources
        .iter()
        .sorted_by(|a, b| b.published_date.cmp(&a.published_date))
        .collect()
}

/// One-line description of a movie's theatrical window.
pub fn screening_phrase(record: &MovieRecord) -> String {
    match (record.theater_release_date, record.theater_end_date) {
        (Some(from), Some(to)) if to > from => format!(
            "Al cinema da {} a {}",
            format_date_italian(from),
            format_date_italian(to)
        ),
        (Some(from), _) => format!("Al cinema {}", format_date_italian(from)),
        (None, Some(to)) => format!("Al cinema fino a {}", format_date_italian(to)),
        (None, None) => "Date da confermare".to_string(),
    }
}

fn write_time(out: &mut String, date: NaiveDate) -> std::fmt::Result {
    write!(
        out,
        r#"<time datetime="{}">{}</time>"#,
        date.format("%Y-%m-%d"),
        format_date_italian(date)
    )
}

fn write_movie(out: &mut String, record: &MovieRecord) -> std::fmt::Result {
    writeln!(out, r#"<article class="movie" id="{}">"#, escape(record.slug.as_str()))?;
    if let Some(poster) = &record.poster_path {
        writeln!(
            out,
            r#"  <img class="poster" src="{}" alt="{}" loading="lazy">"#,
            escape(poster.as_str()),
            escape(record.title.as_str())
        )?;
    }
    writeln!(out, "  <h2>{}</h2>", escape(record.title.as_str()))?;

    write!(out, r#"  <p class="dates">"#)?;
    match (record.theater_release_date, record.theater_end_date) {
        (Some(from), Some(to)) if to > from => {
            write!(out, "Al cinema da ")?;
            write_time(out, from)?;
            write!(out, " a ")?;
            write_time(out, to)?;
        }
        (Some(from), _) => {
            write!(out, "Al cinema ")?;
            write_time(out, from)?;
        }
        (None, Some(to)) => {
            write!(out, "Al cinema fino a ")?;
            write_time(out, to)?;
        }
        (None, None) => write!(out, "Date da confermare")?,
    }
    writeln!(out, "</p>")?;

    if !record.sources.is_empty() {
        writeln!(out, r#"  <ul class="sources">"#)?;
        for source in sources_by_date_desc(&record.sources) {
            write!(
                out,
                r#"    <li><a href="{}" rel="nofollow">{}</a> "#,
                escape(source.url.as_str()),
                escape(source.title.as_str())
            )?;
            write_time(out, source.published_date.date_naive())?;
            writeln!(out, "</li>")?;
        }
        writeln!(out, "  </ul>")?;
    }
    writeln!(out, "</article>")
}

fn write_page(
    out: &mut String,
    site_title: &str,
    heading: &str,
    updated: DateTime<Utc>,
    movies: &[&MovieRecord],
    empty_message: &str,
) -> std::fmt::Result {
    let site_title = escape(site_title);
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, r#"<html lang="it">"#)?;
    writeln!(out, "<head>")?;
    writeln!(out, r#"<meta charset="utf-8">"#)?;
    writeln!(out, r#"<meta name="viewport" content="width=device-width, initial-scale=1">"#)?;
    writeln!(out, "<title>{} · {site_title}</title>", escape(heading))?;
    writeln!(
        out,
        r#"<link rel="alternate" type="application/atom+xml" title="{site_title}" href="{FEED_FILE}">"#
    )?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body>")?;
    writeln!(out, "<header>")?;
    writeln!(out, "<h1>{site_title}</h1>")?;
    writeln!(
        out,
        r#"<nav><a href="{INDEX_FILE}">Prossime uscite</a> · <a href="{ARCHIVE_FILE}">Archivio</a> · <a href="{FEED_FILE}">Feed</a></nav>"#
    )?;
    writeln!(out, "</header>")?;
    writeln!(out, "<main>")?;
    writeln!(out, "<h2>{}</h2>", escape(heading))?;
    if movies.is_empty() {
        writeln!(out, r#"<p class="empty">{}</p>"#, escape(empty_message))?;
    }
    for record in movies {
        write_movie(out, record)?;
    }
    writeln!(out, "</main>")?;
    write!(out, "<footer>Ultimo aggiornamento: ")?;
    write!(
        out,
        r#"<time datetime="{}">{}</time>"#,
        updated.to_rfc3339_opts(SecondsFormat::Secs, true),
        format_date_italian(updated.date_naive())
    )?;
    writeln!(out, "</footer>")?;
    writeln!(out, "</body>")?;
    writeln!(out, "</html>")
}

/// Render the home page: movies opening in the upcoming window.
pub fn render_index(
    catalog: &Catalog,
    config: &AppConfig,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<String, std::fmt::Error> {
    let upcoming = upcoming_movies(catalog.records(), today, config.site.upcoming_window_days);
    let mut out = String::new();
    write_page(
        &mut out,
        &config.site.title,
        "Prossime uscite",
        newest_source_date(catalog.records(), now),
        &upcoming,
        "Nessun film in uscita nei prossimi giorni.",
    )?;
    Ok(out)
}

/// Render the archive: every movie, latest release first, undated last.
pub fn render_archive(
    catalog: &Catalog,
    config: &AppConfig,
    now: DateTime<Utc>,
) -> Result<String, std::fmt::Error> {
    let all: Vec<&MovieRecord> = catalog
        .records()
        .sorted_by(|a, b| match (a.theater_release_date, b.theater_release_date) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        })
        .collect();
    let mut out = String::new();
    write_page(
        &mut out,
        &config.site.title,
        "Archivio",
        newest_source_date(catalog.records(), now),
        &all,
        "Il catalogo è vuoto.",
    )?;
    Ok(out)
}

/// Copy a directory tree, overwriting files that already exist.
async fn copy_dir(from: &Path, to: &Path) -> Result<usize, Box<dyn Error>> {
    let mut copied = 0;
    let mut pending: Vec<(PathBuf, PathBuf)> = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((src, dst)) = pending.pop() {
        fs::create_dir_all(&dst).await?;
        let mut entries = fs::read_dir(&src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = dst.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                fs::copy(entry.path(), &target).await?;
                copied += 1;
            }
        }
    }
    Ok(copied)
}

/// Render the whole site into `paths.site_output`.
#[instrument(
    level = "info",
    skip_all,
    fields(output = %config.paths.site_output.display(), movies = catalog.len())
)]
pub async fn render_site(
    catalog: &Catalog,
    config: &AppConfig,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<(), Box<dyn Error>> {
    let output = &config.paths.site_output;
    fs::create_dir_all(output).await?;

    fs::write(output.join(INDEX_FILE), render_index(catalog, config, today, now)?).await?;
    fs::write(output.join(ARCHIVE_FILE), render_archive(catalog, config, now)?).await?;

    let upcoming = upcoming_movies(catalog.records(), today, config.site.upcoming_window_days);
    let updated = newest_source_date(catalog.records(), now);
    let feed = atom::render_feed(&upcoming, &config.site, updated)?;
    fs::write(output.join(FEED_FILE), feed).await?;
    info!(upcoming = upcoming.len(), "Wrote pages and feed");

    let images = config.paths.images_dir();
    if fs::try_exists(&images).await? {
        let copied = copy_dir(&images, &output.join("images")).await?;
        info!(copied, "Copied image assets");
    } else {
        warn!(path = %images.display(), "No image assets to copy");
    }
    Ok(())
}

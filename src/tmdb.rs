//! Poster lookup on The Movie Database (TMDB).
//!
//! When a TMDB API key is configured, every newly created catalog record is
//! searched on TMDB by title; the most popular match provides the TMDB id and
//! a poster, which is downloaded into the site's image assets. Both fields are
//! written once and never refreshed.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

use crate::models::MovieRecord;
use crate::run_log::RunLog;

const SEARCH_URL: &str = "https://api.themoviedb.org/3/search/movie";
const IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p";
/// Poster width requested from the image CDN (`w342`, `w500`, or `original`).
const POSTER_SIZE: &str = "w500";

static RE_NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").unwrap());

/// One search hit.
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovie {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<TmdbMovie>,
}

/// Reduce a title to its words for the search query.
pub fn clean_title(title: &str) -> String {
    RE_NON_WORD.replace_all(title, " ").trim().to_string()
}

/// URL of a poster on the TMDB image CDN.
pub fn image_url(poster_path: &str, size: &str) -> String {
    format!("{IMAGE_BASE_URL}/{size}{poster_path}")
}

/// Pick the most popular hit.
pub fn most_popular(results: Vec<TmdbMovie>) -> Option<TmdbMovie> {
    results
        .into_iter()
        .max_by(|a, b| a.popularity.total_cmp(&b.popularity))
}

/// Movie search and image download, as used by [`attach_poster`].
pub trait PosterLookup {
    /// Search a movie by title and return the most popular hit.
    async fn search_movie(&self, title: &str) -> Result<Option<TmdbMovie>, Box<dyn Error>>;

    /// Download `url` to `path`, creating parent directories.
    async fn download(&self, url: &str, path: &Path) -> Result<(), Box<dyn Error>>;
}

#[derive(Clone)]
pub struct TmdbClient {
    http: Client,
    api_key: String,
    language: String,
}

impl std::fmt::Debug for TmdbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TmdbClient")
            .field("language", &self.language)
            .finish()
    }
}

impl TmdbClient {
    pub fn new(http: Client, api_key: &str, language: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            language: language.to_string(),
        }
    }
}

impl PosterLookup for TmdbClient {
    #[instrument(level = "info", skip(self))]
    async fn search_movie(&self, title: &str) -> Result<Option<TmdbMovie>, Box<dyn Error>> {
        let query = clean_title(title);
        let response: SearchResponse = self
            .http
            .get(SEARCH_URL)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[
                ("query", query.as_str()),
                ("include_adult", "false"),
                ("language", self.language.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!(hits = response.results.len(), "TMDB search done");
        Ok(most_popular(response.results))
    }

    #[instrument(level = "info", skip_all, fields(%url, path = %path.display()))]
    async fn download(&self, url: &str, path: &Path) -> Result<(), Box<dyn Error>> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, &bytes).await?;
        Ok(())
    }
}

/// Look up `record` and attach its TMDB id and poster.
///
/// `images_dir` is the site's image asset directory; posters land in its
/// `posters/` subdirectory and `record.poster_path` is set relative to the
/// site root. Records that already carry a TMDB id are left alone. Failures
/// are written to the run log and leave the record as it was.
pub async fn attach_poster<P: PosterLookup>(
    lookup: &P,
    record: &mut MovieRecord,
    images_dir: &Path,
    log: &mut RunLog,
) {
    if record.tmdb_id.is_some() {
        return;
    }
    let hit = match lookup.search_movie(&record.title).await {
        Ok(Some(hit)) => hit,
        Ok(None) => {
            log.warn(format!("TMDB has no match for \"{}\"", record.title))
                .await;
            return;
        }
        Err(e) => {
            log.error(format!("TMDB search failed for \"{}\": {e}", record.title))
                .await;
            return;
        }
    };
    record.tmdb_id = Some(hit.id);
    log.info(format!(
        "TMDB match for \"{}\": {} (id {})",
        record.title,
        hit.title.as_deref().unwrap_or("?"),
        hit.id
    ))
    .await;

    let Some(poster) = hit.poster_path else {
        return;
    };
    let extension = Path::new(&poster)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("jpg");
    let file_name = format!("{}.{extension}", record.slug);
    let url = image_url(&poster, POSTER_SIZE);
    let target = images_dir.join("posters").join(&file_name);
    match lookup.download(&url, &target).await {
        Ok(()) => record.poster_path = Some(format!("images/posters/{file_name}")),
        Err(e) => {
            log.error(format!("Poster download failed for {url}: {e}"))
                .await
        }
    }
}

/// In-memory [`PosterLookup`] for tests.
#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;

    pub(crate) struct FakePosters {
        pub hit: Result<Option<TmdbMovie>, String>,
        pub download_error: Option<String>,
        pub searches: RefCell<Vec<String>>,
        pub downloads: RefCell<Vec<(String, PathBuf)>>,
    }

    impl FakePosters {
        pub(crate) fn found(id: u64, poster_path: Option<&str>) -> Self {
            Self::answering(Ok(Some(TmdbMovie {
                id,
                title: Some("match".to_string()),
                popularity: 10.0,
                poster_path: poster_path.map(str::to_string),
            })))
        }

        pub(crate) fn answering(hit: Result<Option<TmdbMovie>, String>) -> Self {
            Self {
                hit,
                download_error: None,
                searches: RefCell::new(Vec::new()),
                downloads: RefCell::new(Vec::new()),
            }
        }
    }

    impl PosterLookup for FakePosters {
        async fn search_movie(&self, title: &str) -> Result<Option<TmdbMovie>, Box<dyn Error>> {
            self.searches.borrow_mut().push(title.to_string());
            self.hit.clone().map_err(Into::into)
        }

        async fn download(&self, url: &str, path: &Path) -> Result<(), Box<dyn Error>> {
            self.downloads
                .borrow_mut()
                .push((url.to_string(), path.to_path_buf()));
            match &self.download_error {
                Some(e) => Err(e.clone().into()),
                None => Ok(()),
            }
        }
    }
}

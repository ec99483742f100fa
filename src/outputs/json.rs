//! JSON persistence for the movie catalog and the feed source list.
//!
//! Both documents are plain JSON arrays, read fully at startup and rewritten
//! fully on every save:
//!
//! ```text
//! data/
//! ├── movies.json    # [MovieRecord, ...] sorted by slug
//! └── sources.json   # [FeedSource, ...] in polling order
//! ```
//!
//! A missing file is treated as an empty document so the first run can start
//! from scratch. A file that exists but does not parse, or a catalog whose
//! slugs and aliases collide, is an error: it means the persisted state needs
//! manual repair.

use crate::catalog::Catalog;
use crate::models::{FeedSource, MovieRecord};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::error::Error;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// Read a JSON array, or an empty one when the file does not exist.
async fn read_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, Box<dyn Error>> {
    let body = match fs::read_to_string(path).await {
        Ok(body) => body,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "File not found; starting empty");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&body).map_err(|e| {
        error!(path = %path.display(), error = %e, "Malformed JSON document");
        format!("{}: {e}", path.display()).into()
    })
}

/// Write `value` as pretty-printed JSON, creating parent directories.
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, json + "\n").await?;
    Ok(())
}

/// Load the movie catalog.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_catalog(path: &Path) -> Result<Catalog, Box<dyn Error>> {
    let records: Vec<MovieRecord> = read_array(path).await?;
    let catalog = Catalog::from_records(records)?;
    info!(count = catalog.len(), "Loaded catalog");
    Ok(catalog)
}

/// Persist the movie catalog.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = catalog.len()))]
pub async fn save_catalog(path: &Path, catalog: &Catalog) -> Result<(), Box<dyn Error>> {
    let records: Vec<&MovieRecord> = catalog.records().collect();
    write_json(path, &records).await?;
    info!("Wrote catalog");
    Ok(())
}

/// Load the feed source list.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_sources(path: &Path) -> Result<Vec<FeedSource>, Box<dyn Error>> {
    let sources: Vec<FeedSource> = read_array(path).await?;
    info!(count = sources.len(), "Loaded feed sources");
    Ok(sources)
}

/// Persist the feed source list.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn save_sources(path: &Path, sources: &[FeedSource]) -> Result<(), Box<dyn Error>> {
    write_json(path, sources).await?;
    info!(count = sources.len(), "Wrote feed sources");
    Ok(())
}

//! Application configuration loaded from an optional YAML file.
//!
//! Every section and key is optional; anything left out falls back to the
//! defaults below, so running without a config file works out of the box:
//!
//! ```yaml
//! llm:
//!   api_base: https://api.openai.com/v1
//!   model: gpt-3.5-turbo
//!   country: Italy
//! paths:
//!   catalog: data/movies.json
//!   sources: data/sources.json
//!   log_dir: logs
//!   site_input: _input
//!   site_output: _site
//! site:
//!   title: Anime al cinema
//!   base_url: https://example.org/
//!   upcoming_window_days: 14
//! tmdb:
//!   language: it-IT
//! ```
//!
//! Secrets (API keys) are not read from this file; they come from the CLI or
//! the environment, see [`crate::cli::Cli`].

use serde::Deserialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub paths: PathsConfig,
    pub site: SiteConfig,
    pub tmdb: TmdbConfig,
}

/// Chat completion endpoint and extraction settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    pub model: String,
    /// Country whose theaters the extraction prompt asks about.
    pub country: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            country: "Italy".to_string(),
        }
    }
}

/// Where state, logs, and the site live.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub catalog: PathBuf,
    pub sources: PathBuf,
    pub log_dir: PathBuf,
    /// Static assets copied into the site (`images/` only).
    pub site_input: PathBuf,
    pub site_output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            catalog: PathBuf::from("data/movies.json"),
            sources: PathBuf::from("data/sources.json"),
            log_dir: PathBuf::from("logs"),
            site_input: PathBuf::from("_input"),
            site_output: PathBuf::from("_site"),
        }
    }
}

impl PathsConfig {
    /// Image asset directory inside the site input.
    pub fn images_dir(&self) -> PathBuf {
        self.site_input.join("images")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub title: String,
    /// Public URL of the site, used for absolute links in the Atom feed.
    pub base_url: String,
    /// Length of the "upcoming" window in days, counted from today.
    pub upcoming_window_days: i64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Anime al cinema".to_string(),
            base_url: "https://example.org/".to_string(),
            upcoming_window_days: 14,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TmdbConfig {
    /// Language of TMDB search results.
    pub language: String,
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            language: "it-IT".to_string(),
        }
    }
}

/// Load the configuration, or the defaults when no path is given.
#[instrument(level = "info", skip_all)]
pub async fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn Error>> {
    let Some(path) = path else {
        info!("No config file given; using defaults");
        return Ok(AppConfig::default());
    };
    let body = fs::read_to_string(path).await?;
    let config: AppConfig = serde_yaml::from_str(&body)?;
    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "llm:\n  model: gpt-4o-mini\nsite:\n  upcoming_window_days: 7\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.country, "Italy");
        assert_eq!(config.site.upcoming_window_days, 7);
        assert_eq!(config.paths.catalog, PathBuf::from("data/movies.json"));
        assert_eq!(config.tmdb.language, "it-IT");
    }

    #[test]
    fn test_images_dir() {
        let paths = PathsConfig::default();
        assert_eq!(paths.images_dir(), PathBuf::from("_input/images"));
    }

    #[tokio::test]
    async fn test_load_config_without_path() {
        assert_eq!(load_config(None).await.unwrap(), AppConfig::default());
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "paths:\n  site_output: public\n").unwrap();
        let config = load_config(Some(&path)).await.unwrap();
        assert_eq!(config.paths.site_output, PathBuf::from("public"));
        assert_eq!(config.llm, LlmConfig::default());
    }

    #[tokio::test]
    async fn test_load_config_rejects_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "site:\n  upcoming_window_days: soon\n").unwrap();
        assert!(load_config(Some(&path)).await.is_err());
    }
}

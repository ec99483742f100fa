//! Command-line interface definitions for Anime Cinema Watch.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! API keys can be provided via command-line flags or environment variables;
//! everything else lives in the optional YAML config file.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Anime Cinema Watch application.
///
/// # Examples
///
/// ```sh
/// # Full run: poll feeds, update the catalog, render the site
/// OPENAI_API_KEY=sk-... anime_cinema_watch -c config.yaml
///
/// # Re-render the site from the stored catalog only
/// anime_cinema_watch -c config.yaml --skip-fetch
///
/// # Also look up posters on TMDB
/// anime_cinema_watch -c config.yaml --tmdb-api-key YOUR_KEY
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a config.yaml file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// OpenAI-compatible API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// TMDB API read access token; enables poster lookup for new movies
    #[arg(long, env = "TMDB_API_KEY", hide_env_values = true)]
    pub tmdb_api_key: Option<String>,

    /// Do not poll feeds; only render the site from the stored catalog
    #[arg(long)]
    pub skip_fetch: bool,

    /// Do not render the site after polling
    #[arg(long)]
    pub skip_render: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "anime_cinema_watch",
            "--config",
            "./config.yaml",
            "--openai-api-key",
            "sk-test",
            "--skip-render",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("./config.yaml")));
        assert_eq!(cli.openai_api_key.as_deref(), Some("sk-test"));
        assert!(cli.skip_render);
        assert!(!cli.skip_fetch);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["anime_cinema_watch", "-c", "/etc/acw.yaml", "--skip-fetch"]);

        assert_eq!(cli.config, Some(PathBuf::from("/etc/acw.yaml")));
        assert!(cli.skip_fetch);
    }
}

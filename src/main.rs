//! # Anime Cinema Watch
//!
//! Tracks theatrical screenings of anime films in one country. News alert
//! feeds are polled, each linked article is read and handed to an LLM that
//! lists the films it announces, and the results are merged into a persisted
//! movie catalog that is then rendered as a small static site.
//!
//! ## Usage
//!
//! ```sh
//! OPENAI_API_KEY=sk-... anime_cinema_watch -c config.yaml
//! ```
//!
//! ## Architecture
//!
//! One run is strictly sequential:
//! 1. **Startup**: Load config, check directories, load catalog and sources
//! 2. **Walking**: For each feed source, fetch the feed, extract every linked
//!    article, ask the LLM for film mentions, and reconcile them into the
//!    catalog; state is saved after each source
//! 3. **Rendering**: Write the HTML pages, the Atom feed, and image assets
//!
//! Every step reports into a Markdown run log under `log_dir`.

use chrono::{Local, Utc};
use clap::Parser;
use reqwest::Client;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod catalog;
mod cli;
mod config;
mod models;
mod movies;
mod outputs;
mod pipeline;
mod run_log;
mod scrapers;
mod tmdb;
mod utils;

use api::ChatClient;
use cli::Cli;
use config::load_config;
use outputs::{json, site};
use pipeline::Walker;
use run_log::RunLog;
use scrapers::article::HttpTextExtractor;
use scrapers::feed::HttpFeedFetcher;
use tmdb::TmdbClient;
use utils::ensure_writable_dir;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("anime_cinema_watch starting up");

    let args = Cli::parse();
    debug!(
        config = ?args.config,
        skip_fetch = args.skip_fetch,
        skip_render = args.skip_render,
        "Parsed CLI arguments"
    );

    let config = load_config(args.config.as_deref()).await?;

    // Early check: every directory we write to must be writable
    let data_dirs = [&config.paths.catalog, &config.paths.sources]
        .into_iter()
        .filter_map(|p| p.parent().filter(|d| !d.as_os_str().is_empty()));
    let output_dirs = [config.paths.log_dir.as_path(), config.paths.site_output.as_path()];
    for dir in data_dirs.chain(output_dirs) {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let mut log = RunLog::create(&config.paths.log_dir, Local::now()).await?;
    info!(path = %log.path().display(), "Run log created");

    let mut catalog = match json::load_catalog(&config.paths.catalog).await {
        Ok(catalog) => catalog,
        Err(e) => {
            let message = format!("Cannot load catalog {}: {e}", config.paths.catalog.display());
            log.error(message).await;
            log.finish().await?;
            return Err(e);
        }
    };
    if catalog.is_empty() {
        log.info("Catalog is empty, starting fresh").await;
    } else {
        log.info(format!("Loaded {} movies", catalog.len())).await;
    }

    if args.skip_fetch {
        log.info("Feed polling skipped").await;
    } else {
        let Some(openai_api_key) = args.openai_api_key.as_deref() else {
            log.error("No OpenAI API key given (--openai-api-key or OPENAI_API_KEY)")
                .await;
            log.finish().await?;
            return Err("missing OpenAI API key".into());
        };

        let mut sources = match json::load_sources(&config.paths.sources).await {
            Ok(sources) => sources,
            Err(e) => {
                let message =
                    format!("Cannot load sources {}: {e}", config.paths.sources.display());
                log.error(message).await;
                log.finish().await?;
                return Err(e);
            }
        };
        if sources.is_empty() {
            let message =
                format!("No feed sources configured in {}", config.paths.sources.display());
            log.warn(message).await;
        }

        let http = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(HTTP_TIMEOUT)
            .build()?;
        let chat = ChatClient::new(
            http.clone(),
            &config.llm.api_base,
            openai_api_key,
            &config.llm.model,
        );
        let feeds = HttpFeedFetcher::new(http.clone());
        let articles = HttpTextExtractor::new(http.clone());
        let tmdb = args
            .tmdb_api_key
            .as_deref()
            .map(|key| TmdbClient::new(http.clone(), key, &config.tmdb.language));
        if tmdb.is_none() {
            warn!("No TMDB API key; posters will not be looked up");
        }
        let images_dir = config.paths.images_dir();

        let walker = Walker {
            feeds: &feeds,
            articles: &articles,
            ask: &chat,
            posters: tmdb.as_ref(),
            country: &config.llm.country,
            catalog_path: &config.paths.catalog,
            sources_path: &config.paths.sources,
            images_dir: &images_dir,
            run_started: Utc::now(),
        };
        let stats = walker.walk_sources(&mut sources, &mut catalog, &mut log).await;
        let summary = format!(
            "Processed {} of {} sources ({} not updated, {} failed); {} articles read, {} skipped; \
             {} mentions: {} new, {} updated, {} stale",
            stats.sources_processed,
            sources.len(),
            stats.sources_skipped,
            stats.sources_failed,
            stats.articles_processed,
            stats.articles_skipped,
            stats.mentions,
            stats.created,
            stats.updated,
            stats.stale
        );
        log.info(summary).await;
    }

    if args.skip_render {
        log.info("Site rendering skipped").await;
    } else {
        let now = Utc::now();
        match site::render_site(&catalog, &config, Local::now().date_naive(), now).await {
            Ok(()) => {
                let message =
                    format!("Rendered site into {}", config.paths.site_output.display());
                log.info(message).await
            }
            Err(e) => log.error(format!("Site rendering failed: {e}")).await,
        }
    }

    let log_lines = log.lines();
    let log_path = log.finish().await?;
    let elapsed = start_time.elapsed();
    info!(
        elapsed_secs = elapsed.as_secs_f64(),
        log_lines,
        run_log = %log_path.display(),
        "Execution complete"
    );
    Ok(())
}

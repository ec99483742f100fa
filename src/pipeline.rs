//! The source feed walker: feeds → articles → mentions → catalog.
//!
//! Sources, feed items, and mentions are processed strictly one at a time in
//! list order. The [`Walker`] borrows its collaborators; the catalog is owned
//! by the caller and lent mutably for the duration of a walk.
//!
//! # Per-source steps
//!
//! 1. Fetch and parse the feed
//! 2. Skip the source when the feed has not been updated since the watermark
//! 3. Resolve each entry link to the canonical article URL
//! 4. For each article: extract text, ask the LLM for mentions, reconcile
//! 5. Save the catalog, then advance and save the watermark
//!
//! The catalog and the source list are saved after every source, so a run
//! that dies halfway keeps what the finished sources contributed.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::api::AskAsync;
use crate::catalog::{Catalog, ReconcileOutcome};
use crate::models::{FeedItem, FeedSource, SourceRef};
use crate::movies::extract_movies;
use crate::outputs::json;
use crate::run_log::RunLog;
use crate::scrapers::article::TextExtractor;
use crate::scrapers::feed::{FeedFetcher, resolve_link};
use crate::tmdb::{PosterLookup, attach_poster};
use crate::utils::html_to_text;

/// Counters for one walk, reported at the end of the run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WalkStats {
    pub sources_processed: usize,
    pub sources_skipped: usize,
    pub sources_failed: usize,
    pub articles_processed: usize,
    pub articles_skipped: usize,
    pub mentions: usize,
    pub created: usize,
    pub updated: usize,
    pub stale: usize,
}

/// What happened to one feed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceOutcome {
    Processed,
    NotUpdated,
    Failed,
}

/// Collaborators and settings for walking the feed sources.
pub struct Walker<'a, F, T, A, P> {
    pub feeds: &'a F,
    pub articles: &'a T,
    pub ask: &'a A,
    /// Poster lookup for newly created records, when configured.
    pub posters: Option<&'a P>,
    /// Country named in the extraction prompt.
    pub country: &'a str,
    pub catalog_path: &'a Path,
    pub sources_path: &'a Path,
    /// Site image directory receiving downloaded posters.
    pub images_dir: &'a Path,
    /// Publication time assumed for articles that carry none.
    pub run_started: DateTime<Utc>,
}

impl<'a, F, T, A, P> Walker<'a, F, T, A, P>
where
    F: FeedFetcher,
    T: TextExtractor,
    A: AskAsync,
    P: PosterLookup,
{
    /// Walk every source in order, checkpointing after each one.
    #[instrument(level = "info", skip_all, fields(sources = sources.len()))]
    pub async fn walk_sources(
        &self,
        sources: &mut [FeedSource],
        catalog: &mut Catalog,
        log: &mut RunLog,
    ) -> WalkStats {
        let mut stats = WalkStats::default();

        for index in 0..sources.len() {
            let outcome = self
                .process_source(&mut sources[index], catalog, log, &mut stats)
                .await;
            match outcome {
                SourceOutcome::Processed => stats.sources_processed += 1,
                SourceOutcome::NotUpdated => {
                    stats.sources_skipped += 1;
                    continue;
                }
                SourceOutcome::Failed => {
                    stats.sources_failed += 1;
                    continue;
                }
            }

            if let Err(e) = json::save_sources(self.sources_path, sources).await {
                log.error(format!(
                    "Failed to save sources to {}: {e}",
                    self.sources_path.display()
                ))
                .await;
            }
        }

        info!(?stats, "Walk complete");
        stats
    }

    /// Process one source. On success the catalog has been saved and the
    /// watermark advanced in `source` (the caller persists the source list).
    async fn process_source(
        &self,
        source: &mut FeedSource,
        catalog: &mut Catalog,
        log: &mut RunLog,
        stats: &mut WalkStats,
    ) -> SourceOutcome {
        log.info(format!("Processing source \"{}\": {}", source.name, source.url))
            .await;

        let feed = match self.feeds.fetch_feed(&source.url).await {
            Ok(feed) => feed,
            Err(e) => {
                log.error(format!("Failed to fetch feed {}: {e}", source.url))
                    .await;
                return SourceOutcome::Failed;
            }
        };

        if let (Some(updated), Some(watermark)) = (feed.updated, source.last_update_date) {
            if updated <= watermark {
                log.info(format!(
                    "Feed \"{}\" not updated since {}; skipping",
                    source.name,
                    watermark.to_rfc3339()
                ))
                .await;
                return SourceOutcome::NotUpdated;
            }
        }

        let mut resolved: Vec<(String, &FeedItem)> = Vec::with_capacity(feed.items.len());
        for item in &feed.items {
            match item.link.as_deref().and_then(resolve_link) {
                Some(url) => resolved.push((url, item)),
                None => {
                    log.warn(format!(
                        "Unresolvable link {:?} for \"{}\"",
                        item.link, item.title
                    ))
                    .await;
                }
            }
        }
        let items: Vec<(String, &FeedItem)> = resolved
            .into_iter()
            .unique_by(|(url, _)| url.clone())
            .collect();

        log.info(format!("Found {} articles in \"{}\"", items.len(), source.name))
            .await;
        for (url, item) in items {
            self.process_article(&url, item, catalog, log, stats).await;
        }

        if let Err(e) = json::save_catalog(self.catalog_path, catalog).await {
            log.error(format!(
                "Failed to save catalog to {}: {e}",
                self.catalog_path.display()
            ))
            .await;
            return SourceOutcome::Failed;
        }

        if let Some(updated) = feed.updated {
            source.last_update_date = Some(updated);
        }
        SourceOutcome::Processed
    }

    /// Extract, ask, and reconcile one article.
    async fn process_article(
        &self,
        url: &str,
        item: &FeedItem,
        catalog: &mut Catalog,
        log: &mut RunLog,
        stats: &mut WalkStats,
    ) {
        log.info(format!("Processing article {url}")).await;

        let Some(article) = self.articles.extract(url).await else {
            log.warn(format!("Could not extract article {url}; skipping"))
                .await;
            stats.articles_skipped += 1;
            return;
        };
        let text = html_to_text(&article.content);
        debug!(source = %article.source, chars = text.chars().count(), "Extracted article text");
        if text.is_empty() {
            log.warn(format!("Article {url} has no text; skipping")).await;
            stats.articles_skipped += 1;
            return;
        }

        let published_date = article
            .published
            .or(item.published)
            .unwrap_or(self.run_started);

        let Some(mentions) = extract_movies(
            self.ask,
            self.country,
            &text,
            Some(published_date.date_naive()),
            log,
        )
        .await
        else {
            stats.articles_skipped += 1;
            return;
        };
        stats.articles_processed += 1;

        let from_article = SourceRef {
            url: url.to_string(),
            title: item.title.clone(),
            description: item.description.clone(),
            published_date,
        };

        for mention in &mentions {
            stats.mentions += 1;
            match catalog.reconcile(mention, &from_article) {
                ReconcileOutcome::Created(slug) => {
                    stats.created += 1;
                    log.info(format!("New movie \"{}\" ({slug})", mention.title))
                        .await;
                    let record = catalog.get_mut(&slug);
                    if let (Some(posters), Some(record)) = (self.posters, record) {
                        attach_poster(posters, record, self.images_dir, log).await;
                    }
                }
                ReconcileOutcome::Updated(slug) => {
                    stats.updated += 1;
                    log.info(format!("Updated movie \"{}\" ({slug})", mention.title))
                        .await;
                }
                ReconcileOutcome::Stale(slug) => {
                    stats.stale += 1;
                    log.info(format!(
                        "Movie \"{}\" ({slug}) already has newer sources; ignored",
                        mention.title
                    ))
                    .await;
                }
                ReconcileOutcome::Rejected => {
                    log.warn(format!(
                        "Cannot build a slug from \"{}\"; ignored",
                        mention.title
                    ))
                    .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Feed, NewsArticle};
    use crate::tmdb::fakes::FakePosters;
    use chrono::{Local, NaiveDate, TimeZone};
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::error::Error;

    const FEED_URL: &str = "https://www.google.com/alerts/feeds/1/2";
    const ARTICLE_URL: &str = "https://www.nexodigital.it/anime-al-cinema-autunno-2024/";

    struct FakeFeeds {
        feeds: RefCell<HashMap<String, Result<Feed, String>>>,
    }

    impl FakeFeeds {
        fn with(url: &str, feed: Result<Feed, String>) -> Self {
            Self {
                feeds: RefCell::new(HashMap::from([(url.to_string(), feed)])),
            }
        }

        fn set(&self, url: &str, feed: Result<Feed, String>) {
            self.feeds.borrow_mut().insert(url.to_string(), feed);
        }
    }

    impl FeedFetcher for FakeFeeds {
        async fn fetch_feed(&self, url: &str) -> Result<Feed, Box<dyn Error>> {
            match self.feeds.borrow().get(url) {
                Some(Ok(feed)) => Ok(feed.clone()),
                Some(Err(e)) => Err(e.clone().into()),
                None => Err(format!("no feed at {url}").into()),
            }
        }
    }

    struct FakeArticles {
        pages: HashMap<String, (String, Option<DateTime<Utc>>)>,
        fetched: RefCell<Vec<String>>,
    }

    impl FakeArticles {
        fn new(pages: &[(&str, &str, Option<DateTime<Utc>>)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, html, published)| (url.to_string(), (html.to_string(), *published)))
                    .collect(),
                fetched: RefCell::new(Vec::new()),
            }
        }
    }

    impl TextExtractor for FakeArticles {
        async fn extract(&self, url: &str) -> Option<NewsArticle> {
            self.fetched.borrow_mut().push(url.to_string());
            self.pages.get(url).map(|(content, published)| NewsArticle {
                source: url.to_string(),
                content: content.clone(),
                published: *published,
            })
        }
    }

    struct FakeAsk {
        reply: String,
        calls: Cell<usize>,
    }

    impl FakeAsk {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                calls: Cell::new(0),
            }
        }
    }

    impl AskAsync for FakeAsk {
        async fn ask(&self, _text: &str) -> Result<String, Box<dyn Error>> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.reply.clone())
        }
    }

    fn utc(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, day, hour, 0, 0).unwrap()
    }

    fn item(link: &str) -> FeedItem {
        FeedItem {
            link: Some(link.to_string()),
            title: "Anime al cinema: autunno 2024".to_string(),
            description: "Tutti gli anime in sala".to_string(),
            published: Some(utc(1, 9)),
        }
    }

    fn feed(updated: DateTime<Utc>, items: Vec<FeedItem>) -> Feed {
        Feed {
            updated: Some(updated),
            items,
        }
    }

    fn source() -> FeedSource {
        FeedSource {
            name: "anime al cinema".to_string(),
            url: FEED_URL.to_string(),
            last_update_date: None,
        }
    }

    const OVERLORD_REPLY: &str = r#"[{"title": "Overlord – Il film", "theaterReleaseDate": "2024-12-09", "theaterEndDate": "2024-12-11"}]"#;

    struct Fixture {
        dir: tempfile::TempDir,
        log: RunLog,
    }

    impl Fixture {
        async fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let log = RunLog::create(&dir.path().join("logs"), Local::now())
                .await
                .unwrap();
            Self { dir, log }
        }

        fn path(&self, name: &str) -> std::path::PathBuf {
            self.dir.path().join(name)
        }
    }

    fn walker<'a>(
        catalog_path: &'a Path,
        sources_path: &'a Path,
        feeds: &'a FakeFeeds,
        articles: &'a FakeArticles,
        ask: &'a FakeAsk,
    ) -> Walker<'a, FakeFeeds, FakeArticles, FakeAsk, FakePosters> {
        Walker {
            feeds,
            articles,
            ask,
            posters: None,
            country: "Italy",
            catalog_path,
            sources_path,
            images_dir: Path::new("unused"),
            run_started: utc(2, 6),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_single_article() {
        let mut fixture = Fixture::new().await;
        let catalog_path = fixture.path("data/movies.json");
        let sources_path = fixture.path("data/sources.json");
        let redirect = format!("https://www.google.com/url?rct=j&sa=t&url={ARTICLE_URL}&ct=ga");
        let feeds = FakeFeeds::with(FEED_URL, Ok(feed(utc(1, 10), vec![item(&redirect)])));
        let articles = FakeArticles::new(&[(
            ARTICLE_URL,
            "<p>Overlord al cinema</p>",
            Some(utc(1, 8)),
        )]);
        let ask = FakeAsk::new(OVERLORD_REPLY);
        let w = walker(&catalog_path, &sources_path, &feeds, &articles, &ask);

        let mut sources = vec![source()];
        let mut catalog = Catalog::new();
        let stats = w.walk_sources(&mut sources, &mut catalog, &mut fixture.log).await;

        assert_eq!(stats.created, 1);
        assert_eq!(articles.fetched.borrow().as_slice(), [ARTICLE_URL]);
        let record = catalog.get("overlord-il-film").unwrap();
        assert_eq!(record.sources.len(), 1);
        assert_eq!(record.sources[0].url, ARTICLE_URL);
        assert_eq!(record.sources[0].title, "Anime al cinema: autunno 2024");
        assert_eq!(record.sources[0].published_date, utc(1, 8));
        assert_eq!(record.theater_release_date, NaiveDate::from_ymd_opt(2024, 12, 9));
        assert_eq!(record.theater_end_date, NaiveDate::from_ymd_opt(2024, 12, 11));

        // Checkpointed state matches memory.
        assert_eq!(json::load_catalog(&catalog_path).await.unwrap(), catalog);
        let saved_sources = json::load_sources(&sources_path).await.unwrap();
        assert_eq!(saved_sources[0].last_update_date, Some(utc(1, 10)));
        assert_eq!(sources[0].last_update_date, Some(utc(1, 10)));

        // The same article shows up again in a newer feed: nothing changes.
        feeds.set(FEED_URL, Ok(feed(utc(2, 10), vec![item(&redirect)])));
        let before = catalog.clone();
        let stats = w.walk_sources(&mut sources, &mut catalog, &mut fixture.log).await;
        assert_eq!(stats.stale, 1);
        assert_eq!(catalog, before);
        assert_eq!(catalog.get("overlord-il-film").unwrap().sources.len(), 1);
    }

    #[tokio::test]
    async fn test_source_not_updated_is_skipped() {
        let mut fixture = Fixture::new().await;
        let catalog_path = fixture.path("movies.json");
        let sources_path = fixture.path("sources.json");
        let feeds = FakeFeeds::with(FEED_URL, Ok(feed(utc(1, 10), vec![item(ARTICLE_URL)])));
        let articles = FakeArticles::new(&[(ARTICLE_URL, "<p>x</p>", None)]);
        let ask = FakeAsk::new(OVERLORD_REPLY);
        let w = walker(&catalog_path, &sources_path, &feeds, &articles, &ask);

        let mut sources = vec![FeedSource {
            last_update_date: Some(utc(1, 10)),
            ..source()
        }];
        let mut catalog = Catalog::new();
        let stats = w.walk_sources(&mut sources, &mut catalog, &mut fixture.log).await;

        assert_eq!(stats.sources_skipped, 1);
        assert_eq!(ask.calls.get(), 0);
        assert!(articles.fetched.borrow().is_empty());
        assert!(catalog.is_empty());
        assert!(!catalog_path.exists());
    }

    #[tokio::test]
    async fn test_failed_feed_keeps_watermark_and_continues() {
        let mut fixture = Fixture::new().await;
        let catalog_path = fixture.path("movies.json");
        let sources_path = fixture.path("sources.json");
        let feeds = FakeFeeds::with("https://broken.example/feed", Err("HTTP 503".to_string()));
        feeds.set(FEED_URL, Ok(feed(utc(1, 10), vec![item(ARTICLE_URL)])));
        let articles = FakeArticles::new(&[(ARTICLE_URL, "<p>x</p>", None)]);
        let ask = FakeAsk::new(OVERLORD_REPLY);
        let w = walker(&catalog_path, &sources_path, &feeds, &articles, &ask);

        let mut sources = vec![
            FeedSource {
                name: "broken".to_string(),
                url: "https://broken.example/feed".to_string(),
                last_update_date: Some(utc(1, 0)),
            },
            source(),
        ];
        let mut catalog = Catalog::new();
        let stats = w.walk_sources(&mut sources, &mut catalog, &mut fixture.log).await;

        assert_eq!(stats.sources_failed, 1);
        assert_eq!(stats.sources_processed, 1);
        assert_eq!(sources[0].last_update_date, Some(utc(1, 0)));
        assert_eq!(sources[1].last_update_date, Some(utc(1, 10)));
        // Without an article date the feed entry date is used.
        let record = catalog.get("overlord-il-film").unwrap();
        assert_eq!(record.last_source_date, Some(utc(1, 9)));
    }

    #[tokio::test]
    async fn test_unavailable_articles_and_bad_links_are_skipped() {
        let mut fixture = Fixture::new().await;
        let catalog_path = fixture.path("movies.json");
        let sources_path = fixture.path("sources.json");
        let items = vec![
            item("https://www.google.com/url?rct=j&sa=t"),
            item("https://paywall.example/article"),
            item(ARTICLE_URL),
            item(ARTICLE_URL),
        ];
        let feeds = FakeFeeds::with(FEED_URL, Ok(feed(utc(1, 10), items)));
        let articles = FakeArticles::new(&[(ARTICLE_URL, "<p>x</p>", Some(utc(1, 8)))]);
        let ask = FakeAsk::new(OVERLORD_REPLY);
        let w = walker(&catalog_path, &sources_path, &feeds, &articles, &ask);

        let mut sources = vec![source()];
        let mut catalog = Catalog::new();
        let stats = w.walk_sources(&mut sources, &mut catalog, &mut fixture.log).await;

        assert_eq!(
            articles.fetched.borrow().as_slice(),
            ["https://paywall.example/article", ARTICLE_URL]
        );
        assert_eq!(stats.articles_skipped, 1);
        assert_eq!(stats.articles_processed, 1);
        assert_eq!(ask.calls.get(), 1);
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_reply_adds_nothing() {
        let mut fixture = Fixture::new().await;
        let catalog_path = fixture.path("movies.json");
        let sources_path = fixture.path("sources.json");
        let feeds = FakeFeeds::with(FEED_URL, Ok(feed(utc(1, 10), vec![item(ARTICLE_URL)])));
        let articles = FakeArticles::new(&[(ARTICLE_URL, "<p>x</p>", Some(utc(1, 8)))]);
        let ask = FakeAsk::new("I could not find any movie.");
        let w = walker(&catalog_path, &sources_path, &feeds, &articles, &ask);

        let mut sources = vec![source()];
        let mut catalog = Catalog::new();
        let stats = w.walk_sources(&mut sources, &mut catalog, &mut fixture.log).await;

        assert_eq!(stats.articles_skipped, 1);
        assert!(catalog.is_empty());
        // The source still counts as processed and its watermark moves.
        assert_eq!(sources[0].last_update_date, Some(utc(1, 10)));
    }

    #[tokio::test]
    async fn test_new_movies_get_posters() {
        let mut fixture = Fixture::new().await;
        let catalog_path = fixture.path("movies.json");
        let sources_path = fixture.path("sources.json");
        let images_dir = fixture.path("_input/images");
        let feeds = FakeFeeds::with(FEED_URL, Ok(feed(utc(1, 10), vec![item(ARTICLE_URL)])));
        let articles = FakeArticles::new(&[(ARTICLE_URL, "<p>x</p>", Some(utc(1, 8)))]);
        let ask = FakeAsk::new(OVERLORD_REPLY);
        let posters = FakePosters::found(1182, Some("/overlord.jpg"));
        let w = Walker {
            posters: Some(&posters),
            images_dir: &images_dir,
            ..walker(&catalog_path, &sources_path, &feeds, &articles, &ask)
        };

        let mut sources = vec![source()];
        let mut catalog = Catalog::new();
        w.walk_sources(&mut sources, &mut catalog, &mut fixture.log).await;

        let record = catalog.get("overlord-il-film").unwrap();
        assert_eq!(record.tmdb_id, Some(1182));
        assert_eq!(
            record.poster_path.as_deref(),
            Some("images/posters/overlord-il-film.jpg")
        );
        assert_eq!(
            posters.downloads.borrow()[0].1,
            images_dir.join("posters/overlord-il-film.jpg")
        );
        // The poster reference is part of the checkpoint.
        let saved = json::load_catalog(&catalog_path).await.unwrap();
        assert_eq!(saved.get("overlord-il-film").unwrap().tmdb_id, Some(1182));

        // Updates of an existing record do not search again.
        let newer = feed(utc(2, 10), vec![item("https://other.example/a")]);
        feeds.set(FEED_URL, Ok(newer));
        let later =
            FakeArticles::new(&[("https://other.example/a", "<p>x</p>", Some(utc(2, 8)))]);
        let w = Walker {
            articles: &later,
            ..w
        };
        let stats = w.walk_sources(&mut sources, &mut catalog, &mut fixture.log).await;
        assert_eq!(stats.updated, 1);
        assert_eq!(posters.searches.borrow().len(), 1);
    }
}

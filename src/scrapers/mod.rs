//! Scrapers for alert feeds and the articles they link to.
//!
//! Scraping follows a two-phase pattern:
//!
//! 1. **Indexing** ([`feed`]): fetch an alert feed and resolve each entry to
//!    the canonical article URL
//! 2. **Fetching** ([`article`]): download one article and isolate its body
//!    and publication date
//!
//! Both phases sit behind a trait: [`feed::FeedFetcher`] and
//! [`article::TextExtractor`].
//! Failures are reported to the caller, which logs them and skips the unit of
//! work.

pub mod article;
pub mod feed;

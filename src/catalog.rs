//! The movie catalog and the reconciliation of new mentions into it.
//!
//! The catalog is keyed by slug. A mention is matched against a record either
//! by the record's own slug or by one of its aliases, so title variants seen
//! across outlets ("Ken il guerriero" vs "Ken il guerriero – Il film") can be
//! folded into one record by adding an alias by hand.
//!
//! # Merge rules
//!
//! - A record only accepts a mention whose source is strictly newer than its
//!   `lastSourceDate`; anything else is a no-op.
//! - Title and theatrical dates are first-write-wins.
//! - Sources are appended once per URL.
//! - `lastSourceDate` always moves to the accepted source's publication time.

use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt;

use crate::models::{CandidateMention, MovieRecord, SourceRef};
use crate::utils::slugify;

/// What [`Catalog::reconcile`] did with a mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A new record was inserted under this slug.
    Created(String),
    /// The record with this slug accepted the mention.
    Updated(String),
    /// The record with this slug already has a source at least as recent.
    Stale(String),
    /// The mention title has no letters or digits to build a slug from.
    Rejected,
}

/// A persisted catalog that violates the slug/alias invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    EmptySlug { title: String },
    DuplicateSlug(String),
    AliasCollision {
        name: String,
        first: String,
        second: String,
    },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::EmptySlug { title } => write!(f, "record \"{title}\" has an empty slug"),
            CatalogError::DuplicateSlug(slug) => {
                write!(f, "slug \"{slug}\" appears more than once")
            }
            CatalogError::AliasCollision {
                name,
                first,
                second,
            } => write!(
                f,
                "\"{name}\" is claimed by both \"{first}\" and \"{second}\""
            ),
        }
    }
}

impl Error for CatalogError {}

/// In-memory movie catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    records: BTreeMap<String, MovieRecord>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from persisted records, checking that every slug and
    /// alias resolves to exactly one record.
    pub fn from_records(records: Vec<MovieRecord>) -> Result<Self, CatalogError> {
        let mut owners: HashMap<String, String> = HashMap::new();
        let mut catalog = Self::new();

        for record in records {
            if record.slug.is_empty() {
                return Err(CatalogError::EmptySlug {
                    title: record.title,
                });
            }
            if catalog.records.contains_key(&record.slug) {
                return Err(CatalogError::DuplicateSlug(record.slug));
            }
            for name in std::iter::once(&record.slug).chain(record.aliases.iter()) {
                match owners.get(name) {
                    Some(owner) if owner != &record.slug => {
                        return Err(CatalogError::AliasCollision {
                            name: name.clone(),
                            first: owner.clone(),
                            second: record.slug.clone(),
                        });
                    }
                    _ => {
                        owners.insert(name.clone(), record.slug.clone());
                    }
                }
            }
            catalog.records.insert(record.slug.clone(), record);
        }

        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, slug: &str) -> Option<&MovieRecord> {
        self.records.get(slug)
    }

    pub fn get_mut(&mut self, slug: &str) -> Option<&mut MovieRecord> {
        self.records.get_mut(slug)
    }

    /// Records in slug order.
    pub fn records(&self) -> impl Iterator<Item = &MovieRecord> {
        self.records.values()
    }

    /// Find the record `slug` refers to, directly or through an alias.
    ///
    /// Aliases are found by a linear scan; catalogs stay in the hundreds of
    /// records at most.
    pub fn resolve(&self, slug: &str) -> Option<&MovieRecord> {
        self.get(slug)
            .or_else(|| self.records.values().find(|r| r.aliases.contains(slug)))
    }

    /// Merge one mention, cited by `from_article`, into the catalog.
    ///
    /// Reconciling the same pair twice leaves the catalog as after the first
    /// call: the second call hits the staleness guard.
    pub fn reconcile(
        &mut self,
        mention: &CandidateMention,
        from_article: &SourceRef,
    ) -> ReconcileOutcome {
        let movie_slug = slugify(&mention.title);
        if movie_slug.is_empty() {
            return ReconcileOutcome::Rejected;
        }

        let existing_slug = self.resolve(&movie_slug).map(|r| r.slug.clone());
        let Some(final_slug) = existing_slug else {
            let record = MovieRecord {
                slug: movie_slug.clone(),
                title: mention.title.clone(),
                aliases: Default::default(),
                theater_release_date: mention.theater_release_date,
                theater_end_date: mention.theater_end_date,
                last_source_date: Some(from_article.published_date),
                sources: vec![from_article.clone()],
                tmdb_id: None,
                poster_path: None,
            };
            self.records.insert(movie_slug.clone(), record);
            return ReconcileOutcome::Created(movie_slug);
        };

        let Some(record) = self.records.get_mut(&final_slug) else {
            return ReconcileOutcome::Rejected;
        };

        if record
            .last_source_date
            .is_some_and(|last| last >= from_article.published_date)
        {
            return ReconcileOutcome::Stale(final_slug);
        }

        if !record.has_source(&from_article.url) {
            record.sources.push(from_article.clone());
        }
        record.theater_release_date = record.theater_release_date.or(mention.theater_release_date);
        record.theater_end_date = record.theater_end_date.or(mention.theater_end_date);
        record.last_source_date = Some(from_article.published_date);

        ReconcileOutcome::Updated(final_slug)
    }
}

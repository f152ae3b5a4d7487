//! The ingester extension point.
//!
//! A source is anything that can hand back pages of raw JSON records for a
//! query, newest-bounded by a cutoff, and turn each record into an
//! [`Item`]. The crawl driver in [`crate::ingest`] owns pagination,
//! pacing, dedup, and failure accounting, so implementations stay small:
//!
//! ```text
//!  queries() ──▶ fetch_page() ──▶ normalize() ──▶ ContentStore::put_item
//!                      ▲  │              │
//!                      └──┘ next cursor  └─▶ fetch_children() ─▶ normalize_child()
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

use crate::models::Item;

/// One page of raw records from a source.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Value>,
    /// Cursor for the next page, or `None` when the source is exhausted.
    pub next: Option<String>,
}

/// Arguments for a single page fetch.
#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    pub query: &'a str,
    /// Records created before this are not wanted.
    pub since: DateTime<Utc>,
    pub cursor: Option<&'a str>,
    /// Records already fetched for this query.
    pub fetched: usize,
}

/// Fixed delays imposed by the crawl driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pacing {
    /// Between pages of one query, and before a child fetch.
    pub page_delay: Duration,
    /// Between distinct queries.
    pub query_delay: Duration,
}

#[async_trait]
pub trait Ingester: Send + Sync {
    /// Source label stored on every item (e.g. `"hn"`).
    fn source(&self) -> &str;

    /// Queries to crawl, in order (search terms, subreddit names, ...).
    fn queries(&self) -> Vec<String>;

    fn pacing(&self) -> Pacing;

    /// Fetch one page. Errors abandon the rest of the query.
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page>;

    /// Turn a raw record into an item.
    fn normalize(&self, query: &str, record: &Value) -> Result<Item>;

    /// Whether `record` has a child thread worth fetching.
    fn wants_children(&self, _record: &Value) -> bool {
        false
    }

    /// Fetch and flatten the children of `record`.
    async fn fetch_children(&self, _query: &str, _record: &Value) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    /// Turn a child record into an item, inheriting from `parent` as needed.
    fn normalize_child(&self, _query: &str, _parent: &Item, _child: &Value) -> Result<Item> {
        bail!("{} does not produce child records", self.source())
    }
}

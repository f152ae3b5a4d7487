//! Crawl driver.
//!
//! Walks every query of an [`Ingester`], following page cursors, and feeds
//! each normalized record to the [`ContentStore`]. Source failures are
//! counted and never abort the crawl: a failed page abandons the remaining
//! pages of that query only, and a malformed record is skipped. Storage
//! failures are the one exception and propagate to the caller.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connector_hn::HnIngester;
use crate::connector_reddit::RedditIngester;
use crate::models::Item;
use crate::sqlite_store::SqliteStore;
use crate::store::ContentStore;
use crate::traits::{Ingester, PageRequest};

/// Rollup of one ingester run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub source: String,
    /// Items inserted for the first time.
    pub new: u64,
    /// Items whose identity was already stored.
    pub skipped: u64,
    /// Failed page fetches, thread fetches, and malformed records.
    pub errors: u64,
    /// Queries abandoned after a page failure.
    pub failed_queries: u64,
}

/// Run `ingester` over all its queries, storing items created at or after
/// `since`.
pub async fn crawl(
    ingester: &dyn Ingester,
    store: &dyn ContentStore,
    since: DateTime<Utc>,
    max_body_chars: usize,
) -> Result<CrawlStats> {
    let pacing = ingester.pacing();
    let mut stats = CrawlStats {
        source: ingester.source().to_string(),
        ..Default::default()
    };

    let queries = ingester.queries();
    for (idx, query) in queries.iter().enumerate() {
        if idx > 0 {
            pause(pacing.query_delay).await;
        }

        let before = stats.clone();
        let mut cursor: Option<String> = None;
        let mut fetched = 0usize;

        loop {
            let request = PageRequest {
                query: query.as_str(),
                since,
                cursor: cursor.as_deref(),
                fetched,
            };
            let page = match ingester.fetch_page(request).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        source = %stats.source,
                        query = %query,
                        error = %e,
                        "page fetch failed; abandoning query"
                    );
                    stats.errors += 1;
                    stats.failed_queries += 1;
                    break;
                }
            };
            if page.records.is_empty() {
                break;
            }
            fetched += page.records.len();

            for record in &page.records {
                store_record(ingester, store, query, record, since, max_body_chars, &mut stats)
                    .await?;
            }

            match page.next {
                Some(next) => {
                    cursor = Some(next);
                    pause(pacing.page_delay).await;
                }
                None => break,
            }
        }

        info!(
            source = %stats.source,
            query = %query,
            new = stats.new - before.new,
            skipped = stats.skipped - before.skipped,
            errors = stats.errors - before.errors,
            "query done"
        );
    }

    Ok(stats)
}

async fn store_record(
    ingester: &dyn Ingester,
    store: &dyn ContentStore,
    query: &str,
    record: &Value,
    since: DateTime<Utc>,
    max_body_chars: usize,
    stats: &mut CrawlStats,
) -> Result<()> {
    let item = match ingester.normalize(query, record) {
        Ok(item) => item.with_body_limit(max_body_chars),
        Err(e) => {
            warn!(source = %stats.source, query = %query, error = %e, "skipping malformed record");
            stats.errors += 1;
            return Ok(());
        }
    };
    if item.created_at < since {
        return Ok(());
    }
    put(store, &item, stats).await?;

    if !ingester.wants_children(record) {
        return Ok(());
    }
    pause(ingester.pacing().page_delay).await;

    let children = match ingester.fetch_children(query, record).await {
        Ok(children) => children,
        Err(e) => {
            warn!(source = %stats.source, item = %item.id, error = %e, "child fetch failed");
            stats.errors += 1;
            return Ok(());
        }
    };

    for child in &children {
        match ingester.normalize_child(query, &item, child) {
            Ok(child_item) => {
                let child_item = child_item.with_body_limit(max_body_chars);
                if child_item.created_at >= since {
                    put(store, &child_item, stats).await?;
                }
            }
            Err(e) => {
                warn!(
                    source = %stats.source,
                    parent = %item.id,
                    error = %e,
                    "skipping malformed child record"
                );
                stats.errors += 1;
            }
        }
    }

    Ok(())
}

async fn put(store: &dyn ContentStore, item: &Item, stats: &mut CrawlStats) -> Result<()> {
    match store.put_item(item).await? {
        Some(id) => {
            debug!(item = %id, "stored");
            stats.new += 1;
        }
        None => stats.skipped += 1,
    }
    Ok(())
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Build the ingesters selected by `which` (`all`, `hn`, or `reddit`).
///
/// `all` honours each source's `enabled` flag; naming a source explicitly
/// runs it regardless.
pub fn build_ingesters(config: &Config, which: &str) -> Result<Vec<Box<dyn Ingester>>> {
    let crawl = &config.crawl;
    let mut out: Vec<Box<dyn Ingester>> = Vec::new();

    match which {
        "all" => {
            if crawl.hn.enabled {
                out.push(Box::new(HnIngester::from_config(crawl)?));
            }
            if crawl.reddit.enabled {
                out.push(Box::new(RedditIngester::from_config(crawl)?));
            }
        }
        "hn" => out.push(Box::new(HnIngester::from_config(crawl)?)),
        "reddit" => out.push(Box::new(RedditIngester::from_config(crawl)?)),
        other => bail!("Unknown source: '{}'. Available: all, hn, reddit", other),
    }

    Ok(out)
}

/// Crawl the selected sources for the last `days` days and print a rollup
/// per source.
pub async fn run_crawl(config: &Config, which: &str, days: Option<i64>) -> Result<Vec<CrawlStats>> {
    let days = days.unwrap_or(config.crawl.days_back);
    if days < 1 {
        bail!("--days must be >= 1");
    }
    let ingesters = build_ingesters(config, which)?;
    let store = SqliteStore::open(config).await?;
    let since = Utc::now() - ChronoDuration::days(days);

    info!(sources = ingesters.len(), days, "starting crawl");

    let mut all = Vec::with_capacity(ingesters.len());
    for ingester in &ingesters {
        let stats = crawl(ingester.as_ref(), &store, since, config.crawl.max_body_chars).await?;

        println!("crawl {}", stats.source);
        println!("  new: {}", stats.new);
        println!("  skipped: {}", stats.skipped);
        println!("  errors: {}", stats.errors);
        println!("  failed queries: {}", stats.failed_queries);
        all.push(stats);
    }

    store.close().await;
    Ok(all)
}

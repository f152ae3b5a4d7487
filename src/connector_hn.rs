//! Hacker News connector.
//!
//! Searches stories and comments through the Algolia `search_by_date`
//! endpoint, one search term per query. The cutoff is pushed to the server
//! as a `numericFilters` clause; pages are numbered from zero and the
//! response reports `nbPages`.
//!
//! # Configuration
//!
//! ```toml
//! [crawl.hn]
//! search_terms = ["edge computing", "data pipeline"]
//! tags = "(story,comment)"
//! page_delay_ms = 500
//! query_delay_ms = 1000
//! ```

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::{CrawlConfig, HnConfig};
use crate::models::{Item, MetaValue};
use crate::traits::{Ingester, Pacing, Page, PageRequest};

pub const SOURCE: &str = "hn";

const ITEM_URL: &str = "https://news.ycombinator.com/item?id=";

pub struct HnIngester {
    client: reqwest::Client,
    config: HnConfig,
}

impl HnIngester {
    pub fn new(client: reqwest::Client, config: HnConfig) -> Self {
        Self { client, config }
    }

    pub fn from_config(crawl: &CrawlConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(crawl.timeout_secs))
            .build()?;
        Ok(Self::new(client, crawl.hn.clone()))
    }
}

#[async_trait]
impl Ingester for HnIngester {
    fn source(&self) -> &str {
        SOURCE
    }

    fn queries(&self) -> Vec<String> {
        self.config.search_terms.clone()
    }

    fn pacing(&self) -> Pacing {
        Pacing {
            page_delay: Duration::from_millis(self.config.page_delay_ms),
            query_delay: Duration::from_millis(self.config.query_delay_ms),
        }
    }

    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page> {
        let page: u64 = match request.cursor {
            Some(c) => c.parse().with_context(|| format!("bad HN page cursor '{}'", c))?,
            None => 0,
        };
        let url = format!(
            "{}/search_by_date",
            self.config.base_url.trim_end_matches('/')
        );

        let json: Value = self
            .client
            .get(&url)
            .query(&[
                ("query", request.query.to_string()),
                ("tags", self.config.tags.clone()),
                ("hitsPerPage", self.config.hits_per_page.to_string()),
                (
                    "numericFilters",
                    format!("created_at_i>{}", request.since.timestamp()),
                ),
                ("page", page.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let page_result = parse_search_page(&json, page);
        debug!(
            query = request.query,
            page,
            hits = page_result.records.len(),
            "fetched HN page"
        );
        Ok(page_result)
    }

    fn normalize(&self, query: &str, record: &Value) -> Result<Item> {
        normalize_hit(record, query)
    }
}

/// Split an Algolia response into hits and the next page cursor.
pub fn parse_search_page(json: &Value, page: u64) -> Page {
    let records = json
        .get("hits")
        .and_then(|h| h.as_array())
        .cloned()
        .unwrap_or_default();
    let nb_pages = json.get("nbPages").and_then(|n| n.as_u64()).unwrap_or(1);

    let next = if records.is_empty() || page + 1 >= nb_pages {
        None
    } else {
        Some((page + 1).to_string())
    };

    Page { records, next }
}

/// Normalize one Algolia hit (story or comment) into an [`Item`].
pub fn normalize_hit(hit: &Value, search_term: &str) -> Result<Item> {
    let object_id = id_string(hit.get("objectID")).ok_or_else(|| anyhow!("hit has no objectID"))?;
    let created_ts = hit
        .get("created_at_i")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| anyhow!("hit {} has no created_at_i", object_id))?;
    let created_at = DateTime::<Utc>::from_timestamp(created_ts, 0)
        .ok_or_else(|| anyhow!("hit {} has invalid timestamp {}", object_id, created_ts))?;

    let story_id = hit.get("story_id").filter(|v| !v.is_null());
    let is_story = story_id.is_none();

    let url = match non_empty_str(hit, "url") {
        Some(u) if is_story => u.to_string(),
        _ => format!("{}{}", ITEM_URL, object_id),
    };

    let mut item = Item::new(SOURCE, object_id, url, created_at);
    item.title = non_empty_str(hit, "title")
        .or_else(|| non_empty_str(hit, "story_title"))
        .map(str::to_string);
    item.body = non_empty_str(hit, "comment_text")
        .or_else(|| non_empty_str(hit, "story_text"))
        .map(str::to_string);
    item.author = non_empty_str(hit, "author").map(str::to_string);

    let meta = &mut item.metadata;
    meta.insert("points".into(), field(hit, "points"));
    meta.insert("num_comments".into(), field(hit, "num_comments"));
    meta.insert(
        "story_id".into(),
        story_id.map(MetaValue::from_json).unwrap_or(MetaValue::Null),
    );
    meta.insert("search_term".into(), search_term.into());
    meta.insert(
        "type".into(),
        if is_story { "story" } else { "comment" }.into(),
    );

    Ok(item)
}

fn field(record: &Value, key: &str) -> MetaValue {
    record
        .get(key)
        .map(MetaValue::from_json)
        .unwrap_or(MetaValue::Null)
}

fn non_empty_str<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn story_keeps_external_url() {
        let hit = json!({
            "objectID": "4001",
            "title": "Show HN: Edge inference without the cloud",
            "story_text": "",
            "url": "https://example.com/post",
            "author": "pg",
            "created_at_i": 1_700_000_000,
            "points": 120,
            "num_comments": 44,
            "story_id": null
        });

        let item = normalize_hit(&hit, "edge computing").unwrap();
        assert_eq!(item.id, "hn_4001");
        assert_eq!(item.url, "https://example.com/post");
        assert_eq!(item.body, None);
        assert_eq!(item.author.as_deref(), Some("pg"));
        assert_eq!(item.metadata["type"], MetaValue::Text("story".into()));
        assert_eq!(item.metadata["points"], MetaValue::Int(120));
        assert_eq!(item.metadata["story_id"], MetaValue::Null);
        assert_eq!(
            item.metadata["search_term"],
            MetaValue::Text("edge computing".into())
        );
    }

    #[test]
    fn comment_uses_story_title_and_item_link() {
        let hit = json!({
            "objectID": "4002",
            "story_title": "Ask HN: Spark is slow for us",
            "comment_text": "We moved our batch jobs closer to the data.",
            "url": "https://example.com/ignored",
            "created_at_i": 1_700_000_100,
            "story_id": 4000
        });

        let item = normalize_hit(&hit, "spark slow").unwrap();
        assert_eq!(item.title.as_deref(), Some("Ask HN: Spark is slow for us"));
        assert_eq!(
            item.body.as_deref(),
            Some("We moved our batch jobs closer to the data.")
        );
        assert_eq!(item.url, "https://news.ycombinator.com/item?id=4002");
        assert_eq!(item.metadata["type"], MetaValue::Text("comment".into()));
        assert_eq!(item.metadata["story_id"], MetaValue::Int(4000));
    }

    #[test]
    fn hit_without_identity_is_rejected() {
        let hit = json!({"title": "no id", "created_at_i": 1});
        assert!(normalize_hit(&hit, "x").is_err());

        let hit = json!({"objectID": "1"});
        assert!(normalize_hit(&hit, "x").is_err());
    }

    #[test]
    fn pagination_stops_on_last_page() {
        let json = json!({"hits": [{"objectID": "1"}], "nbPages": 3});
        assert_eq!(parse_search_page(&json, 0).next.as_deref(), Some("1"));
        assert_eq!(parse_search_page(&json, 2).next, None);

        let empty = json!({"hits": [], "nbPages": 3});
        assert_eq!(parse_search_page(&empty, 0).next, None);
    }
}

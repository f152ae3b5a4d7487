//! Reddit connector.
//!
//! Reads the public `/r/{subreddit}/new.json` listing, one subreddit per
//! query, following the `after` cursor until the configured per-subreddit
//! cap is reached. Posts with enough discussion also have their comment
//! thread fetched; the nested reply tree is flattened with an explicit
//! stack so deep threads cannot grow the call stack.
//!
//! Reddit has no server-side time filter on this endpoint, so the cutoff
//! is applied by the crawl driver after normalization.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::{CrawlConfig, RedditConfig};
use crate::models::{Item, MetaValue};
use crate::traits::{Ingester, Pacing, Page, PageRequest};

pub const SOURCE: &str = "reddit";

const PERMALINK_BASE: &str = "https://reddit.com";
const MAX_PAGE_SIZE: usize = 100;

pub struct RedditIngester {
    client: reqwest::Client,
    config: RedditConfig,
}

impl RedditIngester {
    pub fn new(client: reqwest::Client, config: RedditConfig) -> Self {
        Self { client, config }
    }

    pub fn from_config(crawl: &CrawlConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(crawl.timeout_secs))
            .user_agent(crawl.reddit.user_agent.clone())
            .build()?;
        Ok(Self::new(client, crawl.reddit.clone()))
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }
}

#[async_trait]
impl Ingester for RedditIngester {
    fn source(&self) -> &str {
        SOURCE
    }

    fn queries(&self) -> Vec<String> {
        self.config.subreddits.clone()
    }

    fn pacing(&self) -> Pacing {
        Pacing {
            page_delay: Duration::from_millis(self.config.page_delay_ms),
            query_delay: Duration::from_millis(self.config.query_delay_ms),
        }
    }

    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page> {
        let cap = self.config.posts_per_subreddit;
        let remaining = cap.saturating_sub(request.fetched);
        if remaining == 0 {
            return Ok(Page::default());
        }

        let url = format!("{}/r/{}/new.json", self.base_url(), request.query);
        let mut params = vec![("limit", remaining.min(MAX_PAGE_SIZE).to_string())];
        if let Some(after) = request.cursor {
            params.push(("after", after.to_string()));
        }

        let json: Value = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let page = parse_listing_page(&json, request.fetched, cap);
        debug!(
            subreddit = request.query,
            posts = page.records.len(),
            "fetched Reddit page"
        );
        Ok(page)
    }

    fn normalize(&self, query: &str, record: &Value) -> Result<Item> {
        normalize_post(record, query)
    }

    fn wants_children(&self, record: &Value) -> bool {
        self.config.include_comments
            && record
                .get("num_comments")
                .and_then(|n| n.as_i64())
                .unwrap_or(0)
                > self.config.comment_threshold
    }

    async fn fetch_children(&self, query: &str, record: &Value) -> Result<Vec<Value>> {
        let post_id = record
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("post has no id"))?;
        let url = format!("{}/r/{}/comments/{}.json", self.base_url(), query, post_id);

        let json: Value = self
            .client
            .get(&url)
            .query(&[
                ("limit", self.config.comment_limit.to_string()),
                ("depth", self.config.comment_depth.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // [post listing, comment listing]
        let comments = match json.as_array() {
            Some(parts) if parts.len() >= 2 => flatten_comments(&parts[1]),
            _ => Vec::new(),
        };
        debug!(subreddit = query, post_id, comments = comments.len(), "fetched thread");
        Ok(comments)
    }

    fn normalize_child(&self, query: &str, parent: &Item, child: &Value) -> Result<Item> {
        normalize_comment(child, parent, query)
    }
}

/// Extract post records and the `after` cursor from a listing response.
pub fn parse_listing_page(json: &Value, fetched: usize, cap: usize) -> Page {
    let data = json.get("data");
    let records: Vec<Value> = data
        .and_then(|d| d.get("children"))
        .and_then(|c| c.as_array())
        .map(|children| {
            children
                .iter()
                .filter_map(|c| c.get("data").cloned())
                .collect()
        })
        .unwrap_or_default();

    let after = data
        .and_then(|d| d.get("after"))
        .and_then(|a| a.as_str())
        .filter(|a| !a.is_empty());

    let next = match after {
        Some(a) if !records.is_empty() && fetched + records.len() < cap => Some(a.to_string()),
        _ => None,
    };

    Page { records, next }
}

/// Flatten a comment listing into pre-order `t1` comment records.
///
/// Non-comment children (`more` stubs and the like) are skipped along with
/// anything beneath them. Returned records have their `replies` removed.
pub fn flatten_comments(listing: &Value) -> Vec<Value> {
    let mut out = Vec::new();
    let mut stack: Vec<&Value> = listing_children(listing).iter().rev().collect();

    while let Some(child) = stack.pop() {
        if child.get("kind").and_then(|k| k.as_str()) != Some("t1") {
            continue;
        }
        let Some(comment) = child.get("data").and_then(|d| d.as_object()) else {
            continue;
        };
        out.push(Value::Object(
            comment
                .iter()
                .filter(|(k, _)| k.as_str() != "replies")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ));

        if let Some(replies) = comment.get("replies").filter(|r| r.is_object()) {
            stack.extend(listing_children(replies).iter().rev());
        }
    }

    out
}

fn listing_children(listing: &Value) -> &[Value] {
    listing
        .get("data")
        .and_then(|d| d.get("children"))
        .and_then(|c| c.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn normalize_post(post: &Value, subreddit: &str) -> Result<Item> {
    let id = required_str(post, "id")?;
    let created_at = created_utc(post, id)?;
    let url = format!("{}{}", PERMALINK_BASE, post_str(post, "permalink").unwrap_or(""));

    let mut item = Item::new(SOURCE, id, url, created_at);
    item.title = post_str(post, "title").map(str::to_string);
    item.body = post_str(post, "selftext").map(str::to_string);
    item.author = post_str(post, "author").map(str::to_string);

    let meta = &mut item.metadata;
    meta.insert("subreddit".into(), subreddit.into());
    meta.insert("score".into(), field(post, "score"));
    meta.insert("num_comments".into(), field(post, "num_comments"));
    meta.insert("upvote_ratio".into(), field(post, "upvote_ratio"));
    meta.insert("type".into(), "post".into());

    Ok(item)
}

/// Comments carry their parent's title and point back at it.
pub fn normalize_comment(comment: &Value, parent: &Item, subreddit: &str) -> Result<Item> {
    let id = required_str(comment, "id")?;
    let created_at = created_utc(comment, id)?;
    let url = format!(
        "{}{}",
        PERMALINK_BASE,
        post_str(comment, "permalink").unwrap_or("")
    );

    let mut item = Item::new(SOURCE, id, url, created_at);
    item.title = parent.title.clone();
    item.body = post_str(comment, "body").map(str::to_string);
    item.author = post_str(comment, "author").map(str::to_string);

    let meta = &mut item.metadata;
    meta.insert("subreddit".into(), subreddit.into());
    meta.insert("score".into(), field(comment, "score"));
    meta.insert("parent_id".into(), parent.source_id.clone().into());
    meta.insert("type".into(), "comment".into());

    Ok(item)
}

fn required_str<'a>(record: &'a Value, key: &str) -> Result<&'a str> {
    post_str(record, key).ok_or_else(|| anyhow!("record has no {}", key))
}

fn post_str<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

fn created_utc(record: &Value, id: &str) -> Result<DateTime<Utc>> {
    let secs = record
        .get("created_utc")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| anyhow!("record {} has no created_utc", id))?;
    DateTime::<Utc>::from_timestamp(secs as i64, 0)
        .ok_or_else(|| anyhow!("record {} has invalid created_utc {}", id, secs))
}

fn field(record: &Value, key: &str) -> MetaValue {
    record
        .get(key)
        .map(MetaValue::from_json)
        .unwrap_or(MetaValue::Null)
}

//! Core data models.
//!
//! These types flow through every stage: ingesters produce [`Item`]s, the
//! scorer turns classifier output into a [`Verdict`], the store persists it
//! as an [`Analysis`], and the aggregator reads [`Opportunity`] rows back.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar value in an item's metadata bag.
///
/// The core never interprets these; they are stored and returned verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    /// Convert a raw JSON field. Arrays and objects are kept as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => MetaValue::Null,
            serde_json::Value::Bool(b) => MetaValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => MetaValue::Int(i),
                None => MetaValue::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => MetaValue::Text(s.clone()),
            other => MetaValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Text(s)
    }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self {
        MetaValue::Int(i)
    }
}

/// Source-specific extension fields, keyed by name.
pub type Metadata = BTreeMap<String, MetaValue>;

/// One ingested post or comment. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// `"{source}_{source_id}"`.
    pub id: String,
    pub source: String,
    pub source_id: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: String,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: Metadata,
}

impl Item {
    pub fn new(
        source: impl Into<String>,
        source_id: impl Into<String>,
        url: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let source = source.into();
        let source_id = source_id.into();
        Self {
            id: Item::id_for(&source, &source_id),
            source,
            source_id,
            title: None,
            body: None,
            url: url.into(),
            author: None,
            created_at,
            metadata: Metadata::new(),
        }
    }

    pub fn id_for(source: &str, source_id: &str) -> String {
        format!("{}_{}", source, source_id)
    }

    /// Cap the body at `max_chars` characters. Empty bodies become `None`.
    pub fn with_body_limit(mut self, max_chars: usize) -> Self {
        self.body = self
            .body
            .take()
            .filter(|b| !b.trim().is_empty())
            .map(|b| truncate_chars(&b, max_chars).to_string());
        self
    }

    /// Title and body joined by a space, trimmed.
    pub fn combined_text(&self) -> String {
        format!(
            "{} {}",
            self.title.as_deref().unwrap_or(""),
            self.body.as_deref().unwrap_or("")
        )
        .trim()
        .to_string()
    }
}

/// Analyses scoring at least this fit count as high-fit.
pub const HIGH_FIT: u8 = 7;

/// Validated classifier output for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub fit_score: u8,
    pub urgency_score: u8,
    pub use_case: String,
    pub problem_summary: String,
    pub reasoning: String,
}

/// A persisted verdict. At most one exists per item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub id: i64,
    pub item_id: String,
    pub fit_score: u8,
    pub urgency_score: u8,
    pub use_case: String,
    pub reasoning: String,
    pub problem_summary: String,
    pub model_used: String,
    pub analyzed_at: DateTime<Utc>,
}

/// An item joined with its analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Opportunity {
    pub item: Item,
    pub analysis: Analysis,
}

/// Filters for [`crate::store::ContentStore::query_opportunities`].
#[derive(Debug, Clone)]
pub struct OpportunityQuery {
    pub min_fit: u8,
    pub min_urgency: u8,
    pub use_case: Option<String>,
    /// Lower bound on the item's creation time.
    pub since: DateTime<Utc>,
    pub limit: i64,
}

/// Analyses of one category on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryDayCount {
    pub use_case: String,
    pub day: NaiveDate,
    pub count: i64,
    pub avg_fit: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_items: i64,
    pub total_analyzed: i64,
    /// Analyses with fit >= 7.
    pub high_fit: i64,
    /// Ordered by count, descending.
    pub by_source: Vec<(String, i64)>,
    /// Ordered by count, descending.
    pub by_category: Vec<(String, i64)>,
}

/// Audit record of one generated digest.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestSnapshot {
    pub generated_at: DateTime<Utc>,
    pub content: String,
    pub opportunities_count: i64,
    pub patterns: Vec<String>,
}

/// Longest prefix of `s` holding at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

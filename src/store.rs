//! Content store abstraction.
//!
//! The [`ContentStore`] trait is the contract every pipeline stage talks
//! to. Duplicate writes are not errors: `put_item` and `put_analysis`
//! return `Ok(None)` when the uniqueness constraint rejects the row, and
//! reserve `Err` for genuine storage failures.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`put_item`](ContentStore::put_item) | Insert an item unless its identity exists |
//! | [`put_analysis`](ContentStore::put_analysis) | Insert the single analysis for an item |
//! | [`unanalyzed_items`](ContentStore::unanalyzed_items) | Items still waiting for a verdict |
//! | [`query_opportunities`](ContentStore::query_opportunities) | Filtered, ranked item + analysis rows |
//! | [`analyzed_since`](ContentStore::analyzed_since) | Analysed items created after a bound |
//! | [`category_counts`](ContentStore::category_counts) | Per-category, per-day analysis counts |
//! | [`summary_stats`](ContentStore::summary_stats) | Whole-archive totals |
//! | [`put_digest`](ContentStore::put_digest) | Append a digest snapshot |

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    CategoryDayCount, DigestSnapshot, Item, Opportunity, OpportunityQuery, SummaryStats, Verdict,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("metadata encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert `item` iff its `(source, source_id)` is unseen.
    ///
    /// Returns the item id on insert and `None` on duplicate.
    async fn put_item(&self, item: &Item) -> StoreResult<Option<String>>;

    /// Insert the analysis for `item_id` iff none exists yet.
    ///
    /// Returns the new row id, or `None` if the item was already analysed.
    async fn put_analysis(
        &self,
        item_id: &str,
        verdict: &Verdict,
        model_used: &str,
    ) -> StoreResult<Option<i64>>;

    /// Items without an analysis, newest first.
    async fn unanalyzed_items(&self, limit: i64) -> StoreResult<Vec<Item>>;

    /// Items joined with their analysis, ordered by fit then urgency, descending.
    async fn query_opportunities(&self, query: &OpportunityQuery) -> StoreResult<Vec<Opportunity>>;

    /// Every analysed item created at or after `since`.
    async fn analyzed_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Opportunity>>;

    /// Analysis counts grouped by category and calendar day of analysis.
    async fn category_counts(&self, since: DateTime<Utc>) -> StoreResult<Vec<CategoryDayCount>>;

    async fn summary_stats(&self) -> StoreResult<SummaryStats>;

    async fn put_digest(&self, snapshot: &DigestSnapshot) -> StoreResult<i64>;
}

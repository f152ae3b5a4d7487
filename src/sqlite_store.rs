//! SQLite-backed [`ContentStore`] implementation.
//!
//! Dedup is delegated entirely to the schema: inserts are attempted
//! unconditionally and a unique-violation error is translated into the
//! `Ok(None)` outcome. Any other database error is returned as-is.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{
    Analysis, CategoryDayCount, DigestSnapshot, Item, Metadata, Opportunity, OpportunityQuery,
    SummaryStats, Verdict, HIGH_FIT,
};
use crate::store::{ContentStore, StoreError, StoreResult};

const ITEM_COLUMNS: &str =
    "i.id, i.source, i.source_id, i.title, i.body, i.url, i.author, i.created_at, i.metadata_json";

const ANALYSIS_COLUMNS: &str = "a.id AS analysis_id, a.fit_score, a.urgency_score, a.use_case, \
     a.reasoning, a.problem_summary, a.model_used, a.analyzed_at";

/// SQLite implementation of the [`ContentStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn ts_to_datetime(ts: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", ts)))
}

fn score_from_db(v: i64) -> u8 {
    v.clamp(0, 10) as u8
}

fn item_from_row(row: &SqliteRow) -> StoreResult<Item> {
    let metadata_json: String = row.try_get("metadata_json")?;
    let metadata: Metadata = serde_json::from_str(&metadata_json)?;

    Ok(Item {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        source_id: row.try_get("source_id")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        url: row.try_get("url")?,
        author: row.try_get("author")?,
        created_at: ts_to_datetime(row.try_get("created_at")?)?,
        metadata,
    })
}

fn opportunity_from_row(row: &SqliteRow) -> StoreResult<Opportunity> {
    let item = item_from_row(row)?;
    let analysis = Analysis {
        id: row.try_get("analysis_id")?,
        item_id: item.id.clone(),
        fit_score: score_from_db(row.try_get("fit_score")?),
        urgency_score: score_from_db(row.try_get("urgency_score")?),
        use_case: row.try_get("use_case")?,
        reasoning: row.try_get("reasoning")?,
        problem_summary: row.try_get("problem_summary")?,
        model_used: row.try_get("model_used")?,
        analyzed_at: ts_to_datetime(row.try_get("analyzed_at")?)?,
    };
    Ok(Opportunity { item, analysis })
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn put_item(&self, item: &Item) -> StoreResult<Option<String>> {
        let metadata_json = serde_json::to_string(&item.metadata)?;

        let result = sqlx::query(
            r#"
            INSERT INTO items (id, source, source_id, title, body, url, author,
                               created_at, ingested_at, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.source)
        .bind(&item.source_id)
        .bind(&item.title)
        .bind(&item.body)
        .bind(&item.url)
        .bind(&item.author)
        .bind(item.created_at.timestamp())
        .bind(Utc::now().timestamp())
        .bind(&metadata_json)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(Some(item.id.clone())),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_analysis(
        &self,
        item_id: &str,
        verdict: &Verdict,
        model_used: &str,
    ) -> StoreResult<Option<i64>> {
        let result = sqlx::query(
            r#"
            INSERT INTO analysis (item_id, fit_score, urgency_score, use_case,
                                  reasoning, problem_summary, model_used, analyzed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item_id)
        .bind(i64::from(verdict.fit_score.min(10)))
        .bind(i64::from(verdict.urgency_score.min(10)))
        .bind(&verdict.use_case)
        .bind(&verdict.reasoning)
        .bind(&verdict.problem_summary)
        .bind(model_used)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(Some(done.last_insert_rowid())),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn unanalyzed_items(&self, limit: i64) -> StoreResult<Vec<Item>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM items i
            LEFT JOIN analysis a ON a.item_id = i.id
            WHERE a.id IS NULL
            ORDER BY i.created_at DESC
            LIMIT ?
            "#,
            ITEM_COLUMNS
        );

        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn query_opportunities(&self, query: &OpportunityQuery) -> StoreResult<Vec<Opportunity>> {
        let mut sql = format!(
            r#"
            SELECT {}, {}
            FROM items i
            JOIN analysis a ON a.item_id = i.id
            WHERE a.fit_score >= ?
              AND a.urgency_score >= ?
              AND i.created_at >= ?
            "#,
            ITEM_COLUMNS, ANALYSIS_COLUMNS
        );
        if query.use_case.is_some() {
            sql.push_str(" AND a.use_case = ?");
        }
        sql.push_str(" ORDER BY a.fit_score DESC, a.urgency_score DESC, i.created_at DESC LIMIT ?");

        let mut q = sqlx::query(&sql)
            .bind(i64::from(query.min_fit))
            .bind(i64::from(query.min_urgency))
            .bind(query.since.timestamp());
        if let Some(ref use_case) = query.use_case {
            q = q.bind(use_case);
        }
        let rows = q.bind(query.limit).fetch_all(&self.pool).await?;

        rows.iter().map(opportunity_from_row).collect()
    }

    async fn analyzed_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Opportunity>> {
        let sql = format!(
            r#"
            SELECT {}, {}
            FROM items i
            JOIN analysis a ON a.item_id = i.id
            WHERE i.created_at >= ?
            ORDER BY a.fit_score DESC, i.created_at DESC
            "#,
            ITEM_COLUMNS, ANALYSIS_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(since.timestamp())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(opportunity_from_row).collect()
    }

    async fn category_counts(&self, since: DateTime<Utc>) -> StoreResult<Vec<CategoryDayCount>> {
        let rows = sqlx::query(
            r#"
            SELECT use_case,
                   date(analyzed_at, 'unixepoch') AS day,
                   COUNT(*) AS count,
                   AVG(fit_score) AS avg_fit
            FROM analysis
            WHERE analyzed_at >= ?
            GROUP BY use_case, day
            ORDER BY day DESC, count DESC
            "#,
        )
        .bind(since.timestamp())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let day: String = row.try_get("day")?;
                let day = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                    .map_err(|e| StoreError::Corrupt(format!("bad day '{}': {}", day, e)))?;
                Ok(CategoryDayCount {
                    use_case: row.try_get("use_case")?,
                    day,
                    count: row.try_get("count")?,
                    avg_fit: row.try_get("avg_fit")?,
                })
            })
            .collect()
    }

    async fn summary_stats(&self) -> StoreResult<SummaryStats> {
        let total_items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await?;

        let total_analyzed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analysis")
            .fetch_one(&self.pool)
            .await?;

        let high_fit: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analysis WHERE fit_score >= ?")
            .bind(HIGH_FIT as i64)
            .fetch_one(&self.pool)
            .await?;

        let by_source = sqlx::query(
            "SELECT source, COUNT(*) AS n FROM items GROUP BY source ORDER BY n DESC, source",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| Ok((row.try_get("source")?, row.try_get("n")?)))
        .collect::<StoreResult<Vec<(String, i64)>>>()?;

        let by_category = sqlx::query(
            "SELECT use_case, COUNT(*) AS n FROM analysis \
             GROUP BY use_case ORDER BY n DESC, use_case",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| Ok((row.try_get("use_case")?, row.try_get("n")?)))
        .collect::<StoreResult<Vec<(String, i64)>>>()?;

        Ok(SummaryStats {
            total_items,
            total_analyzed,
            high_fit,
            by_source,
            by_category,
        })
    }

    async fn put_digest(&self, snapshot: &DigestSnapshot) -> StoreResult<i64> {
        let patterns_json = serde_json::to_string(&snapshot.patterns)?;

        let done = sqlx::query(
            r#"
            INSERT INTO digests (digest_date, generated_at, content,
                                 opportunities_count, patterns_json)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.generated_at.date_naive().to_string())
        .bind(snapshot.generated_at.timestamp())
        .bind(&snapshot.content)
        .bind(snapshot.opportunities_count)
        .bind(&patterns_json)
        .execute(&self.pool)
        .await?;

        Ok(done.last_insert_rowid())
    }
}

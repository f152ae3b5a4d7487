//! End-to-end pipeline tests against a real SQLite store, with in-test
//! ingester and classifier implementations standing in for the network.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration as StdDuration;
use tempfile::TempDir;

use gtm_signals::analysis::Scorer;
use gtm_signals::classifier::Classifier;
use gtm_signals::config::{AnalysisConfig, Config, DigestConfig};
use gtm_signals::digest::{build_digest, render_markdown};
use gtm_signals::ingest::crawl;
use gtm_signals::models::{Item, OpportunityQuery, Verdict};
use gtm_signals::sqlite_store::SqliteStore;
use gtm_signals::store::ContentStore;
use gtm_signals::traits::{Ingester, Pacing, Page, PageRequest};

async fn open_store(tmp: &TempDir) -> SqliteStore {
    let mut config = Config::minimal();
    config.db.path = tmp.path().join("pipeline.sqlite");
    SqliteStore::open(&config).await.unwrap()
}

/// Serves a fixed thread per query; the query "outage" always fails.
struct ForumIngester {
    queries: Vec<String>,
}

#[async_trait]
impl Ingester for ForumIngester {
    fn source(&self) -> &str {
        "forum"
    }

    fn queries(&self) -> Vec<String> {
        self.queries.clone()
    }

    fn pacing(&self) -> Pacing {
        Pacing::default()
    }

    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page> {
        if request.query == "outage" {
            bail!("connection reset by peer");
        }
        let now = Utc::now().timestamp();
        Ok(Page {
            records: vec![
                json!({
                    "id": format!("{}-post", request.query),
                    "ts": now,
                    "replies": 12,
                    "title": "Our nightly Spark jobs keep blowing the budget",
                    "text": "We move terabytes from factories to the cloud just to run a filter."
                }),
                json!({
                    "id": "crosspost",
                    "ts": now,
                    "replies": 0,
                    "title": "Crosspost",
                    "text": "same everywhere"
                }),
            ],
            next: None,
        })
    }

    fn normalize(&self, _query: &str, record: &Value) -> Result<Item> {
        let id = record["id"].as_str().ok_or_else(|| anyhow!("missing id"))?;
        let ts = record["ts"].as_i64().ok_or_else(|| anyhow!("missing ts"))?;
        let created = chrono::DateTime::from_timestamp(ts, 0).ok_or_else(|| anyhow!("bad ts"))?;
        let mut item = Item::new("forum", id, format!("https://forum.example/{}", id), created);
        item.title = record["title"].as_str().map(str::to_string);
        item.body = record["text"].as_str().map(str::to_string);
        Ok(item)
    }

    fn wants_children(&self, record: &Value) -> bool {
        record["replies"].as_i64().unwrap_or(0) > 5
    }

    async fn fetch_children(&self, _query: &str, record: &Value) -> Result<Vec<Value>> {
        let parent = record["id"].as_str().unwrap_or_default();
        Ok(vec![
            json!({
                "id": format!("{}-r1", parent),
                "text": "Same here, egress is most of our bill."
            }),
            json!({"text": "reply without an id"}),
        ])
    }

    fn normalize_child(&self, _query: &str, parent: &Item, child: &Value) -> Result<Item> {
        let id = child["id"].as_str().ok_or_else(|| anyhow!("missing id"))?;
        let mut item = Item::new("forum", id, parent.url.clone(), parent.created_at);
        item.title = parent.title.clone();
        item.body = child["text"].as_str().map(str::to_string);
        item.metadata.insert("parent_id".into(), parent.source_id.clone().into());
        Ok(item)
    }
}

/// Replays canned responses in order, then fails.
struct ScriptedClassifier {
    responses: Mutex<VecDeque<Result<String, String>>>,
}

impl ScriptedClassifier {
    fn new(responses: Vec<Result<&str, &str>>) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    fn model_name(&self) -> &str {
        "scripted-1"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(e)) => Err(anyhow!(e)),
            None => bail!("script exhausted"),
        }
    }
}

fn stored_item(id: &str, title: &str, body: Option<&str>, age_hours: i64) -> Item {
    let mut item = Item::new(
        "hn",
        id,
        format!("https://news.ycombinator.com/item?id={}", id),
        Utc::now() - Duration::hours(age_hours),
    );
    item.title = Some(title.to_string());
    item.body = body.map(str::to_string);
    item
}

#[tokio::test]
async fn crawl_dedups_and_tolerates_a_failed_query() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let ingester = ForumIngester {
        queries: vec!["mlops".into(), "outage".into(), "devops".into()],
    };
    let since = Utc::now() - Duration::days(1);

    let stats = crawl(&ingester, &store, since, 10_000).await.unwrap();
    // mlops-post, mlops-post-r1, crosspost, devops-post, devops-post-r1
    assert_eq!(stats.new, 5);
    // crosspost seen again under devops
    assert_eq!(stats.skipped, 1);
    // failed page + two id-less replies
    assert_eq!(stats.errors, 3);
    assert_eq!(stats.failed_queries, 1);

    let again = crawl(&ingester, &store, since, 10_000).await.unwrap();
    assert_eq!(again.new, 0);
    assert_eq!(again.skipped, 6);
    assert_eq!(store.summary_stats().await.unwrap().total_items, 5);

    let reply = store
        .unanalyzed_items(10)
        .await
        .unwrap()
        .into_iter()
        .find(|i| i.source_id == "mlops-post-r1")
        .unwrap();
    assert_eq!(
        reply.title.as_deref(),
        Some("Our nightly Spark jobs keep blowing the budget")
    );
}

#[tokio::test]
async fn batch_scores_clamps_skips_and_counts() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    // Newest first: a, b, c, short, d
    let long_body = Some("We run inference on 300 edge boxes and shipping frames costs a fortune.");
    store.put_item(&stored_item("a", "Edge inference costs", long_body, 1)).await.unwrap();
    store.put_item(&stored_item("b", "Airflow at scale", long_body, 2)).await.unwrap();
    store.put_item(&stored_item("c", "Sensor data", long_body, 3)).await.unwrap();
    store.put_item(&stored_item("short", "Help?", None, 4)).await.unwrap();
    store.put_item(&stored_item("d", "GPU queue", long_body, 5)).await.unwrap();

    let classifier = ScriptedClassifier::new(vec![
        Ok(concat!(
            r#"Here you go: {"fit_score": 15, "urgency_score": -2, "#,
            r#""use_case": "ml_inference", "reasoning": "edge {inference}"}"#
        )),
        Ok(r#"{"fit_score": "6", "urgency_score": 3.4, "use_case": "made_up"}"#),
        Err("HTTP 529 overloaded"),
        Ok("I'd rather not say."),
    ]);
    let scorer = Scorer::new(Box::new(classifier), &AnalysisConfig::default());

    let stats = scorer.run_batch(&store, 10, StdDuration::ZERO).await.unwrap();
    assert_eq!(stats.analyzed, 2);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.errors, 2);
    assert_eq!(stats.high_fit, 1);

    let opps = store
        .query_opportunities(&OpportunityQuery {
            min_fit: 0,
            min_urgency: 0,
            use_case: None,
            since: Utc::now() - Duration::days(1),
            limit: 10,
        })
        .await
        .unwrap();
    assert_eq!(opps.len(), 2);
    assert_eq!(opps[0].item.source_id, "a");
    assert_eq!(opps[0].analysis.fit_score, 10);
    assert_eq!(opps[0].analysis.urgency_score, 0);
    assert_eq!(opps[0].analysis.model_used, "scripted-1");
    assert_eq!(opps[1].analysis.use_case, "other");
    assert_eq!(opps[1].analysis.urgency_score, 3);

    // Failed and short items stay pending.
    let pending: Vec<String> = store
        .unanalyzed_items(10)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.source_id)
        .collect();
    assert_eq!(pending, vec!["c", "short", "d"]);
}

#[tokio::test]
async fn second_verdict_for_an_item_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let item = stored_item("x", "Title", Some("body"), 1);
    store.put_item(&item).await.unwrap();

    let verdict = Verdict {
        fit_score: 8,
        urgency_score: 6,
        use_case: "data_pipelines".into(),
        problem_summary: "first".into(),
        reasoning: String::new(),
    };
    assert!(store.put_analysis(&item.id, &verdict, "m1").await.unwrap().is_some());

    let rescored = Verdict {
        fit_score: 1,
        problem_summary: "second".into(),
        ..verdict
    };
    assert!(store.put_analysis(&item.id, &rescored, "m2").await.unwrap().is_none());

    let stats = store.summary_stats().await.unwrap();
    assert_eq!(stats.total_analyzed, 1);
    assert_eq!(stats.high_fit, 1);
}

#[tokio::test]
async fn digest_combines_store_views() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    for i in 0..4 {
        let item = stored_item(&format!("h{}", i), "Hybrid cloud scheduling", Some("body"), 2);
        store.put_item(&item).await.unwrap();
        let verdict = Verdict {
            fit_score: 7 + (i % 2) as u8,
            urgency_score: 5,
            use_case: "hybrid_cloud".into(),
            problem_summary: format!("problem {}", i),
            reasoning: String::new(),
        };
        store.put_analysis(&item.id, &verdict, "m").await.unwrap();
    }

    let config = DigestConfig::default();
    let digest = build_digest(&store, &config, 1, Utc::now()).await.unwrap();

    assert_eq!(digest.opportunities.len(), 4);
    assert_eq!(digest.opportunities[0].analysis.fit_score, 8);
    assert_eq!(digest.categories[0].use_case, "hybrid_cloud");
    assert_eq!(digest.categories[0].count, 4);
    // No history for this category, and 4 recent analyses.
    assert_eq!(digest.patterns.len(), 1);
    assert_eq!(digest.patterns[0].use_case(), "hybrid_cloud");

    let md = render_markdown(&digest);
    assert!(md.contains("hybrid_cloud is a new emerging category"));
    assert!(md.contains("## Signals by Period"));

    let id = store.put_digest(&digest.snapshot(md)).await.unwrap();
    assert!(id > 0);
}

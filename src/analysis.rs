//! Relevance scoring.
//!
//! The [`Scorer`] turns an [`Item`] into a prompt, hands it to a
//! [`Classifier`], and validates whatever comes back into a [`Verdict`].
//! Classifier output is untrusted: the verdict object is located with a
//! bounded balanced-brace scan (so surrounding prose and braces inside
//! string values are tolerated), scores are clamped into 0–10, and unknown
//! categories collapse to `other`.
//!
//! Any classifier or parse failure yields `None`; the item simply stays
//! unanalysed and is picked up by the next run.

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::classifier::{create_classifier, Classifier};
use crate::config::{AnalysisConfig, Config};
use crate::models::{truncate_chars, Item, Verdict, HIGH_FIT};
use crate::sqlite_store::SqliteStore;
use crate::store::ContentStore;

/// Fallback category for anything outside the taxonomy.
pub const OTHER_CATEGORY: &str = "other";

/// Only this much of a response is searched for the verdict object.
const MAX_SCAN_BYTES: usize = 64 * 1024;
/// Opening braces tried before giving up.
const MAX_CANDIDATES: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisStats {
    pub analyzed: u64,
    /// Too little text to be worth a classifier call.
    pub skipped: u64,
    pub errors: u64,
    pub high_fit: u64,
    /// Verdicts rejected because the item was analysed concurrently.
    pub duplicates: u64,
}

pub struct Scorer {
    classifier: Box<dyn Classifier>,
    product_context: String,
    categories: BTreeMap<String, String>,
    min_content_chars: usize,
    max_prompt_body_chars: usize,
}

impl Scorer {
    pub fn new(classifier: Box<dyn Classifier>, config: &AnalysisConfig) -> Self {
        Self {
            classifier,
            product_context: config.product_context.trim().to_string(),
            categories: config.categories.clone(),
            min_content_chars: config.min_content_chars,
            max_prompt_body_chars: config.max_prompt_body_chars,
        }
    }

    pub fn model_name(&self) -> &str {
        self.classifier.model_name()
    }

    /// Whether `item` carries enough text to be scored.
    pub fn is_scorable(&self, item: &Item) -> bool {
        item.combined_text().chars().count() >= self.min_content_chars
    }

    /// Build the classifier request for `item`. Same item, same prompt.
    pub fn build_prompt(&self, item: &Item) -> String {
        let title = item
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("(no title)");
        let body = item
            .body
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .map(|b| truncate_chars(b, self.max_prompt_body_chars))
            .unwrap_or("(no body)");

        let mut categories = String::new();
        for (name, description) in &self.categories {
            categories.push_str(&format!("- {}: {}\n", name, description));
        }

        let mut prompt = String::from(
            "You identify sales opportunities: people describing a problem that the product \
             below could solve.\n\n",
        );
        if !self.product_context.is_empty() {
            prompt.push_str(&self.product_context);
            prompt.push_str("\n\n");
        }
        prompt.push_str(&format!(
            r#"Problem categories:
{categories}
Decide whether the author of the following post or comment has such a problem.

POST TITLE: {title}
POST BODY: {body}
SOURCE: {source}
URL: {url}

Respond with a JSON object:
{{
  "fit_score": <0-10, how closely the problem matches the product>,
  "urgency_score": <0-10, how soon the author needs a solution>,
  "use_case": "<one category name from the list, or '{other}' if none fit>",
  "problem_summary": "<one or two sentences describing the problem>",
  "reasoning": "<short justification of the scores>"
}}

Fit: 0-3 unrelated, 4-6 loosely related, 7-8 clear fit, 9-10 asking for exactly this.
Urgency: 0-3 exploring, 4-6 real but not pressing, 7-8 active project, 9-10 production pain.

Respond ONLY with the JSON object."#,
            categories = categories,
            title = title,
            body = body,
            source = item.source,
            url = item.url,
            other = OTHER_CATEGORY,
        ));
        prompt
    }

    /// Score one item. `None` on any classifier or parse failure.
    pub async fn score(&self, item: &Item) -> Option<Verdict> {
        let prompt = self.build_prompt(item);
        let response = match self.classifier.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(item = %item.id, error = %format!("{:#}", e), "classifier call failed");
                return None;
            }
        };

        match parse_verdict(&response, &self.categories) {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                let preview = truncate_chars(&response, 200);
                warn!(
                    item = %item.id,
                    error = %e,
                    response = preview,
                    "unparsable classifier response"
                );
                None
            }
        }
    }

    /// Score up to `limit` unanalysed items, pausing `delay` between
    /// classifier calls.
    pub async fn run_batch(
        &self,
        store: &dyn ContentStore,
        limit: i64,
        delay: Duration,
    ) -> Result<AnalysisStats> {
        let items = store.unanalyzed_items(limit).await?;
        let mut stats = AnalysisStats::default();
        let mut calls = 0usize;

        info!(pending = items.len(), model = self.model_name(), "analysing batch");

        for item in &items {
            if !self.is_scorable(item) {
                stats.skipped += 1;
                continue;
            }

            if calls > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            calls += 1;

            let Some(verdict) = self.score(item).await else {
                stats.errors += 1;
                continue;
            };

            match store
                .put_analysis(&item.id, &verdict, self.model_name())
                .await?
            {
                Some(_) => {
                    debug!(
                        item = %item.id,
                        fit = verdict.fit_score,
                        use_case = %verdict.use_case,
                        "scored"
                    );
                    stats.analyzed += 1;
                    if verdict.fit_score >= HIGH_FIT {
                        stats.high_fit += 1;
                    }
                }
                None => {
                    warn!(item = %item.id, "item already analysed; verdict discarded");
                    stats.duplicates += 1;
                }
            }
        }

        info!(
            analyzed = stats.analyzed,
            skipped = stats.skipped,
            errors = stats.errors,
            high_fit = stats.high_fit,
            "batch done"
        );
        Ok(stats)
    }
}

/// Find the first balanced `{...}` in `text` that parses as a JSON object.
///
/// Braces inside string literals are ignored. Only the first
/// [`MAX_SCAN_BYTES`] are examined and at most [`MAX_CANDIDATES`] opening
/// braces are tried.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let bytes = text.as_bytes();
    let window = &bytes[..bytes.len().min(MAX_SCAN_BYTES)];

    let starts = window
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'{')
        .map(|(i, _)| i)
        .take(MAX_CANDIDATES);

    for start in starts {
        let Some(end) = matching_brace(window, start) else {
            continue;
        };
        // Both ends sit on ASCII braces, so the slice is on char boundaries.
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text[start..=end]) {
            return Some(map);
        }
    }
    None
}

fn matching_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Validate a classifier response into a [`Verdict`].
///
/// `fit_score` and `urgency_score` are required; text fields default to
/// empty.
pub fn parse_verdict(text: &str, categories: &BTreeMap<String, String>) -> Result<Verdict> {
    let obj = extract_json_object(text).ok_or_else(|| anyhow!("no JSON object in response"))?;

    let fit_score = required_score(&obj, "fit_score")?;
    let urgency_score = required_score(&obj, "urgency_score")?;

    let text_field = |key: &str| {
        obj.get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    Ok(Verdict {
        fit_score,
        urgency_score,
        use_case: normalize_category(&text_field("use_case"), categories),
        problem_summary: text_field("problem_summary"),
        reasoning: text_field("reasoning"),
    })
}

fn required_score(obj: &Map<String, Value>, key: &str) -> Result<u8> {
    let value = obj.get(key).ok_or_else(|| anyhow!("missing {}", key))?;
    let raw = score_value(value).ok_or_else(|| anyhow!("{} is not a number: {}", key, value))?;
    Ok(raw.clamp(0, 10) as u8)
}

/// Integers, floats (rounded), and numeric strings.
fn score_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.round() as i64)
            })
        }
        _ => None,
    }
}

/// Map a returned category onto the taxonomy, or [`OTHER_CATEGORY`].
pub fn normalize_category(raw: &str, categories: &BTreeMap<String, String>) -> String {
    let raw = raw.trim();
    categories
        .keys()
        .find(|name| name.eq_ignore_ascii_case(raw))
        .cloned()
        .unwrap_or_else(|| OTHER_CATEGORY.to_string())
}

/// `gtm analyze`: score a batch of pending items.
///
/// The classifier is constructed before the database is touched, so a
/// missing credential fails without side effects.
pub async fn run_analyze(
    config: &Config,
    limit: Option<usize>,
    delay_ms: Option<u64>,
) -> Result<AnalysisStats> {
    let classifier = create_classifier(&config.analysis)?;
    let scorer = Scorer::new(classifier, &config.analysis);

    let limit = limit.unwrap_or(config.analysis.batch_size);
    let delay = Duration::from_millis(delay_ms.unwrap_or(config.analysis.delay_ms));

    let store = SqliteStore::open(config).await?;
    let stats = scorer.run_batch(&store, limit as i64, delay).await?;
    store.close().await;

    println!("analyze ({})", scorer.model_name());
    println!("  analyzed: {}", stats.analyzed);
    println!("  skipped (too short): {}", stats.skipped);
    println!("  errors: {}", stats.errors);
    println!("  high fit: {}", stats.high_fit);
    if stats.duplicates > 0 {
        println!("  already analyzed: {}", stats.duplicates);
    }
    println!("ok");

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    fn categories() -> BTreeMap<String, String> {
        AnalysisConfig::default().categories
    }

    struct Canned(Result<String, String>);

    #[async_trait]
    impl Classifier for Canned {
        fn model_name(&self) -> &str {
            "canned"
        }
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.0.clone().map_err(|e| anyhow!(e))
        }
    }

    fn scorer(response: Result<&str, &str>) -> Scorer {
        let canned = Canned(response.map(str::to_string).map_err(str::to_string));
        Scorer::new(Box::new(canned), &AnalysisConfig::default())
    }

    fn item() -> Item {
        let mut item = Item::new("hn", "1", "https://news.ycombinator.com/item?id=1", Utc::now());
        item.title = Some("Inference on 400 retail stores".to_string());
        item.body = Some("Shipping camera frames to the cloud costs us a fortune.".to_string());
        item
    }

    #[test]
    fn extracts_object_from_surrounding_prose() {
        let text = "Sure! Here you go:\n{\"fit_score\": 8, \"urgency_score\": 5}\nHope that helps.";
        let obj = extract_json_object(text).unwrap();
        assert_eq!(obj["fit_score"], 8);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_extraction() {
        let text = concat!(
            r#"{"fit_score": 7, "urgency_score": 4, "#,
            r#""reasoning": "they wrote `fn main() {` and \"}\" in a snippet"} trailing }"#
        );
        let obj = extract_json_object(text).unwrap();
        assert_eq!(obj["urgency_score"], 4);
        assert!(obj["reasoning"].as_str().unwrap().contains("fn main() {"));
    }

    #[test]
    fn skips_invalid_candidates() {
        let text = "Scores in {braces} look like {\"fit_score\": 3, \"urgency_score\": 2}";
        let obj = extract_json_object(text).unwrap();
        assert_eq!(obj["fit_score"], 3);

        assert!(extract_json_object("no object here").is_none());
        assert!(extract_json_object("{\"unterminated\": 1").is_none());
    }

    #[test]
    fn scores_are_clamped() {
        let v = parse_verdict(
            r#"{"fit_score": 15, "urgency_score": -2, "use_case": "ml_inference"}"#,
            &categories(),
        )
        .unwrap();
        assert_eq!(v.fit_score, 10);
        assert_eq!(v.urgency_score, 0);
        assert_eq!(v.use_case, "ml_inference");
        assert_eq!(v.reasoning, "");
    }

    #[test]
    fn scores_accept_floats_and_strings() {
        let v =
            parse_verdict(r#"{"fit_score": 6.6, "urgency_score": "4"}"#, &categories()).unwrap();
        assert_eq!((v.fit_score, v.urgency_score), (7, 4));
    }

    #[test]
    fn missing_or_bad_scores_are_rejected() {
        assert!(parse_verdict(r#"{"urgency_score": 4}"#, &categories()).is_err());
        let bad = r#"{"fit_score": "high", "urgency_score": 4}"#;
        assert!(parse_verdict(bad, &categories()).is_err());
    }

    #[test]
    fn unknown_category_becomes_other() {
        let v = parse_verdict(
            r#"{"fit_score": 5, "urgency_score": 5, "use_case": "quantum_stuff"}"#,
            &categories(),
        )
        .unwrap();
        assert_eq!(v.use_case, OTHER_CATEGORY);
        assert_eq!(normalize_category(" Data_Pipelines ", &categories()), "data_pipelines");
    }

    #[test]
    fn prompt_is_deterministic_and_caps_body() {
        let s = scorer(Ok("{}"));
        let mut long = item();
        long.body = Some("y".repeat(5000));
        let a = s.build_prompt(&long);
        assert_eq!(a, s.build_prompt(&long));
        assert!(a.contains(&"y".repeat(3000)));
        assert!(!a.contains(&"y".repeat(3001)));
        assert!(a.contains("- workflow_orchestration: "));
    }

    #[test]
    fn prompt_marks_missing_fields() {
        let s = scorer(Ok("{}"));
        let bare = Item::new("reddit", "x", "https://reddit.com/r/aws/x", Utc::now());
        let p = s.build_prompt(&bare);
        assert!(p.contains("POST TITLE: (no title)"));
        assert!(p.contains("POST BODY: (no body)"));
        assert!(p.contains("SOURCE: reddit"));
    }

    #[tokio::test]
    async fn failures_yield_none() {
        assert!(scorer(Err("timeout")).score(&item()).await.is_none());
        assert!(scorer(Ok("I cannot help with that.")).score(&item()).await.is_none());

        let v = scorer(Ok(r#"{"fit_score": 9, "urgency_score": 8, "use_case": "iot_edge"}"#))
            .score(&item())
            .await
            .unwrap();
        assert_eq!(v.fit_score, 9);
    }

    #[test]
    fn short_items_are_not_scorable() {
        let s = scorer(Ok("{}"));
        let mut short = Item::new("hn", "2", "https://x", Utc::now());
        short.title = Some("Help?".to_string());
        assert!(!s.is_scorable(&short));
        assert!(s.is_scorable(&item()));
    }
}

//! TOML configuration.
//!
//! Everything the pipeline treats as static input lives here: the database
//! location, source query lists and pacing, classifier provider selection,
//! the category taxonomy, and digest thresholds. Credentials are not part of
//! the file; they are read from the environment by [`crate::classifier`].
//!
//! Only `[db]` is required. Every other section falls back to defaults that
//! match the production crawl.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub digest: DigestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    #[serde(default = "default_days_back")]
    pub days_back: i64,
    /// Bodies longer than this are truncated before storage.
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub hn: HnConfig,
    #[serde(default)]
    pub reddit: RedditConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            days_back: default_days_back(),
            max_body_chars: default_max_body_chars(),
            timeout_secs: default_source_timeout_secs(),
            hn: HnConfig::default(),
            reddit: RedditConfig::default(),
        }
    }
}

fn default_days_back() -> i64 {
    1
}
fn default_max_body_chars() -> usize {
    10_000
}
fn default_source_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct HnConfig {
    #[serde(default = "default_hn_enabled")]
    pub enabled: bool,
    #[serde(default = "default_hn_base_url")]
    pub base_url: String,
    #[serde(default = "default_hn_terms")]
    pub search_terms: Vec<String>,
    #[serde(default = "default_hn_tags")]
    pub tags: String,
    #[serde(default = "default_hits_per_page")]
    pub hits_per_page: u32,
    #[serde(default = "default_hn_page_delay")]
    pub page_delay_ms: u64,
    #[serde(default = "default_hn_query_delay")]
    pub query_delay_ms: u64,
}

impl Default for HnConfig {
    fn default() -> Self {
        Self {
            enabled: default_hn_enabled(),
            base_url: default_hn_base_url(),
            search_terms: default_hn_terms(),
            tags: default_hn_tags(),
            hits_per_page: default_hits_per_page(),
            page_delay_ms: default_hn_page_delay(),
            query_delay_ms: default_hn_query_delay(),
        }
    }
}

fn default_hn_enabled() -> bool {
    true
}
fn default_hn_base_url() -> String {
    "https://hn.algolia.com/api/v1".to_string()
}
fn default_hn_tags() -> String {
    "(story,comment)".to_string()
}
fn default_hits_per_page() -> u32 {
    100
}
fn default_hn_page_delay() -> u64 {
    500
}
fn default_hn_query_delay() -> u64 {
    1000
}

fn default_hn_terms() -> Vec<String> {
    [
        "distributed computing",
        "edge computing",
        "data pipeline",
        "batch processing",
        "ML inference",
        "machine learning deployment",
        "processing data at scale",
        "airflow alternative",
        "spark slow",
        "data processing latency",
        "IoT data",
        "running ML models",
        "GPU cluster",
        "compute at edge",
        "process terabytes",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedditConfig {
    #[serde(default = "default_reddit_enabled")]
    pub enabled: bool,
    #[serde(default = "default_reddit_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_subreddits")]
    pub subreddits: Vec<String>,
    #[serde(default = "default_posts_per_subreddit")]
    pub posts_per_subreddit: usize,
    #[serde(default = "default_include_comments")]
    pub include_comments: bool,
    /// Only posts with more comments than this get their thread fetched.
    #[serde(default = "default_comment_threshold")]
    pub comment_threshold: i64,
    #[serde(default = "default_comment_limit")]
    pub comment_limit: u32,
    #[serde(default = "default_comment_depth")]
    pub comment_depth: u32,
    #[serde(default = "default_reddit_page_delay")]
    pub page_delay_ms: u64,
    #[serde(default = "default_reddit_query_delay")]
    pub query_delay_ms: u64,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            enabled: default_reddit_enabled(),
            base_url: default_reddit_base_url(),
            user_agent: default_user_agent(),
            subreddits: default_subreddits(),
            posts_per_subreddit: default_posts_per_subreddit(),
            include_comments: default_include_comments(),
            comment_threshold: default_comment_threshold(),
            comment_limit: default_comment_limit(),
            comment_depth: default_comment_depth(),
            page_delay_ms: default_reddit_page_delay(),
            query_delay_ms: default_reddit_query_delay(),
        }
    }
}

fn default_reddit_enabled() -> bool {
    true
}
fn default_reddit_base_url() -> String {
    "https://www.reddit.com".to_string()
}
fn default_user_agent() -> String {
    "gtm-signals/0.1 (batch research crawler)".to_string()
}
fn default_posts_per_subreddit() -> usize {
    50
}
fn default_include_comments() -> bool {
    true
}
fn default_comment_threshold() -> i64 {
    5
}
fn default_comment_limit() -> u32 {
    50
}
fn default_comment_depth() -> u32 {
    3
}
fn default_reddit_page_delay() -> u64 {
    2000
}
fn default_reddit_query_delay() -> u64 {
    3000
}

fn default_subreddits() -> Vec<String> {
    [
        "dataengineering",
        "MachineLearning",
        "mlops",
        "devops",
        "kubernetes",
        "selfhosted",
        "homelab",
        "aws",
        "googlecloud",
        "azure",
        "IOT",
        "embedded",
        "learnmachinelearning",
        "datascience",
        "bigdata",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Preferred classifier: `anthropic` or `openai`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default)]
    pub anthropic_base_url: Option<String>,
    #[serde(default)]
    pub openai_base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_analysis_delay")]
    pub delay_ms: u64,
    /// Items whose title + body is shorter than this are never scored.
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
    #[serde(default = "default_prompt_body_chars")]
    pub max_prompt_body_chars: usize,
    /// Free-text description of the product, embedded in every prompt.
    #[serde(default = "default_product_context")]
    pub product_context: String,
    /// Allowed use-case categories, name → description.
    #[serde(default = "default_categories")]
    pub categories: BTreeMap<String, String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            anthropic_model: default_anthropic_model(),
            openai_model: default_openai_model(),
            anthropic_base_url: None,
            openai_base_url: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_classifier_timeout_secs(),
            batch_size: default_batch_size(),
            delay_ms: default_analysis_delay(),
            min_content_chars: default_min_content_chars(),
            max_prompt_body_chars: default_prompt_body_chars(),
            product_context: default_product_context(),
            categories: default_categories(),
        }
    }
}

fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_anthropic_model() -> String {
    "claude-3-haiku-20240307".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    500
}
fn default_classifier_timeout_secs() -> u64 {
    60
}
fn default_batch_size() -> usize {
    100
}
fn default_analysis_delay() -> u64 {
    500
}
fn default_min_content_chars() -> usize {
    50
}
fn default_prompt_body_chars() -> usize {
    3000
}

fn default_product_context() -> String {
    r#"Our product is a distributed compute platform that:
- Runs jobs where the data lives (edge, on-prem, any cloud)
- Orchestrates containerized and WASM workloads across mixed infrastructure
- Runs ML inference at the edge without shipping data to a central cloud
- Cuts latency and egress cost by processing data locally
- Is often compared with Airflow, Prefect, Dagster, Spark, and Dask

Strong signals:
- Data egress costs hurting the budget
- Data that must be processed on-prem or at the edge
- Inference latency problems
- Batch jobs spread over many locations
- IoT data processing pain
- Frustration with Spark or Airflow complexity
"#
    .to_string()
}

fn default_categories() -> BTreeMap<String, String> {
    [
        (
            "ml_inference",
            "ML model deployment and inference at scale or edge",
        ),
        ("data_pipelines", "ETL, data processing workflows, batch jobs"),
        ("iot_edge", "IoT data processing, edge device compute"),
        ("batch_processing", "Large-scale batch job execution"),
        ("distributed_compute", "General distributed computing needs"),
        ("cost_optimization", "Reducing cloud/compute costs"),
        ("latency_sensitive", "Low-latency processing requirements"),
        ("data_locality", "Processing data where it lives"),
        ("hybrid_cloud", "Multi-cloud or hybrid infrastructure"),
        ("workflow_orchestration", "Job scheduling and orchestration pain"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DigestConfig {
    #[serde(default = "default_digest_days")]
    pub days: i64,
    #[serde(default = "default_digest_min_fit")]
    pub min_fit: u8,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_recent_days")]
    pub recent_days: i64,
    #[serde(default = "default_historical_days")]
    pub historical_days: i64,
    #[serde(default = "default_trend_ratio")]
    pub trend_ratio: f64,
    #[serde(default = "default_trend_min_count")]
    pub trend_min_count: i64,
    #[serde(default = "default_emerging_min_count")]
    pub emerging_min_count: i64,
    #[serde(default = "default_max_patterns")]
    pub max_patterns: usize,
    /// Lookback for the decay-weighted "signals by period" section.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            days: default_digest_days(),
            min_fit: default_digest_min_fit(),
            top_n: default_top_n(),
            recent_days: default_recent_days(),
            historical_days: default_historical_days(),
            trend_ratio: default_trend_ratio(),
            trend_min_count: default_trend_min_count(),
            emerging_min_count: default_emerging_min_count(),
            max_patterns: default_max_patterns(),
            lookback_days: default_lookback_days(),
        }
    }
}

fn default_digest_days() -> i64 {
    1
}
fn default_digest_min_fit() -> u8 {
    6
}
fn default_top_n() -> usize {
    10
}
fn default_recent_days() -> i64 {
    7
}
fn default_historical_days() -> i64 {
    30
}
fn default_trend_ratio() -> f64 {
    1.5
}
fn default_trend_min_count() -> i64 {
    5
}
fn default_emerging_min_count() -> i64 {
    3
}
fn default_max_patterns() -> usize {
    5
}
fn default_lookback_days() -> i64 {
    14
}

impl Config {
    /// All-default configuration with the database at `./data/gtm.sqlite`.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/gtm.sqlite"),
            },
            crawl: CrawlConfig::default(),
            analysis: AnalysisConfig::default(),
            digest: DigestConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.crawl.days_back < 1 {
            bail!("crawl.days_back must be >= 1");
        }
        if self.crawl.max_body_chars == 0 {
            bail!("crawl.max_body_chars must be > 0");
        }

        match self.analysis.provider.as_str() {
            "anthropic" | "openai" => {}
            other => bail!(
                "Unknown analysis provider: '{}'. Must be anthropic or openai.",
                other
            ),
        }
        if self.analysis.batch_size == 0 {
            bail!("analysis.batch_size must be > 0");
        }
        if self.analysis.product_context.trim().is_empty() {
            bail!("analysis.product_context must describe the product");
        }
        if self.analysis.categories.is_empty() {
            bail!("analysis.categories must list at least one category");
        }

        let d = &self.digest;
        if d.min_fit > 10 {
            bail!("digest.min_fit must be in [0, 10]");
        }
        if d.recent_days < 1 || d.historical_days < 1 {
            bail!("digest.recent_days and digest.historical_days must be >= 1");
        }
        if d.recent_days >= d.historical_days {
            bail!("digest.recent_days must be smaller than digest.historical_days");
        }
        if d.trend_ratio <= 1.0 {
            bail!("digest.trend_ratio must be > 1.0");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

//! # GTM Signals
//!
//! A batch pipeline that finds sales opportunities in public technical
//! discussion.
//!
//! Items are crawled from Hacker News and Reddit, deduplicated into SQLite,
//! scored for product fit and urgency by an external LLM classifier, and
//! rolled up into decay-weighted digests with trend detection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐   ┌──────────────┐
//! │ Ingesters   │──▶│ ContentStore │──▶│  Scorer  │──▶│ ContentStore │
//! │ HN / Reddit │   │  (dedup)     │   │ (LLM)    │   │ (analysis)   │
//! └─────────────┘   └──────────────┘   └──────────┘   └──────┬───────┘
//!                                                            ▼
//!                                              ┌──────────────────────────┐
//!                                              │ Aggregate → Digest / CLI │
//!                                              └──────────────────────────┘
//! ```
//!
//! Each stage is a separate batch run and can be repeated safely: item
//! identity and the one-analysis-per-item rule are enforced by the schema.
//!
//! ## Quick Start
//!
//! ```bash
//! gtm init                   # create database
//! gtm crawl all --days 1     # ingest and score
//! gtm query --min-fit 7      # browse opportunities
//! gtm digest                 # print and record today's digest
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Content store trait and error type |
//! | [`sqlite_store`] | SQLite content store |
//! | [`traits`] | Ingester extension point |
//! | [`connector_hn`] | Hacker News (Algolia) ingester |
//! | [`connector_reddit`] | Reddit ingester |
//! | [`ingest`] | Crawl driver |
//! | [`classifier`] | LLM providers |
//! | [`analysis`] | Relevance scoring |
//! | [`aggregate`] | Decay weighting and trend detection |
//! | [`digest`] | Digest assembly and rendering |
//! | [`query`] | Reporting commands |
//! | [`stats`] | Archive statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod aggregate;
pub mod analysis;
pub mod classifier;
pub mod config;
pub mod connector_hn;
pub mod connector_reddit;
pub mod db;
pub mod digest;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod query;
pub mod sources;
pub mod sqlite_store;
pub mod stats;
pub mod store;
pub mod traits;

//! # GTM Signals CLI (`gtm`)
//!
//! ## Usage
//!
//! ```bash
//! gtm --config ./config/gtm.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gtm init` | Create the SQLite database and run schema migrations |
//! | `gtm sources` | List sources and their query counts |
//! | `gtm crawl [all\|hn\|reddit]` | Ingest recent items, then score them |
//! | `gtm analyze` | Score pending items |
//! | `gtm query` | Filter and rank scored opportunities |
//! | `gtm export <use_case>` | Outreach detail for one category |
//! | `gtm stats` | Archive totals |
//! | `gtm trends` | Category totals and flagged patterns |
//! | `gtm digest` | Print and record a digest |
//! | `gtm full` | Crawl, score, and digest in one run |
//!
//! Diagnostics go to stderr and are filtered with `RUST_LOG`; command
//! output goes to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use gtm_signals::{analysis, config, digest, ingest, migrate, query, sources, stats};

/// GTM Signals: find sales opportunities in public technical discussion.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/gtm.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "gtm",
    about = "GTM Signals: crawl, score, and summarize sales signals from HN and Reddit",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gtm.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// List configured sources.
    Sources,

    /// Crawl sources for recent items, then score new ones.
    Crawl {
        /// `all`, `hn`, or `reddit`.
        #[arg(default_value = "all")]
        source: String,

        /// Days to look back (defaults to `crawl.days_back`).
        #[arg(long, short)]
        days: Option<i64>,

        /// Skip scoring after the crawl.
        #[arg(long)]
        no_analyze: bool,

        /// Items to score after the crawl (defaults to `analysis.batch_size`).
        #[arg(long, short)]
        batch_size: Option<usize>,
    },

    /// Score items that have no analysis yet.
    ///
    /// Requires ANTHROPIC_API_KEY or OPENAI_API_KEY.
    Analyze {
        /// Maximum number of items to score.
        #[arg(long)]
        limit: Option<usize>,

        /// Pause between classifier calls, in milliseconds.
        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Query scored opportunities.
    Query {
        /// Minimum fit score (0-10).
        #[arg(long, default_value_t = 5)]
        min_fit: u8,

        /// Minimum urgency score (0-10).
        #[arg(long, default_value_t = 0)]
        min_urgency: u8,

        /// Only this use-case category.
        #[arg(long, short)]
        use_case: Option<String>,

        /// Days to look back.
        #[arg(long, short, default_value_t = 7)]
        days: i64,

        /// Maximum results.
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: i64,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Print outreach detail for one use-case category.
    Export {
        use_case: String,

        #[arg(long, short, default_value_t = 7)]
        days: i64,

        #[arg(long, short = 'n', default_value_t = 10)]
        limit: i64,
    },

    /// Show archive statistics.
    Stats,

    /// Show category totals and trending or emerging categories.
    Trends {
        /// Days of totals to show (defaults to `digest.historical_days`).
        #[arg(long, short)]
        days: Option<i64>,
    },

    /// Build, print, and record a digest.
    Digest {
        /// Opportunity window in days (defaults to `digest.days`).
        #[arg(long, short)]
        days: Option<i64>,

        /// Print only; do not record the digest.
        #[arg(long)]
        no_save: bool,
    },

    /// Crawl all sources, score, and produce a digest.
    Full {
        #[arg(long, short)]
        days: Option<i64>,

        #[arg(long, short)]
        batch_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gtm_signals=info,gtm=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Crawl {
            source,
            days,
            no_analyze,
            batch_size,
        } => {
            ingest::run_crawl(&cfg, &source, days).await?;
            if !no_analyze {
                analysis::run_analyze(&cfg, batch_size, None).await?;
            }
        }
        Commands::Analyze { limit, delay_ms } => {
            analysis::run_analyze(&cfg, limit, delay_ms).await?;
        }
        Commands::Query {
            min_fit,
            min_urgency,
            use_case,
            days,
            limit,
            json,
        } => {
            query::run_query(&cfg, min_fit, min_urgency, use_case, days, limit, json).await?;
        }
        Commands::Export {
            use_case,
            days,
            limit,
        } => {
            query::run_export(&cfg, &use_case, days, limit).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Trends { days } => {
            query::run_trends(&cfg, days).await?;
        }
        Commands::Digest { days, no_save } => {
            digest::run_digest(&cfg, days, !no_save).await?;
        }
        Commands::Full { days, batch_size } => {
            ingest::run_crawl(&cfg, "all", days).await?;
            analysis::run_analyze(&cfg, batch_size, None).await?;
            digest::run_digest(&cfg, None, true).await?;
        }
    }

    Ok(())
}

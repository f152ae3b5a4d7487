//! Digest assembly.
//!
//! A digest is a read-only combination of store queries: overall stats, the
//! top opportunities of the last `days`, category totals for the recent
//! window, flagged patterns, and a decay-weighted view of recent signals.
//! Rendering produces a finished markdown string; delivering it anywhere
//! is the caller's business.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::aggregate::{
    category_totals, decay_view, detect_patterns, split_windows, CategoryTotal, DecayView,
    Pattern, Period, TrendSettings,
};
use crate::config::{Config, DigestConfig};
use crate::models::{
    truncate_chars, CategoryDayCount, DigestSnapshot, Opportunity, OpportunityQuery,
    SummaryStats, HIGH_FIT,
};
use crate::sqlite_store::SqliteStore;
use crate::store::ContentStore;

const SUMMARY_CHARS: usize = 100;
const TOP_CATEGORIES: usize = 5;
const STRONGEST_PER_PERIOD: usize = 3;

#[derive(Debug, Clone)]
pub struct Digest {
    pub generated_at: DateTime<Utc>,
    pub days: i64,
    pub min_fit: u8,
    pub recent_days: i64,
    pub stats: SummaryStats,
    pub opportunities: Vec<Opportunity>,
    /// Totals for the recent window, largest first.
    pub categories: Vec<CategoryTotal>,
    pub patterns: Vec<Pattern>,
    pub decay: DecayView,
}

impl Digest {
    pub fn snapshot(&self, content: String) -> DigestSnapshot {
        DigestSnapshot {
            generated_at: self.generated_at,
            content,
            opportunities_count: self.opportunities.len() as i64,
            patterns: self.patterns.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Gather everything a digest needs, relative to `now`.
pub async fn build_digest(
    store: &dyn ContentStore,
    config: &DigestConfig,
    days: i64,
    now: DateTime<Utc>,
) -> Result<Digest> {
    let today = now.date_naive();
    let stats = store.summary_stats().await?;

    let opportunities = store
        .query_opportunities(&OpportunityQuery {
            min_fit: config.min_fit,
            min_urgency: 0,
            use_case: None,
            since: now - Duration::days(days),
            limit: config.top_n as i64,
        })
        .await?;

    let settings = TrendSettings::from(config);
    let rows = store
        .category_counts(now - Duration::days(settings.recent_days + settings.historical_days))
        .await?;
    let windows = split_windows(&rows, today, settings.recent_days, settings.historical_days);
    let patterns = detect_patterns(&windows.recent, &windows.historical, &settings);

    let recent_rows: Vec<CategoryDayCount> = rows
        .into_iter()
        .filter(|r| (today - r.day).num_days() < settings.recent_days)
        .collect();
    let categories = category_totals(&recent_rows);

    let signals = store
        .analyzed_since(now - Duration::days(config.lookback_days))
        .await?;
    let decay = decay_view(signals, today);

    Ok(Digest {
        generated_at: now,
        days,
        min_fit: config.min_fit,
        recent_days: settings.recent_days,
        stats,
        opportunities,
        categories,
        patterns,
        decay,
    })
}

pub fn render_markdown(digest: &Digest) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push("# GTM Signal Digest".to_string());
    lines.push(format!("Date: {}", digest.generated_at.format("%Y-%m-%d")));
    lines.push(String::new());

    lines.push("## Stats".to_string());
    lines.push(format!("- Total items: {}", digest.stats.total_items));
    lines.push(format!("- Analyzed: {}", digest.stats.total_analyzed));
    lines.push(format!(
        "- High-fit opportunities ({}+): {}",
        HIGH_FIT, digest.stats.high_fit
    ));
    lines.push(String::new());

    lines.push("## Top Opportunities".to_string());
    if digest.opportunities.is_empty() {
        lines.push(format!(
            "_No opportunities with fit >= {} in the last {} day(s)._",
            digest.min_fit, digest.days
        ));
    }
    for (i, opp) in digest.opportunities.iter().enumerate() {
        let a = &opp.analysis;
        lines.push(format!(
            "{}. **[{}] {}** (fit {} / urgency {})",
            i + 1,
            opp.item.source.to_uppercase(),
            a.use_case,
            a.fit_score,
            a.urgency_score
        ));
        if !a.problem_summary.is_empty() {
            lines.push(format!("   {}", truncate_chars(&a.problem_summary, SUMMARY_CHARS)));
        }
        lines.push(format!("   {}", opp.item.url));
    }
    lines.push(String::new());

    if !digest.categories.is_empty() {
        lines.push(format!("## Category Trends (last {} days)", digest.recent_days));
        for c in digest.categories.iter().take(TOP_CATEGORIES) {
            lines.push(format!(
                "- {}: {} signals (avg fit {:.1})",
                c.use_case, c.count, c.avg_fit
            ));
        }
        lines.push(String::new());
    }

    if !digest.patterns.is_empty() {
        lines.push("## Patterns".to_string());
        lines.extend(digest.patterns.iter().map(|p| format!("- {}", p)));
        lines.push(String::new());
    }

    if digest.decay.total() > 0 {
        lines.push("## Signals by Period".to_string());
        for period in Period::ALL {
            let n = digest.decay.count(period);
            if n > 0 {
                lines.push(format!("- {}: {}", period.label(), n));
            }
        }
        for period in [Period::Today, Period::Yesterday] {
            let strongest = digest.decay.strongest(period, STRONGEST_PER_PERIOD);
            if strongest.is_empty() {
                continue;
            }
            lines.push(String::new());
            lines.push(format!("### Strongest {}", period.label().to_lowercase()));
            for s in strongest {
                let item = &s.opportunity.item;
                lines.push(format!(
                    "- [fit {}] {} ({})",
                    s.opportunity.analysis.fit_score,
                    item.title.as_deref().unwrap_or("(untitled)"),
                    item.url
                ));
            }
        }
    }

    let mut out = lines.join("\n").trim_end().to_string();
    out.push('\n');
    out
}

/// `gtm digest`: build, print, and (unless `save` is false) record a digest.
pub async fn run_digest(config: &Config, days: Option<i64>, save: bool) -> Result<String> {
    let days = days.unwrap_or(config.digest.days).max(1);
    let store = SqliteStore::open(config).await?;

    let digest = build_digest(&store, &config.digest, days, Utc::now()).await?;
    let content = render_markdown(&digest);
    print!("{}", content);

    if save {
        let id = store.put_digest(&digest.snapshot(content.clone())).await?;
        info!(
            id,
            opportunities = digest.opportunities.len(),
            patterns = digest.patterns.len(),
            "digest saved"
        );
    }

    store.close().await;
    Ok(content)
}

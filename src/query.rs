//! Read-only reporting commands: `query`, `export`, and `trends`.

use anyhow::{bail, Result};
use chrono::{Duration, Utc};

use crate::aggregate::{category_totals, detect_patterns, split_windows, TrendSettings};
use crate::config::Config;
use crate::models::{truncate_chars, Opportunity, OpportunityQuery};
use crate::sqlite_store::SqliteStore;
use crate::store::ContentStore;

fn validate_threshold(name: &str, value: u8) -> Result<()> {
    if value > 10 {
        bail!("{} must be between 0 and 10, got {}", name, value);
    }
    Ok(())
}

async fn fetch(config: &Config, query: &OpportunityQuery) -> Result<Vec<Opportunity>> {
    let store = SqliteStore::open(config).await?;
    let results = store.query_opportunities(query).await?;
    store.close().await;
    Ok(results)
}

/// `gtm query`: filtered opportunities as a table or JSON.
pub async fn run_query(
    config: &Config,
    min_fit: u8,
    min_urgency: u8,
    use_case: Option<String>,
    days: i64,
    limit: i64,
    json: bool,
) -> Result<()> {
    validate_threshold("--min-fit", min_fit)?;
    validate_threshold("--min-urgency", min_urgency)?;

    let query = OpportunityQuery {
        min_fit,
        min_urgency,
        use_case,
        since: Utc::now() - Duration::days(days),
        limit,
    };
    let results = fetch(config, &query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No opportunities found.");
        return Ok(());
    }

    println!("Top opportunities (fit >= {}, last {} days)", min_fit, days);
    println!();
    println!(
        "{:>3} {:>3}  {:<22} {:<7} {:<50} URL",
        "FIT", "URG", "USE CASE", "SOURCE", "SUMMARY"
    );
    for opp in &results {
        let a = &opp.analysis;
        println!(
            "{:>3} {:>3}  {:<22} {:<7} {:<50} {}",
            a.fit_score,
            a.urgency_score,
            truncate_chars(&a.use_case, 22),
            opp.item.source,
            truncate_chars(&a.problem_summary, 50),
            opp.item.url
        );
    }
    println!();
    println!("{} result(s)", results.len());

    Ok(())
}

/// `gtm export <use_case>`: outreach-ready detail for one category.
pub async fn run_export(config: &Config, use_case: &str, days: i64, limit: i64) -> Result<()> {
    let query = OpportunityQuery {
        min_fit: config.digest.min_fit,
        min_urgency: 0,
        use_case: Some(use_case.to_string()),
        since: Utc::now() - Duration::days(days),
        limit,
    };
    let results = fetch(config, &query).await?;

    if results.is_empty() {
        println!("No opportunities for '{}' in the last {} days.", use_case, days);
        return Ok(());
    }

    for opp in &results {
        let a = &opp.analysis;
        println!("--- Opportunity ---");
        println!("fit:       {}/10", a.fit_score);
        println!("urgency:   {}/10", a.urgency_score);
        if let Some(ref title) = opp.item.title {
            println!("title:     {}", title);
        }
        if let Some(ref author) = opp.item.author {
            println!("author:    {}", author);
        }
        println!("problem:   {}", a.problem_summary);
        println!("url:       {}", opp.item.url);
        println!("reasoning: {}", a.reasoning);
        println!();
    }

    Ok(())
}

/// `gtm trends`: category totals over `days` plus flagged patterns for the
/// configured comparison windows.
pub async fn run_trends(config: &Config, days: Option<i64>) -> Result<()> {
    let settings = TrendSettings::from(&config.digest);
    let days = days.unwrap_or(settings.historical_days).max(1);
    let now = Utc::now();

    let store = SqliteStore::open(config).await?;
    let rows = store.category_counts(now - Duration::days(days)).await?;
    let window_rows = store
        .category_counts(now - Duration::days(settings.recent_days + settings.historical_days))
        .await?;
    store.close().await;

    if rows.is_empty() {
        println!("No trend data available.");
        return Ok(());
    }

    println!("Category trends (last {} days)", days);
    println!();
    println!("{:<24} {:>6} {:>8} {:>5}", "USE CASE", "TOTAL", "AVG FIT", "DAYS");
    for total in category_totals(&rows) {
        println!(
            "{:<24} {:>6} {:>8.1} {:>5}",
            total.use_case, total.count, total.avg_fit, total.active_days
        );
    }

    let windows = split_windows(
        &window_rows,
        now.date_naive(),
        settings.recent_days,
        settings.historical_days,
    );
    let patterns = detect_patterns(&windows.recent, &windows.historical, &settings);

    println!();
    println!(
        "Patterns (last {} days vs the {} days before)",
        settings.recent_days, settings.historical_days
    );
    if patterns.is_empty() {
        println!("  none");
    }
    for pattern in &patterns {
        println!("  - {}", pattern);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_bounded() {
        assert!(validate_threshold("--min-fit", 10).is_ok());
        assert!(validate_threshold("--min-fit", 11).is_err());
    }
}

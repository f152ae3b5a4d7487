//! Archive statistics.
//!
//! `gtm stats` prints whole-archive totals from
//! [`ContentStore::summary_stats`], per-source item counts with the time of
//! the last successful insert, and the category breakdown.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::models::HIGH_FIT;
use crate::sqlite_store::SqliteStore;
use crate::store::ContentStore;

const MAX_CATEGORIES: usize = 10;

pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let stats = store.summary_stats().await?;

    let last_ingest =
        sqlx::query("SELECT source, MAX(ingested_at) AS last FROM items GROUP BY source")
            .fetch_all(store.pool())
            .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("GTM Signals: Archive Stats");
    println!("==========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Items:       {}", stats.total_items);
    println!(
        "  Analyzed:    {} / {} ({}%)",
        stats.total_analyzed,
        stats.total_items,
        percent(stats.total_analyzed, stats.total_items)
    );
    println!("  High fit:    {} (fit >= {})", stats.high_fit, HIGH_FIT);

    if !stats.by_source.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<12} {:>8}   {}", "SOURCE", "ITEMS", "LAST INGEST");
        println!("  {}", "-".repeat(40));
        for (source, count) in &stats.by_source {
            let last = last_ingest
                .iter()
                .find(|row| row.try_get::<String, _>("source").ok().as_ref() == Some(source))
                .and_then(|row| row.try_get::<Option<i64>, _>("last").ok().flatten())
                .map(format_ts_relative)
                .unwrap_or_else(|| "never".to_string());
            println!("  {:<12} {:>8}   {}", source, count, last);
        }
    }

    if !stats.by_category.is_empty() {
        println!();
        println!("  By use case:");
        for (use_case, count) in stats.by_category.iter().take(MAX_CATEGORIES) {
            println!("  {:<24} {:>6}", use_case, count);
        }
    }

    println!();

    store.close().await;
    Ok(())
}

fn percent(part: i64, whole: i64) -> i64 {
    if whole > 0 {
        part * 100 / whole
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    let plural = |n: i64, unit: &str| {
        let suffix = if n == 1 { "" } else { "s" };
        format!("{} {}{} ago", n, unit, suffix)
    };
    match delta {
        d if d < 0 => format_ts_iso(ts),
        d if d < 60 => "just now".to_string(),
        d if d < 3600 => plural(d / 60, "min"),
        d if d < 86_400 => plural(d / 3600, "hour"),
        d if d < 86_400 * 30 => plural(d / 86_400, "day"),
        _ => format_ts_iso(ts),
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_scale_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn relative_times() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 3600), "1 hour ago");
        assert_eq!(format_ts_relative(now - 3 * 86_400), "3 days ago");
    }

    #[test]
    fn percent_handles_empty_archive() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(1, 4), 25);
    }
}

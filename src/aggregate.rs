//! Aggregation and trend detection over stored analyses.
//!
//! Everything here is pure: callers fetch rows from the store and pass them
//! in together with the reference date, so results are reproducible.
//!
//! # Decay view
//!
//! Analysed items are bucketed by whole days since creation:
//!
//! | Days ago | Period | Weight |
//! |----------|--------|--------|
//! | 0 | today | 1.0 |
//! | 1 | yesterday | 0.8 |
//! | 2–3 | this week | 0.5 |
//! | 4–7 | this week | 0.3 |
//! | 8–14 | last week | 0.1 |
//! | 15+ | older | 0.05 |
//!
//! # Trends
//!
//! A category's expected recent count under a uniform rate is
//! `historical × recent_days / historical_days`. It is trending when the
//! observed count reaches `ratio × expected` and meets an absolute floor.
//! A category with no historical occurrences is emerging once it reaches
//! its own floor.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;

use crate::config::DigestConfig;
use crate::models::{CategoryDayCount, Opportunity};

/// Slack for float rounding when comparing against `ratio × expected`.
const RATIO_EPSILON: f64 = 1e-9;

/// Recency weight for an item created `days_ago` days ago.
pub fn decay_weight(days_ago: i64) -> f64 {
    match days_ago {
        d if d <= 0 => 1.0,
        1 => 0.8,
        2..=3 => 0.5,
        4..=7 => 0.3,
        8..=14 => 0.1,
        _ => 0.05,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Period {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    Older,
}

impl Period {
    pub const ALL: [Period; 5] = [
        Period::Today,
        Period::Yesterday,
        Period::ThisWeek,
        Period::LastWeek,
        Period::Older,
    ];

    pub fn from_days_ago(days_ago: i64) -> Self {
        match days_ago {
            d if d <= 0 => Period::Today,
            1 => Period::Yesterday,
            2..=7 => Period::ThisWeek,
            8..=14 => Period::LastWeek,
            _ => Period::Older,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Period::Today => "Today",
            Period::Yesterday => "Yesterday",
            Period::ThisWeek => "This week",
            Period::LastWeek => "Last week",
            Period::Older => "Older",
        }
    }
}

/// An analysed item with its recency weight.
#[derive(Debug, Clone)]
pub struct Signal {
    pub opportunity: Opportunity,
    pub days_ago: i64,
    pub weight: f64,
}

impl Signal {
    /// Fit scaled by recency.
    pub fn weighted_fit(&self) -> f64 {
        f64::from(self.opportunity.analysis.fit_score) * self.weight
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecayView {
    buckets: BTreeMap<Period, Vec<Signal>>,
}

impl DecayView {
    pub fn signals(&self, period: Period) -> &[Signal] {
        self.buckets.get(&period).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, period: Period) -> usize {
        self.signals(period).len()
    }

    pub fn total(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// The `n` best signals of `period`, by fit then urgency.
    pub fn strongest(&self, period: Period, n: usize) -> Vec<&Signal> {
        let mut signals: Vec<&Signal> = self.signals(period).iter().collect();
        signals.sort_by(|a, b| {
            let (a, b) = (&a.opportunity.analysis, &b.opportunity.analysis);
            b.fit_score
                .cmp(&a.fit_score)
                .then(b.urgency_score.cmp(&a.urgency_score))
        });
        signals.truncate(n);
        signals
    }
}

/// Bucket `opportunities` into periods relative to `today`.
pub fn decay_view(opportunities: Vec<Opportunity>, today: NaiveDate) -> DecayView {
    let mut view = DecayView::default();
    for opportunity in opportunities {
        let created = opportunity.item.created_at.date_naive();
        let days_ago = (today - created).num_days().max(0);
        view.buckets
            .entry(Period::from_days_ago(days_ago))
            .or_default()
            .push(Signal {
                opportunity,
                days_ago,
                weight: decay_weight(days_ago),
            });
    }
    view
}

/// Per-category rollup of daily counts.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    pub use_case: String,
    pub count: i64,
    pub avg_fit: f64,
    pub active_days: usize,
}

/// Collapse daily rows into one total per category, largest first.
pub fn category_totals(rows: &[CategoryDayCount]) -> Vec<CategoryTotal> {
    let mut acc: BTreeMap<&str, (i64, f64, usize)> = BTreeMap::new();
    for row in rows {
        let entry = acc.entry(row.use_case.as_str()).or_default();
        entry.0 += row.count;
        entry.1 += row.avg_fit * row.count as f64;
        entry.2 += 1;
    }

    let mut totals: Vec<CategoryTotal> = acc
        .into_iter()
        .map(|(use_case, (count, fit_sum, active_days))| CategoryTotal {
            use_case: use_case.to_string(),
            count,
            avg_fit: if count > 0 { fit_sum / count as f64 } else { 0.0 },
            active_days,
        })
        .collect();
    totals.sort_by(|a, b| b.count.cmp(&a.count).then(a.use_case.cmp(&b.use_case)));
    totals
}

/// Category counts for the two comparison windows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowCounts {
    pub recent: BTreeMap<String, i64>,
    pub historical: BTreeMap<String, i64>,
}

/// Split daily rows into the recent window (the last `recent_days` days,
/// today included) and the historical window (the `historical_days` days
/// before it). Older rows are ignored.
pub fn split_windows(
    rows: &[CategoryDayCount],
    today: NaiveDate,
    recent_days: i64,
    historical_days: i64,
) -> WindowCounts {
    let mut windows = WindowCounts::default();
    for row in rows {
        let age = (today - row.day).num_days().max(0);
        let bucket = if age < recent_days {
            &mut windows.recent
        } else if age < recent_days + historical_days {
            &mut windows.historical
        } else {
            continue;
        };
        *bucket.entry(row.use_case.clone()).or_insert(0) += row.count;
    }
    windows
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendSettings {
    pub recent_days: i64,
    pub historical_days: i64,
    /// Observed / expected ratio that must be reached.
    pub ratio: f64,
    pub min_count: i64,
    pub emerging_min_count: i64,
    pub max_patterns: usize,
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self::from(&DigestConfig::default())
    }
}

impl From<&DigestConfig> for TrendSettings {
    fn from(config: &DigestConfig) -> Self {
        Self {
            recent_days: config.recent_days,
            historical_days: config.historical_days,
            ratio: config.trend_ratio,
            min_count: config.trend_min_count,
            emerging_min_count: config.emerging_min_count,
            max_patterns: config.max_patterns,
        }
    }
}

impl TrendSettings {
    /// Count expected in the recent window given `historical`.
    pub fn expected(&self, historical: i64) -> f64 {
        historical as f64 * (self.recent_days as f64 / self.historical_days as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Emerging {
        use_case: String,
        recent: i64,
    },
    Trending {
        use_case: String,
        recent: i64,
        expected: f64,
        increase_pct: i64,
    },
}

impl Pattern {
    pub fn use_case(&self) -> &str {
        match self {
            Pattern::Emerging { use_case, .. } | Pattern::Trending { use_case, .. } => use_case,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Emerging { use_case, recent } => {
                write!(f, "{} is a new emerging category ({} signals)", use_case, recent)
            }
            Pattern::Trending {
                use_case,
                increase_pct,
                ..
            } => write!(f, "{} is trending (+{}% above expected)", use_case, increase_pct),
        }
    }
}

/// Flag trending and emerging categories.
///
/// Emerging categories rank first (largest first), then trending ones by
/// percentage increase. Ties break on the category name.
pub fn detect_patterns(
    recent: &BTreeMap<String, i64>,
    historical: &BTreeMap<String, i64>,
    settings: &TrendSettings,
) -> Vec<Pattern> {
    let mut emerging = Vec::new();
    let mut trending = Vec::new();

    for (use_case, &count) in recent {
        let hist = historical.get(use_case).copied().unwrap_or(0);
        if hist <= 0 {
            if count >= settings.emerging_min_count {
                emerging.push(Pattern::Emerging {
                    use_case: use_case.clone(),
                    recent: count,
                });
            }
            continue;
        }

        let expected = settings.expected(hist);
        if count as f64 >= settings.ratio * expected - RATIO_EPSILON
            && count >= settings.min_count
        {
            let increase_pct = ((count as f64 / expected - 1.0) * 100.0) as i64;
            trending.push(Pattern::Trending {
                use_case: use_case.clone(),
                recent: count,
                expected,
                increase_pct,
            });
        }
    }

    emerging.sort_by(|a, b| match (a, b) {
        (Pattern::Emerging { recent: ra, .. }, Pattern::Emerging { recent: rb, .. }) => {
            rb.cmp(ra).then(a.use_case().cmp(b.use_case()))
        }
        _ => a.use_case().cmp(b.use_case()),
    });
    trending.sort_by(|a, b| match (a, b) {
        (
            Pattern::Trending { increase_pct: pa, .. },
            Pattern::Trending { increase_pct: pb, .. },
        ) => pb.cmp(pa).then(a.use_case().cmp(b.use_case())),
        _ => a.use_case().cmp(b.use_case()),
    });

    emerging
        .into_iter()
        .chain(trending)
        .take(settings.max_patterns)
        .collect()
}

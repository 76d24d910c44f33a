// SPDX-License-Identifier: MIT

//! Aggregation of raw GitHub payloads into renderer-ready series.
//!
//! Month keys are always `"YYYY-MM"` derived from UTC-normalized ISO-8601
//! instants, never from locale-sensitive formatting. Mixing local-time and
//! UTC date math is the classic off-by-one source here and is avoided
//! throughout.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Display palette cycled over sorted language slices. Injectable so test
/// output stays deterministic.
pub const DEFAULT_PALETTE: &[&str] = &[
    "#f7df1e", "#3178c6", "#3776ab", "#61dafb", "#1572b6", "#e34c26", "#563d7c", "#b07219",
    "#00bcd4", "#ff9800",
];

/// One slice of the language pie: integer percent of total bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageSlice {
    pub name: String,
    pub value: u32,
    pub color: String,
}

/// Headline dashboard counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub commits: u64,
    pub repos: u64,
    pub contributions: u64,
    pub followers: u64,
    pub pull_requests: u64,
    pub code_reviews: u64,
}

/// Per-day activity count for the heatmap window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyContribution {
    /// `"YYYY-MM-DD"`
    pub date: String,
    pub count: u32,
}

/// Undifferentiated per-month total (calendar-derived).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthTotal {
    pub month: String,
    pub total: u32,
}

/// Per-month commit/PR breakdown; a series covers every month in its
/// window with zero-fill, ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthActivity {
    pub month: String,
    pub commits: u32,
    pub prs: u32,
}

// ─── Language aggregation ────────────────────────────────────────────────

/// Sum per-repository language byte maps into a percentage series.
///
/// Missing or failed per-repo fetches contribute an empty map upstream.
/// Percentages are rounded half-up per item and are not reconciled to sum
/// to exactly 100. Sorted descending; ties keep name order.
pub fn aggregate_languages(
    maps: &[HashMap<String, u64>],
    palette: &[&str],
) -> Vec<LanguageSlice> {
    // BTreeMap keeps the pre-sort base order deterministic.
    let mut bytes_by_language: BTreeMap<String, u64> = BTreeMap::new();
    for map in maps {
        for (name, bytes) in map {
            *bytes_by_language.entry(name.clone()).or_insert(0) += bytes;
        }
    }

    let total_bytes: u64 = bytes_by_language.values().sum::<u64>().max(1);

    let mut slices: Vec<(String, u32)> = bytes_by_language
        .into_iter()
        .map(|(name, bytes)| {
            let percent = (bytes as f64 / total_bytes as f64 * 100.0).round() as u32;
            (name, percent)
        })
        .collect();

    slices.sort_by(|a, b| b.1.cmp(&a.1)); // stable: ties keep base order

    slices
        .into_iter()
        .enumerate()
        .map(|(i, (name, value))| LanguageSlice {
            name,
            value,
            color: palette
                .get(i % palette.len().max(1))
                .unwrap_or(&"#888888")
                .to_string(),
        })
        .collect()
}

// ─── Repo stat totals ────────────────────────────────────────────────────

/// Cap on PRs whose nested review counts contribute per repository.
/// A deliberately bounded approximation, matching the GraphQL `first: 10`.
const REVIEWS_PR_CAP: usize = 10;

/// Sum commit/PR/review totals over a GraphQL response keyed by synthetic
/// `repo{i}` aliases.
///
/// Commit counts are default-branch-reachable only; forks and other
/// branches are excluded by construction of the query.
pub fn sum_repo_stats(data: &Value) -> StatsSnapshot {
    let mut stats = StatsSnapshot::default();

    let Some(repos) = data.as_object() else {
        return stats;
    };

    for repo in repos.values() {
        stats.commits += repo
            .pointer("/defaultBranchRef/target/history/totalCount")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        stats.pull_requests += repo
            .pointer("/pullRequests/totalCount")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        if let Some(nodes) = repo.pointer("/pullRequests/nodes").and_then(Value::as_array) {
            stats.code_reviews += nodes
                .iter()
                .take(REVIEWS_PR_CAP)
                .filter_map(|pr| pr.pointer("/reviews/totalCount").and_then(Value::as_u64))
                .sum::<u64>();
        }
    }

    stats
}

// ─── Month bucketing ─────────────────────────────────────────────────────

/// Bucket day-level contribution counts into per-month totals, ascending.
pub fn aggregate_daily_to_months(days: &[DailyContribution]) -> Vec<MonthTotal> {
    let mut by_month: BTreeMap<String, u32> = BTreeMap::new();
    for day in days {
        if day.date.len() >= 7 {
            *by_month.entry(day.date[..7].to_string()).or_insert(0) += day.count;
        }
    }
    by_month
        .into_iter()
        .map(|(month, total)| MonthTotal { month, total })
        .collect()
}

/// Count ISO-8601 instants per month bucket. Invalid timestamps are
/// ignored rather than failing the whole aggregation.
pub fn dates_to_month_map<'a>(dates: impl IntoIterator<Item = &'a str>) -> HashMap<String, u32> {
    let mut map = HashMap::new();
    for raw in dates {
        if let Some(month) = month_bucket(raw) {
            *map.entry(month).or_insert(0) += 1;
        }
    }
    map
}

/// Derive a `"YYYY-MM"` bucket from an ISO-8601 instant, UTC-normalized.
pub fn month_bucket(instant: &str) -> Option<String> {
    let utc: DateTime<Utc> = DateTime::parse_from_rfc3339(instant)
        .ok()?
        .with_timezone(&Utc);
    Some(format!("{:04}-{:02}", utc.year(), utc.month()))
}

/// Every calendar month between `from` and `to` inclusive, ascending.
pub fn month_range(from: NaiveDate, to: NaiveDate) -> Vec<String> {
    let mut months = Vec::new();
    let (mut year, mut month) = (from.year(), from.month());
    let (end_year, end_month) = (to.year(), to.month());

    while (year, month) <= (end_year, end_month) {
        months.push(format!("{year:04}-{month:02}"));
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    months
}

/// Zero-fill commit/PR month maps into a gapless series over `months`.
pub fn month_map_to_series(
    months: &[String],
    commits: &HashMap<String, u32>,
    prs: &HashMap<String, u32>,
) -> Vec<MonthActivity> {
    months
        .iter()
        .map(|month| MonthActivity {
            month: month.clone(),
            commits: commits.get(month).copied().unwrap_or(0),
            prs: prs.get(month).copied().unwrap_or(0),
        })
        .collect()
}

/// Derive a series from the calendar alone: everything counts as commits.
/// Used when the detail query fails outright.
pub fn calendar_only_series(months: &[String], days: &[DailyContribution]) -> Vec<MonthActivity> {
    let totals: HashMap<String, u32> = aggregate_daily_to_months(days)
        .into_iter()
        .map(|m| (m.month, m.total))
        .collect();
    month_map_to_series(months, &totals, &HashMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(date: &str, count: u32) -> DailyContribution {
        DailyContribution {
            date: date.to_string(),
            count,
        }
    }

    #[test]
    fn test_language_percentages_sorted_descending() {
        let maps = vec![
            HashMap::from([("JS".to_string(), 300u64), ("TS".to_string(), 100)]),
            HashMap::from([("Py".to_string(), 100u64)]),
        ];

        let slices = aggregate_languages(&maps, DEFAULT_PALETTE);

        assert_eq!(slices[0].name, "JS");
        assert_eq!(slices[0].value, 60);
        assert_eq!(slices[0].color, DEFAULT_PALETTE[0]);
        assert_eq!(slices[1].value, 20);
        assert_eq!(slices[2].value, 20);
        assert!(slices.windows(2).all(|w| w[0].value >= w[1].value));
    }

    #[test]
    fn test_language_bytes_summed_across_repos() {
        let maps = vec![
            HashMap::from([("Rust".to_string(), 50u64)]),
            HashMap::from([("Rust".to_string(), 50u64)]),
            HashMap::new(), // failed fetch degraded to empty
        ];

        let slices = aggregate_languages(&maps, DEFAULT_PALETTE);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].value, 100);
    }

    #[test]
    fn test_language_palette_cycles_past_its_length() {
        let maps: Vec<HashMap<String, u64>> = (0..12)
            .map(|i| HashMap::from([(format!("lang{i:02}"), 100u64 * (12 - i as u64))]))
            .collect();

        let slices = aggregate_languages(&maps, DEFAULT_PALETTE);
        assert_eq!(slices.len(), 12);
        assert_eq!(slices[10].color, DEFAULT_PALETTE[0]);
        assert_eq!(slices[11].color, DEFAULT_PALETTE[1]);
    }

    #[test]
    fn test_sum_repo_stats_over_aliases() {
        let data = json!({
            "repo0": {
                "defaultBranchRef": {"target": {"history": {"totalCount": 40}}},
                "pullRequests": {
                    "totalCount": 5,
                    "nodes": [
                        {"reviews": {"totalCount": 2}},
                        {"reviews": {"totalCount": 3}}
                    ]
                }
            },
            "repo1": {
                "defaultBranchRef": null, // empty repository
                "pullRequests": {"totalCount": 1, "nodes": []}
            }
        });

        let stats = sum_repo_stats(&data);
        assert_eq!(stats.commits, 40);
        assert_eq!(stats.pull_requests, 6);
        assert_eq!(stats.code_reviews, 5);
    }

    #[test]
    fn test_sum_repo_stats_caps_reviews_at_ten_prs() {
        let nodes: Vec<Value> = (0..15).map(|_| json!({"reviews": {"totalCount": 1}})).collect();
        let data = json!({
            "repo0": {"pullRequests": {"totalCount": 15, "nodes": nodes}}
        });

        assert_eq!(sum_repo_stats(&data).code_reviews, 10);
    }

    #[test]
    fn test_aggregate_daily_to_months() {
        let days = vec![
            day("2025-09-01", 2),
            day("2025-09-15", 3),
            day("2025-10-02", 1),
        ];

        assert_eq!(
            aggregate_daily_to_months(&days),
            vec![
                MonthTotal {
                    month: "2025-09".to_string(),
                    total: 5
                },
                MonthTotal {
                    month: "2025-10".to_string(),
                    total: 1
                },
            ]
        );
    }

    #[test]
    fn test_dates_to_month_map_utc_normalizes() {
        let map = dates_to_month_map([
            "2025-09-01T12:00:00Z",
            "2025-09-02T05:00:00Z",
            // +02:00 local on Oct 1 is still Sep 30 in UTC
            "2025-10-01T00:30:00+02:00",
            "not-a-date",
        ]);

        assert_eq!(map.get("2025-09"), Some(&3));
        assert_eq!(map.get("2025-10"), None);
    }

    #[test]
    fn test_month_range_spans_year_boundary() {
        let from = NaiveDate::from_ymd_opt(2024, 11, 14).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();

        assert_eq!(
            month_range(from, to),
            vec!["2024-11", "2024-12", "2025-01", "2025-02"]
        );
    }

    #[test]
    fn test_month_map_to_series_zero_fills() {
        let months = vec!["2025-09".to_string(), "2025-10".to_string()];
        let commits = HashMap::from([("2025-09".to_string(), 4u32)]);
        let prs = HashMap::from([("2025-10".to_string(), 1u32)]);

        assert_eq!(
            month_map_to_series(&months, &commits, &prs),
            vec![
                MonthActivity {
                    month: "2025-09".to_string(),
                    commits: 4,
                    prs: 0
                },
                MonthActivity {
                    month: "2025-10".to_string(),
                    commits: 0,
                    prs: 1
                },
            ]
        );
    }

    #[test]
    fn test_calendar_only_series_attributes_everything_to_commits() {
        let months = vec!["2025-09".to_string(), "2025-10".to_string()];
        let days = vec![day("2025-09-01", 7)];

        let series = calendar_only_series(&months, &days);
        assert_eq!(series[0].commits, 7);
        assert_eq!(series[0].prs, 0);
        assert_eq!(series[1].commits, 0);
    }
}

// SPDX-License-Identifier: MIT

//! Dashboard pipeline: fetch, reconcile, and aggregate account activity.
//!
//! The month-series reconciliation is the core protocol here. GitHub's
//! contribution calendar is authoritative for totals but undifferentiated;
//! the capped contributions-by-repository detail queries give the
//! commit/PR split but can undercount. When the detail series falls more
//! than the configured shortfall below the calendar total, a slower
//! exhaustive REST fallback rebuilds the series repository by repository.

use crate::aggregate::{
    self, DailyContribution, LanguageSlice, MonthActivity, StatsSnapshot, DEFAULT_PALETTE,
};
use crate::batch::batch;
use crate::cache::{cached_fetch, CacheStore};
use crate::error::AppError;
use crate::pagination::{fetch_all_pages, Page, PageOptions};
use crate::services::github::GitHubTransport;
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Tunable pipeline parameters. The defaults mirror the product's
/// historical constants; none of them is load-bearing beyond quota
/// management, so they are injectable rather than hard-coded.
#[derive(Debug, Clone)]
pub struct DashboardTuning {
    /// Detail totals below `calendar_total * threshold` trigger fallback.
    pub fallback_threshold: f64,
    /// Cap on repositories in each contributions-by-repository query.
    pub max_contrib_repos: u32,
    /// Cap on contribution nodes fetched per repository.
    pub max_contrib_nodes: u32,
    /// Concurrent per-repository language fetches.
    pub language_concurrency: usize,
    /// Pagination bounds for repository and fallback listings.
    pub page_options: PageOptions,
    /// TTL for cached REST/GraphQL payloads.
    pub cache_ttl_secs: u64,
}

impl Default for DashboardTuning {
    fn default() -> Self {
        Self {
            fallback_threshold: 0.9,
            max_contrib_repos: 100,
            max_contrib_nodes: 100,
            language_concurrency: 6,
            page_options: PageOptions::default(),
            cache_ttl_secs: 600,
        }
    }
}

/// Reconciliation progress as `completed/total` steps, for UI feedback
/// during the slow REST fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: u32,
    pub total: u32,
}

/// Callback invoked with incremental fallback progress.
pub type ProgressCallback = Box<dyn Fn(Progress) + Send + Sync>;

fn emit(on_progress: Option<&ProgressCallback>, progress: Progress) {
    if let Some(callback) = on_progress {
        callback(progress);
    }
}

/// Where the month series ended up in the reconciliation protocol.
///
/// Transitions: `Primary -> Reconciling` once both totals are known;
/// `Reconciling -> Primary` when the detail series passes the threshold;
/// `Reconciling -> Fallback` on shortfall; any detail failure lands in
/// `Degraded` (calendar-only series, or the last series when even the
/// calendar is unavailable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileState {
    Primary,
    Reconciling,
    Fallback,
    Degraded,
}

/// Everything the renderer consumes.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardData {
    pub language_series: Vec<LanguageSlice>,
    pub stats: StatsSnapshot,
    pub monthly_series: Vec<MonthActivity>,
    pub daily_contributions: Vec<DailyContribution>,
    pub reconcile_state: ReconcileState,
}

/// High-level dashboard loader over a chosen transport.
pub struct DashboardService {
    transport: GitHubTransport,
    cache: Arc<dyn CacheStore>,
    tuning: DashboardTuning,
}

impl DashboardService {
    pub fn new(
        transport: GitHubTransport,
        cache: Arc<dyn CacheStore>,
        tuning: DashboardTuning,
    ) -> Self {
        Self {
            transport,
            cache,
            tuning,
        }
    }

    /// Load the full dashboard for the authenticated user.
    ///
    /// Per-repository worker failures degrade to empty results; only auth
    /// failure and quota exhaustion propagate.
    pub async fn load(&self, on_progress: Option<&ProgressCallback>) -> Result<DashboardData, AppError> {
        let user = self.transport.rest("/user").await?.data;
        let login = user
            .get("login")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let repos = self.fetch_repos().await?;
        let repo_names: Vec<String> = repos
            .iter()
            .filter_map(|r| r.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        // Aliased per-repo stats; a failing stats query zeroes the counts
        // rather than blanking the whole dashboard.
        let mut stats = match self.fetch_repo_stats(&login, &repo_names).await {
            Ok(data) => aggregate::sum_repo_stats(&data),
            Err(e) => {
                tracing::warn!(error = %e, "repo stats query failed, continuing with zeros");
                StatsSnapshot::default()
            }
        };
        stats.repos = repo_names.len() as u64;
        stats.contributions = user
            .get("public_repos")
            .and_then(Value::as_u64)
            .unwrap_or(0)
            + user
                .get("total_private_repos")
                .and_then(Value::as_u64)
                .unwrap_or(0);
        stats.followers = user.get("followers").and_then(Value::as_u64).unwrap_or(0);

        let language_series = self.fetch_language_series(&login, &repo_names).await;

        let now = Utc::now();
        let from = now - Duration::days(365);
        let (daily_contributions, monthly_series, reconcile_state) = self
            .reconcile_contributions(&login, &repo_names, from, now, on_progress)
            .await;

        Ok(DashboardData {
            language_series,
            stats,
            monthly_series,
            daily_contributions,
            reconcile_state,
        })
    }

    /// All repositories of the authenticated user, flattened across pages.
    async fn fetch_repos(&self) -> Result<Vec<Value>, AppError> {
        let path = format!("/user/repos?per_page={}", self.tuning.page_options.per_page);
        let payload = cached_fetch(
            self.cache.as_ref(),
            "rest",
            &format!("{path}#all-pages"),
            self.tuning.cache_ttl_secs,
            || async {
                let items = fetch_all_pages(&path, &self.tuning.page_options, |url| async move {
                    let response = self.transport.rest(&url).await?;
                    Ok(Page {
                        link_header: response.link_header(),
                        data: response.data,
                    })
                })
                .await?;
                Ok(Value::Array(items))
            },
        )
        .await?;

        Ok(payload.as_array().cloned().unwrap_or_default())
    }

    /// One GraphQL query with a synthetic `repo{i}` alias per repository.
    async fn fetch_repo_stats(&self, login: &str, repo_names: &[String]) -> Result<Value, AppError> {
        if repo_names.is_empty() {
            return Ok(Value::Null);
        }

        let aliases: String = repo_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                format!(
                    r#"repo{i}: repository(owner: "{login}", name: "{name}") {{
                        defaultBranchRef {{ target {{ ... on Commit {{ history {{ totalCount }} }} }} }}
                        pullRequests(first: 10, states: [OPEN, CLOSED, MERGED]) {{
                            totalCount
                            nodes {{ reviews {{ totalCount }} }}
                        }}
                    }}"#
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let query = format!("query {{\n{aliases}\n}}");

        cached_fetch(
            self.cache.as_ref(),
            "graphql",
            &query,
            self.tuning.cache_ttl_secs,
            || async { self.transport.graphql(&query, &Value::Null).await },
        )
        .await
    }

    /// Per-repository language byte maps, batched with bounded concurrency
    /// and aggregated into the percentage series. Failed lookups count as
    /// empty maps.
    async fn fetch_language_series(&self, login: &str, repo_names: &[String]) -> Vec<LanguageSlice> {
        let maps: Vec<HashMap<String, u64>> = batch(
            repo_names.to_vec(),
            |name| async move {
                let path = format!("/repos/{login}/{name}/languages");
                let result = cached_fetch(
                    self.cache.as_ref(),
                    "rest",
                    &path,
                    self.tuning.cache_ttl_secs,
                    || async { Ok(self.transport.rest(&path).await?.data) },
                )
                .await;

                match result {
                    Ok(value) => value
                        .as_object()
                        .map(|obj| {
                            obj.iter()
                                .filter_map(|(k, v)| v.as_u64().map(|b| (k.clone(), b)))
                                .collect()
                        })
                        .unwrap_or_default(),
                    Err(e) => {
                        tracing::warn!(repo = %name, error = %e, "language fetch failed");
                        HashMap::new()
                    }
                }
            },
            self.tuning.language_concurrency,
        )
        .await;

        aggregate::aggregate_languages(&maps, DEFAULT_PALETTE)
    }

    /// Reconcile the month series over the trailing one-year window.
    async fn reconcile_contributions(
        &self,
        login: &str,
        repo_names: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        on_progress: Option<&ProgressCallback>,
    ) -> (Vec<DailyContribution>, Vec<MonthActivity>, ReconcileState) {
        let months = aggregate::month_range(from.date_naive(), to.date_naive());

        // Tier 0: authoritative calendar. If even this fails, the series
        // stays empty rather than failing the whole load.
        let days = match self.fetch_calendar(from, to).await {
            Ok(days) => days,
            Err(e) => {
                tracing::warn!(error = %e, "contribution calendar fetch failed");
                return (Vec::new(), Vec::new(), ReconcileState::Degraded);
            }
        };
        let calendar_total: u64 = days.iter().map(|d| d.count as u64).sum();

        // Tier 1: capped detail query for the commit/PR split.
        let (commit_map, pr_map) = match self.fetch_detail_maps(from, to).await {
            Ok(maps) => maps,
            Err(e) => {
                tracing::warn!(error = %e, "detail query failed, degrading to calendar-only");
                let series = aggregate::calendar_only_series(&months, &days);
                return (days, series, ReconcileState::Degraded);
            }
        };

        let series = aggregate::month_map_to_series(&months, &commit_map, &pr_map);
        let series_total: u64 = series.iter().map(|m| (m.commits + m.prs) as u64).sum();

        // Both totals are known; compare them.
        let state = ReconcileState::Reconciling;
        if !needs_fallback(series_total, calendar_total, self.tuning.fallback_threshold) {
            return (days, series, ReconcileState::Primary);
        }

        tracing::info!(
            ?state,
            series_total,
            calendar_total,
            "detail series truncated, rebuilding from REST"
        );

        // Tier 2: exhaustive per-repository REST listing.
        let (commit_map, pr_map) = self
            .fallback_month_maps(login, repo_names, from, on_progress)
            .await;
        let series = aggregate::month_map_to_series(&months, &commit_map, &pr_map);
        (days, series, ReconcileState::Fallback)
    }

    /// Flattened contribution calendar for the window.
    async fn fetch_calendar(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DailyContribution>, AppError> {
        let query = r#"query($from: DateTime!, $to: DateTime!) {
            viewer {
                contributionsCollection(from: $from, to: $to) {
                    contributionCalendar {
                        weeks { contributionDays { date contributionCount } }
                    }
                }
            }
        }"#;
        let variables = json!({
            "from": format_utc_rfc3339(from),
            "to": format_utc_rfc3339(to),
        });

        let data = cached_fetch(
            self.cache.as_ref(),
            "graphql",
            &format!("{query}{variables}"),
            self.tuning.cache_ttl_secs,
            || async { self.transport.graphql(query, &variables).await },
        )
        .await?;

        Ok(flatten_calendar(&data))
    }

    /// Month maps from the capped contributions-by-repository queries.
    async fn fetch_detail_maps(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<(HashMap<String, u32>, HashMap<String, u32>), AppError> {
        // Caps must be inlined: GraphQL only allows variables where the
        // query declares them, and these are structural.
        let query = format!(
            r#"query($from: DateTime!, $to: DateTime!) {{
            viewer {{
                contributionsCollection(from: $from, to: $to) {{
                    commitContributionsByRepository(maxRepositories: {repos}) {{
                        contributions(first: {nodes}) {{ nodes {{ occurredAt }} }}
                    }}
                    pullRequestContributionsByRepository(maxRepositories: {repos}) {{
                        contributions(first: {nodes}) {{ nodes {{ occurredAt }} }}
                    }}
                }}
            }}
        }}"#,
            repos = self.tuning.max_contrib_repos,
            nodes = self.tuning.max_contrib_nodes,
        );
        let variables = json!({
            "from": format_utc_rfc3339(from),
            "to": format_utc_rfc3339(to),
        });

        let data = cached_fetch(
            self.cache.as_ref(),
            "graphql",
            &format!("{query}{variables}"),
            self.tuning.cache_ttl_secs,
            || async { self.transport.graphql(&query, &variables).await },
        )
        .await?;

        Ok(detail_month_maps(&data))
    }

    /// Exhaustive fallback: paginate every repository's commits and pull
    /// requests, re-bucket their dates into months. Progress covers
    /// `repositories * 2` steps; per-repo failures skip that repo.
    async fn fallback_month_maps(
        &self,
        login: &str,
        repo_names: &[String],
        from: DateTime<Utc>,
        on_progress: Option<&ProgressCallback>,
    ) -> (HashMap<String, u32>, HashMap<String, u32>) {
        let total = repo_names.len() as u32 * 2;
        let mut completed = 0u32;
        let mut commit_dates: Vec<String> = Vec::new();
        let mut pr_dates: Vec<String> = Vec::new();
        let since = format_utc_rfc3339(from);

        for name in repo_names {
            let commits_path = format!(
                "/repos/{login}/{name}/commits?per_page={}&since={since}",
                self.tuning.page_options.per_page
            );
            match self.fetch_rest_pages(&commits_path).await {
                Ok(items) => commit_dates.extend(
                    items
                        .iter()
                        .filter_map(|c| c.pointer("/commit/author/date").and_then(Value::as_str))
                        .map(str::to_string),
                ),
                Err(e) => tracing::warn!(repo = %name, error = %e, "fallback commit fetch failed"),
            }
            completed += 1;
            emit(on_progress, Progress { completed, total });

            let pulls_path = format!(
                "/repos/{login}/{name}/pulls?state=all&per_page={}",
                self.tuning.page_options.per_page
            );
            match self.fetch_rest_pages(&pulls_path).await {
                Ok(items) => pr_dates.extend(
                    items
                        .iter()
                        .filter_map(|pr| pr.get("created_at").and_then(Value::as_str))
                        .map(str::to_string),
                ),
                Err(e) => tracing::warn!(repo = %name, error = %e, "fallback PR fetch failed"),
            }
            completed += 1;
            emit(on_progress, Progress { completed, total });
        }

        (
            aggregate::dates_to_month_map(commit_dates.iter().map(String::as_str)),
            aggregate::dates_to_month_map(pr_dates.iter().map(String::as_str)),
        )
    }

    async fn fetch_rest_pages(&self, path: &str) -> Result<Vec<Value>, AppError> {
        fetch_all_pages(path, &self.tuning.page_options, |url| async move {
            let response = self.transport.rest(&url).await?;
            Ok(Page {
                link_header: response.link_header(),
                data: response.data,
            })
        })
        .await
    }
}

/// Fallback trigger: the detail series under-counts by more than the
/// allowed shortfall, strictly below `calendar_total * threshold`.
pub fn needs_fallback(series_total: u64, calendar_total: u64, threshold: f64) -> bool {
    (series_total as f64) < calendar_total as f64 * threshold
}

/// Flatten a contribution-calendar response into day entries.
pub fn flatten_calendar(data: &Value) -> Vec<DailyContribution> {
    let mut days = Vec::new();
    let weeks = data
        .pointer("/viewer/contributionsCollection/contributionCalendar/weeks")
        .and_then(Value::as_array);

    for week in weeks.into_iter().flatten() {
        let Some(cells) = week.get("contributionDays").and_then(Value::as_array) else {
            continue;
        };
        for cell in cells {
            let (Some(date), Some(count)) = (
                cell.get("date").and_then(Value::as_str),
                cell.get("contributionCount").and_then(Value::as_u64),
            ) else {
                continue;
            };
            days.push(DailyContribution {
                date: date.to_string(),
                count: count as u32,
            });
        }
    }
    days
}

/// Bucket a contributions-by-repository response into commit and PR month
/// maps.
pub fn detail_month_maps(data: &Value) -> (HashMap<String, u32>, HashMap<String, u32>) {
    let occurred = |field: &str| -> Vec<String> {
        data.pointer(&format!("/viewer/contributionsCollection/{field}"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|by_repo| by_repo.pointer("/contributions/nodes").and_then(Value::as_array))
            .flatten()
            .filter_map(|node| node.get("occurredAt").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    };

    let commits = occurred("commitContributionsByRepository");
    let prs = occurred("pullRequestContributionsByRepository");

    (
        aggregate::dates_to_month_map(commits.iter().map(String::as_str)),
        aggregate::dates_to_month_map(prs.iter().map(String::as_str)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fallback_boundary_is_strict() {
        // Calendar total 100 with the default 0.9 threshold.
        assert!(needs_fallback(89, 100, 0.9));
        assert!(!needs_fallback(90, 100, 0.9));
        assert!(!needs_fallback(91, 100, 0.9));
    }

    #[test]
    fn test_fallback_never_triggers_on_empty_calendar() {
        assert!(!needs_fallback(0, 0, 0.9));
    }

    #[test]
    fn test_flatten_calendar() {
        let data = json!({
            "viewer": {"contributionsCollection": {"contributionCalendar": {
                "weeks": [
                    {"contributionDays": [
                        {"date": "2025-09-01", "contributionCount": 2},
                        {"date": "2025-09-02", "contributionCount": 0}
                    ]},
                    {"contributionDays": [
                        {"date": "2025-09-08", "contributionCount": 5}
                    ]}
                ]
            }}}
        });

        let days = flatten_calendar(&data);
        assert_eq!(days.len(), 3);
        assert_eq!(days[0].date, "2025-09-01");
        assert_eq!(days[2].count, 5);
        assert_eq!(days.iter().map(|d| d.count as u64).sum::<u64>(), 7);
    }

    #[test]
    fn test_flatten_calendar_tolerates_missing_fields() {
        assert!(flatten_calendar(&json!({})).is_empty());
        assert!(flatten_calendar(&json!({"viewer": {}})).is_empty());
    }

    #[test]
    fn test_detail_month_maps_buckets_by_month() {
        let data = json!({
            "viewer": {"contributionsCollection": {
                "commitContributionsByRepository": [
                    {"contributions": {"nodes": [
                        {"occurredAt": "2025-09-03T10:00:00Z"},
                        {"occurredAt": "2025-09-20T10:00:00Z"},
                        {"occurredAt": "2025-10-01T10:00:00Z"}
                    ]}},
                    {"contributions": {"nodes": [
                        {"occurredAt": "2025-10-05T10:00:00Z"}
                    ]}}
                ],
                "pullRequestContributionsByRepository": [
                    {"contributions": {"nodes": [
                        {"occurredAt": "2025-10-07T10:00:00Z"}
                    ]}}
                ]
            }}
        });

        let (commits, prs) = detail_month_maps(&data);
        assert_eq!(commits.get("2025-09"), Some(&2));
        assert_eq!(commits.get("2025-10"), Some(&2));
        assert_eq!(prs.get("2025-10"), Some(&1));
        assert_eq!(prs.get("2025-09"), None);
    }

    #[test]
    fn test_emit_is_a_noop_without_a_callback() {
        emit(None, Progress { completed: 1, total: 2 });

        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = std::sync::Arc::clone(&seen);
        let callback: ProgressCallback = Box::new(move |p| sink.lock().unwrap().push(p));

        emit(Some(&callback), Progress { completed: 1, total: 2 });
        emit(Some(&callback), Progress { completed: 2, total: 2 });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], Progress { completed: 2, total: 2 });
    }
}

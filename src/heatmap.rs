// SPDX-License-Identifier: MIT

//! Monday-aligned week columns for the contribution heatmap.
//!
//! Pure date bucketing, independent of rendering. All math is on UTC
//! calendar dates; the renderer is responsible for marking cells past
//! `today` as out-of-range.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One cell of a week column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCell {
    /// `"YYYY-MM-DD"`, zero-padded, computed from UTC fields only.
    pub date: String,
    #[serde(skip)]
    pub day: NaiveDate,
}

/// Exactly 7 cells starting on a Monday.
pub type WeekColumn = Vec<DayCell>;

/// The generated index for a trailing window ending at `today`.
#[derive(Debug, Clone, Serialize)]
pub struct HeatmapIndex {
    pub today: NaiveDate,
    pub start_date: NaiveDate,
    pub weeks: Vec<WeekColumn>,
}

fn cell(day: NaiveDate) -> DayCell {
    DayCell {
        date: day.format("%Y-%m-%d").to_string(),
        day,
    }
}

/// Number of days back to the Monday on or before `day`.
fn days_since_monday(day: NaiveDate) -> u64 {
    (day.weekday().num_days_from_sunday() as u64 + 6) % 7
}

/// Generate Monday-aligned week columns covering `window_days` trailing
/// days. The window is left-padded to the Monday on or before its start;
/// the final column may extend past `today`.
pub fn generate_weeks(reference: DateTime<Utc>, window_days: u64) -> HeatmapIndex {
    let today = reference.date_naive();
    let start_date = today - Days::new(window_days);
    let start_monday = start_date - Days::new(days_since_monday(start_date));

    let mut weeks = Vec::new();
    let mut cursor = start_monday;
    while cursor <= today {
        let column: WeekColumn = (0..7).map(|offset| cell(cursor + Days::new(offset))).collect();
        weeks.push(column);
        cursor = cursor + Days::new(7);
    }

    HeatmapIndex {
        today,
        start_date,
        weeks,
    }
}

/// Map week index → month label, at most one label per calendar month:
/// the column containing each first-of-month inside the window. `label`
/// renders the first-of-month date, so the caller controls the locale.
pub fn build_month_label_map_with<F>(index: &HeatmapIndex, label: F) -> BTreeMap<usize, String>
where
    F: Fn(NaiveDate) -> String,
{
    let mut labels = BTreeMap::new();
    let mut labeled_months: Vec<String> = Vec::new();

    for (week_index, week) in index.weeks.iter().enumerate() {
        for cell in week {
            if cell.day.day() != 1 || cell.day < index.start_date || cell.day > index.today {
                continue;
            }
            let month_key = cell.day.format("%Y-%m").to_string();
            if labeled_months.contains(&month_key) {
                continue;
            }
            labeled_months.push(month_key);
            labels.insert(week_index, label(cell.day));
        }
    }

    labels
}

/// [`build_month_label_map_with`] using chrono's English short month names.
pub fn build_month_label_map(index: &HeatmapIndex) -> BTreeMap<usize, String> {
    build_month_label_map_with(index, |day| day.format("%b").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 15, 30, 0).unwrap()
    }

    #[test]
    fn test_columns_are_full_weeks_starting_monday() {
        let index = generate_weeks(utc(2025, 10, 22), 13);

        assert!(!index.weeks.is_empty());
        for week in &index.weeks {
            assert_eq!(week.len(), 7);
        }
        assert_eq!(index.weeks[0][0].day.weekday(), Weekday::Mon);
    }

    #[test]
    fn test_small_window_layout() {
        // 2025-10-22 is a Wednesday; 13 days back is Thursday 10-09,
        // whose Monday is 10-06. Columns: 10-06, 10-13, 10-20.
        let index = generate_weeks(utc(2025, 10, 22), 13);

        assert_eq!(index.today, NaiveDate::from_ymd_opt(2025, 10, 22).unwrap());
        assert_eq!(
            index.start_date,
            NaiveDate::from_ymd_opt(2025, 10, 9).unwrap()
        );
        assert_eq!(index.weeks.len(), 3);
        assert_eq!(index.weeks[0][0].date, "2025-10-06");
        assert_eq!(index.weeks[2][0].date, "2025-10-20");
        // Final column extends past today; the renderer marks those cells.
        assert_eq!(index.weeks[2][6].date, "2025-10-26");
    }

    #[test]
    fn test_monday_reference_needs_no_padding() {
        // 2025-10-20 is itself a Monday.
        let index = generate_weeks(utc(2025, 10, 20), 0);
        assert_eq!(index.weeks.len(), 1);
        assert_eq!(index.weeks[0][0].date, "2025-10-20");
    }

    #[test]
    fn test_trailing_year_window() {
        let index = generate_weeks(utc(2025, 10, 22), 364);
        // 364 days plus Monday padding is 52 or 53 columns.
        assert!(index.weeks.len() == 53 || index.weeks.len() == 54);
        let covered = index.weeks.len() as i64 * 7;
        assert!(covered >= 365);
    }

    #[test]
    fn test_date_keys_are_zero_padded() {
        let index = generate_weeks(utc(2025, 3, 5), 7);
        for week in &index.weeks {
            for cell in week {
                assert_eq!(cell.date.len(), 10);
            }
        }
    }

    #[test]
    fn test_month_labels_one_per_month() {
        let index = generate_weeks(utc(2025, 10, 22), 90);
        let labels = build_month_label_map(&index);

        // Window spans late July through October: Aug, Sep, Oct firsts.
        let names: Vec<&str> = labels.values().map(String::as_str).collect();
        assert_eq!(names, vec!["Aug", "Sep", "Oct"]);

        // Each labeled week actually contains the first of that month.
        for (week_index, _) in &labels {
            assert!(index.weeks[*week_index].iter().any(|c| c.day.day() == 1));
        }
    }

    #[test]
    fn test_month_labels_use_the_injected_formatter() {
        let index = generate_weeks(utc(2025, 10, 22), 90);
        let labels = build_month_label_map_with(&index, |day| format!("{:02}", day.month()));

        let names: Vec<&str> = labels.values().map(String::as_str).collect();
        assert_eq!(names, vec!["08", "09", "10"]);
    }

    #[test]
    fn test_month_labels_skip_firsts_outside_window() {
        // Window starts mid-month: the padded cells before start_date may
        // include a 1st that must not be labeled.
        let index = generate_weeks(utc(2025, 10, 22), 13);
        let labels = build_month_label_map(&index);
        assert!(labels.is_empty());
    }
}

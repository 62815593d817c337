//! Pure KPI computation: cumulative targets, completion and status

use crate::calendar::{CalendarConfig, DayCounts, MonthCalendar};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Status multiplier above which an actual counts as ahead of target
const AHEAD_FACTOR: f64 = 1.1;

/// One raw daily total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiEntry {
    #[serde(default)]
    pub date_label: String,
    pub iso_date: String,
    pub total: f64,
}

impl KpiEntry {
    pub fn new(iso_date: impl Into<String>, total: f64) -> Self {
        let iso_date = iso_date.into();
        Self {
            date_label: iso_date.clone(),
            iso_date,
            total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "ahead")]
    Ahead,
    #[serde(rename = "ontrack")]
    OnTrack,
    #[serde(rename = "behind")]
    Behind,
}

/// Classify an actual against its target.
///
/// A zero or negative target is always on track. Reaching the target up to and including
/// 110% of it is on track; strictly above that is ahead.
pub fn classify(actual: f64, target: f64) -> Status {
    if target <= 0.0 {
        return Status::OnTrack;
    }
    if actual > target * AHEAD_FACTOR {
        Status::Ahead
    } else if actual >= target {
        Status::OnTrack
    } else {
        Status::Behind
    }
}

fn percentage(actual: f64, target: f64) -> f64 {
    if target > 0.0 {
        actual / target * 100.0
    } else {
        0.0
    }
}

/// Values supplied by an external source that replace series sums
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActualOverrides {
    pub today: Option<f64>,
    pub month_to_date: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthPoint {
    pub date_label: String,
    pub iso_date: String,
    /// Short weekday name, empty when the date does not parse
    pub weekday: String,
    /// `DD/MM`, empty when the date does not parse
    pub formatted_date: String,
    pub total: f64,
    pub target: f64,
    pub percentage: f64,
    pub status: Status,
    pub is_today: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResult {
    pub today: String,
    pub end_date: String,
    pub selected_date: String,
    pub days_in_month: u32,
    pub day_counts: DayCounts,
    pub weekday_target_per_day: f64,
    pub monthly_target: f64,

    pub target_until_now: f64,
    pub current_revenue: f64,
    pub remaining_target: f64,
    pub current_percentage: f64,
    pub monthly_status: Status,

    pub daily_target: f64,
    pub daily_actual: f64,
    pub daily_percentage: f64,
    pub daily_status: Status,

    pub growth: Vec<GrowthPoint>,
}

pub(crate) fn parse_iso(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Resolve the three anchor dates, substituting the next anchor for any
/// malformed one: today falls back to the current UTC date, end date to
/// today and the selected date to the end date.
fn resolve_anchors(selected_date: &str, end_date: &str, today: &str) -> (NaiveDate, NaiveDate, NaiveDate) {
    let today = parse_iso(today).unwrap_or_else(|| {
        warn!(value = today, "Unparseable today date, using current UTC date");
        Utc::now().date_naive()
    });
    let end = parse_iso(end_date).unwrap_or_else(|| {
        warn!(value = end_date, "Unparseable end date, using today");
        today
    });
    let selected = parse_iso(selected_date).unwrap_or_else(|| {
        warn!(value = selected_date, "Unparseable selected date, using end date");
        end
    });
    (selected, end, today)
}

/// Month calendars keyed by (year, month), built on first use
struct Calendars<'a> {
    config: &'a CalendarConfig,
    months: HashMap<(i32, u32), MonthCalendar>,
}

impl<'a> Calendars<'a> {
    fn new(config: &'a CalendarConfig) -> Self {
        Self {
            config,
            months: HashMap::new(),
        }
    }

    fn month_of(&mut self, date: NaiveDate) -> &MonthCalendar {
        let config = self.config;
        self.months
            .entry((date.year(), date.month()))
            .or_insert_with(|| MonthCalendar::for_date(date, config))
    }

    fn target_for(&mut self, date: NaiveDate) -> f64 {
        self.month_of(date).target_for_day(date.day())
    }
}

/// Compute month-to-date and selected-day metrics for `series`
pub fn compute(
    series: &[KpiEntry],
    config: &CalendarConfig,
    selected_date: &str,
    end_date: &str,
    today: &str,
    overrides: ActualOverrides,
) -> MetricsResult {
    let (selected, end, today) = resolve_anchors(selected_date, end_date, today);
    let mut calendars = Calendars::new(config);

    let month = calendars.month_of(end).clone();
    let last_day = end.day().min(month.days_in_month());
    let target_until_now = month.cumulative_target(last_day);

    let parsed: Vec<Option<NaiveDate>> = series.iter().map(|e| parse_iso(&e.iso_date)).collect();
    let skipped = parsed.iter().filter(|d| d.is_none()).count();
    if skipped > 0 {
        debug!(skipped, "Series entries with unparseable dates excluded from sums");
    }

    let current_revenue = overrides.month_to_date.unwrap_or_else(|| {
        series
            .iter()
            .zip(&parsed)
            .filter_map(|(entry, date)| date.map(|d| (entry, d)))
            .filter(|(_, d)| month.contains(*d) && d.day() <= last_day)
            .map(|(entry, _)| entry.total)
            .sum()
    });

    let daily_target = calendars.target_for(selected);
    let daily_actual = overrides.today.unwrap_or_else(|| {
        series
            .iter()
            .zip(&parsed)
            .filter(|(_, date)| **date == Some(selected))
            .map(|(entry, _)| entry.total)
            .sum()
    });

    let growth = series
        .iter()
        .zip(&parsed)
        .map(|(entry, date)| match date {
            Some(d) => {
                let target = calendars.target_for(*d);
                GrowthPoint {
                    date_label: entry.date_label.clone(),
                    iso_date: entry.iso_date.clone(),
                    weekday: d.format("%a").to_string(),
                    formatted_date: d.format("%d/%m").to_string(),
                    total: entry.total,
                    target,
                    percentage: percentage(entry.total, target),
                    status: classify(entry.total, target),
                    is_today: *d == today,
                }
            }
            None => GrowthPoint {
                date_label: entry.date_label.clone(),
                iso_date: entry.iso_date.clone(),
                weekday: String::new(),
                formatted_date: String::new(),
                total: entry.total,
                target: 0.0,
                percentage: 0.0,
                status: Status::OnTrack,
                is_today: false,
            },
        })
        .collect();

    MetricsResult {
        today: today.to_string(),
        end_date: end.to_string(),
        selected_date: selected.to_string(),
        days_in_month: month.days_in_month(),
        day_counts: month.counts(),
        weekday_target_per_day: month.weekday_target_per_day(),
        monthly_target: config.monthly_target,
        target_until_now,
        current_revenue,
        remaining_target: (target_until_now - current_revenue).max(0.0),
        current_percentage: percentage(current_revenue, target_until_now),
        monthly_status: classify(current_revenue, target_until_now),
        daily_target,
        daily_actual,
        daily_percentage: percentage(daily_actual, daily_target),
        daily_status: classify(daily_actual, daily_target),
        growth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEEKDAY_TARGET: f64 = 3_000_000.0 / 22.0;

    fn september_series() -> Vec<KpiEntry> {
        vec![
            KpiEntry::new("2025-09-01", 160_000.0),
            KpiEntry::new("2025-09-02", 120_000.0),
            KpiEntry::new("2025-09-03", 140_000.0),
        ]
    }

    fn config() -> CalendarConfig {
        CalendarConfig::new(3_000_000.0)
    }

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(classify(100.0, 100.0), Status::OnTrack);
        assert_eq!(classify(110.0, 100.0), Status::OnTrack);
        assert_eq!(classify(110.01, 100.0), Status::Ahead);
        assert_eq!(classify(99.99, 100.0), Status::Behind);
    }

    #[test]
    fn test_classify_exact_ahead_threshold_is_ontrack() {
        let threshold = WEEKDAY_TARGET * 1.1;
        assert_eq!(classify(threshold, WEEKDAY_TARGET), Status::OnTrack);
        assert_eq!(classify(threshold + 1.0, WEEKDAY_TARGET), Status::Ahead);
    }

    #[test]
    fn test_classify_zero_target_is_ontrack() {
        assert_eq!(classify(0.0, 0.0), Status::OnTrack);
        assert_eq!(classify(1_000_000.0, 0.0), Status::OnTrack);
    }

    #[test]
    fn test_classify_negative_target_is_ontrack() {
        assert_eq!(classify(0.0, -5.0), Status::OnTrack);
        assert_eq!(classify(10.0, -1.0), Status::OnTrack);
        assert_eq!(classify(-20.0, -1.0), Status::OnTrack);
        assert_eq!(percentage(10.0, -1.0), 0.0);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&Status::Ahead).unwrap(), "\"ahead\"");
        assert_eq!(serde_json::to_string(&Status::OnTrack).unwrap(), "\"ontrack\"");
        assert_eq!(serde_json::to_string(&Status::Behind).unwrap(), "\"behind\"");
    }

    #[test]
    fn test_month_to_date_figures() {
        let result = compute(
            &september_series(),
            &config(),
            "2025-09-03",
            "2025-09-03",
            "2025-09-03",
            ActualOverrides::default(),
        );

        assert_eq!(result.days_in_month, 30);
        assert_eq!(result.day_counts.weekends, 8);
        assert!((result.weekday_target_per_day - WEEKDAY_TARGET).abs() < 1e-9);
        assert!((result.target_until_now - 3.0 * WEEKDAY_TARGET).abs() < 1e-6);
        assert_eq!(result.current_revenue, 420_000.0);
        assert_eq!(result.remaining_target, 0.0);
        assert!((result.current_percentage - 420_000.0 / (3.0 * WEEKDAY_TARGET) * 100.0).abs() < 1e-9);
        assert_eq!(result.monthly_status, Status::OnTrack);
    }

    #[test]
    fn test_selected_day_figures() {
        let result = compute(
            &september_series(),
            &config(),
            "2025-09-02",
            "2025-09-03",
            "2025-09-03",
            ActualOverrides::default(),
        );

        assert_eq!(result.selected_date, "2025-09-02");
        assert!((result.daily_target - WEEKDAY_TARGET).abs() < 1e-9);
        assert_eq!(result.daily_actual, 120_000.0);
        assert_eq!(result.daily_status, Status::Behind);
    }

    #[test]
    fn test_weekend_selected_day_with_zero_target_is_ontrack() {
        // 2025-09-06 is a Saturday
        let result = compute(
            &[KpiEntry::new("2025-09-06", 5.0)],
            &config(),
            "2025-09-06",
            "2025-09-06",
            "2025-09-06",
            ActualOverrides::default(),
        );

        assert_eq!(result.daily_target, 0.0);
        assert_eq!(result.daily_percentage, 0.0);
        assert_eq!(result.daily_status, Status::OnTrack);
    }

    #[test]
    fn test_overrides_replace_series_sums() {
        let result = compute(
            &september_series(),
            &config(),
            "2025-09-03",
            "2025-09-03",
            "2025-09-03",
            ActualOverrides {
                today: Some(10.0),
                month_to_date: Some(20.0),
            },
        );

        assert_eq!(result.daily_actual, 10.0);
        assert_eq!(result.current_revenue, 20.0);
        assert!((result.remaining_target - (3.0 * WEEKDAY_TARGET - 20.0)).abs() < 1e-6);
        assert_eq!(result.monthly_status, Status::Behind);
    }

    #[test]
    fn test_entries_outside_month_or_after_end_are_excluded() {
        let series = vec![
            KpiEntry::new("2025-08-29", 1_000.0),
            KpiEntry::new("2025-09-01", 10.0),
            KpiEntry::new("2025-09-04", 500.0),
        ];
        let result = compute(
            &series,
            &config(),
            "2025-09-02",
            "2025-09-02",
            "2025-09-02",
            ActualOverrides::default(),
        );

        assert_eq!(result.current_revenue, 10.0);
        assert_eq!(result.growth.len(), 3);
    }

    #[test]
    fn test_malformed_anchor_dates_fall_back() {
        let result = compute(
            &september_series(),
            &config(),
            "not-a-date",
            "2025/09/02",
            "2025-09-03",
            ActualOverrides::default(),
        );

        assert_eq!(result.today, "2025-09-03");
        assert_eq!(result.end_date, "2025-09-03");
        assert_eq!(result.selected_date, "2025-09-03");
        assert_eq!(result.daily_actual, 140_000.0);
    }

    #[test]
    fn test_malformed_today_uses_current_date() {
        let result = compute(&[], &config(), "", "", "garbage", ActualOverrides::default());
        let now = Utc::now().date_naive();

        // Allow for the clock crossing midnight between the two reads
        let resolved = parse_iso(&result.today).unwrap();
        assert!(resolved == now || resolved.succ_opt() == Some(now));
        assert_eq!(result.end_date, result.today);
        assert_eq!(result.selected_date, result.today);
    }

    #[test]
    fn test_growth_series_annotations() {
        let mut series = september_series();
        series.push(KpiEntry::new("2025-09-06", 0.0));
        let result = compute(
            &series,
            &config(),
            "2025-09-03",
            "2025-09-06",
            "2025-09-02",
            ActualOverrides::default(),
        );

        let first = &result.growth[0];
        assert_eq!(first.weekday, "Mon");
        assert_eq!(first.formatted_date, "01/09");
        assert!((first.target - WEEKDAY_TARGET).abs() < 1e-9);
        assert!((first.percentage - 160_000.0 / WEEKDAY_TARGET * 100.0).abs() < 1e-9);
        assert_eq!(first.status, Status::Ahead);
        assert!(!first.is_today);

        assert!(result.growth[1].is_today);
        assert_eq!(result.growth.iter().filter(|p| p.is_today).count(), 1);

        let saturday = &result.growth[3];
        assert_eq!(saturday.weekday, "Sat");
        assert_eq!(saturday.target, 0.0);
        assert_eq!(saturday.status, Status::OnTrack);
    }

    #[test]
    fn test_malformed_series_entry_in_growth_only() {
        let mut series = september_series();
        series.push(KpiEntry::new("09/03/2025", 1_000_000.0));
        let result = compute(
            &series,
            &config(),
            "2025-09-03",
            "2025-09-03",
            "2025-09-03",
            ActualOverrides::default(),
        );

        assert_eq!(result.current_revenue, 420_000.0);
        let malformed = &result.growth[3];
        assert_eq!(malformed.weekday, "");
        assert_eq!(malformed.target, 0.0);
        assert_eq!(malformed.percentage, 0.0);
        assert!(!malformed.is_today);
    }

    #[test]
    fn test_selected_day_in_other_month_uses_its_own_calendar() {
        // August 2025 has 21 weekdays
        let result = compute(
            &[],
            &config(),
            "2025-08-29",
            "2025-09-03",
            "2025-09-03",
            ActualOverrides::default(),
        );
        assert!((result.daily_target - 3_000_000.0 / 21.0).abs() < 1e-9);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = compute(
            &september_series(),
            &config(),
            "2025-09-03",
            "2025-09-03",
            "2025-09-03",
            ActualOverrides::default(),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("targetUntilNow").is_some());
        assert!(json.get("weekdayTargetPerDay").is_some());
        assert_eq!(json["dailyStatus"], "ontrack");
        assert_eq!(json["growth"][0]["formattedDate"], "01/09");
    }
}

//! Month calendar classification and per-day targets

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Target allocation for one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarConfig {
    pub monthly_target: f64,
    #[serde(default)]
    pub weekend_target_per_day: f64,
    #[serde(default)]
    pub holiday_target_per_day: f64,
    /// Day-of-month numbers that are holidays
    #[serde(default)]
    pub holiday_days: BTreeSet<u32>,
}

impl CalendarConfig {
    pub fn new(monthly_target: f64) -> Self {
        Self {
            monthly_target,
            weekend_target_per_day: 0.0,
            holiday_target_per_day: 0.0,
            holiday_days: BTreeSet::new(),
        }
    }

    pub fn with_weekend_target(mut self, per_day: f64) -> Self {
        self.weekend_target_per_day = per_day;
        self
    }

    pub fn with_holidays(mut self, days: impl IntoIterator<Item = u32>, per_day: f64) -> Self {
        self.holiday_days = days.into_iter().collect();
        self.holiday_target_per_day = per_day;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayKind {
    Weekday,
    Weekend,
    Holiday,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCounts {
    pub weekdays: u32,
    pub weekends: u32,
    pub holidays: u32,
}

/// One month classified against a [`CalendarConfig`]
#[derive(Debug, Clone)]
pub struct MonthCalendar {
    year: i32,
    month: u32,
    /// Index 0 is day 1
    kinds: Vec<DayKind>,
    counts: DayCounts,
    weekday_target_per_day: f64,
    weekend_target_per_day: f64,
    holiday_target_per_day: f64,
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(30)
}

fn classify_day(date: NaiveDate, holidays: &BTreeSet<u32>) -> DayKind {
    if holidays.contains(&date.day()) {
        DayKind::Holiday
    } else if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        DayKind::Weekend
    } else {
        DayKind::Weekday
    }
}

impl MonthCalendar {
    /// Classify the month containing `date`
    pub fn for_date(date: NaiveDate, config: &CalendarConfig) -> Self {
        let year = date.year();
        let month = date.month();
        let total_days = days_in_month(year, month);

        let mut kinds = Vec::with_capacity(total_days as usize);
        let mut counts = DayCounts::default();
        for day in 1..=total_days {
            let kind = NaiveDate::from_ymd_opt(year, month, day)
                .map(|d| classify_day(d, &config.holiday_days))
                .unwrap_or(DayKind::Weekday);
            match kind {
                DayKind::Weekday => counts.weekdays += 1,
                DayKind::Weekend => counts.weekends += 1,
                DayKind::Holiday => counts.holidays += 1,
            }
            kinds.push(kind);
        }

        let allocated = counts.holidays as f64 * config.holiday_target_per_day
            + counts.weekends as f64 * config.weekend_target_per_day;
        let weekday_target_per_day = if counts.weekdays == 0 {
            0.0
        } else {
            ((config.monthly_target - allocated) / counts.weekdays as f64).max(0.0)
        };

        Self {
            year,
            month,
            kinds,
            counts,
            weekday_target_per_day,
            weekend_target_per_day: config.weekend_target_per_day,
            holiday_target_per_day: config.holiday_target_per_day,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn days_in_month(&self) -> u32 {
        self.kinds.len() as u32
    }

    pub fn counts(&self) -> DayCounts {
        self.counts
    }

    pub fn weekday_target_per_day(&self) -> f64 {
        self.weekday_target_per_day
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn kind_of(&self, day: u32) -> Option<DayKind> {
        day.checked_sub(1)
            .and_then(|index| self.kinds.get(index as usize))
            .copied()
    }

    /// Target for a day of this month; 0 outside 1..=days_in_month
    pub fn target_for_day(&self, day: u32) -> f64 {
        match self.kind_of(day) {
            Some(DayKind::Weekday) => self.weekday_target_per_day,
            Some(DayKind::Weekend) => self.weekend_target_per_day,
            Some(DayKind::Holiday) => self.holiday_target_per_day,
            None => 0.0,
        }
    }

    /// Sum of per-day targets for days 1..=through_day, clamped to the month
    pub fn cumulative_target(&self, through_day: u32) -> f64 {
        let last = through_day.min(self.days_in_month());
        (1..=last).map(|day| self.target_for_day(day)).sum()
    }
}

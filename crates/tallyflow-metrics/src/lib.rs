//! Tallyflow Metrics Engine
//!
//! Derives calendar-aware KPI targets and statuses from a raw daily series:
//! - Month classification into weekdays, weekends and holidays
//! - Cumulative and daily target/actual/percentage figures
//! - A message protocol and a dedicated worker thread so callers never block

pub mod calendar;
pub mod engine;
pub mod protocol;
pub mod worker;

pub use calendar::{CalendarConfig, DayCounts, DayKind, MonthCalendar};
pub use engine::{ActualOverrides, GrowthPoint, KpiEntry, MetricsResult, Status, classify, compute};
pub use protocol::{
    DashboardWorkerInput, DashboardWorkerResult, WorkerRequest, WorkerResponse, handle_message,
    handle_request,
};
pub use worker::MetricsWorker;

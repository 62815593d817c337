//! End-to-end tests for the metrics worker message protocol

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tallyflow_metrics::{DashboardWorkerInput, KpiEntry, MetricsWorker, Status};

fn september_input(series: Vec<KpiEntry>) -> DashboardWorkerInput {
    DashboardWorkerInput {
        series,
        selected_date: "2025-09-10".to_string(),
        end_date: "2025-09-10".to_string(),
        today: "2025-09-10".to_string(),
        holidays: vec![],
        monthly_target: 3_000_000.0,
        weekend_target: 0.0,
        holiday_target: 0.0,
        actual_today: None,
        actual_month_to_date: None,
    }
}

fn daily_series(total: f64) -> Vec<KpiEntry> {
    (1..=10)
        .map(|day| KpiEntry::new(format!("2025-09-{:02}", day), total))
        .collect()
}

#[tokio::test]
async fn test_full_month_to_date_scenario() {
    let worker = MetricsWorker::spawn(None).unwrap();
    let result = worker
        .compute(september_input(daily_series(140_000.0)))
        .await
        .unwrap();

    let weekday_target = 3_000_000.0 / 22.0;
    // 1-10 September 2025 holds eight weekdays
    assert_eq!(result.day_counts.weekdays, 22);
    assert!((result.target_until_now - 8.0 * weekday_target).abs() < 1e-6);
    assert_eq!(result.current_revenue, 1_400_000.0);
    assert_eq!(result.monthly_status, Status::Ahead);
    assert_eq!(result.daily_status, Status::OnTrack);
    assert_eq!(result.growth.len(), 10);
    assert!(result.growth[9].is_today);
}

#[tokio::test]
async fn test_raw_messages_use_tagged_json() {
    let worker = MetricsWorker::spawn(None).unwrap();
    let request = json!({
        "type": "compute",
        "payload": {
            "series": [{"dateLabel": "1 Sep", "isoDate": "2025-09-01", "total": 10.0}],
            "selectedDate": "2025-09-01",
            "endDate": "2025-09-01",
            "today": "2025-09-01",
            "monthlyTarget": 0.0
        }
    });

    let reply = worker.send(request.to_string()).await.unwrap().unwrap();
    let reply: Value = serde_json::from_str(&reply).unwrap();

    assert_eq!(reply["type"], "success");
    assert_eq!(reply["payload"]["dailyTarget"], 0.0);
    assert_eq!(reply["payload"]["dailyStatus"], "ontrack");
    assert_eq!(reply["payload"]["monthlyStatus"], "ontrack");
}

#[tokio::test]
async fn test_caller_can_bound_wait_on_ignored_message() {
    let worker = MetricsWorker::spawn(None).unwrap();
    let receiver = worker.post(r#"{"type": "refresh"}"#.to_string()).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(1), receiver)
        .await
        .expect("worker should settle the reply channel");
    assert!(outcome.is_err());
}

#[tokio::test]
async fn test_concurrent_callers_each_get_their_own_response() {
    let worker = Arc::new(MetricsWorker::spawn(None).unwrap());

    let mut handles = Vec::new();
    for i in 1..=8u32 {
        let worker = worker.clone();
        handles.push(tokio::spawn(async move {
            let mut input = september_input(vec![]);
            input.actual_today = Some(i as f64);
            worker.compute(input).await.map(|r| (i, r.daily_actual))
        }));
    }

    for handle in handles {
        let (i, daily_actual) = handle.await.unwrap().unwrap();
        assert_eq!(daily_actual, i as f64);
    }
}

#[tokio::test]
async fn test_holidays_and_weekend_targets_through_worker() {
    let worker = MetricsWorker::spawn(None).unwrap();
    let mut input = september_input(vec![KpiEntry::new("2025-09-06", 60_000.0)]);
    input.selected_date = "2025-09-06".to_string();
    input.weekend_target = 50_000.0;
    input.holidays = vec![1];
    input.holiday_target = 0.0;

    let result = worker.compute(input).await.unwrap();

    assert_eq!(result.day_counts.holidays, 1);
    assert_eq!(result.day_counts.weekdays, 21);
    assert_eq!(result.daily_target, 50_000.0);
    assert_eq!(result.daily_status, Status::Ahead);
    let expected_weekday = (3_000_000.0 - 8.0 * 50_000.0) / 21.0;
    assert!((result.weekday_target_per_day - expected_weekday).abs() < 1e-9);
}

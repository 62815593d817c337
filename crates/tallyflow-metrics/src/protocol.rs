//! Worker message protocol
//!
//! Requests and responses are JSON objects tagged by `type`:
//! `{"type": "compute", "payload": ...}` in, and either
//! `{"type": "success", "payload": ...}` or `{"type": "error", "error": ...}` out.
//! Messages with any other `type` are ignored and produce no response.

use crate::calendar::CalendarConfig;
use crate::engine::{ActualOverrides, KpiEntry, MetricsResult, compute};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};

/// Payload of a `compute` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardWorkerInput {
    #[serde(default)]
    pub series: Vec<KpiEntry>,
    #[serde(default)]
    pub selected_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub today: String,
    /// Day-of-month numbers
    #[serde(default)]
    pub holidays: Vec<u32>,
    pub monthly_target: f64,
    #[serde(default)]
    pub weekend_target: f64,
    #[serde(default)]
    pub holiday_target: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_today: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_month_to_date: Option<f64>,
}

pub type DashboardWorkerResult = MetricsResult;

impl DashboardWorkerInput {
    pub fn calendar(&self) -> CalendarConfig {
        CalendarConfig::new(self.monthly_target)
            .with_weekend_target(self.weekend_target)
            .with_holidays(self.holidays.iter().copied(), self.holiday_target)
    }

    pub fn overrides(&self) -> ActualOverrides {
        ActualOverrides {
            today: self.actual_today,
            month_to_date: self.actual_month_to_date,
        }
    }

    fn validate(&self) -> tallyflow_core::Result<()> {
        let targets = [
            ("monthlyTarget", self.monthly_target),
            ("weekendTarget", self.weekend_target),
            ("holidayTarget", self.holiday_target),
        ];
        for (name, value) in targets {
            if !value.is_finite() || value < 0.0 {
                return Err(tallyflow_core::Error::InvalidRequest(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Validate and compute
    pub fn run(&self) -> tallyflow_core::Result<DashboardWorkerResult> {
        self.validate()?;
        Ok(compute(
            &self.series,
            &self.calendar(),
            &self.selected_date,
            &self.end_date,
            &self.today,
            self.overrides(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerRequest {
    Compute { payload: DashboardWorkerInput },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerResponse {
    Success { payload: DashboardWorkerResult },
    Error { error: String },
}

impl WorkerResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkerResponse::Success { .. })
    }

    pub fn into_result(self) -> tallyflow_core::Result<DashboardWorkerResult> {
        match self {
            WorkerResponse::Success { payload } => Ok(payload),
            WorkerResponse::Error { error } => Err(tallyflow_core::Error::Metrics(error)),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "computation panicked".to_string()
    }
}

/// Handle a typed request. Failures, including panics, become `error` responses.
pub fn handle_request(request: WorkerRequest) -> WorkerResponse {
    match request {
        WorkerRequest::Compute { payload } => {
            match panic::catch_unwind(AssertUnwindSafe(|| payload.run())) {
                Ok(Ok(result)) => WorkerResponse::Success { payload: result },
                Ok(Err(e)) => WorkerResponse::Error {
                    error: e.to_string(),
                },
                Err(panic) => {
                    let message = panic_message(panic);
                    error!(error = %message, "Metrics computation panicked");
                    WorkerResponse::Error { error: message }
                }
            }
        }
    }
}

/// Decode a raw message and handle it. `None` means the message is ignored.
pub(crate) fn dispatch(raw: &str) -> Option<WorkerResponse> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Ignoring message that is not JSON");
            return None;
        }
    };

    match value.get("type").and_then(Value::as_str) {
        Some("compute") => {}
        other => {
            debug!(message_type = ?other, "Ignoring message with unrecognised type");
            return None;
        }
    }

    let response = match serde_json::from_value::<WorkerRequest>(value) {
        Ok(request) => handle_request(request),
        Err(e) => WorkerResponse::Error {
            error: format!("Invalid compute payload: {}", e),
        },
    };
    Some(response)
}

pub(crate) fn encode(response: &WorkerResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        error!(error = %e, "Failed to serialize worker response");
        serde_json::json!({ "type": "error", "error": e.to_string() }).to_string()
    })
}

/// Handle one raw JSON message, returning the serialized response if any
pub fn handle_message(raw: &str) -> Option<String> {
    dispatch(raw).map(|response| encode(&response))
}

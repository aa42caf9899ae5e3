use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Created,
    Running,
    Succeeded,
    Failed,
}

impl PredictionStatus {
    /// Maps provider status strings onto the four lifecycle states.
    /// Unknown strings count as still running so the poller keeps its
    /// attempt budget in charge of termination.
    pub fn parse(raw: &str) -> PredictionStatus {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" | "starting" | "queued" | "pending" => PredictionStatus::Created,
            "succeeded" | "success" | "completed" | "complete" => PredictionStatus::Succeeded,
            "failed" | "error" | "canceled" | "cancelled" | "aborted" => PredictionStatus::Failed,
            _ => PredictionStatus::Running,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PredictionStatus::Succeeded | PredictionStatus::Failed)
    }
}

/// Provider-side asynchronous job as last observed by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionJob {
    pub id: String,
    pub status: PredictionStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl PredictionJob {
    /// Reads `{id, status, output?, error?}`. Returns `None` when the id is
    /// missing, since such a job can never be polled.
    pub fn from_value(payload: &Value) -> Option<PredictionJob> {
        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())?
            .to_string();
        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .map(PredictionStatus::parse)
            .unwrap_or(PredictionStatus::Created);
        let output = payload.get("output").filter(|value| !value.is_null()).cloned();
        let error = match payload.get("error") {
            Some(Value::String(message)) if !message.trim().is_empty() => {
                Some(message.trim().to_string())
            }
            Some(Value::Null) | None => None,
            Some(Value::String(_)) => None,
            Some(other) => Some(other.to_string()),
        };
        Some(PredictionJob {
            id,
            status,
            output,
            error,
        })
    }
}

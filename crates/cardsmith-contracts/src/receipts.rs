use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::card::{GenerationRequest, GenerationResult};
use crate::scenario::Scenario;

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// What happened for one card request, written next to the artifacts so an
/// operator can see which provider produced the image or why it fell back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardReceipt {
    pub request_id: String,
    pub created_at: String,
    pub request: GenerationRequest,
    pub scenario: Option<Scenario>,
    pub provider: Option<String>,
    pub result: GenerationResult,
    pub message: String,
    #[serde(default)]
    pub failures: Vec<String>,
}

pub fn build_receipt(receipt: &CardReceipt, extra: Option<&Map<String, Value>>) -> Value {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    if let Value::Object(fields) = serde_json::to_value(receipt).unwrap_or(Value::Null) {
        for (key, value) in fields {
            root.insert(key, sanitize_payload(&value));
        }
    }
    if let Some(extra) = extra {
        for (key, value) in extra {
            root.insert(key.clone(), sanitize_payload(value));
        }
    }
    Value::Object(root)
}

pub fn write_receipt(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}

fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::String(raw) => {
            if raw.trim_start().starts_with("data:") {
                Value::String("<omitted>".to_string())
            } else {
                value.clone()
            }
        }
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                let lowered = key.to_ascii_lowercase();
                if matches!(
                    lowered.as_str(),
                    "b64_json" | "image_bytes" | "data" | "base64"
                ) {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
    }
}

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Lifecycle points of one card request, in the order they usually occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RequestStarted,
    ScenarioSelected,
    ProviderAttempt,
    ProviderFailed,
    ArtifactCreated,
    FallbackStarted,
    FallbackFailed,
    MessageComposed,
    RequestFinished,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::RequestStarted => "request_started",
            EventKind::ScenarioSelected => "scenario_selected",
            EventKind::ProviderAttempt => "provider_attempt",
            EventKind::ProviderFailed => "provider_failed",
            EventKind::ArtifactCreated => "artifact_created",
            EventKind::FallbackStarted => "fallback_started",
            EventKind::FallbackFailed => "fallback_failed",
            EventKind::MessageComposed => "message_composed",
            EventKind::RequestFinished => "request_finished",
        }
    }
}

/// Append-only writer for the pipeline's `events.jsonl`.
///
/// - default fields are `type`, `session_id`, `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
/// - a discarding writer builds the same event but never touches disk
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: Option<PathBuf>,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: Some(path.into()),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn discard(session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: None,
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Handle for one card request; shares this writer's file and session.
    pub fn for_request(&self, request_id: impl Into<String>) -> RequestEvents {
        RequestEvents {
            writer: self.clone(),
            request_id: request_id.into(),
        }
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        let Some(path) = self.inner.path.as_ref() else {
            return Ok(Value::Object(event));
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

/// Events of a single card request. Every line carries `request_id`
/// between the session defaults and the caller payload.
#[derive(Debug, Clone)]
pub struct RequestEvents {
    writer: EventWriter,
    request_id: String,
}

impl RequestEvents {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn emit(&self, kind: EventKind, payload: EventPayload) -> anyhow::Result<Value> {
        let mut stamped = EventPayload::new();
        stamped.insert(
            "request_id".to_string(),
            Value::String(self.request_id.clone()),
        );
        stamped.extend(payload);
        self.writer.emit(kind.as_str(), stamped)
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

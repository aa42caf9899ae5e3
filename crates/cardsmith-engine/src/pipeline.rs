use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use cardsmith_contracts::card::{GenerationRequest, GenerationResult};
use cardsmith_contracts::events::{EventKind, EventWriter};
use cardsmith_contracts::receipts::{build_receipt, write_receipt, CardReceipt};
use cardsmith_contracts::scenario::Scenario;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::composer::{
    fallback_message, ChatCompletionsClient, ComposedMessage, MessageComposer, MessageInputs,
    TextProvider,
};
use crate::compositor::DeterministicCompositor;
use crate::config::PipelineConfig;
use crate::describe::PortraitDescriber;
use crate::error::PipelineError;
use crate::orchestrator::{compositor_fallback, record_event, ImageGenerationOrchestrator};
use crate::providers::build_providers;
use crate::store::ArtifactStore;

/// Everything the calling workflow needs to show or send one card.
#[derive(Debug, Clone, PartialEq)]
pub struct CardPreview {
    pub request_id: String,
    pub result: GenerationResult,
    pub message: ComposedMessage,
    pub scenario: Option<Scenario>,
    pub provider: Option<String>,
    pub failures: Vec<String>,
}

impl CardPreview {
    pub fn to_json(&self) -> Value {
        json!({
            "request_id": self.request_id,
            "image_path": self.result.image_path,
            "used_fallback": self.result.used_fallback,
            "message": self.message.text,
            "scenario": self.scenario.map(Scenario::slug),
            "provider": self.provider,
            "failures": self.failures,
        })
    }
}

/// One card request end to end: image generation and message composition
/// run side by side, then a receipt is written.
pub struct CardPipeline {
    orchestrator: ImageGenerationOrchestrator,
    composer: MessageComposer,
    events: EventWriter,
    receipts_dir: Option<PathBuf>,
}

impl CardPipeline {
    pub fn new(orchestrator: ImageGenerationOrchestrator, composer: MessageComposer) -> Self {
        Self {
            orchestrator,
            composer,
            events: EventWriter::discard("cardsmith"),
            receipts_dir: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = events;
        self
    }

    pub fn with_receipts_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.receipts_dir = dir;
        self
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let store = Arc::new(
            ArtifactStore::new(&config.content_dir, &config.public_prefix)
                .with_file_prefix(&config.artifact_prefix),
        );
        let text: Option<Arc<dyn TextProvider>> = config.text.clone().map(|settings| {
            Arc::new(ChatCompletionsClient::new(settings, config.request_timeout))
                as Arc<dyn TextProvider>
        });
        let composer = MessageComposer::new(text.clone());
        if !composer.has_provider() {
            warn!("no text provider configured; messages use the template");
        }
        let describer = if config.describe_portraits {
            if text.is_none() {
                warn!("portrait descriptions requested but no text provider is configured");
            }
            PortraitDescriber::new(text)
        } else {
            PortraitDescriber::default()
        };

        let session_id = Uuid::new_v4().to_string();
        let events = match &config.events_path {
            Some(path) => EventWriter::new(path, session_id),
            None => EventWriter::discard(session_id),
        };
        info!(
            session_id = events.session_id(),
            events = ?events.path(),
            "card pipeline configured"
        );

        let providers = build_providers(config);
        if providers.is_empty() {
            warn!("no image provider available; every card uses the fallback composite");
        }
        let mut orchestrator = ImageGenerationOrchestrator::new(
            providers,
            store,
            compositor_fallback(Arc::new(DeterministicCompositor::default())),
        )
        .with_aspect_ratio(config.aspect_ratio.clone())
        .with_describer(describer)
        .with_events(events.clone());
        if let Some(seed) = config.seed {
            orchestrator = orchestrator.with_seed(seed);
        }

        Ok(Self::new(orchestrator, composer)
            .with_events(events)
            .with_receipts_dir(config.receipts_dir.clone()))
    }

    pub fn orchestrator(&self) -> &ImageGenerationOrchestrator {
        &self.orchestrator
    }

    pub fn composer(&self) -> &MessageComposer {
        &self.composer
    }

    /// Validates the request, reads both photos, then generates the image
    /// and the message concurrently. Only `InvalidRequest` and `Read`
    /// escape; a failed fallback shows up as an empty image path.
    pub fn preview(&self, request: &GenerationRequest) -> Result<CardPreview, PipelineError> {
        let blank = request.blank_fields();
        if !blank.is_empty() {
            return Err(PipelineError::InvalidRequest(format!(
                "blank fields: {}",
                blank.join(", ")
            )));
        }

        let request_id = Uuid::new_v4().to_string();
        let events = self.events.for_request(&request_id);
        record_event(
            &events,
            EventKind::RequestStarted,
            json!({
                "sender_name": request.sender_name,
                "recipient_name": request.recipient_name,
                "providers": self.orchestrator.provider_names(),
            }),
        );
        let inputs = self.orchestrator.prepare(request).map_err(|err| {
            warn!(request_id = %request_id, error = %err, "photo could not be read");
            err
        })?;

        let message_inputs = MessageInputs {
            personal_message: &request.personal_message,
            recipient_word: &request.recipient_word,
            sender_name: &request.sender_name,
            recipient_name: &request.recipient_name,
        };
        let (report, message) = thread::scope(|scope| {
            let composing = scope.spawn(|| self.composer.compose(&message_inputs));
            let report = self.orchestrator.generate(&request_id, request, &inputs);
            let message = composing.join().unwrap_or_else(|_| {
                warn!(request_id = %request_id, "message thread panicked; using template");
                ComposedMessage {
                    text: fallback_message(&request.personal_message, &request.recipient_word),
                    used_fallback: true,
                }
            });
            (report, message)
        });
        record_event(
            &events,
            EventKind::MessageComposed,
            json!({ "used_fallback": message.used_fallback }),
        );

        let preview = CardPreview {
            request_id,
            result: report.result,
            message,
            scenario: report.scenario,
            provider: report.provider,
            failures: report.failures,
        };
        self.write_receipt(request, &preview);
        info!(
            request_id = %preview.request_id,
            image_path = %preview.result.image_path,
            used_fallback = preview.result.used_fallback,
            "card preview ready"
        );
        record_event(
            &events,
            EventKind::RequestFinished,
            json!({
                "image_path": preview.result.image_path,
                "used_fallback": preview.result.used_fallback,
                "provider": preview.provider,
            }),
        );
        Ok(preview)
    }

    fn write_receipt(&self, request: &GenerationRequest, preview: &CardPreview) {
        let Some(dir) = &self.receipts_dir else {
            return;
        };
        let receipt = CardReceipt {
            request_id: preview.request_id.clone(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            request: request.clone(),
            scenario: preview.scenario,
            provider: preview.provider.clone(),
            result: preview.result.clone(),
            message: preview.message.text.clone(),
            failures: preview.failures.clone(),
        };
        let extra = json!({
            "message_used_fallback": preview.message.used_fallback,
            "session_id": self.events.session_id(),
        });
        let payload = build_receipt(&receipt, extra.as_object());
        let path = dir.join(format!("receipt-{}.json", preview.request_id));
        if let Err(err) = write_receipt(&path, &payload) {
            warn!(path = %path.display(), error = %err, "receipt write failed");
        }
    }
}

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use cardsmith_contracts::card::{GenerationRequest, GenerationResult};
use cardsmith_contracts::events::{EventKind, EventWriter, RequestEvents};
use cardsmith_contracts::scenario::Scenario;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::codec::{encode_file, sniff_extension, EncodedImage};
use crate::compositor::DeterministicCompositor;
use crate::describe::PortraitDescriber;
use crate::error::PipelineError;
use crate::prompt::{build_image_prompt, PromptSubjects};
use crate::providers::{ImagePrompt, ImageProvider};
use crate::store::{ArtifactStore, StoredArtifact};

/// The deterministic last resort, resolved once when the orchestrator is
/// built: `(sender photo, recipient photo, store) -> artifact`.
pub type FallbackFn = Arc<
    dyn Fn(&Path, &Path, &ArtifactStore) -> Result<StoredArtifact, PipelineError> + Send + Sync,
>;

pub fn compositor_fallback(compositor: Arc<DeterministicCompositor>) -> FallbackFn {
    Arc::new(move |left: &Path, right: &Path, store: &ArtifactStore| {
        compositor.compose_to_store(left, right, store)
    })
}

/// Both photos, read and base64-encoded once per request.
#[derive(Debug, Clone)]
pub struct PreparedInputs {
    pub sender: EncodedImage,
    pub recipient: EncodedImage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub result: GenerationResult,
    /// `None` when no provider tier was configured.
    pub scenario: Option<Scenario>,
    /// Name of the provider that produced the image, if any did.
    pub provider: Option<String>,
    /// One line per failed tier, in the order they were tried.
    pub failures: Vec<String>,
}

/// Tries each image provider in order and falls back to the deterministic
/// composite when all of them fail. Only photo read errors escape.
pub struct ImageGenerationOrchestrator {
    providers: Vec<Box<dyn ImageProvider>>,
    store: Arc<ArtifactStore>,
    fallback: FallbackFn,
    rng: Mutex<StdRng>,
    aspect_ratio: String,
    describer: PortraitDescriber,
    events: EventWriter,
}

impl ImageGenerationOrchestrator {
    pub fn new(
        providers: Vec<Box<dyn ImageProvider>>,
        store: Arc<ArtifactStore>,
        fallback: FallbackFn,
    ) -> Self {
        Self {
            providers,
            store,
            fallback,
            rng: Mutex::new(StdRng::from_entropy()),
            aspect_ratio: crate::config::DEFAULT_ASPECT_RATIO.to_string(),
            describer: PortraitDescriber::default(),
            events: EventWriter::discard("cardsmith"),
        }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: impl Into<String>) -> Self {
        self.aspect_ratio = aspect_ratio.into();
        self
    }

    pub fn with_describer(mut self, describer: PortraitDescriber) -> Self {
        self.describer = describer;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = events;
        self
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect()
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn pick_scenario(&self) -> Scenario {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Scenario::pick(&mut *rng)
    }

    /// Reads and encodes both photos. Fails with `Read` before any provider
    /// is contacted.
    pub fn prepare(&self, request: &GenerationRequest) -> Result<PreparedInputs, PipelineError> {
        Ok(PreparedInputs {
            sender: encode_file(&request.sender_photo)?,
            recipient: encode_file(&request.recipient_photo)?,
        })
    }

    pub fn run(
        &self,
        request_id: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationReport, PipelineError> {
        let inputs = self.prepare(request)?;
        Ok(self.generate(request_id, request, &inputs))
    }

    pub fn generate(
        &self,
        request_id: &str,
        request: &GenerationRequest,
        inputs: &PreparedInputs,
    ) -> GenerationReport {
        let events = self.events.for_request(request_id);
        let mut failures = Vec::new();
        let mut scenario = None;

        if !self.providers.is_empty() {
            let picked = self.pick_scenario();
            scenario = Some(picked);
            record_event(
                &events,
                EventKind::ScenarioSelected,
                json!({ "scenario": picked.slug() }),
            );
            let prompt = self.build_prompt(picked, request, inputs);

            for provider in &self.providers {
                let name = provider.name();
                record_event(&events, EventKind::ProviderAttempt, json!({ "provider": name }));
                match self.attempt(provider.as_ref(), &prompt) {
                    Ok(stored) => {
                        info!(
                            request_id,
                            provider = name,
                            path = %stored.public_path,
                            "card image generated"
                        );
                        record_event(
                            &events,
                            EventKind::ArtifactCreated,
                            json!({
                                "provider": name,
                                "image_path": stored.public_path,
                                "used_fallback": false,
                            }),
                        );
                        return GenerationReport {
                            result: GenerationResult::generated(stored.public_path),
                            scenario,
                            provider: Some(name.to_string()),
                            failures,
                        };
                    }
                    Err(err) => {
                        let recoverable = err.is_recoverable();
                        if recoverable {
                            warn!(
                                request_id,
                                provider = name,
                                kind = err.kind(),
                                error = %err,
                                "image provider failed"
                            );
                        } else {
                            error!(
                                request_id,
                                provider = name,
                                kind = err.kind(),
                                error = %err,
                                "image provider failed with an unexpected error"
                            );
                        }
                        record_event(
                            &events,
                            EventKind::ProviderFailed,
                            json!({
                                "provider": name,
                                "kind": err.kind(),
                                "recoverable": recoverable,
                                "error": err.to_string(),
                            }),
                        );
                        failures.push(format!("{name}: {err}"));
                    }
                }
            }
        }

        record_event(
            &events,
            EventKind::FallbackStarted,
            json!({ "failed_tiers": failures.len() }),
        );
        let result = match (self.fallback)(
            &request.sender_photo,
            &request.recipient_photo,
            &self.store,
        ) {
            Ok(stored) => {
                info!(request_id, path = %stored.public_path, "fallback composite stored");
                record_event(
                    &events,
                    EventKind::ArtifactCreated,
                    json!({
                        "provider": Value::Null,
                        "image_path": stored.public_path,
                        "used_fallback": true,
                    }),
                );
                GenerationResult::fallback(stored.public_path)
            }
            Err(err) => {
                error!(request_id, error = %err, "fallback composite failed; no image available");
                record_event(
                    &events,
                    EventKind::FallbackFailed,
                    json!({
                        "kind": err.kind(),
                        "error": err.to_string(),
                    }),
                );
                failures.push(format!("fallback: {err}"));
                GenerationResult::unavailable()
            }
        };

        GenerationReport {
            result,
            scenario,
            provider: None,
            failures,
        }
    }

    fn build_prompt(
        &self,
        scenario: Scenario,
        request: &GenerationRequest,
        inputs: &PreparedInputs,
    ) -> ImagePrompt {
        let descriptions = self.describer.is_enabled().then(|| {
            (
                self.describer.describe(&inputs.sender, "sender"),
                self.describer.describe(&inputs.recipient, "recipient"),
            )
        });
        let subjects = PromptSubjects {
            sender_name: &request.sender_name,
            recipient_name: &request.recipient_name,
            sender_description: descriptions.as_ref().map(|(sender, _)| sender.as_str()),
            recipient_description: descriptions.as_ref().map(|(_, recipient)| recipient.as_str()),
        };
        ImagePrompt {
            text: build_image_prompt(scenario, &self.aspect_ratio, &subjects),
            aspect_ratio: self.aspect_ratio.clone(),
            images: vec![inputs.sender.clone(), inputs.recipient.clone()],
        }
    }

    /// Provider output is only accepted when its bytes sniff as an image.
    fn attempt(
        &self,
        provider: &dyn ImageProvider,
        prompt: &ImagePrompt,
    ) -> Result<StoredArtifact, PipelineError> {
        let image = provider.generate(prompt)?;
        let extension = sniff_extension(&image.bytes).ok_or_else(|| {
            PipelineError::decode(
                provider.name(),
                format!(
                    "payload of {} bytes ({}) is not a recognised image",
                    image.bytes.len(),
                    image.mime_type.as_deref().unwrap_or("no content type")
                ),
            )
        })?;
        self.store.write(&image.bytes, extension)
    }

}

/// Event writes never fail a request; a write error is only logged.
pub(crate) fn record_event(events: &RequestEvents, kind: EventKind, payload: Value) {
    if let Value::Object(payload) = payload {
        if let Err(err) = events.emit(kind, payload) {
            warn!(event_type = kind.as_str(), error = %err, "event write failed");
        }
    }
}

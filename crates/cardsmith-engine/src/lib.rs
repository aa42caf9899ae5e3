//! Festive card generation: AI image providers with a deterministic
//! composite fallback, plus greeting text composition.

pub mod codec;
pub mod composer;
pub mod compositor;
pub mod config;
pub mod describe;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod poller;
pub mod prompt;
pub mod providers;
pub mod store;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use composer::{fallback_message, ComposedMessage, MessageComposer, MessageInputs};
pub use compositor::{CompositeLayout, DeterministicCompositor};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use orchestrator::{GenerationReport, ImageGenerationOrchestrator};
pub use pipeline::{CardPipeline, CardPreview};
pub use poller::{PollPolicy, PredictionPoller};
pub use store::{ArtifactStore, StoredArtifact};

use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy of the card pipeline.
///
/// Only `Read`, `InvalidRequest` and `Config` ever reach a caller of the
/// pipeline. `Composite` is reported as an empty image path. Everything
/// else is recovered by moving on to the next provider or the fallback.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed reading photo {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{provider} transport failed: {message}")]
    ProviderTransport { provider: String, message: String },

    #[error("{provider} prediction {job_id} not finished after {attempts} polls")]
    ProviderTimeout {
        provider: String,
        job_id: String,
        attempts: u32,
    },

    #[error("{provider} prediction {job_id} failed: {message}")]
    PredictionFailed {
        provider: String,
        job_id: String,
        message: String,
    },

    #[error("{provider} response could not be decoded: {message}")]
    Decode { provider: String, message: String },

    #[error("fallback composite failed while {stage}: {message}")]
    Composite { stage: &'static str, message: String },

    #[error("artifact write failed at {}: {source}", .path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn transport(provider: &str, message: impl Into<String>) -> Self {
        Self::ProviderTransport {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn decode(provider: &str, message: impl Into<String>) -> Self {
        Self::Decode {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn composite(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Composite {
            stage,
            message: err.to_string(),
        }
    }

    /// True for failures the orchestrator absorbs by trying the next tier.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ProviderTransport { .. }
                | Self::ProviderTimeout { .. }
                | Self::PredictionFailed { .. }
                | Self::Decode { .. }
                | Self::Store { .. }
        )
    }

    /// Short machine tag used in events and receipts.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read_error",
            Self::ProviderTransport { .. } => "provider_transport_error",
            Self::ProviderTimeout { .. } => "provider_timeout",
            Self::PredictionFailed { .. } => "prediction_failed",
            Self::Decode { .. } => "decode_error",
            Self::Composite { .. } => "composite_error",
            Self::Store { .. } => "store_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Config(_) => "config_error",
        }
    }
}

//! Error types for the region-description conversion pipeline.

use thiserror::Error;

/// Everything that can go wrong while converting a dataset.
///
/// Only [`EtlError::RenderUnavailable`] is recovered by the pipeline; every
/// other variant terminates the run.
#[derive(Error, Debug)]
pub enum EtlError {
    /// The source could not be opened, read, or decoded.
    #[error("source unavailable: {context}")]
    SourceUnavailable {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Image dimensions handed to the normalizer were not strictly positive.
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimension { width: f64, height: f64 },

    /// The verification renderer could not produce its image.
    #[error("render unavailable: {message}")]
    RenderUnavailable { message: String },

    /// A record could not be encoded as JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Output could not be created or written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EtlError {
    pub fn source_unavailable(
        context: impl Into<String>,
        error: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SourceUnavailable {
            context: context.into(),
            source: error.into(),
        }
    }

    pub fn render_unavailable(message: impl Into<String>) -> Self {
        Self::RenderUnavailable {
            message: message.into(),
        }
    }

    /// Whether the pipeline may log this error and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RenderUnavailable { .. })
    }
}

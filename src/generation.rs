//! Boundary to the text-generation service.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::prompt::{Message, ResolveError};

/// Failure of one generation request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The request could not be started.
    #[error("generation request failed: {0}")]
    Request(String),
    /// The stream broke after it started.
    #[error("generation stream interrupted: {0}")]
    Stream(String),
    /// The selected encrypted template could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Per-request backend options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Model identifier passed through to the service.
    pub model: String,
}

/// Streaming generation backend.
///
/// Implementations send zero or more fragments of arbitrary length through
/// `chunks` and return once the stream ends. A closed `chunks` receiver
/// means the caller lost interest; implementations should stop early.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Streams the model's reply to `messages` into `chunks`.
    async fn generate_content_stream(
        &self,
        messages: Vec<Message>,
        options: GenerationOptions,
        chunks: mpsc::UnboundedSender<String>,
    ) -> Result<(), GenerationError>;
}

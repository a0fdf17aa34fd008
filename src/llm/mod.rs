//! Text-generation collaborator.
//!
//! The pipeline only ever sees the [`TextGenerator`] trait: a prompt goes in,
//! text and token usage come out, and any failure is an [`LlmError`] that the
//! call site converts into its documented fallback.
//!
//! [`LlmError`]: crate::error::LlmError

mod client;
mod types;

pub use client::LlmClient;
pub use types::{Generation, GenerationRequest, TokenUsage};

use async_trait::async_trait;

use crate::error::LlmResult;

/// Opaque prompt-in/text-out generation service.
///
/// Implementations own timeouts, retries and cancellation; the core treats
/// every error as a generic generation failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for a single prompt.
    async fn generate(&self, request: GenerationRequest) -> LlmResult<Generation>;
}

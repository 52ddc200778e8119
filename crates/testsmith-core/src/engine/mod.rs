//! LLM engine interface.
//!
//! An engine takes one user message and returns the model's completion as
//! plain text. System instructions are fixed when the engine is built, so an
//! engine instance is bound to a single language's prompt.

pub mod anthropic;
pub mod config;

pub use anthropic::AnthropicEngine;
pub use config::EngineConfig;

use async_trait::async_trait;

/// Failures surfaced by an [`LlmEngine`].
///
/// None of these are retried; they propagate to whoever sent the message.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The provider rejected the credentials.
    #[error("{provider}: authentication failed (check the API key)")]
    AuthFailed { provider: String },

    /// The provider throttled the request.
    #[error("{provider}: rate limited{}", retry_after.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited {
        provider: String,
        retry_after: Option<u64>,
    },

    /// The request never produced an HTTP response (DNS, TLS, timeout, ...).
    #[error("{provider}: request failed: {reason}")]
    Request { provider: String, reason: String },

    /// The provider answered with a non-success status.
    #[error("{provider}: HTTP {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    /// The response body could not be decoded.
    #[error("{provider}: invalid response: {reason}")]
    InvalidResponse { provider: String, reason: String },

    /// The response decoded but contained no text.
    #[error("{provider}: response contained no text content")]
    EmptyResponse { provider: String },

    /// The engine could not be constructed.
    #[error("engine configuration error: {0}")]
    Config(String),
}

/// A remote language model that answers one message at a time.
///
/// Object-safe so adapters can hold an `Arc<dyn LlmEngine>` and tests can
/// substitute scripted engines.
#[async_trait]
pub trait LlmEngine: Send + Sync {
    /// Short provider name used in logs and errors (e.g. "anthropic").
    fn name(&self) -> &str;

    /// Send `content` as the user message and return the completion text.
    async fn send_message(&self, content: &str) -> Result<String, EngineError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn LlmEngine) {}
};

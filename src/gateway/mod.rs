//! Gateway for generative chat completions.
//!
//! The harness drives the generative service at exactly two call sites
//! (candidate execution and candidate mutation); both go through
//! [`ChatGateway`] so tests script the responses. Calls are sequential and
//! bounded by the client timeout; failures are surfaced, never retried.
//! Resilience lives in the callers, which degrade to empty or unchanged
//! results.

pub mod error;
pub mod openai;
pub mod types;

pub use error::{ErrorContext, ProviderError};
pub use openai::OpenAiAdapter;
pub use types::*;

#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

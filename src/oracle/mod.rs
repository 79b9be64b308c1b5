//! Oracle seam: the black-box completion service this crate samples from.
//!
//! The oracle is consumed, never implemented here. Anything that can turn a
//! prompt into text plus usage metadata - an HTTP provider gateway, a local
//! model, a scripted fake in tests - plugs in through the [`Oracle`] trait.
//! Retries, rate limiting, and timeouts are the implementation's business;
//! this core treats each call as a single fallible sample.

pub mod error;
pub mod types;

pub use error::OracleError;
pub use types::{CompletionRequest, CompletionResponse, Message, Role};

/// Black-box completion service.
#[async_trait::async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, OracleError>;
}

//! LLM Provider implementations for sopilot.
//!
//! All providers implement the `sopilot_core::Provider` trait.
//! The router selects the correct provider based on configuration, and
//! [`LlmClient`] layers JSON extraction and retries on top.

pub mod gemini;
mod http;
pub mod openai_compat;
pub mod router;
pub mod structured;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
pub use structured::{LlmClient, LlmError, RetryPolicy, StructuredReply};

//! Shared test helpers: a scripted provider for every crate that drives an
//! [`LlmClient`] in its tests.

use async_trait::async_trait;
use sopilot_core::error::ProviderError;
use sopilot_core::message::Message;
use sopilot_core::provider::{Provider, ProviderRequest, ProviderResponse};
use std::sync::{Arc, Mutex};

use crate::LlmClient;

/// A mock provider that returns a sequence of scripted replies.
///
/// Each call to `complete` takes the next reply and keeps the last message
/// of the request. Once the script runs out every call fails with a
/// network error.
pub struct SequentialMockProvider {
    replies: Mutex<Vec<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
    json_modes: Mutex<Vec<bool>>,
}

impl SequentialMockProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            prompts: Mutex::new(Vec::new()),
            json_modes: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose every reply succeeds.
    pub fn replying(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Whether each request asked for JSON output.
    pub fn json_modes(&self) -> Vec<bool> {
        self.json_modes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let prompt = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt);
        self.json_modes.lock().unwrap().push(request.json_mode);
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(ProviderError::Network("no more scripted replies".into()));
        }
        replies.remove(0).map(|text| ProviderResponse {
            message: Message::assistant(text),
            usage: None,
            model: "mock-model".into(),
        })
    }
}

/// An [`LlmClient`] over a fresh [`SequentialMockProvider`].
pub fn scripted_client(replies: Vec<Result<String, ProviderError>>) -> (LlmClient, Arc<SequentialMockProvider>) {
    let provider = Arc::new(SequentialMockProvider::new(replies));
    (LlmClient::new(provider.clone(), "mock-model"), provider)
}

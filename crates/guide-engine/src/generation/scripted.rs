//! Deterministic generation client backed by a response queue.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::GenerationClient;
use crate::error::{GenerationErrorKind, GuideError, Result};

/// One call received by a [`ScriptedClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// System prompt as sent.
    pub system_prompt: String,
    /// User prompt as sent.
    pub user_prompt: String,
    /// Sampling temperature as sent.
    pub temperature: f32,
}

/// Replays queued responses in order and records every call.
///
/// Once the queue is empty every call fails with a generation failure.
///
/// # Examples
///
/// ```
/// use guide_engine::{GenerationClient, ScriptedClient};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let client = ScriptedClient::new().with_response(r#"{"approved": true}"#);
/// let text = client.complete("system", "user", 0.3).await.unwrap();
/// assert_eq!(text, r#"{"approved": true}"#);
/// assert_eq!(client.calls().len(), 1);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedClient {
    /// Creates a client with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response.
    #[must_use]
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.push_response(text);
        self
    }

    /// Queues a failure.
    #[must_use]
    pub fn with_error(self, error: GuideError) -> Self {
        self.push(Err(error));
        self
    }

    /// Queues a successful response on a shared client.
    pub fn push_response(&self, text: impl Into<String>) {
        self.push(Ok(text.into()));
    }

    /// Queues a failure on a shared client.
    pub fn push_error(&self, error: GuideError) {
        self.push(Err(error));
    }

    fn push(&self, response: Result<String>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
    }

    /// Number of responses not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.responses.lock().map_or(0, |responses| responses.len())
    }

    /// Every call received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Calls made with the given temperature.
    #[must_use]
    pub fn calls_at(&self, temperature: f32) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| (call.temperature - temperature).abs() < f32::EPSILON)
            .collect()
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                system_prompt: system_prompt.to_string(),
                user_prompt: user_prompt.to_string(),
                temperature,
            });
        }

        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());

        next.unwrap_or_else(|| {
            Err(GuideError::generation(
                GenerationErrorKind::Other,
                "scripted client has no responses left",
            ))
        })
    }
}

//! Text-generation clients.
//!
//! The engine talks to a generation service only through [`GenerationClient`].
//! [`OpenAiCompatibleClient`] reaches any chat-completions endpoint over HTTP;
//! [`ScriptedClient`] replays queued responses for tests and offline demos.

mod openai;
mod scripted;

use async_trait::async_trait;

use crate::error::Result;

pub use openai::OpenAiCompatibleClient;
pub use scripted::{RecordedCall, ScriptedClient};

/// A service that completes a system/user prompt pair.
///
/// Implementations report failures as `GuideError::GenerationFailure`; the
/// engine propagates them to its caller without retrying.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Returns the raw completion text.
    async fn complete(&self, system_prompt: &str, user_prompt: &str, temperature: f32)
        -> Result<String>;
}

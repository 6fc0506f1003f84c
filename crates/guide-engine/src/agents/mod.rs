//! The generation-backed agents of a tutoring session.
//!
//! Each agent owns one prompt pair and one sampling temperature, sends a
//! single request through a [`GenerationClient`] and parses the reply with a
//! [`StructuredResponseParser`]. None of them retries; failures propagate.

mod evaluator;
mod path_generator;
mod reviewer;
mod tutor;

use std::fmt::Write;

use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::generation::GenerationClient;
use crate::parser::StructuredResponseParser;
use crate::session::Message;

pub use evaluator::{Assessment, EvaluationResult, EvaluatorAgent, UserIntent};
pub use path_generator::PathGeneratorAgent;
pub use reviewer::{ReviewResult, ReviewerAgent};
pub use tutor::{GeneratedTurn, TutorAgent};

/// Sends one prompt pair and parses the reply into `T`.
async fn request_structured<T: DeserializeOwned>(
    client: &dyn GenerationClient,
    parser: &StructuredResponseParser,
    agent: &'static str,
    system_prompt: &str,
    user_prompt: &str,
    temperature: f32,
) -> Result<T> {
    tracing::debug!(agent, temperature, user_prompt, "Agent request");

    let raw = client
        .complete(system_prompt, user_prompt, temperature)
        .await
        .map_err(|e| {
            tracing::error!(agent, error = %e, "Generation call failed");
            e
        })?;

    parser.parse_as(&raw).map_err(|e| {
        tracing::error!(agent, error = %e, "Agent output rejected");
        e
    })
}

/// Writes `HEADING:` followed by one `ROLE: content` line per message.
fn write_history<'a>(
    output: &mut String,
    heading: &str,
    messages: impl IntoIterator<Item = &'a Message>,
) {
    let mut messages = messages.into_iter().peekable();
    if messages.peek().is_none() {
        return;
    }

    let _ = writeln!(output, "{heading}:");
    for message in messages {
        let _ = writeln!(output, "{}: {}", message.role, message.content);
    }
    let _ = writeln!(output);
}

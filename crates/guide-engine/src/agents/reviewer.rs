//! Quality gate for teaching turns.

use std::fmt::Write;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use super::request_structured;
use super::tutor::GeneratedTurn;
use crate::config::RubricConfig;
use crate::error::Result;
use crate::generation::GenerationClient;
use crate::parser::{FallbackField, StructuredResponseParser};
use crate::session::TeachingNode;

/// Feedback attached to a rejection that came without any.
const GENERIC_FEEDBACK: &str =
    "The turn does not meet the rubric. Make it clearer, more focused and end with an active question.";

/// The reviewer's verdict on one turn.
///
/// `feedback` is empty exactly when the turn was approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    /// Whether the turn may be shown.
    #[serde(deserialize_with = "deserialize_flag")]
    pub approved: bool,
    /// What to change, for a rejected turn.
    #[serde(default)]
    pub feedback: String,
}

impl ReviewResult {
    /// Restores the approved/feedback pairing.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.approved {
            self.feedback.clear();
        } else if self.feedback.trim().is_empty() {
            self.feedback = GENERIC_FEEDBACK.to_string();
        }
        self
    }
}

/// Accepts booleans and their common string spellings.
fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawFlag {
        Bool(bool),
        Text(String),
    }

    Ok(match RawFlag::deserialize(deserializer)? {
        RawFlag::Bool(flag) => flag,
        RawFlag::Text(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "approved"
        ),
    })
}

/// Approves or rejects turns against a rubric.
#[derive(Clone)]
pub struct ReviewerAgent {
    client: Arc<dyn GenerationClient>,
    parser: StructuredResponseParser,
    temperature: f32,
    system_prompt: String,
}

impl ReviewerAgent {
    /// Creates the agent with the rubric rendered into its prompt.
    #[must_use]
    pub fn new(client: Arc<dyn GenerationClient>, temperature: f32, rubric: &RubricConfig) -> Self {
        Self {
            client,
            parser: StructuredResponseParser::with_fallback_fields(vec![
                FallbackField::new("feedback", ""),
                FallbackField::new("approved", "false"),
            ]),
            temperature,
            system_prompt: system_prompt(rubric),
        }
    }

    /// Reviews `turn` as a turn for `node`.
    ///
    /// # Errors
    ///
    /// Propagates generation, parse and validation failures.
    pub async fn review(&self, turn: &GeneratedTurn, node: &TeachingNode) -> Result<ReviewResult> {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "NODE:");
        let _ = writeln!(prompt, "Concept: {}", node.concept);
        let _ = writeln!(prompt, "Goal: {}\n", node.goal);
        let _ = writeln!(prompt, "TEACHING:\n{}\n", turn.teaching);
        let _ = writeln!(prompt, "PROMPT OR TASK:\n{}\n", turn.prompt_or_task);
        let _ = write!(prompt, "Review this turn. Return only the JSON object.");

        let result: ReviewResult = request_structured(
            self.client.as_ref(),
            &self.parser,
            "reviewer",
            &self.system_prompt,
            &prompt,
            self.temperature,
        )
        .await?;

        let result = result.normalized();
        tracing::debug!(
            concept = %node.concept,
            approved = result.approved,
            feedback = %result.feedback,
            "Turn reviewed"
        );
        Ok(result)
    }
}

fn system_prompt(rubric: &RubricConfig) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You review a tutor's turn before the learner sees it, against the rubric \"{}\":\n",
        rubric.name
    );
    for (i, principle) in rubric.principles.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {principle}", i + 1);
    }
    let _ = writeln!(
        prompt,
        "\nApprove a turn that meets most principles well. Reject it for real problems with clarity, \
         focus on a single concept, or learner engagement, and say specifically what to change."
    );
    let _ = write!(
        prompt,
        "\nReturn only a JSON object of this form:\n{{\n  \"approved\": false,\n  \"feedback\": \"Specific changes, or an empty string when approved\"\n}}"
    );
    prompt
}

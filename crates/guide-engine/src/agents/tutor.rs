//! Generates teaching turns for the current node.

use std::fmt::Write;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{request_structured, write_history};
use crate::error::{GuideError, Result};
use crate::generation::GenerationClient;
use crate::parser::StructuredResponseParser;
use crate::session::SessionState;

const SYSTEM_PROMPT: &str = r#"You are a tutor in a one-to-one session. Each turn teaches one concept and ends with a question or small task that makes the learner produce an answer, not just recognise one.

Explain clearly and concisely, start from the big picture, use a concrete example or analogy, and connect to what was covered earlier in the conversation. Vary the kind of question: predict an outcome, contrast two ideas, explain a cause, or apply the concept to a scenario. Keep a supportive tone.

If EVALUATOR GUIDANCE is given, follow it. If REVIEWER FEEDBACK is given, revise your turn to address it.

Return only a JSON object of this form:
{
  "teaching": "The explanation for this turn",
  "prompt_or_task": "The question or task for the learner"
}"#;

/// One teaching turn: an explanation followed by a prompt for the learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedTurn {
    /// The explanation.
    pub teaching: String,
    /// The question or task the learner answers next.
    #[serde(alias = "question", alias = "task")]
    pub prompt_or_task: String,
}

impl GeneratedTurn {
    /// The text shown to the learner.
    ///
    /// # Examples
    ///
    /// ```
    /// use guide_engine::GeneratedTurn;
    ///
    /// let turn = GeneratedTurn {
    ///     teaching: "A packet is a small unit of data.".to_string(),
    ///     prompt_or_task: "Why split a file into packets?".to_string(),
    /// };
    /// assert_eq!(
    ///     turn.format_for_display(),
    ///     "A packet is a small unit of data.\n\nWhy split a file into packets?"
    /// );
    /// ```
    #[must_use]
    pub fn format_for_display(&self) -> String {
        format!("{}\n\n{}", self.teaching, self.prompt_or_task)
    }
}

/// Produces the learner-facing turns.
#[derive(Clone)]
pub struct TutorAgent {
    client: Arc<dyn GenerationClient>,
    parser: StructuredResponseParser,
    temperature: f32,
    history_window: usize,
}

impl TutorAgent {
    /// Creates the agent; it sees at most `history_window` recent messages.
    #[must_use]
    pub fn new(client: Arc<dyn GenerationClient>, temperature: f32, history_window: usize) -> Self {
        Self {
            client,
            parser: StructuredResponseParser::new(),
            temperature,
            history_window,
        }
    }

    /// Generates a turn for the current node.
    ///
    /// `strategy_directive` carries the evaluator's guidance and
    /// `review_feedback` the reviewer's latest rejection; each adds a prompt
    /// section only when present.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::InvalidStateTransition` if no node is being
    /// taught, `GuideError::ValidationFailure` if the turn is empty, and
    /// propagates generation and parse failures.
    pub async fn generate_turn(
        &self,
        state: &SessionState,
        strategy_directive: Option<&str>,
        review_feedback: Option<&str>,
    ) -> Result<GeneratedTurn> {
        let prompt = self.user_prompt(state, strategy_directive, review_feedback)?;

        let turn: GeneratedTurn = request_structured(
            self.client.as_ref(),
            &self.parser,
            "tutor",
            SYSTEM_PROMPT,
            &prompt,
            self.temperature,
        )
        .await?;

        if turn.teaching.trim().is_empty() && turn.prompt_or_task.trim().is_empty() {
            return Err(GuideError::validation("tutor produced an empty turn"));
        }

        tracing::debug!(
            session_id = %state.session_id,
            node_index = state.current_index(),
            teaching_chars = turn.teaching.len(),
            "Teaching turn generated"
        );
        Ok(turn)
    }

    fn user_prompt(
        &self,
        state: &SessionState,
        strategy_directive: Option<&str>,
        review_feedback: Option<&str>,
    ) -> Result<String> {
        let node = state
            .current_node()
            .ok_or_else(|| GuideError::invalid_transition(state.status(), "teaching"))?;
        let lesson = &state.lesson_context;

        let mut prompt = String::new();
        let _ = writeln!(prompt, "LESSON: {}", lesson.title);
        let _ = writeln!(prompt, "Objectives: {}\n", lesson.objectives.join("; "));
        let _ = writeln!(prompt, "CURRENT NODE:");
        let _ = writeln!(prompt, "Concept: {}", node.concept);
        let _ = writeln!(prompt, "Goal: {}\n", node.goal);
        write_history(
            &mut prompt,
            "CONVERSATION HISTORY",
            state.recent_history(self.history_window),
        );
        if let Some(directive) = strategy_directive.filter(|d| !d.trim().is_empty()) {
            let _ = writeln!(prompt, "EVALUATOR GUIDANCE:\n{directive}\n");
        }
        if let Some(feedback) = review_feedback.filter(|f| !f.trim().is_empty()) {
            let _ = writeln!(
                prompt,
                "REVIEWER FEEDBACK:\n{feedback}\nRevise the turn to address this feedback.\n"
            );
        }
        let _ = write!(prompt, "Write the next turn. Return only the JSON object.");
        Ok(prompt)
    }
}

//! Classifies learner replies and decides whether to advance.

use std::fmt::{self, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{request_structured, write_history};
use crate::error::{GuideError, Result};
use crate::generation::GenerationClient;
use crate::parser::StructuredResponseParser;
use crate::session::SessionState;

const SYSTEM_PROMPT: &str = r#"You assess a learner's reply in a one-to-one tutoring session and advise the tutor.

Decide:
- user_intent: "attempt_answer", "ask_question" or "stuck"
- assessment: "correct", "partial", "wrong", or "n/a" when the learner did not attempt an answer
- should_advance: whether the learner is ready for the next concept

Be lenient. A basic grasp of the main idea is enough to advance, even with fuzzy details or small gaps; in that case tell the tutor to acknowledge the answer, briefly close the gap and move on. Keep the learner on the current concept only for a fundamental misunderstanding or explicit confusion.

guidance_for_generator tells the tutor concretely what to do next.

Return only a JSON object of this form:
{
  "user_intent": "attempt_answer",
  "assessment": "partial",
  "reasoning": "What the reply shows about the learner's understanding",
  "guidance_for_generator": "What the tutor should do next",
  "should_advance": true
}"#;

/// What the learner was trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserIntent {
    /// Answered the tutor's question or task.
    AttemptAnswer,
    /// Asked a question of their own.
    AskQuestion,
    /// Said they are lost or gave up.
    Stuck,
}

/// How correct the learner's answer was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    /// Fully correct.
    Correct,
    /// Main idea present with gaps.
    Partial,
    /// Incorrect.
    Wrong,
    /// No answer was attempted.
    #[serde(rename = "n/a", alias = "N/A", alias = "na", alias = "not_applicable")]
    NotApplicable,
}

impl fmt::Display for Assessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Correct => write!(f, "correct"),
            Self::Partial => write!(f, "partial"),
            Self::Wrong => write!(f, "wrong"),
            Self::NotApplicable => write!(f, "n/a"),
        }
    }
}

/// The evaluator's verdict on one learner reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// What the learner was trying to do.
    pub user_intent: UserIntent,
    /// How correct the reply was.
    #[serde(alias = "evaluation")]
    pub assessment: Assessment,
    /// Why the evaluator decided as it did.
    #[serde(default)]
    pub reasoning: String,
    /// Directive passed to the tutor for the next turn.
    #[serde(default, alias = "guidance_for_tutor")]
    pub guidance_for_generator: String,
    /// Whether the session should move past the current node.
    pub should_advance: bool,
}

/// Gates progress through a teaching path.
#[derive(Clone)]
pub struct EvaluatorAgent {
    client: Arc<dyn GenerationClient>,
    parser: StructuredResponseParser,
    temperature: f32,
    history_window: usize,
}

impl EvaluatorAgent {
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

    /// Evaluates `user_message` against the current node.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::InvalidStateTransition` if no node is being taught,
    /// and propagates generation, parse and validation failures.
    pub async fn evaluate(
        &self,
        state: &SessionState,
        user_message: &str,
        last_tutor_message: &str,
    ) -> Result<EvaluationResult> {
        let node = state
            .current_node()
            .ok_or_else(|| GuideError::invalid_transition(state.status(), "evaluation"))?;

        let mut prompt = String::new();
        let _ = writeln!(prompt, "CURRENT NODE:");
        let _ = writeln!(prompt, "Concept: {}", node.concept);
        let _ = writeln!(prompt, "Goal: {}\n", node.goal);
        let _ = writeln!(prompt, "TUTOR'S LAST MESSAGE:\n{last_tutor_message}\n");
        write_history(
            &mut prompt,
            "RECENT CONVERSATION",
            state.recent_history(self.history_window),
        );
        let _ = writeln!(prompt, "LEARNER'S REPLY:\n{user_message}\n");
        let _ = write!(prompt, "Assess the reply. Return only the JSON object.");

        let result: EvaluationResult = request_structured(
            self.client.as_ref(),
            &self.parser,
            "evaluator",
            SYSTEM_PROMPT,
            &prompt,
            self.temperature,
        )
        .await?;

        tracing::info!(
            session_id = %state.session_id,
            intent = ?result.user_intent,
            assessment = %result.assessment,
            should_advance = result.should_advance,
            "Learner reply evaluated"
        );
        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::generation::ScriptedClient;
    use crate::lesson::LessonContext;
    use crate::session::{MessageRole, TeachingNode, TeachingPath};

    fn teaching_state() -> SessionState {
        let mut state = SessionState::new(LessonContext::new("DNS", ["Trace a lookup"], ["dns"]));
        state
            .offer_paths(vec![TeachingPath {
                id: "1".to_string(),
                name: "Walkthrough".to_string(),
                description: String::new(),
                sequence: vec![TeachingNode {
                    id: "1".to_string(),
                    concept: "Resolvers".to_string(),
                    goal: "Name the resolver steps".to_string(),
                }],
            }])
            .unwrap();
        state.select_path("1").unwrap();
        state
    }

    #[test]
    fn test_evaluation_result_aliases() {
        let json = r#"{
            "user_intent": "attempt_answer",
            "evaluation": "n/a",
            "reasoning": "r",
            "guidance_for_tutor": "g",
            "should_advance": false
        }"#;
        let result: EvaluationResult = serde_json::from_str(json).unwrap();

        assert_eq!(result.assessment, Assessment::NotApplicable);
        assert_eq!(result.guidance_for_generator, "g");
        assert_eq!(serde_json::to_value(result.assessment).unwrap(), "n/a");
    }

    #[test]
    fn test_unknown_intent_is_rejected() {
        let json = r#"{"user_intent": "dancing", "assessment": "wrong", "should_advance": false}"#;
        assert!(serde_json::from_str::<EvaluationResult>(json).is_err());
    }

    #[tokio::test]
    async fn test_evaluate_uses_recent_window() {
        let reply = r#"{"user_intent": "stuck", "assessment": "n/a", "reasoning": "lost",
            "guidance_for_generator": "Give a simpler example", "should_advance": false}"#;
        let client = Arc::new(ScriptedClient::new().with_response(reply));
        let agent = EvaluatorAgent::new(client.clone(), 0.1, 2);

        let mut state = teaching_state();
        state.add_message(MessageRole::Tutor, "oldest tutor turn");
        state.add_message(MessageRole::User, "older reply");
        state.add_message(MessageRole::Tutor, "What does a resolver do?");
        state.add_message(MessageRole::User, "no idea");

        let result = agent
            .evaluate(&state, "no idea", "What does a resolver do?")
            .await
            .unwrap();

        assert_eq!(result.user_intent, UserIntent::Stuck);
        assert!(!result.should_advance);

        let prompt = &client.calls()[0].user_prompt;
        assert!(prompt.contains("Concept: Resolvers"));
        assert!(prompt.contains("TUTOR: What does a resolver do?"));
        assert!(!prompt.contains("oldest tutor turn"));
    }

    #[tokio::test]
    async fn test_evaluate_without_node_is_rejected() {
        let client = Arc::new(ScriptedClient::new());
        let agent = EvaluatorAgent::new(client.clone(), 0.1, 2);
        let state = SessionState::new(LessonContext::new("DNS", ["x"], ["y"]));

        let err = agent.evaluate(&state, "hi", "").await.unwrap_err();
        assert!(matches!(err, GuideError::InvalidStateTransition { .. }));
        assert!(client.calls().is_empty());
    }
}

//! Orchestration of a tutoring session.
//!
//! The [`OrchestrationEngine`] drives a [`SessionState`] through its states:
//!
//! ```text
//! AWAITING_PATH_SELECTION --select_path--> TEACHING(0) --advance--> ... TEACHING(n-1) --advance--> COMPLETED
//! ```
//!
//! Every teaching turn is produced by the reviewed-generation loop: the tutor
//! writes a turn, the reviewer gates it, and rejected turns are regenerated
//! with the reviewer's feedback until `max_retries` rejections, after which
//! the last turn is shipped anyway and logged as degraded.
//!
//! The engine holds no per-session data. Operations that call the generation
//! service work on a copy of the session and write it back only on success,
//! so a failed call leaves the session as it was.

use std::sync::Arc;

use serde::Serialize;

use crate::agents::{
    EvaluatorAgent, GeneratedTurn, PathGeneratorAgent, ReviewerAgent, TutorAgent,
};
use crate::config::Config;
use crate::error::{GuideError, Result};
use crate::generation::GenerationClient;
use crate::lesson::LessonContext;
use crate::session::{Advance, MessageRole, SessionState, SessionStatus, TeachingPath};

// ============================================================================
// Result types
// ============================================================================

/// A node as presented in a path option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    /// The concept taught.
    pub concept: String,
    /// The goal of the node.
    pub goal: String,
}

/// A teaching path as offered to the learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathOption {
    /// Id to pass to [`OrchestrationEngine::select_path`].
    pub id: String,
    /// Short name.
    pub name: String,
    /// What distinguishes the approach.
    pub description: String,
    /// Number of nodes.
    pub node_count: usize,
    /// The nodes in order.
    pub sequence: Vec<NodeSummary>,
}

impl From<&TeachingPath> for PathOption {
    fn from(path: &TeachingPath) -> Self {
        Self {
            id: path.id.clone(),
            name: path.name.clone(),
            description: path.description.clone(),
            node_count: path.len(),
            sequence: path
                .sequence
                .iter()
                .map(|node| NodeSummary {
                    concept: node.concept.clone(),
                    goal: node.goal.clone(),
                })
                .collect(),
        }
    }
}

/// Result of processing one learner reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The next teaching turn, formatted for display.
    Turn(String),
    /// The last node was passed; the session is complete.
    Completed,
}

/// Result of one reviewed-generation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewedTurn {
    /// The turn that is shipped.
    pub turn: GeneratedTurn,
    /// Number of generate/review rounds run.
    pub attempts: u32,
    /// `false` when the reviewer never approved and the last turn was shipped anyway.
    pub approved: bool,
}

// ============================================================================
// OrchestrationEngine
// ============================================================================

/// Default bound on reviewer rejections per turn.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Coordinates the agents of a tutoring session.
///
/// The engine is immutable and `Send + Sync`; one engine can serve any number
/// of sessions, each owned by its caller.
#[derive(Clone)]
pub struct OrchestrationEngine {
    path_generator: PathGeneratorAgent,
    evaluator: EvaluatorAgent,
    tutor: TutorAgent,
    reviewer: ReviewerAgent,
    max_retries: u32,
    history_window: usize,
}

impl OrchestrationEngine {
    /// Creates an engine whose agents share `client`.
    #[must_use]
    pub fn new(client: Arc<dyn GenerationClient>, config: &Config) -> Self {
        let temperatures = &config.temperatures;
        let history = &config.history;

        Self {
            path_generator: PathGeneratorAgent::new(
                Arc::clone(&client),
                temperatures.path_generator,
            ),
            evaluator: EvaluatorAgent::new(
                Arc::clone(&client),
                temperatures.evaluator,
                history.evaluator_window,
            ),
            tutor: TutorAgent::new(Arc::clone(&client), temperatures.tutor, history.tutor_window),
            reviewer: ReviewerAgent::new(client, temperatures.reviewer, &config.rubric),
            max_retries: config.max_reviewer_retries.max(1),
            history_window: history.max_stored,
        }
    }

    /// Sets the bound on reviewer rejections per turn (minimum 1).
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// The bound on reviewer rejections per turn.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Creates a session for `lesson` with the configured history window.
    #[must_use]
    pub fn new_session(&self, lesson: LessonContext) -> SessionState {
        SessionState::with_history_window(lesson, self.history_window)
    }

    /// Generates the teaching paths for the session's lesson and offers them.
    ///
    /// Calling it again before a path is selected replaces the offer.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::InvalidStateTransition` unless the session awaits
    /// path selection, `GuideError::ValidationFailure` if no valid path was
    /// generated, and propagates generation and parse failures.
    pub async fn initialize_session(&self, state: &mut SessionState) -> Result<Vec<PathOption>> {
        ensure_status(state, SessionStatus::AwaitingPathSelection, "path_generation")?;

        let paths = self
            .path_generator
            .generate_paths(&state.lesson_context)
            .await?;
        let options = paths.iter().map(PathOption::from).collect();
        state.offer_paths(paths)?;

        tracing::info!(
            session_id = %state.session_id,
            options = state.path_options().len(),
            "Session initialized"
        );
        Ok(options)
    }

    /// Binds one of the offered paths.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::InvalidPathId` if the id was not offered and
    /// `GuideError::InvalidStateTransition` unless the session awaits path
    /// selection. The session is unchanged on error.
    pub fn select_path(&self, state: &mut SessionState, path_id: &str) -> Result<()> {
        state.select_path(path_id).map(|_| ())
    }

    /// Produces the first teaching turn of the session.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::InvalidStateTransition` unless the session is
    /// teaching, and propagates agent failures. The session is unchanged on error.
    pub async fn start_teaching(&self, state: &mut SessionState) -> Result<String> {
        ensure_status(state, SessionStatus::Teaching, "teaching")?;

        let mut draft = state.clone();
        let reviewed = self.generate_reviewed_turn(&mut draft, None).await?;
        let text = reviewed.turn.format_for_display();
        draft.add_message(MessageRole::Tutor, text.clone());
        *state = draft;

        tracing::info!(session_id = %state.session_id, "Teaching started");
        Ok(text)
    }

    /// Handles one learner reply.
    ///
    /// The reply is evaluated against the current node. An advance on the
    /// last node completes the session without generating anything; otherwise
    /// the session moves on or stays for remediation and the next turn is
    /// generated with the evaluator's guidance.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::InvalidStateTransition` unless the session is
    /// teaching, and propagates agent failures. The session is unchanged on
    /// error, so the same reply can be submitted again.
    pub async fn process_user_response(
        &self,
        state: &mut SessionState,
        user_input: &str,
    ) -> Result<TurnOutcome> {
        ensure_status(state, SessionStatus::Teaching, "evaluation")?;

        let mut draft = state.clone();
        let last_tutor_message = draft.last_tutor_message().unwrap_or_default().to_string();
        draft.add_message(MessageRole::User, user_input);

        let evaluation = self
            .evaluator
            .evaluate(&draft, user_input, &last_tutor_message)
            .await?;

        if evaluation.should_advance {
            if draft.advance()? == Advance::Completed {
                *state = draft;
                tracing::info!(session_id = %state.session_id, "Session completed");
                return Ok(TurnOutcome::Completed);
            }
        } else {
            tracing::info!(
                session_id = %draft.session_id,
                node_index = draft.current_index(),
                "Remediating current node"
            );
        }

        let reviewed = self
            .generate_reviewed_turn(&mut draft, Some(&evaluation.guidance_for_generator))
            .await?;
        let text = reviewed.turn.format_for_display();
        draft.add_message(MessageRole::Tutor, text.clone());
        *state = draft;

        Ok(TurnOutcome::Turn(text))
    }

    /// Runs the reviewed-generation loop for the current node.
    ///
    /// Generates a turn and submits it for review; a rejection is recorded in
    /// the session's feedback loop and the turn is regenerated with that
    /// feedback. After `max_retries` rejections the last turn is returned with
    /// `approved == false`. The tutor is called at most `max_retries` times.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::InvalidStateTransition` if no node is being taught,
    /// and propagates agent failures.
    pub async fn generate_reviewed_turn(
        &self,
        state: &mut SessionState,
        strategy_directive: Option<&str>,
    ) -> Result<ReviewedTurn> {
        let node = state
            .current_node()
            .cloned()
            .ok_or_else(|| GuideError::invalid_transition(state.status(), "teaching"))?;
        state.feedback_loop_mut().reset();

        let mut attempts = 0;
        loop {
            attempts += 1;
            let feedback = state.feedback_loop().last_feedback.clone();
            let turn = self
                .tutor
                .generate_turn(state, strategy_directive, feedback.as_deref())
                .await?;
            let review = self.reviewer.review(&turn, &node).await?;

            if review.approved {
                tracing::info!(
                    session_id = %state.session_id,
                    node_index = state.current_index(),
                    attempt = attempts,
                    "Turn approved"
                );
                return Ok(ReviewedTurn {
                    turn,
                    attempts,
                    approved: true,
                });
            }

            state.feedback_loop_mut().increment(review.feedback);
            let retry_count = state.feedback_loop().retry_count;

            if retry_count >= self.max_retries {
                tracing::warn!(
                    session_id = %state.session_id,
                    node_index = state.current_index(),
                    retry_count,
                    "Reviewer rejected every attempt, shipping last turn (degraded)"
                );
                return Ok(ReviewedTurn {
                    turn,
                    attempts,
                    approved: false,
                });
            }

            tracing::debug!(
                session_id = %state.session_id,
                attempt = attempts,
                retry_count,
                "Turn rejected, regenerating with feedback"
            );
        }
    }
}

fn ensure_status(state: &SessionState, expected: SessionStatus, operation: &str) -> Result<()> {
    if state.status() == expected {
        Ok(())
    } else {
        Err(GuideError::invalid_transition(state.status(), operation))
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Session state types for the guided learning engine.
//!
//! This module defines the state machine types threaded through every agent
//! call: the selected teaching path, the position in it, the bounded message
//! history and the feedback loop of the reviewed-generation cycle.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{GuideError, Result};
use crate::lesson::LessonContext;

/// Default number of messages kept in a session history.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

// ============================================================================
// SessionStatus
// ============================================================================

/// Current status of a tutoring session.
///
/// The status transitions through these states:
/// - `AwaitingPathSelection` -> `Teaching` (a path was selected)
/// - `Teaching` -> `Teaching` (advance to the next node, or remediate in place)
/// - `Teaching` -> `Completed` (advance requested on the last node)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Paths may be generated and one of them selected.
    #[default]
    AwaitingPathSelection,
    /// A path is bound and turns are being exchanged.
    Teaching,
    /// The last node was passed; no further turns are generated.
    Completed,
}

impl SessionStatus {
    /// Returns `true` if no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingPathSelection => write!(f, "awaiting_path_selection"),
            Self::Teaching => write!(f, "teaching"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

// ============================================================================
// TeachingNode and TeachingPath
// ============================================================================

/// Accepts ids written as JSON strings or numbers.
fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

/// An atomic, single-concept teaching step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeachingNode {
    /// Node identifier, unique within its path.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// The concept taught at this node.
    pub concept: String,
    /// What the learner should be able to do afterwards.
    pub goal: String,
}

/// One candidate curriculum: an ordered sequence of nodes.
///
/// By contract of the path generator the first node orients the learner and
/// the last one closes or verifies; the engine only relies on it being non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeachingPath {
    /// Path identifier, unique among the options of one session.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Short name shown to the learner.
    pub name: String,
    /// What distinguishes this approach.
    #[serde(default)]
    pub description: String,
    /// Nodes in teaching order.
    #[serde(alias = "teaching_sequence")]
    pub sequence: Vec<TeachingNode>,
}

impl TeachingPath {
    /// Checks the shape a path needs before it can be offered.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::ValidationFailure` if the id or name is blank, the
    /// sequence is empty, or a node has a blank field.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(GuideError::validation("path id is empty"));
        }
        if self.name.trim().is_empty() {
            return Err(GuideError::validation(format!(
                "path '{}' has an empty name",
                self.id
            )));
        }
        if self.sequence.is_empty() {
            return Err(GuideError::validation(format!(
                "path '{}' has an empty sequence",
                self.id
            )));
        }
        if let Some(position) = self.sequence.iter().position(|node| {
            node.id.trim().is_empty() || node.concept.trim().is_empty() || node.goal.trim().is_empty()
        }) {
            return Err(GuideError::validation(format!(
                "path '{}' node {} has an empty field",
                self.id,
                position + 1
            )));
        }
        Ok(())
    }

    /// Number of nodes in the path.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Returns `true` if the path has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

// ============================================================================
// Message
// ============================================================================

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Generated teaching turn.
    Tutor,
    /// Learner input.
    User,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tutor => write!(f, "TUTOR"),
            Self::User => write!(f, "USER"),
        }
    }
}

/// One entry of the session history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author of the message.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
}

impl Message {
    /// Creates a tutor message.
    #[must_use]
    pub fn tutor(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tutor,
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// ============================================================================
// FeedbackLoop
// ============================================================================

/// Transient state of one reviewed-generation cycle.
///
/// Reset on every new node and at the start of every cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackLoop {
    /// Number of reviewer rejections in the current cycle.
    pub retry_count: u32,
    /// Feedback attached to the latest rejection.
    pub last_feedback: Option<String>,
}

impl FeedbackLoop {
    /// Clears the counter and the stored feedback.
    pub fn reset(&mut self) {
        self.retry_count = 0;
        self.last_feedback = None;
    }

    /// Records one rejection.
    pub fn increment(&mut self, feedback: impl Into<String>) {
        self.retry_count += 1;
        self.last_feedback = Some(feedback.into());
    }
}

// ============================================================================
// Advance
// ============================================================================

/// Result of requesting an advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Moved to the node at this index.
    Moved(usize),
    /// The request was made on the last node; the session is completed.
    Completed,
}

// ============================================================================
// SessionState
// ============================================================================

/// The mutable record of one tutoring session.
///
/// A session is owned by one caller and mutated only through `&mut` access,
/// so turns are sequential by construction. It can be serialized by the
/// caller; the engine never persists it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Unique session identifier.
    pub session_id: Uuid,

    /// The lesson being taught.
    pub lesson_context: LessonContext,

    status: SessionStatus,
    path_options: Vec<TeachingPath>,
    selected_path: Option<TeachingPath>,
    current_index: usize,
    history: VecDeque<Message>,
    history_window: usize,
    feedback_loop: FeedbackLoop,

    /// When the session was created.
    pub started_at: DateTime<Utc>,

    /// When the session was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Creates a new session awaiting path selection with the default history window.
    ///
    /// # Examples
    ///
    /// ```
    /// use guide_engine::{LessonContext, SessionState, SessionStatus};
    ///
    /// let lesson = LessonContext::new("Ownership", ["Explain moves"], ["borrowing"]);
    /// let state = SessionState::new(lesson);
    /// assert_eq!(state.status(), SessionStatus::AwaitingPathSelection);
    /// assert!(state.history().is_empty());
    /// assert!(state.current_node().is_none());
    /// ```
    #[must_use]
    pub fn new(lesson_context: LessonContext) -> Self {
        Self::with_history_window(lesson_context, DEFAULT_HISTORY_WINDOW)
    }

    /// Creates a new session keeping at most `history_window` messages (minimum 1).
    #[must_use]
    pub fn with_history_window(lesson_context: LessonContext, history_window: usize) -> Self {
        let now = Utc::now();
        let session_id = Uuid::new_v4();
        tracing::info!(%session_id, lesson = %lesson_context.title, "Created new session");
        Self {
            session_id,
            lesson_context,
            status: SessionStatus::AwaitingPathSelection,
            path_options: Vec::new(),
            selected_path: None,
            current_index: 0,
            history: VecDeque::new(),
            history_window: history_window.max(1),
            feedback_loop: FeedbackLoop::default(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Paths offered by the last path generation.
    #[must_use]
    pub fn path_options(&self) -> &[TeachingPath] {
        &self.path_options
    }

    /// The selected path, once bound.
    #[must_use]
    pub const fn selected_path(&self) -> Option<&TeachingPath> {
        self.selected_path.as_ref()
    }

    /// Index of the current node in the selected path.
    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current_index
    }

    /// The bounded history, oldest first.
    #[must_use]
    pub const fn history(&self) -> &VecDeque<Message> {
        &self.history
    }

    /// Maximum number of stored messages.
    #[must_use]
    pub const fn history_window(&self) -> usize {
        self.history_window
    }

    /// Feedback loop of the current reviewed-generation cycle.
    #[must_use]
    pub const fn feedback_loop(&self) -> &FeedbackLoop {
        &self.feedback_loop
    }

    pub(crate) fn feedback_loop_mut(&mut self) -> &mut FeedbackLoop {
        &mut self.feedback_loop
    }

    /// Returns `true` once the last node has been passed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }

    /// The node being taught, if a path is bound.
    #[must_use]
    pub fn current_node(&self) -> Option<&TeachingNode> {
        self.selected_path
            .as_ref()
            .and_then(|path| path.sequence.get(self.current_index))
    }

    /// Returns `(1-indexed position, total nodes)` once a path is bound.
    #[must_use]
    pub fn progress(&self) -> Option<(usize, usize)> {
        self.selected_path
            .as_ref()
            .map(|path| (self.current_index + 1, path.len()))
    }

    /// Records the paths offered to the caller, replacing earlier options.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::InvalidStateTransition` unless the session is
    /// still awaiting path selection.
    pub fn offer_paths(&mut self, paths: Vec<TeachingPath>) -> Result<()> {
        if self.status != SessionStatus::AwaitingPathSelection {
            return Err(GuideError::invalid_transition(self.status, "path_generation"));
        }
        self.path_options = paths;
        self.touch();
        Ok(())
    }

    /// Binds one of the offered paths and moves to its first node.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::InvalidStateTransition` unless the session is
    /// awaiting path selection, and `GuideError::InvalidPathId` if `path_id`
    /// was not offered.
    pub fn select_path(&mut self, path_id: &str) -> Result<&TeachingPath> {
        if self.status != SessionStatus::AwaitingPathSelection {
            return Err(GuideError::invalid_transition(
                self.status,
                SessionStatus::Teaching,
            ));
        }

        let path = self
            .path_options
            .iter()
            .find(|path| path.id == path_id)
            .cloned()
            .ok_or_else(|| GuideError::invalid_path_id(path_id))?;

        tracing::info!(
            session_id = %self.session_id,
            path = %path.name,
            nodes = path.len(),
            "Teaching path set"
        );

        self.current_index = 0;
        self.feedback_loop.reset();
        self.status = SessionStatus::Teaching;
        self.touch();
        Ok(self.selected_path.insert(path))
    }

    /// Requests an advance past the current node.
    ///
    /// Moves exactly one node forward, or completes the session when called
    /// on the last node; the index never passes the last node.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::InvalidStateTransition` unless the session is teaching.
    pub fn advance(&mut self) -> Result<Advance> {
        let len = match (&self.status, &self.selected_path) {
            (SessionStatus::Teaching, Some(path)) => path.len(),
            _ => return Err(GuideError::invalid_transition(self.status, "next_node")),
        };

        self.touch();
        if self.current_index + 1 < len {
            self.current_index += 1;
            self.feedback_loop.reset();
            tracing::info!(
                session_id = %self.session_id,
                node_index = self.current_index,
                concept = self.current_node().map_or("", |node| node.concept.as_str()),
                "Advanced to next node"
            );
            Ok(Advance::Moved(self.current_index))
        } else {
            self.status = SessionStatus::Completed;
            tracing::info!(session_id = %self.session_id, "Reached end of teaching path");
            Ok(Advance::Completed)
        }
    }

    /// Appends a message, dropping the oldest ones beyond the history window.
    pub fn add_message(&mut self, role: MessageRole, content: impl Into<String>) {
        self.history.push_back(Message {
            role,
            content: content.into(),
        });

        let overflow = self.history.len().saturating_sub(self.history_window);
        if overflow > 0 {
            self.history.drain(..overflow);
            tracing::debug!(window = self.history_window, "Trimmed history");
        }
        self.touch();
    }

    /// The last `count` messages, oldest first.
    pub fn recent_history(&self, count: usize) -> impl Iterator<Item = &Message> {
        self.history
            .iter()
            .skip(self.history.len().saturating_sub(count))
    }

    /// Content of the most recent tutor message, if any.
    #[must_use]
    pub fn last_tutor_message(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::Tutor)
            .map(|message| message.content.as_str())
    }

    /// Updates the `updated_at` timestamp to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Returns the duration since the session started.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short_id: String = self.session_id.to_string().chars().take(8).collect();
        match (self.progress(), self.current_node()) {
            (Some((position, total)), Some(node)) => write!(
                f,
                "Session({short_id}): node {position}/{total} - {} [{}]",
                node.concept, self.status
            ),
            _ => write!(f, "Session({short_id}): no path selected [{}]", self.status),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lesson() -> LessonContext {
        LessonContext::new(
            "Ownership",
            ["Explain moves", "Explain borrows"],
            ["ownership"],
        )
    }

    fn node(id: &str) -> TeachingNode {
        TeachingNode {
            id: id.to_string(),
            concept: format!("concept {id}"),
            goal: format!("goal {id}"),
        }
    }

    fn path(id: &str, nodes: usize) -> TeachingPath {
        TeachingPath {
            id: id.to_string(),
            name: format!("Path {id}"),
            description: String::new(),
            sequence: (1..=nodes).map(|n| node(&format!("n{n}"))).collect(),
        }
    }

    fn teaching_state(nodes: usize) -> SessionState {
        let mut state = SessionState::new(lesson());
        state.offer_paths(vec![path("1", nodes)]).unwrap();
        state.select_path("1").unwrap();
        state
    }

    // ------------------------------------------------------------------------
    // SessionStatus tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_session_status_is_terminal() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(!SessionStatus::Teaching.is_terminal());
        assert!(!SessionStatus::AwaitingPathSelection.is_terminal());
    }

    #[test]
    fn test_session_status_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::AwaitingPathSelection).unwrap(),
            r#""awaiting_path_selection""#
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Completed).unwrap(),
            r#""completed""#
        );
        assert_eq!(SessionStatus::Teaching.to_string(), "teaching");
    }

    // ------------------------------------------------------------------------
    // TeachingPath tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_teaching_path_accepts_teaching_sequence_and_numeric_ids() {
        let json = r#"{
            "id": 2,
            "name": "Analogy first",
            "teaching_sequence": [
                {"id": 1, "concept": "Overview", "goal": "See the big picture"}
            ]
        }"#;
        let path: TeachingPath = serde_json::from_str(json).unwrap();

        assert_eq!(path.id, "2");
        assert_eq!(path.sequence[0].id, "1");
        assert!(path.description.is_empty());
        assert!(path.validate().is_ok());
    }

    #[test]
    fn test_teaching_path_validate_rejects_empty_sequence() {
        let err = path("1", 0).validate().unwrap_err();
        assert!(err.to_string().contains("empty sequence"));
    }

    #[test]
    fn test_teaching_path_validate_rejects_blank_node_field() {
        let mut candidate = path("1", 3);
        candidate.sequence[1].goal = " ".to_string();
        let err = candidate.validate().unwrap_err();
        assert!(err.to_string().contains("node 2"));
    }

    // ------------------------------------------------------------------------
    // FeedbackLoop tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_feedback_loop_increment_and_reset() {
        let mut feedback = FeedbackLoop::default();
        feedback.increment("too long");
        feedback.increment("still too long");

        assert_eq!(feedback.retry_count, 2);
        assert_eq!(feedback.last_feedback.as_deref(), Some("still too long"));

        feedback.reset();
        assert_eq!(feedback, FeedbackLoop::default());
    }

    // ------------------------------------------------------------------------
    // SessionState tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_session_state_new() {
        let state = SessionState::new(lesson());

        assert_eq!(state.status(), SessionStatus::AwaitingPathSelection);
        assert_eq!(state.current_index(), 0);
        assert_eq!(state.history_window(), DEFAULT_HISTORY_WINDOW);
        assert!(state.selected_path().is_none());
        assert!(state.progress().is_none());
        assert_eq!(state.started_at, state.updated_at);
    }

    #[test]
    fn test_select_path_binds_first_node() {
        let state = teaching_state(3);

        assert_eq!(state.status(), SessionStatus::Teaching);
        assert_eq!(state.current_index(), 0);
        assert_eq!(state.current_node().unwrap().id, "n1");
        assert_eq!(state.progress(), Some((1, 3)));
    }

    #[test]
    fn test_select_path_unknown_id() {
        let mut state = SessionState::new(lesson());
        state.offer_paths(vec![path("1", 3)]).unwrap();

        let err = state.select_path("42").unwrap_err();
        assert!(matches!(err, GuideError::InvalidPathId { ref path_id } if path_id == "42"));
        assert_eq!(state.status(), SessionStatus::AwaitingPathSelection);
    }

    #[test]
    fn test_select_path_without_options() {
        let mut state = SessionState::new(lesson());
        assert!(matches!(
            state.select_path("1"),
            Err(GuideError::InvalidPathId { .. })
        ));
    }

    #[test]
    fn test_select_path_twice_is_rejected() {
        let mut state = teaching_state(3);
        let err = state.select_path("1").unwrap_err();
        assert!(matches!(err, GuideError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_offer_paths_after_selection_is_rejected() {
        let mut state = teaching_state(3);
        assert!(state.offer_paths(vec![path("2", 3)]).is_err());
        assert_eq!(state.path_options().len(), 1);
    }

    #[test]
    fn test_advance_is_monotonic_and_completes_on_last_node() {
        let mut state = teaching_state(3);

        assert_eq!(state.advance().unwrap(), Advance::Moved(1));
        assert_eq!(state.advance().unwrap(), Advance::Moved(2));
        assert_eq!(state.advance().unwrap(), Advance::Completed);

        assert_eq!(state.current_index(), 2);
        assert!(state.is_complete());
        assert!(matches!(
            state.advance(),
            Err(GuideError::InvalidStateTransition { .. })
        ));
        assert_eq!(state.current_index(), 2);
    }

    #[test]
    fn test_advance_before_selection_is_rejected() {
        let mut state = SessionState::new(lesson());
        assert!(state.advance().is_err());
    }

    #[test]
    fn test_advance_resets_feedback_loop() {
        let mut state = teaching_state(2);
        state.feedback_loop_mut().increment("vague");

        state.advance().unwrap();
        assert_eq!(state.feedback_loop().retry_count, 0);
        assert!(state.feedback_loop().last_feedback.is_none());
    }

    #[test]
    fn test_history_window_keeps_most_recent_in_order() {
        let mut state = SessionState::with_history_window(lesson(), 4);
        for i in 0..9 {
            let role = if i % 2 == 0 {
                MessageRole::Tutor
            } else {
                MessageRole::User
            };
            state.add_message(role, format!("m{i}"));
        }

        let contents: Vec<&str> = state.history().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m5", "m6", "m7", "m8"]);
    }

    #[test]
    fn test_history_window_minimum_is_one() {
        let mut state = SessionState::with_history_window(lesson(), 0);
        state.add_message(MessageRole::User, "a");
        state.add_message(MessageRole::User, "b");
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.history()[0].content, "b");
    }

    #[test]
    fn test_recent_history_and_last_tutor_message() {
        let mut state = SessionState::new(lesson());
        assert!(state.last_tutor_message().is_none());

        state.add_message(MessageRole::Tutor, "t1");
        state.add_message(MessageRole::User, "u1");
        state.add_message(MessageRole::Tutor, "t2");
        state.add_message(MessageRole::User, "u2");

        let recent: Vec<&str> = state.recent_history(2).map(|m| m.content.as_str()).collect();
        assert_eq!(recent, vec!["t2", "u2"]);
        assert_eq!(state.recent_history(10).count(), 4);
        assert_eq!(state.last_tutor_message(), Some("t2"));
    }

    #[test]
    fn test_session_state_touch() {
        let mut state = SessionState::new(lesson());
        let original_updated_at = state.updated_at;

        std::thread::sleep(std::time::Duration::from_millis(10));
        state.touch();

        assert!(state.updated_at > original_updated_at);
        assert_eq!(state.started_at, original_updated_at);
    }

    #[test]
    fn test_session_state_display() {
        let state = teaching_state(3);
        let text = state.to_string();
        assert!(text.contains("node 1/3"));
        assert!(text.contains("concept n1"));
        assert!(text.contains("[teaching]"));

        let fresh = SessionState::new(lesson());
        assert!(fresh.to_string().contains("no path selected"));
    }

    #[test]
    fn test_session_state_roundtrip() {
        let mut state = teaching_state(3);
        state.add_message(MessageRole::Tutor, "What moves a value?");
        state.add_message(MessageRole::User, "Assignment");
        state.advance().unwrap();

        let json = serde_json::to_string(&state).unwrap();
        let restored: SessionState = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.session_id, state.session_id);
        assert_eq!(restored.status(), SessionStatus::Teaching);
        assert_eq!(restored.current_index(), 1);
        assert_eq!(restored.history().len(), 2);
        assert_eq!(restored.history()[1].role, MessageRole::User);
        assert_eq!(restored.selected_path().unwrap().id, "1");
    }
}

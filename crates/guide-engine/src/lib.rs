//! Guided Learning Engine
//!
//! Drives interactive tutoring sessions: generates teaching paths for a
//! lesson, evaluates learner replies, and produces reviewed teaching turns.

pub mod agents;
pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod lesson;
pub mod parser;
pub mod session;
pub mod transcript;

pub use agents::{
    Assessment, EvaluationResult, EvaluatorAgent, GeneratedTurn, PathGeneratorAgent,
    ReviewResult, ReviewerAgent, TutorAgent, UserIntent,
};
pub use config::{AgentTemperatures, Config, HistoryWindows, Provider, RubricConfig};
pub use engine::{
    NodeSummary, OrchestrationEngine, PathOption, ReviewedTurn, TurnOutcome, DEFAULT_MAX_RETRIES,
};
pub use error::{GenerationErrorKind, GuideError, Result};
pub use generation::{GenerationClient, OpenAiCompatibleClient, RecordedCall, ScriptedClient};
pub use lesson::{find_lesson_plans, LessonContext, LessonPlan, LessonSummary, PlannedLesson};
pub use parser::{FallbackField, JsonMap, StructuredResponseParser};
pub use session::{
    Advance, FeedbackLoop, Message, MessageRole, SessionState, SessionStatus, TeachingNode,
    TeachingPath, DEFAULT_HISTORY_WINDOW,
};
pub use transcript::TranscriptGenerator;

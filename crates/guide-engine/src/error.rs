//! Error types for the guided learning engine.
//!
//! This module defines the error hierarchy for all engine operations,
//! including configuration loading, lesson-plan parsing, generation calls,
//! structured-output parsing, and session state transitions.

use std::path::PathBuf;

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, GuideError>;

/// Maximum number of characters of raw generation text kept on a parse failure.
pub const EXCERPT_LIMIT: usize = 300;

/// Errors that can occur while running a tutoring session.
///
/// Error variants are organized by subsystem and include actionable suggestions
/// where possible to help users resolve issues.
#[derive(Debug, thiserror::Error)]
pub enum GuideError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your guide.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Lesson Plan Errors
    // ========================================================================
    /// Lesson plan file was not found at the specified path.
    #[error("Lesson plan not found: '{path}'\n\nSuggestion: Check the path or place a LessonPlan*.json file in the current directory")]
    LessonPlanNotFound {
        /// Path where the lesson plan was expected.
        path: PathBuf,
    },

    /// Lesson plan file exceeds the size limit.
    #[error("Lesson plan exceeds size limit (1MB): '{path}' is {size_kb}KB\n\nSuggestion: Split the module into smaller lesson plan files")]
    LessonPlanTooLarge {
        /// Path to the oversized lesson plan.
        path: PathBuf,
        /// Actual size in kilobytes.
        size_kb: u64,
    },

    /// Lesson plan file does not have the expected structure.
    #[error("Invalid lesson plan '{path}': {message}\n\nSuggestion: The file must contain a 'lesson_plan' object with a non-empty 'lessons' array")]
    LessonPlanInvalid {
        /// Path to the lesson plan.
        path: PathBuf,
        /// Description of the structural problem.
        message: String,
    },

    /// The requested lesson number does not exist in the plan.
    #[error("Lesson {lesson_number} not found in plan\n\nSuggestion: Run with --list-lessons to see the available lesson numbers")]
    LessonNotFound {
        /// The lesson number that was requested.
        lesson_number: u32,
    },

    // ========================================================================
    // Generation Errors
    // ========================================================================
    /// The generation service returned an error or could not be reached.
    ///
    /// The engine never retries these; they are propagated to the caller unchanged.
    #[error("Generation failed ({kind}): {message}\n\nSuggestion: {suggestion}")]
    GenerationFailure {
        /// The kind of failure.
        kind: GenerationErrorKind,
        /// Detailed error message from the service or transport.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// Every recovery strategy of the structured-output parser was exhausted.
    #[error("Could not extract a JSON object from the generation output: {excerpt}")]
    ParseFailure {
        /// The start of the raw output, truncated for diagnostics.
        excerpt: String,
    },

    /// A parsed object is missing required fields or has the wrong shape.
    #[error("Generation output failed validation: {message}")]
    ValidationFailure {
        /// Description of the validation failure.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// The caller selected a path id that was never offered.
    #[error("Invalid path id: '{path_id}'\n\nSuggestion: Choose one of the path ids that were offered")]
    InvalidPathId {
        /// The rejected path id.
        path_id: String,
    },

    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categories of generation failures for structured error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// Authentication failure (invalid API key, expired credentials).
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// The service answered but the body had no usable content.
    InvalidResponse,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::InvalidResponse => write!(f, "invalid_response"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl GenerationErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check that the API key environment variable is set and valid",
            Self::RateLimit => "Wait a moment and re-submit the same response",
            Self::Server => "Retry later; the generation service may be experiencing issues",
            Self::Network => "Check your network connection and the configured baseUrl",
            Self::InvalidResponse => "Re-submit the same response; the model returned an empty answer",
            Self::Other => "Check the generation provider's status page",
        }
    }

    /// Classifies an HTTP status code returned by the generation service.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

impl GuideError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `LessonPlanNotFound` error.
    #[must_use]
    pub fn lesson_plan_not_found(path: impl Into<PathBuf>) -> Self {
        Self::LessonPlanNotFound { path: path.into() }
    }

    /// Creates a new `LessonPlanTooLarge` error.
    #[must_use]
    pub fn lesson_plan_too_large(path: impl Into<PathBuf>, size_kb: u64) -> Self {
        Self::LessonPlanTooLarge {
            path: path.into(),
            size_kb,
        }
    }

    /// Creates a new `LessonPlanInvalid` error.
    #[must_use]
    pub fn lesson_plan_invalid(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::LessonPlanInvalid {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `LessonNotFound` error.
    #[must_use]
    pub const fn lesson_not_found(lesson_number: u32) -> Self {
        Self::LessonNotFound { lesson_number }
    }

    /// Creates a new `GenerationFailure` with automatic suggestion based on error kind.
    #[must_use]
    pub fn generation(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        let suggestion = kind.suggestion().to_string();
        Self::GenerationFailure {
            kind,
            message: message.into(),
            suggestion,
        }
    }

    /// Creates a new `ParseFailure`, keeping only the first [`EXCERPT_LIMIT`] characters.
    #[must_use]
    pub fn parse_failure(raw_text: &str) -> Self {
        Self::ParseFailure {
            excerpt: raw_text.chars().take(EXCERPT_LIMIT).collect(),
        }
    }

    /// Creates a new `ValidationFailure`.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailure {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidPathId` error.
    #[must_use]
    pub fn invalid_path_id(path_id: impl Into<String>) -> Self {
        Self::InvalidPathId {
            path_id: path_id.into(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns `true` if the caller can recover by re-issuing the same or a corrected call.
    ///
    /// Engine operations leave the session unchanged on these errors, so the
    /// same input can be submitted again. Unusable generation output is included.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidPathId { .. }
                | Self::InvalidStateTransition { .. }
                | Self::ParseFailure { .. }
                | Self::ValidationFailure { .. }
                | Self::GenerationFailure {
                    kind: GenerationErrorKind::RateLimit
                        | GenerationErrorKind::Server
                        | GenerationErrorKind::Network
                        | GenerationErrorKind::InvalidResponse,
                    ..
                }
        )
    }

    /// Returns `true` if this error is fatal and requires the program to stop.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::LessonPlanNotFound { .. }
                | Self::LessonPlanTooLarge { .. }
                | Self::LessonPlanInvalid { .. }
                | Self::LessonNotFound { .. }
                | Self::GenerationFailure {
                    kind: GenerationErrorKind::Authentication,
                    ..
                }
        )
    }
}

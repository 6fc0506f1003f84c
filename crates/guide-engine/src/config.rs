//! Configuration types for the guided learning engine.
//!
//! This module provides all configuration structures used to control
//! a tutoring session, including the generation provider, per-agent
//! temperatures, history windows, the reviewer retry bound and the rubric.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GuideError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "guide.json";

/// Highest sampling temperature accepted by the supported providers.
const MAX_TEMPERATURE: f32 = 2.0;

/// Default model used for every agent.
fn default_model() -> String {
    "meta-llama/llama-4-maverick-17b-128e-instruct".to_string()
}

/// Default completion token limit per call.
const fn default_max_tokens() -> u32 {
    3000
}

/// Default HTTP request timeout in seconds.
const fn default_request_timeout() -> u64 {
    120
}

/// Default number of reviewer rejections before failing open.
const fn default_max_reviewer_retries() -> u32 {
    crate::engine::DEFAULT_MAX_RETRIES
}

/// Default number of recent messages shown to the evaluator.
const fn default_evaluator_window() -> usize {
    2
}

/// Default number of recent messages shown to the tutor.
const fn default_tutor_window() -> usize {
    6
}

/// Default number of messages stored in the session history.
const fn default_max_stored() -> usize {
    10
}

const fn default_path_generator_temp() -> f32 {
    0.7
}

const fn default_evaluator_temp() -> f32 {
    0.1
}

const fn default_tutor_temp() -> f32 {
    0.5
}

const fn default_reviewer_temp() -> f32 {
    0.3
}

fn default_rubric_name() -> String {
    "Learning Principles".to_string()
}

fn default_rubric_principles() -> Vec<String> {
    [
        "Active learning: the learner has to produce an answer, not just recognise one",
        "Cognitive load: one concept per turn, no unrelated detail",
        "Scaffolding: the challenge sits just beyond what the learner has shown",
        "Misconceptions: errors are diagnosed and treated as signals",
        "Relevance: abstract ideas are tied to a concrete problem",
        "Emotional awareness: the tone is supportive and acknowledges struggle",
        "Transfer: the skill is framed so it applies beyond this example",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Main configuration for a tutoring session.
///
/// Every field has a default, so an empty `guide.json` (or no file at all)
/// yields a usable configuration pointing at Groq.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Generation provider; selects the default endpoint and API key variable.
    #[serde(default)]
    pub provider: Provider,

    /// Override for the provider's chat-completions base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Override for the environment variable holding the API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Completion token limit per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Sampling temperature per agent.
    #[serde(default)]
    pub temperatures: AgentTemperatures,

    /// Reviewer rejections tolerated before the last turn is shipped anyway.
    #[serde(default = "default_max_reviewer_retries")]
    pub max_reviewer_retries: u32,

    /// History window sizes.
    #[serde(default)]
    pub history: HistoryWindows,

    /// Rubric handed to the reviewer.
    #[serde(default)]
    pub rubric: RubricConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            base_url: None,
            model: default_model(),
            api_key_env: None,
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            temperatures: AgentTemperatures::default(),
            max_reviewer_retries: default_max_reviewer_retries(),
            history: HistoryWindows::default(),
            rubric: RubricConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `guide.json` in the current directory. If not found,
    /// returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            GuideError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `guide.json` in a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::ConfigParseError` if the file exists but contains
    /// invalid JSON or invalid enum values.
    ///
    /// Returns `GuideError::ConfigValidationError` if the configuration values
    /// are invalid (e.g., zero retries, a window larger than the stored history).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(GuideError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| GuideError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// Checks that:
    /// - `model` is not empty
    /// - `maxTokens`, `requestTimeoutSecs` and `maxReviewerRetries` are greater than 0
    /// - every history window is greater than 0 and no larger than `history.maxStored`
    /// - every temperature is within `[0, 2]`
    /// - the rubric has at least one principle
    ///
    /// # Errors
    ///
    /// Returns `GuideError::ConfigValidationError` if any validation check fails.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(GuideError::config_validation(
                "model must not be empty",
                "Set model to the identifier of a chat model in your guide.json",
            ));
        }

        if self.max_tokens == 0 {
            return Err(GuideError::config_validation(
                "maxTokens must be greater than 0",
                "Set maxTokens to at least 1 in your guide.json",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(GuideError::config_validation(
                "requestTimeoutSecs must be greater than 0",
                "Set requestTimeoutSecs to at least 1 second in your guide.json",
            ));
        }

        if self.max_reviewer_retries == 0 {
            return Err(GuideError::config_validation(
                "maxReviewerRetries must be greater than 0",
                "Set maxReviewerRetries to at least 1 in your guide.json",
            ));
        }

        self.history.validate()?;
        self.temperatures.validate()?;

        if self.rubric.principles.iter().all(|p| p.trim().is_empty()) {
            return Err(GuideError::config_validation(
                "rubric.principles must contain at least one principle",
                "Add the principles the reviewer should check in your guide.json",
            ));
        }

        Ok(())
    }

    /// Returns the chat-completions base URL: the override, or the provider default.
    #[must_use]
    pub fn resolved_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    /// Returns the environment variable consulted for the API key, if any.
    #[must_use]
    pub fn resolved_api_key_env(&self) -> Option<&str> {
        self.api_key_env
            .as_deref()
            .or_else(|| self.provider.default_api_key_env())
    }
}

/// Supported generation providers.
///
/// All of them speak the OpenAI chat-completions protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Provider {
    /// Groq (default).
    #[default]
    Groq,
    /// `OpenAI`.
    OpenAi,
    /// A local Ollama server.
    Ollama,
}

impl Provider {
    /// Parses a string into a `Provider`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "groq" => Some(Self::Groq),
            "openai" => Some(Self::OpenAi),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    /// Default chat-completions base URL for this provider.
    #[must_use]
    pub const fn default_base_url(&self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://127.0.0.1:11434/v1",
        }
    }

    /// Default environment variable holding the API key; `None` for local servers.
    #[must_use]
    pub const fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::Groq => Some("GROQ_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Ollama => None,
        }
    }
}

impl<'de> Deserialize<'de> for Provider {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid provider '{s}': expected one of 'groq', 'openai', 'ollama'"
            ))
        })
    }
}

impl Serialize for Provider {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::Groq => "groq",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        };
        serializer.serialize_str(s)
    }
}

/// Sampling temperature for each agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTemperatures {
    /// Path generator temperature.
    #[serde(default = "default_path_generator_temp")]
    pub path_generator: f32,

    /// Evaluator temperature.
    #[serde(default = "default_evaluator_temp")]
    pub evaluator: f32,

    /// Tutor temperature.
    #[serde(default = "default_tutor_temp")]
    pub tutor: f32,

    /// Reviewer temperature.
    #[serde(default = "default_reviewer_temp")]
    pub reviewer: f32,
}

impl Default for AgentTemperatures {
    fn default() -> Self {
        Self {
            path_generator: default_path_generator_temp(),
            evaluator: default_evaluator_temp(),
            tutor: default_tutor_temp(),
            reviewer: default_reviewer_temp(),
        }
    }
}

impl AgentTemperatures {
    fn validate(&self) -> Result<()> {
        let entries = [
            ("pathGenerator", self.path_generator),
            ("evaluator", self.evaluator),
            ("tutor", self.tutor),
            ("reviewer", self.reviewer),
        ];

        for (name, value) in entries {
            if !(0.0..=MAX_TEMPERATURE).contains(&value) {
                return Err(GuideError::config_validation(
                    format!("temperatures.{name} must be between 0 and {MAX_TEMPERATURE}, got {value}"),
                    format!("Set temperatures.{name} to a value in [0, {MAX_TEMPERATURE}] in your guide.json"),
                ));
            }
        }

        Ok(())
    }
}

/// History window sizes, counted in messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryWindows {
    /// Recent messages shown to the evaluator.
    #[serde(default = "default_evaluator_window")]
    pub evaluator_window: usize,

    /// Recent messages shown to the tutor.
    #[serde(default = "default_tutor_window")]
    pub tutor_window: usize,

    /// Messages kept in the session history; older ones are dropped first.
    #[serde(default = "default_max_stored")]
    pub max_stored: usize,
}

impl Default for HistoryWindows {
    fn default() -> Self {
        Self {
            evaluator_window: default_evaluator_window(),
            tutor_window: default_tutor_window(),
            max_stored: default_max_stored(),
        }
    }
}

impl HistoryWindows {
    fn validate(&self) -> Result<()> {
        if self.max_stored == 0 {
            return Err(GuideError::config_validation(
                "history.maxStored must be greater than 0",
                "Set history.maxStored to at least 1 in your guide.json",
            ));
        }

        for (name, value) in [
            ("evaluatorWindow", self.evaluator_window),
            ("tutorWindow", self.tutor_window),
        ] {
            if value == 0 || value > self.max_stored {
                return Err(GuideError::config_validation(
                    format!(
                        "history.{name} must be between 1 and history.maxStored ({}), got {value}",
                        self.max_stored
                    ),
                    format!("Lower history.{name} or raise history.maxStored in your guide.json"),
                ));
            }
        }

        Ok(())
    }
}

/// The rubric the reviewer checks teaching turns against.
///
/// The engine never looks inside it; only the reviewer renders it into its prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricConfig {
    /// Display name of the rubric.
    #[serde(default = "default_rubric_name")]
    pub name: String,

    /// The principles, in the order they are presented.
    #[serde(default = "default_rubric_principles")]
    pub principles: Vec<String>,
}

impl Default for RubricConfig {
    fn default() -> Self {
        Self {
            name: default_rubric_name(),
            principles: default_rubric_principles(),
        }
    }
}

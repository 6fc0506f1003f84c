//! Generates candidate teaching paths for a lesson.

use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::request_structured;
use crate::error::{GuideError, Result};
use crate::generation::GenerationClient;
use crate::lesson::LessonContext;
use crate::parser::StructuredResponseParser;
use crate::session::TeachingPath;

/// Node counts a generated path is expected to stay within.
const EXPECTED_NODE_RANGE: std::ops::RangeInclusive<usize> = 3..=5;

const SYSTEM_PROMPT: &str = r#"You design learning paths. Given a lesson, propose 2 or 3 distinct ways to teach it.

Each path is a sequence of 3 to 5 nodes. Every node covers exactly one concept and states what the learner should be able to do after it. The first node orients the learner; the last node consolidates or checks understanding. Paths must differ in approach (for example: example-first, analogy-first, problem-first), not just in wording.

Return only a JSON object of this form:
{
  "paths": [
    {
      "id": "1",
      "name": "Short name of the approach",
      "description": "What makes this approach different",
      "sequence": [
        {"id": "1", "concept": "Single concept", "goal": "What the learner can do afterwards"}
      ]
    }
  ]
}"#;

#[derive(Debug, Deserialize)]
struct PathsEnvelope {
    paths: Vec<Value>,
}

/// Proposes alternative node sequences from a lesson's objectives.
#[derive(Clone)]
pub struct PathGeneratorAgent {
    client: Arc<dyn GenerationClient>,
    parser: StructuredResponseParser,
    temperature: f32,
}

impl PathGeneratorAgent {
    /// Creates the agent.
    #[must_use]
    pub fn new(client: Arc<dyn GenerationClient>, temperature: f32) -> Self {
        Self {
            client,
            parser: StructuredResponseParser::new(),
            temperature,
        }
    }

    /// Generates the paths offered for `lesson`.
    ///
    /// Malformed entries and repeated ids are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Propagates generation and parse failures. Returns
    /// `GuideError::ValidationFailure` if the reply has no `paths` array or no
    /// entry survives validation.
    pub async fn generate_paths(&self, lesson: &LessonContext) -> Result<Vec<TeachingPath>> {
        tracing::info!(lesson = %lesson.title, "Generating teaching paths");

        let envelope: PathsEnvelope = request_structured(
            self.client.as_ref(),
            &self.parser,
            "path_generator",
            SYSTEM_PROMPT,
            &user_prompt(lesson),
            self.temperature,
        )
        .await?;

        let paths = validate_paths(envelope.paths);
        if paths.is_empty() {
            return Err(GuideError::validation(
                "path generation produced no valid teaching paths",
            ));
        }

        tracing::info!(count = paths.len(), "Teaching paths generated");
        Ok(paths)
    }
}

fn user_prompt(lesson: &LessonContext) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "LESSON: {}", lesson.title);
    let _ = writeln!(prompt, "\nLEARNING OBJECTIVES:");
    for (i, objective) in lesson.objectives.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {objective}", i + 1);
    }
    if !lesson.topics.is_empty() {
        let _ = writeln!(prompt, "\nTOPICS: {}", lesson.topics.join(", "));
    }
    let _ = write!(prompt, "\nPropose the teaching paths. Return only the JSON object.");
    prompt
}

/// Keeps the well-formed entries with unseen ids, in their original order.
fn validate_paths(candidates: Vec<Value>) -> Vec<TeachingPath> {
    let mut seen = HashSet::new();
    let mut paths = Vec::with_capacity(candidates.len());

    for (position, candidate) in candidates.into_iter().enumerate() {
        let path = match serde_json::from_value::<TeachingPath>(candidate)
            .map_err(|e| GuideError::validation(e.to_string()))
            .and_then(|path| path.validate().map(|()| path))
        {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(position, error = %e, "Discarding malformed teaching path");
                continue;
            }
        };

        if !seen.insert(path.id.clone()) {
            tracing::warn!(position, path_id = %path.id, "Discarding teaching path with duplicate id");
            continue;
        }

        if !EXPECTED_NODE_RANGE.contains(&path.len()) {
            tracing::warn!(
                path_id = %path.id,
                nodes = path.len(),
                "Teaching path node count outside the expected range"
            );
        }

        paths.push(path);
    }

    paths
}

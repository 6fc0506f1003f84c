//! Lesson plan loading for the guided learning engine.
//!
//! A lesson plan file groups the lessons of one module. Each lesson becomes a
//! [`LessonContext`], the immutable input of a tutoring session.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GuideError, Result};

/// Maximum allowed lesson plan file size in bytes (1MB).
pub const MAX_LESSON_PLAN_SIZE: u64 = 1024 * 1024;

/// What a session teaches: a title, ordered objectives and covered topics.
///
/// Created once per lesson and owned by the caller; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonContext {
    /// Lesson title.
    pub title: String,

    /// Learning objectives, in teaching order.
    pub objectives: Vec<String>,

    /// Topics covered by the lesson.
    #[serde(default)]
    pub topics: Vec<String>,
}

impl LessonContext {
    /// Creates a lesson context from its parts.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        objectives: impl IntoIterator<Item = impl Into<String>>,
        topics: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            title: title.into(),
            objectives: objectives.into_iter().map(Into::into).collect(),
            topics: topics.into_iter().map(Into::into).collect(),
        }
    }
}

/// One lesson entry as it appears in the plan file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedLesson {
    /// 1-indexed lesson number.
    pub lesson_number: u32,

    /// Lesson title.
    #[serde(default)]
    pub title: String,

    /// Learning objectives.
    #[serde(default)]
    pub learning_objectives: Vec<String>,

    /// Topics covered.
    #[serde(default)]
    pub topics_covered: Vec<String>,
}

/// Short description of a lesson, used for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonSummary {
    /// 1-indexed lesson number.
    pub number: u32,
    /// Lesson title.
    pub title: String,
    /// Topics covered.
    pub topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LessonPlanFile {
    lesson_plan: LessonPlanBody,
}

#[derive(Debug, Deserialize)]
struct LessonPlanBody {
    #[serde(default)]
    module_title: Option<String>,
    #[serde(default)]
    lessons: Vec<PlannedLesson>,
}

/// A loaded lesson plan.
#[derive(Debug, Clone, Serialize)]
pub struct LessonPlan {
    /// Path the plan was loaded from.
    pub path: PathBuf,

    /// Title of the module the lessons belong to.
    pub module_title: String,

    /// Lessons in file order.
    pub lessons: Vec<PlannedLesson>,
}

impl LessonPlan {
    /// Loads a lesson plan from the given file path.
    ///
    /// Validates that:
    /// - The file exists
    /// - The file size is within the 1MB limit
    /// - The content is a `lesson_plan` object with a non-empty `lessons` array
    ///
    /// # Errors
    ///
    /// Returns `GuideError::LessonPlanNotFound` if the file doesn't exist.
    /// Returns `GuideError::LessonPlanTooLarge` if the file exceeds 1MB.
    /// Returns `GuideError::LessonPlanInvalid` if the JSON has the wrong structure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GuideError::lesson_plan_not_found(path)
            } else {
                GuideError::Io(e)
            }
        })?;

        let file_size = metadata.len();
        if file_size > MAX_LESSON_PLAN_SIZE {
            return Err(GuideError::lesson_plan_too_large(path, file_size / 1024));
        }

        let content = std::fs::read_to_string(path)?;
        let plan = Self::from_json(&content, path)?;

        tracing::info!(
            path = %path.display(),
            module = %plan.module_title,
            lessons = plan.lessons.len(),
            "Lesson plan loaded"
        );

        Ok(plan)
    }

    /// Parses lesson plan JSON; `path` is only used for error messages.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::LessonPlanInvalid` if the JSON has the wrong structure
    /// or contains no lessons.
    pub fn from_json(content: &str, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file: LessonPlanFile = serde_json::from_str(content)
            .map_err(|e| GuideError::lesson_plan_invalid(&path, e.to_string()))?;

        if file.lesson_plan.lessons.is_empty() {
            return Err(GuideError::lesson_plan_invalid(
                path,
                "no lessons found in lesson plan",
            ));
        }

        Ok(Self {
            path,
            module_title: file
                .lesson_plan
                .module_title
                .unwrap_or_else(|| "Unknown Module".to_string()),
            lessons: file.lesson_plan.lessons,
        })
    }

    /// Returns the lesson with the given 1-indexed number as a session input.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::LessonNotFound` if no lesson has that number.
    pub fn lesson(&self, lesson_number: u32) -> Result<LessonContext> {
        let lesson = self
            .lessons
            .iter()
            .find(|lesson| lesson.lesson_number == lesson_number)
            .ok_or_else(|| GuideError::lesson_not_found(lesson_number))?;

        tracing::debug!(
            lesson_number,
            title = %lesson.title,
            objectives = lesson.learning_objectives.len(),
            "Lesson selected"
        );

        Ok(LessonContext {
            title: lesson.title.clone(),
            objectives: lesson.learning_objectives.clone(),
            topics: lesson.topics_covered.clone(),
        })
    }

    /// Lists every lesson in the plan.
    #[must_use]
    pub fn summaries(&self) -> Vec<LessonSummary> {
        self.lessons
            .iter()
            .map(|lesson| LessonSummary {
                number: lesson.lesson_number,
                title: lesson.title.clone(),
                topics: lesson.topics_covered.clone(),
            })
            .collect()
    }
}

/// Finds `LessonPlan*.json` files in a directory, sorted by name.
///
/// Unreadable directories yield an empty list.
#[must_use]
pub fn find_lesson_plans(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut plans: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.file_name().and_then(|n| n.to_str()).is_some_and(|name| {
                    name.starts_with("LessonPlan")
                        && Path::new(name)
                            .extension()
                            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
                })
        })
        .collect();

    plans.sort();
    plans
}

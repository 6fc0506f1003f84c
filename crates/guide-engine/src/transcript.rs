//! Markdown transcripts of tutoring sessions.
//!
//! # Example
//!
//! ```rust
//! use guide_engine::{LessonContext, MessageRole, SessionState, TranscriptGenerator};
//!
//! let mut state = SessionState::new(LessonContext::new("DNS", ["Trace a lookup"], ["dns"]));
//! state.add_message(MessageRole::Tutor, "What does a resolver do?");
//!
//! let markdown = TranscriptGenerator::new(&state).generate();
//! assert!(markdown.starts_with("# Session Transcript: DNS"));
//! assert!(markdown.contains("**Tutor:**"));
//! ```

use std::fmt::Write;

use chrono::Utc;

use crate::session::{MessageRole, SessionState};

/// Renders a session as a Markdown document.
///
/// The history is bounded, so only the retained messages appear.
pub struct TranscriptGenerator<'a> {
    state: &'a SessionState,
}

impl<'a> TranscriptGenerator<'a> {
    /// Creates a generator for the given session.
    #[must_use]
    pub const fn new(state: &'a SessionState) -> Self {
        Self { state }
    }

    /// Generates the complete transcript.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_path(&mut output);
        self.write_conversation(&mut output);
        Self::write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Session Transcript: {}\n",
            self.state.lesson_context.title
        );
    }

    fn write_summary(&self, output: &mut String) {
        let state = self.state;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Field | Value |");
        let _ = writeln!(output, "|-------|-------|");
        let _ = writeln!(output, "| Session | `{}` |", state.session_id);
        let _ = writeln!(output, "| Status | {} |", state.status());
        if let Some((position, total)) = state.progress() {
            let _ = writeln!(output, "| Progress | node {position} of {total} |");
        }
        let _ = writeln!(
            output,
            "| Started | {} |",
            state.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(
            output,
            "| Duration | {} |",
            format_duration(state.elapsed().num_seconds())
        );
        let _ = writeln!(output);
    }

    fn write_path(&self, output: &mut String) {
        let Some(path) = self.state.selected_path() else {
            return;
        };

        let _ = writeln!(output, "## Path: {}\n", path.name);
        if !path.description.is_empty() {
            let _ = writeln!(output, "{}\n", path.description);
        }
        for (i, node) in path.sequence.iter().enumerate() {
            let marker = if i < self.state.current_index() || self.state.is_complete() {
                "x"
            } else {
                " "
            };
            let _ = writeln!(output, "- [{marker}] **{}**: {}", node.concept, node.goal);
        }
        let _ = writeln!(output);
    }

    fn write_conversation(&self, output: &mut String) {
        let _ = writeln!(output, "## Conversation\n");

        if self.state.history().is_empty() {
            let _ = writeln!(output, "_No messages._\n");
            return;
        }

        for message in self.state.history() {
            let speaker = match message.role {
                MessageRole::Tutor => "Tutor",
                MessageRole::User => "You",
            };
            let _ = writeln!(output, "**{speaker}:**\n");
            for line in message.content.lines() {
                if line.is_empty() {
                    let _ = writeln!(output, ">");
                } else {
                    let _ = writeln!(output, "> {line}");
                }
            }
            let _ = writeln!(output);
        }
    }

    fn write_footer(output: &mut String) {
        let _ = writeln!(output, "---\n");
        let _ = writeln!(
            output,
            "*Generated {}*",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
}

/// Formats seconds as `1h 2m 3s`, omitting leading zero units.
fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (hours, minutes, secs) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);

    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

//! Tolerant parsing of structured generation output.
//!
//! Generation services are asked for a JSON object but routinely wrap it in
//! prose or code fences, leave trailing commas, or stop mid-object. The
//! [`StructuredResponseParser`] runs an ordered chain of recovery strategies
//! and only fails once every strategy is exhausted:
//!
//! 1. parse the trimmed text directly
//! 2. strip a Markdown code fence
//! 3. slice the first balanced `{ ... }` block
//! 4. repair common malformations
//! 5. rebuild an object from labelled fields when the text has no `{` at all

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{GuideError, Result};

/// A parsed JSON object.
pub type JsonMap = Map<String, Value>;

/// Number of characters of raw text used for a missing primary field.
const PRIMARY_EXCERPT_LIMIT: usize = 500;

static LABEL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b([a-z][a-z0-9_]*)\s*:").ok());

/// A field rebuilt from labelled prose when the output contains no JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackField {
    /// Field name, also used as the label to look for (case-insensitive).
    pub name: String,
    /// Value used when the label is absent.
    pub placeholder: String,
}

impl FallbackField {
    /// Creates a fallback field.
    #[must_use]
    pub fn new(name: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            placeholder: placeholder.into(),
        }
    }
}

/// Turns raw generation text into a JSON object.
#[derive(Debug, Clone)]
pub struct StructuredResponseParser {
    fallback_fields: Vec<FallbackField>,
}

impl Default for StructuredResponseParser {
    fn default() -> Self {
        Self::with_fallback_fields(vec![
            FallbackField::new("teaching", ""),
            FallbackField::new("question", "What do you think so far?"),
        ])
    }
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    Direct,
    CodeFence,
    BraceScan,
    Repair,
    Reconstruct,
}

impl StructuredResponseParser {
    /// Creates a parser with the default `teaching`/`question` fallback fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parser that rebuilds the given fields from labelled prose.
    ///
    /// The first field is the primary one: when its label is missing it takes
    /// the start of the raw text instead of its placeholder.
    #[must_use]
    pub const fn with_fallback_fields(fallback_fields: Vec<FallbackField>) -> Self {
        Self { fallback_fields }
    }

    /// Parses raw text into a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::ParseFailure` with an excerpt of the input when no
    /// strategy yields an object.
    pub fn parse(&self, raw_text: &str) -> Result<JsonMap> {
        let text = raw_text.trim();

        if let Some(map) = parse_object(text) {
            return Ok(succeeded(Strategy::Direct, map));
        }

        let unfenced = strip_code_fence(text);
        if let Some(map) = unfenced.and_then(parse_object) {
            return Ok(succeeded(Strategy::CodeFence, map));
        }

        let sliced = balanced_object(text);
        if let Some(map) = sliced.and_then(parse_object) {
            return Ok(succeeded(Strategy::BraceScan, map));
        }

        let candidate = unfenced.unwrap_or(text);
        let repair_input = sliced.or_else(|| candidate.find('{').map(|start| &candidate[start..]));
        if let Some(map) = repair_input.map(repair_json).as_deref().and_then(parse_object) {
            return Ok(succeeded(Strategy::Repair, map));
        }

        if !raw_text.contains('{') {
            return Ok(succeeded(Strategy::Reconstruct, self.reconstruct(text)));
        }

        tracing::debug!(length = raw_text.len(), "Structured parse exhausted every strategy");
        Err(GuideError::parse_failure(raw_text))
    }

    /// Parses raw text and deserializes the object into `T`.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::ParseFailure` when no object can be extracted and
    /// `GuideError::ValidationFailure` when the object does not have the shape of `T`.
    pub fn parse_as<T: DeserializeOwned>(&self, raw_text: &str) -> Result<T> {
        let map = self.parse(raw_text)?;
        serde_json::from_value(Value::Object(map))
            .map_err(|e| GuideError::validation(e.to_string()))
    }

    fn reconstruct(&self, text: &str) -> JsonMap {
        let labels = self.locate_labels(text);
        let mut map = JsonMap::new();

        for (position, field) in self.fallback_fields.iter().enumerate() {
            let found = labels
                .iter()
                .enumerate()
                .find(|(_, label)| label.field == position);

            let value = match found {
                Some((i, label)) => {
                    let end = labels.get(i + 1).map_or(text.len(), |next| next.start);
                    text[label.value_start..end].trim().to_string()
                }
                None if position == 0 => text.chars().take(PRIMARY_EXCERPT_LIMIT).collect(),
                None => field.placeholder.clone(),
            };
            map.insert(field.name.clone(), Value::String(value));
        }

        map
    }

    /// Occurrences of fallback labels in `text`, in text order.
    fn locate_labels(&self, text: &str) -> Vec<Label> {
        let Some(pattern) = LABEL_PATTERN.as_ref() else {
            return Vec::new();
        };

        pattern
            .captures_iter(text)
            .filter_map(|captures| {
                let whole = captures.get(0)?;
                let name = captures.get(1)?.as_str();
                let field = self
                    .fallback_fields
                    .iter()
                    .position(|field| field.name.eq_ignore_ascii_case(name))?;
                Some(Label {
                    field,
                    start: whole.start(),
                    value_start: whole.end(),
                })
            })
            .collect()
    }
}

#[derive(Debug)]
struct Label {
    field: usize,
    start: usize,
    value_start: usize,
}

fn succeeded(strategy: Strategy, map: JsonMap) -> JsonMap {
    tracing::debug!(?strategy, keys = map.len(), "Structured parse succeeded");
    map
}

fn parse_object(text: &str) -> Option<JsonMap> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Content of the first Markdown code fence; the closing fence is optional.
///
/// Only a fence at the start of a line closes the block, so backticks inside
/// an escaped JSON string stay part of the content.
fn strip_code_fence(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];

    // A language tag runs to the end of the opening line.
    let body = match after_open.find('\n') {
        Some(newline)
            if after_open[..newline]
                .trim()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
        {
            &after_open[newline + 1..]
        }
        _ => after_open,
    };

    let close = if body.starts_with("```") {
        Some(0)
    } else {
        body.find("\n```")
    };
    let inner = close.map_or(body, |close| &body[..close]);
    Some(inner.trim())
}

/// Slices from the first `{` to its matching `}`, ignoring braces inside strings.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Fixes the malformations generation output most often has.
///
/// Drops trailing commas before `}`/`]`, escapes raw control characters inside
/// strings, and closes an unterminated string and any unclosed brackets.
fn repair_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => out.push_str(&format!("\\u{:04x}", u32::from(c))),
                c => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' => {
                closers.push('}');
                out.push(c);
            }
            '[' => {
                closers.push(']');
                out.push(c);
            }
            '}' | ']' => {
                drop_trailing_comma(&mut out);
                if closers.last() == Some(&c) {
                    closers.pop();
                }
                out.push(c);
            }
            c => out.push(c),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    drop_trailing_comma(&mut out);
    if out.ends_with(':') {
        out.push_str("null");
    }
    while let Some(closer) = closers.pop() {
        drop_trailing_comma(&mut out);
        out.push(closer);
    }

    out
}

fn drop_trailing_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    }
}

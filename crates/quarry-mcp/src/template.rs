//! Statement templates.
//!
//! A statement may contain `{{.name}}` (or `{{ .name }}`) placeholders that
//! are replaced by the text form of a template parameter. Only field
//! references are understood; any other action is rejected when the
//! template is parsed, so a tool never loads with a placeholder it cannot
//! render.

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Error parsing a statement template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// `{{` without a closing `}}`.
    #[error("unterminated placeholder starting at byte {offset}")]
    Unterminated { offset: usize },

    /// Something other than a `.name` field reference.
    #[error("unsupported template action `{{{{{action}}}}}`")]
    UnsupportedAction { action: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(String),
}

/// A parsed statement template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a statement.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut consumed = 0;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Text(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open.find("}}").ok_or(TemplateError::Unterminated {
                offset: consumed + open,
            })?;
            let action = after_open[..close].trim();
            segments.push(Segment::Field(parse_field(action)?));

            let advance = open + 2 + close + 2;
            consumed += advance;
            rest = &rest[advance..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Names referenced by placeholders, in order of appearance (may repeat).
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Text(_) => None,
        })
    }

    /// Whether the statement contains any placeholder.
    pub fn has_fields(&self) -> bool {
        self.fields().next().is_some()
    }

    /// Render with the given text values.
    ///
    /// Returns the name of the first placeholder without a value.
    pub fn render(&self, values: &HashMap<String, String>) -> Result<String, String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = values.get(name).ok_or_else(|| name.clone())?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn parse_field(action: &str) -> Result<String, TemplateError> {
    let unsupported = || TemplateError::UnsupportedAction {
        action: action.to_string(),
    };
    let name = action.strip_prefix('.').ok_or_else(unsupported)?;

    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(unsupported());
    }
    Ok(name.to_string())
}

/// Text form of a value substituted into a statement.
///
/// Strings are inserted raw, arrays are comma-joined, null renders as `NULL`.
pub fn text_form(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(text_form).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}

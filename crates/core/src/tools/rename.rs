//! # Rename Templates
//!
//! Destination filenames are built from the fields a pattern extracted:
//! `{name} - S{season:02}` with `{{` / `}}` for literal braces. The source
//! extension is appended unless the rendered name already carries it.

use crate::error::{RefileError, Result};
use crate::tools::template::{ExtractedFields, FieldValue};

#[derive(Debug, Clone, PartialEq)]
enum RenameSegment {
    Literal(String),
    Field { key: String, width: Option<usize> },
}

/// Parsed rename pattern string
#[derive(Debug, Clone, PartialEq)]
pub struct RenameTemplate {
    segments: Vec<RenameSegment>,
}

impl RenameTemplate {
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(RefileError::InvalidRenameTemplate(
                "rename pattern is empty".to_string(),
            ));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(RefileError::InvalidRenameTemplate(format!(
                        "unmatched '}}' in '{}'",
                        text
                    )))
                }
                '{' => {
                    let mut body = String::new();
                    let mut closed = false;
                    for b in chars.by_ref() {
                        if b == '}' {
                            closed = true;
                            break;
                        }
                        body.push(b);
                    }
                    if !closed {
                        return Err(RefileError::InvalidRenameTemplate(format!(
                            "unterminated placeholder in '{}'",
                            text
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(RenameSegment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(parse_placeholder(&body)?);
                }
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(RenameSegment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Field keys referenced by the template, in order of appearance
    pub fn keys(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                RenameSegment::Field { key, .. } => Some(key.as_str()),
                RenameSegment::Literal(_) => None,
            })
            .collect()
    }

    /// Render a destination filename for a file with the given extension
    pub fn render(&self, fields: &ExtractedFields, extension: &str) -> Result<String> {
        let mut name = String::new();
        for segment in &self.segments {
            match segment {
                RenameSegment::Literal(text) => name.push_str(text),
                RenameSegment::Field { key, width } => {
                    let value = fields
                        .get(key)
                        .ok_or_else(|| RefileError::MissingField(key.clone()))?;
                    name.push_str(&format_field(value, *width));
                }
            }
        }

        if !extension.is_empty() && !name.ends_with(&format!(".{}", extension)) {
            name.push('.');
            name.push_str(extension);
        }

        validate_filename(&name)?;
        Ok(name)
    }
}

/// Widest zero padding a placeholder may request
pub const MAX_PAD_WIDTH: usize = 255;

fn parse_placeholder(body: &str) -> Result<RenameSegment> {
    let (key, spec) = match body.split_once(':') {
        Some((key, spec)) => (key, Some(spec)),
        None => (body, None),
    };

    if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(RefileError::InvalidRenameTemplate(format!(
            "invalid placeholder '{{{}}}'",
            body
        )));
    }

    let width = match spec {
        None => None,
        Some(spec) => {
            let digits = spec.strip_prefix('0').unwrap_or("");
            match digits.parse::<usize>() {
                Ok(w) if w > MAX_PAD_WIDTH => {
                    return Err(RefileError::InvalidRenameTemplate(format!(
                        "padding width {} for '{}' exceeds {}",
                        w, key, MAX_PAD_WIDTH
                    )))
                }
                Ok(w) if w > 0 => Some(w),
                _ => {
                    return Err(RefileError::InvalidRenameTemplate(format!(
                        "unsupported format '{}' for '{}', expected 0<width>",
                        spec, key
                    )))
                }
            }
        }
    };

    Ok(RenameSegment::Field {
        key: key.to_string(),
        width,
    })
}

fn format_field(value: &FieldValue, width: Option<usize>) -> String {
    match (value, width) {
        (FieldValue::Integer(n), Some(w)) if *n < 0 => {
            format!("-{:0>w$}", n.unsigned_abs(), w = w.saturating_sub(1))
        }
        (FieldValue::Integer(n), Some(w)) => format!("{:0>w$}", n, w = w),
        (other, Some(w)) => format!("{:0>w$}", other.to_string(), w = w),
        (other, None) => other.to_string(),
    }
}

/// A destination name must stay inside the destination directory
pub fn validate_filename(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(RefileError::InvalidFilename(name.to_string()));
    }
    Ok(())
}

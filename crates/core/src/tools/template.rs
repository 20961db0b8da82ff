//! # Replacement Templates
//!
//! A replacement format maps output field names to directive text such as
//! `"$0:s$"` or `"S$1:d$"`. Each value is parsed once into literal and
//! group-reference segments, then evaluated against the captures of every
//! file a pattern is applied to.
//!
//! ## Grammar
//!
//! - `$<index>:<type>$` references capture group `<index>` (0-based over the
//!   capture groups) coerced to `<type>`: `s` string, `d` integer, `f` float
//! - `$$` is a literal dollar sign
//! - everything else is literal text

use crate::error::{RefileError, Result};
use crate::tools::pattern::Captures;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Coercions and Values
// ============================================================================

/// Type a captured string is converted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    String,
    Integer,
    Float,
}

impl Coercion {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "s" => Some(Self::String),
            "d" => Some(Self::Integer),
            "f" => Some(Self::Float),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::String => "s",
            Self::Integer => "d",
            Self::Float => "f",
        }
    }

    fn target_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
        }
    }

    /// Convert captured text
    pub fn coerce(&self, raw: &str) -> Result<FieldValue> {
        let fail = || RefileError::TypeCoercion {
            value: raw.to_string(),
            target: self.target_name(),
        };
        match self {
            Self::String => Ok(FieldValue::Text(raw.to_string())),
            Self::Integer => raw
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| fail()),
            Self::Float => {
                let value = raw.trim().parse::<f64>().map_err(|_| fail())?;
                if value.is_finite() {
                    Ok(FieldValue::Float(value))
                } else {
                    Err(fail())
                }
            }
        }
    }
}

/// A rendered field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Ordered output of a rendered template
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    entries: Vec<(String, FieldValue)>,
}

impl ExtractedFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field, keeping first-insertion order
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for ExtractedFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ============================================================================
// Parsed Form
// ============================================================================

/// One node of a parsed field template
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    GroupRef { index: usize, coercion: Coercion },
}

/// Parsed template for a single output field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTemplate {
    segments: Vec<Segment>,
}

impl FieldTemplate {
    /// Parse directive text
    pub fn parse(text: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            if c != '$' {
                literal.push(c);
                continue;
            }
            if matches!(chars.peek(), Some((_, '$'))) {
                chars.next();
                literal.push('$');
                continue;
            }

            let mut digits = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if !d.is_ascii_digit() {
                    break;
                }
                digits.push(d);
                chars.next();
            }
            if digits.is_empty() {
                return Err(RefileError::InvalidTemplate(format!(
                    "expected group index after '$' at offset {} in '{}'",
                    pos, text
                )));
            }
            if !matches!(chars.next(), Some((_, ':'))) {
                return Err(RefileError::InvalidTemplate(format!(
                    "expected ':' after '${}' in '{}'",
                    digits, text
                )));
            }

            let mut tag = String::new();
            let mut closed = false;
            for (_, t) in chars.by_ref() {
                if t == '$' {
                    closed = true;
                    break;
                }
                tag.push(t);
            }
            if !closed {
                return Err(RefileError::InvalidTemplate(format!(
                    "unterminated directive '${}:{}' in '{}'",
                    digits, tag, text
                )));
            }
            let coercion = Coercion::from_tag(&tag).ok_or_else(|| {
                RefileError::InvalidTemplate(format!("unknown type '{}' in '{}'", tag, text))
            })?;
            let index = digits.parse::<usize>().map_err(|_| {
                RefileError::InvalidTemplate(format!("group index {} is out of range", digits))
            })?;

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::GroupRef { index, coercion });
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    fn group_refs(&self) -> impl Iterator<Item = usize> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::GroupRef { index, .. } => Some(*index),
            Segment::Literal(_) => None,
        })
    }

    /// Evaluate against captures
    ///
    /// A lone directive keeps its coerced type; anything mixed with literal
    /// text becomes a string of the coerced values.
    pub fn render(&self, captures: &Captures) -> Result<FieldValue> {
        if let [Segment::GroupRef { index, coercion }] = self.segments.as_slice() {
            let raw = captures
                .get(*index)
                .ok_or(RefileError::MissingGroup(*index))?;
            return coercion.coerce(raw);
        }

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::GroupRef { index, coercion } => {
                    let raw = captures
                        .get(*index)
                        .ok_or(RefileError::MissingGroup(*index))?;
                    out.push_str(&coercion.coerce(raw)?.to_string());
                }
            }
        }
        Ok(FieldValue::Text(out))
    }
}

/// Parsed replacement format: ordered output fields
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplacementTemplate {
    fields: Vec<(String, FieldTemplate)>,
}

impl ReplacementTemplate {
    /// Parse the stored JSON object form (`{"key": "directive text"}`)
    ///
    /// A blank string is an empty template.
    pub fn parse_json(format: &str) -> Result<Self> {
        if format.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: serde_json::Value = serde_json::from_str(format).map_err(|e| {
            RefileError::InvalidTemplate(format!("replacement format is not JSON: {}", e))
        })?;
        let object = value.as_object().ok_or_else(|| {
            RefileError::InvalidTemplate("replacement format must be a JSON object".to_string())
        })?;

        let mut fields = Vec::with_capacity(object.len());
        for (key, text) in object {
            let text = text.as_str().ok_or_else(|| {
                RefileError::InvalidTemplate(format!("value of '{}' must be a string", key))
            })?;
            fields.push((key.clone(), FieldTemplate::parse(text)?));
        }
        Ok(Self { fields })
    }

    /// Build from (key, directive text) pairs
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| Ok((k.to_string(), FieldTemplate::parse(v)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }

    pub fn keys(&self) -> Vec<String> {
        self.fields.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Every group index the template references
    pub fn referenced_groups(&self) -> BTreeSet<usize> {
        self.fields.iter().flat_map(|(_, f)| f.group_refs()).collect()
    }

    /// Reject references to groups the regex does not define
    pub fn check_groups(&self, group_count: usize) -> Result<()> {
        match self.referenced_groups().into_iter().find(|i| *i >= group_count) {
            Some(index) => Err(RefileError::InvalidTemplate(format!(
                "references capture group {} but the pattern defines {} group(s)",
                index, group_count
            ))),
            None => Ok(()),
        }
    }

    /// Render every field; the first failing field fails the whole render
    pub fn render(&self, captures: &Captures) -> Result<ExtractedFields> {
        let mut out = ExtractedFields::new();
        for (key, field) in &self.fields {
            out.insert(key.clone(), field.render(captures)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captures(values: &[&str]) -> Captures {
        Captures::from_iter(values.iter().enumerate().map(|(i, v)| (i, v.to_string())))
    }

    #[test]
    fn test_parse_single_directive() {
        let field = FieldTemplate::parse("$1:d$").unwrap();
        assert_eq!(
            field.segments(),
            &[Segment::GroupRef {
                index: 1,
                coercion: Coercion::Integer
            }]
        );
    }

    #[test]
    fn test_parse_mixed_and_escaped() {
        let field = FieldTemplate::parse("Cost $$ S$0:d$x").unwrap();
        assert_eq!(
            field.segments(),
            &[
                Segment::Literal("Cost $ S".into()),
                Segment::GroupRef {
                    index: 0,
                    coercion: Coercion::Integer
                },
                Segment::Literal("x".into()),
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["$", "$a:s$", "$1s$", "$1:s", "$1:q$"] {
            let err = FieldTemplate::parse(bad).unwrap_err();
            assert_eq!(err.kind(), "invalid_template", "input: {}", bad);
        }
    }

    #[test]
    fn test_integer_coercion() {
        let caps = captures(&["Show", "12"]);
        let field = FieldTemplate::parse("$1:d$").unwrap();
        assert_eq!(field.render(&caps).unwrap(), FieldValue::Integer(12));

        let caps = captures(&["Show", "abc"]);
        let err = field.render(&caps).unwrap_err();
        assert!(matches!(err, RefileError::TypeCoercion { .. }));
    }

    #[test]
    fn test_mixed_field_formats_coerced_value() {
        let caps = captures(&["01"]);
        let field = FieldTemplate::parse("S$0:d$").unwrap();
        assert_eq!(field.render(&caps).unwrap(), FieldValue::Text("S1".into()));
    }

    #[test]
    fn test_float_coercion() {
        let caps = captures(&["2.5", "inf"]);
        assert_eq!(
            FieldTemplate::parse("$0:f$").unwrap().render(&caps).unwrap(),
            FieldValue::Float(2.5)
        );
        assert!(FieldTemplate::parse("$1:f$").unwrap().render(&caps).is_err());
    }

    #[test]
    fn test_missing_group() {
        let caps = captures(&["only"]);
        let err = FieldTemplate::parse("$3:s$").unwrap().render(&caps).unwrap_err();
        assert!(matches!(err, RefileError::MissingGroup(3)));
    }

    #[test]
    fn test_replacement_template_keeps_key_order() {
        let template =
            ReplacementTemplate::parse_json(r#"{"season": "$1:d$", "name": "$0:s$"}"#).unwrap();
        assert_eq!(template.keys(), vec!["season", "name"]);

        let fields = template.render(&captures(&["Show", "01"])).unwrap();
        assert_eq!(
            serde_json::to_string(&fields).unwrap(),
            r#"{"season":1,"name":"Show"}"#
        );
    }

    #[test]
    fn test_replacement_template_rejects_non_object() {
        assert!(ReplacementTemplate::parse_json("[1,2]").is_err());
        assert!(ReplacementTemplate::parse_json(r#"{"a": 1}"#).is_err());
        assert!(ReplacementTemplate::parse_json("   ").unwrap().is_empty());
    }

    #[test]
    fn test_check_groups() {
        let template = ReplacementTemplate::from_pairs([("a", "$0:s$"), ("b", "$2:d$")]).unwrap();
        assert!(template.check_groups(3).is_ok());
        assert!(template.check_groups(2).is_err());
    }
}

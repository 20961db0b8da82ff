//! # Pattern Engine
//!
//! Compiles filename patterns, lists their capture groups, and matches
//! filenames. All operations are pure: no I/O, no shared state, safe to call
//! from any number of tasks.
//!
//! Capture groups are addressed by a 0-based index over the parenthesised
//! groups (index 0 is the first group, not the whole match).

use crate::error::{RefileError, Result};
use crate::tools::template::{ExtractedFields, FieldValue, ReplacementTemplate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A capture group of a pattern, as shown to the user when authoring templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureVariable {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CaptureVariable {
    /// Name if the group is named, else `group_<index>`
    pub fn identifier(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("group_{}", self.index))
    }
}

/// Captured text by group index; groups that did not participate are absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    groups: BTreeMap<usize, String>,
}

impl Captures {
    pub fn get(&self, index: usize) -> Option<&str> {
        self.groups.get(&index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.groups.iter().map(|(i, s)| (*i, s.as_str()))
    }
}

impl FromIterator<(usize, String)> for Captures {
    fn from_iter<T: IntoIterator<Item = (usize, String)>>(iter: T) -> Self {
        Self {
            groups: iter.into_iter().collect(),
        }
    }
}

/// A compiled regex, optionally bound to its parsed replacement template
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
    variables: Vec<CaptureVariable>,
    template: Option<ReplacementTemplate>,
}

impl CompiledPattern {
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn variables(&self) -> &[CaptureVariable] {
        &self.variables
    }

    pub fn group_count(&self) -> usize {
        self.variables.len()
    }

    pub fn template(&self) -> Option<&ReplacementTemplate> {
        self.template.as_ref()
    }

    /// Bind a replacement template, checking its group references
    pub fn with_template(mut self, template: ReplacementTemplate) -> Result<Self> {
        template.check_groups(self.group_count())?;
        self.template = Some(template);
        Ok(self)
    }

    /// Match then render with the bound template; `Ok(None)` is NoMatch
    ///
    /// Without a bound template the raw captures are returned keyed by
    /// their identifiers.
    pub fn extract(&self, filename: &str) -> Result<Option<ExtractedFields>> {
        let Some(captures) = apply(self, filename) else {
            return Ok(None);
        };
        match &self.template {
            Some(template) => render_replacement(template, &captures).map(Some),
            None => Ok(Some(self.raw_fields(&captures))),
        }
    }

    fn raw_fields(&self, captures: &Captures) -> ExtractedFields {
        let mut fields = ExtractedFields::new();
        for (index, text) in captures.iter() {
            let key = self
                .variables
                .get(index)
                .map(CaptureVariable::identifier)
                .unwrap_or_else(|| format!("group_{}", index));
            fields.insert(key, FieldValue::Text(text.to_string()));
        }
        fields
    }
}

/// Compile a regex pattern
pub fn compile(regex_pattern: &str) -> Result<CompiledPattern> {
    let regex = Regex::new(regex_pattern).map_err(|e| RefileError::InvalidRegex(e.to_string()))?;
    let variables = variables_of(&regex);
    Ok(CompiledPattern {
        regex,
        variables,
        template: None,
    })
}

/// Compile a regex pattern together with its stored replacement format.
/// An empty format leaves the pattern in raw-capture mode.
pub fn compile_with_template(regex_pattern: &str, replacement_format: &str) -> Result<CompiledPattern> {
    let template = ReplacementTemplate::parse_json(replacement_format)?;
    let compiled = compile(regex_pattern)?;
    if template.is_empty() {
        return Ok(compiled);
    }
    compiled.with_template(template)
}

/// List the capture groups of a pattern in index order
pub fn extract_variables(regex_pattern: &str) -> Result<Vec<CaptureVariable>> {
    Ok(compile(regex_pattern)?.variables)
}

fn variables_of(regex: &Regex) -> Vec<CaptureVariable> {
    // capture_names() yields the implicit whole-match group first
    regex
        .capture_names()
        .skip(1)
        .enumerate()
        .map(|(index, name)| CaptureVariable {
            index,
            name: name.map(str::to_string),
        })
        .collect()
}

/// Match a filename; `None` means NoMatch
pub fn apply(compiled: &CompiledPattern, filename: &str) -> Option<Captures> {
    let caps = compiled.regex.captures(filename)?;
    Some(
        caps.iter()
            .skip(1)
            .enumerate()
            .filter_map(|(index, m)| m.map(|m| (index, m.as_str().to_string())))
            .collect(),
    )
}

/// Render a replacement template against captures
pub fn render_replacement(
    template: &ReplacementTemplate,
    captures: &Captures,
) -> Result<ExtractedFields> {
    template.render(captures)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOW: &str = r"(?P<name>\w+)_S(?P<season>\d+)E(?P<ep>\d+)";

    #[test]
    fn test_compile_invalid_regex() {
        let err = compile("(unclosed").unwrap_err();
        assert!(matches!(err, RefileError::InvalidRegex(_)));
    }

    #[test]
    fn test_extract_variables_named_and_unnamed() {
        let vars = extract_variables(r"(?P<title>.+?)\.(\d{4})").unwrap();
        assert_eq!(
            vars,
            vec![
                CaptureVariable {
                    index: 0,
                    name: Some("title".into())
                },
                CaptureVariable {
                    index: 1,
                    name: None
                },
            ]
        );
        assert_eq!(vars[1].identifier(), "group_1");
    }

    #[test]
    fn test_show_scenario() {
        let compiled = compile_with_template(SHOW, r#"{"name": "$0:s$", "season": "$1:d$"}"#)
            .unwrap();

        let fields = compiled.extract("Show_S01E02.mkv").unwrap().unwrap();
        assert_eq!(fields.get("name"), Some(&FieldValue::Text("Show".into())));
        assert_eq!(fields.get("season"), Some(&FieldValue::Integer(1)));
        assert_eq!(fields.len(), 2);

        assert!(compiled.extract("randomfile.txt").unwrap().is_none());
    }

    #[test]
    fn test_apply_is_deterministic() {
        let compiled = compile(SHOW).unwrap();
        let first = apply(&compiled, "Show_S01E02.mkv");
        for _ in 0..10 {
            assert_eq!(apply(&compiled, "Show_S01E02.mkv"), first);
        }
    }

    #[test]
    fn test_apply_populates_only_declared_groups() {
        let compiled = compile(r"(a)?(b)(c)?").unwrap();
        let captures = apply(&compiled, "b").unwrap();
        let indices: Vec<usize> = captures.iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![1]);

        let declared: Vec<usize> = compiled.variables().iter().map(|v| v.index).collect();
        assert!(indices.iter().all(|i| declared.contains(i)));
        assert_eq!(declared, vec![0, 1, 2]);
    }

    #[test]
    fn test_optional_group_renders_missing_group() {
        let compiled = compile_with_template(r"(\w+)(?:-(\d+))?", r#"{"n": "$1:d$"}"#).unwrap();
        let err = compiled.extract("plain").unwrap_err();
        assert!(matches!(err, RefileError::MissingGroup(1)));
    }

    #[test]
    fn test_template_referencing_unknown_group_is_rejected() {
        let err = compile_with_template(r"(\w+)", r#"{"x": "$4:s$"}"#).unwrap_err();
        assert!(matches!(err, RefileError::InvalidTemplate(_)));
    }

    #[test]
    fn test_empty_format_means_raw_captures() {
        let compiled = compile_with_template(r"(\w+)", "{}").unwrap();
        assert!(compiled.template().is_none());
        assert_eq!(compiled.extract("abc").unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_raw_fields_without_template() {
        let compiled = compile(r"(?P<name>\w+)-(\d+)").unwrap();
        let fields = compiled.extract("abc-42.txt").unwrap().unwrap();
        assert_eq!(
            serde_json::to_string(&fields).unwrap(),
            r#"{"name":"abc","group_1":"42"}"#
        );
    }
}

//! # Pattern Tester
//!
//! Dry-run a pattern against catalog files. Nothing is persisted here; the
//! lifecycle decides what to record from the returned report.

use crate::error::Result;
use crate::state::{CatalogManager, RefileDb};
use crate::tools::pattern::{self, CompiledPattern};
use crate::tools::template::ExtractedFields;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

/// What one file produced during a test
#[derive(Debug, Clone, PartialEq)]
pub enum FileTestResult {
    Extracted(ExtractedFields),
    NoMatch,
    /// The file id is not in the catalog
    UnknownFile,
    /// Matched, but the replacement template could not be rendered
    RenderFailed { kind: &'static str, message: String },
}

impl FileTestResult {
    fn from_render(result: Result<Option<ExtractedFields>>) -> Self {
        match result {
            Ok(Some(fields)) => Self::Extracted(fields),
            Ok(None) => Self::NoMatch,
            Err(e) => Self::RenderFailed {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

// Extracted -> fields object, NoMatch / UnknownFile -> null, RenderFailed -> {"error": ...}
impl Serialize for FileTestResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Extracted(fields) => fields.serialize(serializer),
            Self::NoMatch | Self::UnknownFile => serializer.serialize_none(),
            Self::RenderFailed { kind, message } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("error", message)?;
                map.serialize_entry("kind", kind)?;
                map.end()
            }
        }
    }
}

/// Per-file results in request order, plus the verdict
#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub results: Vec<(i64, FileTestResult)>,
    pub matched: usize,
    pub failed: usize,
}

impl TestReport {
    fn from_results(results: Vec<(i64, FileTestResult)>) -> Self {
        let matched = results
            .iter()
            .filter(|(_, r)| matches!(r, FileTestResult::Extracted(_)))
            .count();
        let failed = results
            .iter()
            .filter(|(_, r)| matches!(r, FileTestResult::RenderFailed { .. }))
            .count();
        Self {
            results,
            matched,
            failed,
        }
    }

    /// At least one file matched and rendered, and none failed to render
    pub fn passed(&self) -> bool {
        self.matched > 0 && self.failed == 0
    }

    pub fn get(&self, file_id: i64) -> Option<&FileTestResult> {
        self.results
            .iter()
            .find(|(id, _)| *id == file_id)
            .map(|(_, r)| r)
    }

    /// `file_id -> result` mapping on its own, as returned by the ad-hoc endpoint
    pub fn results_map(&self) -> ResultsMap<'_> {
        ResultsMap(&self.results)
    }
}

/// Serializes results as a JSON object keyed by file id
pub struct ResultsMap<'a>(&'a [(i64, FileTestResult)]);

impl Serialize for ResultsMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, result) in self.0 {
            map.serialize_entry(&id.to_string(), result)?;
        }
        map.end()
    }
}

impl Serialize for TestReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("TestReport", 4)?;
        s.serialize_field("results", &self.results_map())?;
        s.serialize_field("passed", &self.passed())?;
        s.serialize_field("matched", &self.matched)?;
        s.serialize_field("failed", &self.failed)?;
        s.end()
    }
}

pub struct PatternTester {
    catalog: CatalogManager,
}

impl PatternTester {
    pub fn new(db: &RefileDb) -> Self {
        Self {
            catalog: CatalogManager::new(db),
        }
    }

    /// Test a pattern definition. `replacement_format` of `None` (or an empty
    /// format) reports the raw captures instead of rendered fields.
    pub fn test(
        &self,
        regex_pattern: &str,
        replacement_format: Option<&str>,
        file_ids: &[i64],
    ) -> Result<TestReport> {
        let compiled = match replacement_format {
            Some(format) => pattern::compile_with_template(regex_pattern, format)?,
            None => pattern::compile(regex_pattern)?,
        };
        self.test_compiled(&compiled, file_ids)
    }

    pub fn test_compiled(&self, compiled: &CompiledPattern, file_ids: &[i64]) -> Result<TestReport> {
        let ids = dedup(file_ids);
        let files = self.catalog.find_by_ids(&ids)?;

        let results: Vec<(i64, FileTestResult)> = ids
            .iter()
            .map(|id| {
                let result = match files.get(id) {
                    Some(file) => FileTestResult::from_render(compiled.extract(&file.filename)),
                    None => FileTestResult::UnknownFile,
                };
                (*id, result)
            })
            .collect();

        let report = TestReport::from_results(results);
        tracing::debug!(
            pattern = compiled.as_str(),
            "Tested against {} files: {} matched, {} failed",
            report.results.len(),
            report.matched,
            report.failed
        );
        Ok(report)
    }
}

/// Keep first occurrence order
pub(crate) fn dedup(ids: &[i64]) -> Vec<i64> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NewFile;
    use crate::tools::template::FieldValue;
    use std::path::Path;

    const SHOW: &str = r"(?P<name>\w+)_S(?P<season>\d+)E(?P<ep>\d+)";
    const FORMAT: &str = r#"{"name": "$0:s$", "season": "$1:d$"}"#;

    fn seed(names: &[&str]) -> (RefileDb, Vec<i64>) {
        let db = RefileDb::open_in_memory().unwrap();
        let files: Vec<NewFile> = names
            .iter()
            .map(|n| NewFile::from_path(&Path::new("/media").join(n), 1).unwrap())
            .collect();
        let ids = CatalogManager::new(&db)
            .insert_new(&files)
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        (db, ids)
    }

    #[test]
    fn test_show_scenario() {
        let (db, ids) = seed(&["Show_S01E02.mkv", "randomfile.txt"]);
        let report = PatternTester::new(&db).test(SHOW, Some(FORMAT), &ids).unwrap();

        match report.get(ids[0]).unwrap() {
            FileTestResult::Extracted(fields) => {
                assert_eq!(fields.get("season"), Some(&FieldValue::Integer(1)));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(report.get(ids[1]), Some(&FileTestResult::NoMatch));
        assert!(report.passed());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["results"][ids[0].to_string()]["name"], "Show");
        assert!(json["results"][ids[1].to_string()].is_null());
        assert_eq!(json["matched"], 1);
    }

    #[test]
    fn test_compile_failure_is_top_level() {
        let (db, ids) = seed(&["a.mkv"]);
        let err = PatternTester::new(&db).test("(", None, &ids).unwrap_err();
        assert_eq!(err.kind(), "invalid_regex");
    }

    #[test]
    fn test_render_failure_is_per_file() {
        let (db, ids) = seed(&["abc_1.mkv", "12_1.mkv"]);
        let report = PatternTester::new(&db)
            .test(r"^(\w+?)_", Some(r#"{"n": "$0:d$"}"#), &ids)
            .unwrap();

        assert!(matches!(
            report.get(ids[0]),
            Some(FileTestResult::RenderFailed {
                kind: "type_coercion",
                ..
            })
        ));
        assert!(matches!(report.get(ids[1]), Some(FileTestResult::Extracted(_))));
        assert_eq!(report.failed, 1);
        assert!(!report.passed());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["results"][ids[0].to_string()]["error"].is_string());
    }

    #[test]
    fn test_unknown_ids_and_duplicates() {
        let (db, ids) = seed(&["a_1.mkv"]);
        let report = PatternTester::new(&db)
            .test(r"(\w+)_(\d+)", None, &[ids[0], 999, ids[0]])
            .unwrap();
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.get(999), Some(&FileTestResult::UnknownFile));

        let json = serde_json::to_value(report.results_map()).unwrap();
        assert_eq!(json[ids[0].to_string()]["group_0"], "a");
        assert_eq!(json[ids[0].to_string()]["group_1"], "1");
    }

    #[test]
    fn test_empty_selection_does_not_pass() {
        let (db, _) = seed(&[]);
        let report = PatternTester::new(&db).test(SHOW, Some(FORMAT), &[]).unwrap();
        assert!(!report.passed());
        assert_eq!(report.matched, 0);
    }
}

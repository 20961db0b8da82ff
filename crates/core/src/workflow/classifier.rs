//! # Pattern Classifier
//!
//! Applies confirmed patterns to catalog files and keeps one `ExtractedData`
//! row per file: the pattern producing the most fields wins, ties going to
//! the earlier pattern.

use crate::error::{RefileError, Result};
use crate::state::{
    CatalogManager, ExtractedDataManager, FileChangePattern, IndexedFile, PatternManager,
    RefileDb,
};
use crate::tools::pattern::{self, CompiledPattern};
use crate::tools::template::ExtractedFields;
use crate::workflow::selection::{FileSelection, SelectedFile};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassifyReport {
    pub classified: usize,
    pub unmatched: usize,
}

struct Candidate<'a> {
    pattern: &'a FileChangePattern,
    compiled: CompiledPattern,
}

pub struct PatternClassifier {
    catalog: CatalogManager,
    patterns: PatternManager,
    extracted: ExtractedDataManager,
}

impl PatternClassifier {
    pub fn new(db: &RefileDb) -> Self {
        Self {
            catalog: CatalogManager::new(db),
            patterns: PatternManager::new(db),
            extracted: ExtractedDataManager::new(db),
        }
    }

    /// Apply the listed patterns (all must be confirmed) to a selection
    pub fn apply_saved(&self, pattern_ids: &[i64], selection: &FileSelection) -> Result<ClassifyReport> {
        if pattern_ids.is_empty() {
            return Err(RefileError::InvalidSelection(
                "at least one pattern id is required".to_string(),
            ));
        }

        let mut patterns = Vec::with_capacity(pattern_ids.len());
        for id in crate::workflow::tester::dedup(pattern_ids) {
            let p = self.patterns.get(id)?;
            if !p.is_confirmed {
                return Err(RefileError::PatternNotConfirmed(id));
            }
            patterns.push(p);
        }

        let files: Vec<IndexedFile> = selection
            .resolve(&self.catalog)?
            .into_iter()
            .filter_map(|s| match s {
                SelectedFile::Found(file) => Some(file),
                SelectedFile::Missing(id) => {
                    tracing::debug!(file_id = id, "Skipping unknown file");
                    None
                }
            })
            .collect();

        self.classify(&patterns, &files)
    }

    /// Re-run every confirmed pattern over one file
    pub fn apply_to_file(&self, file_id: i64) -> Result<IndexedFile> {
        let file = self.catalog.get(file_id)?;
        let patterns = self.patterns.list_confirmed()?;
        self.classify(&patterns, std::slice::from_ref(&file))?;
        self.catalog.get(file_id)
    }

    /// Re-run every confirmed pattern over the whole catalog
    pub fn reapply_all(&self) -> Result<ClassifyReport> {
        let patterns = self.patterns.list_confirmed()?;
        let files = self.catalog.snapshot(&Default::default())?;
        self.classify(&patterns, &files)
    }

    fn classify(&self, patterns: &[FileChangePattern], files: &[IndexedFile]) -> Result<ClassifyReport> {
        let mut candidates = Vec::with_capacity(patterns.len());
        for p in patterns {
            candidates.push(Candidate {
                pattern: p,
                compiled: pattern::compile_with_template(&p.regex_pattern, &p.replacement_format)?,
            });
        }

        let mut report = ClassifyReport::default();
        for file in files {
            match best_match(&candidates, &file.filename) {
                Ok((pattern_id, fields)) => {
                    self.extracted.upsert(file.id, pattern_id, &fields.to_json())?;
                    self.catalog.set_extraction_failure(file.id, None)?;
                    report.classified += 1;
                }
                Err(reason) => {
                    tracing::debug!(file_id = file.id, "Not classified: {}", reason);
                    self.extracted.delete_for_file(file.id)?;
                    self.catalog.set_extraction_failure(file.id, Some(&reason))?;
                    report.unmatched += 1;
                }
            }
        }

        tracing::info!(
            "Classified {} files with {} patterns ({} unmatched)",
            report.classified,
            patterns.len(),
            report.unmatched
        );
        Ok(report)
    }
}

/// Winning pattern id and its fields, or the reason nothing won
fn best_match(candidates: &[Candidate<'_>], filename: &str) -> std::result::Result<(i64, ExtractedFields), String> {
    let mut best: Option<(i64, ExtractedFields)> = None;
    let mut render_errors = Vec::new();

    for candidate in candidates {
        match candidate.compiled.extract(filename) {
            Ok(Some(fields)) => {
                let better = best.as_ref().map_or(true, |(_, b)| fields.len() > b.len());
                if better {
                    best = Some((candidate.pattern.id, fields));
                }
            }
            Ok(None) => {}
            Err(e) => render_errors.push(format!("{}: {}", candidate.pattern.name, e)),
        }
    }

    match best {
        Some(winner) => Ok(winner),
        None if candidates.is_empty() => Err("no confirmed patterns".to_string()),
        None if render_errors.is_empty() => Err("no pattern matched".to_string()),
        None => Err(render_errors.join("; ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NewFile;
    use crate::workflow::lifecycle::PatternLifecycle;
    use std::path::Path;

    fn confirmed(lc: &PatternLifecycle, name: &str, regex: &str, format: &str, ids: &[i64]) -> i64 {
        let p = lc.test_named(name, regex, format, ids).unwrap().pattern;
        lc.confirm(p.id, None).unwrap().id
    }

    fn setup(names: &[&str]) -> (RefileDb, Vec<i64>) {
        let db = RefileDb::open_in_memory().unwrap();
        let files: Vec<NewFile> = names
            .iter()
            .map(|n| NewFile::from_path(&Path::new("/m").join(n), 1).unwrap())
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
    fn test_most_fields_wins() {
        let (db, ids) = setup(&["Show_S01E02.mkv", "notes.txt"]);
        let lc = PatternLifecycle::new(&db);
        let short = confirmed(&lc, "short", r"(\w+)_S", r#"{"name": "$0:s$"}"#, &ids);
        let long = confirmed(
            &lc,
            "long",
            r"(\w+)_S(\d+)E(\d+)",
            r#"{"name": "$0:s$", "season": "$1:d$", "ep": "$2:d$"}"#,
            &ids,
        );

        let classifier = PatternClassifier::new(&db);
        let report = classifier
            .apply_saved(&[short, long], &FileSelection::all())
            .unwrap();
        assert_eq!(report, ClassifyReport { classified: 1, unmatched: 1 });

        let extracted = ExtractedDataManager::new(&db);
        let row = extracted.for_file(ids[0]).unwrap().unwrap();
        assert_eq!(row.pattern_id, long);
        assert_eq!(row.extracted_values["ep"], 2);

        let notes = CatalogManager::new(&db).get(ids[1]).unwrap();
        assert!(notes.extraction_failed);
        assert_eq!(notes.extraction_failure_reason.as_deref(), Some("no pattern matched"));
    }

    #[test]
    fn test_unconfirmed_pattern_rejected() {
        let (db, ids) = setup(&["a.mkv"]);
        let lc = PatternLifecycle::new(&db);
        let p = lc.create("draft", r"(\w+)", "{}").unwrap();

        let err = PatternClassifier::new(&db)
            .apply_saved(&[p.id], &FileSelection::Explicit(ids))
            .unwrap_err();
        assert!(matches!(err, RefileError::PatternNotConfirmed(_)));
    }

    #[test]
    fn test_apply_to_file_clears_failure() {
        let (db, ids) = setup(&["Show_S01E02.mkv"]);
        let catalog = CatalogManager::new(&db);
        catalog.set_extraction_failure(ids[0], Some("stale")).unwrap();

        let lc = PatternLifecycle::new(&db);
        confirmed(&lc, "show", r"(\w+)_S(\d+)", r#"{"name": "$0:s$"}"#, &ids);

        let file = PatternClassifier::new(&db).apply_to_file(ids[0]).unwrap();
        assert!(!file.extraction_failed);
        assert!(file.extraction_failure_reason.is_none());
    }

    #[test]
    fn test_reapply_all_without_patterns_marks_unmatched() {
        let (db, _) = setup(&["a.mkv", "b.mkv"]);
        let report = PatternClassifier::new(&db).reapply_all().unwrap();
        assert_eq!(report.unmatched, 2);
    }
}

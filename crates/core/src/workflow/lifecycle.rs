//! # Pattern Lifecycle
//!
//! Draft -> Tested -> Confirmed. A pattern reaches Confirmed only from Tested,
//! and only while its stored test covers the current regex/format. Every
//! write goes through `PatternManager::compare_and_swap`, so two callers
//! racing on the same pattern see a `Conflict` instead of overwriting each
//! other.

use crate::error::{RefileError, Result};
use crate::state::{FileChangePattern, PatternManager, PatternStage, RefileDb, TestRecord};
use crate::tools::pattern;
use crate::workflow::tester::{PatternTester, TestReport};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Partial update of a pattern; `None` keeps the stored value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub regex_pattern: Option<String>,
    #[serde(default)]
    pub replacement_format: Option<String>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Result of testing a pattern by name
#[derive(Debug, Clone, Serialize)]
pub struct NamedTestOutcome {
    pub pattern: FileChangePattern,
    #[serde(flatten)]
    pub report: TestReport,
    /// False when the stored pattern was confirmed and left untouched
    pub recorded: bool,
}

/// Blank formats are stored as an empty JSON object
pub fn normalize_format(format: &str) -> String {
    if format.trim().is_empty() {
        "{}".to_string()
    } else {
        format.to_string()
    }
}

pub struct PatternLifecycle {
    patterns: PatternManager,
    tester: PatternTester,
}

impl PatternLifecycle {
    pub fn new(db: &RefileDb) -> Self {
        Self {
            patterns: PatternManager::new(db),
            tester: PatternTester::new(db),
        }
    }

    pub fn get(&self, id: i64) -> Result<FileChangePattern> {
        self.patterns.get(id)
    }

    /// Create a Draft after checking that regex and format compile together
    pub fn create(
        &self,
        name: &str,
        regex_pattern: &str,
        replacement_format: &str,
    ) -> Result<FileChangePattern> {
        if name.trim().is_empty() {
            return Err(RefileError::Validation("name must not be empty".to_string()));
        }
        let format = normalize_format(replacement_format);
        pattern::compile_with_template(regex_pattern, &format)?;

        let created = self.patterns.create(name, regex_pattern, &format)?;
        tracing::info!(id = created.id, name = %created.name, "Pattern created");
        Ok(created)
    }

    /// Edit a pattern. Definition changes are refused while Confirmed and
    /// otherwise send the pattern back to Draft.
    pub fn update(&self, id: i64, update: &PatternUpdate) -> Result<FileChangePattern> {
        let current = self.patterns.get(id)?;
        check_version(&current, update.expected_version)?;

        let mut next = current.clone();
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(RefileError::Validation("name must not be empty".to_string()));
            }
            next.name = name.clone();
        }
        if let Some(regex) = &update.regex_pattern {
            next.regex_pattern = regex.clone();
        }
        if let Some(format) = &update.replacement_format {
            next.replacement_format = normalize_format(format);
        }

        let definition_changed = !current.defines(&next.regex_pattern, &next.replacement_format);
        if definition_changed {
            if current.stage == PatternStage::Confirmed {
                return Err(RefileError::PatternConfirmed(id));
            }
            pattern::compile_with_template(&next.regex_pattern, &next.replacement_format)?;
            next.stage = PatternStage::Draft;
            next.last_test = None;
        }

        self.patterns.compare_and_swap(&next, current.version)
    }

    /// Store the outcome of a test of the given definition
    pub fn record_test(
        &self,
        id: i64,
        regex_pattern: &str,
        replacement_format: &str,
        report: &TestReport,
    ) -> Result<FileChangePattern> {
        let current = self.patterns.get(id)?;
        if current.stage == PatternStage::Confirmed {
            return Err(RefileError::PatternConfirmed(id));
        }

        let mut next = current.clone();
        next.last_test = Some(TestRecord {
            passed: report.passed(),
            matched: report.matched,
            failed: report.failed,
            tested_at: Utc::now(),
            regex_pattern: regex_pattern.to_string(),
            replacement_format: normalize_format(replacement_format),
        });
        next.stage = if next.has_passing_test() {
            PatternStage::Tested
        } else {
            PatternStage::Draft
        };

        let saved = self.patterns.compare_and_swap(&next, current.version)?;
        tracing::info!(
            id,
            stage = saved.stage.as_str(),
            "Recorded test: {} matched, {} failed",
            report.matched,
            report.failed
        );
        Ok(saved)
    }

    /// Tested -> Confirmed. Confirming an already confirmed pattern is a no-op.
    pub fn confirm(&self, id: i64, expected_version: Option<i64>) -> Result<FileChangePattern> {
        let current = self.patterns.get(id)?;
        check_version(&current, expected_version)?;

        match current.stage {
            PatternStage::Confirmed => Ok(current),
            PatternStage::Tested if current.has_passing_test() => {
                // The stored definition must still compile before it is frozen
                pattern::compile_with_template(&current.regex_pattern, &current.replacement_format)?;

                let mut next = current.clone();
                next.stage = PatternStage::Confirmed;
                let saved = self.patterns.compare_and_swap(&next, current.version)?;
                tracing::info!(id, name = %saved.name, "Pattern confirmed");
                Ok(saved)
            }
            _ => Err(RefileError::PatternNotTested(id)),
        }
    }

    /// Confirmed -> Draft so the definition can be edited again
    pub fn reopen(&self, id: i64) -> Result<FileChangePattern> {
        let current = self.patterns.get(id)?;
        if current.stage != PatternStage::Confirmed {
            return Ok(current);
        }

        let mut next = current.clone();
        next.stage = PatternStage::Draft;
        let saved = self.patterns.compare_and_swap(&next, current.version)?;
        tracing::info!(id, "Pattern reopened");
        Ok(saved)
    }

    pub fn delete(&self, id: i64) -> Result<()> {
        self.patterns.delete(id)?;
        tracing::info!(id, "Pattern deleted");
        Ok(())
    }

    /// Test a definition under a name, creating or updating the Draft first
    /// and recording the outcome on it.
    pub fn test_named(
        &self,
        name: &str,
        regex_pattern: &str,
        replacement_format: &str,
        file_ids: &[i64],
    ) -> Result<NamedTestOutcome> {
        let format = normalize_format(replacement_format);
        // Compile errors surface before anything is written
        let report = self.tester.test(regex_pattern, Some(&format), file_ids)?;

        let stored = match self.patterns.find_by_name(name)? {
            None => self.create(name, regex_pattern, &format)?,
            Some(p) if p.stage == PatternStage::Confirmed => {
                if !p.defines(regex_pattern, &format) {
                    tracing::warn!(
                        id = p.id,
                        name,
                        "Pattern is confirmed with a different definition; test not recorded"
                    );
                }
                return Ok(NamedTestOutcome {
                    pattern: p,
                    report,
                    recorded: false,
                });
            }
            Some(p) if !p.defines(regex_pattern, &format) => self.update(
                p.id,
                &PatternUpdate {
                    regex_pattern: Some(regex_pattern.to_string()),
                    replacement_format: Some(format.clone()),
                    expected_version: Some(p.version),
                    ..Default::default()
                },
            )?,
            Some(p) => p,
        };

        let pattern = self.record_test(stored.id, regex_pattern, &format, &report)?;
        Ok(NamedTestOutcome {
            pattern,
            report,
            recorded: true,
        })
    }

    /// Confirm the named pattern if it was tested with exactly this definition
    pub fn confirm_by_definition(
        &self,
        name: &str,
        regex_pattern: &str,
        replacement_format: &str,
    ) -> Result<FileChangePattern> {
        let format = normalize_format(replacement_format);
        let stored = self
            .patterns
            .find_by_name(name)?
            .ok_or_else(|| RefileError::not_found("file change pattern", name))?;

        if !stored.defines(regex_pattern, &format) {
            return Err(match stored.stage {
                PatternStage::Confirmed => RefileError::PatternConfirmed(stored.id),
                _ => RefileError::PatternNotTested(stored.id),
            });
        }

        self.confirm(stored.id, Some(stored.version))
    }
}

fn check_version(current: &FileChangePattern, expected: Option<i64>) -> Result<()> {
    match expected {
        Some(expected) if expected != current.version => Err(RefileError::Conflict {
            entity: "file change pattern",
            id: current.id,
            expected,
            found: current.version,
        }),
        _ => Ok(()),
    }
}

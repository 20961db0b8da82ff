//! # Workflow
//!
//! Operations that span several stores: testing patterns, moving them
//! through their lifecycle, classifying the catalog, and executing batch
//! rename/copy requests.

pub mod classifier;
pub mod executor;
pub mod lifecycle;
pub mod selection;
pub mod tester;

pub use classifier::{ClassifyReport, PatternClassifier};
pub use executor::{BatchAccumulator, BatchRequest, ChangeRequestExecutor, ExecutorConfig};
pub use lifecycle::{NamedTestOutcome, PatternLifecycle, PatternUpdate};
pub use selection::{FileSelection, SelectedFile};
pub use tester::{FileTestResult, PatternTester, TestReport};

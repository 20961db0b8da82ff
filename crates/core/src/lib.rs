//! # Refile Core
//!
//! Catalog, pattern extraction, and batch rename/copy engine behind the
//! `refile` server.
//!
//! ## Architecture
//!
//! - `tools/` - Pattern compiler, templates, indexer, copier
//! - `state/` - SQLite-backed stores (catalog, patterns, requests, ...)
//! - `workflow/` - Tester, lifecycle, classifier, batch executor
//! - `config` - Runtime settings
//!
//! ## Usage
//!
//! ```rust,ignore
//! use refile_core::state::RefileDb;
//! use refile_core::workflow::{BatchRequest, ChangeRequestExecutor, FileSelection};
//!
//! let db = RefileDb::open_at("refile.db")?;
//! let executor = ChangeRequestExecutor::new(&db, Default::default());
//! let request = executor.apply_batch(&BatchRequest {
//!     pattern_id: 1,
//!     selection: FileSelection::all(),
//!     destination_path: "/srv/sorted".into(),
//!     rename_pattern_string: "{name} - S{season:02}E{ep:02}".into(),
//! }).await?;
//! ```

pub mod config;
pub mod error;
pub mod state;
pub mod tools;
pub mod workflow;

pub use error::{RefileError, Result};

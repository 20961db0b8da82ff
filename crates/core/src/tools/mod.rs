//! # Tools
//!
//! Deterministic building blocks with no knowledge of the request lifecycle.
//!
//! ## Modules
//!
//! - `template` - `$idx:type$` replacement formats and typed field values
//! - `pattern` - Regex compilation, capture extraction, field rendering
//! - `rename` - `{key}` / `{key:0N}` destination filename templates
//! - `exclusion` - Regex and glob path filters for indexing
//! - `indexer` - Directory walk into the catalog
//! - `copier` - Exclusive-create file copy with timeout

pub mod copier;
pub mod exclusion;
pub mod indexer;
pub mod pattern;
pub mod rename;
pub mod template;

//! Which catalog files an operation runs over.

use crate::error::Result;
use crate::state::{CatalogFilter, CatalogManager, IndexedFile};
use crate::workflow::tester::dedup;

/// Explicit ids, or every file matching a filter at resolution time
#[derive(Debug, Clone, PartialEq)]
pub enum FileSelection {
    Explicit(Vec<i64>),
    AllMatching(CatalogFilter),
}

/// One entry of a resolved selection
#[derive(Debug, Clone, PartialEq)]
pub enum SelectedFile {
    Found(IndexedFile),
    /// An explicit id that is not in the catalog
    Missing(i64),
}

impl SelectedFile {
    pub fn file_id(&self) -> i64 {
        match self {
            Self::Found(file) => file.id,
            Self::Missing(id) => *id,
        }
    }
}

impl FileSelection {
    /// Every cataloged file
    pub fn all() -> Self {
        Self::AllMatching(CatalogFilter::default())
    }

    /// Snapshot the selection against the catalog. Explicit ids keep their
    /// first-occurrence order; "all" resolves in id order.
    pub fn resolve(&self, catalog: &CatalogManager) -> Result<Vec<SelectedFile>> {
        match self {
            Self::AllMatching(filter) => Ok(catalog
                .snapshot(filter)?
                .into_iter()
                .map(SelectedFile::Found)
                .collect()),
            Self::Explicit(ids) => {
                let ids = dedup(ids);
                let mut found = catalog.find_by_ids(&ids)?;
                Ok(ids
                    .into_iter()
                    .map(|id| match found.remove(&id) {
                        Some(file) => SelectedFile::Found(file),
                        None => SelectedFile::Missing(id),
                    })
                    .collect())
            }
        }
    }
}

//! Range paging shared by the list endpoints (`_start`, `_end`, `_sort`, `_order`).

use serde::{Deserialize, Serialize};

/// Default page size when `_end` is absent
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    pub fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }
}

/// Half-open row range `[start, end)` with an optional sort column
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub start: usize,
    pub end: Option<usize>,
    pub sort: Option<String>,
    pub order: SortOrder,
}

impl ListQuery {
    pub fn range(start: usize, end: usize) -> Self {
        Self {
            start,
            end: Some(end),
            ..Default::default()
        }
    }

    pub fn limit(&self) -> usize {
        match self.end {
            Some(end) => end.saturating_sub(self.start),
            None => DEFAULT_PAGE_SIZE,
        }
    }

    /// `ORDER BY ... LIMIT ... OFFSET ...` clause. The sort column must be one
    /// of `allowed`; anything else falls back to `id`.
    pub(crate) fn sql_suffix(&self, allowed: &[&str]) -> String {
        let column = self
            .sort
            .as_deref()
            .filter(|c| allowed.contains(c))
            .unwrap_or("id");
        format!(
            "ORDER BY {} {}, id ASC LIMIT {} OFFSET {}",
            column,
            self.order.as_sql(),
            self.limit(),
            self.start
        )
    }
}

/// One page of rows plus the unpaged total
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub start: usize,
    pub total: usize,
}

impl<T> Page<T> {
    /// Inclusive index of the last row, as used by `Content-Range`
    pub fn last_index(&self) -> usize {
        (self.start + self.items.len()).saturating_sub(1)
    }
}

//! List query helpers shared by the entity stores.
//!
//! Collaborators express sorting as a field name, prefixed with `-`
//! for descending, plus an optional result limit. Unspecified sort
//! means creation order.

use serde::{Deserialize, Serialize};

/// A sort key parsed from the external `"field"` / `"-field"` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Field name to sort on.
    pub field: String,
    /// True when the key was prefixed with `-`.
    pub descending: bool,
}

impl SortKey {
    /// Parses `"field"` or `"-field"`.
    pub fn parse(s: &str) -> Self {
        match s.strip_prefix('-') {
            Some(field) => Self {
                field: field.to_string(),
                descending: true,
            },
            None => Self {
                field: s.to_string(),
                descending: false,
            },
        }
    }

    /// Ascending key for a field.
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: false,
        }
    }

    /// Descending key for a field.
    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: true,
        }
    }
}

/// Sort and limit options accepted by every list operation.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Optional sort key; `None` means creation order.
    pub sort: Option<SortKey>,
    /// Optional maximum number of results.
    pub limit: Option<usize>,
}

impl ListQuery {
    /// Creation order, no limit.
    pub fn unsorted() -> Self {
        Self::default()
    }

    /// Parses the sort key from its external string form.
    pub fn sorted_by(key: &str) -> Self {
        Self {
            sort: Some(SortKey::parse(key)),
            limit: None,
        }
    }

    /// Sets the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reverses the sorted order when the key is descending, then
    /// truncates to the limit. Callers sort ascending by the field
    /// first.
    pub fn finish<T>(&self, mut items: Vec<T>) -> Vec<T> {
        if self.sort.as_ref().is_some_and(|k| k.descending) {
            items.reverse();
        }
        if let Some(limit) = self.limit {
            items.truncate(limit);
        }
        items
    }
}

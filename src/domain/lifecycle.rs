use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Record Lifecycle - Soft Deletion
// ============================================================================
//
// Rows are never physically removed; a deleted record keeps its data for
// audit and is excluded from every active-only lookup. The predicate lives
// here instead of being repeated as a deleted-at check in every query.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lifecycle {
    Active,
    Deleted {
        at: DateTime<Utc>,
        by: String,
    },
}

impl Lifecycle {
    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }

    /// Mark the record deleted by the given actor at the given instant.
    pub fn delete(&mut self, by: impl Into<String>, at: DateTime<Utc>) {
        *self = Lifecycle::Deleted { at, by: by.into() };
    }

    /// The deleted-at column value, `None` while active.
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Lifecycle::Active => None,
            Lifecycle::Deleted { at, .. } => Some(*at),
        }
    }

    pub fn deleted_by(&self) -> Option<&str> {
        match self {
            Lifecycle::Active => None,
            Lifecycle::Deleted { by, .. } => Some(by.as_str()),
        }
    }

    /// Rebuild the state from the stored column pair.
    pub fn from_columns(deleted_at: Option<DateTime<Utc>>, deleted_by: Option<String>) -> Self {
        match deleted_at {
            None => Lifecycle::Active,
            Some(at) => Lifecycle::Deleted {
                at,
                by: deleted_by.unwrap_or_default(),
            },
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle::Active
    }
}

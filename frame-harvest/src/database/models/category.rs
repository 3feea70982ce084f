//! Category database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A tracked content category (for Twitch, a game).
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CategoryDbModel {
    /// Platform-assigned identifier; also the name of the category's frame directory.
    pub id: String,
    pub name: String,
    /// Cached number of `frames` rows referencing this category.
    pub frame_count: i64,
    /// Unix epoch milliseconds (UTC) when first tracked.
    pub created_at: i64,
}

impl CategoryDbModel {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            frame_count: 0,
            created_at: crate::database::time::now_ms(),
        }
    }
}

/// Outcome of registering observed categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    /// Newly tracked categories.
    pub inserted: usize,
    /// Already tracked; name refreshed, frame count untouched.
    pub existing: usize,
    /// Not tracked because the category cap was reached.
    pub skipped: usize,
}

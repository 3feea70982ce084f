//! Transactional operations for categories.

use sqlx::SqliteConnection;

use crate::Result;
use crate::database::models::CategoryDbModel;

/// Category statements run inside a caller-owned transaction.
///
/// These methods do NOT commit. The caller is responsible for committing or
/// rolling back.
pub struct CategoryTxOps;

impl CategoryTxOps {
    pub async fn count(tx: &mut SqliteConnection) -> Result<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM categories")
            .fetch_one(tx)
            .await?;
        Ok(count.max(0) as usize)
    }

    pub async fn exists(tx: &mut SqliteConnection, id: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(tx)
            .await?;
        Ok(row.is_some())
    }

    /// Insert a category. A row with the same id is left untouched.
    pub async fn insert(tx: &mut SqliteConnection, category: &CategoryDbModel) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO categories (id, name, frame_count, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(category.frame_count)
        .bind(category.created_at)
        .execute(tx)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn rename(tx: &mut SqliteConnection, id: &str, name: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE categories SET name = ? WHERE id = ? AND name != ?")
            .bind(name)
            .bind(id)
            .bind(name)
            .execute(tx)
            .await?;

        Ok(result.rows_affected())
    }

    /// Bump the cached frame count by one. Returns rows affected (0 if the
    /// category is unknown).
    pub async fn increment_frame_count(tx: &mut SqliteConnection, id: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE categories SET frame_count = frame_count + 1 WHERE id = ?")
            .bind(id)
            .execute(tx)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn list_ids(tx: &mut SqliteConnection) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM categories ORDER BY id")
            .fetch_all(tx)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn delete(tx: &mut SqliteConnection, id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(tx)
            .await?;

        Ok(result.rows_affected())
    }

    /// Overwrite every cached frame count with the count of `frames` rows.
    ///
    /// Returns the number of categories whose cached count had drifted.
    pub async fn recompute_frame_counts(tx: &mut SqliteConnection) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE categories
            SET frame_count = (
                SELECT COUNT(*) FROM frames WHERE frames.category_id = categories.id
            )
            WHERE frame_count != (
                SELECT COUNT(*) FROM frames WHERE frames.category_id = categories.id
            )
            "#,
        )
        .execute(tx)
        .await?;

        Ok(result.rows_affected())
    }
}

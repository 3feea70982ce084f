//! Transactional operations for frames.

use sqlx::SqliteConnection;

use crate::Result;
use crate::database::models::{FrameDbModel, NewFrame};

/// Frame statements run inside a caller-owned transaction.
pub struct FrameTxOps;

impl FrameTxOps {
    /// Insert a frame row and return its id.
    pub async fn insert(tx: &mut SqliteConnection, frame: &NewFrame) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO frames (path, category_id, channel_login, captured_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&frame.path)
        .bind(&frame.category_id)
        .bind(&frame.channel_login)
        .bind(frame.captured_at)
        .execute(tx)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn list_for_category(
        tx: &mut SqliteConnection,
        category_id: &str,
    ) -> Result<Vec<FrameDbModel>> {
        let frames = sqlx::query_as::<_, FrameDbModel>(
            "SELECT * FROM frames WHERE category_id = ? ORDER BY id",
        )
        .bind(category_id)
        .fetch_all(tx)
        .await?;
        Ok(frames)
    }

    pub async fn delete(tx: &mut SqliteConnection, id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM frames WHERE id = ?")
            .bind(id)
            .execute(tx)
            .await?;

        Ok(result.rows_affected())
    }

    /// Delete every frame of a category. Returns the number of rows removed.
    pub async fn delete_for_category(tx: &mut SqliteConnection, category_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM frames WHERE category_id = ?")
            .bind(category_id)
            .execute(tx)
            .await?;

        Ok(result.rows_affected())
    }
}

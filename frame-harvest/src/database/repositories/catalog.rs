//! Catalog repository: the persistent record of categories and frames.
//!
//! Every write runs as one immediate transaction (see
//! [`with_immediate_tx`]) so the cached `frame_count` can never drift from
//! the `frames` rows through a partially applied operation.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use platforms_api::CategoryInfo;
use tracing::debug;

use crate::database::models::{
    CategoryDbModel, FrameDbModel, NewFrame, UpsertReport, file_name_of, frame_number_of,
};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::{DbPool, with_immediate_tx};
use crate::{Error, Result};

use super::{CategoryTxOps, FrameTxOps};

/// For each category directory present on disk, the frame file names it holds.
/// A category missing from the map has no directory on disk.
pub type OnDiskIndex = HashMap<String, HashSet<String>>;

/// Rows removed by [`CatalogRepository::reconcile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub deleted_categories: usize,
    pub deleted_frames: usize,
}

/// Catalog repository trait.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Track categories not seen before while fewer than `max_categories`
    /// are tracked. Known categories keep their frame count; their name is
    /// refreshed. Categories past the cap are ignored.
    async fn upsert_categories(
        &self,
        categories: &[CategoryInfo],
        max_categories: usize,
    ) -> Result<UpsertReport>;

    /// Insert a frame row and bump its category's cached count atomically.
    async fn record_frame(&self, frame: &NewFrame) -> Result<FrameDbModel>;

    /// Recount frames per category from the `frames` table. Returns the number
    /// of categories whose cached count was corrected.
    async fn recompute_frame_counts(&self) -> Result<u64>;

    /// Delete rows whose backing files or directories are gone.
    async fn reconcile(&self, on_disk: &OnDiskIndex) -> Result<ReconcileReport>;

    async fn tracked_count(&self) -> Result<usize>;
    async fn get_category(&self, id: &str) -> Result<CategoryDbModel>;
    async fn list_categories(&self) -> Result<Vec<CategoryDbModel>>;
    async fn rename_category(&self, id: &str, name: &str) -> Result<()>;

    /// Category with the fewest frames; ties go to the lowest id.
    async fn min_category(&self) -> Result<Option<CategoryDbModel>>;
    /// Category with the most frames; ties go to the lowest id.
    async fn max_category(&self) -> Result<Option<CategoryDbModel>>;

    async fn frame_count_total(&self) -> Result<u64>;
    async fn list_frames(&self, category_id: &str) -> Result<Vec<FrameDbModel>>;
    /// Highest frame number recorded for `category_id`, whether or not its
    /// file still exists.
    async fn last_frame_number(&self, category_id: &str) -> Result<Option<u64>>;
    /// Every stored frame path, ordered by id.
    async fn list_frame_paths(&self) -> Result<Vec<String>>;
}

/// SQLx implementation of CatalogRepository.
pub struct SqlxCatalogRepository {
    pool: DbPool,
}

impl SqlxCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Close the underlying pool. Call once at shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CatalogRepository for SqlxCatalogRepository {
    async fn upsert_categories(
        &self,
        categories: &[CategoryInfo],
        max_categories: usize,
    ) -> Result<UpsertReport> {
        retry_on_sqlite_busy("upsert_categories", || {
            let categories = categories.to_vec();
            with_immediate_tx(&self.pool, move |tx| {
                Box::pin(async move {
                    let mut tracked = CategoryTxOps::count(&mut *tx).await?;
                    let mut report = UpsertReport::default();

                    for category in &categories {
                        if CategoryTxOps::exists(&mut *tx, &category.id).await? {
                            CategoryTxOps::rename(&mut *tx, &category.id, &category.name).await?;
                            report.existing += 1;
                        } else if tracked < max_categories {
                            let model = CategoryDbModel::new(&category.id, &category.name);
                            CategoryTxOps::insert(&mut *tx, &model).await?;
                            tracked += 1;
                            report.inserted += 1;
                        } else {
                            debug!(category = %category.id, "Category cap reached; ignoring");
                            report.skipped += 1;
                        }
                    }

                    Ok(report)
                })
            })
        })
        .await
    }

    async fn record_frame(&self, frame: &NewFrame) -> Result<FrameDbModel> {
        retry_on_sqlite_busy("record_frame", || {
            let frame = frame.clone();
            with_immediate_tx(&self.pool, move |tx| {
                Box::pin(async move {
                    let updated =
                        CategoryTxOps::increment_frame_count(&mut *tx, &frame.category_id).await?;
                    if updated == 0 {
                        return Err(Error::not_found("Category", frame.category_id));
                    }

                    let id = FrameTxOps::insert(&mut *tx, &frame).await?;
                    Ok(FrameDbModel {
                        id,
                        path: frame.path,
                        category_id: frame.category_id,
                        channel_login: frame.channel_login,
                        captured_at: frame.captured_at,
                    })
                })
            })
        })
        .await
    }

    async fn recompute_frame_counts(&self) -> Result<u64> {
        retry_on_sqlite_busy("recompute_frame_counts", || {
            with_immediate_tx(&self.pool, |tx| {
                Box::pin(async move { CategoryTxOps::recompute_frame_counts(tx).await })
            })
        })
        .await
    }

    async fn reconcile(&self, on_disk: &OnDiskIndex) -> Result<ReconcileReport> {
        retry_on_sqlite_busy("reconcile", || {
            let on_disk = on_disk.clone();
            with_immediate_tx(&self.pool, move |tx| {
                Box::pin(async move {
                    let mut report = ReconcileReport::default();

                    for category_id in CategoryTxOps::list_ids(&mut *tx).await? {
                        match on_disk.get(&category_id) {
                            None => {
                                // Frames first so no row ever points at a missing category.
                                let frames =
                                    FrameTxOps::delete_for_category(&mut *tx, &category_id).await?;
                                CategoryTxOps::delete(&mut *tx, &category_id).await?;
                                report.deleted_frames += frames as usize;
                                report.deleted_categories += 1;
                                debug!(category = %category_id, frames, "Removed category without directory");
                            }
                            Some(files) => {
                                for frame in
                                    FrameTxOps::list_for_category(&mut *tx, &category_id).await?
                                {
                                    if !files.contains(frame.file_name()) {
                                        FrameTxOps::delete(&mut *tx, frame.id).await?;
                                        report.deleted_frames += 1;
                                        debug!(path = %frame.path, "Removed frame without file");
                                    }
                                }
                            }
                        }
                    }

                    CategoryTxOps::recompute_frame_counts(&mut *tx).await?;
                    Ok(report)
                })
            })
        })
        .await
    }

    async fn tracked_count(&self) -> Result<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM categories")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }

    async fn get_category(&self, id: &str) -> Result<CategoryDbModel> {
        sqlx::query_as::<_, CategoryDbModel>("SELECT * FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Category", id))
    }

    async fn list_categories(&self) -> Result<Vec<CategoryDbModel>> {
        let categories =
            sqlx::query_as::<_, CategoryDbModel>("SELECT * FROM categories ORDER BY name, id")
                .fetch_all(&self.pool)
                .await?;
        Ok(categories)
    }

    async fn rename_category(&self, id: &str, name: &str) -> Result<()> {
        let result = sqlx::query("UPDATE categories SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Category", id));
        }
        Ok(())
    }

    async fn min_category(&self) -> Result<Option<CategoryDbModel>> {
        let category = sqlx::query_as::<_, CategoryDbModel>(
            "SELECT * FROM categories ORDER BY frame_count ASC, id ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(category)
    }

    async fn max_category(&self) -> Result<Option<CategoryDbModel>> {
        let category = sqlx::query_as::<_, CategoryDbModel>(
            "SELECT * FROM categories ORDER BY frame_count DESC, id ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(category)
    }

    async fn frame_count_total(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM frames")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn list_frames(&self, category_id: &str) -> Result<Vec<FrameDbModel>> {
        let frames = sqlx::query_as::<_, FrameDbModel>(
            "SELECT * FROM frames WHERE category_id = ? ORDER BY id",
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(frames)
    }

    async fn last_frame_number(&self, category_id: &str) -> Result<Option<u64>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT path FROM frames WHERE category_id = ?")
            .bind(category_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .filter_map(|(path,)| frame_number_of(file_name_of(path)))
            .max())
    }

    async fn list_frame_paths(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT path FROM frames ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(path,)| path).collect())
    }
}

//! `sync`: align the catalog with the files actually on disk.

use tracing::info;

use crate::Result;
use crate::database::repositories::{CatalogRepository, ReconcileReport};
use crate::store::FrameStore;

use super::Harvest;

/// Reconcile the catalog against the frame store and correct cached counts.
pub async fn reconcile_with_disk(
    catalog: &dyn CatalogRepository,
    store: &FrameStore,
) -> Result<ReconcileReport> {
    let index = store.on_disk_index().await?;
    let report = catalog.reconcile(&index).await?;
    let corrected = catalog.recompute_frame_counts().await?;

    info!(
        deleted_categories = report.deleted_categories,
        deleted_frames = report.deleted_frames,
        corrected_counts = corrected,
        "Catalog reconciled"
    );
    Ok(report)
}

pub async fn execute(harvest: &Harvest) -> Result<()> {
    let report = reconcile_with_disk(harvest.catalog.as_ref(), &harvest.store).await?;
    println!(
        "Deleted {} categories and {} frames from the catalog.",
        report.deleted_categories, report.deleted_frames
    );
    Ok(())
}

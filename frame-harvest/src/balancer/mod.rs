//! Category balancing.
//!
//! The balancer always targets the category with the fewest frames. As long
//! as every sampling attempt contributes a similar, bounded number of frames
//! the per-category counts converge to an even distribution.

use std::sync::Arc;

use platforms_api::CategoryInfo;
use serde::Serialize;
use tracing::debug;

use crate::database::models::{CategoryDbModel, UpsertReport};
use crate::database::repositories::CatalogRepository;
use crate::{Error, Result};

/// A category picked by the balancer together with its current frame count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTarget {
    pub id: String,
    pub name: String,
    pub frame_count: u64,
}

impl From<CategoryDbModel> for CategoryTarget {
    fn from(model: CategoryDbModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            frame_count: model.frame_count.max(0) as u64,
        }
    }
}

/// Chooses the next category to sample and bounds the tracked set.
pub struct CategoryBalancer<C: CatalogRepository + ?Sized> {
    catalog: Arc<C>,
    max_categories: usize,
}

impl<C: CatalogRepository + ?Sized> CategoryBalancer<C> {
    pub fn new(catalog: Arc<C>, max_categories: usize) -> Self {
        Self {
            catalog,
            max_categories,
        }
    }

    pub fn max_categories(&self) -> usize {
        self.max_categories
    }

    /// Whether the tracked set already holds `max_categories` entries.
    pub async fn is_full(&self) -> Result<bool> {
        Ok(self.catalog.tracked_count().await? >= self.max_categories)
    }

    /// Start tracking observed categories until the cap is reached.
    ///
    /// Categories past the cap are dropped without error; known categories
    /// keep their frame count.
    pub async fn register_categories(&self, observed: &[CategoryInfo]) -> Result<UpsertReport> {
        let report = self
            .catalog
            .upsert_categories(observed, self.max_categories)
            .await?;
        debug!(
            inserted = report.inserted,
            existing = report.existing,
            skipped = report.skipped,
            "Registered observed categories"
        );
        Ok(report)
    }

    /// The tracked category with the fewest frames (lowest id on ties).
    pub async fn select_min_category(&self) -> Result<CategoryTarget> {
        self.catalog
            .min_category()
            .await?
            .map(CategoryTarget::from)
            .ok_or(Error::EmptyCatalog)
    }

    /// The tracked category with the most frames (lowest id on ties).
    pub async fn select_max_category(&self) -> Result<CategoryTarget> {
        self.catalog
            .max_category()
            .await?
            .map(CategoryTarget::from)
            .ok_or(Error::EmptyCatalog)
    }
}

//! Periodic, read-only dataset report.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::balancer::CategoryTarget;
use crate::database::repositories::CatalogRepository;
use crate::store::FrameStore;
use crate::utils::fs::bytes_to_gb;

/// Dataset state at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetReport {
    pub size_bytes: u64,
    pub categories: usize,
    pub frames: u64,
    pub min: Option<CategoryTarget>,
    pub max: Option<CategoryTarget>,
}

impl fmt::Display for DatasetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dataset size: {:.2} GB", bytes_to_gb(self.size_bytes))?;
        writeln!(
            f,
            "Categories: {} ({} frames)",
            self.categories, self.frames
        )?;
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => {
                writeln!(f, "Min: {} ({}) with {} frames", min.name, min.id, min.frame_count)?;
                write!(f, "Max: {} ({}) with {} frames", max.name, max.id, max.frame_count)
            }
            _ => write!(f, "Min/Max: no category tracked"),
        }
    }
}

pub struct DatasetMonitor {
    catalog: Arc<dyn CatalogRepository>,
    store: Arc<FrameStore>,
    interval: Duration,
}

impl DatasetMonitor {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        store: Arc<FrameStore>,
        interval: Duration,
    ) -> Self {
        Self {
            catalog,
            store,
            interval,
        }
    }

    pub async fn report(&self) -> Result<DatasetReport> {
        Ok(DatasetReport {
            size_bytes: self.store.frames_size().await?,
            categories: self.catalog.tracked_count().await?,
            frames: self.catalog.frame_count_total().await?,
            min: self.catalog.min_category().await?.map(Into::into),
            max: self.catalog.max_category().await?.map(Into::into),
        })
    }

    /// Report once immediately, then every interval, until cancelled.
    pub async fn run(self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.report().await {
                Ok(report) => {
                    info!(
                        size_gb = %format!("{:.2}", bytes_to_gb(report.size_bytes)),
                        categories = report.categories,
                        frames = report.frames,
                        min = report.min.as_ref().map(|c| c.frame_count),
                        max = report.max.as_ref().map(|c| c.frame_count),
                        "Dataset report"
                    );
                    println!("{report}");
                }
                Err(e) => warn!(error = %e, "Dataset report failed"),
            }
        }
    }
}

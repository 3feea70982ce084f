//! Entry points of the CLI commands.
//!
//! Every command opens one [`Harvest`] context: the frame store and the
//! catalog handle, created at start and closed before exit.

pub mod info;
pub mod run;
pub mod sync;

use std::sync::Arc;

use platforms_api::{HelixClient, HelixConfig, default_client};
use tracing::info;

use crate::Result;
use crate::config::AppConfig;
use crate::database::repositories::{CatalogRepository, SqlxCatalogRepository};
use crate::database::{init_pool, run_migrations};
use crate::store::{FrameStore, TempArea};

/// Opened resources shared by the commands.
pub struct Harvest {
    pub config: AppConfig,
    pub catalog: Arc<SqlxCatalogRepository>,
    pub store: Arc<FrameStore>,
}

impl Harvest {
    /// Create the data layout and open the migrated catalog. Any failure is
    /// a startup failure.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let store = Arc::new(FrameStore::new(config.data_root.clone()));
        store.ensure_layout().await?;
        // Scratch left behind by an interrupted run.
        store.purge_temp(TempArea::Data).await?;

        let pool = init_pool(&config.database_url).await?;
        run_migrations(&pool).await?;
        info!(
            data_root = %config.data_root.display(),
            database = %config.database_url,
            "Catalog opened"
        );

        Ok(Self {
            config,
            catalog: Arc::new(SqlxCatalogRepository::new(pool)),
            store,
        })
    }

    pub fn catalog(&self) -> Arc<dyn CatalogRepository> {
        self.catalog.clone()
    }

    /// Helix client built from the platform section of the configuration.
    pub fn platform_client(&self) -> HelixClient {
        let platform = &self.config.platform;
        let helix = HelixConfig::new(&platform.client_id, &platform.access_token)
            .with_denylist(platform.denylist.iter().cloned())
            .with_min_live_channels(platform.min_live_channels);
        HelixClient::new(self.http_client(), helix)
    }

    pub fn http_client(&self) -> reqwest::Client {
        default_client(self.config.ingest.request_timeout())
    }

    pub async fn close(self) {
        self.catalog.close().await;
    }
}

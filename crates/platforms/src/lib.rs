//! Platform collaborators consumed by the frame harvester.
//!
//! Two capabilities live here:
//! - [`PlatformClient`]: the platform catalog (top categories, live channels,
//!   category names), implemented for the Twitch Helix API by [`HelixClient`].
//! - [`StreamResolver`]: turns a channel login into the best-quality live
//!   playlist URL, implemented for Twitch by [`TwitchResolver`].

pub mod client;
pub mod error;
pub mod helix;
pub mod twitch;
pub mod types;

pub use client::{create_client_builder, default_client, install_rustls_provider};
pub use error::PlatformError;
pub use helix::{HelixClient, HelixConfig};
pub use twitch::TwitchResolver;
pub use types::{CategoryInfo, ChannelLogins};

use async_trait::async_trait;

/// Read access to the platform's catalog of categories and live channels.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Most-watched categories in popularity order, denylisted ones removed.
    async fn top_categories(&self, limit: usize) -> Result<Vec<CategoryInfo>, PlatformError>;

    /// Logins of channels currently broadcasting `category_id`.
    async fn live_channels(
        &self,
        category_id: &str,
        limit: usize,
    ) -> Result<ChannelLogins, PlatformError>;

    /// Display name of a category.
    async fn category_name(&self, category_id: &str) -> Result<String, PlatformError>;
}

/// Resolves a channel login to a playable live playlist.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Best-quality media playlist URL, or `None` when the channel is offline.
    async fn resolve(&self, login: &str) -> Result<Option<String>, PlatformError>;
}

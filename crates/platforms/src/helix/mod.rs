//! Twitch Helix catalog client.

mod models;

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::PlatformError;
use crate::types::{CategoryInfo, ChannelLogins};
use crate::PlatformClient;

use models::{HelixGame, HelixPage, HelixStream};

/// Helix caps `first` at 100 items per page.
const HELIX_MAX_PAGE_SIZE: usize = 100;

/// Categories that are not games and therefore excluded from the dataset.
pub const DEFAULT_DENYLIST: &[(&str, &str)] = &[
    ("509658", "Just Chatting"),
    ("26936", "Music"),
    ("509660", "Art"),
    ("518203", "Sports"),
    ("417752", "Talk Shows & Podcasts"),
    ("509670", "Science & Technology"),
    ("66082", "Games + Demos"),
    ("5899", "Stocks And Bonds"),
    ("743", "Chess"),
    ("369418", "GeoGuessr"),
    ("27284", "Retro"),
    ("509659", "ASMR"),
    ("488190", "Poker"),
    ("498566", "Slots"),
];

/// Connection and filtering settings for [`HelixClient`].
#[derive(Debug, Clone)]
pub struct HelixConfig {
    pub client_id: String,
    pub access_token: String,
    pub base_url: String,
    /// Category ids never reported by `top_categories`.
    pub denylist: HashSet<String>,
    /// A top category is kept only if more than this many channels are live in it.
    /// Zero disables the probe.
    pub min_live_channels: usize,
}

impl HelixConfig {
    pub const BASE_URL: &str = "https://api.twitch.tv/helix/";

    pub fn new(client_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            access_token: access_token.into(),
            base_url: Self::BASE_URL.to_string(),
            denylist: DEFAULT_DENYLIST
                .iter()
                .map(|(id, _)| (*id).to_string())
                .collect(),
            min_live_channels: 0,
        }
    }

    pub fn with_denylist<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.denylist = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_min_live_channels(mut self, min_live_channels: usize) -> Self {
        self.min_live_channels = min_live_channels;
        self
    }
}

pub struct HelixClient {
    client: Client,
    config: HelixConfig,
}

impl HelixClient {
    pub fn new(client: Client, config: HelixConfig) -> Self {
        Self { client, config }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, PlatformError> {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(query)
            .bearer_auth(&self.config.access_token)
            .header("Client-Id", &self.config.client_id)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::from_status(status, &url));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Drop denylisted categories, keeping popularity order.
pub(crate) fn without_denylisted(
    games: Vec<HelixGame>,
    denylist: &HashSet<String>,
) -> Vec<CategoryInfo> {
    games
        .into_iter()
        .filter(|game| !denylist.contains(&game.id))
        .map(|game| CategoryInfo::new(game.id, game.name))
        .collect()
}

#[async_trait]
impl PlatformClient for HelixClient {
    async fn top_categories(&self, limit: usize) -> Result<Vec<CategoryInfo>, PlatformError> {
        let first = limit.clamp(1, HELIX_MAX_PAGE_SIZE);
        let page: HelixPage<HelixGame> = self
            .get_json("games/top", &[("first", first.to_string())])
            .await?;

        let candidates = without_denylisted(page.data, &self.config.denylist);
        if self.config.min_live_channels == 0 {
            return Ok(candidates);
        }

        let mut categories = Vec::with_capacity(candidates.len());
        for category in candidates {
            match self.live_channels(&category.id, HELIX_MAX_PAGE_SIZE).await {
                Ok(channels) if channels.len() > self.config.min_live_channels => {
                    categories.push(category)
                }
                Ok(channels) => debug!(
                    category = %category.id,
                    live = channels.len(),
                    "Skipping category with too few live channels"
                ),
                Err(e) => warn!(
                    category = %category.id,
                    error = %e,
                    "Failed to probe live channels; skipping category"
                ),
            }
        }
        Ok(categories)
    }

    async fn live_channels(
        &self,
        category_id: &str,
        limit: usize,
    ) -> Result<ChannelLogins, PlatformError> {
        let first = limit.clamp(1, HELIX_MAX_PAGE_SIZE);
        let page: HelixPage<HelixStream> = self
            .get_json(
                "streams",
                &[
                    ("game_id", category_id.to_string()),
                    ("first", first.to_string()),
                ],
            )
            .await?;

        Ok(page.data.into_iter().map(|s| s.user_login).collect())
    }

    async fn category_name(&self, category_id: &str) -> Result<String, PlatformError> {
        let page: HelixPage<HelixGame> = self
            .get_json("games", &[("id", category_id.to_string())])
            .await?;

        page.data
            .into_iter()
            .next()
            .map(|game| game.name)
            .ok_or_else(|| {
                PlatformError::InvalidResponse(format!("no category with id {category_id}"))
            })
    }
}

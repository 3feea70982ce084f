//! Twitch live stream resolution.
//!
//! A playback access token is requested through the GQL persisted query, then
//! the usher master playlist is fetched with that token and the best variant
//! is chosen.

mod playlist;

use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rand::RngExt;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::StreamResolver;
use crate::error::PlatformError;

pub use playlist::select_best_variant;

static LOGIN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]{1,25}$").expect("valid login regex"));

#[derive(Debug, Deserialize)]
struct GqlResponse {
    data: Option<GqlData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlData {
    stream_playback_access_token: Option<PlaybackAccessToken>,
}

#[derive(Debug, Deserialize)]
struct PlaybackAccessToken {
    value: String,
    signature: String,
}

pub struct TwitchResolver {
    client: Client,
    device_id: String,
}

impl TwitchResolver {
    const BASE_URL: &str = "https://www.twitch.tv";
    const GQL_API_URL: &str = "https://gql.twitch.tv/gql";
    const GQL_CLIENT_ID: &str = "kimne78kx3ncx6brgo4mv6wki5h1ko";
    const PLAYBACK_TOKEN_HASH: &str =
        "ed230aa1e33e07eebb8928504583da78a5173989fadfb1ac94be06a04f3cdbe9";

    pub fn new(client: Client) -> Self {
        Self {
            client,
            device_id: Self::get_device_id(),
        }
    }

    fn get_device_id() -> String {
        // random device id of 16 digits
        format!(
            "{}",
            rand::rng().random_range(1000000000000000i64..9999999999999999i64)
        )
    }

    fn usher_url(login: &str) -> String {
        format!("https://usher.ttvnw.net/api/channel/hls/{login}.m3u8")
    }

    fn playback_token_query(login: &str) -> serde_json::Value {
        serde_json::json!({
            "operationName": "PlaybackAccessToken",
            "extensions": {
                "persistedQuery": {
                    "version": 1,
                    "sha256Hash": Self::PLAYBACK_TOKEN_HASH,
                }
            },
            "variables": {
                "isLive": true,
                "login": login,
                "isVod": false,
                "vodID": "",
                "playerType": "site",
                "isClip": false,
                "clipID": "",
                "platform": "site",
            },
        })
    }

    async fn playback_access_token(
        &self,
        login: &str,
    ) -> Result<Option<PlaybackAccessToken>, PlatformError> {
        let request = self
            .client
            .post(Self::GQL_API_URL)
            .header("Client-Id", Self::GQL_CLIENT_ID)
            .header("device-id", &self.device_id)
            .header(reqwest::header::REFERER, Self::BASE_URL)
            .json(&Self::playback_token_query(login));

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::from_status(status, Self::GQL_API_URL));
        }

        let body = response.text().await?;
        let parsed: GqlResponse = serde_json::from_str(&body)?;
        Ok(parsed.data.and_then(|d| d.stream_playback_access_token))
    }
}

#[async_trait]
impl StreamResolver for TwitchResolver {
    async fn resolve(&self, login: &str) -> Result<Option<String>, PlatformError> {
        if !LOGIN_REGEX.is_match(login) {
            return Err(PlatformError::InvalidLogin(login.to_string()));
        }

        let Some(token) = self.playback_access_token(login).await? else {
            debug!(login, "No playback access token; channel offline or unknown");
            return Ok(None);
        };

        let epoch_seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
            .to_string();

        let usher_url = Self::usher_url(login);
        let response = self
            .client
            .get(&usher_url)
            .query(&[
                ("player", "twitchweb"),
                ("p", epoch_seconds.as_str()),
                ("allow_source", "true"),
                ("allow_audio_only", "true"),
                ("fast_bread", "true"),
                ("token", token.value.as_str()),
                ("sig", token.signature.as_str()),
            ])
            .send()
            .await?;

        // Usher answers 404 for channels that are not live.
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(login, "Usher returned 404; channel not live");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PlatformError::from_status(status, &usher_url));
        }

        let body = response.bytes().await?;
        let master = m3u8_rs::parse_master_playlist_res(&body)
            .map_err(|e| PlatformError::PlaylistError(e.to_string()))?;

        let Some(variant) = select_best_variant(&master) else {
            return Ok(None);
        };

        let base = Url::parse(&usher_url)
            .map_err(|e| PlatformError::PlaylistError(e.to_string()))?;
        let url = base
            .join(&variant.uri)
            .map_err(|e| PlatformError::PlaylistError(e.to_string()))?;

        debug!(login, variant = %url, bandwidth = variant.bandwidth, "Resolved best variant");
        Ok(Some(url.to_string()))
    }
}

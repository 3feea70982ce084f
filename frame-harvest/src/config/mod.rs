//! Application configuration.
//!
//! Values are resolved in order: built-in defaults, an optional TOML file,
//! environment variables, then command-line flags (applied by the caller).

use std::path::{Path, PathBuf};
use std::time::Duration;

use platforms_api::helix::DEFAULT_DENYLIST;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// File read when neither `--config` nor `HARVEST_CONFIG` names one.
pub const DEFAULT_CONFIG_FILE: &str = "frame-harvest.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root of the on-disk dataset.
    pub data_root: PathBuf,
    pub database_url: String,
    pub log_dir: PathBuf,
    /// Upper bound on tracked categories.
    pub max_categories: usize,
    pub frame: FrameConfig,
    pub sampling: SamplingConfig,
    pub ingest: IngestConfig,
    pub platform: PlatformConfig,
    pub monitor: MonitorConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("./dataset"),
            database_url: "sqlite:frame-harvest.db?mode=rwc".to_string(),
            log_dir: PathBuf::from("./logs"),
            max_categories: 50,
            frame: FrameConfig::default(),
            sampling: SamplingConfig::default(),
            ingest: IngestConfig::default(),
            platform: PlatformConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// Stored frame format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub width: u32,
    pub height: u32,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            width: 240,
            height: 240,
            jpeg_quality: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Successful ingestions wanted per selected category.
    pub streams_per_category: usize,
    /// Ingestion attempts allowed per selected category.
    pub max_attempts_per_category: usize,
    /// Live channels requested per category.
    pub live_channel_limit: usize,
    /// Pause after an iteration that sampled nothing.
    pub retry_delay_secs: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            streams_per_category: 5,
            max_attempts_per_category: 10,
            live_channel_limit: 100,
            retry_delay_secs: 5,
        }
    }
}

impl SamplingConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Advertisement marker searched for (case-insensitively) in playlists.
    pub ad_marker: String,
    /// A playlist with more markers than this is an ad break.
    pub max_ad_markers: usize,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub ffmpeg_path: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            ad_marker: "twitch-ad".to_string(),
            max_ad_markers: 1,
            request_timeout_secs: 15,
            max_retries: 2,
            retry_base_delay_ms: 500,
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
        }
    }
}

impl IngestConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub client_id: String,
    pub access_token: String,
    pub top_categories_limit: usize,
    /// Top categories need more live channels than this to be considered.
    pub min_live_channels: usize,
    /// Category ids never tracked.
    pub denylist: Vec<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            access_token: String::new(),
            top_categories_limit: 45,
            min_live_channels: 90,
            denylist: DEFAULT_DENYLIST
                .iter()
                .map(|(id, _)| (*id).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl AppConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::config(format!("invalid TOML: {e}")))
    }

    /// Load defaults, then the TOML file, then environment overrides.
    ///
    /// An explicitly named file must exist; the default file is optional.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os("HARVEST_CONFIG").map(PathBuf::from);
        let (path, required) = match explicit_path.map(Path::to_path_buf).or(env_path) {
            Some(path) => (path, true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_toml_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => Self::default(),
            Err(e) => return Err(Error::io_path("reading config", &path, e)),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(root) = lookup("HARVEST_DATA_ROOT") {
            self.data_root = PathBuf::from(root);
        }
        if let Some(client_id) = lookup("TWITCH_CLIENT_ID") {
            self.platform.client_id = client_id;
        }
        if let Some(token) = lookup("TWITCH_ACCESS_TOKEN") {
            self.platform.access_token = token;
        }
    }

    /// Check internal consistency. `needs_platform` also requires API
    /// credentials.
    pub fn validate(&self, needs_platform: bool) -> Result<()> {
        if self.max_categories == 0 {
            return Err(Error::config("max_categories must be at least 1"));
        }
        if self.frame.width == 0 || self.frame.height == 0 {
            return Err(Error::config("frame width and height must be non-zero"));
        }
        if !(1..=100).contains(&self.frame.jpeg_quality) {
            return Err(Error::config("frame.jpeg_quality must be within 1..=100"));
        }
        if self.sampling.streams_per_category == 0 {
            return Err(Error::config(
                "sampling.streams_per_category must be at least 1",
            ));
        }
        if self.sampling.max_attempts_per_category < self.sampling.streams_per_category {
            return Err(Error::config(
                "sampling.max_attempts_per_category must not be below streams_per_category",
            ));
        }
        if self.database_url.trim().is_empty() {
            return Err(Error::config("database_url must not be empty"));
        }
        if needs_platform
            && (self.platform.client_id.is_empty() || self.platform.access_token.is_empty())
        {
            return Err(Error::config(
                "TWITCH_CLIENT_ID and TWITCH_ACCESS_TOKEN are required",
            ));
        }
        Ok(())
    }
}

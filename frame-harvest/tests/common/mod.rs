//! Shared fixtures for integration tests: a migrated SQLite file in a temp
//! directory and in-memory fakes for every external collaborator.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use frame_harvest::database::repositories::SqlxCatalogRepository;
use frame_harvest::database::{init_pool, run_migrations};
use frame_harvest::ingest::{FetchError, FrameDecoder, MediaFetcher};
use frame_harvest::store::FrameStore;
use image::DynamicImage;
use platforms_api::{CategoryInfo, ChannelLogins, PlatformClient, PlatformError, StreamResolver};
use tempfile::TempDir;

pub const LIVE_PLAYLIST: &str = include_str!("../fixtures/live.m3u8");
pub const AD_BREAK_PLAYLIST: &str = include_str!("../fixtures/ad_break.m3u8");
pub const SINGLE_MARKER_PLAYLIST: &str = include_str!("../fixtures/single_marker.m3u8");

/// Segment body the fake decoder refuses.
pub const CORRUPT_SEGMENT: &[u8] = b"corrupt";

pub struct TestEnv {
    pub dir: TempDir,
    pub catalog: Arc<SqlxCatalogRepository>,
    pub store: Arc<FrameStore>,
}

pub async fn setup() -> TestEnv {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("catalog.db").display());
    let pool = init_pool(&url).await.expect("Failed to create test pool");
    run_migrations(&pool).await.expect("Failed to run migrations");

    let store = Arc::new(FrameStore::new(dir.path().join("dataset")));
    store.ensure_layout().await.expect("layout");

    TestEnv {
        dir,
        catalog: Arc::new(SqlxCatalogRepository::new(pool)),
        store,
    }
}

pub fn category(id: &str) -> CategoryInfo {
    CategoryInfo::new(id, format!("Category {id}"))
}

/// Resolver answering from a fixed table; unknown logins are an API error.
#[derive(Default)]
pub struct FakeResolver {
    pub playlists: HashMap<String, Option<String>>,
}

impl FakeResolver {
    pub fn live(mut self, login: &str, url: &str) -> Self {
        self.playlists.insert(login.to_string(), Some(url.to_string()));
        self
    }

    pub fn offline(mut self, login: &str) -> Self {
        self.playlists.insert(login.to_string(), None);
        self
    }
}

#[async_trait]
impl StreamResolver for FakeResolver {
    async fn resolve(&self, login: &str) -> Result<Option<String>, PlatformError> {
        self.playlists
            .get(login)
            .cloned()
            .ok_or_else(|| PlatformError::InvalidLogin(login.to_string()))
    }
}

/// Fetcher serving playlists and segments from memory. Anything else is a
/// 404; URLs marked with [`FakeFetcher::cancel_at`] behave as if the stop
/// token fired.
#[derive(Default)]
pub struct FakeFetcher {
    pub texts: HashMap<String, String>,
    pub bytes: HashMap<String, Bytes>,
    pub cancelled: HashSet<String>,
    pub requests: AtomicUsize,
}

impl FakeFetcher {
    pub fn playlist(mut self, url: &str, body: &str) -> Self {
        self.texts.insert(url.to_string(), body.to_string());
        self
    }

    pub fn segment(mut self, url: &str, body: &'static [u8]) -> Self {
        self.bytes.insert(url.to_string(), Bytes::from_static(body));
        self
    }

    pub fn cancel_at(mut self, url: &str) -> Self {
        self.cancelled.insert(url.to_string());
        self
    }

    fn not_found(url: &str) -> FetchError {
        FetchError::Status {
            status: 404,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.texts.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.cancelled.contains(url) {
            return Err(FetchError::Cancelled);
        }
        self.bytes.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }
}

/// Decoder yielding a 640x360 frame for any segment except [`CORRUPT_SEGMENT`].
pub struct FakeDecoder;

#[async_trait]
impl FrameDecoder for FakeDecoder {
    async fn first_frame(&self, segment: &Path) -> frame_harvest::Result<DynamicImage> {
        let bytes = tokio::fs::read(segment).await?;
        if bytes == CORRUPT_SEGMENT {
            return Err(frame_harvest::Error::decode("not a video segment"));
        }
        Ok(DynamicImage::new_rgb8(640, 360))
    }
}

/// Platform with fixed categories and channels; counts catalog calls.
#[derive(Default)]
pub struct FakePlatform {
    pub top: Vec<CategoryInfo>,
    pub channels: HashMap<String, ChannelLogins>,
    pub top_calls: AtomicUsize,
    pub unreachable: bool,
}

impl FakePlatform {
    pub fn with_channels(mut self, category_id: &str, logins: &[&str]) -> Self {
        self.channels.insert(
            category_id.to_string(),
            logins.iter().map(|l| l.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn top_categories(&self, limit: usize) -> Result<Vec<CategoryInfo>, PlatformError> {
        self.top_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(PlatformError::InvalidResponse("unreachable".to_string()));
        }
        Ok(self.top.iter().take(limit).cloned().collect())
    }

    async fn live_channels(
        &self,
        category_id: &str,
        limit: usize,
    ) -> Result<ChannelLogins, PlatformError> {
        if self.unreachable {
            return Err(PlatformError::InvalidResponse("unreachable".to_string()));
        }
        Ok(self
            .channels
            .get(category_id)
            .map(|logins| logins.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn category_name(&self, category_id: &str) -> Result<String, PlatformError> {
        self.top
            .iter()
            .find(|c| c.id == category_id)
            .map(|c| c.name.clone())
            .ok_or_else(|| PlatformError::InvalidResponse(category_id.to_string()))
    }
}

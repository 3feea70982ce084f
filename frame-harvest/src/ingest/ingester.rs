//! Per-broadcast ingestion.
//!
//! One [`SegmentIngester::ingest`] call walks a single channel through
//! `Start -> PlaylistFetch -> LiveCheck -> AdCheck -> SegmentLoop -> Done`,
//! ending in `Aborted` on any expected non-result. Segment failures are
//! archived and skipped; they do not abort the attempt.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use platforms_api::StreamResolver;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{FrameConfig, IngestConfig};
use crate::database::models::NewFrame;
use crate::database::repositories::CatalogRepository;
use crate::store::{FrameStore, TempArea};
use crate::utils::fs::io_error;

use super::decoder::{FrameDecoder, prepare_frame};
use super::fetcher::{FetchError, MediaFetcher};
use super::manifest::{count_ad_markers, segment_urls};

/// Stages of one ingestion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Start,
    PlaylistFetch,
    LiveCheck,
    AdCheck,
    SegmentLoop,
    Done,
    Aborted,
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Start => "start",
            Self::PlaylistFetch => "playlist_fetch",
            Self::LiveCheck => "live_check",
            Self::AdCheck => "ad_check",
            Self::SegmentLoop => "segment_loop",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(stage)
    }
}

/// A channel paired with the category it is sampled for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastSample {
    pub channel_login: String,
    pub category_id: String,
}

impl BroadcastSample {
    pub fn new(channel_login: impl Into<String>, category_id: impl Into<String>) -> Self {
        Self {
            channel_login: channel_login.into(),
            category_id: category_id.into(),
        }
    }
}

/// Why an attempt produced nothing.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Channel {channel} unreachable: {reason}")]
    ChannelUnreachable { channel: String, reason: String },

    #[error("Advertisement break detected ({markers} markers)")]
    AdvertisementDetected { markers: usize },

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("No frames produced from {segments} segment(s)")]
    NoFramesProduced { segments: usize },

    #[error("Catalog error: {0}")]
    Catalog(#[source] crate::Error),

    #[error("Frame store error: {0}")]
    Store(#[source] crate::Error),

    #[error("Ingestion cancelled")]
    Cancelled,
}

impl IngestError {
    /// Stage the attempt was in when it aborted.
    pub fn stage(&self) -> IngestState {
        match self {
            Self::ChannelUnreachable { .. } => IngestState::PlaylistFetch,
            Self::AdvertisementDetected { .. } => IngestState::AdCheck,
            Self::InvalidManifest(_) => IngestState::LiveCheck,
            Self::NoFramesProduced { .. } | Self::Catalog(_) | Self::Store(_) | Self::Cancelled => {
                IngestState::SegmentLoop
            }
        }
    }
}

/// A successful attempt.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub sample: BroadcastSample,
    /// Stored frame paths, relative to `frames/`, in capture order.
    pub frames: Vec<String>,
    pub segments: usize,
    pub failed_segments: usize,
}

pub struct SegmentIngester {
    resolver: Arc<dyn StreamResolver>,
    fetcher: Arc<dyn MediaFetcher>,
    decoder: Arc<dyn FrameDecoder>,
    catalog: Arc<dyn CatalogRepository>,
    store: Arc<FrameStore>,
    frame: FrameConfig,
    ingest: IngestConfig,
}

impl SegmentIngester {
    pub fn new(
        resolver: Arc<dyn StreamResolver>,
        fetcher: Arc<dyn MediaFetcher>,
        decoder: Arc<dyn FrameDecoder>,
        catalog: Arc<dyn CatalogRepository>,
        store: Arc<FrameStore>,
        frame: FrameConfig,
        ingest: IngestConfig,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            decoder,
            catalog,
            store,
            frame,
            ingest,
        }
    }

    /// Run one attempt. Scratch files are removed on every exit path.
    pub async fn ingest(&self, sample: &BroadcastSample) -> Result<IngestReport, IngestError> {
        let scratch = self
            .store
            .create_scratch(TempArea::Data)
            .await
            .map_err(IngestError::Store)?;
        let result = self.run(sample, &scratch).await;

        if let Err(e) = self.store.remove_scratch(&scratch).await {
            warn!(scratch = %scratch.display(), error = %e, "Failed to remove scratch directory");
        }
        if let Err(e) = self.store.purge_temp(TempArea::Recognition).await {
            warn!(area = ?TempArea::Recognition, error = %e, "Failed to purge temp area");
        }

        match &result {
            Ok(report) => info!(
                channel = %sample.channel_login,
                category = %sample.category_id,
                frames = report.frames.len(),
                failed_segments = report.failed_segments,
                stage = %IngestState::Done,
                "Ingested broadcast"
            ),
            Err(e) => debug!(
                channel = %sample.channel_login,
                category = %sample.category_id,
                stage = %e.stage(),
                error = %e,
                "Ingestion aborted"
            ),
        }
        result
    }

    async fn run(
        &self,
        sample: &BroadcastSample,
        scratch: &Path,
    ) -> Result<IngestReport, IngestError> {
        let channel = sample.channel_login.as_str();
        let category = sample.category_id.as_str();
        debug!(channel, category, stage = %IngestState::Start, "Starting ingestion");

        // PlaylistFetch
        let playlist_url = match self.resolver.resolve(channel).await {
            Ok(Some(url)) if !url.is_empty() => url,
            Ok(_) => {
                return Err(IngestError::ChannelUnreachable {
                    channel: channel.to_string(),
                    reason: "not live".to_string(),
                });
            }
            Err(e) => {
                return Err(IngestError::ChannelUnreachable {
                    channel: channel.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        // LiveCheck
        debug!(channel, playlist = %playlist_url, stage = %IngestState::LiveCheck, "Fetching manifest");
        let manifest = match self.fetcher.fetch_text(&playlist_url).await {
            Ok(body) => body,
            Err(FetchError::Cancelled) => return Err(IngestError::Cancelled),
            Err(e) => {
                return Err(IngestError::ChannelUnreachable {
                    channel: channel.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        // AdCheck
        let markers = count_ad_markers(&manifest, &self.ingest.ad_marker);
        if markers > self.ingest.max_ad_markers {
            return Err(IngestError::AdvertisementDetected { markers });
        }

        let segments =
            segment_urls(&manifest, &playlist_url).map_err(IngestError::InvalidManifest)?;
        if segments.is_empty() {
            return Err(IngestError::NoFramesProduced { segments: 0 });
        }

        // SegmentLoop
        let _writer = self.store.lock_category(category).await;
        let mut next_number = self.next_frame_number(category).await?;

        let mut frames = Vec::new();
        let mut failed_segments = 0;
        let mut cancelled = false;

        for (index, segment_url) in segments.iter().enumerate() {
            let bytes = match self.fetcher.fetch_bytes(segment_url.as_str()).await {
                Ok(bytes) => bytes,
                Err(FetchError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(
                        channel,
                        category,
                        segment = %segment_url,
                        stage = "download",
                        error = %e,
                        "Segment download failed"
                    );
                    failed_segments += 1;
                    continue;
                }
            };

            let temp_path = scratch.join(format!("{index}.ts"));
            tokio::fs::write(&temp_path, &bytes)
                .await
                .map_err(|e| IngestError::Store(io_error("writing segment", &temp_path, e)))?;

            let jpeg = match self.decode(&temp_path).await {
                Ok(jpeg) => jpeg,
                Err(e) => {
                    failed_segments += 1;
                    let archived = self.store.archive_debug_segment(&bytes).await;
                    warn!(
                        channel,
                        category,
                        playlist = %playlist_url,
                        segment = %segment_url,
                        archived = ?archived.as_ref().ok(),
                        stage = "decode",
                        error = %e,
                        "Segment produced no usable frame"
                    );
                    continue;
                }
            };

            // The file exists before its row; the row is the commit point.
            let path = self
                .store
                .write_frame(category, next_number, &jpeg)
                .await
                .map_err(IngestError::Store)?;
            let record = NewFrame::new(&path, category, channel);
            if let Err(e) = self.catalog.record_frame(&record).await {
                if let Err(remove_err) = self.store.remove_frame(&path).await {
                    warn!(path = %path, error = %remove_err, "Failed to remove unrecorded frame");
                }
                return Err(IngestError::Catalog(e));
            }

            next_number = next_number.saturating_add(1);
            frames.push(path);
        }

        if frames.is_empty() {
            if cancelled {
                return Err(IngestError::Cancelled);
            }
            return Err(IngestError::NoFramesProduced {
                segments: segments.len(),
            });
        }

        Ok(IngestReport {
            sample: sample.clone(),
            frames,
            segments: segments.len(),
            failed_segments,
        })
    }

    /// First free number in `category`. Rows whose file was deleted out of
    /// band still own their path until the next reconcile, so the catalog's
    /// highest number is a floor alongside the directory scan.
    async fn next_frame_number(&self, category: &str) -> Result<u64, IngestError> {
        let on_disk = self
            .store
            .next_frame_number(category)
            .await
            .map_err(IngestError::Store)?;
        let recorded = self
            .catalog
            .last_frame_number(category)
            .await
            .map_err(IngestError::Catalog)?;

        match recorded {
            Some(last) if last >= on_disk => last.checked_add(1).ok_or_else(|| {
                IngestError::Store(crate::Error::validation(format!(
                    "frame numbers exhausted in category {category}"
                )))
            }),
            _ => Ok(on_disk),
        }
    }

    async fn decode(&self, segment: &Path) -> crate::Result<Vec<u8>> {
        let frame = self.decoder.first_frame(segment).await?;
        prepare_frame(&frame, &self.frame)
    }
}

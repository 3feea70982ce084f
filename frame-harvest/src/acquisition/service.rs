//! The acquisition coordinator.

use std::sync::Arc;
use std::time::Duration;

use platforms_api::PlatformClient;
use rand::RngExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::balancer::{CategoryBalancer, CategoryTarget};
use crate::config::{AppConfig, SamplingConfig};
use crate::database::repositories::CatalogRepository;
use crate::ingest::{BroadcastSample, IngestError, SegmentIngester};
use crate::{Error, Result};

/// Running totals printed at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionSummary {
    pub frames: u64,
    /// Ingestion attempts that stored at least one frame.
    pub streams: u64,
    /// Ingestion attempts that stored nothing.
    pub failures: u64,
}

impl std::fmt::Display for AcquisitionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Downloaded {} frame(s) from {} stream(s). Failed {} time(s).",
            self.frames, self.streams, self.failures
        )
    }
}

/// What one pass of the loop did.
#[derive(Debug, Clone, Default)]
pub struct IterationOutcome {
    pub target: Option<CategoryTarget>,
    pub attempts: usize,
    pub successes: usize,
    pub frames: u64,
}

/// Loop parameters taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub top_categories_limit: usize,
    pub sampling: SamplingConfig,
}

impl From<&AppConfig> for LoopSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            top_categories_limit: config.platform.top_categories_limit,
            sampling: config.sampling.clone(),
        }
    }
}

/// Sequential coordinator: register categories, pick the least sampled one,
/// ingest a random sample of its live channels, repeat until cancelled.
pub struct AcquisitionLoop {
    platform: Arc<dyn PlatformClient>,
    balancer: CategoryBalancer<dyn CatalogRepository>,
    ingester: SegmentIngester,
    settings: LoopSettings,
    summary: AcquisitionSummary,
}

impl AcquisitionLoop {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        balancer: CategoryBalancer<dyn CatalogRepository>,
        ingester: SegmentIngester,
        settings: LoopSettings,
    ) -> Self {
        Self {
            platform,
            balancer,
            ingester,
            settings,
            summary: AcquisitionSummary::default(),
        }
    }

    pub fn summary(&self) -> AcquisitionSummary {
        self.summary
    }

    /// Run until `token` is cancelled and return the totals.
    ///
    /// Recoverable failures are logged and followed by a short pause; they
    /// never end the loop.
    pub async fn run(mut self, token: CancellationToken) -> AcquisitionSummary {
        info!("Acquisition loop started");
        let retry_delay = self.settings.sampling.retry_delay();

        while !token.is_cancelled() {
            let pause = match self.run_iteration(&token).await {
                Ok(outcome) => outcome.attempts == 0,
                Err(e) => {
                    warn!(error = %e, "Acquisition iteration failed");
                    true
                }
            };

            if pause && !wait_or_cancel(&token, retry_delay).await {
                break;
            }
        }

        info!(summary = %self.summary, "Acquisition loop stopped");
        self.summary
    }

    /// One pass: refresh categories, pick the target, sample its channels.
    pub async fn run_iteration(&mut self, token: &CancellationToken) -> Result<IterationOutcome> {
        let mut outcome = IterationOutcome::default();

        if self.balancer.is_full().await? {
            debug!("Category cap reached; skipping top categories refresh");
        } else {
            match self
                .platform
                .top_categories(self.settings.top_categories_limit)
                .await
            {
                Ok(categories) => {
                    self.balancer.register_categories(&categories).await?;
                }
                Err(e) => warn!(stage = "top_categories", error = %e, "Platform unreachable"),
            }
        }

        let target = match self.balancer.select_min_category().await {
            Ok(target) => target,
            Err(Error::EmptyCatalog) => {
                warn!("No category tracked yet");
                return Ok(outcome);
            }
            Err(e) => return Err(e),
        };
        info!(
            category = %target.id,
            name = %target.name,
            frames = target.frame_count,
            "Sampling category"
        );

        let channels = match self
            .platform
            .live_channels(&target.id, self.settings.sampling.live_channel_limit)
            .await
        {
            Ok(channels) => channels,
            Err(e) => {
                warn!(category = %target.id, stage = "live_channels", error = %e, "Platform unreachable");
                outcome.target = Some(target);
                return Ok(outcome);
            }
        };

        let mut candidates: Vec<String> = channels.into_iter().collect();
        if candidates.is_empty() {
            warn!(category = %target.id, "No live channels");
        }

        let sampling = &self.settings.sampling;
        while outcome.successes < sampling.streams_per_category
            && outcome.attempts < sampling.max_attempts_per_category
            && !candidates.is_empty()
        {
            if token.is_cancelled() {
                break;
            }

            let pick = rand::rng().random_range(0..candidates.len());
            let login = candidates.swap_remove(pick);
            outcome.attempts += 1;

            let sample = BroadcastSample::new(login, &target.id);
            match self.ingester.ingest(&sample).await {
                Ok(report) => {
                    outcome.successes += 1;
                    outcome.frames += report.frames.len() as u64;
                    self.summary.streams += 1;
                    self.summary.frames += report.frames.len() as u64;
                }
                Err(IngestError::Cancelled) => break,
                Err(e) => {
                    self.summary.failures += 1;
                    log_failed_attempt(&sample, &e);
                }
            }
        }

        outcome.target = Some(target);
        Ok(outcome)
    }
}

fn log_failed_attempt(sample: &BroadcastSample, error: &IngestError) {
    match error {
        IngestError::Catalog(_) | IngestError::Store(_) => warn!(
            channel = %sample.channel_login,
            category = %sample.category_id,
            stage = %error.stage(),
            error = %error,
            "Ingestion failed"
        ),
        _ => info!(
            channel = %sample.channel_login,
            category = %sample.category_id,
            stage = %error.stage(),
            reason = %error,
            "Attempt contributed nothing"
        ),
    }
}

/// Sleep for `delay` unless cancelled first. Returns `false` on cancellation.
pub(crate) async fn wait_or_cancel(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

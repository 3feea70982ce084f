//! `run`: the long-running acquisition command.

use std::sync::Arc;

use platforms_api::{PlatformClient, StreamResolver, TwitchResolver};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::acquisition::{
    AcquisitionLoop, AcquisitionSummary, DatasetMonitor, LoopSettings, spawn_stop_listener,
};
use crate::balancer::CategoryBalancer;
use crate::database::repositories::CatalogRepository;
use crate::ingest::{
    FfmpegFrameDecoder, FrameDecoder, HttpMediaFetcher, MediaFetcher, RetryPolicy,
    SegmentIngester,
};
use crate::logging::start_retention_cleanup;

use super::Harvest;

pub async fn execute(harvest: &Harvest) -> Result<AcquisitionSummary> {
    let config = &harvest.config;
    let token = CancellationToken::new();

    start_retention_cleanup(config.log_dir.clone(), token.child_token());
    let listener = spawn_stop_listener(token.clone());

    let http = harvest.http_client();
    let platform: Arc<dyn PlatformClient> = Arc::new(harvest.platform_client());
    let resolver: Arc<dyn StreamResolver> = Arc::new(TwitchResolver::new(http.clone()));
    let policy = RetryPolicy {
        max_retries: config.ingest.max_retries,
        base_delay: config.ingest.retry_base_delay(),
        ..RetryPolicy::default()
    };
    let fetcher: Arc<dyn MediaFetcher> =
        Arc::new(HttpMediaFetcher::new(http, policy, token.child_token()));
    let decoder: Arc<dyn FrameDecoder> = Arc::new(FfmpegFrameDecoder::with_ffmpeg_path(
        &config.ingest.ffmpeg_path,
    ));

    let ingester = SegmentIngester::new(
        resolver,
        fetcher,
        decoder,
        harvest.catalog(),
        harvest.store.clone(),
        config.frame.clone(),
        config.ingest.clone(),
    );
    let balancer = CategoryBalancer::new(harvest.catalog(), config.max_categories);
    let acquisition = AcquisitionLoop::new(
        platform,
        balancer,
        ingester,
        LoopSettings::from(config),
    );

    let monitor = DatasetMonitor::new(
        harvest.catalog(),
        harvest.store.clone(),
        config.monitor.interval(),
    );
    let monitor_task = tokio::spawn(monitor.run(token.child_token()));

    println!("Press Enter or Ctrl-C to stop.");
    let summary = acquisition.run(token.clone()).await;

    token.cancel();
    if let Err(e) = monitor_task.await {
        warn!(error = %e, "Monitor task ended abnormally");
    }
    listener.abort();

    info!("Correcting cached frame counts");
    if let Err(e) = harvest.catalog.recompute_frame_counts().await {
        warn!(error = %e, "Frame count recompute failed");
    }

    let final_report = DatasetMonitor::new(
        harvest.catalog(),
        harvest.store.clone(),
        config.monitor.interval(),
    );
    match final_report.report().await {
        Ok(report) => println!("{report}"),
        Err(e) => warn!(error = %e, "Final dataset report failed"),
    }
    println!("{summary}");

    Ok(summary)
}

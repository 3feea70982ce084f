//! SegmentIngester state machine with in-memory collaborators.

mod common;

use std::sync::Arc;

use common::{
    AD_BREAK_PLAYLIST, CORRUPT_SEGMENT, FakeDecoder, FakeFetcher, FakeResolver, LIVE_PLAYLIST,
    SINGLE_MARKER_PLAYLIST, TestEnv, category, setup,
};
use frame_harvest::config::{FrameConfig, IngestConfig};
use frame_harvest::database::repositories::CatalogRepository;
use frame_harvest::ingest::{BroadcastSample, IngestError, IngestState, SegmentIngester};
use frame_harvest::store::TempArea;
use image::GenericImageView;

const PLAYLIST_URL: &str = "https://video-weaver.sea02.hls.ttvnw.net/v1/playlist/abc.m3u8";
const SEGMENT_1: &str = "https://video-edge-c2a4b8.sea02.abs.hls.ttvnw.net/v1/segment/CrEFa1.ts";
const SEGMENT_2: &str = "https://video-edge-c2a4b8.sea02.abs.hls.ttvnw.net/v1/segment/CrEFa2.ts";
const SEGMENT_3: &str = "https://video-weaver.sea02.hls.ttvnw.net/v1/playlist/segment/CrEFa3.ts";

fn ingester(env: &TestEnv, resolver: FakeResolver, fetcher: FakeFetcher) -> SegmentIngester {
    SegmentIngester::new(
        Arc::new(resolver),
        Arc::new(fetcher),
        Arc::new(FakeDecoder),
        env.catalog.clone(),
        env.store.clone(),
        FrameConfig::default(),
        IngestConfig::default(),
    )
}

async fn tracked_env(category_id: &str) -> TestEnv {
    let env = setup().await;
    env.catalog
        .upsert_categories(&[category(category_id)], 10)
        .await
        .unwrap();
    env
}

async fn temp_is_empty(env: &TestEnv) -> bool {
    let mut entries = tokio::fs::read_dir(env.store.temp_dir(TempArea::Data))
        .await
        .unwrap();
    entries.next_entry().await.unwrap().is_none()
}

#[tokio::test]
async fn test_ingests_every_segment() {
    let env = tracked_env("509658").await;
    let fetcher = FakeFetcher::default()
        .playlist(PLAYLIST_URL, LIVE_PLAYLIST)
        .segment(SEGMENT_1, b"seg1")
        .segment(SEGMENT_2, b"seg2")
        .segment(SEGMENT_3, b"seg3");
    let ingester = ingester(&env, FakeResolver::default().live("alice", PLAYLIST_URL), fetcher);

    let report = ingester
        .ingest(&BroadcastSample::new("alice", "509658"))
        .await
        .unwrap();

    assert_eq!(report.frames, vec!["509658/1.jpg", "509658/2.jpg", "509658/3.jpg"]);
    assert_eq!((report.segments, report.failed_segments), (3, 0));
    assert_eq!(
        env.catalog.get_category("509658").await.unwrap().frame_count,
        3
    );

    let stored = image::open(env.store.category_dir("509658").join("2.jpg")).unwrap();
    assert_eq!(stored.dimensions(), (240, 240));
    assert!(temp_is_empty(&env).await);

    let frames = env.catalog.list_frames("509658").await.unwrap();
    assert!(frames.iter().all(|f| f.channel_login == "alice"));
}

#[tokio::test]
async fn test_numbering_continues_from_existing_frames() {
    let env = tracked_env("509658").await;
    env.store.write_frame("509658", 7, b"old").await.unwrap();

    let fetcher = FakeFetcher::default()
        .playlist(PLAYLIST_URL, LIVE_PLAYLIST)
        .segment(SEGMENT_1, b"seg1")
        .segment(SEGMENT_2, b"seg2")
        .segment(SEGMENT_3, b"seg3");
    let ingester = ingester(&env, FakeResolver::default().live("bob", PLAYLIST_URL), fetcher);

    let report = ingester
        .ingest(&BroadcastSample::new("bob", "509658"))
        .await
        .unwrap();
    assert_eq!(report.frames, vec!["509658/8.jpg", "509658/9.jpg", "509658/10.jpg"]);
}

#[tokio::test]
async fn test_bad_segment_is_archived_and_skipped() {
    let env = tracked_env("21779").await;
    let fetcher = FakeFetcher::default()
        .playlist(PLAYLIST_URL, LIVE_PLAYLIST)
        .segment(SEGMENT_1, b"seg1")
        .segment(SEGMENT_2, CORRUPT_SEGMENT)
        .segment(SEGMENT_3, b"seg3");
    let ingester = ingester(&env, FakeResolver::default().live("carol", PLAYLIST_URL), fetcher);

    let report = ingester
        .ingest(&BroadcastSample::new("carol", "21779"))
        .await
        .unwrap();

    // Numbers advance only on success.
    assert_eq!(report.frames, vec!["21779/1.jpg", "21779/2.jpg"]);
    assert_eq!(report.failed_segments, 1);

    let archived = tokio::fs::read(env.store.debug_dir().join("1.ts"))
        .await
        .unwrap();
    assert_eq!(archived, CORRUPT_SEGMENT);
    assert!(temp_is_empty(&env).await);
}

#[tokio::test]
async fn test_missing_segment_download_is_skipped() {
    let env = tracked_env("21779").await;
    let fetcher = FakeFetcher::default()
        .playlist(PLAYLIST_URL, LIVE_PLAYLIST)
        .segment(SEGMENT_3, b"seg3");
    let ingester = ingester(&env, FakeResolver::default().live("dave", PLAYLIST_URL), fetcher);

    let report = ingester
        .ingest(&BroadcastSample::new("dave", "21779"))
        .await
        .unwrap();
    assert_eq!(report.frames, vec!["21779/1.jpg"]);
    assert_eq!(report.failed_segments, 2);
}

#[tokio::test]
async fn test_ad_break_yields_no_frames() {
    let env = tracked_env("21779").await;
    let fetcher = FakeFetcher::default().playlist(PLAYLIST_URL, AD_BREAK_PLAYLIST);
    let ingester = ingester(&env, FakeResolver::default().live("erin", PLAYLIST_URL), fetcher);

    let err = ingester
        .ingest(&BroadcastSample::new("erin", "21779"))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::AdvertisementDetected { markers } if markers > 1));
    assert_eq!(err.stage(), IngestState::AdCheck);
    assert_eq!(env.catalog.frame_count_total().await.unwrap(), 0);
    assert_eq!(env.store.next_frame_number("21779").await.unwrap(), 1);
}

#[tokio::test]
async fn test_single_marker_is_not_an_ad_break() {
    let env = tracked_env("21779").await;
    let url_1 = "https://video-edge-c2a4b8.sea02.abs.hls.ttvnw.net/v1/segment/Xb1.ts";
    let url_2 = "https://video-edge-c2a4b8.sea02.abs.hls.ttvnw.net/v1/segment/Xb2.ts";
    let fetcher = FakeFetcher::default()
        .playlist(PLAYLIST_URL, SINGLE_MARKER_PLAYLIST)
        .segment(url_1, b"seg1")
        .segment(url_2, b"seg2");
    let ingester = ingester(&env, FakeResolver::default().live("frank", PLAYLIST_URL), fetcher);

    let report = ingester
        .ingest(&BroadcastSample::new("frank", "21779"))
        .await
        .unwrap();
    assert_eq!(report.frames.len(), 2);
}

#[tokio::test]
async fn test_offline_channel_is_unreachable() {
    let env = tracked_env("21779").await;
    let ingester = ingester(
        &env,
        FakeResolver::default().offline("gina"),
        FakeFetcher::default(),
    );

    let offline = ingester
        .ingest(&BroadcastSample::new("gina", "21779"))
        .await
        .unwrap_err();
    assert!(matches!(offline, IngestError::ChannelUnreachable { .. }));

    let unknown = ingester
        .ingest(&BroadcastSample::new("nobody", "21779"))
        .await
        .unwrap_err();
    assert!(matches!(unknown, IngestError::ChannelUnreachable { .. }));
}

#[tokio::test]
async fn test_unfetchable_manifest_is_unreachable() {
    let env = tracked_env("21779").await;
    let ingester = ingester(
        &env,
        FakeResolver::default().live("hank", PLAYLIST_URL),
        FakeFetcher::default(),
    );

    let err = ingester
        .ingest(&BroadcastSample::new("hank", "21779"))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::ChannelUnreachable { .. }));
}

#[tokio::test]
async fn test_all_segments_failing_is_no_frames_produced() {
    let env = tracked_env("21779").await;
    let fetcher = FakeFetcher::default()
        .playlist(PLAYLIST_URL, LIVE_PLAYLIST)
        .segment(SEGMENT_1, CORRUPT_SEGMENT)
        .segment(SEGMENT_2, CORRUPT_SEGMENT)
        .segment(SEGMENT_3, CORRUPT_SEGMENT);
    let ingester = ingester(&env, FakeResolver::default().live("iris", PLAYLIST_URL), fetcher);

    let err = ingester
        .ingest(&BroadcastSample::new("iris", "21779"))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::NoFramesProduced { segments: 3 }));
    assert!(env.store.debug_dir().join("3.ts").exists());
    assert!(temp_is_empty(&env).await);
}

#[tokio::test]
async fn test_garbage_manifest_is_invalid() {
    let env = tracked_env("21779").await;
    let fetcher = FakeFetcher::default().playlist(PLAYLIST_URL, "<html>gone</html>");
    let ingester = ingester(&env, FakeResolver::default().live("jack", PLAYLIST_URL), fetcher);

    let err = ingester
        .ingest(&BroadcastSample::new("jack", "21779"))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::InvalidManifest(_)));
}

#[tokio::test]
async fn test_catalog_failure_removes_written_frame() {
    // Category never registered: the catalog refuses the row.
    let env = setup().await;
    let fetcher = FakeFetcher::default()
        .playlist(PLAYLIST_URL, LIVE_PLAYLIST)
        .segment(SEGMENT_1, b"seg1");
    let ingester = ingester(&env, FakeResolver::default().live("kate", PLAYLIST_URL), fetcher);

    let err = ingester
        .ingest(&BroadcastSample::new("kate", "untracked"))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Catalog(_)));
    assert!(!env.store.category_dir("untracked").join("1.jpg").exists());
    assert_eq!(env.catalog.frame_count_total().await.unwrap(), 0);
}

fn live_segments(fetcher: FakeFetcher) -> FakeFetcher {
    fetcher
        .playlist(PLAYLIST_URL, LIVE_PLAYLIST)
        .segment(SEGMENT_1, b"seg1")
        .segment(SEGMENT_2, b"seg2")
        .segment(SEGMENT_3, b"seg3")
}

async fn category_files(env: &TestEnv, category_id: &str) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(env.store.category_dir(category_id)).await else {
        return names;
    };
    while let Some(entry) = entries.next_entry().await.unwrap() {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    names
}

#[tokio::test]
async fn test_deleted_newest_frame_keeps_its_number_reserved() {
    let env = tracked_env("c").await;
    let first = ingester(
        &env,
        FakeResolver::default().live("lena", PLAYLIST_URL),
        live_segments(FakeFetcher::default()),
    );
    first.ingest(&BroadcastSample::new("lena", "c")).await.unwrap();

    // Removed out of band; its row still owns `c/3.jpg` until the next sync.
    tokio::fs::remove_file(env.store.category_dir("c").join("3.jpg"))
        .await
        .unwrap();

    let second = ingester(
        &env,
        FakeResolver::default().live("mike", PLAYLIST_URL),
        live_segments(FakeFetcher::default()),
    );
    let report = second
        .ingest(&BroadcastSample::new("mike", "c"))
        .await
        .unwrap();

    assert_eq!(report.frames, vec!["c/4.jpg", "c/5.jpg", "c/6.jpg"]);
    assert_eq!(env.catalog.get_category("c").await.unwrap().frame_count, 6);
}

#[tokio::test]
async fn test_deleted_category_directory_does_not_stall_ingestion() {
    let env = tracked_env("c").await;
    let first = ingester(
        &env,
        FakeResolver::default().live("nina", PLAYLIST_URL),
        live_segments(FakeFetcher::default()),
    );
    first.ingest(&BroadcastSample::new("nina", "c")).await.unwrap();

    tokio::fs::remove_dir_all(env.store.category_dir("c"))
        .await
        .unwrap();

    for round in 0..2u64 {
        let next = ingester(
            &env,
            FakeResolver::default().live("omar", PLAYLIST_URL),
            live_segments(FakeFetcher::default()),
        );
        let report = next
            .ingest(&BroadcastSample::new("omar", "c"))
            .await
            .unwrap();
        let first_number = 4 + round * 3;
        assert_eq!(report.frames[0], format!("c/{first_number}.jpg"));
    }
    assert_eq!(env.catalog.get_category("c").await.unwrap().frame_count, 9);
}

#[tokio::test]
async fn test_cancel_mid_loop_keeps_recorded_frames() {
    let env = tracked_env("c").await;
    let fetcher = FakeFetcher::default()
        .playlist(PLAYLIST_URL, LIVE_PLAYLIST)
        .segment(SEGMENT_1, b"seg1")
        .cancel_at(SEGMENT_2)
        .segment(SEGMENT_3, b"seg3");
    let ingester = ingester(&env, FakeResolver::default().live("pia", PLAYLIST_URL), fetcher);

    let report = ingester
        .ingest(&BroadcastSample::new("pia", "c"))
        .await
        .unwrap();

    // Stops at the cancelled segment; the third is never reached.
    assert_eq!(report.frames, vec!["c/1.jpg"]);
    assert_eq!(env.catalog.list_frame_paths().await.unwrap(), vec!["c/1.jpg"]);
    assert_eq!(env.catalog.get_category("c").await.unwrap().frame_count, 1);
    assert_eq!(category_files(&env, "c").await, vec!["1.jpg"]);
    assert!(temp_is_empty(&env).await);
}

#[tokio::test]
async fn test_cancel_before_first_frame_is_cancelled() {
    let env = tracked_env("c").await;
    let fetcher = FakeFetcher::default()
        .playlist(PLAYLIST_URL, LIVE_PLAYLIST)
        .cancel_at(SEGMENT_1)
        .segment(SEGMENT_2, b"seg2")
        .segment(SEGMENT_3, b"seg3");
    let ingester = ingester(&env, FakeResolver::default().live("quin", PLAYLIST_URL), fetcher);

    let err = ingester
        .ingest(&BroadcastSample::new("quin", "c"))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Cancelled));
    assert_eq!(env.catalog.frame_count_total().await.unwrap(), 0);
    assert!(category_files(&env, "c").await.is_empty());
    assert!(temp_is_empty(&env).await);
}

#[tokio::test]
async fn test_concurrent_ingests_in_one_category_never_collide() {
    let env = tracked_env("c").await;
    let left = ingester(
        &env,
        FakeResolver::default().live("rita", PLAYLIST_URL),
        live_segments(FakeFetcher::default()),
    );
    let right = ingester(
        &env,
        FakeResolver::default().live("sam", PLAYLIST_URL),
        live_segments(FakeFetcher::default()),
    );
    let rita = BroadcastSample::new("rita", "c");
    let sam = BroadcastSample::new("sam", "c");

    let (a, b) = tokio::join!(left.ingest(&rita), right.ingest(&sam));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.frames.len() + b.frames.len(), 6);

    let mut paths = env.catalog.list_frame_paths().await.unwrap();
    paths.sort_by_key(|p| {
        p.trim_start_matches("c/")
            .trim_end_matches(".jpg")
            .parse::<u64>()
            .unwrap()
    });
    let expected: Vec<String> = (1..=6).map(|n| format!("c/{n}.jpg")).collect();
    assert_eq!(paths, expected);
    assert_eq!(env.catalog.get_category("c").await.unwrap().frame_count, 6);

    // Each attempt holds the category for its whole segment loop.
    let (first, second) = if a.frames[0] == "c/1.jpg" {
        (a.frames, b.frames)
    } else {
        (b.frames, a.frames)
    };
    assert_eq!(first, vec!["c/1.jpg", "c/2.jpg", "c/3.jpg"]);
    assert_eq!(second, vec!["c/4.jpg", "c/5.jpg", "c/6.jpg"]);
}

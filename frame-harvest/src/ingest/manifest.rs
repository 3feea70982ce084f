//! Media playlist inspection: advertisement markers and segment URLs.

use url::Url;

/// Case-insensitive number of occurrences of `marker` in a playlist body.
pub fn count_ad_markers(body: &str, marker: &str) -> usize {
    if marker.is_empty() {
        return 0;
    }
    body.to_ascii_lowercase()
        .matches(&marker.to_ascii_lowercase())
        .count()
}

/// Absolute URLs of the playlist's media segments, in playlist order.
///
/// Relative URIs are resolved against `playlist_url`; empty URIs are skipped.
pub fn segment_urls(body: &str, playlist_url: &str) -> Result<Vec<Url>, String> {
    let base = Url::parse(playlist_url).map_err(|e| format!("bad playlist url: {e}"))?;
    let playlist = m3u8_rs::parse_media_playlist_res(body.as_bytes())
        .map_err(|e| format!("unparsable media playlist: {e}"))?;

    playlist
        .segments
        .iter()
        .filter(|segment| !segment.uri.trim().is_empty())
        .map(|segment| {
            base.join(segment.uri.trim())
                .map_err(|e| format!("bad segment uri {}: {e}", segment.uri))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIVE: &str = include_str!("../../tests/fixtures/live.m3u8");
    const SINGLE_MARKER: &str = include_str!("../../tests/fixtures/single_marker.m3u8");
    const AD_BREAK: &str = include_str!("../../tests/fixtures/ad_break.m3u8");
    const PLAYLIST_URL: &str = "https://video-weaver.sea02.hls.ttvnw.net/v1/playlist/abc.m3u8";

    #[test]
    fn test_count_ad_markers_fixtures() {
        assert_eq!(count_ad_markers(LIVE, "twitch-ad"), 0);
        assert_eq!(count_ad_markers(SINGLE_MARKER, "twitch-ad"), 1);
        assert!(count_ad_markers(AD_BREAK, "twitch-ad") > 1);
    }

    #[test]
    fn test_count_ad_markers_ignores_case() {
        assert_eq!(count_ad_markers("X-TV-TWITCH-AD-URL twitch-ad", "Twitch-Ad"), 2);
        assert_eq!(count_ad_markers("anything", ""), 0);
    }

    #[test]
    fn test_segment_urls_resolve_relative() {
        let urls = segment_urls(LIVE, PLAYLIST_URL).unwrap();
        assert_eq!(urls.len(), 3);
        assert_eq!(
            urls[0].as_str(),
            "https://video-edge-c2a4b8.sea02.abs.hls.ttvnw.net/v1/segment/CrEFa1.ts"
        );
        assert_eq!(
            urls[2].as_str(),
            "https://video-weaver.sea02.hls.ttvnw.net/v1/playlist/segment/CrEFa3.ts"
        );
    }

    #[test]
    fn test_segment_urls_rejects_garbage() {
        assert!(segment_urls("<html>offline</html>", PLAYLIST_URL).is_err());
    }
}

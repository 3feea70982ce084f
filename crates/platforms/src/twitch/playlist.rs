use m3u8_rs::{MasterPlaylist, VariantStream};

/// Twitch labels the source rendition `chunked`.
const SOURCE_GROUP: &str = "chunked";

/// Pick the best-quality variant: highest bandwidth, source rendition on ties.
/// I-frame-only and audio-only variants are never chosen.
pub fn select_best_variant(master: &MasterPlaylist) -> Option<&VariantStream> {
    master
        .variants
        .iter()
        .filter(|v| !v.is_i_frame && !v.uri.is_empty())
        .filter(|v| v.video.as_deref() != Some("audio_only"))
        .max_by_key(|v| (v.bandwidth, v.video.as_deref() == Some(SOURCE_GROUP)))
}

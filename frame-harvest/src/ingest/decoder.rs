//! First-frame extraction and frame preparation.

use std::io::Cursor;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use tokio::process::Command;
use tracing::debug;

use crate::config::FrameConfig;
use crate::{Error, Result};

/// Decodes the first video frame of a segment file.
#[async_trait]
pub trait FrameDecoder: Send + Sync {
    async fn first_frame(&self, segment: &Path) -> Result<DynamicImage>;
}

/// [`FrameDecoder`] backed by an `ffmpeg` executable.
///
/// ffmpeg writes the first frame as PNG to stdout; nothing touches disk.
pub struct FfmpegFrameDecoder {
    ffmpeg_path: String,
}

impl FfmpegFrameDecoder {
    pub fn with_ffmpeg_path(path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: path.into(),
        }
    }
}

#[async_trait]
impl FrameDecoder for FfmpegFrameDecoder {
    async fn first_frame(&self, segment: &Path) -> Result<DynamicImage> {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-hide_banner")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(segment)
            .args(["-map", "0:v:0"])
            .args(["-frames:v", "1"])
            .args(["-f", "image2pipe", "-vcodec", "png", "-"])
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| Error::Other(format!("Failed to spawn ffmpeg: {e}")))?;
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::Other(format!("Failed to wait for ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::decode(format!(
                "ffmpeg exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(Error::decode("segment has no video frame"));
        }

        debug!(segment = %segment.display(), bytes = output.stdout.len(), "Decoded first frame");
        Ok(image::load_from_memory_with_format(
            &output.stdout,
            ImageFormat::Png,
        )?)
    }
}

/// Validate a decoded frame, resize it to the configured resolution and
/// encode it as JPEG.
pub fn prepare_frame(frame: &DynamicImage, config: &FrameConfig) -> Result<Vec<u8>> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::decode(format!("decoded frame is {width}x{height}")));
    }

    let resized = frame
        .resize_exact(config.width, config.height, FilterType::Triangle)
        .to_rgb8();

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, config.jpeg_quality).encode_image(&resized)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FrameConfig {
        FrameConfig {
            width: 240,
            height: 240,
            jpeg_quality: 90,
        }
    }

    #[test]
    fn test_prepare_frame_resizes_to_target() {
        let frame = DynamicImage::new_rgb8(1280, 720);
        let jpeg = prepare_frame(&frame, &config()).unwrap();

        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (240, 240));
    }

    #[test]
    fn test_prepare_frame_rejects_empty_frame() {
        let frame = DynamicImage::new_rgb8(1280, 0);
        assert!(matches!(
            prepare_frame(&frame, &config()),
            Err(Error::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_an_error() {
        let decoder = FfmpegFrameDecoder::with_ffmpeg_path("/nonexistent/ffmpeg");
        assert!(decoder.first_frame(Path::new("1.ts")).await.is_err());
    }
}

//! Processing backend used by the upload and stats handlers.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use mirage_media::{check_ffmpeg, check_ffprobe, Compressor, MediaResult};
use mirage_models::{CompressionReport, CompressionSettings, VideoData};

/// Compresses stored videos and reports their statistics.
#[async_trait]
pub trait VideoProcessor: Send + Sync {
    /// Compress `input` into `output`.
    async fn compress(&self, input: &Path, output: &Path) -> MediaResult<CompressionReport>;

    /// Statistics for a stored file.
    async fn inspect(&self, path: &Path) -> MediaResult<VideoData>;

    /// Verify that external tools are available.
    fn check_dependencies(&self) -> MediaResult<()> {
        Ok(())
    }
}

/// FFmpeg-backed processor running the idle-aware pipeline.
pub struct FfmpegProcessor {
    settings: CompressionSettings,
    timeout: Duration,
}

impl FfmpegProcessor {
    pub fn new(settings: CompressionSettings, timeout: Duration) -> Self {
        Self { settings, timeout }
    }
}

#[async_trait]
impl VideoProcessor for FfmpegProcessor {
    async fn compress(&self, input: &Path, output: &Path) -> MediaResult<CompressionReport> {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Compressor::new(self.settings.clone())
            .with_timeout(self.timeout.as_secs())
            .with_progress(move |p| {
                debug!(
                    file = %name,
                    frames = p.frames_done,
                    idle = p.frames_idle,
                    "Compression progress: {:.1}%",
                    p.percentage()
                );
            })
            .run(input, output)
            .await
    }

    async fn inspect(&self, path: &Path) -> MediaResult<VideoData> {
        mirage_media::inspect(path).await
    }

    fn check_dependencies(&self) -> MediaResult<()> {
        check_ffmpeg()?;
        check_ffprobe()?;
        Ok(())
    }
}

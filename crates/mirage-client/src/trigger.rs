//! Processing triggers: what happens once a video is selected.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use mirage_models::{BitrateCurve, CompressionReport, VideoData, VideoKind};

use crate::client::MirageClient;
use crate::error::ClientResult;
use crate::session::SelectedVideo;

/// Delay of the simulated trigger.
pub const DEFAULT_SIMULATED_DELAY: Duration = Duration::from_secs(5);

/// Length of the demo bitrate table shown for a simulated result.
pub const PROCESSED_PLACEHOLDER_SECONDS: u64 = 33;

/// Result of processing a selected video.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingOutcome {
    /// Where the processed video can be played from
    pub reference: String,
    /// Name of the processed file on the server
    pub remote_name: Option<String>,
    /// Statistics for the processed side
    pub data: VideoData,
    /// Measured statistics for the original, if the trigger obtained them
    pub original: Option<VideoData>,
    pub report: Option<CompressionReport>,
}

/// Turns a selected video into a processed one.
#[async_trait]
pub trait ProcessingTrigger: Send + Sync {
    async fn process(&self, source: &SelectedVideo) -> ClientResult<ProcessingOutcome>;
}

/// Waits and echoes the selected video back as its own result.
#[derive(Debug, Clone)]
pub struct SimulatedTrigger {
    pub delay: Duration,
}

impl Default for SimulatedTrigger {
    fn default() -> Self {
        Self {
            delay: DEFAULT_SIMULATED_DELAY,
        }
    }
}

impl SimulatedTrigger {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ProcessingTrigger for SimulatedTrigger {
    async fn process(&self, source: &SelectedVideo) -> ClientResult<ProcessingOutcome> {
        info!(video = %source.reference, delay_ms = self.delay.as_millis() as u64, "Simulating processing");
        tokio::time::sleep(self.delay).await;

        Ok(ProcessingOutcome {
            reference: source.reference.clone(),
            remote_name: None,
            data: VideoData::placeholder(source.file_size, PROCESSED_PLACEHOLDER_SECONDS),
            original: None,
            report: None,
        })
    }
}

/// Uploads the selected video to the service.
#[derive(Clone)]
pub struct RemoteTrigger {
    pub client: MirageClient,
}

impl RemoteTrigger {
    pub fn new(client: MirageClient) -> Self {
        Self { client }
    }

    /// Stats for a stored file; the curve is optional for display.
    async fn stats_or_none(&self, kind: VideoKind, filename: &str) -> Option<VideoData> {
        match self.client.video_stats(kind, filename).await {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(file = %filename, kind = %kind, "Could not fetch stats: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl ProcessingTrigger for RemoteTrigger {
    async fn process(&self, source: &SelectedVideo) -> ClientResult<ProcessingOutcome> {
        let upload = self.client.upload(&source.path).await.map_err(|e| {
            warn!(video = %source.reference, "Upload failed: {}", e);
            e
        })?;

        info!(
            processed = %upload.processed_filename,
            codec = %upload.processed_info.codec,
            file_size = upload.processed_info.file_size,
            "{}",
            upload.message
        );

        let info = &upload.processed_info;
        let data = match self
            .stats_or_none(VideoKind::Processed, &upload.processed_filename)
            .await
        {
            Some(data) => data,
            None => VideoData {
                codec: info.codec.clone(),
                file_size: info.file_size,
                width: info.width,
                height: info.height,
                duration: info.duration,
                bitrate_data: BitrateCurve::empty(),
            },
        };

        let original = if upload.original_filename.is_empty() {
            None
        } else {
            self.stats_or_none(VideoKind::Original, &upload.original_filename)
                .await
        };

        Ok(ProcessingOutcome {
            reference: self.client.processed_url(&upload.processed_filename),
            remote_name: Some(upload.processed_filename),
            data,
            original,
            report: upload.report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_simulated_trigger_echoes_input() {
        let source = SelectedVideo {
            path: PathBuf::from("/videos/cam.mp4"),
            reference: "/videos/cam.mp4".to_string(),
            file_size: 1_048_576,
            data: VideoData::placeholder(1_048_576, 38),
        };

        let outcome = SimulatedTrigger::new(Duration::from_millis(1))
            .process(&source)
            .await
            .unwrap();

        assert_eq!(outcome.reference, source.reference);
        assert!(outcome.remote_name.is_none());
        assert_eq!(outcome.data.codec, "...");
        assert_eq!(outcome.data.file_size, 1_048_576);
        assert_eq!(outcome.data.bitrate_data.len(), 33);
        assert!(outcome.report.is_none());
    }

    #[test]
    fn test_default_delay() {
        assert_eq!(SimulatedTrigger::default().delay, Duration::from_secs(5));
    }
}

//! Original-vs-processed comparison state.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use mirage_models::{CompressionReport, VideoData};

use crate::error::{ClientError, ClientResult};
use crate::trigger::{ProcessingOutcome, ProcessingTrigger};

/// Length of the demo bitrate table shown for a freshly selected video.
pub const ORIGINAL_PLACEHOLDER_SECONDS: u64 = 38;

/// The video the user picked.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedVideo {
    pub path: PathBuf,
    /// Reference the original is played from
    pub reference: String,
    pub file_size: u64,
    pub data: VideoData,
}

/// The processed counterpart.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedVideo {
    pub reference: String,
    /// Name of the processed file on the server, if it was uploaded
    pub remote_name: Option<String>,
    pub data: VideoData,
    pub report: Option<CompressionReport>,
}

/// Comparison session: one original, at most one processed result.
#[derive(Debug, Default)]
pub struct CompareSession {
    original: Option<SelectedVideo>,
    processed: Option<ProcessedVideo>,
    processing: bool,
}

impl CompareSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a video. Any previous selection and result are cleared first.
    pub async fn select(&mut self, path: impl AsRef<Path>) -> ClientResult<&SelectedVideo> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(ClientError::InvalidPath(path.display().to_string()));
        }

        if self.original.is_some() {
            debug!("Clearing previous comparison");
            self.reset();
        }

        let file_size = meta.len();
        let selected = SelectedVideo {
            path: path.to_path_buf(),
            reference: path.display().to_string(),
            file_size,
            data: VideoData::placeholder(file_size, ORIGINAL_PLACEHOLDER_SECONDS),
        };

        Ok(self.original.insert(selected))
    }

    /// Replace the original's placeholder statistics with measured ones.
    pub fn set_original_data(&mut self, data: VideoData) -> ClientResult<()> {
        let original = self.original.as_mut().ok_or(ClientError::NoVideoSelected)?;
        original.data = data;
        Ok(())
    }

    /// Mark processing as started and hand out the video to process.
    pub fn begin_processing(&mut self) -> ClientResult<SelectedVideo> {
        let original = self.original.clone().ok_or(ClientError::NoVideoSelected)?;
        self.processed = None;
        self.processing = true;
        Ok(original)
    }

    /// Record the result of processing. On failure the session returns to
    /// its pre-upload state and the error is passed back.
    pub fn finish_processing(
        &mut self,
        result: ClientResult<ProcessingOutcome>,
    ) -> ClientResult<&ProcessedVideo> {
        self.processing = false;

        match result {
            Ok(outcome) => {
                if let (Some(original), Some(data)) = (self.original.as_mut(), outcome.original) {
                    original.data = data;
                }
                Ok(self.processed.insert(ProcessedVideo {
                    reference: outcome.reference,
                    remote_name: outcome.remote_name,
                    data: outcome.data,
                    report: outcome.report,
                }))
            }
            Err(e) => {
                warn!("Processing failed: {}", e);
                self.processed = None;
                Err(e)
            }
        }
    }

    /// Run `trigger` on the selected video.
    pub async fn process(
        &mut self,
        trigger: &dyn ProcessingTrigger,
    ) -> ClientResult<&ProcessedVideo> {
        let source = self.begin_processing()?;
        let result = trigger.process(&source).await;
        self.finish_processing(result)
    }

    /// Clear both sides.
    pub fn reset(&mut self) {
        self.original = None;
        self.processed = None;
        self.processing = false;
    }

    pub fn original(&self) -> Option<&SelectedVideo> {
        self.original.as_ref()
    }

    pub fn processed(&self) -> Option<&ProcessedVideo> {
        self.processed.as_ref()
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// Original's bitrate at a playback position, 0 when nothing is selected.
    pub fn original_bitrate_at(&self, position_secs: f64) -> u64 {
        self.original
            .as_ref()
            .map(|o| o.data.bitrate_at(position_secs))
            .unwrap_or(0)
    }

    /// Processed bitrate at a playback position, 0 when there is no result.
    pub fn processed_bitrate_at(&self, position_secs: f64) -> u64 {
        self.processed
            .as_ref()
            .map(|p| p.data.bitrate_at(position_secs))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::trigger::SimulatedTrigger;

    struct FailingTrigger;

    #[async_trait]
    impl ProcessingTrigger for FailingTrigger {
        async fn process(&self, _source: &SelectedVideo) -> ClientResult<ProcessingOutcome> {
            Err(ClientError::Status {
                status: 500,
                message: "Invalid video file: corrupt".to_string(),
            })
        }
    }

    fn write_clip(dir: &TempDir, name: &str, bytes: usize) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, vec![0u8; bytes]).unwrap();
        path
    }

    #[tokio::test]
    async fn test_select_uses_placeholder_stats() {
        let dir = TempDir::new().unwrap();
        let path = write_clip(&dir, "cam.mp4", 2048);
        let mut session = CompareSession::new();

        let selected = session.select(&path).await.unwrap();
        assert_eq!(selected.file_size, 2048);
        assert_eq!(selected.data.codec, "...");
        assert_eq!(selected.data.bitrate_data.len(), 38);

        assert_eq!(session.original_bitrate_at(0.0), 1000);
        assert_eq!(session.original_bitrate_at(37.9), 38000);
        assert_eq!(session.original_bitrate_at(38.0), 0);
        assert_eq!(session.processed_bitrate_at(1.0), 0);
    }

    #[tokio::test]
    async fn test_simulated_processing() {
        let dir = TempDir::new().unwrap();
        let path = write_clip(&dir, "cam.mp4", 10);
        let mut session = CompareSession::new();
        session.select(&path).await.unwrap();

        let trigger = SimulatedTrigger::new(Duration::from_millis(1));
        let processed = session.process(&trigger).await.unwrap();
        assert_eq!(processed.reference, path.display().to_string());

        assert!(!session.is_processing());
        assert_eq!(session.processed_bitrate_at(32.5), 33000);
        assert_eq!(session.processed_bitrate_at(33.0), 0);
    }

    #[tokio::test]
    async fn test_failure_returns_to_pre_upload_state() {
        let dir = TempDir::new().unwrap();
        let path = write_clip(&dir, "cam.mp4", 10);
        let mut session = CompareSession::new();
        session.select(&path).await.unwrap();

        let err = session.process(&FailingTrigger).await.unwrap_err();
        assert_eq!(err.status(), Some(500));

        assert!(!session.is_processing());
        assert!(session.processed().is_none());
        assert!(session.original().is_some());
    }

    #[tokio::test]
    async fn test_processing_flag() {
        let dir = TempDir::new().unwrap();
        let path = write_clip(&dir, "cam.mp4", 10);
        let mut session = CompareSession::new();

        assert!(matches!(
            session.begin_processing(),
            Err(ClientError::NoVideoSelected)
        ));

        session.select(&path).await.unwrap();
        session.begin_processing().unwrap();
        assert!(session.is_processing());
    }

    #[tokio::test]
    async fn test_new_selection_clears_previous() {
        let dir = TempDir::new().unwrap();
        let first = write_clip(&dir, "first.mp4", 10);
        let second = write_clip(&dir, "second.mp4", 20);
        let mut session = CompareSession::new();

        session.select(&first).await.unwrap();
        session
            .process(&SimulatedTrigger::new(Duration::from_millis(1)))
            .await
            .unwrap();
        assert!(session.processed().is_some());

        session.select(&second).await.unwrap();
        assert!(session.processed().is_none());
        assert_eq!(session.original().map(|o| o.file_size), Some(20));
    }

    #[tokio::test]
    async fn test_select_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut session = CompareSession::new();
        let err = session.select(dir.path().join("gone.mp4")).await.unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
        assert!(session.original().is_none());
    }
}

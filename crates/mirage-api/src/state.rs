//! Application state.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::ApiConfig;
use crate::processor::{FfmpegProcessor, VideoProcessor};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub processor: Arc<dyn VideoProcessor>,
    /// Permits for concurrent compressions
    pub jobs: Arc<Semaphore>,
}

impl AppState {
    /// State backed by the FFmpeg pipeline.
    pub fn new(config: ApiConfig) -> Self {
        let processor = FfmpegProcessor::new(config.compression.clone(), config.processing_timeout);
        Self::with_processor(config, Arc::new(processor))
    }

    /// State with a custom processing backend.
    pub fn with_processor(config: ApiConfig, processor: Arc<dyn VideoProcessor>) -> Self {
        let jobs = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            config,
            processor,
            jobs,
        }
    }
}

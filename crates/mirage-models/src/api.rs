//! HTTP payloads shared by the server and the client.

use serde::{Deserialize, Serialize};

use crate::video::ProcessedInfo;

/// Message returned on a successful upload.
pub const UPLOAD_SUCCESS_MESSAGE: &str = "File uploaded and processed successfully";

/// Body of a successful `POST /api/upload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    /// Sanitized name the upload was stored under
    #[serde(default)]
    pub original_filename: String,
    /// Name to fetch from `GET /api/processed/{name}`
    pub processed_filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_info: Option<ProcessedInfo>,
    pub processed_info: ProcessedInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<CompressionReport>,
}

impl UploadResponse {
    /// Bytes saved by processing, when the original size is known.
    pub fn bytes_saved(&self) -> Option<i64> {
        self.original_info
            .as_ref()
            .map(|o| o.file_size as i64 - self.processed_info.file_size as i64)
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Outcome of one compression run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionReport {
    /// Frames written to the output
    pub frames_total: u64,
    /// Frames classified as idle
    pub frames_idle: u64,
    /// Idle frames that were resolution-degraded
    pub frames_degraded: u64,
    /// Wall-clock processing time
    pub elapsed_ms: u64,
}

impl CompressionReport {
    /// Fraction of frames that were idle, in `[0, 1]`.
    pub fn idle_ratio(&self) -> f64 {
        if self.frames_total == 0 {
            return 0.0;
        }
        self.frames_idle as f64 / self.frames_total as f64
    }
}

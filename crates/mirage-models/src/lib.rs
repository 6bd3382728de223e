//! Shared data models for the Mirage compression service.
//!
//! This crate provides Serde-serializable types for:
//! - Per-video statistics and the per-second bitrate curve
//! - Upload request/response payloads
//! - Compression settings and the idle degradation ladder
//! - Upload filename rules

pub mod api;
pub mod bitrate;
pub mod encoding;
pub mod upload;
pub mod video;

// Re-export common types
pub use api::{CompressionReport, ErrorResponse, UploadResponse, UPLOAD_SUCCESS_MESSAGE};
pub use bitrate::{BitrateCurve, BitratePoint};
pub use encoding::{blur_scale, CompressionSettings};
pub use upload::{content_type_for, is_allowed_file, processed_filename, ALLOWED_EXTENSIONS};
pub use video::{ProcessedInfo, VideoData, VideoKind};

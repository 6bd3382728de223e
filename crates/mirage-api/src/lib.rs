//! Axum HTTP API server.
//!
//! This crate provides:
//! - Upload endpoint that stores a video and runs the idle-aware compression
//! - Range-capable playback of originals and processed outputs
//! - Per-file statistics (codec, size, resolution, bitrate curve)
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod processor;
pub mod routes;
pub mod security;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use processor::{FfmpegProcessor, VideoProcessor};
pub use routes::create_router;
pub use state::AppState;

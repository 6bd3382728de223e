#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper and idle-aware compression pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a runner with progress parsing,
//!   timeouts and cancellation
//! - FFprobe stream inspection and per-second bitrate measurement
//! - Frame-difference motion analysis on raw decoded frames
//! - The compression pipeline: idle frames are progressively degraded,
//!   every frame is downscaled, and the result is re-encoded as H.264

pub mod bitrate;
pub mod command;
pub mod degrade;
pub mod error;
pub mod frames;
pub mod fs_utils;
pub mod idle;
pub mod motion;
pub mod pipeline;
pub mod probe;
pub mod progress;

pub use bitrate::bitrate_curve;
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use frames::{FrameReader, FrameWriter, RgbFrame};
pub use idle::{FrameDecision, IdleTracker};
pub use motion::{GrayFrame, MotionDetector, MotionResult};
pub use pipeline::{compress_video, CancelHandle, Compressor};
pub use probe::{inspect, probe_video, VideoInfo};
pub use progress::{CompressionProgress, CompressionProgressCallback, FfmpegProgress};

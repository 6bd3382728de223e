//! Compression settings and the idle degradation ladder.

use serde::{Deserialize, Serialize};

/// Default output video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default output audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default CRF for the final encode
pub const DEFAULT_CRF: u8 = 23;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "160k";
/// Default audio sample rate (Hz)
pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 44_100;
/// Default audio channel count
pub const DEFAULT_AUDIO_CHANNELS: u8 = 2;

/// Consecutive idle frames before degradation starts
pub const DEFAULT_IDLE_CRITERIA: u32 = 5;
/// Smallest changed region (pixels) that counts as motion
pub const DEFAULT_MIN_MOTION_AREA: u32 = 900;
/// Per-pixel difference above which a pixel counts as changed
pub const DEFAULT_DIFF_THRESHOLD: u8 = 20;
/// Gaussian kernel size applied to the difference image
pub const DEFAULT_BLUR_KERNEL: u8 = 5;
/// 3x3 dilation passes applied to the thresholded difference
pub const DEFAULT_DILATE_ITERATIONS: u8 = 3;
/// Output frame size relative to the source
pub const DEFAULT_OUTPUT_SCALE: f32 = 0.5;

/// Tunables of the idle-aware compression pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionSettings {
    #[serde(default = "default_idle_criteria")]
    pub idle_criteria: u32,

    #[serde(default = "default_min_motion_area")]
    pub min_motion_area: u32,

    #[serde(default = "default_diff_threshold")]
    pub diff_threshold: u8,

    #[serde(default = "default_blur_kernel")]
    pub blur_kernel: u8,

    #[serde(default = "default_dilate_iterations")]
    pub dilate_iterations: u8,

    /// Output frame size relative to the source, in `(0, 1]`
    #[serde(default = "default_output_scale")]
    pub output_scale: f32,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,

    #[serde(default = "default_audio_channels")]
    pub audio_channels: u8,
}

fn default_idle_criteria() -> u32 {
    DEFAULT_IDLE_CRITERIA
}
fn default_min_motion_area() -> u32 {
    DEFAULT_MIN_MOTION_AREA
}
fn default_diff_threshold() -> u8 {
    DEFAULT_DIFF_THRESHOLD
}
fn default_blur_kernel() -> u8 {
    DEFAULT_BLUR_KERNEL
}
fn default_dilate_iterations() -> u8 {
    DEFAULT_DILATE_ITERATIONS
}
fn default_output_scale() -> f32 {
    DEFAULT_OUTPUT_SCALE
}
fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_audio_sample_rate() -> u32 {
    DEFAULT_AUDIO_SAMPLE_RATE
}
fn default_audio_channels() -> u8 {
    DEFAULT_AUDIO_CHANNELS
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            idle_criteria: DEFAULT_IDLE_CRITERIA,
            min_motion_area: DEFAULT_MIN_MOTION_AREA,
            diff_threshold: DEFAULT_DIFF_THRESHOLD,
            blur_kernel: DEFAULT_BLUR_KERNEL,
            dilate_iterations: DEFAULT_DILATE_ITERATIONS,
            output_scale: DEFAULT_OUTPUT_SCALE,
            video_codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            audio_sample_rate: DEFAULT_AUDIO_SAMPLE_RATE,
            audio_channels: DEFAULT_AUDIO_CHANNELS,
        }
    }
}

impl CompressionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `MIRAGE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each
    /// `MIRAGE_*` key. Unparseable values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(value: Option<String>, fallback: T) -> T {
            value.and_then(|v| v.trim().parse().ok()).unwrap_or(fallback)
        }

        let d = Self::default();
        Self {
            idle_criteria: parsed(lookup("MIRAGE_IDLE_CRITERIA"), d.idle_criteria),
            min_motion_area: parsed(lookup("MIRAGE_MIN_MOTION_AREA"), d.min_motion_area),
            diff_threshold: parsed(lookup("MIRAGE_DIFF_THRESHOLD"), d.diff_threshold),
            blur_kernel: parsed(lookup("MIRAGE_BLUR_KERNEL"), d.blur_kernel),
            dilate_iterations: parsed(lookup("MIRAGE_DILATE_ITERATIONS"), d.dilate_iterations),
            output_scale: parsed(lookup("MIRAGE_OUTPUT_SCALE"), d.output_scale),
            video_codec: lookup("MIRAGE_VIDEO_CODEC").unwrap_or(d.video_codec),
            preset: lookup("MIRAGE_PRESET").unwrap_or(d.preset),
            crf: parsed(lookup("MIRAGE_CRF"), d.crf),
            audio_codec: lookup("MIRAGE_AUDIO_CODEC").unwrap_or(d.audio_codec),
            audio_bitrate: lookup("MIRAGE_AUDIO_BITRATE").unwrap_or(d.audio_bitrate),
            audio_sample_rate: parsed(lookup("MIRAGE_AUDIO_SAMPLE_RATE"), d.audio_sample_rate),
            audio_channels: parsed(lookup("MIRAGE_AUDIO_CHANNELS"), d.audio_channels),
        }
    }

    /// Returns a new config with updated CRF.
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    /// Returns a new config with updated output scale.
    pub fn with_output_scale(mut self, scale: f32) -> Self {
        self.output_scale = scale;
        self
    }

    /// Check the settings for values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.idle_criteria == 0 {
            return Err("idle_criteria must be at least 1".to_string());
        }
        if !(self.output_scale > 0.0 && self.output_scale <= 1.0) {
            return Err(format!(
                "output_scale must be in (0, 1], got {}",
                self.output_scale
            ));
        }
        if self.crf > 51 {
            return Err(format!("crf must be in 0..=51, got {}", self.crf));
        }
        if self.blur_kernel % 2 == 0 {
            return Err(format!("blur_kernel must be odd, got {}", self.blur_kernel));
        }
        Ok(())
    }

    /// Output dimensions for a source frame size.
    ///
    /// Dimensions are rounded down to even numbers (required by yuv420p)
    /// and never drop below 2.
    pub fn output_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = |v: u32| {
            let scaled = (v as f32 * self.output_scale) as u32;
            (scaled & !1).max(2)
        };
        (scale(width), scale(height))
    }

    /// Video encoder arguments for the final encode.
    pub fn video_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-preset".to_string(),
            self.preset.clone(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ]
    }

    /// Audio encoder arguments for the final encode.
    pub fn audio_args(&self) -> Vec<String> {
        vec![
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-ar".to_string(),
            self.audio_sample_rate.to_string(),
            "-ac".to_string(),
            self.audio_channels.to_string(),
        ]
    }
}

/// Resolution factor for a frame that has been idle for `idle_frames`
/// consecutive frames.
///
/// Returns `None` until `criteria` is reached. The factor then drops one
/// step each time the idle run doubles; a run exactly on a boundary keeps
/// the milder factor.
pub fn blur_scale(idle_frames: u32, criteria: u32) -> Option<f32> {
    if criteria == 0 || idle_frames < criteria {
        return None;
    }

    const LADDER: [(u32, f32); 5] = [(2, 0.8), (4, 0.6), (8, 0.5), (16, 0.4), (32, 0.2)];

    let idle = idle_frames as u64;
    for (multiple, factor) in LADDER {
        if idle <= multiple as u64 * criteria as u64 {
            return Some(factor);
        }
    }
    Some(0.1)
}

//! Progress reporting for FFmpeg runs and compression jobs.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Output time as string (HH:MM:SS.microseconds)
    pub out_time: String,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Calculate progress percentage given total duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).min(100.0)
    }
}

/// Frame-level progress of a compression job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressionProgress {
    /// Frames written to the encoder so far
    pub frames_done: u64,
    /// Frames expected from duration x fps (0 when unknown)
    pub frames_expected: u64,
    /// Idle frames seen so far
    pub frames_idle: u64,
}

impl CompressionProgress {
    /// Percentage complete, capped at 100. Unknown totals report 0.
    pub fn percentage(&self) -> f64 {
        if self.frames_expected == 0 {
            return 0.0;
        }
        ((self.frames_done as f64 / self.frames_expected as f64) * 100.0).min(100.0)
    }
}

/// Callback type for compression progress updates.
pub type CompressionProgressCallback = Box<dyn Fn(CompressionProgress) + Send + Sync + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_progress_percentage() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            ..Default::default()
        };

        assert!((progress.percentage(10000) - 50.0).abs() < 0.01);
        assert!((progress.percentage(5000) - 100.0).abs() < 0.01);
        assert_eq!(progress.percentage(0), 0.0);
    }

    #[test]
    fn test_compression_progress_percentage() {
        let progress = CompressionProgress {
            frames_done: 30,
            frames_expected: 120,
            frames_idle: 10,
        };
        assert!((progress.percentage() - 25.0).abs() < 0.01);

        // Variable frame rate sources can deliver more frames than estimated.
        let over = CompressionProgress {
            frames_done: 130,
            ..progress
        };
        assert_eq!(over.percentage(), 100.0);
        assert_eq!(CompressionProgress::default().percentage(), 0.0);
    }
}

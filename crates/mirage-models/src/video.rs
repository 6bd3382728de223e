//! Video statistics models.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::bitrate::BitrateCurve;

/// Codec label shown before a file has been inspected.
pub const UNKNOWN_CODEC: &str = "...";

/// Which side of the comparison a stored file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoKind {
    /// The uploaded file as received
    Original,
    /// The compressed output
    Processed,
}

impl VideoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoKind::Original => "original",
            VideoKind::Processed => "processed",
        }
    }

    /// Path segment used by the HTTP API for this kind.
    pub fn route_segment(&self) -> &'static str {
        match self {
            VideoKind::Original => "video",
            VideoKind::Processed => "processed",
        }
    }
}

impl fmt::Display for VideoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "original" | "video" => Ok(VideoKind::Original),
            "processed" => Ok(VideoKind::Processed),
            other => Err(format!("unknown video kind: {}", other)),
        }
    }
}

/// Statistics displayed for one side of the comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoData {
    /// Codec name, or `"..."` when unknown
    pub codec: String,
    /// File size in bytes
    pub file_size: u64,
    /// Frame width in pixels (0 when unknown)
    #[serde(default)]
    pub width: u32,
    /// Frame height in pixels (0 when unknown)
    #[serde(default)]
    pub height: u32,
    /// Duration in seconds (0 when unknown)
    #[serde(default)]
    pub duration: f64,
    /// Per-second bitrate curve
    #[serde(default)]
    pub bitrate_data: BitrateCurve,
}

impl VideoData {
    /// Placeholder stats for a file that has only been selected:
    /// known size, unknown codec, demo bitrate table.
    pub fn placeholder(file_size: u64, seconds: u64) -> Self {
        Self {
            codec: UNKNOWN_CODEC.to_string(),
            file_size,
            width: 0,
            height: 0,
            duration: 0.0,
            bitrate_data: BitrateCurve::placeholder(seconds),
        }
    }

    /// File size in mebibytes.
    pub fn file_size_mb(&self) -> f64 {
        self.file_size as f64 / 1024.0 / 1024.0
    }

    /// `"{height} x {width}"`, the order the stats panel prints it in.
    pub fn resolution_label(&self) -> String {
        format!("{} x {}", self.height, self.width)
    }

    /// Durations above a minute are shown in minutes, otherwise in seconds.
    pub fn duration_label(&self) -> String {
        if self.duration > 60.0 {
            format!("{} Minute", self.duration / 60.0)
        } else {
            format!("{} Seconds", self.duration)
        }
    }

    /// Bitrate at a playback position, in kbps.
    pub fn bitrate_at(&self, position_secs: f64) -> u64 {
        self.bitrate_data.bitrate_at(position_secs)
    }

    /// Render the stats panel as text for a playback position.
    pub fn render_panel(&self, position_secs: f64) -> String {
        format!(
            "Codec: {}\nFile Size: {:.3} MB\nResolution: {}\nDuration: {}\nBitrate: {} Kbps",
            self.codec,
            self.file_size_mb(),
            self.resolution_label(),
            self.duration_label(),
            self.bitrate_at(position_secs),
        )
    }
}

/// Summary of a stored file returned alongside an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedInfo {
    pub codec: String,
    pub file_size: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub duration: f64,
    /// Container bitrate in bits/second
    #[serde(default)]
    pub bitrate: u64,
}

impl From<&VideoData> for ProcessedInfo {
    fn from(data: &VideoData) -> Self {
        Self {
            codec: data.codec.clone(),
            file_size: data.file_size,
            width: data.width,
            height: data.height,
            duration: data.duration,
            bitrate: data.bitrate_data.average() * 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_label() {
        let mut data = VideoData::placeholder(0, 0);
        data.duration = 30.0;
        assert_eq!(data.duration_label(), "30 Seconds");
        data.duration = 60.0;
        assert_eq!(data.duration_label(), "60 Seconds");
        data.duration = 90.0;
        assert_eq!(data.duration_label(), "1.5 Minute");
    }

    #[test]
    fn test_render_panel() {
        let mut data = VideoData::placeholder(3 * 1024 * 1024 / 2, 38);
        data.width = 1920;
        data.height = 1080;
        data.duration = 12.5;

        let panel = data.render_panel(5.4);
        assert!(panel.contains("Codec: ..."));
        assert!(panel.contains("File Size: 1.500 MB"));
        assert!(panel.contains("Resolution: 1080 x 1920"));
        assert!(panel.contains("Duration: 12.5 Seconds"));
        assert!(panel.contains("Bitrate: 6000 Kbps"));
    }

    #[test]
    fn test_video_kind_parsing() {
        assert_eq!("processed".parse::<VideoKind>().unwrap(), VideoKind::Processed);
        assert_eq!("video".parse::<VideoKind>().unwrap(), VideoKind::Original);
        assert!("thumbnail".parse::<VideoKind>().is_err());
        assert_eq!(VideoKind::Processed.route_segment(), "processed");
    }

    #[test]
    fn test_processed_info_deserializes_minimal_body() {
        let info: ProcessedInfo =
            serde_json::from_str(r#"{"codec":"h264","file_size":2048}"#).unwrap();
        assert_eq!(info.codec, "h264");
        assert_eq!(info.file_size, 2048);
        assert_eq!(info.width, 0);
    }
}

//! Per-second bitrate measurement from packet sizes.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use mirage_models::BitrateCurve;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Measure the video stream's bitrate for every second of the file.
pub async fn bitrate_curve(path: impl AsRef<Path>) -> MediaResult<BitrateCurve> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "packet=pts_time,size",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("Packet listing failed on {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let curve = parse_packet_csv(&String::from_utf8_lossy(&output.stdout));
    debug!(
        path = %path.display(),
        seconds = curve.len(),
        peak_kbps = curve.peak(),
        "Measured bitrate curve"
    );

    Ok(curve)
}

/// Parse `pts_time,size` lines. Packets without a timestamp are skipped.
fn parse_packet_csv(csv: &str) -> BitrateCurve {
    let packets = csv.lines().filter_map(|line| {
        let mut fields = line.trim().split(',');
        let pts = fields.next()?.trim().parse::<f64>().ok()?;
        let size = fields.next()?.trim().parse::<u64>().ok()?;
        Some((pts, size))
    });

    BitrateCurve::from_packet_sizes(packets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_packet_csv() {
        let csv = "0.000000,5000\n0.040000,1250\nN/A,900\n1.000000,250,\n\n2.5,125\n";
        let curve = parse_packet_csv(csv);

        assert_eq!(curve.len(), 3);
        assert_eq!(curve.bitrate_at(0.2), 50);
        assert_eq!(curve.bitrate_at(1.0), 2);
        assert_eq!(curve.bitrate_at(2.9), 1);
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_packet_csv("").is_empty());
    }
}

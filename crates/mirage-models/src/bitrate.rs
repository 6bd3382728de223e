//! Per-second bitrate curve.

use serde::{Deserialize, Serialize};

/// Longest curve built from packet timestamps (one day). Packets stamped
/// later than this are ignored.
pub const MAX_CURVE_SECONDS: usize = 86_400;

/// Bitrate of one second of video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitratePoint {
    /// Second offset from the start of the video
    pub timestamp: u64,
    /// Kilobits per second
    pub bitrate: u64,
}

impl BitratePoint {
    pub fn new(timestamp: u64, bitrate: u64) -> Self {
        Self { timestamp, bitrate }
    }
}

/// Ordered sequence of per-second bitrates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BitrateCurve(pub Vec<BitratePoint>);

impl BitrateCurve {
    /// Create an empty curve.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// The fixed demo table shown before any real analysis exists:
    /// second `t` maps to `(t + 1) * 1000` kbps.
    pub fn placeholder(seconds: u64) -> Self {
        Self(
            (0..seconds)
                .map(|t| BitratePoint::new(t, (t + 1) * 1000))
                .collect(),
        )
    }

    /// Build a curve from `(pts_seconds, packet_bytes)` pairs.
    ///
    /// Packets are bucketed by the integer second of their timestamp. Every
    /// second between zero and the last populated second is present, with
    /// zero for seconds that carried no packets. Timestamps at or beyond
    /// [`MAX_CURVE_SECONDS`] are skipped.
    pub fn from_packet_sizes<I>(packets: I) -> Self
    where
        I: IntoIterator<Item = (f64, u64)>,
    {
        let mut buckets: Vec<u64> = Vec::new();

        for (pts, bytes) in packets {
            if !pts.is_finite() || pts < 0.0 || pts >= MAX_CURVE_SECONDS as f64 {
                continue;
            }
            let second = pts.floor() as usize;
            if buckets.len() <= second {
                buckets.resize(second + 1, 0);
            }
            buckets[second] = buckets[second].saturating_add(bytes);
        }

        Self(
            buckets
                .into_iter()
                .enumerate()
                .map(|(second, bytes)| BitratePoint::new(second as u64, bytes.saturating_mul(8) / 1000))
                .collect(),
        )
    }

    /// Bitrate at a playback position.
    ///
    /// The position is floored to a whole second and looked up exactly;
    /// positions without an entry report 0.
    pub fn bitrate_at(&self, position_secs: f64) -> u64 {
        if !position_secs.is_finite() || position_secs < 0.0 {
            return 0;
        }
        let second = position_secs.floor() as u64;
        self.0
            .iter()
            .find(|p| p.timestamp == second)
            .map(|p| p.bitrate)
            .unwrap_or(0)
    }

    /// Mean bitrate over the curve in kbps.
    pub fn average(&self) -> u64 {
        if self.0.is_empty() {
            return 0;
        }
        let total: u128 = self.0.iter().map(|p| p.bitrate as u128).sum();
        (total / self.0.len() as u128) as u64
    }

    /// Highest per-second bitrate in kbps.
    pub fn peak(&self) -> u64 {
        self.0.iter().map(|p| p.bitrate).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn points(&self) -> &[BitratePoint] {
        &self.0
    }
}

impl FromIterator<BitratePoint> for BitrateCurve {
    fn from_iter<T: IntoIterator<Item = BitratePoint>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_floors_position() {
        let curve = BitrateCurve::placeholder(38);
        assert_eq!(curve.bitrate_at(0.0), 1000);
        assert_eq!(curve.bitrate_at(3.99), 4000);
        assert_eq!(curve.bitrate_at(37.2), 38000);
    }

    #[test]
    fn test_lookup_missing_second_is_zero() {
        let curve = BitrateCurve::placeholder(33);
        assert_eq!(curve.bitrate_at(33.0), 0);
        assert_eq!(curve.bitrate_at(-1.0), 0);
        assert_eq!(curve.bitrate_at(f64::NAN), 0);
        assert_eq!(BitrateCurve::empty().bitrate_at(1.0), 0);
    }

    #[test]
    fn test_lookup_is_exact_not_nearest() {
        let curve: BitrateCurve = vec![BitratePoint::new(0, 500), BitratePoint::new(4, 900)]
            .into_iter()
            .collect();
        assert_eq!(curve.bitrate_at(2.5), 0);
        assert_eq!(curve.bitrate_at(4.1), 900);
    }

    #[test]
    fn test_from_packet_sizes_buckets_by_second() {
        let curve = BitrateCurve::from_packet_sizes(vec![
            (0.0, 1000),
            (0.5, 1000),
            (2.25, 500),
            (2.75, 500),
        ]);

        assert_eq!(curve.len(), 3);
        assert_eq!(curve.points()[0], BitratePoint::new(0, 16));
        assert_eq!(curve.points()[1], BitratePoint::new(1, 0));
        assert_eq!(curve.points()[2], BitratePoint::new(2, 8));
    }

    #[test]
    fn test_from_packet_sizes_skips_bad_timestamps() {
        let curve = BitrateCurve::from_packet_sizes(vec![(f64::NAN, 10), (-0.5, 10)]);
        assert!(curve.is_empty());
    }

    #[test]
    fn test_from_packet_sizes_ignores_far_timestamps() {
        let curve = BitrateCurve::from_packet_sizes(vec![(0.5, 1000), (1.0e20, 10), (1.0e9, 10)]);
        assert_eq!(curve.points(), &[BitratePoint::new(0, 8)]);

        let edge = BitrateCurve::from_packet_sizes(vec![(MAX_CURVE_SECONDS as f64 - 0.5, 1000)]);
        assert_eq!(edge.len(), MAX_CURVE_SECONDS);
    }

    #[test]
    fn test_from_packet_sizes_saturates_huge_packets() {
        let curve = BitrateCurve::from_packet_sizes(vec![(0.0, u64::MAX), (0.1, u64::MAX)]);
        assert_eq!(curve.points()[0].bitrate, u64::MAX / 1000);

        let flat: BitrateCurve = vec![BitratePoint::new(0, u64::MAX); 3].into_iter().collect();
        assert_eq!(flat.average(), u64::MAX);
    }

    #[test]
    fn test_average_and_peak() {
        let curve = BitrateCurve::placeholder(3);
        assert_eq!(curve.average(), 2000);
        assert_eq!(curve.peak(), 3000);
        assert_eq!(BitrateCurve::empty().average(), 0);
    }

    #[test]
    fn test_serializes_as_array() {
        let curve = BitrateCurve::placeholder(1);
        let json = serde_json::to_string(&curve).unwrap();
        assert_eq!(json, r#"[{"timestamp":0,"bitrate":1000}]"#);
    }
}

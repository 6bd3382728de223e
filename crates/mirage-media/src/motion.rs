//! Frame-difference motion analysis.
//!
//! Consecutive frames are compared in grayscale: the absolute difference is
//! smoothed, thresholded into a change mask, dilated to merge nearby
//! changes, and split into 8-connected regions. A pair of frames shows
//! motion when any region covers at least the configured area.

use mirage_models::CompressionSettings;

/// Single-channel 8-bit frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl GrayFrame {
    /// Wrap raw luma bytes. Returns `None` when the length does not match.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Frame of a single value.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        let w = self.width as usize;
        self.data[y as usize * w + x as usize] = value;
    }

    /// Per-pixel absolute difference. Frames must share dimensions.
    pub fn abs_diff(&self, other: &GrayFrame) -> GrayFrame {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        GrayFrame {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| a.abs_diff(*b))
                .collect(),
        }
    }

    /// Whether every pixel is zero.
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Separable Gaussian blur with a binomial kernel of odd size `kernel`.
    /// Borders replicate the edge pixel.
    pub fn gaussian_blur(&self, kernel: u8) -> GrayFrame {
        let weights = binomial_row(kernel.max(1) as usize | 1);
        let sum: u32 = weights.iter().sum();
        let radius = (weights.len() / 2) as i64;
        let (w, h) = (self.width as i64, self.height as i64);

        let mut horizontal = vec![0u8; self.data.len()];
        for y in 0..h {
            let row = (y * w) as usize;
            for x in 0..w {
                let mut acc = 0u32;
                for (k, weight) in weights.iter().enumerate() {
                    let sx = (x + k as i64 - radius).clamp(0, w - 1) as usize;
                    acc += *weight * self.data[row + sx] as u32;
                }
                horizontal[row + x as usize] = ((acc + sum / 2) / sum) as u8;
            }
        }

        let mut out = vec![0u8; self.data.len()];
        for y in 0..h {
            for x in 0..w {
                let mut acc = 0u32;
                for (k, weight) in weights.iter().enumerate() {
                    let sy = (y + k as i64 - radius).clamp(0, h - 1);
                    acc += *weight * horizontal[(sy * w + x) as usize] as u32;
                }
                out[(y * w + x) as usize] = ((acc + sum / 2) / sum) as u8;
            }
        }

        GrayFrame {
            width: self.width,
            height: self.height,
            data: out,
        }
    }

    /// Binary mask: 255 where the value exceeds `threshold`, else 0.
    pub fn threshold(&self, threshold: u8) -> GrayFrame {
        GrayFrame {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .map(|&v| if v > threshold { 255 } else { 0 })
                .collect(),
        }
    }

    /// 3x3 dilation (max filter) applied `iterations` times.
    pub fn dilate(&self, iterations: u8) -> GrayFrame {
        let mut current = self.clone();
        let (w, h) = (self.width as usize, self.height as usize);

        for _ in 0..iterations {
            let mut horizontal = vec![0u8; current.data.len()];
            for y in 0..h {
                let row = y * w;
                for x in 0..w {
                    let lo = x.saturating_sub(1);
                    let hi = (x + 1).min(w - 1);
                    horizontal[row + x] = current.data[row + lo..=row + hi]
                        .iter()
                        .copied()
                        .max()
                        .unwrap_or(0);
                }
            }

            let mut out = vec![0u8; current.data.len()];
            for y in 0..h {
                let lo = y.saturating_sub(1);
                let hi = (y + 1).min(h - 1);
                for x in 0..w {
                    out[y * w + x] = (lo..=hi).map(|sy| horizontal[sy * w + x]).max().unwrap_or(0);
                }
            }
            current.data = out;
        }

        current
    }

    /// Pixel counts of the 8-connected non-zero regions, in scan order.
    pub fn region_areas(&self) -> Vec<u32> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut visited = vec![false; self.data.len()];
        let mut areas = Vec::new();
        let mut stack = Vec::new();

        for start in 0..self.data.len() {
            if visited[start] || self.data[start] == 0 {
                continue;
            }

            visited[start] = true;
            stack.push(start);
            let mut area = 0u32;

            while let Some(idx) = stack.pop() {
                area += 1;
                let (x, y) = (idx % w, idx / w);

                for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                        let n = ny * w + nx;
                        if !visited[n] && self.data[n] != 0 {
                            visited[n] = true;
                            stack.push(n);
                        }
                    }
                }
            }

            areas.push(area);
        }

        areas
    }
}

/// Row `n - 1` of Pascal's triangle: the binomial approximation of a
/// Gaussian kernel of size `n`.
fn binomial_row(n: usize) -> Vec<u32> {
    let mut row = vec![1u32];
    for _ in 1..n {
        let mut next = vec![1u32; row.len() + 1];
        for i in 1..row.len() {
            next[i] = row[i - 1] + row[i];
        }
        row = next;
    }
    row
}

/// Outcome of comparing two frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionResult {
    /// Whether any pixel differs at all
    pub changed: bool,
    /// Area of the largest changed region after dilation
    pub largest_region: u32,
    /// Whether the largest region reaches the motion threshold
    pub has_motion: bool,
}

/// Frame-pair motion detector.
#[derive(Debug, Clone)]
pub struct MotionDetector {
    diff_threshold: u8,
    blur_kernel: u8,
    dilate_iterations: u8,
    min_area: u32,
}

impl MotionDetector {
    pub fn new(diff_threshold: u8, blur_kernel: u8, dilate_iterations: u8, min_area: u32) -> Self {
        Self {
            diff_threshold,
            blur_kernel,
            dilate_iterations,
            min_area,
        }
    }

    pub fn from_settings(settings: &CompressionSettings) -> Self {
        Self::new(
            settings.diff_threshold,
            settings.blur_kernel,
            settings.dilate_iterations,
            settings.min_motion_area,
        )
    }

    /// Compare two consecutive frames.
    pub fn analyze(&self, previous: &GrayFrame, next: &GrayFrame) -> MotionResult {
        let diff = previous.abs_diff(next);
        if diff.is_blank() {
            return MotionResult {
                changed: false,
                largest_region: 0,
                has_motion: false,
            };
        }

        let mask = diff
            .gaussian_blur(self.blur_kernel)
            .threshold(self.diff_threshold)
            .dilate(self.dilate_iterations);

        let largest_region = mask.region_areas().into_iter().max().unwrap_or(0);

        MotionResult {
            changed: true,
            largest_region,
            has_motion: largest_region >= self.min_area,
        }
    }
}

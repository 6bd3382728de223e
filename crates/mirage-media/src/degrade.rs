//! Frame resampling: output downscale and idle-frame degradation.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};

use crate::error::{MediaError, MediaResult};
use crate::frames::RgbFrame;

fn to_image(frame: RgbFrame) -> MediaResult<RgbImage> {
    let (width, height) = (frame.width(), frame.height());
    ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(width, height, frame.into_raw())
        .ok_or_else(|| MediaError::internal("Frame buffer does not match its dimensions"))
}

fn from_image(img: RgbImage) -> MediaResult<RgbFrame> {
    let (width, height) = img.dimensions();
    RgbFrame::from_raw(width, height, img.into_raw())
        .ok_or_else(|| MediaError::internal("Resized buffer does not match its dimensions"))
}

/// Produce the output frame for `frame`.
///
/// With a degradation `scale`, the frame is first shrunk to that fraction of
/// its size (bilinear) so detail is lost, then resampled to the output
/// size. Without one it is resampled directly.
pub fn render_frame(
    frame: &RgbFrame,
    scale: Option<f32>,
    out_width: u32,
    out_height: u32,
) -> MediaResult<RgbFrame> {
    let mut img = to_image(frame.clone())?;

    if let Some(scale) = scale {
        let w = ((frame.width() as f32 * scale) as u32).max(1);
        let h = ((frame.height() as f32 * scale) as u32).max(1);
        img = imageops::resize(&img, w, h, FilterType::Triangle);
    }

    if img.dimensions() != (out_width, out_height) {
        img = imageops::resize(&img, out_width, out_height, FilterType::Triangle);
    }

    from_image(img)
}

//! 16:9 frame normalization by centered cropping.
//!
//! Only the axis in excess is cropped, symmetrically, to the floor of the
//! exact 16:9 length; the other axis is kept whole. Frames are never padded
//! or resampled.

use image::RgbImage;
use thiserror::Error;

const ASPECT_W: u32 = 16;
const ASPECT_H: u32 = 9;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("frame {width}x{height} is smaller than one 16x9 unit")]
    FrameTooSmall { width: u32, height: u32 },
}

/// Crop region within the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A frame cropped to 16:9 (within one pixel of floor rounding). Immutable once built.
#[derive(Debug, Clone)]
pub struct NormalizedFrame {
    image: RgbImage,
}

impl NormalizedFrame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Hand the pixel buffer to the next pipeline stage.
    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// Compute the centered 16:9 crop region for the given source dimensions.
pub fn crop_region(width: u32, height: u32) -> Result<CropRegion, NormalizeError> {
    if width < ASPECT_W || height < ASPECT_H {
        return Err(NormalizeError::FrameTooSmall { width, height });
    }

    let (w, h) = (u64::from(width), u64::from(height));
    let (crop_width, crop_height) = if w * u64::from(ASPECT_H) > h * u64::from(ASPECT_W) {
        // Too wide. Fits in u32: strictly less than `width`.
        ((h * u64::from(ASPECT_W) / u64::from(ASPECT_H)) as u32, height)
    } else {
        (width, (w * u64::from(ASPECT_H) / u64::from(ASPECT_W)) as u32)
    };

    Ok(CropRegion {
        x: (width - crop_width) / 2,
        y: (height - crop_height) / 2,
        width: crop_width,
        height: crop_height,
    })
}

/// Crop a raw camera frame to 16:9.
pub fn normalize(frame: RgbImage) -> Result<NormalizedFrame, NormalizeError> {
    let (width, height) = frame.dimensions();
    let region = crop_region(width, height)?;

    if region.width == width && region.height == height {
        return Ok(NormalizedFrame { image: frame });
    }

    tracing::trace!(
        from_width = width,
        from_height = height,
        x = region.x,
        y = region.y,
        width = region.width,
        height = region.height,
        "cropping frame to 16:9"
    );

    let image = image::imageops::crop_imm(&frame, region.x, region.y, region.width, region.height)
        .to_image();
    Ok(NormalizedFrame { image })
}

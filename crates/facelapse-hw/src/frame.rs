//! Frame type and pixel conversion: YUYV (BT.601) and MJPG to RGB.

use image::{ImageFormat, RgbImage};

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Driver buffer sequence number.
    pub sequence: u32,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Average luma (0.0–255.0), BT.601 weights.
    pub fn avg_brightness(&self) -> f32 {
        let count = (self.image.width() * self.image.height()) as usize;
        if count == 0 {
            return 0.0;
        }
        self.image.pixels().map(|p| luma(p.0)).sum::<f32>() / count as f32
    }

    /// True if more than `threshold_pct` of pixels have luma below 32.
    /// Webcams often emit black frames while auto-exposure settles.
    pub fn is_dark(&self, threshold_pct: f32) -> bool {
        let count = (self.image.width() * self.image.height()) as usize;
        if count == 0 {
            return true;
        }
        let dark = self.image.pixels().filter(|p| luma(p.0) < 32.0).count();
        (dark as f32 / count as f32) > threshold_pct
    }
}

fn luma([r, g, b]: [u8; 3]) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Convert packed YUYV (4:2:2) to RGB with BT.601 limited-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if width % 2 != 0 || yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
    ]
}

/// Decode one MJPG buffer.
pub fn mjpg_to_rgb(data: &[u8]) -> Result<RgbImage, FrameError> {
    let decoded = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
        .map_err(|e| FrameError::Decode(e.to_string()))?;
    Ok(decoded.to_rgb8())
}

/// Flip horizontally so the preview behaves like a mirror.
pub fn mirror(image: &mut RgbImage) {
    image::imageops::flip_horizontal_in_place(image);
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("MJPG decode failed: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame(image: RgbImage) -> Frame {
        Frame { image, sequence: 0 }
    }

    #[test]
    fn test_yuyv_to_rgb_neutral_levels() {
        // 2x1 image: black and white on neutral chroma.
        let rgb = yuyv_to_rgb(&[16, 128, 235, 128], 2, 1).unwrap();
        assert_eq!(*rgb.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*rgb.get_pixel(1, 0), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_yuyv_to_rgb_mid_gray() {
        let rgb = yuyv_to_rgb(&[126, 128, 126, 128], 2, 1).unwrap();
        assert_eq!(*rgb.get_pixel(0, 0), Rgb([128, 128, 128]));
    }

    #[test]
    fn test_yuyv_to_rgb_red_chroma() {
        // High V pushes red up and green down.
        let rgb = yuyv_to_rgb(&[81, 90, 81, 240], 2, 1).unwrap();
        let p = rgb.get_pixel(0, 0);
        assert!(p[0] > 200 && p[1] < 60 && p[2] < 60, "{p:?}");
    }

    #[test]
    fn test_yuyv_4x2_dimensions() {
        let yuyv = vec![128u8; 16];
        let rgb = yuyv_to_rgb(&yuyv, 4, 2).unwrap();
        assert_eq!(rgb.dimensions(), (4, 2));
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_rgb(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_mjpg_round_trip_dimensions() {
        let src = RgbImage::from_pixel(32, 18, Rgb([200, 100, 50]));
        let mut jpeg = Vec::new();
        src.write_to(&mut std::io::Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .unwrap();
        let decoded = mjpg_to_rgb(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (32, 18));
    }

    #[test]
    fn test_mjpg_garbage() {
        assert!(matches!(mjpg_to_rgb(b"nope"), Err(FrameError::Decode(_))));
    }

    #[test]
    fn test_mirror() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        mirror(&mut img);
        assert_eq!(*img.get_pixel(2, 0), Rgb([255, 0, 0]));
        assert_eq!(*img.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_dark_frame_detection() {
        assert!(frame(RgbImage::new(10, 10)).is_dark(0.95));
        assert!(!frame(RgbImage::from_pixel(10, 10, Rgb([128, 128, 128]))).is_dark(0.95));

        // 96% dark, 4% bright → dark
        let mut img = RgbImage::from_pixel(25, 4, Rgb([10, 10, 10]));
        for x in 0..4 {
            img.put_pixel(x, 0, Rgb([200, 200, 200]));
        }
        assert!(frame(img).is_dark(0.95));
    }

    #[test]
    fn test_avg_brightness() {
        let f = frame(RgbImage::from_pixel(4, 4, Rgb([100, 100, 100])));
        assert!((f.avg_brightness() - 100.0).abs() < 1e-3);
    }
}

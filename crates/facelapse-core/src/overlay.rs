//! Live guide overlay and the date watermark stamped on captured photos.

use crate::glyphs;
use crate::normalize::NormalizedFrame;
use crate::types::{FaceBox, PositioningVerdict};
use chrono::{NaiveDate, NaiveDateTime};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_hollow_rect_mut,
    draw_line_segment_mut,
};
use imageproc::rect::Rect;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GUIDE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const READY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const ADJUST_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const CROSSHAIR_HALF: f32 = 20.0;
const GUIDE_RADIUS: i32 = 80;
const FACE_DOT_RADIUS: i32 = 5;
const STROKE: i32 = 2;

const TIMESTAMP_SCALE: u32 = 2;
const TIMESTAMP_ORIGIN: (i32, i32) = (10, 16);

const WATERMARK_SCALE: u32 = 4;
const WATERMARK_EDGE: i32 = 20;
const WATERMARK_PADDING: i32 = 10;

/// Draw guide geometry, face boxes and the wall-clock timestamp onto a copy
/// of `frame`.
///
/// Face boxes share one color chosen by the aggregate verdict.
pub fn render_overlay(
    frame: &NormalizedFrame,
    faces: &[FaceBox],
    verdict: &PositioningVerdict,
    now: NaiveDateTime,
) -> RgbImage {
    let mut canvas = frame.image().clone();
    let cx = (canvas.width() / 2) as i32;
    let cy = (canvas.height() / 2) as i32;

    for offset in 0..STROKE {
        let (fx, fy) = (cx as f32, (cy + offset) as f32);
        draw_line_segment_mut(&mut canvas, (fx - CROSSHAIR_HALF, fy), (fx + CROSSHAIR_HALF, fy), WHITE);
        let (fx, fy) = ((cx + offset) as f32, cy as f32);
        draw_line_segment_mut(&mut canvas, (fx, fy - CROSSHAIR_HALF), (fx, fy + CROSSHAIR_HALF), WHITE);
        draw_hollow_circle_mut(&mut canvas, (cx, cy), GUIDE_RADIUS - offset, GUIDE_COLOR);
    }

    let color = if verdict.is_ready() { READY_COLOR } else { ADJUST_COLOR };
    for face in faces {
        draw_face_box(&mut canvas, face, color);
    }

    let stamp = now.format("%Y-%m-%d %H:%M:%S").to_string();
    glyphs::draw_text(
        &mut canvas,
        TIMESTAMP_ORIGIN.0,
        TIMESTAMP_ORIGIN.1,
        &stamp,
        TIMESTAMP_SCALE,
        WHITE,
    );

    canvas
}

fn draw_face_box(canvas: &mut RgbImage, face: &FaceBox, color: Rgb<u8>) {
    let (x, y) = (face.x as i32, face.y as i32);
    for inset in 0..STROKE {
        let w = face.width as i32 - 2 * inset;
        let h = face.height as i32 - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(x + inset, y + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }

    let (fx, fy) = face.center();
    draw_filled_circle_mut(canvas, (fx as i32, fy as i32), FACE_DOT_RADIUS, color);
}

/// Placement of the date watermark within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkLayout {
    /// Top-left corner of the text.
    pub text_x: i32,
    pub text_y: i32,
    pub text_width: u32,
    pub text_height: u32,
    /// Backing rectangle: top-left corner and size.
    pub backing_x: i32,
    pub backing_y: i32,
    pub backing_width: u32,
    pub backing_height: u32,
}

/// Bottom-right layout for `text`: the text's baseline sits 20 px above the
/// bottom edge and its right end 20 px from the right edge, with a 10 px
/// backing margin on every side.
pub fn watermark_layout(width: u32, height: u32, text: &str) -> WatermarkLayout {
    let (text_width, text_height) = glyphs::text_size(text, WATERMARK_SCALE);
    let text_x = width as i32 - text_width as i32 - WATERMARK_EDGE;
    let baseline = height as i32 - WATERMARK_EDGE;
    let text_y = baseline - text_height as i32;

    WatermarkLayout {
        text_x,
        text_y,
        text_width,
        text_height,
        backing_x: text_x - WATERMARK_PADDING,
        backing_y: text_y - WATERMARK_PADDING,
        backing_width: text_width + 2 * WATERMARK_PADDING as u32,
        backing_height: text_height + 2 * WATERMARK_PADDING as u32,
    }
}

/// Stamp `DD/MM/YYYY` in the bottom-right corner over a black backing box.
pub fn stamp_date(image: &mut RgbImage, date: NaiveDate) {
    let text = date.format("%d/%m/%Y").to_string();
    let layout = watermark_layout(image.width(), image.height(), &text);

    let backing = Rect::at(layout.backing_x, layout.backing_y)
        .of_size(layout.backing_width, layout.backing_height);
    draw_filled_rect_mut(image, backing, BLACK);
    glyphs::draw_text(image, layout.text_x, layout.text_y, &text, WATERMARK_SCALE, WHITE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::types::Corrections;

    fn gray_frame() -> NormalizedFrame {
        normalize(RgbImage::from_pixel(640, 360, Rgb([90, 90, 90]))).unwrap()
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn count(img: &RgbImage, color: Rgb<u8>) -> usize {
        img.pixels().filter(|p| **p == color).count()
    }

    #[test]
    fn test_overlay_does_not_touch_source_frame() {
        let frame = gray_frame();
        let _ = render_overlay(&frame, &[], &PositioningVerdict::NoFace, noon());
        assert!(frame.image().pixels().all(|p| *p == Rgb([90, 90, 90])));
    }

    #[test]
    fn test_overlay_draws_guides_at_center() {
        let frame = gray_frame();
        let out = render_overlay(&frame, &[], &PositioningVerdict::NoFace, noon());
        assert_eq!(*out.get_pixel(320, 180), WHITE);
        assert_eq!(*out.get_pixel(335, 180), WHITE);
        // Guide circle crosses the horizontal axis at radius 80.
        assert_eq!(*out.get_pixel(400, 180), GUIDE_COLOR);
        assert!(count(&out, WHITE) > 0);
    }

    #[test]
    fn test_face_color_follows_aggregate_verdict() {
        let frame = gray_frame();
        let faces = [FaceBox::new(100, 100, 60, 60), FaceBox::new(400, 100, 60, 60)];

        let ready = render_overlay(&frame, &faces[..1], &PositioningVerdict::Ready, noon());
        assert_eq!(*ready.get_pixel(100, 100), READY_COLOR);
        assert_eq!(count(&ready, ADJUST_COLOR), 0);

        let multi = render_overlay(&frame, &faces, &PositioningVerdict::MultipleFaces { count: 2 }, noon());
        assert_eq!(*multi.get_pixel(100, 100), ADJUST_COLOR);
        assert_eq!(*multi.get_pixel(400, 100), ADJUST_COLOR);
        assert_eq!(count(&multi, READY_COLOR), 0);

        let adjust = render_overlay(&frame, &faces[..1], &PositioningVerdict::Misaligned(Corrections::default()), noon());
        assert_eq!(*adjust.get_pixel(130, 130), ADJUST_COLOR);
    }

    #[test]
    fn test_face_partially_outside_frame_is_clipped() {
        let frame = gray_frame();
        let faces = [FaceBox::new(600, 330, 200, 200)];
        let out = render_overlay(&frame, &faces, &PositioningVerdict::NoFace, noon());
        assert_eq!(out.dimensions(), (640, 360));
    }

    #[test]
    fn test_watermark_layout_bottom_right() {
        let layout = watermark_layout(1280, 720, "31/12/2024");
        assert_eq!((layout.text_width, layout.text_height), (236, 28));
        assert_eq!(layout.text_x, 1280 - 236 - 20);
        assert_eq!(layout.text_y + layout.text_height as i32, 700);
        assert_eq!(layout.backing_x, layout.text_x - 10);
        assert_eq!(layout.backing_y + layout.backing_height as i32, 710);
        assert_eq!(layout.backing_x + layout.backing_width as i32, 1280 - 10);
    }

    #[test]
    fn test_stamp_date_paints_backing_and_text() {
        let mut img = RgbImage::from_pixel(1280, 720, Rgb([200, 10, 10]));
        stamp_date(&mut img, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        let layout = watermark_layout(1280, 720, "31/12/2024");

        // Backing corner is black, text area contains white.
        assert_eq!(*img.get_pixel(layout.backing_x as u32, layout.backing_y as u32), BLACK);
        assert!(count(&img, WHITE) > 0);
        // Top-left of the image untouched.
        assert_eq!(*img.get_pixel(0, 0), Rgb([200, 10, 10]));
    }

    #[test]
    fn test_stamp_date_on_tiny_image_does_not_panic() {
        let mut img = RgbImage::new(32, 18);
        stamp_date(&mut img, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }
}

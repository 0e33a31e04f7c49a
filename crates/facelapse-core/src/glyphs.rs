//! Embedded 5x7 bitmap glyphs for timestamps and date watermarks.
//!
//! Covers digits and the separators used by the overlay formats. Any other
//! character renders as a blank cell.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

pub const GLYPH_WIDTH: u32 = 5;
pub const GLYPH_HEIGHT: u32 = 7;
const GLYPH_SPACING: u32 = 1;

/// Row bitmaps, most significant of the low 5 bits is the leftmost column.
fn glyph(c: char) -> [u8; 7] {
    match c {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        _ => [0; 7],
    }
}

/// Rendered size of `text` at the given integer scale.
pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let scale = scale.max(1);
    let count = text.chars().count() as u32;
    if count == 0 {
        return (0, 0);
    }
    let width = count * GLYPH_WIDTH * scale + (count - 1) * GLYPH_SPACING * scale;
    (width, GLYPH_HEIGHT * scale)
}

/// Draw `text` with its top-left corner at (`x`, `y`). Pixels outside the
/// image are clipped.
pub fn draw_text(image: &mut RgbImage, x: i32, y: i32, text: &str, scale: u32, color: Rgb<u8>) {
    let scale = scale.max(1);
    let advance = ((GLYPH_WIDTH + GLYPH_SPACING) * scale) as i32;

    for (i, c) in text.chars().enumerate() {
        let origin_x = x + i as i32 * advance;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let px = origin_x + (col * scale) as i32;
                let py = y + (row as u32 * scale) as i32;
                draw_filled_rect_mut(image, Rect::at(px, py).of_size(scale, scale), color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    #[test]
    fn test_text_size() {
        assert_eq!(text_size("", 3), (0, 0));
        assert_eq!(text_size("1", 1), (5, 7));
        // 10 glyphs * 5 + 9 gaps = 59
        assert_eq!(text_size("31/12/2024", 1), (59, 7));
        assert_eq!(text_size("31/12/2024", 4), (236, 28));
    }

    #[test]
    fn test_draw_text_stays_within_measured_box() {
        let mut img = RgbImage::new(100, 40);
        let (w, h) = text_size("12:34", 2);
        draw_text(&mut img, 10, 5, "12:34", 2, WHITE);

        for (x, y, p) in img.enumerate_pixels() {
            if *p == WHITE {
                assert!(x >= 10 && x < 10 + w, "x={x}");
                assert!(y >= 5 && y < 5 + h, "y={y}");
            }
        }
        assert!(img.pixels().any(|p| *p == WHITE));
    }

    #[test]
    fn test_draw_text_clips_at_edges() {
        let mut img = RgbImage::new(8, 8);
        draw_text(&mut img, -3, -3, "8888", 3, WHITE);
        draw_text(&mut img, 6, 6, "8", 3, WHITE);
    }

    #[test]
    fn test_unknown_character_is_blank() {
        let mut img = RgbImage::new(20, 10);
        draw_text(&mut img, 0, 0, "x", 1, WHITE);
        assert!(img.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}

//! Drawing on RGB frames: rectangle outlines and filled strips through
//! imageproc, plus a 5x7 bitmap font. All primitives clip to the image bounds.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const GLYPH_ADVANCE: i32 = 6;

/// `[left, top, right, bottom]` (inclusive) as an imageproc rect, or `None`
/// when the rectangle is empty.
fn to_rect(rect: [i32; 4]) -> Option<Rect> {
    let [left, top, right, bottom] = rect;
    if left > right || top > bottom {
        return None;
    }
    Some(Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32))
}

/// Draw a rectangle outline `thickness` pixels wide, growing inward.
pub(crate) fn draw_rect(image: &mut RgbImage, rect: [i32; 4], color: Rgb<u8>, thickness: u32) {
    let [left, top, right, bottom] = rect;
    for inset in 0..thickness as i32 {
        let Some(ring) = to_rect([left + inset, top + inset, right - inset, bottom - inset]) else {
            break;
        };
        draw_hollow_rect_mut(image, ring, color);
    }
}

/// Fill the inclusive rectangle `[left, top, right, bottom]`.
pub(crate) fn fill_rect(image: &mut RgbImage, rect: [i32; 4], color: Rgb<u8>) {
    if let Some(area) = to_rect(rect) {
        draw_filled_rect_mut(image, area, color);
    }
}

/// Pixel width of `text` at the given scale.
pub(crate) fn text_width(text: &str, scale: u32) -> i32 {
    let chars = text.chars().count() as i32;
    if chars == 0 {
        return 0;
    }
    (chars * GLYPH_ADVANCE - (GLYPH_ADVANCE - GLYPH_WIDTH)) * scale as i32
}

/// Pixel height of one line of text at the given scale.
pub(crate) fn text_height(scale: u32) -> i32 {
    GLYPH_HEIGHT * scale as i32
}

/// Draw `text` with its top-left corner at (`x`, `y`). Letters render upper-case;
/// characters without a glyph advance the cursor without drawing.
pub(crate) fn draw_text(image: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>, scale: u32) {
    let scale = scale.max(1) as i32;
    let mut cursor = x;
    for ch in text.chars().flat_map(char::to_uppercase) {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                        continue;
                    }
                    let px = cursor + col * scale;
                    let py = y + row as i32 * scale;
                    for dy in 0..scale {
                        for dx in 0..scale {
                            put(image, px + dx, py + dy, color);
                        }
                    }
                }
            }
        }
        cursor += GLYPH_ADVANCE * scale;
    }
}

fn put(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
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
        '%' => [0b11000, 0b11001, 0b00010, 0b00100, 0b01000, 0b10011, 0b00011],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        '_' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b11111],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb<u8> = Rgb([255, 0, 0]);

    #[test]
    fn rect_outline_leaves_interior_untouched() {
        let mut image = RgbImage::new(20, 20);
        draw_rect(&mut image, [2, 2, 10, 10], RED, 2);
        assert_eq!(*image.get_pixel(2, 2), RED);
        assert_eq!(*image.get_pixel(3, 6), RED);
        assert_eq!(*image.get_pixel(10, 10), RED);
        assert_eq!(*image.get_pixel(6, 6), Rgb([0, 0, 0]));
    }

    #[test]
    fn drawing_clips_to_image_bounds() {
        let mut image = RgbImage::new(8, 8);
        fill_rect(&mut image, [-3, -3, 2, 2], RED);
        assert_eq!(*image.get_pixel(0, 0), RED);
        assert_eq!(*image.get_pixel(2, 2), RED);
        assert_eq!(*image.get_pixel(3, 3), Rgb([0, 0, 0]));

        let mut outline = RgbImage::new(8, 8);
        draw_rect(&mut outline, [-5, 2, 20, 5], RED, 1);
        assert_eq!(*outline.get_pixel(0, 2), RED);
        assert_eq!(*outline.get_pixel(7, 5), RED);
        assert_eq!(*outline.get_pixel(4, 3), Rgb([0, 0, 0]));

        draw_text(&mut image, 6, 6, "FIRE 99%", RED, 2);
    }

    #[test]
    fn empty_rectangles_draw_nothing() {
        let mut image = RgbImage::new(8, 8);
        fill_rect(&mut image, [5, 5, 4, 6], RED);
        draw_rect(&mut image, [2, 2, 3, 3], RED, 4);
        assert_eq!(*image.get_pixel(5, 5), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(2, 2), RED);
        assert_eq!(image.pixels().filter(|p| **p == RED).count(), 4);
    }

    #[test]
    fn text_metrics_scale() {
        assert_eq!(text_width("", 1), 0);
        assert_eq!(text_width("A", 1), 5);
        assert_eq!(text_width("AB", 1), 11);
        assert_eq!(text_width("AB", 2), 22);
        assert_eq!(text_height(2), 14);
    }

    #[test]
    fn lowercase_text_renders_with_uppercase_glyphs() {
        let mut lower = RgbImage::new(40, 10);
        let mut upper = RgbImage::new(40, 10);
        draw_text(&mut lower, 0, 0, "dog", RED, 1);
        draw_text(&mut upper, 0, 0, "DOG", RED, 1);
        assert_eq!(lower, upper);
        assert!(lower.pixels().any(|p| *p == RED));
    }
}

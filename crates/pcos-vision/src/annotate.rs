//! Draw detections onto a scan.

use image::{Rgb, RgbImage};
use pcos_core::inference::BoundingBox;

/// Outline colour for follicle boxes.
pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Outline width in pixels.
pub const BOX_THICKNESS: u32 = 2;

/// Copy of `image` with every box outlined.
pub fn draw_detections(image: &RgbImage, boxes: &[BoundingBox]) -> RgbImage {
    let mut canvas = image.clone();
    for b in boxes {
        draw_outline(&mut canvas, b, BOX_COLOR, BOX_THICKNESS);
    }
    canvas
}

fn draw_outline(canvas: &mut RgbImage, b: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let clamp_x = |v: f32| (v.max(0.0) as u32).min(width - 1);
    let clamp_y = |v: f32| (v.max(0.0) as u32).min(height - 1);
    let (x1, y1, x2, y2) = (clamp_x(b.x1), clamp_y(b.y1), clamp_x(b.x2), clamp_y(b.y2));

    for t in 0..thickness {
        for x in x1..=x2 {
            canvas.put_pixel(x, (y1 + t).min(y2), color);
            canvas.put_pixel(x, y2.saturating_sub(t).max(y1), color);
        }
        for y in y1..=y2 {
            canvas.put_pixel((x1 + t).min(x2), y, color);
            canvas.put_pixel(x2.saturating_sub(t).max(x1), y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox {
            x1,
            y1,
            x2,
            y2,
            confidence: 0.9,
            class_id: 0,
        }
    }

    #[test]
    fn test_outline_drawn_interior_untouched() {
        let img = RgbImage::new(20, 20);
        let out = draw_detections(&img, &[bbox(2.0, 2.0, 12.0, 12.0)]);

        assert_eq!(out.get_pixel(2, 2), &BOX_COLOR);
        assert_eq!(out.get_pixel(12, 7), &BOX_COLOR);
        assert_eq!(out.get_pixel(7, 7), &Rgb([0, 0, 0]));
        assert_eq!(img.get_pixel(2, 2), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_out_of_bounds_box_is_clamped() {
        let img = RgbImage::new(10, 10);
        let out = draw_detections(&img, &[bbox(-5.0, -5.0, 50.0, 50.0)]);
        assert_eq!(out.get_pixel(0, 0), &BOX_COLOR);
        assert_eq!(out.get_pixel(9, 9), &BOX_COLOR);
    }

    #[test]
    fn test_no_boxes_is_identity() {
        let img = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        assert_eq!(draw_detections(&img, &[]), img);
    }
}

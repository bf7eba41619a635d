//! Detector input preparation.

use image::imageops::FilterType;
use image::{Rgb, RgbImage};

/// Padding colour used by YOLO letterboxing.
pub const LETTERBOX_FILL: u8 = 114;

/// A scan fitted into the detector's square input.
#[derive(Debug, Clone)]
pub struct Letterbox {
    /// NCHW `[1, 3, size, size]`, values in [0, 1]
    pub tensor: Vec<f32>,
    pub size: u32,
    /// Source-to-input scale factor
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    /// Source image dimensions
    pub source_width: u32,
    pub source_height: u32,
}

impl Letterbox {
    /// Tensor shape `[1, 3, size, size]`.
    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.size as usize, self.size as usize]
    }

    /// Map a point in input space back to source pixels, clamped to the image.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let sx = ((x - self.pad_x) / self.scale).clamp(0.0, self.source_width as f32);
        let sy = ((y - self.pad_y) / self.scale).clamp(0.0, self.source_height as f32);
        (sx, sy)
    }
}

/// Resize keeping aspect ratio, centre on a grey square and convert to NCHW.
pub fn letterbox(image: &RgbImage, size: u32) -> Letterbox {
    let (width, height) = image.dimensions();
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, size);

    let resized = image::imageops::resize(image, new_width, new_height, FilterType::Triangle);
    let pad_x = (size - new_width) / 2;
    let pad_y = (size - new_height) / 2;

    let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
    image::imageops::replace(&mut canvas, &resized, i64::from(pad_x), i64::from(pad_y));

    let plane = (size * size) as usize;
    let mut tensor = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let offset = (y * size + x) as usize;
        for channel in 0..3 {
            tensor[channel * plane + offset] = f32::from(pixel[channel]) / 255.0;
        }
    }

    Letterbox {
        tensor,
        size,
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        source_width: width,
        source_height: height,
    }
}

use image::GrayImage;
use stitch::ProbabilitySurface;

use crate::types::BinaryMask;

/// Binarizes a probability surface: `p >= threshold` is foreground.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholder {
    pub threshold: f32,
}

impl Default for Thresholder {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl Thresholder {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn apply(&self, surface: &ProbabilitySurface) -> BinaryMask {
        let values = surface.values();
        BinaryMask::from_fn(surface.width() as u32, surface.height() as u32, |x, y| {
            values[[y as usize, x as usize]] >= self.threshold
        })
    }

    /// Threshold an 8-bit probability image, read as `value / 255`.
    pub fn apply_gray(&self, image: &GrayImage) -> BinaryMask {
        BinaryMask::from_fn(image.width(), image.height(), |x, y| {
            image.get_pixel(x, y).0[0] as f32 / 255.0 >= self.threshold
        })
    }
}

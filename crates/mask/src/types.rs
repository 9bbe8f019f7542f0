use geo::{Area, Polygon};
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

/// Strictly binary `H x W` mask: every pixel is 0 or 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    image: GrayImage,
}

impl BinaryMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self { image: GrayImage::new(width, height) }
    }

    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> bool,
    {
        let image = GrayImage::from_fn(width, height, |x, y| Luma([f(x, y) as u8]));
        Self { image }
    }

    /// Any non-zero pixel is foreground.
    pub fn from_image(image: &GrayImage) -> Self {
        let mut image = image.clone();
        for pixel in image.pixels_mut() {
            pixel.0[0] = (pixel.0[0] > 0) as u8;
        }
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y).0[0] != 0
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.image.put_pixel(x, y, Luma([value as u8]));
    }

    /// Foreground pixel count.
    pub fn count(&self) -> usize {
        self.image.as_raw().iter().filter(|&&v| v != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.image.as_raw().iter().all(|&v| v == 0)
    }

    /// Raw {0,1} image, suitable for `imageproc` labelling.
    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }

    /// {0,255} copy for viewing or saving.
    pub fn to_visible(&self) -> GrayImage {
        let mut image = self.image.clone();
        for pixel in image.pixels_mut() {
            pixel.0[0] = pixel.0[0].saturating_mul(255);
        }
        image
    }

    pub fn inverted(&self) -> Self {
        let mut image = self.image.clone();
        for pixel in image.pixels_mut() {
            pixel.0[0] = 1 - pixel.0[0];
        }
        Self { image }
    }
}

/// Summary of one emitted polygon, handy for logs and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonStats {
    pub area: f64,
    pub exterior_vertices: usize,
    pub hole_count: usize,
}

impl From<&Polygon<f64>> for PolygonStats {
    fn from(polygon: &Polygon<f64>) -> Self {
        Self {
            area: polygon.unsigned_area(),
            exterior_vertices: polygon.exterior().0.len().saturating_sub(1),
            hole_count: polygon.interiors().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    #[test]
    fn test_from_image_binarizes() {
        let image = GrayImage::from_fn(4, 1, |x, _| Luma([(x * 80) as u8]));
        let mask = BinaryMask::from_image(&image);
        assert_eq!(mask.count(), 3);
        assert!(mask.as_image().as_raw().iter().all(|&v| v <= 1));
    }

    #[test]
    fn test_inverted_and_visible() {
        let mask = BinaryMask::from_fn(3, 3, |x, y| x == y);
        assert_eq!(mask.count(), 3);
        assert_eq!(mask.inverted().count(), 6);
        assert_eq!(mask.to_visible().get_pixel(1, 1).0[0], 255);
        assert!(BinaryMask::new(2, 2).is_empty());
    }

    #[test]
    fn test_polygon_stats() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0), (x: 0.0, y: 4.0)];
        let stats = PolygonStats::from(&square);
        assert_eq!(stats.area, 16.0);
        assert_eq!(stats.exterior_vertices, 4);
        assert_eq!(stats.hole_count, 0);
    }
}

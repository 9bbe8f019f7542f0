use image::{ImageBuffer, Luma};
use imageproc::region_labelling::{Connectivity as PixelConnectivity, connected_components};

use crate::{config::Connectivity, types::BinaryMask};

/// One labelled foreground component and its pixel bounding box (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub label: u32,
    pub pixel_count: usize,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub touches_border: bool,
}

/// Connected-component labelling of a binary mask.
pub struct ComponentLabels {
    labels: ImageBuffer<Luma<u32>, Vec<u32>>,
    regions: Vec<Region>,
}

impl ComponentLabels {
    pub fn new(mask: &BinaryMask, connectivity: Connectivity) -> Self {
        let connectivity = match connectivity {
            Connectivity::Four => PixelConnectivity::Four,
            Connectivity::Eight => PixelConnectivity::Eight,
        };
        let labels = connected_components(mask.as_image(), connectivity, Luma([0u8]));
        let regions = collect_regions(&labels);
        Self { labels, regions }
    }

    /// Regions ordered by label, i.e. by first appearance in row-major order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn label_at(&self, x: u32, y: u32) -> u32 {
        self.labels.get_pixel(x, y).0[0]
    }

    /// `None` outside the image.
    pub fn label_at_checked(&self, x: u32, y: u32) -> Option<u32> {
        self.labels.get_pixel_checked(x, y).map(|pixel| pixel.0[0])
    }

    /// Pixel count for `label`; 0 for background or unknown labels.
    pub fn size_of(&self, label: u32) -> usize {
        self.regions
            .binary_search_by_key(&label, |region| region.label)
            .map(|index| self.regions[index].pixel_count)
            .unwrap_or(0)
    }
}

fn collect_regions(labels: &ImageBuffer<Luma<u32>, Vec<u32>>) -> Vec<Region> {
    let (width, height) = labels.dimensions();
    let mut regions: Vec<Region> = Vec::new();

    for (x, y, pixel) in labels.enumerate_pixels() {
        let label = pixel.0[0];
        if label == 0 {
            continue;
        }
        let index = label as usize - 1;
        if index >= regions.len() {
            regions.resize_with(index + 1, || Region {
                label: 0,
                pixel_count: 0,
                min_x: u32::MAX,
                min_y: u32::MAX,
                max_x: 0,
                max_y: 0,
                touches_border: false,
            });
        }
        let region = &mut regions[index];
        region.label = label;
        region.pixel_count += 1;
        region.min_x = region.min_x.min(x);
        region.min_y = region.min_y.min(y);
        region.max_x = region.max_x.max(x);
        region.max_y = region.max_y.max(y);
        region.touches_border |= x == 0 || y == 0 || x + 1 == width || y + 1 == height;
    }

    regions.retain(|region| region.pixel_count > 0);
    regions
}

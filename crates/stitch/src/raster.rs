use image::DynamicImage;
use ndarray::{Array3, ArrayView3};

use crate::{
    config::PaddingMode,
    error::{Result, StitchError},
};

/// Dense `H x W x C` raster with its nominal value range.
///
/// Samples keep their source scale (0..=255 for 8-bit imagery, 0..=65535 for
/// 16-bit); [`Raster::value_range`] is what tiles are divided by before they
/// reach the model.
#[derive(Debug, Clone)]
pub struct Raster {
    data: Array3<f32>,
    value_range: f32,
}

impl Raster {
    /// Wrap an `H x W x C` array. `C` must be 1, 3 or 4.
    pub fn new(data: Array3<f32>, value_range: f32) -> Result<Self> {
        let channels = data.dim().2;
        if !matches!(channels, 1 | 3 | 4) {
            return Err(StitchError::UnsupportedChannels(channels));
        }
        if !(value_range.is_finite() && value_range > 0.0) {
            return Err(StitchError::InvalidConfig(format!(
                "raster value range must be positive, got {value_range}"
            )));
        }
        Ok(Self { data, value_range })
    }

    /// Convert a decoded image, keeping its native bit depth.
    pub fn from_dynamic_image(image: &DynamicImage) -> Result<Self> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let (samples, channels, value_range): (Vec<f32>, usize, f32) = match image {
            DynamicImage::ImageLuma8(img) => (to_f32(img.as_raw()), 1, 255.0),
            DynamicImage::ImageRgb8(img) => (to_f32(img.as_raw()), 3, 255.0),
            DynamicImage::ImageRgba8(img) => (to_f32(img.as_raw()), 4, 255.0),
            DynamicImage::ImageLuma16(img) => (to_f32(img.as_raw()), 1, 65535.0),
            DynamicImage::ImageRgb16(img) => (to_f32(img.as_raw()), 3, 65535.0),
            DynamicImage::ImageRgba16(img) => (to_f32(img.as_raw()), 4, 65535.0),
            DynamicImage::ImageRgb32F(img) => (img.as_raw().clone(), 3, 1.0),
            DynamicImage::ImageRgba32F(img) => (img.as_raw().clone(), 4, 1.0),
            other => return Err(StitchError::UnsupportedChannels(other.color().channel_count() as usize)),
        };

        let data = Array3::from_shape_vec((height, width, channels), samples)?;
        Self::new(data, value_range)
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn channels(&self) -> usize {
        self.data.dim().2
    }

    pub fn value_range(&self) -> f32 {
        self.value_range
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// Extend the bottom and right edges so both axes are at least `min_height` / `min_width`.
    pub fn padded(&self, min_height: usize, min_width: usize, mode: PaddingMode) -> Raster {
        let (height, width, channels) = self.data.dim();
        let target_h = height.max(min_height);
        let target_w = width.max(min_width);
        if target_h == height && target_w == width {
            return self.clone();
        }

        let data = Array3::from_shape_fn((target_h, target_w, channels), |(y, x, c)| {
            match (source_index(y, height, mode), source_index(x, width, mode)) {
                (Some(sy), Some(sx)) => self.data[[sy, sx, c]],
                _ => 0.0,
            }
        });

        Raster { data, value_range: self.value_range }
    }
}

fn to_f32<T: Copy + Into<f32>>(raw: &[T]) -> Vec<f32> {
    raw.iter().map(|&v| v.into()).collect()
}

/// Map an index past the end of an axis of length `len` back into the axis.
fn source_index(i: usize, len: usize, mode: PaddingMode) -> Option<usize> {
    if i < len {
        return Some(i);
    }
    if len == 0 {
        return None;
    }
    match mode {
        PaddingMode::Constant => None,
        PaddingMode::Replicate => Some(len - 1),
        PaddingMode::Reflect => {
            if len == 1 {
                return Some(0);
            }
            let period = 2 * (len - 1);
            let m = i % period;
            Some(if m < len { m } else { period - m })
        }
    }
}

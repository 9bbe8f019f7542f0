use ndarray::{Array4, s};

use crate::{
    model::{InputLayout, batch_buffer},
    raster::Raster,
    window::TileDescriptor,
};

/// One model invocation's worth of tiles.
#[derive(Debug, Clone)]
pub struct TileBatch {
    pub tiles: Vec<TileDescriptor>,
    /// Normalized pixels in the model's input layout
    pub input: Array4<f32>,
}

impl TileBatch {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Cuts tiles out of a padded raster and groups them into fixed-size batches.
///
/// Every tile must lie inside the raster; pad first with [`Raster::padded`].
/// Pixel values are divided by the raster's value range on the way out.
pub struct TileBatcher<'a> {
    raster: &'a Raster,
    tiles: std::slice::Chunks<'a, TileDescriptor>,
    layout: InputLayout,
}

impl<'a> TileBatcher<'a> {
    pub fn new(raster: &'a Raster, tiles: &'a [TileDescriptor], batch_size: usize, layout: InputLayout) -> Self {
        Self {
            raster,
            tiles: tiles.chunks(batch_size.max(1)),
            layout,
        }
    }

    fn build(&self, tiles: &[TileDescriptor]) -> TileBatch {
        let size = tiles.first().map(|t| t.size).unwrap_or(0);
        let channels = self.raster.channels();
        let scale = self.raster.value_range().recip();
        let mut input = batch_buffer(tiles.len(), size, channels, self.layout);

        for (i, tile) in tiles.iter().enumerate() {
            let block = self.raster.view();
            let block = block.slice(s![tile.y..tile.y_end(), tile.x..tile.x_end(), ..]);
            match self.layout {
                InputLayout::Nhwc => {
                    input.slice_mut(s![i, .., .., ..]).zip_mut_with(&block, |dst, &src| *dst = src * scale);
                }
                InputLayout::Nchw => {
                    let chw = block.permuted_axes([2, 0, 1]);
                    input.slice_mut(s![i, .., .., ..]).zip_mut_with(&chw, |dst, &src| *dst = src * scale);
                }
            }
        }

        TileBatch { tiles: tiles.to_vec(), input }
    }
}

impl Iterator for TileBatcher<'_> {
    type Item = TileBatch;

    fn next(&mut self) -> Option<Self::Item> {
        let tiles = self.tiles.next()?;
        Some(self.build(tiles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::plan_tiles;
    use ndarray::Array3;

    fn indexed_raster(height: usize, width: usize, channels: usize) -> Raster {
        let data = Array3::from_shape_fn((height, width, channels), |(y, x, c)| {
            (y * 100 + x * 10 + c) as f32
        });
        Raster::new(data, 1000.0).unwrap()
    }

    #[test]
    fn test_batches_respect_batch_size() {
        let raster = indexed_raster(10, 10, 3);
        let tiles = plan_tiles(10, 10, 4, 1);
        assert_eq!(tiles.len(), 9);

        let sizes: Vec<usize> = TileBatcher::new(&raster, &tiles, 4, InputLayout::Nhwc)
            .map(|b| b.len())
            .collect();
        assert_eq!(sizes, vec![4, 4, 1]);
    }

    #[test]
    fn test_nhwc_tiles_are_normalized_copies() {
        let raster = indexed_raster(8, 8, 3);
        let tiles = vec![TileDescriptor { x: 4, y: 2, size: 4 }];
        let batch = TileBatcher::new(&raster, &tiles, 2, InputLayout::Nhwc).next().unwrap();

        assert_eq!(batch.input.dim(), (1, 4, 4, 3));
        // pixel (y=3, x=5, c=2) of the raster is tile-local (1, 1)
        let expected = (3 * 100 + 5 * 10 + 2) as f32 / 1000.0;
        assert!((batch.input[[0, 1, 1, 2]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_nchw_layout_moves_channels_first() {
        let raster = indexed_raster(4, 4, 3);
        let tiles = plan_tiles(4, 4, 4, 0);
        let batch = TileBatcher::new(&raster, &tiles, 1, InputLayout::Nchw).next().unwrap();

        assert_eq!(batch.input.dim(), (1, 3, 4, 4));
        let expected = (2 * 100 + 3 * 10 + 1) as f32 / 1000.0;
        assert!((batch.input[[0, 1, 2, 3]] - expected).abs() < 1e-6);
    }
}

use std::time::Instant;

use ndarray::{Array2, ArrayView2, s};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    batch::TileBatcher,
    blend::BlendWindow,
    config::InferenceConfig,
    error::Result,
    model::{SegmentationModel, probability_maps},
    raster::Raster,
    window::{TileDescriptor, plan_tiles},
};

/// Floor applied to the weight sum before normalization.
pub const WEIGHT_EPSILON: f32 = 1e-6;

/// Weighted-probability and weight sums over a padded raster.
#[derive(Debug, Clone)]
pub struct AccumulationBuffer {
    weighted: Array2<f32>,
    weights: Array2<f32>,
}

impl AccumulationBuffer {
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            weighted: Array2::zeros((height, width)),
            weights: Array2::zeros((height, width)),
        }
    }

    /// Add `probabilities x window` and `window` at the tile's origin.
    pub fn add(&mut self, tile: &TileDescriptor, probabilities: ArrayView2<'_, f32>, window: &BlendWindow) {
        let (rows, cols) = (tile.y..tile.y_end(), tile.x..tile.x_end());
        let weights = window.weights();

        ndarray::Zip::from(self.weighted.slice_mut(s![rows.clone(), cols.clone()]))
            .and(&probabilities)
            .and(weights)
            .for_each(|acc, &p, &w| *acc += p * w);
        self.weights
            .slice_mut(s![rows, cols])
            .zip_mut_with(weights, |acc, &w| *acc += w);
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    /// Normalize and crop back to the unpadded `height x width`.
    pub fn finish(self, height: usize, width: usize) -> ProbabilitySurface {
        let weighted = self.weighted.slice(s![..height, ..width]);
        let weights = self.weights.slice(s![..height, ..width]);
        let mut values = Array2::zeros((height, width));
        ndarray::Zip::from(&mut values)
            .and(&weighted)
            .and(&weights)
            .for_each(|out, &p, &w| *out = p / w.max(WEIGHT_EPSILON));
        ProbabilitySurface { values }
    }
}

/// Stitched per-pixel foreground probability, `H x W`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilitySurface {
    values: Array2<f32>,
}

impl ProbabilitySurface {
    /// Wrap an existing probability array; non-finite values become 0.
    pub fn new(mut values: Array2<f32>) -> Self {
        sanitize(values.iter_mut());
        Self { values }
    }

    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn get(&self, y: usize, x: usize) -> f32 {
        self.values[[y, x]]
    }

    pub fn into_inner(self) -> Array2<f32> {
        self.values
    }
}

/// Tiling statistics for one inference call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceReport {
    pub tile_count: usize,
    pub batch_count: usize,
    /// `[height, width, channels]` of the unpadded input
    pub image_shape: [usize; 3],
    pub padded_shape: [usize; 2],
    pub non_finite_values: usize,
    pub inference_ms: u64,
    pub config: InferenceConfig,
}

/// Runs a model over overlapping tiles and blends the results into one surface.
#[derive(Debug, Clone)]
pub struct ProbabilityAccumulator {
    config: InferenceConfig,
    window: BlendWindow,
}

impl ProbabilityAccumulator {
    pub fn new(config: InferenceConfig) -> Result<Self> {
        config.validate()?;
        let window = BlendWindow::for_tile(config.tile_size, config.blend);
        Ok(Self { config, window })
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    #[instrument(skip_all, fields(height = raster.height(), width = raster.width(), model = model.name()))]
    pub fn run<M>(&self, raster: &Raster, model: &M) -> Result<(ProbabilitySurface, InferenceReport)>
    where
        M: SegmentationModel + ?Sized,
    {
        let started = Instant::now();
        let tile = self.config.tile_size;
        let (height, width) = (raster.height(), raster.width());

        let padded = raster.padded(tile, tile, self.config.padding);
        let tiles = plan_tiles(padded.height(), padded.width(), tile, self.config.overlap);
        debug!(
            tiles = tiles.len(),
            padded_height = padded.height(),
            padded_width = padded.width(),
            "planned tiles"
        );

        let mut buffer = AccumulationBuffer::new(padded.height(), padded.width());
        let mut report = InferenceReport {
            image_shape: [height, width, raster.channels()],
            padded_shape: [padded.height(), padded.width()],
            config: self.config.clone(),
            ..Default::default()
        };

        let batches = TileBatcher::new(&padded, &tiles, self.config.batch_size, model.input_layout());
        for batch in batches {
            let output = model.predict(batch.input.view())?;
            let mut maps = probability_maps(output, batch.len(), tile)?;
            report.non_finite_values += sanitize(maps.iter_mut());

            for (descriptor, probabilities) in batch.tiles.iter().zip(maps.outer_iter()) {
                buffer.add(descriptor, probabilities, &self.window);
            }
            report.tile_count += batch.len();
            report.batch_count += 1;
            debug!(batch = report.batch_count, tiles = batch.len(), "accumulated batch");
        }

        if report.non_finite_values > 0 {
            warn!(count = report.non_finite_values, "model produced non-finite probabilities, treated as 0");
        }

        let surface = buffer.finish(height, width);
        report.inference_ms = started.elapsed().as_millis() as u64;
        info!(
            tiles = report.tile_count,
            batches = report.batch_count,
            elapsed_ms = report.inference_ms,
            "tiled inference complete"
        );
        Ok((surface, report))
    }
}

/// Replace non-finite values with 0 and return how many were replaced.
fn sanitize<'a>(values: impl Iterator<Item = &'a mut f32>) -> usize {
    let mut replaced = 0;
    for v in values {
        if !v.is_finite() {
            *v = 0.0;
            replaced += 1;
        }
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::PaddingMode,
        error::StitchError,
        model::{InputLayout, LuminanceModel},
    };
    use ndarray::{Array3, Array4, ArrayD, ArrayView4, Axis};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Center-high synthetic predictor: `1 - (x^2 + y^2)` on `[-1, 1]^2`.
    struct DomeModel {
        calls: AtomicUsize,
    }

    impl SegmentationModel for DomeModel {
        fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (n, h, w, _) = batch.dim();
            let coord = |i: usize, len: usize| if len > 1 { -1.0 + 2.0 * i as f32 / (len - 1) as f32 } else { 0.0 };
            let out = Array3::from_shape_fn((n, h, w), |(_, y, x)| {
                let (yy, xx) = (coord(y, h), coord(x, w));
                (1.0 - (xx * xx + yy * yy)).clamp(0.0, 1.0)
            });
            Ok(out.into_dyn())
        }

        fn name(&self) -> &str {
            "dome"
        }
    }

    struct NanModel;

    impl SegmentationModel for NanModel {
        fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
            let (n, h, w, _) = batch.dim();
            Ok(Array4::from_elem((n, h, w, 1), f32::NAN).into_dyn())
        }

        fn name(&self) -> &str {
            "nan"
        }
    }

    struct FlatModel;

    impl SegmentationModel for FlatModel {
        fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
            Ok(batch.index_axis(Axis(3), 0).to_owned().into_dyn())
        }

        fn name(&self) -> &str {
            "flat"
        }
    }

    fn gradient_raster(height: usize, width: usize) -> Raster {
        let data = Array3::from_shape_fn((height, width, 3), |(y, x, _)| ((x * 7 + y * 3) % 256) as f32);
        Raster::new(data, 255.0).unwrap()
    }

    fn config(tile_size: usize, overlap: usize) -> InferenceConfig {
        InferenceConfig {
            tile_size,
            overlap,
            batch_size: 3,
            blend: true,
            padding: PaddingMode::Reflect,
        }
    }

    #[test]
    fn test_weights_cover_every_pixel() {
        for (h, w, tile, overlap) in [(37, 53, 16, 4), (16, 16, 16, 0), (5, 40, 8, 7), (100, 9, 32, 31), (23, 23, 2, 1)] {
            let raster = gradient_raster(h, w);
            let padded = raster.padded(tile, tile, PaddingMode::Reflect);
            let tiles = plan_tiles(padded.height(), padded.width(), tile, overlap);
            let window = BlendWindow::hann(tile);
            let mut buffer = AccumulationBuffer::new(padded.height(), padded.width());
            let zeros = Array2::<f32>::zeros((tile, tile));
            for t in &tiles {
                buffer.add(t, zeros.view(), &window);
            }
            let inside = buffer.weights().slice(s![..h, ..w]);
            assert!(inside.iter().all(|&v| v > 0.0), "zero weight for {h}x{w} tile={tile} overlap={overlap}");
        }
    }

    #[test]
    fn test_single_tile_matches_raw_output() {
        let raster = gradient_raster(20, 30);
        let accumulator = ProbabilityAccumulator::new(config(32, 8)).unwrap();
        let model = DomeModel { calls: AtomicUsize::new(0) };
        let (surface, report) = accumulator.run(&raster, &model).unwrap();

        assert_eq!(report.tile_count, 1);
        assert_eq!((surface.height(), surface.width()), (20, 30));

        let padded = raster.padded(32, 32, PaddingMode::Reflect);
        let batch = TileBatcher::new(&padded, &plan_tiles(32, 32, 32, 8), 1, InputLayout::Nhwc)
            .next()
            .unwrap();
        let raw = model.predict(batch.input.view()).unwrap();
        for y in 0..20 {
            for x in 0..30 {
                assert!((surface.get(y, x) - raw[[0, y, x]]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_constant_prediction_is_preserved_across_seams() {
        let data = Array3::from_elem((45, 61, 1), 153.0);
        let raster = Raster::new(data, 255.0).unwrap();
        let accumulator = ProbabilityAccumulator::new(config(16, 5)).unwrap();
        let (surface, report) = accumulator.run(&raster, &LuminanceModel::default()).unwrap();

        assert!(report.tile_count > 1);
        assert_eq!(report.batch_count, report.tile_count.div_ceil(3));
        assert!(surface.values().iter().all(|&p| (p - 0.6).abs() < 1e-4));
    }

    #[test]
    fn test_batch_order_does_not_change_result() {
        let raster = gradient_raster(50, 41);
        let small = ProbabilityAccumulator::new(InferenceConfig { batch_size: 1, ..config(16, 6) }).unwrap();
        let large = ProbabilityAccumulator::new(InferenceConfig { batch_size: 64, ..config(16, 6) }).unwrap();
        let (a, _) = small.run(&raster, &FlatModel).unwrap();
        let (b, _) = large.run(&raster, &FlatModel).unwrap();
        for (x, y) in a.values().iter().zip(b.values().iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_non_finite_outputs_become_zero() {
        let raster = gradient_raster(10, 10);
        let accumulator = ProbabilityAccumulator::new(config(8, 2)).unwrap();
        let (surface, report) = accumulator.run(&raster, &NanModel).unwrap();
        assert!(surface.values().iter().all(|&p| p == 0.0));
        assert_eq!(report.non_finite_values, report.tile_count * 64);
    }

    #[test]
    fn test_bad_output_shape_is_fatal() {
        struct TwoClassModel;
        impl SegmentationModel for TwoClassModel {
            fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
                let (n, h, w, _) = batch.dim();
                Ok(Array4::<f32>::zeros((n, h, w, 2)).into_dyn())
            }
            fn name(&self) -> &str {
                "two-class"
            }
        }

        let accumulator = ProbabilityAccumulator::new(config(8, 2)).unwrap();
        let result = accumulator.run(&gradient_raster(10, 10), &TwoClassModel);
        assert!(matches!(result, Err(StitchError::ModelOutputShape { .. })));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(ProbabilityAccumulator::new(config(8, 8)).is_err());
    }
}

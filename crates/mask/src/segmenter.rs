use std::time::Instant;

use geojson::{FeatureCollection, JsonObject};
use serde::{Deserialize, Serialize};
use stitch::{InferenceReport, ProbabilityAccumulator, ProbabilitySurface, Raster, SegmentationModel};
use tracing::{info, instrument};

use crate::{config::SegmentationConfig, error::Result, pipeline::Pipeline};

/// Timings and counts for one end-to-end segmentation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentationReport {
    pub inference: InferenceReport,
    pub threshold: f32,
    pub feature_count: usize,
    pub postprocess_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SegmentationOutput {
    pub collection: FeatureCollection,
    pub report: SegmentationReport,
}

/// Tiled inference followed by the raster-to-vector pipeline.
///
/// Holds no per-call state, so one instance can serve many rasters.
pub struct Segmenter {
    accumulator: ProbabilityAccumulator,
    pipeline: Pipeline,
    threshold: f32,
}

impl Segmenter {
    pub fn from_config(config: &SegmentationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            accumulator: ProbabilityAccumulator::new(config.inference.clone())?,
            pipeline: Pipeline::from_config(config)?,
            threshold: config.threshold,
        })
    }

    /// Pair an accumulator with a custom pipeline.
    pub fn new(accumulator: ProbabilityAccumulator, pipeline: Pipeline, threshold: f32) -> Self {
        Self { accumulator, pipeline, threshold }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Probability surface only, without vectorization.
    pub fn predict<M>(&self, raster: &Raster, model: &M) -> Result<(ProbabilitySurface, InferenceReport)>
    where
        M: SegmentationModel + ?Sized,
    {
        Ok(self.accumulator.run(raster, model)?)
    }

    #[instrument(skip_all, fields(height = raster.height(), width = raster.width(), model = model.name()))]
    pub fn run<M>(&self, raster: &Raster, model: &M, properties: &JsonObject) -> Result<SegmentationOutput>
    where
        M: SegmentationModel + ?Sized,
    {
        let started = Instant::now();
        let (surface, inference) = self.predict(raster, model)?;

        let post_started = Instant::now();
        let collection = self.pipeline.vectorize(&surface, properties)?;
        let postprocess_ms = post_started.elapsed().as_millis() as u64;

        let report = SegmentationReport {
            inference,
            threshold: self.threshold,
            feature_count: collection.features.len(),
            postprocess_ms,
            total_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            features = report.feature_count,
            inference_ms = report.inference.inference_ms,
            postprocess_ms = report.postprocess_ms,
            total_ms = report.total_ms,
            "segmentation complete"
        );
        Ok(SegmentationOutput { collection, report })
    }
}

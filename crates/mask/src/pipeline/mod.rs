pub mod builder;

use geo::Polygon;
use geojson::{FeatureCollection, JsonObject};
use stitch::ProbabilitySurface;
use tracing::{debug, instrument};

use crate::{
    algorithms::{GeometryPostProcessor, Thresholder},
    config::SegmentationConfig,
    error::Result,
    io::VectorSerializer,
    traits::{MaskProcessor, RegionExtractor, ShapePostProcessor},
    types::BinaryMask,
};

/// Raster-to-vector pipeline: threshold, clean, polygonize, postprocess, serialize.
pub struct Pipeline {
    thresholder: Thresholder,
    mask_processors: Vec<Box<dyn MaskProcessor>>,
    extractor: Box<dyn RegionExtractor>,
    geometry: GeometryPostProcessor,
    serializer: VectorSerializer,
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder() -> builder::PipelineBuilder {
        builder::PipelineBuilder::new()
    }

    /// Build the stage list a configuration describes.
    pub fn from_config(config: &SegmentationConfig) -> Result<Self> {
        config.validate()?;
        Ok(builder::PipelineBuilder::from_config(config).build())
    }

    pub fn new(
        thresholder: Thresholder,
        mask_processors: Vec<Box<dyn MaskProcessor>>,
        extractor: Box<dyn RegionExtractor>,
        geometry: GeometryPostProcessor,
        serializer: VectorSerializer,
    ) -> Self {
        Self {
            thresholder,
            mask_processors,
            extractor,
            geometry,
            serializer,
        }
    }

    pub fn threshold(&self, surface: &ProbabilitySurface) -> BinaryMask {
        self.thresholder.apply(surface)
    }

    pub fn clean(&self, mask: &BinaryMask) -> Result<BinaryMask> {
        let mut current = mask.clone();
        for processor in &self.mask_processors {
            current = processor.process(&current)?;
            debug!(stage = processor.name(), foreground = current.count(), "Mask stage");
        }
        Ok(current)
    }

    /// Clean, extract and postprocess a binary mask into pixel-space polygons.
    pub fn polygonize(&self, mask: &BinaryMask) -> Result<Vec<Polygon<f64>>> {
        let cleaned = self.clean(mask)?;
        let polygons = self.extractor.extract(&cleaned)?;
        debug!(extractor = self.extractor.name(), polygons = polygons.len(), "Extracted regions");
        self.geometry.process(polygons)
    }

    /// Vectorize an already binary mask.
    #[instrument(skip_all, fields(width = mask.width(), height = mask.height()))]
    pub fn vectorize_mask(&self, mask: &BinaryMask, properties: &JsonObject) -> Result<FeatureCollection> {
        let polygons = self.polygonize(mask)?;
        Ok(self
            .serializer
            .to_feature_collection(&polygons, properties, mask.width(), mask.height()))
    }

    /// Threshold a probability surface and vectorize the result.
    pub fn vectorize(&self, surface: &ProbabilitySurface, properties: &JsonObject) -> Result<FeatureCollection> {
        let mask = self.threshold(surface);
        self.vectorize_mask(&mask, properties)
    }

    /// Get information about the pipeline configuration
    pub fn info(&self) -> String {
        let masks: Vec<&str> = self.mask_processors.iter().map(|p| p.name()).collect();
        let shapes = self.geometry.stage_names();
        format!(
            "Pipeline: threshold {} -> mask [{}] -> {} -> shapes [{}]",
            self.thresholder.threshold,
            masks.join(", "),
            self.extractor.name(),
            shapes.join(", ")
        )
    }
}

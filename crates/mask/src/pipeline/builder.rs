use crate::{
    algorithms::{
        GeometryPostProcessor, GeometrySettings, MaskCleaner, MorphologySmoother, Polygonizer,
        SmallHoleFiller, SmallObjectRemover, Thresholder,
    },
    config::{Connectivity, ExtractionMode, Georeference, MorphologyMode, SegmentationConfig, TopologyMode},
    io::VectorSerializer,
    pipeline::Pipeline,
    traits::{MaskProcessor, RegionExtractor, ShapePostProcessor},
};

/// Builder for creating processing pipelines with a fluent API.
///
/// Shape stages always run in the same order regardless of call order:
/// buffer, simplify, hole filter, area filter, custom stages, topology merge,
/// final area filter.
pub struct PipelineBuilder {
    threshold: f32,
    connectivity: Connectivity,
    extraction: ExtractionMode,
    mask_processors: Vec<Box<dyn MaskProcessor>>,
    extractor: Option<Box<dyn RegionExtractor>>,
    buffer_distance: f64,
    simplify_tolerance: f64,
    hole_removal: Option<f64>,
    min_area: f64,
    custom_postprocessors: Vec<Box<dyn ShapePostProcessor>>,
    topology: TopologyMode,
    georeference: Option<Georeference>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            threshold: 0.5,
            connectivity: Connectivity::Four,
            extraction: ExtractionMode::Trace,
            mask_processors: Vec::new(),
            extractor: None,
            buffer_distance: 0.0,
            simplify_tolerance: 0.0,
            hole_removal: None,
            min_area: 0.0,
            custom_postprocessors: Vec::new(),
            topology: TopologyMode::Preserve,
            georeference: None,
        }
    }

    /// Start from a full configuration; further calls refine it.
    pub fn from_config(config: &SegmentationConfig) -> Self {
        let post = &config.postprocess;
        let mut builder = Self::new()
            .threshold(config.threshold)
            .connectivity(post.connectivity)
            .extraction(post.extraction)
            .with_buffer(post.buffer_distance)
            .with_simplification(post.simplify_tolerance)
            .with_min_area(post.min_area)
            .with_topology(post.topology);

        let cleaner = MaskCleaner::from_config(&post.morphology, post.connectivity);
        builder.mask_processors.extend(cleaner.into_steps());

        if post.remove_holes {
            builder = builder.with_hole_removal(post.min_hole_area);
        }
        if let Some(georeference) = &post.georeference {
            builder = builder.with_georeference(georeference.clone());
        }
        builder
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Connectivity for labelling and for the built-in mask stages added afterwards
    pub fn connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn extraction(mut self, extraction: ExtractionMode) -> Self {
        self.extraction = extraction;
        self
    }

    /// Add a mask processor; mask stages run in insertion order
    pub fn add_mask_processor<P>(mut self, processor: P) -> Self
    where
        P: MaskProcessor + 'static,
    {
        self.mask_processors.push(Box::new(processor));
        self
    }

    pub fn with_morphology(self, mode: MorphologyMode, kernel_size: u32, iterations: u32) -> Self {
        if mode == MorphologyMode::None {
            return self;
        }
        let kernel_size = if kernel_size % 2 == 0 { kernel_size + 1 } else { kernel_size };
        self.add_mask_processor(MorphologySmoother { mode, kernel_size, iterations })
    }

    pub fn with_min_object_area(self, min_area: usize) -> Self {
        let connectivity = self.connectivity;
        self.add_mask_processor(SmallObjectRemover { min_area, connectivity })
    }

    /// Fill mask holes smaller than `max_area` pixels (0 fills all)
    pub fn with_hole_filling(self, max_area: usize) -> Self {
        let connectivity = self.connectivity;
        self.add_mask_processor(SmallHoleFiller { max_area, connectivity })
    }

    /// Replace the built-in polygonizer
    pub fn set_extractor<E>(mut self, extractor: E) -> Self
    where
        E: RegionExtractor + 'static,
    {
        self.extractor = Some(Box::new(extractor));
        self
    }

    pub fn with_buffer(mut self, distance: f64) -> Self {
        self.buffer_distance = distance;
        self
    }

    pub fn with_simplification(mut self, tolerance: f64) -> Self {
        self.simplify_tolerance = tolerance;
        self
    }

    /// Drop interior rings below `min_hole_area` (0 drops every hole)
    pub fn with_hole_removal(mut self, min_hole_area: f64) -> Self {
        self.hole_removal = Some(min_hole_area);
        self
    }

    pub fn with_min_area(mut self, min_area: f64) -> Self {
        self.min_area = min_area;
        self
    }

    /// Add a shape stage that runs after the per-polygon stages and before the merge
    pub fn add_postprocessor<P>(mut self, postprocessor: P) -> Self
    where
        P: ShapePostProcessor + 'static,
    {
        self.custom_postprocessors.push(Box::new(postprocessor));
        self
    }

    pub fn with_topology(mut self, topology: TopologyMode) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_georeference(mut self, georeference: Georeference) -> Self {
        self.georeference = Some(georeference);
        self
    }

    pub fn build(self) -> Pipeline {
        // A growing buffer can lift small regions over the area threshold.
        let prefilter = if self.buffer_distance > 0.0 { 0.0 } else { self.min_area };
        let extractor = self.extractor.unwrap_or_else(|| {
            Box::new(Polygonizer {
                mode: self.extraction,
                connectivity: self.connectivity,
                min_area: prefilter,
            })
        });

        let geometry = GeometryPostProcessor::new(
            GeometrySettings {
                buffer_distance: self.buffer_distance,
                simplify_tolerance: self.simplify_tolerance,
                hole_removal: self.hole_removal,
                min_area: self.min_area,
                topology: self.topology,
            },
            self.custom_postprocessors,
        );

        Pipeline::new(
            Thresholder::new(self.threshold),
            self.mask_processors,
            extractor,
            geometry,
            VectorSerializer::new(self.georeference),
        )
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

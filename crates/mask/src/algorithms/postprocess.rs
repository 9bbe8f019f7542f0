use geo::Polygon;
use tracing::debug;

use crate::{
    algorithms::{AreaFilter, BufferProcessor, HoleFilter, TopologyMerger, TopologyPreservingSimplifier},
    config::{PostprocessConfig, TopologyMode},
    error::Result,
    traits::ShapePostProcessor,
};

/// Per-polygon buffer, simplify, hole filter and area filter, then the
/// whole-set topology merge and a final area filter.
pub struct GeometryPostProcessor {
    stages: Vec<Box<dyn ShapePostProcessor>>,
}

/// Numeric knobs of [`GeometryPostProcessor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometrySettings {
    pub buffer_distance: f64,
    pub simplify_tolerance: f64,
    /// `Some(min_hole_area)` enables hole removal
    pub hole_removal: Option<f64>,
    pub min_area: f64,
    pub topology: TopologyMode,
}

impl From<&PostprocessConfig> for GeometrySettings {
    fn from(config: &PostprocessConfig) -> Self {
        Self {
            buffer_distance: config.buffer_distance,
            simplify_tolerance: config.simplify_tolerance,
            hole_removal: config.remove_holes.then_some(config.min_hole_area),
            min_area: config.min_area,
            topology: config.topology,
        }
    }
}

impl GeometryPostProcessor {
    pub fn from_config(config: &PostprocessConfig) -> Self {
        Self::new(GeometrySettings::from(config), Vec::new())
    }

    /// `custom` stages run after the per-polygon stages and before the merge.
    pub fn new(settings: GeometrySettings, custom: Vec<Box<dyn ShapePostProcessor>>) -> Self {
        let mut stages: Vec<Box<dyn ShapePostProcessor>> = Vec::new();
        if settings.buffer_distance != 0.0 {
            stages.push(Box::new(BufferProcessor { distance: settings.buffer_distance }));
        }
        if settings.simplify_tolerance > 0.0 {
            stages.push(Box::new(TopologyPreservingSimplifier::new(settings.simplify_tolerance)));
        }
        if let Some(min_area) = settings.hole_removal {
            stages.push(Box::new(HoleFilter { min_area }));
        }
        stages.push(Box::new(AreaFilter { min_area: settings.min_area }));
        stages.extend(custom);
        if settings.topology != TopologyMode::None {
            stages.push(Box::new(TopologyMerger { mode: settings.topology }));
            stages.push(Box::new(AreaFilter { min_area: settings.min_area }));
        }
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl ShapePostProcessor for GeometryPostProcessor {
    fn process(&self, mut polygons: Vec<Polygon<f64>>) -> Result<Vec<Polygon<f64>>> {
        for stage in &self.stages {
            polygons = stage.process(polygons)?;
            debug!(stage = stage.name(), polygons = polygons.len(), "Shape stage");
        }
        Ok(polygons)
    }

    fn name(&self) -> &str {
        "geometry"
    }
}

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use stitch::InferenceConfig;

use crate::error::{MaskError, Result};

/// Morphological smoothing applied to the binary mask before labelling.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MorphologyMode {
    #[default]
    None,
    /// Erode then dilate; removes thin protrusions
    Open,
    /// Dilate then erode; fills narrow gaps
    Close,
}

/// Whole-set merge applied after per-polygon postprocessing.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TopologyMode {
    /// Union without extra repair
    #[default]
    Preserve,
    /// Union followed by a self-intersection repair pass
    Clean,
    /// Pass polygons through as extracted
    None,
}

/// Pixel adjacency used when labelling foreground components.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Connectivity {
    #[default]
    Four,
    Eight,
}

impl Connectivity {
    /// Adjacency of the background when this one is used for the foreground.
    pub fn complement(self) -> Self {
        match self {
            Connectivity::Four => Connectivity::Eight,
            Connectivity::Eight => Connectivity::Four,
        }
    }
}

/// How a labelled component becomes a polygon.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExtractionMode {
    /// Exact pixel-boundary tracing with holes
    #[default]
    Trace,
    /// Convex hull of the component's pixels. Lossy for concave regions.
    ConvexHull,
}

/// Mask-level cleaning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MorphologyConfig {
    pub mode: MorphologyMode,
    /// Structuring element size in pixels; even sizes are bumped to the next odd one
    #[schemars(range(min = 1))]
    pub kernel_size: u32,
    #[schemars(range(min = 1))]
    pub iterations: u32,
    /// Foreground components with fewer pixels are erased
    pub min_object_area: u32,
    /// Background holes with fewer pixels are filled; 0 fills every hole
    pub min_hole_area: u32,
    pub remove_holes: bool,
}

impl Default for MorphologyConfig {
    fn default() -> Self {
        Self {
            mode: MorphologyMode::None,
            kernel_size: 3,
            iterations: 1,
            min_object_area: 0,
            min_hole_area: 0,
            remove_holes: false,
        }
    }
}

impl MorphologyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kernel_size == 0 {
            return Err(MaskError::InvalidConfig("kernel_size must be at least 1".to_string()));
        }
        if self.iterations == 0 {
            return Err(MaskError::InvalidConfig("iterations must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Kernel size actually used: odd and at least 1.
    pub fn effective_kernel_size(&self) -> u32 {
        let size = self.kernel_size.max(1);
        if size % 2 == 0 { size + 1 } else { size }
    }
}

/// Affine pixel-to-world transform in GDAL coefficient order.
///
/// `X = c[0] + col * c[1] + row * c[2]`, `Y = c[3] + col * c[4] + row * c[5]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Georeference {
    pub transform: [f64; 6],
    /// Coordinate reference system name, e.g. `EPSG:4326`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
}

impl Georeference {
    pub fn identity() -> Self {
        Self {
            transform: [0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            crs: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.transform.iter().any(|c| !c.is_finite()) {
            return Err(MaskError::InvalidConfig("georeference transform must be finite".to_string()));
        }
        let [_, a, b, _, d, e] = self.transform;
        if (a * e - b * d).abs() < f64::EPSILON {
            return Err(MaskError::InvalidConfig("georeference transform is singular".to_string()));
        }
        Ok(())
    }
}

/// Raster-to-vector parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PostprocessConfig {
    pub morphology: MorphologyConfig,
    /// Polygons smaller than this (in squared pixels) are dropped
    pub min_area: f64,
    /// Douglas-Peucker tolerance in pixels; 0 disables simplification
    pub simplify_tolerance: f64,
    /// Buffer distance in pixels; 0 disables buffering
    pub buffer_distance: f64,
    pub remove_holes: bool,
    /// Interior rings below this area are dropped when `remove_holes` is set; 0 drops all
    pub min_hole_area: f64,
    pub topology: TopologyMode,
    pub connectivity: Connectivity,
    pub extraction: ExtractionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub georeference: Option<Georeference>,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            morphology: MorphologyConfig::default(),
            min_area: 0.0,
            simplify_tolerance: 0.0,
            buffer_distance: 0.0,
            remove_holes: false,
            min_hole_area: 0.0,
            topology: TopologyMode::Preserve,
            connectivity: Connectivity::Four,
            extraction: ExtractionMode::Trace,
            georeference: None,
        }
    }
}

impl PostprocessConfig {
    pub fn validate(&self) -> Result<()> {
        self.morphology.validate()?;
        for (name, value) in [
            ("min_area", self.min_area),
            ("simplify_tolerance", self.simplify_tolerance),
            ("min_hole_area", self.min_hole_area),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MaskError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if !self.buffer_distance.is_finite() {
            return Err(MaskError::InvalidConfig("buffer_distance must be finite".to_string()));
        }
        if let Some(georeference) = &self.georeference {
            georeference.validate()?;
        }
        Ok(())
    }
}

/// Everything one segmentation call needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SegmentationConfig {
    pub inference: InferenceConfig,
    /// Probability cutoff; pixels at or above it are foreground
    pub threshold: f32,
    pub postprocess: PostprocessConfig,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            inference: InferenceConfig::default(),
            threshold: 0.5,
            postprocess: PostprocessConfig::default(),
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<()> {
        self.inference.validate()?;
        if !self.threshold.is_finite() {
            return Err(MaskError::InvalidConfig(format!(
                "threshold must be finite, got {}",
                self.threshold
            )));
        }
        self.postprocess.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_defaults_are_valid() {
        let config = SegmentationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.postprocess.topology, TopologyMode::Preserve);
        assert_eq!(config.postprocess.morphology.kernel_size, 3);
    }

    #[test]
    fn test_even_kernel_is_bumped() {
        let morphology = MorphologyConfig { kernel_size: 4, ..Default::default() };
        assert_eq!(morphology.effective_kernel_size(), 5);
        let morphology = MorphologyConfig { kernel_size: 1, ..Default::default() };
        assert_eq!(morphology.effective_kernel_size(), 1);
    }

    #[test]
    fn test_negative_tolerance_is_rejected() {
        let config = PostprocessConfig { simplify_tolerance: -1.0, ..Default::default() };
        assert!(matches!(config.validate(), Err(MaskError::InvalidConfig(_))));
    }

    #[test]
    fn test_nan_threshold_is_rejected() {
        let config = SegmentationConfig { threshold: f32::NAN, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inference_errors_surface_through_mask_error() {
        let mut config = SegmentationConfig::default();
        config.inference.overlap = config.inference.tile_size;
        assert!(matches!(config.validate(), Err(MaskError::Stitch(_))));
    }

    #[test]
    fn test_singular_georeference_is_rejected() {
        let georeference = Georeference { transform: [0.0, 1.0, 0.0, 0.0, 0.0, 0.0], crs: None };
        assert!(georeference.validate().is_err());
        assert!(Georeference::identity().validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "threshold": 0.7, "postprocess": { "topology": "clean", "connectivity": "eight" } }"#;
        let config: SegmentationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.threshold, 0.7);
        assert_eq!(config.postprocess.topology, TopologyMode::Clean);
        assert_eq!(config.postprocess.connectivity, Connectivity::Eight);
        assert_eq!(config.inference.tile_size, 512);
    }

    #[test]
    fn test_enum_names_round_trip_through_strum() {
        assert_eq!(ExtractionMode::from_str("convex_hull").unwrap(), ExtractionMode::ConvexHull);
        assert_eq!(MorphologyMode::Close.to_string(), "close");
        assert_eq!(Connectivity::Four.complement(), Connectivity::Eight);
    }
}

use geo::Polygon;

use crate::{error::Result, types::BinaryMask};

/// Trait for mask-to-mask cleaning steps (morphology, object and hole removal)
pub trait MaskProcessor: Send + Sync {
    fn process(&self, mask: &BinaryMask) -> Result<BinaryMask>;

    fn name(&self) -> &str;
}

/// Trait for turning labelled mask regions into polygons
pub trait RegionExtractor: Send + Sync {
    /// Extract one or more polygons per foreground region.
    ///
    /// Regions that fail to vectorize are skipped, not reported as errors.
    fn extract(&self, mask: &BinaryMask) -> Result<Vec<Polygon<f64>>>;

    fn name(&self) -> &str;
}

/// Trait for polygon-set post-processing (buffer, simplify, hole filter, merge)
pub trait ShapePostProcessor: Send + Sync {
    /// Consume the current polygon set and return the processed one
    fn process(&self, polygons: Vec<Polygon<f64>>) -> Result<Vec<Polygon<f64>>>;

    fn name(&self) -> &str;
}

use geo::{Area, Buffer, Polygon, Simplify, Validation};
use tracing::{debug, warn};

use crate::{error::Result, traits::ShapePostProcessor};

/// Grows (positive) or shrinks (negative) every polygon by a pixel distance.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferProcessor {
    pub distance: f64,
}

impl ShapePostProcessor for BufferProcessor {
    fn process(&self, polygons: Vec<Polygon<f64>>) -> Result<Vec<Polygon<f64>>> {
        if self.distance == 0.0 {
            return Ok(polygons);
        }
        let mut buffered = Vec::with_capacity(polygons.len());
        for (index, polygon) in polygons.iter().enumerate() {
            let result = polygon.buffer(self.distance);
            if result.0.is_empty() {
                debug!(index, distance = self.distance, "Polygon vanished under buffering");
            }
            buffered.extend(result.0.into_iter().filter(|p| p.unsigned_area() > 0.0));
        }
        Ok(buffered)
    }

    fn name(&self) -> &str {
        "buffer"
    }
}

/// Douglas-Peucker simplification that never hands back an invalid polygon.
///
/// A result is accepted only if it passes [`Validation`] and its area moves
/// by at most `max_area_drift` (relative).
/// Otherwise the tolerance is halved and retried; after `max_attempts`
/// the polygon is kept as it was.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyPreservingSimplifier {
    pub tolerance: f64,
    pub max_area_drift: f64,
    pub max_attempts: u32,
}

impl TopologyPreservingSimplifier {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            max_area_drift: 0.1,
            max_attempts: 4,
        }
    }

    pub fn simplify_polygon(&self, polygon: &Polygon<f64>) -> Polygon<f64> {
        let original_area = polygon.unsigned_area();
        let mut tolerance = self.tolerance;

        for attempt in 0..self.max_attempts.max(1) {
            let candidate = polygon.simplify(tolerance);

            let drift = if original_area > 0.0 {
                (candidate.unsigned_area() - original_area).abs() / original_area
            } else {
                0.0
            };
            if drift <= self.max_area_drift && candidate.is_valid() {
                return candidate;
            }
            debug!(attempt, tolerance, drift, "Simplified polygon rejected, retrying");
            tolerance /= 2.0;
        }

        warn!(tolerance = self.tolerance, "Keeping polygon unsimplified");
        polygon.clone()
    }
}

impl ShapePostProcessor for TopologyPreservingSimplifier {
    fn process(&self, polygons: Vec<Polygon<f64>>) -> Result<Vec<Polygon<f64>>> {
        if self.tolerance <= 0.0 {
            return Ok(polygons);
        }
        Ok(polygons.iter().map(|p| self.simplify_polygon(p)).collect())
    }

    fn name(&self) -> &str {
        "simplify"
    }
}

/// Drops interior rings.
///
/// With `min_area == 0` every hole goes; otherwise only holes smaller than it.
/// Holes are judged by area alone, whatever their shape.
#[derive(Debug, Clone, PartialEq)]
pub struct HoleFilter {
    pub min_area: f64,
}

impl ShapePostProcessor for HoleFilter {
    fn process(&self, polygons: Vec<Polygon<f64>>) -> Result<Vec<Polygon<f64>>> {
        Ok(polygons
            .into_iter()
            .map(|polygon| {
                let (exterior, interiors) = polygon.into_inner();
                let interiors = if self.min_area <= 0.0 {
                    Vec::new()
                } else {
                    interiors
                        .into_iter()
                        .filter(|ring| Polygon::new(ring.clone(), vec![]).unsigned_area() >= self.min_area)
                        .collect()
                };
                Polygon::new(exterior, interiors)
            })
            .collect())
    }

    fn name(&self) -> &str {
        "hole_filter"
    }
}

/// Drops polygons whose area is below `min_area`.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaFilter {
    pub min_area: f64,
}

impl ShapePostProcessor for AreaFilter {
    fn process(&self, polygons: Vec<Polygon<f64>>) -> Result<Vec<Polygon<f64>>> {
        let before = polygons.len();
        let kept: Vec<Polygon<f64>> = polygons
            .into_iter()
            .filter(|p| p.unsigned_area() > 0.0 && p.unsigned_area() >= self.min_area)
            .collect();
        debug!(before, after = kept.len(), min_area = self.min_area, "Area filter");
        Ok(kept)
    }

    fn name(&self) -> &str {
        "area_filter"
    }
}

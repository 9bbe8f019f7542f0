use geo::{Area, BooleanOps, MultiPolygon, Polygon, RemoveRepeatedPoints, Validation, unary_union};
use tracing::{debug, warn};

use crate::{
    algorithms::validity::split_pinched,
    config::TopologyMode,
    error::Result,
    traits::ShapePostProcessor,
};

/// Whole-set merge of the polygon collection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopologyMerger {
    pub mode: TopologyMode,
}

impl TopologyMerger {
    fn union(polygons: &[Polygon<f64>]) -> Vec<Polygon<f64>> {
        unary_union(polygons.iter()).0
    }

    /// Split pinched rings, re-node anything still invalid, drop degenerate rings.
    fn repair(polygons: Vec<Polygon<f64>>) -> Vec<Polygon<f64>> {
        let mut repaired = Vec::with_capacity(polygons.len());
        for polygon in polygons {
            let polygon = polygon.remove_repeated_points();
            if polygon.is_valid() {
                repaired.push(polygon);
                continue;
            }

            let split = split_pinched(&polygon);
            if !split.is_empty() && split.iter().all(|p| p.is_valid()) {
                repaired.extend(split);
                continue;
            }

            debug!(errors = ?polygon.validation_errors(), "Re-noding invalid polygon");
            let (exterior, interiors) = polygon.into_inner();
            let interiors = interiors
                .into_iter()
                .filter(|ring| Polygon::new(ring.clone(), vec![]).is_valid())
                .collect();
            let polygon = Polygon::new(exterior, interiors);
            let renoded = MultiPolygon::new(vec![polygon.clone()]).union(&MultiPolygon::new(vec![]));
            let fixed: Vec<Polygon<f64>> = renoded
                .0
                .iter()
                .flat_map(split_pinched)
                .filter(|p| p.unsigned_area() > 0.0 && p.is_valid())
                .collect();
            if fixed.is_empty() {
                warn!(area = polygon.unsigned_area(), "Dropping polygon that could not be repaired");
            }
            repaired.extend(fixed);
        }
        repaired
    }
}

impl ShapePostProcessor for TopologyMerger {
    fn process(&self, polygons: Vec<Polygon<f64>>) -> Result<Vec<Polygon<f64>>> {
        if polygons.is_empty() {
            return Ok(polygons);
        }
        let before = polygons.len();
        let merged = match self.mode {
            TopologyMode::None => polygons,
            TopologyMode::Preserve => Self::union(&polygons),
            TopologyMode::Clean => Self::repair(Self::union(&polygons)),
        };
        debug!(mode = %self.mode, before, after = merged.len(), "Merged polygon set");
        Ok(merged)
    }

    fn name(&self) -> &str {
        "topology"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    fn square(x0: f64, y0: f64, size: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
        ]
    }

    fn total_area(polygons: &[Polygon<f64>]) -> f64 {
        polygons.iter().map(|p| p.unsigned_area()).sum()
    }

    #[test]
    fn test_preserve_unions_overlaps() {
        let merger = TopologyMerger { mode: TopologyMode::Preserve };
        let merged = merger.process(vec![square(0.0, 0.0, 10.0), square(5.0, 5.0, 10.0)]).unwrap();
        assert_eq!(merged.len(), 1);
        assert!((total_area(&merged) - 175.0).abs() < 1e-9);
    }

    #[test]
    fn test_none_passes_through() {
        let input = vec![square(0.0, 0.0, 10.0), square(5.0, 5.0, 10.0)];
        let merged = TopologyMerger { mode: TopologyMode::None }.process(input.clone()).unwrap();
        assert_eq!(merged, input);
    }

    #[test]
    fn test_clean_yields_valid_geometry_for_corner_touch() {
        let merger = TopologyMerger { mode: TopologyMode::Clean };
        let merged = merger.process(vec![square(0.0, 0.0, 10.0), square(10.0, 10.0, 10.0)]).unwrap();
        assert!(!merged.is_empty());
        assert!(merged.iter().all(|p| p.is_valid()));
        assert!((total_area(&merged) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_clean_repairs_bowtie() {
        let bowtie = polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 4.0),
            (x: 4.0, y: 0.0),
            (x: 0.0, y: 4.0),
        ];
        let merged = TopologyMerger::repair(vec![bowtie]);
        assert!(merged.iter().all(|p| p.is_valid()));
    }

    #[test]
    fn test_disjoint_polygons_stay_separate() {
        let merger = TopologyMerger { mode: TopologyMode::Preserve };
        let merged = merger.process(vec![square(0.0, 0.0, 2.0), square(10.0, 0.0, 2.0)]).unwrap();
        assert_eq!(merged.len(), 2);
    }
}

//! Region-to-polygon extraction.
//!
//! Pixel `(x, y)` covers the square `[x, x+1] x [y, y+1]`, so traced
//! polygons follow pixel edges exactly and a lone pixel has area 1.

use std::collections::HashMap;

use geo::{Area, ConvexHull, Contains, Coord, LineString, MultiPoint, Point, Polygon};
use tracing::{debug, instrument, warn};

use crate::{
    algorithms::labelling::{ComponentLabels, Region},
    config::{Connectivity, ExtractionMode},
    error::{MaskError, Result},
    traits::RegionExtractor,
    types::BinaryMask,
};

type Vertex = (i32, i32);

/// Labels components and vectorizes each one.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygonizer {
    pub mode: ExtractionMode,
    pub connectivity: Connectivity,
    /// Components with fewer pixels are dropped before vectorization
    pub min_area: f64,
}

impl Default for Polygonizer {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::Trace,
            connectivity: Connectivity::Four,
            min_area: 0.0,
        }
    }
}

impl RegionExtractor for Polygonizer {
    #[instrument(skip_all, fields(mode = %self.mode, connectivity = %self.connectivity))]
    fn extract(&self, mask: &BinaryMask) -> Result<Vec<Polygon<f64>>> {
        if mask.is_empty() {
            return Ok(Vec::new());
        }
        if self.mode == ExtractionMode::ConvexHull {
            warn!("Convex hull extraction is lossy for concave regions; holes are discarded");
        }

        let labels = ComponentLabels::new(mask, self.connectivity);
        let mut polygons = Vec::new();
        let mut dropped = 0usize;

        for region in labels.regions() {
            if (region.pixel_count as f64) < self.min_area {
                dropped += 1;
                continue;
            }
            let extracted = match self.mode {
                ExtractionMode::Trace => trace_region(&labels, region, self.connectivity),
                ExtractionMode::ConvexHull => hull_region(&labels, region).map(|p| vec![p]),
            };
            match extracted {
                Ok(region_polygons) => polygons.extend(region_polygons),
                Err(e) => warn!(label = region.label, error = %e, "Skipping region that failed to vectorize"),
            }
        }

        debug!(
            regions = labels.regions().len(),
            dropped,
            polygons = polygons.len(),
            "Polygonized mask"
        );
        Ok(polygons)
    }

    fn name(&self) -> &str {
        match self.mode {
            ExtractionMode::Trace => "boundary_trace",
            ExtractionMode::ConvexHull => "convex_hull",
        }
    }
}

/// Exact boundary of one component as one or more polygons with holes.
///
/// At a vertex where the component touches itself only diagonally,
/// 4-connectivity keeps the two pixels apart and 8-connectivity joins them.
/// Rings that still revisit a vertex are split into simple loops.
pub fn trace_region(labels: &ComponentLabels, region: &Region, connectivity: Connectivity) -> Result<Vec<Polygon<f64>>> {
    let edges = boundary_edges(labels, region);
    let rings = link_rings(&edges, connectivity)?;

    let mut exteriors: Vec<Vec<Vertex>> = Vec::new();
    let mut holes: Vec<(Coord<f64>, Vec<Vertex>)> = Vec::new();
    for ring in rings {
        for simple in split_simple_loops(ring) {
            let area = signed_area(&simple);
            if area > 0.0 {
                exteriors.push(simple);
            } else if area < 0.0 {
                holes.push((hole_sample_point(&simple), simple));
            }
        }
    }

    if exteriors.is_empty() {
        return Err(MaskError::GeometricComputation(format!(
            "region {} produced no exterior ring",
            region.label
        )));
    }

    let shells: Vec<Polygon<f64>> = exteriors
        .iter()
        .map(|ring| Polygon::new(to_line_string(ring), vec![]))
        .collect();
    let mut interiors: Vec<Vec<LineString<f64>>> = vec![Vec::new(); shells.len()];

    for (sample, hole) in holes {
        let owner = shells
            .iter()
            .enumerate()
            .filter(|(_, shell)| shell.contains(&sample))
            .min_by(|(_, a), (_, b)| a.unsigned_area().total_cmp(&b.unsigned_area()))
            .map(|(index, _)| index);
        match owner {
            Some(index) => interiors[index].push(to_line_string(&hole)),
            None => warn!(label = region.label, "Dropping hole ring outside every exterior"),
        }
    }

    Ok(shells
        .into_iter()
        .zip(interiors)
        .map(|(shell, interiors)| {
            let (exterior, _) = shell.into_inner();
            Polygon::new(exterior, interiors)
        })
        .collect())
}

/// Convex hull over the corners of the component's pixels.
pub fn hull_region(labels: &ComponentLabels, region: &Region) -> Result<Polygon<f64>> {
    let mut corners = Vec::with_capacity(region.pixel_count * 4);
    for y in region.min_y..=region.max_y {
        for x in region.min_x..=region.max_x {
            if labels.label_at(x, y) != region.label {
                continue;
            }
            let (x, y) = (x as f64, y as f64);
            corners.extend([
                Point::new(x, y),
                Point::new(x + 1.0, y),
                Point::new(x + 1.0, y + 1.0),
                Point::new(x, y + 1.0),
            ]);
        }
    }
    let hull = MultiPoint::new(corners).convex_hull();
    if hull.unsigned_area() <= 0.0 {
        return Err(MaskError::GeometricComputation(format!(
            "region {} has a degenerate hull",
            region.label
        )));
    }
    Ok(hull)
}

/// Directed pixel edges with the component on the left-hand side (y down).
fn boundary_edges(labels: &ComponentLabels, region: &Region) -> Vec<(Vertex, Vertex)> {
    let inside = |x: i32, y: i32| x >= 0 && y >= 0 && labels.label_at_checked(x as u32, y as u32) == Some(region.label);
    let mut edges = Vec::new();

    for y in region.min_y as i32..=region.max_y as i32 {
        for x in region.min_x as i32..=region.max_x as i32 {
            if !inside(x, y) {
                continue;
            }
            if !inside(x, y - 1) {
                edges.push(((x, y), (x + 1, y)));
            }
            if !inside(x + 1, y) {
                edges.push(((x + 1, y), (x + 1, y + 1)));
            }
            if !inside(x, y + 1) {
                edges.push(((x + 1, y + 1), (x, y + 1)));
            }
            if !inside(x - 1, y) {
                edges.push(((x, y + 1), (x, y)));
            }
        }
    }
    edges
}

/// Chain edges into closed rings of vertices (closing vertex not repeated).
fn link_rings(edges: &[(Vertex, Vertex)], connectivity: Connectivity) -> Result<Vec<Vec<Vertex>>> {
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::with_capacity(edges.len());
    for (index, (start, _)) in edges.iter().enumerate() {
        outgoing.entry(*start).or_default().push(index);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        let mut ring = Vec::new();
        let mut current = first;
        loop {
            used[current] = true;
            let (start, end) = edges[current];
            ring.push(start);

            let next = next_edge(edges, &outgoing, current, connectivity).ok_or_else(|| {
                MaskError::GeometricComputation(format!("open boundary at vertex {end:?}"))
            })?;
            if next == first {
                break;
            }
            if used[next] || ring.len() > edges.len() {
                return Err(MaskError::GeometricComputation(format!(
                    "boundary ring through {end:?} does not close"
                )));
            }
            current = next;
        }
        rings.push(ring);
    }
    Ok(rings)
}

fn next_edge(
    edges: &[(Vertex, Vertex)],
    outgoing: &HashMap<Vertex, Vec<usize>>,
    current: usize,
    connectivity: Connectivity,
) -> Option<usize> {
    let (start, end) = edges[current];
    let candidates = outgoing.get(&end)?;
    if candidates.len() == 1 {
        return candidates.first().copied();
    }

    let incoming = (end.0 - start.0, end.1 - start.1);
    // Positive turn hugs the pixel we arrived along, keeping diagonal pixels apart.
    let wanted = match connectivity {
        Connectivity::Four => 1,
        Connectivity::Eight => -1,
    };
    candidates.iter().copied().find(|&candidate| {
        let (from, to) = edges[candidate];
        let out = (to.0 - from.0, to.1 - from.1);
        (incoming.0 * out.1 - incoming.1 * out.0).signum() == wanted
    })
}

/// Split a ring that revisits vertices into simple loops, dropping collinear vertices.
fn split_simple_loops(ring: Vec<Vertex>) -> Vec<Vec<Vertex>> {
    let mut loops = Vec::new();
    let mut stack: Vec<Vertex> = Vec::with_capacity(ring.len());
    let mut seen: HashMap<Vertex, usize> = HashMap::with_capacity(ring.len());

    for vertex in ring {
        if let Some(&position) = seen.get(&vertex) {
            let closed = stack.split_off(position);
            for v in &closed {
                seen.remove(v);
            }
            loops.push(closed);
        }
        seen.insert(vertex, stack.len());
        stack.push(vertex);
    }
    if !stack.is_empty() {
        loops.push(stack);
    }

    loops
        .into_iter()
        .map(drop_collinear)
        .filter(|l| l.len() >= 3)
        .collect()
}

fn drop_collinear(ring: Vec<Vertex>) -> Vec<Vertex> {
    let n = ring.len();
    if n < 3 {
        return ring;
    }
    let direction = |a: Vertex, b: Vertex| ((b.0 - a.0).signum(), (b.1 - a.1).signum());
    (0..n)
        .filter(|&i| {
            let prev = ring[(i + n - 1) % n];
            let next = ring[(i + 1) % n];
            direction(prev, ring[i]) != direction(ring[i], next)
        })
        .map(|i| ring[i])
        .collect()
}

/// Shoelace area; positive for exteriors in this edge orientation.
fn signed_area(ring: &[Vertex]) -> f64 {
    let n = ring.len();
    let twice: i64 = (0..n)
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            a.0 as i64 * b.1 as i64 - b.0 as i64 * a.1 as i64
        })
        .sum();
    twice as f64 / 2.0
}

/// Center of a background pixel just outside the ring's first edge.
fn hole_sample_point(ring: &[Vertex]) -> Coord<f64> {
    let (a, b) = (ring[0], ring[1 % ring.len()]);
    let (dx, dy) = ((b.0 - a.0).signum() as f64, (b.1 - a.1).signum() as f64);
    Coord {
        x: a.0 as f64 + 0.5 * dx + 0.5 * dy,
        y: a.1 as f64 + 0.5 * dy - 0.5 * dx,
    }
}

fn to_line_string(ring: &[Vertex]) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = ring
        .iter()
        .map(|&(x, y)| Coord { x: x as f64, y: y as f64 })
        .collect();
    if let Some(&first) = coords.first() {
        coords.push(first);
    }
    LineString::new(coords)
}

use std::collections::HashMap;

use geo::{Area, Contains, Coord, LineString, Polygon};

/// Split rings that pass through the same vertex twice into simple polygons.
///
/// A loop wound like the ring it came from keeps that ring's role. A loop
/// wound the other way flips it: inside a shell it is a hole, inside a hole
/// it is an island. Every hole goes to the smallest shell containing it.
pub fn split_pinched(polygon: &Polygon<f64>) -> Vec<Polygon<f64>> {
    let mut shells = Vec::new();
    let mut holes = Vec::new();

    let shell_sign = ring_signed_area(polygon.exterior()).signum();
    for ring in split_ring(polygon.exterior()) {
        if ring_signed_area(&ring).signum() == shell_sign {
            shells.push(Polygon::new(ring, vec![]));
        } else {
            holes.push(ring);
        }
    }
    for interior in polygon.interiors() {
        let hole_sign = ring_signed_area(interior).signum();
        for ring in split_ring(interior) {
            if ring_signed_area(&ring).signum() == hole_sign {
                holes.push(ring);
            } else {
                shells.push(Polygon::new(ring, vec![]));
            }
        }
    }

    let mut interiors: Vec<Vec<LineString<f64>>> = vec![Vec::new(); shells.len()];
    for hole in holes {
        let owner = shells
            .iter()
            .enumerate()
            .filter(|(_, shell)| shell.contains(&hole))
            .min_by(|(_, a), (_, b)| a.unsigned_area().total_cmp(&b.unsigned_area()))
            .map(|(index, _)| index);
        if let Some(index) = owner {
            interiors[index].push(hole);
        }
    }

    shells
        .into_iter()
        .zip(interiors)
        .map(|(shell, interiors)| Polygon::new(shell.into_inner().0, interiors))
        .collect()
}

fn split_ring(ring: &LineString<f64>) -> Vec<LineString<f64>> {
    let mut coords = ring.0.clone();
    if ring.is_closed() {
        coords.pop();
    }

    let key = |c: &Coord<f64>| (c.x.to_bits(), c.y.to_bits());
    let mut loops = Vec::new();
    let mut stack: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    let mut seen: HashMap<(u64, u64), usize> = HashMap::new();

    for coord in coords {
        if let Some(&position) = seen.get(&key(&coord)) {
            let closed = stack.split_off(position);
            for c in &closed {
                seen.remove(&key(c));
            }
            loops.push(closed);
        }
        seen.insert(key(&coord), stack.len());
        stack.push(coord);
    }
    loops.push(stack);

    loops
        .into_iter()
        .filter(|l| l.len() >= 3)
        .map(|mut l| {
            l.push(l[0]);
            LineString::new(l)
        })
        .filter(|ring| ring_signed_area(ring) != 0.0)
        .collect()
}

fn ring_signed_area(ring: &LineString<f64>) -> f64 {
    Polygon::new(ring.clone(), vec![]).signed_area()
}

use serde::{Deserialize, Serialize};

/// A square window into a padded raster. Produced by [`plan_tiles`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileDescriptor {
    pub x: usize,
    pub y: usize,
    pub size: usize,
}

impl TileDescriptor {
    pub fn x_end(&self) -> usize {
        self.x + self.size
    }

    pub fn y_end(&self) -> usize {
        self.y + self.size
    }
}

/// Start offsets of windows of `tile` pixels covering `[0, length)`.
///
/// Offsets advance by `max(1, tile - overlap)`; when the regular stride does not
/// land flush on the far edge, a final offset of `length - tile` is appended so
/// the last window always ends exactly at `length`. A `length` no longer than
/// `tile` yields the single offset `0`.
pub fn plan_offsets(length: usize, tile: usize, overlap: usize) -> Vec<usize> {
    if length <= tile {
        return vec![0];
    }

    let stride = tile.saturating_sub(overlap).max(1);
    let last = length - tile;
    let mut offsets: Vec<usize> = (0..=last).step_by(stride).collect();
    if offsets.last() != Some(&last) {
        offsets.push(last);
    }
    offsets
}

/// All tile origins for a `height` x `width` raster, in row-major order.
pub fn plan_tiles(height: usize, width: usize, tile: usize, overlap: usize) -> Vec<TileDescriptor> {
    let ys = plan_offsets(height, tile, overlap);
    let xs = plan_offsets(width, tile, overlap);

    ys.iter()
        .flat_map(|&y| xs.iter().map(move |&x| TileDescriptor { x, y, size: tile }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_axis_yields_single_offset() {
        assert_eq!(plan_offsets(100, 512, 64), vec![0]);
        assert_eq!(plan_offsets(512, 512, 64), vec![0]);
    }

    #[test]
    fn test_final_offset_is_flush_with_edge() {
        assert_eq!(plan_offsets(1000, 512, 64), vec![0, 448, 488]);
        assert_eq!(plan_offsets(10, 4, 0), vec![0, 4, 6]);
        assert_eq!(plan_offsets(12, 4, 0), vec![0, 4, 8]);
    }

    #[test]
    fn test_offsets_cover_axis_exactly() {
        for length in 1..80 {
            for tile in 1..20 {
                for overlap in 0..tile {
                    let offsets = plan_offsets(length, tile, overlap);
                    let mut covered = vec![false; length.max(tile)];
                    for &o in &offsets {
                        for c in covered.iter_mut().skip(o).take(tile) {
                            *c = true;
                        }
                    }
                    assert!(covered.iter().all(|&c| c), "gap for L={length} T={tile} O={overlap}");

                    let last = *offsets.last().unwrap();
                    assert_eq!(last + tile, length.max(tile));
                    assert!(offsets.windows(2).all(|w| w[0] < w[1]), "offsets must be increasing");
                }
            }
        }
    }

    #[test]
    fn test_tiles_are_row_major() {
        let tiles = plan_tiles(10, 7, 4, 1);
        let origins: Vec<(usize, usize)> = tiles.iter().map(|t| (t.y, t.x)).collect();
        assert_eq!(
            origins,
            vec![(0, 0), (0, 3), (3, 0), (3, 3), (6, 0), (6, 3)]
        );
        assert!(tiles.iter().all(|t| t.size == 4));
    }
}

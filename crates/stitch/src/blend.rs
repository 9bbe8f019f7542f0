use ndarray::{Array1, Array2};

/// Tile-sized weighting kernel used to blend overlapping tile predictions.
///
/// The blended kernel is the outer product of two raised-cosine (Hann) curves
/// sampled at `(i + 1) / (T + 1)`, so every weight is strictly positive and
/// tile borders still contribute where no other tile overlaps them. The kernel
/// is normalized to a peak of exactly 1.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendWindow {
    weights: Array2<f32>,
}

impl BlendWindow {
    /// Raised-cosine window for `tile` pixels; all ones when `tile <= 1`.
    pub fn hann(tile: usize) -> Self {
        if tile <= 1 {
            return Self::uniform(tile);
        }

        let curve = hann_curve(tile);
        let mut weights = Array2::from_shape_fn((tile, tile), |(y, x)| curve[y] * curve[x]);

        let peak = weights.iter().copied().fold(0.0f32, f32::max);
        if peak > 0.0 {
            weights.mapv_inplace(|w| w / peak);
        } else {
            weights.fill(1.0);
        }

        Self { weights }
    }

    /// Constant weight of 1 across the tile.
    pub fn uniform(tile: usize) -> Self {
        Self { weights: Array2::ones((tile, tile)) }
    }

    /// Pick the blended or uniform kernel according to configuration.
    pub fn for_tile(tile: usize, blend: bool) -> Self {
        if blend { Self::hann(tile) } else { Self::uniform(tile) }
    }

    pub fn size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }
}

fn hann_curve(len: usize) -> Array1<f32> {
    let denom = (len + 1) as f64;
    Array1::from_iter((0..len).map(|i| {
        let phase = 2.0 * std::f64::consts::PI * (i + 1) as f64 / denom;
        (0.5 - 0.5 * phase.cos()) as f32
    }))
}

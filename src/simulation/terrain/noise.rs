//! Plasma-style heightmap generator.
//!
//! A coarse grid of random altitudes is cosine-interpolated over the map, then finer
//! octaves of lattice noise are added on top, each one scaled down by the roughness.

use std::f64::consts::PI;

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// log2 of the random pool size.
const POOL_LOG2: u32 = 10;

/// Hash-style pool of pseudo-random values addressed by lattice coordinates.
struct RandPool {
    mask: usize,
    rows: Vec<u16>,
    cols: Vec<u16>,
}

impl RandPool {
    fn new(rng: &mut Pcg64, log2: u32) -> Self {
        let n = 1usize << log2;
        let cols = (0..n).map(|_| rng.random::<u16>()).collect();
        let rows = (0..n).map(|_| rng.random::<u16>()).collect();
        Self {
            mask: n - 1,
            rows,
            cols,
        }
    }

    fn value(&self, y: usize, x: usize) -> f64 {
        let v2 = self.rows[y & self.mask];
        let v1 = self.cols[(x + usize::from(v2)) & self.mask];
        f64::from(v1 ^ v2) / 65535.0
    }
}

/// Cosine interpolation weight of step `i` out of `n`.
fn cos_weight(i: usize, n: usize) -> f64 {
    (1.0 - (PI * i as f64 / n as f64).cos()) * 0.5
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a * (1.0 - t) + b * t
}

/// Adds one cosine-interpolated lattice cell into `dest`.
///
/// `corners` are `[top_left, top_right, bottom_left, bottom_right]`, and the cell
/// covers `span × span` samples starting at `(y0, x0)`.
fn blend_cell(dest: &mut Array2<f64>, y0: usize, x0: usize, span: usize, corners: [f64; 4]) {
    let [v00, v01, v10, v11] = corners;
    for y in 0..span {
        let ty = cos_weight(y, span);
        let left = lerp(v00, v10, ty);
        let right = lerp(v01, v11, ty);
        for x in 0..span {
            dest[[y0 + y, x0 + x]] += lerp(left, right, cos_weight(x, span));
        }
    }
}

/// Generates a `2^size_log2` square heightmap, not normalized.
///
/// # Arguments
///
/// * `size_log2` - log2 of the output side length
/// * `base_log2` - log2 of the number of coarse blocks per side
/// * `seed` - Generator seed
/// * `roughness` - Scale factor applied to each finer octave
pub fn plasma(size_log2: u32, base_log2: u32, seed: u64, roughness: f64) -> Array2<f64> {
    let size = 1usize << size_log2;
    let blocks = 1usize << base_log2;
    let block_log2 = size_log2.saturating_sub(base_log2);
    let block_dim = 1usize << block_log2;

    let mut rng = Pcg64::seed_from_u64(seed);
    let base = Array2::from_shape_simple_fn((blocks + 1, blocks + 1), || rng.random::<f64>());
    let pool = RandPool::new(&mut rng, POOL_LOG2);

    let mut dest = Array2::<f64>::zeros((size, size));
    for by in 0..blocks {
        for bx in 0..blocks {
            let (y0, x0) = (by * block_dim, bx * block_dim);
            blend_cell(
                &mut dest,
                y0,
                x0,
                block_dim,
                [
                    base[[by, bx]],
                    base[[by, bx + 1]],
                    base[[by + 1, bx]],
                    base[[by + 1, bx + 1]],
                ],
            );

            let mut level = 1.0;
            for d in 1..=block_log2 {
                level *= roughness;
                let cells = 1usize << d;
                let span = block_dim >> d;
                for sy in 0..cells {
                    let (ya, yb) = (y0 + sy * span, y0 + (sy + 1) * span);
                    for sx in 0..cells {
                        let (xa, xb) = (x0 + sx * span, x0 + (sx + 1) * span);
                        let corners = [
                            pool.value(ya, xa) * level,
                            pool.value(ya, xb) * level,
                            pool.value(yb, xa) * level,
                            pool.value(yb, xb) * level,
                        ];
                        blend_cell(&mut dest, ya, xa, span, corners);
                    }
                }
            }
        }
    }
    dest
}

/// Rescales `heights` in place to span `[0, 1]`.
pub fn normalize(heights: &mut Array2<f64>) {
    let (lo, hi) = heights
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), &h| (lo.min(h), hi.max(h)));
    let inv = if hi > lo { 1.0 / (hi - lo) } else { 1.0 };
    heights.mapv_inplace(|h| (h - lo) * inv);
}

//! Square heightmap terrain centred at the origin.
//!
//! The map is a fixed `GRID_SIZE × GRID_SIZE` grid of heights covering
//! `field_size × field_size` world units on the XZ plane. Heights above the
//! simulation's wall level are treated as impassable.

use glam::{DVec3, I64Vec2};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub mod noise;

/// log2 of the number of cells per side.
pub const GRID_LOG2: u32 = 9;
/// Number of cells per side.
pub const GRID_SIZE: usize = 1 << GRID_LOG2;
/// log2 of the number of coarse noise blocks per side.
const NOISE_BASE_LOG2: u32 = 3;
/// Heights above the barrier level are multiplied by this.
const BARRIER_HEIGHT_SCALE: f64 = 3.0;

/// Terrain generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    /// Side length of the map in world units.
    pub field_size: f64,
    /// Normalized noise level above which terrain becomes a barrier.
    pub noise_barrier_level: f64,
    /// Noise generator seed.
    pub noise_seed: u64,
    /// Amplitude factor of each finer noise octave.
    pub noise_roughness: f64,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            field_size: 100.0,
            noise_barrier_level: 0.5,
            noise_seed: 102,
            noise_roughness: 0.5,
        }
    }
}

impl TerrainParams {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.field_size.is_finite() && self.field_size > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "field_size must be positive, got {}",
                self.field_size
            )));
        }
        if !(0.0..=1.0).contains(&self.noise_barrier_level) {
            return Err(ConfigError::Invalid(format!(
                "noise_barrier_level must be within [0, 1], got {}",
                self.noise_barrier_level
            )));
        }
        if !(self.noise_roughness.is_finite() && self.noise_roughness >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "noise_roughness must be non-negative, got {}",
                self.noise_roughness
            )));
        }
        Ok(())
    }
}

/// Immutable heightmap with lookup and ray scanning.
#[derive(Debug, Clone)]
pub struct Terrain {
    field_size: f64,
    cell_size: f64,
    /// Heights indexed `[[z, x]]`.
    heights: Array2<f64>,
}

impl Terrain {
    /// Generates a terrain from noise.
    pub fn new(params: &TerrainParams) -> Result<Self, ConfigError> {
        params.validate()?;
        let mut heights = noise::plasma(
            GRID_LOG2,
            NOISE_BASE_LOG2,
            params.noise_seed,
            params.noise_roughness,
        );
        noise::normalize(&mut heights);
        let barrier = params.noise_barrier_level;
        heights.mapv_inplace(|h| if h > barrier { h * BARRIER_HEIGHT_SCALE } else { 0.0 });
        Self::from_heights(params.field_size, heights)
    }

    /// Wraps an existing `GRID_SIZE × GRID_SIZE` height grid indexed `[[z, x]]`.
    pub fn from_heights(field_size: f64, heights: Array2<f64>) -> Result<Self, ConfigError> {
        if heights.dim() != (GRID_SIZE, GRID_SIZE) {
            return Err(ConfigError::Invalid(format!(
                "height grid must be {GRID_SIZE}x{GRID_SIZE}, got {:?}",
                heights.dim()
            )));
        }
        if !(field_size.is_finite() && field_size > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "field_size must be positive, got {field_size}"
            )));
        }
        Ok(Self {
            field_size,
            cell_size: field_size / GRID_SIZE as f64,
            heights,
        })
    }

    /// A terrain with every cell at height zero.
    pub fn flat(field_size: f64) -> Result<Self, ConfigError> {
        Self::from_heights(field_size, Array2::zeros((GRID_SIZE, GRID_SIZE)))
    }

    /// Side length in world units.
    pub fn field_size(&self) -> f64 {
        self.field_size
    }

    /// Side length of one cell in world units.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Heights indexed `[[z, x]]`.
    pub fn heights(&self) -> &Array2<f64> {
        &self.heights
    }

    /// Grid cell containing `pos`, possibly outside the grid.
    pub fn cell_from_pos_unclamped(&self, pos: DVec3) -> I64Vec2 {
        let half = self.field_size * 0.5;
        let half_cell = self.cell_size * 0.5;
        let u = (pos.x + half - half_cell) / self.field_size;
        let v = (pos.z + half - half_cell) / self.field_size;
        // Truncation toward zero, like an integer cast.
        I64Vec2::new(
            (GRID_SIZE as f64 * u) as i64,
            (GRID_SIZE as f64 * v) as i64,
        )
    }

    /// Grid cell containing `pos`, clamped to the grid.
    pub fn cell_from_pos(&self, pos: DVec3) -> (usize, usize) {
        let cell = self.cell_from_pos_unclamped(pos);
        let max = GRID_SIZE as i64 - 1;
        (cell.x.clamp(0, max) as usize, cell.y.clamp(0, max) as usize)
    }

    /// World position of the centre of `cell`, at height 0.
    pub fn pos_from_cell(&self, cell: I64Vec2) -> DVec3 {
        let half = self.field_size * 0.5;
        let half_cell = self.cell_size * 0.5;
        let remap = |c: i64| {
            let t = c as f64 / GRID_SIZE as f64;
            (-half + half_cell) * (1.0 - t) + (half - half_cell) * t
        };
        DVec3::new(remap(cell.x), 0.0, remap(cell.y))
    }

    /// Height at `pos`, using the nearest in-grid cell.
    pub fn height_at(&self, pos: DVec3) -> f64 {
        let (x, z) = self.cell_from_pos(pos);
        self.heights[[z, x]]
    }

    /// Returns true when `pos` falls on a grid cell.
    pub fn is_pos_inside(&self, pos: DVec3) -> bool {
        !is_cell_outside(self.cell_from_pos_unclamped(pos))
    }

    /// Walks the grid cells on the segment from `start` to `end`.
    ///
    /// `visit` receives the sample's world position, its height (0 outside the grid),
    /// and whether it lies outside the grid. Returning `false` stops the scan.
    ///
    /// # Arguments
    ///
    /// * `start` - Segment start in world space
    /// * `end` - Segment end in world space
    /// * `visit` - Per-sample callback
    pub fn scan_ray(&self, start: DVec3, end: DVec3, mut visit: impl FnMut(DVec3, f64, bool) -> bool) {
        let mut sta = self.cell_from_pos_unclamped(start);
        let mut fin = self.cell_from_pos_unclamped(end);
        if sta == fin {
            visit(start, self.height_at(start), is_cell_outside(sta));
            return;
        }

        // Axis 0 is the major axis.
        let swapped = (fin.x - sta.x).abs() < (fin.y - sta.y).abs();
        if swapped {
            sta = I64Vec2::new(sta.y, sta.x);
            fin = I64Vec2::new(fin.y, fin.x);
        }

        let step = if fin.x > sta.x { 1 } else { -1 };
        let inv_len = 1.0 / (fin.x - sta.x) as f64;
        let max = GRID_SIZE as i64 - 1;

        let mut i0 = sta.x;
        loop {
            let t = (i0 - sta.x) as f64 * inv_len;
            let minor = sta.y as f64 + (fin.y - sta.y) as f64 * t;
            let i1 = ((minor + 0.5).floor() as i64).clamp(0, max);

            let cell = if swapped {
                I64Vec2::new(i1, i0)
            } else {
                I64Vec2::new(i0, i1)
            };
            let pos = self.pos_from_cell(cell);
            let keep_going = if is_cell_outside(cell) {
                visit(pos, 0.0, true)
            } else {
                visit(pos, self.heights[[cell.y as usize, cell.x as usize]], false)
            };

            if !keep_going || i0 == fin.x {
                break;
            }
            i0 += step;
        }
    }
}

fn is_cell_outside(cell: I64Vec2) -> bool {
    let n = GRID_SIZE as i64;
    cell.x < 0 || cell.x >= n || cell.y < 0 || cell.y >= n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_centres_map_back_to_their_cell() {
        let terrain = Terrain::flat(100.0).unwrap();
        for cell in [I64Vec2::new(0, 0), I64Vec2::new(10, 300), I64Vec2::new(511, 511)] {
            let pos = terrain.pos_from_cell(cell);
            let back = terrain.cell_from_pos_unclamped(pos + DVec3::splat(1e-9));
            assert!((back - cell).abs().max_element() <= 1);
        }
    }

    #[test]
    fn origin_is_inside_and_far_point_is_not() {
        let terrain = Terrain::flat(100.0).unwrap();
        assert!(terrain.is_pos_inside(DVec3::ZERO));
        assert!(!terrain.is_pos_inside(DVec3::new(80.0, 0.0, 0.0)));
        assert!(!terrain.is_pos_inside(DVec3::new(0.0, 0.0, -80.0)));
    }

    #[test]
    fn wrong_grid_size_is_rejected() {
        assert!(Terrain::from_heights(100.0, Array2::zeros((4, 4))).is_err());
    }

    #[test]
    fn invalid_params_are_rejected() {
        let params = TerrainParams {
            field_size: -1.0,
            ..TerrainParams::default()
        };
        assert!(Terrain::new(&params).is_err());
    }
}

//! Per-tick evaluation of one brain driving a group of units.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::sensors::{self, Control, WALL_HEIGHT, sensor};
use super::terrain::Terrain;
use super::unit::{RunState, Unit};
use crate::brain::{Brain, ForwardScratch, Scalar};
use crate::error::{BrainError, SimError};
use crate::training::CancelToken;

/// A unit closer than this to the target has arrived.
pub const SUCCESS_DISTANCE: f64 = 1.0;
/// Spacing between placement grid slots, in terrain cells.
const PLACEMENT_SPACING_CELLS: f64 = 8.0;

/// Simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Number of units to place.
    pub unit_count: usize,
    /// Centre of the placement grid.
    pub start_pos: DVec3,
    /// Point the units should reach.
    pub target_pos: DVec3,
    /// Time limit in seconds.
    pub max_time_s: f64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            unit_count: 10,
            start_pos: DVec3::ZERO,
            target_pos: DVec3::ZERO,
            max_time_s: 60.0 * 15.0,
        }
    }
}

/// Signed slot offset for the `i`-th step of a centre-out walk: 0, 1, -1, 2, -2, ...
pub fn progressive_offset(i: usize) -> i64 {
    let step = i.div_ceil(2) as i64;
    if i % 2 == 1 { step } else { -step }
}

/// Unit counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitCounts {
    /// Still driving.
    pub running: usize,
    /// Reached the target.
    pub success: usize,
    /// Crashed, stuck or timed out.
    pub failed: usize,
}

/// One evaluation run.
///
/// Borrows the terrain and the brain; owns its units and every buffer the tick
/// loop needs, so ticking does not allocate.
pub struct Simulation<'a> {
    params: SimParams,
    terrain: &'a Terrain,
    brain: &'a Brain,
    units: Vec<Unit>,
    elapsed_s: f64,
    completed: bool,
    sensor_buf: [Scalar; sensor::COUNT],
    control_buf: [Scalar; Control::COUNT],
    scratch: ForwardScratch,
}

impl<'a> Simulation<'a> {
    /// Places units around `params.start_pos` and prepares the run.
    ///
    /// Fails with [`BrainError::Arity`] when the brain does not match the sensor
    /// and control layouts, and with [`SimError::NoUnitsPlaced`] when no slot
    /// around the start is free.
    pub fn new(params: SimParams, terrain: &'a Terrain, brain: &'a Brain) -> Result<Self, SimError> {
        if brain.inputs_len() != sensor::COUNT {
            return Err(BrainError::Arity {
                expected: sensor::COUNT,
                actual: brain.inputs_len(),
            }
            .into());
        }
        if brain.outputs_len() != Control::COUNT {
            return Err(BrainError::Arity {
                expected: Control::COUNT,
                actual: brain.outputs_len(),
            }
            .into());
        }

        let units = place_units(&params, terrain);
        if units.is_empty() {
            return Err(SimError::NoUnitsPlaced {
                requested: params.unit_count,
                start: params.start_pos,
            });
        }
        if units.len() < params.unit_count {
            log::warn!(
                "Placed {} of {} units around {}",
                units.len(),
                params.unit_count,
                params.start_pos
            );
        }

        Ok(Self {
            params,
            terrain,
            brain,
            units,
            elapsed_s: 0.0,
            completed: false,
            sensor_buf: [0.0; sensor::COUNT],
            control_buf: [0.0; Control::COUNT],
            scratch: brain.scratch(),
        })
    }

    /// Parameters of this run.
    pub fn params(&self) -> &SimParams {
        &self.params
    }

    /// Read-only view of the units.
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Simulated seconds so far.
    pub fn elapsed_s(&self) -> f64 {
        self.elapsed_s
    }

    /// Returns true once a tick found nothing left to do.
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Unit counts per state.
    pub fn counts(&self) -> UnitCounts {
        self.units.iter().fold(UnitCounts::default(), |mut c, u| {
            match u.state() {
                RunState::Running => c.running += 1,
                RunState::Success => c.success += 1,
                RunState::Failed => c.failed += 1,
            }
            c
        })
    }

    /// Mean final cost over all units. Units without a final cost count as 0.
    pub fn average_cost(&self) -> f64 {
        let total: f64 = self.units.iter().filter_map(Unit::final_cost).sum();
        total / self.units.len().max(1) as f64
    }

    /// Advances the simulation by `interval_s` seconds.
    pub fn tick(&mut self, interval_s: f64) -> Result<(), BrainError> {
        let max_time_s = self.params.max_time_s;
        let any_running = self.units.iter().any(Unit::is_running);
        if !any_running || self.elapsed_s >= max_time_s {
            self.completed = true;
            return Ok(());
        }
        self.elapsed_s += interval_s;
        let elapsed_s = self.elapsed_s;

        let Self {
            params,
            terrain,
            brain,
            units,
            sensor_buf,
            control_buf,
            scratch,
            ..
        } = self;

        for unit in units.iter_mut().filter(|u| u.is_running()) {
            sensor_buf.fill(0.0);
            control_buf.fill(0.0);
            sensors::build_sensors(&mut sensor_buf[..], unit.body(), params.target_pos, terrain);
            let readings = &sensor_buf[..];

            if sensors::is_crashed(readings) {
                unit.finish(RunState::Failed, sensors::cost(readings, elapsed_s, max_time_s));
                continue;
            }
            if unit.is_not_moving() {
                unit.finish(RunState::Failed, sensors::cost(readings, max_time_s, max_time_s));
                continue;
            }

            brain.forward(readings, &mut control_buf[..], scratch)?;
            unit.set_controls(&control_buf[..]);
            unit.animate(interval_s);

            // Scored on the readings taken before this step.
            let cost = sensors::cost(readings, elapsed_s, max_time_s);
            if unit.body().pos.distance(params.target_pos) < SUCCESS_DISTANCE {
                unit.finish(RunState::Success, cost);
            } else if elapsed_s >= max_time_s {
                // The next tick completes the run, so time out now.
                unit.finish(RunState::Failed, cost);
            }
        }
        Ok(())
    }

    /// Ticks until complete or `cancel` fires, then returns [`Self::average_cost`].
    pub fn run_to_completion(&mut self, interval_s: f64, cancel: &CancelToken) -> Result<f64, BrainError> {
        while !self.completed && !cancel.is_cancelled() {
            self.tick(interval_s)?;
        }
        Ok(self.average_cost())
    }
}

/// Lays units out on a centre-out grid, skipping slots off the map or inside walls.
fn place_units(params: &SimParams, terrain: &Terrain) -> Vec<Unit> {
    let n = params.unit_count;
    let side = ((n as f64).sqrt().ceil() as usize).max(1);
    let spacing = terrain.cell_size() * PLACEMENT_SPACING_CELLS;

    let mut units = Vec::with_capacity(n);
    'rows: for row in 0..side {
        for col in 0..side {
            if units.len() >= n {
                break 'rows;
            }
            let offset = DVec3::new(
                progressive_offset(col) as f64 * spacing,
                0.0,
                progressive_offset(row) as f64 * spacing,
            );
            let pos = params.start_pos + offset;
            if !terrain.is_pos_inside(pos) || terrain.height_at(pos) >= WALL_HEIGHT {
                continue;
            }
            units.push(Unit::new(units.len(), pos));
        }
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_walk_outward() {
        let got: Vec<i64> = (0..5).map(progressive_offset).collect();
        assert_eq!(got, vec![0, 1, -1, 2, -2]);
    }

    #[test]
    fn placement_fills_a_square_around_start() {
        let terrain = Terrain::flat(100.0).unwrap();
        let params = SimParams {
            unit_count: 4,
            ..SimParams::default()
        };
        let units = place_units(&params, &terrain);
        assert_eq!(units.len(), 4);
        assert_eq!(units[0].body().pos, DVec3::ZERO);
        let spacing = terrain.cell_size() * PLACEMENT_SPACING_CELLS;
        assert!((units[3].body().pos - DVec3::new(spacing, 0.0, spacing)).length() < 1e-12);
    }

    #[test]
    fn placement_skips_positions_off_the_map() {
        let terrain = Terrain::flat(100.0).unwrap();
        let params = SimParams {
            unit_count: 1,
            start_pos: DVec3::new(500.0, 0.0, 0.0),
            ..SimParams::default()
        };
        assert!(place_units(&params, &terrain).is_empty());
    }
}

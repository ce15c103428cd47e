//! Vehicle agent: control mapping, lifetime and stuck detection.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::rigid_body::RigidBody;
use super::sensors::Control;
use crate::brain::Scalar;

/// Top speed in m/s (20 km/h).
pub const MAX_SPEED_MS: f64 = 20.0 * 1000.0 / 3600.0;
/// Forward acceleration at full control, m/s².
pub const MAX_FORWARD_ACCEL: f64 = 5.0;
/// Backward acceleration at full control, m/s².
pub const MAX_BACKWARD_ACCEL: f64 = 1.5;
/// Fraction of velocity removed per step at full brake.
pub const MAX_BRAKE_COEFF: f64 = 0.1;
/// Maximum turn rate, rad/s.
pub const MAX_STEER_RAD_S: f64 = std::f64::consts::FRAC_PI_4;
/// Speed at which the full turn rate becomes available.
pub const SPEED_OF_MAX_STEER: f64 = MAX_SPEED_MS / 8.0;
/// History extents below this count as not moving.
pub const NOT_MOVING_DIST: f64 = 0.5;
/// Seconds of lifetime covered by one history slot.
pub const POS_HISTORY_INTERVAL_S: usize = 10;
/// Number of history slots (two minutes).
pub const POS_HISTORY_LEN: usize = 60 * 2 / POS_HISTORY_INTERVAL_S;

/// Lifecycle of a unit within a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Still driving.
    Running,
    /// Reached the target.
    Success,
    /// Crashed, got stuck or ran out of time.
    Failed,
}

/// A single vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    id: usize,
    body: RigidBody,
    controls: [Scalar; Control::COUNT],
    forces_ls: DVec3,
    lifetime_s: f64,
    history: [DVec3; POS_HISTORY_LEN],
    state: RunState,
    final_cost: Option<f64>,
}

impl Unit {
    /// Creates a running unit at `pos`, facing -Z.
    pub fn new(id: usize, pos: DVec3) -> Self {
        Self {
            id,
            body: RigidBody::at(pos),
            controls: [0.0; Control::COUNT],
            forces_ls: DVec3::ZERO,
            lifetime_s: 0.0,
            history: [DVec3::ZERO; POS_HISTORY_LEN],
            state: RunState::Running,
            final_cost: None,
        }
    }

    /// Identifier within its simulation.
    pub fn id(&self) -> usize {
        self.id
    }

    /// The unit's rigid body.
    pub fn body(&self) -> &RigidBody {
        &self.body
    }

    /// Mutable access to the rigid body.
    pub fn body_mut(&mut self) -> &mut RigidBody {
        &mut self.body
    }

    /// Seconds the unit has been animated.
    pub fn lifetime_s(&self) -> f64 {
        self.lifetime_s
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Returns true while the unit is still driving.
    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    /// Cost recorded when the unit terminated.
    pub fn final_cost(&self) -> Option<f64> {
        self.final_cost
    }

    /// Latest control values.
    pub fn controls(&self) -> &[Scalar; Control::COUNT] {
        &self.controls
    }

    /// Stores brain outputs as controls, clamped to `[0, 1]`.
    pub fn set_controls(&mut self, outputs: &[Scalar]) {
        for (c, &o) in self.controls.iter_mut().zip(outputs) {
            *c = o.clamp(0.0, 1.0);
        }
    }

    /// Moves the unit to a terminal state. Only the first call has an effect.
    pub fn finish(&mut self, state: RunState, cost: f64) {
        if self.is_running() && state != RunState::Running {
            self.state = state;
            self.final_cost = Some(cost);
        }
    }

    /// Applies controls and advances physics by `dt` seconds.
    pub fn animate(&mut self, dt: f64) {
        self.apply_controls(dt);

        self.body.step(dt, self.forces_ls);
        self.forces_ls = DVec3::ZERO;

        let speed = self.body.vel.length().max(1.0);
        self.body
            .attenuate_vel(dt, if speed < MAX_SPEED_MS { 0.0 } else { 0.5 });
        // Steering sets the turn rate for one step only.
        self.body.attenuate_ang_vel(dt, 1.0 / dt);

        self.lifetime_s += dt;
        let slot = (self.lifetime_s as usize / POS_HISTORY_INTERVAL_S) % POS_HISTORY_LEN;
        self.history[slot] = self.body.pos;
    }

    fn apply_controls(&mut self, dt: f64) {
        let mass = self.body.mass;
        let control = |c: Control| f64::from(self.controls[c.index()]);

        let forward = control(Control::ForwardAccel);
        if forward != 0.0 {
            self.forces_ls += DVec3::new(0.0, 0.0, -forward * MAX_FORWARD_ACCEL) * mass;
        }

        let backward = control(Control::BackwardAccel);
        if backward != 0.0 {
            self.forces_ls += DVec3::new(0.0, 0.0, backward * MAX_BACKWARD_ACCEL) * mass;
        }

        let brake = control(Control::Brake);
        if brake != 0.0 {
            let vel_ls = self.body.to_local(self.body.vel);
            let brake_vel = vel_ls * (brake * MAX_BRAKE_COEFF) * -1.0;
            self.forces_ls += brake_vel / dt * mass;
        }

        let steer = control(Control::SteerLeft) - control(Control::SteerRight);
        if steer != 0.0 {
            let vel_ls = self.body.to_local(self.body.vel);
            let speed_coeff = (-vel_ls.z / SPEED_OF_MAX_STEER).min(1.0);
            self.body.ang_vel_ls.y = steer * MAX_STEER_RAD_S * speed_coeff * dt;
        }
    }

    /// Returns true once two minutes of history show no movement.
    pub fn is_not_moving(&self) -> bool {
        if (self.lifetime_s as usize / POS_HISTORY_INTERVAL_S) < POS_HISTORY_LEN {
            return false;
        }
        let (lo, hi) = self
            .history
            .iter()
            .fold((self.history[0], self.history[0]), |(lo, hi), &p| {
                (lo.min(p), hi.max(p))
            });
        let extent = hi - lo;
        extent.max_element() < NOT_MOVING_DIST
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controls_are_clamped() {
        let mut unit = Unit::new(0, DVec3::ZERO);
        unit.set_controls(&[2.0, -1.0, 0.5, 0.0, 1.0]);
        assert_eq!(unit.controls(), &[1.0, 0.0, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn forward_control_moves_along_minus_z() {
        let mut unit = Unit::new(0, DVec3::ZERO);
        unit.set_controls(&[1.0, 0.0, 0.0, 0.0, 0.0]);
        for _ in 0..60 {
            unit.animate(1.0 / 60.0);
        }
        assert!(unit.body().pos.z < -1.0);
        assert!(unit.body().pos.x.abs() < 1e-9);
    }

    #[test]
    fn steering_at_rest_does_not_turn() {
        let mut unit = Unit::new(0, DVec3::ZERO);
        unit.set_controls(&[0.0, 0.0, 0.0, 1.0, 0.0]);
        unit.animate(1.0 / 60.0);
        assert!((unit.body().forward() - DVec3::NEG_Z).length() < 1e-12);
    }

    #[test]
    fn drag_bounds_speed_above_the_cap() {
        let mut unit = Unit::new(0, DVec3::ZERO);
        unit.set_controls(&[1.0, 0.0, 0.0, 0.0, 0.0]);
        for _ in 0..60 * 60 {
            unit.animate(1.0 / 60.0);
        }
        // Full throttle for a minute would reach 300 m/s without drag.
        assert!(unit.body().vel.length() < MAX_SPEED_MS * 2.0);
    }

    #[test]
    fn stationary_unit_is_stuck_after_history_fills() {
        let mut unit = Unit::new(0, DVec3::new(3.0, 0.0, 4.0));
        let dt = 0.5;
        while unit.lifetime_s() < 115.0 {
            unit.animate(dt);
            assert!(!unit.is_not_moving());
        }
        while unit.lifetime_s() < 121.0 {
            unit.animate(dt);
        }
        assert!(unit.is_not_moving());
    }

    #[test]
    fn finish_is_set_once() {
        let mut unit = Unit::new(0, DVec3::ZERO);
        unit.finish(RunState::Success, 1.5);
        unit.finish(RunState::Failed, 9.0);
        assert_eq!(unit.state(), RunState::Success);
        assert_eq!(unit.final_cost(), Some(1.5));
    }
}

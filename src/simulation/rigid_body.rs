//! Newtonian point mass with an orientation.

use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

/// Point mass integrated with the trapezoid rule.
///
/// Forces are given in the body's local frame and rotated into world space by
/// `rot` (world-from-local).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBody {
    /// Mass.
    pub mass: f64,
    /// World position.
    pub pos: DVec3,
    /// World velocity.
    pub vel: DVec3,
    /// World acceleration from the last step.
    pub acc: DVec3,
    /// Angular velocity in the local frame, as radians per step.
    pub ang_vel_ls: DVec3,
    /// World-from-local rotation.
    pub rot: DMat3,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            mass: 1.0,
            pos: DVec3::ZERO,
            vel: DVec3::ZERO,
            acc: DVec3::ZERO,
            ang_vel_ls: DVec3::ZERO,
            rot: DMat3::IDENTITY,
        }
    }
}

impl RigidBody {
    /// Creates a unit-mass body at `pos`.
    pub fn at(pos: DVec3) -> Self {
        Self {
            pos,
            ..Self::default()
        }
    }

    /// Advances the body by `dt` under the local-frame force `forces_ls`.
    pub fn step(&mut self, dt: f64, forces_ls: DVec3) {
        self.acc = self.rot * forces_ls / self.mass;

        let old_vel = self.vel;
        self.vel += self.acc * dt;
        self.pos += (old_vel + self.vel) * 0.5 * dt;

        let ang = self.ang_vel_ls;
        self.rot = self.rot
            * DMat3::from_rotation_x(ang.x)
            * DMat3::from_rotation_y(ang.y)
            * DMat3::from_rotation_z(ang.z);
    }

    /// Local-from-world transform of a world vector.
    pub fn to_local(&self, v: DVec3) -> DVec3 {
        self.rot.inverse() * v
    }

    /// Unit vector the body is facing (local -Z).
    pub fn forward(&self) -> DVec3 {
        -self.rot.z_axis.normalize_or_zero()
    }

    /// Scales velocity by `1 - rate * dt`.
    pub fn attenuate_vel(&mut self, dt: f64, rate: f64) {
        self.vel *= 1.0 - rate * dt;
    }

    /// Scales angular velocity by `1 - rate * dt`.
    pub fn attenuate_ang_vel(&mut self, dt: f64, rate: f64) {
        self.ang_vel_ls *= 1.0 - rate * dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_uses_average_velocity() {
        let mut body = RigidBody::at(DVec3::ZERO);
        body.vel = DVec3::new(1.0, 0.0, 0.0);
        body.step(0.5, DVec3::new(2.0, 0.0, 0.0));
        // v: 1 -> 2, pos += (1 + 2) / 2 * 0.5
        assert!((body.vel.x - 2.0).abs() < 1e-12);
        assert!((body.pos.x - 0.75).abs() < 1e-12);
    }

    #[test]
    fn forces_are_rotated_into_world() {
        let mut body = RigidBody::default();
        body.rot = DMat3::from_rotation_y(std::f64::consts::FRAC_PI_2);
        body.step(1.0, DVec3::new(0.0, 0.0, -1.0));
        assert!((body.acc - DVec3::new(-1.0, 0.0, 0.0)).length() < 1e-12);
        assert!((body.forward() - DVec3::new(-1.0, 0.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn full_attenuation_zeroes_angular_velocity() {
        let mut body = RigidBody::default();
        body.ang_vel_ls = DVec3::new(0.0, 0.3, 0.0);
        let dt = 1.0 / 60.0;
        body.attenuate_ang_vel(dt, 1.0 / dt);
        assert!(body.ang_vel_ls.length() < 1e-12);
    }
}

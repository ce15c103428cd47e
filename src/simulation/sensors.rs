//! Sensor and control vector layouts, sensor construction and the cost model.

use glam::DVec3;

use super::rigid_body::RigidBody;
use super::terrain::Terrain;
use crate::brain::Scalar;

/// Terrain above this height is impassable.
pub const WALL_HEIGHT: f64 = 0.5;
/// Number of forward probes.
pub const PROBE_COUNT: usize = 7;
/// Penalty added for each crash flag.
pub const CRASH_PENALTY: f64 = 10.0;
/// Minimum probe reach.
const MIN_PROBE_UNIT: f64 = 10.0;
/// Probe reach grows with `speed² * PROBE_SPEED_FACTOR`.
const PROBE_SPEED_FACTOR: f64 = 0.2;

/// Indices into the sensor vector.
pub mod sensor {
    use super::PROBE_COUNT;

    /// Target X.
    pub const TARGET_X: usize = 0;
    /// Target Z.
    pub const TARGET_Z: usize = 1;
    /// Position X.
    pub const POS_X: usize = 2;
    /// Position Z.
    pub const POS_Z: usize = 3;
    /// Forward vector X.
    pub const FWD_X: usize = 4;
    /// Forward vector Z.
    pub const FWD_Z: usize = 5;
    /// Velocity X.
    pub const VEL_X: usize = 6;
    /// Velocity Z.
    pub const VEL_Z: usize = 7;
    /// Probe reach used this tick.
    pub const PROBE_UNIT: usize = 8;
    /// First probe hit distance.
    pub const PROBE_FIRST: usize = 9;
    /// Outside-map flag (0 or 1).
    pub const OUTSIDE_MAP: usize = PROBE_FIRST + PROBE_COUNT;
    /// Dead-zone flag (0 or 1).
    pub const IN_DEAD_ZONE: usize = OUTSIDE_MAP + 1;
    /// Length of the sensor vector.
    pub const COUNT: usize = IN_DEAD_ZONE + 1;
}

/// Entries of the control vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Control {
    /// Forward acceleration.
    ForwardAccel = 0,
    /// Backward acceleration.
    BackwardAccel = 1,
    /// Brake.
    Brake = 2,
    /// Steer left.
    SteerLeft = 3,
    /// Steer right.
    SteerRight = 4,
}

impl Control {
    /// Length of the control vector.
    pub const COUNT: usize = 5;

    /// Position in the control vector.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Local-frame probe offsets for a given reach `u`.
pub fn probe_offsets(u: f64) -> [DVec3; PROBE_COUNT] {
    let p0 = DVec3::new(0.0, 0.0, -2.0 * u);
    let p1 = DVec3::new(-u, 0.0, -u);
    let p2 = DVec3::new(u, 0.0, -u);
    let p3 = (p0 + p1) * 0.5;
    let p4 = (p0 + p2) * 0.5;
    let p5 = (p0 + p3) * 0.5;
    let p6 = (p0 + p4) * 0.5;
    [p0, p1, p2, p3, p4, p5, p6]
}

/// Fills `out` with the sensor readings of `body`.
///
/// Every entry is divided by the field size, then the two crash flags are
/// written as plain 0/1.
///
/// # Arguments
///
/// * `out` - Sensor vector of length [`sensor::COUNT`]
/// * `body` - The unit's rigid body
/// * `target` - Target position in world space
/// * `terrain` - Terrain to probe
pub fn build_sensors(out: &mut [Scalar], body: &RigidBody, target: DVec3, terrain: &Terrain) {
    let field = terrain.field_size();
    let pos = body.pos;
    let fwd = body.forward();
    let speed = body.vel.length();
    let probe_unit = (speed * speed * PROBE_SPEED_FACTOR).max(MIN_PROBE_UNIT);

    let mut values = [0.0f64; sensor::COUNT];
    values[sensor::TARGET_X] = target.x;
    values[sensor::TARGET_Z] = target.z;
    values[sensor::POS_X] = pos.x;
    values[sensor::POS_Z] = pos.z;
    values[sensor::FWD_X] = fwd.x;
    values[sensor::FWD_Z] = fwd.z;
    values[sensor::VEL_X] = body.vel.x;
    values[sensor::VEL_Z] = body.vel.z;
    values[sensor::PROBE_UNIT] = probe_unit;

    for (i, offset) in probe_offsets(probe_unit).into_iter().enumerate() {
        let mut hit = field;
        terrain.scan_ray(pos, pos + body.rot * offset, |sample, height, outside| {
            if height > WALL_HEIGHT || outside {
                hit = (sample - pos).length();
                return false;
            }
            true
        });
        values[sensor::PROBE_FIRST + i] = hit;
    }

    for (dst, v) in out.iter_mut().zip(values) {
        *dst = (v / field) as Scalar;
    }
    out[sensor::OUTSIDE_MAP] = if terrain.is_pos_inside(pos) { 0.0 } else { 1.0 };
    out[sensor::IN_DEAD_ZONE] = if terrain.height_at(pos) > WALL_HEIGHT {
        1.0
    } else {
        0.0
    };
}

/// Distance between target and position as seen by the sensors.
pub fn sensed_distance(sensors: &[Scalar]) -> f64 {
    let dx = f64::from(sensors[sensor::TARGET_X] - sensors[sensor::POS_X]);
    let dz = f64::from(sensors[sensor::TARGET_Z] - sensors[sensor::POS_Z]);
    (dx * dx + dz * dz).sqrt()
}

/// Returns true when either crash flag is raised.
pub fn is_crashed(sensors: &[Scalar]) -> bool {
    sensors[sensor::OUTSIDE_MAP] > 0.0 || sensors[sensor::IN_DEAD_ZONE] > 0.0
}

/// Cost of a sensor state: distance to target, crash penalties, and elapsed time
/// as a fraction of the allowed time.
pub fn cost(sensors: &[Scalar], elapsed_s: f64, max_time_s: f64) -> f64 {
    sensed_distance(sensors)
        + CRASH_PENALTY * f64::from(sensors[sensor::OUTSIDE_MAP])
        + CRASH_PENALTY * f64::from(sensors[sensor::IN_DEAD_ZONE])
        + elapsed_s / max_time_s
}

/// Formats a cost as mantissa and power of ten, e.g. `3.250000 10^-2`.
pub fn format_cost(cost: f64) -> String {
    if !(cost.is_finite() && cost > 0.0) {
        return format!("{cost:.6}");
    }
    let mag = cost.log10().floor() as i32;
    let mantissa = cost / 10f64.powi(mag);
    if mag >= 0 {
        format!("{mantissa:.6} 10^{mag}")
    } else {
        format!("{mantissa:.6} 10^-{}", -mag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_has_eighteen_sensors() {
        assert_eq!(sensor::COUNT, 18);
        assert_eq!(sensor::OUTSIDE_MAP, 16);
        assert_eq!(Control::SteerRight.index(), Control::COUNT - 1);
    }

    #[test]
    fn probes_fan_out_ahead() {
        let probes = probe_offsets(10.0);
        assert!(probes.iter().all(|p| p.z < 0.0));
        assert_eq!(probes[0], DVec3::new(0.0, 0.0, -20.0));
        assert_eq!(probes[5], DVec3::new(-2.5, 0.0, -17.5));
    }

    #[test]
    fn crash_flags_add_penalty() {
        let mut s = [0.0 as Scalar; sensor::COUNT];
        let clean = cost(&s, 0.0, 10.0);
        s[sensor::IN_DEAD_ZONE] = 1.0;
        assert!((cost(&s, 0.0, 10.0) - clean - CRASH_PENALTY).abs() < 1e-12);
        assert!(is_crashed(&s));
    }

    #[test]
    fn cost_string_uses_powers_of_ten() {
        assert_eq!(format_cost(325.0), "3.250000 10^2");
        assert_eq!(format_cost(0.0325), "3.250000 10^-2");
    }
}

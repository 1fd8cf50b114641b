use nalgebra::{Matrix2, Point2, Vector2};

/// Longitudinal-only vehicle dynamics: speed and the acceleration that produced it.
/// Lateral velocity is never modeled; lane-change and steering behavior live
/// outside this crate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleDynamic {
    pub vx: f64,
    pub accel: f64,
}

impl VehicleDynamic {
    pub fn new(vx: f64, accel: f64) -> Self {
        debug_assert!(vx >= 0.0, "vx must be non-negative, got {}", vx);
        Self { vx, accel }
    }
}

/// A single recorded or predicted vehicle pose. Immutable once created; every
/// kinematic step produces a new `Pose` rather than mutating an existing one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
    pub cov_lat_long: Matrix2<f64>,
    pub vdy: VehicleDynamic,
    pub t: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, yaw: f64, cov_long: f64, cov_lat: f64, vdy: VehicleDynamic, t: f64) -> Self {
        Self {
            x,
            y,
            yaw,
            cov_lat_long: Matrix2::new(cov_long, 0.0, 0.0, cov_lat),
            vdy,
            t,
        }
    }

    pub fn point(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    /// Unit heading vector (cos yaw, sin yaw).
    pub fn heading(&self) -> Vector2<f64> {
        Vector2::new(self.yaw.cos(), self.yaw.sin())
    }

    pub fn var_long(&self) -> f64 {
        self.cov_lat_long[(0, 0)]
    }

    pub fn var_lat(&self) -> f64 {
        self.cov_lat_long[(1, 1)]
    }

    pub fn std_long(&self) -> f64 {
        self.var_long().max(0.0).sqrt()
    }

    pub fn std_lat(&self) -> f64 {
        self.var_lat().max(0.0).sqrt()
    }

    /// Longitudinal speed in the UTM/world frame. Equal to `vdy.vx` since lateral
    /// velocity is never modeled, but kept as a named accessor to mirror the
    /// `vxUtm` field referenced by the severity kernels.
    pub fn vx_utm(&self) -> f64 {
        self.vdy.vx
    }
}

/// Fixed-precision time key, snapping a timestamp to the 2-decimal grid
/// (`t_n = round(n * dT, 2)`). Keying maps by an integer rather than a raw
/// `f64` sidesteps float-equality hazards when looking poses back up by
/// timestamp.
pub type TimeKey = i64;

pub fn time_key(t: f64) -> TimeKey {
    (t * 100.0).round() as TimeKey
}

pub fn key_to_time(k: TimeKey) -> f64 {
    k as f64 / 100.0
}

/// Fixed-precision key for candidate accelerations, rounding to three
/// decimal places so the optimizer's candidate cache can be keyed by an
/// integer instead of a raw `f64`.
pub type UKey = i64;

pub fn u_key(u: f64) -> UKey {
    (u * 1000.0).round() as UKey
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn heading_matches_yaw() {
        let pose = Pose::new(0.0, 0.0, std::f64::consts::FRAC_PI_2, 1.0, 1.0, VehicleDynamic::new(5.0, 0.0), 0.0);
        let h = pose.heading();
        assert_relative_eq!(h.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(h.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn time_key_round_trips_to_two_decimals() {
        let t = 1.2300001;
        let k = time_key(t);
        assert_relative_eq!(key_to_time(k), 1.23, epsilon = 1e-9);
    }

    #[test]
    fn u_key_round_trips_to_three_decimals() {
        assert_eq!(u_key(-2.4995), -2500);
        assert_eq!(u_key(0.00049), 0);
    }
}

//! Longitudinal pose propagation shared by the ego vehicle and every other
//! agent. A fixed-step Euler discretization is assumed throughout; there is
//! no continuous-time integrator here.

use std::collections::BTreeMap;

use nalgebra::Point2;

use crate::config::Config;
use crate::pose::{time_key, Pose, TimeKey, VehicleDynamic};

/// Advance `last` by one `dT` step under constant acceleration `u`. Speed is
/// clamped at zero (vehicles don't reverse), `x`/`y` advance along the
/// (unchanged) heading using the trapezoidal average speed, and the position
/// covariance grows by a fixed process-noise rate per unit time.
pub fn update_pose(last: &Pose, u: f64, dt: f64, config: &Config) -> Pose {
    let next_vx = (last.vdy.vx + u * dt).max(0.0);
    let avg_v = (last.vdy.vx + next_vx) / 2.0;
    let heading = last.heading();

    let x = last.x + avg_v * heading.x * dt;
    let y = last.y + avg_v * heading.y * dt;

    let cov_long = last.var_long() + config.cov_long_rate * dt;
    let cov_lat = last.var_lat() + config.cov_lat_rate * dt;

    Pose::new(x, y, last.yaw, cov_long, cov_lat, VehicleDynamic::new(next_vx, u), last.t + dt)
}

/// Repeated `update_pose` from `last` up to (and including) `t_end`, at `dt`
/// spacing, keyed by the 2-decimal-rounded timestamp.
pub fn update_pose_list(last: &Pose, u: f64, t_end: f64, dt: f64, config: &Config) -> BTreeMap<TimeKey, Pose> {
    let mut out = BTreeMap::new();
    let mut pose = *last;
    let end_key = time_key(t_end);

    loop {
        let next = update_pose(&pose, u, dt, config);
        let next_key = time_key(next.t);
        if next_key > end_key {
            break;
        }
        out.insert(next_key, next);
        pose = next;
        if next_key == end_key {
            break;
        }
    }

    out
}

/// Constant deceleration such that speed reaches exactly zero at `to`,
/// starting from `vx` at `from`. Precondition: `from != to`; callers must
/// not invoke this with coincident points, since the division by zero
/// that would result is a programmer error, not a runtime condition to
/// recover from.
pub fn compute_acc_to_stop(from: Point2<f64>, to: Point2<f64>, vx: f64) -> f64 {
    let distance = (to - from).norm();
    assert!(distance > 0.0, "compute_acc_to_stop requires from != to (distance > 0)");
    -(vx * vx) / (2.0 * distance)
}

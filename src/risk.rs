//! Collision indicator, event-rate, severity, risk, survival, and
//! limited-field-of-view kernels. Every function here is pure and
//! deterministic; nothing here reads or writes agent/ego state.

use nalgebra::Point2;

use crate::config::{Config, EventRateModel};
use crate::geometry::{polygon_distance, polygon_intersects};
use crate::pose::Pose;

/// Soft intersection score in `[0, 1]`. Returns `1.0` whenever the two
/// oriented rectangles actually overlap; otherwise a monotonically
/// decreasing function of the minimum polygon-to-polygon distance, scaled by
/// the agents' combined positional uncertainty (`covLatLong`). The combined
/// uncertainty term is symmetric in the two poses, so swapping `ego`/`obj`
/// (covariances included) leaves the result unchanged.
pub fn collision_indicator(
    _ego_pose: &Pose,
    ego_poly: &[Point2<f64>; 4],
    obj_pose: &Pose,
    obj_poly: &[Point2<f64>; 4],
) -> f64 {
    if polygon_intersects(ego_poly, obj_poly) {
        return 1.0;
    }
    let dist = polygon_distance(ego_poly, obj_poly);
    let combined_var = _ego_pose.var_long() + _ego_pose.var_lat() + obj_pose.var_long() + obj_pose.var_lat();
    let sigma = (combined_var / 2.0).max(1e-6).sqrt();
    (-0.5 * (dist / sigma).powi(2)).exp().clamp(0.0, 1.0)
}

/// Hazard rate implied by a collision indicator. `method` selects between an
/// exponential saturation curve (zero at `indicator = 0`, approaching
/// `rate_max` as indicator grows) and a logistic curve centered at
/// `indicator = 0.5`. Monotone non-decreasing in `indicator`, bounded above
/// by `rate_max`.
pub fn collision_event_rate(indicator: f64, rate_max: f64, method: EventRateModel, beta: f64) -> f64 {
    match method {
        EventRateModel::Exp => rate_max * (1.0 - (-beta * indicator).exp()),
        EventRateModel::Sig => rate_max / (1.0 + (-beta * (indicator - 0.5)).exp()),
    }
}

fn logistic(x: f64, center: f64, floor: f64, ceiling_above_floor: f64) -> f64 {
    floor + ceiling_above_floor / (1.0 + (-(x - center)).exp())
}

/// Default injury-severity model shared by static objects, resting vehicles,
/// moving vehicles, and pedestrians: a logistic curve in closing speed,
/// floored at `config.severity_min_weight`. `sig_vx` is the inflection point
/// of the curve and is the one place callers differ — pedestrians pass
/// `config.severity_sig_avg_vx_pedes` instead of the generic
/// `config.severity_sig_avg_vx`.
pub fn collision_event_severity(ego_vx: f64, obj_vx: f64, config: &Config, sig_vx: f64) -> f64 {
    let closing_speed = (ego_vx.powi(2) + obj_vx.powi(2)).sqrt();
    logistic(closing_speed, sig_vx, config.severity_min_weight, 1.0 - config.severity_min_weight)
}

/// Hypothetical-pedestrian severity: a logistic term plus a Gompertz term,
/// both centered on `avg_vx`, floored at `min_weight`.
#[allow(clippy::too_many_arguments)]
pub fn collision_severity_hypo_pedes(
    ego_vx: f64,
    obj_vx: f64,
    min_weight: f64,
    avg_vx: f64,
    sig_max: f64,
    sig_beta: f64,
    gom_max: f64,
    gom_beta: f64,
) -> f64 {
    let closing_speed = (ego_vx.powi(2) + obj_vx.powi(2)).sqrt();
    let logistic_term = sig_max / (1.0 + (-sig_beta * (closing_speed - avg_vx)).exp());
    let gompertz_term = gom_max * (-(-gom_beta * (closing_speed - avg_vx)).exp()).exp();
    (min_weight + logistic_term + gompertz_term).max(min_weight)
}

/// Hypothetical-vehicle severity: a quadratic closing-speed term plus a
/// logistic term, floored at `min_weight`.
#[allow(clippy::too_many_arguments)]
pub fn collision_severity_hypo_veh(
    ego_vx: f64,
    obj_vx: f64,
    quad_weight: f64,
    min_weight: f64,
    sig_max: f64,
    sig_avg_vx: f64,
    sig_beta: f64,
) -> f64 {
    let closing_speed = (ego_vx.powi(2) + obj_vx.powi(2)).sqrt();
    let quad_term = quad_weight * closing_speed.powi(2);
    let logistic_term = sig_max / (1.0 + (-sig_beta * (closing_speed - sig_avg_vx)).exp());
    (min_weight + quad_term + logistic_term).max(min_weight)
}

/// `severity * rate`.
pub fn collision_risk(severity: f64, rate: f64) -> f64 {
    severity * rate
}

/// Event rate and risk contributed by a hazard that could emerge from behind
/// the field-of-view boundary. `d_stop` is the distance ego would need to
/// come to a stop, including reaction delay, braking distance, a fixed
/// safety margin, and a `fov_std_k`-scaled longitudinal position
/// uncertainty term. The indicator saturates to `1.0` once `d_stop` reaches
/// `fov_range`, and the returned rate saturates correspondingly at
/// `rate_max`.
#[allow(clippy::too_many_arguments)]
pub fn limit_view_risk(
    fov_range: f64,
    ego_vx: f64,
    a_brake: f64,
    d_brake: f64,
    std_lon: f64,
    t_react: f64,
    fov_std_k: f64,
    rate_max: f64,
    rate_beta: f64,
    sev_min_weight: f64,
    sev_weight: f64,
) -> (f64, f64) {
    let d_stop = ego_vx * t_react + ego_vx.powi(2) / (2.0 * a_brake.abs()) + d_brake + fov_std_k * std_lon;
    let indicator = if fov_range <= 0.0 {
        1.0
    } else {
        (d_stop / fov_range).clamp(0.0, 1.0)
    };
    let rate = rate_max * (1.0 - (-rate_beta * indicator).exp());
    let severity = sev_min_weight.max(sev_weight * ego_vx.powi(2));
    (rate, rate * severity)
}

/// Constant baseline hazard rate modeling unmodeled causes of termination.
pub fn escape_rate(r: f64) -> f64 {
    r
}

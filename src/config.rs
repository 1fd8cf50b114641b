use std::path::Path;

use serde::{Deserialize, Serialize};

/// Collision event-rate model shape (see `collision_event_rate` in `risk.rs`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventRateModel {
    Exp,
    Sig,
}

impl std::str::FromStr for EventRateModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exp" => Ok(Self::Exp),
            "sig" => Ok(Self::Sig),
            _ => Err(format!("invalid event rate model '{}'", s)),
        }
    }
}

/// Severity model shape shared by the vehicle/pedestrian collision kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityModel {
    Logistic,
}

/// All named numeric parameters referenced throughout the planner. A
/// read-mostly record threaded by reference into kinematics, risk, and
/// planner code, mirroring the reference crate's `Parameters` struct: most
/// fields are set once at construction via `Config::default()` and never
/// mutated again. The two exceptions are the time-grid fields, which
/// `set_time_parameters` is allowed to rewrite before the first tick.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    // time grid
    pub dt: f64,
    pub simulation_time: f64,
    pub predict_time: f64,
    pub predict_step: f64,

    // acceleration / jerk bounds
    pub a_min: f64,
    pub a_max: f64,
    pub a_max_brake: f64,
    pub j_max: f64,
    pub j_max_brake: f64,

    // braking timing
    pub t_brake: f64,
    pub t_brake_delay: f64,
    pub d_brake_min: f64,

    // utility cost weights
    pub c_cruise: f64,
    pub c_v_cruise: f64,
    pub c_comfort: f64,
    pub c_jerk: f64,

    // collision kernels, vehicles
    pub collision_rate_max: f64,
    pub collision_rate_exp_beta: f64,
    pub collision_rate_exp_beta_pedes: f64,
    pub collision_event_rate_model: EventRateModel,
    pub collision_severity_model: SeverityModel,
    pub severity_sig_avg_vx: f64,
    pub severity_sig_avg_vx_pedes: f64,
    pub severity_min_weight: f64,
    pub min_col_brake_vehicle: f64,
    pub min_col_brake_pedestrian: f64,

    // escape rate / FOV
    pub escape_rate: f64,
    pub enable_fov_aware: bool,
    pub fov_eventrate_max: f64,
    pub fov_eventrate_beta: f64,
    pub fov_severity_min: f64,
    pub fov_severity_weight: f64,
    pub fov_std_k: f64,

    // hypothetical pedestrian
    pub enable_awareness_rate: bool,
    pub enable_hypothesis: bool,
    pub collision_hypopedes_rate_max: f64,
    pub event_rate_hypopedes_model: EventRateModel,
    pub event_rate_hypopedes_exp_beta: f64,
    pub event_rate_hypopedes_sig_beta: f64,
    pub severity_hypopedes_min_weight: f64,
    pub severity_hypopedes_avg_vx: f64,
    pub severity_hypopedes_sig_max: f64,
    pub severity_hypopedes_sig_beta: f64,
    pub severity_hypopedes_gom_max: f64,
    pub severity_hypopedes_gom_beta: f64,

    // hypothetical vehicle
    pub collision_hypoveh_rate_max: f64,
    pub event_rate_hypoveh_model: EventRateModel,
    pub event_rate_hypoveh_exp_beta: f64,
    pub event_rate_hypoveh_sig_beta: f64,
    pub severity_quad_weight: f64,
    pub severity_hypoveh_min_weight: f64,
    pub severity_hypoveh_sig_max: f64,
    pub severity_hypoveh_avg_vx: f64,
    pub severity_hypoveh_sig_b: f64,

    // misc
    pub scan_radius: f64,

    // covariance propagation rates (per unit time), exposed as config
    // rather than hard-coded constants so sensor-specific tuning doesn't
    // require a code change.
    pub cov_long_rate: f64,
    pub cov_lat_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dt: 0.1,
            simulation_time: 10.0,
            predict_time: 3.0,
            predict_step: 0.2,

            a_min: -3.0,
            a_max: 2.0,
            a_max_brake: -6.0,
            j_max: 1.0,
            j_max_brake: 3.0,

            t_brake: 0.3,
            t_brake_delay: 0.3,
            d_brake_min: 2.0,

            c_cruise: 1.0,
            c_v_cruise: 8.0,
            c_comfort: 0.2,
            c_jerk: 0.2,

            collision_rate_max: 5.0,
            collision_rate_exp_beta: 4.0,
            collision_rate_exp_beta_pedes: 6.0,
            collision_event_rate_model: EventRateModel::Exp,
            collision_severity_model: SeverityModel::Logistic,
            severity_sig_avg_vx: 8.0,
            severity_sig_avg_vx_pedes: 5.0,
            severity_min_weight: 0.1,
            min_col_brake_vehicle: 0.5,
            min_col_brake_pedestrian: 0.3,

            escape_rate: 0.01,
            enable_fov_aware: true,
            fov_eventrate_max: 2.0,
            fov_eventrate_beta: 3.0,
            fov_severity_min: 0.1,
            fov_severity_weight: 0.02,
            fov_std_k: 1.0,

            enable_awareness_rate: true,
            enable_hypothesis: true,
            collision_hypopedes_rate_max: 2.0,
            event_rate_hypopedes_model: EventRateModel::Sig,
            event_rate_hypopedes_exp_beta: 4.0,
            event_rate_hypopedes_sig_beta: 6.0,
            severity_hypopedes_min_weight: 0.1,
            severity_hypopedes_avg_vx: 5.0,
            severity_hypopedes_sig_max: 0.6,
            severity_hypopedes_sig_beta: 1.0,
            severity_hypopedes_gom_max: 0.6,
            severity_hypopedes_gom_beta: 1.0,

            collision_hypoveh_rate_max: 2.0,
            event_rate_hypoveh_model: EventRateModel::Sig,
            event_rate_hypoveh_exp_beta: 4.0,
            event_rate_hypoveh_sig_beta: 6.0,
            severity_quad_weight: 0.01,
            severity_hypoveh_min_weight: 0.1,
            severity_hypoveh_sig_max: 0.6,
            severity_hypoveh_avg_vx: 8.0,
            severity_hypoveh_sig_b: 1.0,

            scan_radius: 50.0,

            cov_long_rate: 0.05,
            cov_lat_rate: 0.02,
        }
    }
}

impl Config {
    /// Rewrites the time-grid fields only. Meant to be called before the
    /// first `Core::mv` tick; changing the step size mid-run would
    /// invalidate any cached predictions keyed by the old grid.
    pub fn set_time_parameters(&mut self, dt: f64, simulation_time: f64, predict_time: f64) {
        self.dt = dt;
        self.simulation_time = simulation_time;
        self.predict_time = predict_time;
    }

    /// Load defaults, optionally layering a TOML file and `PLANNER_*`
    /// environment variables on top via the `config` crate. Returns
    /// `Config::default()` untouched if `path` is `None` and no `PLANNER_*`
    /// variables are set.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(config::Environment::with_prefix("PLANNER"));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_internally_consistent() {
        let c = Config::default();
        assert!(c.a_min < 0.0 && c.a_max > 0.0);
        assert!(c.a_max_brake < c.a_min);
        assert!(c.j_max > 0.0 && c.j_max_brake > 0.0);
        assert!(c.predict_step > 0.0 && c.predict_time > c.predict_step);
    }

    #[test]
    fn set_time_parameters_only_touches_time_grid() {
        let mut c = Config::default();
        let before_a_max = c.a_max;
        c.set_time_parameters(0.05, 20.0, 4.0);
        assert_eq!(c.dt, 0.05);
        assert_eq!(c.simulation_time, 20.0);
        assert_eq!(c.predict_time, 4.0);
        assert_eq!(c.a_max, before_a_max);
    }
}

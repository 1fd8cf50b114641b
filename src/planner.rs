//! The per-tick ego planning pipeline: environment search, bounded
//! acceleration search, mode transition, and the committing move. Free
//! functions over `&mut EgoVehicle` / `&mut Environment` rather than
//! methods on a self-referential struct, since the optimizer needs
//! simultaneous access to both.

use std::collections::BTreeMap;

use nalgebra::Point2;

use fstrings::eprintln_f;

use crate::agent::HypotheticalExtra;
use crate::config::{Config, EventRateModel};
use crate::ego::{CandidateOutcome, EgoVehicle, Mode};
use crate::environment::{Environment, EnvironmentSnapshot};
use crate::error::FailureKind;
use crate::geometry::{inflate_forward, polygon_intersects, rectangle};
use crate::kinematics::{update_pose, update_pose_list};
use crate::minimize::golden_section_min;
use crate::pose::{key_to_time, time_key, u_key, Pose};
use crate::risk;

/// One sample of the non-rendering risk/rate/survival re-derivation
/// produced by `export_risk_history`.
#[derive(Clone, Copy, Debug)]
pub struct PassedCostSample {
    pub t: f64,
    pub rate: f64,
    pub risk: f64,
    pub survival: f64,
}

/// Runs one full planning tick: search the environment, run the bounded
/// acceleration search, apply the mode transition, and commit the move.
pub fn optimize(ego: &mut EgoVehicle, env: &mut Environment, config: &Config) {
    let now = ego.current_pose.t;
    let snapshot = env.current_object_list(now, config.predict_step, config.predict_time, config);

    ego.ttb = (ego.current_velocity() / config.a_max_brake).abs() + config.t_brake;
    ego.candidates.clear();
    ego.brake = false;
    ego.min_col_value = 0.0;
    ego.perate.clear();

    let (lo, hi) = search_bounds(ego.mode, ego.u, config);
    let chosen_u = golden_section_min(|u| total_cost(u, ego, env, &snapshot, config), lo, hi, 5);
    // Guarantees a candidate cache entry for the winning u regardless of
    // which points the minimizer actually sampled.
    total_cost(chosen_u, ego, env, &snapshot, config);

    let outcome = ego.candidates.get(&u_key(chosen_u)).copied().unwrap_or_default();
    apply_mode_transition(ego, chosen_u, outcome, config);
    commit_move(ego, env, config);
}

fn search_bounds(mode: Mode, u: f64, config: &Config) -> (f64, f64) {
    match mode {
        Mode::Stop => (0.0, config.j_max),
        Mode::DriveOff => {
            let lo = (u - config.j_max).max(0.5 * config.a_min);
            let hi = (u + config.j_max).min(0.5 * config.a_max);
            if lo >= hi {
                eprintln_f!("{FailureKind::DegenerateBounds:?} in DriveOff search, u={u:.3}, falling back");
                (0.5 * config.a_min, 0.5 * config.a_min + config.j_max)
            } else {
                (lo, hi)
            }
        }
        Mode::Default => {
            let lo = (u - config.j_max).max(config.a_min);
            let hi = (u + config.j_max).min(config.a_max);
            if lo >= hi {
                eprintln_f!("{FailureKind::DegenerateBounds:?} in Default search, u={u:.3}, falling back");
                (config.a_min, config.a_min + config.j_max)
            } else {
                (lo, hi)
            }
        }
        Mode::Emergency => {
            let lo = (u - config.j_max_brake).max(config.a_max_brake);
            let hi = u - config.j_max_brake;
            if lo >= hi {
                eprintln_f!("{FailureKind::DegenerateBounds:?} in Emergency search, u={u:.3}, falling back");
                (config.a_max_brake, u)
            } else {
                (lo, hi)
            }
        }
    }
}

fn apply_mode_transition(ego: &mut EgoVehicle, chosen_u: f64, outcome: CandidateOutcome, config: &Config) {
    let blend = |base: f64| base + (chosen_u - base) * (config.dt / config.predict_step);

    match ego.mode {
        Mode::Stop => {
            if outcome.brake || outcome.min_col_value > 0.5 {
                ego.p_u = 0.0;
                ego.u = 0.0;
            } else {
                ego.mode = Mode::DriveOff;
                ego.p_u = blend(ego.u);
            }
        }
        Mode::DriveOff => {
            if outcome.brake {
                ego.mode = Mode::Emergency;
            }
            ego.p_u = blend(ego.u);
        }
        Mode::Default => {
            if outcome.brake {
                ego.mode = Mode::Emergency;
            }
            ego.p_u = blend(ego.u);
        }
        Mode::Emergency => {
            ego.p_u = blend(ego.u);
        }
    }
}

fn commit_move(ego: &mut EgoVehicle, env: &mut Environment, config: &Config) {
    let next = update_pose(&ego.current_pose, ego.p_u, config.dt, config);
    ego.u = ego.p_u;
    ego.current_pose = next;
    ego.poses.insert(time_key(next.t), next);
    ego.u_history.insert(time_key(next.t), ego.u);

    if next.vdy.vx == 0.0 {
        ego.mode = Mode::Stop;
        ego.u = 0.0;
    } else if ego.mode == Mode::DriveOff && next.vdy.vx > 5.0 {
        ego.mode = Mode::Default;
    }

    env.move_agents(config.dt, config);
}

fn utility(vx: f64, u: f64, u_current: f64, config: &Config) -> f64 {
    let v_err = vx - config.c_v_cruise;
    let over_cruise_mult = if vx > config.c_v_cruise { 10.0 } else { 1.0 };
    let v_term = config.c_cruise * v_err.powi(2) * over_cruise_mult;
    let a_term = config.c_comfort * u.powi(2);
    let j_term = config.c_jerk * (u - u_current).powi(2);
    v_term + a_term + j_term
}

fn total_cost(u: f64, ego: &mut EgoVehicle, env: &mut Environment, snapshot: &EnvironmentSnapshot, config: &Config) -> f64 {
    let last = ego.current_pose;
    let u_current = ego.u;
    let now = last.t;
    let ttb_end = now + ego.ttb;

    let ppose = update_pose_list(&last, u, now + config.predict_time, config.predict_step, config);

    let mut cost = 0.0_f64;
    let mut cum_rate = 0.0_f64;
    let mut survival = 1.0_f64;
    let mut brake = false;
    let mut min_col_value = 0.0_f64;
    let mut perate = BTreeMap::new();

    for (&tkey, &pose) in ppose.iter() {
        let t = key_to_time(tkey);
        let ego_poly = rectangle(&pose, ego.length, ego.width);
        let within_ttb = t <= ttb_end;

        let u_cost = utility(pose.vdy.vx, u, u_current, config);
        let (risk_cost, rate, local_brake, local_min_col) = risk_at(t, within_ttb, &pose, &ego_poly, env, snapshot, config);

        brake = brake || local_brake;
        min_col_value = min_col_value.max(local_min_col);

        cum_rate += rate;
        let escape = risk::escape_rate(config.escape_rate);
        survival = (-(escape + cum_rate) * config.predict_step).exp();
        if !survival.is_finite() {
            survival = 0.0;
        }

        cost += (u_cost + risk_cost) * survival;
        perate.insert(tkey, rate + escape);
    }

    ego.ppose = ppose;
    ego.perate = perate;
    ego.brake = brake;
    ego.min_col_value = min_col_value;
    ego.candidates.insert(u_key(u), CandidateOutcome { brake, min_col_value });

    cost * survival * config.predict_step
}

fn event_rate_beta(model: EventRateModel, exp_beta: f64, sig_beta: f64) -> f64 {
    match model {
        EventRateModel::Exp => exp_beta,
        EventRateModel::Sig => sig_beta,
    }
}

fn static_contribution(ego_vx: f64, config: &Config) -> (f64, f64) {
    let severity = risk::collision_event_severity(ego_vx, 0.0, config, config.severity_sig_avg_vx);
    (config.collision_rate_max, config.collision_rate_max * severity)
}

/// `(rate, risk, indicator)` for one moving agent, sharing the exp/sig
/// event-rate and severity-blend selection between the live planner loop
/// and the recorded-trajectory diagnostic.
fn moving_agent_contribution(
    ego_pose: &Pose,
    ego_poly: &[Point2<f64>; 4],
    obj_pose: &Pose,
    obj_poly: &[Point2<f64>; 4],
    is_pedestrian: bool,
    hypo: Option<HypotheticalExtra>,
    config: &Config,
) -> (f64, f64, f64) {
    let indicator = risk::collision_indicator(ego_pose, ego_poly, obj_pose, obj_poly);

    if let Some(extra) = hypo {
        let scaled = indicator * extra.appear_rate;
        if is_pedestrian {
            let beta = event_rate_beta(config.event_rate_hypopedes_model, config.event_rate_hypopedes_exp_beta, config.event_rate_hypopedes_sig_beta);
            let mut rate = risk::collision_event_rate(scaled, config.collision_hypopedes_rate_max, config.event_rate_hypopedes_model, beta);
            if config.enable_awareness_rate {
                rate *= extra.interact_rate;
            }
            let severity = risk::collision_severity_hypo_pedes(
                ego_pose.vdy.vx,
                obj_pose.vdy.vx,
                config.severity_hypopedes_min_weight,
                config.severity_hypopedes_avg_vx,
                config.severity_hypopedes_sig_max,
                config.severity_hypopedes_sig_beta,
                config.severity_hypopedes_gom_max,
                config.severity_hypopedes_gom_beta,
            );
            (rate, rate * severity, indicator)
        } else {
            let beta = event_rate_beta(config.event_rate_hypoveh_model, config.event_rate_hypoveh_exp_beta, config.event_rate_hypoveh_sig_beta);
            let mut rate = risk::collision_event_rate(scaled, config.collision_hypoveh_rate_max, config.event_rate_hypoveh_model, beta);
            if config.enable_awareness_rate {
                rate *= extra.interact_rate;
            }
            let severity = risk::collision_severity_hypo_veh(
                ego_pose.vdy.vx,
                obj_pose.vdy.vx,
                config.severity_quad_weight,
                config.severity_hypoveh_min_weight,
                config.severity_hypoveh_sig_max,
                config.severity_hypoveh_avg_vx,
                config.severity_hypoveh_sig_b,
            );
            (rate, rate * severity, indicator)
        }
    } else if is_pedestrian {
        let rate = risk::collision_event_rate(indicator, config.collision_rate_max, config.collision_event_rate_model, config.collision_rate_exp_beta_pedes);
        let severity = risk::collision_event_severity(ego_pose.vdy.vx, obj_pose.vdy.vx, config, config.severity_sig_avg_vx_pedes);
        (rate, rate * severity, indicator)
    } else {
        let rate = risk::collision_event_rate(indicator, config.collision_rate_max, config.collision_event_rate_model, config.collision_rate_exp_beta);
        let severity = risk::collision_event_severity(ego_pose.vdy.vx, obj_pose.vdy.vx, config, config.severity_sig_avg_vx);
        (rate, rate * severity, indicator)
    }
}

#[allow(clippy::too_many_arguments)]
fn risk_at(
    t: f64,
    within_ttb: bool,
    ego_pose: &Pose,
    ego_poly: &[Point2<f64>; 4],
    env: &mut Environment,
    snapshot: &EnvironmentSnapshot,
    config: &Config,
) -> (f64, f64, bool, f64) {
    let mut total_risk = 0.0_f64;
    // Escape is added once, outside this per-step sum, when the caller forms
    // the survival exponent — folding it in here would count it N times by
    // step N instead of once.
    let mut total_rate = 0.0_f64;
    let mut brake = false;
    let mut min_col_value = 0.0_f64;

    if config.enable_fov_aware {
        let (rate, risk_contrib) = risk::limit_view_risk(
            snapshot.fov_range,
            ego_pose.vdy.vx,
            config.a_min,
            config.d_brake_min,
            ego_pose.std_long(),
            config.t_brake_delay,
            config.fov_std_k,
            config.fov_eventrate_max,
            config.fov_eventrate_beta,
            config.fov_severity_min,
            config.fov_severity_weight,
        );
        total_rate += rate;
        total_risk += risk_contrib;
    }

    let inflated = inflate_forward(ego_poly, ego_pose.heading(), config.d_brake_min);

    for obj in snapshot.static_objects.iter() {
        if polygon_intersects(&inflated, &obj.polygon) {
            let (rate, risk_contrib) = static_contribution(ego_pose.vdy.vx, config);
            total_rate += rate;
            total_risk += risk_contrib;
            min_col_value = min_col_value.max(1.0);
            brake = brake || within_ttb;
        }
    }

    for &id in snapshot.static_vehicle_ids.iter() {
        let hit = env
            .agent_mut(id)
            .and_then(|a| a.predict_at(t, config.predict_step, config.predict_time, config))
            .map(|(_, poly)| polygon_intersects(&inflated, &poly))
            .unwrap_or(false);
        if hit {
            let (rate, risk_contrib) = static_contribution(ego_pose.vdy.vx, config);
            total_rate += rate;
            total_risk += risk_contrib;
            min_col_value = min_col_value.max(1.0);
            brake = brake || within_ttb;
        }
    }

    for &id in snapshot.vehicle_ids.iter() {
        if let Some((obj_pose, obj_poly)) = env.agent_mut(id).and_then(|a| a.predict_at(t, config.predict_step, config.predict_time, config)) {
            let (rate, risk_contrib, indicator) = moving_agent_contribution(ego_pose, ego_poly, &obj_pose, &obj_poly, false, None, config);
            total_rate += rate;
            total_risk += risk_contrib;
            min_col_value = min_col_value.max(indicator);
            if within_ttb && indicator > config.min_col_brake_vehicle {
                brake = true;
            }
            env.set_collision_prob(id, indicator);
        }
    }

    for &id in snapshot.pedestrian_ids.iter() {
        if let Some((obj_pose, obj_poly)) = env.agent_mut(id).and_then(|a| a.predict_at(t, config.predict_step, config.predict_time, config)) {
            let (rate, risk_contrib, indicator) = moving_agent_contribution(ego_pose, ego_poly, &obj_pose, &obj_poly, true, None, config);
            total_rate += rate;
            total_risk += risk_contrib;
            min_col_value = min_col_value.max(indicator);
            if within_ttb && indicator > config.min_col_brake_pedestrian {
                brake = true;
            }
            env.set_collision_prob(id, indicator);
        }
    }

    for &id in snapshot.hypo_vehicle_ids.iter() {
        if let Some(agent) = env.agent_mut(id) {
            let extra = agent.hypothetical_extra();
            if let Some((obj_pose, obj_poly)) = agent.predict_at(t, config.predict_step, config.predict_time, config) {
                let (rate, risk_contrib, indicator) = moving_agent_contribution(ego_pose, ego_poly, &obj_pose, &obj_poly, false, extra, config);
                total_rate += rate;
                total_risk += risk_contrib;
                agent.set_collision_prob(indicator);
            }
        }
    }

    for &id in snapshot.hypo_pedestrian_ids.iter() {
        if let Some(agent) = env.agent_mut(id) {
            let extra = agent.hypothetical_extra();
            if let Some((obj_pose, obj_poly)) = agent.predict_at(t, config.predict_step, config.predict_time, config) {
                let (rate, risk_contrib, indicator) = moving_agent_contribution(ego_pose, ego_poly, &obj_pose, &obj_poly, true, extra, config);
                total_rate += rate;
                total_risk += risk_contrib;
                agent.set_collision_prob(indicator);
            }
        }
    }

    (total_risk, total_rate, brake, min_col_value)
}

/// Re-derives collision risk/rate/survival over the committed trajectory
/// (not the predicted one) for every agent whose history overlaps it. A
/// diagnostic: never called from `optimize`, never mutates agent state.
pub fn export_risk_history(ego: &EgoVehicle, env: &Environment, config: &Config) -> Vec<PassedCostSample> {
    let mut out = Vec::with_capacity(ego.poses.len());
    let mut cum_rate = 0.0_f64;

    for (&tkey, &pose) in ego.poses.iter() {
        let t = key_to_time(tkey);
        let ego_poly = rectangle(&pose, ego.length, ego.width);
        let inflated = inflate_forward(&ego_poly, pose.heading(), config.d_brake_min);

        // Escape is added once below, outside the cumulative sum, matching
        // the fix in `risk_at`/`total_cost`.
        let mut rate = 0.0_f64;
        let mut risk_total = 0.0_f64;

        if config.enable_fov_aware {
            let (r, risk_contrib) = risk::limit_view_risk(
                env.fov_range(),
                pose.vdy.vx,
                config.a_min,
                config.d_brake_min,
                pose.std_long(),
                config.t_brake_delay,
                config.fov_std_k,
                config.fov_eventrate_max,
                config.fov_eventrate_beta,
                config.fov_severity_min,
                config.fov_severity_weight,
            );
            rate += r;
            risk_total += risk_contrib;
        }

        for obj in env.static_objects() {
            if polygon_intersects(&inflated, &obj.polygon) {
                let (r, risk_contrib) = static_contribution(pose.vdy.vx, config);
                rate += r;
                risk_total += risk_contrib;
            }
        }

        let vehicle_like = env.vehicles().iter().chain(env.hypo_vehicles().iter());
        for agent in vehicle_like {
            if agent.start_time() > t {
                continue;
            }
            let obj_pose = match agent.pose_at(t) {
                Some(p) => p,
                None => continue,
            };
            if obj_pose.vdy.vx == 0.0 && !agent.is_hypothetical() {
                let obj_poly = rectangle(&obj_pose, agent.length(), agent.width());
                if polygon_intersects(&inflated, &obj_poly) {
                    let (r, risk_contrib) = static_contribution(pose.vdy.vx, config);
                    rate += r;
                    risk_total += risk_contrib;
                }
                continue;
            }
            let obj_poly = rectangle(&obj_pose, agent.length(), agent.width());
            let (r, risk_contrib, _indicator) = moving_agent_contribution(&pose, &ego_poly, &obj_pose, &obj_poly, false, agent.hypothetical_extra(), config);
            rate += r;
            risk_total += risk_contrib;
        }

        let pedestrian_like = env.pedestrians().iter().chain(env.hypo_pedestrians().iter());
        for agent in pedestrian_like {
            if agent.start_time() > t {
                continue;
            }
            let obj_pose = match agent.pose_at(t) {
                Some(p) => p,
                None => continue,
            };
            let obj_poly = rectangle(&obj_pose, agent.length(), agent.width());
            let (r, risk_contrib, _indicator) = moving_agent_contribution(&pose, &ego_poly, &obj_pose, &obj_poly, true, agent.hypothetical_extra(), config);
            rate += r;
            risk_total += risk_contrib;
        }

        cum_rate += rate;
        let escape = risk::escape_rate(config.escape_rate);
        let survival = (-(escape + cum_rate) * config.dt).exp();
        out.push(PassedCostSample { t, rate: rate + escape, risk: risk_total, survival });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn stop_mode_bounds_are_non_negative() {
        let config = Config::default();
        let (lo, hi) = search_bounds(Mode::Stop, 0.0, &config);
        assert_eq!(lo, 0.0);
        assert_relative_eq!(hi, config.j_max);
    }

    #[test]
    fn default_mode_falls_back_when_bracket_collapses() {
        let config = Config::default();
        let (lo, hi) = search_bounds(Mode::Default, config.a_max + 10.0, &config);
        assert!(hi > lo);
        assert_relative_eq!(lo, config.a_min);
    }

    #[test]
    fn a_clear_road_settles_toward_cruise_speed() {
        let config = Config::default();
        let mut ego = EgoVehicle::new(4.5, 1.8, 0.0, 0.0, 0.0, 0.1, 0.1, 4.0, 0.0, 0.0);
        let mut env = Environment::new();

        for _ in 0..80 {
            optimize(&mut ego, &mut env, &config);
        }

        assert!(ego.current_velocity() > 4.0);
        assert!((ego.current_velocity() - config.c_v_cruise).abs() < 2.0);
    }

    #[test]
    fn a_vehicle_stopped_directly_ahead_forces_braking() {
        let config = Config::default();
        let mut ego = EgoVehicle::new(4.5, 1.8, 0.0, 0.0, 0.0, 0.1, 0.1, 10.0, 0.0, 0.0);
        let mut env = Environment::new();
        env.add_vehicle(crate::agent::Agent::new_vehicle(
            0,
            4.5,
            1.8,
            Point2::new(15.0, 0.0),
            Point2::new(15.0, 0.0),
            0.1,
            0.1,
            0.0,
            0.0,
            false,
            &config,
        ));

        let mut min_vx = f64::MAX;
        for _ in 0..40 {
            optimize(&mut ego, &mut env, &config);
            min_vx = min_vx.min(ego.current_velocity());
        }

        assert!(min_vx < 10.0);
    }
}

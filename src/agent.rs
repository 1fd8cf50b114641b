//! The four dynamic agent kinds (`OtherVehicle`, `Pedestrian`,
//! `HypotheticalVehicle`, `HypotheticalPedestrian`) plus static scenario
//! geometry. Modeled as a tagged enum with inherent `match`-dispatched
//! methods rather than a trait object, so the risk kernel branches on agent
//! tag directly instead of going through inheritance/dynamic dispatch.

use std::collections::BTreeMap;

use nalgebra::Point2;

use crate::config::Config;
use crate::geometry::rectangle;
use crate::kinematics::{compute_acc_to_stop, update_pose, update_pose_list};
use crate::pose::{time_key, Pose, TimeKey, VehicleDynamic};

/// A fixed, non-predicted obstacle polygon supplied by the (external)
/// scenario builder.
#[derive(Clone, Debug)]
pub struct StaticObject {
    pub id: u64,
    pub polygon: Vec<Point2<f64>>,
}

impl StaticObject {
    pub fn new(id: u64, polygon: Vec<Point2<f64>>) -> Self {
        assert!(polygon.len() >= 3, "a static object polygon needs at least 3 vertices");
        Self { id, polygon }
    }

    pub fn center(&self) -> Point2<f64> {
        let sum = self.polygon.iter().fold(Point2::new(0.0, 0.0), |acc, p| acc + p.coords);
        sum / (self.polygon.len() as f64)
    }
}

/// Fields shared by every dynamic agent kind.
#[derive(Clone, Debug)]
pub struct AgentCore {
    pub id: u64,
    pub length: f64,
    pub width: f64,
    pub start_time: f64,
    pub current_pose: Pose,
    pub poses: BTreeMap<TimeKey, Pose>,
    pub ppose: BTreeMap<TimeKey, Pose>,
    pub u: f64,
    pub stop_timestamp: Option<f64>,
    pub visible: bool,
    pub p_coll: f64,
}

impl AgentCore {
    fn new(id: u64, length: f64, width: f64, start_pose: Pose, u: f64, stop_timestamp: Option<f64>) -> Self {
        let start_time = start_pose.t;
        let mut poses = BTreeMap::new();
        poses.insert(time_key(start_time), start_pose);
        Self {
            id,
            length,
            width,
            start_time,
            current_pose: start_pose,
            poses,
            ppose: BTreeMap::new(),
            u,
            stop_timestamp,
            visible: false,
            p_coll: 0.0,
        }
    }
}

/// Appearance/awareness weights unique to postulated, occluded agents.
#[derive(Clone, Copy, Debug)]
pub struct HypotheticalExtra {
    pub appear_rate: f64,
    pub interact_rate: f64,
}

#[derive(Clone, Debug)]
pub enum Agent {
    OtherVehicle(AgentCore),
    Pedestrian(AgentCore),
    HypotheticalVehicle(AgentCore, HypotheticalExtra),
    HypotheticalPedestrian(AgentCore, HypotheticalExtra),
}

fn snap_start_time(start_time: f64, dt: f64) -> f64 {
    ((start_time / dt) as i64) as f64 * dt
}

impl Agent {
    fn core(&self) -> &AgentCore {
        match self {
            Agent::OtherVehicle(c) | Agent::Pedestrian(c) => c,
            Agent::HypotheticalVehicle(c, _) | Agent::HypotheticalPedestrian(c, _) => c,
        }
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        match self {
            Agent::OtherVehicle(c) | Agent::Pedestrian(c) => c,
            Agent::HypotheticalVehicle(c, _) | Agent::HypotheticalPedestrian(c, _) => c,
        }
    }

    pub fn is_pedestrian(&self) -> bool {
        matches!(self, Agent::Pedestrian(_) | Agent::HypotheticalPedestrian(_, _))
    }

    pub fn is_hypothetical(&self) -> bool {
        matches!(self, Agent::HypotheticalVehicle(_, _) | Agent::HypotheticalPedestrian(_, _))
    }

    pub fn hypothetical_extra(&self) -> Option<HypotheticalExtra> {
        match self {
            Agent::HypotheticalVehicle(_, extra) | Agent::HypotheticalPedestrian(_, extra) => Some(*extra),
            _ => None,
        }
    }

    pub fn id(&self) -> u64 {
        self.core().id
    }

    pub fn length(&self) -> f64 {
        self.core().length
    }

    pub fn width(&self) -> f64 {
        self.core().width
    }

    pub fn start_time(&self) -> f64 {
        self.core().start_time
    }

    pub fn is_visible(&self) -> bool {
        self.core().visible
    }

    pub fn set_detected(&mut self, detected: bool) {
        self.core_mut().visible = detected;
    }

    pub fn p_coll(&self) -> f64 {
        self.core().p_coll
    }

    /// `Pcoll' = max(Pcoll, max(a, 1))`, which always saturates to `1.0`
    /// once any indicator is observed (indicators live in `[0, 1]`, so
    /// `max(a, 1) == 1` unconditionally). A `min(max(Pcoll, a), 1)` formula
    /// would track the running maximum indicator instead; this kept form
    /// is the one the reference behavior actually exhibits.
    pub fn set_collision_prob(&mut self, indicator: f64) {
        let core = self.core_mut();
        core.p_coll = core.p_coll.max(indicator.max(1.0));
    }

    pub fn current_pose(&self) -> Pose {
        self.core().current_pose
    }

    pub fn pose_at(&self, t: f64) -> Option<Pose> {
        self.core().poses.get(&time_key(t)).copied()
    }

    pub fn poly_at(&self, t: f64) -> Option<[Point2<f64>; 4]> {
        self.pose_at(t).map(|pose| rectangle(&pose, self.length(), self.width()))
    }

    pub fn current_poly(&self) -> [Point2<f64>; 4] {
        rectangle(&self.current_pose(), self.length(), self.width())
    }

    /// (Re)build the prediction map from the current pose out to
    /// `current.t + predict_time`, at `predict_step` spacing.
    pub fn predict(&mut self, predict_step: f64, predict_time: f64, config: &Config) {
        let stop_timestamp = self.core().stop_timestamp;
        let u = self.core().u;
        let last = self.core().current_pose;
        let t_end = last.t + predict_time;

        let ppose = if self.is_pedestrian() {
            propagate_with_freeze(&last, stop_timestamp, t_end, predict_step, config)
        } else {
            update_pose_list(&last, u, t_end, predict_step, config)
        };
        self.core_mut().ppose = ppose;
    }

    /// Lazily ensures a prediction exists for `t`, running `predict` if
    /// necessary, then returns the pose and polygon at `t`. Returns `None`
    /// if `t` still isn't covered (e.g. beyond the horizon).
    pub fn predict_at(&mut self, t: f64, predict_step: f64, predict_time: f64, config: &Config) -> Option<(Pose, [Point2<f64>; 4])> {
        if !self.core().ppose.contains_key(&time_key(t)) {
            self.predict(predict_step, predict_time, config);
        }
        let pose = self.core().ppose.get(&time_key(t)).copied()?;
        Some((pose, rectangle(&pose, self.length(), self.width())))
    }

    /// Advance one `dt` step, append to history, and clear the per-tick
    /// detection flag (a fresh detection decision belongs to the external
    /// sensing collaborator next tick).
    pub fn move_agent(&mut self, dt: f64, config: &Config) {
        let core = self.core_mut();
        let last = core.current_pose;
        let next = if let Some(stop_t) = core.stop_timestamp {
            step_with_freeze(&last, stop_t, dt, config)
        } else {
            update_pose(&last, core.u, dt, config)
        };
        core.poses.insert(time_key(next.t), next);
        core.current_pose = next;
        core.visible = false;
    }

    /// Truncate history back to the first recorded pose and clear
    /// predictions, as required by the agent lifecycle rules.
    pub fn restart(&mut self) {
        let core = self.core_mut();
        let (&first_key, &first_pose) = core.poses.iter().next().expect("agent always has at least one pose");
        core.poses = BTreeMap::from([(first_key, first_pose)]);
        core.current_pose = first_pose;
        core.ppose.clear();
    }

    pub fn new_vehicle(
        id: u64,
        length: f64,
        width: f64,
        from: Point2<f64>,
        to: Point2<f64>,
        cov_long: f64,
        cov_lat: f64,
        vx: f64,
        start_time: f64,
        is_stop: bool,
        config: &Config,
    ) -> Self {
        let start_time = snap_start_time(start_time, config.dt);
        let theta = (to.y - from.y).atan2(to.x - from.x);
        let u = if is_stop { compute_acc_to_stop(from, to, vx) } else { 0.0 };
        let start_pose = Pose::new(from.x, from.y, theta, cov_long, cov_lat, VehicleDynamic::new(vx, 0.0), start_time);
        Agent::OtherVehicle(AgentCore::new(id, length, width, start_pose, u, None))
    }

    pub fn new_hypo_vehicle(
        id: u64,
        length: f64,
        width: f64,
        from: Point2<f64>,
        to: Point2<f64>,
        cov_long: f64,
        cov_lat: f64,
        vx: f64,
        start_time: f64,
        is_stop: bool,
        appear_rate: f64,
        interact_rate: f64,
        config: &Config,
    ) -> Self {
        match Self::new_vehicle(id, length, width, from, to, cov_long, cov_lat, vx, start_time, is_stop, config) {
            Agent::OtherVehicle(core) => Agent::HypotheticalVehicle(core, HypotheticalExtra { appear_rate, interact_rate }),
            _ => unreachable!(),
        }
    }

    pub fn new_pedestrian(
        id: u64,
        from: Point2<f64>,
        to: Point2<f64>,
        cov_long: f64,
        cov_lat: f64,
        vx: f64,
        start_time: f64,
        is_stop: bool,
        config: &Config,
    ) -> Self {
        let start_time = snap_start_time(start_time, config.dt);
        let theta = (to.y - from.y).atan2(to.x - from.x);
        let stop_timestamp = if is_stop {
            let distance = (to - from).norm();
            Some(start_time + distance / vx)
        } else {
            None
        };
        let start_pose = Pose::new(from.x, from.y, theta, cov_long, cov_lat, VehicleDynamic::new(vx, 0.0), start_time);
        Agent::Pedestrian(AgentCore::new(id, 1.0, 1.0, start_pose, 0.0, stop_timestamp))
    }

    pub fn new_hypo_pedestrian(
        id: u64,
        from: Point2<f64>,
        to: Point2<f64>,
        cov_long: f64,
        cov_lat: f64,
        vx: f64,
        start_time: f64,
        is_stop: bool,
        appear_rate: f64,
        interact_rate: f64,
        config: &Config,
    ) -> Self {
        match Self::new_pedestrian(id, from, to, cov_long, cov_lat, vx, start_time, is_stop, config) {
            Agent::Pedestrian(core) => Agent::HypotheticalPedestrian(core, HypotheticalExtra { appear_rate, interact_rate }),
            _ => unreachable!(),
        }
    }
}

/// One pedestrian kinematic step: frozen (vx = 0, position unchanged) once
/// `next.t >= stop_timestamp`, otherwise constant-velocity `update_pose`.
fn step_with_freeze(last: &Pose, stop_timestamp: f64, dt: f64, config: &Config) -> Pose {
    let next_t = last.t + dt;
    if next_t >= stop_timestamp {
        Pose::new(last.x, last.y, last.yaw, last.var_long(), last.var_lat(), VehicleDynamic::new(0.0, 0.0), next_t)
    } else {
        update_pose(last, 0.0, dt, config)
    }
}

fn propagate_with_freeze(last: &Pose, stop_timestamp: Option<f64>, t_end: f64, dt: f64, config: &Config) -> BTreeMap<TimeKey, Pose> {
    let mut out = BTreeMap::new();
    let mut pose = *last;
    let end_key = time_key(t_end);
    loop {
        let next = match stop_timestamp {
            Some(st) => step_with_freeze(&pose, st, dt, config),
            None => update_pose(&pose, 0.0, dt, config),
        };
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

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pedestrian_freezes_after_stop_timestamp() {
        let config = Config::default();
        let mut p = Agent::new_pedestrian(
            1,
            Point2::new(20.0, -5.0),
            Point2::new(20.0, 5.0),
            0.2,
            0.2,
            1.5,
            0.0,
            true,
            &config,
        );
        for _ in 0..200 {
            p.move_agent(config.dt, &config);
        }
        let frozen_pose = p.current_pose();
        let frozen_y = frozen_pose.y;
        for _ in 0..20 {
            p.move_agent(config.dt, &config);
            assert_relative_eq!(p.current_pose().y, frozen_y, epsilon = 1e-9);
            assert_relative_eq!(p.current_pose().vdy.vx, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn vehicle_stopping_never_goes_negative_or_reverses() {
        let config = Config::default();
        let mut v = Agent::new_vehicle(
            1,
            4.5,
            1.8,
            Point2::new(0.0, 0.0),
            Point2::new(20.0, 0.0),
            0.2,
            0.2,
            8.0,
            0.0,
            true,
            &config,
        );
        let mut last_x = v.current_pose().x;
        for _ in 0..200 {
            v.move_agent(config.dt, &config);
            assert!(v.current_pose().vdy.vx >= 0.0);
            assert!(v.current_pose().x >= last_x - 1e-9);
            last_x = v.current_pose().x;
        }
    }

    #[test]
    fn restart_truncates_history_to_first_pose() {
        let config = Config::default();
        let mut v = Agent::new_vehicle(
            1,
            4.5,
            1.8,
            Point2::new(0.0, 0.0),
            Point2::new(50.0, 0.0),
            0.2,
            0.2,
            5.0,
            0.0,
            false,
            &config,
        );
        let first_pose = v.current_pose();
        for _ in 0..10 {
            v.move_agent(config.dt, &config);
        }
        assert_ne!(v.current_pose(), first_pose);
        v.restart();
        assert_eq!(v.current_pose(), first_pose);
        assert!(v.core().ppose.is_empty());
    }

    #[test]
    fn set_collision_prob_saturates_at_one() {
        let config = Config::default();
        let mut v = Agent::new_vehicle(
            1,
            4.5,
            1.8,
            Point2::new(0.0, 0.0),
            Point2::new(50.0, 0.0),
            0.2,
            0.2,
            5.0,
            0.0,
            false,
            &config,
        );
        v.set_collision_prob(0.2);
        assert_relative_eq!(v.p_coll(), 1.0);
    }
}

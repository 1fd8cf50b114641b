//! The top-level simulation loop the host drives one tick at a time.
//! Owns the ego vehicle, the environment, and the shared config; advancing
//! the ego always happens before advancing the environment, so next tick's
//! snapshot already reflects both moves.

use nalgebra::Point2;

use crate::agent::{Agent, StaticObject};
use crate::config::Config;
use crate::ego::EgoVehicle;
use crate::environment::Environment;
use crate::planner::{self, PassedCostSample};

/// `{pos, cov, poly, visible, Pcoll}` for one tracked agent.
#[derive(Clone, Debug)]
pub struct AgentSnapshot {
    pub pos: [f64; 3],
    pub cov: [[f64; 2]; 2],
    pub poly: [[f64; 2]; 4],
    pub visible: bool,
    pub p_coll: f64,
}

/// One entry of the ego's predicted-state list: position, uncertainty
/// inflated by the ego's half-extent, and the resulting polygon.
#[derive(Clone, Debug)]
pub struct PredictedState {
    pub pos: [f64; 3],
    pub std: [f64; 2],
    pub poly: [[f64; 2]; 4],
}

#[derive(Clone, Debug)]
pub struct EgoSnapshot {
    pub agent: AgentSnapshot,
    pub predicted: Vec<PredictedState>,
}

fn agent_snapshot(agent: &Agent) -> AgentSnapshot {
    let pose = agent.current_pose();
    let poly = agent.current_poly();
    AgentSnapshot {
        pos: [pose.x, pose.y, pose.yaw],
        cov: [[pose.var_long(), 0.0], [0.0, pose.var_lat()]],
        poly: poly.map(|p| [p.x, p.y]),
        visible: agent.is_visible(),
        p_coll: agent.p_coll(),
    }
}

pub struct Core {
    config: Config,
    ego: Option<EgoVehicle>,
    environment: Environment,
    time: f64,
    next_id: u64,
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}

impl Core {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self { config, ego: None, environment: Environment::new(), time: 0.0, next_id: 0 }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Rewrites the shared time grid. Only meaningful before the first
    /// `mv` tick; the environment's own cached predictions would go stale
    /// against a changed grid otherwise.
    pub fn set_time_parameters(&mut self, dt: f64, simulation_time: f64, predict_time: f64) {
        self.config.set_time_parameters(dt, simulation_time, predict_time);
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_ego_vehicle(&mut self, length: f64, width: f64, x: f64, y: f64, yaw: f64, cov_long: f64, cov_lat: f64, vx: f64, u: f64, start_time: f64) {
        self.ego = Some(EgoVehicle::new(length, width, x, y, yaw, cov_long, cov_lat, vx, u, start_time));
        self.time = start_time;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_other_vehicle(&mut self, length: f64, width: f64, x: f64, y: f64, to_x: f64, to_y: f64, cov_long: f64, cov_lat: f64, vx: f64, start_time: f64, is_stop: bool) -> u64 {
        let id = self.take_id();
        let agent = Agent::new_vehicle(id, length, width, Point2::new(x, y), Point2::new(to_x, to_y), cov_long, cov_lat, vx, start_time, is_stop, &self.config);
        self.environment.add_vehicle(agent)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_pedestrian(&mut self, x: f64, y: f64, to_x: f64, to_y: f64, cov_long: f64, cov_lat: f64, vx: f64, start_time: f64, is_stop: bool) -> u64 {
        let id = self.take_id();
        let agent = Agent::new_pedestrian(id, Point2::new(x, y), Point2::new(to_x, to_y), cov_long, cov_lat, vx, start_time, is_stop, &self.config);
        self.environment.add_pedestrian(agent)
    }

    pub fn add_static_object(&mut self, polygon: Vec<Point2<f64>>) -> u64 {
        let id = self.take_id();
        self.environment.add_static_object(StaticObject::new(id, polygon))
    }

    /// Direct access to the environment, for the external hypothesis and
    /// sensing collaborators (`add_hypo_vehicle`/`add_hypo_pedestrian`,
    /// `set_fov`) that sit outside this crate's public simulation-loop
    /// surface.
    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn current_time(&self) -> f64 {
        self.time
    }

    pub fn simulation_time(&self) -> f64 {
        self.config.simulation_time
    }

    /// Advances the simulation by one `dT` step: the ego optimizes and
    /// moves first, then the environment advances, so the next tick's
    /// snapshot already reflects both. Returns `false` (without advancing
    /// anything) once the ego is missing or the horizon has elapsed.
    pub fn mv(&mut self, dt: f64) -> bool {
        if self.time + dt > self.config.simulation_time + 1e-9 {
            return false;
        }
        let ego = match self.ego.as_mut() {
            Some(ego) => ego,
            None => return false,
        };

        planner::optimize(ego, &mut self.environment, &self.config);
        self.time = ego.current_pose.t;
        true
    }

    /// Full reset: drops the ego and every agent, restoring the config
    /// defaults used at construction.
    pub fn reset(&mut self) {
        self.ego = None;
        self.environment = Environment::new();
        self.time = 0.0;
        self.next_id = 0;
    }

    /// Truncates the ego and every agent back to their first recorded
    /// pose, keeping the scenario (agents, static objects, FOV cache) in
    /// place.
    pub fn restart(&mut self) {
        if let Some(ego) = self.ego.as_mut() {
            ego.restart();
            self.time = ego.current_pose.t;
        }
        self.environment.restart();
    }

    pub fn export_ego(&self) -> Option<EgoSnapshot> {
        let ego = self.ego.as_ref()?;
        let pose = ego.current_pose();
        let poly = ego.current_poly();
        let (half_l, half_w) = ego.half_extent();

        let predicted = ego
            .ppose
            .values()
            .map(|p| PredictedState {
                pos: [p.x, p.y, p.yaw],
                std: [p.std_long() + half_l, p.std_lat() + half_w],
                poly: crate::geometry::rectangle(p, ego.length, ego.width).map(|q| [q.x, q.y]),
            })
            .collect();

        Some(EgoSnapshot {
            agent: AgentSnapshot {
                pos: [pose.x, pose.y, pose.yaw],
                cov: [[pose.var_long(), 0.0], [0.0, pose.var_lat()]],
                poly: poly.map(|p| [p.x, p.y]),
                visible: true,
                p_coll: ego.min_col_value,
            },
            predicted,
        })
    }

    pub fn export_agent(&self, id: u64) -> Option<AgentSnapshot> {
        self.environment.agent(id).map(agent_snapshot)
    }

    pub fn export_vehicles(&self) -> Vec<AgentSnapshot> {
        self.environment.vehicles().iter().map(agent_snapshot).collect()
    }

    pub fn export_pedestrians(&self) -> Vec<AgentSnapshot> {
        self.environment.pedestrians().iter().map(agent_snapshot).collect()
    }

    pub fn export_risk_history(&self) -> Vec<PassedCostSample> {
        match self.ego.as_ref() {
            Some(ego) => planner::export_risk_history(ego, &self.environment, &self.config),
            None => Vec::new(),
        }
    }

    pub fn has_ego(&self) -> bool {
        self.ego.is_some()
    }

    pub fn ego_pose_history_len(&self) -> usize {
        self.ego.as_ref().map(|e| e.poses.len()).unwrap_or(0)
    }

    pub fn ego_pose(&self) -> Option<crate::pose::Pose> {
        self.ego.as_ref().map(|e| e.current_pose())
    }

    pub fn ego_velocity(&self) -> Option<f64> {
        self.ego.as_ref().map(|e| e.current_velocity())
    }

    pub fn ego_acceleration(&self) -> Option<f64> {
        self.ego.as_ref().map(|e| e.current_acceleration())
    }

    pub fn ego_poly(&self) -> Option<[Point2<f64>; 4]> {
        self.ego.as_ref().map(|e| e.current_poly())
    }

    pub fn ego_mode(&self) -> Option<crate::ego::Mode> {
        self.ego.as_ref().map(|e| e.mode)
    }

    pub fn ego_brake(&self) -> Option<bool> {
        self.ego.as_ref().map(|e| e.brake)
    }
}

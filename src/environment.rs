//! The per-tick environment view handed to the planner: visible/hypothetical
//! agents plus the current field-of-view. Scenario construction (which
//! agents exist, where, and why) and the actual FOV geometry derivation are
//! external collaborators; this module only stores what they hand in and
//! filters it down to what the planner is allowed to see on a given tick.

use nalgebra::Point2;

use crate::agent::{Agent, StaticObject};
use crate::config::Config;

/// Read-mostly listing of agent ids in scope for one tick, grouped the way
/// the risk kernel consumes them. Holding ids (rather than borrowed
/// references) keeps this independent of `Environment`'s lifetime, so the
/// planner can freely interleave lookups (`agent`) and the one permitted
/// write (`set_collision_prob`) without fighting the borrow checker.
#[derive(Clone, Debug, Default)]
pub struct EnvironmentSnapshot {
    pub vehicle_ids: Vec<u64>,
    pub static_vehicle_ids: Vec<u64>,
    pub pedestrian_ids: Vec<u64>,
    pub hypo_vehicle_ids: Vec<u64>,
    pub hypo_pedestrian_ids: Vec<u64>,
    pub static_objects: Vec<StaticObject>,
    pub fov_polygon: Vec<Point2<f64>>,
    pub fov_range: f64,
}

pub struct Environment {
    vehicles: Vec<Agent>,
    pedestrians: Vec<Agent>,
    hypo_vehicles: Vec<Agent>,
    hypo_pedestrians: Vec<Agent>,
    static_objects: Vec<StaticObject>,
    fov_polygon: Vec<Point2<f64>>,
    fov_range: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            vehicles: Vec::new(),
            pedestrians: Vec::new(),
            hypo_vehicles: Vec::new(),
            hypo_pedestrians: Vec::new(),
            static_objects: Vec::new(),
            fov_polygon: Vec::new(),
            fov_range: f64::INFINITY,
        }
    }

    /// Agent ids are assigned by the caller (the scenario builder, or
    /// `Core` standing in for it) so they can be shared with diagnostics
    /// and exporters before the agent is ever added here.
    pub fn add_vehicle(&mut self, agent: Agent) -> u64 {
        let id = agent.id();
        self.vehicles.push(agent);
        id
    }

    pub fn add_pedestrian(&mut self, agent: Agent) -> u64 {
        let id = agent.id();
        self.pedestrians.push(agent);
        id
    }

    pub fn add_hypo_vehicle(&mut self, agent: Agent) -> u64 {
        let id = agent.id();
        self.hypo_vehicles.push(agent);
        id
    }

    pub fn add_hypo_pedestrian(&mut self, agent: Agent) -> u64 {
        let id = agent.id();
        self.hypo_pedestrians.push(agent);
        id
    }

    pub fn add_static_object(&mut self, obj: StaticObject) -> u64 {
        let id = obj.id;
        self.static_objects.push(obj);
        id
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn pedestrian_count(&self) -> usize {
        self.pedestrians.len()
    }

    /// Replace the cached field of view. The external sensing collaborator
    /// owns the geometry; this just stores what it reports.
    pub fn set_fov(&mut self, polygon: Vec<Point2<f64>>, range: f64) {
        self.fov_polygon = polygon;
        self.fov_range = range;
    }

    /// Returns the cached field of view. `ego_pose` is accepted for parity
    /// with the real sensing collaborator's signature even though this
    /// crate never derives FOV geometry itself.
    pub fn update_fov(&mut self, _ego_pose: &crate::pose::Pose) -> (&[Point2<f64>], f64) {
        (&self.fov_polygon, self.fov_range)
    }

    pub fn agent(&self, id: u64) -> Option<&Agent> {
        self.all_agents_iter().find(|(agent_id, _)| *agent_id == id).map(|(_, a)| a)
    }

    pub fn agent_mut(&mut self, id: u64) -> Option<&mut Agent> {
        self.all_agents_iter_mut().find(|(agent_id, _)| *agent_id == id).map(|(_, a)| a)
    }

    pub fn set_collision_prob(&mut self, id: u64, indicator: f64) {
        if let Some(agent) = self.agent_mut(id) {
            agent.set_collision_prob(indicator);
        }
    }

    pub fn vehicles(&self) -> &[Agent] {
        &self.vehicles
    }

    pub fn pedestrians(&self) -> &[Agent] {
        &self.pedestrians
    }

    pub fn hypo_vehicles(&self) -> &[Agent] {
        &self.hypo_vehicles
    }

    pub fn hypo_pedestrians(&self) -> &[Agent] {
        &self.hypo_pedestrians
    }

    pub fn static_objects(&self) -> &[StaticObject] {
        &self.static_objects
    }

    pub fn fov_polygon(&self) -> &[Point2<f64>] {
        &self.fov_polygon
    }

    pub fn fov_range(&self) -> f64 {
        self.fov_range
    }

    fn all_agents_iter(&self) -> impl Iterator<Item = (u64, &Agent)> {
        self.vehicles
            .iter()
            .chain(self.pedestrians.iter())
            .chain(self.hypo_vehicles.iter())
            .chain(self.hypo_pedestrians.iter())
            .map(|a| (a.id(), a))
    }

    fn all_agents_iter_mut(&mut self) -> impl Iterator<Item = (u64, &mut Agent)> {
        self.vehicles
            .iter_mut()
            .chain(self.pedestrians.iter_mut())
            .chain(self.hypo_vehicles.iter_mut())
            .chain(self.hypo_pedestrians.iter_mut())
            .map(|a| (a.id(), a))
    }

    /// Advance every agent by one step, matching the ego's own per-tick
    /// advance. Run after the ego has committed its new pose, so next
    /// tick's snapshot already reflects both.
    pub fn move_agents(&mut self, dt: f64, config: &Config) {
        for (_, agent) in self.all_agents_iter_mut() {
            agent.move_agent(dt, config);
        }
    }

    pub fn restart(&mut self) {
        for (_, agent) in self.all_agents_iter_mut() {
            agent.restart();
        }
    }

    fn in_scope(agent: &Agent, now: f64) -> bool {
        agent.start_time() <= now
    }

    /// Builds the per-tick listing: only agents whose start time has
    /// elapsed and for whom a prediction exists at least one step into the
    /// horizon. Vehicles currently at rest (`vx == 0`) are reported
    /// separately as static vehicles, matching the original split between
    /// moving and resting vehicle lists.
    pub fn current_object_list(&mut self, now: f64, predict_step: f64, predict_time: f64, config: &Config) -> EnvironmentSnapshot {
        let mut vehicle_ids = Vec::new();
        let mut static_vehicle_ids = Vec::new();
        for agent in self.vehicles.iter_mut() {
            if !Self::in_scope(agent, now) {
                continue;
            }
            if agent.predict_at(now + predict_step, predict_step, predict_time, config).is_none() {
                continue;
            }
            if agent.current_pose().vdy.vx == 0.0 {
                static_vehicle_ids.push(agent.id());
            } else {
                vehicle_ids.push(agent.id());
            }
        }

        let mut pedestrian_ids = Vec::new();
        for agent in self.pedestrians.iter_mut() {
            if !Self::in_scope(agent, now) {
                continue;
            }
            if agent.predict_at(now + predict_step, predict_step, predict_time, config).is_some() {
                pedestrian_ids.push(agent.id());
            }
        }

        let mut hypo_vehicle_ids = Vec::new();
        for agent in self.hypo_vehicles.iter_mut() {
            if !Self::in_scope(agent, now) {
                continue;
            }
            if agent.predict_at(now + predict_step, predict_step, predict_time, config).is_some() {
                hypo_vehicle_ids.push(agent.id());
            }
        }

        let mut hypo_pedestrian_ids = Vec::new();
        for agent in self.hypo_pedestrians.iter_mut() {
            if !Self::in_scope(agent, now) {
                continue;
            }
            if agent.predict_at(now + predict_step, predict_step, predict_time, config).is_some() {
                hypo_pedestrian_ids.push(agent.id());
            }
        }

        EnvironmentSnapshot {
            vehicle_ids,
            static_vehicle_ids,
            pedestrian_ids,
            hypo_vehicle_ids,
            hypo_pedestrian_ids,
            static_objects: self.static_objects.clone(),
            fov_polygon: self.fov_polygon.clone(),
            fov_range: self.fov_range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    #[test]
    fn agents_outside_their_start_time_are_excluded() {
        let config = Config::default();
        let mut env = Environment::new();
        env.add_vehicle(Agent::new_vehicle(
            0,
            4.5,
            1.8,
            Point2::new(0.0, 0.0),
            Point2::new(50.0, 0.0),
            0.2,
            0.2,
            5.0,
            5.0,
            false,
            &config,
        ));
        let snapshot = env.current_object_list(0.0, config.predict_step, config.predict_time, &config);
        assert!(snapshot.vehicle_ids.is_empty());

        let snapshot = env.current_object_list(5.0, config.predict_step, config.predict_time, &config);
        assert_eq!(snapshot.vehicle_ids.len(), 1);
    }

    #[test]
    fn resting_vehicles_are_reported_as_static() {
        let config = Config::default();
        let mut env = Environment::new();
        env.add_vehicle(Agent::new_vehicle(
            0,
            4.5,
            1.8,
            Point2::new(0.0, 0.0),
            Point2::new(50.0, 0.0),
            0.2,
            0.2,
            0.0,
            0.0,
            false,
            &config,
        ));
        let snapshot = env.current_object_list(0.0, config.predict_step, config.predict_time, &config);
        assert_eq!(snapshot.static_vehicle_ids.len(), 1);
        assert!(snapshot.vehicle_ids.is_empty());
    }

    #[test]
    fn set_collision_prob_round_trips_through_environment() {
        let config = Config::default();
        let mut env = Environment::new();
        let id = env.add_vehicle(Agent::new_vehicle(
            0,
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
        ));
        env.set_collision_prob(id, 0.3);
        assert_eq!(env.agent(id).unwrap().p_coll(), 1.0);
    }
}

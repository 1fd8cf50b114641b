//! The ego vehicle's state: pose/input history, predicted trajectory, mode,
//! and the per-tick candidate cache. The optimization pipeline that fills
//! these fields in lives in `planner.rs`; this module only owns the data
//! and the plain accessors over it.

use std::collections::BTreeMap;

use nalgebra::Point2;

use crate::geometry::rectangle;
use crate::pose::{time_key, Pose, TimeKey, UKey, VehicleDynamic};

/// One of four mutually exclusive driving modes. Exactly one is active at
/// any time; transitions are owned entirely by the planner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Stop,
    DriveOff,
    Default,
    Emergency,
}

/// Candidate cache entry recorded by `total_cost` for the acceleration the
/// search is currently evaluating, and retrieved afterward for the winning
/// candidate.
#[derive(Clone, Copy, Debug, Default)]
pub struct CandidateOutcome {
    pub brake: bool,
    pub min_col_value: f64,
}

pub struct EgoVehicle {
    pub length: f64,
    pub width: f64,

    pub current_pose: Pose,
    pub poses: BTreeMap<TimeKey, Pose>,
    pub u_history: BTreeMap<TimeKey, f64>,

    pub u: f64,
    pub p_u: f64,
    pub ppose: BTreeMap<TimeKey, Pose>,
    pub perate: BTreeMap<TimeKey, f64>,

    pub mode: Mode,
    pub brake: bool,
    pub ttb: f64,
    pub min_col_value: f64,
    pub min_risk_value: f64,

    pub candidates: BTreeMap<UKey, CandidateOutcome>,
}

impl EgoVehicle {
    pub fn new(length: f64, width: f64, x: f64, y: f64, yaw: f64, cov_long: f64, cov_lat: f64, vx: f64, u: f64, start_time: f64) -> Self {
        let pose = Pose::new(x, y, yaw, cov_long, cov_lat, VehicleDynamic::new(vx, u), start_time);
        let mut poses = BTreeMap::new();
        poses.insert(time_key(start_time), pose);
        let mut u_history = BTreeMap::new();
        u_history.insert(time_key(start_time), u);
        let mode = if vx == 0.0 { Mode::Stop } else { Mode::Default };

        Self {
            length,
            width,
            current_pose: pose,
            poses,
            u_history,
            u,
            p_u: u,
            ppose: BTreeMap::new(),
            perate: BTreeMap::new(),
            mode,
            brake: false,
            ttb: 0.0,
            min_col_value: 0.0,
            min_risk_value: 0.0,
            candidates: BTreeMap::new(),
        }
    }

    pub fn half_extent(&self) -> (f64, f64) {
        (self.length / 2.0, self.width / 2.0)
    }

    pub fn current_pose(&self) -> Pose {
        self.current_pose
    }

    pub fn current_velocity(&self) -> f64 {
        self.current_pose.vdy.vx
    }

    pub fn current_acceleration(&self) -> f64 {
        self.current_pose.vdy.accel
    }

    pub fn current_poly(&self) -> [Point2<f64>; 4] {
        rectangle(&self.current_pose, self.length, self.width)
    }

    /// Truncates history back to the first recorded pose/input and clears
    /// every per-tick derived field, as required by the reset lifecycle.
    pub fn restart(&mut self) {
        let (&first_pose_key, &first_pose) = self.poses.iter().next().expect("ego always has at least one pose");
        let (&first_u_key, &first_u) = self.u_history.iter().next().expect("ego always has at least one input");
        self.poses = BTreeMap::from([(first_pose_key, first_pose)]);
        self.u_history = BTreeMap::from([(first_u_key, first_u)]);
        self.current_pose = first_pose;
        self.u = first_u;
        self.p_u = first_u;
        self.ppose.clear();
        self.perate.clear();
        self.candidates.clear();
        self.mode = if first_pose.vdy.vx == 0.0 { Mode::Stop } else { Mode::Default };
        self.brake = false;
        self.ttb = 0.0;
        self.min_col_value = 0.0;
        self.min_risk_value = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ego_vehicle_starts_in_default_mode() {
        let ego = EgoVehicle::new(4.5, 1.8, 0.0, 0.0, 0.0, 0.2, 0.2, 8.0, 0.0, 0.0);
        assert_eq!(ego.mode, Mode::Default);
        assert_eq!(ego.current_velocity(), 8.0);
    }

    #[test]
    fn new_ego_vehicle_starts_in_stop_mode_when_stationary() {
        let ego = EgoVehicle::new(4.5, 1.8, 0.0, 0.0, 0.0, 0.2, 0.2, 0.0, 0.0, 0.0);
        assert_eq!(ego.mode, Mode::Stop);
    }

    #[test]
    fn restart_clears_derived_fields_but_keeps_first_pose() {
        let mut ego = EgoVehicle::new(4.5, 1.8, 0.0, 0.0, 0.0, 0.2, 0.2, 8.0, 0.0, 0.0);
        let first = ego.current_pose();
        ego.mode = Mode::Emergency;
        ego.brake = true;
        ego.poses.insert(time_key(1.0), first);
        ego.restart();
        assert_eq!(ego.mode, Mode::Default);
        assert!(!ego.brake);
        assert_eq!(ego.poses.len(), 1);
        assert_eq!(ego.current_pose(), first);
    }
}

//! End-to-end regression scenarios driven purely through the public
//! `Core` API, matching the fixed time grid and bound constants the
//! default config already uses (dT=0.1, PREDICT_STEP=0.2, PREDICT_TIME=3.0,
//! SIM=10.0, vCruise=8).

use nalgebra::Point2;
use urban_risk_planner::{Config, Core, Mode};

fn ticks_for(core: &Core) -> usize {
    (core.simulation_time() / core.config().dt).round() as usize
}

#[test]
fn s1_free_cruise_settles_near_cruise_speed_in_default_mode() {
    let mut core = Core::new();
    core.add_ego_vehicle(4.5, 1.8, 0.0, 0.0, 0.0, 0.1, 0.1, 6.0, 0.0, 0.0);

    for _ in 0..ticks_for(&core) {
        if !core.mv(core.config().dt) {
            break;
        }
        assert_eq!(core.ego_mode(), Some(Mode::Default));
    }

    let vx = core.ego_velocity().unwrap();
    assert!(vx >= 7.9 && vx <= 8.1, "expected vx in [7.9, 8.1], got {}", vx);
    assert!(core.ego_pose_history_len() >= 99);
}

#[test]
fn s2_static_obstacle_ahead_forces_braking_and_a_full_stop() {
    let mut core = Core::new();
    core.add_ego_vehicle(4.5, 1.8, 0.0, 0.0, 0.0, 0.1, 0.1, 8.0, 0.0, 0.0);
    core.add_static_object(vec![
        Point2::new(40.0, -1.0),
        Point2::new(42.0, -1.0),
        Point2::new(42.0, 1.0),
        Point2::new(40.0, 1.0),
    ]);

    let mut saw_brake = false;
    let mut saw_emergency = false;
    while core.mv(core.config().dt) {
        if core.ego_brake() == Some(true) {
            saw_brake = true;
        }
        if core.ego_mode() == Some(Mode::Emergency) {
            saw_emergency = true;
        }
        if core.ego_velocity() == Some(0.0) {
            break;
        }
    }

    assert!(saw_brake, "expected the ego to brake for the obstacle ahead");
    assert!(saw_emergency, "expected the ego to enter Emergency mode");
    assert_eq!(core.ego_velocity(), Some(0.0));
    let x = core.ego_pose().unwrap().x;
    assert!(x < 40.0, "ego should stop short of the obstacle, got x={}", x);
}

#[test]
fn s3_pedestrian_crossing_triggers_braking() {
    let mut core = Core::new();
    core.add_ego_vehicle(4.5, 1.8, 0.0, 0.0, 0.0, 0.1, 0.1, 8.0, 0.0, 0.0);
    core.add_pedestrian(20.0, -5.0, 20.0, 5.0, 0.2, 0.2, 1.5, 0.0, false);

    let mut saw_brake = false;
    for _ in 0..ticks_for(&core) {
        if !core.mv(core.config().dt) {
            break;
        }
        if core.ego_brake() == Some(true) {
            saw_brake = true;
        }
    }

    assert!(saw_brake, "expected the ego to brake for the crossing pedestrian");
}

#[test]
fn s4_pedestrian_freezes_after_reaching_its_goal() {
    let mut core = Core::new();
    core.add_ego_vehicle(4.5, 1.8, -50.0, 0.0, 0.0, 0.1, 0.1, 0.0, 0.0, 0.0);
    let pedestrian_id = core.add_pedestrian(20.0, -5.0, 20.0, 5.0, 0.2, 0.2, 1.5, 0.0, true);

    for _ in 0..ticks_for(&core) {
        if !core.mv(core.config().dt) {
            break;
        }
    }

    let pedestrian = core.environment().agent(pedestrian_id).unwrap();
    let dt = core.config().dt;
    let t_end = core.current_time();
    let last = pedestrian.pose_at(t_end).unwrap();
    let before = pedestrian.pose_at(t_end - dt).unwrap();

    assert_eq!(last.vdy.vx, 0.0);
    assert_eq!(last.x, before.x);
    assert_eq!(last.y, before.y);
}

#[test]
fn s5_ego_transitions_stop_to_drive_off_to_default() {
    let mut core = Core::new();
    core.add_ego_vehicle(4.5, 1.8, 0.0, 0.0, 0.0, 0.1, 0.1, 0.0, 0.0, 0.0);

    assert_eq!(core.ego_mode(), Some(Mode::Stop));

    assert!(core.mv(core.config().dt));
    assert!(core.ego_acceleration().unwrap() > 0.0);
    assert_eq!(core.ego_mode(), Some(Mode::DriveOff));

    let mut reached_default = false;
    for _ in 0..ticks_for(&core) {
        if !core.mv(core.config().dt) {
            break;
        }
        if core.ego_mode() == Some(Mode::Default) {
            reached_default = true;
            break;
        }
    }
    assert!(reached_default, "expected the ego to eventually settle into Default mode");
    assert!(core.ego_velocity().unwrap() > 5.0);
}

#[test]
fn s6_fov_limited_approach_brakes_harder_than_without_fov() {
    let mut fov_config = Config::default();
    fov_config.enable_fov_aware = true;

    let mut core_fov = Core::with_config(fov_config);
    core_fov.add_ego_vehicle(4.5, 1.8, 0.0, 0.0, 0.0, 0.1, 0.1, 10.0, 0.0, 0.0);
    core_fov.environment_mut().set_fov(Vec::new(), 20.0);
    core_fov.mv(core_fov.config().dt);
    let u_with_fov = core_fov.ego_acceleration().unwrap();

    let mut no_fov_config = Config::default();
    no_fov_config.enable_fov_aware = false;

    let mut core_no_fov = Core::with_config(no_fov_config);
    core_no_fov.add_ego_vehicle(4.5, 1.8, 0.0, 0.0, 0.0, 0.1, 0.1, 10.0, 0.0, 0.0);
    core_no_fov.environment_mut().set_fov(Vec::new(), 20.0);
    core_no_fov.mv(core_no_fov.config().dt);
    let u_without_fov = core_no_fov.ego_acceleration().unwrap();

    assert!(
        u_with_fov < u_without_fov,
        "expected FOV-limited acceleration ({}) to be strictly less than unrestricted ({})",
        u_with_fov,
        u_without_fov
    );
}

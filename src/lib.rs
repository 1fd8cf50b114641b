//! A risk-aware longitudinal motion planner: a bounded-scalar ego
//! controller that weighs cruise utility against a predicted collision
//! risk integral over visible and hypothetical agents. Scenario
//! construction, sensor FOV derivation, hypothesis generation, and
//! visualization are external collaborators; this crate owns kinematics,
//! geometry, the risk kernels, the agent/environment model, and the
//! planner itself.

pub mod agent;
pub mod config;
pub mod core;
pub mod ego;
pub mod environment;
pub mod error;
pub mod geometry;
pub mod kinematics;
pub mod minimize;
pub mod planner;
pub mod pose;
pub mod risk;

pub use agent::{Agent, HypotheticalExtra, StaticObject};
pub use config::{Config, EventRateModel, SeverityModel};
pub use core::{AgentSnapshot, Core, EgoSnapshot, PredictedState};
pub use ego::{EgoVehicle, Mode};
pub use environment::{Environment, EnvironmentSnapshot};
pub use error::FailureKind;
pub use planner::PassedCostSample;

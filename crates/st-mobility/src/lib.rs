//! `st-mobility`: vehicles, lanes and the per-vehicle step.
//!
//! # Crate layout
//!
//! | Module           | Contents                                                          |
//! |------------------|-------------------------------------------------------------------|
//! | [`lanes`]        | `LaneManager`, `LaneRef`: ordered, capacity-bounded lane queues   |
//! | [`following`]    | `FollowingParams`: acceleration / comfortable-stop kinematics     |
//! | [`intersection`] | `IntersectionArbiter`, `LaneConnector`: controls and turn curves  |
//! | [`planner`]      | `RoutePlanner`, `RandomTurnPlanner`, `OdPlanner<R>`               |
//! | [`state`]        | `VehicleState`, `RouteEntry`, `StepOutcome`, `ColorHint`          |
//! | [`store`]        | `VehicleStore`: dense state + per-vehicle RNG                     |
//! | [`engine`]       | `TrafficEngine`: `step(id, now)`                                  |
//! | [`placement`]    | `TrafficEngine::spawn`, `Spawned`                                 |
//! | [`error`]        | `MobilityError`, `MobilityResult<T>`                              |
//!
//! # Driving a simulation
//!
//! The engine never advances time itself.  A host scheduler calls
//! [`TrafficEngine::spawn`] to place vehicles and then
//! [`TrafficEngine::step`] for each vehicle at the times the previous
//! outcome asked for (`now + delay_ms`).  `st-sim` provides such a host.
//!
//! Errors for which [`MobilityError::is_fatal`] is `true` mean a queue or
//! network invariant was broken and the run should stop.  Every other error
//! concerns one vehicle and can be logged.

pub mod engine;
pub mod error;
pub mod following;
pub mod intersection;
pub mod lanes;
pub mod placement;
pub mod planner;
pub mod state;
pub mod store;

#[cfg(test)]
mod tests;

pub use engine::TrafficEngine;
pub use error::{MobilityError, MobilityResult};
pub use following::{FollowingParams, Motion};
pub use intersection::{IntersectionArbiter, LaneConnector, Waiter};
pub use lanes::{LaneManager, LaneRef};
pub use placement::Spawned;
pub use planner::{OdPlanner, PlanContext, RandomTurnPlanner, RoutePlanner};
pub use state::{
    Arbitration, ColorHint, ConnectorState, RouteEntry, StepOutcome, TripStats, VehicleState, VehicleStatus,
};
pub use store::VehicleStore;

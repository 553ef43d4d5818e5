//! `st-core`: foundational types for the street-traffic simulation engine.
//!
//! This crate is a dependency of every other `st-*` crate.  It has no `st-*`
//! dependencies and only a few external ones (`rand`, `rand_distr` and
//! `thiserror`, plus optional `serde`).
//!
//! # What lives here
//!
//! | Module          | Contents                                                        |
//! |-----------------|-----------------------------------------------------------------|
//! | [`ids`]         | `SegmentId`, `IntersectionId`, `StreetId`, `ShapeId`, `VehicleId` |
//! | [`geo`]         | `GeoPoint`, `GeoBounds`, planar `Point`/`Rect`, `Projection`, polyline helpers |
//! | [`time`]        | `SimTime` (millisecond clock)                                   |
//! | [`rng`]         | `VehicleRng` (per-vehicle), `SimRng` (engine-wide)              |
//! | [`config`]      | `TrafficConfig`, `MobilityMode`, `ColorMode`                    |
//! | [`error`]       | `CoreError`, `CoreResult`                                       |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public types.        |
//!           | Lets applications load `TrafficConfig` from JSON/TOML.     |

pub mod config;
pub mod error;
pub mod geo;
pub mod ids;
pub mod rng;
pub mod time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::{ColorMode, MobilityMode, TrafficConfig};
pub use error::{CoreError, CoreResult};
pub use geo::{GeoBounds, GeoPoint, Point, Projection, Rect};
pub use ids::{IntersectionId, SegmentId, ShapeId, StreetId, VehicleId};
pub use rng::{SimRng, VehicleRng};
pub use time::SimTime;

//! `st-spatial`: map loading, road network, spatial indexing and routing.
//!
//! # Crate layout
//!
//! | Module      | Contents                                                             |
//! |-------------|----------------------------------------------------------------------|
//! | [`format`]  | On-disk segment / street / shape records (`bytemuck` layouts) and writers |
//! | [`loader`]  | `load_map`, `MapFiles`: clip, project and re-anchor a region         |
//! | [`network`] | `RoadNetwork`, `RoadNetworkBuilder`, `RoadSegment`, `Intersection`   |
//! | [`grid`]    | `IntersectionGrid`: recursive grid that merges nearby endpoints      |
//! | [`router`]  | `Router` trait, `Route`, `AStarRouter`                               |
//! | [`error`]   | `SpatialError`, `SpatialResult<T>`                                   |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                       |
//! |---------|--------------------------------------------------------------|
//! | `serde` | Derives `Serialize`/`Deserialize` on public value types.     |

pub mod error;
pub mod format;
pub mod grid;
pub mod loader;
pub mod network;
pub mod router;


pub use error::{SpatialError, SpatialResult};
pub use grid::IntersectionGrid;
pub use loader::{load_map, MapFiles};
pub use network::{
    Direction, Intersection, RoadClass, RoadNetwork, RoadNetworkBuilder, RoadSegment, SegmentSpec,
    StreetName, TrafficControl,
};
pub use router::{AStarRouter, Origin, Route, RouteStep, Router};

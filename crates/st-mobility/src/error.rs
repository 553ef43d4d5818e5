use st_core::{CoreError, Point, VehicleId};
use st_spatial::SpatialError;
use thiserror::Error;

use crate::lanes::LaneRef;

#[derive(Debug, Error)]
pub enum MobilityError {
    #[error("lane {0:?} is at capacity")]
    LaneFull(LaneRef),

    #[error("lane {0:?} does not exist")]
    InvalidLane(LaneRef),

    #[error("vehicle {vehicle} is not queued in lane {lane:?}")]
    NotInLane { vehicle: VehicleId, lane: LaneRef },

    #[error("vehicle {0} is its own predecessor")]
    SelfPredecessor(VehicleId),

    #[error("no intersection at {point} for vehicle {vehicle}")]
    IntersectionMissing { vehicle: VehicleId, point: Point },

    #[error("vehicle {0} does not exist")]
    VehicleNotFound(VehicleId),

    #[error("vehicle {0} has left the simulation")]
    VehicleInactive(VehicleId),

    #[error("no feasible spawn position after {attempts} attempts")]
    SpawnFailed { attempts: u32 },

    #[error("path of {entries} entries is shorter than the minimum")]
    PathTooShort { entries: usize },

    #[error("routing failed: {0}")]
    Routing(#[from] SpatialError),

    #[error(transparent)]
    Config(#[from] CoreError),
}

impl MobilityError {
    /// Invariant violations that indicate a modelling bug.  Hosts should
    /// abort the run on these rather than log and continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MobilityError::SelfPredecessor(_)
                | MobilityError::IntersectionMissing { .. }
                | MobilityError::NotInLane { .. }
                | MobilityError::InvalidLane(_)
        )
    }
}

pub type MobilityResult<T> = Result<T, MobilityError>;

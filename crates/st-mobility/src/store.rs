//! The `VehicleStore`: dense per-vehicle state and RNGs.

use st_core::{VehicleId, VehicleRng};

use crate::{MobilityError, MobilityResult, VehicleState};

/// Holds the state and RNG of every vehicle ever spawned.
///
/// Both vectors are indexed by `VehicleId`.  Removed vehicles keep their
/// slot with `active == false` so IDs are never reused and their trip
/// statistics stay readable.
#[derive(Default)]
pub struct VehicleStore {
    pub states: Vec<VehicleState>,
    pub rngs:   Vec<VehicleRng>,
}

impl VehicleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ID the next inserted vehicle will receive.
    pub fn next_id(&self) -> VehicleId {
        VehicleId(self.states.len() as u32)
    }

    pub fn insert(&mut self, state: VehicleState, rng: VehicleRng) -> VehicleId {
        debug_assert_eq!(state.id, self.next_id());
        let id = state.id;
        self.states.push(state);
        self.rngs.push(rng);
        id
    }

    /// Any vehicle, active or not.
    pub fn state(&self, id: VehicleId) -> MobilityResult<&VehicleState> {
        self.states.get(id.index()).ok_or(MobilityError::VehicleNotFound(id))
    }

    /// An active vehicle.
    pub fn get(&self, id: VehicleId) -> MobilityResult<&VehicleState> {
        let s = self.state(id)?;
        if s.active { Ok(s) } else { Err(MobilityError::VehicleInactive(id)) }
    }

    pub fn get_mut(&mut self, id: VehicleId) -> MobilityResult<&mut VehicleState> {
        let s = self.states.get_mut(id.index()).ok_or(MobilityError::VehicleNotFound(id))?;
        if s.active { Ok(s) } else { Err(MobilityError::VehicleInactive(id)) }
    }

    /// Any vehicle, for refreshing the outcome of one that just finished.
    pub(crate) fn state_mut(&mut self, id: VehicleId) -> MobilityResult<&mut VehicleState> {
        self.states.get_mut(id.index()).ok_or(MobilityError::VehicleNotFound(id))
    }

    /// An active vehicle together with its RNG.
    pub fn state_and_rng(&mut self, id: VehicleId) -> MobilityResult<(&mut VehicleState, &mut VehicleRng)> {
        let (Some(state), Some(rng)) = (self.states.get_mut(id.index()), self.rngs.get_mut(id.index())) else {
            return Err(MobilityError::VehicleNotFound(id));
        };
        if !state.active {
            return Err(MobilityError::VehicleInactive(id));
        }
        Ok((state, rng))
    }

    /// Effective remaining distance, 0 for unknown IDs.  Used as the sort key
    /// of lane queues.
    #[inline]
    pub fn effective_remaining(&self, id: VehicleId) -> f64 {
        self.states.get(id.index()).map_or(0.0, VehicleState::effective_remaining)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.states.iter().filter(|s| s.active).count()
    }

    pub fn active_ids(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.states.iter().filter(|s| s.active).map(|s| s.id)
    }
}

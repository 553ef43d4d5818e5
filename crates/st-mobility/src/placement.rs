//! Vehicle placement.
//!
//! A new vehicle joins a lane at its upstream end: one spacing behind the
//! tail vehicle, or one spacing before the exit when the lane is empty.  The
//! spacing grows with the initial speed by one reaction time.

use std::sync::Arc;

use log::{debug, warn};

use st_core::{Point, SegmentId, VehicleId, VehicleRng};
use st_spatial::Direction;

use crate::engine::{TrafficEngine, SPACING_M};
use crate::lanes::LaneRef;
use crate::planner::PlanContext;
use crate::{MobilityError, MobilityResult, VehicleState};

/// Seconds of headway added to the spacing per m/s of initial speed.
pub const REACTION_TIME_S: f64 = 1.0;

/// Bounds on the driver speed factor.
const SPEED_FACTOR_MIN: f64 = 0.75;
const SPEED_FACTOR_MAX: f64 = 1.25;

/// Where a vehicle was placed.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Spawned {
    pub vehicle:   VehicleId,
    pub lane:      LaneRef,
    pub remaining: f64,
    pub speed:     f64,
    pub position:  Point,
    pub heading:   Point,
}

impl TrafficEngine {
    /// Place a vehicle on a random (segment, direction).
    ///
    /// Up to `spawn_attempts` picks are drawn from the engine RNG.  Picks on
    /// unnamed segments, full lanes, or lanes without room behind the tail are
    /// rejected, as are picks the planner cannot route from.
    pub fn spawn(&mut self) -> MobilityResult<Spawned> {
        let attempts = self.config.spawn_attempts;
        let n = self.network.segment_count() as u32;
        if n > 0 {
            for _ in 0..attempts {
                let segment = SegmentId(self.rng.gen_range(0..n));
                let direction = if self.rng.gen_bool(0.5) { Direction::Forward } else { Direction::Backward };
                if let Some(spawned) = self.try_spawn(segment, direction)? {
                    return Ok(spawned);
                }
            }
        }
        warn!("no feasible spawn position after {attempts} attempts");
        Err(MobilityError::SpawnFailed { attempts })
    }

    /// Place a vehicle on a specific segment and direction, without retries.
    pub fn spawn_at(&mut self, segment: SegmentId, direction: Direction) -> MobilityResult<Spawned> {
        self.network.get_segment(segment)?;
        self.try_spawn(segment, direction)?.ok_or(MobilityError::SpawnFailed { attempts: 1 })
    }

    fn try_spawn(&mut self, segment: SegmentId, direction: Direction) -> MobilityResult<Option<Spawned>> {
        let network = Arc::clone(&self.network);
        let net = network.as_ref();
        let seg = net.segment(segment);
        if !seg.can_travel(direction) || !net.is_named(segment) {
            return Ok(None);
        }
        let Some(lane) = self.lanes.free_lane(segment, direction) else {
            return Ok(None);
        };

        let id = self.store.next_id();
        let mut rng = VehicleRng::new(self.config.seed, id);
        let factor = rng
            .normal(1.0, self.config.speed_variance_sd)
            .clamp(SPEED_FACTOR_MIN, SPEED_FACTOR_MAX);
        let speed = self.config.initial_speed_fraction * seg.speed_limit * factor;
        let spacing = SPACING_M + speed * REACTION_TIME_S;
        let remaining = match self.lanes.tail(lane) {
            Some(tail) => self.store.effective_remaining(tail) + spacing,
            None => spacing,
        };
        if remaining > seg.length {
            return Ok(None);
        }

        let mut state = VehicleState::new(id, lane, remaining, speed, factor, self.config.step_duration_ms);
        let ctx = PlanContext { network: net, lanes: &self.lanes };
        if !self.planner.on_spawn(&ctx, &mut state, &mut rng) {
            return Ok(None);
        }

        let store = &self.store;
        match self.lanes.add_vehicle(lane, id, remaining, |v| store.effective_remaining(v)) {
            Ok(()) => {}
            Err(MobilityError::LaneFull(_)) => return Ok(None),
            Err(e) => return Err(e),
        }
        let (position, heading) = net.lane_point_at(segment, direction, lane.lane, remaining);
        state.position = position;
        state.heading = heading;
        self.store.insert(state, rng);
        debug!("spawned {id} on {segment} {direction:?} lane {} at {remaining:.1} m", lane.lane);

        Ok(Some(Spawned { vehicle: id, lane, remaining, speed, position, heading }))
    }
}

//! Route planning strategies.
//!
//! The engine asks its [`RoutePlanner`] for the next hop whenever a vehicle
//! comes within stopping distance of its exit.  Planners keep their state in
//! the vehicle's `pending` queue, so one planner instance serves every
//! vehicle.
//!
//! | Planner               | Behaviour                                                 |
//! |-----------------------|-----------------------------------------------------------|
//! | [`RandomTurnPlanner`] | uniform pick among outgoing segments with a free lane     |
//! | [`OdPlanner`]         | A* path to a random destination, re-planned on arrival    |

use std::collections::VecDeque;

use log::debug;
use smallvec::SmallVec;

use st_core::{SegmentId, VehicleRng};
use st_spatial::{Direction, Origin, RoadNetwork, Route, RouteStep, Router, SpatialError};

use crate::lanes::LaneManager;
use crate::{MobilityError, MobilityResult, RouteEntry, VehicleState};

/// Shortest accepted path, counted after de-duplication and including the
/// segment the vehicle is on.
pub const MIN_PATH_ENTRIES: usize = 4;

/// Destinations drawn per planning request before giving up.
const DESTINATION_ATTEMPTS: usize = 16;

/// Read-only view of the world handed to planners.
pub struct PlanContext<'a> {
    pub network: &'a RoadNetwork,
    pub lanes:   &'a LaneManager,
}

/// Pluggable next-hop selection.
pub trait RoutePlanner: Send {
    /// The hop to take at the vehicle's upcoming exit.
    ///
    /// The returned entry stays at the front of `vehicle.pending`; the engine
    /// pops it once the transition happens.  `None` asks the engine to turn
    /// the vehicle around.
    fn next_segment(
        &self,
        ctx: &PlanContext<'_>,
        vehicle: &mut VehicleState,
        rng: &mut VehicleRng,
    ) -> Option<RouteEntry>;

    /// Prepare a freshly placed vehicle.  `false` rejects the placement.
    fn on_spawn(&self, _ctx: &PlanContext<'_>, _vehicle: &mut VehicleState, _rng: &mut VehicleRng) -> bool {
        true
    }

    /// `true` once the vehicle is on its destination with nothing left to do.
    fn destination_reached(&self, _vehicle: &VehicleState) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

/// `true` if `entry` can be taken from where `vehicle` is now.
pub fn connects(network: &RoadNetwork, vehicle: &VehicleState, entry: &RouteEntry) -> bool {
    if entry.uturn {
        entry.segment == vehicle.segment && entry.direction == vehicle.direction.reverse()
    } else {
        network.entry_node(entry.segment, entry.direction) == network.exit_node(vehicle.segment, vehicle.direction)
    }
}

/// Pick one outgoing segment at the vehicle's exit, uniformly among those
/// with a free lane.  The current segment is never picked.
fn random_hop(ctx: &PlanContext<'_>, vehicle: &VehicleState, rng: &mut VehicleRng) -> Option<RouteEntry> {
    let node = ctx.network.exit_node(vehicle.segment, vehicle.direction);
    let candidates: SmallVec<[(SegmentId, Direction); 8]> = ctx
        .network
        .outgoing(node)
        .filter(|&(s, dir)| s != vehicle.segment && ctx.lanes.free_lane(s, dir).is_some())
        .collect();
    rng.choose(&candidates)
        .map(|&(s, dir)| RouteEntry::new(ctx.network.exit_point(s, dir), s, dir))
}

// ── RandomTurnPlanner ─────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, Default)]
pub struct RandomTurnPlanner;

impl RoutePlanner for RandomTurnPlanner {
    fn next_segment(
        &self,
        ctx: &PlanContext<'_>,
        vehicle: &mut VehicleState,
        rng: &mut VehicleRng,
    ) -> Option<RouteEntry> {
        if let Some(front) = vehicle.pending.front() {
            if connects(ctx.network, vehicle, front) {
                return Some(*front);
            }
            vehicle.pending.clear();
        }
        let hop = random_hop(ctx, vehicle, rng)?;
        vehicle.pending.push_back(hop);
        Some(hop)
    }

    fn name(&self) -> &'static str {
        "random-turn"
    }
}

// ── OdPlanner ─────────────────────────────────────────────────────────────────

/// Drives shortest paths between random origin/destination pairs.
pub struct OdPlanner<R: Router> {
    router:          R,
    /// Straight-line bound on the origin→destination distance, metres.
    max_od_distance: f64,
}

impl<R: Router> OdPlanner<R> {
    pub fn new(router: R, max_od_distance: f64) -> Self {
        Self { router, max_od_distance }
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    /// Fill `vehicle.pending` with a path to a destination.
    ///
    /// The vehicle's current destination is tried first, so a re-plan after
    /// an invalidated path keeps the trip.  Then up to 16 random segments
    /// within `max_od_distance` are tried.
    pub fn plan_path(
        &self,
        network: &RoadNetwork,
        vehicle: &mut VehicleState,
        rng: &mut VehicleRng,
    ) -> MobilityResult<()> {
        let n = network.segment_count() as u32;
        let here = network.midpoint(vehicle.segment);
        let origin = Origin {
            segment:   vehicle.segment,
            direction: vehicle.direction,
            remaining: vehicle.effective_remaining(),
        };

        let mut last = MobilityError::PathTooShort { entries: 0 };
        let kept = vehicle.destination.filter(|&d| d != vehicle.segment);
        let drawn = (0..DESTINATION_ATTEMPTS).map(|_| SegmentId(rng.gen_range(0..n.max(1))));
        for dest in kept.into_iter().chain(drawn) {
            if dest == vehicle.segment || dest.index() >= network.segment_count() {
                continue;
            }
            if network.midpoint(dest).distance(here) > self.max_od_distance {
                continue;
            }
            let attempt = self
                .router
                .route(network, origin, dest)
                .map_err(MobilityError::from)
                .and_then(|route| postprocess(network, vehicle, &route));
            match attempt {
                Ok(entries) => {
                    vehicle.pending = entries;
                    vehicle.destination = Some(dest);
                    return Ok(());
                }
                Err(e) => last = e,
            }
        }
        vehicle.destination = None;
        Err(last)
    }
}

impl<R: Router> RoutePlanner for OdPlanner<R> {
    fn next_segment(
        &self,
        ctx: &PlanContext<'_>,
        vehicle: &mut VehicleState,
        rng: &mut VehicleRng,
    ) -> Option<RouteEntry> {
        if let Some(front) = vehicle.pending.front() {
            if connects(ctx.network, vehicle, front) {
                return Some(*front);
            }
            debug!(
                "{}: pending hop {} no longer connects to {}, re-planning",
                vehicle.id, front.segment, vehicle.segment
            );
            vehicle.pending.clear();
            vehicle.stats.reroutes += 1;
        }
        if let Err(e) = self.plan_path(ctx.network, vehicle, rng) {
            debug!("{}: no path from {} ({e}), turning at random", vehicle.id, vehicle.segment);
            vehicle.pending.clear();
            let hop = random_hop(ctx, vehicle, rng)?;
            vehicle.pending.push_back(hop);
            return Some(hop);
        }
        vehicle.pending.front().copied()
    }

    fn on_spawn(&self, ctx: &PlanContext<'_>, vehicle: &mut VehicleState, rng: &mut VehicleRng) -> bool {
        self.plan_path(ctx.network, vehicle, rng).is_ok()
    }

    fn destination_reached(&self, vehicle: &VehicleState) -> bool {
        vehicle.destination == Some(vehicle.segment) && vehicle.pending.is_empty()
    }

    fn name(&self) -> &'static str {
        "origin-destination"
    }
}

// ── Path post-processing ──────────────────────────────────────────────────────

/// Turn a router result into pending entries for `vehicle`.
///
/// Consecutive duplicates are dropped, then the leading entry if it is the
/// vehicle's current segment and direction.  A first entry that reverses on
/// the current segment becomes a U-turn.  A first entry that does not
/// connect to the current exit gets an explicit U-turn in front of it.
pub fn postprocess(
    network: &RoadNetwork,
    vehicle: &VehicleState,
    route: &Route,
) -> MobilityResult<VecDeque<RouteEntry>> {
    let mut steps: Vec<RouteStep> = route.steps.clone();
    steps.dedup();
    if steps.len() < MIN_PATH_ENTRIES {
        return Err(MobilityError::PathTooShort { entries: steps.len() });
    }

    let mut entries: VecDeque<RouteEntry> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| RouteEntry {
            origin: i == 0,
            ..RouteEntry::new(network.exit_point(s.segment, s.direction), s.segment, s.direction)
        })
        .collect();

    if entries.front().is_some_and(|e| e.segment == vehicle.segment && e.direction == vehicle.direction) {
        entries.pop_front();
    }

    let back = vehicle.direction.reverse();
    if let Some(first) = entries.front_mut() {
        if first.segment == vehicle.segment && first.direction == back {
            first.uturn = true;
        } else if !connects(network, vehicle, first) {
            if !network.segment(vehicle.segment).can_travel(back) {
                return Err(SpatialError::NoRoute { from: vehicle.segment, to: first.segment }.into());
            }
            entries.push_front(RouteEntry::uturn(network.exit_point(vehicle.segment, back), vehicle.segment, back));
        }
    }
    Ok(entries)
}

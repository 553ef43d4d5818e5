//! `TrafficEngine`: the per-vehicle step.
//!
//! # Step anatomy
//!
//! 1. A vehicle held at the line returns immediately until its pause ends.
//! 2. Lookahead decides the free distance and what happens at the exit:
//!    keep driving, hold at the line, enter the next segment, U-turn or
//!    leave the network.
//! 3. The car-following model turns the free distance into travel and speed.
//! 4. Travel is consumed, connector first.  Reaching the exit fires at most
//!    one transition and leftover travel carries onto the new segment.
//! 5. Position, heading and colour are refreshed and returned with the delay
//!    until the vehicle's next step.

use std::sync::Arc;

use log::{debug, trace};

use st_core::{IntersectionId, MobilityMode, SimRng, SimTime, TrafficConfig, VehicleId};
use st_spatial::network::{MIN_GAP_M, VEHICLE_LENGTH_M};
use st_spatial::{AStarRouter, RoadNetwork, TrafficControl};

use crate::following::FollowingParams;
use crate::intersection::{IntersectionArbiter, LaneConnector};
use crate::lanes::{LaneManager, LaneRef};
use crate::planner::{OdPlanner, PlanContext, RandomTurnPlanner, RoutePlanner};
use crate::state::{Arbitration, ColorHint, ConnectorState, RouteEntry, StepOutcome, VehicleState, VehicleStatus};
use crate::{MobilityError, MobilityResult, VehicleStore};

/// Bumper-to-bumper spacing between queued vehicles.
pub const SPACING_M: f64 = VEHICLE_LENGTH_M + MIN_GAP_M;

/// Extra room allowed past a connector when the next segment belongs to a
/// different street.
pub const TURN_CLEARANCE_M: f64 = 10.0;

/// Remaining distances below this are treated as zero.
const EPS: f64 = 1e-9;

/// What the vehicle does when it reaches its exit this step.
enum Plan {
    /// Nothing happens at the exit within this step.
    Cruise,
    /// Stop short of the exit.
    Hold(VehicleStatus),
    /// Newly held at the line by intersection control.
    Wait { delay_ms: u64 },
    Enter(Entering),
    UTurn(LaneRef),
    Finish,
}

struct Entering {
    entry:     RouteEntry,
    lane:      LaneRef,
    connector: Arc<LaneConnector>,
    node:      IntersectionId,
}

impl Plan {
    fn is_transition(&self) -> bool {
        matches!(self, Plan::Enter(_) | Plan::UTurn(_) | Plan::Finish)
    }
}

/// Owns the network view, lane queues, arbitration bookkeeping and every
/// vehicle.  Single-threaded; the host drives it through [`step`].
///
/// [`step`]: TrafficEngine::step
pub struct TrafficEngine {
    pub(crate) config:  TrafficConfig,
    pub(crate) network: Arc<RoadNetwork>,
    pub(crate) lanes:   LaneManager,
    pub(crate) arbiter: IntersectionArbiter,
    pub(crate) planner: Box<dyn RoutePlanner>,
    pub(crate) store:   VehicleStore,
    pub(crate) rng:     SimRng,
    pub(crate) params:  FollowingParams,
}

impl TrafficEngine {
    /// Build an engine with the planner selected by `config.mobility`.
    ///
    /// The origin/destination planner searches with a cost bound of three
    /// times the maximum origin→destination distance.
    pub fn new(network: Arc<RoadNetwork>, config: TrafficConfig) -> MobilityResult<Self> {
        let planner: Box<dyn RoutePlanner> = match config.mobility {
            MobilityMode::RandomTurn => Box::new(RandomTurnPlanner),
            MobilityMode::OriginDestination => Box::new(OdPlanner::new(
                AStarRouter::with_max_cost(3.0 * config.max_od_distance_m),
                config.max_od_distance_m,
            )),
        };
        Self::with_planner(network, config, planner)
    }

    pub fn with_planner(
        network: Arc<RoadNetwork>,
        config: TrafficConfig,
        planner: Box<dyn RoutePlanner>,
    ) -> MobilityResult<Self> {
        config.validate()?;
        debug!(
            "engine: {} segments, {} intersections, planner {}",
            network.segment_count(),
            network.intersection_count(),
            planner.name()
        );
        Ok(Self {
            lanes: LaneManager::new(&network),
            arbiter: IntersectionArbiter::new(&config),
            params: FollowingParams::from_config(&config),
            rng: SimRng::new(config.seed),
            store: VehicleStore::new(),
            planner,
            network,
            config,
        })
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    pub fn network(&self) -> &Arc<RoadNetwork> {
        &self.network
    }

    pub fn lanes(&self) -> &LaneManager {
        &self.lanes
    }

    pub fn arbiter(&self) -> &IntersectionArbiter {
        &self.arbiter
    }

    pub fn store(&self) -> &VehicleStore {
        &self.store
    }

    pub fn planner_name(&self) -> &'static str {
        self.planner.name()
    }

    /// State of an active vehicle.
    pub fn vehicle(&self, id: VehicleId) -> MobilityResult<&VehicleState> {
        self.store.get(id)
    }

    pub fn active_count(&self) -> usize {
        self.store.active_count()
    }

    /// `true` if every lane queue is ordered by effective remaining distance.
    pub fn lanes_ordered(&self) -> bool {
        self.lanes
            .all_lanes()
            .all(|lane| self.lanes.is_ordered(lane, |v| self.store.effective_remaining(v)))
    }

    /// Take a vehicle off the network.  Its statistics stay readable through
    /// [`VehicleStore::state`].
    pub fn remove_vehicle(&mut self, id: VehicleId) -> MobilityResult<()> {
        let v = self.store.get_mut(id)?;
        let lane = v.lane_ref();
        if !self.lanes.remove_vehicle(lane, id) {
            return Err(MobilityError::NotInLane { vehicle: id, lane });
        }
        self.arbiter.release(self.network.exit_node(lane.segment, lane.direction), id);
        v.active = false;
        v.pending.clear();
        v.connector = None;
        v.speed = 0.0;
        debug!("{id} left the network on {}", lane.segment);
        Ok(())
    }

    // ── Step ──────────────────────────────────────────────────────────────

    /// Advance `id` by one step at simulation time `now`.
    pub fn step(&mut self, id: VehicleId, now: SimTime) -> MobilityResult<StepOutcome> {
        let network = Arc::clone(&self.network);
        let net = network.as_ref();

        {
            let v = self.store.get_mut(id)?;
            if let Arbitration::Waiting { until } = v.arbitration {
                if now < until {
                    let delay = (until - now).clamp(1, v.step_ms);
                    v.stats.record(0.0, 0.0);
                    trace!("{id} waiting at {} until {until}", v.segment);
                    return self.outcome(net, id, VehicleStatus::Waiting, delay);
                }
                v.arbitration = Arbitration::Cleared;
            }
        }

        let (free, plan) = self.lookahead(net, id, now)?;
        if let Plan::Wait { delay_ms } = plan {
            self.store.get_mut(id)?.stats.record(0.0, 0.0);
            return self.outcome(net, id, VehicleStatus::Waiting, delay_ms);
        }

        let dt = self.config.step_secs();
        let tol = net.tolerance();
        let (eff, speed, target) = {
            let v = self.store.get(id)?;
            (v.effective_remaining(), v.speed, net.speed_limit(v.segment) * v.speed_factor)
        };
        let motion = self.params.advance(speed, target, free, dt);
        {
            let v = self.store.get_mut(id)?;
            v.speed = motion.speed;
            v.stats.record(motion.travel, motion.speed);
        }
        trace!("{id}: free {free:.2} m, travel {:.2} m, speed {:.2} m/s", motion.travel, motion.speed);

        let crossing = plan.is_transition() && motion.travel >= eff - tol;
        let mut status = VehicleStatus::Driving;
        match plan {
            Plan::Enter(entering) if crossing => {
                if !self.enter(net, id, entering, motion.travel - eff)? {
                    self.consume(id, motion.travel)?;
                    status = VehicleStatus::Blocked;
                }
            }
            Plan::UTurn(lane) if crossing => {
                self.consume(id, motion.travel)?;
                if !self.reverse(net, id, lane)? {
                    status = VehicleStatus::Blocked;
                }
            }
            Plan::Finish if crossing => {
                self.consume(id, motion.travel)?;
                self.remove_vehicle(id)?;
                status = VehicleStatus::Finished;
            }
            Plan::Hold(s) => {
                self.consume(id, motion.travel)?;
                status = s;
            }
            _ => self.consume(id, motion.travel)?,
        }

        let delay = self.config.step_duration_ms;
        self.outcome(net, id, status, delay)
    }

    /// Work out the free distance and what happens at the exit.
    fn lookahead(&mut self, net: &RoadNetwork, id: VehicleId, now: SimTime) -> MobilityResult<(f64, Plan)> {
        let dt = self.config.step_secs();
        let tol = net.tolerance();
        let (eff, lane, speed, target) = {
            let v = self.store.get(id)?;
            (v.effective_remaining(), v.lane_ref(), v.speed, net.speed_limit(v.segment) * v.speed_factor)
        };

        if let Some(pred) = self.lanes.peek_predecessor(lane, id)? {
            let gap = eff - self.store.effective_remaining(pred) - SPACING_M;
            return Ok((gap.max(0.0), Plan::Cruise));
        }
        if eff >= self.params.lookahead(speed, target, dt) + tol {
            return Ok((eff, Plan::Cruise));
        }

        let next = {
            let (v, rng) = self.store.state_and_rng(id)?;
            if self.planner.destination_reached(v) {
                if self.config.remove_on_arrival {
                    return Ok((eff, Plan::Finish));
                }
                v.destination = None;
                v.stats.trips_completed += 1;
                debug!("{id} reached its destination {}", v.segment);
            }
            let ctx = PlanContext { network: net, lanes: &self.lanes };
            self.planner.next_segment(&ctx, v, rng)
        };
        let entry = match next {
            Some(e) if !e.uturn => e,
            _ => return self.plan_reversal(net, id, eff),
        };

        // Intersection control.
        let node = net.exit_node(lane.segment, lane.direction);
        {
            let v = self.store.get_mut(id)?;
            // A signal may have changed phase since it cleared the vehicle.
            let recheck = v.arbitration == Arbitration::Cleared
                && eff <= tol
                && net
                    .intersections
                    .get(node.index())
                    .is_some_and(|i| matches!(i.control, TrafficControl::Signal { .. }));
            if v.arbitration == Arbitration::Approaching || recheck {
                let pause = self.arbiter.required_pause(net, node, lane.segment, lane.direction, id, now)?;
                if pause > 0 {
                    if eff > tol {
                        return Ok((eff, Plan::Hold(VehicleStatus::Driving)));
                    }
                    self.arbiter.register(node, id, lane.segment, now);
                    v.arbitration = Arbitration::Waiting { until: now + pause };
                    v.wait_steps += 1;
                    v.speed = 0.0;
                    trace!("{id} stops at {node} for {pause} ms");
                    return Ok((0.0, Plan::Wait { delay_ms: pause.clamp(1, v.step_ms) }));
                }
                v.arbitration = Arbitration::Cleared;
            }
        }

        // Room on the next segment.
        let Some(next_lane) = self.lanes.free_lane(entry.segment, entry.direction) else {
            return self.blocked(net, id, eff);
        };
        let connector = self.arbiter.connector(net, lane, next_lane, node);
        let span = connector.length() + net.length(entry.segment);
        let mut free = match self.lanes.tail(next_lane) {
            Some(tail) => {
                let room = span - self.store.effective_remaining(tail) - SPACING_M;
                if room < 0.0 {
                    return self.blocked(net, id, eff);
                }
                eff + room
            }
            None => eff + span,
        };
        if net.segment(entry.segment).street != net.segment(lane.segment).street {
            free = free.min(eff + connector.length() + TURN_CLEARANCE_M);
        }
        Ok((free, Plan::Enter(Entering { entry, lane: next_lane, connector, node })))
    }

    /// Turn around at the exit, or leave the network at a one-way dead end.
    fn plan_reversal(&mut self, net: &RoadNetwork, id: VehicleId, eff: f64) -> MobilityResult<(f64, Plan)> {
        let v = self.store.get(id)?;
        let seg = net.segment(v.segment);
        let back = v.direction.reverse();
        if seg.can_travel(back) {
            if let Some(lane) = self.lanes.free_lane(v.segment, back) {
                let clear = self
                    .lanes
                    .tail(lane)
                    .is_none_or(|t| seg.length - self.store.effective_remaining(t) >= SPACING_M);
                if clear {
                    return Ok((eff, Plan::UTurn(lane)));
                }
            }
        } else if !net.outgoing(seg.exit_node(v.direction)).any(|(s, _)| s != v.segment) {
            debug!("{id} reached a one-way dead end on {}", v.segment);
            return Ok((eff, Plan::Finish));
        }
        self.blocked(net, id, eff)
    }

    /// Stall before the exit.  At the line this counts toward the wait
    /// threshold, past which the vehicle turns around or re-plans.
    fn blocked(&mut self, net: &RoadNetwork, id: VehicleId, eff: f64) -> MobilityResult<(f64, Plan)> {
        let threshold = self.config.wait_threshold;
        let v = self.store.get_mut(id)?;
        if eff > net.tolerance() {
            return Ok((eff, Plan::Hold(VehicleStatus::Driving)));
        }
        v.wait_steps += 1;
        if v.wait_steps > threshold {
            v.wait_steps = 0;
            let node = net.exit_node(v.segment, v.direction);
            self.arbiter.release(node, id);
            v.arbitration = Arbitration::Approaching;
            let back = v.direction.reverse();
            let uturn_pending = v.pending.front().is_some_and(|e| e.uturn);
            v.pending.clear();
            if uturn_pending || !net.segment(v.segment).can_travel(back) {
                v.destination = None;
                v.stats.reroutes += 1;
                debug!("{id} blocked at {node}, re-planning");
            } else {
                v.pending.push_back(RouteEntry::uturn(net.exit_point(v.segment, back), v.segment, back));
                debug!("{id} blocked at {node}, turning around");
            }
        }
        Ok((eff, Plan::Hold(VehicleStatus::Blocked)))
    }

    // ── Transitions ───────────────────────────────────────────────────────

    /// Move onto the next segment.  `false` if the lane filled up.
    fn enter(&mut self, net: &RoadNetwork, id: VehicleId, e: Entering, leftover: f64) -> MobilityResult<bool> {
        let old = self.store.get(id)?.lane_ref();
        let length = net.length(e.entry.segment);
        let clen = e.connector.length();

        let store = &self.store;
        match self.lanes.add_vehicle(e.lane, id, clen + length, |v| store.effective_remaining(v)) {
            Ok(()) => {}
            Err(MobilityError::LaneFull(_)) => return Ok(false),
            Err(err) => return Err(err),
        }
        if !self.lanes.remove_vehicle(old, id) {
            self.lanes.remove_vehicle(e.lane, id);
            return Err(MobilityError::NotInLane { vehicle: id, lane: old });
        }
        self.arbiter.release(e.node, id);

        let v = self.store.get_mut(id)?;
        v.segment = e.entry.segment;
        v.direction = e.entry.direction;
        v.lane = e.lane.lane;
        v.remaining = length;
        v.connector = (clen > EPS).then(|| ConnectorState { connector: e.connector, remaining: clen });
        v.arbitration = Arbitration::Approaching;
        v.wait_steps = 0;
        if v.pending.front().is_some_and(|p| p.segment == e.entry.segment && p.direction == e.entry.direction) {
            v.pending.pop_front();
        }
        v.stats.segments_entered += 1;
        advance_along(v, leftover.max(0.0));
        trace!("{id} entered {} via {}", v.segment, e.node);
        Ok(true)
    }

    /// Reverse onto `lane` of the same segment.  `false` if it filled up.
    fn reverse(&mut self, net: &RoadNetwork, id: VehicleId, lane: LaneRef) -> MobilityResult<bool> {
        let (old, remaining) = {
            let v = self.store.get(id)?;
            (v.lane_ref(), v.remaining)
        };
        let flipped = (net.length(old.segment) - remaining).max(0.0);

        let store = &self.store;
        match self.lanes.add_vehicle(lane, id, flipped, |v| store.effective_remaining(v)) {
            Ok(()) => {}
            Err(MobilityError::LaneFull(_)) => return Ok(false),
            Err(err) => return Err(err),
        }
        if !self.lanes.remove_vehicle(old, id) {
            self.lanes.remove_vehicle(lane, id);
            return Err(MobilityError::NotInLane { vehicle: id, lane: old });
        }
        self.arbiter.release(net.exit_node(old.segment, old.direction), id);

        let v = self.store.get_mut(id)?;
        v.direction = lane.direction;
        v.lane = lane.lane;
        v.remaining = flipped;
        v.connector = None;
        v.speed = 0.0;
        v.arbitration = Arbitration::Approaching;
        v.wait_steps = 0;
        if v.pending.front().is_some_and(|p| p.uturn) {
            v.pending.pop_front();
        }
        v.stats.uturns += 1;
        debug!("{id} turned around on {}", v.segment);
        Ok(true)
    }

    fn consume(&mut self, id: VehicleId, travel: f64) -> MobilityResult<()> {
        advance_along(self.store.get_mut(id)?, travel);
        Ok(())
    }

    /// Refresh the cached position and build the outcome.
    fn outcome(
        &mut self,
        net: &RoadNetwork,
        id: VehicleId,
        status: VehicleStatus,
        delay_ms: u64,
    ) -> MobilityResult<StepOutcome> {
        let mode = self.config.color_mode;
        let v = self.store.state_mut(id)?;
        let (position, heading) = match &v.connector {
            Some(c) => c.connector.point_at(c.remaining),
            None => net.lane_point_at(v.segment, v.direction, v.lane, v.remaining),
        };
        v.position = position;
        v.heading = heading;
        Ok(StepOutcome {
            vehicle: id,
            position,
            heading,
            speed: v.speed,
            color: ColorHint::for_vehicle(mode, id, v.speed, net.speed_limit(v.segment)),
            delay_ms,
            status,
        })
    }
}

/// Consume `travel` metres, connector first.  Distances never go negative.
fn advance_along(v: &mut VehicleState, mut travel: f64) {
    if let Some(c) = v.connector.as_mut() {
        let used = travel.min(c.remaining);
        c.remaining -= used;
        travel -= used;
        if c.remaining <= EPS {
            v.connector = None;
        }
    }
    v.remaining = (v.remaining - travel).max(0.0);
}

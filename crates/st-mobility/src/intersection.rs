//! Intersection arbitration and lane connectors.
//!
//! # Control rules
//!
//! | Control  | Pause on arrival at the line                                          |
//! |----------|-----------------------------------------------------------------------|
//! | `None`   | 0                                                                     |
//! | `Stop`   | stop pause, plus one yield pause per vehicle from another approach already registered |
//! | `Signal` | time until the approach axis turns green, 0 when it is green           |
//!
//! A signal's east–west phase is green for the first half of its cycle and
//! the north–south phase for the second half.  The axis of an approach is
//! taken from the travel heading on arrival.
//!
//! Registration is held from the moment a vehicle starts waiting until it
//! leaves the intersection.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use st_core::geo::{polyline_length, polyline_point_at, quadratic_bezier};
use st_core::{IntersectionId, Point, SegmentId, SimTime, TrafficConfig, VehicleId};
use st_spatial::{Direction, RoadNetwork, TrafficControl};

use crate::lanes::LaneRef;
use crate::{MobilityError, MobilityResult};

/// Samples per connector curve.
const CONNECTOR_SAMPLES: usize = 12;

/// A vehicle registered at an intersection.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Waiter {
    pub vehicle:  VehicleId,
    /// Segment the vehicle arrived on.
    pub approach: SegmentId,
    pub since:    SimTime,
}

/// The path a vehicle follows through an intersection, from the exit lane of
/// one segment to the entry lane of the next.
#[derive(Clone, Debug)]
pub struct LaneConnector {
    points: Vec<Point>,
    length: f64,
}

impl LaneConnector {
    pub fn new(points: Vec<Point>) -> Self {
        let length = polyline_length(&points);
        Self { points, length }
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Point and heading `remaining` metres before the connector's end.
    pub fn point_at(&self, remaining: f64) -> (Point, Point) {
        polyline_point_at(&self.points, self.length - remaining.clamp(0.0, self.length))
    }
}

pub struct IntersectionArbiter {
    stop_pause_ms:  u64,
    yield_pause_ms: u64,
    waiting:        FxHashMap<IntersectionId, Vec<Waiter>>,
    connectors:     FxHashMap<(LaneRef, LaneRef), Arc<LaneConnector>>,
}

impl IntersectionArbiter {
    pub fn new(config: &TrafficConfig) -> Self {
        Self {
            stop_pause_ms:  config.stop_pause_ms,
            yield_pause_ms: config.yield_pause_ms,
            waiting:        FxHashMap::default(),
            connectors:     FxHashMap::default(),
        }
    }

    /// Milliseconds `vehicle` must wait at the line before entering `node`
    /// from `approach` travelling in `direction`.
    pub fn required_pause(
        &self,
        network: &RoadNetwork,
        node: IntersectionId,
        approach: SegmentId,
        direction: Direction,
        vehicle: VehicleId,
        now: SimTime,
    ) -> MobilityResult<u64> {
        let Some(intersection) = network.intersections.get(node.index()) else {
            return Err(MobilityError::IntersectionMissing {
                vehicle,
                point: network.exit_point(approach, direction),
            });
        };
        Ok(match intersection.control {
            TrafficControl::None => 0,
            TrafficControl::Stop => {
                let ahead = self
                    .waiting(node)
                    .iter()
                    .filter(|w| w.vehicle != vehicle && w.approach != approach)
                    .count() as u64;
                self.stop_pause_ms + self.yield_pause_ms * ahead
            }
            TrafficControl::Signal { cycle_ms, offset_ms } => {
                let heading = network.approach_heading(approach, direction);
                signal_wait(heading, cycle_ms, offset_ms, now)
            }
        })
    }

    /// Record `vehicle` as waiting at `node`.  Registering twice is a no-op.
    pub fn register(&mut self, node: IntersectionId, vehicle: VehicleId, approach: SegmentId, now: SimTime) {
        let list = self.waiting.entry(node).or_default();
        if !list.iter().any(|w| w.vehicle == vehicle) {
            list.push(Waiter { vehicle, approach, since: now });
        }
    }

    /// `false` if `vehicle` was not registered at `node`.
    pub fn release(&mut self, node: IntersectionId, vehicle: VehicleId) -> bool {
        let Some(list) = self.waiting.get_mut(&node) else {
            return false;
        };
        let before = list.len();
        list.retain(|w| w.vehicle != vehicle);
        let removed = list.len() != before;
        if list.is_empty() {
            self.waiting.remove(&node);
        }
        removed
    }

    /// Vehicles registered at `node`, oldest first.
    pub fn waiting(&self, node: IntersectionId) -> &[Waiter] {
        self.waiting.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Connector from the exit of `from` to the entry of `to` through
    /// `node`, built on first use and cached.
    pub fn connector(
        &mut self,
        network: &RoadNetwork,
        from: LaneRef,
        to: LaneRef,
        node: IntersectionId,
    ) -> Arc<LaneConnector> {
        self.connectors
            .entry((from, to))
            .or_insert_with(|| {
                let (start, _) = network.lane_point_at(from.segment, from.direction, from.lane, 0.0);
                let (end, _) =
                    network.lane_point_at(to.segment, to.direction, to.lane, network.length(to.segment));
                let control = network.intersection(node).point;
                Arc::new(LaneConnector::new(quadratic_bezier(start, control, end, CONNECTOR_SAMPLES)))
            })
            .clone()
    }

    pub fn cached_connectors(&self) -> usize {
        self.connectors.len()
    }
}

/// Milliseconds until the axis of `heading` is green.
pub(crate) fn signal_wait(heading: Point, cycle_ms: u64, offset_ms: u64, now: SimTime) -> u64 {
    let cycle = cycle_ms.max(2);
    let half = cycle / 2;
    let t = (now.as_millis() + offset_ms) % cycle;
    let east_west = heading.x.abs() >= heading.y.abs();
    match (east_west, t < half) {
        (true, true) | (false, false) => 0,
        (true, false) => cycle - t,
        (false, true) => half - t,
    }
}


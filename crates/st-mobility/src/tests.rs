//! Unit tests for st-mobility.
//!
//! Every test builds its own small network by hand.

#[cfg(test)]
mod helpers {
    use std::sync::Arc;

    use st_core::{Point, StreetId, TrafficConfig};
    use st_spatial::{RoadNetwork, RoadNetworkBuilder, SegmentSpec, StreetName};

    use crate::TrafficEngine;

    /// Deterministic config: no driver variance.
    pub fn config() -> TrafficConfig {
        TrafficConfig { speed_variance_sd: 0.0, ..TrafficConfig::default() }
    }

    /// Named two-way local segments joined end to end along the x axis.
    pub fn chain(points: &[f64]) -> RoadNetworkBuilder {
        let mut b = RoadNetworkBuilder::new();
        b.add_street(StreetId(0), StreetName::new("Main"));
        for w in points.windows(2) {
            b.add_segment(
                SegmentSpec::new(Point::new(w[0], 0.0), Point::new(w[1], 0.0)).street(StreetId(0)),
            )
            .unwrap();
        }
        b
    }

    /// 3 × 3 lattice, 100 m spacing, every segment named.
    ///
    /// Horizontal segments s0–s5 row-major, then vertical s6–s11 column-major.
    pub fn lattice() -> RoadNetwork {
        let p = |c: usize, r: usize| Point::new(c as f64 * 100.0, r as f64 * 100.0);
        let mut b = RoadNetworkBuilder::new();
        b.add_street(StreetId(0), StreetName::new("Grid"));
        for row in 0..3 {
            for col in 0..2 {
                b.add_segment(SegmentSpec::new(p(col, row), p(col + 1, row)).street(StreetId(0))).unwrap();
            }
        }
        for col in 0..3 {
            for row in 0..2 {
                b.add_segment(SegmentSpec::new(p(col, row), p(col, row + 1)).street(StreetId(0))).unwrap();
            }
        }
        b.build()
    }

    /// Four named arms meeting at (100, 100): west, east, north, south.
    pub fn cross() -> RoadNetwork {
        let c = Point::new(100.0, 100.0);
        let mut b = RoadNetworkBuilder::new();
        b.add_street(StreetId(0), StreetName::new("Cross"));
        for start in [Point::new(0.0, 100.0), Point::new(200.0, 100.0), Point::new(100.0, 0.0), Point::new(100.0, 200.0)] {
            b.add_segment(SegmentSpec::new(start, c).street(StreetId(0))).unwrap();
        }
        b.build()
    }

    pub fn engine(network: RoadNetwork, config: TrafficConfig) -> TrafficEngine {
        TrafficEngine::new(Arc::new(network), config).unwrap()
    }
}

// ── Lane manager ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod lanes {
    use std::collections::HashMap;

    use st_core::{SegmentId, VehicleId};
    use st_spatial::Direction;

    use super::helpers::chain;
    use crate::{LaneManager, LaneRef, MobilityError};

    fn lane() -> LaneRef {
        LaneRef::new(SegmentId(0), Direction::Forward, 0)
    }

    #[test]
    fn capacity_is_enforced() {
        // 30 m holds floor(30 / 7) = 4 vehicles.
        let net = chain(&[0.0, 30.0]).build();
        let mut lanes = LaneManager::new(&net);
        assert_eq!(lanes.capacity(lane()), 4);
        for i in 0..4 {
            lanes.add_vehicle(lane(), VehicleId(i), 7.0 * (i + 1) as f64, |_| 0.0).unwrap();
        }
        let err = lanes.add_vehicle(lane(), VehicleId(9), 29.0, |_| 0.0).unwrap_err();
        assert!(matches!(err, MobilityError::LaneFull(l) if l == lane()));
        assert_eq!(lanes.len(lane()), 4);
        assert_eq!(lanes.free_lane(SegmentId(0), Direction::Forward), None);
        assert_eq!(lanes.free_lane(SegmentId(0), Direction::Backward).map(|l| l.lane), Some(0));
    }

    #[test]
    fn insert_keeps_order() {
        let net = chain(&[0.0, 100.0]).build();
        let mut lanes = LaneManager::new(&net);
        let mut dist: HashMap<VehicleId, f64> = HashMap::new();
        for (id, d) in [(0, 20.0), (1, 5.0), (2, 12.0), (3, 60.0)] {
            let of = |v: VehicleId| dist[&v];
            lanes.add_vehicle(lane(), VehicleId(id), d, of).unwrap();
            dist.insert(VehicleId(id), d);
        }
        let order: Vec<u32> = lanes.vehicles(lane()).map(|v| v.0).collect();
        assert_eq!(order, vec![1, 2, 0, 3]);
        assert!(lanes.is_ordered(lane(), |v| dist[&v]));
        assert_eq!(lanes.tail(lane()), Some(VehicleId(3)));
    }

    #[test]
    fn predecessor() {
        let net = chain(&[0.0, 100.0]).build();
        let mut lanes = LaneManager::new(&net);
        lanes.add_vehicle(lane(), VehicleId(0), 10.0, |_| 0.0).unwrap();
        lanes.add_vehicle(lane(), VehicleId(1), 30.0, |_| 10.0).unwrap();
        assert_eq!(lanes.peek_predecessor(lane(), VehicleId(0)).unwrap(), None);
        assert_eq!(lanes.peek_predecessor(lane(), VehicleId(1)).unwrap(), Some(VehicleId(0)));

        let err = lanes.peek_predecessor(lane(), VehicleId(5)).unwrap_err();
        assert!(matches!(err, MobilityError::NotInLane { vehicle: VehicleId(5), .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn remove() {
        let net = chain(&[0.0, 100.0]).build();
        let mut lanes = LaneManager::new(&net);
        lanes.add_vehicle(lane(), VehicleId(0), 10.0, |_| 0.0).unwrap();
        assert!(lanes.remove_vehicle(lane(), VehicleId(0)));
        assert!(!lanes.remove_vehicle(lane(), VehicleId(0)));
        assert_eq!(lanes.total_vehicles(), 0);
    }

    #[test]
    fn free_lane_prefers_least_occupied() {
        let mut b = chain(&[]);
        b.add_segment(
            st_spatial::SegmentSpec::new(st_core::Point::ZERO, st_core::Point::new(100.0, 0.0)).lanes(2),
        )
        .unwrap();
        let net = b.build();
        let mut lanes = LaneManager::new(&net);
        assert_eq!(lanes.free_lane(SegmentId(0), Direction::Forward).map(|l| l.lane), Some(0));
        lanes.add_vehicle(LaneRef::new(SegmentId(0), Direction::Forward, 0), VehicleId(0), 10.0, |_| 0.0).unwrap();
        assert_eq!(lanes.free_lane(SegmentId(0), Direction::Forward).map(|l| l.lane), Some(1));
    }

    #[test]
    fn invalid_lane() {
        let net = chain(&[0.0, 100.0]).build();
        let mut lanes = LaneManager::new(&net);
        let bad = LaneRef::new(SegmentId(0), Direction::Forward, 3);
        assert!(matches!(lanes.add_vehicle(bad, VehicleId(0), 1.0, |_| 0.0), Err(MobilityError::InvalidLane(_))));
        let missing = LaneRef::new(SegmentId(7), Direction::Forward, 0);
        assert!(matches!(lanes.peek_predecessor(missing, VehicleId(0)), Err(MobilityError::InvalidLane(_))));
        assert_eq!(lanes.capacity(missing), 0);
    }

    #[test]
    fn all_lanes_covers_both_directions() {
        let net = chain(&[0.0, 100.0, 200.0]).build();
        let lanes = LaneManager::new(&net);
        assert_eq!(lanes.all_lanes().count(), 4);
    }
}

// ── Car following ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod following {
    use crate::FollowingParams;

    fn params() -> FollowingParams {
        FollowingParams { max_accel: 2.5, max_decel: 7.5, comfort_decel: 3.0 }
    }

    #[test]
    fn never_exceeds_free_distance() {
        let p = params();
        for speed in [0.0, 2.0, 5.0, 11.0, 20.0, 30.0] {
            for free in [0.0, 0.5, 1.0, 5.0, 12.0, 40.0, 500.0] {
                let m = p.advance(speed, 15.0, free, 0.5);
                assert!(m.travel <= free + 1e-9, "v={speed} free={free} travel={}", m.travel);
                assert!(m.travel >= 0.0);
                assert!(m.speed >= 0.0);
            }
        }
    }

    #[test]
    fn accelerates_to_target() {
        let p = params();
        let mut speed = 0.0;
        for _ in 0..40 {
            speed = p.advance(speed, 12.0, 1e6, 0.5).speed;
            assert!(speed <= 12.0);
        }
        assert_eq!(speed, 12.0);
    }

    #[test]
    fn deceleration_is_bounded_with_room() {
        let p = params();
        // Above the target with plenty of room: lose at most max_decel·dt.
        let m = p.advance(10.0, 5.0, 100.0, 0.5);
        assert!((m.speed - 6.25).abs() < 1e-12);
    }

    #[test]
    fn stops_before_a_wall() {
        let p = params();
        let wall = 60.0;
        let (mut pos, mut speed) = (0.0, 14.0);
        for _ in 0..200 {
            let m = p.advance(speed, 14.0, wall - pos, 0.5);
            pos += m.travel;
            speed = m.speed;
            assert!(pos <= wall + 1e-9);
        }
        assert!(wall - pos < 0.5);
        assert!(speed < 1.0);
    }

    #[test]
    fn lookahead_covers_braking() {
        let p = params();
        let (up, d) = p.reach(10.0, 20.0, 0.5);
        assert_eq!(up, 11.25);
        assert!((p.lookahead(10.0, 20.0, 0.5) - (d + p.braking_distance(up))).abs() < 1e-12);
    }
}

// ── Intersection arbitration ──────────────────────────────────────────────────

#[cfg(test)]
mod arbitration {
    use std::sync::Arc;

    use st_core::{IntersectionId, Point, SegmentId, SimTime, TrafficConfig, VehicleId};
    use st_spatial::{Direction, TrafficControl};

    use super::helpers::{chain, cross};
    use crate::intersection::signal_wait;
    use crate::{IntersectionArbiter, LaneRef, MobilityError};

    const WEST: SegmentId = SegmentId(0);
    const NORTH: SegmentId = SegmentId(2);

    #[test]
    fn stop_yields_to_other_approaches() {
        let net = cross();
        let node = net.find_intersection(Point::new(100.0, 100.0)).unwrap();
        assert_eq!(net.intersection(node).control, TrafficControl::Stop);
        let mut arb = IntersectionArbiter::new(&TrafficConfig::default());
        let t = SimTime::ZERO;
        let pause = |arb: &IntersectionArbiter, seg, v| arb.required_pause(&net, node, seg, Direction::Forward, VehicleId(v), t).unwrap();

        assert_eq!(pause(&arb, WEST, 0), 2_000);
        arb.register(node, VehicleId(0), WEST, t);
        arb.register(node, VehicleId(0), WEST, t);
        assert_eq!(arb.waiting(node).len(), 1);

        // From another approach: one extra yield pause.
        assert_eq!(pause(&arb, NORTH, 1), 3_000);
        // Same approach: not counted.
        assert_eq!(pause(&arb, WEST, 2), 2_000);
        // Own registration is not counted.
        assert_eq!(pause(&arb, WEST, 0), 2_000);

        assert!(arb.release(node, VehicleId(0)));
        assert!(!arb.release(node, VehicleId(0)));
        assert_eq!(pause(&arb, NORTH, 1), 2_000);
        assert!(arb.waiting(node).is_empty());
    }

    #[test]
    fn signal_phases() {
        let ew = Point::new(1.0, 0.0);
        let ns = Point::new(0.0, -1.0);
        let at = SimTime::from_millis;
        assert_eq!(signal_wait(ew, 60_000, 0, at(0)), 0);
        assert_eq!(signal_wait(ew, 60_000, 0, at(29_999)), 0);
        assert_eq!(signal_wait(ew, 60_000, 0, at(40_000)), 20_000);
        assert_eq!(signal_wait(ns, 60_000, 0, at(10_000)), 20_000);
        assert_eq!(signal_wait(ns, 60_000, 0, at(45_000)), 0);
        // Offset shifts the cycle.
        assert_eq!(signal_wait(ew, 60_000, 30_000, at(0)), 30_000);
    }

    #[test]
    fn signal_uses_approach_heading() {
        let mut b = chain(&[0.0, 100.0, 200.0]);
        b.add_segment(st_spatial::SegmentSpec::new(Point::new(100.0, -100.0), Point::new(100.0, 0.0))).unwrap();
        b.set_control(Point::new(100.0, 0.0), TrafficControl::Signal { cycle_ms: 10_000, offset_ms: 0 });
        let net = b.build();
        let node = net.find_intersection(Point::new(100.0, 0.0)).unwrap();
        let arb = IntersectionArbiter::new(&TrafficConfig::default());
        let t = SimTime::from_millis(1_000);
        // East-bound on s0 is green in the first half.
        assert_eq!(arb.required_pause(&net, node, SegmentId(0), Direction::Forward, VehicleId(0), t).unwrap(), 0);
        // North-bound on s2 waits for the second half.
        assert_eq!(arb.required_pause(&net, node, SegmentId(2), Direction::Forward, VehicleId(1), t).unwrap(), 4_000);
    }

    #[test]
    fn uncontrolled_is_free() {
        let net = chain(&[0.0, 100.0, 200.0]).build();
        let node = net.find_intersection(Point::new(100.0, 0.0)).unwrap();
        let arb = IntersectionArbiter::new(&TrafficConfig::default());
        assert_eq!(arb.required_pause(&net, node, SegmentId(0), Direction::Forward, VehicleId(0), SimTime::ZERO).unwrap(), 0);
    }

    #[test]
    fn missing_intersection_is_fatal() {
        let net = chain(&[0.0, 100.0]).build();
        let arb = IntersectionArbiter::new(&TrafficConfig::default());
        let err = arb
            .required_pause(&net, IntersectionId(99), SegmentId(0), Direction::Forward, VehicleId(0), SimTime::ZERO)
            .unwrap_err();
        assert!(matches!(err, MobilityError::IntersectionMissing { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn connectors_are_cached() {
        let net = cross();
        let node = net.find_intersection(Point::new(100.0, 100.0)).unwrap();
        let mut arb = IntersectionArbiter::new(&TrafficConfig::default());
        let from = LaneRef::new(WEST, Direction::Forward, 0);
        // Leave the centre southwards on s3, which is drawn toward the centre.
        let to = LaneRef::new(SegmentId(3), Direction::Backward, 0);
        let a = arb.connector(&net, from, to, node);
        let b = arb.connector(&net, from, to, node);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(arb.cached_connectors(), 1);

        let start = net.lane_point_at(WEST, Direction::Forward, 0, 0.0).0;
        let end = net.lane_point_at(SegmentId(3), Direction::Backward, 0, net.length(SegmentId(3))).0;
        assert!(a.points().first().unwrap().distance(start) < 1e-9);
        assert!(a.points().last().unwrap().distance(end) < 1e-9);
        assert!(a.length() >= start.distance(end));
        // Remaining distance maps back onto the curve.
        assert!(a.point_at(a.length()).0.distance(start) < 1e-9);
        assert!(a.point_at(0.0).0.distance(end) < 1e-9);
    }
}

// ── Route planning ────────────────────────────────────────────────────────────

#[cfg(test)]
mod planning {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use st_core::{SegmentId, VehicleId, VehicleRng};
    use st_spatial::{
        AStarRouter, Direction, Origin, RoadNetwork, Route, RouteStep, Router, SpatialError, SpatialResult,
    };

    use super::helpers::lattice;
    use crate::planner::{connects, postprocess, MIN_PATH_ENTRIES};
    use crate::{LaneManager, LaneRef, MobilityError, OdPlanner, PlanContext, RandomTurnPlanner, RoutePlanner, VehicleState};

    const F: Direction = Direction::Forward;
    const B: Direction = Direction::Backward;

    fn s(i: u32, d: Direction) -> RouteStep {
        RouteStep::new(SegmentId(i), d)
    }

    fn on_s0(remaining: f64) -> VehicleState {
        VehicleState::new(VehicleId(0), LaneRef::new(SegmentId(0), F, 0), remaining, 0.0, 1.0, 500)
    }

    fn route(steps: Vec<RouteStep>) -> Route {
        Route { steps, cost: 0.0 }
    }

    #[test]
    fn drops_duplicates_and_current_segment() {
        let net = lattice();
        let v = on_s0(50.0);
        let r = route(vec![s(0, F), s(0, F), s(8, F), s(3, F), s(11, F)]);
        let entries = postprocess(&net, &v, &r).unwrap();
        let segs: Vec<u32> = entries.iter().map(|e| e.segment.0).collect();
        assert_eq!(segs, vec![8, 3, 11]);
        assert!(entries.iter().all(|e| !e.uturn && !e.origin));
        assert!(connects(&net, &v, &entries[0]));
        assert_eq!(entries[2].point, net.exit_point(SegmentId(11), F));
    }

    #[test]
    fn short_paths_are_rejected() {
        let net = lattice();
        let v = on_s0(50.0);
        let err = postprocess(&net, &v, &route(vec![s(0, F), s(8, F), s(8, F), s(3, F)])).unwrap_err();
        assert!(matches!(err, MobilityError::PathTooShort { entries: 3 }));
        assert!(MIN_PATH_ENTRIES == 4);
    }

    #[test]
    fn reversed_origin_becomes_uturn() {
        let net = lattice();
        let v = on_s0(90.0);
        let entries = postprocess(&net, &v, &route(vec![s(0, B), s(6, F), s(2, F), s(8, B)])).unwrap();
        assert_eq!(entries.len(), 4);
        assert!(entries[0].uturn && entries[0].origin);
        assert_eq!(entries[0].segment, SegmentId(0));
        assert_eq!(entries[0].direction, B);
        assert!(connects(&net, &v, &entries[0]));
    }

    #[test]
    fn unreachable_first_hop_gets_explicit_uturn() {
        let net = lattice();
        let v = on_s0(50.0);
        let entries = postprocess(&net, &v, &route(vec![s(6, F), s(2, F), s(9, F), s(5, B)])).unwrap();
        assert_eq!(entries.len(), 5);
        assert!(entries[0].uturn);
        assert_eq!((entries[0].segment, entries[0].direction), (SegmentId(0), B));
    }

    #[test]
    fn random_turn_picks_connected_free_segment() {
        let net = lattice();
        let lanes = LaneManager::new(&net);
        let ctx = PlanContext { network: &net, lanes: &lanes };
        let mut v = on_s0(3.0);
        let mut rng = VehicleRng::new(7, VehicleId(0));
        let first = RandomTurnPlanner.next_segment(&ctx, &mut v, &mut rng).unwrap();
        assert!([(SegmentId(1), F), (SegmentId(8), F)].contains(&(first.segment, first.direction)));
        assert_eq!(v.pending.len(), 1);
        // The pending pick is kept until it is consumed.
        let again = RandomTurnPlanner.next_segment(&ctx, &mut v, &mut rng).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn random_turn_dead_end_is_none() {
        let net = super::helpers::chain(&[0.0, 100.0]).build();
        let lanes = LaneManager::new(&net);
        let ctx = PlanContext { network: &net, lanes: &lanes };
        let mut v = on_s0(3.0);
        let mut rng = VehicleRng::new(7, VehicleId(0));
        assert_eq!(RandomTurnPlanner.next_segment(&ctx, &mut v, &mut rng), None);
    }

    #[test]
    fn od_plans_to_kept_destination() {
        let net = lattice();
        let lanes = LaneManager::new(&net);
        let ctx = PlanContext { network: &net, lanes: &lanes };
        let planner = OdPlanner::new(AStarRouter::new(), 2_000.0);
        let mut v = on_s0(50.0);
        v.destination = Some(SegmentId(5));
        let mut rng = VehicleRng::new(3, VehicleId(0));

        assert!(planner.on_spawn(&ctx, &mut v, &mut rng));
        assert_eq!(v.destination, Some(SegmentId(5)));
        assert_eq!(v.pending.back().map(|e| e.segment), Some(SegmentId(5)));
        assert!(v.pending.len() >= MIN_PATH_ENTRIES - 1);
        assert!(!planner.destination_reached(&v));

        let next = planner.next_segment(&ctx, &mut v, &mut rng).unwrap();
        assert!(connects(&net, &v, &next));

        v.segment = SegmentId(5);
        v.pending.clear();
        assert!(planner.destination_reached(&v));
    }

    #[test]
    fn od_invalidates_stale_hop() {
        let net = lattice();
        let lanes = LaneManager::new(&net);
        let ctx = PlanContext { network: &net, lanes: &lanes };
        let planner = OdPlanner::new(AStarRouter::new(), 2_000.0);
        let mut v = on_s0(50.0);
        v.destination = Some(SegmentId(11));
        let mut rng = VehicleRng::new(3, VehicleId(0));
        // s5 is nowhere near the exit of s0.
        v.pending.push_back(crate::RouteEntry::new(net.exit_point(SegmentId(5), F), SegmentId(5), F));

        let next = planner.next_segment(&ctx, &mut v, &mut rng).unwrap();
        assert!(connects(&net, &v, &next));
        assert_eq!(v.stats.reroutes, 1);
        assert_eq!(v.destination, Some(SegmentId(11)));
    }

    /// Never finds a path; counts how often it is asked.
    #[derive(Default)]
    struct NoPathRouter {
        calls: AtomicUsize,
    }

    impl Router for NoPathRouter {
        fn route(&self, _: &RoadNetwork, origin: Origin, destination: SegmentId) -> SpatialResult<Route> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Err(SpatialError::NoRoute { from: origin.segment, to: destination })
        }
    }

    #[test]
    fn od_fallback_hop_is_kept_until_consumed() {
        let net = lattice();
        let lanes = LaneManager::new(&net);
        let ctx = PlanContext { network: &net, lanes: &lanes };
        let planner = OdPlanner::new(NoPathRouter::default(), 2_000.0);
        let mut v = on_s0(3.0);
        let mut rng = VehicleRng::new(11, VehicleId(0));

        let first = planner.next_segment(&ctx, &mut v, &mut rng).unwrap();
        let searches = planner.router().calls.load(Ordering::Relaxed);
        assert!(searches > 0);
        assert!(connects(&net, &v, &first));
        assert_eq!(v.pending.front(), Some(&first));

        // Later lookaheads on the same approach reuse the random hop.
        for _ in 0..5 {
            assert_eq!(planner.next_segment(&ctx, &mut v, &mut rng), Some(first));
        }
        assert_eq!(planner.router().calls.load(Ordering::Relaxed), searches);
        assert_eq!(v.destination, None);
    }
}

// ── Colour hints ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod color {
    use st_core::{ColorMode, VehicleId};

    use crate::ColorHint;

    #[test]
    fn by_speed_runs_red_to_green() {
        let stopped = ColorHint::for_vehicle(ColorMode::BySpeed, VehicleId(0), 0.0, 10.0);
        let full = ColorHint::for_vehicle(ColorMode::BySpeed, VehicleId(0), 10.0, 10.0);
        assert_eq!(stopped, ColorHint { r: 255, g: 0, b: 0 });
        assert_eq!(full, ColorHint { r: 0, g: 255, b: 0 });
    }

    #[test]
    fn by_vehicle_is_stable_and_varied() {
        let a = ColorHint::for_vehicle(ColorMode::ByVehicle, VehicleId(1), 0.0, 10.0);
        let b = ColorHint::for_vehicle(ColorMode::ByVehicle, VehicleId(1), 9.0, 10.0);
        let c = ColorHint::for_vehicle(ColorMode::ByVehicle, VehicleId(2), 0.0, 10.0);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(ColorHint::for_vehicle(ColorMode::Uniform, VehicleId(3), 4.0, 10.0), ColorHint::UNIFORM);
    }
}

// ── Engine scenarios ──────────────────────────────────────────────────────────

#[cfg(test)]
mod engine {
    use std::sync::Arc;

    use st_core::{MobilityMode, Point, SegmentId, SimTime, StreetId, TrafficConfig, VehicleId};
    use st_spatial::{AStarRouter, Direction, Origin, RoadNetwork, Router, SegmentSpec, TrafficControl};

    use super::helpers::{chain, config, engine, lattice};
    use crate::state::Arbitration;
    use crate::{MobilityError, RouteEntry, TrafficEngine, VehicleStatus};

    const F: Direction = Direction::Forward;

    /// Step every active vehicle once per round at `round · step_ms`.
    fn run(engine: &mut TrafficEngine, rounds: usize, mut check: impl FnMut(&TrafficEngine)) {
        let step = engine.config().step_duration_ms;
        let ids: Vec<VehicleId> = engine.store().active_ids().collect();
        let mut done = vec![false; ids.len()];
        for round in 0..rounds {
            let now = SimTime::from_millis(round as u64 * step);
            for (i, &id) in ids.iter().enumerate() {
                if done[i] {
                    continue;
                }
                let out = engine.step(id, now).unwrap();
                done[i] = out.status == VehicleStatus::Finished;
                check(engine);
            }
        }
    }

    /// Remaining distance stays on the segment, the cached position sits on
    /// the lane centre, and every queue is ordered and within capacity.
    fn check_invariants(engine: &TrafficEngine) {
        let net = engine.network();
        for v in engine.store().states.iter().filter(|v| v.active) {
            let length = net.length(v.segment);
            assert!(v.remaining >= 0.0 && v.remaining <= length + 1e-9, "{} remaining {}", v.id, v.remaining);
            if v.connector.is_none() {
                let centre = net.point_at(v.segment, v.direction, v.remaining).0;
                let offset = net.segment(v.segment).lane_offset(v.lane).abs();
                assert!((v.position.distance(centre) - offset).abs() < 1e-6);
            } else {
                assert!(v.connector.as_ref().unwrap().remaining >= 0.0);
            }
        }
        for lane in engine.lanes().all_lanes() {
            assert!(engine.lanes().len(lane) <= engine.lanes().capacity(lane));
        }
        assert!(engine.lanes_ordered());
    }

    #[test]
    fn stop_sign_holds_then_clears() {
        let mut b = chain(&[0.0, 100.0, 200.0]);
        b.set_control(Point::new(100.0, 0.0), TrafficControl::Stop);
        let cfg = TrafficConfig { initial_speed_fraction: 0.5, ..config() };
        let mut engine = engine(b.build(), cfg);
        let node = engine.network().find_intersection(Point::new(100.0, 0.0)).unwrap();
        let id = engine.spawn_at(SegmentId(0), F).unwrap().vehicle;

        let mut now = SimTime::ZERO;
        let mut waited_at = None;
        let mut entered_at = None;
        for _ in 0..200 {
            let out = engine.step(id, now).unwrap();
            let v = engine.vehicle(id).unwrap();
            if out.status == VehicleStatus::Waiting {
                assert_eq!(out.speed, 0.0);
                assert_eq!(v.wait_steps, 1);
                assert_eq!(v.segment, SegmentId(0));
                assert!(v.remaining <= engine.network().tolerance());
                assert_eq!(engine.arbiter().waiting(node).len(), 1);
                waited_at.get_or_insert(now);
            }
            if v.segment == SegmentId(1) {
                assert_eq!(v.wait_steps, 0);
                assert!(engine.arbiter().waiting(node).is_empty());
                assert_eq!(v.stats.segments_entered, 1);
                entered_at = Some(now);
                break;
            }
            now = now + out.delay_ms;
        }
        let waited_at = waited_at.expect("vehicle never stopped");
        let entered_at = entered_at.expect("vehicle never entered the next segment");
        assert!(entered_at - waited_at >= engine.config().stop_pause_ms);
    }

    #[test]
    fn signal_turning_red_holds_a_cleared_vehicle() {
        let mut b = chain(&[0.0, 100.0, 200.0]);
        b.set_control(Point::new(100.0, 0.0), TrafficControl::Signal { cycle_ms: 10_000, offset_ms: 0 });
        let mut engine = engine(b.build(), config());
        let node = engine.network().find_intersection(Point::new(100.0, 0.0)).unwrap();
        let id = engine.spawn_at(SegmentId(0), F).unwrap().vehicle;
        let target = engine.network().exit_point(SegmentId(1), F);
        {
            // Cleared on green further back, now at the line.
            let v = engine.store.get_mut(id).unwrap();
            v.pending.push_back(RouteEntry::new(target, SegmentId(1), F));
            v.arbitration = Arbitration::Cleared;
            v.remaining = 1.0;
        }

        // East-west is red for the second half of the cycle.
        let out = engine.step(id, SimTime::from_millis(6_000)).unwrap();
        assert_eq!(out.status, VehicleStatus::Waiting);
        let v = engine.vehicle(id).unwrap();
        assert_eq!(v.segment, SegmentId(0));
        assert_eq!(v.arbitration, Arbitration::Waiting { until: SimTime::from_millis(10_000) });
        assert_eq!(engine.arbiter().waiting(node).len(), 1);

        let out = engine.step(id, SimTime::from_millis(10_000)).unwrap();
        assert_ne!(out.status, VehicleStatus::Waiting);
        assert_eq!(engine.vehicle(id).unwrap().segment, SegmentId(1));
        assert!(engine.arbiter().waiting(node).is_empty());
    }

    #[test]
    fn route_cost_matches_distance_driven() {
        // 0 ── 1 ── 2 plus a spur north from node 0.  Heading east near
        // node 1, the only way to the spur is to turn around at node 1.
        let mut b = chain(&[0.0, 100.0, 200.0]);
        let spur = b.add_segment(SegmentSpec::new(Point::ZERO, Point::new(0.0, 100.0)).street(StreetId(0))).unwrap();
        let mut engine = engine(b.build(), config());
        let spawned = engine.spawn_at(SegmentId(0), F).unwrap();
        let id = spawned.vehicle;

        let origin = Origin { segment: SegmentId(0), direction: F, remaining: spawned.remaining };
        let route = AStarRouter::new().route(engine.network(), origin, spur).unwrap();
        assert!(route.starts_with_reversal(&origin));
        {
            let net = Arc::clone(engine.network());
            let v = engine.store.get_mut(id).unwrap();
            for (i, step) in route.steps.iter().enumerate() {
                let point = net.exit_point(step.segment, step.direction);
                v.pending.push_back(if i == 0 {
                    RouteEntry::uturn(point, step.segment, step.direction)
                } else {
                    RouteEntry::new(point, step.segment, step.direction)
                });
            }
        }

        let mut now = SimTime::ZERO;
        let mut driven = None;
        for _ in 0..400 {
            let out = engine.step(id, now).unwrap();
            now = now + out.delay_ms;
            let v = engine.vehicle(id).unwrap();
            if v.segment == spur && v.connector.is_none() {
                driven = Some(v.stats.distance + v.remaining);
                break;
            }
        }
        let driven = driven.expect("vehicle never reached the spur");
        assert_eq!(engine.vehicle(id).unwrap().stats.uturns, 1);
        // Lane offsets and the turn connector account for the difference.
        assert!((driven - route.cost).abs() < 10.0, "driven {driven:.1} m, route cost {:.1} m", route.cost);
    }

    #[test]
    fn full_lane_rejects_spawn() {
        // 10 m holds a single vehicle.
        let mut engine = engine(chain(&[0.0, 10.0]).build(), config());
        let first = engine.spawn_at(SegmentId(0), F).unwrap();
        assert_eq!(first.remaining, 7.0);
        let err = engine.spawn_at(SegmentId(0), F).unwrap_err();
        assert!(matches!(err, MobilityError::SpawnFailed { attempts: 1 }));
        // The other direction is still open.
        assert!(engine.spawn_at(SegmentId(0), Direction::Backward).is_ok());
        assert_eq!(engine.lanes().total_vehicles(), 2);
    }

    #[test]
    fn spawn_behind_tail_with_spacing() {
        let mut engine = engine(chain(&[0.0, 100.0]).build(), config());
        let a = engine.spawn_at(SegmentId(0), F).unwrap();
        let b = engine.spawn_at(SegmentId(0), F).unwrap();
        assert_eq!(a.remaining, 7.0);
        assert_eq!(b.remaining, 14.0);
        let (p, _) = engine.network().lane_point_at(SegmentId(0), F, 0, 14.0);
        assert!(b.position.distance(p) < 1e-9);
    }

    #[test]
    fn unnamed_segments_are_not_spawned_on() {
        let mut b = st_spatial::RoadNetworkBuilder::new();
        b.add_segment(SegmentSpec::new(Point::ZERO, Point::new(100.0, 0.0))).unwrap();
        let mut engine = engine(b.build(), config());
        assert!(matches!(engine.spawn_at(SegmentId(0), F), Err(MobilityError::SpawnFailed { .. })));
        assert!(matches!(engine.spawn(), Err(MobilityError::SpawnFailed { attempts: 50 })));
    }

    #[test]
    fn empty_network_spawn_fails() {
        let mut engine = engine(RoadNetwork::empty(), config());
        assert!(matches!(engine.spawn(), Err(MobilityError::SpawnFailed { .. })));
    }

    #[test]
    fn dead_end_uturn() {
        let mut engine = engine(chain(&[0.0, 100.0]).build(), config());
        let id = engine.spawn_at(SegmentId(0), F).unwrap().vehicle;
        let mut now = SimTime::ZERO;
        for _ in 0..100 {
            let out = engine.step(id, now).unwrap();
            now = now + out.delay_ms;
            if engine.vehicle(id).unwrap().direction == Direction::Backward {
                break;
            }
        }
        let v = engine.vehicle(id).unwrap();
        assert_eq!(v.direction, Direction::Backward);
        assert_eq!(v.segment, SegmentId(0));
        assert_eq!(v.stats.uturns, 1);
        assert_eq!(v.speed, 0.0);
        assert!(v.remaining >= 100.0 - engine.network().tolerance());
        assert_eq!(engine.lanes().len(v.lane_ref()), 1);
        assert_eq!(engine.lanes().total_vehicles(), 1);
    }

    #[test]
    fn one_way_dead_end_leaves_network() {
        let mut b = st_spatial::RoadNetworkBuilder::new();
        b.add_street(StreetId(0), st_spatial::StreetName::new("Spur"));
        b.add_segment(SegmentSpec::new(Point::ZERO, Point::new(60.0, 0.0)).street(StreetId(0)).one_way()).unwrap();
        let mut engine = engine(b.build(), config());
        let id = engine.spawn_at(SegmentId(0), F).unwrap().vehicle;
        let mut finished = false;
        let mut now = SimTime::ZERO;
        for _ in 0..100 {
            let out = engine.step(id, now).unwrap();
            now = now + out.delay_ms;
            if out.status == VehicleStatus::Finished {
                finished = true;
                break;
            }
        }
        assert!(finished);
        assert!(matches!(engine.vehicle(id), Err(MobilityError::VehicleInactive(_))));
        assert!(matches!(engine.step(id, now), Err(MobilityError::VehicleInactive(_))));
        assert_eq!(engine.lanes().total_vehicles(), 0);
        assert_eq!(engine.active_count(), 0);
    }

    #[test]
    fn blocked_exit_forces_uturn() {
        // s1 is 10 m long and holds one parked vehicle.
        let cfg = TrafficConfig { wait_threshold: 2, ..config() };
        let mut engine = engine(chain(&[0.0, 100.0, 110.0]).build(), cfg);
        let parked = engine.spawn_at(SegmentId(1), F).unwrap().vehicle;
        let id = engine.spawn_at(SegmentId(0), F).unwrap().vehicle;
        let target = engine.network().exit_point(SegmentId(1), F);
        engine.store.get_mut(id).unwrap().pending.push_back(RouteEntry::new(target, SegmentId(1), F));

        let mut blocked = 0;
        let mut now = SimTime::ZERO;
        for _ in 0..100 {
            let out = engine.step(id, now).unwrap();
            now = now + out.delay_ms;
            if out.status == VehicleStatus::Blocked {
                blocked += 1;
            }
            if engine.vehicle(id).unwrap().direction == Direction::Backward {
                break;
            }
        }
        let v = engine.vehicle(id).unwrap();
        assert!(blocked >= 3, "blocked {blocked} times");
        assert_eq!(v.direction, Direction::Backward);
        assert_eq!(v.stats.uturns, 1);
        assert_eq!(v.wait_steps, 0);
        assert_eq!(engine.vehicle(parked).unwrap().segment, SegmentId(1));
    }

    #[test]
    fn first_step_is_continuous_with_spawn() {
        let cfg = TrafficConfig { initial_speed_fraction: 0.5, ..config() };
        let mut engine = engine(lattice(), cfg);
        let spawned = engine.spawn_at(SegmentId(0), F).unwrap();
        let out = engine.step(spawned.vehicle, SimTime::ZERO).unwrap();
        let v = engine.vehicle(spawned.vehicle).unwrap();
        assert_eq!(v.segment, SegmentId(0));
        assert!(out.position.distance(spawned.position) <= v.stats.distance + 1e-6);
        assert!((spawned.remaining - v.remaining - v.stats.distance).abs() < 1e-9);
    }

    #[test]
    fn random_turn_keeps_invariants() {
        let mut engine = engine(lattice(), config());
        for _ in 0..12 {
            engine.spawn().unwrap();
        }
        check_invariants(&engine);
        run(&mut engine, 300, check_invariants);
        let entered: u32 = engine.store().states.iter().map(|v| v.stats.segments_entered).sum();
        assert!(entered > 0);
    }

    #[test]
    fn origin_destination_keeps_invariants() {
        let cfg = TrafficConfig { mobility: MobilityMode::OriginDestination, ..config() };
        let mut engine = engine(lattice(), cfg);
        assert_eq!(engine.planner_name(), "origin-destination");
        for _ in 0..6 {
            let s = engine.spawn().unwrap();
            let v = engine.vehicle(s.vehicle).unwrap();
            assert!(v.destination.is_some());
            assert!(!v.pending.is_empty());
        }
        run(&mut engine, 300, check_invariants);
        let entered: u32 = engine.store().states.iter().map(|v| v.stats.segments_entered).sum();
        assert!(entered > 0);
    }

    #[test]
    fn same_seed_same_run() {
        let trace = || {
            let mut engine = engine(lattice(), config());
            for _ in 0..5 {
                engine.spawn().unwrap();
            }
            run(&mut engine, 100, |_| {});
            engine.store().states.iter().map(|v| (v.segment, v.remaining.to_bits())).collect::<Vec<_>>()
        };
        assert_eq!(trace(), trace());
    }

    #[test]
    fn remove_vehicle_frees_lane() {
        let mut engine = engine(chain(&[0.0, 100.0]).build(), config());
        let id = engine.spawn_at(SegmentId(0), F).unwrap().vehicle;
        engine.remove_vehicle(id).unwrap();
        assert_eq!(engine.lanes().total_vehicles(), 0);
        assert!(matches!(engine.remove_vehicle(id), Err(MobilityError::VehicleInactive(_))));
        assert!(engine.store().state(id).is_ok());
    }

    #[test]
    fn unknown_vehicle_is_not_fatal() {
        let mut engine = engine(chain(&[0.0, 100.0]).build(), config());
        let err = engine.step(VehicleId(3), SimTime::ZERO).unwrap_err();
        assert!(matches!(err, MobilityError::VehicleNotFound(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn invalid_config_rejected() {
        let cfg = TrafficConfig { step_duration_ms: 0, ..config() };
        let result = TrafficEngine::new(Arc::new(chain(&[0.0, 100.0]).build()), cfg);
        assert!(matches!(result, Err(MobilityError::Config(_))));
    }
}

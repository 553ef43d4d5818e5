//! Routing trait and default A* implementation.
//!
//! # Pluggability
//!
//! `st-mobility` calls routing via the [`Router`] trait, so applications can
//! swap in custom implementations (contraction hierarchies, congestion-aware
//! costs) without touching the planner.  The default [`AStarRouter`]
//! searches the intersection graph directly.
//!
//! # Cost units
//!
//! Costs are metres driven.  A route starts mid-segment, so its cost counts
//! the part of the origin segment still to drive, every intermediate segment
//! in full, and the whole destination segment.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use st_core::{IntersectionId, Point, SegmentId};

use crate::network::{Direction, RoadNetwork};
use crate::{SpatialError, SpatialResult};

// ── Route ─────────────────────────────────────────────────────────────────────

/// Where a vehicle currently is: `remaining` metres before the exit of
/// `segment` travelled in `direction`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Origin {
    pub segment:   SegmentId,
    pub direction: Direction,
    pub remaining: f64,
}

/// One segment of a route and the direction it is driven in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RouteStep {
    pub segment:   SegmentId,
    pub direction: Direction,
}

impl RouteStep {
    pub fn new(segment: SegmentId, direction: Direction) -> Self {
        Self { segment, direction }
    }
}

/// The result of a routing query.
///
/// `steps[0]` is always the origin segment.  Its direction differs from the
/// origin's when the route begins with a reversal.  The last step is the
/// destination segment.
#[derive(Debug, Clone)]
pub struct Route {
    pub steps: Vec<RouteStep>,
    /// Metres driven from the origin position to the end of the last step.
    pub cost:  f64,
}

impl Route {
    /// `true` if the first step reverses the vehicle on its current segment.
    pub fn starts_with_reversal(&self, origin: &Origin) -> bool {
        self.steps.first().is_some_and(|s| s.segment == origin.segment && s.direction != origin.direction)
    }

    /// Exit point of every step, in order.
    pub fn waypoints(&self, network: &RoadNetwork) -> Vec<Point> {
        self.steps.iter().map(|s| network.exit_point(s.segment, s.direction)).collect()
    }
}

// ── Router trait ──────────────────────────────────────────────────────────────

/// Pluggable routing engine.
///
/// # Thread safety
///
/// Implementations must be `Send + Sync` so one router can be shared by
/// engines running on different threads.
pub trait Router: Send + Sync {
    /// Compute a route from `origin` that ends by driving `destination`.
    ///
    /// Returns [`SpatialError::NoRoute`] when the destination is unreachable
    /// or lies beyond the router's cost bound.  That is a soft failure: the
    /// caller should choose another destination.
    fn route(&self, network: &RoadNetwork, origin: Origin, destination: SegmentId) -> SpatialResult<Route>;
}

// ── AStarRouter ───────────────────────────────────────────────────────────────

/// A* over intersections with segment length as edge cost.
///
/// The heuristic is the straight-line distance to the nearer endpoint of the
/// destination segment.  Segment polylines are never shorter than their
/// chord, so the heuristic is admissible and the returned cost is optimal.
#[derive(Clone, Debug)]
pub struct AStarRouter {
    /// Searches whose cheapest open entry exceeds this many metres give up.
    pub max_cost: f64,
}

impl Default for AStarRouter {
    fn default() -> Self {
        Self { max_cost: f64::INFINITY }
    }
}

impl AStarRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_cost(max_cost: f64) -> Self {
        Self { max_cost }
    }
}

impl Router for AStarRouter {
    fn route(&self, network: &RoadNetwork, origin: Origin, destination: SegmentId) -> SpatialResult<Route> {
        astar(network, origin, destination, self.max_cost)
    }
}

// ── A* internals ──────────────────────────────────────────────────────────────

/// How an intersection was first reached on the best known path.
#[derive(Copy, Clone, Debug)]
enum Via {
    /// Straight from the origin segment.
    Source(RouteStep),
    Edge { from: IntersectionId, step: RouteStep },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Frontier {
    Node(IntersectionId),
    /// The destination segment driven in `direction`, entered from `from`.
    Goal { from: IntersectionId, direction: Direction },
}

type HeapEntry = Reverse<(OrderedFloat<f64>, OrderedFloat<f64>, Frontier)>;

fn astar(network: &RoadNetwork, origin: Origin, destination: SegmentId, max_cost: f64) -> SpatialResult<Route> {
    let seg = network.get_segment(origin.segment)?;
    let dest = network.get_segment(destination)?;
    let remaining = origin.remaining.clamp(0.0, seg.length);

    if destination == origin.segment {
        return Ok(Route { steps: vec![RouteStep::new(destination, origin.direction)], cost: remaining });
    }

    let targets = [dest.start(), dest.end()];
    let h = |node: IntersectionId| {
        let p = network.intersection(node).point;
        targets.iter().map(|t| p.distance(*t)).fold(f64::INFINITY, f64::min)
    };

    let n = network.intersection_count();
    let mut best = vec![f64::INFINITY; n];
    let mut came: Vec<Option<Via>> = vec![None; n];
    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();

    let mut seed = |node: IntersectionId, cost: f64, step: RouteStep, heap: &mut BinaryHeap<HeapEntry>| {
        if cost < best[node.index()] {
            best[node.index()] = cost;
            came[node.index()] = Some(Via::Source(step));
            heap.push(Reverse((OrderedFloat(cost + h(node)), OrderedFloat(cost), Frontier::Node(node))));
        }
    };
    seed(seg.exit_node(origin.direction), remaining, RouteStep::new(origin.segment, origin.direction), &mut heap);
    // Vehicles only turn around at the exit, so a reversal drives the rest
    // of the segment and then all of it back.
    let back = origin.direction.reverse();
    if seg.can_travel(back) {
        seed(seg.exit_node(back), remaining + seg.length, RouteStep::new(origin.segment, back), &mut heap);
    }

    while let Some(Reverse((OrderedFloat(f), OrderedFloat(g), frontier))) = heap.pop() {
        if f > max_cost {
            break;
        }
        let node = match frontier {
            Frontier::Goal { from, direction } => {
                return Ok(reconstruct(&came, from, RouteStep::new(destination, direction), g));
            }
            Frontier::Node(node) => node,
        };
        // Skip stale heap entries.
        if g > best[node.index()] {
            continue;
        }

        for (s, dir) in network.outgoing(node) {
            let next = network.segment(s);
            let cost = g + next.length;
            if s == destination {
                heap.push(Reverse((OrderedFloat(cost), OrderedFloat(cost), Frontier::Goal { from: node, direction: dir })));
                continue;
            }
            let v = next.exit_node(dir);
            if cost < best[v.index()] {
                best[v.index()] = cost;
                came[v.index()] = Some(Via::Edge { from: node, step: RouteStep::new(s, dir) });
                heap.push(Reverse((OrderedFloat(cost + h(v)), OrderedFloat(cost), Frontier::Node(v))));
            }
        }
    }

    Err(SpatialError::NoRoute { from: origin.segment, to: destination })
}

fn reconstruct(came: &[Option<Via>], last_node: IntersectionId, goal: RouteStep, cost: f64) -> Route {
    let mut steps = vec![goal];
    let mut cur = last_node;
    // Every settled node has a `came` entry, ending in a `Source`.
    while let Some(via) = came[cur.index()] {
        match via {
            Via::Source(step) => {
                steps.push(step);
                break;
            }
            Via::Edge { from, step } => {
                steps.push(step);
                cur = from;
            }
        }
    }
    steps.reverse();
    Route { steps, cost }
}

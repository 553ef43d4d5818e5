//! Road network representation and builder.
//!
//! # Model
//!
//! A [`RoadSegment`] is a polyline between two endpoints (plus optional
//! interior shape points).  Endpoints closer than the resolution tolerance
//! are merged by the [`IntersectionGrid`] into a shared [`Intersection`];
//! connectivity is derived entirely from that merge.
//!
//! Vehicles travel a segment in a [`Direction`].  `Forward` runs from
//! `start` to `end`, so its *exit* is `end_node`; `Backward` is the reverse.
//! A one-way segment only permits `Forward`.
//!
//! # Spatial indexes
//!
//! - the grid answers tolerance-bounded "which intersection is here?" queries
//!   and performs the merge at build time;
//! - an R-tree (via `rstar`) answers unbounded nearest-intersection queries.

use log::{debug, warn};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use rustc_hash::FxHashMap;

use st_core::geo::{polyline_length, polyline_point_at};
use st_core::{IntersectionId, Point, Projection, Rect, SegmentId, ShapeId, StreetId, TrafficConfig};

use crate::grid::IntersectionGrid;
use crate::{SpatialError, SpatialResult};

/// Bumper-to-bumper length reserved for one vehicle.
pub const VEHICLE_LENGTH_M: f64 = 5.0;
/// Minimum standstill gap between consecutive vehicles.
pub const MIN_GAP_M: f64 = 2.0;
/// Lateral distance between adjacent lane centres.
pub const LANE_WIDTH_M: f64 = 3.5;

// ── Enumerations ──────────────────────────────────────────────────────────────

/// Travel direction along a segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// start → end
    Forward,
    /// end → start
    Backward,
}

impl Direction {
    #[inline]
    pub fn reverse(self) -> Direction {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Direction::Forward => 0,
            Direction::Backward => 1,
        }
    }
}

/// Road classification carried by the one-byte class code of a segment record.
///
/// | Code | Class       | Lanes/dir | Limit (m/s) | Drivable |
/// |------|-------------|-----------|-------------|----------|
/// | 1    | `Highway`   | 2         | 29.0        | yes      |
/// | 2    | `Primary`   | 2         | 24.6        | yes      |
/// | 3    | `Secondary` | 1         | 20.1        | yes      |
/// | 4    | `Local`     | 1         | 11.2        | yes      |
/// | 5    | `Trail`     | -         | -           | no       |
/// | 6    | `Ramp`      | 1         | 15.6        | yes      |
/// | 7    | `Other`     | -         | -           | no       |
///
/// Any other code is unknown and the record is excluded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RoadClass {
    Highway,
    Primary,
    Secondary,
    Local,
    Trail,
    Ramp,
    Other,
}

impl RoadClass {
    pub fn from_code(code: u8) -> Option<RoadClass> {
        Some(match code {
            1 => RoadClass::Highway,
            2 => RoadClass::Primary,
            3 => RoadClass::Secondary,
            4 => RoadClass::Local,
            5 => RoadClass::Trail,
            6 => RoadClass::Ramp,
            7 => RoadClass::Other,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            RoadClass::Highway => 1,
            RoadClass::Primary => 2,
            RoadClass::Secondary => 3,
            RoadClass::Local => 4,
            RoadClass::Trail => 5,
            RoadClass::Ramp => 6,
            RoadClass::Other => 7,
        }
    }

    pub fn is_drivable(self) -> bool {
        !matches!(self, RoadClass::Trail | RoadClass::Other)
    }

    /// Major roads get signals instead of stop signs at junctions.
    pub fn is_major(self) -> bool {
        matches!(self, RoadClass::Highway | RoadClass::Primary)
    }

    pub fn default_lanes(self) -> u8 {
        match self {
            RoadClass::Highway | RoadClass::Primary => 2,
            _ => 1,
        }
    }

    pub fn default_speed_limit(self) -> f64 {
        match self {
            RoadClass::Highway => 29.0,
            RoadClass::Primary => 24.6,
            RoadClass::Secondary => 20.1,
            RoadClass::Local => 11.2,
            RoadClass::Ramp => 15.6,
            RoadClass::Trail | RoadClass::Other => 4.5,
        }
    }
}

/// Traffic control at an intersection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrafficControl {
    None,
    /// Every approach must stop and pause before entering.
    Stop,
    /// Two-phase signal: east–west approaches are green for the first half
    /// of the cycle, north–south approaches for the second half.
    Signal { cycle_ms: u64, offset_ms: u64 },
}

// ── Entities ──────────────────────────────────────────────────────────────────

/// Street name assembled from the four fixed-width fields of a street record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreetName {
    pub prefix: String,
    pub name:   String,
    pub suffix: String,
    /// Street type ("St", "Av", …).
    pub kind:   String,
}

impl StreetName {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
    }
}

impl std::fmt::Display for StreetName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = [&self.prefix, &self.name, &self.kind, &self.suffix];
        let mut first = true;
        for p in parts.iter().filter(|p| !p.is_empty()) {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(p)?;
            first = false;
        }
        Ok(())
    }
}

/// A drivable road segment.
#[derive(Clone, Debug)]
pub struct RoadSegment {
    pub id:          SegmentId,
    pub street:      Option<StreetId>,
    pub shape:       Option<ShapeId>,
    pub class:       RoadClass,
    /// Lanes in each permitted direction.
    pub lanes:       u8,
    pub one_way:     bool,
    /// m/s
    pub speed_limit: f64,
    /// Polyline length in metres, shape points included.
    pub length:      f64,
    pub start_node:  IntersectionId,
    pub end_node:    IntersectionId,
    /// `start`, interior shape points, `end`.
    polyline:        Vec<Point>,
}

impl RoadSegment {
    #[inline]
    pub fn start(&self) -> Point {
        self.polyline[0]
    }

    #[inline]
    pub fn end(&self) -> Point {
        self.polyline[self.polyline.len() - 1]
    }

    #[inline]
    pub fn polyline(&self) -> &[Point] {
        &self.polyline
    }

    #[inline]
    pub fn can_travel(&self, dir: Direction) -> bool {
        !self.one_way || dir == Direction::Forward
    }

    #[inline]
    pub fn exit_node(&self, dir: Direction) -> IntersectionId {
        match dir {
            Direction::Forward => self.end_node,
            Direction::Backward => self.start_node,
        }
    }

    #[inline]
    pub fn entry_node(&self, dir: Direction) -> IntersectionId {
        self.exit_node(dir.reverse())
    }

    #[inline]
    pub fn exit_point(&self, dir: Direction) -> Point {
        match dir {
            Direction::Forward => self.end(),
            Direction::Backward => self.start(),
        }
    }

    #[inline]
    pub fn entry_point(&self, dir: Direction) -> Point {
        self.exit_point(dir.reverse())
    }

    /// Direction that leaves `node` along this segment, if `node` is one of
    /// its endpoints.
    #[inline]
    pub fn direction_from(&self, node: IntersectionId) -> Option<Direction> {
        if node == self.start_node {
            Some(Direction::Forward)
        } else if node == self.end_node {
            Some(Direction::Backward)
        } else {
            None
        }
    }

    /// Vehicles one lane can hold end to end.
    #[inline]
    pub fn lane_capacity(&self) -> u32 {
        ((self.length / (VEHICLE_LENGTH_M + MIN_GAP_M)).floor() as u32).max(1)
    }

    /// Signed lateral offset of a lane centre, positive to the right of travel.
    ///
    /// Two-way segments keep their lanes right of the centreline; one-way
    /// segments centre their lane group on it.
    pub fn lane_offset(&self, lane: u8) -> f64 {
        let idx = lane as f64 + 0.5;
        if self.one_way {
            (idx - self.lanes as f64 / 2.0) * LANE_WIDTH_M
        } else {
            idx * LANE_WIDTH_M
        }
    }

    /// Centreline point at `remaining` metres before the exit when travelling
    /// in `dir`, plus the unit travel heading there.
    pub fn point_at(&self, dir: Direction, remaining: f64) -> (Point, Point) {
        let remaining = remaining.clamp(0.0, self.length);
        match dir {
            Direction::Forward => polyline_point_at(&self.polyline, self.length - remaining),
            Direction::Backward => {
                let (p, h) = polyline_point_at(&self.polyline, remaining);
                (p, h * -1.0)
            }
        }
    }
}

/// A merged segment endpoint.
#[derive(Clone, Debug)]
pub struct Intersection {
    pub id:       IntersectionId,
    pub point:    Point,
    /// Incident segments in insertion order.
    pub segments: Vec<SegmentId>,
    pub control:  TrafficControl,
}

impl Intersection {
    /// Number of incident segments.  A degree of 1 is a dead end.
    #[inline]
    pub fn degree(&self) -> usize {
        self.segments.len()
    }
}

// ── R-tree entry ──────────────────────────────────────────────────────────────

#[derive(Clone)]
struct IntersectionEntry {
    point: [f64; 2],
    id:    IntersectionId,
}

impl RTreeObject for IntersectionEntry {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for IntersectionEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

// ── RoadNetwork ───────────────────────────────────────────────────────────────

/// Immutable road network.  Do not construct directly; use
/// [`RoadNetworkBuilder`] or [`crate::load_map`].
pub struct RoadNetwork {
    /// Indexed by `SegmentId`.
    pub segments:      Vec<RoadSegment>,
    /// Indexed by `IntersectionId`.
    pub intersections: Vec<Intersection>,
    /// Only the street records referenced by kept segments.
    pub streets:       FxHashMap<StreetId, StreetName>,
    /// Interior points of the shapes referenced by kept segments.
    pub shapes:        FxHashMap<ShapeId, Vec<Point>>,
    bounds:            Rect,
    tolerance:         f64,
    projection:        Option<Projection>,
    grid:              IntersectionGrid,
    spatial_idx:       RTree<IntersectionEntry>,
}

impl RoadNetwork {
    /// A network with no segments.  Spawning on it always fails.
    pub fn empty() -> Self {
        RoadNetworkBuilder::new().build()
    }

    // ── Dimensions ────────────────────────────────────────────────────────

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn intersection_count(&self) -> usize {
        self.intersections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Planar extent of all geometry; the loader anchors its min corner at
    /// the origin.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Resolution tolerance in metres.
    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Geographic projection, present when loaded from map files.
    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn grid(&self) -> &IntersectionGrid {
        &self.grid
    }

    // ── Entity access ─────────────────────────────────────────────────────

    #[inline]
    pub fn segment(&self, id: SegmentId) -> &RoadSegment {
        &self.segments[id.index()]
    }

    #[inline]
    pub fn get_segment(&self, id: SegmentId) -> SpatialResult<&RoadSegment> {
        self.segments.get(id.index()).ok_or(SpatialError::SegmentNotFound(id))
    }

    #[inline]
    pub fn intersection(&self, id: IntersectionId) -> &Intersection {
        &self.intersections[id.index()]
    }

    pub fn street_name(&self, segment: SegmentId) -> Option<&StreetName> {
        self.segment(segment).street.and_then(|s| self.streets.get(&s))
    }

    /// `true` if the segment carries a non-empty street name.
    pub fn is_named(&self, segment: SegmentId) -> bool {
        self.street_name(segment).is_some_and(|n| !n.is_empty())
    }

    // ── Geometry queries ──────────────────────────────────────────────────

    #[inline]
    pub fn length(&self, segment: SegmentId) -> f64 {
        self.segment(segment).length
    }

    #[inline]
    pub fn speed_limit(&self, segment: SegmentId) -> f64 {
        self.segment(segment).speed_limit
    }

    #[inline]
    pub fn lanes(&self, segment: SegmentId) -> u8 {
        self.segment(segment).lanes
    }

    #[inline]
    pub fn exit_node(&self, segment: SegmentId, dir: Direction) -> IntersectionId {
        self.segment(segment).exit_node(dir)
    }

    #[inline]
    pub fn entry_node(&self, segment: SegmentId, dir: Direction) -> IntersectionId {
        self.segment(segment).entry_node(dir)
    }

    #[inline]
    pub fn exit_point(&self, segment: SegmentId, dir: Direction) -> Point {
        self.segment(segment).exit_point(dir)
    }

    /// See [`RoadSegment::point_at`].
    #[inline]
    pub fn point_at(&self, segment: SegmentId, dir: Direction, remaining: f64) -> (Point, Point) {
        self.segment(segment).point_at(dir, remaining)
    }

    /// Lane-centre point `remaining` metres before the exit.
    pub fn lane_point_at(&self, segment: SegmentId, dir: Direction, lane: u8, remaining: f64) -> (Point, Point) {
        let seg = self.segment(segment);
        let (p, heading) = seg.point_at(dir, remaining);
        (p + heading.right_normal() * seg.lane_offset(lane), heading)
    }

    /// Point halfway along the segment.
    pub fn midpoint(&self, segment: SegmentId) -> Point {
        let seg = self.segment(segment);
        seg.point_at(Direction::Forward, seg.length * 0.5).0
    }

    /// Travel heading on arrival at the exit.
    pub fn approach_heading(&self, segment: SegmentId, dir: Direction) -> Point {
        self.point_at(segment, dir, 0.0).1
    }

    /// Segments a vehicle may take when leaving `node`, with the direction
    /// of travel.  One-way restrictions are applied.
    pub fn outgoing(&self, node: IntersectionId) -> impl Iterator<Item = (SegmentId, Direction)> + '_ {
        self.intersection(node).segments.iter().filter_map(move |&s| {
            let seg = self.segment(s);
            let dir = seg.direction_from(node)?;
            seg.can_travel(dir).then_some((s, dir))
        })
    }

    // ── Spatial queries ───────────────────────────────────────────────────

    /// Intersection within the resolution tolerance of `p`, if any.
    pub fn find_intersection(&self, p: Point) -> Option<IntersectionId> {
        self.grid.find(p)
    }

    /// Nearest intersection regardless of distance.  `None` only when empty.
    pub fn nearest_intersection(&self, p: Point) -> Option<IntersectionId> {
        self.spatial_idx.nearest_neighbor(&[p.x, p.y]).map(|e| e.id)
    }
}

// ── RoadNetworkBuilder ────────────────────────────────────────────────────────

/// Description of one segment handed to [`RoadNetworkBuilder::add_segment`].
#[derive(Clone, Debug)]
pub struct SegmentSpec {
    pub start:       Point,
    pub end:         Point,
    pub shape:       Option<ShapeId>,
    pub street:      Option<StreetId>,
    pub class:       RoadClass,
    pub one_way:     bool,
    /// Overrides the class default.
    pub lanes:       Option<u8>,
    /// Overrides the class default.
    pub speed_limit: Option<f64>,
}

impl SegmentSpec {
    pub fn new(start: Point, end: Point) -> Self {
        Self {
            start,
            end,
            shape: None,
            street: None,
            class: RoadClass::Local,
            one_way: false,
            lanes: None,
            speed_limit: None,
        }
    }

    pub fn class(mut self, class: RoadClass) -> Self {
        self.class = class;
        self
    }

    pub fn street(mut self, street: StreetId) -> Self {
        self.street = Some(street);
        self
    }

    pub fn shape(mut self, shape: ShapeId) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn one_way(mut self) -> Self {
        self.one_way = true;
        self
    }

    pub fn lanes(mut self, lanes: u8) -> Self {
        self.lanes = Some(lanes.max(1));
        self
    }

    pub fn speed_limit(mut self, mps: f64) -> Self {
        self.speed_limit = Some(mps);
        self
    }
}

struct PendingSegment {
    spec:     SegmentSpec,
    polyline: Vec<Point>,
    length:   f64,
}

/// Construct a [`RoadNetwork`] incrementally, then call [`build`](Self::build).
///
/// # Example
///
/// ```
/// use st_core::{Point, StreetId};
/// use st_spatial::{RoadNetworkBuilder, SegmentSpec, StreetName};
///
/// let mut b = RoadNetworkBuilder::new();
/// b.add_street(StreetId(0), StreetName::new("Main"));
/// b.add_segment(SegmentSpec::new(Point::new(0.0, 0.0), Point::new(100.0, 0.0)).street(StreetId(0))).unwrap();
/// b.add_segment(SegmentSpec::new(Point::new(100.5, 0.0), Point::new(100.0, 80.0))).unwrap();
/// let net = b.build();
/// assert_eq!(net.segment_count(), 2);
/// assert_eq!(net.intersection_count(), 3); // (100, 0) and (100.5, 0) merged
/// ```
pub struct RoadNetworkBuilder {
    tolerance:       f64,
    grid_degree:     Option<u32>,
    signal_cycle_ms: u64,
    projection:      Option<Projection>,
    streets:         FxHashMap<StreetId, StreetName>,
    shapes:          FxHashMap<ShapeId, Vec<Point>>,
    pending:         Vec<PendingSegment>,
    controls:        Vec<(Point, TrafficControl)>,
}

impl RoadNetworkBuilder {
    pub fn new() -> Self {
        Self::from_config(&TrafficConfig::default())
    }

    /// Take tolerance, grid degree and signal cycle from `config`.
    pub fn from_config(config: &TrafficConfig) -> Self {
        Self {
            tolerance:       config.intersection_tolerance_m,
            grid_degree:     config.grid_degree,
            signal_cycle_ms: config.signal_cycle_ms,
            projection:      None,
            streets:         FxHashMap::default(),
            shapes:          FxHashMap::default(),
            pending:         Vec::new(),
            controls:        Vec::new(),
        }
    }

    pub fn tolerance(mut self, metres: f64) -> Self {
        self.tolerance = metres;
        self
    }

    pub fn grid_degree(mut self, degree: u32) -> Self {
        self.grid_degree = Some(degree);
        self
    }

    pub fn signal_cycle_ms(mut self, ms: u64) -> Self {
        self.signal_cycle_ms = ms.max(2);
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn add_street(&mut self, id: StreetId, name: StreetName) {
        self.streets.insert(id, name);
    }

    /// Register the interior points of a shape.
    pub fn add_shape(&mut self, id: ShapeId, points: Vec<Point>) {
        self.shapes.insert(id, points);
    }

    /// Queue a segment; the returned id is final.
    ///
    /// Shape points are oriented so they run from `start` to `end`.  A
    /// segment whose endpoints lie within the tolerance of each other is
    /// rejected with [`SpatialError::DegenerateSegment`].
    pub fn add_segment(&mut self, spec: SegmentSpec) -> SpatialResult<SegmentId> {
        if spec.start.distance(spec.end) <= self.tolerance {
            return Err(SpatialError::DegenerateSegment { start: spec.start, end: spec.end });
        }

        let mut polyline = vec![spec.start];
        if let Some(interior) = spec.shape.and_then(|s| self.shapes.get(&s)) {
            let reversed = interior.first().zip(interior.last()).is_some_and(|(first, last)| {
                first.distance(spec.start) + last.distance(spec.end)
                    > first.distance(spec.end) + last.distance(spec.start)
            });
            if reversed {
                polyline.extend(interior.iter().rev().copied());
            } else {
                polyline.extend(interior.iter().copied());
            }
        }
        polyline.push(spec.end);
        let length = polyline_length(&polyline);

        let id = SegmentId::try_from(self.pending.len())
            .map_err(|_| SpatialError::Corrupt { file: "segment", detail: "too many segments".into() })?;
        self.pending.push(PendingSegment { spec, polyline, length });
        Ok(id)
    }

    /// Force the control of the intersection at `point` (matched within the
    /// tolerance at build time).
    pub fn set_control(&mut self, point: Point, control: TrafficControl) {
        self.controls.push((point, control));
    }

    pub fn segment_count(&self) -> usize {
        self.pending.len()
    }

    /// Merge endpoints, assign controls, and index everything.
    ///
    /// Time complexity: O(S · k) for the merge, where k is the number of
    /// entries in the grid cells around each endpoint, plus O(N log N) for
    /// the R-tree bulk load.
    pub fn build(self) -> RoadNetwork {
        let bounds = Rect::bounding(self.pending.iter().flat_map(|p| p.polyline.iter().copied()))
            .unwrap_or(Rect::new(Point::ZERO, Point::ZERO));
        let grid_bounds = Rect::new(
            Point::new(bounds.min.x - self.tolerance, bounds.min.y - self.tolerance),
            Point::new(bounds.max.x + self.tolerance, bounds.max.y + self.tolerance),
        );
        let mut grid = IntersectionGrid::new(grid_bounds, self.grid_degree, self.tolerance);
        let mut intersections: Vec<Intersection> = Vec::new();

        let mut segments = Vec::with_capacity(self.pending.len());
        for (i, p) in self.pending.into_iter().enumerate() {
            let id = SegmentId(i as u32);
            let (start_node, _) =
                grid.insert_or_merge(p.spec.start, || new_intersection(&mut intersections, p.spec.start));
            let end_node = match grid.find(p.spec.end) {
                Some(n) if n != start_node => n,
                // Both ends snapping to one intersection would make a loop.
                _ => {
                    let n = new_intersection(&mut intersections, p.spec.end);
                    grid.insert(p.spec.end, n);
                    n
                }
            };
            intersections[start_node.index()].segments.push(id);
            intersections[end_node.index()].segments.push(id);

            let class = p.spec.class;
            segments.push(RoadSegment {
                id,
                street: p.spec.street,
                shape: p.spec.shape,
                class,
                lanes: p.spec.lanes.unwrap_or_else(|| class.default_lanes()),
                one_way: p.spec.one_way,
                speed_limit: p.spec.speed_limit.unwrap_or_else(|| class.default_speed_limit()),
                length: p.length,
                start_node,
                end_node,
                polyline: p.polyline,
            });
        }

        // ── Traffic control ───────────────────────────────────────────────
        let cycle = self.signal_cycle_ms;
        for node in intersections.iter_mut() {
            node.control = default_control(node, &segments, cycle);
        }
        for (point, control) in self.controls {
            match grid.find(point) {
                Some(id) => intersections[id.index()].control = control,
                None => warn!("no intersection near {point} for control override {control:?}"),
            }
        }

        let entries: Vec<IntersectionEntry> = intersections
            .iter()
            .map(|n| IntersectionEntry { point: [n.point.x, n.point.y], id: n.id })
            .collect();
        let spatial_idx = RTree::bulk_load(entries);

        debug!(
            "built network: {} segments, {} intersections, grid degree {}",
            segments.len(),
            intersections.len(),
            grid.degree()
        );

        RoadNetwork {
            segments,
            intersections,
            streets: self.streets,
            shapes: self.shapes,
            bounds,
            tolerance: self.tolerance,
            projection: self.projection,
            grid,
            spatial_idx,
        }
    }
}

impl Default for RoadNetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn new_intersection(intersections: &mut Vec<Intersection>, point: Point) -> IntersectionId {
    let id = IntersectionId(intersections.len() as u32);
    intersections.push(Intersection { id, point, segments: Vec::new(), control: TrafficControl::None });
    id
}

/// Junctions of three or more segments are controlled: signals where a major
/// road meets, stop signs otherwise.  Signal offsets are staggered by id so
/// neighbouring signals do not switch in lockstep.
fn default_control(node: &Intersection, segments: &[RoadSegment], cycle_ms: u64) -> TrafficControl {
    if node.degree() < 3 {
        return TrafficControl::None;
    }
    let major = node.segments.iter().any(|s| segments[s.index()].class.is_major());
    if major {
        TrafficControl::Signal { cycle_ms, offset_ms: (node.id.0 as u64 * 7_919) % cycle_ms }
    } else {
        TrafficControl::Stop
    }
}

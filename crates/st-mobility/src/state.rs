//! Per-vehicle driving state and the value returned from each step.

use std::collections::VecDeque;
use std::sync::Arc;

use st_core::{ColorMode, Point, SegmentId, SimTime, VehicleId};
use st_spatial::Direction;

use crate::intersection::LaneConnector;
use crate::lanes::LaneRef;

// ── Route entries ─────────────────────────────────────────────────────────────

/// One pending hop of a vehicle's route.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RouteEntry {
    /// Exit point of `segment` when driven in `direction`.
    pub point:     Point,
    pub segment:   SegmentId,
    pub direction: Direction,
    /// Reverse on the current segment instead of crossing an intersection.
    pub uturn:     bool,
    /// The entry describes the segment the route was planned from.
    pub origin:    bool,
}

impl RouteEntry {
    pub fn new(point: Point, segment: SegmentId, direction: Direction) -> Self {
        Self { point, segment, direction, uturn: false, origin: false }
    }

    /// A reversal on `segment`, ending up travelling in `direction`.
    pub fn uturn(point: Point, segment: SegmentId, direction: Direction) -> Self {
        Self { point, segment, direction, uturn: true, origin: false }
    }
}

// ── Arbitration ───────────────────────────────────────────────────────────────

/// Progress through the control at the vehicle's next intersection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Arbitration {
    /// No decision taken yet for the upcoming intersection.
    #[default]
    Approaching,
    /// Stopped at the line until the given time.
    Waiting { until: SimTime },
    /// Allowed to enter.
    Cleared,
}

/// Position inside an intersection connector.
#[derive(Clone, Debug)]
pub struct ConnectorState {
    pub connector: Arc<LaneConnector>,
    /// Metres left on the connector.
    pub remaining: f64,
}

// ── Trip statistics ───────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TripStats {
    /// Metres driven.
    pub distance:         f64,
    pub steps:            u64,
    /// Sum of end-of-step speeds, for the mean.
    pub speed_sum:        f64,
    pub max_speed:        f64,
    pub uturns:           u32,
    pub reroutes:         u32,
    pub segments_entered: u32,
    pub trips_completed:  u32,
}

impl TripStats {
    pub fn mean_speed(&self) -> f64 {
        if self.steps == 0 { 0.0 } else { self.speed_sum / self.steps as f64 }
    }

    pub(crate) fn record(&mut self, travel: f64, speed: f64) {
        self.distance += travel;
        self.steps += 1;
        self.speed_sum += speed;
        self.max_speed = self.max_speed.max(speed);
    }
}

// ── VehicleState ──────────────────────────────────────────────────────────────

/// Everything the engine knows about one vehicle.
///
/// `remaining` is measured along the current segment to its exit in the
/// direction of travel.  While a connector is being driven, the vehicle
/// already belongs to the lane it is entering, so the distance still to
/// cover before the next exit is `connector.remaining + remaining`.
#[derive(Clone, Debug)]
pub struct VehicleState {
    pub id:           VehicleId,
    /// `false` once the vehicle has been removed.
    pub active:       bool,
    pub segment:      SegmentId,
    pub direction:    Direction,
    pub lane:         u8,
    pub remaining:    f64,
    /// m/s
    pub speed:        f64,
    /// Multiplier on the speed limit, fixed for the vehicle's life.
    pub speed_factor: f64,
    pub connector:    Option<ConnectorState>,
    pub arbitration:  Arbitration,
    pub pending:      VecDeque<RouteEntry>,
    pub destination:  Option<SegmentId>,
    /// Consecutive steps spent stopped or blocked at the current exit.
    pub wait_steps:   u32,
    pub step_ms:      u64,
    pub position:     Point,
    pub heading:      Point,
    pub stats:        TripStats,
}

impl VehicleState {
    pub fn new(
        id: VehicleId,
        lane: LaneRef,
        remaining: f64,
        speed: f64,
        speed_factor: f64,
        step_ms: u64,
    ) -> Self {
        Self {
            id,
            active: true,
            segment: lane.segment,
            direction: lane.direction,
            lane: lane.lane,
            remaining,
            speed,
            speed_factor,
            connector: None,
            arbitration: Arbitration::Approaching,
            pending: VecDeque::new(),
            destination: None,
            wait_steps: 0,
            step_ms,
            position: Point::ZERO,
            heading: Point::new(1.0, 0.0),
            stats: TripStats::default(),
        }
    }

    /// Distance to the current segment's exit, connector included.  Lane
    /// queues are ordered by this value.
    #[inline]
    pub fn effective_remaining(&self) -> f64 {
        self.remaining + self.connector.as_ref().map_or(0.0, |c| c.remaining)
    }

    #[inline]
    pub fn lane_ref(&self) -> LaneRef {
        LaneRef::new(self.segment, self.direction, self.lane)
    }
}

// ── Step outcome ──────────────────────────────────────────────────────────────

/// RGB colour suggested for drawing a vehicle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ColorHint {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColorHint {
    pub const UNIFORM: ColorHint = ColorHint { r: 40, g: 110, b: 220 };

    pub fn for_vehicle(mode: ColorMode, vehicle: VehicleId, speed: f64, limit: f64) -> Self {
        match mode {
            ColorMode::Uniform => Self::UNIFORM,
            ColorMode::BySpeed => {
                let t = if limit > 0.0 { (speed / limit).clamp(0.0, 1.0) } else { 0.0 };
                // red → yellow over the first half, yellow → green over the second
                let (r, g) = if t < 0.5 { (1.0, t * 2.0) } else { (2.0 - t * 2.0, 1.0) };
                Self { r: (r * 255.0) as u8, g: (g * 255.0) as u8, b: 0 }
            }
            ColorMode::ByVehicle => {
                const GOLDEN: f64 = 0.618_033_988_749_895;
                let hue = (vehicle.0 as f64 * GOLDEN).fract();
                hsv(hue, 0.65, 0.95)
            }
        }
    }
}

fn hsv(h: f64, s: f64, v: f64) -> ColorHint {
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let (p, q, t) = (v * (1.0 - s), v * (1.0 - f * s), v * (1.0 - (1.0 - f) * s));
    let (r, g, b) = match i as u32 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    ColorHint { r: (r * 255.0) as u8, g: (g * 255.0) as u8, b: (b * 255.0) as u8 }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VehicleStatus {
    Driving,
    /// Held at the line by intersection control.
    Waiting,
    /// Stalled because the next lane has no room.
    Blocked,
    /// Removed from the network; do not step again.
    Finished,
}

/// What one step produced.  The host calls `step` again `delay_ms` later
/// unless the status is [`VehicleStatus::Finished`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StepOutcome {
    pub vehicle:  VehicleId,
    pub position: Point,
    pub heading:  Point,
    pub speed:    f64,
    pub color:    ColorHint,
    pub delay_ms: u64,
    pub status:   VehicleStatus,
}

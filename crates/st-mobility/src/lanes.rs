//! Per-lane vehicle queues.
//!
//! Every segment owns `lanes` queues per direction.  A queue is ordered from
//! the vehicle nearest the exit (head) to the one nearest the entry (tail),
//! i.e. by non-decreasing effective remaining distance, and never holds more
//! than the segment's lane capacity.  The manager stores only membership;
//! distances are supplied by the caller.

use std::collections::VecDeque;

use st_core::{SegmentId, VehicleId};
use st_spatial::{Direction, RoadNetwork};

use crate::{MobilityError, MobilityResult};

/// One directional lane of a segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LaneRef {
    pub segment:   SegmentId,
    pub direction: Direction,
    /// 0 is the lane nearest the centreline.
    pub lane:      u8,
}

impl LaneRef {
    pub fn new(segment: SegmentId, direction: Direction, lane: u8) -> Self {
        Self { segment, direction, lane }
    }
}

pub struct LaneManager {
    /// Index of each segment's first queue in `queues`.
    base:     Vec<usize>,
    lanes:    Vec<u8>,
    capacity: Vec<u32>,
    /// Per segment: `lanes` forward queues, then `lanes` backward queues.
    queues:   Vec<VecDeque<VehicleId>>,
}

impl LaneManager {
    pub fn new(network: &RoadNetwork) -> Self {
        let mut base = Vec::with_capacity(network.segment_count());
        let mut lanes = Vec::with_capacity(network.segment_count());
        let mut capacity = Vec::with_capacity(network.segment_count());
        let mut total = 0usize;
        for seg in &network.segments {
            base.push(total);
            lanes.push(seg.lanes);
            capacity.push(seg.lane_capacity());
            total += 2 * seg.lanes as usize;
        }
        Self { base, lanes, capacity, queues: vec![VecDeque::new(); total] }
    }

    #[inline]
    fn slot(&self, lane: LaneRef) -> Option<usize> {
        let s = lane.segment.index();
        let n = *self.lanes.get(s)?;
        (lane.lane < n).then(|| self.base[s] + lane.direction.index() * n as usize + lane.lane as usize)
    }

    #[inline]
    fn queue(&self, lane: LaneRef) -> MobilityResult<&VecDeque<VehicleId>> {
        self.slot(lane).map(|i| &self.queues[i]).ok_or(MobilityError::InvalidLane(lane))
    }

    /// Insert `vehicle` at the position matching `remaining`.
    ///
    /// `remaining_of` reports the effective remaining distance of vehicles
    /// already queued.  A vehicle entering from the upstream end has the
    /// largest remaining distance and lands at the tail.
    pub fn add_vehicle(
        &mut self,
        lane: LaneRef,
        vehicle: VehicleId,
        remaining: f64,
        remaining_of: impl Fn(VehicleId) -> f64,
    ) -> MobilityResult<()> {
        let i = self.slot(lane).ok_or(MobilityError::InvalidLane(lane))?;
        let cap = self.capacity[lane.segment.index()] as usize;
        let q = &mut self.queues[i];
        if q.len() >= cap {
            return Err(MobilityError::LaneFull(lane));
        }
        let pos = q.partition_point(|&v| remaining_of(v) <= remaining);
        q.insert(pos, vehicle);
        Ok(())
    }

    /// `false` if `vehicle` was not in `lane`.
    pub fn remove_vehicle(&mut self, lane: LaneRef, vehicle: VehicleId) -> bool {
        let Some(i) = self.slot(lane) else {
            return false;
        };
        let q = &mut self.queues[i];
        match q.iter().position(|&v| v == vehicle) {
            Some(pos) => {
                q.remove(pos);
                true
            }
            None => false,
        }
    }

    /// The least occupied lane with spare capacity, lowest index on ties.
    pub fn free_lane(&self, segment: SegmentId, direction: Direction) -> Option<LaneRef> {
        let n = *self.lanes.get(segment.index())?;
        let cap = self.capacity[segment.index()] as usize;
        (0..n)
            .map(|l| LaneRef::new(segment, direction, l))
            .filter_map(|lane| self.slot(lane).map(|i| (self.queues[i].len(), lane)))
            .filter(|&(len, _)| len < cap)
            .min_by_key(|&(len, lane)| (len, lane.lane))
            .map(|(_, lane)| lane)
    }

    /// The vehicle immediately ahead of `vehicle`, or `None` at the head.
    pub fn peek_predecessor(&self, lane: LaneRef, vehicle: VehicleId) -> MobilityResult<Option<VehicleId>> {
        let q = self.queue(lane)?;
        let pos = q
            .iter()
            .position(|&v| v == vehicle)
            .ok_or(MobilityError::NotInLane { vehicle, lane })?;
        if pos == 0 {
            return Ok(None);
        }
        let pred = q[pos - 1];
        if pred == vehicle {
            return Err(MobilityError::SelfPredecessor(vehicle));
        }
        Ok(Some(pred))
    }

    /// The vehicle nearest the entry.
    pub fn tail(&self, lane: LaneRef) -> Option<VehicleId> {
        self.slot(lane).and_then(|i| self.queues[i].back().copied())
    }

    pub fn len(&self, lane: LaneRef) -> usize {
        self.slot(lane).map_or(0, |i| self.queues[i].len())
    }

    pub fn capacity(&self, lane: LaneRef) -> usize {
        self.slot(lane).map_or(0, |_| self.capacity[lane.segment.index()] as usize)
    }

    /// Head to tail.
    pub fn vehicles(&self, lane: LaneRef) -> impl Iterator<Item = VehicleId> + '_ {
        self.slot(lane).into_iter().flat_map(move |i| self.queues[i].iter().copied())
    }

    /// Check the ordering invariant against current distances.
    pub fn is_ordered(&self, lane: LaneRef, remaining_of: impl Fn(VehicleId) -> f64) -> bool {
        let d: Vec<f64> = self.vehicles(lane).map(remaining_of).collect();
        d.windows(2).all(|w| w[0] <= w[1])
    }

    /// Every lane of every segment, in index order.
    pub fn all_lanes(&self) -> impl Iterator<Item = LaneRef> + '_ {
        self.lanes.iter().enumerate().flat_map(|(s, &n)| {
            [Direction::Forward, Direction::Backward]
                .into_iter()
                .flat_map(move |dir| (0..n).map(move |l| LaneRef::new(SegmentId(s as u32), dir, l)))
        })
    }

    pub fn total_vehicles(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }
}

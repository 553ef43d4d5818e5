//! `WakeQueue`: sparse per-time vehicle activation queue.
//!
//! Every step returns the delay until the vehicle wants to run again.  The
//! host records that wake time here and only steps the vehicles due at the
//! earliest queued time, so idle stretches cost nothing.
//!
//! `BTreeMap` gives O(log W) insert and pop where W is the number of distinct
//! wake times currently queued.  With a uniform step duration W stays small:
//! most vehicles share the same few millisecond offsets.

use std::collections::BTreeMap;

use st_core::{SimTime, VehicleId};

/// Maps simulation times to the vehicles that must step at that time.
#[derive(Default)]
pub struct WakeQueue {
    inner: BTreeMap<SimTime, Vec<VehicleId>>,
    /// Cached entry count for O(1) `len()`.
    total: usize,
}

impl WakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `vehicle` to step at `time`.
    pub fn push(&mut self, time: SimTime, vehicle: VehicleId) {
        self.inner.entry(time).or_default().push(vehicle);
        self.total += 1;
    }

    /// Remove and return the vehicles due at exactly `time`, in ascending id
    /// order so runs are reproducible regardless of push order.
    pub fn drain_time(&mut self, time: SimTime) -> Option<Vec<VehicleId>> {
        let mut vehicles = self.inner.remove(&time)?;
        self.total -= vehicles.len();
        vehicles.sort_unstable();
        vehicles.dedup();
        Some(vehicles)
    }

    /// The earliest time with at least one queued vehicle.
    pub fn next_time(&self) -> Option<SimTime> {
        self.inner.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Number of distinct future times with at least one queued vehicle.
    pub fn time_count(&self) -> usize {
        self.inner.len()
    }
}

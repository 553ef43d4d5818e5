//! The `Sim` struct and its event loop.

use log::{debug, info, trace, warn};

use st_core::{SimTime, VehicleId};
use st_mobility::{MobilityError, TrafficEngine, VehicleStatus};

use crate::observer::SimObserver;
use crate::wake_queue::WakeQueue;
use crate::SimResult;

/// Counters accumulated over a run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimStats {
    /// Successful vehicle steps.
    pub steps:          u64,
    pub spawned:        u64,
    pub spawn_failures: u64,
    /// Vehicles that left the network.
    pub finished:       u64,
    /// Non-fatal step errors that were logged and rescheduled.
    pub step_errors:    u64,
    /// Distinct wake times processed.
    pub wakeups:        u64,
}

/// The assembled simulation.  Create via [`SimBuilder`][crate::SimBuilder].
///
/// The engine is owned by the sim and only touched from the event loop, so
/// every step sees the effect of all earlier steps.
pub struct Sim {
    pub engine:     TrafficEngine,
    pub wake_queue: WakeQueue,
    pub now:        SimTime,
    pub stats:      SimStats,
    /// Vehicles still to be placed at the next wake time.
    pub(crate) pending_spawns: usize,
    /// Replace every finished vehicle with a new one.
    pub(crate) respawn: bool,
}

impl Sim {
    /// Run until the queue is empty or the next wake time is after `end`.
    ///
    /// Vehicles due at the same time step in ascending id order.  A step
    /// reporting [`VehicleStatus::Finished`] is not rescheduled; every other
    /// step is pushed back at `now + delay_ms`.
    ///
    /// # Errors
    ///
    /// A fatal engine error (see [`MobilityError::is_fatal`]) aborts the run
    /// and is returned.  Non-fatal errors are logged, counted in
    /// [`SimStats::step_errors`], and the vehicle retries one step later.
    pub fn run_until<O: SimObserver>(&mut self, end: SimTime, observer: &mut O) -> SimResult<()> {
        info!(
            "running on {} segments from {} to {end} ({} planner)",
            self.engine.network().segment_count(),
            self.now,
            self.engine.planner_name()
        );
        self.place_pending(observer);

        while let Some(time) = self.wake_queue.next_time() {
            if time > end {
                break;
            }
            self.now = time;
            let Some(due) = self.wake_queue.drain_time(time) else {
                break;
            };
            self.stats.wakeups += 1;
            trace!("{time}: {} vehicles due", due.len());

            for id in due {
                self.step_vehicle(id, observer)?;
            }
            self.place_pending(observer);
        }

        if self.now < end {
            self.now = end;
        }
        info!(
            "run ended at {}: {} steps, {} finished, {} active",
            self.now,
            self.stats.steps,
            self.stats.finished,
            self.engine.active_count()
        );
        observer.on_sim_end(self.now, &self.stats);
        Ok(())
    }

    /// Run for `duration_ms` past the current time.
    pub fn run_for<O: SimObserver>(&mut self, duration_ms: u64, observer: &mut O) -> SimResult<()> {
        let end = self.now + duration_ms;
        self.run_until(end, observer)
    }

    /// Queue `n` additional vehicles for placement at the next wake time.
    pub fn add_vehicles(&mut self, n: usize) {
        self.pending_spawns += n;
    }

    pub fn active_count(&self) -> usize {
        self.engine.active_count()
    }

    fn step_vehicle<O: SimObserver>(&mut self, id: VehicleId, observer: &mut O) -> SimResult<()> {
        let now = self.now;
        match self.engine.step(id, now) {
            Ok(outcome) => {
                self.stats.steps += 1;
                observer.on_step(now, &outcome);
                if outcome.status == VehicleStatus::Finished {
                    self.stats.finished += 1;
                    if let Ok(state) = self.engine.store().state(id) {
                        observer.on_finish(now, state);
                    }
                    if self.respawn {
                        self.pending_spawns += 1;
                    }
                } else {
                    self.wake_queue.push(now + outcome.delay_ms, id);
                }
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                warn!("{id}: fatal error at {now}: {e}");
                Err(e.into())
            }
            Err(e) => {
                self.stats.step_errors += 1;
                match e {
                    MobilityError::VehicleNotFound(_) | MobilityError::VehicleInactive(_) => {
                        debug!("{id}: dropped from schedule: {e}");
                    }
                    _ => {
                        warn!("{id}: step failed at {now}: {e}");
                        let retry = now + self.engine.config().step_duration_ms;
                        self.wake_queue.push(retry, id);
                    }
                }
                Ok(())
            }
        }
    }

    /// Place queued vehicles and schedule their first step at `now`.
    fn place_pending<O: SimObserver>(&mut self, observer: &mut O) {
        let now = self.now;
        while self.pending_spawns > 0 {
            self.pending_spawns -= 1;
            match self.engine.spawn() {
                Ok(spawned) => {
                    self.stats.spawned += 1;
                    observer.on_spawn(now, &spawned);
                    self.wake_queue.push(now, spawned.vehicle);
                }
                Err(e) => {
                    self.stats.spawn_failures += 1;
                    observer.on_spawn_failed(now, &e);
                }
            }
        }
    }
}

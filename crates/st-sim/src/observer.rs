//! Simulation observer trait for progress reporting and data collection.

use st_core::SimTime;
use st_mobility::{MobilityError, Spawned, StepOutcome, VehicleState};

use crate::SimStats;

/// Callbacks invoked by [`Sim::run_until`][crate::Sim::run_until].
///
/// Every hook runs after the engine has applied the change it reports, so
/// an observer always sees committed state.  All methods have default no-op
/// implementations so implementors only need to override what they care
/// about.
///
/// # Example: position sampler
///
/// ```rust,ignore
/// struct Sampler { every_ms: u64, points: Vec<(SimTime, Point)> }
///
/// impl SimObserver for Sampler {
///     fn on_step(&mut self, now: SimTime, outcome: &StepOutcome) {
///         if now.as_millis() % self.every_ms == 0 {
///             self.points.push((now, outcome.position));
///         }
///     }
/// }
/// ```
pub trait SimObserver {
    /// A vehicle was placed on the network.
    fn on_spawn(&mut self, _now: SimTime, _spawned: &Spawned) {}

    /// A vehicle completed one step.
    fn on_step(&mut self, _now: SimTime, _outcome: &StepOutcome) {}

    /// A vehicle left the network.  `state` holds its final statistics.
    fn on_finish(&mut self, _now: SimTime, _state: &VehicleState) {}

    /// No spawn position could be found.  The run continues.
    fn on_spawn_failed(&mut self, _now: SimTime, _error: &MobilityError) {}

    /// Called once when the run stops.
    fn on_sim_end(&mut self, _now: SimTime, _stats: &SimStats) {}
}

/// A [`SimObserver`] that does nothing.
pub struct NoopObserver;

impl SimObserver for NoopObserver {}

//! Fluent builder for constructing a [`Sim`].

use std::sync::Arc;

use log::info;

use st_core::{GeoBounds, SimTime, TrafficConfig};
use st_mobility::{RoutePlanner, TrafficEngine};
use st_spatial::{load_map, MapFiles, RoadNetwork};

use crate::{Sim, SimResult, SimStats, WakeQueue};

/// Fluent builder for [`Sim`].
///
/// # Required inputs
///
/// - a [`RoadNetwork`], either built in memory or loaded via [`SimBuilder::from_map`]
/// - a [`TrafficConfig`]
///
/// # Optional inputs (have defaults)
///
/// | Method          | Default                                   |
/// |-----------------|-------------------------------------------|
/// | `.vehicles(n)`  | 0                                         |
/// | `.respawn(b)`   | `false`                                   |
/// | `.start(t)`     | `SimTime::ZERO`                           |
/// | `.planner(p)`   | chosen by `config.mobility`               |
///
/// # Example
///
/// ```rust,ignore
/// let mut sim = SimBuilder::from_map(&MapFiles::in_dir("map"), region, config)?
///     .vehicles(200)
///     .respawn(true)
///     .build()?;
/// sim.run_until(SimTime::from_secs(600), &mut NoopObserver)?;
/// ```
pub struct SimBuilder {
    network:  Arc<RoadNetwork>,
    config:   TrafficConfig,
    vehicles: usize,
    respawn:  bool,
    start:    SimTime,
    planner:  Option<Box<dyn RoutePlanner>>,
}

impl SimBuilder {
    pub fn new(network: Arc<RoadNetwork>, config: TrafficConfig) -> Self {
        Self {
            network,
            config,
            vehicles: 0,
            respawn:  false,
            start:    SimTime::ZERO,
            planner:  None,
        }
    }

    /// Load the map files clipped to `region` and start a builder on it.
    pub fn from_map(files: &MapFiles, region: GeoBounds, config: TrafficConfig) -> SimResult<Self> {
        let network = load_map(files, region, &config)?;
        Ok(Self::new(Arc::new(network), config))
    }

    /// Number of vehicles placed when the run starts.
    pub fn vehicles(mut self, n: usize) -> Self {
        self.vehicles = n;
        self
    }

    /// Replace each vehicle that leaves the network with a new one.
    pub fn respawn(mut self, respawn: bool) -> Self {
        self.respawn = respawn;
        self
    }

    pub fn start(mut self, start: SimTime) -> Self {
        self.start = start;
        self
    }

    /// Override the planner selected by `config.mobility`.
    pub fn planner(mut self, planner: Box<dyn RoutePlanner>) -> Self {
        self.planner = Some(planner);
        self
    }

    /// Validate the configuration, build the engine and return a ready-to-run
    /// [`Sim`].  Vehicles are placed on the first call to
    /// [`Sim::run_until`] so the observer sees every spawn.
    pub fn build(self) -> SimResult<Sim> {
        self.config.validate()?;

        let engine = match self.planner {
            Some(planner) => TrafficEngine::with_planner(self.network, self.config, planner)?,
            None => TrafficEngine::new(self.network, self.config)?,
        };
        info!(
            "sim ready: {} segments, {} intersections, {} vehicles requested",
            engine.network().segment_count(),
            engine.network().intersection_count(),
            self.vehicles
        );

        Ok(Sim {
            engine,
            wake_queue:     WakeQueue::new(),
            now:            self.start,
            stats:          SimStats::default(),
            pending_spawns: self.vehicles,
            respawn:        self.respawn,
        })
    }
}

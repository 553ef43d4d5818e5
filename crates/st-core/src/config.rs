//! Engine configuration.
//!
//! `TrafficConfig` gathers every tunable recognised by the loader and the
//! mobility engine.  Applications typically deserialize it from JSON (with the
//! `serde` feature) and pass it to `load_map` and `TrafficEngine::new`; any
//! missing field takes its [`Default`] value.

use crate::{CoreError, CoreResult};

/// Route planning strategy, fixed at engine construction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MobilityMode {
    /// Pick a random connected segment at every intersection.
    #[default]
    RandomTurn,
    /// Drive A* shortest paths between random origin/destination pairs.
    OriginDestination,
}

/// How the step outcome's colour hint is derived.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColorMode {
    /// Red when stopped, through yellow, to green at the speed limit.
    #[default]
    BySpeed,
    /// A stable per-vehicle hue.
    ByVehicle,
    /// Every vehicle gets the same colour.
    Uniform,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrafficConfig {
    /// Master RNG seed.  The same seed always produces identical runs.
    pub seed: u64,

    /// Depth of the intersection grid.  `None` derives it from the region
    /// extent and a 200 m target cell.
    pub grid_degree: Option<u32>,

    /// Resolution tolerance in metres.  Segment endpoints closer than this
    /// merge into one intersection; a vehicle this close to its exit is
    /// "at the line".
    pub intersection_tolerance_m: f64,

    /// m/s².
    pub max_acceleration: f64,

    /// Hard braking bound used when clamping deceleration, m/s².
    pub max_deceleration: f64,

    /// Braking rate assumed when planning a stop, m/s².
    pub comfort_deceleration: f64,

    /// Standard deviation of the per-driver speed factor (mean 1.0).
    pub speed_variance_sd: f64,

    /// Delay between two steps of one vehicle, in milliseconds.
    pub step_duration_ms: u64,

    /// Upper bound on the straight-line origin→destination distance picked
    /// by the origin/destination planner, in metres.
    pub max_od_distance_m: f64,

    /// Consecutive blocked steps at an exit before a forced U-turn/re-route.
    pub wait_threshold: u32,

    pub mobility: MobilityMode,

    /// Pause imposed by a stop sign, in milliseconds.
    pub stop_pause_ms: u64,

    /// Extra pause per vehicle already waiting at a stop from another approach.
    pub yield_pause_ms: u64,

    /// Full red+green cycle of loader-assigned signals, in milliseconds.
    pub signal_cycle_ms: u64,

    /// Initial speed as a fraction of the segment speed limit.
    pub initial_speed_fraction: f64,

    /// Remove vehicles that reach their destination instead of assigning a
    /// new one.  Only meaningful with [`MobilityMode::OriginDestination`].
    pub remove_on_arrival: bool,

    pub color_mode: ColorMode,

    /// Random (segment, direction) picks tried before a spawn is reported
    /// as failed.
    pub spawn_attempts: u32,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            seed:                     42,
            grid_degree:              None,
            intersection_tolerance_m: 2.0,
            max_acceleration:         2.5,
            max_deceleration:         7.5,
            comfort_deceleration:     3.0,
            speed_variance_sd:        0.1,
            step_duration_ms:         500,
            max_od_distance_m:        2_000.0,
            wait_threshold:           20,
            mobility:                 MobilityMode::RandomTurn,
            stop_pause_ms:            2_000,
            yield_pause_ms:           1_000,
            signal_cycle_ms:          60_000,
            initial_speed_fraction:   0.0,
            remove_on_arrival:        false,
            color_mode:               ColorMode::BySpeed,
            spawn_attempts:           50,
        }
    }
}

impl TrafficConfig {
    /// Check ranges.  Called by the loader and the engine constructor so a
    /// bad config is rejected at startup rather than mid-run.
    pub fn validate(&self) -> CoreResult<()> {
        fn positive(name: &str, v: f64) -> CoreResult<()> {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(CoreError::Config(format!("{name} must be positive, got {v}")))
            }
        }

        positive("intersection_tolerance_m", self.intersection_tolerance_m)?;
        positive("max_acceleration", self.max_acceleration)?;
        positive("max_deceleration", self.max_deceleration)?;
        positive("comfort_deceleration", self.comfort_deceleration)?;
        positive("max_od_distance_m", self.max_od_distance_m)?;

        if self.comfort_deceleration > self.max_deceleration {
            return Err(CoreError::Config(format!(
                "comfort_deceleration ({}) exceeds max_deceleration ({})",
                self.comfort_deceleration, self.max_deceleration
            )));
        }
        if !(self.speed_variance_sd.is_finite() && self.speed_variance_sd >= 0.0) {
            return Err(CoreError::Config(format!(
                "speed_variance_sd must be >= 0, got {}",
                self.speed_variance_sd
            )));
        }
        if self.step_duration_ms == 0 {
            return Err(CoreError::Config("step_duration_ms must be > 0".into()));
        }
        if self.signal_cycle_ms < 2 {
            return Err(CoreError::Config("signal_cycle_ms must be >= 2".into()));
        }
        if !(0.0..=1.0).contains(&self.initial_speed_fraction) {
            return Err(CoreError::Config(format!(
                "initial_speed_fraction must be in [0, 1], got {}",
                self.initial_speed_fraction
            )));
        }
        if self.spawn_attempts == 0 {
            return Err(CoreError::Config("spawn_attempts must be > 0".into()));
        }
        Ok(())
    }

    /// Step duration in seconds, the `dt` of the kinematic update.
    #[inline]
    pub fn step_secs(&self) -> f64 {
        self.step_duration_ms as f64 / 1_000.0
    }
}

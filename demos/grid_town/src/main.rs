//! grid_town: street-traffic demo on a synthetic grid.
//!
//! Writes a small town in the binary map format to a temporary directory,
//! loads it back through the map loader, and drives vehicles through it for
//! a fixed span of simulated time.  Set `RUST_LOG=debug` to watch the
//! engine's decisions.
//!
//! ```text
//! cargo run -p grid_town -- --vehicles 80 --seconds 600 --mode od --trace trace.jsonl
//! ```

mod map;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};

use st_core::{MobilityMode, SimTime, TrafficConfig};
use st_mobility::{MobilityError, StepOutcome, VehicleStatus};
use st_sim::{SimBuilder, SimObserver, SimStats};

use map::write_grid_town;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Mode {
    /// Random connected turn at every intersection.
    Random,
    /// A* routes between random origin/destination pairs.
    Od,
}

#[derive(Parser, Debug)]
#[command(about = "Drive vehicles through a synthetic grid town")]
struct Args {
    /// Vehicles placed at the start.
    #[arg(long, default_value_t = 60)]
    vehicles: usize,

    /// Simulated seconds to run.
    #[arg(long, default_value_t = 300)]
    seconds: u64,

    /// Intersections per side.
    #[arg(long, default_value_t = 6)]
    size: usize,

    #[arg(long, value_enum)]
    mode: Option<Mode>,

    #[arg(long)]
    seed: Option<u64>,

    /// Engine configuration as JSON; missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replace vehicles that leave the network.
    #[arg(long)]
    respawn: bool,

    /// Write one JSON line per vehicle every `sample_secs` to this file.
    #[arg(long)]
    trace: Option<PathBuf>,

    #[arg(long, default_value_t = 10)]
    sample_secs: u64,
}

fn load_config(args: &Args) -> Result<TrafficConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            serde_json::from_reader(file).with_context(|| format!("parsing {}", path.display()))?
        }
        None => TrafficConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    match args.mode {
        Some(Mode::Random) => config.mobility = MobilityMode::RandomTurn,
        Some(Mode::Od) => config.mobility = MobilityMode::OriginDestination,
        None => {}
    }
    config.validate()?;
    Ok(config)
}

// ── Observer ──────────────────────────────────────────────────────────────────

/// Counts step outcomes and optionally samples positions to a JSON-lines file.
struct TownObserver {
    driving:      u64,
    waiting:      u64,
    blocked:      u64,
    spawn_failed: u64,
    sample_ms:    u64,
    trace:        Option<BufWriter<File>>,
    trace_rows:   usize,
    trace_error:  Option<std::io::Error>,
}

impl TownObserver {
    fn new(sample_secs: u64, trace: Option<BufWriter<File>>) -> Self {
        Self {
            driving:      0,
            waiting:      0,
            blocked:      0,
            spawn_failed: 0,
            sample_ms:    sample_secs.max(1) * 1_000,
            trace,
            trace_rows:   0,
            trace_error:  None,
        }
    }

    fn sample(&mut self, now: SimTime, o: &StepOutcome) {
        let Some(out) = self.trace.as_mut() else {
            return;
        };
        if self.trace_error.is_some() || now.as_millis() % self.sample_ms != 0 {
            return;
        }
        let row = serde_json::json!({
            "t":       now.as_secs_f64(),
            "vehicle": o.vehicle.0,
            "x":       o.position.x,
            "y":       o.position.y,
            "speed":   o.speed,
            "status":  format!("{:?}", o.status),
            "rgb":     [o.color.r, o.color.g, o.color.b],
        });
        match writeln!(out, "{row}") {
            Ok(()) => self.trace_rows += 1,
            Err(e) => self.trace_error = Some(e),
        }
    }
}

impl SimObserver for TownObserver {
    fn on_step(&mut self, now: SimTime, outcome: &StepOutcome) {
        match outcome.status {
            VehicleStatus::Driving => self.driving += 1,
            VehicleStatus::Waiting => self.waiting += 1,
            VehicleStatus::Blocked => self.blocked += 1,
            VehicleStatus::Finished => {}
        }
        self.sample(now, outcome);
    }

    fn on_spawn_failed(&mut self, now: SimTime, error: &MobilityError) {
        self.spawn_failed += 1;
        warn!("{now}: {error}");
    }

    fn on_sim_end(&mut self, now: SimTime, stats: &SimStats) {
        info!("sim ended at {now} after {} wakeups", stats.wakeups);
        if let Some(out) = self.trace.as_mut() {
            if let Err(e) = out.flush() {
                self.trace_error.get_or_insert(e);
            }
        }
    }
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;

    println!("=== grid_town ===");
    println!(
        "Grid: {0} × {0}  |  Vehicles: {1}  |  Seconds: {2}  |  Seed: {3}  |  Mode: {4:?}",
        args.size, args.vehicles, args.seconds, config.seed, config.mobility
    );

    // 1. Synthesize and load the map.
    let dir = tempfile::tempdir().context("creating map directory")?;
    let town = write_grid_town(dir.path(), args.size)?;
    println!("Wrote {} segment records to {}", town.segments, dir.path().display());

    let mut sim = SimBuilder::from_map(&town.files, town.region, config)?
        .vehicles(args.vehicles)
        .respawn(args.respawn)
        .build()?;
    let network = sim.engine.network();
    println!(
        "Road network: {} segments, {} intersections",
        network.segment_count(),
        network.intersection_count()
    );

    // 2. Run.
    let trace = match &args.trace {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            Some(BufWriter::new(file))
        }
        None => None,
    };
    let mut observer = TownObserver::new(args.sample_secs, trace);

    let t0 = Instant::now();
    sim.run_until(SimTime::from_secs(args.seconds), &mut observer)?;
    let elapsed = t0.elapsed();

    if let Some(e) = observer.trace_error.take() {
        return Err(anyhow::Error::new(e).context("writing trace"));
    }

    // 3. Summary.
    let store = sim.engine.store();
    let (mut distance, mut speed_sum, mut steps, mut uturns, mut reroutes, mut trips) = (0.0, 0.0, 0u64, 0u32, 0u32, 0u32);
    for v in &store.states {
        distance += v.stats.distance;
        speed_sum += v.stats.speed_sum;
        steps += v.stats.steps;
        uturns += v.stats.uturns;
        reroutes += v.stats.reroutes;
        trips += v.stats.trips_completed;
    }
    let mean_speed = if steps > 0 { speed_sum / steps as f64 } else { 0.0 };

    println!();
    println!("Wall time: {:.2?}  ({} vehicle steps)", elapsed, sim.stats.steps);
    println!(
        "Vehicles: {} placed, {} failed placements, {} left the network, {} active",
        sim.stats.spawned,
        observer.spawn_failed,
        sim.stats.finished,
        sim.active_count()
    );
    println!(
        "Steps: {} driving, {} waiting at controls, {} blocked, {} errors",
        observer.driving, observer.waiting, observer.blocked, sim.stats.step_errors
    );
    println!(
        "Travel: {:.1} km, mean speed {:.1} m/s, {} U-turns, {} reroutes, {} trips completed",
        distance / 1_000.0,
        mean_speed,
        uturns,
        reroutes,
        trips
    );
    if let Some(path) = &args.trace {
        println!("Trace: {} rows → {}", observer.trace_rows, path.display());
    }
    Ok(())
}

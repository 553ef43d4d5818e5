//! `st-sim`: event loop driving the street-traffic engine.
//!
//! # Event loop
//!
//! ```text
//! place queued vehicles, wake each at `now`
//! while the earliest wake time t <= end:
//!   ① Drain    pop every vehicle due at t, ascending VehicleId order.
//!   ② Step     TrafficEngine::step(vehicle, t) mutates shared state,
//!              then the observer sees the outcome.
//!   ③ Resched  Finished vehicles leave the queue; everyone else wakes
//!              again at t + delay_ms.  Non-fatal errors retry one step
//!              later, fatal errors abort the run.
//!   ④ Refill   vehicles queued by respawn are placed at t.
//! ```
//!
//! # Modules
//!
//! | Module       | Contents                                          |
//! |--------------|---------------------------------------------------|
//! | `builder`    | `SimBuilder`: network, config, population         |
//! | `sim`        | `Sim`, `SimStats`, the event loop                 |
//! | `observer`   | `SimObserver` hooks and `NoopObserver`            |
//! | `wake_queue` | `WakeQueue`: vehicles keyed by next wake time     |
//! | `error`      | `SimError`, `SimResult`                           |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use st_core::{SimTime, TrafficConfig};
//! use st_sim::{NoopObserver, SimBuilder};
//!
//! let mut sim = SimBuilder::new(network, TrafficConfig::default())
//!     .vehicles(100)
//!     .build()?;
//! sim.run_until(SimTime::from_secs(300), &mut NoopObserver)?;
//! ```

pub mod builder;
pub mod error;
pub mod observer;
pub mod sim;
pub mod wake_queue;


pub use builder::SimBuilder;
pub use error::{SimError, SimResult};
pub use observer::{NoopObserver, SimObserver};
pub use sim::{Sim, SimStats};
pub use wake_queue::WakeQueue;

//! # dopf-sim: Event-Driven Feeder Simulation
//!
//! Replays daily load data on a radial feeder and lets the distributed
//! controller act on it at two time scales:
//!
//! - **fast control** adjusts inverter reactive power every few seconds
//!   against the loads present right now
//! - **slow control** schedules vehicle charging and inverters over a
//!   prediction window every few minutes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dopf_sim::{SimulationConfig, Simulator};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = SimulationConfig {
//!         input_dir: "data/feeder".into(),
//!         horizon_days: 2,
//!         ..SimulationConfig::default()
//!     };
//!     let mut simulator = Simulator::initialize(config)?;
//!     let summary = simulator.run()?;
//!     println!("objective {:.6} after {} events", summary.objective, summary.events);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod events;
pub mod future_data;
pub mod predictor;
pub mod simulator;

pub use config::{ConfigError, FastControlConfig, SimulationConfig, SlowControlConfig};
pub use events::{Action, Event, EventQueue};
pub use future_data::{fetch_real_time_data, FutureData};
pub use predictor::make_prediction;
pub use simulator::{EventOutcome, SimulationSummary, Simulator};

//! # dopf-algo: Power Flow and Control for Radial Feeders
//!
//! This crate solves multi-phase radial distribution feeders and steers their
//! controllable loads toward a cheaper, voltage-feasible operating point.
//!
//! ## Power Flow
//!
//! [`power_flow::sweep`] is a backward/forward sweep over a breadth-first
//! sorted [`NetworkModel`](dopf_core::NetworkModel). Each horizon slot owns a
//! [`SlotState`]; the topology is shared and read-only.
//!
//! ## Control
//!
//! [`NetworkControl`] minimizes the per-phase cost of substation real power
//! subject to house voltage limits, handled with a log barrier whose weight is
//! annealed toward zero:
//!
//! | Mode | Slots | Devices moved by default |
//! |------|-------|--------------------------|
//! | [`ControlMode::Fast`] | slot 0 | photovoltaic reactive power |
//! | [`ControlMode::Slow`] | whole horizon | photovoltaic reactive power, EV charging profiles |
//!
//! ## Example
//!
//! ```ignore
//! use dopf_algo::{NetworkControl, power_flow::solve_model};
//!
//! let mut control = NetworkControl::new(&model, 1, 5.0)?;
//! let report = control.fast_control(&mut model)?;
//! solve_model(&mut model, &conventions, &SweepSettings::default())?;
//! println!("objective {:.6}", report.objective);
//! ```

pub mod opf;
pub mod power_flow;

pub use opf::{
    ControlMode, ControlOutcome, ControlReport, ControlSettings, EnabledKinds, InnerReport,
    InnerStatus, NetworkControl, ObjectiveCoefficients,
};
pub use power_flow::{solve_model, SlotState, SweepReport, SweepSettings, SweepStatus};

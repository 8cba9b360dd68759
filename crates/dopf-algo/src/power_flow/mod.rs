//! Power Flow Solvers
//!
//! - [`sweep`]: per-slot backward/forward sweep over a sorted radial feeder
//!
//! [`solve_model`] runs the sweep against the model's own state, which is how
//! the simulator refreshes voltages between control actions.

use dopf_core::{DopfError, DopfResult, GridConventions, NetworkModel};
use serde::Serialize;
use tracing::{debug, warn};

pub mod sweep;

pub use sweep::{
    backward_sweep, forward_sweep, initialize_voltages, substation_injection, sweep, SlotState,
    SweepReport, SweepSettings, SweepStatus,
};

/// Per-bus voltage magnitudes and the substation injection after a solve.
#[derive(Debug, Clone, Serialize)]
pub struct PowerFlowSummary {
    pub report: SweepReport,
    pub buses: Vec<BusVoltage>,
    /// Real and reactive substation injection per phase.
    pub substation_power: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusVoltage {
    pub name: String,
    pub phase: String,
    pub magnitudes: Vec<f64>,
}

/// Initialize the model's voltages from its substation voltage.
pub fn initialize_model_voltages(model: &mut NetworkModel, conventions: &GridConventions) {
    let mut state = SlotState::from_model(model);
    initialize_voltages(model, &mut state, model.substation_voltage, conventions);
    state.write_to_model(model);
}

/// Aggregate the model's loads and sweep its own state to a fixed point.
pub fn solve_model(
    model: &mut NetworkModel,
    conventions: &GridConventions,
    settings: &SweepSettings,
) -> DopfResult<SweepReport> {
    if !model.is_sorted() {
        return Err(DopfError::Topology(
            "network must be sorted breadth-first before solving".into(),
        ));
    }
    model.compute_aggregate_loads();
    let mut state = SlotState::from_model(model);
    let report = sweep(
        model,
        &mut state,
        model.substation_voltage,
        conventions,
        settings,
    );
    state.write_to_model(model);

    if report.converged() {
        debug!(iterations = report.iterations, "model power flow converged");
    } else {
        warn!(
            iterations = report.iterations,
            max_update = report.max_update,
            "model power flow hit the iteration cap"
        );
    }
    Ok(report)
}

/// Collect voltage magnitudes and substation injection from a solved model.
pub fn summarize(model: &NetworkModel, report: SweepReport) -> PowerFlowSummary {
    let buses = model
        .buses()
        .iter()
        .map(|bus| BusVoltage {
            name: bus.name.clone(),
            phase: bus.phase.to_string(),
            magnitudes: bus.voltage.magnitudes(),
        })
        .collect();
    let substation_power = model
        .buses()
        .first()
        .map(|root| root.aggregate_load.power.iter().map(|s| (s.re, s.im)).collect())
        .unwrap_or_default();
    PowerFlowSummary {
        report,
        buses,
        substation_power,
    }
}

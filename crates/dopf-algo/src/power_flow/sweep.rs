//! # Backward/Forward Sweep Power Flow
//!
//! Radial feeders admit a much simpler power-flow iteration than meshed
//! transmission grids. With buses in breadth-first order, one iteration is two
//! linear passes over the tree:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BACKWARD PASS (bus n-1 → 1)                                             │
//! │    I_line(i) = Σ I_line(children, aligned)                               │
//! │              + Y_i · V_i                    constant-admittance part     │
//! │              + conj(S_i / V_i)              constant-power part          │
//! │                                                                           │
//! │  FORWARD PASS (bus 1 → n-1)                                              │
//! │    V_i = V_parent[mapped phases] − Z_line(i) · I_line(i)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both passes return the largest squared-norm change they produced; the
//! iteration stops once that change falls below the tolerance or the iteration
//! cap is reached. Afterwards the substation injection is
//! `S_sub = V_sub ⊙ conj(Σ I_children)`, stored as the substation's aggregate
//! power.
//!
//! The functions here never touch the model's own per-bus state. They read the
//! tree structure from a sorted [`NetworkModel`] and operate on a [`SlotState`],
//! so the same code serves the model's real-time power flow and every slot of
//! the controller's horizon.

use dopf_core::{norm, BusId, ColumnVector, GridConventions, LineId, LoadValue, NetworkModel, C64};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Iteration limits for the sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    /// Maximum number of backward/forward iterations
    pub max_iterations: usize,
    /// Squared-norm update below which the sweep has converged
    pub tolerance: f64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            tolerance: 1e-6,
        }
    }
}

impl SweepSettings {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Lifecycle of one slot's power-flow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SweepStatus {
    #[default]
    NotInitialized,
    VoltageInitialized,
    Converged,
    /// Iteration cap hit before the update fell below tolerance
    MaxIterations,
}

/// Outcome of one call to [`sweep`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepReport {
    pub status: SweepStatus,
    pub iterations: usize,
    /// Largest squared-norm update of the final iteration
    pub max_update: f64,
}

impl SweepReport {
    pub fn converged(&self) -> bool {
        self.status == SweepStatus::Converged
    }
}

/// Per-slot electrical state: one voltage and aggregate load per bus, one current per line.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotState {
    pub voltages: Vec<ColumnVector<C64>>,
    pub aggregates: Vec<LoadValue>,
    pub currents: Vec<ColumnVector<C64>>,
    pub status: SweepStatus,
}

impl SlotState {
    /// Zero state sized to the topology's phase sets.
    pub fn new(topology: &NetworkModel) -> Self {
        Self {
            voltages: topology
                .buses()
                .iter()
                .map(|bus| ColumnVector::new(&bus.phase))
                .collect(),
            aggregates: topology
                .buses()
                .iter()
                .map(|bus| LoadValue::new(&bus.phase))
                .collect(),
            currents: topology
                .lines()
                .iter()
                .map(|line| ColumnVector::new(&line.phase))
                .collect(),
            status: SweepStatus::NotInitialized,
        }
    }

    /// Snapshot of the model's own voltages, aggregate loads and currents.
    pub fn from_model(model: &NetworkModel) -> Self {
        Self {
            voltages: model.buses().iter().map(|bus| bus.voltage.clone()).collect(),
            aggregates: model
                .buses()
                .iter()
                .map(|bus| bus.aggregate_load.clone())
                .collect(),
            currents: model.lines().iter().map(|line| line.current.clone()).collect(),
            status: SweepStatus::NotInitialized,
        }
    }

    pub fn write_to_model(&self, model: &mut NetworkModel) {
        for (index, voltage) in self.voltages.iter().enumerate() {
            let bus = model.bus_mut(BusId::new(index));
            bus.voltage = voltage.clone();
            bus.aggregate_load = self.aggregates[index].clone();
        }
        for (index, current) in self.currents.iter().enumerate() {
            model.line_mut(LineId::new(index)).current = current.clone();
        }
    }

    /// Substation injection computed by the last sweep.
    pub fn substation_power(&self) -> &ColumnVector<C64> {
        &self.aggregates[0].power
    }

    /// Per-phase voltage magnitudes of bus `index`.
    pub fn voltage_magnitudes(&self, index: usize) -> Vec<f64> {
        self.voltages[index].magnitudes()
    }
}

/// Balanced substation voltage rotated per phase, then copied down the tree.
pub fn initialize_voltages(
    topology: &NetworkModel,
    state: &mut SlotState,
    substation_voltage: f64,
    conventions: &GridConventions,
) {
    let Some(root) = topology.buses().first() else {
        return;
    };
    state.voltages[0] = root
        .phase
        .offsets()
        .map(|offset| conventions.rotation(offset) * substation_voltage)
        .collect();

    for index in 1..topology.num_buses() {
        let bus = &topology.buses()[index];
        let Some(line) = bus.from_line() else {
            continue;
        };
        let parent = topology.line(line).from.value();
        let (upstream, rest) = state.voltages.split_at_mut(index);
        rest[0].reset();
        rest[0].add_from_indices(&upstream[parent], bus.phase_indices_in_parent());
    }
    state.status = SweepStatus::VoltageInitialized;
}

/// Update every line current from the leaves up; returns the largest squared-norm change.
pub fn backward_sweep(topology: &NetworkModel, state: &mut SlotState) -> f64 {
    let mut max_update = 0.0f64;
    for index in (1..topology.num_buses()).rev() {
        let bus = &topology.buses()[index];
        let Some(parent_line) = bus.from_line() else {
            continue;
        };

        let mut current = ColumnVector::new(&bus.phase);
        for &child in bus.to_lines() {
            current.add_to_indices(
                &state.currents[child.value()],
                topology.line(child).phase_indices_in_from_bus(),
            );
        }

        let aggregate = &state.aggregates[index];
        let voltage = &state.voltages[index];
        current += aggregate.admittance.mul_vec(voltage);
        for phase in 0..current.len() {
            current[phase] += (aggregate.power[phase] / voltage[phase]).conj();
        }

        let slot = &mut state.currents[parent_line.value()];
        let update = norm(&(&current - &*slot));
        *slot = current;
        max_update = max_update.max(update);
    }
    max_update
}

/// Update every non-root voltage from the root down; returns the largest squared-norm change.
pub fn forward_sweep(topology: &NetworkModel, state: &mut SlotState) -> f64 {
    let mut max_update = 0.0f64;
    for index in 1..topology.num_buses() {
        let bus = &topology.buses()[index];
        let Some(parent_line) = bus.from_line() else {
            continue;
        };
        let line = topology.line(parent_line);

        let mut voltage = -line.impedance.mul_vec(&state.currents[parent_line.value()]);
        let (upstream, rest) = state.voltages.split_at_mut(index);
        voltage.add_from_indices(&upstream[line.from.value()], bus.phase_indices_in_parent());

        let update = norm(&(&voltage - &rest[0]));
        rest[0] = voltage;
        max_update = max_update.max(update);
    }
    max_update
}

/// `V_sub ⊙ conj(Σ I_children)` at the substation phases.
pub fn substation_injection(topology: &NetworkModel, state: &SlotState) -> ColumnVector<C64> {
    let Some(root) = topology.buses().first() else {
        return ColumnVector::zeros(0);
    };
    let mut current = ColumnVector::new(&root.phase);
    for &child in root.to_lines() {
        current.add_to_indices(
            &state.currents[child.value()],
            topology.line(child).phase_indices_in_from_bus(),
        );
    }
    state.voltages[0].hadamard(&current.conj())
}

/// Iterate backward/forward passes to a fixed point and record the substation injection.
///
/// Aggregate loads in `state` must already be up to date. Voltages are
/// (re-)initialized when the substation's first phase has a real part below
/// the conventions' threshold, which covers a fresh zero state.
pub fn sweep(
    topology: &NetworkModel,
    state: &mut SlotState,
    substation_voltage: f64,
    conventions: &GridConventions,
    settings: &SweepSettings,
) -> SweepReport {
    if topology.num_buses() == 0 {
        return SweepReport {
            status: SweepStatus::Converged,
            iterations: 0,
            max_update: 0.0,
        };
    }
    let needs_init = state.voltages[0]
        .iter()
        .next()
        .map_or(true, |v| v.re < conventions.reinit_threshold);
    if needs_init {
        initialize_voltages(topology, state, substation_voltage, conventions);
    }

    let mut iterations = 0;
    let mut max_update = settings.tolerance + 1.0;
    while iterations < settings.max_iterations && max_update >= settings.tolerance {
        let backward = backward_sweep(topology, state);
        let forward = forward_sweep(topology, state);
        max_update = backward.max(forward);
        iterations += 1;
        trace!(iterations, max_update, "sweep iteration");
    }

    state.aggregates[0].power = substation_injection(topology, state);
    state.status = if max_update < settings.tolerance {
        SweepStatus::Converged
    } else {
        SweepStatus::MaxIterations
    };
    SweepReport {
        status: state.status,
        iterations,
        max_update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dopf_core::{Bus, BusKind, Line, LineKind, PhaseSet, SquareMatrix};

    fn two_bus(load: C64) -> (NetworkModel, SlotState) {
        let mut model = NetworkModel::new();
        let phase = PhaseSet::parse("a").unwrap();
        let sub = model
            .add_bus(Bus::new("sub", phase.clone(), BusKind::Substation))
            .unwrap();
        let house = model
            .add_bus(Bus::new("h", phase.clone(), BusKind::House))
            .unwrap();
        let z = SquareMatrix::diagonal(&[C64::new(0.01, 0.02)]);
        model
            .add_line(Line::new("l", phase, LineKind::Line, sub, house, z))
            .unwrap();
        model.sort_by_breadth_first_search().unwrap();
        let mut state = SlotState::new(&model);
        state.aggregates[1].power = ColumnVector::from_vec(vec![load]);
        (model, state)
    }

    #[test]
    fn test_zero_load_gives_flat_voltage() {
        let (model, mut state) = two_bus(C64::new(0.0, 0.0));
        let report = sweep(
            &model,
            &mut state,
            1.0,
            &GridConventions::default(),
            &SweepSettings::default(),
        );
        assert!(report.converged());
        assert!((state.voltages[1][0] - C64::new(1.0, 0.0)).norm() < 1e-12);
        assert!(state.substation_power()[0].norm() < 1e-12);
    }

    #[test]
    fn test_initialize_rotates_phases() {
        let mut model = NetworkModel::new();
        model
            .add_bus(Bus::new("sub", PhaseSet::abc(), BusKind::Substation))
            .unwrap();
        model.sort_by_breadth_first_search().unwrap();
        let mut state = SlotState::new(&model);
        initialize_voltages(&model, &mut state, 1.02, &GridConventions::default());
        for phase in 0..3 {
            assert!((state.voltages[0][phase].norm() - 1.02).abs() < 1e-12);
        }
        assert!(state.voltages[0][1].im < 0.0);
        assert_eq!(state.status, SweepStatus::VoltageInitialized);
    }

    #[test]
    fn test_iteration_cap_reported() {
        let (model, mut state) = two_bus(C64::new(0.5, 0.2));
        let report = sweep(
            &model,
            &mut state,
            1.0,
            &GridConventions::default(),
            &SweepSettings::default().with_max_iterations(1),
        );
        assert_eq!(report.iterations, 1);
        assert_eq!(report.status, SweepStatus::MaxIterations);
    }
}

//! # Gradient of the Barrier Objective
//!
//! The per-slot objective is
//!
//! ```text
//! f = Σ_p  quad·P_sub[p]² + lin·P_sub[p]
//!   − Σ_{constrained bus i, phase p}  μL·ln(|V_ip|² − Vmin²) + μU·ln(Vmax² − |V_ip|²)
//! ```
//!
//! Its derivative with respect to the power injected at every bus is obtained
//! with one extra backward and forward pass over the tree, linearized around
//! the nominal phasors `β[p] = exp(i·θ·(letter − 'a'))`:
//!
//! ```text
//!   price[p]     = 2·quad·Re(S_sub[p]) + lin              (root phases)
//!   sum_down(i)  = Re(conj(β)·(Y_i·β))·price_i
//!                  − μL/(|V_i|² − Vmin²) + μU/(Vmax² − |V_i|²)   (constrained only)
//!                  + Σ sum_down(children, aligned)           bus n-1 → 1
//!   sum_up(i)    = conj(β) ⊙ (Z_iᴴ·(β ⊙ sum_down(i)))
//!                  + sum_up(parent)[mapped]                  bus 1 → n-1, root = 0
//!   gradient(i)  = price_i − 2·conj(sum_up(i))
//! ```
//!
//! A device at bus `i` reads `Re(gradient)` as the marginal cost of real power
//! and `Im(gradient)` as the marginal cost of reactive power.

use dopf_core::{ColumnVector, DopfResult, GridConventions, NetworkModel, C64};

use super::types::{BarrierWeights, ObjectiveCoefficients, VoltageBounds};
use crate::power_flow::SlotState;

/// Per-bus phasor constants used by the gradient passes.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseGeometry {
    /// Nominal unit phasor of every phase of every bus
    pub beta: Vec<ColumnVector<C64>>,
    /// Position of each bus phase within the substation's phase set
    pub root_indices: Vec<Vec<usize>>,
}

impl PhaseGeometry {
    pub fn new(topology: &NetworkModel, conventions: &GridConventions) -> DopfResult<Self> {
        let Some(root) = topology.buses().first() else {
            return Ok(Self {
                beta: Vec::new(),
                root_indices: Vec::new(),
            });
        };
        let beta = topology
            .buses()
            .iter()
            .map(|bus| bus.phase.offsets().map(|k| conventions.rotation(k)).collect())
            .collect();
        let root_indices = topology
            .buses()
            .iter()
            .map(|bus| bus.phase.indices_in(&root.phase))
            .collect::<DopfResult<Vec<_>>>()?;
        Ok(Self { beta, root_indices })
    }
}

/// Everything besides the electrical state that the objective and its gradient depend on.
#[derive(Debug, Clone, Copy)]
pub struct BarrierProblem<'a> {
    pub geometry: &'a PhaseGeometry,
    /// Buses whose voltages carry barrier terms
    pub constrained: &'a [bool],
    pub bounds: VoltageBounds,
    pub barrier: BarrierWeights,
    pub coefficients: ObjectiveCoefficients,
}

/// Gradient pass outputs for one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientState {
    pub sum_down: Vec<ColumnVector<f64>>,
    pub sum_up: Vec<ColumnVector<C64>>,
    pub gradient: Vec<ColumnVector<C64>>,
}

impl GradientState {
    pub fn new(topology: &NetworkModel) -> Self {
        Self {
            sum_down: topology
                .buses()
                .iter()
                .map(|bus| ColumnVector::new(&bus.phase))
                .collect(),
            sum_up: topology
                .buses()
                .iter()
                .map(|bus| ColumnVector::new(&bus.phase))
                .collect(),
            gradient: topology
                .buses()
                .iter()
                .map(|bus| ColumnVector::new(&bus.phase))
                .collect(),
        }
    }
}

/// Marginal cost of real power at each substation phase.
pub fn marginal_price(state: &SlotState, coefficients: &ObjectiveCoefficients) -> Vec<f64> {
    state
        .substation_power()
        .iter()
        .map(|s| coefficients.marginal(s.re))
        .collect()
}

/// Run the sum-down, sum-up and gradient passes for one slot.
pub fn compute_gradient(
    topology: &NetworkModel,
    problem: &BarrierProblem<'_>,
    state: &SlotState,
    out: &mut GradientState,
) {
    let n = topology.num_buses();
    if n == 0 {
        return;
    }
    let root_price = marginal_price(state, &problem.coefficients);
    let price_at = |index: usize| -> Vec<f64> {
        problem.geometry.root_indices[index]
            .iter()
            .map(|&k| root_price[k])
            .collect()
    };
    let vmin_sq = problem.bounds.min * problem.bounds.min;
    let vmax_sq = problem.bounds.max * problem.bounds.max;

    for index in (1..n).rev() {
        let bus = &topology.buses()[index];
        let beta = &problem.geometry.beta[index];
        let price = price_at(index);
        let y_beta = state.aggregates[index].admittance.mul_vec(beta);

        let mut sum_down: ColumnVector<f64> = (0..beta.len())
            .map(|p| (beta[p].conj() * y_beta[p]).re * price[p])
            .collect();
        if problem.constrained[index] {
            for p in 0..sum_down.len() {
                let v_sq = state.voltages[index][p].norm_sqr();
                sum_down[p] -= problem.barrier.lower / (v_sq - vmin_sq);
                sum_down[p] += problem.barrier.upper / (vmax_sq - v_sq);
            }
        }
        for &line in bus.to_lines() {
            let child = topology.line(line).to.value();
            sum_down.add_to_indices(
                &out.sum_down[child],
                topology.buses()[child].phase_indices_in_parent(),
            );
        }
        out.sum_down[index] = sum_down;
    }

    out.sum_up[0].reset();
    for index in 1..n {
        let bus = &topology.buses()[index];
        let Some(line) = bus.from_line() else {
            continue;
        };
        let line = topology.line(line);
        let beta = &problem.geometry.beta[index];

        let weighted: ColumnVector<C64> = (0..beta.len())
            .map(|p| beta[p] * out.sum_down[index][p])
            .collect();
        let mut sum_up = line.impedance.hermitian().mul_vec(&weighted);
        for p in 0..sum_up.len() {
            sum_up[p] *= beta[p].conj();
        }
        let (upstream, rest) = out.sum_up.split_at_mut(index);
        sum_up.add_from_indices(&upstream[line.from.value()], bus.phase_indices_in_parent());
        rest[0] = sum_up;
    }

    for index in 1..n {
        let price = price_at(index);
        out.gradient[index] = out.sum_up[index]
            .iter()
            .zip(&price)
            .map(|(up, &price)| C64::new(price, 0.0) - up.conj() * 2.0)
            .collect();
    }
}

/// Substation cost minus the barrier terms of every constrained bus phase.
pub fn objective(problem: &BarrierProblem<'_>, state: &SlotState) -> f64 {
    let mut result: f64 = state
        .substation_power()
        .iter()
        .map(|s| problem.coefficients.cost(s.re))
        .sum();
    if problem.barrier.is_zero() {
        return result;
    }
    let vmin_sq = problem.bounds.min * problem.bounds.min;
    let vmax_sq = problem.bounds.max * problem.bounds.max;
    for (voltage, _) in state
        .voltages
        .iter()
        .zip(problem.constrained)
        .filter(|(_, &constrained)| constrained)
    {
        for v in voltage.iter() {
            let v_sq = v.norm_sqr();
            result -= problem.barrier.lower * (v_sq - vmin_sq).ln()
                + problem.barrier.upper * (vmax_sq - v_sq).ln();
        }
    }
    result
}

/// First constrained bus phase outside the bounds, as `(bus, phase, magnitude)`.
pub fn voltage_violation(
    state: &SlotState,
    constrained: &[bool],
    bounds: VoltageBounds,
) -> Option<(usize, usize, f64)> {
    state
        .voltages
        .iter()
        .enumerate()
        .filter(|(index, _)| constrained[*index])
        .find_map(|(index, voltage)| {
            voltage
                .magnitudes()
                .into_iter()
                .enumerate()
                .find(|(_, magnitude)| !bounds.contains(*magnitude))
                .map(|(phase, magnitude)| (index, phase, magnitude))
        })
}

/// Smallest and largest constrained voltage magnitude, seeded with `seed`.
pub fn voltage_extremes<'a>(
    states: impl IntoIterator<Item = &'a SlotState>,
    constrained: &[bool],
    seed: f64,
) -> (f64, f64) {
    let mut extremes = (seed, seed);
    for state in states {
        for (voltage, _) in state
            .voltages
            .iter()
            .zip(constrained)
            .filter(|(_, &constrained)| constrained)
        {
            for magnitude in voltage.magnitudes() {
                extremes.0 = extremes.0.min(magnitude);
                extremes.1 = extremes.1.max(magnitude);
            }
        }
    }
    extremes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power_flow::{sweep, SweepSettings};
    use dopf_core::{Bus, BusKind, Line, LineKind, PhaseSet, SquareMatrix};

    fn feeder() -> NetworkModel {
        let mut model = NetworkModel::new();
        let sub = model
            .add_bus(Bus::new("sub", PhaseSet::abc(), BusKind::Substation))
            .unwrap();
        let house = model
            .add_bus(Bus::new("h", "bc".parse().unwrap(), BusKind::House))
            .unwrap();
        let z = SquareMatrix::diagonal(&[C64::new(0.01, 0.02), C64::new(0.01, 0.02)]);
        model
            .add_line(Line::new("l", "bc".parse().unwrap(), LineKind::Line, sub, house, z))
            .unwrap();
        model.sort_by_breadth_first_search().unwrap();
        model
    }

    #[test]
    fn test_geometry_maps_into_root() {
        let model = feeder();
        let geometry = PhaseGeometry::new(&model, &GridConventions::default()).unwrap();
        assert_eq!(geometry.root_indices[1], vec![1, 2]);
        assert!((geometry.beta[1][0] - GridConventions::default().rotation(1)).norm() < 1e-15);
    }

    #[test]
    fn test_no_load_gradient_equals_price() {
        let model = feeder();
        let conventions = GridConventions::default();
        let mut state = SlotState::new(&model);
        sweep(&model, &mut state, 1.0, &conventions, &SweepSettings::default());
        let geometry = PhaseGeometry::new(&model, &conventions).unwrap();
        let constrained = vec![false, false];
        let problem = BarrierProblem {
            geometry: &geometry,
            constrained: &constrained,
            bounds: VoltageBounds::new(0.95, 1.05),
            barrier: BarrierWeights::default(),
            coefficients: ObjectiveCoefficients {
                quadratic: 0.0,
                linear: 1.0,
            },
        };
        let mut out = GradientState::new(&model);
        compute_gradient(&model, &problem, &state, &mut out);
        // with no admittance and no barrier, sum_down is zero
        for g in out.gradient[1].iter() {
            assert!((g - C64::new(1.0, 0.0)).norm() < 1e-12);
        }
    }

    #[test]
    fn test_violation_and_extremes() {
        let model = feeder();
        let mut state = SlotState::new(&model);
        state.voltages[1] = ColumnVector::from_vec(vec![C64::new(0.94, 0.0), C64::new(1.0, 0.0)]);
        let constrained = vec![false, true];
        let bounds = VoltageBounds::new(0.95, 1.05);
        assert_eq!(voltage_violation(&state, &constrained, bounds), Some((1, 0, 0.94)));
        let (min, max) = voltage_extremes([&state], &constrained, 1.0);
        assert_eq!(min, 0.94);
        assert_eq!(max, 1.0);
    }
}

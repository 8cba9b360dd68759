//! # Network Control Loop
//!
//! [`NetworkControl`] shadows the controllable loads of a [`NetworkModel`]
//! over a horizon of equally long slots and drives them with a projected
//! gradient method on a log-barrier relaxation of the voltage limits.
//!
//! ## Outer loop
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │ slow mode only: shift V_sub so the observed voltage band fits     │
//! ├───────────────────────────────────────────────────────────────────┤
//! │ feasibility: while some constrained voltage is outside the box    │
//! │   widen the box past the observed extremes                        │
//! │   run the inner loop with μ = 1                                   │
//! │ (give up after `feasibility_iterations` rounds → Infeasible)      │
//! ├───────────────────────────────────────────────────────────────────┤
//! │ annealing: inner loop for every μ of the schedule                 │
//! ├───────────────────────────────────────────────────────────────────┤
//! │ report the slot-0 objective without barrier terms                 │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Inner loop
//!
//! Starting from the committed state, compute the gradient of every slot and
//! search along it with a backtracking line search:
//!
//! 1. attempt a step of size `t` on every enabled device, re-aggregate and
//!    sweep;
//! 2. a voltage outside the box halves `t` (by `alpha`);
//! 3. a power update below `epsilon` ends the loop, keeping the attempt only
//!    if it improved the objective;
//! 4. an objective above `old + beta·expected` also backs off;
//! 5. otherwise the attempt is committed and a new gradient is taken.
//!
//! Both the number of accepted steps and the number of backtracks per line
//! search are capped; hitting either cap leaves the last committed state in
//! place and reports [`InnerStatus::IterationLimit`].

use std::ops::Range;

use dopf_core::{
    norm, BusId, ColumnVector, DeviceKind, DopfResult, GridConventions, Load, LoadId, LoadType,
    LoadValue, NetworkModel, C64,
};
use tracing::{debug, info, warn};

use super::devices::{ChargingWindow, LoadController};
use super::gradient::{
    compute_gradient, objective, voltage_extremes, voltage_violation, BarrierProblem,
    GradientState, PhaseGeometry,
};
use super::types::{
    BarrierWeights, ControlMode, ControlOutcome, ControlReport, ControlSettings, EnabledKinds,
    InnerReport, InnerStatus, ObjectiveCoefficients, VoltageBounds,
};
use crate::power_flow::{initialize_voltages, sweep, SlotState, SweepReport};

/// Electrical and gradient state of one slot of the horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSlot {
    pub flow: SlotState,
    /// Aggregates as of the last commit; the substation entry holds the committed injection
    pub old_aggregates: Vec<LoadValue>,
    pub gradient: GradientState,
}

impl ControlSlot {
    pub fn new(topology: &NetworkModel) -> Self {
        let flow = SlotState::new(topology);
        Self {
            old_aggregates: flow.aggregates.clone(),
            gradient: GradientState::new(topology),
            flow,
        }
    }
}

/// Gradient-based controller for the loads of one feeder.
///
/// The controller does not own the network: every operation takes the
/// sorted model it acts on. Handles stay valid because the controller keys
/// its devices by [`LoadId`].
#[derive(Debug, Clone)]
pub struct NetworkControl {
    num_slots: usize,
    /// Slot length in minutes
    slot_length: f64,
    settings: ControlSettings,
    conventions: GridConventions,
    coefficients: ObjectiveCoefficients,
    fast_kinds: EnabledKinds,
    slow_kinds: EnabledKinds,
    geometry: PhaseGeometry,
    constrained: Vec<bool>,
    bounds: VoltageBounds,
    substation_voltage: f64,
    slots: Vec<ControlSlot>,
    loads: Vec<Option<LoadController>>,
}

impl NetworkControl {
    /// Controller over `num_slots` slots of `slot_length` minutes each.
    pub fn new(model: &NetworkModel, num_slots: usize, slot_length: f64) -> DopfResult<Self> {
        let conventions = GridConventions::default();
        let num_slots = num_slots.max(1);
        let mut control = Self {
            num_slots,
            slot_length,
            settings: ControlSettings::default(),
            bounds: VoltageBounds::new(conventions.house_voltage_min, conventions.house_voltage_max),
            substation_voltage: conventions.substation_voltage,
            geometry: PhaseGeometry::new(model, &conventions)?,
            conventions,
            coefficients: ObjectiveCoefficients::default(),
            fast_kinds: [LoadType::PhotoVoltaic].into_iter().collect(),
            slow_kinds: [LoadType::PhotoVoltaic, LoadType::ElectricVehicle]
                .into_iter()
                .collect(),
            constrained: Vec::new(),
            slots: Vec::new(),
            loads: Vec::new(),
        };
        control.sync_topology(model)?;
        Ok(control)
    }

    pub fn with_settings(mut self, settings: ControlSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_conventions(mut self, conventions: GridConventions) -> Self {
        self.bounds = VoltageBounds::new(conventions.house_voltage_min, conventions.house_voltage_max);
        self.conventions = conventions;
        self
    }

    pub fn with_objective(mut self, coefficients: ObjectiveCoefficients) -> Self {
        self.coefficients = coefficients;
        self
    }

    /// Device kinds the given mode may move.
    pub fn with_enabled_kinds(mut self, mode: ControlMode, kinds: EnabledKinds) -> Self {
        match mode {
            ControlMode::Fast => self.fast_kinds = kinds,
            ControlMode::Slow => self.slow_kinds = kinds,
        }
        self
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn slot_length(&self) -> f64 {
        self.slot_length
    }

    pub fn substation_voltage(&self) -> f64 {
        self.substation_voltage
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    pub fn slots(&self) -> &[ControlSlot] {
        &self.slots
    }

    /// Substation injection per phase for every slot of the horizon.
    pub fn substation_horizon(&self) -> Vec<ColumnVector<C64>> {
        self.slots
            .iter()
            .map(|slot| slot.flow.substation_power().clone())
            .collect()
    }

    /// Per-bus voltage magnitudes of one slot.
    pub fn voltage_magnitudes(&self, slot: usize) -> Vec<Vec<f64>> {
        self.slots
            .get(slot)
            .map(|slot| slot.flow.voltages.iter().map(|v| v.magnitudes()).collect())
            .unwrap_or_default()
    }

    pub fn load_controller(&self, id: LoadId) -> Option<&LoadController> {
        self.loads.get(id.value()).and_then(Option::as_ref)
    }

    pub fn load_controllers(&self) -> impl Iterator<Item = &LoadController> {
        self.loads.iter().flatten()
    }

    /// Horizon values of a load, for the predictor to fill before slow control.
    pub fn load_values_mut(&mut self, id: LoadId) -> Option<&mut [LoadValue]> {
        self.loads
            .get_mut(id.value())
            .and_then(Option::as_mut)
            .map(|load| load.values.as_mut_slice())
    }

    /// Charging rate per slot of an electric vehicle.
    pub fn charging_schedule(&self, id: LoadId) -> Option<Vec<f64>> {
        self.load_controller(id)
            .filter(|load| load.load_type() == LoadType::ElectricVehicle)
            .map(LoadController::charging_schedule)
    }

    /// Start shadowing a load that was just attached to the model.
    pub fn add_load(&mut self, id: LoadId, load: &Load) {
        if self.loads.len() <= id.value() {
            self.loads.resize(id.value() + 1, None);
        }
        self.loads[id.value()] = Some(LoadController::new(id, load, self.num_slots));
    }

    pub fn delete_load(&mut self, id: LoadId) -> Option<LoadController> {
        self.loads.get_mut(id.value()).and_then(Option::take)
    }

    /// Rebuild per-bus constants and bring the load set in line with the model.
    fn sync_topology(&mut self, model: &NetworkModel) -> DopfResult<()> {
        model.substation()?;
        self.geometry = PhaseGeometry::new(model, &self.conventions)?;
        self.constrained = model
            .buses()
            .iter()
            .map(|bus| bus.is_voltage_constrained())
            .collect();
        let shape_changed = self.slots.len() != self.num_slots
            || self
                .slots
                .first()
                .map_or(true, |slot| slot.flow.voltages.len() != model.num_buses());
        if shape_changed {
            self.slots = (0..self.num_slots).map(|_| ControlSlot::new(model)).collect();
        }
        self.sync_loads(model);
        Ok(())
    }

    fn sync_loads(&mut self, model: &NetworkModel) {
        if self.loads.len() < model.load_capacity() {
            self.loads.resize(model.load_capacity(), None);
        }
        for (index, entry) in self.loads.iter_mut().enumerate() {
            let id = LoadId::new(index);
            let Some(load) = model.load(id) else {
                if let Some(stale) = entry.take() {
                    warn!(load = %stale.name, "dropping controller for a load no longer in the model");
                }
                continue;
            };
            match entry {
                Some(shadow) if shadow.name == load.name => {
                    shadow.kind = load.kind.clone();
                    shadow.bus = load.location;
                    shadow.phase_indices = load.phase_indices_in_location_bus().to_vec();
                }
                _ => *entry = Some(LoadController::new(id, load, self.num_slots)),
            }
        }
    }

    /// Magnitude of the model's substation voltage, falling back to the
    /// configured set point when the model has not been solved yet.
    fn model_substation_voltage(&self, model: &NetworkModel) -> DopfResult<f64> {
        let magnitude = model
            .substation()?
            .voltage
            .iter()
            .next()
            .map_or(0.0, |v| v.norm());
        Ok(if magnitude < self.conventions.reinit_threshold {
            model.substation_voltage
        } else {
            magnitude
        })
    }

    fn slot_range(&self, mode: ControlMode) -> Range<usize> {
        match mode {
            ControlMode::Fast => 0..1,
            ControlMode::Slow => 0..self.num_slots,
        }
    }

    fn enabled_kinds(&self, mode: ControlMode) -> &EnabledKinds {
        match mode {
            ControlMode::Fast => &self.fast_kinds,
            ControlMode::Slow => &self.slow_kinds,
        }
    }

    /// Slot-0 state from the model's current load values.
    pub fn initialize_fast(&mut self, model: &NetworkModel) -> DopfResult<()> {
        self.sync_topology(model)?;
        self.substation_voltage = self.model_substation_voltage(model)?;
        initialize_voltages(
            model,
            &mut self.slots[0].flow,
            self.substation_voltage,
            &self.conventions,
        );
        for shadow in self.loads.iter_mut().flatten() {
            if let Some(load) = model.load(shadow.id) {
                shadow.values[0] = load.value.clone();
                shadow.old_values[0] = load.value.clone();
            }
        }
        self.aggregate(model, 0);
        self.slots[0].old_aggregates = self.slots[0].flow.aggregates.clone();
        self.sweep_slot(model, 0);
        self.slots[0].old_aggregates[0] = self.slots[0].flow.aggregates[0].clone();
        Ok(())
    }

    /// Horizon state from the predicted load values, starting at `time` minutes.
    pub fn initialize_slow(&mut self, model: &NetworkModel, time: f64) -> DopfResult<()> {
        self.sync_topology(model)?;
        self.substation_voltage = self.model_substation_voltage(model)?;
        for slot in &mut self.slots {
            initialize_voltages(model, &mut slot.flow, self.substation_voltage, &self.conventions);
        }
        for shadow in self.loads.iter_mut().flatten() {
            shadow.old_values = shadow.values.clone();
            if let DeviceKind::ElectricVehicle(ev) = &shadow.kind {
                shadow.window =
                    ChargingWindow::from_times(ev.plug_in_time, ev.deadline, time, self.slot_length);
            }
        }
        for slot in 0..self.num_slots {
            self.aggregate(model, slot);
            self.slots[slot].old_aggregates = self.slots[slot].flow.aggregates.clone();
            self.sweep_slot(model, slot);
            self.slots[slot].old_aggregates[0] = self.slots[slot].flow.aggregates[0].clone();
        }
        Ok(())
    }

    /// Optimize slot 0 against the model's present loads and write the result back.
    pub fn fast_control(&mut self, model: &mut NetworkModel) -> DopfResult<ControlReport> {
        self.initialize_fast(model)?;
        let report = self.optimize(model, ControlMode::Fast);
        if report.is_optimized() {
            self.apply(model);
        }
        Ok(report)
    }

    /// Optimize the whole horizon starting at `time` and write slot 0 back.
    pub fn slow_control(&mut self, model: &mut NetworkModel, time: f64) -> DopfResult<ControlReport> {
        self.initialize_slow(model, time)?;
        let report = self.optimize(model, ControlMode::Slow);
        if report.is_optimized() {
            self.apply(model);
        }
        Ok(report)
    }

    /// Run the outer loop on already initialized state.
    pub fn optimize(&mut self, topology: &NetworkModel, mode: ControlMode) -> ControlReport {
        let configured = VoltageBounds::new(
            self.conventions.house_voltage_min,
            self.conventions.house_voltage_max,
        );
        self.bounds = configured;
        if mode == ControlMode::Slow {
            self.shift_substation_voltage(topology, configured);
        }
        let mut report = ControlReport::new(mode, self.substation_voltage);
        let range = self.slot_range(mode);

        let mut round = 0;
        loop {
            let (low, high) = voltage_extremes(
                self.slots[range.clone()].iter().map(|slot| &slot.flow),
                &self.constrained,
                self.substation_voltage,
            );
            if configured.contains(low) && configured.contains(high) {
                self.bounds = configured;
                break;
            }
            if round == self.settings.feasibility_iterations {
                self.bounds = configured;
                warn!(
                    %mode,
                    rounds = round,
                    low,
                    high,
                    "no feasible starting point within the widening budget"
                );
                report.outcome = ControlOutcome::Infeasible;
                report.feasibility_rounds = round;
                return report;
            }
            self.bounds = VoltageBounds::new(
                (low - self.settings.feasibility_widen).min(configured.min),
                (high + self.settings.feasibility_widen).max(configured.max),
            );
            debug!(round, min = self.bounds.min, max = self.bounds.max, "widened voltage bounds");
            let inner = self.inner_loop(topology, mode, BarrierWeights::uniform(1.0));
            report.inner.push(inner);
            round += 1;
        }
        report.feasibility_rounds = round;

        for mu in self.settings.annealing_schedule(topology.num_buses()) {
            let inner = self.inner_loop(topology, mode, BarrierWeights::uniform(mu));
            report.inner.push(inner);
        }

        report.objective = self.slot_objective(0, BarrierWeights::default());
        report.substation_voltage = self.substation_voltage;
        info!(%mode, objective = report.objective, "control finished");
        report
    }

    /// Move the substation set point so the observed voltage band lands inside the box.
    fn shift_substation_voltage(&mut self, topology: &NetworkModel, configured: VoltageBounds) {
        let (low, high) = voltage_extremes(
            self.slots.iter().map(|slot| &slot.flow),
            &self.constrained,
            self.substation_voltage,
        );
        if configured.contains(low) && configured.contains(high) {
            return;
        }
        let margin = (configured.max - configured.min) - (high - low);
        if margin <= 0.0 {
            warn!(low, high, "voltage spread exceeds the allowed band; substation not shifted");
            return;
        }
        let headroom = if margin > 0.01 { 0.005 } else { margin / 2.0 };
        self.substation_voltage += configured.min - low + headroom;
        info!(
            substation_voltage = self.substation_voltage,
            "shifted substation voltage"
        );
        for index in 0..self.num_slots {
            let slot = &mut self.slots[index];
            initialize_voltages(topology, &mut slot.flow, self.substation_voltage, &self.conventions);
            self.sweep_slot(topology, index);
            let slot = &mut self.slots[index];
            slot.old_aggregates[0] = slot.flow.aggregates[0].clone();
        }
    }

    /// Backtracking gradient descent at a fixed barrier weight.
    pub fn inner_loop(
        &mut self,
        topology: &NetworkModel,
        mode: ControlMode,
        barrier: BarrierWeights,
    ) -> InnerReport {
        let range = self.slot_range(mode);
        let mut report = InnerReport {
            status: InnerStatus::Converged,
            mu: barrier.lower,
            steps: 0,
            backtracks: 0,
            objective: 0.0,
            committed: Vec::new(),
        };
        // committed points stay inside the bounds, so only the start is checked
        if let Some((bus, phase, magnitude)) = self.first_violation(range.clone()) {
            warn!(
                bus = %topology.buses()[bus].name,
                phase,
                magnitude,
                "inner loop started outside the voltage bounds"
            );
            report.status = InnerStatus::Infeasible;
            return report;
        }

        let mut old_objective = self.horizon_objective(range.clone(), barrier);
        report.committed.push(old_objective);
        'descent: loop {
            self.compute_gradients(topology, range.clone(), barrier);
            let mut step = 1.0;
            let mut backtracks = 0;
            loop {
                if backtracks > self.settings.max_backtracks {
                    self.reset(topology, mode);
                    report.status = InnerStatus::IterationLimit;
                    break 'descent;
                }
                self.attempt(topology, mode, step);
                for slot in range.clone() {
                    self.aggregate(topology, slot);
                    self.sweep_slot(topology, slot);
                }

                if self.first_violation(range.clone()).is_some() {
                    step *= self.settings.alpha;
                    backtracks += 1;
                    report.backtracks += 1;
                    continue;
                }

                let new_objective = self.horizon_objective(range.clone(), barrier);
                if self.update_size(range.clone()) < self.settings.epsilon {
                    if new_objective < old_objective {
                        self.commit(mode);
                        old_objective = new_objective;
                        report.committed.push(old_objective);
                    } else {
                        self.reset(topology, mode);
                    }
                    report.status = InnerStatus::Converged;
                    break 'descent;
                }

                let expected = self.expected_change(range.clone());
                if new_objective > old_objective + self.settings.beta * expected {
                    step *= self.settings.alpha;
                    backtracks += 1;
                    report.backtracks += 1;
                    continue;
                }

                self.commit(mode);
                old_objective = new_objective;
                report.committed.push(old_objective);
                report.steps += 1;
                break;
            }
            if report.steps >= self.settings.max_inner_steps {
                report.status = InnerStatus::IterationLimit;
                break;
            }
        }

        report.objective = old_objective;
        debug!(
            mu = report.mu,
            steps = report.steps,
            backtracks = report.backtracks,
            objective = report.objective,
            status = ?report.status,
            "inner loop finished"
        );
        report
    }

    /// Write slot-0 load values, bus voltages and the set point into the model.
    pub fn apply(&self, model: &mut NetworkModel) {
        for shadow in self.loads.iter().flatten() {
            if let Some(load) = model.load_mut(shadow.id) {
                load.value = shadow.values[0].clone();
            }
        }
        if let Some(slot) = self.slots.first() {
            for (index, voltage) in slot.flow.voltages.iter().enumerate().take(model.num_buses()) {
                model.bus_mut(BusId::new(index)).voltage = voltage.clone();
            }
        }
        model.substation_voltage = self.substation_voltage;
    }

    /// Objective of one slot at the active bounds.
    pub fn slot_objective(&self, slot: usize, barrier: BarrierWeights) -> f64 {
        let problem = BarrierProblem {
            geometry: &self.geometry,
            constrained: &self.constrained,
            bounds: self.bounds,
            barrier,
            coefficients: self.coefficients,
        };
        objective(&problem, &self.slots[slot].flow)
    }

    fn horizon_objective(&self, range: Range<usize>, barrier: BarrierWeights) -> f64 {
        range.map(|slot| self.slot_objective(slot, barrier)).sum()
    }

    fn compute_gradients(&mut self, topology: &NetworkModel, range: Range<usize>, barrier: BarrierWeights) {
        let problem = BarrierProblem {
            geometry: &self.geometry,
            constrained: &self.constrained,
            bounds: self.bounds,
            barrier,
            coefficients: self.coefficients,
        };
        for slot in &mut self.slots[range] {
            compute_gradient(topology, &problem, &slot.flow, &mut slot.gradient);
        }
    }

    fn first_violation(&self, range: Range<usize>) -> Option<(usize, usize, f64)> {
        self.slots[range]
            .iter()
            .find_map(|slot| voltage_violation(&slot.flow, &self.constrained, self.bounds))
    }

    /// Shunt plus the attempted values of every shadowed load, per non-root bus.
    fn aggregate(&mut self, topology: &NetworkModel, slot: usize) {
        let aggregates = &mut self.slots[slot].flow.aggregates;
        for (index, bus) in topology.buses().iter().enumerate().skip(1) {
            aggregates[index] = LoadValue {
                admittance: bus.shunt.clone(),
                power: ColumnVector::new(&bus.phase),
            };
        }
        for shadow in self.loads.iter().flatten() {
            let bus = shadow.bus.value();
            if bus == 0 {
                continue;
            }
            aggregates[bus].add_to_indices(&shadow.values[slot], &shadow.phase_indices);
        }
    }

    fn sweep_slot(&mut self, topology: &NetworkModel, slot: usize) -> SweepReport {
        let report = sweep(
            topology,
            &mut self.slots[slot].flow,
            self.substation_voltage,
            &self.conventions,
            &self.settings.sweep,
        );
        if !report.converged() {
            debug!(slot, max_update = report.max_update, "slot sweep hit the iteration cap");
        }
        report
    }

    fn attempt(&mut self, topology: &NetworkModel, mode: ControlMode, step: f64) {
        let kinds = match mode {
            ControlMode::Fast => &self.fast_kinds,
            ControlMode::Slow => &self.slow_kinds,
        };
        let slots = &self.slots;
        for shadow in self.loads.iter_mut().flatten() {
            let bus = shadow.bus.value();
            if bus == 0 || bus >= topology.num_buses() || !kinds.contains(shadow.load_type()) {
                continue;
            }
            match mode {
                ControlMode::Fast => shadow.attempt_at(0, step, &slots[0].gradient.gradient[bus]),
                ControlMode::Slow => {
                    let gradients: Vec<&ColumnVector<C64>> = slots
                        .iter()
                        .map(|slot| &slot.gradient.gradient[bus])
                        .collect();
                    shadow.attempt_over_horizon(step, &gradients, self.slot_length);
                }
            }
        }
    }

    /// Keep the attempted values of the enabled devices.
    fn commit(&mut self, mode: ControlMode) {
        let range = self.slot_range(mode);
        let kinds = self.enabled_kinds(mode).clone();
        for shadow in self.loads.iter_mut().flatten() {
            if kinds.contains(shadow.load_type()) {
                shadow.commit(range.clone());
            }
        }
        for slot in &mut self.slots[range] {
            slot.old_aggregates = slot.flow.aggregates.clone();
        }
    }

    /// Return the enabled devices to their committed values and re-solve.
    fn reset(&mut self, topology: &NetworkModel, mode: ControlMode) {
        let range = self.slot_range(mode);
        let kinds = self.enabled_kinds(mode).clone();
        for shadow in self.loads.iter_mut().flatten() {
            if kinds.contains(shadow.load_type()) {
                shadow.reset(range.clone());
            }
        }
        for slot in range {
            self.aggregate(topology, slot);
            self.sweep_slot(topology, slot);
        }
    }

    /// Largest squared-norm change of any aggregate injection since the last commit.
    fn update_size(&self, range: Range<usize>) -> f64 {
        self.slots[range]
            .iter()
            .flat_map(|slot| {
                slot.flow
                    .aggregates
                    .iter()
                    .zip(&slot.old_aggregates)
                    .map(|(new, old)| norm(&(&new.power - &old.power)))
            })
            .fold(0.0, f64::max)
    }

    fn expected_change(&self, range: Range<usize>) -> f64 {
        let mut expected = 0.0;
        for shadow in self.loads.iter().flatten() {
            let bus = shadow.bus.value();
            if bus == 0 {
                continue;
            }
            for slot in range.clone() {
                expected += shadow.expected_change_at(slot, &self.slots[slot].gradient.gradient[bus]);
            }
        }
        expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dopf_core::{Bus, BusKind, Line, LineKind, PhaseSet, SquareMatrix};

    fn pv_feeder(pv_output: f64) -> (NetworkModel, LoadId) {
        let mut model = NetworkModel::new();
        let a = PhaseSet::parse("a").unwrap();
        let sub = model
            .add_bus(Bus::new("sub", a.clone(), BusKind::Substation))
            .unwrap();
        let house = model.add_bus(Bus::new("h", a.clone(), BusKind::House)).unwrap();
        let z = SquareMatrix::diagonal(&[C64::new(0.05, 0.05)]);
        model
            .add_line(Line::new("l", a.clone(), LineKind::Line, sub, house, z))
            .unwrap();
        model.sort_by_breadth_first_search().unwrap();
        let house = model.bus_id("h").unwrap();
        model
            .add_load(
                Load::new("base", a.clone(), DeviceKind::BaseLoad, house).with_value(
                    LoadValue::from_power(ColumnVector::from_vec(vec![C64::new(0.3, 0.1)])),
                ),
            )
            .unwrap();
        let pv = model
            .add_load(
                Load::new("pv", a, DeviceKind::PhotoVoltaic { nameplate: 0.5 }, house).with_value(
                    LoadValue::from_power(ColumnVector::from_vec(vec![C64::new(-pv_output, 0.0)])),
                ),
            )
            .unwrap();
        (model, pv)
    }

    #[test]
    fn test_fast_control_respects_inverter_rating() {
        let (mut model, pv) = pv_feeder(0.3);
        let mut control = NetworkControl::new(&model, 1, 5.0).unwrap();
        let report = control.fast_control(&mut model).unwrap();
        assert!(report.is_optimized());
        let value = &model.load(pv).unwrap().value.power[0];
        assert!((value.re + 0.3).abs() < 1e-12);
        assert!(value.im.abs() <= 0.4 + 1e-9);
    }

    #[test]
    fn test_fast_control_does_not_increase_cost() {
        let (mut model, _) = pv_feeder(0.1);
        let mut control = NetworkControl::new(&model, 1, 5.0)
            .unwrap()
            .with_settings(ControlSettings::default().with_mu_schedule(vec![0.0]));
        control.initialize_fast(&model).unwrap();
        let before = control.slot_objective(0, BarrierWeights::default());
        let report = control.fast_control(&mut model).unwrap();
        assert!(report.is_optimized());
        assert!(report.objective <= before + 1e-12);
    }

    #[test]
    fn test_sync_drops_deleted_loads() {
        let (mut model, pv) = pv_feeder(0.2);
        let mut control = NetworkControl::new(&model, 2, 15.0).unwrap();
        assert!(control.load_controller(pv).is_some());
        model.delete_load(pv);
        control.initialize_fast(&model).unwrap();
        assert!(control.load_controller(pv).is_none());
        assert_eq!(control.load_controllers().count(), 1);
    }

    #[test]
    fn test_infeasible_when_voltage_cannot_recover() {
        let (mut model, _) = pv_feeder(0.2);
        let mut control = NetworkControl::new(&model, 1, 5.0)
            .unwrap()
            .with_conventions(GridConventions {
                house_voltage_min: 1.2,
                house_voltage_max: 1.3,
                ..GridConventions::default()
            })
            .with_settings(ControlSettings {
                feasibility_iterations: 2,
                ..ControlSettings::default()
            });
        let report = control.fast_control(&mut model).unwrap();
        assert_eq!(report.outcome, ControlOutcome::Infeasible);
        assert_eq!(report.objective, 0.0);
        assert_eq!(report.feasibility_rounds, 2);
    }
}

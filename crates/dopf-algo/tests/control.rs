//! Gradient and control-loop tests

use dopf_algo::opf::{
    compute_gradient, objective, BarrierProblem, BarrierWeights, ControlMode, ControlSettings,
    GradientState, InnerReport, InnerStatus, NetworkControl, ObjectiveCoefficients, PhaseGeometry,
    VoltageBounds,
};
use dopf_algo::power_flow::{sweep, SlotState, SweepSettings};
use dopf_core::{
    Bus, BusKind, ColumnVector, DeviceKind, ElectricVehicle, GridConventions, Line, LineKind,
    Load, LoadId, LoadValue, NetworkModel, PhaseSet, SquareMatrix, C64,
};

fn constant_power(s: C64) -> LoadValue {
    LoadValue::from_power(ColumnVector::from_vec(vec![s]))
}

/// Single-phase substation feeding one house over `z`.
fn create_2bus_feeder(z: C64) -> NetworkModel {
    let mut model = NetworkModel::new();
    let a = PhaseSet::parse("a").unwrap();
    let sub = model
        .add_bus(Bus::new("sub", a.clone(), BusKind::Substation))
        .unwrap();
    let house = model.add_bus(Bus::new("house", a.clone(), BusKind::House)).unwrap();
    model
        .add_line(Line::new(
            "feeder",
            a,
            LineKind::Line,
            sub,
            house,
            SquareMatrix::diagonal(&[z]),
        ))
        .unwrap();
    model.sort_by_breadth_first_search().unwrap();
    model
}

fn with_base_load(mut model: NetworkModel, s: C64) -> (NetworkModel, LoadId) {
    let house = model.bus_id("house").unwrap();
    let id = model
        .add_load(
            Load::new("base", PhaseSet::parse("a").unwrap(), DeviceKind::BaseLoad, house)
                .with_value(constant_power(s)),
        )
        .unwrap();
    (model, id)
}

fn solved_state(model: &mut NetworkModel) -> SlotState {
    model.compute_aggregate_loads();
    let mut state = SlotState::from_model(model);
    let settings = SweepSettings::default()
        .with_tolerance(1e-24)
        .with_max_iterations(200);
    sweep(model, &mut state, 1.0, &GridConventions::default(), &settings);
    state
}

/// Objective and gradient at the house for a given load.
fn evaluate(
    s: C64,
    coefficients: ObjectiveCoefficients,
    barrier: BarrierWeights,
) -> (f64, C64) {
    let (mut model, _) = with_base_load(create_2bus_feeder(C64::new(0.02, 0.04)), s);
    let state = solved_state(&mut model);
    let geometry = PhaseGeometry::new(&model, &GridConventions::default()).unwrap();
    let constrained = vec![false, true];
    let problem = BarrierProblem {
        geometry: &geometry,
        constrained: &constrained,
        bounds: VoltageBounds::new(0.9, 1.1),
        barrier,
        coefficients,
    };
    let mut out = GradientState::new(&model);
    compute_gradient(&model, &problem, &state, &mut out);
    (objective(&problem, &state), out.gradient[1][0])
}

#[test]
fn test_barrier_gradient_matches_finite_differences() {
    let coefficients = ObjectiveCoefficients {
        quadratic: 0.0,
        linear: 0.0,
    };
    let barrier = BarrierWeights::uniform(0.01);
    let s = C64::new(0.2, 0.1);
    let h = 1e-4;
    let (_, gradient) = evaluate(s, coefficients, barrier);

    let dp = (evaluate(s + C64::new(h, 0.0), coefficients, barrier).0
        - evaluate(s - C64::new(h, 0.0), coefficients, barrier).0)
        / (2.0 * h);
    let dq = (evaluate(s + C64::new(0.0, h), coefficients, barrier).0
        - evaluate(s - C64::new(0.0, h), coefficients, barrier).0)
        / (2.0 * h);

    assert!(
        (gradient.re - dp).abs() < 0.05 * dp.abs() + 1e-7,
        "dP: gradient {} vs finite difference {}",
        gradient.re,
        dp
    );
    assert!(
        (gradient.im - dq).abs() < 0.05 * dq.abs() + 1e-7,
        "dQ: gradient {} vs finite difference {}",
        gradient.im,
        dq
    );
}

#[test]
fn test_price_gradient_matches_finite_differences() {
    let coefficients = ObjectiveCoefficients {
        quadratic: 0.0,
        linear: 1.0,
    };
    let barrier = BarrierWeights::default();
    let s = C64::new(0.2, 0.1);
    let h = 1e-4;
    let (_, gradient) = evaluate(s, coefficients, barrier);
    let dp = (evaluate(s + C64::new(h, 0.0), coefficients, barrier).0
        - evaluate(s - C64::new(h, 0.0), coefficients, barrier).0)
        / (2.0 * h);
    assert!((gradient.re - 1.0).abs() < 1e-12);
    // the linearization leaves out marginal losses
    assert!((gradient.re - dp).abs() < 0.02, "finite difference {}", dp);
}

#[test]
fn test_inner_loop_never_increases_committed_objective() {
    let (mut model, _) = with_base_load(create_2bus_feeder(C64::new(0.03, 0.06)), C64::new(0.4, 0.1));
    let house = model.bus_id("house").unwrap();
    model
        .add_load(
            Load::new(
                "pv",
                PhaseSet::parse("a").unwrap(),
                DeviceKind::PhotoVoltaic { nameplate: 0.4 },
                house,
            )
            .with_value(constant_power(C64::new(-0.2, 0.0))),
        )
        .unwrap();

    let mut control = NetworkControl::new(&model, 1, 5.0).unwrap();
    control.initialize_fast(&model).unwrap();
    for mu in [0.5, 0.05, 0.005] {
        let barrier = BarrierWeights::uniform(mu);
        let before = control.slot_objective(0, barrier);
        let report = control.inner_loop(&model, ControlMode::Fast, barrier);
        assert_ne!(report.status, InnerStatus::Infeasible);
        assert_eq!(report.committed.first().copied(), Some(before));
        assert_eq!(report.committed.last().copied(), Some(report.objective));
        assert_committed_objective_non_increasing(&report);
    }
}

fn assert_committed_objective_non_increasing(report: &InnerReport) {
    for (step, pair) in report.committed.windows(2).enumerate() {
        assert!(
            pair[1] <= pair[0] + 1e-12,
            "mu {}: commit {} raised the objective from {} to {}",
            report.mu,
            step + 1,
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn test_slow_control_moves_charging_into_valley() {
    let (mut model, base) =
        with_base_load(create_2bus_feeder(C64::new(0.01, 0.02)), C64::new(0.3, 0.05));
    let house = model.bus_id("house").unwrap();
    let ev = model
        .add_load(Load::new(
            "ev",
            PhaseSet::parse("a").unwrap(),
            DeviceKind::ElectricVehicle(ElectricVehicle {
                max_charging_rate: 0.1,
                future_energy_request: 0.05,
                plug_in_time: 0.0,
                deadline: 60.0,
            }),
            house,
        ))
        .unwrap();

    let mut control = NetworkControl::new(&model, 4, 15.0)
        .unwrap()
        .with_settings(ControlSettings::default().with_mu_schedule(vec![1e-3, 1e-4]));
    let profile = [0.3, 0.3, 0.05, 0.05];
    for (slot, value) in control.load_values_mut(base).unwrap().iter_mut().enumerate() {
        *value = constant_power(C64::new(profile[slot], 0.05));
    }
    for value in control.load_values_mut(ev).unwrap().iter_mut() {
        *value = constant_power(C64::new(0.05, 0.0));
    }

    let report = control.slow_control(&mut model, 0.0).unwrap();
    assert!(report.is_optimized());
    for inner in &report.inner {
        assert_committed_objective_non_increasing(inner);
    }

    let schedule = control.charging_schedule(ev).unwrap();
    assert_eq!(schedule.len(), 4);
    let total: f64 = schedule.iter().sum();
    assert!((total - 0.2).abs() < 1e-3, "delivered {}", total);
    assert!(schedule.iter().all(|&rate| (-1e-12..=0.1 + 1e-12).contains(&rate)));
    assert!(schedule[2] + schedule[3] > schedule[0] + schedule[1]);

    // slot 0 is written back to the model
    let applied = model.load(ev).unwrap().value.power[0].re;
    assert!((applied - schedule[0]).abs() < 1e-12);
    assert_eq!(control.substation_horizon().len(), 4);
}

#[test]
fn test_control_report_serializes() {
    let (mut model, _) = with_base_load(create_2bus_feeder(C64::new(0.01, 0.02)), C64::new(0.1, 0.0));
    let mut control = NetworkControl::new(&model, 1, 5.0).unwrap();
    let report = control.fast_control(&mut model).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["mode"], "fast");
    assert_eq!(json["outcome"], "Optimized");
    assert_eq!(json["inner"].as_array().unwrap().len(), 4);
}

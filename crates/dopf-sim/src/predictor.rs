//! Load prediction for slow control.
//!
//! Predictions are read straight from the future data, so they carry no
//! forecast error.

use dopf_algo::opf::NetworkControl;
use dopf_core::{DeviceKind, LoadValue, NetworkModel, C64};
use dopf_io::SampleValue;
use tracing::{debug, warn};

use crate::future_data::FutureData;

/// Fill the controller's horizon for every load, slot `k` covering
/// `start + k·slot_length` minutes.
pub fn make_prediction(
    model: &NetworkModel,
    control: &mut NetworkControl,
    data: &FutureData,
    start: f64,
    slot_length: f64,
) {
    let mut missing = 0usize;
    for (id, load) in model.loads() {
        let Some(values) = control.load_values_mut(id) else {
            warn!(load = %load.name, "load has no controller, skipping prediction");
            continue;
        };

        match &load.kind {
            DeviceKind::BaseLoad | DeviceKind::PhotoVoltaic { .. } => {
                for (slot, value) in values.iter_mut().enumerate() {
                    let time = start + slot as f64 * slot_length;
                    match data.fetch(&load.name, time) {
                        Some(SampleValue::Base(sample)) => *value = sample,
                        Some(SampleValue::Generation(p)) => {
                            *value = LoadValue::new(&load.phase);
                            value.power[0] = C64::new(-p, 0.0);
                        }
                        None => missing += 1,
                    }
                }
            }
            DeviceKind::ElectricVehicle(ev) => {
                let mut capacity = ev.future_energy_request;
                for (slot, value) in values.iter_mut().enumerate() {
                    let time = start + slot as f64 * slot_length;
                    *value = LoadValue::new(&load.phase);
                    if time >= ev.plug_in_time && time <= ev.deadline {
                        let rate = (capacity * 60.0 / slot_length).min(ev.max_charging_rate);
                        value.power[0] = C64::new(rate, 0.0);
                        capacity = (capacity - rate * slot_length / 60.0).max(0.0);
                    }
                }
            }
        }
    }

    if missing > 0 {
        warn!(missing, start, "prediction window reaches past the loaded data");
    }
    debug!(start, slots = control.num_slots(), "predicted loads");
}

#[cfg(test)]
mod tests {
    use super::*;
    use dopf_core::{Bus, BusKind, ElectricVehicle, Line, LineKind, Load, PhaseSet, SquareMatrix};
    use dopf_io::LoadSample;

    fn feeder() -> NetworkModel {
        let mut model = NetworkModel::new();
        let a = PhaseSet::parse("a").unwrap();
        let sub = model
            .add_bus(Bus::new("sub", a.clone(), BusKind::Substation))
            .unwrap();
        let house = model.add_bus(Bus::new("h", a.clone(), BusKind::House)).unwrap();
        model
            .add_line(Line::new(
                "l",
                a,
                LineKind::Line,
                sub,
                house,
                SquareMatrix::diagonal(&[C64::new(0.01, 0.01)]),
            ))
            .unwrap();
        model.sort_by_breadth_first_search().unwrap();
        model
    }

    #[test]
    fn test_vehicle_fills_earliest_slots() {
        let mut model = feeder();
        let house = model.bus_id("h").unwrap();
        let ev = model
            .add_load(Load::new(
                "ev",
                PhaseSet::parse("a").unwrap(),
                DeviceKind::ElectricVehicle(ElectricVehicle {
                    max_charging_rate: 0.2,
                    future_energy_request: 0.075,
                    plug_in_time: 15.0,
                    deadline: 60.0,
                }),
                house,
            ))
            .unwrap();
        let mut control = NetworkControl::new(&model, 4, 15.0).unwrap();
        make_prediction(&model, &mut control, &FutureData::new(), 0.0, 15.0);

        let schedule = control.charging_schedule(ev).unwrap();
        // 0.075 energy at 0.2 max: one full slot, then the remaining 0.025
        assert_eq!(schedule[0], 0.0);
        assert!((schedule[1] - 0.2).abs() < 1e-12);
        assert!((schedule[2] - 0.1).abs() < 1e-12);
        assert!(schedule[3].abs() < 1e-12);
    }

    #[test]
    fn test_photovoltaic_generation_is_negative_power() {
        let mut model = feeder();
        let house = model.bus_id("h").unwrap();
        let pv = model
            .add_load(Load::new(
                "pv",
                PhaseSet::parse("a").unwrap(),
                DeviceKind::PhotoVoltaic { nameplate: 0.5 },
                house,
            ))
            .unwrap();
        let mut data = FutureData::new();
        data.extend(
            "pv",
            [0.0, 30.0].map(|time| LoadSample {
                time,
                value: SampleValue::Generation(time / 100.0),
            }),
        );
        let mut control = NetworkControl::new(&model, 2, 15.0).unwrap();
        make_prediction(&model, &mut control, &data, 0.0, 15.0);

        let values = &control.load_controller(pv).unwrap().values;
        assert_eq!(values[0].power[0], C64::new(0.0, 0.0));
        assert!((values[1].power[0].re + 0.15).abs() < 1e-12);
    }
}

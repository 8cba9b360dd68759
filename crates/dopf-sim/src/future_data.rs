//! Time series of upcoming load samples, keyed by load name.

use std::collections::HashMap;

use dopf_core::{DeviceKind, LoadValue, NetworkModel, C64};
use dopf_io::{LoadSample, SampleValue};
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct FutureData {
    series: HashMap<String, Vec<LoadSample>>,
}

impl FutureData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append samples to a load's series; samples must arrive in time order.
    pub fn extend(&mut self, name: &str, samples: impl IntoIterator<Item = LoadSample>) {
        self.series
            .entry(name.to_string())
            .or_default()
            .extend(samples);
    }

    pub fn samples(&self, name: &str) -> &[LoadSample] {
        self.series.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn num_series(&self) -> usize {
        self.series.len()
    }

    pub fn clear(&mut self) {
        self.series.clear();
    }

    /// Value of `name` at `time`, interpolated between the bracketing samples.
    pub fn fetch(&self, name: &str, time: f64) -> Option<SampleValue> {
        let samples = self.samples(name);
        let first = samples.first()?;
        if first.time > time {
            return None;
        }
        if first.time == time {
            return Some(first.value.clone());
        }
        let next = samples.iter().position(|sample| sample.time >= time)?;
        interpolate(&samples[next - 1], &samples[next], time)
    }

    /// Drop leading samples that can no longer bracket any time after `time`.
    pub fn release_until(&mut self, name: &str, time: f64) {
        let Some(samples) = self.series.get_mut(name) else {
            return;
        };
        let stale = samples
            .windows(2)
            .take_while(|pair| pair[1].time <= time)
            .count();
        samples.drain(..stale);
    }
}

fn interpolate(before: &LoadSample, after: &LoadSample, time: f64) -> Option<SampleValue> {
    let span = after.time - before.time;
    if span <= 0.0 || before.time > time || after.time < time {
        return None;
    }
    let w_after = (time - before.time) / span;
    let w_before = (after.time - time) / span;
    match (&before.value, &after.value) {
        (SampleValue::Base(a), SampleValue::Base(b)) => {
            Some(SampleValue::Base(&(a.clone() * w_before) + &(b.clone() * w_after)))
        }
        (SampleValue::Generation(a), SampleValue::Generation(b)) => {
            Some(SampleValue::Generation(a * w_before + b * w_after))
        }
        _ => None,
    }
}

/// Advance every load in the model from `old_time` to `new_time`.
///
/// Base loads and photovoltaic panels take their sampled value at `new_time`;
/// vehicles are credited with the energy delivered at their present rate.
pub fn fetch_real_time_data(
    model: &mut NetworkModel,
    data: &mut FutureData,
    old_time: f64,
    new_time: f64,
) {
    for (_, load) in model.loads_mut() {
        let rate = load.value.power.iter().next().map_or(0.0, |s| s.re);
        match &mut load.kind {
            DeviceKind::ElectricVehicle(ev) => {
                ev.future_energy_request -= rate * (new_time - old_time) / 60.0;
                continue;
            }
            DeviceKind::BaseLoad | DeviceKind::PhotoVoltaic { .. } => {}
        }

        let sample = data.fetch(&load.name, new_time);
        data.release_until(&load.name, new_time);
        match sample {
            Some(SampleValue::Base(value)) => load.value = value,
            Some(SampleValue::Generation(p)) => {
                let mut value = LoadValue::new(&load.phase);
                value.power[0] = C64::new(-p, 0.0);
                load.value = value;
            }
            None => warn!(load = %load.name, time = new_time, "no data to interpolate, keeping last value"),
        }
    }
}

use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use dopf_core::{
    BusId, ColumnVector, DeviceKind, ElectricVehicle, Load, LoadValue, NetworkModel, PhaseSet,
    SquareMatrix, C64,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::grammar::{parse_clock, parse_document, round_up_to_period, Element};

/// Time-stamped value of a predicted or measured load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSample {
    /// Absolute simulation time in minutes
    pub time: f64,
    pub value: SampleValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    /// Full ZIP value of a base load
    Base(LoadValue),
    /// Real power produced by a photovoltaic panel
    Generation(f64),
}

/// A base load or photovoltaic panel with its time series.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadProfile {
    pub load: Load,
    pub samples: Vec<LoadSample>,
}

/// Contents of one `loadOnDayK.txt` file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadFile {
    pub profiles: Vec<LoadProfile>,
    /// Vehicles with absolute plug-in times and deadlines
    pub vehicles: Vec<Load>,
}

/// Parameters that shape a load file's contents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadFileOptions {
    /// Added to every sample time, plug-in time and deadline
    pub offset_minutes: f64,
    /// Vehicle arrival and stay are rounded up to multiples of this period
    pub slow_period_minutes: f64,
}

impl Default for LoadFileOptions {
    fn default() -> Self {
        Self {
            offset_minutes: 0.0,
            slow_period_minutes: 15.0,
        }
    }
}

pub fn read_load_file(
    path: &Path,
    model: &NetworkModel,
    options: LoadFileOptions,
) -> Result<LoadFile> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading load file {}", path.display()))?;
    parse_load_file(&text, model, options)
        .with_context(|| format!("parsing load file {}", path.display()))
}

/// Parse the `<LoadFile>` grammar, resolving bus names against `model`.
pub fn parse_load_file(
    input: &str,
    model: &NetworkModel,
    options: LoadFileOptions,
) -> Result<LoadFile> {
    let root = parse_document(input)?;
    root.expect_tag("LoadFile")?;

    let mut file = LoadFile::default();
    for element in &root.children {
        match element.tag.as_str() {
            "baseLoad" => file.profiles.push(parse_base_load(element, model, options)?),
            "photovoltaic" => file.profiles.push(parse_photovoltaic(element, model, options)?),
            "electricVehicle" => file.vehicles.push(parse_electric_vehicle(element, model, options)?),
            other => debug!(tag = other, "skipping load element"),
        }
    }
    debug!(
        profiles = file.profiles.len(),
        vehicles = file.vehicles.len(),
        "parsed load file"
    );
    Ok(file)
}

struct Header {
    name: String,
    phase: PhaseSet,
    location: BusId,
}

fn parse_header(element: &Element, model: &NetworkModel) -> Result<Header> {
    let name = element.text_of("name")?.to_string();
    let phase = PhaseSet::parse(element.text_of("phase")?)
        .with_context(|| format!("load '{}'", name))?;
    let bus_name = element.text_of("locationBusName")?;
    let location = model
        .bus_id(bus_name)
        .ok_or_else(|| anyhow!("load '{}' refers to unknown bus '{}'", name, bus_name))?;
    Ok(Header {
        name,
        phase,
        location,
    })
}

/// Base-load sample: half constant power, half constant admittance.
pub fn base_load_value(p: &[f64], q: &[f64]) -> LoadValue {
    let power = p
        .iter()
        .zip(q)
        .map(|(&p, &q)| C64::new(p, q) * 0.5)
        .collect::<ColumnVector<C64>>();
    let diagonal: Vec<C64> = p.iter().zip(q).map(|(&p, &q)| C64::new(p, -q) * 0.5).collect();
    LoadValue {
        admittance: SquareMatrix::diagonal(&diagonal),
        power,
    }
}

fn parse_base_load(
    element: &Element,
    model: &NetworkModel,
    options: LoadFileOptions,
) -> Result<LoadProfile> {
    let header = parse_header(element, model)?;
    let n = header.phase.len();
    let samples = element
        .children_named("LoadData")
        .map(|data| -> Result<LoadSample> {
            let time: f64 = data.required("time")?.value()?;
            let p = data.required("p")?.values::<f64>(n)?;
            let q = data.required("q")?.values::<f64>(n)?;
            Ok(LoadSample {
                time: time + options.offset_minutes,
                value: SampleValue::Base(base_load_value(&p, &q)),
            })
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("samples of base load '{}'", header.name))?;

    Ok(LoadProfile {
        load: Load::new(header.name, header.phase, DeviceKind::BaseLoad, header.location),
        samples,
    })
}

fn parse_photovoltaic(
    element: &Element,
    model: &NetworkModel,
    options: LoadFileOptions,
) -> Result<LoadProfile> {
    let header = parse_header(element, model)?;
    let nameplate: f64 = element.required("nameplate")?.value()?;
    let samples = element
        .children_named("LoadData")
        .map(|data| -> Result<LoadSample> {
            let time: f64 = data.required("time")?.value()?;
            let p: f64 = data.required("p")?.value()?;
            Ok(LoadSample {
                time: time + options.offset_minutes,
                value: SampleValue::Generation(p),
            })
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("samples of photovoltaic '{}'", header.name))?;

    Ok(LoadProfile {
        load: Load::new(
            header.name,
            header.phase,
            DeviceKind::PhotoVoltaic { nameplate },
            header.location,
        ),
        samples,
    })
}

fn parse_electric_vehicle(
    element: &Element,
    model: &NetworkModel,
    options: LoadFileOptions,
) -> Result<Load> {
    let header = parse_header(element, model)?;
    let max_charging_rate: f64 = element.required("maxRate")?.value()?;
    let capacity: f64 = element.required("capacity")?.value()?;
    let arrival = parse_clock(element.text_of("arrivalTime")?)?;
    let duration = parse_clock(element.text_of("duration")?)?;

    let plug_in_time = round_up_to_period(arrival, options.slow_period_minutes);
    let stay = round_up_to_period(duration, options.slow_period_minutes);
    let ev = ElectricVehicle {
        max_charging_rate,
        future_energy_request: capacity,
        plug_in_time: plug_in_time + options.offset_minutes,
        deadline: plug_in_time + stay + options.offset_minutes,
    };
    Ok(Load::new(
        header.name,
        header.phase,
        DeviceKind::ElectricVehicle(ev),
        header.location,
    ))
}

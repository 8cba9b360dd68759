use std::fmt;

use serde::{Deserialize, Serialize};

use crate::load_value::LoadValue;
use crate::phase::PhaseSet;
use crate::BusId;

/// Tag for the closed set of device kinds, used to enable kinds per control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadType {
    BaseLoad,
    PhotoVoltaic,
    ElectricVehicle,
}

impl fmt::Display for LoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadType::BaseLoad => write!(f, "base_load"),
            LoadType::PhotoVoltaic => write!(f, "photovoltaic"),
            LoadType::ElectricVehicle => write!(f, "electric_vehicle"),
        }
    }
}

impl std::str::FromStr for LoadType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "base_load" | "baseload" | "base" => Ok(LoadType::BaseLoad),
            "photovoltaic" | "pv" => Ok(LoadType::PhotoVoltaic),
            "electric_vehicle" | "electricvehicle" | "ev" => Ok(LoadType::ElectricVehicle),
            _ => Err(format!("Unknown load type: {}", s)),
        }
    }
}

/// Charging session parameters of an electric vehicle.
///
/// Rates are per-unit power, energy is per-unit power times hours, and times
/// are absolute simulation minutes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElectricVehicle {
    pub max_charging_rate: f64,
    /// Energy still to deliver before the deadline.
    pub future_energy_request: f64,
    pub plug_in_time: f64,
    pub deadline: f64,
}

/// Device-specific parameters of a load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceKind {
    /// Uncontrollable consumption
    BaseLoad,
    /// Inverter whose reactive power is controllable within its apparent-power rating
    PhotoVoltaic { nameplate: f64 },
    /// Charger whose real power is scheduled over the horizon
    ElectricVehicle(ElectricVehicle),
}

impl DeviceKind {
    pub fn load_type(&self) -> LoadType {
        match self {
            DeviceKind::BaseLoad => LoadType::BaseLoad,
            DeviceKind::PhotoVoltaic { .. } => LoadType::PhotoVoltaic,
            DeviceKind::ElectricVehicle(_) => LoadType::ElectricVehicle,
        }
    }
}

/// A device attached to a bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Load {
    pub name: String,
    pub phase: PhaseSet,
    pub kind: DeviceKind,
    pub value: LoadValue,
    pub location: BusId,
    pub(crate) phase_indices_in_location_bus: Vec<usize>,
}

impl Load {
    /// New load with a zero value sized to `phase`.
    pub fn new(name: impl Into<String>, phase: PhaseSet, kind: DeviceKind, location: BusId) -> Self {
        let value = LoadValue::new(&phase);
        Self {
            name: name.into(),
            phase,
            kind,
            value,
            location,
            phase_indices_in_location_bus: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: LoadValue) -> Self {
        self.value = value;
        self
    }

    pub fn load_type(&self) -> LoadType {
        self.kind.load_type()
    }

    /// Position of each of this load's phases in its location bus.
    pub fn phase_indices_in_location_bus(&self) -> &[usize] {
        &self.phase_indices_in_location_bus
    }

    pub fn electric_vehicle(&self) -> Option<&ElectricVehicle> {
        match &self.kind {
            DeviceKind::ElectricVehicle(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn electric_vehicle_mut(&mut self) -> Option<&mut ElectricVehicle> {
        match &mut self.kind {
            DeviceKind::ElectricVehicle(ev) => Some(ev),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_type_round_trip() {
        for kind in [LoadType::BaseLoad, LoadType::PhotoVoltaic, LoadType::ElectricVehicle] {
            let parsed: LoadType = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("pool_pump".parse::<LoadType>().is_err());
    }

    #[test]
    fn test_new_load_sized_to_phase() {
        let load = Load::new(
            "pv1",
            "bc".parse().unwrap(),
            DeviceKind::PhotoVoltaic { nameplate: 0.01 },
            BusId::new(3),
        );
        assert_eq!(load.value.len(), 2);
        assert_eq!(load.load_type(), LoadType::PhotoVoltaic);
        assert!(load.electric_vehicle().is_none());
    }
}

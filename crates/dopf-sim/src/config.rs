//! Simulation configuration.
//!
//! Every section is optional in the TOML file; unspecified values take the
//! defaults below.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dopf_algo::opf::{ControlMode, ControlSettings, EnabledKinds, ObjectiveCoefficients};
use dopf_core::{GridConventions, LoadType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("prediction window of {window_hours} h holds no slow control period of {period_minutes} min")]
    EmptyHorizon {
        window_hours: f64,
        period_minutes: f64,
    },

    #[error("simulation horizon must be at least one day")]
    NoDays,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Folder holding `network.txt`, `info.txt` and `loadOnDayK.txt`
    pub input_dir: PathBuf,
    pub horizon_days: u32,
    pub fast: FastControlConfig,
    pub slow: SlowControlConfig,
    pub control: ControlSettings,
    pub grid: GridConventions,
    pub objective: ObjectiveCoefficients,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data"),
            horizon_days: 1,
            fast: FastControlConfig::default(),
            slow: SlowControlConfig::default(),
            control: ControlSettings::default(),
            grid: GridConventions::default(),
            objective: ObjectiveCoefficients::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastControlConfig {
    pub enabled: bool,
    pub period_seconds: f64,
    pub photovoltaic: bool,
    pub electric_vehicle: bool,
}

impl Default for FastControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_seconds: 60.0,
            photovoltaic: true,
            electric_vehicle: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowControlConfig {
    pub enabled: bool,
    pub period_minutes: f64,
    pub prediction_window_hours: f64,
    pub photovoltaic: bool,
    pub electric_vehicle: bool,
}

impl Default for SlowControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_minutes: 15.0,
            prediction_window_hours: 2.0,
            photovoltaic: true,
            electric_vehicle: true,
        }
    }
}

fn kinds(enabled: bool, photovoltaic: bool, electric_vehicle: bool) -> EnabledKinds {
    let mut kinds = EnabledKinds::none();
    if enabled {
        if photovoltaic {
            kinds.insert(LoadType::PhotoVoltaic);
        }
        if electric_vehicle {
            kinds.insert(LoadType::ElectricVehicle);
        }
    }
    kinds
}

impl SimulationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self =
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_toml()?)
            .with_context(|| format!("writing config {}", path.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing config")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon_days == 0 {
            return Err(ConfigError::NoDays);
        }
        if self.fast.enabled && self.fast.period_seconds <= 0.0 {
            return Err(ConfigError::NotPositive {
                field: "fast.period_seconds",
                value: self.fast.period_seconds,
            });
        }
        if self.slow.enabled {
            if self.slow.period_minutes <= 0.0 {
                return Err(ConfigError::NotPositive {
                    field: "slow.period_minutes",
                    value: self.slow.period_minutes,
                });
            }
            if self.num_slots() == 0 {
                return Err(ConfigError::EmptyHorizon {
                    window_hours: self.slow.prediction_window_hours,
                    period_minutes: self.slow.period_minutes,
                });
            }
        }
        Ok(())
    }

    /// Device kinds moved by `mode`; empty when the mode is disabled.
    pub fn enabled_kinds(&self, mode: ControlMode) -> EnabledKinds {
        match mode {
            ControlMode::Fast => kinds(
                self.fast.enabled,
                self.fast.photovoltaic,
                self.fast.electric_vehicle,
            ),
            ControlMode::Slow => kinds(
                self.slow.enabled,
                self.slow.photovoltaic,
                self.slow.electric_vehicle,
            ),
        }
    }

    /// Slots in the controller horizon; one when slow control is off.
    pub fn num_slots(&self) -> usize {
        if self.slow.enabled {
            (self.slow.prediction_window_hours * 60.0 / self.slow.period_minutes) as usize
        } else {
            1
        }
    }

    pub fn end_time(&self) -> f64 {
        f64::from(self.horizon_days) * 1440.0
    }
}

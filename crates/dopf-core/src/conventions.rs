use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::linalg::C64;

/// Grid-wide electrical conventions shared by the model and the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConventions {
    /// Angle between consecutive phases in radians.
    pub phase_rotation: f64,
    /// Lower voltage magnitude bound at house buses (per unit).
    pub house_voltage_min: f64,
    /// Upper voltage magnitude bound at house buses (per unit).
    pub house_voltage_max: f64,
    /// Substation voltage magnitude before any control (per unit).
    pub substation_voltage: f64,
    /// Voltages are re-initialized when the substation's first phase drops below this real part.
    pub reinit_threshold: f64,
}

impl Default for GridConventions {
    fn default() -> Self {
        Self {
            phase_rotation: -2.0 * PI / 3.0,
            house_voltage_min: 0.95,
            house_voltage_max: 1.05,
            substation_voltage: 1.0,
            reinit_threshold: 0.5,
        }
    }
}

impl GridConventions {
    /// Unit phasor of the phase `offset` letters after `a`.
    pub fn rotation(&self, offset: usize) -> C64 {
        C64::from_polar(1.0, self.phase_rotation * offset as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rotation() {
        let conventions = GridConventions::default();
        let b = conventions.rotation(1);
        assert!((b.re + 0.5).abs() < 1e-12);
        assert!((b.im + (3.0f64).sqrt() / 2.0).abs() < 1e-12);
        assert_eq!(conventions.rotation(0), C64::new(1.0, 0.0));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let conventions: GridConventions = serde_json::from_str(r#"{"house_voltage_min": 0.9}"#).unwrap();
        assert_eq!(conventions.house_voltage_min, 0.9);
        assert_eq!(conventions.house_voltage_max, 1.05);
    }
}

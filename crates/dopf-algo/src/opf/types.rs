use std::collections::BTreeSet;
use std::fmt;

use dopf_core::LoadType;
use serde::{Deserialize, Serialize};

use crate::power_flow::SweepSettings;

/// Which part of the horizon a control run optimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Slot 0 only, driven by real-time data
    Fast,
    /// Every slot of the prediction horizon
    Slow,
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMode::Fast => write!(f, "fast"),
            ControlMode::Slow => write!(f, "slow"),
        }
    }
}

impl std::str::FromStr for ControlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" | "realtime" => Ok(ControlMode::Fast),
            "slow" | "horizon" => Ok(ControlMode::Slow),
            _ => Err(format!("Unknown control mode: {}", s)),
        }
    }
}

/// Cost of substation real power per phase: `quadratic·P² + linear·P`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveCoefficients {
    pub quadratic: f64,
    pub linear: f64,
}

impl Default for ObjectiveCoefficients {
    fn default() -> Self {
        Self {
            quadratic: 1.0,
            linear: 0.0,
        }
    }
}

impl ObjectiveCoefficients {
    /// Cost of one phase's real power.
    #[inline]
    pub fn cost(&self, power: f64) -> f64 {
        self.quadratic * power * power + self.linear * power
    }

    /// Derivative of [`cost`](Self::cost).
    #[inline]
    pub fn marginal(&self, power: f64) -> f64 {
        2.0 * self.quadratic * power + self.linear
    }
}

/// Voltage magnitude box at constrained buses (per unit).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageBounds {
    pub min: f64,
    pub max: f64,
}

impl VoltageBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, magnitude: f64) -> bool {
        magnitude >= self.min && magnitude <= self.max
    }
}

/// Weights of the lower and upper log-barrier terms.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BarrierWeights {
    pub lower: f64,
    pub upper: f64,
}

impl BarrierWeights {
    pub fn uniform(mu: f64) -> Self {
        Self {
            lower: mu,
            upper: mu,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.lower == 0.0 && self.upper == 0.0
    }
}

/// Device kinds a control mode is allowed to move.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnabledKinds(BTreeSet<LoadType>);

impl EnabledKinds {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        [
            LoadType::BaseLoad,
            LoadType::PhotoVoltaic,
            LoadType::ElectricVehicle,
        ]
        .into_iter()
        .collect()
    }

    pub fn contains(&self, kind: LoadType) -> bool {
        self.0.contains(&kind)
    }

    pub fn insert(&mut self, kind: LoadType) {
        self.0.insert(kind);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = LoadType> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<LoadType> for EnabledKinds {
    fn from_iter<I: IntoIterator<Item = LoadType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Tuning of the outer and inner optimization loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    /// Step back-off factor of the line search
    pub alpha: f64,
    /// Fraction of the linearized decrease a step must achieve
    pub beta: f64,
    /// Squared-norm power update below which the inner loop stops
    pub epsilon: f64,
    /// Barrier weights for annealing; empty selects {1, 0.1, 0.01, 0.001} / bus count
    pub mu_schedule: Vec<f64>,
    /// Accepted steps per inner loop before giving up
    pub max_inner_steps: usize,
    /// Step-size reductions per line search before giving up
    pub max_backtracks: usize,
    /// Bound-widening rounds before declaring the start infeasible
    pub feasibility_iterations: usize,
    /// Margin added beyond the observed extremes when widening bounds
    pub feasibility_widen: f64,
    pub sweep: SweepSettings,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            beta: 0.5,
            epsilon: 1e-4,
            mu_schedule: Vec::new(),
            max_inner_steps: 500,
            max_backtracks: 60,
            feasibility_iterations: 15,
            feasibility_widen: 0.001,
            sweep: SweepSettings::default(),
        }
    }
}

impl ControlSettings {
    /// Barrier weights to anneal through for a network of `bus_count` buses.
    pub fn annealing_schedule(&self, bus_count: usize) -> Vec<f64> {
        if !self.mu_schedule.is_empty() {
            return self.mu_schedule.clone();
        }
        let n = bus_count.max(1) as f64;
        [1.0, 0.1, 0.01, 0.001].iter().map(|mu| mu / n).collect()
    }

    pub fn with_mu_schedule(mut self, schedule: Vec<f64>) -> Self {
        self.mu_schedule = schedule;
        self
    }

    pub fn with_max_inner_steps(mut self, steps: usize) -> Self {
        self.max_inner_steps = steps;
        self
    }
}

/// How an inner loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InnerStatus {
    /// Power update fell below epsilon
    Converged,
    /// Step or backtrack cap reached; last committed state kept
    IterationLimit,
    /// The starting point violated the voltage bounds
    Infeasible,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InnerReport {
    pub status: InnerStatus,
    pub mu: f64,
    /// Accepted (committed) steps
    pub steps: usize,
    /// Step-size reductions across all line searches
    pub backtracks: usize,
    pub objective: f64,
    /// Starting objective followed by the objective after each commit
    pub committed: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlOutcome {
    Optimized,
    /// No feasible starting point within the widening budget
    Infeasible,
}

/// Summary of one fast or slow control run.
#[derive(Debug, Clone, Serialize)]
pub struct ControlReport {
    pub mode: ControlMode,
    pub outcome: ControlOutcome,
    /// Slot-0 objective without barrier terms; 0 when infeasible
    pub objective: f64,
    pub substation_voltage: f64,
    pub feasibility_rounds: usize,
    pub inner: Vec<InnerReport>,
}

impl ControlReport {
    pub(crate) fn new(mode: ControlMode, substation_voltage: f64) -> Self {
        Self {
            mode,
            outcome: ControlOutcome::Optimized,
            objective: 0.0,
            substation_voltage,
            feasibility_rounds: 0,
            inner: Vec::new(),
        }
    }

    pub fn is_optimized(&self) -> bool {
        self.outcome == ControlOutcome::Optimized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_scales_with_bus_count() {
        let schedule = ControlSettings::default().annealing_schedule(10);
        assert_eq!(schedule.len(), 4);
        assert!((schedule[0] - 0.1).abs() < 1e-15);
        assert!((schedule[3] - 0.0001).abs() < 1e-15);
    }

    #[test]
    fn test_custom_schedule_kept() {
        let settings = ControlSettings::default().with_mu_schedule(vec![0.5, 0.05]);
        assert_eq!(settings.annealing_schedule(100), vec![0.5, 0.05]);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("FAST".parse::<ControlMode>().unwrap(), ControlMode::Fast);
        assert_eq!("horizon".parse::<ControlMode>().unwrap(), ControlMode::Slow);
        assert!("medium".parse::<ControlMode>().is_err());
    }

    #[test]
    fn test_objective_coefficients() {
        let c = ObjectiveCoefficients {
            quadratic: 2.0,
            linear: 1.0,
        };
        assert_eq!(c.cost(3.0), 21.0);
        assert_eq!(c.marginal(3.0), 13.0);
    }
}

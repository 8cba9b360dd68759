//! Per-device control updates and their projections onto feasible sets.
//!
//! Each controllable device keeps two copies of its horizon: the tentative
//! `values` produced by the current line-search attempt and the committed
//! `old_values`. Attempts always start from the committed copy.

use dopf_core::{BusId, ColumnVector, DeviceKind, Load, LoadId, LoadType, LoadValue, C64};
use tracing::warn;

/// Convergence width of the charging-profile bisection.
const PROJECTION_TOLERANCE: f64 = 1e-4;

/// Slots `[plug_in, deadline)` an electric vehicle may charge in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChargingWindow {
    pub plug_in: usize,
    pub deadline: usize,
}

impl ChargingWindow {
    /// Window relative to `now`, each end floored at slot 0.
    pub fn from_times(plug_in_time: f64, deadline: f64, now: f64, slot_length_minutes: f64) -> Self {
        let slot = |t: f64| ((t - now) / slot_length_minutes).trunc().max(0.0) as usize;
        Self {
            plug_in: slot(plug_in_time),
            deadline: slot(deadline),
        }
    }

    pub fn is_valid(&self, horizon: usize) -> bool {
        self.deadline > self.plug_in && self.deadline <= horizon
    }
}

/// Reactive power after a gradient step, clamped to the inverter's rating.
///
/// Real power stays at its committed value; the reactive limit is
/// `sqrt(max(0, nameplate² − P²))`.
pub fn photovoltaic_reactive_power(committed: C64, gradient: C64, step: f64, nameplate: f64) -> f64 {
    let q = committed.im - step * gradient.im;
    let limit = (nameplate * nameplate - committed.re * committed.re).max(0.0).sqrt();
    q.clamp(-limit, limit)
}

/// Project a tentative charging profile onto `{0 ≤ r ≤ max_rate, Σ r = target}`.
///
/// The projection is a uniform shift followed by clamping. The shift is found
/// by bisection, with each bracket end tightened by the remaining energy gap
/// spread over the slots that are not pinned at the opposite bound.
pub fn project_charging_profile(tentative: &[f64], max_rate: f64, target: f64) -> Vec<f64> {
    if tentative.is_empty() {
        return Vec::new();
    }
    let min_rate = 0.0;
    let lowest = tentative.iter().copied().fold(f64::INFINITY, f64::min);
    let highest = tentative.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut max_move = max_rate - lowest;
    let mut min_move = min_rate - highest;
    let n = tentative.len();

    while max_move > min_move + PROJECTION_TOLERANCE {
        let shift = (max_move + min_move) / 2.0;
        let mut sum = 0.0;
        let mut at_lower = 0;
        let mut at_upper = 0;
        for &rate in tentative {
            let shifted = rate + shift;
            if shifted < min_rate {
                at_lower += 1;
                sum += min_rate;
            } else if shifted > max_rate {
                at_upper += 1;
                sum += max_rate;
            } else {
                sum += shifted;
            }
        }

        if sum == target {
            max_move = shift;
            min_move = shift;
        } else if sum < target {
            if at_upper == n {
                // every slot already at the maximum rate
                min_move = max_move;
            } else {
                min_move = shift + (target - sum) / (n - at_upper) as f64;
            }
        } else if at_lower == n {
            max_move = min_move;
        } else {
            max_move = shift - (sum - target) / (n - at_lower) as f64;
        }
    }

    let shift = (max_move + min_move) / 2.0;
    tentative
        .iter()
        .map(|rate| (rate + shift).clamp(min_rate, max_rate))
        .collect()
}

/// Controller-side shadow of one load over the horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadController {
    pub id: LoadId,
    pub name: String,
    pub bus: BusId,
    pub kind: DeviceKind,
    pub phase_indices: Vec<usize>,
    pub values: Vec<LoadValue>,
    pub old_values: Vec<LoadValue>,
    pub window: ChargingWindow,
}

impl LoadController {
    pub fn new(id: LoadId, load: &Load, num_slots: usize) -> Self {
        Self {
            id,
            name: load.name.clone(),
            bus: load.location,
            kind: load.kind.clone(),
            phase_indices: load.phase_indices_in_location_bus().to_vec(),
            values: vec![load.value.clone(); num_slots],
            old_values: vec![load.value.clone(); num_slots],
            window: ChargingWindow::default(),
        }
    }

    pub fn load_type(&self) -> LoadType {
        self.kind.load_type()
    }

    /// Gradient entries at this load's phases of its bus.
    fn local_gradient(&self, bus_gradient: &ColumnVector<C64>) -> ColumnVector<C64> {
        ColumnVector::gather(bus_gradient, &self.phase_indices)
    }

    /// Tentative value for one slot. Only photovoltaic inverters move per slot.
    pub fn attempt_at(&mut self, slot: usize, step: f64, bus_gradient: &ColumnVector<C64>) {
        let DeviceKind::PhotoVoltaic { nameplate } = self.kind else {
            return;
        };
        let gradient = self.local_gradient(bus_gradient);
        for phase in 0..gradient.len() {
            let committed = self.old_values[slot].power[phase];
            let q = photovoltaic_reactive_power(committed, gradient[phase], step, nameplate);
            self.values[slot].power[phase].im = q;
        }
    }

    /// Tentative values over the horizon, given the bus gradient of every slot.
    pub fn attempt_over_horizon(
        &mut self,
        step: f64,
        bus_gradients: &[&ColumnVector<C64>],
        slot_length_minutes: f64,
    ) {
        match self.kind.clone() {
            DeviceKind::BaseLoad => {}
            DeviceKind::PhotoVoltaic { .. } => {
                for (slot, gradient) in bus_gradients.iter().enumerate() {
                    self.attempt_at(slot, step, gradient);
                }
            }
            DeviceKind::ElectricVehicle(ev) => {
                let window = self.window;
                if !window.is_valid(self.values.len()) {
                    warn!(
                        load = %self.name,
                        plug_in = window.plug_in,
                        deadline = window.deadline,
                        horizon = self.values.len(),
                        "charging window outside the horizon; skipping"
                    );
                    return;
                }
                let Some(&first_phase) = self.phase_indices.first() else {
                    return;
                };
                let tentative: Vec<f64> = (window.plug_in..window.deadline)
                    .map(|slot| {
                        self.old_values[slot].power[0].re - step * bus_gradients[slot][first_phase].re
                    })
                    .collect();
                let target = ev.future_energy_request * 60.0 / slot_length_minutes;
                let profile = project_charging_profile(&tentative, ev.max_charging_rate, target);
                for (slot, rate) in (window.plug_in..window.deadline).zip(profile) {
                    self.values[slot].power[0] = C64::new(rate, 0.0);
                }
            }
        }
    }

    pub fn commit(&mut self, slots: std::ops::Range<usize>) {
        for slot in slots {
            self.old_values[slot] = self.values[slot].clone();
        }
    }

    pub fn reset(&mut self, slots: std::ops::Range<usize>) {
        for slot in slots {
            self.values[slot] = self.old_values[slot].clone();
        }
    }

    /// Linearized objective change `Σ Re(g)·ΔP + Im(g)·ΔQ` for one slot.
    pub fn expected_change_at(&self, slot: usize, bus_gradient: &ColumnVector<C64>) -> f64 {
        let gradient = self.local_gradient(bus_gradient);
        let delta = &self.values[slot].power - &self.old_values[slot].power;
        gradient
            .iter()
            .zip(delta.iter())
            .map(|(g, d)| g.re * d.re + g.im * d.im)
            .sum()
    }

    /// Real charging rate per slot.
    pub fn charging_schedule(&self) -> Vec<f64> {
        self.values.iter().map(|value| value.power[0].re).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pv_clamps_to_rating() {
        let committed = C64::new(0.6, 0.0);
        let q = photovoltaic_reactive_power(committed, C64::new(0.0, -10.0), 1.0, 1.0);
        assert!((q - 0.8).abs() < 1e-12);
        let q = photovoltaic_reactive_power(committed, C64::new(0.0, 10.0), 1.0, 1.0);
        assert!((q + 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_pv_real_power_above_rating() {
        let q = photovoltaic_reactive_power(C64::new(1.2, 0.3), C64::new(0.0, 1.0), 0.5, 1.0);
        assert_eq!(q, 0.0);
    }

    #[test]
    fn test_projection_interior() {
        let profile = project_charging_profile(&[0.2, 0.4, 0.6], 1.0, 1.5);
        let sum: f64 = profile.iter().sum();
        assert!((sum - 1.5).abs() < 1e-3);
        assert!(profile.iter().all(|r| (0.0..=1.0).contains(r)));
        // uniform shift keeps the spacing
        assert!((profile[1] - profile[0] - 0.2).abs() < 1e-3);
    }

    #[test]
    fn test_projection_clamps_bounds() {
        let profile = project_charging_profile(&[-3.0, 0.5, 4.0], 1.0, 1.2);
        let sum: f64 = profile.iter().sum();
        assert!((sum - 1.2).abs() < 1e-3);
        assert_eq!(profile[0], 0.0);
        assert_eq!(profile[2], 1.0);
    }

    #[test]
    fn test_projection_unreachable_target() {
        let profile = project_charging_profile(&[0.1, 0.2], 1.0, 5.0);
        assert!(profile.iter().all(|&r| (r - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_window_from_times() {
        let window = ChargingWindow::from_times(30.0, 95.0, 10.0, 15.0);
        assert_eq!(window, ChargingWindow { plug_in: 1, deadline: 5 });
        let past = ChargingWindow::from_times(-50.0, 20.0, 10.0, 15.0);
        assert_eq!(past.plug_in, 0);
        assert!(!ChargingWindow { plug_in: 2, deadline: 2 }.is_valid(10));
        assert!(!ChargingWindow { plug_in: 0, deadline: 11 }.is_valid(10));
    }
}

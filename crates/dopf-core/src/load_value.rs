use std::ops::{Add, AddAssign, Div, Mul};

use crate::linalg::{ColumnVector, SquareMatrix, C64};
use crate::phase::PhaseSet;

/// ZIP-style load description: a constant-admittance part and a constant-power part.
///
/// Positive real power is consumption. A bus's aggregate load is the shunt plus
/// the phase-aligned sum of every attached load's value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadValue {
    pub admittance: SquareMatrix<C64>,
    pub power: ColumnVector<C64>,
}

impl LoadValue {
    pub fn new(phase: &PhaseSet) -> Self {
        Self::zeros(phase.len())
    }

    pub fn zeros(len: usize) -> Self {
        Self {
            admittance: SquareMatrix::zeros(len),
            power: ColumnVector::zeros(len),
        }
    }

    /// Constant-power load with no admittance part.
    pub fn from_power(power: ColumnVector<C64>) -> Self {
        let len = power.len();
        Self {
            admittance: SquareMatrix::zeros(len),
            power,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.power.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.power.is_empty()
    }

    pub fn reset(&mut self) {
        self.admittance.reset();
        self.power.reset();
    }

    /// Scatter `other` into this value at `indices` (both parts).
    pub fn add_to_indices(&mut self, other: &LoadValue, indices: &[usize]) {
        self.admittance.add_to_indices(&other.admittance, indices);
        self.power.add_to_indices(&other.power, indices);
    }

    /// Gather `other` at `indices` into this value (both parts).
    pub fn add_from_indices(&mut self, other: &LoadValue, indices: &[usize]) {
        self.admittance.add_from_indices(&other.admittance, indices);
        self.power.add_from_indices(&other.power, indices);
    }
}

impl AddAssign<&LoadValue> for LoadValue {
    fn add_assign(&mut self, rhs: &LoadValue) {
        self.admittance += &rhs.admittance;
        self.power += &rhs.power;
    }
}

impl Add<&LoadValue> for &LoadValue {
    type Output = LoadValue;
    fn add(self, rhs: &LoadValue) -> LoadValue {
        let mut result = self.clone();
        result += rhs;
        result
    }
}

impl Mul<f64> for LoadValue {
    type Output = LoadValue;
    fn mul(mut self, rhs: f64) -> LoadValue {
        let factor = C64::new(rhs, 0.0);
        self.admittance.scale(factor);
        self.power *= factor;
        self
    }
}

impl Div<f64> for LoadValue {
    type Output = LoadValue;
    fn div(self, rhs: f64) -> LoadValue {
        self * (1.0 / rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scatter_into_larger_value() {
        let single = LoadValue {
            admittance: SquareMatrix::diagonal(&[C64::new(0.5, 0.0)]),
            power: ColumnVector::from_vec(vec![C64::new(0.1, 0.02)]),
        };
        let mut aggregate = LoadValue::zeros(3);
        aggregate.add_to_indices(&single, &[2]);
        aggregate.add_to_indices(&single, &[2]);
        assert_eq!(aggregate.power[2], C64::new(0.2, 0.04));
        assert_eq!(aggregate.admittance[(2, 2)], C64::new(1.0, 0.0));
        assert_eq!(aggregate.power[0], C64::new(0.0, 0.0));
    }

    #[test]
    fn test_arithmetic() {
        let value = LoadValue::from_power(ColumnVector::from_vec(vec![C64::new(1.0, 1.0)]));
        let doubled = &value + &value;
        assert_eq!(doubled.power[0], C64::new(2.0, 2.0));
        let halved = doubled / 4.0;
        assert_eq!(halved.power[0], C64::new(0.5, 0.5));
    }
}

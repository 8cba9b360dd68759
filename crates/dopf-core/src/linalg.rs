//! Dense per-phase linear algebra.
//!
//! [`ColumnVector`] and [`SquareMatrix`] are thin wrappers over `nalgebra`'s
//! `DVector` and `DMatrix`, sized by a node's phase count (at most three).
//! Products, conjugation and the Hermitian transpose are nalgebra's; the
//! wrappers add phase-indexed scatter/gather and the workspace's norm.
//! Arithmetic between two containers requires equal dimensions.
//!
//! The scatter/gather helpers carry the phase alignment between a child node
//! and its parent:
//!
//! - `parent.add_to_indices(&child, &idx)` adds `child[i]` into `parent[idx[i]]`
//! - `child.add_from_indices(&parent, &idx)` adds `parent[idx[i]]` into `child[i]`
//!
//! [`norm`] is the *squared* Euclidean norm. Every update-size threshold in
//! the workspace is calibrated to that scale.

use std::fmt;
use std::ops::{
    Add, AddAssign, DivAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign,
};

use nalgebra::{ComplexField, DMatrix, DVector};
use num_complex::Complex64;

use crate::phase::PhaseSet;

/// Complex scalar used for voltages, currents, power and impedance.
pub type C64 = Complex64;

/// Real or complex entries of [`ColumnVector`] and [`SquareMatrix`].
pub trait Scalar: ComplexField<RealField = f64> + Copy {}

impl<T> Scalar for T where T: ComplexField<RealField = f64> + Copy {}

/// Per-phase column vector.
#[derive(Clone, PartialEq)]
pub struct ColumnVector<T: Scalar>(DVector<T>);

impl<T: Scalar> ColumnVector<T> {
    /// Zero vector sized to `phase`.
    pub fn new(phase: &PhaseSet) -> Self {
        Self::zeros(phase.len())
    }

    pub fn zeros(len: usize) -> Self {
        Self(DVector::zeros(len))
    }

    pub fn from_vec(data: Vec<T>) -> Self {
        Self(DVector::from_vec(data))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.as_slice().iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.0.as_mut_slice().iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        self.0.as_slice()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.0.as_slice().to_vec()
    }

    /// Underlying nalgebra vector.
    pub fn as_dvector(&self) -> &DVector<T> {
        &self.0
    }

    /// Set every entry to zero.
    pub fn reset(&mut self) {
        self.0.fill(T::from_real(0.0));
    }

    /// `self[indices[i]] += other[i]`
    pub fn add_to_indices(&mut self, other: &ColumnVector<T>, indices: &[usize]) {
        debug_assert_eq!(other.len(), indices.len());
        for (value, &index) in other.iter().zip(indices) {
            self.0[index] += *value;
        }
    }

    /// `self[i] += other[indices[i]]`
    pub fn add_from_indices(&mut self, other: &ColumnVector<T>, indices: &[usize]) {
        debug_assert_eq!(self.len(), indices.len());
        self.0 += other.0.select_rows(indices);
    }

    /// Entries of `other` at `indices`, as a new vector.
    pub fn gather(other: &ColumnVector<T>, indices: &[usize]) -> Self {
        Self(other.0.select_rows(indices))
    }

    /// Elementwise product.
    pub fn hadamard(&self, other: &ColumnVector<T>) -> Self {
        debug_assert_eq!(self.len(), other.len());
        Self(self.0.component_mul(&other.0))
    }

    pub fn conj(&self) -> Self {
        Self(self.0.conjugate())
    }

    pub fn map<U: Scalar, F: FnMut(T) -> U>(&self, f: F) -> ColumnVector<U> {
        ColumnVector(self.0.map(f))
    }

    /// Sum of squared magnitudes.
    pub fn norm_sqr(&self) -> f64 {
        self.0.norm_squared()
    }
}

/// Sum of squared magnitudes of `v` (not the Euclidean norm).
pub fn norm<T: Scalar>(v: &ColumnVector<T>) -> f64 {
    v.norm_sqr()
}

impl ColumnVector<C64> {
    pub fn real(&self) -> ColumnVector<f64> {
        self.map(|x| x.re)
    }

    pub fn imag(&self) -> ColumnVector<f64> {
        self.map(|x| x.im)
    }

    /// Per-phase magnitude `|x|`.
    pub fn magnitudes(&self) -> Vec<f64> {
        self.iter().map(|x| x.norm()).collect()
    }
}

impl<T: Scalar> Default for ColumnVector<T> {
    fn default() -> Self {
        Self::zeros(0)
    }
}

impl<T: Scalar> Index<usize> for ColumnVector<T> {
    type Output = T;
    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.0[index]
    }
}

impl<T: Scalar> IndexMut<usize> for ColumnVector<T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.0[index]
    }
}

impl<T: Scalar> fmt::Debug for ColumnVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Scalar> FromIterator<T> for ColumnVector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

/// Elementwise binary operators over owned and borrowed vectors.
macro_rules! impl_vector_ops {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident) => {
        impl<T: Scalar> $assign_trait<&ColumnVector<T>> for ColumnVector<T> {
            fn $assign_method(&mut self, rhs: &ColumnVector<T>) {
                debug_assert_eq!(self.len(), rhs.len());
                self.0.$assign_method(&rhs.0);
            }
        }

        impl<T: Scalar> $assign_trait for ColumnVector<T> {
            fn $assign_method(&mut self, rhs: ColumnVector<T>) {
                self.0.$assign_method(rhs.0);
            }
        }

        impl<T: Scalar> $trait<&ColumnVector<T>> for &ColumnVector<T> {
            type Output = ColumnVector<T>;
            fn $method(self, rhs: &ColumnVector<T>) -> ColumnVector<T> {
                ColumnVector((&self.0).$method(&rhs.0))
            }
        }

        impl<T: Scalar> $trait for ColumnVector<T> {
            type Output = ColumnVector<T>;
            fn $method(self, rhs: ColumnVector<T>) -> ColumnVector<T> {
                ColumnVector(self.0.$method(rhs.0))
            }
        }
    };
}

impl_vector_ops!(Add, add, AddAssign, add_assign);
impl_vector_ops!(Sub, sub, SubAssign, sub_assign);

impl<T: Scalar> Neg for ColumnVector<T> {
    type Output = ColumnVector<T>;
    fn neg(self) -> ColumnVector<T> {
        ColumnVector(-self.0)
    }
}

impl<T: Scalar> Neg for &ColumnVector<T> {
    type Output = ColumnVector<T>;
    fn neg(self) -> ColumnVector<T> {
        ColumnVector(-&self.0)
    }
}

impl<T: Scalar> Mul<T> for ColumnVector<T> {
    type Output = ColumnVector<T>;
    fn mul(self, rhs: T) -> ColumnVector<T> {
        ColumnVector(self.0 * rhs)
    }
}

impl<T: Scalar> MulAssign<T> for ColumnVector<T> {
    fn mul_assign(&mut self, rhs: T) {
        self.0 *= rhs;
    }
}

impl<T: Scalar> DivAssign<T> for ColumnVector<T> {
    fn div_assign(&mut self, rhs: T) {
        self.0 /= rhs;
    }
}

/// Square matrix over a node's phases.
#[derive(Clone, PartialEq)]
pub struct SquareMatrix<T: Scalar>(DMatrix<T>);

impl<T: Scalar> SquareMatrix<T> {
    /// Zero matrix sized to `phase`.
    pub fn new(phase: &PhaseSet) -> Self {
        Self::zeros(phase.len())
    }

    pub fn zeros(dim: usize) -> Self {
        Self(DMatrix::zeros(dim, dim))
    }

    /// Build from a row-major slice of `dim * dim` entries.
    pub fn from_row_major(dim: usize, data: Vec<T>) -> Self {
        debug_assert_eq!(data.len(), dim * dim);
        Self(DMatrix::from_row_slice(dim, dim, &data))
    }

    pub fn diagonal(values: &[T]) -> Self {
        Self(DMatrix::from_diagonal(&DVector::from_column_slice(values)))
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.0.nrows()
    }

    /// Underlying nalgebra matrix.
    pub fn as_dmatrix(&self) -> &DMatrix<T> {
        &self.0
    }

    pub fn reset(&mut self) {
        self.0.fill(T::from_real(0.0));
    }

    /// Conjugate transpose.
    pub fn hermitian(&self) -> Self {
        Self(self.0.adjoint())
    }

    pub fn mul_vec(&self, v: &ColumnVector<T>) -> ColumnVector<T> {
        debug_assert_eq!(self.dim(), v.len());
        ColumnVector(&self.0 * &v.0)
    }

    /// `self[indices[i]][indices[j]] += other[i][j]`
    pub fn add_to_indices(&mut self, other: &SquareMatrix<T>, indices: &[usize]) {
        debug_assert_eq!(other.dim(), indices.len());
        for (i, &row) in indices.iter().enumerate() {
            for (j, &col) in indices.iter().enumerate() {
                self.0[(row, col)] += other.0[(i, j)];
            }
        }
    }

    /// `self[i][j] += other[indices[i]][indices[j]]`
    pub fn add_from_indices(&mut self, other: &SquareMatrix<T>, indices: &[usize]) {
        debug_assert_eq!(self.dim(), indices.len());
        self.0 += other.0.select_rows(indices).select_columns(indices);
    }

    pub fn scale(&mut self, factor: T) {
        self.0 *= factor;
    }
}

impl<T: Scalar> Default for SquareMatrix<T> {
    fn default() -> Self {
        Self::zeros(0)
    }
}

impl<T: Scalar> Index<(usize, usize)> for SquareMatrix<T> {
    type Output = T;
    #[inline]
    fn index(&self, index: (usize, usize)) -> &T {
        &self.0[index]
    }
}

impl<T: Scalar> IndexMut<(usize, usize)> for SquareMatrix<T> {
    #[inline]
    fn index_mut(&mut self, index: (usize, usize)) -> &mut T {
        &mut self.0[index]
    }
}

impl<T: Scalar> fmt::Debug for SquareMatrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<Vec<T>> = self
            .0
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect();
        f.debug_list().entries(rows).finish()
    }
}

impl<T: Scalar> Mul<&ColumnVector<T>> for &SquareMatrix<T> {
    type Output = ColumnVector<T>;
    fn mul(self, rhs: &ColumnVector<T>) -> ColumnVector<T> {
        self.mul_vec(rhs)
    }
}

impl<T: Scalar> AddAssign<&SquareMatrix<T>> for SquareMatrix<T> {
    fn add_assign(&mut self, rhs: &SquareMatrix<T>) {
        debug_assert_eq!(self.dim(), rhs.dim());
        self.0 += &rhs.0;
    }
}

impl<T: Scalar> Add<&SquareMatrix<T>> for &SquareMatrix<T> {
    type Output = SquareMatrix<T>;
    fn add(self, rhs: &SquareMatrix<T>) -> SquareMatrix<T> {
        SquareMatrix(&self.0 + &rhs.0)
    }
}

impl<T: Scalar> Mul<T> for SquareMatrix<T> {
    type Output = SquareMatrix<T>;
    fn mul(mut self, rhs: T) -> SquareMatrix<T> {
        self.scale(rhs);
        self
    }
}

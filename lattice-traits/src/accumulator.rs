//! Working types for weighted sums and their precision classes.

use num_complex::Complex;
use num_traits::{Float, NumCast};

/// Precision class of an [`Accumulator`].
///
/// The convolution engine keys its line-convolver table on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// Real values accumulated in `f64`.
    Double,
    /// Real values accumulated in `f32`.
    Float,
    /// Any other algebraic type, accumulated in its own precision.
    Generic,
}

impl Precision {
    /// Index into per-precision lookup tables.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Precision::Double => 0,
            Precision::Float => 1,
            Precision::Generic => 2,
        }
    }
}

/// A value type that supports `acc + weight * x` style sums.
///
/// `Default` must be the additive identity.
pub trait Accumulator: Copy + Send + Sync + Default + 'static {
    /// Kernel weight representation in this precision.
    type Weight: Copy + Send + Sync;

    /// Precision class used for convolver dispatch.
    const PRECISION: Precision;

    /// Convert a kernel weight into this precision.
    fn weight(w: f64) -> Self::Weight;

    /// `self * w`
    fn scale(self, w: Self::Weight) -> Self;

    /// `self + rhs`
    fn accumulate(self, rhs: Self) -> Self;
}

impl Accumulator for f64 {
    type Weight = f64;
    const PRECISION: Precision = Precision::Double;

    #[inline]
    fn weight(w: f64) -> f64 {
        w
    }

    #[inline]
    fn scale(self, w: f64) -> f64 {
        self * w
    }

    #[inline]
    fn accumulate(self, rhs: f64) -> f64 {
        self + rhs
    }
}

impl Accumulator for f32 {
    type Weight = f32;
    const PRECISION: Precision = Precision::Float;

    #[inline]
    fn weight(w: f64) -> f32 {
        w as f32
    }

    #[inline]
    fn scale(self, w: f32) -> f32 {
        self * w
    }

    #[inline]
    fn accumulate(self, rhs: f32) -> f32 {
        self + rhs
    }
}

impl<T> Accumulator for Complex<T>
where
    T: Float + Send + Sync + Default + 'static,
{
    type Weight = T;
    const PRECISION: Precision = Precision::Generic;

    #[inline]
    fn weight(w: f64) -> T {
        <T as NumCast>::from(w).unwrap_or_else(T::nan)
    }

    #[inline]
    fn scale(self, w: T) -> Self {
        self * w
    }

    #[inline]
    fn accumulate(self, rhs: Self) -> Self {
        self + rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    fn weighted_sum<A: Accumulator>(xs: &[A], ws: &[f64]) -> A {
        xs.iter()
            .zip(ws)
            .fold(A::default(), |acc, (&x, &w)| acc.accumulate(x.scale(A::weight(w))))
    }

    #[test]
    fn test_precision_classes() {
        assert_eq!(<f64 as Accumulator>::PRECISION, Precision::Double);
        assert_eq!(<f32 as Accumulator>::PRECISION, Precision::Float);
        assert_eq!(<Complex64 as Accumulator>::PRECISION, Precision::Generic);
    }

    #[test]
    fn test_precision_index_is_dense() {
        let idx: Vec<usize> = [Precision::Double, Precision::Float, Precision::Generic]
            .iter()
            .map(|p| p.index())
            .collect();
        assert_eq!(idx, vec![0, 1, 2]);
    }

    #[test]
    fn test_weighted_sum_real() {
        assert_eq!(weighted_sum(&[1.0f64, 2.0, 3.0], &[0.25, 0.5, 0.25]), 2.0);
        assert_eq!(weighted_sum(&[4.0f32, 8.0], &[0.5, 0.25]), 4.0);
    }

    #[test]
    fn test_weighted_sum_complex() {
        let xs = [Complex64::new(1.0, 2.0), Complex64::new(3.0, -2.0)];
        let s = weighted_sum(&xs, &[0.5, 0.5]);
        assert_eq!(s, Complex64::new(2.0, 0.0));
    }
}

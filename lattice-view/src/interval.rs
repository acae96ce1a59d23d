//! Integer boxes and flat-index helpers.

use std::fmt;

use smallvec::SmallVec;

use crate::{Result, ViewError};

/// Per-dimension array that stays on the stack for up to 4 dimensions.
pub type DimVec<T> = SmallVec<[T; 4]>;

/// Axis-aligned box on the integer lattice with inclusive bounds.
///
/// A dimension with `max == min - 1` is empty; anything narrower is
/// rejected at construction.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    min: DimVec<i64>,
    max: DimVec<i64>,
}

impl Interval {
    /// Create an interval from explicit inclusive bounds.
    ///
    /// # Errors
    /// Returns [`ViewError::DimensionMismatch`] if the slices differ in length,
    /// or [`ViewError::InvalidInterval`] if `max[d] < min[d] - 1` for some `d`.
    pub fn new(min: &[i64], max: &[i64]) -> Result<Self> {
        if min.len() != max.len() {
            return Err(ViewError::DimensionMismatch {
                expected: min.len(),
                found: max.len(),
            });
        }
        for (dim, (&lo, &hi)) in min.iter().zip(max).enumerate() {
            if hi < lo - 1 {
                return Err(ViewError::InvalidInterval {
                    dim,
                    min: lo,
                    max: hi,
                });
            }
        }
        Ok(Self {
            min: DimVec::from_slice(min),
            max: DimVec::from_slice(max),
        })
    }

    /// Interval `[0, dims[d] - 1]` in every dimension.
    pub fn from_dims(dims: &[usize]) -> Self {
        Self {
            min: dims.iter().map(|_| 0).collect(),
            max: dims.iter().map(|&d| d as i64 - 1).collect(),
        }
    }

    /// Interval starting at `min` with the given sizes.
    ///
    /// # Errors
    /// Returns [`ViewError::DimensionMismatch`] if the slices differ in length.
    pub fn from_min_size(min: &[i64], dims: &[usize]) -> Result<Self> {
        if min.len() != dims.len() {
            return Err(ViewError::DimensionMismatch {
                expected: min.len(),
                found: dims.len(),
            });
        }
        Ok(Self {
            min: DimVec::from_slice(min),
            max: min
                .iter()
                .zip(dims)
                .map(|(&m, &d)| m + d as i64 - 1)
                .collect(),
        })
    }

    #[inline]
    pub fn num_dimensions(&self) -> usize {
        self.min.len()
    }

    #[inline]
    pub fn min(&self, d: usize) -> i64 {
        self.min[d]
    }

    #[inline]
    pub fn max(&self, d: usize) -> i64 {
        self.max[d]
    }

    #[inline]
    pub fn mins(&self) -> &[i64] {
        &self.min
    }

    #[inline]
    pub fn maxs(&self) -> &[i64] {
        &self.max
    }

    /// Number of lattice points along dimension `d`.
    #[inline]
    pub fn dimension(&self, d: usize) -> usize {
        (self.max[d] - self.min[d] + 1) as usize
    }

    pub fn dimensions(&self) -> DimVec<usize> {
        (0..self.num_dimensions()).map(|d| self.dimension(d)).collect()
    }

    /// Total number of lattice points.
    pub fn size(&self) -> usize {
        (0..self.num_dimensions()).map(|d| self.dimension(d)).product()
    }

    pub fn is_empty(&self) -> bool {
        (0..self.num_dimensions()).any(|d| self.dimension(d) == 0)
    }

    pub fn contains(&self, position: &[i64]) -> bool {
        position.len() == self.num_dimensions()
            && position
                .iter()
                .enumerate()
                .all(|(d, &p)| p >= self.min[d] && p <= self.max[d])
    }

    /// Whether `other` lies entirely inside `self`. Empty intervals are
    /// contained in everything of the same rank.
    pub fn contains_interval(&self, other: &Interval) -> bool {
        if other.num_dimensions() != self.num_dimensions() {
            return false;
        }
        if other.is_empty() {
            return true;
        }
        (0..self.num_dimensions())
            .all(|d| other.min[d] >= self.min[d] && other.max[d] <= self.max[d])
    }

    /// Shift by `offset`.
    ///
    /// # Errors
    /// Returns [`ViewError::DimensionMismatch`] on a rank mismatch.
    pub fn translate(&self, offset: &[i64]) -> Result<Interval> {
        self.check_rank(offset.len())?;
        Ok(Self {
            min: self.min.iter().zip(offset).map(|(&m, &o)| m + o).collect(),
            max: self.max.iter().zip(offset).map(|(&m, &o)| m + o).collect(),
        })
    }

    /// Grow by `border[d]` on both sides of every dimension.
    ///
    /// # Errors
    /// Returns [`ViewError::DimensionMismatch`] on a rank mismatch.
    pub fn expand(&self, border: &[i64]) -> Result<Interval> {
        self.check_rank(border.len())?;
        Interval::new(
            &self
                .min
                .iter()
                .zip(border)
                .map(|(&m, &b)| m - b)
                .collect::<DimVec<_>>(),
            &self
                .max
                .iter()
                .zip(border)
                .map(|(&m, &b)| m + b)
                .collect::<DimVec<_>>(),
        )
    }

    /// Reorder axes so that axis `i` of the result is axis `perm[i]` of `self`.
    pub(crate) fn permute(&self, perm: &[usize]) -> Interval {
        Self {
            min: perm.iter().map(|&p| self.min[p]).collect(),
            max: perm.iter().map(|&p| self.max[p]).collect(),
        }
    }

    pub(crate) fn check_rank(&self, found: usize) -> Result<()> {
        if found != self.num_dimensions() {
            return Err(ViewError::DimensionMismatch {
                expected: self.num_dimensions(),
                found,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interval[")?;
        for d in 0..self.num_dimensions() {
            if d > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}..={}", self.min[d], self.max[d])?;
        }
        write!(f, "]")
    }
}

/// Anything with fixed integer bounds.
pub trait Bounded {
    fn interval(&self) -> &Interval;
}

impl Bounded for Interval {
    fn interval(&self) -> &Interval {
        self
    }
}

/// Column-major position of a flat index inside `dims` (dimension 0 fastest).
pub fn index_to_position(mut index: usize, dims: &[usize], position: &mut [i64]) {
    for (p, &d) in position.iter_mut().zip(dims) {
        if d == 0 {
            *p = 0;
            continue;
        }
        *p = (index % d) as i64;
        index /= d;
    }
}

/// Column-major flat index of a zero-based position inside `dims`.
pub fn position_to_index(position: &[i64], dims: &[usize]) -> usize {
    let mut index = 0usize;
    for (&p, &d) in position.iter().zip(dims).rev() {
        index = index * d + p as usize;
    }
    index
}

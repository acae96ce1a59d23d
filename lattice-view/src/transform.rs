//! Elementary coordinate transforms and boundary extensions.

use std::fmt;
use std::sync::Arc;

use crate::interval::{DimVec, Interval};

/// How an extended source answers queries outside its native bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extension<T> {
    /// Every outside position reads this value.
    Constant(T),
    /// Clamp to the nearest edge sample.
    Border,
    /// Mirror without repeating the edge sample: `..., 2, 1, [0, 1, 2, ...]`.
    MirrorSingle,
    /// Mirror repeating the edge sample: `..., 1, 0, [0, 1, 2, ...]`.
    MirrorDouble,
    /// Wrap around.
    Periodic,
}

impl<T: Copy> Extension<T> {
    /// Fold coordinate `p` into `[min, max]`, or `None` when the position
    /// reads the constant.
    #[inline]
    pub fn fold(&self, p: i64, min: i64, max: i64) -> Option<i64> {
        if p >= min && p <= max {
            return Some(p);
        }
        let size = max - min + 1;
        let r = p - min;
        let folded = match self {
            Extension::Constant(_) => return None,
            Extension::Border => r.clamp(0, size - 1),
            Extension::Periodic => r.rem_euclid(size),
            Extension::MirrorSingle => {
                if size == 1 {
                    0
                } else {
                    let period = 2 * (size - 1);
                    let m = r.rem_euclid(period);
                    if m >= size {
                        period - m
                    } else {
                        m
                    }
                }
            }
            Extension::MirrorDouble => {
                let period = 2 * size;
                let m = r.rem_euclid(period);
                if m >= size {
                    period - 1 - m
                } else {
                    m
                }
            }
        };
        Some(min + folded)
    }

    pub fn constant(&self) -> Option<T> {
        match self {
            Extension::Constant(v) => Some(*v),
            _ => None,
        }
    }
}

/// A rank-preserving coordinate map the builder cannot see through.
///
/// `apply` maps a position in the outer (view) space to the inner space.
pub trait CoordinateMap: Send + Sync {
    fn num_dimensions(&self) -> usize;

    fn apply(&self, outer: &[i64], inner: &mut [i64]);
}

/// One link of a view chain.
#[derive(Clone)]
pub enum Transform<T> {
    /// Restrict to an interval. Only constrains bounds.
    Restrict(Interval),
    /// The view at `x` shows the inner space at `x - offset`.
    Translate(DimVec<i64>),
    /// Axis `i` of the view is axis `perm[i]` of the inner space.
    Permute(DimVec<usize>),
    /// Extend the inner space, defined on `bounds`, to infinity.
    Extend {
        bounds: Interval,
        extension: Extension<T>,
    },
    /// Opaque user map.
    Map(Arc<dyn CoordinateMap>),
}

impl<T: fmt::Debug> fmt::Debug for Transform<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Restrict(iv) => f.debug_tuple("Restrict").field(iv).finish(),
            Transform::Translate(t) => f.debug_tuple("Translate").field(t).finish(),
            Transform::Permute(p) => f.debug_tuple("Permute").field(p).finish(),
            Transform::Extend { bounds, extension } => f
                .debug_struct("Extend")
                .field("bounds", bounds)
                .field("extension", extension)
                .finish(),
            Transform::Map(m) => write!(f, "Map(<{} dims>)", m.num_dimensions()),
        }
    }
}

/// Axis permutation plus offset: `inner[axis[i]] = outer[i] + offset[i]`.
///
/// Any chain of translations and permutations folds into one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisMap {
    pub(crate) axis: DimVec<usize>,
    pub(crate) offset: DimVec<i64>,
}

impl AxisMap {
    pub fn identity(n: usize) -> Self {
        Self {
            axis: (0..n).collect(),
            offset: DimVec::from_elem(0, n),
        }
    }

    pub fn axis(&self) -> &[usize] {
        &self.axis
    }

    pub fn offset(&self) -> &[i64] {
        &self.offset
    }

    pub fn is_identity(&self) -> bool {
        self.is_unpermuted() && self.offset.iter().all(|&o| o == 0)
    }

    pub fn is_unpermuted(&self) -> bool {
        self.axis.iter().enumerate().all(|(i, &a)| a == i)
    }

    /// Fold an inner translation: the inner space at `y` shows the next space
    /// at `y - t`.
    pub(crate) fn then_translate(&mut self, t: &[i64]) {
        for (i, o) in self.offset.iter_mut().enumerate() {
            *o -= t[self.axis[i]];
        }
    }

    /// Fold an inner permutation: `next[perm[j]] = inner[j]`.
    pub(crate) fn then_permute(&mut self, perm: &[usize]) {
        for a in self.axis.iter_mut() {
            *a = perm[*a];
        }
    }

    #[inline]
    pub(crate) fn apply(&self, outer: &[i64], inner: &mut [i64]) {
        for (i, &x) in outer.iter().enumerate() {
            inner[self.axis[i]] = x + self.offset[i];
        }
    }

    /// Image of an interval under the map.
    pub(crate) fn apply_interval(&self, interval: &Interval) -> Interval {
        let n = self.axis.len();
        let mut min = DimVec::from_elem(0i64, n);
        let mut max = DimVec::from_elem(0i64, n);
        self.apply(interval.mins(), &mut min);
        self.apply(interval.maxs(), &mut max);
        // Rank and min <= max + 1 are preserved by a permutation plus offset.
        match Interval::new(&min, &max) {
            Ok(iv) => iv,
            Err(_) => unreachable!("axis map preserves interval validity"),
        }
    }
}

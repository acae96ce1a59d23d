//! Positioning and random-access traits.
//!
//! Accessors are cheap, stateful cursors: each holds its own position and
//! reads (or writes) the sample there. Sources hand out as many accessors as
//! callers ask for, so workers never share a mutable position.

use crate::interval::Interval;
use crate::strided::StridedLayout;
use crate::Result;

/// Something with an integer position.
pub trait Localizable {
    fn num_dimensions(&self) -> usize;

    fn position(&self) -> &[i64];

    fn localize(&self, position: &mut [i64]) {
        position.copy_from_slice(self.position());
    }
}

/// Something whose integer position can be changed.
///
/// Only [`move_by`](Positionable::move_by) is required; the other moves are
/// expressed through it. Implementations override them when they can do
/// better.
pub trait Positionable: Localizable {
    fn move_by(&mut self, distance: i64, d: usize);

    #[inline]
    fn fwd(&mut self, d: usize) {
        self.move_by(1, d);
    }

    #[inline]
    fn bck(&mut self, d: usize) {
        self.move_by(-1, d);
    }

    #[inline]
    fn set_position_dim(&mut self, value: i64, d: usize) {
        let current = self.position()[d];
        self.move_by(value - current, d);
    }

    fn set_position(&mut self, position: &[i64]) {
        for (d, &p) in position.iter().enumerate() {
            self.set_position_dim(p, d);
        }
    }

    fn move_all(&mut self, distance: &[i64]) {
        for (d, &m) in distance.iter().enumerate() {
            if m != 0 {
                self.move_by(m, d);
            }
        }
    }
}

/// Read access to the sample at the current position.
///
/// Reading outside the region the accessor was built for panics; it is
/// never undefined behaviour.
pub trait RandomAccess: Positionable {
    type Sample: Copy;

    fn get(&self) -> Self::Sample;
}

/// Read-write access to the sample at the current position.
pub trait RandomAccessMut: RandomAccess {
    fn set(&mut self, value: Self::Sample);
}

/// A source of [`RandomAccess`] accessors, bounded or not.
pub trait RandomAccessible {
    type Sample: Copy;

    type Access<'a>: RandomAccess<Sample = Self::Sample>
    where
        Self: 'a;

    fn num_dimensions(&self) -> usize;

    /// Region where the source is defined, `None` for infinite sources.
    fn bounds(&self) -> Option<Interval>;

    /// Accessor valid everywhere the source is defined. It starts at the
    /// minimum of [`bounds`](RandomAccessible::bounds), or the origin.
    fn random_access(&self) -> Self::Access<'_>;

    /// Accessor that only needs to be valid inside `interval`. Sources may
    /// use the hint to build a cheaper accessor. It starts at `interval.min`.
    ///
    /// # Errors
    /// Returns [`ViewError::DimensionMismatch`](crate::ViewError::DimensionMismatch)
    /// when `interval` has the wrong rank.
    fn random_access_in(&self, interval: &Interval) -> Result<Self::Access<'_>> {
        interval.check_rank(self.num_dimensions())?;
        let mut access = self.random_access();
        access.set_position(interval.mins());
        Ok(access)
    }

    /// Dense strided layout, when the samples live in a single slice.
    fn strided_layout(&self) -> Option<StridedLayout<'_, Self::Sample>> {
        None
    }
}

/// A handle from which several workers can each create a writing accessor.
///
/// The handle keeps the storage exclusively borrowed for its lifetime; the
/// accessors it creates share that borrow.
pub trait WriteHandle: Sync {
    type Sample: Copy;

    type AccessMut: RandomAccessMut<Sample = Self::Sample>;

    /// Create a writing accessor positioned at the storage minimum.
    ///
    /// # Safety
    /// Accessors created from the same handle may be used at the same time
    /// only if no position is written by one of them while another reads or
    /// writes it.
    unsafe fn access_mut(&self) -> Self::AccessMut;
}

/// Storage that can be written through [`WriteHandle`]s.
pub trait RandomAccessibleMut: RandomAccessible {
    type Writer<'a>: WriteHandle<Sample = Self::Sample>
    where
        Self: 'a;

    fn writer(&mut self) -> Self::Writer<'_>;
}

//! Strided addressing shared by dense storage and direct view accessors.

use std::marker::PhantomData;

use crate::access::{Localizable, Positionable, RandomAccess, RandomAccessMut};
use crate::interval::{DimVec, Interval};

/// Column-major strides (dimension 0 varies fastest).
pub fn col_major_strides(dims: &[usize]) -> DimVec<isize> {
    let mut strides = DimVec::with_capacity(dims.len());
    let mut s = 1isize;
    for &d in dims {
        strides.push(s);
        s *= d as isize;
    }
    strides
}

/// A dense slice addressed by `index = Σ (p[d] - min[d]) * strides[d]`.
#[derive(Debug, Clone, Copy)]
pub struct StridedLayout<'a, T> {
    pub data: &'a [T],
    pub interval: &'a Interval,
    pub strides: &'a [isize],
}

/// Position plus the flat index it maps to, updated incrementally.
#[derive(Debug, Clone)]
pub(crate) struct StridedCursor {
    position: DimVec<i64>,
    strides: DimVec<isize>,
    index: isize,
}

impl StridedCursor {
    /// `base` is the flat index of the lattice origin, which may lie
    /// outside the slice.
    pub(crate) fn new(strides: DimVec<isize>, base: isize, start: &[i64]) -> Self {
        let index = base
            + start
                .iter()
                .zip(&strides)
                .map(|(&p, &s)| p as isize * s)
                .sum::<isize>();
        Self {
            position: DimVec::from_slice(start),
            strides,
            index,
        }
    }

    /// Cursor over a storage layout, starting at its minimum.
    pub(crate) fn for_interval(interval: &Interval, strides: &[isize]) -> Self {
        let base = -interval
            .mins()
            .iter()
            .zip(strides)
            .map(|(&m, &s)| m as isize * s)
            .sum::<isize>();
        Self::new(DimVec::from_slice(strides), base, interval.mins())
    }

    #[inline]
    pub(crate) fn index(&self) -> isize {
        self.index
    }

    #[inline]
    pub(crate) fn position(&self) -> &[i64] {
        &self.position
    }

    #[inline]
    pub(crate) fn move_by(&mut self, distance: i64, d: usize) {
        self.position[d] += distance;
        self.index += distance as isize * self.strides[d];
    }
}

/// Turn a possibly negative flat index into a slice index, panicking when it
/// falls outside `0..len`.
#[inline]
fn checked_index(index: isize, len: usize) -> usize {
    match usize::try_from(index) {
        Ok(i) if i < len => i,
        _ => panic!("flat index {index} out of bounds for storage of length {len}"),
    }
}

/// Read accessor over a dense slice.
#[derive(Debug, Clone)]
pub struct ArrayAccess<'a, T> {
    data: &'a [T],
    cursor: StridedCursor,
}

impl<'a, T> ArrayAccess<'a, T> {
    pub(crate) fn new(data: &'a [T], cursor: StridedCursor) -> Self {
        Self { data, cursor }
    }
}

impl<T> Localizable for ArrayAccess<'_, T> {
    #[inline]
    fn num_dimensions(&self) -> usize {
        self.cursor.position.len()
    }

    #[inline]
    fn position(&self) -> &[i64] {
        self.cursor.position()
    }
}

impl<T> Positionable for ArrayAccess<'_, T> {
    #[inline]
    fn move_by(&mut self, distance: i64, d: usize) {
        self.cursor.move_by(distance, d);
    }
}

impl<T: Copy> RandomAccess for ArrayAccess<'_, T> {
    type Sample = T;

    #[inline]
    fn get(&self) -> T {
        self.data[checked_index(self.cursor.index, self.data.len())]
    }
}

/// A raw pointer wrapper that is `Send` + `Sync`.
///
/// # Safety
/// Whoever dereferences the pointer must guarantee that it is valid for the
/// duration of the access and that concurrent users touch disjoint elements.
pub(crate) struct SendPtr<T>(pub(crate) *mut T);

impl<T> Clone for SendPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SendPtr<T> {}

unsafe impl<T> Send for SendPtr<T> {}
unsafe impl<T> Sync for SendPtr<T> {}

/// Read-write accessor over a dense slice, created from a write handle.
pub struct ArrayAccessMut<'a, T> {
    ptr: SendPtr<T>,
    len: usize,
    cursor: StridedCursor,
    _marker: PhantomData<&'a mut [T]>,
}

impl<'a, T> ArrayAccessMut<'a, T> {
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` elements for `'a`.
    pub(crate) unsafe fn new(ptr: SendPtr<T>, len: usize, cursor: StridedCursor) -> Self {
        Self {
            ptr,
            len,
            cursor,
            _marker: PhantomData,
        }
    }
}

impl<T> Localizable for ArrayAccessMut<'_, T> {
    #[inline]
    fn num_dimensions(&self) -> usize {
        self.cursor.position.len()
    }

    #[inline]
    fn position(&self) -> &[i64] {
        self.cursor.position()
    }
}

impl<T> Positionable for ArrayAccessMut<'_, T> {
    #[inline]
    fn move_by(&mut self, distance: i64, d: usize) {
        self.cursor.move_by(distance, d);
    }
}

impl<T: Copy> RandomAccess for ArrayAccessMut<'_, T> {
    type Sample = T;

    #[inline]
    fn get(&self) -> T {
        let i = checked_index(self.cursor.index, self.len);
        // SAFETY: `i < len` and the pointer is valid for `len` elements for 'a.
        unsafe { *self.ptr.0.add(i) }
    }
}

impl<T: Copy> RandomAccessMut for ArrayAccessMut<'_, T> {
    #[inline]
    fn set(&mut self, value: T) {
        let i = checked_index(self.cursor.index, self.len);
        // SAFETY: `i < len`; no other accessor touches this element meanwhile,
        // per the contract of `WriteHandle::access_mut`.
        unsafe {
            *self.ptr.0.add(i) = value;
        }
    }
}

//! Storage backends: one dense slice, or blocks of whole hyperplanes.

use std::sync::Arc;

use crate::access::{
    Localizable, Positionable, RandomAccess, RandomAccessMut, RandomAccessible,
    RandomAccessibleMut, WriteHandle,
};
use crate::interval::{Bounded, DimVec, Interval};
use crate::iterable::IterationOrder;
use crate::strided::{
    col_major_strides, ArrayAccess, ArrayAccessMut, SendPtr, StridedCursor, StridedLayout,
};
use crate::{Result, ViewError};

/// Element count of a box, or [`ViewError::SizeOverflow`].
pub fn checked_size(dims: &[usize]) -> Result<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or(ViewError::SizeOverflow)
}

// ============================================================================
// ArrayImg
// ============================================================================

/// Dense column-major image in a single allocation.
#[derive(Debug, Clone)]
pub struct ArrayImg<T> {
    data: Vec<T>,
    interval: Interval,
    strides: DimVec<isize>,
}

impl<T: Copy + Default> ArrayImg<T> {
    /// Zero-filled image with origin at 0.
    ///
    /// # Errors
    /// Returns [`ViewError::SizeOverflow`] if the element count overflows.
    pub fn new(dims: &[usize]) -> Result<Self> {
        let len = checked_size(dims)?;
        Ok(Self {
            data: vec![T::default(); len],
            interval: Interval::from_dims(dims),
            strides: col_major_strides(dims),
        })
    }
}

impl<T: Copy> ArrayImg<T> {
    /// Wrap existing column-major data.
    ///
    /// # Errors
    /// Returns [`ViewError::DimensionMismatch`] when `data.len()` is not the
    /// product of `dims`.
    pub fn from_vec(dims: &[usize], data: Vec<T>) -> Result<Self> {
        let len = checked_size(dims)?;
        if data.len() != len {
            return Err(ViewError::DimensionMismatch {
                expected: len,
                found: data.len(),
            });
        }
        Ok(Self {
            data,
            interval: Interval::from_dims(dims),
            strides: col_major_strides(dims),
        })
    }

    /// Build an image by evaluating `f` at every position, in flat order.
    ///
    /// # Errors
    /// Returns [`ViewError::SizeOverflow`] if the element count overflows.
    pub fn from_fn(dims: &[usize], mut f: impl FnMut(&[i64]) -> T) -> Result<Self> {
        let len = checked_size(dims)?;
        let mut data = Vec::with_capacity(len);
        let mut pos: DimVec<i64> = dims.iter().map(|_| 0).collect();
        for _ in 0..len {
            data.push(f(&pos));
            for d in 0..dims.len() {
                pos[d] += 1;
                if (pos[d] as usize) < dims[d] {
                    break;
                }
                pos[d] = 0;
            }
        }
        Self::from_vec(dims, data)
    }

    /// Move the origin so the image covers `[min, min + dims - 1]`.
    ///
    /// # Errors
    /// Returns [`ViewError::DimensionMismatch`] on a rank mismatch.
    pub fn with_min(mut self, min: &[i64]) -> Result<Self> {
        self.interval = Interval::from_min_size(min, &self.interval.dimensions())?;
        Ok(self)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn dims(&self) -> DimVec<usize> {
        self.interval.dimensions()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn flat_index(&self, position: &[i64]) -> usize {
        assert!(
            self.interval.contains(position),
            "position {position:?} outside {:?}",
            self.interval
        );
        position
            .iter()
            .enumerate()
            .map(|(d, &p)| (p - self.interval.min(d)) as usize * self.strides[d] as usize)
            .sum()
    }

    /// Sample at `position`.
    ///
    /// # Panics
    /// Panics when `position` lies outside the image.
    pub fn get(&self, position: &[i64]) -> T {
        self.data[self.flat_index(position)]
    }

    /// # Panics
    /// Panics when `position` lies outside the image.
    pub fn set(&mut self, position: &[i64], value: T) {
        let i = self.flat_index(position);
        self.data[i] = value;
    }

    /// Flat iteration order of this image.
    pub fn iteration_order(&self) -> IterationOrder {
        IterationOrder::Flat(self.interval.clone())
    }
}

impl<T> Bounded for ArrayImg<T> {
    fn interval(&self) -> &Interval {
        &self.interval
    }
}

impl<T: Copy> RandomAccessible for ArrayImg<T> {
    type Sample = T;
    type Access<'a> = ArrayAccess<'a, T> where Self: 'a;

    fn num_dimensions(&self) -> usize {
        self.interval.num_dimensions()
    }

    fn bounds(&self) -> Option<Interval> {
        Some(self.interval.clone())
    }

    fn random_access(&self) -> ArrayAccess<'_, T> {
        ArrayAccess::new(
            &self.data,
            StridedCursor::for_interval(&self.interval, &self.strides),
        )
    }

    fn strided_layout(&self) -> Option<StridedLayout<'_, T>> {
        Some(StridedLayout {
            data: &self.data,
            interval: &self.interval,
            strides: &self.strides,
        })
    }
}

/// Write handle over an [`ArrayImg`].
pub struct ArrayWriter<'a, T> {
    ptr: SendPtr<T>,
    len: usize,
    interval: &'a Interval,
    strides: &'a [isize],
}

impl<'a, T: Copy + 'a> WriteHandle for ArrayWriter<'a, T> {
    type Sample = T;
    type AccessMut = ArrayAccessMut<'a, T>;

    unsafe fn access_mut(&self) -> ArrayAccessMut<'a, T> {
        ArrayAccessMut::new(
            self.ptr,
            self.len,
            StridedCursor::for_interval(self.interval, self.strides),
        )
    }
}

impl<T: Copy + Send + Sync> RandomAccessibleMut for ArrayImg<T> {
    type Writer<'a> = ArrayWriter<'a, T> where Self: 'a;

    fn writer(&mut self) -> ArrayWriter<'_, T> {
        ArrayWriter {
            ptr: SendPtr(self.data.as_mut_ptr()),
            len: self.data.len(),
            interval: &self.interval,
            strides: &self.strides,
        }
    }
}

// ============================================================================
// CellImg
// ============================================================================

/// Image split along its last dimension into blocks of whole hyperplanes.
///
/// Flat indices are the same as for an [`ArrayImg`] of the same shape; block
/// `b` holds indices `[b * cell_len, (b + 1) * cell_len)`.
#[derive(Debug, Clone)]
pub struct CellImg<T> {
    cells: Vec<Vec<T>>,
    cell_len: usize,
    interval: Interval,
    strides: DimVec<isize>,
}

impl<T: Copy + Default> CellImg<T> {
    /// Zero-filled image whose blocks hold at most `max_block_len` elements,
    /// or a single hyperplane when one hyperplane is already larger.
    ///
    /// # Errors
    /// Returns [`ViewError::SizeOverflow`] if the element count overflows.
    pub fn new(dims: &[usize], max_block_len: usize) -> Result<Self> {
        let total = checked_size(dims)?;
        let plane = match dims.split_last() {
            Some((_, rest)) => checked_size(rest)?,
            None => 1,
        };
        let planes_per_cell = (max_block_len / plane.max(1)).max(1);
        let cell_len = planes_per_cell.saturating_mul(plane).max(1);
        let mut cells = Vec::with_capacity(total.div_ceil(cell_len));
        let mut remaining = total;
        while remaining > 0 {
            let n = remaining.min(cell_len);
            cells.push(vec![T::default(); n]);
            remaining -= n;
        }
        Ok(Self {
            cells,
            cell_len,
            interval: Interval::from_dims(dims),
            strides: col_major_strides(dims),
        })
    }
}

impl<T: Copy> CellImg<T> {
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cell_len(&self) -> usize {
        self.cell_len
    }

    /// # Panics
    /// Panics when `position` lies outside the image.
    pub fn get(&self, position: &[i64]) -> T {
        let mut a = self.random_access();
        a.set_position(position);
        a.get()
    }
}

impl<T> Bounded for CellImg<T> {
    fn interval(&self) -> &Interval {
        &self.interval
    }
}

fn split_index(index: isize, cell_len: usize, total: usize) -> (usize, usize) {
    match usize::try_from(index) {
        Ok(i) if i < total => (i / cell_len, i % cell_len),
        _ => panic!("flat index {index} out of bounds for storage of length {total}"),
    }
}

/// Read accessor over a [`CellImg`].
#[derive(Debug, Clone)]
pub struct CellAccess<'a, T> {
    cells: &'a [Vec<T>],
    cell_len: usize,
    total: usize,
    cursor: StridedCursor,
}

impl<T> Localizable for CellAccess<'_, T> {
    fn num_dimensions(&self) -> usize {
        self.cursor.position().len()
    }

    fn position(&self) -> &[i64] {
        self.cursor.position()
    }
}

impl<T> Positionable for CellAccess<'_, T> {
    #[inline]
    fn move_by(&mut self, distance: i64, d: usize) {
        self.cursor.move_by(distance, d);
    }
}

impl<T: Copy> RandomAccess for CellAccess<'_, T> {
    type Sample = T;

    #[inline]
    fn get(&self) -> T {
        let (c, i) = split_index(self.cursor.index(), self.cell_len, self.total);
        self.cells[c][i]
    }
}

impl<T: Copy> RandomAccessible for CellImg<T> {
    type Sample = T;
    type Access<'a> = CellAccess<'a, T> where Self: 'a;

    fn num_dimensions(&self) -> usize {
        self.interval.num_dimensions()
    }

    fn bounds(&self) -> Option<Interval> {
        Some(self.interval.clone())
    }

    fn random_access(&self) -> CellAccess<'_, T> {
        CellAccess {
            cells: &self.cells,
            cell_len: self.cell_len,
            total: self.interval.size(),
            cursor: StridedCursor::for_interval(&self.interval, &self.strides),
        }
    }
}

/// Write handle over a [`CellImg`].
pub struct CellWriter<'a, T> {
    cells: Arc<[SendPtr<T>]>,
    cell_len: usize,
    total: usize,
    interval: &'a Interval,
    strides: &'a [isize],
}

/// Read-write accessor over a [`CellImg`].
pub struct CellAccessMut<'a, T> {
    cells: Arc<[SendPtr<T>]>,
    cell_len: usize,
    total: usize,
    cursor: StridedCursor,
    _marker: std::marker::PhantomData<&'a mut [T]>,
}

impl<T> Localizable for CellAccessMut<'_, T> {
    fn num_dimensions(&self) -> usize {
        self.cursor.position().len()
    }

    fn position(&self) -> &[i64] {
        self.cursor.position()
    }
}

impl<T> Positionable for CellAccessMut<'_, T> {
    #[inline]
    fn move_by(&mut self, distance: i64, d: usize) {
        self.cursor.move_by(distance, d);
    }
}

impl<T: Copy> RandomAccess for CellAccessMut<'_, T> {
    type Sample = T;

    #[inline]
    fn get(&self) -> T {
        let (c, i) = split_index(self.cursor.index(), self.cell_len, self.total);
        // SAFETY: `split_index` keeps `i` inside cell `c`; every cell except
        // the last holds exactly `cell_len` elements.
        unsafe { *self.cells[c].0.add(i) }
    }
}

impl<T: Copy> RandomAccessMut for CellAccessMut<'_, T> {
    #[inline]
    fn set(&mut self, value: T) {
        let (c, i) = split_index(self.cursor.index(), self.cell_len, self.total);
        // SAFETY: `i` lies inside cell `c`, and disjoint writes are the
        // caller's guarantee under `WriteHandle::access_mut`.
        unsafe {
            *self.cells[c].0.add(i) = value;
        }
    }
}

impl<'a, T: Copy + 'a> WriteHandle for CellWriter<'a, T> {
    type Sample = T;
    type AccessMut = CellAccessMut<'a, T>;

    unsafe fn access_mut(&self) -> CellAccessMut<'a, T> {
        CellAccessMut {
            cells: self.cells.clone(),
            cell_len: self.cell_len,
            total: self.total,
            cursor: StridedCursor::for_interval(self.interval, self.strides),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Copy + Send + Sync> RandomAccessibleMut for CellImg<T> {
    type Writer<'a> = CellWriter<'a, T> where Self: 'a;

    fn writer(&mut self) -> CellWriter<'_, T> {
        CellWriter {
            cells: self
                .cells
                .iter_mut()
                .map(|c| SendPtr(c.as_mut_ptr()))
                .collect(),
            cell_len: self.cell_len,
            total: self.interval.size(),
            interval: &self.interval,
            strides: &self.strides,
        }
    }
}

// ============================================================================
// Img: backend chosen at allocation time
// ============================================================================

/// Which backend an [`Img`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Array,
    Cell,
}

/// An image whose backend is picked from its size.
#[derive(Debug, Clone)]
pub enum Img<T> {
    Array(ArrayImg<T>),
    Cell(CellImg<T>),
}

impl<T: Copy + Default> Img<T> {
    /// Allocate a dense [`ArrayImg`] when the element count is at most
    /// `max_flat_len`, a [`CellImg`] with blocks of at most `max_flat_len`
    /// elements otherwise.
    ///
    /// # Errors
    /// Returns [`ViewError::SizeOverflow`] if the element count overflows.
    pub fn allocate(dims: &[usize], max_flat_len: usize) -> Result<Self> {
        if checked_size(dims)? <= max_flat_len {
            Ok(Img::Array(ArrayImg::new(dims)?))
        } else {
            Ok(Img::Cell(CellImg::new(dims, max_flat_len)?))
        }
    }
}

impl<T> Img<T> {
    pub fn kind(&self) -> StorageKind {
        match self {
            Img::Array(_) => StorageKind::Array,
            Img::Cell(_) => StorageKind::Cell,
        }
    }
}

impl<T> Bounded for Img<T> {
    fn interval(&self) -> &Interval {
        match self {
            Img::Array(img) => img.interval(),
            Img::Cell(img) => img.interval(),
        }
    }
}

/// Accessor over either backend.
#[derive(Debug, Clone)]
pub enum ImgAccess<'a, T> {
    Array(ArrayAccess<'a, T>),
    Cell(CellAccess<'a, T>),
}

impl<T> Localizable for ImgAccess<'_, T> {
    fn num_dimensions(&self) -> usize {
        match self {
            ImgAccess::Array(a) => a.num_dimensions(),
            ImgAccess::Cell(a) => a.num_dimensions(),
        }
    }

    fn position(&self) -> &[i64] {
        match self {
            ImgAccess::Array(a) => a.position(),
            ImgAccess::Cell(a) => a.position(),
        }
    }
}

impl<T> Positionable for ImgAccess<'_, T> {
    #[inline]
    fn move_by(&mut self, distance: i64, d: usize) {
        match self {
            ImgAccess::Array(a) => a.move_by(distance, d),
            ImgAccess::Cell(a) => a.move_by(distance, d),
        }
    }
}

impl<T: Copy> RandomAccess for ImgAccess<'_, T> {
    type Sample = T;

    #[inline]
    fn get(&self) -> T {
        match self {
            ImgAccess::Array(a) => a.get(),
            ImgAccess::Cell(a) => a.get(),
        }
    }
}

impl<T: Copy> RandomAccessible for Img<T> {
    type Sample = T;
    type Access<'a> = ImgAccess<'a, T> where Self: 'a;

    fn num_dimensions(&self) -> usize {
        self.interval().num_dimensions()
    }

    fn bounds(&self) -> Option<Interval> {
        Some(self.interval().clone())
    }

    fn random_access(&self) -> ImgAccess<'_, T> {
        match self {
            Img::Array(img) => ImgAccess::Array(img.random_access()),
            Img::Cell(img) => ImgAccess::Cell(img.random_access()),
        }
    }

    fn strided_layout(&self) -> Option<StridedLayout<'_, T>> {
        match self {
            Img::Array(img) => img.strided_layout(),
            Img::Cell(_) => None,
        }
    }
}

/// Write handle over either backend.
pub enum ImgWriter<'a, T> {
    Array(ArrayWriter<'a, T>),
    Cell(CellWriter<'a, T>),
}

/// Writing accessor over either backend.
pub enum ImgAccessMut<'a, T> {
    Array(ArrayAccessMut<'a, T>),
    Cell(CellAccessMut<'a, T>),
}

impl<T> Localizable for ImgAccessMut<'_, T> {
    fn num_dimensions(&self) -> usize {
        match self {
            ImgAccessMut::Array(a) => a.num_dimensions(),
            ImgAccessMut::Cell(a) => a.num_dimensions(),
        }
    }

    fn position(&self) -> &[i64] {
        match self {
            ImgAccessMut::Array(a) => a.position(),
            ImgAccessMut::Cell(a) => a.position(),
        }
    }
}

impl<T> Positionable for ImgAccessMut<'_, T> {
    #[inline]
    fn move_by(&mut self, distance: i64, d: usize) {
        match self {
            ImgAccessMut::Array(a) => a.move_by(distance, d),
            ImgAccessMut::Cell(a) => a.move_by(distance, d),
        }
    }
}

impl<T: Copy> RandomAccess for ImgAccessMut<'_, T> {
    type Sample = T;

    #[inline]
    fn get(&self) -> T {
        match self {
            ImgAccessMut::Array(a) => a.get(),
            ImgAccessMut::Cell(a) => a.get(),
        }
    }
}

impl<T: Copy> RandomAccessMut for ImgAccessMut<'_, T> {
    #[inline]
    fn set(&mut self, value: T) {
        match self {
            ImgAccessMut::Array(a) => a.set(value),
            ImgAccessMut::Cell(a) => a.set(value),
        }
    }
}

impl<'a, T: Copy + 'a> WriteHandle for ImgWriter<'a, T> {
    type Sample = T;
    type AccessMut = ImgAccessMut<'a, T>;

    unsafe fn access_mut(&self) -> ImgAccessMut<'a, T> {
        match self {
            ImgWriter::Array(w) => ImgAccessMut::Array(w.access_mut()),
            ImgWriter::Cell(w) => ImgAccessMut::Cell(w.access_mut()),
        }
    }
}

impl<T: Copy + Send + Sync> RandomAccessibleMut for Img<T> {
    type Writer<'a> = ImgWriter<'a, T> where Self: 'a;

    fn writer(&mut self) -> ImgWriter<'_, T> {
        match self {
            Img::Array(img) => ImgWriter::Array(img.writer()),
            Img::Cell(img) => ImgWriter::Cell(img.writer()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_img_from_fn_column_major() {
        let img = ArrayImg::from_fn(&[3, 2], |p| (p[0] + 10 * p[1]) as i32).unwrap();
        assert_eq!(img.as_slice(), &[0, 1, 2, 10, 11, 12]);
        assert_eq!(img.get(&[2, 1]), 12);
    }

    #[test]
    fn test_array_img_from_vec_len_mismatch() {
        let err = ArrayImg::from_vec(&[2, 2], vec![0u8; 3]).unwrap_err();
        assert!(matches!(
            err,
            ViewError::DimensionMismatch {
                expected: 4,
                found: 3
            }
        ));
    }

    #[test]
    fn test_array_img_with_min() {
        let img = ArrayImg::from_fn(&[4], |p| p[0] as f64)
            .unwrap()
            .with_min(&[-2])
            .unwrap();
        assert_eq!(img.get(&[-2]), 0.0);
        assert_eq!(img.get(&[1]), 3.0);
        let mut a = img.random_access();
        assert_eq!(a.position(), &[-2]);
        a.set_position(&[0]);
        assert_eq!(a.get(), 2.0);
    }

    #[test]
    fn test_array_writer_writes_through() {
        let mut img = ArrayImg::<u16>::new(&[2, 2]).unwrap();
        {
            let w = img.writer();
            let mut a = unsafe { w.access_mut() };
            a.set_position(&[1, 1]);
            a.set(7);
            a.bck(0);
            a.set(3);
        }
        assert_eq!(img.as_slice(), &[0, 0, 3, 7]);
    }

    #[test]
    fn test_cell_img_splits_along_last_dimension() {
        let img = CellImg::<f32>::new(&[4, 3, 5], 30).unwrap();
        // 12 elements per plane, 2 planes per cell, 5 planes -> 3 cells
        assert_eq!(img.cell_len(), 24);
        assert_eq!(img.num_cells(), 3);
    }

    #[test]
    fn test_cell_img_plane_larger_than_block() {
        let img = CellImg::<f32>::new(&[10, 10, 2], 8).unwrap();
        assert_eq!(img.cell_len(), 100);
        assert_eq!(img.num_cells(), 2);
    }

    #[test]
    fn test_cell_img_matches_array_img() {
        let dims = [3usize, 4, 5];
        let reference = ArrayImg::from_fn(&dims, |p| (p[0] + 3 * p[1] + 12 * p[2]) as f64).unwrap();
        let mut cells = CellImg::<f64>::new(&dims, 20).unwrap();
        {
            let w = cells.writer();
            let mut a = unsafe { w.access_mut() };
            for z in 0..5 {
                for y in 0..4 {
                    for x in 0..3 {
                        a.set_position(&[x, y, z]);
                        a.set(reference.get(&[x, y, z]));
                    }
                }
            }
        }
        for z in 0..5 {
            for y in 0..4 {
                for x in 0..3 {
                    assert_eq!(cells.get(&[x, y, z]), reference.get(&[x, y, z]));
                }
            }
        }
    }

    #[test]
    fn test_img_allocate_threshold() {
        let flat = Img::<f32>::allocate(&[4, 4], 16).unwrap();
        assert_eq!(flat.kind(), StorageKind::Array);
        assert!(flat.strided_layout().is_some());
        let chunked = Img::<f32>::allocate(&[4, 5], 16).unwrap();
        assert_eq!(chunked.kind(), StorageKind::Cell);
        assert!(chunked.strided_layout().is_none());
    }

    #[test]
    fn test_checked_size_overflow() {
        assert!(matches!(
            checked_size(&[usize::MAX, 2]),
            Err(ViewError::SizeOverflow)
        ));
    }
}

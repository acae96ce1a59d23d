//! Iterable intervals: a bounded view plus a fixed traversal order.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::access::{Localizable, Positionable, RandomAccess, RandomAccessible};
use crate::builder::IterationStrategy;
use crate::interval::{index_to_position, DimVec, Interval};
use crate::view::{View, ViewAccess};
use crate::{Result, ViewError};

static NEXT_ORDER_ID: AtomicU64 = AtomicU64::new(0);

/// Equality-comparable token describing how an iterable is traversed.
///
/// Two iterables with equal tokens visit samples in the same order, so their
/// cursors can be advanced in lockstep without comparing positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IterationOrder {
    /// Flat storage order over a dense column-major region.
    Flat(Interval),
    /// Order known only to one iterable; never equal to another token.
    Unique(u64),
}

impl IterationOrder {
    pub(crate) fn unique() -> Self {
        IterationOrder::Unique(NEXT_ORDER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Forward-only, single-pass traversal.
///
/// A cursor starts before the first element; [`fwd`](Cursor::fwd) moves it
/// onto the next one. Calling [`get`](Cursor::get) or
/// [`localize`](Cursor::localize) before the first `fwd` panics.
pub trait Cursor: Iterator {
    fn has_next(&self) -> bool;

    fn fwd(&mut self);

    /// Advance `steps` elements at once.
    fn jump_fwd(&mut self, steps: usize);

    fn get(&self) -> Self::Item;

    fn localize(&self, position: &mut [i64]);
}

/// Cursor walking a dense slice in storage order.
#[derive(Debug, Clone)]
pub struct FlatCursor<'a, T> {
    data: &'a [T],
    min: DimVec<i64>,
    dims: DimVec<usize>,
    next: usize,
}

impl<'a, T: Copy> FlatCursor<'a, T> {
    fn new(data: &'a [T], bounds: &Interval) -> Self {
        Self {
            data,
            min: DimVec::from_slice(bounds.mins()),
            dims: bounds.dimensions(),
            next: 0,
        }
    }

    fn current(&self) -> usize {
        match self.next.checked_sub(1) {
            Some(i) if i < self.data.len() => i,
            Some(_) => panic!("cursor moved past the last element"),
            None => panic!("cursor used before the first fwd()"),
        }
    }
}

impl<'a, T: Copy> Cursor for FlatCursor<'a, T> {
    #[inline]
    fn has_next(&self) -> bool {
        self.next < self.data.len()
    }

    #[inline]
    fn fwd(&mut self) {
        self.next += 1;
    }

    fn jump_fwd(&mut self, steps: usize) {
        self.next += steps;
    }

    #[inline]
    fn get(&self) -> T {
        self.data[self.current()]
    }

    fn localize(&self, position: &mut [i64]) {
        index_to_position(self.current(), &self.dims, position);
        for (p, m) in position.iter_mut().zip(&self.min) {
            *p += m;
        }
    }
}

impl<'a, T: Copy> Iterator for FlatCursor<'a, T> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<T> {
        let value = self.data.get(self.next).copied();
        if value.is_some() {
            self.next += 1;
        }
        value
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.data.len().saturating_sub(self.next);
        (n, Some(n))
    }
}

/// Cursor walking an interval in raster order (dimension 0 fastest) through
/// a random accessor.
#[derive(Debug, Clone)]
pub struct RasterCursor<A> {
    access: A,
    min: DimVec<i64>,
    max: DimVec<i64>,
    dims: DimVec<usize>,
    size: usize,
    next: usize,
}

impl<A: RandomAccess> RasterCursor<A> {
    pub fn new(access: A, bounds: &Interval) -> Self {
        Self {
            access,
            min: DimVec::from_slice(bounds.mins()),
            max: DimVec::from_slice(bounds.maxs()),
            dims: bounds.dimensions(),
            size: bounds.size(),
            next: 0,
        }
    }

    fn seek(&mut self, index: usize) {
        let mut position: DimVec<i64> = DimVec::from_elem(0, self.min.len());
        index_to_position(index, &self.dims, &mut position);
        for (p, m) in position.iter_mut().zip(&self.min) {
            *p += m;
        }
        self.access.set_position(&position);
    }

    fn assert_on_element(&self) {
        assert!(self.next > 0, "cursor used before the first fwd()");
        assert!(self.next <= self.size, "cursor moved past the last element");
    }
}

impl<A: RandomAccess> Cursor for RasterCursor<A> {
    #[inline]
    fn has_next(&self) -> bool {
        self.next < self.size
    }

    fn fwd(&mut self) {
        if self.next == 0 {
            self.access.set_position(&self.min);
        } else {
            let n = self.min.len();
            for d in 0..n {
                if self.access.position()[d] < self.max[d] || d + 1 == n {
                    self.access.fwd(d);
                    break;
                }
                self.access.set_position_dim(self.min[d], d);
            }
        }
        self.next += 1;
    }

    fn jump_fwd(&mut self, steps: usize) {
        if steps == 0 {
            return;
        }
        self.next += steps;
        if self.next <= self.size {
            self.seek(self.next - 1);
        }
    }

    #[inline]
    fn get(&self) -> A::Sample {
        self.assert_on_element();
        self.access.get()
    }

    fn localize(&self, position: &mut [i64]) {
        self.assert_on_element();
        self.access.localize(position);
    }
}

impl<A: RandomAccess> Iterator for RasterCursor<A> {
    type Item = A::Sample;

    fn next(&mut self) -> Option<A::Sample> {
        if !self.has_next() {
            return None;
        }
        self.fwd();
        Some(self.access.get())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.size.saturating_sub(self.next);
        (n, Some(n))
    }
}

/// Cursor over an [`IterableView`], flat or raster.
pub enum ViewCursor<'v, S: RandomAccessible + 'v> {
    Flat(FlatCursor<'v, S::Sample>),
    Raster(RasterCursor<ViewAccess<'v, S>>),
}

impl<'v, S: RandomAccessible + 'v> Cursor for ViewCursor<'v, S> {
    fn has_next(&self) -> bool {
        match self {
            ViewCursor::Flat(c) => c.has_next(),
            ViewCursor::Raster(c) => c.has_next(),
        }
    }

    fn fwd(&mut self) {
        match self {
            ViewCursor::Flat(c) => c.fwd(),
            ViewCursor::Raster(c) => c.fwd(),
        }
    }

    fn jump_fwd(&mut self, steps: usize) {
        match self {
            ViewCursor::Flat(c) => c.jump_fwd(steps),
            ViewCursor::Raster(c) => c.jump_fwd(steps),
        }
    }

    fn get(&self) -> S::Sample {
        match self {
            ViewCursor::Flat(c) => c.get(),
            ViewCursor::Raster(c) => c.get(),
        }
    }

    fn localize(&self, position: &mut [i64]) {
        match self {
            ViewCursor::Flat(c) => c.localize(position),
            ViewCursor::Raster(c) => c.localize(position),
        }
    }
}

impl<'v, S: RandomAccessible + 'v> Iterator for ViewCursor<'v, S> {
    type Item = S::Sample;

    #[inline]
    fn next(&mut self) -> Option<S::Sample> {
        match self {
            ViewCursor::Flat(c) => c.next(),
            ViewCursor::Raster(c) => c.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            ViewCursor::Flat(c) => c.size_hint(),
            ViewCursor::Raster(c) => c.size_hint(),
        }
    }
}

impl<'v, S: RandomAccessible + 'v> ExactSizeIterator for ViewCursor<'v, S> {}

/// A bounded view materialized for traversal.
///
/// The iterable itself is immutable; every cursor it hands out is an
/// independent single-pass traversal.
pub struct IterableView<'v, 'a, S: RandomAccessible> {
    view: &'v View<'a, S>,
    bounds: &'v Interval,
    strategy: IterationStrategy,
    order: &'v IterationOrder,
}

impl<'v, 'a, S: RandomAccessible> IterableView<'v, 'a, S> {
    pub(crate) fn new(view: &'v View<'a, S>) -> Result<Self> {
        let bounds = view.bounds().ok_or(ViewError::Unbounded)?;
        let (strategy, order) = view.iteration()?;
        Ok(Self {
            view,
            bounds,
            strategy: *strategy,
            order,
        })
    }

    pub fn size(&self) -> usize {
        self.bounds.size()
    }

    pub fn interval(&self) -> &Interval {
        self.bounds
    }

    pub fn strategy(&self) -> IterationStrategy {
        self.strategy
    }

    pub fn iteration_order(&self) -> &IterationOrder {
        self.order
    }

    /// True when cursors of both iterables visit positions in the same
    /// sequence.
    pub fn equal_iteration_order<T: RandomAccessible>(&self, other: &IterableView<'_, '_, T>) -> bool {
        self.order == other.order
    }

    /// The sample at the first iteration position, `None` when empty.
    pub fn first_element(&self) -> Option<S::Sample> {
        self.cursor().next()
    }

    /// Cursor in the iteration order.
    pub fn cursor(&self) -> ViewCursor<'v, S> {
        if self.strategy == IterationStrategy::Flat {
            if let Some(data) = self.view.flat_slice() {
                return ViewCursor::Flat(FlatCursor::new(data, self.bounds));
            }
        }
        self.localizing_cursor()
    }

    /// Cursor that keeps track of its position at every step.
    pub fn localizing_cursor(&self) -> ViewCursor<'v, S> {
        ViewCursor::Raster(RasterCursor::new(self.view.bounded_access(), self.bounds))
    }

    pub fn iter(&self) -> ViewCursor<'v, S> {
        self.cursor()
    }
}

impl<'v, 'a, S: RandomAccessible> IntoIterator for &IterableView<'v, 'a, S> {
    type Item = S::Sample;
    type IntoIter = ViewCursor<'v, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.cursor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::img::ArrayImg;
    use crate::transform::Extension;

    fn ramp(dims: &[usize]) -> ArrayImg<i64> {
        ArrayImg::from_fn(dims, |p| p.iter().rev().fold(0, |acc, &x| acc * 100 + x)).unwrap()
    }

    #[test]
    fn test_full_view_iterates_flat() {
        let img = ramp(&[3, 2]);
        let view = View::new(&img);
        let it = view.materialize().unwrap();
        assert_eq!(it.strategy(), IterationStrategy::Flat);
        assert_eq!(it.size(), 6);
        assert_eq!(it.iter().collect::<Vec<_>>(), img.as_slice().to_vec());
        assert_eq!(it.iteration_order(), &img.iteration_order());
    }

    #[test]
    fn test_restricted_view_iterates_raster() {
        let img = ramp(&[4, 3]);
        let view = View::new(&img)
            .interval(Interval::new(&[1, 1], &[2, 2]).unwrap())
            .unwrap();
        let it = view.materialize().unwrap();
        assert_eq!(it.strategy(), IterationStrategy::Raster);
        assert_eq!(it.iter().collect::<Vec<_>>(), vec![101, 102, 201, 202]);
        assert!(matches!(it.iteration_order(), IterationOrder::Unique(_)));
    }

    #[test]
    fn test_equal_tokens_for_same_region() {
        let img = ramp(&[4, 3]);
        let a = View::new(&img);
        let b = View::new(&img).translate(&[0, 0]).unwrap();
        let (ia, ib) = (a.materialize().unwrap(), b.materialize().unwrap());
        assert!(ia.equal_iteration_order(&ib));
    }

    #[test]
    fn test_permuted_token_differs() {
        let img = ramp(&[3, 3]);
        let a = View::new(&img);
        let b = View::new(&img).permute(&[1, 0]).unwrap();
        let (ia, ib) = (a.materialize().unwrap(), b.materialize().unwrap());
        assert!(!ia.equal_iteration_order(&ib));
        assert_eq!(ib.strategy(), IterationStrategy::Raster);
    }

    #[test]
    fn test_unique_tokens_never_repeat() {
        let img = ramp(&[3, 3]);
        let p = View::new(&img).permute(&[1, 0]).unwrap();
        let q = p.clone();
        let (ip, iq) = (p.materialize().unwrap(), q.materialize().unwrap());
        assert_ne!(ip.iteration_order(), iq.iteration_order());
        // The same view keeps its token.
        assert_eq!(ip.iteration_order(), p.materialize().unwrap().iteration_order());
    }

    #[test]
    fn test_localizing_cursor_tracks_position() {
        let img = ramp(&[3, 2]);
        let view = View::new(&img).translate(&[5, -1]).unwrap();
        let it = view.materialize().unwrap();
        let mut c = it.localizing_cursor();
        let mut pos = [0i64; 2];
        let mut seen = Vec::new();
        while c.has_next() {
            c.fwd();
            c.localize(&mut pos);
            seen.push((pos, c.get()));
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[0], ([5, -1], 0));
        assert_eq!(seen[4], ([6, 0], 101));
    }

    #[test]
    fn test_flat_cursor_localizes() {
        let img = ramp(&[3, 2]);
        let view = View::new(&img);
        let it = view.materialize().unwrap();
        let mut c = it.cursor();
        c.jump_fwd(5);
        let mut pos = [0i64; 2];
        c.localize(&mut pos);
        assert_eq!(pos, [1, 1]);
        assert_eq!(c.get(), 101);
    }

    #[test]
    fn test_jump_matches_stepping() {
        let img = ramp(&[4, 3]);
        let view = View::new(&img).swap_axes(0, 1).unwrap();
        let it = view.materialize().unwrap();
        let stepped: Vec<i64> = it.iter().collect();
        let mut c = it.cursor();
        c.jump_fwd(7);
        assert_eq!(c.get(), stepped[6]);
        c.fwd();
        assert_eq!(c.get(), stepped[7]);
    }

    #[test]
    #[should_panic(expected = "past the last element")]
    fn test_raster_cursor_past_end_panics() {
        let img = ramp(&[3, 3]);
        let view = View::new(&img).permute(&[1, 0]).unwrap();
        let it = view.materialize().unwrap();
        let mut c = it.cursor();
        c.jump_fwd(20);
        assert!(!c.has_next());
        let _ = c.get();
    }

    #[test]
    #[should_panic(expected = "past the last element")]
    fn test_flat_cursor_localize_past_end_panics() {
        let img = ramp(&[2, 2]);
        let view = View::new(&img);
        let it = view.materialize().unwrap();
        let mut c = it.cursor();
        c.jump_fwd(5);
        let mut pos = [0i64; 2];
        c.localize(&mut pos);
    }

    #[test]
    fn test_first_element_is_repeatable() {
        let img = ramp(&[2, 2]);
        let view = View::new(&img).translate(&[1, 1]).unwrap();
        let it = view.materialize().unwrap();
        assert_eq!(it.first_element(), Some(0));
        assert_eq!(it.first_element(), Some(0));
        assert_eq!(it.iter().count(), 4);
    }

    #[test]
    fn test_empty_interval_has_no_first_element() {
        let img = ramp(&[2, 2]);
        let view = View::new(&img)
            .interval(Interval::new(&[1, 0], &[0, 1]).unwrap())
            .unwrap();
        let it = view.materialize().unwrap();
        assert_eq!(it.size(), 0);
        assert_eq!(it.first_element(), None);
    }

    #[test]
    fn test_unbounded_view_cannot_materialize() {
        let img = ramp(&[2]);
        let view = View::new(&img).extend(Extension::Border).unwrap();
        assert!(matches!(view.materialize().err(), Some(ViewError::Unbounded)));
    }
}

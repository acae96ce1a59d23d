//! Views built from a chain of transforms over a source, read-only or writable.

use std::sync::{Arc, OnceLock};

use crate::access::{
    Localizable, Positionable, RandomAccess, RandomAccessMut, RandomAccessible,
    RandomAccessibleMut, WriteHandle,
};
use crate::builder::{
    build_iterable, build_random_access, build_write_map, AccessPlan, AccessStrategy,
    IterationStrategy, Stage,
};
use crate::interval::{DimVec, Interval};
use crate::iterable::{IterableView, IterationOrder};
use crate::strided::{ArrayAccess, StridedCursor};
use crate::transform::{AxisMap, CoordinateMap, Extension, Transform};
use crate::{Result, ViewError};

fn check_rank(expected: usize, found: usize) -> Result<()> {
    if found != expected {
        return Err(ViewError::DimensionMismatch { expected, found });
    }
    Ok(())
}

/// Bounds of a rank-`n` view after appending `link`, validating the link.
fn bounds_after<T>(
    n: usize,
    bounds: Option<&Interval>,
    link: &Transform<T>,
) -> Result<Option<Interval>> {
    match link {
        Transform::Restrict(interval) => {
            check_rank(n, interval.num_dimensions())?;
            Ok(Some(interval.clone()))
        }
        Transform::Translate(offset) => {
            check_rank(n, offset.len())?;
            bounds.map(|b| b.translate(offset)).transpose()
        }
        Transform::Permute(perm) => {
            check_rank(n, perm.len())?;
            let mut seen = vec![false; n];
            for &p in perm {
                if p >= n || seen[p] {
                    return Err(ViewError::InvalidPermutation { axis: p, rank: n });
                }
                seen[p] = true;
            }
            Ok(bounds.map(|b| b.permute(perm)))
        }
        Transform::Extend { bounds, .. } => {
            check_rank(n, bounds.num_dimensions())?;
            Ok(None)
        }
        Transform::Map(map) => {
            check_rank(n, map.num_dimensions())?;
            Ok(None)
        }
    }
}

fn swap_permutation(rank: usize, a: usize, b: usize) -> Result<DimVec<usize>> {
    for axis in [a, b] {
        if axis >= rank {
            return Err(ViewError::InvalidPermutation { axis, rank });
        }
    }
    let mut perm: DimVec<usize> = (0..rank).collect();
    perm.swap(a, b);
    Ok(perm)
}

fn min_to_origin(bounds: Option<&Interval>) -> Result<DimVec<i64>> {
    let bounds = bounds.ok_or(ViewError::Unbounded)?;
    Ok(bounds.mins().iter().map(|&m| -m).collect())
}

fn start_of(bounds: Option<&Interval>, n: usize) -> DimVec<i64> {
    match bounds {
        Some(b) => DimVec::from_slice(b.mins()),
        None => DimVec::from_elem(0, n),
    }
}

fn memoized_plan<'p, T: Clone>(
    cell: &'p OnceLock<AccessPlan<T>>,
    transforms: &[Transform<T>],
    n: usize,
    bounds: Option<&Interval>,
    direct_capable: bool,
) -> &'p AccessPlan<T> {
    cell.get_or_init(|| {
        match build_random_access(transforms, n, bounds, direct_capable) {
            Ok(plan) => plan,
            // Bounds always carry the view's rank.
            Err(_) => unreachable!("view bounds match the view rank"),
        }
    })
}

/// Accessor for `plan` over `source`, starting at `start`.
fn plan_access<'b, S: RandomAccessible>(
    source: &'b S,
    plan: &AccessPlan<S::Sample>,
    start: &[i64],
) -> ViewAccess<'b, S> {
    if let (Some(map), Some(layout)) = (plan.direct.as_ref(), source.strided_layout()) {
        let strides: DimVec<isize> = map.axis().iter().map(|&a| layout.strides[a]).collect();
        let base: isize = map
            .axis()
            .iter()
            .zip(map.offset())
            .map(|(&a, &o)| (o - layout.interval.min(a)) as isize * layout.strides[a])
            .sum();
        return ViewAccess::Direct(ArrayAccess::new(
            layout.data,
            StridedCursor::new(strides, base, start),
        ));
    }
    ViewAccess::Transformed(TransformedAccess::new(
        plan.stages.clone(),
        source.random_access(),
        start,
    ))
}

// ============================================================================
// View
// ============================================================================

/// A lazily transformed, possibly bounded window onto a source.
///
/// Views never copy samples. Each builder method returns a new view with one
/// more link in its chain. The efficient accessor plan for the view's own
/// bounds is built on first use and kept for the view's lifetime; the plan
/// for an explicit interval is rebuilt per request.
pub struct View<'a, S: RandomAccessible> {
    source: &'a S,
    transforms: Vec<Transform<S::Sample>>,
    bounds: Option<Interval>,
    full_plan: OnceLock<AccessPlan<S::Sample>>,
    iteration: OnceLock<(IterationStrategy, IterationOrder)>,
}

impl<'a, S: RandomAccessible> Clone for View<'a, S> {
    fn clone(&self) -> Self {
        self.derive(self.transforms.clone(), self.bounds.clone())
    }
}

impl<'a, S: RandomAccessible> std::fmt::Debug for View<'a, S>
where
    S::Sample: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("transforms", &self.transforms)
            .field("bounds", &self.bounds)
            .finish()
    }
}

impl<'a, S: RandomAccessible> View<'a, S> {
    /// View showing `source` unchanged.
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            transforms: Vec::new(),
            bounds: source.bounds(),
            full_plan: OnceLock::new(),
            iteration: OnceLock::new(),
        }
    }

    fn derive(&self, transforms: Vec<Transform<S::Sample>>, bounds: Option<Interval>) -> Self {
        Self {
            source: self.source,
            transforms,
            bounds,
            full_plan: OnceLock::new(),
            iteration: OnceLock::new(),
        }
    }

    /// Append `link` to the chain.
    ///
    /// # Errors
    /// Returns [`ViewError::DimensionMismatch`] on a rank mismatch,
    /// [`ViewError::InvalidPermutation`] for a bad permutation.
    pub fn then(&self, link: Transform<S::Sample>) -> Result<Self> {
        let bounds = bounds_after(self.num_dimensions(), self.bounds.as_ref(), &link)?;
        let mut transforms = self.transforms.clone();
        transforms.push(link);
        Ok(self.derive(transforms, bounds))
    }

    pub fn source(&self) -> &'a S {
        self.source
    }

    pub fn transforms(&self) -> &[Transform<S::Sample>] {
        &self.transforms
    }

    pub fn num_dimensions(&self) -> usize {
        self.source.num_dimensions()
    }

    /// Bounds of the view, `None` once extended or mapped.
    pub fn bounds(&self) -> Option<&Interval> {
        self.bounds.as_ref()
    }

    /// Restrict the view to `interval`. The caller is responsible for the
    /// view being defined there.
    ///
    /// # Errors
    /// Returns [`ViewError::DimensionMismatch`] on a rank mismatch.
    pub fn interval(&self, interval: Interval) -> Result<Self> {
        self.then(Transform::Restrict(interval))
    }

    /// Shift the view so the sample at `x` moves to `x + offset`.
    ///
    /// # Errors
    /// Returns [`ViewError::DimensionMismatch`] on a rank mismatch.
    pub fn translate(&self, offset: &[i64]) -> Result<Self> {
        self.then(Transform::Translate(DimVec::from_slice(offset)))
    }

    /// Translate so the view's minimum becomes the origin.
    ///
    /// # Errors
    /// Returns [`ViewError::Unbounded`] for unbounded views.
    pub fn zero_min(&self) -> Result<Self> {
        self.translate(&min_to_origin(self.bounds.as_ref())?)
    }

    /// Reorder axes: axis `i` of the new view is axis `perm[i]` of this one.
    ///
    /// # Errors
    /// Returns [`ViewError::DimensionMismatch`] if `perm` has the wrong length,
    /// [`ViewError::InvalidPermutation`] if it is not a permutation.
    pub fn permute(&self, perm: &[usize]) -> Result<Self> {
        self.then(Transform::Permute(DimVec::from_slice(perm)))
    }

    /// Swap two axes.
    ///
    /// # Errors
    /// Returns [`ViewError::InvalidPermutation`] if an axis is out of range.
    pub fn swap_axes(&self, a: usize, b: usize) -> Result<Self> {
        self.permute(&swap_permutation(self.num_dimensions(), a, b)?)
    }

    /// Extend the view to infinity.
    ///
    /// # Errors
    /// Returns [`ViewError::Unbounded`] when the view has no bounds to
    /// extend from, [`ViewError::InvalidInterval`] when they are empty.
    pub fn extend(&self, extension: Extension<S::Sample>) -> Result<Self> {
        let bounds = self.bounds.clone().ok_or(ViewError::Unbounded)?;
        if let Some(d) = (0..bounds.num_dimensions()).find(|&d| bounds.dimension(d) == 0) {
            return Err(ViewError::InvalidInterval {
                dim: d,
                min: bounds.min(d),
                max: bounds.max(d),
            });
        }
        self.then(Transform::Extend { bounds, extension })
    }

    /// Append an opaque coordinate map. The result is unbounded.
    ///
    /// # Errors
    /// Returns [`ViewError::DimensionMismatch`] on a rank mismatch.
    pub fn map(&self, map: Arc<dyn CoordinateMap>) -> Result<Self> {
        self.then(Transform::Map(map))
    }

    fn full_plan(&self) -> &AccessPlan<S::Sample> {
        memoized_plan(
            &self.full_plan,
            &self.transforms,
            self.num_dimensions(),
            self.bounds.as_ref(),
            self.source.strided_layout().is_some(),
        )
    }

    /// Strategy used by [`random_access`](RandomAccessible::random_access).
    pub fn access_strategy(&self) -> AccessStrategy {
        self.full_plan().strategy()
    }

    /// Strategy an accessor restricted to `interval` would use.
    ///
    /// # Errors
    /// Returns [`ViewError::DimensionMismatch`] on a rank mismatch.
    pub fn access_strategy_in(&self, interval: &Interval) -> Result<AccessStrategy> {
        Ok(self.plan_for(interval)?.strategy())
    }

    fn plan_for(&self, interval: &Interval) -> Result<AccessPlan<S::Sample>> {
        build_random_access(
            &self.transforms,
            self.num_dimensions(),
            Some(interval),
            self.source.strided_layout().is_some(),
        )
    }

    fn access_from<'b>(&'b self, plan: &AccessPlan<S::Sample>, start: &[i64]) -> ViewAccess<'b, S> {
        let source: &'b S = self.source;
        plan_access(source, plan, start)
    }

    pub(crate) fn iteration(&self) -> Result<&(IterationStrategy, IterationOrder)> {
        let bounds = self.bounds.as_ref().ok_or(ViewError::Unbounded)?;
        Ok(self.iteration.get_or_init(|| {
            let layout = self.source.strided_layout();
            let strategy = build_iterable(self.full_plan(), bounds, layout.as_ref());
            let order = match strategy {
                IterationStrategy::Flat => IterationOrder::Flat(bounds.clone()),
                IterationStrategy::Raster => IterationOrder::unique(),
            };
            (strategy, order)
        }))
    }

    /// Iterable over the view's bounds.
    ///
    /// # Errors
    /// Returns [`ViewError::Unbounded`] for unbounded views.
    pub fn materialize(&self) -> Result<IterableView<'_, 'a, S>> {
        IterableView::new(self)
    }

    /// Flat storage region shown by a view with flat iteration.
    pub(crate) fn flat_slice(&self) -> Option<&[S::Sample]> {
        let source: &S = self.source;
        source.strided_layout().map(|layout| layout.data)
    }

    pub(crate) fn bounded_access(&self) -> ViewAccess<'_, S> {
        self.access_from(self.full_plan(), &start_of(self.bounds.as_ref(), self.num_dimensions()))
    }
}

impl<'a, S: RandomAccessible> RandomAccessible for View<'a, S> {
    type Sample = S::Sample;
    type Access<'b> = ViewAccess<'b, S> where Self: 'b;

    fn num_dimensions(&self) -> usize {
        self.source.num_dimensions()
    }

    fn bounds(&self) -> Option<Interval> {
        self.bounds.clone()
    }

    fn random_access(&self) -> ViewAccess<'_, S> {
        self.bounded_access()
    }

    fn random_access_in(&self, interval: &Interval) -> Result<ViewAccess<'_, S>> {
        let plan = self.plan_for(interval)?;
        Ok(self.access_from(&plan, interval.mins()))
    }
}

// ============================================================================
// ViewMut
// ============================================================================

/// A writable window onto a mutable source.
///
/// Only links with an inverse on the source can be added: restrictions,
/// translations and permutations. They fold into one [`AxisMap`] that
/// writers apply to every position. Builder methods consume the view, as
/// the source is borrowed exclusively.
pub struct ViewMut<'a, S: RandomAccessibleMut> {
    source: &'a mut S,
    transforms: Vec<Transform<S::Sample>>,
    bounds: Option<Interval>,
    write_map: AxisMap,
    full_plan: OnceLock<AccessPlan<S::Sample>>,
}

impl<'a, S: RandomAccessibleMut> std::fmt::Debug for ViewMut<'a, S>
where
    S::Sample: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewMut")
            .field("transforms", &self.transforms)
            .field("bounds", &self.bounds)
            .finish()
    }
}

impl<'a, S: RandomAccessibleMut> ViewMut<'a, S> {
    /// Writable view showing `source` unchanged.
    pub fn new(source: &'a mut S) -> Self {
        let n = source.num_dimensions();
        Self {
            bounds: source.bounds(),
            source,
            transforms: Vec::new(),
            write_map: AxisMap::identity(n),
            full_plan: OnceLock::new(),
        }
    }

    /// Append `link` to the chain.
    ///
    /// # Errors
    /// Returns [`ViewError::NotWritable`] for an extension or an opaque map,
    /// and the errors of [`View::then`] otherwise.
    pub fn then(mut self, link: Transform<S::Sample>) -> Result<Self> {
        let n = self.num_dimensions();
        let bounds = bounds_after(n, self.bounds.as_ref(), &link)?;
        self.transforms.push(link);
        self.write_map = build_write_map(&self.transforms, n)?;
        self.bounds = bounds;
        self.full_plan = OnceLock::new();
        Ok(self)
    }

    pub fn num_dimensions(&self) -> usize {
        self.source.num_dimensions()
    }

    pub fn bounds(&self) -> Option<&Interval> {
        self.bounds.as_ref()
    }

    /// Map from view positions to source positions used for writing.
    pub fn write_map(&self) -> &AxisMap {
        &self.write_map
    }

    /// # Errors
    /// Returns [`ViewError::DimensionMismatch`] on a rank mismatch.
    pub fn interval(self, interval: Interval) -> Result<Self> {
        self.then(Transform::Restrict(interval))
    }

    /// # Errors
    /// Returns [`ViewError::DimensionMismatch`] on a rank mismatch.
    pub fn translate(self, offset: &[i64]) -> Result<Self> {
        self.then(Transform::Translate(DimVec::from_slice(offset)))
    }

    /// # Errors
    /// Returns [`ViewError::Unbounded`] for unbounded views.
    pub fn zero_min(self) -> Result<Self> {
        let offset = min_to_origin(self.bounds.as_ref())?;
        self.translate(&offset)
    }

    /// # Errors
    /// Returns [`ViewError::InvalidPermutation`] if `perm` is not a
    /// permutation.
    pub fn permute(self, perm: &[usize]) -> Result<Self> {
        self.then(Transform::Permute(DimVec::from_slice(perm)))
    }

    /// # Errors
    /// Returns [`ViewError::InvalidPermutation`] if an axis is out of range.
    pub fn swap_axes(self, a: usize, b: usize) -> Result<Self> {
        let perm = swap_permutation(self.num_dimensions(), a, b)?;
        self.permute(&perm)
    }

    /// Read-only view with the same chain.
    pub fn as_view(&self) -> View<'_, S> {
        View {
            source: &*self.source,
            transforms: self.transforms.clone(),
            bounds: self.bounds.clone(),
            full_plan: OnceLock::new(),
            iteration: OnceLock::new(),
        }
    }

    fn full_plan(&self) -> &AccessPlan<S::Sample> {
        memoized_plan(
            &self.full_plan,
            &self.transforms,
            self.num_dimensions(),
            self.bounds.as_ref(),
            self.source.strided_layout().is_some(),
        )
    }
}

impl<'a, S: RandomAccessibleMut> RandomAccessible for ViewMut<'a, S> {
    type Sample = S::Sample;
    type Access<'b> = ViewAccess<'b, S> where Self: 'b;

    fn num_dimensions(&self) -> usize {
        self.source.num_dimensions()
    }

    fn bounds(&self) -> Option<Interval> {
        self.bounds.clone()
    }

    fn random_access(&self) -> ViewAccess<'_, S> {
        let source: &S = &*self.source;
        let start = start_of(self.bounds.as_ref(), self.num_dimensions());
        plan_access(source, self.full_plan(), &start)
    }

    fn random_access_in(&self, interval: &Interval) -> Result<ViewAccess<'_, S>> {
        let source: &S = &*self.source;
        let plan = build_random_access(
            &self.transforms,
            self.num_dimensions(),
            Some(interval),
            source.strided_layout().is_some(),
        )?;
        Ok(plan_access(source, &plan, interval.mins()))
    }
}

impl<'a, S: RandomAccessibleMut> RandomAccessibleMut for ViewMut<'a, S> {
    type Writer<'b> = ViewWriter<'b, S> where Self: 'b;

    fn writer(&mut self) -> ViewWriter<'_, S> {
        let start = start_of(self.bounds.as_ref(), self.num_dimensions());
        ViewWriter {
            inner: self.source.writer(),
            map: self.write_map.clone(),
            start,
        }
    }
}

/// Write handle of a [`ViewMut`]: the source's handle plus the view's
/// axis map.
pub struct ViewWriter<'b, S: RandomAccessibleMut + 'b> {
    inner: S::Writer<'b>,
    map: AxisMap,
    start: DimVec<i64>,
}

impl<'b, S: RandomAccessibleMut + 'b> WriteHandle for ViewWriter<'b, S> {
    type Sample = S::Sample;
    type AccessMut = MappedAccessMut<<S::Writer<'b> as WriteHandle>::AccessMut>;

    unsafe fn access_mut(&self) -> Self::AccessMut {
        // SAFETY: every view position maps to one source position, so the
        // caller's disjointness guarantee carries over to the source.
        let inner = unsafe { self.inner.access_mut() };
        MappedAccessMut::new(inner, &self.map, &self.start)
    }
}

// ============================================================================
// Accessors
// ============================================================================

/// Accessor produced by a [`View`].
pub enum ViewAccess<'a, S: RandomAccessible + 'a> {
    Direct(ArrayAccess<'a, S::Sample>),
    Transformed(TransformedAccess<'a, S>),
}

impl<'a, S: RandomAccessible + 'a> Localizable for ViewAccess<'a, S> {
    fn num_dimensions(&self) -> usize {
        match self {
            ViewAccess::Direct(a) => a.num_dimensions(),
            ViewAccess::Transformed(a) => a.num_dimensions(),
        }
    }

    fn position(&self) -> &[i64] {
        match self {
            ViewAccess::Direct(a) => a.position(),
            ViewAccess::Transformed(a) => a.position(),
        }
    }
}

impl<'a, S: RandomAccessible + 'a> Positionable for ViewAccess<'a, S> {
    #[inline]
    fn move_by(&mut self, distance: i64, d: usize) {
        match self {
            ViewAccess::Direct(a) => a.move_by(distance, d),
            ViewAccess::Transformed(a) => a.move_by(distance, d),
        }
    }

    fn set_position(&mut self, position: &[i64]) {
        match self {
            ViewAccess::Direct(a) => a.set_position(position),
            ViewAccess::Transformed(a) => a.set_position(position),
        }
    }
}

impl<'a, S: RandomAccessible + 'a> RandomAccess for ViewAccess<'a, S> {
    type Sample = S::Sample;

    #[inline]
    fn get(&self) -> S::Sample {
        match self {
            ViewAccess::Direct(a) => a.get(),
            ViewAccess::Transformed(a) => a.get(),
        }
    }
}

/// Accessor that maps its position through each plan stage in turn and
/// reads the source's own accessor there.
pub struct TransformedAccess<'a, S: RandomAccessible + 'a> {
    position: DimVec<i64>,
    stages: Arc<[Stage<S::Sample>]>,
    inner: S::Access<'a>,
    outside: Option<S::Sample>,
    scratch: (DimVec<i64>, DimVec<i64>),
}

impl<'a, S: RandomAccessible + 'a> TransformedAccess<'a, S> {
    fn new(stages: Arc<[Stage<S::Sample>]>, inner: S::Access<'a>, start: &[i64]) -> Self {
        let n = start.len();
        let mut access = Self {
            position: DimVec::from_slice(start),
            stages,
            inner,
            outside: None,
            scratch: (DimVec::from_elem(0, n), DimVec::from_elem(0, n)),
        };
        access.update();
        access
    }

    fn update(&mut self) {
        let (cur, next) = &mut self.scratch;
        cur.copy_from_slice(&self.position);
        self.outside = None;
        for stage in self.stages.iter() {
            match stage {
                Stage::Affine(m) => {
                    m.apply(cur.as_slice(), next.as_mut_slice());
                    std::mem::swap(cur, next);
                }
                Stage::Extend { bounds, extension } => {
                    for (d, p) in cur.iter_mut().enumerate() {
                        match extension.fold(*p, bounds.min(d), bounds.max(d)) {
                            Some(q) => *p = q,
                            None => {
                                self.outside = extension.constant();
                                return;
                            }
                        }
                    }
                }
                Stage::Map(m) => {
                    m.apply(cur.as_slice(), next.as_mut_slice());
                    std::mem::swap(cur, next);
                }
            }
        }
        self.inner.set_position(cur);
    }
}

impl<'a, S: RandomAccessible + 'a> Localizable for TransformedAccess<'a, S> {
    fn num_dimensions(&self) -> usize {
        self.position.len()
    }

    fn position(&self) -> &[i64] {
        &self.position
    }
}

impl<'a, S: RandomAccessible + 'a> Positionable for TransformedAccess<'a, S> {
    fn move_by(&mut self, distance: i64, d: usize) {
        self.position[d] += distance;
        self.update();
    }

    fn set_position(&mut self, position: &[i64]) {
        self.position.copy_from_slice(position);
        self.update();
    }
}

impl<'a, S: RandomAccessible + 'a> RandomAccess for TransformedAccess<'a, S> {
    type Sample = S::Sample;

    #[inline]
    fn get(&self) -> S::Sample {
        match self.outside {
            Some(v) => v,
            None => self.inner.get(),
        }
    }
}

/// Writing accessor that moves an inner accessor along the axes of an
/// [`AxisMap`].
///
/// A step along view axis `d` is a step along source axis `axis[d]`, so
/// every move costs one inner move.
pub struct MappedAccessMut<A> {
    position: DimVec<i64>,
    axis: DimVec<usize>,
    inner: A,
}

impl<A: RandomAccessMut> MappedAccessMut<A> {
    fn new(mut inner: A, map: &AxisMap, start: &[i64]) -> Self {
        let mut mapped = DimVec::from_elem(0, start.len());
        map.apply(start, &mut mapped);
        inner.set_position(&mapped);
        Self {
            position: DimVec::from_slice(start),
            axis: DimVec::from_slice(map.axis()),
            inner,
        }
    }
}

impl<A: RandomAccessMut> Localizable for MappedAccessMut<A> {
    fn num_dimensions(&self) -> usize {
        self.position.len()
    }

    fn position(&self) -> &[i64] {
        &self.position
    }
}

impl<A: RandomAccessMut> Positionable for MappedAccessMut<A> {
    #[inline]
    fn move_by(&mut self, distance: i64, d: usize) {
        self.position[d] += distance;
        self.inner.move_by(distance, self.axis[d]);
    }
}

impl<A: RandomAccessMut> RandomAccess for MappedAccessMut<A> {
    type Sample = A::Sample;

    #[inline]
    fn get(&self) -> A::Sample {
        self.inner.get()
    }
}

impl<A: RandomAccessMut> RandomAccessMut for MappedAccessMut<A> {
    #[inline]
    fn set(&mut self, value: A::Sample) {
        self.inner.set(value);
    }
}

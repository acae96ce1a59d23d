//! Collapses a transform chain into the cheapest equivalent accessor plan.
//!
//! The chain is walked from the view inwards. Translations and permutations
//! fold into a single [`AxisMap`]. Interval restrictions only constrain
//! bounds and never take part in folding. An extension whose region of use
//! lies inside the extended source's bounds is a no-op there and is elided,
//! which lets folding continue through it. Otherwise the folded map is
//! emitted as a stage, the extension becomes a stage, and folding restarts
//! behind it. Past an opaque [`CoordinateMap`] nothing is folded: every
//! remaining link becomes its own stage.

use std::sync::Arc;

use crate::interval::Interval;
use crate::strided::{col_major_strides, StridedLayout};
use crate::transform::{AxisMap, CoordinateMap, Extension, Transform};
use crate::{Result, ViewError};

/// How random access through a view is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStrategy {
    /// One strided lookup into the source's dense storage.
    Direct,
    /// Position mapped through `stages` folded stages, then the source's own
    /// accessor.
    Transformed { stages: usize },
}

/// How an iterable view is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationStrategy {
    /// Walk the storage slice in memory order.
    Flat,
    /// Raster order over the view's coordinates through random access.
    Raster,
}

#[derive(Clone)]
pub(crate) enum Stage<T> {
    Affine(AxisMap),
    Extend {
        bounds: Interval,
        extension: Extension<T>,
    },
    Map(Arc<dyn CoordinateMap>),
}

/// Result of [`build_random_access`].
#[derive(Clone)]
pub struct AccessPlan<T> {
    pub(crate) stages: Arc<[Stage<T>]>,
    pub(crate) direct: Option<AxisMap>,
    elided: usize,
}

impl<T> AccessPlan<T> {
    pub fn strategy(&self) -> AccessStrategy {
        if self.direct.is_some() {
            AccessStrategy::Direct
        } else {
            AccessStrategy::Transformed {
                stages: self.stages.len(),
            }
        }
    }

    /// Number of extensions dropped because the region never leaves the
    /// extended source's bounds.
    pub fn elided_extensions(&self) -> usize {
        self.elided
    }
}

fn flush<T>(stages: &mut Vec<Stage<T>>, acc: &mut AxisMap) {
    if !acc.is_identity() {
        let n = acc.axis.len();
        stages.push(Stage::Affine(std::mem::replace(acc, AxisMap::identity(n))));
    }
}

/// Build the random-access plan for a chain over a source of rank `n`.
///
/// `transforms` is ordered from the innermost link (next to the source) to
/// the outermost. `interval`, in view coordinates, is the region the
/// accessor must be valid on; `None` means everywhere the view is defined.
/// `direct_capable` tells whether the source exposes a strided layout.
///
/// # Errors
/// Returns [`ViewError::DimensionMismatch`](crate::ViewError::DimensionMismatch)
/// when `interval` does not have rank `n`.
pub fn build_random_access<T: Clone>(
    transforms: &[Transform<T>],
    n: usize,
    interval: Option<&Interval>,
    direct_capable: bool,
) -> Result<AccessPlan<T>> {
    if let Some(iv) = interval {
        iv.check_rank(n)?;
    }
    let mut stages = Vec::new();
    let mut acc = AxisMap::identity(n);
    let mut region = interval.cloned();
    let mut opaque = false;
    let mut elided = 0;

    for link in transforms.iter().rev() {
        if opaque {
            match link {
                Transform::Restrict(_) => {}
                Transform::Translate(t) => {
                    let mut m = AxisMap::identity(n);
                    m.then_translate(t);
                    stages.push(Stage::Affine(m));
                }
                Transform::Permute(p) => {
                    let mut m = AxisMap::identity(n);
                    m.then_permute(p);
                    stages.push(Stage::Affine(m));
                }
                Transform::Extend { bounds, extension } => stages.push(Stage::Extend {
                    bounds: bounds.clone(),
                    extension: extension.clone(),
                }),
                Transform::Map(m) => stages.push(Stage::Map(m.clone())),
            }
            continue;
        }
        match link {
            Transform::Restrict(_) => {}
            Transform::Translate(t) => acc.then_translate(t),
            Transform::Permute(p) => acc.then_permute(p),
            Transform::Extend { bounds, extension } => {
                let unused = region
                    .as_ref()
                    .is_some_and(|r| bounds.contains_interval(&acc.apply_interval(r)));
                if unused {
                    elided += 1;
                    continue;
                }
                flush(&mut stages, &mut acc);
                stages.push(Stage::Extend {
                    bounds: bounds.clone(),
                    extension: extension.clone(),
                });
                region = Some(bounds.clone());
            }
            Transform::Map(m) => {
                flush(&mut stages, &mut acc);
                stages.push(Stage::Map(m.clone()));
                opaque = true;
            }
        }
    }
    flush(&mut stages, &mut acc);

    let direct = match stages.as_slice() {
        _ if !direct_capable => None,
        [] => Some(AxisMap::identity(n)),
        [Stage::Affine(m)] => Some(m.clone()),
        _ => None,
    };
    let plan = AccessPlan {
        stages: stages.into(),
        direct,
        elided,
    };
    log::trace!(
        "access plan over rank-{n} chain of {} links: {:?}, {} extension(s) elided",
        transforms.len(),
        plan.strategy(),
        plan.elided
    );
    Ok(plan)
}

/// Fold a chain into the one axis map used to write through it.
///
/// Restrictions are skipped, translations and permutations fold as for
/// reading.
///
/// # Errors
/// Returns [`ViewError::NotWritable`] when the chain holds an extension or
/// an opaque coordinate map.
pub fn build_write_map<T>(transforms: &[Transform<T>], n: usize) -> Result<AxisMap> {
    let mut acc = AxisMap::identity(n);
    for link in transforms.iter().rev() {
        match link {
            Transform::Restrict(_) => {}
            Transform::Translate(t) => acc.then_translate(t),
            Transform::Permute(p) => acc.then_permute(p),
            Transform::Extend { .. } => return Err(ViewError::NotWritable { link: "an extension" }),
            Transform::Map(_) => {
                return Err(ViewError::NotWritable {
                    link: "an opaque coordinate map",
                })
            }
        }
    }
    Ok(acc)
}

/// Pick the traversal for a bounded view given its access plan.
///
/// Flat traversal is chosen only when the view shows the whole dense storage
/// unpermuted, so memory order and the view's raster order coincide.
pub fn build_iterable<T>(
    plan: &AccessPlan<T>,
    bounds: &Interval,
    layout: Option<&StridedLayout<'_, T>>,
) -> IterationStrategy {
    let (Some(map), Some(layout)) = (plan.direct.as_ref(), layout) else {
        return IterationStrategy::Raster;
    };
    let dims = layout.interval.dimensions();
    let contiguous = layout.strides == col_major_strides(&dims).as_slice();
    if contiguous && map.is_unpermuted() && map.apply_interval(bounds) == *layout.interval {
        IterationStrategy::Flat
    } else {
        IterationStrategy::Raster
    }
}

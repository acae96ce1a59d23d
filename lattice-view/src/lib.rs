//! Lazy N-dimensional views over integer lattices.
//!
//! A source is anything implementing [`RandomAccessible`]: dense images,
//! chunked images, or another [`View`]. Views stack coordinate transforms on
//! a source without copying samples:
//!
//! - `interval`: restrict to a box
//! - `translate`, `zero_min`: shift coordinates
//! - `permute`, `swap_axes`: reorder axes
//! - `extend`: define samples outside the bounds ([`Extension`])
//! - `map`: an arbitrary [`CoordinateMap`]
//!
//! When an accessor is requested, the chain is collapsed by the
//! [`builder`] into the cheapest equivalent plan. Bounded views can be
//! materialized into an [`IterableView`] with a fixed [`IterationOrder`].

mod access;
pub mod builder;
mod img;
mod interval;
mod iterable;
mod strided;
mod transform;
mod view;

// ============================================================================
// Lattice primitives
// ============================================================================
pub use interval::{index_to_position, position_to_index, Bounded, DimVec, Interval};

// ============================================================================
// Accessors and storage
// ============================================================================
pub use access::{
    Localizable, Positionable, RandomAccess, RandomAccessMut, RandomAccessible,
    RandomAccessibleMut, WriteHandle,
};
pub use img::{
    checked_size, ArrayImg, ArrayWriter, CellAccess, CellAccessMut, CellImg, CellWriter, Img,
    ImgAccess, ImgAccessMut, ImgWriter, StorageKind,
};
pub use strided::{col_major_strides, ArrayAccess, ArrayAccessMut, StridedLayout};

// ============================================================================
// Views
// ============================================================================
pub use builder::{build_write_map, AccessPlan, AccessStrategy, IterationStrategy};
pub use iterable::{Cursor, FlatCursor, IterableView, IterationOrder, RasterCursor, ViewCursor};
pub use transform::{AxisMap, CoordinateMap, Extension, Transform};
pub use view::{MappedAccessMut, TransformedAccess, View, ViewAccess, ViewMut, ViewWriter};

// ============================================================================
// Error types
// ============================================================================

/// Errors raised while building intervals, views and storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    /// Two ranks that must agree do not.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// `max < min - 1` in some dimension.
    #[error("invalid interval in dimension {dim}: min={min}, max={max}")]
    InvalidInterval { dim: usize, min: i64, max: i64 },

    /// Axis out of range or repeated in a permutation.
    #[error("invalid axis {axis} for rank {rank}")]
    InvalidPermutation { axis: usize, rank: usize },

    /// The operation needs bounds but the view is unbounded.
    #[error("view is unbounded")]
    Unbounded,

    /// An element count does not fit in `usize`.
    #[error("element count overflows usize")]
    SizeOverflow,

    /// Writing through a view whose chain holds a link that has no inverse
    /// on the source, such as an extension or an opaque map.
    #[error("cannot write through a view containing {link}")]
    NotWritable { link: &'static str },
}

/// Result type for view operations.
pub type Result<T> = std::result::Result<T, ViewError>;

//! Zero-copy views over N-dimensional integer lattices and a parallel
//! separable convolution engine built on them.
//!
//! This crate re-exports the workspace members:
//!
//! - [`lattice_traits`]: sample types and their working precision
//! - [`lattice_view`]: intervals, storage, views, iterables
//! - [`lattice_conv`]: separable symmetric convolution and Gaussian smoothing
//!
//! # Core Types
//!
//! - [`Interval`]: an N-D box with inclusive integer bounds
//! - [`ArrayImg`], [`CellImg`], [`Img`]: dense and chunked storage
//! - [`View`]: a lazy chain of transforms over a source
//! - [`IterableView`]: a bounded view with a fixed [`IterationOrder`]
//!
//! # Example
//!
//! ```rust
//! use lattice_rs::{gauss, ArrayImg, Extension, View};
//!
//! let mut image = ArrayImg::<f32>::new(&[32, 32]).unwrap();
//! image.set(&[16, 16], 1.0);
//!
//! let source = View::new(&image).extend(Extension::MirrorSingle).unwrap();
//! let mut smoothed = ArrayImg::<f32>::new(&[32, 32]).unwrap();
//! gauss(&[2.0, 2.0], &source, &mut smoothed, 2).unwrap();
//!
//! let total: f32 = smoothed.as_slice().iter().sum();
//! assert!((total - 1.0).abs() < 1e-4);
//! ```

pub use lattice_conv;
pub use lattice_traits;
pub use lattice_view;

// ============================================================================
// Samples
// ============================================================================
pub use lattice_traits::{Accumulator, Precision, Sample, ToWork};

// ============================================================================
// Lattices, storage and views
// ============================================================================
pub use lattice_view::{
    AccessStrategy, ArrayImg, CellImg, CoordinateMap, Cursor, Extension, Img, Interval,
    IterableView, IterationOrder, IterationStrategy, Localizable, Positionable, RandomAccess,
    RandomAccessMut, RandomAccessible, RandomAccessibleMut, StorageKind, View, ViewError,
    ViewMut, WriteHandle,
};

// ============================================================================
// Convolution
// ============================================================================
pub use lattice_conv::{
    convolve, convolve_in_place, convolve_with, gauss, gauss_in_place, gauss_with,
    select_convolver_factory, ConvolveConfig, ConvolveError, ConvolverFactory, HalfKernel,
};

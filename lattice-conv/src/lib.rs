//! Parallel separable symmetric convolution over `lattice-view` sources.
//!
//! A separable symmetric kernel is given as one *half-kernel* per dimension:
//! the center weight followed by the weights at distance 1, 2, ... The full
//! kernel along that dimension is the half-kernel mirrored around its first
//! entry.
//!
//! The engine convolves dimension 0 first and dimension N-1 last. Each pass
//! writes into a temporary buffer padded for the passes still to come, the
//! last pass writes into the target. Lines orthogonal to the pass dimension
//! are split into tasks that run on a worker pool created for the call.
//!
//! # Example
//!
//! ```
//! use lattice_conv::{convolve, HalfKernel};
//! use lattice_view::{ArrayImg, Extension, View};
//!
//! let src = ArrayImg::from_vec(&[5], vec![1.0f64, 2.0, 3.0, 4.0, 5.0]).unwrap();
//! let extended = View::new(&src).extend(Extension::MirrorSingle).unwrap();
//! let mut dst = ArrayImg::<f64>::new(&[5]).unwrap();
//! let kernel = HalfKernel::new(vec![0.5, 0.25]).unwrap();
//! convolve(&[kernel], &extended, &mut dst, 1).unwrap();
//! assert_eq!(dst.as_slice()[2], 3.0);
//! ```

mod buffers;
mod config;
mod convolver;
mod gauss;
mod kernel;
mod separable;
mod threading;

pub use buffers::{can_use_buffered, temp_dimensions};
pub use config::ConvolveConfig;
pub use convolver::{select_convolver_factory, ConvolverFactory, LineConvolver};
pub use gauss::{gauss, gauss_in_place, gauss_with, gaussian_half_kernels};
pub use kernel::HalfKernel;
pub use separable::{convolve, convolve_in_place, convolve_with};

use lattice_traits::Precision;
use lattice_view::ViewError;

/// Errors raised by the convolution engine.
#[derive(Debug, thiserror::Error)]
pub enum ConvolveError {
    #[error(transparent)]
    View(#[from] ViewError),

    /// One half-kernel per dimension is required.
    #[error("expected {expected} half-kernels, found {found}")]
    KernelCount { expected: usize, found: usize },

    /// A half-kernel without weights.
    #[error("half-kernel for dimension {dim} is empty")]
    EmptyKernel { dim: usize },

    /// A Gaussian sigma that is not finite and positive.
    #[error("invalid sigma {sigma} for dimension {dim}")]
    InvalidSigma { dim: usize, sigma: f64 },

    /// At least one worker thread is required.
    #[error("invalid thread count: {0}")]
    InvalidThreadCount(usize),

    /// A convolver factory was asked for a convolver of another precision.
    #[error("precision mismatch: factory is {expected:?}, accumulator is {found:?}")]
    PrecisionMismatch {
        expected: Precision,
        found: Precision,
    },

    /// A worker task panicked during the pass over `dim`.
    #[error("convolution task failed in dimension {dim}: {message}")]
    TaskFailed { dim: usize, message: String },

    /// The worker pool could not be started.
    #[cfg(feature = "parallel")]
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for convolution operations.
pub type Result<T> = std::result::Result<T, ConvolveError>;

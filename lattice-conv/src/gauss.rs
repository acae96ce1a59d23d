//! Gaussian smoothing on top of the separable engine.

use lattice_traits::{Sample, ToWork};
use lattice_view::{Extension, RandomAccessible, RandomAccessibleMut};

use crate::config::ConvolveConfig;
use crate::kernel::HalfKernel;
use crate::separable::{convolve_in_place, convolve_with};
use crate::{ConvolveError, Result};

/// One Gaussian half-kernel per entry of `sigmas`.
///
/// # Errors
/// Returns [`ConvolveError::InvalidSigma`] for a sigma that is not finite
/// and positive.
pub fn gaussian_half_kernels(sigmas: &[f64]) -> Result<Vec<HalfKernel>> {
    sigmas
        .iter()
        .enumerate()
        .map(|(dim, &sigma)| {
            HalfKernel::gaussian(sigma).ok_or(ConvolveError::InvalidSigma { dim, sigma })
        })
        .collect()
}

/// Gaussian smoothing with standard deviation `sigmas[d]` along dimension
/// `d`. `source` must be padded as for [`convolve`](crate::convolve).
///
/// # Errors
/// See [`convolve`](crate::convolve) and [`gaussian_half_kernels`].
pub fn gauss<Src, Dst>(sigmas: &[f64], source: &Src, target: &mut Dst, num_threads: usize) -> Result<()>
where
    Src: RandomAccessible + Sync,
    Src::Sample: ToWork<<Dst::Sample as Sample>::Work>,
    Dst: RandomAccessibleMut,
    Dst::Sample: Sample,
{
    gauss_with(sigmas, source, target, &ConvolveConfig::new(num_threads))
}

/// [`gauss`] with an explicit [`ConvolveConfig`].
///
/// # Errors
/// See [`gauss`].
pub fn gauss_with<Src, Dst>(
    sigmas: &[f64],
    source: &Src,
    target: &mut Dst,
    config: &ConvolveConfig,
) -> Result<()>
where
    Src: RandomAccessible + Sync,
    Src::Sample: ToWork<<Dst::Sample as Sample>::Work>,
    Dst: RandomAccessibleMut,
    Dst::Sample: Sample,
{
    let kernels = gaussian_half_kernels(sigmas)?;
    convolve_with(&kernels, source, target, config)
}

/// Gaussian smoothing of `image` in place, reading beyond its bounds
/// through `extension`.
///
/// # Errors
/// See [`gauss`].
pub fn gauss_in_place<I>(
    sigmas: &[f64],
    image: &mut I,
    extension: Extension<I::Sample>,
    config: &ConvolveConfig,
) -> Result<()>
where
    I: RandomAccessibleMut + Sync,
    I::Sample: Sample + ToWork<<I::Sample as Sample>::Work>,
{
    let kernels = gaussian_half_kernels(sigmas)?;
    convolve_in_place(&kernels, image, extension, config)
}

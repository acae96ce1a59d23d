//! Temporary buffer geometry.

use lattice_view::DimVec;

/// Dimensions of the buffer written by each pass.
///
/// Pass `d` leaves dimensions `0..=d` at the target extent and pads every
/// later dimension `d'` by `2 * radius(d')` for the passes still to come.
/// The last entry equals `target`.
pub fn temp_dimensions<K: AsRef<[f64]>>(target: &[usize], half_kernels: &[K]) -> Vec<DimVec<usize>> {
    let n = target.len();
    let mut dims = vec![DimVec::from_slice(target); n];
    for d in (0..n.saturating_sub(1)).rev() {
        dims[d] = dims[d + 1].clone();
        let radius = half_kernels[d + 1].as_ref().len().saturating_sub(1);
        dims[d][d + 1] += 2 * radius;
    }
    dims
}

/// Whether every line of every pass, with its borders, stays within 32-bit
/// addressing: `dim + 4 * radius <= i32::MAX` in every dimension.
pub fn can_use_buffered<K: AsRef<[f64]>>(target: &[usize], half_kernels: &[K]) -> bool {
    target.iter().zip(half_kernels).all(|(&dim, k)| {
        let radius = k.as_ref().len().saturating_sub(1) as u128;
        dim as u128 + 4 * radius <= i32::MAX as u128
    })
}

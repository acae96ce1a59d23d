//! The multi-pass separable convolution pipeline.

use std::ops::Range;

use lattice_traits::{Accumulator, Sample, ToWork};
use lattice_view::{
    index_to_position, DimVec, Extension, Img, Interval, Localizable, Positionable, RandomAccessible,
    RandomAccessibleMut, View, ViewError, WriteHandle,
};
use log::debug;

use crate::buffers::{can_use_buffered, temp_dimensions};
use crate::config::ConvolveConfig;
use crate::convolver::{select_convolver_factory, ConvolverFactory};
use crate::threading::Executor;
use crate::{ConvolveError, Result};

/// Working type of a target, which sets the precision of the whole call.
type Work<S> = <<S as RandomAccessible>::Sample as Sample>::Work;

/// Convolve `source` with a separable symmetric kernel into `target`.
///
/// `half_kernels[d]` is the half-kernel along dimension `d`. Samples are
/// processed in `f64` when the target stores `f64`, in `f32` for the other
/// real types, and in their own precision otherwise (see
/// [`Sample::Work`]). Any source whose samples convert into that working
/// type is accepted, so a `u8` image can be smoothed into an `f64` target.
///
/// `source` must be defined on the target bounds expanded by
/// `half_kernels[d].len() - 1` on both sides of every dimension `d`, for
/// example through [`View::extend`]. Reading outside that region panics.
///
/// # Errors
/// Returns an error for an unbounded target, mismatched ranks, a wrong
/// number of half-kernels, an empty half-kernel, zero threads, or a panic in
/// a worker task.
pub fn convolve<K, Src, Dst>(
    half_kernels: &[K],
    source: &Src,
    target: &mut Dst,
    num_threads: usize,
) -> Result<()>
where
    K: AsRef<[f64]>,
    Src: RandomAccessible + Sync,
    Src::Sample: ToWork<Work<Dst>>,
    Dst: RandomAccessibleMut,
    Dst::Sample: Sample,
{
    convolve_with(half_kernels, source, target, &ConvolveConfig::new(num_threads))
}

/// [`convolve`] with an explicit [`ConvolveConfig`].
///
/// # Errors
/// See [`convolve`].
pub fn convolve_with<K, Src, Dst>(
    half_kernels: &[K],
    source: &Src,
    target: &mut Dst,
    config: &ConvolveConfig,
) -> Result<()>
where
    K: AsRef<[f64]>,
    Src: RandomAccessible + Sync,
    Src::Sample: ToWork<Work<Dst>>,
    Dst: RandomAccessibleMut,
    Dst::Sample: Sample,
{
    let bounds = target.bounds().ok_or(ViewError::Unbounded)?;
    if source.num_dimensions() != bounds.num_dimensions() {
        return Err(ViewError::DimensionMismatch {
            expected: bounds.num_dimensions(),
            found: source.num_dimensions(),
        }
        .into());
    }
    let pipeline = Pipeline::new::<Work<Dst>, K>(half_kernels, bounds, config)?;
    if pipeline.n == 1 {
        pipeline.pass(0, source, &pipeline.source_offset(), target, &pipeline.target)
    } else {
        let tmp = pipeline.leading_passes::<Work<Dst>, _>(source)?;
        pipeline.last_pass(&tmp, target)
    }
}

/// Convolve `image` with itself as the source.
///
/// The image is read through `image` extended with `extension` by the
/// first pass and only written by the last one. With a single dimension the
/// result is staged in a temporary buffer and copied back.
///
/// # Errors
/// See [`convolve`].
pub fn convolve_in_place<K, I>(
    half_kernels: &[K],
    image: &mut I,
    extension: Extension<I::Sample>,
    config: &ConvolveConfig,
) -> Result<()>
where
    K: AsRef<[f64]>,
    I: RandomAccessibleMut + Sync,
    I::Sample: Sample + ToWork<Work<I>>,
{
    let bounds = image.bounds().ok_or(ViewError::Unbounded)?;
    let pipeline = Pipeline::new::<Work<I>, K>(half_kernels, bounds, config)?;
    let tmp = {
        let extended = View::new(&*image).extend(extension)?;
        if pipeline.n == 1 {
            let mut tmp = pipeline.allocate::<Work<I>>(0)?;
            let interval = Interval::from_dims(&pipeline.temp_dims[0]);
            pipeline.pass(0, &extended, &pipeline.source_offset(), &mut tmp, &interval)?;
            tmp
        } else {
            pipeline.leading_passes::<Work<I>, _>(&extended)?
        }
    };
    if pipeline.n == 1 {
        // A unit kernel copies the staged line back.
        let offset = pipeline.target_offset();
        convolve_offset(
            &[1.0],
            pipeline.factory,
            &tmp,
            &offset,
            image,
            &pipeline.target,
            0,
            &pipeline.executor,
        )
    } else {
        pipeline.last_pass(&tmp, image)
    }
}

/// Validated inputs of one convolution call.
struct Pipeline<'k> {
    n: usize,
    kernels: Vec<&'k [f64]>,
    target: Interval,
    temp_dims: Vec<DimVec<usize>>,
    factory: &'static ConvolverFactory,
    executor: Executor,
    max_flat_len: usize,
}

impl<'k> Pipeline<'k> {
    fn new<W: Accumulator, K: AsRef<[f64]>>(
        half_kernels: &'k [K],
        target: Interval,
        config: &ConvolveConfig,
    ) -> Result<Self> {
        let n = target.num_dimensions();
        if half_kernels.len() != n {
            return Err(ConvolveError::KernelCount {
                expected: n,
                found: half_kernels.len(),
            });
        }
        let kernels: Vec<&[f64]> = half_kernels.iter().map(|k| k.as_ref()).collect();
        if let Some(dim) = kernels.iter().position(|k| k.is_empty()) {
            return Err(ConvolveError::EmptyKernel { dim });
        }
        let executor = Executor::new(config.num_threads())?;
        let dims = target.dimensions();
        let buffered = can_use_buffered(&dims, &kernels);
        let factory = select_convolver_factory(W::PRECISION, buffered);
        debug!(
            "separable convolution over {:?}: precision {:?}, buffered {}, {} threads, {} tasks per pass",
            target,
            W::PRECISION,
            buffered,
            executor.num_threads(),
            executor.num_tasks()
        );
        Ok(Self {
            n,
            temp_dims: temp_dimensions(&dims, &kernels),
            kernels,
            target,
            factory,
            executor,
            max_flat_len: config.max_flat_len(),
        })
    }

    /// Offset of the first pass's input relative to its output buffer.
    fn source_offset(&self) -> DimVec<i64> {
        (0..self.n)
            .map(|d| self.target.min(d) + 1 - self.kernels[d].len() as i64)
            .collect()
    }

    /// Offset of the last pass's input buffer relative to the target.
    fn target_offset(&self) -> DimVec<i64> {
        self.target.mins().iter().map(|&m| -m).collect()
    }

    fn allocate<W: Accumulator + Sample<Work = W>>(&self, slot: usize) -> Result<Img<W>> {
        let img = Img::allocate(&self.temp_dims[slot], self.max_flat_len)?;
        debug!(
            "temporary buffer {:?} uses {:?} storage",
            self.temp_dims[slot].as_slice(),
            img.kind()
        );
        Ok(img)
    }

    /// Passes `0..n-1`, returning the buffer the last pass reads.
    fn leading_passes<W, Src>(&self, source: &Src) -> Result<Img<W>>
    where
        W: Accumulator + Sample<Work = W> + ToWork<W>,
        Src: RandomAccessible + Sync,
        Src::Sample: ToWork<W>,
    {
        let n = self.n;
        let mut tmp1 = self.allocate::<W>(0)?;
        let interval = Interval::from_dims(&self.temp_dims[0]);
        self.pass(0, source, &self.source_offset(), &mut tmp1, &interval)?;
        if n > 2 {
            let mut tmp2 = self.allocate::<W>(1)?;
            let zero: DimVec<i64> = DimVec::from_elem(0, n);
            for d in 1..n - 1 {
                let interval = Interval::from_dims(&self.temp_dims[d]);
                self.pass(d, &tmp1, &zero, &mut tmp2, &interval)?;
                std::mem::swap(&mut tmp1, &mut tmp2);
            }
        }
        Ok(tmp1)
    }

    fn last_pass<W, Dst>(&self, tmp: &Img<W>, target: &mut Dst) -> Result<()>
    where
        W: Accumulator + Sample<Work = W> + ToWork<W>,
        Dst: RandomAccessibleMut,
        Dst::Sample: Sample<Work = W>,
    {
        self.pass(self.n - 1, tmp, &self.target_offset(), target, &self.target)
    }

    fn pass<Src, Dst>(
        &self,
        d: usize,
        source: &Src,
        source_offset: &[i64],
        target: &mut Dst,
        target_interval: &Interval,
    ) -> Result<()>
    where
        Src: RandomAccessible + Sync,
        Src::Sample: ToWork<Work<Dst>>,
        Dst: RandomAccessibleMut,
        Dst::Sample: Sample,
    {
        debug!(
            "pass {d}: writing {:?} with radius {}",
            target_interval,
            self.kernels[d].len() - 1
        );
        convolve_offset(
            self.kernels[d],
            self.factory,
            source,
            source_offset,
            target,
            target_interval,
            d,
            &self.executor,
        )
    }
}

/// Convolve along dimension `d` every line of `target_interval`, reading the
/// line starting at `target position + source_offset` in `source`.
#[allow(clippy::too_many_arguments)]
fn convolve_offset<Src, Dst>(
    half_kernel: &[f64],
    factory: &ConvolverFactory,
    source: &Src,
    source_offset: &[i64],
    target: &mut Dst,
    target_interval: &Interval,
    d: usize,
    executor: &Executor,
) -> Result<()>
where
    Src: RandomAccessible + Sync,
    Src::Sample: ToWork<Work<Dst>>,
    Dst: RandomAccessibleMut,
    Dst::Sample: Sample,
{
    let n = target_interval.num_dimensions();
    let k1 = half_kernel.len() as i64 - 1;
    let line_len = target_interval.dimension(d);
    let mut line_dims = target_interval.dimensions();
    line_dims[d] = 1;
    let num_lines = if line_len == 0 {
        0
    } else {
        line_dims.iter().product()
    };
    if num_lines == 0 {
        return Ok(());
    }

    let min = target_interval.mins();
    let max = target_interval.maxs();
    let src_min: DimVec<i64> = min.iter().zip(source_offset).map(|(&m, &o)| m + o).collect();
    let mut src_max: DimVec<i64> = max.iter().zip(source_offset).map(|(&m, &o)| m + o).collect();
    src_max[d] += 2 * k1;
    let src_interval = Interval::new(&src_min, &src_max)?;

    let writer = target.writer();
    executor.run(d, num_lines, |lines: Range<usize>| -> Result<()> {
        let mut input = source.random_access_in(&src_interval)?;
        // SAFETY: every task owns a distinct set of lines, so no position is
        // written by two tasks, and nothing else reads the target meanwhile.
        let mut output = unsafe { writer.access_mut() };
        let mut convolver = factory.create::<Work<Dst>>(half_kernel, d, line_len)?;

        let mut start: DimVec<i64> = DimVec::from_elem(0, n);
        index_to_position(lines.start, &line_dims, &mut start);
        let out_start: DimVec<i64> = min.iter().zip(&start).map(|(&m, &s)| m + s).collect();
        let in_start: DimVec<i64> = src_min.iter().zip(&start).map(|(&m, &s)| m + s).collect();
        output.set_position(&out_start);
        input.set_position(&in_start);

        for _ in lines {
            convolver.run(&mut input, &mut output);
            output.set_position_dim(min[d], d);
            input.set_position_dim(src_min[d], d);
            for i in (0..n).filter(|&i| i != d) {
                output.fwd(i);
                if output.position()[i] > max[i] {
                    output.set_position_dim(min[i], i);
                    input.set_position_dim(src_min[i], i);
                } else {
                    input.fwd(i);
                    break;
                }
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use lattice_view::{ArrayImg, CellImg, Extension};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn random_img(dims: &[usize], seed: u64) -> ArrayImg<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        ArrayImg::from_fn(dims, |_| rng.gen_range(-1.0..1.0)).unwrap()
    }

    fn reference(half: &[Vec<f64>], src: &ArrayImg<f64>) -> ArrayImg<f64> {
        let dims = src.dims();
        let mut cur = src.clone();
        for (d, k) in half.iter().enumerate() {
            let k1 = k.len() as i64 - 1;
            let prev = cur.clone();
            let extended = View::new(&prev).extend(Extension::MirrorSingle).unwrap();
            let mut a = extended.random_access();
            cur = ArrayImg::from_fn(&dims, |p| {
                let mut q: Vec<i64> = p.to_vec();
                let mut sum = 0.0;
                for j in -k1..=k1 {
                    q[d] = p[d] + j;
                    a.set_position(&q);
                    sum += k[j.unsigned_abs() as usize] * lattice_view::RandomAccess::get(&a);
                }
                sum
            })
            .unwrap();
        }
        cur
    }

    #[test]
    fn test_three_dims_matches_reference() {
        init_logger();
        let src = random_img(&[6, 5, 4], 7);
        let half = vec![vec![0.5, 0.25], vec![0.4, 0.2, 0.1], vec![0.6, 0.2]];
        let extended = View::new(&src).extend(Extension::MirrorSingle).unwrap();
        let mut dst = ArrayImg::<f64>::new(&[6, 5, 4]).unwrap();
        convolve(&half, &extended, &mut dst, 2).unwrap();
        let expected = reference(&half, &src);
        for (a, b) in dst.as_slice().iter().zip(expected.as_slice()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_four_dims_matches_reference() {
        init_logger();
        let dims = [5, 4, 4, 3];
        let src = random_img(&dims, 21);
        let half = vec![
            vec![0.5, 0.25],
            vec![0.4, 0.2, 0.1],
            vec![0.6, 0.2],
            vec![0.3, 0.2, 0.1, 0.05],
        ];
        let extended = View::new(&src).extend(Extension::MirrorSingle).unwrap();
        let expected = reference(&half, &src);
        for config in [
            ConvolveConfig::new(1),
            ConvolveConfig::new(3).with_max_flat_len(40),
        ] {
            let mut dst = ArrayImg::<f64>::new(&dims).unwrap();
            convolve_with(&half, &extended, &mut dst, &config).unwrap();
            for (a, b) in dst.as_slice().iter().zip(expected.as_slice()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_u8_source_into_f64_target() {
        let dims = [6, 5];
        let bytes = ArrayImg::from_fn(&dims, |p| (p[0] * 40 + p[1] * 7) as u8).unwrap();
        let floats = ArrayImg::from_fn(&dims, |p| bytes.get(p) as f64).unwrap();
        let half = vec![vec![0.5, 0.25], vec![0.4, 0.2, 0.1]];

        let mut from_bytes = ArrayImg::<f64>::new(&dims).unwrap();
        let extended = View::new(&bytes).extend(Extension::Border).unwrap();
        convolve(&half, &extended, &mut from_bytes, 2).unwrap();

        let mut from_floats = ArrayImg::<f64>::new(&dims).unwrap();
        let extended = View::new(&floats).extend(Extension::Border).unwrap();
        convolve(&half, &extended, &mut from_floats, 2).unwrap();

        assert_eq!(from_bytes.as_slice(), from_floats.as_slice());
        // Not rounded to the source type.
        assert!(from_bytes.as_slice().iter().any(|v| v.fract() != 0.0));
    }

    #[test]
    fn test_target_with_offset_min() {
        let src = random_img(&[8, 8], 3);
        let half = vec![vec![0.5, 0.25], vec![0.5, 0.25]];
        let extended = View::new(&src).extend(Extension::Border).unwrap();
        let window = Interval::new(&[2, 3], &[5, 6]).unwrap();
        let mut dst = ArrayImg::<f64>::new(&[4, 4]).unwrap().with_min(&[2, 3]).unwrap();
        convolve(&half, &extended, &mut dst, 1).unwrap();
        let mut full = ArrayImg::<f64>::new(&[8, 8]).unwrap();
        convolve(&half, &extended, &mut full, 1).unwrap();
        for y in window.min(1)..=window.max(1) {
            for x in window.min(0)..=window.max(0) {
                assert_eq!(dst.get(&[x, y]), full.get(&[x, y]));
            }
        }
    }

    #[test]
    fn test_kernel_count_checked() {
        let src = random_img(&[4, 4], 1);
        let mut dst = ArrayImg::<f64>::new(&[4, 4]).unwrap();
        let err = convolve(&[vec![1.0]], &src, &mut dst, 1).err().unwrap();
        assert!(matches!(err, ConvolveError::KernelCount { expected: 2, found: 1 }));
    }

    #[test]
    fn test_empty_kernel_checked() {
        let src = random_img(&[4, 4], 1);
        let mut dst = ArrayImg::<f64>::new(&[4, 4]).unwrap();
        let half: Vec<Vec<f64>> = vec![vec![1.0], vec![]];
        let err = convolve(&half, &src, &mut dst, 1).err().unwrap();
        assert!(matches!(err, ConvolveError::EmptyKernel { dim: 1 }));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let src = random_img(&[4], 1);
        let mut dst = ArrayImg::<f64>::new(&[4]).unwrap();
        let err = convolve(&[vec![1.0]], &src, &mut dst, 0).err().unwrap();
        assert!(matches!(err, ConvolveError::InvalidThreadCount(0)));
    }

    #[test]
    fn test_rank_mismatch() {
        let src = random_img(&[4], 1);
        let mut dst = ArrayImg::<f64>::new(&[4, 4]).unwrap();
        let err = convolve(&[vec![1.0], vec![1.0]], &src, &mut dst, 1).err().unwrap();
        assert!(matches!(
            err,
            ConvolveError::View(ViewError::DimensionMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_missing_padding_is_task_failure() {
        let src = random_img(&[5, 5], 2);
        let mut dst = ArrayImg::<f64>::new(&[5, 5]).unwrap();
        let err = convolve(&[vec![0.5, 0.25], vec![1.0]], &src, &mut dst, 2)
            .err()
            .unwrap();
        assert!(matches!(err, ConvolveError::TaskFailed { dim: 0, .. }));
    }

    #[test]
    fn test_in_place_matches_out_of_place() {
        for dims in [vec![9usize], vec![7, 6], vec![5, 4, 3]] {
            let half: Vec<Vec<f64>> = dims.iter().map(|_| vec![0.5, 0.2, 0.05]).collect();
            let src = random_img(&dims, 11);
            let extended = View::new(&src).extend(Extension::MirrorDouble).unwrap();
            let mut expected = ArrayImg::<f64>::new(&dims).unwrap();
            convolve(&half, &extended, &mut expected, 1).unwrap();

            let mut image = src.clone();
            let config = ConvolveConfig::new(3);
            convolve_in_place(&half, &mut image, Extension::MirrorDouble, &config).unwrap();
            assert_eq!(image.as_slice(), expected.as_slice());
        }
    }

    #[test]
    fn test_cell_buffers_match_flat() {
        init_logger();
        let src = random_img(&[7, 6, 5], 5);
        let half = vec![vec![0.5, 0.25], vec![0.5, 0.25], vec![0.5, 0.25]];
        let extended = View::new(&src).extend(Extension::Periodic).unwrap();
        let mut flat = ArrayImg::<f64>::new(&[7, 6, 5]).unwrap();
        convolve(&half, &extended, &mut flat, 2).unwrap();
        let mut chunked = ArrayImg::<f64>::new(&[7, 6, 5]).unwrap();
        let config = ConvolveConfig::new(2).with_max_flat_len(50);
        convolve_with(&half, &extended, &mut chunked, &config).unwrap();
        assert_eq!(flat.as_slice(), chunked.as_slice());
    }

    #[test]
    fn test_cell_target() {
        let src = random_img(&[6, 6], 9);
        let half = vec![vec![0.5, 0.25], vec![0.6, 0.2]];
        let extended = View::new(&src).extend(Extension::Border).unwrap();
        let mut flat = ArrayImg::<f64>::new(&[6, 6]).unwrap();
        convolve(&half, &extended, &mut flat, 1).unwrap();
        let mut cells = CellImg::<f64>::new(&[6, 6], 12).unwrap();
        convolve(&half, &extended, &mut cells, 3).unwrap();
        for y in 0..6 {
            for x in 0..6 {
                assert_eq!(cells.get(&[x, y]), flat.get(&[x, y]));
            }
        }
    }
}

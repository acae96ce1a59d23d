//! Line convolvers and the precision-keyed factory table.
//!
//! A line convolver reads `len + 2 * radius` input samples along one
//! dimension and writes `len` outputs. Both variants evaluate
//! `w0 * x[c] + sum_j w_j * (x[c - j] + x[c + j])` with `j` ascending, so
//! they produce identical results; the buffered one only avoids repeated
//! random access.

use lattice_traits::{Accumulator, Precision, Sample, ToWork};
use lattice_view::{RandomAccess, RandomAccessMut};

use crate::{ConvolveError, Result};

/// Builds [`LineConvolver`]s of one precision class and one variant.
#[derive(Debug, PartialEq, Eq)]
pub struct ConvolverFactory {
    precision: Precision,
    buffered: bool,
}

static FACTORIES: [[ConvolverFactory; 2]; 3] = [
    [
        ConvolverFactory::new(Precision::Double, false),
        ConvolverFactory::new(Precision::Double, true),
    ],
    [
        ConvolverFactory::new(Precision::Float, false),
        ConvolverFactory::new(Precision::Float, true),
    ],
    [
        ConvolverFactory::new(Precision::Generic, false),
        ConvolverFactory::new(Precision::Generic, true),
    ],
];

/// Factory for `precision`, buffered or direct. Pure table lookup.
pub fn select_convolver_factory(precision: Precision, buffered: bool) -> &'static ConvolverFactory {
    &FACTORIES[precision.index()][usize::from(buffered)]
}

impl ConvolverFactory {
    const fn new(precision: Precision, buffered: bool) -> Self {
        Self {
            precision,
            buffered,
        }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    /// Convolver along dimension `d` producing `line_len` outputs per line.
    ///
    /// # Errors
    /// Returns [`ConvolveError::PrecisionMismatch`] if `W` is not of this
    /// factory's precision class, [`ConvolveError::EmptyKernel`] if
    /// `half_kernel` is empty.
    pub fn create<W: Accumulator>(
        &self,
        half_kernel: &[f64],
        d: usize,
        line_len: usize,
    ) -> Result<LineConvolver<W>> {
        if W::PRECISION != self.precision {
            return Err(ConvolveError::PrecisionMismatch {
                expected: self.precision,
                found: W::PRECISION,
            });
        }
        if half_kernel.is_empty() {
            return Err(ConvolveError::EmptyKernel { dim: d });
        }
        let radius = half_kernel.len() - 1;
        let scratch = if self.buffered {
            Vec::with_capacity(line_len + 2 * radius)
        } else {
            Vec::new()
        };
        Ok(LineConvolver {
            weights: half_kernel.iter().map(|&w| W::weight(w)).collect(),
            d,
            line_len,
            buffered: self.buffered,
            scratch,
        })
    }
}

/// Convolves one line at a time along a fixed dimension.
pub struct LineConvolver<W: Accumulator> {
    weights: Vec<W::Weight>,
    d: usize,
    line_len: usize,
    buffered: bool,
    scratch: Vec<W>,
}

impl<W: Accumulator> LineConvolver<W> {
    pub fn radius(&self) -> usize {
        self.weights.len() - 1
    }

    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    #[inline]
    fn convolve_at(&self, center: W, mut pair: impl FnMut(usize) -> (W, W)) -> W {
        let mut sum = center.scale(self.weights[0]);
        for (j, &w) in self.weights.iter().enumerate().skip(1) {
            let (left, right) = pair(j);
            sum = sum.accumulate(left.accumulate(right).scale(w));
        }
        sum
    }

    /// Convolve the line starting at the current positions.
    ///
    /// Input samples are converted into `W`, the working type of the output.
    ///
    /// `input` must sit `radius` samples before the first output along the
    /// convolved dimension. Both accessors are left past the end of the
    /// line in that dimension.
    pub fn run<I, O>(&mut self, input: &mut I, output: &mut O)
    where
        I: RandomAccess,
        I::Sample: ToWork<W>,
        O: RandomAccessMut,
        O::Sample: Sample<Work = W>,
    {
        if self.buffered {
            self.run_buffered(input, output);
        } else {
            self.run_direct(input, output);
        }
    }

    fn run_buffered<I, O>(&mut self, input: &mut I, output: &mut O)
    where
        I: RandomAccess,
        I::Sample: ToWork<W>,
        O: RandomAccessMut,
        O::Sample: Sample<Work = W>,
    {
        let d = self.d;
        let k1 = self.radius();
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        for _ in 0..self.line_len + 2 * k1 {
            scratch.push(input.get().into_work());
            input.fwd(d);
        }
        for c in k1..k1 + self.line_len {
            let sum = self.convolve_at(scratch[c], |j| (scratch[c - j], scratch[c + j]));
            output.set(<O::Sample as Sample>::from_work(sum));
            output.fwd(d);
        }
        self.scratch = scratch;
    }

    fn run_direct<I, O>(&mut self, input: &mut I, output: &mut O)
    where
        I: RandomAccess,
        I::Sample: ToWork<W>,
        O: RandomAccessMut,
        O::Sample: Sample<Work = W>,
    {
        let d = self.d;
        let k1 = self.radius() as i64;
        let start = input.position()[d];
        for c in 0..self.line_len as i64 {
            let center = start + k1 + c;
            input.set_position_dim(center, d);
            let x = input.get().into_work();
            let sum = self.convolve_at(x, |j| {
                input.set_position_dim(center - j as i64, d);
                let left = input.get().into_work();
                input.set_position_dim(center + j as i64, d);
                let right = input.get().into_work();
                (left, right)
            });
            output.set(<O::Sample as Sample>::from_work(sum));
            output.fwd(d);
        }
        input.set_position_dim(start + self.line_len as i64 + 2 * k1, d);
    }
}

/// Upper half of a symmetric 1-D kernel, starting at the center weight.
#[derive(Debug, Clone, PartialEq)]
pub struct HalfKernel {
    weights: Vec<f64>,
}

impl HalfKernel {
    /// Wrap `weights`, `None` when empty.
    pub fn new(weights: Vec<f64>) -> Option<Self> {
        if weights.is_empty() {
            None
        } else {
            Some(Self { weights })
        }
    }

    /// Normalized Gaussian half-kernel, `None` unless `sigma` is finite and
    /// positive.
    ///
    /// The kernel covers `3 * sigma` rounded to nearest, at least one sample
    /// on each side of the center. Weights are scaled so that the mirrored
    /// full kernel sums to one.
    pub fn gaussian(sigma: f64) -> Option<Self> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return None;
        }
        let size = ((3.0 * sigma + 0.5) as usize + 1).max(2);
        let two_sq_sigma = 2.0 * sigma * sigma;
        let mut weights: Vec<f64> = (0..size)
            .map(|x| {
                let x = x as f64;
                (-(x * x) / two_sq_sigma).exp()
            })
            .collect();
        let sum = 2.0 * (0.5 * weights[0] + weights[1..].iter().sum::<f64>());
        for w in &mut weights {
            *w /= sum;
        }
        Some(Self { weights })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Distance from the center to the outermost weight.
    pub fn radius(&self) -> usize {
        self.weights.len() - 1
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Full mirrored kernel of length `2 * radius + 1`.
    pub fn to_full(&self) -> Vec<f64> {
        let mut full: Vec<f64> = self.weights[1..].iter().rev().copied().collect();
        full.extend_from_slice(&self.weights);
        full
    }
}

impl AsRef<[f64]> for HalfKernel {
    fn as_ref(&self) -> &[f64] {
        &self.weights
    }
}

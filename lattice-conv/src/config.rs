//! Programmatic configuration of the convolution engine.

/// Settings for one convolution call.
///
/// ```
/// use lattice_conv::ConvolveConfig;
///
/// let config = ConvolveConfig::default().with_num_threads(4).with_max_flat_len(1 << 20);
/// assert_eq!(config.num_threads(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvolveConfig {
    num_threads: usize,
    max_flat_len: usize,
}

impl Default for ConvolveConfig {
    fn default() -> Self {
        Self {
            num_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_flat_len: i32::MAX as usize,
        }
    }
}

impl ConvolveConfig {
    /// Default configuration with `num_threads` workers.
    pub fn new(num_threads: usize) -> Self {
        Self::default().with_num_threads(num_threads)
    }

    /// Worker count; zero is rejected when the convolution runs.
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Largest temporary buffer, in elements, stored as one dense array.
    /// Larger buffers are split into blocks of at most this many elements.
    pub fn with_max_flat_len(mut self, max_flat_len: usize) -> Self {
        self.max_flat_len = max_flat_len.max(1);
        self
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn max_flat_len(&self) -> usize {
        self.max_flat_len
    }
}

//! Shared numeric traits for the lattice-rs ecosystem.
//!
//! This crate provides the sample-type contract consumed by `lattice-view`
//! (storage and accessors) and `lattice-conv` (weighted sums along lines).
//!
//! Downstream crates can depend on `lattice-traits` alone to make their own
//! pixel types usable with the convolution engine without orphan rule
//! violations.

pub mod accumulator;
pub mod sample;

pub use accumulator::{Accumulator, Precision};
pub use sample::{Sample, ToWork};

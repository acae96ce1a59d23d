//! Storable sample types and their conversion to working precision.

use num_complex::Complex;
use num_traits::Float;

use crate::accumulator::Accumulator;

/// A value stored in an image and processed by the convolution engine.
///
/// Every sample type names the [`Accumulator`] it is processed in. The
/// working type is itself a sample whose working type is itself, so
/// temporary buffers of working values can be read and written with the
/// same machinery as the user's images.
///
/// - `f64` works in `f64`
/// - `f32` and all primitive integers work in `f32`
/// - complex numbers work in their own precision
///
/// Values enter a working type through [`ToWork`].
pub trait Sample: Copy + Send + Sync + Default + 'static {
    /// Working type used for weighted sums.
    type Work: Accumulator + Sample<Work = Self::Work> + ToWork<Self::Work>;

    /// Convert back from working precision. Integer types round to nearest
    /// and saturate at their range.
    fn from_work(w: Self::Work) -> Self;
}

impl Sample for f64 {
    type Work = f64;

    #[inline]
    fn from_work(w: f64) -> f64 {
        w
    }
}

impl Sample for f32 {
    type Work = f32;

    #[inline]
    fn from_work(w: f32) -> f32 {
        w
    }
}

macro_rules! impl_integer_sample {
    ($($t:ty),* $(,)?) => {
        $(
            impl Sample for $t {
                type Work = f32;

                #[inline]
                fn from_work(w: f32) -> $t {
                    // `as` saturates and maps NaN to zero.
                    w.round() as $t
                }
            }
        )*
    };
}

impl_integer_sample!(u8, u16, u32, u64, i8, i16, i32, i64);

impl<T> Sample for Complex<T>
where
    T: Float + Send + Sync + Default + 'static,
{
    type Work = Complex<T>;

    #[inline]
    fn from_work(w: Self) -> Self {
        w
    }
}

/// Conversion of a sample into the working type `W` of some target.
///
/// The target decides the precision, so every real sample converts into
/// both `f32` and `f64`. Complex samples convert into their own type only.
pub trait ToWork<W: Accumulator>: Copy + Send + Sync + 'static {
    fn into_work(self) -> W;
}

macro_rules! impl_real_to_work {
    ($($t:ty),* $(,)?) => {
        $(
            impl ToWork<f32> for $t {
                #[inline]
                fn into_work(self) -> f32 {
                    self as f32
                }
            }

            impl ToWork<f64> for $t {
                #[inline]
                fn into_work(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_real_to_work!(f32, f64, u8, u16, u32, u64, i8, i16, i32, i64);

impl<T> ToWork<Complex<T>> for Complex<T>
where
    T: Float + Send + Sync + Default + 'static,
{
    #[inline]
    fn into_work(self) -> Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Precision;
    use num_complex::Complex32;

    fn precision_of<T: Sample>() -> Precision {
        <T::Work as Accumulator>::PRECISION
    }

    #[test]
    fn test_work_precision_selection() {
        assert_eq!(precision_of::<f64>(), Precision::Double);
        assert_eq!(precision_of::<f32>(), Precision::Float);
        assert_eq!(precision_of::<u8>(), Precision::Float);
        assert_eq!(precision_of::<i64>(), Precision::Float);
        assert_eq!(precision_of::<Complex32>(), Precision::Generic);
    }

    #[test]
    fn test_integer_rounding_and_saturation() {
        assert_eq!(u8::from_work(12.5), 13);
        assert_eq!(u8::from_work(12.49), 12);
        assert_eq!(u8::from_work(300.0), 255);
        assert_eq!(u8::from_work(-4.0), 0);
        assert_eq!(i16::from_work(-2.5), -3);
        assert_eq!(u16::from_work(f32::NAN), 0);
    }

    #[test]
    fn test_work_round_trip_is_identity_for_floats() {
        assert_eq!(f64::from_work(ToWork::<f64>::into_work(0.1f64)), 0.1);
        assert_eq!(f32::from_work(ToWork::<f32>::into_work(0.1f32)), 0.1);
    }

    #[test]
    fn test_real_samples_convert_into_either_precision() {
        let x: f64 = 200u8.into_work();
        assert_eq!(x, 200.0);
        let y: f32 = (-7i16).into_work();
        assert_eq!(y, -7.0);
        let z: f32 = 0.1f64.into_work();
        assert_eq!(z, 0.1f32);
        let c: Complex32 = Complex32::new(1.0, -2.0).into_work();
        assert_eq!(c, Complex32::new(1.0, -2.0));
    }
}

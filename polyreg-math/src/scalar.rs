use core::fmt;

/// Element type of a scientific field that can be fed to the predictor.
///
/// All fitting and prediction happens in `f64`; the element type only decides
/// how samples are widened on the way in and narrowed on the way out.
pub trait Scalar: Copy + Default + PartialEq + PartialOrd + fmt::Debug + Send + Sync + 'static {
    /// Size of one element in the raw little-endian representation.
    const BYTES: usize;

    fn to_f64(self) -> f64;
    fn from_f64(v: f64) -> Self;
}

impl Scalar for f32 {
    const BYTES: usize = 4;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl Scalar for f64 {
    const BYTES: usize = 8;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }
}

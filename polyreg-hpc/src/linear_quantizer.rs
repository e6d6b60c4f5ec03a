use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use polyreg_core::{CodecError, ReadSection, ScalarQuantizer, DEFAULT_RADIUS};
use polyreg_math::Scalar;

/// Largest accepted radius. Keeps `4 · radius` representable as `i32`.
pub const MAX_RADIUS: i32 = i32::MAX / 4;

/// Error-bounded linear-scaling quantizer (SZ style).
///
/// The difference to the prediction is binned with width `2·eb`, so the
/// reconstruction `pred + 2·k·eb` is within `eb` of the input. Codes are
/// `radius + k` for `|k| < radius`. Code `0` is the escape: the raw value is
/// kept verbatim in an unpredictable list and returned in order on recovery.
///
/// Serialized form:
/// `[f64 eb][i32 radius][u64 n_unpredictable][f64 × n_unpredictable]`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearQuantizer {
    error_bound: f64,
    error_bound_reciprocal: f64,
    radius: i32,
    unpredictable: Vec<f64>,
    cursor: usize,
}

impl LinearQuantizer {
    pub fn new(error_bound: f64) -> Self {
        Self::with_radius(error_bound, DEFAULT_RADIUS)
    }

    pub fn with_radius(error_bound: f64, radius: i32) -> Self {
        Self {
            error_bound,
            error_bound_reciprocal: reciprocal(error_bound),
            radius: radius.clamp(1, MAX_RADIUS),
            unpredictable: Vec::new(),
            cursor: 0,
        }
    }

    /// Number of values stored verbatim so far.
    pub fn unpredictable_count(&self) -> usize {
        self.unpredictable.len()
    }

    /// Quantize a field value of type `T`. The bound is checked against the
    /// reconstruction as `T` will hold it, so rounding to `T` on recovery
    /// never leaves the bound.
    pub fn quantize_scalar<T: Scalar>(&mut self, data: T, pred: f64) -> i32 {
        self.quantize_rounded(data.to_f64(), pred, |v| T::from_f64(v).to_f64())
            .0
    }

    fn escape(&mut self, data: f64) -> i32 {
        self.unpredictable.push(data);
        0
    }

    /// Code and reconstruction of `data`, with `round` applied to the
    /// reconstruction before the bound is checked.
    fn quantize_rounded(&mut self, data: f64, pred: f64, round: impl Fn(f64) -> f64) -> (i32, f64) {
        if !(self.error_bound > 0.0) {
            return (self.escape(data), data);
        }
        let diff = data - pred;
        let scaled = diff.abs() * self.error_bound_reciprocal + 1.0;
        // Also rejects NaN.
        if !(scaled < 2.0 * self.radius as f64) {
            return (self.escape(data), data);
        }
        let half = (scaled as i32) >> 1;
        let step = if diff < 0.0 { -2 * half } else { 2 * half };
        let reconstructed = round(pred + step as f64 * self.error_bound);
        if !((reconstructed - data).abs() <= self.error_bound) {
            return (self.escape(data), data);
        }
        (self.radius + step / 2, reconstructed)
    }
}

fn reciprocal(eb: f64) -> f64 {
    if eb > 0.0 {
        1.0 / eb
    } else {
        0.0
    }
}

impl ScalarQuantizer for LinearQuantizer {
    fn quantize_and_overwrite(&mut self, data: &mut f64, pred: f64) -> i32 {
        let (code, reconstructed) = self.quantize_rounded(*data, pred, |v| v);
        *data = reconstructed;
        code
    }

    fn recover(&mut self, pred: f64, code: i32) -> Result<f64, CodecError> {
        if code == 0 {
            let value = self.unpredictable.get(self.cursor).copied().ok_or_else(|| {
                CodecError::CorruptStream(format!(
                    "escape #{} but only {} unpredictable values stored",
                    self.cursor + 1,
                    self.unpredictable.len()
                ))
            })?;
            self.cursor += 1;
            return Ok(value);
        }
        if code < 0 || code >= 2 * self.radius {
            return Err(CodecError::CorruptStream(format!(
                "code {} outside 0..{}",
                code,
                2 * self.radius
            )));
        }
        let step = 2 * (code - self.radius);
        Ok(pred + step as f64 * self.error_bound)
    }

    fn error_bound(&self) -> f64 {
        self.error_bound
    }

    fn radius(&self) -> i32 {
        self.radius
    }

    fn save(&self, out: &mut Vec<u8>) {
        // Writes into a Vec cannot fail.
        let _ = out.write_f64::<LittleEndian>(self.error_bound);
        let _ = out.write_i32::<LittleEndian>(self.radius);
        let _ = out.write_u64::<LittleEndian>(self.unpredictable.len() as u64);
        for &v in &self.unpredictable {
            let _ = out.write_f64::<LittleEndian>(v);
        }
    }

    fn load(&mut self, input: &mut &[u8]) -> Result<(), CodecError> {
        let error_bound = input.read_f64::<LittleEndian>().section("quantizer")?;
        let radius = input.read_i32::<LittleEndian>().section("quantizer")?;
        if !(1..=MAX_RADIUS).contains(&radius) {
            return Err(CodecError::CorruptStream(format!("quantizer radius {}", radius)));
        }
        let count = input.read_u64::<LittleEndian>().section("quantizer")?;
        if count > (input.len() / 8) as u64 {
            return Err(CodecError::Truncated("quantizer"));
        }
        let mut unpredictable = Vec::with_capacity(count as usize);
        for _ in 0..count {
            unpredictable.push(input.read_f64::<LittleEndian>().section("quantizer")?);
        }

        self.error_bound = error_bound;
        self.error_bound_reciprocal = reciprocal(error_bound);
        self.radius = radius;
        self.unpredictable = unpredictable;
        self.cursor = 0;
        Ok(())
    }

    fn clear(&mut self) {
        self.unpredictable.clear();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_bound() {
        let epsilon = 1e-3;
        let mut q = LinearQuantizer::new(epsilon);

        let inputs = [0.0, 0.0005, -0.0005, 0.0015, -0.1, 3.14159];
        for &pred in &[0.0, 1.0, -2.5] {
            for &raw in &inputs {
                let mut data = raw;
                let code = q.quantize_and_overwrite(&mut data, pred);
                assert!(code > 0, "unexpected escape for {}", raw);
                assert!((data - raw).abs() <= epsilon, "{} -> {}", raw, data);
            }
        }
    }

    #[test]
    fn test_recover_matches_overwrite_bitwise() {
        let mut enc = LinearQuantizer::new(0.01);
        let values = [0.123, -7.77, 42.0, 1e-9, -0.019];
        let mut codes = Vec::new();
        let mut recon = Vec::new();
        let mut pred = 0.0;
        for &v in &values {
            let mut d = v;
            codes.push(enc.quantize_and_overwrite(&mut d, pred));
            recon.push(d);
            pred = d;
        }

        let mut dec = LinearQuantizer::new(0.01);
        let mut pred = 0.0;
        for (code, expected) in codes.iter().zip(&recon) {
            let v = dec.recover(pred, *code).unwrap();
            assert_eq!(v.to_bits(), expected.to_bits());
            pred = v;
        }
    }

    #[test]
    fn test_out_of_range_escapes() {
        let mut q = LinearQuantizer::with_radius(1e-3, 4);
        let mut data = 10.0;
        let code = q.quantize_and_overwrite(&mut data, 0.0);
        assert_eq!(code, 0);
        assert_eq!(data, 10.0);
        assert_eq!(q.unpredictable_count(), 1);

        let mut nan = f64::NAN;
        assert_eq!(q.quantize_and_overwrite(&mut nan, 0.0), 0);
    }

    #[test]
    fn test_zero_bound_is_lossless() {
        let mut q = LinearQuantizer::new(0.0);
        let mut data = 1.2345;
        assert_eq!(q.quantize_and_overwrite(&mut data, 1.0), 0);
        assert_eq!(data, 1.2345);
    }

    #[test]
    fn test_save_load_with_escapes() {
        let mut enc = LinearQuantizer::with_radius(1e-2, 8);
        let raw = [0.05, 100.0, -0.01, -250.5];
        let codes: Vec<i32> = raw.iter().map(|&v| enc.quantize(v, 0.0)).collect();
        assert_eq!(enc.unpredictable_count(), 2);

        let mut bytes = Vec::new();
        enc.save(&mut bytes);
        assert_eq!(bytes.len(), 8 + 4 + 8 + 2 * 8);

        let mut dec = LinearQuantizer::new(1.0);
        let mut input = bytes.as_slice();
        dec.load(&mut input).unwrap();
        assert!(input.is_empty());
        assert_eq!(dec.error_bound(), 1e-2);
        assert_eq!(dec.radius(), 8);

        let recovered: Vec<f64> = codes.iter().map(|&c| dec.recover(0.0, c).unwrap()).collect();
        assert_eq!(recovered[1], 100.0);
        assert_eq!(recovered[3], -250.5);
        assert!((recovered[0] - 0.05).abs() <= 1e-2);
    }

    #[test]
    fn test_corrupt_inputs() {
        let mut q = LinearQuantizer::new(1e-3);
        assert!(matches!(q.recover(0.0, 0), Err(CodecError::CorruptStream(_))));
        assert!(matches!(q.recover(0.0, -3), Err(CodecError::CorruptStream(_))));

        let mut bytes = Vec::new();
        LinearQuantizer::new(1e-3).save(&mut bytes);
        let mut short = &bytes[..10];
        assert!(matches!(q.load(&mut short), Err(CodecError::Truncated("quantizer"))));

        // Declares a million unpredictable values with none present.
        let mut forged = Vec::new();
        forged.write_f64::<LittleEndian>(1e-3).unwrap();
        forged.write_i32::<LittleEndian>(16).unwrap();
        forged.write_u64::<LittleEndian>(1_000_000).unwrap();
        let mut input = forged.as_slice();
        assert!(matches!(q.load(&mut input), Err(CodecError::Truncated("quantizer"))));
    }

    #[test]
    fn test_radius_limits() {
        let mut q = LinearQuantizer::with_radius(1.0, i32::MAX);
        assert_eq!(q.radius(), MAX_RADIUS);
        let mut data = 2e9;
        assert_eq!(q.quantize_and_overwrite(&mut data, 0.0), 0);
        let mut data = 1e9;
        let code = q.quantize_and_overwrite(&mut data, 0.0);
        assert!(code > 0 && code < 2 * q.radius());
        assert_eq!(q.recover(0.0, code).unwrap(), data);
        assert_eq!(LinearQuantizer::with_radius(1.0, -5).radius(), 1);

        let mut forged = Vec::new();
        forged.write_f64::<LittleEndian>(1e-3).unwrap();
        forged.write_i32::<LittleEndian>(i32::MAX).unwrap();
        forged.write_u64::<LittleEndian>(0).unwrap();
        assert!(matches!(
            q.load(&mut forged.as_slice()),
            Err(CodecError::CorruptStream(_))
        ));
    }

    #[test]
    fn test_f32_reconstruction_stays_in_bound() {
        // Near 1000 an f32 ulp is 6.1e-5, above the bound.
        let eb = 5e-5;
        let mut q = LinearQuantizer::new(eb);
        let mut codes = Vec::new();
        let values: Vec<f32> = (0..200).map(|i| 1000.0 + 3.0 * (0.37 * i as f32).sin()).collect();
        for &v in &values {
            codes.push(q.quantize_scalar(v, v as f64 + 1.7e-4));
        }
        for (&v, &code) in values.iter().zip(&codes) {
            let restored = f32::from_f64(q.recover(v as f64 + 1.7e-4, code).unwrap());
            assert!((restored as f64 - v as f64).abs() <= eb, "{} -> {}", v, restored);
        }
    }

    #[test]
    fn test_clear_keeps_configuration() {
        let mut q = LinearQuantizer::with_radius(1e-3, 2);
        q.quantize(1.0, 0.0);
        assert_eq!(q.unpredictable_count(), 1);
        q.clear();
        assert_eq!(q.unpredictable_count(), 0);
        assert_eq!(q.error_bound(), 1e-3);
        assert_eq!(q.radius(), 2);
    }
}

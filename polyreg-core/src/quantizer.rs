use crate::CodecError;

/// Bounded-error scalar quantizer used for delta coding.
///
/// Closed loop: `quantize_and_overwrite` replaces the raw value with exactly
/// the value `recover` will later return for the same `(pred, code)` pair, so
/// encoder and decoder observe bit-identical reconstructions.
///
/// How out-of-range values are handled (escape codes, stored literals) is up
/// to the implementation; callers treat codes as opaque.
pub trait ScalarQuantizer {
    /// Quantize `*data` against `pred`, overwrite it with the reconstruction
    /// and return the code.
    fn quantize_and_overwrite(&mut self, data: &mut f64, pred: f64) -> i32;

    /// Reconstruct the value for `code` given the same `pred` used to encode it.
    /// Fails only on input that does not match what the encoder produced.
    fn recover(&mut self, pred: f64, code: i32) -> Result<f64, CodecError>;

    fn error_bound(&self) -> f64;

    /// Codes produced are always in `0..2 * radius()`.
    fn radius(&self) -> i32;

    fn save(&self, out: &mut Vec<u8>);

    /// Restore from a serialized form, advancing `input` past it.
    fn load(&mut self, input: &mut &[u8]) -> Result<(), CodecError>;

    /// Drop all per-stream state, keeping the configured bound and radius.
    fn clear(&mut self);

    /// Code for `raw` without keeping the reconstruction.
    fn quantize(&mut self, raw: f64, pred: f64) -> i32 {
        let mut data = raw;
        self.quantize_and_overwrite(&mut data, pred)
    }
}

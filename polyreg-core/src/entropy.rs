use crate::CodecError;

/// Lossless coder for a stream of non-negative integer codes.
///
/// Encode: `preprocess_encode` → `save` (model) → `encode` (payload) →
/// `postprocess_encode`.
/// Decode: `load` (model) → `decode` (payload) → `postprocess_decode`.
pub trait EntropyCoder {
    /// Build the model from the codes. `state_count` bounds the symbol range
    /// the model must be able to represent.
    fn preprocess_encode(&mut self, codes: &[i32], state_count: usize) -> Result<(), CodecError>;

    /// Append the model.
    fn save(&self, out: &mut Vec<u8>);

    /// Append the coded payload for `codes`.
    fn encode(&self, codes: &[i32], out: &mut Vec<u8>) -> Result<(), CodecError>;

    fn postprocess_encode(&mut self);

    /// Read the model, advancing `input` past it.
    fn load(&mut self, input: &mut &[u8]) -> Result<(), CodecError>;

    /// Read a payload of exactly `count` codes, advancing `input` past it.
    fn decode(&self, input: &mut &[u8], count: usize) -> Result<Vec<i32>, CodecError>;

    fn postprocess_decode(&mut self);
}

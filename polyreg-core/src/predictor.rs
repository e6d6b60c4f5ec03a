use crate::{Block, CodecError};
use polyreg_math::Dimension;

/// Per-block lifecycle of a predictor inside an outer compression pipeline.
///
/// Blocks must be visited in the same order at compression and decompression
/// time: encode calls `fit_block` then `commit_block` per block, decode calls
/// `recover_block` per block. Between those calls `predict` answers for points
/// of the current block only.
pub trait BlockPredictor<D: Dimension> {
    /// Identifier written as the first byte of the serialized predictor.
    const ID: u8;

    /// Fit the current block (encode side).
    fn fit_block<B: Block<D>>(&mut self, block: &B);

    /// Make the fitted state decodable and record it (encode side).
    fn commit_block(&mut self);

    /// Restore the state recorded for the next block (decode side).
    fn recover_block(&mut self) -> Result<(), CodecError>;

    fn predict(&self, coord: &D::Coord) -> f64;

    fn estimate_error(&self, coord: &D::Coord, actual: f64) -> f64 {
        (actual - self.predict(coord)).abs()
    }

    fn save(&self, out: &mut Vec<u8>) -> Result<(), CodecError>;

    fn load(&mut self, input: &mut &[u8]) -> Result<(), CodecError>;

    /// Return to the freshly constructed state.
    fn clear(&mut self);
}

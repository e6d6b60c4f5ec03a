//! # polyreg-hpc
//!
//! Polynomial-regression prediction for error-bounded compression of
//! scientific grids.
//!
//! Key types:
//! - [`PolyRegressionPredictor`]: per-block quadratic least-squares fit with
//!   closed-loop delta-coded coefficients
//! - [`CoefAuxTable`]: precomputed per-shape solve matrices, shared read-only
//! - [`LinearQuantizer`]: strict ε-guarantee with escape codes (SZ style)
//! - [`HuffmanCoder`]: canonical Huffman coding of the code streams
//! - [`BlockwiseCompressor`]: regression-only grid compressor built from the above

pub mod coef_aux;
pub mod compressor;
pub mod huffman;
pub mod linear_quantizer;
pub mod regression;

pub use coef_aux::CoefAuxTable;
pub use compressor::{BlockwiseCompressor, CompressionStats, StreamHeader};
pub use huffman::HuffmanCoder;
pub use linear_quantizer::LinearQuantizer;
pub use regression::{PolyRegressionPredictor, POLY_REGRESSION_ID};

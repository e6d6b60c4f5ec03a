//! # polyreg-core
//!
//! Contracts between the polynomial-regression predictor and its collaborators:
//! - [`ScalarQuantizer`]: bounded-error scalar quantization with a serialized form
//! - [`EntropyCoder`]: lossless coding of the integer code stream
//! - [`Block`]: a block's shape and a forward traversal of its points
//! - [`BlockPredictor`]: the per-block lifecycle an outer pipeline drives
//!
//! Also provides [`Grid`] (a dense N-dimensional field cut into [`GridBlock`]s in
//! row-major order), [`RegressionConfig`] / [`ErrorBounds`] and [`CodecError`].

pub mod block;
pub mod config;
pub mod entropy;
pub mod error;
pub mod predictor;
pub mod quantizer;

pub use block::{Block, BlockRegion, Grid, GridBlock};
pub use config::{coef_aux_path, ErrorBounds, RegressionConfig, TermBounds, DEFAULT_RADIUS};
pub use entropy::EntropyCoder;
pub use error::{CodecError, ReadSection};
pub use predictor::BlockPredictor;
pub use quantizer::ScalarQuantizer;

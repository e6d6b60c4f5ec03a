//! # polyreg-math
//!
//! Numeric building blocks of the polynomial-regression predictor:
//! - [`Dimension`] with [`D1`], [`D2`], [`D3`]: the closed set of supported block
//!   dimensionalities and their full quadratic basis
//! - [`shape_index`]: mixed-radix index of a block shape into a coefficient table
//! - [`gram`]: offline normal matrices and their pseudo-inverses, used to
//!   generate coefficient tables
//! - [`Scalar`]: element types (`f32`, `f64`) accepted from a field

pub mod basis;
pub mod gram;
pub mod scalar;
pub mod shape;

use thiserror::Error;

pub use basis::{evaluate, term_count, Dimension, D1, D2, D3};
pub use scalar::Scalar;
pub use shape::{all_shapes, shape_index, MAX_EDGE, SHAPE_RADIX, TABLE_SLOTS};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Edge length {edge} on axis {axis} exceeds the maximum of {}", MAX_EDGE)]
    EdgeOutOfRange { axis: usize, edge: usize },
    #[error("Block shapes have at most 3 axes, got {0}")]
    TooManyAxes(usize),
    #[error("Matrix has {actual} entries, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Eigen decomposition did not converge after {0} sweeps")]
    NoConvergence(usize),
}

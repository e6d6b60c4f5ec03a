use crate::CodecError;
use polyreg_math::Dimension;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default half-width of a quantizer's code range.
pub const DEFAULT_RADIUS: i32 = 32768;

/// How the three coefficient-group error bounds are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ErrorBounds {
    /// Derived from one global bound. Every basis term is scaled down by the
    /// block size so that the accumulated coefficient error over a block stays
    /// inside `error_bound`.
    Global { block_size: usize, error_bound: f64 },
    /// Explicit bound per coefficient group.
    PerTerm {
        constant: f64,
        linear: f64,
        quadratic: f64,
    },
}

/// Resolved error bound of each coefficient group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TermBounds {
    pub constant: f64,
    pub linear: f64,
    pub quadratic: f64,
}

impl ErrorBounds {
    /// Per-group bounds: `eb/5`, `eb/20` and `eb/100`, each over the block
    /// size, for [`ErrorBounds::Global`].
    pub fn resolve(&self) -> TermBounds {
        match *self {
            ErrorBounds::Global {
                block_size,
                error_bound,
            } => {
                let bs = block_size.max(1) as f64;
                TermBounds {
                    constant: error_bound / 5.0 / bs,
                    linear: error_bound / 20.0 / bs,
                    quadratic: error_bound / 100.0 / bs,
                }
            }
            ErrorBounds::PerTerm {
                constant,
                linear,
                quadratic,
            } => TermBounds {
                constant,
                linear,
                quadratic,
            },
        }
    }
}

/// Construction parameters of a regression predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionConfig {
    pub bounds: ErrorBounds,
    /// Directory holding `PolyRegressionCoefAux{N}D.f32`.
    pub coef_aux_dir: PathBuf,
    /// Code radius of the coefficient quantizers.
    pub radius: i32,
}

impl RegressionConfig {
    pub fn new(bounds: ErrorBounds, coef_aux_dir: impl Into<PathBuf>) -> Self {
        Self {
            bounds,
            coef_aux_dir: coef_aux_dir.into(),
            radius: DEFAULT_RADIUS,
        }
    }

    /// Location of the coefficient resource for dimensionality `D`.
    pub fn coef_aux_path<D: Dimension>(&self) -> PathBuf {
        coef_aux_path::<D>(&self.coef_aux_dir)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// `dir/PolyRegressionCoefAux{N}D.f32`
pub fn coef_aux_path<D: Dimension>(dir: &Path) -> PathBuf {
    dir.join(format!("PolyRegressionCoefAux{}D.f32", D::N))
}

//! Block-wise quadratic regression predictor.
//!
//! Each block is fitted with a full quadratic polynomial using the
//! precomputed solve matrix of its shape. The coefficients are delta coded
//! against the previous block's *quantized* coefficients, in three groups with
//! their own error bound: the constant term, the `N` linear terms and the
//! `M-N-1` quadratic terms. After quantization the in-memory coefficients are
//! replaced by their reconstructions, so the encoder predicts with exactly the
//! values the decoder recovers.
//!
//! Serialized layout:
//! ```text
//! [u8 id = 0b0000_0011]
//! [constant quantizer][linear quantizer][quadratic quantizer]
//! [u64 code count]
//! [entropy model][entropy payload]
//! ```

use crate::{CoefAuxTable, HuffmanCoder, LinearQuantizer};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use polyreg_core::{
    Block, BlockPredictor, CodecError, EntropyCoder, ErrorBounds, ReadSection, RegressionConfig,
    ScalarQuantizer, TermBounds,
};
use polyreg_math::{evaluate, Dimension, Scalar};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const POLY_REGRESSION_ID: u8 = 0b0000_0011;

const CONSTANT: usize = 0;
const LINEAR: usize = 1;
const QUADRATIC: usize = 2;

/// Quantizer group of coefficient slot `i`.
#[inline]
fn term_group<D: Dimension>(i: usize) -> usize {
    if i == 0 {
        CONSTANT
    } else if i <= D::N {
        LINEAR
    } else {
        QUADRATIC
    }
}

#[derive(Debug, Clone)]
pub struct PolyRegressionPredictor<D: Dimension, Q = LinearQuantizer, E = HuffmanCoder> {
    table: Arc<CoefAuxTable<D>>,
    /// Constant, linear and quadratic term quantizers.
    quantizers: [Q; 3],
    coeff_codes: Vec<i32>,
    cursor: usize,
    current: D::Coeffs,
    previous: D::Coeffs,
    _entropy: PhantomData<fn() -> E>,
}

impl<D: Dimension, E> PolyRegressionPredictor<D, LinearQuantizer, E> {
    /// Predictor for blocks of edge `block_size` under a global bound.
    pub fn new(table: Arc<CoefAuxTable<D>>, block_size: usize, error_bound: f64) -> Self {
        Self::with_error_bounds(
            table,
            ErrorBounds::Global {
                block_size,
                error_bound,
            },
            polyreg_core::DEFAULT_RADIUS,
        )
    }

    pub fn with_error_bounds(table: Arc<CoefAuxTable<D>>, bounds: ErrorBounds, radius: i32) -> Self {
        let TermBounds {
            constant,
            linear,
            quadratic,
        } = bounds.resolve();
        Self::with_quantizers(
            table,
            [
                LinearQuantizer::with_radius(constant, radius),
                LinearQuantizer::with_radius(linear, radius),
                LinearQuantizer::with_radius(quadratic, radius),
            ],
        )
    }

    /// Load the table named by `config` and build the predictor. Fails if the
    /// resource cannot be read.
    pub fn from_config(config: &RegressionConfig) -> Result<Self, CodecError> {
        let table = CoefAuxTable::load_from_dir(&config.coef_aux_dir)?;
        let predictor = Self::with_error_bounds(Arc::new(table), config.bounds, config.radius);
        info!("{}", predictor);
        Ok(predictor)
    }
}

impl<D: Dimension, Q: ScalarQuantizer, E> PolyRegressionPredictor<D, Q, E> {
    /// Quantizers for the constant, linear and quadratic terms, in that order.
    pub fn with_quantizers(table: Arc<CoefAuxTable<D>>, quantizers: [Q; 3]) -> Self {
        Self {
            table,
            quantizers,
            coeff_codes: Vec::new(),
            cursor: 0,
            current: D::Coeffs::default(),
            previous: D::Coeffs::default(),
            _entropy: PhantomData,
        }
    }

    pub fn table(&self) -> &Arc<CoefAuxTable<D>> {
        &self.table
    }

    /// Current coefficients. After `quantize_block` or `recover_block` these
    /// are the reconstructed values.
    pub fn coefficients(&self) -> &D::Coeffs {
        &self.current
    }

    pub fn previous_coefficients(&self) -> &D::Coeffs {
        &self.previous
    }

    /// Coefficient codes recorded or loaded so far.
    pub fn codes(&self) -> &[i32] {
        &self.coeff_codes
    }

    pub fn code_count(&self) -> usize {
        self.coeff_codes.len()
    }

    pub fn error_bounds(&self) -> TermBounds {
        TermBounds {
            constant: self.quantizers[CONSTANT].error_bound(),
            linear: self.quantizers[LINEAR].error_bound(),
            quadratic: self.quantizers[QUADRATIC].error_bound(),
        }
    }

    /// Least-squares fit of `block` into the current coefficients.
    pub fn fit_block<B: Block<D>>(&mut self, block: &B) {
        let shape = block.shape();
        let mut sum = D::Coeffs::default();
        for (coord, value) in block.points() {
            let value = value.to_f64();
            for (s, b) in sum.as_mut().iter_mut().zip(D::basis(&coord).as_ref()) {
                *s += b * value;
            }
        }

        let matrix = match self.table.lookup(&shape) {
            Some(matrix) => {
                if !self.table.has_record(&shape) {
                    warn!(shape = ?shape, "No coefficient record for block shape, fitting zero");
                }
                matrix
            }
            None => {
                warn!(shape = ?shape, "Block shape exceeds the coefficient table, fitting zero");
                self.current = D::Coeffs::default();
                return;
            }
        };

        let sum = sum.as_ref();
        for (i, c) in self.current.as_mut().iter_mut().enumerate() {
            let row = &matrix[i * D::M..(i + 1) * D::M];
            *c = row.iter().zip(sum).map(|(m, s)| m * s).sum();
        }
    }

    /// Quantize the current coefficients against the previous block's,
    /// record the codes and overwrite the coefficients with their
    /// reconstructions. The result becomes the previous block's state.
    pub fn quantize_block(&mut self) {
        let previous = self.previous;
        for (i, c) in self.current.as_mut().iter_mut().enumerate() {
            let q = &mut self.quantizers[term_group::<D>(i)];
            let code = q.quantize_and_overwrite(c, previous.as_ref()[i]);
            self.coeff_codes.push(code);
        }
        self.previous = self.current;
    }

    /// Reconstruct the next block's coefficients from the code stream.
    ///
    /// Blocks must be recovered in the order they were quantized; the stream
    /// carries no block identity.
    pub fn recover_block(&mut self) -> Result<(), CodecError> {
        let remaining = self.coeff_codes.len() - self.cursor;
        if remaining < D::M {
            return Err(CodecError::StreamExhausted {
                needed: D::M,
                remaining,
            });
        }
        let codes = &self.coeff_codes[self.cursor..self.cursor + D::M];
        let previous = self.previous;
        for (i, (c, &code)) in self.current.as_mut().iter_mut().zip(codes).enumerate() {
            *c = self.quantizers[term_group::<D>(i)].recover(previous.as_ref()[i], code)?;
        }
        self.cursor += D::M;
        self.previous = self.current;
        Ok(())
    }

    /// Value of the current polynomial at a point of the current block.
    pub fn predict(&self, coord: &D::Coord) -> f64 {
        evaluate::<D>(&self.current, coord)
    }

    pub fn estimate_error(&self, coord: &D::Coord, actual: f64) -> f64 {
        (actual - self.predict(coord)).abs()
    }

    pub fn clear(&mut self) {
        for q in self.quantizers.iter_mut() {
            q.clear();
        }
        self.coeff_codes.clear();
        self.cursor = 0;
        self.current = D::Coeffs::default();
        self.previous = D::Coeffs::default();
    }
}

impl<D, Q, E> PolyRegressionPredictor<D, Q, E>
where
    D: Dimension,
    Q: ScalarQuantizer + Clone,
    E: EntropyCoder + Default,
{
    pub fn save(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let start = out.len();
        out.write_u8(POLY_REGRESSION_ID)?;
        for q in &self.quantizers {
            q.save(out);
        }
        out.write_u64::<LittleEndian>(self.coeff_codes.len() as u64)?;

        let max_radius = self.quantizers.iter().map(|q| q.radius()).max().unwrap_or(1);
        let mut coder = E::default();
        coder.preprocess_encode(&self.coeff_codes, 4 * max_radius as usize)?;
        coder.save(out);
        coder.encode(&self.coeff_codes, out)?;
        coder.postprocess_encode();

        debug!(
            dims = D::N,
            codes = self.coeff_codes.len(),
            bytes = out.len() - start,
            "Saved regression predictor"
        );
        Ok(())
    }

    /// Restore from `input`, advancing past the predictor section. The slice
    /// is the remaining budget: a code count it cannot hold is rejected before
    /// anything is decoded. On error the predictor is left unchanged.
    pub fn load(&mut self, input: &mut &[u8]) -> Result<(), CodecError> {
        let id = input.read_u8().section("predictor id")?;
        if id != POLY_REGRESSION_ID {
            return Err(CodecError::UnknownPredictor {
                expected: POLY_REGRESSION_ID,
                found: id,
            });
        }
        let mut quantizers = self.quantizers.clone();
        for q in quantizers.iter_mut() {
            q.load(input)?;
        }

        let declared = input.read_u64::<LittleEndian>().section("code count")?;
        // Every code takes at least one bit.
        let remaining = input.len();
        let count = usize::try_from(declared)
            .ok()
            .filter(|&n| n / 8 <= remaining)
            .ok_or(CodecError::BudgetExceeded {
                declared,
                remaining,
            })?;

        let mut coder = E::default();
        coder.load(input)?;
        let codes = coder.decode(input, count)?;
        coder.postprocess_decode();

        self.quantizers = quantizers;
        self.coeff_codes = codes;
        self.cursor = 0;
        self.current = D::Coeffs::default();
        self.previous = D::Coeffs::default();
        debug!(dims = D::N, codes = count, "Loaded regression predictor");
        Ok(())
    }
}

impl<D: Dimension, Q: ScalarQuantizer, E> fmt::Display for PolyRegressionPredictor<D, Q, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let TermBounds {
            constant,
            linear,
            quadratic,
        } = self.error_bounds();
        write!(
            f,
            "PolyRegressionPredictor<{}D> eb constant {:e}, linear {:e}, quadratic {:e}",
            D::N,
            constant,
            linear,
            quadratic
        )
    }
}

impl<D, Q, E> BlockPredictor<D> for PolyRegressionPredictor<D, Q, E>
where
    D: Dimension,
    Q: ScalarQuantizer + Clone,
    E: EntropyCoder + Default,
{
    const ID: u8 = POLY_REGRESSION_ID;

    fn fit_block<B: Block<D>>(&mut self, block: &B) {
        PolyRegressionPredictor::fit_block(self, block)
    }

    fn commit_block(&mut self) {
        self.quantize_block()
    }

    fn recover_block(&mut self) -> Result<(), CodecError> {
        PolyRegressionPredictor::recover_block(self)
    }

    fn predict(&self, coord: &D::Coord) -> f64 {
        PolyRegressionPredictor::predict(self, coord)
    }

    fn save(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        PolyRegressionPredictor::save(self, out)
    }

    fn load(&mut self, input: &mut &[u8]) -> Result<(), CodecError> {
        PolyRegressionPredictor::load(self, input)
    }

    fn clear(&mut self) {
        PolyRegressionPredictor::clear(self)
    }
}

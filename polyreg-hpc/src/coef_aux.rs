//! Per-shape solve matrices of the regression fit.
//!
//! A resource holds one record per block shape:
//! `[f32 × N shape components][f32 × M·M matrix, row-major]`, little endian,
//! records concatenated. Each matrix is the pseudo-inverse of the basis'
//! normal matrix over the shape's integer grid, so the least-squares
//! coefficients of a block are `matrix · Σ basis(p)·value(p)`.
//!
//! The table is indexed by [`shape_index`] and always reserves
//! [`TABLE_SLOTS`] entries. Shapes without a record resolve to the zero matrix.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use polyreg_core::{coef_aux_path, CodecError, ReadSection};
use polyreg_math::gram::solve_matrix;
use polyreg_math::{all_shapes, shape_index, Dimension, MathError, MAX_EDGE, SHAPE_RADIX, TABLE_SLOTS};
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use tracing::debug;

#[derive(Clone)]
pub struct CoefAuxTable<D: Dimension> {
    /// `TABLE_SLOTS` matrices of `M·M` entries.
    matrices: Vec<f64>,
    present: Vec<bool>,
    _dim: PhantomData<D>,
}

impl<D: Dimension> CoefAuxTable<D> {
    const ENTRIES: usize = D::M * D::M;
    const RECORD_BYTES: usize = (D::N + D::M * D::M) * 4;

    /// A table with no records: every shape fits to zero.
    pub fn empty() -> Self {
        Self {
            matrices: vec![0.0; TABLE_SLOTS * Self::ENTRIES],
            present: vec![false; TABLE_SLOTS],
            _dim: PhantomData,
        }
    }

    /// Decode a resource image.
    pub fn load(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() % Self::RECORD_BYTES != 0 {
            return Err(CodecError::CorruptResource(format!(
                "{} bytes is not a whole number of {}-byte records",
                bytes.len(),
                Self::RECORD_BYTES
            )));
        }
        let mut table = Self::empty();
        let mut input = bytes;
        while !input.is_empty() {
            let mut shape = D::Coord::default();
            for edge in shape.as_mut() {
                let raw = input.read_f32::<LittleEndian>().section("coefficient record")?;
                if raw.fract() != 0.0 || !(1.0..=MAX_EDGE as f32).contains(&raw) {
                    return Err(CodecError::CorruptResource(format!(
                        "shape component {} outside 1..={}",
                        raw, MAX_EDGE
                    )));
                }
                *edge = raw as usize;
            }
            let slot = shape_index(shape.as_ref())?;
            let dst = &mut table.matrices[slot * Self::ENTRIES..(slot + 1) * Self::ENTRIES];
            for v in dst.iter_mut() {
                *v = input.read_f32::<LittleEndian>().section("coefficient record")? as f64;
            }
            table.present[slot] = true;
        }
        debug!(
            dims = D::N,
            records = table.record_count(),
            "Loaded coefficient table"
        );
        Ok(table)
    }

    pub fn load_file(path: &Path) -> Result<Self, CodecError> {
        let bytes = fs::read(path).map_err(|source| CodecError::MissingResource {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "Reading coefficient resource");
        Self::load(&bytes)
    }

    /// Load `dir/PolyRegressionCoefAux{N}D.f32`.
    pub fn load_from_dir(dir: &Path) -> Result<Self, CodecError> {
        Self::load_file(&coef_aux_path::<D>(dir))
    }

    /// Compute the records for every shape with edges in `1..=max_edge`.
    pub fn generate(max_edge: usize) -> Result<Self, MathError> {
        Self::generate_for_shapes(all_shapes::<D>(max_edge))
    }

    pub fn generate_for_shapes(
        shapes: impl IntoIterator<Item = D::Coord>,
    ) -> Result<Self, MathError> {
        let mut table = Self::empty();
        for shape in shapes {
            let slot = shape_index(shape.as_ref())?;
            let matrix = solve_matrix::<D>(&shape)?;
            table.matrices[slot * Self::ENTRIES..(slot + 1) * Self::ENTRIES]
                .copy_from_slice(&matrix);
            table.present[slot] = true;
        }
        Ok(table)
    }

    /// Solve matrix for `shape` (row-major `M×M`), zero if the table has no
    /// record for it. `None` when an edge exceeds [`MAX_EDGE`].
    pub fn lookup(&self, shape: &D::Coord) -> Option<&[f64]> {
        let slot = shape_index(shape.as_ref()).ok()?;
        Some(&self.matrices[slot * Self::ENTRIES..(slot + 1) * Self::ENTRIES])
    }

    pub fn has_record(&self, shape: &D::Coord) -> bool {
        shape_index(shape.as_ref())
            .map(|slot| self.present[slot])
            .unwrap_or(false)
    }

    pub fn record_count(&self) -> usize {
        self.present.iter().filter(|&&p| p).count()
    }

    /// Encode the records in resource format, in shape-index order.
    pub fn write_resource(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.record_count() * Self::RECORD_BYTES);
        for (slot, _) in self.present.iter().enumerate().filter(|&(_, &p)| p) {
            for edge in slot_shape::<D>(slot).as_ref() {
                let _ = out.write_f32::<LittleEndian>(*edge as f32);
            }
            for &v in &self.matrices[slot * Self::ENTRIES..(slot + 1) * Self::ENTRIES] {
                let _ = out.write_f32::<LittleEndian>(v as f32);
            }
        }
        out
    }

    pub fn write_file(&self, path: &Path) -> Result<(), CodecError> {
        fs::write(path, self.write_resource())?;
        debug!(path = %path.display(), records = self.record_count(), "Wrote coefficient resource");
        Ok(())
    }
}

/// Inverse of [`shape_index`] for `D::N` axes.
fn slot_shape<D: Dimension>(mut slot: usize) -> D::Coord {
    let mut shape = D::Coord::default();
    for edge in shape.as_mut().iter_mut().rev() {
        *edge = slot % SHAPE_RADIX;
        slot /= SHAPE_RADIX;
    }
    shape
}

impl<D: Dimension> fmt::Debug for CoefAuxTable<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoefAuxTable")
            .field("dims", &D::N)
            .field("records", &self.record_count())
            .finish()
    }
}

//! Single-predictor block compressor.
//!
//! Every block of a [`Grid`] is predicted by [`PolyRegressionPredictor`] and
//! each point's deviation from the prediction is quantized with a data
//! [`LinearQuantizer`] under the global error bound. There is no predictor
//! selection: regression is used for every block.
//!
//! Container:
//! ```text
//! b"PRGC" [u8 version = 1] [u32 header length] [bincode StreamHeader]
//! [predictor section]
//! [data quantizer]
//! [u64 data code count] [huffman model] [huffman payload]
//! ```

use crate::linear_quantizer::MAX_RADIUS;
use crate::{CoefAuxTable, HuffmanCoder, LinearQuantizer, PolyRegressionPredictor};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use polyreg_core::{Block, CodecError, EntropyCoder, Grid, ReadSection, ScalarQuantizer, DEFAULT_RADIUS};
use polyreg_math::{Dimension, Scalar};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub const MAGIC: &[u8; 4] = b"PRGC";
pub const VERSION: u8 = 1;

/// Field geometry and codec parameters stored ahead of the sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamHeader {
    pub dims: Vec<usize>,
    pub block_size: usize,
    pub error_bound: f64,
    pub radius: i32,
}

/// Sizes of one compression run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionStats {
    pub blocks: usize,
    pub points: usize,
    pub unpredictable: usize,
    pub raw_bytes: usize,
    pub compressed_bytes: usize,
}

impl CompressionStats {
    pub fn ratio(&self) -> f64 {
        self.raw_bytes as f64 / self.compressed_bytes.max(1) as f64
    }
}

#[derive(Debug, Clone)]
pub struct BlockwiseCompressor<D: Dimension> {
    table: Arc<CoefAuxTable<D>>,
    block_size: usize,
    error_bound: f64,
    radius: i32,
}

impl<D: Dimension> BlockwiseCompressor<D> {
    pub fn new(table: Arc<CoefAuxTable<D>>, block_size: usize, error_bound: f64) -> Self {
        Self {
            table,
            block_size,
            error_bound,
            radius: DEFAULT_RADIUS,
        }
    }

    /// Code radius of the data quantizer, clamped to `1..=MAX_RADIUS`.
    pub fn with_radius(mut self, radius: i32) -> Self {
        self.radius = radius.clamp(1, MAX_RADIUS);
        self
    }

    pub fn compress<T: Scalar>(&self, grid: &Grid<T, D>) -> Result<Vec<u8>, CodecError> {
        self.compress_with_stats(grid).map(|(bytes, _)| bytes)
    }

    pub fn compress_with_stats<T: Scalar>(
        &self,
        grid: &Grid<T, D>,
    ) -> Result<(Vec<u8>, CompressionStats), CodecError> {
        let mut predictor: PolyRegressionPredictor<D> =
            PolyRegressionPredictor::new(self.table.clone(), self.block_size, self.error_bound);
        let mut quantizer = LinearQuantizer::with_radius(self.error_bound, self.radius);
        let mut codes = Vec::with_capacity(grid.len());
        let mut blocks = 0;

        for block in grid.blocks(self.block_size)? {
            predictor.fit_block(&block);
            predictor.quantize_block();
            for (coord, value) in block.points() {
                let pred = predictor.predict(&coord);
                codes.push(quantizer.quantize_scalar(value, pred));
            }
            blocks += 1;
        }

        let header = StreamHeader {
            dims: grid.dims().as_ref().to_vec(),
            block_size: self.block_size,
            error_bound: self.error_bound,
            radius: self.radius,
        };
        let header_bytes = bincode::serialize(&header)?;

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.write_u8(VERSION)?;
        out.write_u32::<LittleEndian>(header_bytes.len() as u32)?;
        out.extend_from_slice(&header_bytes);

        predictor.save(&mut out)?;
        let predictor_end = out.len();
        quantizer.save(&mut out);

        out.write_u64::<LittleEndian>(codes.len() as u64)?;
        let mut coder = HuffmanCoder::new();
        coder.preprocess_encode(&codes, 2 * self.radius as usize)?;
        coder.save(&mut out);
        coder.encode(&codes, &mut out)?;
        coder.postprocess_encode();

        let stats = CompressionStats {
            blocks,
            points: grid.len(),
            unpredictable: quantizer.unpredictable_count(),
            raw_bytes: grid.len() * T::BYTES,
            compressed_bytes: out.len(),
        };
        debug!(
            predictor_bytes = predictor_end,
            data_bytes = out.len() - predictor_end,
            "Compressed sections"
        );
        info!(
            dims = ?header.dims,
            blocks,
            unpredictable = stats.unpredictable,
            ratio = stats.ratio(),
            "Compressed grid"
        );
        Ok((out, stats))
    }

    /// Rebuild the grid. Blocks are replayed in the order they were written.
    pub fn decompress<T: Scalar>(&self, bytes: &[u8]) -> Result<Grid<T, D>, CodecError> {
        let mut input = bytes;
        let header = read_header(&mut input)?;
        if header.dims.len() != D::N {
            return Err(CodecError::CorruptStream(format!(
                "stream holds a {}-dimensional field, expected {}",
                header.dims.len(),
                D::N
            )));
        }
        let mut dims = D::Coord::default();
        dims.as_mut().copy_from_slice(&header.dims);

        let mut predictor: PolyRegressionPredictor<D> =
            PolyRegressionPredictor::new(self.table.clone(), header.block_size, header.error_bound);
        predictor.load(&mut input)?;

        let mut quantizer = LinearQuantizer::new(header.error_bound);
        quantizer.load(&mut input)?;

        let count = input.read_u64::<LittleEndian>().section("data code count")?;
        let expected = dims
            .as_ref()
            .iter()
            .try_fold(1usize, |n, &d| n.checked_mul(d))
            .ok_or_else(|| {
                CodecError::CorruptStream(format!("field of {:?} points overflows", header.dims))
            })?;
        if count != expected as u64 {
            return Err(CodecError::ShapeMismatch {
                expected,
                actual: count as usize,
            });
        }
        let mut coder = HuffmanCoder::new();
        coder.load(&mut input)?;
        let codes = coder.decode(&mut input, expected)?;
        coder.postprocess_decode();

        let mut grid = Grid::<T, D>::zeros(dims);
        let regions = grid.regions(header.block_size)?;
        let mut next = codes.iter();
        for region in regions {
            predictor.recover_block()?;
            for local in region.coords() {
                let code = *next.next().ok_or(CodecError::Truncated("data codes"))?;
                let value = quantizer.recover(predictor.predict(&local), code)?;
                grid.data_mut()[region.flat_index(&local)] = T::from_f64(value);
            }
        }
        debug!(dims = ?header.dims, trailing = input.len(), "Decompressed grid");
        Ok(grid)
    }
}

/// Parse the magic, version and [`StreamHeader`], advancing past them.
pub fn read_header(input: &mut &[u8]) -> Result<StreamHeader, CodecError> {
    let mut magic = [0u8; 4];
    std::io::Read::read_exact(input, &mut magic).section("magic")?;
    if &magic != MAGIC {
        return Err(CodecError::CorruptStream(format!("bad magic {:?}", magic)));
    }
    let version = input.read_u8().section("version")?;
    if version != VERSION {
        return Err(CodecError::CorruptStream(format!("unsupported version {}", version)));
    }
    let len = input.read_u32::<LittleEndian>().section("header")? as usize;
    if len > input.len() {
        return Err(CodecError::Truncated("header"));
    }
    let (head, rest) = input.split_at(len);
    let header = bincode::deserialize(head)?;
    *input = rest;
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyreg_math::{D1, D2, D3};

    fn max_error<D: Dimension>(a: &Grid<f64, D>, b: &Grid<f64, D>) -> f64 {
        a.data()
            .iter()
            .zip(b.data())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_roundtrip_2d_within_bound() {
        let table = Arc::new(CoefAuxTable::<D2>::generate(6).unwrap());
        let dims = [20, 13];
        let data: Vec<f64> = (0..260)
            .map(|i| {
                let (x, y) = ((i / 13) as f64 * 0.2, (i % 13) as f64 * 0.3);
                x.sin() * y.cos() + 0.1 * x * y
            })
            .collect();
        let grid = Grid::<f64, D2>::from_vec(dims, data).unwrap();

        let eb = 1e-3;
        let c = BlockwiseCompressor::new(table, 6, eb);
        let (bytes, stats) = c.compress_with_stats(&grid).unwrap();
        assert_eq!(stats.blocks, 4 * 3);
        assert_eq!(stats.points, 260);

        let restored: Grid<f64, D2> = c.decompress(&bytes).unwrap();
        assert_eq!(restored.dims(), dims);
        assert!(max_error(&grid, &restored) <= eb);
    }

    #[test]
    fn test_smooth_field_compresses() {
        let table = Arc::new(CoefAuxTable::<D3>::generate(4).unwrap());
        let dims = [16, 16, 16];
        let data: Vec<f64> = (0..4096)
            .map(|i| {
                let (x, y, z) = ((i / 256) as f64, ((i / 16) % 16) as f64, (i % 16) as f64);
                0.01 * x * x - 0.02 * y * z + 0.5 * z
            })
            .collect();
        let grid = Grid::<f64, D3>::from_vec(dims, data).unwrap();
        let c = BlockwiseCompressor::new(table, 4, 1e-2);
        let (bytes, stats) = c.compress_with_stats(&grid).unwrap();
        assert!(stats.ratio() > 4.0, "ratio {}", stats.ratio());

        let restored: Grid<f64, D3> = c.decompress(&bytes).unwrap();
        assert!(max_error(&grid, &restored) <= 1e-2);
    }

    #[test]
    fn test_f32_field() {
        let table = Arc::new(CoefAuxTable::<D1>::generate(8).unwrap());
        let data: Vec<f32> = (0..100).map(|i| (i as f32 * 0.1).sin() * 10.0).collect();
        let grid = Grid::<f32, D1>::from_vec([100], data.clone()).unwrap();
        let c = BlockwiseCompressor::new(table, 8, 1e-2);
        let restored: Grid<f32, D1> = c.decompress(&c.compress(&grid).unwrap()).unwrap();
        for (a, b) in data.iter().zip(restored.data()) {
            assert!((a - b).abs() <= 1e-2);
        }
    }

    #[test]
    fn test_rejects_foreign_streams() {
        let table = Arc::new(CoefAuxTable::<D2>::generate(2).unwrap());
        let grid = Grid::<f64, D2>::from_vec([2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let c = BlockwiseCompressor::new(table, 2, 1e-3);
        let bytes = c.compress(&grid).unwrap();

        let c3 = BlockwiseCompressor::new(Arc::new(CoefAuxTable::<D3>::empty()), 2, 1e-3);
        assert!(matches!(
            c3.decompress::<f64>(&bytes),
            Err(CodecError::CorruptStream(_))
        ));

        let mut bad = bytes.clone();
        bad[0] = b'X';
        assert!(c.decompress::<f64>(&bad).is_err());
        assert!(c.decompress::<f64>(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn test_f32_bound_below_ulp() {
        // Near 1000 an f32 ulp is 6.1e-5, coarser than the bound.
        let eb = 5e-5;
        let table = Arc::new(CoefAuxTable::<D1>::generate(8).unwrap());
        let data: Vec<f32> = (0..200).map(|i| 1000.0 + 3.0 * (0.37 * i as f32).sin()).collect();
        let grid = Grid::<f32, D1>::from_vec([200], data.clone()).unwrap();
        let c = BlockwiseCompressor::new(table, 8, eb);
        let restored: Grid<f32, D1> = c.decompress(&c.compress(&grid).unwrap()).unwrap();
        for (a, b) in data.iter().zip(restored.data()) {
            assert!((*a as f64 - *b as f64).abs() <= eb, "{} -> {}", a, b);
        }
    }

    #[test]
    fn test_rejects_overflowing_dims() {
        let table = Arc::new(CoefAuxTable::<D2>::generate(2).unwrap());
        let grid = Grid::<f64, D2>::from_vec([2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let c = BlockwiseCompressor::new(table, 2, 1e-3);
        let bytes = c.compress(&grid).unwrap();

        let mut rest = bytes.as_slice();
        let mut header = read_header(&mut rest).unwrap();
        header.dims = vec![usize::MAX, 3];
        let header_bytes = bincode::serialize(&header).unwrap();
        let mut forged = MAGIC.to_vec();
        forged.push(VERSION);
        forged.write_u32::<LittleEndian>(header_bytes.len() as u32).unwrap();
        forged.extend_from_slice(&header_bytes);
        forged.extend_from_slice(rest);

        assert!(matches!(
            c.decompress::<f64>(&forged),
            Err(CodecError::CorruptStream(_))
        ));
    }

    #[test]
    fn test_radius_is_clamped() {
        let table = Arc::new(CoefAuxTable::<D1>::generate(4).unwrap());
        let grid = Grid::<f64, D1>::from_vec([6], vec![0.0, 1.0, 2.0, 3.0, 50.0, 5.0]).unwrap();
        for radius in [-7, 0, i32::MAX] {
            let c = BlockwiseCompressor::new(table.clone(), 4, 1e-3).with_radius(radius);
            let bytes = c.compress(&grid).unwrap();
            let header = read_header(&mut bytes.as_slice()).unwrap();
            assert!((1..=MAX_RADIUS).contains(&header.radius));
            let restored: Grid<f64, D1> = c.decompress(&bytes).unwrap();
            for (a, b) in grid.data().iter().zip(restored.data()) {
                assert!((a - b).abs() <= 1e-3);
            }
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let table = Arc::new(CoefAuxTable::<D1>::generate(4).unwrap());
        let grid = Grid::<f64, D1>::from_vec([10], vec![0.5; 10]).unwrap();
        let bytes = BlockwiseCompressor::new(table, 4, 1e-4)
            .with_radius(128)
            .compress(&grid)
            .unwrap();
        let header = read_header(&mut bytes.as_slice()).unwrap();
        assert_eq!(
            header,
            StreamHeader {
                dims: vec![10],
                block_size: 4,
                error_bound: 1e-4,
                radius: 128,
            }
        );
    }
}

//! Dense N-dimensional fields and their decomposition into blocks.
//!
//! Storage is row-major with the last axis varying fastest. Blocks are cut at
//! multiples of the block size and visited in the same row-major order over
//! block origins; blocks on the upper faces are truncated to the field.

use crate::CodecError;
use polyreg_math::{Dimension, Scalar, MAX_EDGE};

/// A block as seen by a predictor: its edge lengths and its points.
pub trait Block<D: Dimension> {
    type Value: Scalar;
    type Points<'a>: Iterator<Item = (D::Coord, Self::Value)>
    where
        Self: 'a;

    fn shape(&self) -> D::Coord;

    /// Every point with its coordinate relative to the block origin, in
    /// forward (row-major) order.
    fn points(&self) -> Self::Points<'_>;
}

/// Row-major odometer over `[0, shape_0) × … × [0, shape_{N-1})`.
#[derive(Debug, Clone)]
pub struct LocalCoords<D: Dimension> {
    shape: D::Coord,
    next: Option<D::Coord>,
}

impl<D: Dimension> LocalCoords<D> {
    pub fn new(shape: D::Coord) -> Self {
        let empty = shape.as_ref().iter().any(|&e| e == 0);
        Self {
            shape,
            next: if empty { None } else { Some(D::Coord::default()) },
        }
    }
}

impl<D: Dimension> Iterator for LocalCoords<D> {
    type Item = D::Coord;

    fn next(&mut self) -> Option<D::Coord> {
        let current = self.next?;
        let mut succ = current;
        let mut axis = D::N;
        self.next = loop {
            if axis == 0 {
                break None;
            }
            axis -= 1;
            let c = succ.as_mut();
            c[axis] += 1;
            if c[axis] < self.shape.as_ref()[axis] {
                break Some(succ);
            }
            c[axis] = 0;
        };
        Some(current)
    }
}

/// Position and extent of one block inside a [`Grid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRegion<D: Dimension> {
    origin: D::Coord,
    shape: D::Coord,
    strides: D::Coord,
}

impl<D: Dimension> BlockRegion<D> {
    pub fn origin(&self) -> D::Coord {
        self.origin
    }

    pub fn shape(&self) -> D::Coord {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.shape.as_ref().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Local coordinates of the block, in forward order.
    pub fn coords(&self) -> LocalCoords<D> {
        LocalCoords::new(self.shape)
    }

    /// Offset into the grid's storage of the point at `local`.
    #[inline]
    pub fn flat_index(&self, local: &D::Coord) -> usize {
        self.origin
            .as_ref()
            .iter()
            .zip(local.as_ref())
            .zip(self.strides.as_ref())
            .map(|((o, l), s)| (o + l) * s)
            .sum()
    }
}

/// Block regions of a grid in row-major order of their origins.
#[derive(Debug, Clone)]
pub struct Regions<D: Dimension> {
    blocks: LocalCoords<D>,
    block_size: usize,
    dims: D::Coord,
    strides: D::Coord,
}

impl<D: Dimension> Iterator for Regions<D> {
    type Item = BlockRegion<D>;

    fn next(&mut self) -> Option<BlockRegion<D>> {
        let block = self.blocks.next()?;
        let mut origin = D::Coord::default();
        let mut shape = D::Coord::default();
        for axis in 0..D::N {
            let o = block.as_ref()[axis] * self.block_size;
            origin.as_mut()[axis] = o;
            shape.as_mut()[axis] = self.block_size.min(self.dims.as_ref()[axis] - o);
        }
        Some(BlockRegion {
            origin,
            shape,
            strides: self.strides,
        })
    }
}

/// A dense field of `T` over a `D`-dimensional box.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T, D: Dimension> {
    dims: D::Coord,
    strides: D::Coord,
    data: Vec<T>,
}

impl<T: Scalar, D: Dimension> Grid<T, D> {
    pub fn from_vec(dims: D::Coord, data: Vec<T>) -> Result<Self, CodecError> {
        let expected: usize = dims.as_ref().iter().product();
        if expected != data.len() {
            return Err(CodecError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            dims,
            strides: strides_of::<D>(&dims),
            data,
        })
    }

    pub fn zeros(dims: D::Coord) -> Self {
        let len = dims.as_ref().iter().product();
        Self {
            dims,
            strides: strides_of::<D>(&dims),
            data: vec![T::default(); len],
        }
    }

    pub fn dims(&self) -> D::Coord {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn get(&self, coord: &D::Coord) -> Option<T> {
        let mut offset = 0;
        for ((&c, &d), &s) in coord
            .as_ref()
            .iter()
            .zip(self.dims.as_ref())
            .zip(self.strides.as_ref())
        {
            if c >= d {
                return None;
            }
            offset += c * s;
        }
        self.data.get(offset).copied()
    }

    /// Regions of `block_size`-edged blocks covering the grid.
    pub fn regions(&self, block_size: usize) -> Result<Regions<D>, CodecError> {
        if block_size == 0 || block_size > MAX_EDGE {
            return Err(CodecError::BlockSize {
                block_size,
                max: MAX_EDGE,
            });
        }
        let mut counts = D::Coord::default();
        for (c, &d) in counts.as_mut().iter_mut().zip(self.dims.as_ref()) {
            *c = d.div_ceil(block_size);
        }
        Ok(Regions {
            blocks: LocalCoords::new(counts),
            block_size,
            dims: self.dims,
            strides: self.strides,
        })
    }

    /// Blocks of the grid, borrowing its data.
    pub fn blocks(
        &self,
        block_size: usize,
    ) -> Result<impl Iterator<Item = GridBlock<'_, T, D>> + '_, CodecError> {
        let data = self.data.as_slice();
        Ok(self
            .regions(block_size)?
            .map(move |region| GridBlock { region, data }))
    }
}

fn strides_of<D: Dimension>(dims: &D::Coord) -> D::Coord {
    let mut strides = D::Coord::default();
    let mut stride = 1;
    for axis in (0..D::N).rev() {
        strides.as_mut()[axis] = stride;
        stride *= dims.as_ref()[axis];
    }
    strides
}

/// A block borrowed from a [`Grid`].
#[derive(Debug, Clone, Copy)]
pub struct GridBlock<'a, T, D: Dimension> {
    region: BlockRegion<D>,
    data: &'a [T],
}

impl<'a, T: Scalar, D: Dimension> GridBlock<'a, T, D> {
    pub fn region(&self) -> &BlockRegion<D> {
        &self.region
    }
}

impl<'a, T: Scalar, D: Dimension> Block<D> for GridBlock<'a, T, D> {
    type Value = T;
    type Points<'b> = GridPoints<'b, T, D> where Self: 'b;

    fn shape(&self) -> D::Coord {
        self.region.shape
    }

    fn points(&self) -> Self::Points<'_> {
        GridPoints {
            coords: self.region.coords(),
            region: self.region,
            data: self.data,
        }
    }
}

/// Points of a [`GridBlock`].
#[derive(Debug, Clone)]
pub struct GridPoints<'a, T, D: Dimension> {
    coords: LocalCoords<D>,
    region: BlockRegion<D>,
    data: &'a [T],
}

impl<'a, T: Scalar, D: Dimension> Iterator for GridPoints<'a, T, D> {
    type Item = (D::Coord, T);

    fn next(&mut self) -> Option<(D::Coord, T)> {
        let local = self.coords.next()?;
        Some((local, self.data[self.region.flat_index(&local)]))
    }
}

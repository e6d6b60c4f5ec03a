//! Full quadratic polynomial basis in one, two and three variables.
//!
//! The dimensionality of a block is a type parameter drawn from the closed
//! set [`D1`], [`D2`], [`D3`]. The trait is sealed, so a predictor for any other
//! dimensionality cannot be named, let alone instantiated.

use core::fmt;

mod sealed {
    pub trait Sealed {}
}

/// Number of basis terms of a full quadratic polynomial in `n` variables.
pub const fn term_count(n: usize) -> usize {
    (n + 1) * (n + 2) / 2
}

/// A supported block dimensionality together with its quadratic basis.
pub trait Dimension:
    sealed::Sealed + Copy + Clone + Default + fmt::Debug + Send + Sync + 'static
{
    /// Number of axes.
    const N: usize;
    /// Number of basis terms, `(N+1)(N+2)/2`.
    const M: usize;
    /// Per-axis exponents of every basis term, in basis order. Axes beyond `N`
    /// are always zero.
    const MONOMIALS: &'static [[u32; 3]];

    /// Integer coordinates of a point relative to its block origin
    /// (or the edge lengths of a block).
    type Coord: Copy
        + Default
        + fmt::Debug
        + PartialEq
        + Eq
        + Send
        + Sync
        + AsRef<[usize]>
        + AsMut<[usize]>;

    /// One coefficient per basis term.
    type Coeffs: Copy + Default + fmt::Debug + PartialEq + Send + Sync + AsRef<[f64]> + AsMut<[f64]>;

    /// Basis vector of the point at `coord`.
    fn basis(coord: &Self::Coord) -> Self::Coeffs;
}

/// One-dimensional blocks: `[1, x, x²]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct D1;

/// Two-dimensional blocks: `[1, x, y, x², xy, y²]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct D2;

/// Three-dimensional blocks: `[1, x, y, z, x², xy, xz, y², yz, z²]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct D3;

impl sealed::Sealed for D1 {}
impl sealed::Sealed for D2 {}
impl sealed::Sealed for D3 {}

impl Dimension for D1 {
    const N: usize = 1;
    const M: usize = 3;
    const MONOMIALS: &'static [[u32; 3]] = &[[0, 0, 0], [1, 0, 0], [2, 0, 0]];

    type Coord = [usize; 1];
    type Coeffs = [f64; 3];

    #[inline]
    fn basis(coord: &[usize; 1]) -> [f64; 3] {
        let x = coord[0] as f64;
        [1.0, x, x * x]
    }
}

impl Dimension for D2 {
    const N: usize = 2;
    const M: usize = 6;
    const MONOMIALS: &'static [[u32; 3]] = &[
        [0, 0, 0],
        [1, 0, 0],
        [0, 1, 0],
        [2, 0, 0],
        [1, 1, 0],
        [0, 2, 0],
    ];

    type Coord = [usize; 2];
    type Coeffs = [f64; 6];

    #[inline]
    fn basis(coord: &[usize; 2]) -> [f64; 6] {
        let x = coord[0] as f64;
        let y = coord[1] as f64;
        [1.0, x, y, x * x, x * y, y * y]
    }
}

impl Dimension for D3 {
    const N: usize = 3;
    const M: usize = 10;
    const MONOMIALS: &'static [[u32; 3]] = &[
        [0, 0, 0],
        [1, 0, 0],
        [0, 1, 0],
        [0, 0, 1],
        [2, 0, 0],
        [1, 1, 0],
        [1, 0, 1],
        [0, 2, 0],
        [0, 1, 1],
        [0, 0, 2],
    ];

    type Coord = [usize; 3];
    type Coeffs = [f64; 10];

    #[inline]
    fn basis(coord: &[usize; 3]) -> [f64; 10] {
        let x = coord[0] as f64;
        let y = coord[1] as f64;
        let z = coord[2] as f64;
        [1.0, x, y, z, x * x, x * y, x * z, y * y, y * z, z * z]
    }
}

/// Value of the polynomial with `coeffs` at `coord`.
#[inline]
pub fn evaluate<D: Dimension>(coeffs: &D::Coeffs, coord: &D::Coord) -> f64 {
    D::basis(coord)
        .as_ref()
        .iter()
        .zip(coeffs.as_ref())
        .map(|(b, c)| b * c)
        .sum()
}

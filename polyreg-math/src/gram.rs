//! Offline construction of per-shape solve matrices.
//!
//! For a block shape the least-squares coefficients of the quadratic basis are
//! `G⁺ · Σ_p basis(p)·value(p)`, where `G = XᵗX` is the normal matrix of the
//! basis over the block's integer grid. `G` only depends on the shape, so it is
//! built analytically from per-axis power sums and pseudo-inverted once, ahead of
//! time. Nothing in here runs while blocks are being compressed.

use crate::basis::Dimension;
use crate::MathError;

const MAX_SWEEPS: usize = 64;

/// Off-diagonal mass, relative to the squared Frobenius norm, at which the
/// rotation sweeps stop.
const OFF_DIAGONAL_TOLERANCE: f64 = 1e-26;

/// Eigenvalues below this fraction of the largest one are treated as zero.
const RANK_TOLERANCE: f64 = 1e-10;

/// `Σ_{x=0}^{edge-1} x^k` for `k = 0..=4`.
fn power_sums(edge: usize) -> [f64; 5] {
    let mut sums = [0.0; 5];
    for x in 0..edge {
        let x = x as f64;
        let mut p = 1.0;
        for s in sums.iter_mut() {
            *s += p;
            p *= x;
        }
    }
    sums
}

/// Normal matrix `XᵗX` (row-major, `M×M`) of the basis over the grid
/// `[0, edge_0) × … × [0, edge_{N-1})`.
pub fn normal_matrix<D: Dimension>(shape: &D::Coord) -> Vec<f64> {
    let sums: Vec<[f64; 5]> = shape.as_ref().iter().map(|&e| power_sums(e)).collect();
    let m = D::M;
    let mut g = vec![0.0; m * m];
    for (i, ei) in D::MONOMIALS.iter().enumerate() {
        for (j, ej) in D::MONOMIALS.iter().enumerate() {
            g[i * m + j] = sums
                .iter()
                .enumerate()
                .map(|(axis, s)| s[(ei[axis] + ej[axis]) as usize])
                .product();
        }
    }
    g
}

/// Moore–Penrose style pseudo-inverse of a symmetric positive semi-definite
/// `m×m` matrix.
///
/// The matrix is first scaled to unit diagonal, decomposed with cyclic Jacobi
/// rotations, and eigenvalues under [`RANK_TOLERANCE`] (relative) are dropped.
/// For a rank-deficient normal matrix the result still maps `Xᵗv` to a
/// least-squares solution.
pub fn pseudo_inverse(matrix: &[f64], m: usize) -> Result<Vec<f64>, MathError> {
    if matrix.len() != m * m {
        return Err(MathError::DimensionMismatch {
            expected: m * m,
            actual: matrix.len(),
        });
    }

    let scale: Vec<f64> = (0..m)
        .map(|i| {
            let d = matrix[i * m + i];
            if d > 0.0 {
                1.0 / d.sqrt()
            } else {
                0.0
            }
        })
        .collect();

    let mut a: Vec<f64> = (0..m * m)
        .map(|k| matrix[k] * scale[k / m] * scale[k % m])
        .collect();
    let mut v = vec![0.0; m * m];
    for i in 0..m {
        v[i * m + i] = 1.0;
    }

    jacobi_eigen(&mut a, &mut v, m)?;

    let lambda_max = (0..m).map(|i| a[i * m + i].abs()).fold(0.0, f64::max);
    let cutoff = lambda_max * RANK_TOLERANCE;

    let mut out = vec![0.0; m * m];
    for k in 0..m {
        let lambda = a[k * m + k];
        if lambda <= cutoff {
            continue;
        }
        let inv = 1.0 / lambda;
        for i in 0..m {
            let vik = v[i * m + k] * inv;
            for j in 0..m {
                out[i * m + j] += vik * v[j * m + k];
            }
        }
    }

    for i in 0..m {
        for j in 0..m {
            out[i * m + j] *= scale[i] * scale[j];
        }
    }
    Ok(out)
}

/// In-place cyclic Jacobi: on return `a` is diagonal (eigenvalues) and the
/// columns of `v` are the matching eigenvectors.
fn jacobi_eigen(a: &mut [f64], v: &mut [f64], m: usize) -> Result<(), MathError> {
    let frob_sq: f64 = a.iter().map(|x| x * x).sum();
    let target = frob_sq * OFF_DIAGONAL_TOLERANCE;

    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..m {
            for q in (p + 1)..m {
                off += a[p * m + q] * a[p * m + q];
            }
        }
        if off <= target {
            return Ok(());
        }

        for p in 0..m {
            for q in (p + 1)..m {
                let apq = a[p * m + q];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[q * m + q] - a[p * m + p]) / (2.0 * apq);
                let t = if theta == 0.0 {
                    1.0
                } else {
                    theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt())
                };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..m {
                    let akp = a[k * m + p];
                    let akq = a[k * m + q];
                    a[k * m + p] = c * akp - s * akq;
                    a[k * m + q] = s * akp + c * akq;
                }
                for k in 0..m {
                    let apk = a[p * m + k];
                    let aqk = a[q * m + k];
                    a[p * m + k] = c * apk - s * aqk;
                    a[q * m + k] = s * apk + c * aqk;
                }
                for k in 0..m {
                    let vkp = v[k * m + p];
                    let vkq = v[k * m + q];
                    v[k * m + p] = c * vkp - s * vkq;
                    v[k * m + q] = s * vkp + c * vkq;
                }
            }
        }
    }
    Err(MathError::NoConvergence(MAX_SWEEPS))
}

/// Solve matrix for one block shape: the pseudo-inverse of its normal matrix.
pub fn solve_matrix<D: Dimension>(shape: &D::Coord) -> Result<Vec<f64>, MathError> {
    pseudo_inverse(&normal_matrix::<D>(shape), D::M)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{D1, D2, D3};

    fn mat_mul(a: &[f64], b: &[f64], m: usize) -> Vec<f64> {
        let mut out = vec![0.0; m * m];
        for i in 0..m {
            for k in 0..m {
                for j in 0..m {
                    out[i * m + j] += a[i * m + k] * b[k * m + j];
                }
            }
        }
        out
    }

    #[test]
    fn test_normal_matrix_1d() {
        // x = 0..5: Σ1=5, Σx=10, Σx²=30, Σx³=100, Σx⁴=354
        let g = normal_matrix::<D1>(&[5]);
        assert_eq!(g, vec![5.0, 10.0, 30.0, 10.0, 30.0, 100.0, 30.0, 100.0, 354.0]);
    }

    #[test]
    fn test_normal_matrix_matches_brute_force_3d() {
        let shape = [3, 4, 2];
        let g = normal_matrix::<D3>(&shape);
        let mut brute = vec![0.0; 100];
        for x in 0..3 {
            for y in 0..4 {
                for z in 0..2 {
                    let b = D3::basis(&[x, y, z]);
                    for i in 0..10 {
                        for j in 0..10 {
                            brute[i * 10 + j] += b[i] * b[j];
                        }
                    }
                }
            }
        }
        assert_eq!(g, brute);
    }

    #[test]
    fn test_inverse_of_full_rank() {
        let g = normal_matrix::<D2>(&[6, 5]);
        let inv = pseudo_inverse(&g, 6).unwrap();
        let id = mat_mul(&g, &inv, 6);
        for i in 0..6 {
            for j in 0..6 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (id[i * 6 + j] - expected).abs() < 1e-8,
                    "G·G⁻¹ [{}][{}] = {}",
                    i,
                    j,
                    id[i * 6 + j]
                );
            }
        }
    }

    #[test]
    fn test_pseudo_inverse_rank_deficient() {
        // Two points: x² and x coincide on {0, 1}, so G has rank 2.
        let g = normal_matrix::<D1>(&[2]);
        let p = pseudo_inverse(&g, 3).unwrap();
        // G·G⁺·G = G
        let gpg = mat_mul(&mat_mul(&g, &p, 3), &g, 3);
        for k in 0..9 {
            assert!((gpg[k] - g[k]).abs() < 1e-9, "entry {}: {} vs {}", k, gpg[k], g[k]);
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        assert!(matches!(
            pseudo_inverse(&[1.0, 2.0], 3),
            Err(MathError::DimensionMismatch { expected: 9, actual: 2 })
        ));
    }
}

use crate::basis::Dimension;
use crate::MathError;

/// Largest supported block edge length on any axis.
pub const MAX_EDGE: usize = 17;

/// Radix of the shape index. One more than [`MAX_EDGE`] so that every
/// component in `0..=MAX_EDGE` gets its own digit.
pub const SHAPE_RADIX: usize = MAX_EDGE + 1;

/// Number of slots reserved for a coefficient table. Sized for three axes
/// whatever the dimensionality of the table.
pub const TABLE_SLOTS: usize = SHAPE_RADIX * SHAPE_RADIX * SHAPE_RADIX;

/// Mixed-radix index of a block shape, folded left to right.
///
/// Injective over all shapes of a fixed length with components in
/// `0..=MAX_EDGE`, and always below [`TABLE_SLOTS`] for up to three axes.
pub fn shape_index(shape: &[usize]) -> Result<usize, MathError> {
    if shape.len() > 3 {
        return Err(MathError::TooManyAxes(shape.len()));
    }
    shape.iter().enumerate().try_fold(0usize, |index, (axis, &edge)| {
        if edge > MAX_EDGE {
            Err(MathError::EdgeOutOfRange { axis, edge })
        } else {
            Ok(index * SHAPE_RADIX + edge)
        }
    })
}

/// Every block shape of dimensionality `D` with edges in `1..=max_edge`,
/// last axis varying fastest.
pub fn all_shapes<D: Dimension>(max_edge: usize) -> Vec<D::Coord> {
    let max_edge = max_edge.min(MAX_EDGE);
    let mut out = Vec::new();
    if max_edge == 0 {
        return out;
    }
    let mut shape = D::Coord::default();
    shape.as_mut().iter_mut().for_each(|e| *e = 1);
    loop {
        out.push(shape);
        // Odometer increment.
        let mut axis = D::N;
        loop {
            if axis == 0 {
                return out;
            }
            axis -= 1;
            let edges = shape.as_mut();
            if edges[axis] < max_edge {
                edges[axis] += 1;
                break;
            }
            edges[axis] = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{D1, D2, D3};
    use std::collections::HashSet;

    #[test]
    fn test_index_examples() {
        assert_eq!(shape_index(&[]).unwrap(), 0);
        assert_eq!(shape_index(&[5]).unwrap(), 5);
        assert_eq!(shape_index(&[1, 0]).unwrap(), SHAPE_RADIX);
        assert_eq!(shape_index(&[0, 17]).unwrap(), 17);
        assert_eq!(
            shape_index(&[17, 17, 17]).unwrap(),
            TABLE_SLOTS - 1
        );
    }

    #[test]
    fn test_index_rejects_large_edges() {
        assert!(matches!(
            shape_index(&[4, 18]),
            Err(MathError::EdgeOutOfRange { axis: 1, edge: 18 })
        ));
        assert!(matches!(shape_index(&[1, 1, 1, 1]), Err(MathError::TooManyAxes(4))));
    }

    #[test]
    fn test_index_injective_3d() {
        let mut seen = HashSet::new();
        for a in 0..=MAX_EDGE {
            for b in 0..=MAX_EDGE {
                for c in 0..=MAX_EDGE {
                    let idx = shape_index(&[a, b, c]).unwrap();
                    assert!(idx < TABLE_SLOTS);
                    assert!(seen.insert(idx), "collision at {:?}", (a, b, c));
                }
            }
        }
        assert_eq!(seen.len(), TABLE_SLOTS);
    }

    #[test]
    fn test_all_shapes_counts() {
        assert_eq!(all_shapes::<D1>(17).len(), 17);
        assert_eq!(all_shapes::<D2>(4).len(), 16);
        let shapes = all_shapes::<D3>(3);
        assert_eq!(shapes.len(), 27);
        assert_eq!(shapes[0], [1, 1, 1]);
        assert_eq!(shapes[1], [1, 1, 2]);
        assert_eq!(shapes[26], [3, 3, 3]);
        assert!(all_shapes::<D2>(0).is_empty());
    }
}

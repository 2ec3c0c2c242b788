//! Small fixed-size vectors and matrices, dispatched through bulk functions.
//!
//! Vectors are sequences of 2 or 3 numbers. Matrices are row-major flat
//! sequences, so a 2x3 and a 3x2 matrix share the same dynamic shape; the
//! matrix builder is therefore ambiguous and resolved after the vector one.

use strap_bind::strap_rt::{RuntimeResult, State};
use strap_bind::{traits, BulkFunc, Caps, Marshal, SimpleBuilder};

macro_rules! vector {
    ($name:ident, $n:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct $name(pub [f64; $n]);

        impl Marshal for $name {
            const CAPS: Caps = Caps::CONTAINER;

            fn type_name() -> &'static str {
                stringify!($name)
            }

            fn read(state: &mut State, idx: i32) -> Option<Self> {
                traits::read::<[f64; $n]>(state, idx).map($name)
            }

            fn emplace(&self, state: &mut State, idx: i32) -> RuntimeResult<()> {
                self.0.emplace(state, idx)
            }
        }
    };
}

vector!(Vec2, 2);
vector!(Vec3, 3);

macro_rules! matrix {
    ($name:ident, $rows:literal, $cols:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct $name(pub [[f64; $cols]; $rows]);

        impl Marshal for $name {
            const CAPS: Caps = Caps::CONTAINER;

            fn type_name() -> &'static str {
                stringify!($name)
            }

            fn read(state: &mut State, idx: i32) -> Option<Self> {
                let flat = traits::read::<[f64; $rows * $cols]>(state, idx)?;
                let mut rows = [[0.0; $cols]; $rows];
                for (i, v) in flat.iter().enumerate() {
                    rows[i / $cols][i % $cols] = *v;
                }
                Some($name(rows))
            }

            fn emplace(&self, state: &mut State, idx: i32) -> RuntimeResult<()> {
                let flat: Vec<f64> = self.0.iter().flatten().copied().collect();
                flat.emplace(state, idx)
            }
        }
    };
}

matrix!(Mat2x2, 2, 2);
matrix!(Mat2x3, 2, 3);
matrix!(Mat3x2, 3, 2);
matrix!(Mat3x3, 3, 3);

fn mat_vec<const R: usize, const C: usize>(m: &[[f64; C]; R], v: &[f64; C]) -> [f64; R] {
    let mut out = [0.0; R];
    for (o, row) in out.iter_mut().zip(m) {
        *o = row.iter().zip(v).map(|(a, b)| a * b).sum();
    }
    out
}

fn transposed<const R: usize, const C: usize>(m: &[[f64; C]; R]) -> [[f64; R]; C] {
    let mut out = [[0.0; R]; C];
    for (r, row) in m.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            out[c][r] = *v;
        }
    }
    out
}

pub fn vector_builder() -> SimpleBuilder {
    SimpleBuilder::new("Vector").with::<Vec2>().with::<Vec3>()
}

/// 2x3 is declared before 3x2, so a flat six element sequence that could be
/// either reads as 2x3 when both are viable.
pub fn matrix_builder() -> SimpleBuilder {
    SimpleBuilder::ambiguous("Matrix")
        .with::<Mat2x2>()
        .with::<Mat2x3>()
        .with::<Mat3x2>()
        .with::<Mat3x3>()
}

/// `mul(matrix, vector)`: the vector length decides which matrices fit.
pub fn mul() -> BulkFunc {
    BulkFunc::new()
        .builder(matrix_builder())
        .builder(vector_builder())
        .instance(|m: &mut Mat2x2, v: &mut Vec2| Vec2(mat_vec(&m.0, &v.0)))
        .instance(|m: &mut Mat2x3, v: &mut Vec3| Vec2(mat_vec(&m.0, &v.0)))
        .instance(|m: &mut Mat3x2, v: &mut Vec2| Vec3(mat_vec(&m.0, &v.0)))
        .instance(|m: &mut Mat3x3, v: &mut Vec3| Vec3(mat_vec(&m.0, &v.0)))
}

/// `transpose(matrix)`: nothing narrows the matrix, so declaration order
/// decides between 2x3 and 3x2.
pub fn transpose() -> BulkFunc {
    BulkFunc::new()
        .builder(matrix_builder())
        .instance(|m: &mut Mat2x2| Mat2x2(transposed(&m.0)))
        .instance(|m: &mut Mat2x3| Mat3x2(transposed(&m.0)))
        .instance(|m: &mut Mat3x2| Mat2x3(transposed(&m.0)))
        .instance(|m: &mut Mat3x3| Mat3x3(transposed(&m.0)))
}

/// `scale(vector, factor)`: scales the vector in place.
pub fn scale() -> BulkFunc {
    BulkFunc::new()
        .builder(vector_builder())
        .builder(SimpleBuilder::new("Factor").with::<f64>())
        .instance(|v: &mut Vec2, k: &mut f64| v.0.iter_mut().for_each(|x| *x *= *k))
        .instance(|v: &mut Vec3, k: &mut f64| v.0.iter_mut().for_each(|x| *x *= *k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_vector_product() {
        let m = [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        assert_eq!(mat_vec(&m, &[1.0, 0.0, 1.0]), [4.0, 10.0]);
    }

    #[test]
    fn transpose_swaps_dimensions() {
        let m = [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        assert_eq!(transposed(&m), [[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]]);
    }

    #[test]
    fn matrices_read_row_major() {
        let mut state = State::new();
        traits::write(&mut state, &vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let m = traits::read::<Mat3x2>(&mut state, 1).unwrap();
        assert_eq!(m.0, [[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        assert!(traits::read::<Mat2x2>(&mut state, 1).is_none());
        assert!(traits::read::<Mat3x3>(&mut state, 1).is_none());
    }
}

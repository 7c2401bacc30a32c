//! Dense 2-D matrix over f64 with explicit-loop arithmetic.
//!
//! Data is stored row-major in a flat `Vec`, the same layout the rest of the
//! engine uses for images and feature maps. Every binary operation checks
//! operand shapes and fails with a shape error instead of producing silently
//! wrong numbers.
//!
//! In-place operations are explicit `*_assign` calls returning `Result<()>`;
//! the pure associated functions (`Matrix::add`, `Matrix::sub`, ...) build a
//! new matrix without touching their operands.

use crate::error::{EngineError, Result};
use crate::utils::SimpleRng;

/// Dense row-major matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Zero-filled matrix.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Wrap a flat slice as an N x 1 column vector.
    pub fn vector_from_slice(values: &[f64]) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values.to_vec(),
        }
    }

    /// Wrap a flat slice as a rows x cols matrix (row-major order).
    pub fn matrix_from_slice(values: &[f64], rows: usize, cols: usize) -> Result<Self> {
        if values.len() != rows * cols {
            return Err(EngineError::shape(
                "matrix_from_slice",
                (rows, cols),
                (values.len(), 1),
            ));
        }
        Ok(Self {
            rows,
            cols,
            data: values.to_vec(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Copy of the flat row-major buffer.
    pub fn to_vec(&self) -> Vec<f64> {
        self.data.clone()
    }

    /// Fill with zero-mean Gaussian values scaled by `scale`.
    ///
    /// Callers pick the scale per layer fan-in (e.g. `1/sqrt(fan_in)` for
    /// weights, `1.0` for biases).
    pub fn randomize(&mut self, scale: f64, rng: &mut SimpleRng) {
        for value in &mut self.data {
            *value = rng.next_gaussian() * scale;
        }
    }

    fn check_same_shape(&self, other: &Matrix, op: &'static str) -> Result<()> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(EngineError::shape(
                op,
                (self.rows, self.cols),
                (other.rows, other.cols),
            ));
        }
        Ok(())
    }

    /// Elementwise `self += other`.
    pub fn add_assign(&mut self, other: &Matrix) -> Result<()> {
        self.check_same_shape(other, "add")?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
        Ok(())
    }

    /// Elementwise `self -= other`.
    pub fn sub_assign(&mut self, other: &Matrix) -> Result<()> {
        self.check_same_shape(other, "sub")?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a -= b;
        }
        Ok(())
    }

    /// Elementwise `self /= other`.
    pub fn div_assign(&mut self, other: &Matrix) -> Result<()> {
        self.check_same_shape(other, "div")?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a /= b;
        }
        Ok(())
    }

    /// `self /= scalar`.
    pub fn div_scalar(&mut self, scalar: f64) {
        for value in &mut self.data {
            *value /= scalar;
        }
    }

    /// `self *= scalar`.
    pub fn scale(&mut self, scalar: f64) {
        for value in &mut self.data {
            *value *= scalar;
        }
    }

    /// Elementwise `self += factor * other` (the SGD update step).
    pub fn add_scaled(&mut self, other: &Matrix, factor: f64) -> Result<()> {
        self.check_same_shape(other, "add_scaled")?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += factor * b;
        }
        Ok(())
    }

    /// Apply `f` to every element in place.
    pub fn map_inplace(&mut self, f: impl Fn(f64) -> f64) {
        for value in &mut self.data {
            *value = f(*value);
        }
    }

    /// New matrix holding `a + b`.
    pub fn add(a: &Matrix, b: &Matrix) -> Result<Matrix> {
        let mut out = a.clone();
        out.add_assign(b)?;
        Ok(out)
    }

    /// New matrix holding `a - b`.
    pub fn sub(a: &Matrix, b: &Matrix) -> Result<Matrix> {
        let mut out = a.clone();
        out.sub_assign(b)?;
        Ok(out)
    }

    /// New matrix holding the elementwise product `a .* b`.
    pub fn hadamard(a: &Matrix, b: &Matrix) -> Result<Matrix> {
        a.check_same_shape(b, "hadamard")?;
        let mut out = a.clone();
        for (v, b) in out.data.iter_mut().zip(b.data.iter()) {
            *v *= b;
        }
        Ok(out)
    }

    /// New matrix holding `f` applied to every element of `m`.
    pub fn map(m: &Matrix, f: impl Fn(f64) -> f64) -> Matrix {
        let mut out = m.clone();
        out.map_inplace(f);
        out
    }

    /// Standard matrix product; requires `self.cols == other.rows`.
    pub fn matmul(&self, other: &Matrix) -> Result<Matrix> {
        if self.cols != other.rows {
            return Err(EngineError::shape(
                "matmul",
                (self.rows, self.cols),
                (other.rows, other.cols),
            ));
        }

        let mut out = Matrix::new(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let lhs = self.data[i * self.cols + k];
                if lhs == 0.0 {
                    continue;
                }
                for j in 0..other.cols {
                    out.data[i * other.cols + j] += lhs * other.data[k * other.cols + j];
                }
            }
        }
        Ok(out)
    }

    /// New matrix with swapped dimensions and transposed data.
    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::new(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                out.data[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }
        out
    }

    /// Index of the largest element (first occurrence on ties).
    pub fn argmax(&self) -> usize {
        let mut best = f64::NEG_INFINITY;
        let mut arg = 0;
        for (i, &v) in self.data.iter().enumerate() {
            if v > best {
                best = v;
                arg = i;
            }
        }
        arg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_new_is_zero_filled() {
        let m = Matrix::new(3, 2);
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 2);
        assert!(m.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_vector_from_slice() {
        let v = Matrix::vector_from_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(v.rows(), 3);
        assert_eq!(v.cols(), 1);
        assert_eq!(v.get(1, 0), 2.0);
    }

    #[test]
    fn test_matrix_from_slice_shape_check() {
        assert!(Matrix::matrix_from_slice(&[1.0, 2.0, 3.0], 2, 2).is_err());
        let m = Matrix::matrix_from_slice(&[1.0, 2.0, 3.0, 4.0], 2, 2).unwrap();
        assert_eq!(m.get(1, 0), 3.0);
    }

    #[test]
    fn test_add_sub_restores_original() {
        let a = Matrix::matrix_from_slice(&[1.0, -2.5, 0.25, 4.0], 2, 2).unwrap();
        let b = Matrix::matrix_from_slice(&[0.5, 1.5, -3.0, 2.0], 2, 2).unwrap();

        let mut m = a.clone();
        m.add_assign(&b).unwrap();
        m.sub_assign(&b).unwrap();

        for (x, y) in m.as_slice().iter().zip(a.as_slice()) {
            assert_relative_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_add_shape_mismatch() {
        let mut a = Matrix::new(2, 2);
        let b = Matrix::new(3, 2);
        assert!(a.add_assign(&b).is_err());
    }

    #[test]
    fn test_pure_ops_do_not_mutate() {
        let a = Matrix::matrix_from_slice(&[1.0, 2.0], 1, 2).unwrap();
        let b = Matrix::matrix_from_slice(&[3.0, 4.0], 1, 2).unwrap();

        let sum = Matrix::add(&a, &b).unwrap();
        assert_eq!(sum.as_slice(), &[4.0, 6.0]);
        assert_eq!(a.as_slice(), &[1.0, 2.0]);
        assert_eq!(b.as_slice(), &[3.0, 4.0]);
    }

    #[test]
    fn test_matmul_known_product() {
        let a = Matrix::matrix_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3).unwrap();
        let b = Matrix::matrix_from_slice(&[7.0, 8.0, 9.0, 10.0, 11.0, 12.0], 3, 2).unwrap();

        let c = a.matmul(&b).unwrap();
        assert_eq!(c.rows(), 2);
        assert_eq!(c.cols(), 2);
        assert_eq!(c.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_identity() {
        let a = Matrix::matrix_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3).unwrap();
        let mut id = Matrix::new(3, 3);
        for i in 0..3 {
            id.set(i, i, 1.0);
        }
        assert_eq!(a.matmul(&id).unwrap(), a);
    }

    #[test]
    fn test_matmul_shape_mismatch() {
        let a = Matrix::new(2, 3);
        let b = Matrix::new(2, 3);
        assert!(a.matmul(&b).is_err());
    }

    #[test]
    fn test_transpose() {
        let a = Matrix::matrix_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3).unwrap();
        let t = a.transpose();
        assert_eq!(t.rows(), 3);
        assert_eq!(t.cols(), 2);
        assert_eq!(t.as_slice(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_hadamard() {
        let a = Matrix::matrix_from_slice(&[1.0, 2.0, 3.0], 3, 1).unwrap();
        let b = Matrix::matrix_from_slice(&[4.0, 5.0, 6.0], 3, 1).unwrap();
        let h = Matrix::hadamard(&a, &b).unwrap();
        assert_eq!(h.as_slice(), &[4.0, 10.0, 18.0]);
    }

    #[test]
    fn test_map_variants() {
        let a = Matrix::matrix_from_slice(&[1.0, -2.0], 2, 1).unwrap();
        let doubled = Matrix::map(&a, |x| x * 2.0);
        assert_eq!(doubled.as_slice(), &[2.0, -4.0]);
        assert_eq!(a.as_slice(), &[1.0, -2.0]);

        let mut b = a.clone();
        b.map_inplace(|x| x.abs());
        assert_eq!(b.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn test_argmax_ties_take_first() {
        let v = Matrix::vector_from_slice(&[0.1, 0.9, 0.9, 0.3]);
        assert_eq!(v.argmax(), 1);
    }

    #[test]
    fn test_randomize_deterministic() {
        let mut rng1 = SimpleRng::new(99);
        let mut rng2 = SimpleRng::new(99);
        let mut a = Matrix::new(4, 4);
        let mut b = Matrix::new(4, 4);
        a.randomize(0.5, &mut rng1);
        b.randomize(0.5, &mut rng2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_div_scalar_and_scale() {
        let mut m = Matrix::vector_from_slice(&[2.0, 4.0]);
        m.div_scalar(2.0);
        assert_eq!(m.as_slice(), &[1.0, 2.0]);
        m.scale(3.0);
        assert_eq!(m.as_slice(), &[3.0, 6.0]);
    }
}

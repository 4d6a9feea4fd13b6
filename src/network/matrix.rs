use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::ConfigError;

/// Row-major weight matrix. Rows are input neurons, columns output neurons.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    pub fn from_vec(data: Vec<f64>, rows: usize, cols: usize) -> Self {
        assert_eq!(data.len(), rows * cols, "data length must equal rows * cols");
        Self { data, rows, cols }
    }

    // w ~ N(0, sqrt(2 / fan_in)), fan_in = rows
    pub fn kaiming<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Result<Self, ConfigError> {
        let std_dev = (2.0 / rows as f64).sqrt();
        let normal = Normal::new(0.0, std_dev)
            .map_err(|e| ConfigError::Validation(format!("weight initialisation for {rows}x{cols} layer: {e}")))?;
        let data = (0..rows * cols).map(|_| normal.sample(rng)).collect();
        Ok(Self { data, rows, cols })
    }

    /// `column ⊗ row`: entry (i, j) is `column[i] * row[j]`.
    pub fn outer(column: &[f64], row: &[f64]) -> Self {
        let mut data = Vec::with_capacity(column.len() * row.len());
        for &c in column {
            data.extend(row.iter().map(|&r| c * r));
        }
        Self::from_vec(data, column.len(), row.len())
    }

    pub fn rows(&self) -> usize {self.rows}
    pub fn cols(&self) -> usize {self.cols}

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// `inputᵀ · W`, one value per column.
    pub fn vec_mul(&self, input: &[f64]) -> Vec<f64> {
        assert_eq!(input.len(), self.rows, "input length must equal matrix rows");
        let mut output = vec![0.0; self.cols];
        for (i, &x) in input.iter().enumerate() {
            for (out, &w) in output.iter_mut().zip(self.row(i)) {
                *out += x * w;
            }
        }
        output
    }

    /// `W · gradient`, one value per row.
    pub fn mul_vec(&self, gradient: &[f64]) -> Vec<f64> {
        assert_eq!(gradient.len(), self.cols, "gradient length must equal matrix columns");
        (0..self.rows)
            .map(|i| self.row(i).iter().zip(gradient).map(|(w, g)| w * g).sum())
            .collect()
    }

    // self -= scale * other
    pub fn sub_scaled(&mut self, other: &Matrix, scale: f64) {
        assert_eq!((self.rows, self.cols), (other.rows, other.cols), "matrices must have the same shape");
        for (w, dw) in self.data.iter_mut().zip(&other.data) {
            *w -= scale * dw;
        }
    }
}

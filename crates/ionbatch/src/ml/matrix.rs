use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Row;
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Col;

/// Dense, row-major matrix of `f64`
#[derive(Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Shaped")]
pub struct Matrix {
    data: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
}

/// Serialized form of a [`Matrix`], checked for a consistent shape on load
#[derive(Deserialize)]
struct Shaped {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl TryFrom<Shaped> for Matrix {
    type Error = String;

    fn try_from(value: Shaped) -> Result<Self, Self::Error> {
        match value.data.len() == value.rows * value.cols {
            true => Ok(Matrix {
                data: value.data,
                rows: value.rows,
                cols: value.cols,
            }),
            false => Err(format!(
                "matrix with shape ({}, {}) cannot hold {} values",
                value.rows,
                value.cols,
                value.data.len()
            )),
        }
    }
}

pub struct Iter<'a, Axes> {
    data: &'a Matrix,
    row: usize,
    col: usize,
    axes: PhantomData<Axes>,
}

impl<'a> Iterator for Iter<'a, Row> {
    type Item = f64;

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.data.get(self.row, self.col);
        self.col += 1;
        data
    }
}

impl<'a> Iterator for Iter<'a, Col> {
    type Item = f64;

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.data.get(self.row, self.col);
        self.row += 1;
        data
    }
}

impl Matrix {
    /// Create a new `Matrix`
    ///
    /// # Panics
    ///
    /// * Panics if `data` does not have len == rows * cols
    pub fn new<T: Into<Vec<f64>>>(t: T, rows: usize, cols: usize) -> Matrix {
        let data = t.into();
        assert_eq!(
            data.len(),
            rows * cols,
            "data passed to Matrix::new() does not have shape ({}, {})",
            rows,
            cols
        );
        Matrix { data, rows, cols }
    }

    /// Build a matrix from equally sized rows, returning `None` on ragged input
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Matrix> {
        let cols = rows.first().map(|r| r.len()).unwrap_or_default();
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        let data = rows.iter().flatten().copied().collect::<Vec<_>>();
        Some(Matrix {
            data,
            rows: rows.len(),
            cols,
        })
    }

    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    pub fn col_vector(data: Vec<f64>) -> Matrix {
        let rows = data.len();
        Matrix {
            data,
            rows,
            cols: 1,
        }
    }

    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            None
        } else {
            self.data.get(self.cols * row + col).copied()
        }
    }

    pub fn row(&self, row: usize) -> Iter<'_, Row> {
        Iter {
            data: self,
            row,
            col: 0,
            axes: PhantomData,
        }
    }

    pub fn col(&self, col: usize) -> Iter<'_, Col> {
        Iter {
            data: self,
            row: 0,
            col,
            axes: PhantomData,
        }
    }

    /// Contiguous view of a single row
    pub fn row_slice(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_slice_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Gather the given rows (in order) into a new matrix
    pub fn select_rows(&self, rows: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(rows.len() * self.cols);
        for &row in rows {
            data.extend_from_slice(self.row_slice(row));
        }
        Matrix {
            data,
            rows: rows.len(),
            cols: self.cols,
        }
    }

    pub fn is_close(&self, rhs: &Self, eps: f64) -> bool {
        self.shape() == rhs.shape()
            && self
                .data
                .iter()
                .zip(&rhs.data)
                .all(|(l, r)| (l - r).abs() <= eps)
    }

    pub fn transpose(&self) -> Matrix {
        if self.cols == 1 || self.rows == 1 {
            let mut mat = self.clone();
            std::mem::swap(&mut mat.cols, &mut mat.rows);
            return mat;
        }
        let mut mat = Matrix::zeros(self.cols, self.rows);
        for row in 0..self.rows {
            for col in 0..self.cols {
                mat[(col, row)] = self[(row, col)]
            }
        }
        mat
    }

    pub fn dot(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(
            self.cols, rhs.rows,
            "lhs has shape ({},{}), rhs has shape ({},{})",
            self.rows, self.cols, rhs.rows, rhs.cols
        );
        // Transposing once keeps both operands contiguous in the inner loop
        let rhs_t = &rhs.transpose();
        let data = (0..self.rows)
            .into_par_iter()
            .flat_map_iter(move |row| {
                let lhs = self.row_slice(row);
                (0..rhs_t.rows).map(move |col| {
                    lhs.iter()
                        .zip(rhs_t.row_slice(col))
                        .fold(0.0, |acc, (x, y)| acc + x * y)
                })
            })
            .collect::<Vec<_>>();
        Matrix {
            data,
            rows: self.rows,
            cols: rhs.cols,
        }
    }

    /// Apply `f` to every element
    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Matrix {
        Matrix {
            data: self.data.iter().map(|&x| f(x)).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Combine two equally shaped matrices element by element
    pub fn zip_map<F: Fn(f64, f64) -> f64>(&self, rhs: &Matrix, f: F) -> Matrix {
        assert_eq!(
            self.shape(),
            rhs.shape(),
            "matrices must have equal shape to combine"
        );
        Matrix {
            data: self
                .data
                .iter()
                .zip(&rhs.data)
                .map(|(&x, &y)| f(x, y))
                .collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Add `bias` to every row
    pub fn add_row(&mut self, bias: &[f64]) {
        assert_eq!(self.cols, bias.len(), "bias must have one entry per column");
        for chunk in self.data.chunks_exact_mut(self.cols) {
            chunk.iter_mut().zip(bias).for_each(|(x, b)| *x += b);
        }
    }

    /// Calculate sum of each column
    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.cols];
        for chunk in self.data.chunks_exact(self.cols.max(1)) {
            sums.iter_mut().zip(chunk).for_each(|(s, x)| *s += x);
        }
        sums
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &Self::Output {
        &self.data[self.cols * row + col]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut Self::Output {
        &mut self.data[self.cols * row + col]
    }
}

impl Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[")?;
        for row in 0..self.rows {
            writeln!(f, "{:?}", self.row(row).collect::<Vec<_>>())?;
        }
        writeln!(f, "]")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tranpose() {
        let mut mat = Matrix::new([1., 2., 3., 4., 5., 6.], 3, 2);

        assert_eq!(mat[(0, 1)], 2., "{:?}", mat);
        assert_eq!(mat[(2, 0)], 5., "{:?}", mat);

        mat = mat.transpose();

        assert_eq!(mat.shape(), (2, 3));
        assert_eq!(mat.row(0).collect::<Vec<_>>(), vec![1., 3., 5.]);
        assert_eq!(mat.row(1).collect::<Vec<_>>(), vec![2., 4., 6.]);
        assert_eq!(mat.col(2).collect::<Vec<_>>(), vec![5., 6.]);
    }

    #[test]
    fn dot() {
        #[rustfmt::skip]
        let a = Matrix::new(vec![
            1., 0., 1.,
            2., 1., 1.,
            0., 1., 1.,
            1., 1., 2.
        ], 4, 3);

        #[rustfmt::skip]
        let b = Matrix::new(vec![
            1., 2., 1.,
            2., 3., 1.,
            4., 2., 2.
        ], 3, 3);

        let c = a.dot(&b);
        assert_eq!(c.shape(), (4, 3));
        #[rustfmt::skip]
        assert_eq!(
            c.as_slice(),
            &[
                5., 4., 3.,
                8., 9., 5.,
                6., 5., 3.,
                11., 9., 6.
            ]
        );

        let d = Matrix::new(vec![1., 2., 3., 4., 5., 6.], 2, 3);
        let e = Matrix::col_vector(vec![7., 9., 11.]);
        assert_eq!(d.dot(&e), Matrix::col_vector(vec![58., 139.]));
    }

    #[test]
    fn reductions() {
        let m = Matrix::new([1., 2., 3., 4., 5., 6.], 2, 3);
        assert_eq!(m.col_sums(), vec![5., 7., 9.]);
        assert!(m.is_finite());
        assert!(!m.map(|x| x / 0.0).is_finite());
        assert_eq!(m.zip_map(&m, |x, y| x - y), Matrix::zeros(2, 3));
    }

    #[test]
    fn selection() {
        let m = Matrix::from_rows(&[vec![1., 2., 3.], vec![4., 5., 6.], vec![7., 8., 9.]])
            .expect("rows are not ragged");
        assert_eq!(m.select_rows(&[2, 0]).as_slice(), &[7., 8., 9., 1., 2., 3.]);
        assert!(Matrix::from_rows(&[vec![1.], vec![1., 2.]]).is_none());

        let mut z = Matrix::zeros(2, 2);
        z.add_row(&[1., -1.]);
        assert_eq!(z.as_slice(), &[1., -1., 1., -1.]);
    }

    #[test]
    fn serde_shape_check() {
        let m: Matrix = serde_json::from_str(r#"{"data": [1, 2, 3, 4], "rows": 2, "cols": 2}"#)
            .expect("valid matrix");
        assert_eq!(m[(1, 0)], 3.0);

        let err = serde_json::from_str::<Matrix>(r#"{"data": [1, 2, 3], "rows": 2, "cols": 2}"#);
        assert!(err.is_err());
    }
}

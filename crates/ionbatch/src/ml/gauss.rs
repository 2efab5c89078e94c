//! Gauss-Jordan elimination for solution of systems of linear equations
//!
//! ComBat fits a per-feature linear model of the batch design. We solve the
//! normal equations (XᵀX)·B = XᵀY for all features at once by carrying the
//! right hand side (one column per feature) through the elimination.

use super::matrix::Matrix;

#[derive(Debug)]
pub struct Gauss {
    pub left: Matrix,
    pub right: Matrix,
}

fn swap_rows(matrix: &mut Matrix, i: usize, j: usize) {
    for k in 0..matrix.cols {
        let tmp = matrix[(i, k)];
        matrix[(i, k)] = matrix[(j, k)];
        matrix[(j, k)] = tmp;
    }
}

impl Gauss {
    /// Solve `left · x = right`, returning `None` if `left` is singular
    pub fn solve(left: Matrix, right: Matrix) -> Option<Matrix> {
        assert_eq!(
            left.rows, right.rows,
            "left hand side and right hand side must have the same number of rows"
        );
        let mut g = Gauss { left, right };
        g.echelon()?;
        g.reduce();
        g.backfill();
        Some(g.right)
    }

    fn echelon(&mut self) -> Option<()> {
        let (m, n) = self.left.shape();
        if m != n {
            return None;
        }

        for k in 0..n {
            // Partial pivoting: bring the largest magnitude entry of column k up
            let (pivot, max) = (k..m)
                .map(|i| (i, self.left[(i, k)].abs()))
                .fold((k, f64::MIN), |acc, x| if x.1 > acc.1 { x } else { acc });
            if max <= f64::EPSILON {
                return None;
            }

            if pivot != k {
                swap_rows(&mut self.left, k, pivot);
                swap_rows(&mut self.right, k, pivot);
            }

            // Clear rows below pivot row
            for i in k + 1..m {
                let factor = self.left[(i, k)] / self.left[(k, k)];
                if factor == 0.0 {
                    continue;
                }
                self.left[(i, k)] = 0.0;
                for j in k + 1..n {
                    self.left[(i, j)] -= self.left[(k, j)] * factor;
                }
                for j in 0..self.right.cols {
                    self.right[(i, j)] -= self.right[(k, j)] * factor;
                }
            }
        }
        Some(())
    }

    // Scale each row so that the diagonal is all ones
    fn reduce(&mut self) {
        for i in 0..self.left.rows {
            let x = self.left[(i, i)];
            for k in i..self.left.cols {
                self.left[(i, k)] /= x;
            }
            for k in 0..self.right.cols {
                self.right[(i, k)] /= x;
            }
        }
    }

    // Solve the upper triangular matrix
    fn backfill(&mut self) {
        for i in (0..self.left.rows).rev() {
            for k in 0..i {
                let factor = self.left[(k, i)];
                if factor == 0.0 {
                    continue;
                }
                self.left[(k, i)] = 0.0;
                for h in 0..self.right.cols {
                    self.right[(k, h)] -= self.right[(i, h)] * factor;
                }
            }
        }
    }
}

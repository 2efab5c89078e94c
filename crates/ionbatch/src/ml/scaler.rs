//! Outlier-robust feature scaling
//!
//! Every feature (column) is centered on its median and divided by its
//! inter-quartile range, so a handful of extreme intensities do not dominate
//! the scale the way they would with mean/standard deviation scaling.

use super::matrix::Matrix;
use super::quantile;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RobustScaler {
    pub center: Vec<f64>,
    pub scale: Vec<f64>,
}

impl RobustScaler {
    /// Fit median and 25th-75th percentile range of each column of `x`
    ///
    /// # Panics
    /// * Panics if `x` has no rows
    pub fn fit(x: &Matrix) -> RobustScaler {
        assert!(x.rows > 0, "cannot fit a scaler to an empty matrix");
        let (center, scale) = (0..x.cols)
            .map(|col| {
                let mut values = x.col(col).collect::<Vec<_>>();
                values.sort_by(|a, b| a.total_cmp(b));
                let iqr = quantile(&values, 0.75) - quantile(&values, 0.25);
                let scale = match iqr == 0.0 {
                    true => 1.0,
                    false => iqr,
                };
                (quantile(&values, 0.5), scale)
            })
            .unzip();
        RobustScaler { center, scale }
    }

    pub fn transform(&self, x: &Matrix) -> Matrix {
        self.apply(x, |v, center, scale| (v - center) / scale)
    }

    pub fn inverse_transform(&self, x: &Matrix) -> Matrix {
        self.apply(x, |v, center, scale| v * scale + center)
    }

    pub fn fit_transform(x: &Matrix) -> (RobustScaler, Matrix) {
        let scaler = RobustScaler::fit(x);
        let scaled = scaler.transform(x);
        (scaler, scaled)
    }

    fn apply<F: Fn(f64, f64, f64) -> f64>(&self, x: &Matrix, f: F) -> Matrix {
        assert_eq!(
            x.cols,
            self.center.len(),
            "scaler was fit to {} features, got {}",
            self.center.len(),
            x.cols
        );
        let mut out = x.clone();
        for row in 0..out.rows {
            out.row_slice_mut(row)
                .iter_mut()
                .zip(self.center.iter().zip(&self.scale))
                .for_each(|(v, (&c, &s))| *v = f(*v, c, s));
        }
        out
    }
}

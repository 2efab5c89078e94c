//! Linear Algebra, batch correction & reconstruction models

pub mod autoencoder;
pub mod combat;
pub mod gauss;
pub mod matrix;
pub mod scaler;

pub fn mean(slice: &[f64]) -> f64 {
    slice.iter().sum::<f64>() / slice.len() as f64
}

/// Sample variance with `ddof` delta degrees of freedom
pub fn var(slice: &[f64], ddof: usize) -> f64 {
    let mean = mean(slice);
    let x = slice.iter().fold(0.0, |acc, x| acc + (x - mean).powi(2));
    x / (slice.len() - ddof) as f64
}

/// Linearly interpolated quantile, `q` in [0, 1]
///
/// # Invariants
/// * `sorted` must be sorted in ascending order and non-empty
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn moments() {
        let x = [2., 4., 4., 4., 5., 5., 7., 9.];
        assert_eq!(mean(&x), 5.0);
        assert_eq!(var(&x, 0), 4.0);
        assert!((var(&x, 1) - 32.0 / 7.0).abs() < 1E-12);
    }

    #[test]
    fn quantiles() {
        let x = [1., 2., 3., 4.];
        assert_eq!(quantile(&x, 0.5), 2.5);
        assert_eq!(quantile(&x, 0.25), 1.75);
        assert_eq!(quantile(&x, 0.75), 3.25);
        assert_eq!(quantile(&x, 0.0), 1.0);
        assert_eq!(quantile(&x, 1.0), 4.0);
        assert_eq!(quantile(&[3.0], 0.3), 3.0);
    }
}

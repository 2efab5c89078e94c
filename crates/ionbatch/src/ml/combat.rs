//! ComBat batch-effect correction using parametric empirical Bayes
//!
//! Johnson, Li & Rabinovic, Biostatistics 2007, 8, 1, 118–127
//! https://doi.org/10.1093/biostatistics/kxj037
//!
//! Every feature is standardized against a linear model of the batch design,
//! batch-specific location (`gamma`) and scale (`delta`) effects are estimated,
//! and those estimates are shrunk towards priors pooled across all features
//! before being removed from the data.

use super::gauss::Gauss;
use super::matrix::Matrix;
use super::{mean, var};
use crate::normalize::{BatchCorrection, CorrectionError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComBat {
    /// Only remove the location effect, leaving per-batch variance untouched
    pub mean_only: bool,
    /// Maximum relative change of the posterior estimates at convergence
    pub convergence: f64,
    pub max_iterations: usize,
}

impl Default for ComBat {
    fn default() -> Self {
        Self {
            mean_only: false,
            convergence: 1E-4,
            max_iterations: 1000,
        }
    }
}

/// Posterior batch effects for every active feature of a single batch
struct Posterior {
    gamma: Vec<f64>,
    delta: Vec<f64>,
    iterations: usize,
}

/// Group sample indices by batch label. Labels need not be contiguous
fn batch_members(batches: &[usize]) -> Vec<Vec<usize>> {
    let mut levels = batches.to_vec();
    levels.sort_unstable();
    levels.dedup();

    let mut members = vec![Vec::new(); levels.len()];
    for (sample, label) in batches.iter().enumerate() {
        // `levels` contains every label, so the search cannot fail
        if let Ok(level) = levels.binary_search(label) {
            members[level].push(sample);
        }
    }
    members
}

/// Inverse gamma prior hyperparameters (a, b) by method of moments
fn inverse_gamma_prior(delta_hat: &[f64]) -> Option<(f64, f64)> {
    let m = mean(delta_hat);
    let s2 = var(delta_hat, 1);
    if s2 <= 0.0 || !s2.is_finite() {
        return None;
    }
    Some(((2.0 * s2 + m.powi(2)) / s2, (m * s2 + m.powi(3)) / s2))
}

impl ComBat {
    fn posterior(
        &self,
        s_data: &Matrix,
        members: &[usize],
        batch: usize,
    ) -> Result<Posterior, CorrectionError> {
        let n = members.len() as f64;
        let values = |feature: usize| {
            let row = s_data.row_slice(feature);
            members.iter().map(|&s| row[s]).collect::<Vec<_>>()
        };

        let gamma_hat = (0..s_data.rows)
            .map(|f| mean(&values(f)))
            .collect::<Vec<_>>();
        let gamma_bar = mean(&gamma_hat);
        let t2 = var(&gamma_hat, 1);

        if self.mean_only {
            let gamma = gamma_hat
                .iter()
                .map(|g| (t2 * g + gamma_bar) / (t2 + 1.0))
                .collect();
            return Ok(Posterior {
                gamma,
                delta: vec![1.0; s_data.rows],
                iterations: 0,
            });
        }

        let delta_hat = (0..s_data.rows)
            .map(|f| var(&values(f), 1))
            .collect::<Vec<_>>();
        let (a, b) =
            inverse_gamma_prior(&delta_hat).ok_or(CorrectionError::DegeneratePrior { batch })?;

        let mut gamma = gamma_hat.clone();
        let mut delta = delta_hat.clone();
        let mut iterations = 0;
        while iterations < self.max_iterations {
            iterations += 1;
            let mut change = 0.0f64;
            for f in 0..s_data.rows {
                let g_new =
                    (t2 * n * gamma_hat[f] + delta[f] * gamma_bar) / (t2 * n + delta[f]);
                let sum2 = values(f).iter().map(|x| (x - g_new).powi(2)).sum::<f64>();
                let d_new = (0.5 * sum2 + b) / (n / 2.0 + a - 1.0);

                change = change
                    .max(((g_new - gamma[f]) / gamma[f]).abs())
                    .max(((d_new - delta[f]) / delta[f]).abs());
                gamma[f] = g_new;
                delta[f] = d_new;
            }
            if change < self.convergence {
                break;
            }
        }

        if iterations == self.max_iterations {
            log::warn!(
                "- combat: batch {} did not converge after {} iterations",
                batch,
                iterations
            );
        }

        Ok(Posterior {
            gamma,
            delta,
            iterations,
        })
    }
}

impl BatchCorrection for ComBat {
    fn correct(&self, data: &Matrix, batches: &[usize]) -> Result<Matrix, CorrectionError> {
        let (features, samples) = data.shape();
        if batches.len() != samples {
            return Err(CorrectionError::ShapeMismatch {
                samples,
                labels: batches.len(),
            });
        }

        let members = batch_members(batches);
        if members.len() < 2 {
            return Err(CorrectionError::TooFewBatches(members.len()));
        }
        let min_size = if self.mean_only { 1 } else { 2 };
        if let Some((batch, m)) = members.iter().enumerate().find(|(_, m)| m.len() < min_size) {
            return Err(CorrectionError::SmallBatch {
                batch,
                samples: m.len(),
            });
        }

        // One-hot design matrix: samples x batches
        let mut design = Matrix::zeros(samples, members.len());
        for (batch, m) in members.iter().enumerate() {
            for &s in m {
                design[(s, batch)] = 1.0;
            }
        }

        // Least squares fit of the batch model for every feature at once
        let design_t = design.transpose();
        let beta = Gauss::solve(design_t.dot(&design), design_t.dot(&data.transpose()))
            .ok_or(CorrectionError::SingularDesign)?;

        let grand_mean = (0..features)
            .map(|f| {
                members
                    .iter()
                    .enumerate()
                    .map(|(batch, m)| m.len() as f64 / samples as f64 * beta[(batch, f)])
                    .sum::<f64>()
            })
            .collect::<Vec<_>>();

        let fitted = design.dot(&beta);
        let var_pooled = (0..features)
            .map(|f| {
                let row = data.row_slice(f);
                (0..samples)
                    .map(|s| (row[s] - fitted[(s, f)]).powi(2))
                    .sum::<f64>()
                    / samples as f64
            })
            .collect::<Vec<_>>();

        // Constant features carry no batch information and would divide by zero
        let active = (0..features)
            .filter(|&f| var_pooled[f] > 0.0)
            .collect::<Vec<_>>();
        if active.len() < features {
            log::warn!(
                "- combat: {} features with zero variance are left unadjusted",
                features - active.len()
            );
        }
        if active.len() < 2 {
            return Err(CorrectionError::TooFewFeatures(active.len()));
        }

        let mut s_data = data.select_rows(&active);
        for (row, &f) in active.iter().enumerate() {
            let sd = var_pooled[f].sqrt();
            s_data
                .row_slice_mut(row)
                .iter_mut()
                .for_each(|x| *x = (*x - grand_mean[f]) / sd);
        }

        let posteriors = members
            .par_iter()
            .enumerate()
            .map(|(batch, m)| self.posterior(&s_data, m, batch))
            .collect::<Result<Vec<_>, _>>()?;

        for (batch, p) in posteriors.iter().enumerate() {
            log::trace!(
                "- combat: batch {} ({} samples) converged in {} iterations",
                batch,
                members[batch].len(),
                p.iterations
            );
        }

        let mut adjusted = data.clone();
        for (row, &f) in active.iter().enumerate() {
            let sd = var_pooled[f].sqrt();
            let standardized = s_data.row_slice(row);
            for (batch, m) in members.iter().enumerate() {
                let gamma = posteriors[batch].gamma[row];
                let scale = posteriors[batch].delta[row].sqrt();
                for &s in m {
                    adjusted[(f, s)] = (standardized[s] - gamma) / scale * sd + grand_mean[f];
                }
            }
        }

        Ok(adjusted)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Features x samples matrix with a strong additive and multiplicative
    /// effect on the second batch
    fn batched(features: usize, per_batch: usize, rng: &mut StdRng) -> (Matrix, Vec<usize>) {
        let samples = per_batch * 2;
        let mut data = Matrix::zeros(features, samples);
        for f in 0..features {
            let base = 100.0 + 10.0 * f as f64;
            for s in 0..samples {
                let noise: f64 = rng.gen_range(-1.0..1.0);
                data[(f, s)] = match s < per_batch {
                    true => base + noise,
                    false => base + 25.0 + 3.0 * noise,
                };
            }
        }
        let batches = (0..samples).map(|s| s / per_batch).collect();
        (data, batches)
    }

    fn batch_gap(data: &Matrix, per_batch: usize) -> f64 {
        (0..data.rows)
            .map(|f| {
                let row = data.row_slice(f);
                (mean(&row[..per_batch]) - mean(&row[per_batch..])).abs()
            })
            .sum::<f64>()
            / data.rows as f64
    }

    #[test]
    fn members() {
        assert_eq!(
            batch_members(&[3, 1, 3, 1, 7]),
            vec![vec![1, 3], vec![0, 2], vec![4]]
        );
    }

    #[test]
    fn removes_batch_effect() {
        let mut rng = StdRng::seed_from_u64(7);
        let (data, batches) = batched(20, 6, &mut rng);
        let adjusted = ComBat::default()
            .correct(&data, &batches)
            .expect("combat failed");

        assert_eq!(adjusted.shape(), data.shape());
        assert!(adjusted.is_finite());
        assert!(batch_gap(&data, 6) > 20.0);
        assert!(batch_gap(&adjusted, 6) < 2.0, "{}", batch_gap(&adjusted, 6));

        // Shrinkage moves the overall mean of a feature only slightly
        for f in 0..data.rows {
            let before = mean(data.row_slice(f));
            let after = mean(adjusted.row_slice(f));
            assert!((before - after).abs() < 2.0, "{} {}", before, after);
        }
    }

    #[test]
    fn mean_only() {
        let mut rng = StdRng::seed_from_u64(11);
        let (data, batches) = batched(10, 4, &mut rng);
        let combat = ComBat {
            mean_only: true,
            ..Default::default()
        };
        let adjusted = combat.correct(&data, &batches).expect("combat failed");
        assert_eq!(adjusted.shape(), data.shape());
        assert!(batch_gap(&adjusted, 4) < 2.0);
    }

    #[test]
    fn constant_features_pass_through() {
        let mut rng = StdRng::seed_from_u64(3);
        let (mut data, batches) = batched(5, 3, &mut rng);
        for s in 0..data.cols {
            data[(2, s)] = 42.0;
        }
        let adjusted = ComBat::default().correct(&data, &batches).unwrap();
        assert!(adjusted.row_slice(2).iter().all(|&x| x == 42.0));
    }

    #[test]
    fn invalid_batches() {
        let data = Matrix::zeros(3, 4);
        let combat = ComBat::default();
        assert_eq!(
            combat.correct(&data, &[0, 0, 1]),
            Err(CorrectionError::ShapeMismatch {
                samples: 4,
                labels: 3
            })
        );
        assert_eq!(
            combat.correct(&data, &[0, 0, 0, 0]),
            Err(CorrectionError::TooFewBatches(1))
        );
        assert_eq!(
            combat.correct(&data, &[0, 0, 0, 1]),
            Err(CorrectionError::SmallBatch {
                batch: 1,
                samples: 1
            })
        );
        assert_eq!(
            combat.correct(&data, &[0, 0, 1, 1]),
            Err(CorrectionError::TooFewFeatures(0))
        );
    }
}

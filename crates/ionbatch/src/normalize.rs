//! Normalization of intensity series across experiments
//!
//! Two strategies are provided: total ion current (TIC) scaling, which only
//! rescales every sample by its overall signal, and statistical batch
//! correction through any [`BatchCorrection`] implementation (ComBat by
//! default) applied to the full peaks x samples matrix before the analyte
//! series are re-extracted.

use crate::intensity::IntensitySeries;
use crate::locate::MatchedAnalytes;
use crate::ml::matrix::Matrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionError {
    ShapeMismatch { samples: usize, labels: usize },
    UnevenBatches { samples: usize, batch_size: usize },
    TooFewBatches(usize),
    SmallBatch { batch: usize, samples: usize },
    TooFewFeatures(usize),
    SingularDesign,
    DegeneratePrior { batch: usize },
    ShapeChanged,
}

impl std::fmt::Display for CorrectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShapeMismatch { samples, labels } => write!(
                f,
                "{} batch labels supplied for {} samples",
                labels, samples
            ),
            Self::UnevenBatches {
                samples,
                batch_size,
            } => write!(
                f,
                "{} samples cannot be split into batches of {}",
                samples, batch_size
            ),
            Self::TooFewBatches(n) => write!(f, "at least 2 batches are required, found {}", n),
            Self::SmallBatch { batch, samples } => {
                write!(f, "batch {} only contains {} sample(s)", batch, samples)
            }
            Self::TooFewFeatures(n) => write!(
                f,
                "at least 2 features with non-zero variance are required, found {}",
                n
            ),
            Self::SingularDesign => write!(f, "batch design matrix is singular"),
            Self::DegeneratePrior { batch } => write!(
                f,
                "batch {} variance estimates are constant, cannot fit a prior",
                batch
            ),
            Self::ShapeChanged => write!(f, "batch correction changed the shape of the data"),
        }
    }
}

impl std::error::Error for CorrectionError {}

/// Removes systematic differences between batches of samples
pub trait BatchCorrection {
    /// Adjust a features x samples matrix, given one batch label per sample.
    /// The result has the same shape as `data`
    fn correct(&self, data: &Matrix, batches: &[usize]) -> Result<Matrix, CorrectionError>;
}

/// Denominator used for total ion current scaling
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicScope {
    /// Sum over all peaks of every replicate of the experiment
    #[default]
    Experiment,
    /// Sum over all peaks of the replicate's own sample
    Sample,
}

/// Total ion current behind each value of `series`, indexed
/// `[experiment][replicate]`
///
/// # Panics
/// * Panics if `series` refers to a column outside of `data`
pub fn total_ion_current(data: &Matrix, series: &IntensitySeries, scope: TicScope) -> Vec<Vec<f64>> {
    let per_sample = data.col_sums();
    series
        .columns
        .iter()
        .map(|cols| match scope {
            TicScope::Sample => cols.iter().map(|&c| per_sample[c]).collect(),
            TicScope::Experiment => {
                let total = cols.iter().map(|&c| per_sample[c]).sum::<f64>();
                vec![total; cols.len()]
            }
        })
        .collect()
}

/// Check that `series` was extracted from a matrix shaped like `data`
fn check_columns(data: &Matrix, series: &IntensitySeries) -> Result<(), CorrectionError> {
    let labels = series.columns.iter().map(Vec::len).sum::<usize>();
    let in_range = series.columns.iter().flatten().all(|&c| c < data.cols);
    match labels == data.cols && in_range {
        true => Ok(()),
        false => Err(CorrectionError::ShapeMismatch {
            samples: data.cols,
            labels,
        }),
    }
}

/// Divide every intensity by its total ion current, scaled by `factor`
///
/// An experiment (or sample) without any signal has a TIC of zero; its
/// values become non-finite and a warning is logged.
pub fn tic_normalize(
    data: &Matrix,
    series: &IntensitySeries,
    factor: f64,
    scope: TicScope,
) -> Result<IntensitySeries, CorrectionError> {
    check_columns(data, series)?;
    let tic = total_ion_current(data, series, scope);
    for (experiment, totals) in series.experiments.iter().zip(&tic) {
        if totals.iter().any(|&t| t == 0.0) {
            log::warn!(
                "- experiment {} has a total ion current of zero, normalized intensities are not finite",
                experiment
            );
        }
    }
    let values = series
        .values
        .iter()
        .map(|per_experiment| {
            per_experiment
                .iter()
                .zip(&tic)
                .map(|(replicates, totals)| {
                    replicates
                        .iter()
                        .zip(totals)
                        .map(|(x, t)| x / t * factor)
                        .collect()
                })
                .collect()
        })
        .collect();

    Ok(IntensitySeries {
        values,
        ..series.clone()
    })
}

/// Assign consecutive columns to batches of `batch_size` samples
pub fn assign_batches(samples: usize, batch_size: usize) -> Result<Vec<usize>, CorrectionError> {
    if batch_size == 0 || samples % batch_size != 0 {
        return Err(CorrectionError::UnevenBatches {
            samples,
            batch_size,
        });
    }
    Ok((0..samples).map(|col| col / batch_size).collect())
}

/// Batch-correct the whole sample matrix, then re-extract the matched
/// analyte series from the adjusted data
pub fn batch_normalize<C, S>(
    corrector: &C,
    data: &Matrix,
    colnames: &[S],
    matched: &MatchedAnalytes,
    batch_size: usize,
) -> Result<IntensitySeries, CorrectionError>
where
    C: BatchCorrection + ?Sized,
    S: AsRef<str>,
{
    if colnames.len() != data.cols {
        return Err(CorrectionError::ShapeMismatch {
            samples: data.cols,
            labels: colnames.len(),
        });
    }
    let batches = assign_batches(data.cols, batch_size)?;
    log::info!(
        "- correcting {} peaks across {} batches of {} samples",
        data.rows,
        batches.last().map(|b| b + 1).unwrap_or_default(),
        batch_size
    );
    let adjusted = corrector.correct(data, &batches)?;
    if adjusted.shape() != data.shape() {
        return Err(CorrectionError::ShapeChanged);
    }
    Ok(IntensitySeries::build(&adjusted, colnames, matched))
}

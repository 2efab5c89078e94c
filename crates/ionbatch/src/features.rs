//! Tabular training data for the autoencoder
//!
//! The feature table is a CSV file with one row per feature: a few leading
//! metadata columns followed by one intensity column per sample. Batch labels
//! live in a second CSV file with a `batch` column, one row per sample.

use crate::ml::autoencoder::{RngStream, TrainingSettings};
use crate::ml::matrix::Matrix;
use crate::ml::scaler::RobustScaler;
use rand::seq::SliceRandom;
use std::io::Read;
use std::path::Path;

/// Leading columns of the feature table that describe the feature itself
pub const METADATA_COLUMNS: usize = 3;

#[derive(Debug)]
pub enum TableError {
    Csv(csv::Error),
    MissingColumn(String),
    Value { row: usize, column: usize, value: String },
    Ragged { row: usize, expected: usize, found: usize },
    BatchCount { samples: usize, labels: usize },
    TooFewSamples { train: usize, test: usize },
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv(e) => e.fmt(f),
            Self::MissingColumn(c) => write!(f, "missing column `{}`", c),
            Self::Value { row, column, value } => write!(
                f,
                "row {}, column {}: `{}` is not a number",
                row, column, value
            ),
            Self::Ragged {
                row,
                expected,
                found,
            } => write!(
                f,
                "row {} has {} columns, expected {}",
                row, found, expected
            ),
            Self::BatchCount { samples, labels } => write!(
                f,
                "feature table has {} samples but {} batch labels were supplied",
                samples, labels
            ),
            Self::TooFewSamples { train, test } => write!(
                f,
                "split produced {} training and {} held-out samples, both must be non-empty",
                train, test
            ),
        }
    }
}

impl std::error::Error for TableError {}

impl From<csv::Error> for TableError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

/// Samples x features intensity matrix with one batch label per sample
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureTable {
    pub samples: Vec<String>,
    pub values: Matrix,
    pub batches: Vec<String>,
}

/// Parse a features x samples CSV, dropping `metadata` leading columns, and
/// return the sample names and the transposed samples x features matrix
pub fn read_features<R: Read>(rdr: R, metadata: usize) -> Result<(Vec<String>, Matrix), TableError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(rdr);
    let samples = reader
        .headers()?
        .iter()
        .skip(metadata)
        .map(|s| s.trim().to_string())
        .collect::<Vec<_>>();
    let expected = samples.len() + metadata;

    let mut rows = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != expected {
            return Err(TableError::Ragged {
                row,
                expected,
                found: record.len(),
            });
        }
        let values = record
            .iter()
            .enumerate()
            .skip(metadata)
            .map(|(column, value)| {
                value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| TableError::Value {
                        row,
                        column,
                        value: value.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(values);
    }

    let features = Matrix::from_rows(&rows).ok_or(TableError::Ragged {
        row: 0,
        expected,
        found: 0,
    })?;
    // An empty table has no rows to infer the sample count from
    let features = match features.rows {
        0 => Matrix::zeros(0, samples.len()),
        _ => features,
    };
    Ok((samples, features.transpose()))
}

/// Read the `batch` column of a CSV file
pub fn read_batches<R: Read>(rdr: R) -> Result<Vec<String>, TableError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(rdr);
    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == "batch")
        .ok_or_else(|| TableError::MissingColumn("batch".into()))?;

    let mut batches = Vec::new();
    for record in reader.records() {
        let record = record?;
        let label = record
            .get(column)
            .ok_or_else(|| TableError::MissingColumn("batch".into()))?;
        batches.push(label.trim().to_string());
    }
    Ok(batches)
}

impl FeatureTable {
    pub fn read<P: AsRef<Path>>(features: P, batches: P) -> Result<FeatureTable, TableError> {
        let features = std::fs::File::open(features).map_err(csv::Error::from)?;
        let batches = std::fs::File::open(batches).map_err(csv::Error::from)?;
        Self::from_readers(features, batches)
    }

    pub fn from_readers<R: Read, S: Read>(features: R, batches: S) -> Result<FeatureTable, TableError> {
        let (samples, values) = read_features(features, METADATA_COLUMNS)?;
        let batches = read_batches(batches)?;
        if batches.len() != values.rows {
            return Err(TableError::BatchCount {
                samples: values.rows,
                labels: batches.len(),
            });
        }
        Ok(FeatureTable {
            samples,
            values,
            batches,
        })
    }
}

/// Shuffled, robust-scaled samples split into training and held-out sets
#[derive(Clone, Debug)]
pub struct TrainingData {
    pub scaler: RobustScaler,
    pub train: Matrix,
    pub test: Matrix,
    pub train_batches: Vec<String>,
    pub test_batches: Vec<String>,
}

impl TrainingData {
    pub fn prepare(table: &FeatureTable, settings: &TrainingSettings) -> Result<Self, TableError> {
        let n = table.values.rows;
        let split = (settings.train_fraction * n as f64).floor() as usize;
        if split == 0 || split >= n {
            return Err(TableError::TooFewSamples {
                train: split.min(n),
                test: n.saturating_sub(split),
            });
        }

        let mut order = (0..n).collect::<Vec<_>>();
        order.shuffle(&mut settings.rng(RngStream::Split));

        let shuffled = table.values.select_rows(&order);
        let (scaler, scaled) = RobustScaler::fit_transform(&shuffled);
        let batches = order
            .iter()
            .map(|&i| table.batches[i].clone())
            .collect::<Vec<_>>();

        let train_rows = (0..split).collect::<Vec<_>>();
        let test_rows = (split..n).collect::<Vec<_>>();
        log::info!(
            "- {} samples x {} features: {} train, {} held out",
            n,
            table.values.cols,
            train_rows.len(),
            test_rows.len()
        );

        Ok(TrainingData {
            scaler,
            train: scaled.select_rows(&train_rows),
            test: scaled.select_rows(&test_rows),
            train_batches: batches[..split].to_vec(),
            test_batches: batches[split..].to_vec(),
        })
    }
}

//! In-memory representation of an ion intensity experiment
//!
//! A [`Dataset`] pairs the ion annotation (names and aligned m/z labels) with
//! the sample matrix: intensities of every detected peak (rows) in every
//! sample (columns), the shared m/z axis, and one perturbation label per
//! sample. Replicates of an experiment share a label.

use crate::ml::matrix::Matrix;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub names: Vec<String>,
    pub mzs: Vec<f64>,
}

impl Annotation {
    /// Position of the first ion annotated with `name`
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Samples {
    /// Intensities, peaks x samples
    pub data: Matrix,
    /// m/z axis shared by all samples, one entry per peak
    pub mzs: Vec<f64>,
    /// Perturbation (experiment) label of each sample
    pub names: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub annotation: Annotation,
    pub samples: Samples,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetError {
    AnnotationLength { names: usize, mzs: usize },
    AxisLength { peaks: usize, axis: usize },
    LabelCount { samples: usize, labels: usize },
    UnsortedAxis { index: usize },
    MzLabel(String),
}

impl std::fmt::Display for DatasetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AnnotationLength { names, mzs } => write!(
                f,
                "annotation has {} names but {} m/z labels",
                names, mzs
            ),
            Self::AxisLength { peaks, axis } => write!(
                f,
                "sample matrix has {} peaks but the m/z axis has {} entries",
                peaks, axis
            ),
            Self::LabelCount { samples, labels } => write!(
                f,
                "sample matrix has {} samples but {} perturbation labels",
                samples, labels
            ),
            Self::UnsortedAxis { index } => {
                write!(f, "m/z axis is not sorted at position {}", index)
            }
            Self::MzLabel(label) => write!(f, "invalid m/z label `{}`", label),
        }
    }
}

impl std::error::Error for DatasetError {}

impl Dataset {
    /// Check the shape invariants between annotation, axis, matrix and labels
    pub fn validate(&self) -> Result<(), DatasetError> {
        let Annotation { names, mzs } = &self.annotation;
        if names.len() != mzs.len() {
            return Err(DatasetError::AnnotationLength {
                names: names.len(),
                mzs: mzs.len(),
            });
        }

        let samples = &self.samples;
        if samples.data.rows != samples.mzs.len() {
            return Err(DatasetError::AxisLength {
                peaks: samples.data.rows,
                axis: samples.mzs.len(),
            });
        }
        if samples.data.cols != samples.names.len() {
            return Err(DatasetError::LabelCount {
                samples: samples.data.cols,
                labels: samples.names.len(),
            });
        }
        if let Some(index) = samples.mzs.windows(2).position(|w| w[1] < w[0]) {
            return Err(DatasetError::UnsortedAxis { index: index + 1 });
        }
        Ok(())
    }

    pub fn peaks(&self) -> usize {
        self.samples.data.rows
    }

    pub fn sample_count(&self) -> usize {
        self.samples.data.cols
    }
}

/// Strip padding from a fixed-width byte string label
pub fn decode_label(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

/// Parse an aligned m/z label such as `mz147.0764`
pub fn parse_mz_label(label: &str) -> Result<f64, DatasetError> {
    let trimmed = label.trim();
    trimmed
        .strip_prefix("mz")
        .unwrap_or(trimmed)
        .parse::<f64>()
        .map_err(|_| DatasetError::MzLabel(label.to_string()))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Hdf5,
    Json,
}

impl FileFormat {
    /// Guess the on-disk format from the file extension
    pub fn infer<P: AsRef<Path>>(path: P) -> Option<FileFormat> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "h5" | "hdf5" | "hdf" => Some(FileFormat::Hdf5),
            "json" => Some(FileFormat::Json),
            _ => None,
        }
    }
}

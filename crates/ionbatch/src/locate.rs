//! Nearest-peak lookup of named analytes on a sorted m/z axis

use crate::dataset::Annotation;
use crate::mass::{ppm_error, Analyte, Tolerance};

#[derive(Debug, Clone, PartialEq)]
pub enum LocateError {
    EmptyAxis,
    /// Neither neighbor of the search position is within tolerance
    OutOfTolerance {
        target: f64,
        /// Absent when the target lies at or below the first axis point
        previous_ppm: Option<f64>,
        next_ppm: f64,
    },
}

impl std::fmt::Display for LocateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyAxis => write!(f, "cannot locate a peak on an empty m/z axis"),
            Self::OutOfTolerance {
                target,
                previous_ppm: Some(prev),
                next_ppm,
            } => write!(
                f,
                "no peak within tolerance of m/z {}: neighbors deviate by {:.2} and {:.2} ppm",
                target, prev, next_ppm
            ),
            Self::OutOfTolerance {
                target,
                previous_ppm: None,
                next_ppm,
            } => write!(
                f,
                "no peak within tolerance of m/z {}: first peak deviates by {:.2} ppm",
                target, next_ppm
            ),
        }
    }
}

impl std::error::Error for LocateError {}

/// Return the index of the axis point closest (in ppm) to `target`
///
/// Only the two points surrounding the insertion position of `target` are
/// considered: the last point below it and the first point not below it. If
/// `target` lies beyond the end of the axis, the last two points are used.
/// Ties resolve to the lower index.
///
/// # Invariants
/// * `axis` must be sorted in ascending order
pub fn closest_index(axis: &[f64], target: f64, tolerance: Tolerance) -> Result<usize, LocateError> {
    if axis.is_empty() {
        return Err(LocateError::EmptyAxis);
    }

    let next = axis.partition_point(|&mz| mz < target).min(axis.len() - 1);
    let next_ppm = ppm_error(axis[next], target);

    if next == 0 {
        return match tolerance.contains(target, axis[0]) {
            true => Ok(0),
            false => Err(LocateError::OutOfTolerance {
                target,
                previous_ppm: None,
                next_ppm,
            }),
        };
    }

    let prev = next - 1;
    let prev_ppm = ppm_error(axis[prev], target);
    let (best, _) = match prev_ppm <= next_ppm {
        true => (prev, prev_ppm),
        false => (next, next_ppm),
    };

    if tolerance.contains(target, axis[best]) {
        Ok(best)
    } else {
        Err(LocateError::OutOfTolerance {
            target,
            previous_ppm: Some(prev_ppm),
            next_ppm,
        })
    }
}

/// Analytes found on the m/z axis, in reference order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchedAnalytes {
    pub names: Vec<String>,
    /// Row of the sample matrix holding each analyte
    pub indices: Vec<usize>,
}

impl MatchedAnalytes {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.indices.iter().copied())
    }
}

/// An annotated analyte that could not be placed on the axis
#[derive(Debug, Clone, PartialEq)]
pub struct UnmatchedAnalyte {
    pub name: String,
    pub error: LocateError,
}

impl std::fmt::Display for UnmatchedAnalyte {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.error)
    }
}

impl std::error::Error for UnmatchedAnalyte {}

/// Locate every reference analyte present in the annotation
///
/// Analytes are looked up by exact name and placed using the aligned m/z of
/// the annotation. Names missing from the annotation are skipped; an analyte
/// that is annotated but has no peak within tolerance is an error.
pub fn locate_analytes(
    annotation: &Annotation,
    axis: &[f64],
    analytes: &[Analyte],
    tolerance: Tolerance,
) -> Result<MatchedAnalytes, UnmatchedAnalyte> {
    let mut matched = MatchedAnalytes::default();
    for analyte in analytes {
        let Some(position) = annotation.position(&analyte.name) else {
            log::warn!("- {} is not present in the ion annotation", analyte.name);
            continue;
        };

        let mz = annotation.mzs[position];
        let index = closest_index(axis, mz, tolerance).map_err(|error| UnmatchedAnalyte {
            name: analyte.name.clone(),
            error,
        })?;
        log::trace!(
            "- {}: m/z {} matched peak {} ({:.3} ppm)",
            analyte.name,
            mz,
            index,
            ppm_error(axis[index], mz)
        );
        matched.names.push(analyte.name.clone());
        matched.indices.push(index);
    }
    Ok(matched)
}

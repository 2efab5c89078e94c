//! Per-analyte intensity series grouped by experiment

use crate::locate::MatchedAnalytes;
use crate::ml::matrix::Matrix;

/// Distinct experiment labels, in order of first appearance
pub fn experiment_ids<S: AsRef<str>>(colnames: &[S]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for name in colnames {
        let name = name.as_ref();
        if !ids.iter().any(|id| id == name) {
            ids.push(name.to_string());
        }
    }
    ids
}

#[derive(Clone, Debug, PartialEq)]
pub struct IntensitySeries {
    pub analytes: Vec<String>,
    pub experiments: Vec<String>,
    /// Sample matrix columns holding the replicates of each experiment
    pub columns: Vec<Vec<usize>>,
    /// Intensities indexed `[analyte][experiment][replicate]`
    pub values: Vec<Vec<Vec<f64>>>,
}

impl IntensitySeries {
    /// Extract the intensities of every matched analyte from a peaks x samples
    /// matrix, grouping replicate columns by their experiment label
    ///
    /// # Panics
    /// * Panics if `colnames` does not have one label per column of `data`
    pub fn build<S: AsRef<str>>(data: &Matrix, colnames: &[S], matched: &MatchedAnalytes) -> Self {
        assert_eq!(
            data.cols,
            colnames.len(),
            "sample matrix and column labels must agree"
        );
        let experiments = experiment_ids(colnames);
        let columns = experiments
            .iter()
            .map(|exp| {
                colnames
                    .iter()
                    .enumerate()
                    .filter(|(_, name)| name.as_ref() == exp)
                    .map(|(col, _)| col)
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let values = matched
            .indices
            .iter()
            .map(|&peak| {
                let row = data.row_slice(peak);
                columns
                    .iter()
                    .map(|cols| cols.iter().map(|&c| row[c]).collect())
                    .collect()
            })
            .collect();

        IntensitySeries {
            analytes: matched.names.clone(),
            experiments,
            columns,
            values,
        }
    }

    /// Replicate intensities of `analyte` in `experiment`
    pub fn get(&self, analyte: &str, experiment: &str) -> Option<&[f64]> {
        let a = self.analytes.iter().position(|x| x == analyte)?;
        let e = self.experiments.iter().position(|x| x == experiment)?;
        Some(&self.values[a][e])
    }

    /// Flatten into `(analyte, experiment, replicate, sample column, intensity)`
    pub fn records(&self) -> impl Iterator<Item = (&str, &str, usize, usize, f64)> + '_ {
        self.analytes
            .iter()
            .zip(&self.values)
            .flat_map(move |(analyte, per_experiment)| {
                self.experiments
                    .iter()
                    .zip(&self.columns)
                    .zip(per_experiment)
                    .flat_map(move |((experiment, cols), replicates)| {
                        cols.iter().zip(replicates).enumerate().map(
                            move |(replicate, (&col, &value))| {
                                (
                                    analyte.as_str(),
                                    experiment.as_str(),
                                    replicate,
                                    col,
                                    value,
                                )
                            },
                        )
                    })
            })
    }

    pub fn len(&self) -> usize {
        self.values.iter().flatten().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

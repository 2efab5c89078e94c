//! Exploratory analysis of analyte intensities across experiments

use crate::dataset::Dataset;
use crate::intensity::IntensitySeries;
use crate::locate::{locate_analytes, MatchedAnalytes};
use crate::mass::{amino_acids, Analyte, Tolerance};
use crate::ml::combat::ComBat;
use crate::normalize::{batch_normalize, tic_normalize, BatchCorrection, TicScope};
use crate::Error;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Maximum deviation between an annotated m/z and its matched peak
    pub tolerance: Tolerance,
    pub tic_scaling_factor: f64,
    pub tic_scope: TicScope,
    /// Samples per batch for batch correction
    pub replicates: usize,
    /// Separator between experiment label and column index in sample names
    pub experiment_delimiter: String,
    pub analytes: Vec<Analyte>,
    pub combat: ComBat,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::default(),
            tic_scaling_factor: 1E6,
            tic_scope: TicScope::default(),
            replicates: 3,
            experiment_delimiter: "#".into(),
            analytes: amino_acids(),
            combat: ComBat::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisResults {
    pub matched: MatchedAnalytes,
    pub raw: IntensitySeries,
    pub tic: IntensitySeries,
    pub corrected: IntensitySeries,
}

/// Locate the analytes, extract their intensity series and normalize them
/// with both TIC scaling and `corrector`
pub fn run<C: BatchCorrection + ?Sized>(
    dataset: &Dataset,
    settings: &AnalysisSettings,
    corrector: &C,
) -> Result<AnalysisResults, Error> {
    dataset.validate()?;
    let samples = &dataset.samples;

    let matched = locate_analytes(
        &dataset.annotation,
        &samples.mzs,
        &settings.analytes,
        settings.tolerance,
    )?;
    log::info!(
        "- located {}/{} analytes on {} peaks",
        matched.len(),
        settings.analytes.len(),
        samples.mzs.len()
    );

    let raw = IntensitySeries::build(&samples.data, &samples.names, &matched);
    log::info!(
        "- {} samples across {} experiments",
        samples.names.len(),
        raw.experiments.len()
    );

    let tic = tic_normalize(
        &samples.data,
        &raw,
        settings.tic_scaling_factor,
        settings.tic_scope,
    )?;
    let corrected = batch_normalize(
        corrector,
        &samples.data,
        &samples.names,
        &matched,
        settings.replicates,
    )?;

    Ok(AnalysisResults {
        matched,
        raw,
        tic,
        corrected,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dataset::{Annotation, Samples};
    use crate::ml::matrix::Matrix;
    use crate::normalize::CorrectionError;

    /// Leaves the data untouched
    struct Identity;

    impl BatchCorrection for Identity {
        fn correct(&self, data: &Matrix, _: &[usize]) -> Result<Matrix, CorrectionError> {
            Ok(data.clone())
        }
    }

    fn dataset() -> Dataset {
        #[rustfmt::skip]
        let data = Matrix::new([
            1., 2., 3., 4.,
            10., 10., 10., 10.,
            5., 6., 7., 8.,
        ], 3, 4);
        Dataset {
            annotation: Annotation {
                names: vec!["Serine".into(), "Glycine".into()],
                mzs: vec![104.0353, 74.0248],
            },
            samples: Samples {
                data,
                mzs: vec![74.0249, 90.0, 104.0352],
                names: vec!["ctrl".into(), "ctrl".into(), "drug".into(), "drug".into()],
            },
        }
    }

    #[test]
    fn defaults() {
        let settings = AnalysisSettings::default();
        assert_eq!(settings.tolerance, Tolerance::Ppm(-10.0, 10.0));
        assert_eq!(settings.tic_scaling_factor, 1E6);
        assert_eq!(settings.tic_scope, TicScope::Experiment);
        assert_eq!(settings.replicates, 3);
        assert_eq!(settings.experiment_delimiter, "#");
        assert_eq!(settings.analytes.len(), 20);
    }

    #[test]
    fn pipeline() {
        let settings = AnalysisSettings {
            replicates: 2,
            ..Default::default()
        };
        let results = run(&dataset(), &settings, &Identity).unwrap();

        // Reference order, not annotation order
        assert_eq!(results.matched.names, vec!["Glycine", "Serine"]);
        assert_eq!(results.matched.indices, vec![0, 2]);
        assert_eq!(results.raw.experiments, vec!["ctrl", "drug"]);
        assert_eq!(results.raw.get("Serine", "drug"), Some(&[7.0, 8.0][..]));
        assert_eq!(results.corrected, results.raw);

        // ctrl: 16 + 18 = 34
        let glycine = results.tic.get("Glycine", "ctrl").unwrap();
        assert!((glycine[0] - 1E6 / 34.0).abs() < 1E-6);
    }

    #[test]
    fn errors() {
        let mut invalid = dataset();
        invalid.samples.names.pop();
        assert!(matches!(
            run(&invalid, &AnalysisSettings::default(), &Identity),
            Err(Error::Dataset(_))
        ));

        let settings = AnalysisSettings {
            replicates: 3,
            ..Default::default()
        };
        assert!(matches!(
            run(&dataset(), &settings, &Identity),
            Err(Error::Correction(CorrectionError::UnevenBatches { .. }))
        ));

        let mut shifted = dataset();
        shifted.annotation.mzs[0] = 104.5;
        match run(&shifted, &AnalysisSettings::default(), &Identity) {
            Err(Error::Unmatched(e)) => assert_eq!(e.name, "Serine"),
            other => panic!("unexpected result: {:?}", other.map(|r| r.matched)),
        }
    }
}

//! End-to-end runs of both pipelines on synthetic data

use ionbatch_core::analysis::{run, AnalysisSettings};
use ionbatch_core::dataset::{Annotation, Dataset, Samples};
use ionbatch_core::features::{FeatureTable, TrainingData};
use ionbatch_core::mass::amino_acids;
use ionbatch_core::ml::autoencoder::{evaluate, Autoencoder, RngStream, Trainer, TrainingSettings};
use ionbatch_core::ml::combat::ComBat;
use ionbatch_core::ml::matrix::Matrix;
use ionbatch_core::normalize::total_ion_current;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EXPERIMENTS: [&str; 4] = ["control", "drug_a", "drug_b", "drug_c"];
const REPLICATES: usize = 3;

/// Amino acid peaks interleaved with unannotated filler peaks, measured in
/// four experiments with a multiplicative batch effect per experiment
fn synthetic(rng: &mut StdRng) -> Dataset {
    let reference = amino_acids();
    let annotated = ["Glycine", "Alanine", "Serine", "Proline", "Valine", "Lysine"];

    let mut axis = reference
        .iter()
        .filter(|a| annotated.contains(&a.name.as_str()))
        .map(|a| a.mz * (1.0 + 2E-6))
        .collect::<Vec<_>>();
    axis.extend((0..24).map(|i| 60.0 + i as f64 * 7.3));
    axis.sort_by(|a, b| a.total_cmp(b));

    let samples = EXPERIMENTS.len() * REPLICATES;
    let mut data = Matrix::zeros(axis.len(), samples);
    for peak in 0..axis.len() {
        let level = rng.gen_range(1E3..1E5);
        for col in 0..samples {
            let batch = 1.0 + 0.3 * (col / REPLICATES) as f64;
            data[(peak, col)] = level * batch * rng.gen_range(0.8..1.2);
        }
    }

    let names = EXPERIMENTS
        .iter()
        .flat_map(|e| std::iter::repeat(e.to_string()).take(REPLICATES))
        .collect();

    let (annotated_names, annotated_mzs): (Vec<String>, Vec<f64>) = reference
        .iter()
        .filter(|a| annotated.contains(&a.name.as_str()))
        .map(|a| (a.name.clone(), a.mz))
        .unzip();

    Dataset {
        annotation: Annotation {
            names: annotated_names,
            mzs: annotated_mzs,
        },
        samples: Samples {
            data,
            mzs: axis,
            names,
        },
    }
}

#[test]
fn exploratory_analysis() {
    let mut rng = StdRng::seed_from_u64(17);
    let dataset = synthetic(&mut rng);
    let settings = AnalysisSettings::default();
    let results = run(&dataset, &settings, &settings.combat).expect("analysis failed");

    assert_eq!(results.matched.len(), 6);
    assert_eq!(results.raw.experiments, EXPERIMENTS);
    for (name, index) in results.matched.iter() {
        let mz = dataset.annotation.mzs[dataset.annotation.position(name).unwrap()];
        assert!((dataset.samples.mzs[index] - mz).abs() / mz < 1E-5);
        let raw = results.raw.get(name, "drug_b").unwrap();
        assert_eq!(raw, &dataset.samples.data.row_slice(index)[6..9]);
    }

    let totals = total_ion_current(&dataset.samples.data, &results.raw, settings.tic_scope);
    for (raw, tic) in results.raw.values.iter().zip(&results.tic.values) {
        for (e, (r, t)) in raw.iter().zip(tic).enumerate() {
            for (k, (x, y)) in r.iter().zip(t).enumerate() {
                let back = y * totals[e][k] / settings.tic_scaling_factor;
                assert!((back - x).abs() / x < 1E-12);
            }
        }
    }

    assert_eq!(results.corrected.len(), results.raw.len());
    assert!(results
        .corrected
        .values
        .iter()
        .flatten()
        .flatten()
        .all(|x| x.is_finite()));
}

#[test]
fn uneven_batches_are_rejected() {
    let mut rng = StdRng::seed_from_u64(3);
    let dataset = synthetic(&mut rng);
    let settings = AnalysisSettings {
        replicates: 5,
        ..Default::default()
    };
    assert!(run(&dataset, &settings, &ComBat::default()).is_err());
}

#[test]
fn out_of_tolerance_aborts() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut dataset = synthetic(&mut rng);
    dataset.annotation.mzs[0] += 0.5;
    let err = run(&dataset, &AnalysisSettings::default(), &ComBat::default()).unwrap_err();
    assert!(err.to_string().starts_with(&dataset.annotation.names[0]));
}

#[test]
fn unsupported_extension() {
    assert!(ionbatch_core::read_dataset("intensities.csv").is_err());
}

#[test]
fn json_dataset() {
    let mut rng = StdRng::seed_from_u64(23);
    let dataset = synthetic(&mut rng);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dataset.json");
    std::fs::write(&path, serde_json::to_string(&dataset).unwrap()).unwrap();
    let loaded = ionbatch_core::read_dataset(&path).unwrap();
    assert_eq!(loaded.annotation.names, dataset.annotation.names);
    assert_eq!(loaded.samples.names, dataset.samples.names);
    assert!(loaded.samples.data.is_close(&dataset.samples.data, 1E-6));
}

#[test]
fn autoencoder_training() {
    let mut rng = StdRng::seed_from_u64(31);
    let samples = 40;
    let mut features = String::from("mz,rt,name");
    for s in 0..samples {
        features.push_str(&format!(",s{}", s));
    }
    features.push('\n');
    for f in 0..6 {
        features.push_str(&format!("{},1.0,ion{}", 100 + f, f));
        for _ in 0..samples {
            features.push_str(&format!(",{}", rng.gen_range(1E3..2E3) * (f + 1) as f64));
        }
        features.push('\n');
    }
    let mut batches = String::from("sample,batch\n");
    for s in 0..samples {
        batches.push_str(&format!("s{},{}\n", s, s / 10));
    }

    let table = FeatureTable::from_readers(features.as_bytes(), batches.as_bytes()).unwrap();
    let settings = TrainingSettings {
        latent_dim: 4,
        epochs: 20,
        batch_size: 8,
        ..Default::default()
    };
    let data = TrainingData::prepare(&table, &settings).unwrap();
    assert_eq!(data.train.rows, 28);
    assert_eq!(data.test.rows, 12);

    let mut model = Autoencoder::new(6, settings.latent_dim, &mut settings.rng(RngStream::Init));
    let history = Trainer::new(&settings).fit(&mut model, &data.train, &data.test, |_| {});
    assert_eq!(history.len(), 20);
    assert!(history.iter().all(|e| e.loss.is_finite() && e.test_loss.is_finite()));

    let decoded = model.decode(&model.encode(&data.test));
    assert_eq!(decoded.shape(), data.test.shape());
    assert!(evaluate(&model, &data.test, 8).is_finite());
}

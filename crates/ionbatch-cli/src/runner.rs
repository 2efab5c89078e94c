use super::input::{Explore, Train};
use anyhow::Context;
use ionbatch_core::analysis::{self, AnalysisResults};
use ionbatch_core::features::{FeatureTable, TrainingData};
use ionbatch_core::ml::autoencoder::{mse, Autoencoder, RngStream, Trainer};
use ionbatch_core::ml::matrix::Matrix;
use log::info;
use std::path::{Path, PathBuf};
use std::time::Instant;

// Create a path for `file_name` in the output directory
fn make_path<S: AsRef<str>>(directory: &Path, file_name: S) -> PathBuf {
    directory.join(file_name.as_ref())
}

pub struct ExploreRunner {
    pub parameters: Explore,
    start: Instant,
}

impl ExploreRunner {
    pub fn new(parameters: Explore) -> Self {
        Self {
            parameters,
            start: Instant::now(),
        }
    }

    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        make_path(&self.parameters.output_directory, file_name)
    }

    pub fn analyze(&self) -> anyhow::Result<AnalysisResults> {
        let dataset = ionbatch_core::read_dataset(&self.parameters.input)
            .with_context(|| format!("Failed to read dataset from `{}`", self.parameters.input))?;
        info!(
            "- loaded {} peaks x {} samples from {}",
            dataset.peaks(),
            dataset.sample_count(),
            self.parameters.input
        );

        let settings = &self.parameters.analysis;
        let results = analysis::run(&dataset, settings, &settings.combat)?;
        info!("- analysis: {:8} ms", self.start.elapsed().as_millis());
        Ok(results)
    }

    pub fn run(mut self) -> anyhow::Result<Explore> {
        let results = self.analyze()?;

        for (file_name, series) in [
            ("raw.tsv", &results.raw),
            ("tic.tsv", &results.tic),
            ("combat.tsv", &results.corrected),
        ] {
            let path = self.write_series(file_name, series)?;
            self.parameters.output_paths.push(path);
        }

        let path = self.make_path("parameters.json");
        self.parameters
            .output_paths
            .push(path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);

        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)?;

        info!("finished in {}s", self.start.elapsed().as_secs());
        Ok(self.parameters)
    }
}

pub struct TrainRunner {
    pub parameters: Train,
    start: Instant,
}

impl TrainRunner {
    pub fn new(parameters: Train) -> Self {
        Self {
            parameters,
            start: Instant::now(),
        }
    }

    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        make_path(&self.parameters.output_directory, file_name)
    }

    pub fn run(mut self) -> anyhow::Result<Train> {
        let settings = self.parameters.training.clone();
        let table = FeatureTable::read(&self.parameters.features, &self.parameters.batches)
            .with_context(|| {
                format!(
                    "Failed to read training data from `{}` and `{}`",
                    self.parameters.features, self.parameters.batches
                )
            })?;
        let data = TrainingData::prepare(&table, &settings)?;

        let mut model = Autoencoder::new(
            table.values.cols,
            settings.latent_dim,
            &mut settings.rng(RngStream::Init),
        );
        info!("{}", model);
        info!("- total number of parameters: {}", model.parameter_count());

        let history = Trainer::new(&settings).fit(&mut model, &data.train, &data.test, |epoch| {
            println!("{}", epoch)
        });
        info!("- training: {:8} ms", self.start.elapsed().as_millis());

        let encoded = model.encode(&data.test);
        let decoded = model.decode(&encoded);
        info!(
            "- held-out reconstruction error: {:.6} ({} samples, latent dimension {})",
            mse(&decoded, &data.test),
            data.test.rows,
            encoded.cols
        );

        let path = self.write_losses(&history)?;
        self.parameters.output_paths.push(path);

        let reconstruction: Matrix = data.scaler.inverse_transform(&decoded);
        let path = self.write_reconstruction(&reconstruction, &data.test_batches)?;
        self.parameters.output_paths.push(path);

        let path = self.make_path("parameters.json");
        self.parameters
            .output_paths
            .push(path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);

        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)?;

        info!("finished in {}s", self.start.elapsed().as_secs());
        Ok(self.parameters)
    }
}

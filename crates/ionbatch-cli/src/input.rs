use anyhow::{ensure, Context};
use clap::ArgMatches;
use ionbatch_core::analysis::AnalysisSettings;
use ionbatch_core::mass::{Analyte, Tolerance};
use ionbatch_core::ml::autoencoder::TrainingSettings;
use ionbatch_core::ml::combat::ComBat;
use ionbatch_core::normalize::TicScope;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize)]
/// Actual exploratory analysis parameters - may include overrides or default values not set by user
pub struct Explore {
    pub version: String,
    pub input: String,
    pub analysis: AnalysisSettings,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Serialize)]
/// Actual training parameters - may include overrides or default values not set by user
pub struct Train {
    pub version: String,
    pub features: String,
    pub batches: String,
    pub training: TrainingSettings,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct ComBatOptions {
    mean_only: Option<bool>,
    convergence: Option<f64>,
    max_iterations: Option<usize>,
}

impl From<ComBatOptions> for ComBat {
    fn from(value: ComBatOptions) -> ComBat {
        let default = ComBat::default();
        let settings = ComBat {
            mean_only: value.mean_only.unwrap_or(default.mean_only),
            convergence: value.convergence.unwrap_or(default.convergence).abs(),
            max_iterations: value.max_iterations.unwrap_or(default.max_iterations),
        };
        if settings.convergence > 1E-2 {
            log::warn!("combat.convergence is higher than expected");
        }
        settings
    }
}

#[derive(Deserialize, Default)]
/// Input exploratory analysis parameters deserialized from JSON file
pub struct ExploreInput {
    input: Option<String>,
    tolerance: Option<Tolerance>,
    tic_scaling_factor: Option<f64>,
    tic_scope: Option<TicScope>,
    replicates: Option<usize>,
    experiment_delimiter: Option<String>,
    analytes: Option<Vec<Analyte>>,
    combat: Option<ComBatOptions>,
    output_directory: Option<String>,
}

#[derive(Deserialize, Default)]
/// Input training parameters deserialized from JSON file
pub struct TrainInput {
    features: Option<String>,
    batches: Option<String>,
    latent_dim: Option<usize>,
    epochs: Option<usize>,
    batch_size: Option<usize>,
    learning_rate: Option<f64>,
    train_fraction: Option<f64>,
    seed: Option<u64>,
    output_directory: Option<String>,
}

fn parameters_path(matches: &ArgMatches) -> anyhow::Result<&String> {
    matches
        .get_one::<String>("parameters")
        .context("a path to the configuration parameters is required")
}

fn output_directory(path: Option<String>) -> anyhow::Result<PathBuf> {
    match path {
        Some(path) => {
            let path = PathBuf::from(path);
            std::fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create `{}`", path.display()))?;
            Ok(path)
        }
        None => Ok(std::env::current_dir()?),
    }
}

fn check_tolerance(tolerance: &Tolerance) {
    let (lo, hi) = match tolerance {
        Tolerance::Ppm(lo, hi) => (lo, hi),
        Tolerance::Da(lo, hi) => (lo, hi),
    };
    if lo > hi {
        log::warn!(
            "Lower tolerance bound is greater than the upper bound, no peak will match: [{} - {}]",
            lo,
            hi
        );
    }
}

impl ExploreInput {
    pub fn from_arguments(matches: &ArgMatches) -> anyhow::Result<Self> {
        let path = parameters_path(matches)?;
        let mut input = ExploreInput::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(path) = matches.get_one::<String>("input") {
            log::trace!("overriding `input` parameter.");
            input.input = Some(path.into());
        }

        ensure!(
            input.input.is_some(),
            "`input` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        ionbatch_core::read_json(path.as_ref()).map_err(anyhow::Error::from)
    }

    pub fn build(self) -> anyhow::Result<Explore> {
        let default = AnalysisSettings::default();
        let analysis = AnalysisSettings {
            tolerance: self.tolerance.unwrap_or(default.tolerance),
            tic_scaling_factor: self.tic_scaling_factor.unwrap_or(default.tic_scaling_factor),
            tic_scope: self.tic_scope.unwrap_or(default.tic_scope),
            replicates: self.replicates.unwrap_or(default.replicates),
            experiment_delimiter: self
                .experiment_delimiter
                .unwrap_or(default.experiment_delimiter),
            analytes: self.analytes.unwrap_or(default.analytes),
            combat: self.combat.map(Into::into).unwrap_or(default.combat),
        };

        check_tolerance(&analysis.tolerance);
        ensure!(analysis.replicates > 0, "`replicates` must be at least 1");
        ensure!(
            analysis.tic_scaling_factor > 0.0,
            "`tic_scaling_factor` must be positive"
        );
        if analysis.analytes.is_empty() {
            log::warn!("no analytes configured, intensity series will be empty");
        }

        let input = self
            .input
            .context("`input` must be set. For more information try '--help'")?;

        Ok(Explore {
            version: clap::crate_version!().into(),
            input,
            analysis,
            output_paths: Vec::new(),
            output_directory: output_directory(self.output_directory)?,
        })
    }
}

impl TrainInput {
    pub fn from_arguments(matches: &ArgMatches) -> anyhow::Result<Self> {
        let path = parameters_path(matches)?;
        let mut input = TrainInput::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(path) = matches.get_one::<String>("features") {
            log::trace!("overriding `features` parameter.");
            input.features = Some(path.into());
        }
        if let Some(path) = matches.get_one::<String>("batches") {
            log::trace!("overriding `batches` parameter.");
            input.batches = Some(path.into());
        }
        if let Some(epochs) = matches.get_one::<usize>("epochs").copied() {
            log::trace!("overriding `epochs` parameter.");
            input.epochs = Some(epochs);
        }

        ensure!(
            input.features.is_some(),
            "`features` must be set. For more information try '--help'"
        );
        ensure!(
            input.batches.is_some(),
            "`batches` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        ionbatch_core::read_json(path.as_ref()).map_err(anyhow::Error::from)
    }

    pub fn build(self) -> anyhow::Result<Train> {
        let default = TrainingSettings::default();
        let training = TrainingSettings {
            latent_dim: self.latent_dim.unwrap_or(default.latent_dim),
            epochs: self.epochs.unwrap_or(default.epochs),
            batch_size: self.batch_size.unwrap_or(default.batch_size),
            learning_rate: self.learning_rate.unwrap_or(default.learning_rate),
            train_fraction: self.train_fraction.unwrap_or(default.train_fraction),
            seed: self.seed.unwrap_or(default.seed),
        };

        ensure!(training.latent_dim > 0, "`latent_dim` must be at least 1");
        ensure!(training.batch_size > 0, "`batch_size` must be at least 1");
        ensure!(
            training.learning_rate > 0.0,
            "`learning_rate` must be positive"
        );
        ensure!(
            training.train_fraction > 0.0 && training.train_fraction < 1.0,
            "`train_fraction` must be between 0 and 1"
        );
        if training.epochs == 0 {
            log::warn!("`epochs` is 0, the model will not be trained");
        }

        let features = self
            .features
            .context("`features` must be set. For more information try '--help'")?;
        let batches = self
            .batches
            .context("`batches` must be set. For more information try '--help'")?;

        Ok(Train {
            version: clap::crate_version!().into(),
            features,
            batches,
            training,
            output_paths: Vec::new(),
            output_directory: output_directory(self.output_directory)?,
        })
    }
}

use clap::{value_parser, Arg, ArgMatches, Command, ValueHint};
use ionbatch_cli::input::{ExploreInput, TrainInput};
use ionbatch_cli::runner::{ExploreRunner, TrainRunner};

fn parameters() -> Arg {
    Arg::new("parameters")
        .required(true)
        .value_parser(clap::builder::NonEmptyStringValueParser::new())
        .help("Path to configuration parameters (JSON file)")
        .value_hint(ValueHint::FilePath)
}

fn output_directory() -> Arg {
    Arg::new("output_directory")
        .short('o')
        .long("output_directory")
        .value_parser(clap::builder::NonEmptyStringValueParser::new())
        .help(
            "Path where results will be written. \
             Overrides the directory specified in the configuration file.",
        )
        .value_hint(ValueHint::DirPath)
}

fn explore(matches: &ArgMatches) -> anyhow::Result<()> {
    let explore = ExploreInput::from_arguments(matches)?.build()?;
    ExploreRunner::new(explore).run()?;
    Ok(())
}

fn train(matches: &ArgMatches) -> anyhow::Result<()> {
    let train = TrainInput::from_arguments(matches)?.build()?;
    TrainRunner::new(train).run()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("IONBATCH_LOG", "error,ionbatch=info"))
        .init();

    let matches = Command::new("ionbatch")
        .version(clap::crate_version!())
        .author(clap::crate_authors!())
        .about("Batch-effect exploration and autoencoder training for mass spectrometry intensities")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("explore")
                .about(
                    "Locate amino acid peaks, then compare raw, TIC-normalized and \
                     ComBat-corrected intensities across experiments",
                )
                .arg(parameters())
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .value_parser(clap::builder::NonEmptyStringValueParser::new())
                        .help(
                            "Path to the dataset (.h5, .hdf5 or .json). Overrides the \
                             input specified in the configuration file.",
                        )
                        .value_hint(ValueHint::FilePath),
                )
                .arg(output_directory()),
        )
        .subcommand(
            Command::new("train")
                .about("Train an autoencoder to reconstruct robust-scaled intensity profiles")
                .arg(parameters())
                .arg(
                    Arg::new("features")
                        .long("features")
                        .value_parser(clap::builder::NonEmptyStringValueParser::new())
                        .help(
                            "Path to the feature table (CSV). Overrides the \
                             file specified in the configuration file.",
                        )
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("batches")
                        .long("batches")
                        .value_parser(clap::builder::NonEmptyStringValueParser::new())
                        .help(
                            "Path to the batch labels (CSV with a `batch` column). \
                             Overrides the file specified in the configuration file.",
                        )
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("epochs")
                        .long("epochs")
                        .value_parser(value_parser!(usize))
                        .help("Number of training epochs")
                        .value_hint(ValueHint::Other),
                )
                .arg(output_directory()),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Written by {author-with-newline}Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    match matches.subcommand() {
        Some(("explore", matches)) => explore(matches),
        Some(("train", matches)) => train(matches),
        _ => unreachable!("a subcommand is required"),
    }
}

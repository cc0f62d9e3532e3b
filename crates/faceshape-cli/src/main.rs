use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};
use log::LevelFilter;
use std::path::PathBuf;

use faceshape_cli::train::input::TrainConfig;
use faceshape_cli::train::trainer;

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("FACESHAPE_LOG", "error,faceshape=info"))
        .init();

    let matches = Command::new("faceshape")
        .version(clap::crate_version!())
        .about("Face shape classification from facial landmarks")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            pipeline_args(
                Command::new("train")
                    .about("Build the dataset, select a model and evaluate it on a held-out split"),
            )
            .arg(
                Arg::new("output_dir")
                    .short('o')
                    .long("output")
                    .value_parser(clap::builder::NonEmptyStringValueParser::new())
                    .help(
                        "Directory the metrics and confusion matrix are written to. \
                         Overrides the directory specified in the configuration file.",
                    )
                    .value_hint(ValueHint::DirPath),
            )
            .arg(
                Arg::new("no_report")
                    .long("no-report")
                    .help("Log the metrics without writing report files.")
                    .action(ArgAction::SetTrue),
            ),
        )
        .subcommand(pipeline_args(
            Command::new("scan")
                .about("Build the dataset only and summarize kept and skipped images"),
        ))
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    match matches.subcommand() {
        Some(("train", sub_m)) => handle_train(sub_m),
        Some(("scan", sub_m)) => handle_scan(sub_m),
        _ => unreachable!("Subcommand is required by CLI configuration"),
    }
}

/// Arguments shared by every subcommand that builds a dataset.
fn pipeline_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("config")
                .help("Path to JSON configuration file")
                .required(false)
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("corpus")
                .short('c')
                .long("corpus")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Corpus root with one subdirectory per face shape. \
                     Overrides the corpus specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("model")
                .short('m')
                .long("model")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to the ONNX face mesh landmark model (*.onnx)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("face_model")
                .long("face-model")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to an ONNX SCRFD face box model (*.onnx). Faces are cropped \
                     before the landmark model runs; without it the whole image is used.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("schema")
                .long("schema")
                .help("Landmark layout produced by the model.")
                .value_parser(["face-mesh", "face-landmarker"])
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .help("Number of worker threads. Defaults to all cores.")
                .value_parser(clap::value_parser!(usize)),
        )
}

/// Load the config, or print the default template when no config file and no
/// corpus were given. Returns `None` when there is nothing to run.
fn resolve_config(matches: &ArgMatches) -> Result<Option<TrainConfig>> {
    let config_path: Option<&PathBuf> = matches.get_one("config");
    let config = TrainConfig::from_arguments(config_path, matches)?;

    if config_path.is_none() {
        eprintln!("[faceshape] No config file provided; using defaults.");
        let template = serde_json::to_string_pretty(&TrainConfig::default())?;
        println!("{}", template);
        if matches.get_one::<String>("corpus").is_none() {
            eprintln!("[faceshape] Pass a config file or --corpus to run.");
            return Ok(None);
        }
    } else {
        log::info!("[faceshape] Using config: {:?}", config_path);
    }
    Ok(Some(config))
}

fn handle_train(matches: &ArgMatches) -> Result<()> {
    let Some(config) = resolve_config(matches)? else {
        return Ok(());
    };
    let write_report = !matches.get_flag("no_report");

    match trainer::run_training(&config, write_report) {
        Ok(report) => {
            eprintln!(
                "[faceshape] Test accuracy {:.4} with {} (baseline {:.4}).",
                report.metrics.test_accuracy, report.best_params, report.baseline_accuracy
            );
            Ok(())
        }
        Err(e) => {
            log::error!("Training failed: {:#}", e);
            std::process::exit(1)
        }
    }
}

fn handle_scan(matches: &ArgMatches) -> Result<()> {
    let Some(config) = resolve_config(matches)? else {
        return Ok(());
    };

    match trainer::run_scan(&config) {
        Ok(build) => {
            eprintln!(
                "[faceshape] Scanned {} files: {} kept, {} skipped.",
                build.files_seen,
                build.samples_kept,
                build.skipped_count()
            );
            Ok(())
        }
        Err(e) => {
            log::error!("Scan failed: {:#}", e);
            std::process::exit(1)
        }
    }
}

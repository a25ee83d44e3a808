use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use polars::prelude::DataFrame;
use stagehand::config::RunConfig;
use stagehand::data::{load_data, save_series};
use stagehand::harness::{DEFAULT_SUITE_PATH, run_suite};
use stagehand::logging::LOG_DIR_ENV;
use stagehand::pipeline::generate_features;
use stagehand::scoring::score_model;
use stagehand::training::train_model;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "stagehand",
    version,
    about = "Run the feature, training and scoring stages of a model from YAML configuration"
)]
pub struct Cli {
    /// Log filter directive (e.g. `debug`, `stagehand=trace`)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Directory for rotating log files
    #[arg(long, global = true, env = LOG_DIR_ENV)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments shared by the three pipeline stages
#[derive(clap::Args, Debug, Clone)]
pub struct StageArgs {
    /// Path to the YAML run configuration
    #[arg(long)]
    pub config: PathBuf,

    /// Read input from this CSV instead of the configured `load_data` source
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Where to write the stage output
    #[arg(long)]
    pub save: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate features; --save writes the resulting dataset
    #[command(name = "generate_features")]
    GenerateFeatures(StageArgs),

    /// Train a model; --save writes the trained model object
    #[command(name = "train_model")]
    TrainModel(StageArgs),

    /// Score data with a trained model; --save writes the scores
    #[command(name = "score_model")]
    ScoreModel(StageArgs),

    /// Run the golden-file regression suite
    Test {
        /// Path to the test suite configuration
        #[arg(long, default_value = DEFAULT_SUITE_PATH)]
        path: PathBuf,
    },
}

pub async fn run_command(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::GenerateFeatures(args) => handle_generate_features(&args).await?,
        Commands::TrainModel(args) => handle_train_model(&args).await?,
        Commands::ScoreModel(args) => handle_score_model(&args).await?,
        Commands::Test { path } => return handle_test(&path).await,
    }
    Ok(ExitCode::SUCCESS)
}

async fn load_stage(args: &StageArgs) -> Result<(RunConfig, DataFrame)> {
    let config = RunConfig::load(&args.config)?;
    let source = config.data_source(args.csv.as_deref())?;
    let df = load_data(&source).await.context("Failed to load input data")?;
    Ok((config, df))
}

async fn handle_generate_features(args: &StageArgs) -> Result<()> {
    let (config, df) = load_stage(args).await?;
    let features = config.features()?;
    generate_features(df, features, args.save.as_deref()).context("Feature generation failed")?;
    Ok(())
}

async fn handle_train_model(args: &StageArgs) -> Result<()> {
    let (config, df) = load_stage(args).await?;
    let training = config.training()?;
    let outcome = train_model(&df, training).context("Training failed")?;

    if let Some(path) = &args.save {
        outcome.artifact.save(path)?;
        tracing::info!("Trained model object saved to {}", path.display());
    }
    Ok(())
}

async fn handle_score_model(args: &StageArgs) -> Result<()> {
    let (config, df) = load_stage(args).await?;
    let scoring = config.scoring()?;
    let scores = score_model(&df, scoring).context("Scoring failed")?;

    if let Some(path) = &args.save {
        save_series(&scores, path)?;
        tracing::info!("Scores saved to {}", path.display());
    }
    Ok(())
}

async fn handle_test(path: &Path) -> Result<ExitCode> {
    let report = run_suite(path)
        .await
        .with_context(|| format!("Regression suite {} aborted", path.display()))?;

    if report.all_passed {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subcommands_use_snake_case() {
        let cli = Cli::try_parse_from([
            "stagehand",
            "train_model",
            "--config",
            "config/run.yml",
            "--csv",
            "data/train.csv",
        ])
        .unwrap();
        let Commands::TrainModel(args) = cli.command else {
            panic!("expected train_model");
        };
        assert_eq!(args.config, PathBuf::from("config/run.yml"));
        assert_eq!(args.csv, Some(PathBuf::from("data/train.csv")));
        assert!(args.save.is_none());
    }

    #[test]
    fn test_default_suite_path() {
        let cli = Cli::try_parse_from(["stagehand", "--log-level", "debug", "test"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Commands::Test { path } = cli.command else {
            panic!("expected test");
        };
        assert_eq!(path, PathBuf::from("test/test_config.yml"));
    }

    #[test]
    fn test_config_is_required() {
        assert!(Cli::try_parse_from(["stagehand", "score_model"]).is_err());
    }
}

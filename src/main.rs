/// CLI для предобработки данных и обучения классификатора

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use iris_ml::{
    preprocessing::{params_path, read_processed},
    ClassifierTrainer, EncodingMode, FittedPreprocessor, PipelineConfig, ProcessOutcome,
    ProcessedTable, TabularPreprocessor, TrackingSession, TrainingConfig, TrainingReport,
};

const DEFAULT_OUTPUT: &str = "preprocessing/iris_preprocessing/iris_processed_data.csv";

#[derive(Parser, Debug)]
#[command(name = "iris-ml")]
#[command(about = "Tabular preprocessing and classifier tuning", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clean, encode, normalize and persist a raw CSV file
    Preprocess(PreprocessArgs),
    /// Tune and evaluate a classifier on a processed CSV file
    Train(TrainArgs),
    /// Preprocess, then train on the persisted table
    Run {
        #[command(flatten)]
        preprocess: PreprocessArgs,
        #[command(flatten)]
        tracking: TrackingArgs,
    },
}

#[derive(Args, Debug)]
struct PreprocessArgs {
    /// Raw CSV file
    #[arg(short, long)]
    input: PathBuf,

    /// Destination of the processed table
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Column to drop before processing
    #[arg(long)]
    identifier_column: Option<String>,

    /// Column to encode
    #[arg(long)]
    label_column: Option<String>,

    /// indicator | ordinal
    #[arg(long)]
    encoding_mode: Option<EncodingMode>,

    /// Keep duplicate rows
    #[arg(long)]
    no_dedup: bool,

    /// Skip standardization of numeric features
    #[arg(long)]
    no_normalize: bool,
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Processed CSV file
    #[arg(short, long)]
    input: PathBuf,

    /// Label column the table was encoded from
    #[arg(long, default_value = "Species")]
    label_column: String,

    #[command(flatten)]
    tracking: TrackingArgs,
}

#[derive(Args, Debug)]
struct TrackingArgs {
    /// Root directory for tracked runs
    #[arg(long, default_value = "mlruns")]
    tracking_dir: PathBuf,

    /// Experiment name
    #[arg(long, default_value = "Iris_Classification_Tuning")]
    experiment: String,

    /// Share of rows held out for evaluation
    #[arg(long, default_value_t = 0.3)]
    test_size: f64,

    /// Seed for the split and fold assignment
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of cross-validation folds
    #[arg(long, default_value_t = 5)]
    cv_folds: usize,
}

fn main() -> Result<()> {
    // Инициализация логирования
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Preprocess(args) => {
            preprocess(&args)?;
        }
        Command::Train(args) => {
            let table = read_processed(&args.input, &args.label_column)
                .with_context(|| format!("loading {}", args.input.display()))?;
            let class_names = stored_class_names(&args.input)?;
            train(&table, class_names, &args.input, &args.tracking)?;
        }
        Command::Run { preprocess: args, tracking } => {
            let (config, outcome) = preprocess(&args)?;
            let class_names = outcome.fitted.encoder.classes().to_vec();
            train(&outcome.table, Some(class_names), &config.output_path, &tracking)?;
        }
    }
    Ok(())
}

fn build_config(args: &PreprocessArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::new("Species", DEFAULT_OUTPUT),
    };
    config.apply_env().context("applying IRIS_ML_* environment overrides")?;

    // Флаги командной строки имеют наивысший приоритет
    let mut overrides: Vec<(&str, String)> = Vec::new();
    if let Some(output) = &args.output {
        overrides.push(("output_path", output.display().to_string()));
    }
    if let Some(column) = &args.identifier_column {
        overrides.push(("identifier_column", column.clone()));
    }
    if let Some(column) = &args.label_column {
        overrides.push(("label_column", column.clone()));
    }
    if let Some(mode) = args.encoding_mode {
        overrides.push(("encoding_mode", mode.to_string()));
    }
    if args.no_dedup {
        overrides.push(("deduplicate", "false".to_string()));
    }
    if args.no_normalize {
        overrides.push(("normalize", "false".to_string()));
    }
    config.apply_overrides(overrides)?;
    Ok(config)
}

fn preprocess(args: &PreprocessArgs) -> Result<(PipelineConfig, ProcessOutcome)> {
    let config = build_config(args)?;
    let outcome = TabularPreprocessor::process(&args.input, &config)
        .with_context(|| format!("preprocessing {}", args.input.display()))?;

    tracing::info!(
        rows = outcome.table.n_rows(),
        duplicates_removed = outcome.report.duplicates_removed,
        "Preprocessing finished"
    );
    if config.encoding_mode == EncodingMode::Ordinal {
        for (code, value) in outcome.fitted.label_mapping() {
            tracing::info!(code, value = %value, "Label mapping");
        }
    }
    println!(
        "Processed table written to {} ({} rows x {} columns)",
        config.output_path.display(),
        outcome.table.n_rows(),
        outcome.table.columns.len()
    );
    Ok((config, outcome))
}

/// Имена классов из параметров предобработки рядом с таблицей, если они сохранены
fn stored_class_names(processed: &Path) -> Result<Option<Vec<String>>> {
    let sidecar = params_path(processed);
    if !sidecar.is_file() {
        tracing::warn!(
            path = %sidecar.display(),
            "No preprocessing parameters found, ordinal classes are named by code"
        );
        return Ok(None);
    }
    let fitted = FittedPreprocessor::load(processed)
        .with_context(|| format!("loading {}", sidecar.display()))?;
    Ok(Some(fitted.encoder.classes().to_vec()))
}

fn train(
    table: &ProcessedTable,
    class_names: Option<Vec<String>>,
    processed: &Path,
    args: &TrackingArgs,
) -> Result<TrainingReport> {
    let config = TrainingConfig {
        test_size: args.test_size,
        seed: args.seed,
        cv_folds: args.cv_folds,
        ..TrainingConfig::default()
    };

    let mut trainer = ClassifierTrainer::new(config);
    if let Some(names) = class_names {
        trainer = trainer.with_class_names(names);
    }

    let mut session = TrackingSession::open(&args.tracking_dir, &args.experiment)
        .with_context(|| format!("opening tracking session in {}", args.tracking_dir.display()))?;
    // При ошибке сессия уничтожается без finish() и помечается FAILED
    session.log_processed_table(processed)?;
    let report = trainer.train_tracked(table, &mut session)?;
    let run_dir = session.run_dir().to_path_buf();
    let record = session.finish()?;

    println!("Run ID: {}", record.run_id);
    println!("Run directory: {}", run_dir.display());
    println!("Best parameters: {:?}", report.best_params);
    println!("Accuracy on test set: {:.4}", report.metrics.accuracy);
    Ok(report)
}

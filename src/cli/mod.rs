use crate::data::registry::Instrument;
use crate::data::Split;
use crate::predict::RiskFeatures;
use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// NexusByte: hypertension risk pipeline, scorer and wellness coach
#[derive(Parser, Debug)]
#[command(name = "nexusbyte")]
#[command(about = "Hypertension risk pipeline, scorer and wellness coach")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download survey tables into the raw directory
    Fetch(FetchArgs),

    /// Outer-join the raw tables per subject
    Merge(MergeArgs),

    /// Add the hypertension target
    Label(StageArgs),

    /// Derive the model features and impute with training medians
    Features(FeaturesArgs),

    /// Train the risk model
    Train(TrainArgs),

    /// Run merge, label, features and train in order
    Pipeline(PipelineArgs),

    /// Score one subject or a feature table
    Predict(PredictArgs),

    /// Embed the knowledge base and save the index
    BuildIndex(BuildIndexArgs),

    /// Ask the coach a single question
    Ask(AskArgs),

    /// Chat with the coach in the terminal
    Chat(ChatArgs),

    /// Serve the HTTP API
    Serve(ServeArgs),

    /// Score a subject and export a report with a coach plan
    Report(ReportArgs),
}

/// Split selection
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitChoice {
    Train,
    Test,
    All,
}

impl SplitChoice {
    pub fn splits(&self) -> Vec<Split> {
        match self {
            SplitChoice::Train => vec![Split::Train],
            SplitChoice::Test => vec![Split::Test],
            SplitChoice::All => Split::ALL.to_vec(),
        }
    }
}

/// Fetch arguments
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Splits to download
    #[arg(short, long, value_enum, default_value = "all")]
    pub split: SplitChoice,

    /// Instrument to download (repeatable; all when omitted)
    #[arg(short, long = "instrument")]
    pub instruments: Vec<String>,

    /// Raw output directory
    #[arg(short, long)]
    pub raw_dir: Option<PathBuf>,

    /// Survey file server root
    #[arg(long)]
    pub base_url: Option<String>,
}

impl FetchArgs {
    /// Resolve instrument names
    pub fn selected_instruments(&self) -> Result<Vec<Instrument>> {
        if self.instruments.is_empty() {
            return Ok(Instrument::ALL.to_vec());
        }
        self.instruments
            .iter()
            .map(|name| match Instrument::from_name(name) {
                Some(instrument) => Ok(instrument),
                None => bail!("Unknown instrument: {}", name),
            })
            .collect()
    }
}

/// Merge arguments
#[derive(Parser, Debug)]
pub struct MergeArgs {
    /// Raw input directory
    #[arg(short, long)]
    pub raw_dir: Option<PathBuf>,

    /// Processed output directory
    #[arg(short, long)]
    pub processed_dir: Option<PathBuf>,
}

/// Arguments of stages working inside the processed directory
#[derive(Parser, Debug)]
pub struct StageArgs {
    /// Processed directory
    #[arg(short, long)]
    pub processed_dir: Option<PathBuf>,
}

/// Features arguments
#[derive(Parser, Debug)]
pub struct FeaturesArgs {
    /// Processed directory
    #[arg(short, long)]
    pub processed_dir: Option<PathBuf>,

    /// Where to write the training medians
    #[arg(short, long)]
    pub medians: Option<PathBuf>,
}

/// Training arguments
#[derive(Parser, Debug, Default)]
pub struct TrainArgs {
    /// Engineered training CSV
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Model output file
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Maximum number of trees
    #[arg(long)]
    pub rounds: Option<usize>,

    /// Learning rate
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Maximum tree depth
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Trees added between validation checks
    #[arg(long)]
    pub eval_interval: Option<usize>,

    /// Early stopping patience in validation checks
    #[arg(long)]
    pub patience: Option<usize>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Validation ratio
    #[arg(long)]
    pub val_ratio: Option<f64>,

    /// Per-round validation metrics file (JSON)
    #[arg(long)]
    pub metrics_log: Option<PathBuf>,

    /// Quick test mode (few shallow trees)
    #[arg(long)]
    pub quick: bool,
}

/// Pipeline arguments
#[derive(Parser, Debug)]
pub struct PipelineArgs {
    /// Download the raw tables first
    #[arg(long)]
    pub fetch: bool,

    /// Quick test mode for the training stage
    #[arg(long)]
    pub quick: bool,
}

/// Subject values given on the command line
#[derive(Args, Debug, Default, Clone)]
pub struct FeatureArgs {
    /// Body-mass index
    #[arg(long)]
    pub imc: Option<f64>,

    /// Waist-to-height ratio
    #[arg(long)]
    pub whtr: Option<f64>,

    /// Age in years
    #[arg(long)]
    pub age: Option<i64>,

    /// Sex (0 = male, 1 = female)
    #[arg(long)]
    pub sex: Option<i64>,

    /// Current smoker (0 or 1)
    #[arg(long)]
    pub smoker: Option<i64>,

    /// Sleep hours per night
    #[arg(long)]
    pub sleep_hours: Option<f64>,

    /// Physically active days per week
    #[arg(long)]
    pub activity_days: Option<f64>,
}

impl FeatureArgs {
    /// Build a request, naming every missing flag
    pub fn to_features(&self) -> Result<RiskFeatures> {
        let mut missing = Vec::new();
        if self.imc.is_none() {
            missing.push("--imc");
        }
        if self.whtr.is_none() {
            missing.push("--whtr");
        }
        if self.age.is_none() {
            missing.push("--age");
        }
        if self.sex.is_none() {
            missing.push("--sex");
        }
        if self.smoker.is_none() {
            missing.push("--smoker");
        }
        if self.sleep_hours.is_none() {
            missing.push("--sleep-hours");
        }
        if self.activity_days.is_none() {
            missing.push("--activity-days");
        }

        match (
            self.imc,
            self.whtr,
            self.age,
            self.sex,
            self.smoker,
            self.sleep_hours,
            self.activity_days,
        ) {
            (
                Some(feat_imc),
                Some(feat_whtr),
                Some(feat_age),
                Some(feat_sex),
                Some(feat_is_smoker),
                Some(feat_sleep_hours),
                Some(feat_activity_days),
            ) => Ok(RiskFeatures {
                feat_imc,
                feat_whtr,
                feat_age,
                feat_sex,
                feat_is_smoker,
                feat_sleep_hours,
                feat_activity_days,
            }),
            _ => bail!("Missing subject values: {}", missing.join(", ")),
        }
    }
}

/// Prediction arguments
#[derive(Parser, Debug)]
pub struct PredictArgs {
    #[command(flatten)]
    pub features: FeatureArgs,

    /// Engineered feature CSV to score instead of a single subject
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output file for batch scores
    #[arg(short, long, default_value = "predictions.csv")]
    pub output: PathBuf,

    /// Model file
    #[arg(short, long)]
    pub model: Option<PathBuf>,
}

/// Index arguments
#[derive(Parser, Debug)]
pub struct BuildIndexArgs {
    /// Knowledge-base directory
    #[arg(short, long)]
    pub kb_dir: Option<PathBuf>,

    /// Index output file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Single question arguments
#[derive(Parser, Debug)]
pub struct AskArgs {
    /// Question for the coach
    pub question: String,
}

/// Terminal chat arguments
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Append turns to this JSON-lines file
    #[arg(short, long)]
    pub transcript: Option<PathBuf>,
}

/// Server arguments
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Bind host
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Model file
    #[arg(short, long)]
    pub model: Option<PathBuf>,
}

/// Report arguments
#[derive(Parser, Debug)]
pub struct ReportArgs {
    #[command(flatten)]
    pub features: FeatureArgs,

    /// Report output file
    #[arg(short, long, default_value = "reports/risk_report.txt")]
    pub output: PathBuf,

    /// Model file
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Characters per line
    #[arg(long, default_value = "80")]
    pub width: usize,

    /// Body lines per page
    #[arg(long, default_value = "54")]
    pub lines_per_page: usize,
}

/// Parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Setup logging based on verbosity
pub fn setup_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_args() {
        let cli = Cli::parse_from([
            "nexusbyte",
            "fetch",
            "--split",
            "test",
            "-i",
            "DEMO",
            "-i",
            "SleepDisorder",
        ]);
        match cli.command {
            Commands::Fetch(args) => {
                assert_eq!(args.split.splits(), vec![Split::Test]);
                assert_eq!(
                    args.selected_instruments().unwrap(),
                    vec![Instrument::Demographics, Instrument::Sleep]
                );
            }
            _ => panic!("Expected Fetch command"),
        }

        let cli = Cli::parse_from(["nexusbyte", "fetch", "-i", "nope"]);
        match cli.command {
            Commands::Fetch(args) => assert!(args.selected_instruments().is_err()),
            _ => panic!("Expected Fetch command"),
        }
    }

    #[test]
    fn test_train_args() {
        let cli = Cli::parse_from([
            "nexusbyte",
            "-v",
            "--config",
            "nexusbyte.toml",
            "train",
            "--rounds",
            "50",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("nexusbyte.toml")));
        match cli.command {
            Commands::Train(args) => {
                assert_eq!(args.rounds, Some(50));
                assert!(args.input.is_none());
                assert!(!args.quick);
            }
            _ => panic!("Expected Train command"),
        }
    }

    #[test]
    fn test_predict_flags() {
        let cli = Cli::parse_from([
            "nexusbyte",
            "predict",
            "--imc",
            "31.2",
            "--whtr",
            "0.61",
            "--age",
            "58",
            "--sex",
            "1",
            "--smoker",
            "0",
            "--sleep-hours",
            "6",
            "--activity-days",
            "2",
        ]);
        match cli.command {
            Commands::Predict(args) => {
                let features = args.features.to_features().unwrap();
                assert_eq!(features.feat_age, 58);
                assert_eq!(features.feat_activity_days, 2.0);
                assert!(args.input.is_none());
            }
            _ => panic!("Expected Predict command"),
        }
    }

    #[test]
    fn test_missing_flags_are_named() {
        let args = FeatureArgs {
            imc: Some(25.0),
            age: Some(40),
            ..Default::default()
        };
        let err = args.to_features().unwrap_err().to_string();
        assert!(err.contains("--whtr"));
        assert!(err.contains("--activity-days"));
        assert!(!err.contains("--imc"));
    }
}

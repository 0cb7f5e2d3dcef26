use anyhow::{Context, Result};
use nexusbyte::app::AppContext;
use nexusbyte::chat::{ChatSession, Transcript};
use nexusbyte::cli::{
    parse_args, setup_logging, AskArgs, BuildIndexArgs, ChatArgs, Commands, FeaturesArgs,
    FetchArgs, MergeArgs, PipelineArgs, PredictArgs, ReportArgs, ServeArgs, StageArgs, TrainArgs,
};
use nexusbyte::coach::{Coach, UNAVAILABLE_MESSAGE};
use nexusbyte::config::AppConfig;
use nexusbyte::data::feature_engineering::FeatureEngineer;
use nexusbyte::data::fetcher::{HttpSource, RawTableFetcher};
use nexusbyte::data::labeler::TargetLabeler;
use nexusbyte::data::merge::Merger;
use nexusbyte::data::loader::DataLoader;
use nexusbyte::data::{Split, Stage};
use nexusbyte::predict::drivers::format_drivers;
use nexusbyte::predict::RiskScorer;
use nexusbyte::report::{PageLayout, RiskReport};
use nexusbyte::training::trainer::Trainer;
use nexusbyte::training::TrainingConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = parse_args();

    setup_logging(cli.verbose);

    info!("{}", nexusbyte::info());

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Fetch(args) => run_fetch(args, config).await,
        Commands::Merge(args) => run_merge(args, config),
        Commands::Label(args) => run_label(args, config),
        Commands::Features(args) => run_features(args, config),
        Commands::Train(args) => run_train(args, config),
        Commands::Pipeline(args) => run_pipeline(args, config).await,
        Commands::Predict(args) => run_predict(args, config),
        Commands::BuildIndex(args) => run_build_index(args, config).await,
        Commands::Ask(args) => run_ask(args, config).await,
        Commands::Chat(args) => run_chat(args, config).await,
        Commands::Serve(args) => run_serve(args, config).await,
        Commands::Report(args) => run_report(args, config).await,
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_fetch(args: FetchArgs, mut config: AppConfig) -> Result<()> {
    if let Some(raw_dir) = args.raw_dir.clone() {
        config.data.raw_dir = raw_dir;
    }
    if let Some(base_url) = args.base_url.clone() {
        config.data.survey_url = base_url;
    }
    let instruments = args.selected_instruments()?;

    info!("Starting download...");
    info!("Raw directory: {:?}", config.data.raw_dir);

    let source = HttpSource::new(Duration::from_secs(config.data.fetch_timeout_secs))?;
    let fetcher = RawTableFetcher::new(source, config.data.survey_url.clone());
    for split in args.split.splits() {
        let summary = fetcher
            .fetch_split(split, &instruments, &config.data.raw_dir)
            .await
            .with_context(|| format!("Failed to fetch the {} split", split))?;
        for (instrument, path, rows) in &summary.written {
            info!("  {} -> {:?} ({} rows)", instrument, path, rows);
        }
        for url in &summary.failed {
            warn!("  not fetched: {}", url);
        }
    }
    Ok(())
}

fn run_merge(args: MergeArgs, mut config: AppConfig) -> Result<()> {
    if let Some(raw_dir) = args.raw_dir {
        config.data.raw_dir = raw_dir;
    }
    if let Some(processed_dir) = args.processed_dir {
        config.data.processed_dir = processed_dir;
    }
    merge_stage(&config)
}

fn merge_stage(config: &AppConfig) -> Result<()> {
    info!("Merging raw tables from {:?}", config.data.raw_dir);
    let written = Merger::new(&config.data.raw_dir)
        .run(&config.data.processed_dir)
        .context("Merge failed")?;
    for path in written {
        info!("  wrote {:?}", path);
    }
    Ok(())
}

fn run_label(args: StageArgs, mut config: AppConfig) -> Result<()> {
    if let Some(processed_dir) = args.processed_dir {
        config.data.processed_dir = processed_dir;
    }
    label_stage(&config)
}

fn label_stage(config: &AppConfig) -> Result<()> {
    info!("Labeling merged tables...");
    let summaries = TargetLabeler::new()
        .run(&config.data.processed_dir)
        .context("Labeling failed")?;
    for s in summaries {
        if s.computed {
            info!(
                "  {}: {} of {} rows kept ({} dropped), {} positive",
                s.split, s.rows_out, s.rows_in, s.dropped, s.positives
            );
        } else {
            info!("  {}: {} rows with placeholder label", s.split, s.rows_out);
        }
    }
    Ok(())
}

fn run_features(args: FeaturesArgs, mut config: AppConfig) -> Result<()> {
    if let Some(processed_dir) = args.processed_dir {
        config.data.processed_dir = processed_dir;
    }
    if let Some(medians) = args.medians {
        config.model.medians_path = medians;
    }
    features_stage(&config)
}

fn features_stage(config: &AppConfig) -> Result<()> {
    info!("Engineering features...");
    let run = FeatureEngineer::new()
        .run(&config.data.processed_dir, &config.model.medians_path)
        .context("Feature engineering failed")?;

    info!("\n=== Training Medians ===");
    for ((name, median), observed) in run
        .stats
        .names
        .iter()
        .zip(&run.stats.medians)
        .zip(&run.stats.observed)
    {
        match median {
            Some(m) => info!("  {}: {:.3} ({} observed)", name, m, observed),
            None => info!("  {}: never observed", name),
        }
    }
    if !run.train.omitted.is_empty() {
        warn!("Features omitted: {:?}", run.train.omitted);
    }
    Ok(())
}

fn training_config(args: &TrainArgs, config: &AppConfig) -> TrainingConfig {
    let base = if args.quick {
        TrainingConfig::quick_test()
    } else {
        config.training.clone()
    };
    TrainingConfig {
        n_rounds: args.rounds.unwrap_or(base.n_rounds),
        learning_rate: args.learning_rate.unwrap_or(base.learning_rate),
        max_depth: args.max_depth.unwrap_or(base.max_depth),
        eval_interval: args.eval_interval.unwrap_or(base.eval_interval),
        early_stopping_rounds: args.patience.unwrap_or(base.early_stopping_rounds),
        seed: args.seed.unwrap_or(base.seed),
        val_ratio: args.val_ratio.unwrap_or(base.val_ratio),
        ..base
    }
}

fn run_train(args: TrainArgs, config: AppConfig) -> Result<()> {
    let input = args
        .input
        .clone()
        .unwrap_or_else(|| Stage::Features.path(&config.data.processed_dir, Split::Train));
    let model_path = args.model.clone().unwrap_or_else(|| config.model.path.clone());
    let training_config = training_config(&args, &config);

    info!("Starting training...");
    info!("Input file: {:?}", input);
    info!("Model file: {:?}", model_path);

    let mut trainer = Trainer::new(training_config);
    if let Some(log) = &args.metrics_log {
        trainer = trainer.with_metrics_log(log);
    }
    let result = trainer
        .train(&input, &model_path)
        .context("Training failed")?;

    info!("\n=== Training Results ===");
    info!("Validation checks: {}", result.state.round);
    info!("Trees kept: {}", result.state.best_round);
    info!("Best validation log-loss: {:.4}", result.state.best_metric);
    info!("Training time: {:.2}s", result.duration_secs);
    info!("\nValidation Metrics:");
    if let Some(auroc) = result.final_metrics.auroc {
        info!("  AUROC: {:.4}", auroc);
    }
    if let Some(auprc) = result.final_metrics.auprc {
        info!("  Average precision: {:.4}", auprc);
    }
    info!("  F1: {:.4}", result.final_metrics.f1);
    info!("  Accuracy: {:.4}", result.final_metrics.accuracy);
    info!("\nClassification Report:\n{}", result.report);
    info!("\nModel saved to: {:?}", result.model_path);

    Ok(())
}

async fn run_pipeline(args: PipelineArgs, config: AppConfig) -> Result<()> {
    if args.fetch {
        let fetch = FetchArgs {
            split: nexusbyte::cli::SplitChoice::All,
            instruments: Vec::new(),
            raw_dir: None,
            base_url: None,
        };
        run_fetch(fetch, config.clone()).await?;
    }
    merge_stage(&config)?;
    label_stage(&config)?;
    features_stage(&config)?;
    run_train(
        TrainArgs {
            quick: args.quick,
            ..Default::default()
        },
        config,
    )
}

fn run_predict(args: PredictArgs, config: AppConfig) -> Result<()> {
    let model_path = args.model.clone().unwrap_or(config.model.path);
    info!("Loading model from {:?}", model_path);
    let scorer = RiskScorer::load(&model_path);
    scorer.model()?;

    match &args.input {
        Some(input) => {
            info!("Scoring {:?}", input);
            let frame = DataLoader::new()
                .load(input)
                .with_context(|| format!("Failed to load data from {:?}", input))?;
            let scores = scorer.score_frame(&frame).context("Prediction failed")?;
            scores.summary.print();
            scores.save_csv(&args.output)?;
            info!("Predictions saved to: {:?}", args.output);
        }
        None => {
            let features = args.features.to_features()?;
            let score = scorer.score(&features)?;
            println!("{}", serde_json::to_string_pretty(&score)?);
            println!("\nRisk level: {}", score.risk_level());
            println!("{}", format_drivers(&score.drivers));
        }
    }
    Ok(())
}

async fn run_build_index(args: BuildIndexArgs, mut config: AppConfig) -> Result<()> {
    if let Some(kb_dir) = args.kb_dir {
        config.coach.kb_dir = kb_dir;
    }
    if let Some(output) = args.output {
        config.coach.index_path = output;
    }
    info!("Building knowledge index from {:?}", config.coach.kb_dir);
    Coach::rebuild_index(&config.coach).await?;
    Ok(())
}

async fn run_ask(args: AskArgs, config: AppConfig) -> Result<()> {
    let coach = Coach::connect(&config.coach).await;
    println!("{}", coach.chat(&args.question, &[]).await);
    Ok(())
}

async fn run_chat(args: ChatArgs, config: AppConfig) -> Result<()> {
    let coach = Coach::connect(&config.coach).await;
    let mut session = ChatSession::new(&coach);
    if let Some(path) = &args.transcript {
        session = session.with_transcript(Transcript::open(path)?);
    }
    let stdin = std::io::stdin();
    let answered = session.run(stdin.lock(), std::io::stdout()).await?;
    info!("Chat ended after {} questions", answered);
    Ok(())
}

async fn run_serve(args: ServeArgs, mut config: AppConfig) -> Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(model) = args.model {
        config.model.path = model;
    }
    let context = Arc::new(AppContext::load(&config).await);
    nexusbyte::server::serve(context, &config.server.address()).await
}

async fn run_report(args: ReportArgs, mut config: AppConfig) -> Result<()> {
    if let Some(model) = args.model.clone() {
        config.model.path = model;
    }
    let features = args.features.to_features()?;
    let context = AppContext::load(&config).await;
    let score = context.predict(&features)?;
    info!(
        "Risk score {:.4} ({})",
        score.risk_score,
        score.risk_level()
    );

    let plan = match context.action_plan(&score).await {
        Ok(plan) => plan,
        Err(nexusbyte::coach::CoachError::Unavailable(_)) => UNAVAILABLE_MESSAGE.to_string(),
        Err(e) => {
            warn!("Plan generation failed: {}", e);
            format!("ERROR generating the action plan: {}", e)
        }
    };

    let layout = PageLayout {
        width: args.width,
        lines_per_page: args.lines_per_page,
    };
    let pages = RiskReport::new(score, plan).save(&args.output, layout)?;
    info!("Report written to {:?} ({} pages)", args.output, pages);
    Ok(())
}

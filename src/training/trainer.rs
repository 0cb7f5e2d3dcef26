use crate::data::loader::DataLoader;
use crate::data::preprocessing::stratified_split;
use crate::data::schema::StageSchema;
use crate::data::{FEATURE_COLUMNS, TARGET_COLUMN};
use crate::model::booster::GradientBoostedClassifier;
use crate::model::checkpoint::{Metrics, ModelSaver, TrainingMetadata};
use crate::model::loss::log_loss;
use crate::model::loss::metrics::{average_precision, roc_auc, ClassificationReport};
use crate::model::FeatureMatrix;
use crate::training::callbacks::{
    CallbackManager, EarlyStoppingCallback, MetricsLoggerCallback, ProgressLoggerCallback,
    TimerCallback,
};
use crate::training::{TrainingConfig, TrainingResult, TrainingState};
use crate::utils::validation;
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Display names of the two classes in reports
pub const TARGET_NAMES: [&str; 2] = ["No Hypertension (0)", "Hypertension (1)"];

/// Decision threshold on the positive-class probability
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Labeled feature rows ready for boosting
#[derive(Debug, Clone)]
pub struct TrainingData {
    pub features: FeatureMatrix,
    pub labels: Vec<f64>,
    pub feature_names: Vec<String>,
}

impl TrainingData {
    /// Load the engineered training CSV
    ///
    /// Uses every known feature column present, in model order. Rows with a
    /// missing target are skipped.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let frame = DataLoader::new().load(path)?;
        StageSchema::new("train", &[TARGET_COLUMN], &FEATURE_COLUMNS)
            .enforce(&frame)
            .with_context(|| format!("Invalid training table {:?}", path))?;

        let feature_names: Vec<String> = FEATURE_COLUMNS
            .iter()
            .filter(|c| frame.has_column(c))
            .map(|c| c.to_string())
            .collect();
        if feature_names.is_empty() {
            bail!("No feature columns found in {:?}", path);
        }

        let target = frame.column(TARGET_COLUMN).unwrap_or(&[]);
        let keep: Vec<usize> = (0..frame.n_rows()).filter(|&r| target[r].is_some()).collect();
        if keep.len() < frame.n_rows() {
            warn!("Skipping {} rows without a target", frame.n_rows() - keep.len());
        }

        let all = FeatureMatrix::from_frame(&frame, &feature_names)?;
        let labels = keep
            .iter()
            .map(|&r| if target[r] == Some(1.0) { 1.0 } else { 0.0 })
            .collect();
        Ok(Self {
            features: all.take_rows(&keep),
            labels,
            feature_names,
        })
    }
}

/// Validation metrics for a set of probabilities
pub fn evaluate(labels: &[f64], probs: &[f64]) -> (Metrics, ClassificationReport) {
    let predicted: Vec<bool> = probs.iter().map(|&p| p >= DECISION_THRESHOLD).collect();
    let report = ClassificationReport::new(labels, &predicted, TARGET_NAMES);
    let metrics = Metrics {
        loss: log_loss(labels, probs),
        accuracy: report.accuracy,
        precision: report.classes[1].precision,
        recall: report.classes[1].recall,
        f1: report.classes[1].f1,
        auroc: roc_auc(labels, probs),
        auprc: average_precision(labels, probs),
    };
    (metrics, report)
}

/// Fitted model plus what the run produced
pub struct FitOutput {
    pub model: GradientBoostedClassifier,
    pub state: TrainingState,
    pub metadata: TrainingMetadata,
    pub metrics: Metrics,
    pub report: ClassificationReport,
}

/// Trainer for the hypertension classifier
pub struct Trainer {
    /// Training configuration
    config: TrainingConfig,
    /// Optional per-round metrics file
    metrics_log: Option<PathBuf>,
}

impl Trainer {
    /// Create new trainer
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            metrics_log: None,
        }
    }

    /// Write per-round validation metrics to a file
    pub fn with_metrics_log<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.metrics_log = Some(path.as_ref().to_path_buf());
        self
    }

    fn callbacks(&self) -> CallbackManager {
        let mut manager = CallbackManager::new();
        manager.add_callback(TimerCallback::new());
        manager.add_callback(ProgressLoggerCallback::new(self.config.log_frequency));
        manager.add_callback(EarlyStoppingCallback::new(self.config.early_stopping_rounds));
        if let Some(path) = &self.metrics_log {
            manager.add_callback(MetricsLoggerCallback::new(path));
        }
        manager
    }

    /// Split, grow the ensemble with early stopping, and keep the best size
    pub fn fit(&self, data: &TrainingData) -> Result<FitOutput> {
        validation::in_range(self.config.val_ratio, 0.0, 0.9, "val_ratio")?;
        validation::positive(self.config.n_rounds, "n_rounds")?;
        info!("Starting training with configuration: {:?}", self.config);

        let classes: Vec<u8> = data.labels.iter().map(|&y| u8::from(y == 1.0)).collect();
        let split = stratified_split(&classes, self.config.val_ratio, self.config.seed)?;
        if split.val.is_empty() {
            bail!("Validation partition is empty; need more rows or a larger val_ratio");
        }

        let train_x = data.features.take_rows(&split.train);
        let train_y: Vec<f64> = split.train.iter().map(|&i| data.labels[i]).collect();
        let val_x = data.features.take_rows(&split.val);
        let val_y: Vec<f64> = split.val.iter().map(|&i| data.labels[i]).collect();

        let n_pos = train_y.iter().filter(|&&y| y == 1.0).count();
        let n_neg = train_y.len() - n_pos;
        if n_pos == 0 || n_neg == 0 {
            bail!(
                "Training partition needs both classes (positive={}, negative={})",
                n_pos,
                n_neg
            );
        }
        let scale_pos_weight = n_neg as f64 / n_pos as f64;
        info!("Class weight for positives: {:.3}", scale_pos_weight);

        let checkpoints = self.config.checkpoints();
        let mut callbacks = self.callbacks();
        let mut state = TrainingState::new();
        let mut best: Option<GradientBoostedClassifier> = None;
        let progress = ProgressBar::new(checkpoints.len() as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner} [{bar:30}] {pos}/{len} checks {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        callbacks.on_train_begin();
        for (check, &n_trees) in checkpoints.iter().enumerate() {
            let mut model = GradientBoostedClassifier::new(
                self.config.booster_config(n_trees, scale_pos_weight),
                data.feature_names.clone(),
            );
            model.fit(&train_x, &train_y)?;

            let train_probs = model.predict_proba_batch(&train_x)?;
            let val_probs = model.predict_proba_batch(&val_x)?;
            let (check_metrics, _) = evaluate(&val_y, &val_probs);
            let improved = state.update_round(
                n_trees,
                log_loss(&train_y, &train_probs),
                check_metrics.loss,
                self.config.min_delta,
            );
            if improved {
                best = Some(model);
            }

            progress.set_message(format!(
                "{} trees, val logloss {:.4}",
                n_trees, check_metrics.loss
            ));
            progress.inc(1);
            callbacks.on_round_end(check + 1, &state, &check_metrics);
            if callbacks.should_stop() {
                break;
            }
        }
        progress.finish_and_clear();

        let model = match best {
            Some(model) => model,
            None => bail!("Validation log-loss never became finite; nothing to keep"),
        };
        info!(
            "Keeping {} trees (best validation logloss {:.5} after {} checks)",
            state.best_round, state.best_metric, state.round
        );

        let val_probs = model.predict_proba_batch(&val_x)?;
        let (metrics, report) = evaluate(&val_y, &val_probs);
        callbacks.on_validation_end(&metrics);
        callbacks.on_train_end(&state);

        match (metrics.auroc, metrics.auprc) {
            (Some(auroc), Some(auprc)) => info!("Validation AUROC: {:.4}, AUPRC: {:.4}", auroc, auprc),
            _ => warn!("Validation partition holds a single class, AUROC/AUPRC undefined"),
        }
        info!("Classification report:\n{}", report);

        let metadata = TrainingMetadata {
            version: crate::VERSION.to_string(),
            created_at: TrainingMetadata::now(),
            rounds_run: state.round,
            best_iteration: state.best_round,
            n_train: train_y.len(),
            n_val: val_y.len(),
            booster: model.config.clone(),
            val_metrics: metrics.clone(),
            report: report.clone(),
            feature_importance: model.feature_importance(&val_x, &val_y)?,
            val_loss_history: state.val_loss_history.clone(),
        };

        Ok(FitOutput {
            model,
            state,
            metadata,
            metrics,
            report,
        })
    }

    /// Train on the engineered CSV and persist the model
    ///
    /// The model is written whatever its validation scores are.
    pub fn train<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        features_path: P,
        model_path: Q,
    ) -> Result<TrainingResult> {
        let start_time = Instant::now();
        let data = TrainingData::load(features_path)?;
        info!(
            "Training on {} rows with features {:?}",
            data.labels.len(),
            data.feature_names
        );

        let output = self.fit(&data)?;
        let model_path = model_path.as_ref().to_path_buf();
        ModelSaver::save(&output.model, &model_path, &output.metadata)?;

        Ok(TrainingResult {
            state: output.state,
            model_path,
            final_metrics: output.metrics,
            report: output.report,
            duration_secs: start_time.elapsed().as_secs_f64(),
        })
    }
}

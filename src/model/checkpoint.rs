use crate::model::booster::GradientBoostedClassifier;
use crate::model::loss::metrics::ClassificationReport;
use crate::model::BoosterConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Validation metrics
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Metrics {
    /// Log-loss
    pub loss: f64,
    /// Accuracy at the 0.5 threshold
    pub accuracy: f64,
    /// Precision of the positive class
    pub precision: f64,
    /// Recall of the positive class
    pub recall: f64,
    /// F1 of the positive class
    pub f1: f64,
    /// Area under the ROC curve
    pub auroc: Option<f64>,
    /// Average precision
    pub auprc: Option<f64>,
}

/// Training summary written next to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingMetadata {
    /// Crate version that produced the model
    pub version: String,
    /// Seconds since the Unix epoch
    pub created_at: u64,
    /// Validation checks run before stopping
    pub rounds_run: usize,
    /// Trees kept in the saved model
    pub best_iteration: usize,
    pub n_train: usize,
    pub n_val: usize,
    pub booster: BoosterConfig,
    pub val_metrics: Metrics,
    pub report: ClassificationReport,
    /// Normalized gain per feature
    pub feature_importance: Vec<(String, f64)>,
    /// Validation log-loss per round
    pub val_loss_history: Vec<f64>,
}

impl TrainingMetadata {
    /// Current time for `created_at`
    pub fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Path of the metrics sidecar for a model path
pub fn metadata_path(model_path: &Path) -> PathBuf {
    model_path.with_extension("metrics.json")
}

/// Saves and loads the model artifact
pub struct ModelSaver;

impl ModelSaver {
    /// Write the model and its sidecar, overwriting previous files
    pub fn save<P: AsRef<Path>>(
        model: &GradientBoostedClassifier,
        path: P,
        metadata: &TrainingMetadata,
    ) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            crate::utils::ensure_dir(parent)?;
        }

        let model_json = serde_json::to_string(model).context("Failed to serialize model")?;
        fs::write(path, model_json).with_context(|| format!("Failed to write {:?}", path))?;

        let metadata_path = metadata_path(path);
        let metadata_json =
            serde_json::to_string_pretty(metadata).context("Failed to serialize metadata")?;
        fs::write(&metadata_path, metadata_json)
            .with_context(|| format!("Failed to write {:?}", metadata_path))?;

        info!("Saved model ({} trees) to {:?}", model.n_trees(), path);
        Ok(())
    }

    /// Load a model for inference
    pub fn load<P: AsRef<Path>>(path: P) -> Result<GradientBoostedClassifier> {
        let path = path.as_ref();
        info!("Loading model from {:?}", path);
        let json = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let model: GradientBoostedClassifier =
            serde_json::from_str(&json).with_context(|| format!("Failed to parse {:?}", path))?;
        model
            .validate()
            .with_context(|| format!("Model in {:?} failed validation", path))?;
        info!(
            "Loaded model with {} trees over {:?}",
            model.n_trees(),
            model.feature_names
        );
        Ok(model)
    }

    /// Load the sidecar written by `save`
    pub fn load_metadata<P: AsRef<Path>>(model_path: P) -> Result<TrainingMetadata> {
        let path = metadata_path(model_path.as_ref());
        let json = fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse {:?}", path))
    }
}

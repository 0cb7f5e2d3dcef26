//! Binary classifier on top of the `gbdt` ensemble

use crate::model::loss::log_loss;
use crate::model::{BoosterConfig, FeatureMatrix};
use anyhow::{anyhow, bail, Result};
use gbdt::config::Config as GbdtConfig;
use gbdt::decision_tree::{Data, DataVec, ValueType, VALUE_TYPE_UNKNOWN};
use gbdt::gradient_boost::GBDT;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Gradient-boosted binary classifier on the log-likelihood loss
#[derive(Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    pub config: BoosterConfig,
    /// Feature names in the order rows must follow
    pub feature_names: Vec<String>,
    ensemble: Option<GBDT>,
}

impl fmt::Debug for GradientBoostedClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradientBoostedClassifier")
            .field("config", &self.config)
            .field("feature_names", &self.feature_names)
            .field("fitted", &self.ensemble.is_some())
            .finish()
    }
}

fn cell(value: f64) -> ValueType {
    if value.is_nan() {
        VALUE_TYPE_UNKNOWN
    } else {
        value as ValueType
    }
}

impl GradientBoostedClassifier {
    /// Create an unfitted classifier
    pub fn new(config: BoosterConfig, feature_names: Vec<String>) -> Self {
        Self {
            config,
            feature_names,
            ensemble: None,
        }
    }

    /// Whether `fit` has run
    pub fn is_fitted(&self) -> bool {
        self.ensemble.is_some()
    }

    /// Number of trees in the fitted ensemble
    pub fn n_trees(&self) -> usize {
        if self.is_fitted() {
            self.config.n_trees
        } else {
            0
        }
    }

    /// Number of input features
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Per-example weights for the given labels
    pub fn sample_weights(&self, labels: &[f64]) -> Vec<f64> {
        labels
            .iter()
            .map(|&y| if y == 1.0 { self.config.scale_pos_weight } else { 1.0 })
            .collect()
    }

    fn gbdt_config(&self) -> GbdtConfig {
        let mut cfg = GbdtConfig::new();
        cfg.set_feature_size(self.n_features() as _);
        cfg.set_max_depth(self.config.max_depth as _);
        cfg.set_iterations(self.config.n_trees as _);
        cfg.set_shrinkage(self.config.learning_rate as _);
        cfg.set_min_leaf_size(self.config.min_leaf_size as _);
        cfg.set_loss("LogLikelyhood");
        cfg.set_debug(false);
        cfg.set_data_sample_ratio(1.0);
        cfg.set_feature_sample_ratio(1.0);
        cfg.set_training_optimization_level(2);
        cfg
    }

    fn check_columns(&self, data: &FeatureMatrix) -> Result<()> {
        if data.n_cols() != self.n_features() {
            bail!(
                "Matrix has {} columns, model expects {}",
                data.n_cols(),
                self.n_features()
            );
        }
        Ok(())
    }

    /// Fit the ensemble; labels are 0/1
    pub fn fit(&mut self, data: &FeatureMatrix, labels: &[f64]) -> Result<()> {
        self.config.validate()?;
        self.check_columns(data)?;
        if labels.len() != data.n_rows() {
            bail!("Labels must match the {} matrix rows", data.n_rows());
        }
        let n_pos = labels.iter().filter(|&&y| y == 1.0).count();
        if n_pos == 0 || n_pos == labels.len() {
            bail!("Fitting needs both classes (positive={}, rows={})", n_pos, labels.len());
        }

        let weights = self.sample_weights(labels);
        let mut train: DataVec = (0..data.n_rows())
            .map(|r| {
                let label = if labels[r] == 1.0 { 1.0 } else { -1.0 };
                Data::new_training_data(
                    data.row(r).iter().map(|&v| cell(v)).collect(),
                    weights[r] as ValueType,
                    label,
                    None,
                )
            })
            .collect();

        let mut ensemble = GBDT::new(&self.gbdt_config());
        ensemble.fit(&mut train);
        self.ensemble = Some(ensemble);
        Ok(())
    }

    /// Probabilities of the positive class for every row
    ///
    /// A panic inside the ensemble, such as one raised by a damaged tree, is
    /// returned as an error.
    pub fn predict_proba_batch(&self, data: &FeatureMatrix) -> Result<Vec<f64>> {
        let ensemble = self
            .ensemble
            .as_ref()
            .ok_or_else(|| anyhow!("Model has not been fitted"))?;
        self.check_columns(data)?;

        let rows: DataVec = (0..data.n_rows())
            .map(|r| Data::new_test_data(data.row(r).iter().map(|&v| cell(v)).collect(), None))
            .collect();
        let predicted = catch_unwind(AssertUnwindSafe(|| ensemble.predict(&rows)))
            .map_err(|_| anyhow!("Model evaluation failed"))?;
        if predicted.len() != rows.len() {
            bail!("Model returned {} scores for {} rows", predicted.len(), rows.len());
        }

        predicted
            .into_iter()
            .map(|p| {
                let p = p as f64;
                if (0.0..=1.0).contains(&p) {
                    Ok(p)
                } else {
                    Err(anyhow!("Model produced an invalid probability: {}", p))
                }
            })
            .collect()
    }

    /// Probability of the positive class for one row
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64> {
        let mut data = FeatureMatrix::new(row.len());
        data.push_row(row)?;
        let probs = self.predict_proba_batch(&data)?;
        probs
            .first()
            .copied()
            .ok_or_else(|| anyhow!("Model returned no score"))
    }

    /// Log-loss increase when each feature is treated as missing, normalized to one
    pub fn feature_importance(
        &self,
        data: &FeatureMatrix,
        labels: &[f64],
    ) -> Result<Vec<(String, f64)>> {
        let base = log_loss(labels, &self.predict_proba_batch(data)?);
        let mut increases = Vec::with_capacity(self.n_features());
        for col in 0..self.n_features() {
            let masked = data.with_missing_column(col);
            let loss = log_loss(labels, &self.predict_proba_batch(&masked)?);
            increases.push((loss - base).max(0.0));
        }
        let sum: f64 = increases.iter().sum();
        Ok(self
            .feature_names
            .iter()
            .cloned()
            .zip(increases.into_iter().map(|g| if sum > 0.0 { g / sum } else { 0.0 }))
            .collect())
    }

    /// Check a loaded model before serving it
    ///
    /// Scores a grid of rows, all-missing included, so that a damaged
    /// ensemble fails here instead of on the first request.
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        if self.feature_names.is_empty() {
            bail!("Model declares no features");
        }
        if !self.is_fitted() {
            bail!("Model file holds no fitted ensemble");
        }

        let n = self.n_features();
        let mut grid = FeatureMatrix::new(n);
        for value in [f64::NAN, 0.0, 1.0, 7.0, 30.0, 80.0, 1e6] {
            grid.push_row(&vec![value; n])?;
        }
        for col in 0..n {
            let mut row = vec![1.0; n];
            row[col] = f64::NAN;
            grid.push_row(&row)?;
        }
        self.predict_proba_batch(&grid)?;
        Ok(())
    }
}

pub mod callbacks;
pub mod trainer;

use crate::model::checkpoint::Metrics;
use crate::model::loss::metrics::ClassificationReport;
use crate::model::BoosterConfig;
use serde::{Deserialize, Serialize};

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Maximum number of trees
    pub n_rounds: usize,
    /// Shrinkage per tree
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum number of rows in a leaf
    pub min_leaf_size: usize,
    /// Trees added between two validation checks
    pub eval_interval: usize,
    /// Checks without validation improvement before stopping (0 = disabled)
    pub early_stopping_rounds: usize,
    /// Minimum log-loss decrease that counts as improvement
    pub min_delta: f64,
    /// Share of rows held out for validation
    pub val_ratio: f64,
    /// Random seed for the split
    pub seed: u64,
    /// Log every N checks
    pub log_frequency: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_rounds: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_leaf_size: 1,
            eval_interval: 10,
            early_stopping_rounds: 3,
            min_delta: 0.0,
            val_ratio: 0.2,
            seed: 42,
            log_frequency: 1,
        }
    }
}

impl TrainingConfig {
    /// Create configuration for quick testing
    pub fn quick_test() -> Self {
        Self {
            n_rounds: 10,
            max_depth: 3,
            eval_interval: 2,
            early_stopping_rounds: 2,
            ..Default::default()
        }
    }

    /// Create configuration for production training
    pub fn production() -> Self {
        Self {
            n_rounds: 500,
            learning_rate: 0.05,
            max_depth: 5,
            eval_interval: 25,
            early_stopping_rounds: 4,
            ..Default::default()
        }
    }

    /// Ensemble sizes checked on validation, ending at `n_rounds`
    pub fn checkpoints(&self) -> Vec<usize> {
        let step = self.eval_interval.max(1);
        let mut sizes: Vec<usize> = (1..)
            .map(|k| k * step)
            .take_while(|&n| n < self.n_rounds)
            .collect();
        if self.n_rounds > 0 {
            sizes.push(self.n_rounds);
        }
        sizes
    }

    /// Booster settings for a given ensemble size and positive class weight
    pub fn booster_config(&self, n_trees: usize, scale_pos_weight: f64) -> BoosterConfig {
        BoosterConfig {
            n_trees,
            learning_rate: self.learning_rate,
            max_depth: self.max_depth,
            min_leaf_size: self.min_leaf_size,
            scale_pos_weight,
        }
    }
}

/// Training state
#[derive(Debug, Clone)]
pub struct TrainingState {
    /// Completed validation checks
    pub round: usize,
    /// Trees in the last checked ensemble
    pub n_trees: usize,
    /// Lowest validation log-loss so far
    pub best_metric: f64,
    /// Ensemble size at the best validation loss
    pub best_round: usize,
    /// Checks since the last improvement
    pub rounds_without_improvement: usize,
    /// Training log-loss per check
    pub train_loss_history: Vec<f64>,
    /// Validation log-loss per check
    pub val_loss_history: Vec<f64>,
}

impl TrainingState {
    /// Create new training state
    pub fn new() -> Self {
        Self {
            round: 0,
            n_trees: 0,
            best_metric: f64::INFINITY,
            best_round: 0,
            rounds_without_improvement: 0,
            train_loss_history: Vec::new(),
            val_loss_history: Vec::new(),
        }
    }

    /// Record one check of an `n_trees` ensemble; returns true when validation improved
    pub fn update_round(
        &mut self,
        n_trees: usize,
        train_loss: f64,
        val_loss: f64,
        min_delta: f64,
    ) -> bool {
        self.round += 1;
        self.n_trees = n_trees;
        self.train_loss_history.push(train_loss);
        self.val_loss_history.push(val_loss);

        if val_loss < self.best_metric - min_delta {
            self.best_metric = val_loss;
            self.best_round = n_trees;
            self.rounds_without_improvement = 0;
            true
        } else {
            self.rounds_without_improvement += 1;
            false
        }
    }

    /// Check if should stop early
    pub fn should_stop_early(&self, patience: usize) -> bool {
        patience > 0 && self.rounds_without_improvement >= patience
    }
}

impl Default for TrainingState {
    fn default() -> Self {
        Self::new()
    }
}

/// Training result
#[derive(Debug, Clone)]
pub struct TrainingResult {
    /// Final training state
    pub state: TrainingState,
    /// Where the model was written
    pub model_path: std::path::PathBuf,
    /// Validation metrics of the saved model
    pub final_metrics: Metrics,
    /// Validation classification report
    pub report: ClassificationReport,
    /// Training duration in seconds
    pub duration_secs: f64,
}

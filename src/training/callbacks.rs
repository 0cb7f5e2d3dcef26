use crate::model::checkpoint::Metrics;
use crate::training::TrainingState;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Training callback trait
///
/// Callbacks observe the boosting loop; they never alter the model.
pub trait TrainingCallback: Send + Sync {
    /// Called at the start of training
    fn on_train_begin(&mut self) {}

    /// Called at the end of training
    fn on_train_end(&mut self, _state: &TrainingState) {}

    /// Called after each validation check
    fn on_round_end(&mut self, _round: usize, _state: &TrainingState, _metrics: &Metrics) {}

    /// Called when the final validation metrics are known
    fn on_validation_end(&mut self, _metrics: &Metrics) {}

    /// Whether this callback asks the loop to stop
    fn should_stop(&self) -> bool {
        false
    }
}

/// Callback manager that handles multiple callbacks
pub struct CallbackManager {
    callbacks: Vec<Box<dyn TrainingCallback>>,
}

impl CallbackManager {
    /// Create new callback manager
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// Add a callback
    pub fn add_callback<C: TrainingCallback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn on_train_begin(&mut self) {
        for callback in &mut self.callbacks {
            callback.on_train_begin();
        }
    }

    pub fn on_train_end(&mut self, state: &TrainingState) {
        for callback in &mut self.callbacks {
            callback.on_train_end(state);
        }
    }

    pub fn on_round_end(&mut self, round: usize, state: &TrainingState, metrics: &Metrics) {
        for callback in &mut self.callbacks {
            callback.on_round_end(round, state, metrics);
        }
    }

    pub fn on_validation_end(&mut self, metrics: &Metrics) {
        for callback in &mut self.callbacks {
            callback.on_validation_end(metrics);
        }
    }

    /// True when any callback requested a stop
    pub fn should_stop(&self) -> bool {
        self.callbacks.iter().any(|c| c.should_stop())
    }
}

impl Default for CallbackManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Stops when validation log-loss has not improved for `patience` checks
pub struct EarlyStoppingCallback {
    patience: usize,
    stopped_at: Option<usize>,
}

impl EarlyStoppingCallback {
    /// Create new early stopping callback (0 disables it)
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            stopped_at: None,
        }
    }

    /// Check at which stopping was requested
    pub fn stopped_at(&self) -> Option<usize> {
        self.stopped_at
    }
}

impl TrainingCallback for EarlyStoppingCallback {
    fn on_round_end(&mut self, round: usize, state: &TrainingState, _metrics: &Metrics) {
        if self.stopped_at.is_none() && state.should_stop_early(self.patience) {
            self.stopped_at = Some(round);
            tracing::info!(
                "Early stopping at check {}: best validation loss {:.5} with {} trees",
                round,
                state.best_metric,
                state.best_round
            );
        }
    }

    fn should_stop(&self) -> bool {
        self.stopped_at.is_some()
    }
}

/// Progress logging callback
pub struct ProgressLoggerCallback {
    log_frequency: usize,
}

impl ProgressLoggerCallback {
    /// Create new progress logger
    pub fn new(log_frequency: usize) -> Self {
        Self {
            log_frequency: log_frequency.max(1),
        }
    }
}

impl TrainingCallback for ProgressLoggerCallback {
    fn on_round_end(&mut self, round: usize, state: &TrainingState, metrics: &Metrics) {
        if round % self.log_frequency == 0 {
            tracing::info!(
                "Check {} ({} trees) - train logloss: {:.5}, val logloss: {:.5}, val AUROC: {}",
                round,
                state.n_trees,
                state.train_loss_history.last().copied().unwrap_or(f64::NAN),
                metrics.loss,
                metrics
                    .auroc
                    .map(|v| format!("{:.4}", v))
                    .unwrap_or_else(|| "n/a".to_string())
            );
        }
    }

    fn on_validation_end(&mut self, metrics: &Metrics) {
        tracing::info!(
            "Validation - logloss: {:.4}, accuracy: {:.4}, precision: {:.4}, recall: {:.4}, F1: {:.4}",
            metrics.loss,
            metrics.accuracy,
            metrics.precision,
            metrics.recall,
            metrics.f1
        );
    }
}

/// Writes per-check metrics to a JSON file
pub struct MetricsLoggerCallback {
    log_file: PathBuf,
    metrics_history: Vec<(usize, Metrics)>,
}

impl MetricsLoggerCallback {
    /// Create new metrics logger
    pub fn new<P: AsRef<Path>>(log_file: P) -> Self {
        Self {
            log_file: log_file.as_ref().to_path_buf(),
            metrics_history: Vec::new(),
        }
    }

    fn save_metrics(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.log_file.parent() {
            crate::utils::ensure_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.metrics_history)?;
        std::fs::write(&self.log_file, json)?;
        Ok(())
    }
}

impl TrainingCallback for MetricsLoggerCallback {
    fn on_round_end(&mut self, round: usize, _state: &TrainingState, metrics: &Metrics) {
        self.metrics_history.push((round, metrics.clone()));
    }

    fn on_train_end(&mut self, _state: &TrainingState) {
        if let Err(e) = self.save_metrics() {
            tracing::warn!("Failed to save round metrics: {}", e);
        }
    }
}

/// Logs total training time
pub struct TimerCallback {
    start_time: Option<Instant>,
}

impl TimerCallback {
    /// Create new timer callback
    pub fn new() -> Self {
        Self { start_time: None }
    }
}

impl Default for TimerCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingCallback for TimerCallback {
    fn on_train_begin(&mut self) {
        self.start_time = Some(Instant::now());
        tracing::info!("Training started");
    }

    fn on_train_end(&mut self, state: &TrainingState) {
        if let Some(start) = self.start_time {
            tracing::info!(
                "Training completed in {} ({} validation checks)",
                crate::utils::format_duration(start.elapsed().as_secs_f64()),
                state.round
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_early_stopping() {
        let mut callback = EarlyStoppingCallback::new(2);
        let metrics = Metrics::default();
        let mut state = TrainingState::new();

        state.update_round(10, 0.5, 1.0, 0.0);
        callback.on_round_end(1, &state, &metrics);
        assert!(!callback.should_stop());

        state.update_round(20, 0.4, 1.1, 0.0);
        callback.on_round_end(2, &state, &metrics);
        assert!(!callback.should_stop());

        state.update_round(30, 0.3, 1.2, 0.0);
        callback.on_round_end(3, &state, &metrics);
        assert!(callback.should_stop());
        assert_eq!(callback.stopped_at(), Some(3));
    }

    #[test]
    fn test_callback_manager() {
        let mut manager = CallbackManager::new();
        manager.add_callback(ProgressLoggerCallback::new(1));
        manager.add_callback(TimerCallback::new());
        manager.add_callback(EarlyStoppingCallback::new(0));

        manager.on_train_begin();
        let mut state = TrainingState::new();
        state.update_round(5, 0.5, 0.5, 0.0);
        manager.on_round_end(1, &state, &Metrics::default());
        assert!(!manager.should_stop());
        manager.on_train_end(&state);
    }

    #[test]
    fn test_metrics_logger_writes_history() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rounds.json");
        let mut logger = MetricsLoggerCallback::new(&path);
        let state = TrainingState::new();
        logger.on_round_end(1, &state, &Metrics { loss: 0.6, ..Default::default() });
        logger.on_round_end(2, &state, &Metrics { loss: 0.5, ..Default::default() });
        logger.on_train_end(&state);

        let text = std::fs::read_to_string(&path).unwrap();
        let history: Vec<(usize, Metrics)> = serde_json::from_str(&text).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].1.loss, 0.5);
    }
}

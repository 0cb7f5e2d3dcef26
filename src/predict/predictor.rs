use crate::data::{Frame, FEATURE_PREFIX, SEQN_COLUMN};
use crate::model::booster::GradientBoostedClassifier;
use crate::model::checkpoint::ModelSaver;
use crate::model::FeatureMatrix;
use crate::predict::{drivers, BatchScores, RiskFeatures, RiskScore, ScoreError, ScoredRow};
use anyhow::Result;
use std::path::Path;
use tracing::{error, info};

enum ScorerState {
    Ready(GradientBoostedClassifier),
    Unavailable(String),
}

/// Scores subjects with the trained model
///
/// Loading never fails: a missing or unreadable artifact leaves the scorer
/// unavailable and every call returns `ScoreError::ModelUnavailable`.
pub struct RiskScorer {
    state: ScorerState,
}

impl RiskScorer {
    /// Load the model artifact
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match ModelSaver::load(path) {
            Ok(model) => Self::from_model(model),
            Err(e) => {
                error!("Risk model could not be loaded from {:?}: {:#}", path, e);
                Self::unavailable(format!("failed to load {}: {}", path.display(), e))
            }
        }
    }

    /// Wrap an in-memory model
    pub fn from_model(model: GradientBoostedClassifier) -> Self {
        Self {
            state: ScorerState::Ready(model),
        }
    }

    /// Scorer that refuses every request
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self {
            state: ScorerState::Unavailable(reason.into()),
        }
    }

    /// Check if a model is loaded
    pub fn is_ready(&self) -> bool {
        matches!(self.state, ScorerState::Ready(_))
    }

    /// Loaded model
    pub fn model(&self) -> Result<&GradientBoostedClassifier, ScoreError> {
        match &self.state {
            ScorerState::Ready(model) => Ok(model),
            ScorerState::Unavailable(reason) => Err(ScoreError::ModelUnavailable(reason.clone())),
        }
    }

    /// Compare provided feature names with the model's
    pub fn check_schema(&self, provided: &[&str]) -> Result<&GradientBoostedClassifier, ScoreError> {
        let model = self.model()?;
        let missing: Vec<String> = model
            .feature_names
            .iter()
            .filter(|name| !provided.contains(&name.as_str()))
            .cloned()
            .collect();
        let extra: Vec<String> = provided
            .iter()
            .filter(|name| !model.feature_names.iter().any(|n| n.as_str() == **name))
            .map(|name| name.to_string())
            .collect();
        if missing.is_empty() && extra.is_empty() {
            Ok(model)
        } else {
            Err(ScoreError::SchemaMismatch { missing, extra })
        }
    }

    /// Probability for named values given in any order
    pub fn probability(&self, values: &[(&str, f64)]) -> Result<f64, ScoreError> {
        let names: Vec<&str> = values.iter().map(|(n, _)| *n).collect();
        let model = self.check_schema(&names)?;

        if let Some((name, value)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ScoreError::InvalidValue {
                feature: name.to_string(),
                value: *value,
            });
        }

        let row: Vec<f64> = model
            .feature_names
            .iter()
            .map(|name| {
                values
                    .iter()
                    .find(|(n, _)| *n == name.as_str())
                    .map(|(_, v)| *v)
                    .unwrap_or(f64::NAN)
            })
            .collect();
        model
            .predict_proba(&row)
            .map_err(|e| ScoreError::ModelUnavailable(format!("model evaluation failed: {:#}", e)))
    }

    /// Score one subject and explain the result
    pub fn score(&self, features: &RiskFeatures) -> Result<RiskScore, ScoreError> {
        let probability = self.probability(&features.named_values())?;
        Ok(RiskScore::new(probability, drivers::explain(features)))
    }

    /// Score every row of an engineered feature table
    ///
    /// Missing cells are passed to the model as missing values.
    pub fn score_frame(&self, frame: &Frame) -> Result<BatchScores> {
        let provided: Vec<&str> = frame
            .column_names()
            .iter()
            .map(|s| s.as_str())
            .filter(|name| name.starts_with(FEATURE_PREFIX))
            .collect();
        let model = self.check_schema(&provided)?;

        let matrix = FeatureMatrix::from_frame(frame, &model.feature_names)?;
        let probabilities = model.predict_proba_batch(&matrix)?;
        let ids = frame.column(SEQN_COLUMN);

        let rows = probabilities
            .into_iter()
            .enumerate()
            .map(|(r, p)| {
                let score = RiskScore::new(p, Vec::new());
                ScoredRow {
                    seqn: ids.and_then(|c| c[r]).map(|v| v as i64),
                    risk_score: score.risk_score,
                    prediction: score.prediction,
                }
            })
            .collect();
        let batch = BatchScores::new(rows);
        info!(
            "Scored {} rows, {} flagged at risk",
            batch.summary.total, batch.summary.positive
        );
        Ok(batch)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::data::FEATURE_COLUMNS;
    use crate::model::booster::GradientBoostedClassifier;
    use crate::model::{BoosterConfig, FeatureMatrix};

    /// Small model where age and body-mass index drive the risk
    pub(crate) fn fixture_model() -> GradientBoostedClassifier {
        let mut data = FeatureMatrix::new(FEATURE_COLUMNS.len());
        let mut labels = Vec::new();
        for i in 0..120 {
            let age = 20.0 + (i % 60) as f64;
            let imc = 18.0 + (i * 7 % 22) as f64;
            data.push_row(&[imc, imc / 50.0, age, (i % 2) as f64, 0.0, 7.0, 3.0])
                .unwrap();
            labels.push(if age >= 55.0 || imc >= 34.0 { 1.0 } else { 0.0 });
        }

        let names = FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect();
        let mut model = GradientBoostedClassifier::new(BoosterConfig::small(), names);
        model.fit(&data, &labels).unwrap();
        model
    }
}

pub mod drivers;
pub mod predictor;

pub use drivers::Driver;
pub use predictor::RiskScorer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Probability at or above which a subject is flagged at risk
pub const RISK_THRESHOLD: f64 = 0.5;

/// One subject's engineered features, as sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFeatures {
    pub feat_imc: f64,
    pub feat_whtr: f64,
    pub feat_age: i64,
    /// 0 = male, 1 = female
    pub feat_sex: i64,
    /// 1 = current smoker
    pub feat_is_smoker: i64,
    pub feat_sleep_hours: f64,
    pub feat_activity_days: f64,
}

impl RiskFeatures {
    /// Feature values keyed by column name, in engineered order
    pub fn named_values(&self) -> [(&'static str, f64); 7] {
        [
            ("feat_imc", self.feat_imc),
            ("feat_whtr", self.feat_whtr),
            ("feat_age", self.feat_age as f64),
            ("feat_sex", self.feat_sex as f64),
            ("feat_is_smoker", self.feat_is_smoker as f64),
            ("feat_sleep_hours", self.feat_sleep_hours),
            ("feat_activity_days", self.feat_activity_days),
        ]
    }

    /// Value of a single feature
    pub fn value(&self, name: &str) -> Option<f64> {
        self.named_values()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }
}

/// Why a subject could not be scored
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("risk model is not available: {0}")]
    ModelUnavailable(String),

    #[error("feature schema mismatch (missing: {missing:?}, extra: {extra:?})")]
    SchemaMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
    },

    #[error("feature {feature} has invalid value {value}")]
    InvalidValue { feature: String, value: f64 },
}

/// Scored subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    /// Probability of hypertension in [0, 1]
    pub risk_score: f64,
    /// 1 when the score reaches the risk threshold
    pub prediction: u8,
    /// Heuristic contributing factors
    #[serde(default)]
    pub drivers: Vec<Driver>,
}

impl RiskScore {
    /// Create from a probability
    pub fn new(risk_score: f64, drivers: Vec<Driver>) -> Self {
        Self {
            risk_score,
            prediction: u8::from(risk_score >= RISK_THRESHOLD),
            drivers,
        }
    }

    /// Check if the subject is flagged at risk
    pub fn is_positive(&self) -> bool {
        self.prediction == 1
    }

    /// Plain-language risk level
    pub fn risk_level(&self) -> &'static str {
        if self.is_positive() {
            "high"
        } else {
            "low"
        }
    }
}

/// Score of one row of a batch table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRow {
    #[serde(rename = "SEQN")]
    pub seqn: Option<i64>,
    pub risk_score: f64,
    pub prediction: u8,
}

/// Batch scoring results
#[derive(Debug, Clone, Serialize)]
pub struct BatchScores {
    pub rows: Vec<ScoredRow>,
    pub summary: ScoreSummary,
}

impl BatchScores {
    /// Create from scored rows
    pub fn new(rows: Vec<ScoredRow>) -> Self {
        let summary = ScoreSummary::from_rows(&rows);
        Self { rows, summary }
    }

    /// Write the rows as CSV
    pub fn save_csv<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            crate::utils::ensure_dir(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Batch summary statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub total: usize,
    pub positive: usize,
    pub negative: usize,
    pub positive_rate: f64,
    pub avg_score: f64,
}

impl ScoreSummary {
    /// Summarize scored rows
    pub fn from_rows(rows: &[ScoredRow]) -> Self {
        let total = rows.len();
        let positive = rows.iter().filter(|r| r.prediction == 1).count();
        let ratio = |x: f64| if total > 0 { x / total as f64 } else { 0.0 };
        Self {
            total,
            positive,
            negative: total - positive,
            positive_rate: ratio(positive as f64),
            avg_score: ratio(rows.iter().map(|r| r.risk_score).sum()),
        }
    }

    /// Print summary to stdout
    pub fn print(&self) {
        println!("\n=== Risk Score Summary ===");
        println!("Subjects scored: {}", self.total);
        println!(
            "Flagged at risk: {} ({:.2}%)",
            self.positive,
            self.positive_rate * 100.0
        );
        println!("Not flagged: {}", self.negative);
        println!("Average risk score: {:.4}", self.avg_score);
        println!("==========================\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_features() -> RiskFeatures {
        RiskFeatures {
            feat_imc: 27.68,
            feat_whtr: 0.559,
            feat_age: 52,
            feat_sex: 0,
            feat_is_smoker: 1,
            feat_sleep_hours: 6.0,
            feat_activity_days: 2.0,
        }
    }

    #[test]
    fn test_named_values_follow_feature_order() {
        let features = sample_features();
        let names: Vec<&str> = features.named_values().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, crate::data::FEATURE_COLUMNS.to_vec());
        assert_eq!(features.value("feat_age"), Some(52.0));
        assert_eq!(features.value("SEQN"), None);
    }

    #[test]
    fn test_request_uses_integer_codes() {
        let json = r#"{"feat_imc": 24.1, "feat_whtr": 0.45, "feat_age": 30, "feat_sex": 1,
            "feat_is_smoker": 0, "feat_sleep_hours": 7.5, "feat_activity_days": 4}"#;
        let features: RiskFeatures = serde_json::from_str(json).unwrap();
        assert_eq!(features.feat_sex, 1);
        assert_eq!(features.feat_activity_days, 4.0);
        assert!(serde_json::from_str::<RiskFeatures>(r#"{"feat_imc": 1.0}"#).is_err());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(RiskScore::new(0.5, vec![]).prediction, 1);
        assert_eq!(RiskScore::new(0.4999, vec![]).risk_level(), "low");
    }

    #[test]
    fn test_summary() {
        let rows = vec![
            ScoredRow { seqn: Some(1), risk_score: 0.8, prediction: 1 },
            ScoredRow { seqn: Some(2), risk_score: 0.2, prediction: 0 },
        ];
        let batch = BatchScores::new(rows);
        assert_eq!(batch.summary.positive, 1);
        assert!((batch.summary.avg_score - 0.5).abs() < 1e-12);

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scores.csv");
        batch.save_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("SEQN,risk_score,prediction"));
    }

    #[test]
    fn test_error_names_columns() {
        let err = ScoreError::SchemaMismatch {
            missing: vec!["feat_bmi".into()],
            extra: vec![],
        };
        assert!(err.to_string().contains("feat_bmi"));
    }
}

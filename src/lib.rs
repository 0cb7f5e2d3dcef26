//! # NexusByte: Hypertension Risk Pipeline and Wellness Coach
//!
//! NexusByte builds a hypertension risk model from public health-survey
//! tables and serves it next to a retrieval-augmented wellness coach.
//!
//! ## Features
//!
//! - Download of survey instrument tables (SAS transport files) per split
//! - Per-subject outer merge, target labeling and feature engineering with
//!   frozen training medians
//! - Gradient-boosted tree classifier with early stopping
//! - Risk scoring with heuristic risk drivers
//! - Coach answering from a small knowledge base through an OpenAI-compatible API
//! - HTTP API, terminal chat and paginated report export
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use nexusbyte::data::feature_engineering::FeatureEngineer;
//! use nexusbyte::data::labeler::TargetLabeler;
//! use nexusbyte::data::merge::Merger;
//! use nexusbyte::predict::{RiskFeatures, RiskScorer};
//! use nexusbyte::training::{trainer::Trainer, TrainingConfig};
//!
//! // Build the stage files from downloaded raw tables
//! Merger::new("data/raw").run("data/processed").unwrap();
//! TargetLabeler::new().run("data/processed").unwrap();
//! FeatureEngineer::new()
//!     .run("data/processed", "models/feature_medians.json")
//!     .unwrap();
//!
//! // Train and persist the model
//! let trainer = Trainer::new(TrainingConfig::default());
//! trainer
//!     .train(
//!         "data/processed/train_final_features.csv",
//!         "models/hypertension_model.json",
//!     )
//!     .unwrap();
//!
//! // Score a subject
//! let scorer = RiskScorer::load("models/hypertension_model.json");
//! let score = scorer
//!     .score(&RiskFeatures {
//!         feat_imc: 31.5,
//!         feat_whtr: 0.62,
//!         feat_age: 58,
//!         feat_sex: 1,
//!         feat_is_smoker: 0,
//!         feat_sleep_hours: 6.0,
//!         feat_activity_days: 1.0,
//!     })
//!     .unwrap();
//! println!("risk {:.2}", score.risk_score);
//! ```

pub mod app;
pub mod chat;
pub mod cli;
pub mod coach;
pub mod config;
pub mod data;
pub mod model;
pub mod predict;
pub mod report;
pub mod server;
pub mod training;
pub mod utils;

/// Re-export commonly used types
pub use app::AppContext;
pub use coach::Coach;
pub use config::AppConfig;
pub use data::loader::DataLoader;
pub use data::{Frame, Split};
pub use model::booster::GradientBoostedClassifier;
pub use predict::{RiskFeatures, RiskScore, RiskScorer};
pub use training::{TrainingConfig, TrainingResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!(
        "{} v{} - hypertension risk scoring and wellness coach",
        NAME, VERSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_info() {
        let info_str = info();
        assert!(info_str.contains("nexusbyte"));
        assert!(info_str.contains(VERSION));
    }
}

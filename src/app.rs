//! Application context shared by every serving surface

use crate::coach::{ChatTurn, Coach, CoachResult};
use crate::config::AppConfig;
use crate::predict::{RiskFeatures, RiskScore, RiskScorer, ScoreError};
use serde::Serialize;
use tracing::info;

/// Loaded parts, built once at start-up and shared read-only
pub struct AppContext {
    pub scorer: RiskScorer,
    pub coach: Coach,
}

/// Which parts of the service are usable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub model_loaded: bool,
    pub coach_available: bool,
}

impl AppContext {
    pub fn new(scorer: RiskScorer, coach: Coach) -> Self {
        Self { scorer, coach }
    }

    /// Load the model artifact and connect the coach
    ///
    /// Neither part failing stops start-up; each one reports itself
    /// unavailable instead.
    pub async fn load(config: &AppConfig) -> Self {
        info!("Loading risk model from {:?}", config.model.path);
        let scorer = RiskScorer::load(&config.model.path);
        let coach = Coach::connect(&config.coach).await;
        let context = Self::new(scorer, coach);
        let status = context.status();
        info!(
            "Service ready (model loaded: {}, coach available: {})",
            status.model_loaded, status.coach_available
        );
        context
    }

    pub fn predict(&self, features: &RiskFeatures) -> Result<RiskScore, ScoreError> {
        self.scorer.score(features)
    }

    /// Advice for a scored subject
    pub async fn coach(&self, score: &RiskScore) -> String {
        self.coach.coach_message(score).await
    }

    /// Two-week plan for a scored subject
    pub async fn action_plan(&self, score: &RiskScore) -> CoachResult<String> {
        self.coach.action_plan(score).await
    }

    pub async fn chat(&self, question: &str, history: &[ChatTurn]) -> String {
        self.coach.chat(question, history).await
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            status: "ok",
            service: crate::NAME,
            version: crate::VERSION,
            model_loaded: self.scorer.is_ready(),
            coach_available: self.coach.is_ready(),
        }
    }
}

//! HTTP API over the application context
//!
//! | Route | Body | Reply |
//! | --- | --- | --- |
//! | `GET /` | | service status |
//! | `POST /predict` | the seven `feat_*` values | `risk_score`, `prediction`, `drivers` |
//! | `POST /coach` | a prediction reply | `user_risk_score`, `coach_message` |
//! | `POST /chat` | `query` and prior `history` turns | `response` |

use crate::app::{AppContext, ServiceStatus};
use crate::coach::ChatTurn;
use crate::predict::{Driver, RiskFeatures, RiskScore, ScoreError};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

type SharedContext = Arc<AppContext>;

/// JSON error reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<String>,
}

impl ErrorBody {
    fn new(error: &str, message: String) -> Self {
        Self {
            error: error.to_string(),
            message,
            missing: Vec::new(),
            extra: Vec::new(),
        }
    }
}

struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn unprocessable(message: String) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ErrorBody::new("invalid_request", message),
        }
    }
}

impl From<ScoreError> for ApiError {
    fn from(e: ScoreError) -> Self {
        let message = e.to_string();
        match e {
            ScoreError::ModelUnavailable(_) => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: ErrorBody::new("model_unavailable", message),
            },
            ScoreError::SchemaMismatch { missing, extra } => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: ErrorBody {
                    error: "schema_mismatch".to_string(),
                    message,
                    missing,
                    extra,
                },
            },
            ScoreError::InvalidValue { .. } => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: ErrorBody::new("invalid_value", message),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// `/coach` request: the reply of `/predict`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachRequest {
    pub risk_score: f64,
    pub prediction: u8,
    #[serde(default)]
    pub drivers: Vec<Driver>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachReply {
    pub user_risk_score: f64,
    pub coach_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
}

/// Build the router
pub fn router(context: SharedContext) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/predict", post(predict))
        .route("/coach", post(coach))
        .route("/chat", post(chat))
        .with_state(context)
}

/// Bind and serve until the process stops
pub async fn serve(context: SharedContext, address: &str) -> Result<()> {
    let app = router(context);
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Serving risk API on http://{}", address);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn status(State(context): State<SharedContext>) -> Json<ServiceStatus> {
    Json(context.status())
}

async fn predict(
    State(context): State<SharedContext>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<RiskScore>, ApiError> {
    // names are checked first so the reply can list them
    let names: Vec<&str> = body.keys().map(String::as_str).collect();
    context.scorer.check_schema(&names)?;

    let features: RiskFeatures = serde_json::from_value(Value::Object(body))
        .map_err(|e| ApiError::unprocessable(e.to_string()))?;
    let score = context.predict(&features).map_err(|e| {
        warn!("Prediction rejected: {}", e);
        ApiError::from(e)
    })?;
    debug!("Scored request: {:.4}", score.risk_score);
    Ok(Json(score))
}

async fn coach(
    State(context): State<SharedContext>,
    Json(request): Json<CoachRequest>,
) -> Result<Json<CoachReply>, ApiError> {
    if !(0.0..=1.0).contains(&request.risk_score) {
        return Err(ApiError::unprocessable(format!(
            "risk_score must be within [0, 1], got {}",
            request.risk_score
        )));
    }
    let score = RiskScore {
        risk_score: request.risk_score,
        prediction: request.prediction,
        drivers: request.drivers,
    };
    let coach_message = context.coach(&score).await;
    Ok(Json(CoachReply {
        user_risk_score: score.risk_score,
        coach_message,
    }))
}

async fn chat(
    State(context): State<SharedContext>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatReply> {
    let response = context.chat(&request.query, &request.history).await;
    Json(ChatReply { response })
}

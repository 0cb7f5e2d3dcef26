//! Retrieval-augmented wellness coach
//!
//! Questions are embedded, matched against a small knowledge-base index and
//! answered by a hosted chat model from the retrieved context plus the prior
//! conversation. When the index or the model client could not be set up the
//! coach stays usable and answers every request with [`UNAVAILABLE_MESSAGE`].

pub mod engine;
pub mod index;
pub mod prompt;
pub mod provider;
pub mod splitter;

pub use engine::Coach;
pub use index::VectorIndex;
pub use provider::{ChatModel, EmbeddingProvider};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reply when the coach could not be initialized
pub const UNAVAILABLE_MESSAGE: &str =
    "ERROR: The RAG system is not available right now, so the coach cannot answer. \
     The risk calculator still works.";

/// Suffix of every answered chat reply
pub const DISCLAIMER: &str = "THIS PLAN DOES NOT REPLACE MEDICAL CONSULTATION. \
     IF IN DOUBT, CONSULT A HEALTH PROFESSIONAL.";

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// `user` or `assistant`
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Coach failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoachError {
    #[error("coach is not available: {0}")]
    Unavailable(String),

    #[error("{provider} request failed (status {status}): {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("index error: {0}")]
    Index(String),
}

pub type CoachResult<T> = Result<T, CoachError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_roles() {
        assert_eq!(ChatTurn::user("hi").role, "user");
        assert_eq!(ChatTurn::assistant("hello").role, "assistant");
    }

    #[test]
    fn test_turn_json_shape() {
        let turn: ChatTurn = serde_json::from_str(r#"{"role":"user","content":"hola"}"#).unwrap();
        assert_eq!(turn, ChatTurn::user("hola"));
    }
}

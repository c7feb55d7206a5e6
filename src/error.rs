//! Error taxonomy shared by resolution and progression
//!
//! Every failure mode is a typed value. Resolution errors are reported per
//! batch item and progression errors per progression, so nothing here is
//! ever fatal to sibling work.

use serde::Serialize;

use crate::models::MaxKind;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
  /// Bad scheme/strategy/progression parameters. Caller configuration error.
  #[error("Validation failed: {0}")]
  Validation(String),

  #[error("No {max_kind} recorded for user {user_id}, lift {lift_id}")]
  MaxNotFound {
    user_id: String,
    lift_id: String,
    max_kind: MaxKind,
  },

  #[error("Not found: {0}")]
  NotFound(String),

  /// The progression's transaction was rolled back. Safe to retry.
  #[error("Transaction failed: {0}")]
  TransactionFailed(String),

  #[error("Database error: {0}")]
  Database(String),
}

impl EngineError {
  pub fn validation(msg: impl Into<String>) -> Self {
    Self::Validation(msg.into())
  }

  pub fn max_not_found(user_id: &str, lift_id: &str, max_kind: MaxKind) -> Self {
    Self::MaxNotFound {
      user_id: user_id.to_string(),
      lift_id: lift_id.to_string(),
      max_kind,
    }
  }

  /// Stable machine-readable code for the HTTP layer
  pub fn code(&self) -> &'static str {
    match self {
      Self::Validation(_) => "validation_failed",
      Self::MaxNotFound { .. } => "max_not_found",
      Self::NotFound(_) => "not_found",
      Self::TransactionFailed(_) => "transaction_failed",
      Self::Database(_) => "database",
    }
  }

  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::TransactionFailed(_) | Self::Database(_))
  }
}

impl From<sqlx::Error> for EngineError {
  fn from(e: sqlx::Error) -> Self {
    match e {
      sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
      other => Self::Database(other.to_string()),
    }
  }
}

impl From<serde_json::Error> for EngineError {
  fn from(e: serde_json::Error) -> Self {
    Self::Validation(format!("Malformed JSON: {}", e))
  }
}

impl Serialize for EngineError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

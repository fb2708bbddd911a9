use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::store::VersionToken;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Wager error: {0}")]
    Wager(#[from] WagerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Persistence unavailable for {key} after {attempts} attempt(s): {reason}")]
    PersistenceUnavailable {
        key: String,
        attempts: u32,
        reason: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External service error: {0}")]
    ExternalError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Malformed input rejected at a boundary. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Stake must be a positive number of points")]
    InvalidStake,

    #[error("Odds must be greater than zero, got {0}")]
    InvalidOdds(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Unknown sport: {0}")]
    UnknownSport(String),

    #[error("Invalid round claim: {0}")]
    InvalidRound(String),

    #[error("Invalid method claim: {0}")]
    InvalidMethod(String),

    #[error("Winning selection is empty for {contest_id}/{match_id}")]
    EmptyWinner { contest_id: String, match_id: String },

    #[error("Contest {contest_id} is {sport}, not {requested}")]
    SportMismatch {
        contest_id: String,
        sport: String,
        requested: String,
    },

    #[error("Contest {0} is already settled")]
    ContestSettled(String),

    #[error("Contest {0} is closed to new wagers")]
    ContestClosed(String),

    #[error("Match {match_id} in {contest_id} already has a result")]
    MatchDecided { contest_id: String, match_id: String },

    #[error("Account already exists: {0}")]
    DuplicateAccount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Wager placement errors that are visible to the bettor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WagerError {
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("Unknown bettor: {0}")]
    UnknownBettor(String),

    #[error("Empty wager slip")]
    EmptySlip,
}

/// Errors raised by a versioned document store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Version conflict on {key}: expected {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: VersionToken,
        actual: VersionToken,
    },

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Document {key} is corrupt: {message}")]
    Corrupt { key: String, message: String },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        StoreError::Backend(format!("Database error: {:?}", error))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        AppError::Store(error.into())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::ExternalError(format!("HTTP error: {}", error))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", None),
            AppError::Wager(WagerError::InsufficientBalance { required, available }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INSUFFICIENT_BALANCE",
                Some(serde_json::json!({
                    "required": required,
                    "available": available,
                })),
            ),
            AppError::Wager(WagerError::UnknownBettor(_)) => {
                (StatusCode::NOT_FOUND, "UNKNOWN_BETTOR", None)
            }
            AppError::Wager(WagerError::EmptySlip) => {
                (StatusCode::BAD_REQUEST, "EMPTY_SLIP", None)
            }
            AppError::PersistenceUnavailable { key, attempts, .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "PERSISTENCE_UNAVAILABLE",
                Some(serde_json::json!({
                    "key": key,
                    "attempts": attempts,
                })),
            ),
            AppError::Store(StoreError::Conflict { .. }) => {
                (StatusCode::CONFLICT, "VERSION_CONFLICT", None)
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", None),
            AppError::ExternalError(_) => (StatusCode::BAD_GATEWAY, "EXTERNAL_ERROR", None),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", None),
        };

        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "An internal error occurred".to_string(),
            _ => self.to_string(),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

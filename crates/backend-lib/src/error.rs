// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use warden_common::{ErrorBody, ErrorDetail};

use crate::auth::PolicyError;
use crate::storage::StoreError;

/// A single rejected input field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Malformed settings or account input. Carries every offending field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} invalid field(s): {}", .errors.len(), join_fields(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new(field, message)],
        }
    }

    /// Whether `field` is among the rejected fields
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

impl From<Vec<FieldError>> for ValidationError {
    fn from(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Every per-request outcome that is not a success
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Password rejected: {0}")]
    PasswordPolicy(#[from] PolicyError),

    #[error("Account locked until {retry_after}")]
    AccountLocked {
        retry_after: DateTime<Utc>,
        /// Whole seconds left on the lock, at least 1
        retry_after_secs: i64,
    },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session revoked")]
    SessionRevoked,

    #[error("Session expired")]
    SessionExpired,

    #[error("Password change required")]
    RequiresPasswordChange,

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Lock refusal as seen at `now`
    pub fn locked(retry_after: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        AppError::AccountLocked {
            retry_after,
            retry_after_secs: (retry_after - now).num_seconds().max(1),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::PasswordPolicy(_) => StatusCode::BAD_REQUEST,
            AppError::AccountLocked { .. } => StatusCode::LOCKED,
            AppError::InvalidCredentials
            | AppError::SessionNotFound
            | AppError::SessionRevoked
            | AppError::SessionExpired
            | AppError::RequiresPasswordChange => StatusCode::UNAUTHORIZED,
            AppError::Persistence(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VAL_001",
            AppError::PasswordPolicy(_) => "VAL_002",
            AppError::InvalidCredentials => "AUTH_001",
            AppError::AccountLocked { .. } => "AUTH_003",
            AppError::RequiresPasswordChange => "AUTH_004",
            AppError::SessionNotFound => "SESS_001",
            AppError::SessionRevoked => "SESS_002",
            AppError::SessionExpired => "SESS_003",
            AppError::Persistence(_) => "INT_001",
            AppError::Internal(_) => "INT_002",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Validation(_) => "Invalid input provided".to_string(),
            AppError::PasswordPolicy(_) => "Password does not meet the policy".to_string(),
            AppError::AccountLocked { .. } => {
                "Account temporarily locked, please try again later".to_string()
            },
            AppError::InvalidCredentials => "Authentication failed".to_string(),
            AppError::SessionNotFound | AppError::SessionRevoked | AppError::SessionExpired => {
                "Session is no longer valid, please sign in again".to_string()
            },
            AppError::RequiresPasswordChange => "Password change required".to_string(),
            AppError::Persistence(_) | AppError::Internal(_) => {
                "An internal server error occurred".to_string()
            },
        }
    }

    /// Field-level detail, safe to show to the caller
    pub fn details(&self) -> Vec<String> {
        match self {
            AppError::Validation(err) => err.errors.iter().map(ToString::to_string).collect(),
            AppError::PasswordPolicy(err) => {
                err.unmet_rules.iter().map(ToString::to_string).collect()
            },
            _ => Vec::new(),
        }
    }

    /// True for the session failures that mean "authenticate again"
    pub fn is_session_failure(&self) -> bool {
        matches!(
            self,
            AppError::SessionNotFound | AppError::SessionRevoked | AppError::SessionExpired
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message,
                details: self.details(),
            },
        };

        let mut response = (status, axum::Json(body)).into_response();

        if let AppError::AccountLocked {
            retry_after_secs, ..
        } = &self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

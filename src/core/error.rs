use serde::Serialize;
use thiserror::Error;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CrudError {
    #[error("Bad request: {message}")]
    BadRequest {
        message: String,
        reason: Option<String>,
        annotated_input: Option<String>,
    },

    #[error("Validation failed: {} field error(s)", errors.len())]
    ValidationFailed { errors: Vec<FieldError> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CrudError>;

impl CrudError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            reason: None,
            annotated_input: None,
        }
    }

    /// Attaches a reason to a `BadRequest`; other variants pass through untouched.
    pub fn with_reason(self, reason: impl Into<String>) -> Self {
        match self {
            Self::BadRequest {
                message,
                annotated_input,
                ..
            } => Self::BadRequest {
                message,
                reason: Some(reason.into()),
                annotated_input,
            },
            other => other,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Transport status category for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest { .. } | Self::ValidationFailed { .. } => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound(_) => 404,
            Self::Integrity(_) | Self::Store(_) | Self::Internal(_) | Self::Json(_) => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Integrity(_) => "integrity_error",
            Self::Store(_) => "store_error",
            Self::Internal(_) | Self::Json(_) => "internal_error",
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }

    /// Client-facing payload. Internal failures never leak their message.
    pub fn payload(&self) -> ErrorPayload {
        let message = if self.is_client_error() {
            match self {
                Self::BadRequest { message, .. } => message.clone(),
                other => other.to_string(),
            }
        } else {
            "An internal server error occurred".to_string()
        };

        let (reason, annotated_input, errors) = match self {
            Self::BadRequest {
                reason,
                annotated_input,
                ..
            } => (reason.clone(), annotated_input.clone(), None),
            Self::ValidationFailed { errors } => (None, None, Some(errors.clone())),
            _ => (None, None, None),
        };

        ErrorPayload {
            status: self.status(),
            error: self.code(),
            message,
            reason,
            annotated_input,
            errors,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub status: u16,
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated_input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl<T> From<std::sync::PoisonError<T>> for CrudError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("lock poisoned: {err}"))
    }
}

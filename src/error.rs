use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required setting '{0}' is not set")]
    Missing(&'static str),

    #[error("setting '{name}' has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error("failed to read credentials: {0}")]
    Credentials(String),

    #[error("failed to load point rules: {0}")]
    Rules(String),
}

/// Any failure talking to the spreadsheet. Callers treat every variant as "storage unavailable".
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("spreadsheet storage is not configured")]
    NotConfigured,

    #[error("spreadsheet request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("spreadsheet authentication failed: {0}")]
    Auth(String),

    #[error("spreadsheet responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to sign service account assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("point total for {user_id} overflows; check the spreadsheet for bad rows")]
    TotalOverflow { user_id: String },
}

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("LINE request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LINE responded with {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("point rule keyword must not be empty")]
    EmptyKeyword,

    #[error("point rule keyword '{0}' is defined more than once")]
    Duplicate(String),

    #[error("point rule keyword '{0}' collides with a command")]
    ReservedKeyword(String),

    #[error("point rule '{keyword}' awards {points}pt, outside the allowed range")]
    PointsOutOfRange { keyword: String, points: i64 },
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing X-Line-Signature header")]
    MissingSignature,

    #[error("webhook signature did not match")]
    InvalidSignature,

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

impl ResponseError for WebhookError {
    fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature | WebhookError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string(),
        }))
    }
}

//! Error types shared by every forgeshift agent

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("permission denied during {step}: {message}")]
    PermissionDenied { step: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited after retries (status 429): {0}")]
    RateLimited(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("api call budget exhausted")]
    BudgetExhausted,

    #[error("unsupported on destination: {0}")]
    Unsupported(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn permission_denied(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Map a terminal HTTP status into the matching error category.
    pub fn from_status(status: u16, step: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 => Self::Auth { message: body },
            403 => Self::PermissionDenied {
                step: step.to_string(),
                message: body,
            },
            404 => Self::NotFound(format!("{step}: {body}")),
            429 => Self::RateLimited(body),
            _ => Self::Internal(format!("{step}: HTTP {status}: {body}")),
        }
    }

    /// Status code carried by HTTP-derived errors, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { .. } => Some(401),
            Self::PermissionDenied { .. } => Some(403),
            Self::NotFound(_) => Some(404),
            Self::RateLimited(_) => Some(429),
            _ => None,
        }
    }
}

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;
use thiserror::Error;

/// The taxonomy from SPEC_FULL.md §7. Every service method returns this type;
/// nothing downstream needs to downcast a boxed error to tell kinds apart.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: &'static str, key: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("dependency prevents delete: {0}")]
    Dependency(String),

    #[error("{0}")]
    PortConflict(String),

    #[error("SGROUP sync failed: {0}")]
    ExternalSync(String),

    #[error("SGROUP pre-commit sync failed: {0}")]
    PreCommitSync(String),

    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn already_exists(kind: &'static str, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            key: key.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::AlreadyExists { .. } => StatusCode::CONFLICT,
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Dependency(_) => StatusCode::CONFLICT,
            EngineError::PortConflict(_) => StatusCode::CONFLICT,
            EngineError::ExternalSync(_) => StatusCode::BAD_GATEWAY,
            EngineError::PreCommitSync(_) => StatusCode::BAD_GATEWAY,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => EngineError::NotFound {
                kind: "entity",
                key: "<unknown>".to_string(),
            },
            other => EngineError::Store(other.to_string()),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_predicate() {
        let err = EngineError::not_found("Host", "ns1/h1");
        assert!(err.is_not_found());
        let err = EngineError::Validation("bad".into());
        assert!(!err.is_not_found());
    }
}

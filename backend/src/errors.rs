use crate::identity::ValidatorId;
use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use zk_proofs::groth16::ZkError;

/// Errors surfaced to callers of the privacy services.
#[derive(Debug, Error)]
pub enum PrivacyError {
    /// Malformed or out-of-range input, rejected before any backend is called.
    #[error("validation error: {0}")]
    Validation(String),

    /// Carried inside degraded results; services do not return it.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Operation attempted against a session in the wrong state.
    #[error("state error: {0}")]
    State(String),

    #[error("validator {validator} already approved {subject}")]
    DuplicateApproval { subject: Uuid, validator: ValidatorId },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, PrivacyError>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for PrivacyError {
    fn into_response(self) -> Response {
        let status = match &self {
            PrivacyError::Validation(_) => StatusCode::BAD_REQUEST,
            PrivacyError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PrivacyError::State(_) => StatusCode::CONFLICT,
            PrivacyError::DuplicateApproval { .. } => StatusCode::CONFLICT,
            PrivacyError::Unauthorized(_) => StatusCode::FORBIDDEN,
            PrivacyError::NotFound(_) => StatusCode::NOT_FOUND,
            PrivacyError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

/// Failure of an external cryptographic backend.
///
/// Never returned to callers directly: services turn it into a degraded result.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no backend configured")]
    NotConfigured,

    #[error("backend failed: {0}")]
    Failed(String),
}

impl From<ZkError> for BackendError {
    fn from(e: ZkError) -> Self {
        BackendError::Failed(e.to_string())
    }
}

impl From<BackendError> for PrivacyError {
    fn from(e: BackendError) -> Self {
        PrivacyError::BackendUnavailable(e.to_string())
    }
}

/// Log a storage failure and map it to [`PrivacyError::Internal`].
pub(crate) fn db_error(e: sqlx::Error) -> PrivacyError {
    tracing::error!(error = %e, "session store query failed");
    PrivacyError::Internal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        let cases = [
            (PrivacyError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (PrivacyError::BackendUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (PrivacyError::State("x".into()), StatusCode::CONFLICT),
            (
                PrivacyError::DuplicateApproval { subject: Uuid::nil(), validator: ValidatorId::new("v1") },
                StatusCode::CONFLICT,
            ),
            (PrivacyError::Unauthorized("x".into()), StatusCode::FORBIDDEN),
            (PrivacyError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (PrivacyError::Internal, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}

use actix_web::{HttpRequest, HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

use crate::model::job::JobStatus;

/// Failures raised by a persistence backend.
#[derive(Debug, Display)]
pub enum StoreError {
    #[display(fmt = "database error: {}", _0)]
    Database(sqlx::Error),
    #[display(fmt = "{} {} does not exist", _0, _1)]
    MissingRow(&'static str, u64),
    #[display(fmt = "corrupt row: {}", _0)]
    Corrupt(String),
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err)
    }
}

/// Which side of counter reconciliation could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CounterSide {
    #[display(fmt = "member")]
    Member,
    #[display(fmt = "client")]
    Client,
    #[display(fmt = "member and client")]
    Both,
}

#[derive(Debug, Display)]
pub enum EngineError {
    #[display(fmt = "{} {} not found", entity, id)]
    NotFound { entity: &'static str, id: u64 },

    #[display(fmt = "job {} cannot move from {} to {}", job_id, from, to)]
    InvalidTransition {
        job_id: u64,
        from: JobStatus,
        to: JobStatus,
    },

    #[display(fmt = "'{}' is not a valid job status", _0)]
    InvalidStatus(String),

    #[display(fmt = "job {} is already complete", _0)]
    JobAlreadyComplete(u64),

    #[display(fmt = "job {} already has a punch-in", _0)]
    AlreadyPunchedIn(u64),

    #[display(fmt = "job {} has no punch-in to close", _0)]
    NotPunchedIn(u64),

    #[display(fmt = "job {} would close with a duration of {} minutes", job_id, minutes)]
    InvalidDuration { job_id: u64, minutes: i64 },

    #[display(fmt = "{}", _0)]
    ValidationError(String),

    #[display(fmt = "{}", _0)]
    Unauthorized(String),

    #[display(fmt = "{}", _0)]
    Forbidden(String),

    #[display(fmt = "unknown series '{}'", _0)]
    UnknownSeries(String),

    #[display(
        fmt = "job {} was completed but {} counters were not updated: {}",
        job_id,
        side,
        reason
    )]
    CounterUpdateFailure {
        job_id: u64,
        side: CounterSide,
        reason: String,
    },

    #[display(fmt = "{}", _0)]
    Store(StoreError),
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Store(err)
    }
}

impl EngineError {
    /// Stable machine-readable kind included in every error body.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "NotFound",
            EngineError::InvalidTransition { .. } => "InvalidTransition",
            EngineError::InvalidStatus(_) => "InvalidStatus",
            EngineError::JobAlreadyComplete(_) => "JobAlreadyComplete",
            EngineError::AlreadyPunchedIn(_) => "AlreadyPunchedIn",
            EngineError::NotPunchedIn(_) => "NotPunchedIn",
            EngineError::InvalidDuration { .. } => "InvalidDuration",
            EngineError::ValidationError(_) => "ValidationError",
            EngineError::Unauthorized(_) => "Unauthorized",
            EngineError::Forbidden(_) => "Forbidden",
            EngineError::UnknownSeries(_) => "NotFound",
            EngineError::CounterUpdateFailure { .. } => "CounterUpdateFailure",
            EngineError::Store(_) => "StoreError",
        }
    }

    pub fn job_not_found(id: u64) -> Self {
        EngineError::NotFound { entity: "job", id }
    }

    pub fn forbidden(message: &str) -> Self {
        EngineError::Forbidden(message.to_string())
    }
}

/// Error handler for the query, path and JSON extractors, so malformed
/// input gets the same body as every other failure.
pub fn payload_error<E: std::fmt::Display>(err: E, _req: &HttpRequest) -> actix_web::Error {
    EngineError::ValidationError(err.to_string()).into()
}

impl ResponseError for EngineError {
    fn status_code(&self) -> StatusCode {
        match self {
            EngineError::NotFound { .. } | EngineError::UnknownSeries(_) => StatusCode::NOT_FOUND,
            EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::InvalidStatus(_) | EngineError::ValidationError(_) => {
                StatusCode::BAD_REQUEST
            }
            EngineError::InvalidTransition { .. }
            | EngineError::JobAlreadyComplete(_)
            | EngineError::AlreadyPunchedIn(_)
            | EngineError::NotPunchedIn(_)
            | EngineError::InvalidDuration { .. } => StatusCode::CONFLICT,
            EngineError::CounterUpdateFailure { .. } | EngineError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Raw database errors stay in the logs.
        let message = match self {
            EngineError::Store(err) => {
                tracing::error!(error = %err, "Store failure");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": self.kind(),
            "message": message
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_statuses() {
        assert_eq!(
            EngineError::job_not_found(4).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EngineError::AlreadyPunchedIn(4).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EngineError::InvalidStatus("done".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(EngineError::NotPunchedIn(1).kind(), "NotPunchedIn");
        assert_eq!(
            EngineError::forbidden("Admin only").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(EngineError::UnknownSeries("visits".into()).kind(), "NotFound");
    }

    #[test]
    fn messages_are_human_readable() {
        let err = EngineError::InvalidTransition {
            job_id: 9,
            from: JobStatus::Complete,
            to: JobStatus::Approved,
        };
        assert_eq!(err.to_string(), "job 9 cannot move from complete to approved");

        let err = EngineError::CounterUpdateFailure {
            job_id: 3,
            side: CounterSide::Client,
            reason: "client 7 does not exist".into(),
        };
        assert!(err.to_string().contains("client counters"));
    }
}

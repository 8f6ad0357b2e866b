use axum::response::{IntoResponse, Response};
use deadpool_postgres::PoolError;
use quorum_server::Problem;
use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Every way a store operation can fail, the HTTP layer maps each kind to a
/// status code.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    /// A unique, foreign key, not null or check constraint rejected the write
    #[error("{0}")]
    ConstraintViolation(String),
    #[error("database failure: {0:#}")]
    Database(#[from] anyhow::Error),
}

const CONSTRAINT_STATES: [SqlState; 4] = [
    SqlState::UNIQUE_VIOLATION,
    SqlState::FOREIGN_KEY_VIOLATION,
    SqlState::NOT_NULL_VIOLATION,
    SqlState::CHECK_VIOLATION,
];

impl From<tokio_postgres::Error> for StoreError {
    fn from(error: tokio_postgres::Error) -> Self {
        match error.as_db_error() {
            Some(db_error) if CONSTRAINT_STATES.contains(db_error.code()) => {
                let message = match db_error.detail() {
                    Some(detail) => format!("{}: {detail}", db_error.message()),
                    None => db_error.message().to_owned(),
                };
                StoreError::ConstraintViolation(message)
            }
            _ => StoreError::Database(error.into()),
        }
    }
}

impl From<PoolError> for StoreError {
    fn from(error: PoolError) -> Self {
        StoreError::Database(anyhow::anyhow!("failed to check out a connection: {error}"))
    }
}

impl From<StoreError> for Problem {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(detail) => Problem::not_found(detail),
            StoreError::Forbidden(detail) => Problem::forbidden(detail),
            StoreError::Conflict(detail) | StoreError::ConstraintViolation(detail) => {
                Problem::conflict(detail)
            }
            StoreError::Database(e) => {
                tracing::error!(error = ?e, "store operation failed: {e:#}");
                Problem::internal()
            }
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        Problem::from(self).into_response()
    }
}

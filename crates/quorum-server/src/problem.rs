use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bon::Builder;
use serde::{Deserialize, Serialize};

/// JSON error body returned by every failing endpoint, `{"detail": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemBody {
    pub detail: String,
}

/// An error response with a status code and a human readable detail message
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(on(String, into))]
pub struct Problem {
    #[builder(default = StatusCode::INTERNAL_SERVER_ERROR)]
    status: StatusCode,
    detail: String,
}

impl Problem {
    pub fn new<D>(status: StatusCode, detail: D) -> Self
    where
        D: Into<String>,
    {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn not_found<D: Into<String>>(detail: D) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn forbidden<D: Into<String>>(detail: D) -> Self {
        Self::new(StatusCode::FORBIDDEN, detail)
    }

    pub fn conflict<D: Into<String>>(detail: D) -> Self {
        Self::new(StatusCode::CONFLICT, detail)
    }

    pub fn unauthorized<D: Into<String>>(detail: D) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }

    /// Internal failures never leak their cause to the client
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.detail)
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, detail = self.detail, "request failed");
        } else {
            tracing::debug!(status = %self.status, detail = self.detail, "request rejected");
        }

        let body = ProblemBody {
            detail: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}

//! Handshake rejection responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::gate::GateRejection;

/// Why a realtime upgrade request was refused before the session started.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Token missing or failed verification.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// The contest gate refused the caller.
    #[error(transparent)]
    Gate(#[from] GateRejection),
    /// The process already holds its maximum number of sessions.
    #[error("server at connection capacity")]
    Capacity,
}

impl HandshakeError {
    /// HTTP status for this rejection.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Gate(GateRejection::NotFound) => StatusCode::NOT_FOUND,
            Self::Gate(GateRejection::Closed(_)) => StatusCode::CONFLICT,
            Self::Gate(GateRejection::Forbidden) => StatusCode::FORBIDDEN,
            Self::Capacity => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable machine-readable code for the JSON body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(AuthError::MissingToken) => "MISSING_TOKEN",
            Self::Auth(AuthError::Expired) => "TOKEN_EXPIRED",
            Self::Auth(AuthError::InvalidToken(_)) => "INVALID_TOKEN",
            Self::Gate(GateRejection::NotFound) => "CONTEST_NOT_FOUND",
            Self::Gate(GateRejection::Closed(_)) => "CONTEST_CLOSED",
            Self::Gate(GateRejection::Forbidden) => "FORBIDDEN",
            Self::Capacity => "AT_CAPACITY",
        }
    }
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// API error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "code": self.status.as_u16()
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<sauti_core::Error> for ApiError {
    fn from(err: sauti_core::Error) -> Self {
        use sauti_core::Error;

        match &err {
            Error::VoiceNotFound(_) => ApiError::not_found(err.to_string()),
            Error::DecodeFailed(_) | Error::InvalidRequest(_) => {
                ApiError::bad_request(err.to_string())
            }
            Error::EngineConstructionFailed(_)
            | Error::SynthesisFailed(_)
            | Error::TranscriptionFailed(_) => ApiError::unavailable(err.to_string()),
            _ => ApiError::internal(err.to_string()),
        }
    }
}

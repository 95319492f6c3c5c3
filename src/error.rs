//! Request-level error taxonomy and its HTTP mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::completion::CompletionError;
use crate::session::SessionState;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("unsupported file extension '{extension}'")]
    UnsupportedFormat { extension: String },

    #[error("file is not valid UTF-8: {0}")]
    DecodeFailure(#[from] std::string::FromUtf8Error),

    #[error("no text could be extracted from the report")]
    EmptyExtraction,

    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("report not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("completion failed: {0}")]
    Provider(CompletionError),

    /// Provider answered with nothing usable; carries the localized message.
    #[error("{0}")]
    NoAnswer(String),

    #[error("{0}")]
    TimedOut(CompletionError),

    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("cannot {action} while session is {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },
}

impl From<CompletionError> for ReportError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::TimedOut(_) => ReportError::TimedOut(err),
            other => ReportError::Provider(other),
        }
    }
}

impl From<JsonRejection> for ReportError {
    fn from(rejection: JsonRejection) -> Self {
        ReportError::InvalidRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let detail = Some(self.to_string());
        let (status, message, error) = match &self {
            ReportError::UnsupportedFormat { .. } => (
                StatusCode::BAD_REQUEST,
                "Unsupported file format. Only .pdf and .txt allowed.".to_string(),
                detail,
            ),
            ReportError::DecodeFailure(_) => (
                StatusCode::BAD_REQUEST,
                "The uploaded file could not be decoded as text.".to_string(),
                detail,
            ),
            ReportError::EmptyExtraction => (
                StatusCode::BAD_REQUEST,
                "No text could be extracted from the report. Please upload a valid file."
                    .to_string(),
                None,
            ),
            ReportError::ExtractionFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to extract text from the report.".to_string(),
                detail,
            ),
            ReportError::NotFound(_) => (StatusCode::NOT_FOUND, "Report not found.".to_string(), None),
            ReportError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            ReportError::PayloadTooLarge { .. } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Uploaded file is too large.".to_string(),
                detail,
            ),
            ReportError::Provider(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to get a response from the language model.".to_string(),
                detail,
            ),
            ReportError::NoAnswer(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                msg.clone(),
                Some(CompletionError::EmptyResponse.to_string()),
            ),
            ReportError::TimedOut(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "The language model did not respond in time.".to_string(),
                detail,
            ),
            ReportError::SessionNotFound(_) => {
                (StatusCode::NOT_FOUND, "Session not found.".to_string(), None)
            }
            ReportError::InvalidTransition { .. } => (StatusCode::CONFLICT, self.to_string(), None),
        };

        if status.is_server_error() {
            error!("Request failed ({}): {}", status, self);
        } else {
            warn!("Request rejected ({}): {}", status, self);
        }

        (status, Json(ErrorBody { message, error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn render(err: ReportError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_not_found_has_message_only() {
        let (status, body) = render(ReportError::NotFound("missing.pdf".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, serde_json::json!({"message": "Report not found."}));
    }

    #[tokio::test]
    async fn test_unsupported_format_names_extension() {
        let (status, body) = render(ReportError::UnsupportedFormat {
            extension: "docx".into(),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("docx"));
    }

    #[tokio::test]
    async fn test_provider_failure_carries_detail() {
        let err: ReportError = CompletionError::Network("connection refused".into()).into();
        let (status, body) = render(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["message"],
            "Failed to get a response from the language model."
        );
        assert!(body["error"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_extraction_failure_is_500_with_detail() {
        let (status, body) =
            render(ReportError::ExtractionFailed("Failed to load PDF: invalid file header".into()))
                .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Failed to extract text from the report.");
        assert!(body["error"].as_str().unwrap().contains("invalid file header"));
    }

    #[tokio::test]
    async fn test_oversized_upload_is_413() {
        let (status, body) = render(ReportError::PayloadTooLarge { limit: 64 }).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["message"], "Uploaded file is too large.");
        assert!(body["error"].as_str().unwrap().contains("64 byte"));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_gateway_timeout() {
        let err: ReportError =
            CompletionError::TimedOut(std::time::Duration::from_secs(30)).into();
        assert!(matches!(err, ReportError::TimedOut(_)));
        let (status, body) = render(err).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body["error"].as_str().unwrap().contains("timed out"));
    }
}

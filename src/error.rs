use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::normalize::NormalizeError;
use crate::vision::VisionError;

/// Body of every 5xx response. Causes are logged, never returned.
pub const GENERIC_FAILURE: &str = "Error generating the description.";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No image uploaded")]
    MissingFile,
    #[error("Only one image can be uploaded")]
    TooManyFiles,
    #[error("Missing required metadata")]
    MissingMetadata,
    #[error("Missing prompt or language")]
    MissingPrompt,
    #[error("Invalid multipart request")]
    InvalidMultipart(#[source] MultipartError),
    #[error("Image too large")]
    TooLarge(#[source] MultipartError),
    #[error("Access denied from this origin")]
    OriginRejected,
    #[error("failed to store upload: {0}")]
    Upload(#[source] std::io::Error),
    #[error("image processing failed: {0}")]
    ImageProcessing(#[from] NormalizeError),
    #[error("description request failed: {0}")]
    Collaborator(#[from] VisionError),
}

impl ApiError {
    /// Body-limit overruns surface from the multipart stream; keep them apart
    /// from malformed bodies.
    pub fn from_multipart(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::TooLarge(err)
        } else {
            ApiError::InvalidMultipart(err)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile
            | ApiError::TooManyFiles
            | ApiError::MissingMetadata
            | ApiError::MissingPrompt => StatusCode::BAD_REQUEST,
            ApiError::InvalidMultipart(_) => StatusCode::BAD_REQUEST,
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::OriginRejected => StatusCode::FORBIDDEN,
            ApiError::Upload(_) | ApiError::ImageProcessing(_) | ApiError::Collaborator(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            GENERIC_FAILURE.to_string()
        } else {
            if let ApiError::InvalidMultipart(e) | ApiError::TooLarge(e) = &self {
                tracing::info!(error = %e, %status, "rejected multipart body");
            } else {
                tracing::info!(%status, reason = %self, "rejected request");
            }
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

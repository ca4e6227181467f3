//! Application error handling

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use patientsearch_core::{IssueType, OperationOutcome, SyncError};

/// Application error type
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotSupported(String),
    Unauthorized(String),
    NotFound(String),
    /// The FHIR store rejected the request with a client error
    Rejected { status: StatusCode, message: String },
    /// A FHIR store could not be reached or gave an unusable answer
    BadGateway(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::NotSupported(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Rejected { status, .. } => *status,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let outcome = match self {
            AppError::BadRequest(msg) => OperationOutcome::invalid(&msg),
            AppError::NotSupported(msg) => OperationOutcome::not_supported(&msg),
            AppError::Unauthorized(msg) => OperationOutcome::login(&msg),
            AppError::NotFound(msg) => OperationOutcome::error(IssueType::NotFound, &msg),
            AppError::Rejected { message, .. } => {
                OperationOutcome::error(IssueType::Processing, &message)
            }
            AppError::BadGateway(msg) | AppError::ServiceUnavailable(msg) => {
                OperationOutcome::transient(&msg)
            }
            AppError::Internal(msg) => OperationOutcome::error(IssueType::Exception, &msg),
        };

        (status, Json(outcome)).into_response()
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        let message = err.to_string();
        let during_sync = matches!(err, SyncError::SyncFailed { .. });
        match err.root_cause() {
            SyncError::RequestFailed { status, .. } => {
                match StatusCode::from_u16(*status) {
                    Ok(StatusCode::NOT_FOUND) => AppError::NotFound(message),
                    Ok(status) if status.is_client_error() => {
                        AppError::Rejected { status, message }
                    }
                    _ => AppError::BadGateway(message),
                }
            }
            SyncError::StoreUnavailable(_) => AppError::BadGateway(message),
            // Bad data coming back from the store mid-sync is the store's fault
            _ if during_sync => AppError::BadGateway(message),
            SyncError::UnsupportedResourceType(_) => AppError::NotSupported(message),
            SyncError::InvalidInput(_) | SyncError::InvalidRequest(_) => {
                AppError::BadRequest(message)
            }
            // root_cause() never returns a wrapper
            SyncError::SyncFailed { .. } => AppError::BadGateway(message),
        }
    }
}

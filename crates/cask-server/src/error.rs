use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cask_store::StoreError;
use cask_types::DigestAlgorithm;
use thiserror::Error;

/// Request-handling failures, each mapped to one HTTP status.
///
/// Conflict outcomes (object exists, stale write, fixity mismatch) are not
/// errors -- the coordinator reports them as
/// [`CommitOutcome`](crate::coordinator::CommitOutcome) values. Everything
/// here either rejects the request up front or is an unexpected failure.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A `location` reference could not be decoded or points at nothing.
    #[error("{0}")]
    InvalidLocation(String),

    /// A `location` reference resolved outside the allow-listed directories.
    #[error("upload directory not allowed for {0}")]
    UploadDirNotAllowed(String),

    /// Malformed multipart payload, params document, or request parameter.
    #[error("{0}")]
    BadRequest(String),

    /// The requested object does not exist.
    #[error("{0} not found")]
    ObjectNotFound(String),

    /// The object exists but has no file at the requested path.
    #[error("no file {path} in object {object_id}")]
    FileNotFound { object_id: String, path: String },

    /// The requested byte range cannot be satisfied for a file of this size.
    #[error("requested range not satisfiable")]
    RangeNotSatisfiable { size: u64 },

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error outside the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else; detail is logged, never sent to the client.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ObjectNotFound(id) => Self::ObjectNotFound(id),
            StoreError::FileNotFound { object_id, path } => Self::FileNotFound { object_id, path },
            StoreError::Io(e) => Self::Io(e),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidLocation(_) | Self::UploadDirNotAllowed(_) | Self::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            Self::ObjectNotFound(_) | Self::FileNotFound { .. } => {
                (StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            Self::RangeNotSatisfiable { size } => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [("Content-Range", format!("bytes */{size}"))],
            )
                .into_response(),
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

/// Render the fixity-mismatch conflict body with both digests.
pub(crate) fn fixity_message(
    algorithm: DigestAlgorithm,
    expected: &str,
    actual: &str,
) -> String {
    format!("fixity check failed: expected {algorithm} {expected}, got {actual}")
}

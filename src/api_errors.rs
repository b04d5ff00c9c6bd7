use crate::codec::CodecError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Requests rejected below the RPC layer. These are answered with plain
/// HTTP errors, never with an XML-RPC fault.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{0}")]
    Internal(String),
}

impl TransportError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unsupported_media_type(msg: impl Into<String>) -> Self {
        Self::UnsupportedMediaType(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            // the stock XML-RPC server answers a wrong content type with 400
            TransportError::BadRequest(_) | TransportError::UnsupportedMediaType(_) => {
                StatusCode::BAD_REQUEST
            }
            TransportError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrBody {
    error: String,
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        let code = self.status();
        (code, Json(ErrBody { error: self.to_string() })).into_response()
    }
}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Write(message) => TransportError::Internal(message),
            other => TransportError::BadRequest(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_map_to_status_codes() {
        let parse: TransportError = CodecError::MissingMethodName.into();
        assert_eq!(parse.status(), StatusCode::BAD_REQUEST);

        let write: TransportError = CodecError::Write("disk".into()).into();
        assert_eq!(write.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn wrong_content_type_is_a_bad_request() {
        let response = TransportError::unsupported_media_type("text/plain").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

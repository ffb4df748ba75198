//! The error taxonomy for API calls.
//!
//! Every failure path in this crate converges on [`ApiError`]: a single value
//! carrying where the failure originated ([`ErrorSource`]), a stable symbolic
//! code ([`ErrorCode`]) to branch on, the server's request-tracing id when one
//! was available, and a human-readable message.

use http::StatusCode;
use serde_json::{Map, Value};
use std::fmt;

use crate::retry::TransportReason;

/// Where a failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    /// A local failure: request encoding, response decoding, or client
    /// configuration. Never retried.
    Internal,
    /// A transport-level failure: the request never produced an HTTP
    /// response (or the response body could not be read).
    Network,
    /// The server returned a non-2xx HTTP response.
    Remote,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorSource::Internal => "internal",
            ErrorSource::Network => "network",
            ErrorSource::Remote => "remote",
        };
        f.write_str(name)
    }
}

/// Symbolic error code, stable for programmatic branching.
///
/// Remote errors that carry a structured body keep the server's code
/// verbatim: known strings map onto the matching variant, anything else is
/// preserved in [`ErrorCode::Other`].
///
/// # Examples
///
/// ```
/// use recourse::ErrorCode;
///
/// assert_eq!(ErrorCode::NotFound.as_str(), "not_found");
/// assert_eq!(ErrorCode::Other("invalid_sku".into()).as_str(), "invalid_sku");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    RequestFailed,
    NotFound,
    Conflict,
    TooManyRequests,
    ServerError,
    UnknownError,
    EncodeError,
    DecodeError,
    InvalidConfig,
    ConnectionRefused,
    Timeout,
    NetworkError,
    /// A remote-supplied code with no predefined variant, kept verbatim.
    Other(String),
}

impl ErrorCode {
    /// The snake_case string form of the code.
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::RequestFailed => "request_failed",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::TooManyRequests => "too_many_requests",
            ErrorCode::ServerError => "server_error",
            ErrorCode::UnknownError => "unknown_error",
            ErrorCode::EncodeError => "encode_error",
            ErrorCode::DecodeError => "decode_error",
            ErrorCode::InvalidConfig => "invalid_config",
            ErrorCode::ConnectionRefused => "connection_refused",
            ErrorCode::Timeout => "timeout",
            ErrorCode::NetworkError => "network_error",
            ErrorCode::Other(code) => code,
        }
    }

    /// Maps an HTTP status with no usable error body onto a code.
    pub(crate) fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            400 => ErrorCode::BadRequest,
            401 => ErrorCode::Unauthorized,
            402 => ErrorCode::RequestFailed,
            404 => ErrorCode::NotFound,
            409 => ErrorCode::Conflict,
            429 => ErrorCode::TooManyRequests,
            500 | 502 | 503 | 504 => ErrorCode::ServerError,
            _ => ErrorCode::UnknownError,
        }
    }

    /// Adopts a remote-supplied code string verbatim.
    pub(crate) fn from_remote(code: &str) -> Self {
        match code {
            "bad_request" => ErrorCode::BadRequest,
            "unauthorized" => ErrorCode::Unauthorized,
            "request_failed" => ErrorCode::RequestFailed,
            "not_found" => ErrorCode::NotFound,
            "conflict" => ErrorCode::Conflict,
            "too_many_requests" => ErrorCode::TooManyRequests,
            "server_error" => ErrorCode::ServerError,
            other => ErrorCode::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed explanatory message for a status-derived error.
fn status_message(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "The request could not be understood by the server.",
        401 => "The API key is missing or invalid.",
        402 => "The request parameters were valid but the request failed.",
        404 => "The requested resource does not exist.",
        409 => "The request conflicted with another concurrent request.",
        429 => "Too many requests were sent in a given amount of time.",
        500 | 502 | 503 | 504 => "The server encountered an error while processing the request.",
        _ => "An unexpected error occurred.",
    }
}

/// The error type returned by every fallible operation in this crate.
///
/// An `ApiError` is constructed once, at the point the retry loop or the
/// decoder gives up, and carries enough information to log, alert, or branch
/// on programmatically.
///
/// # Examples
///
/// ```no_run
/// use recourse::{Client, ErrorSource, Request};
///
/// # async fn example() -> Result<(), recourse::ApiError> {
/// # let client = Client::builder().base_url("https://api.example.com")?.api_key("key").build()?;
/// match client.execute(Request::get("/v2/contacts/42")).await {
///     Ok(response) => println!("{}", response.data),
///     Err(err) if err.source == ErrorSource::Remote => {
///         eprintln!("server rejected the request [{}]: {}", err.code, err.message);
///         if let Some(request_id) = &err.request_id {
///             eprintln!("request id for support: {request_id}");
///         }
///     }
///     Err(err) => eprintln!("{err}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiError {
    /// Where the failure originated.
    pub source: ErrorSource,
    /// Stable symbolic code.
    pub code: ErrorCode,
    /// The server's request-tracing id, when a response carried one.
    pub request_id: Option<String>,
    /// Human-readable description.
    pub message: String,
    /// Additional structured fields from the server's error payload
    /// (for example a `field` name on validation errors).
    pub extra: Map<String, Value>,
}

impl ApiError {
    pub(crate) fn internal(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            source: ErrorSource::Internal,
            code,
            request_id: None,
            message: message.into(),
            extra: Map::new(),
        }
    }

    pub(crate) fn remote(
        code: ErrorCode,
        message: impl Into<String>,
        request_id: Option<String>,
        extra: Map<String, Value>,
    ) -> Self {
        Self {
            source: ErrorSource::Remote,
            code,
            request_id,
            message: message.into(),
            extra,
        }
    }

    /// A remote error derived purely from the HTTP status.
    pub(crate) fn from_status(status: StatusCode, request_id: Option<String>) -> Self {
        Self::remote(
            ErrorCode::from_status(status),
            status_message(status),
            request_id,
            Map::new(),
        )
    }

    /// A network error wrapping a classified transport reason.
    pub(crate) fn from_transport(reason: TransportReason) -> Self {
        let code = match &reason {
            TransportReason::ConnectionRefused => ErrorCode::ConnectionRefused,
            TransportReason::Timeout => ErrorCode::Timeout,
            TransportReason::ServiceUnavailable
            | TransportReason::TooManyRequests
            | TransportReason::Other(_) => ErrorCode::NetworkError,
        };
        Self {
            source: ErrorSource::Network,
            code,
            request_id: None,
            message: reason.to_string(),
            extra: Map::new(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error [{}]: {}", self.source, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// A specialized `Result` for API calls.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table() {
        let cases = [
            (400, ErrorCode::BadRequest),
            (401, ErrorCode::Unauthorized),
            (402, ErrorCode::RequestFailed),
            (404, ErrorCode::NotFound),
            (409, ErrorCode::Conflict),
            (429, ErrorCode::TooManyRequests),
            (500, ErrorCode::ServerError),
            (502, ErrorCode::ServerError),
            (503, ErrorCode::ServerError),
            (504, ErrorCode::ServerError),
            (418, ErrorCode::UnknownError),
            (301, ErrorCode::UnknownError),
        ];
        for (status, expected) in cases {
            let status = StatusCode::from_u16(status).unwrap();
            assert_eq!(ErrorCode::from_status(status), expected, "status {status}");
        }
    }

    #[test]
    fn remote_codes_are_kept_verbatim() {
        assert_eq!(ErrorCode::from_remote("not_found"), ErrorCode::NotFound);
        let custom = ErrorCode::from_remote("invalid_sku");
        assert_eq!(custom, ErrorCode::Other("invalid_sku".to_owned()));
        assert_eq!(custom.as_str(), "invalid_sku");
    }

    #[test]
    fn status_errors_have_fixed_messages() {
        let err = ApiError::from_status(StatusCode::CONFLICT, Some("req-1".to_owned()));
        assert_eq!(err.source, ErrorSource::Remote);
        assert_eq!(err.code, ErrorCode::Conflict);
        assert_eq!(err.request_id.as_deref(), Some("req-1"));
        assert_eq!(
            err.message,
            "The request conflicted with another concurrent request."
        );
        assert!(err.extra.is_empty());
    }
}

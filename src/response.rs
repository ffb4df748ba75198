//! Response decoding: decompression, JSON parsing, and error-body extraction.

use flate2::read::{GzDecoder, ZlibDecoder};
use http::{header, HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::io::Read;
use std::time::Duration;

use crate::error::{ApiError, ErrorCode, ErrorSource};

pub(crate) const REQUEST_ID_HEADER: &str = "x-request-id";

/// A successful API response.
///
/// Wraps the decoded JSON body along with transaction metadata: status,
/// headers, the server's request-tracing id, how many attempts the retry
/// loop needed, and the total latency including backoff sleeps.
///
/// Dereferences to the decoded [`Value`], so field access reads naturally:
///
/// ```no_run
/// # use recourse::{Client, Request};
/// # async fn example() -> Result<(), recourse::ApiError> {
/// # let client = Client::builder().base_url("https://api.example.com")?.api_key("key").build()?;
/// let response = client.execute(Request::get("/v2/contacts/42")).await?;
/// println!("email: {}", response["email"]);
/// println!("took {:?} over {} attempt(s)", response.latency, response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// The decoded JSON body. Empty bodies decode to `Value::Null`.
    pub data: Value,
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The server's request-tracing id, when present.
    pub request_id: Option<String>,
    /// Attempts made, `1` when the first attempt succeeded.
    pub attempts: u32,
    /// Total latency across all attempts, including backoff sleeps.
    pub latency: Duration,
}

impl ApiResponse {
    /// Deserializes the body into a concrete type.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        serde_json::from_value(self.data).map_err(|err| {
            ApiError::internal(
                ErrorCode::DecodeError,
                format!("response body did not match the expected shape: {err}"),
            )
        })
    }

    /// Returns a response header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Whether the retry loop needed more than one attempt.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}

impl std::ops::Deref for ApiResponse {
    type Target = Value;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

/// Decodes a 2xx outcome into an [`ApiResponse`].
///
/// The body is decompressed per `Content-Encoding`, then JSON-decoded.
/// Invalid JSON is an internal decode error and is never retried. An empty
/// body decodes to `Value::Null` (HEAD and 204 responses carry none).
pub(crate) fn decode_success(
    status: StatusCode,
    headers: HeaderMap,
    body: &[u8],
    attempts: u32,
    latency: Duration,
) -> Result<ApiResponse, ApiError> {
    let request_id = request_id(&headers);
    let decoded = decompress(body, content_encoding(&headers))?;
    let data = if decoded.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&decoded).map_err(|err| ApiError {
            source: ErrorSource::Internal,
            code: ErrorCode::DecodeError,
            request_id: request_id.clone(),
            message: format!("response body is not valid JSON: {err}"),
            extra: Map::new(),
        })?
    };
    Ok(ApiResponse {
        data,
        status,
        headers,
        request_id,
        attempts,
        latency,
    })
}

/// Turns a non-2xx outcome into an [`ApiError`], never failing itself.
///
/// Prefers the structured `{"errors": [{code, message, ...}]}` envelope;
/// any shape mismatch falls back to the status-derived error.
pub(crate) fn decode_failure(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> ApiError {
    let request_id = request_id(headers);
    let raw = decompress(body, content_encoding(headers)).unwrap_or_else(|_| body.to_vec());
    if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(&raw) {
        if let Some(first) = envelope.errors.into_iter().next() {
            return ApiError::remote(
                ErrorCode::from_remote(&first.code),
                first.message,
                request_id,
                first.extra,
            );
        }
    }
    ApiError::from_status(status, request_id)
}

pub(crate) fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

fn content_encoding(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
}

fn decompress(body: &[u8], encoding: Option<&str>) -> Result<Vec<u8>, ApiError> {
    match encoding.unwrap_or("identity") {
        "gzip" => {
            let mut out = Vec::new();
            GzDecoder::new(body).read_to_end(&mut out).map_err(|err| {
                ApiError::internal(
                    ErrorCode::DecodeError,
                    format!("gzip response body could not be decompressed: {err}"),
                )
            })?;
            Ok(out)
        }
        "deflate" => {
            let mut out = Vec::new();
            ZlibDecoder::new(body).read_to_end(&mut out).map_err(|err| {
                ApiError::internal(
                    ErrorCode::DecodeError,
                    format!("deflate response body could not be decompressed: {err}"),
                )
            })?;
            Ok(out)
        }
        "identity" | "" => Ok(body.to_vec()),
        other => Err(ApiError::internal(
            ErrorCode::DecodeError,
            format!("unsupported content encoding {other:?}"),
        )),
    }
}

/// Wire shape of a structured API error response.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    errors: Vec<RemoteError>,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    code: String,
    message: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

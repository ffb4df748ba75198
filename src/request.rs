//! Request values and per-call options.

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;
use std::time::Duration;

use crate::error::{ApiError, ErrorCode};
use crate::retry::RetryConfig;

/// Request parameters: a JSON object, encoded per the resolved content type.
pub type Params = serde_json::Map<String, Value>;

/// A single API request, built incrementally and handed to
/// [`Client::execute`](crate::Client::execute).
///
/// Parameters are merged across successive [`put_param`](Request::put_param)
/// calls; a later call with the same key overrides the earlier value.
///
/// # Examples
///
/// ```
/// use recourse::Request;
/// use serde_json::json;
///
/// let request = Request::post("/v2/contacts")
///     .put_param("email", "kit@example.com")
///     .put_param("tags", json!(["lead", "beta"]));
/// assert_eq!(request.endpoint, "/v2/contacts");
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    /// The HTTP method.
    pub method: Method,
    /// The endpoint path, appended to the client's base URL.
    pub endpoint: String,
    pub(crate) headers: HeaderMap,
    pub(crate) params: Params,
    pub(crate) options: RequestOptions,
}

impl Request {
    /// Creates a request with the given method and endpoint.
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            headers: HeaderMap::new(),
            params: Params::new(),
            options: RequestOptions::default(),
        }
    }

    /// A GET request.
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    /// A HEAD request.
    pub fn head(endpoint: impl Into<String>) -> Self {
        Self::new(Method::HEAD, endpoint)
    }

    /// A POST request.
    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    /// A PUT request.
    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    /// A PATCH request.
    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PATCH, endpoint)
    }

    /// A DELETE request.
    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    /// Sets one parameter; an existing value under the same key is replaced.
    pub fn put_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Merges a parameter map into the request; later keys win.
    pub fn put_params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, ApiError> {
        let name = HeaderName::try_from(name.as_ref()).map_err(|err| {
            ApiError::internal(ErrorCode::InvalidConfig, format!("invalid header name: {err}"))
        })?;
        let value = HeaderValue::try_from(value.as_ref()).map_err(|err| {
            ApiError::internal(ErrorCode::InvalidConfig, format!("invalid header value: {err}"))
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Pins the idempotency key instead of letting the client generate one.
    ///
    /// Ignored for GET/HEAD requests, which never carry a key.
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.options.idempotency_key = Some(key.into());
        self
    }

    /// Replaces the per-call options wholesale.
    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// GET and HEAD are read methods: side-effect free, query-encoded, and
    /// never idempotency-keyed.
    pub(crate) fn is_read(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD)
    }
}

/// Per-call overrides for a single request.
///
/// Every field falls back to the client-wide configuration when unset.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Overrides the client's API key for this request.
    pub api_key: Option<String>,
    /// Overrides the client's API version header.
    pub api_version: Option<String>,
    /// Caller-pinned idempotency key; reused verbatim across retries.
    pub idempotency_key: Option<String>,
    /// Per-request transport timeout.
    pub timeout: Option<Duration>,
    /// Per-request retry tuning.
    pub retry: Option<RetryConfig>,
}

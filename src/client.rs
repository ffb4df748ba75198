//! HTTP client and the request execution pipeline.
//!
//! [`Client`] is the main entry point. [`Client::execute`] composes headers,
//! encodes the body or query string, dispatches attempts through the shared
//! `reqwest` transport, drives the retry loop to a terminal outcome, and
//! hands that outcome to the response decoder.

use http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use crate::encode;
use crate::error::{ApiError, ErrorCode, Result};
use crate::idempotency;
use crate::request::{Params, Request};
use crate::response::{self, ApiResponse};
use crate::retry::{self, RawOutcome, RetryConfig, TransportReason};

/// An API client with retry logic and a uniform error taxonomy.
///
/// The client is cheap to clone and designed to be reused: it holds the
/// connection pool and the configuration that applies to every request.
///
/// # Examples
///
/// ```no_run
/// use recourse::{Client, Request, RetryConfig};
/// use serde_json::json;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), recourse::ApiError> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .api_key("sk_live_1234")
///     .timeout(Duration::from_secs(30))
///     .retry(RetryConfig::default())
///     .build()?;
///
/// // Reads encode their parameters into the query string.
/// let open = client
///     .execute(Request::get("/v2/contacts").put_param("filter", json!({"status": "open"})))
///     .await?;
/// println!("contacts: {}", open.data);
///
/// // Writes carry an idempotency key, so retries are deduplicated remotely.
/// let created = client
///     .execute(Request::post("/v2/contacts").put_param("email", "kit@example.com"))
///     .await?;
/// println!("created: {}", created.data);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    api_version: Option<String>,
    default_headers: HeaderMap,
    retry: RetryConfig,
    timeout: Option<Duration>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url.as_str())
            .field("api_key", &"<redacted>")
            .field("retry", &self.inner.retry)
            .finish()
    }
}

impl Client {
    /// Creates a new [`ClientBuilder`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Executes a request to a terminal outcome.
    ///
    /// This is the single entry point every other call surface delegates to.
    /// For read methods the parameters become the query string and the body
    /// is empty; for write methods an idempotency key is resolved (caller
    /// override or freshly generated) and the body is encoded under the
    /// resolved `Content-Type`.
    ///
    /// Attempts are strictly sequential; the task suspends between them for
    /// the backoff delay. Retries are invisible to the caller except as
    /// latency and the [`attempts`](ApiResponse::attempts) count.
    pub async fn execute(&self, request: Request) -> Result<ApiResponse> {
        let started = Instant::now();
        let is_read = request.is_read();
        let Request {
            method,
            endpoint,
            headers,
            params,
            options,
        } = request;

        let api_key = options
            .api_key
            .as_deref()
            .or(self.inner.api_key.as_deref())
            .ok_or_else(|| {
                ApiError::internal(
                    ErrorCode::InvalidConfig,
                    "an API key is required; set one on the client or in the request options",
                )
            })?;
        let api_version = options
            .api_version
            .as_deref()
            .or(self.inner.api_version.as_deref());
        let retry_config = options.retry.unwrap_or_else(|| self.inner.retry.clone());
        let timeout = options.timeout.or(self.inner.timeout);

        // The key is resolved once, before the loop, so every retry attempt
        // carries it verbatim. Read methods never get one.
        let idempotency_key = if is_read {
            None
        } else {
            Some(options.idempotency_key.unwrap_or_else(idempotency::generate))
        };

        let mut caller_headers = self.inner.default_headers.clone();
        for (name, value) in &headers {
            caller_headers.insert(name.clone(), value.clone());
        }
        let headers = encode::compose_headers(
            &caller_headers,
            api_key,
            api_version,
            idempotency_key.as_deref(),
        )?;

        let (url, body) = if is_read {
            (self.request_url(&endpoint, Some(&params)), None)
        } else {
            let content_type = headers
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("");
            let body = encode::encode_body(&params, content_type)?;
            (self.request_url(&endpoint, None), Some(body))
        };

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            tracing::debug!(method = %method, url = %url, attempt = attempts, "dispatching request");
            let outcome = self
                .send_once(&method, &url, &headers, body.clone(), timeout)
                .await;

            if retry::should_retry(&outcome, attempts, &retry_config) {
                let delay = retry::retry_delay(&outcome, attempts - 1, &retry_config);
                tracing::info!(
                    delay_ms = delay.as_millis() as u64,
                    attempt = attempts,
                    "transient failure, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return match outcome {
                RawOutcome::Response {
                    status,
                    headers,
                    body,
                } if status.is_success() => {
                    tracing::debug!(
                        status = status.as_u16(),
                        attempts,
                        latency_ms = started.elapsed().as_millis() as u64,
                        "request succeeded"
                    );
                    response::decode_success(status, headers, &body, attempts, started.elapsed())
                }
                RawOutcome::Response {
                    status,
                    headers,
                    body,
                } => {
                    let error = response::decode_failure(status, &headers, &body);
                    tracing::warn!(
                        status = status.as_u16(),
                        code = error.code.as_str(),
                        attempts,
                        "request failed with remote error"
                    );
                    Err(error)
                }
                RawOutcome::Transport { reason } => {
                    tracing::warn!(reason = %reason, attempts, "request failed in transport");
                    Err(ApiError::from_transport(reason))
                }
            };
        }
    }

    /// Performs one attempt, folding every transport outcome into a
    /// [`RawOutcome`].
    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        body: Option<Vec<u8>>,
        timeout: Option<Duration>,
    ) -> RawOutcome {
        let mut builder = self
            .inner
            .http
            .request(method.clone(), url)
            .headers(headers.clone());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        match builder.send().await {
            Ok(response) => {
                let status = response.status();
                let headers = response.headers().clone();
                match response.bytes().await {
                    Ok(body) => RawOutcome::Response {
                        status,
                        headers,
                        body: body.to_vec(),
                    },
                    Err(err) => RawOutcome::Transport {
                        reason: TransportReason::classify(&err),
                    },
                }
            }
            Err(err) => RawOutcome::Transport {
                reason: TransportReason::classify(&err),
            },
        }
    }

    fn request_url(&self, endpoint: &str, params: Option<&Params>) -> String {
        let base = self.inner.base_url.as_str().trim_end_matches('/');
        let separator = if endpoint.starts_with('/') { "" } else { "/" };
        let mut url = format!("{base}{separator}{endpoint}");
        if let Some(params) = params {
            let query = encode::query_string(params);
            if !query.is_empty() {
                url.push('?');
                url.push_str(&query);
            }
        }
        url
    }

    /// Makes a GET request to the given endpoint.
    pub async fn get(&self, endpoint: impl Into<String>) -> Result<ApiResponse> {
        self.execute(Request::get(endpoint)).await
    }

    /// Makes a HEAD request to the given endpoint.
    pub async fn head(&self, endpoint: impl Into<String>) -> Result<ApiResponse> {
        self.execute(Request::head(endpoint)).await
    }

    /// Makes a POST request with the given parameters.
    pub async fn post(&self, endpoint: impl Into<String>, params: Params) -> Result<ApiResponse> {
        self.execute(Request::post(endpoint).put_params(params)).await
    }

    /// Makes a PUT request with the given parameters.
    pub async fn put(&self, endpoint: impl Into<String>, params: Params) -> Result<ApiResponse> {
        self.execute(Request::put(endpoint).put_params(params)).await
    }

    /// Makes a PATCH request with the given parameters.
    pub async fn patch(&self, endpoint: impl Into<String>, params: Params) -> Result<ApiResponse> {
        self.execute(Request::patch(endpoint).put_params(params)).await
    }

    /// Makes a DELETE request to the given endpoint.
    pub async fn delete(&self, endpoint: impl Into<String>) -> Result<ApiResponse> {
        self.execute(Request::delete(endpoint)).await
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use recourse::{ClientBuilder, RetryConfig};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), recourse::ApiError> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com")?
///     .api_key("sk_live_1234")
///     .api_version("2024-01")
///     .timeout(Duration::from_secs(30))
///     .connect_timeout(Duration::from_secs(5))
///     .pool_max_idle_per_host(8)
///     .retry(RetryConfig {
///         max_attempts: 5,
///         ..RetryConfig::default()
///     })
///     .build()?;
/// # let _ = client;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    api_key: Option<String>,
    api_version: Option<String>,
    default_headers: HeaderMap,
    retry: RetryConfig,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    use_connection_pool: bool,
    pool_max_idle_per_host: Option<usize>,
    pool_idle_timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            base_url: None,
            api_key: None,
            api_version: None,
            default_headers: HeaderMap::new(),
            retry: RetryConfig::default(),
            timeout: None,
            connect_timeout: None,
            use_connection_pool: true,
            pool_max_idle_per_host: None,
            pool_idle_timeout: None,
        }
    }

    /// Sets the base URL all endpoints are appended to. Required.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        let parsed = Url::parse(url.as_ref()).map_err(|err| {
            ApiError::internal(ErrorCode::InvalidConfig, format!("invalid base URL: {err}"))
        })?;
        self.base_url = Some(parsed);
        Ok(self)
    }

    /// Sets the API key used for `Authorization: Bearer` auth.
    ///
    /// May be omitted if every request supplies its own key via
    /// [`RequestOptions`](crate::RequestOptions).
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Pins the API version header for all requests.
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Adds a header included in every request. Request-level headers with
    /// the same name win.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref()).map_err(|err| {
            ApiError::internal(ErrorCode::InvalidConfig, format!("invalid header name: {err}"))
        })?;
        let value = HeaderValue::try_from(value.as_ref()).map_err(|err| {
            ApiError::internal(ErrorCode::InvalidConfig, format!("invalid header value: {err}"))
        })?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the client-wide retry tuning.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the per-attempt request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout on the underlying transport.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Disables connection reuse; each request opens a fresh connection.
    pub fn use_connection_pool(mut self, enabled: bool) -> Self {
        self.use_connection_pool = enabled;
        self
    }

    /// Caps the idle connections kept per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = Some(max);
        self
    }

    /// Sets how long idle connections are kept in the pool.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Builds the configured [`Client`].
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL was provided or the transport could
    /// not be constructed.
    pub fn build(self) -> Result<Client> {
        let base_url = self.base_url.ok_or_else(|| {
            ApiError::internal(ErrorCode::InvalidConfig, "a base URL is required")
        })?;

        let mut http = reqwest::Client::builder();
        if let Some(timeout) = self.connect_timeout {
            http = http.connect_timeout(timeout);
        }
        if self.use_connection_pool {
            if let Some(max) = self.pool_max_idle_per_host {
                http = http.pool_max_idle_per_host(max);
            }
            if let Some(timeout) = self.pool_idle_timeout {
                http = http.pool_idle_timeout(timeout);
            }
        } else {
            http = http.pool_max_idle_per_host(0);
        }
        let http = http.build().map_err(|err| {
            ApiError::internal(
                ErrorCode::InvalidConfig,
                format!("failed to build the HTTP transport: {err}"),
            )
        })?;

        Ok(Client {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                api_key: self.api_key,
                api_version: self.api_version,
                default_headers: self.default_headers,
                retry: self.retry,
                timeout: self.timeout,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! Retry policy: outcome classification and backoff computation.
//!
//! One attempt against the transport produces a [`RawOutcome`]. The policy
//! decides from that outcome and the attempt counter whether to retry
//! ([`should_retry`]) and how long to wait ([`retry_delay`]). Only a closed
//! set of outcomes is considered transient: HTTP 409/429/503, refused
//! connections, timeouts, and transports that report unavailability
//! explicitly. Everything else fails fast.

use http::{header, HeaderMap, StatusCode};
use rand::Rng;
use std::error::Error as _;
use std::fmt;
use std::time::{Duration, SystemTime};

/// Tuning for the retry loop.
///
/// Supplied per request via [`RequestOptions`](crate::RequestOptions),
/// falling back to the client-wide value, falling back to these defaults.
///
/// # Examples
///
/// ```
/// use recourse::RetryConfig;
/// use std::time::Duration;
///
/// let config = RetryConfig::default();
/// assert_eq!(config.max_attempts, 3);
/// assert_eq!(config.base_backoff, Duration::from_millis(500));
/// assert_eq!(config.max_backoff, Duration::from_millis(2000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts allowed, including the first one.
    pub max_attempts: u32,
    /// Delay floor; the first retry waits roughly this long.
    pub base_backoff: Duration,
    /// Delay ceiling for the exponential schedule.
    pub max_backoff: Duration,
    /// Honor a server-supplied `Retry-After` header instead of the computed
    /// backoff.
    pub respect_retry_after: bool,
    /// Ceiling for server-supplied waits, so a hostile or misconfigured
    /// `Retry-After` cannot stall the caller.
    pub max_retry_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(2000),
            respect_retry_after: true,
            max_retry_after: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// A config that never retries: every outcome is terminal.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// What a single transport attempt produced.
///
/// A `RawOutcome` lives only inside the retry loop; the executor folds the
/// terminal one into an [`ApiResponse`](crate::ApiResponse) or an
/// [`ApiError`](crate::ApiError).
#[derive(Debug)]
pub enum RawOutcome {
    /// The transport produced an HTTP response, of any status.
    Response {
        status: StatusCode,
        headers: HeaderMap,
        body: Vec<u8>,
    },
    /// The transport failed before a response could be read.
    Transport { reason: TransportReason },
}

/// Classified transport failure reasons.
///
/// A closed set: the retry table matches on these variants rather than on
/// error strings. `ServiceUnavailable` and `TooManyRequests` cover proxies
/// and sidecars that refuse at the connection layer instead of answering
/// with 503/429.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportReason {
    ConnectionRefused,
    Timeout,
    ServiceUnavailable,
    TooManyRequests,
    /// Anything else; carried for logging, never retried.
    Other(String),
}

impl TransportReason {
    /// Classifies a reqwest error by walking its source chain down to the
    /// underlying io error.
    pub(crate) fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return TransportReason::Timeout;
        }
        let mut source = err.source();
        while let Some(cause) = source {
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    std::io::ErrorKind::ConnectionRefused => {
                        return TransportReason::ConnectionRefused
                    }
                    std::io::ErrorKind::TimedOut => return TransportReason::Timeout,
                    _ => {}
                }
            }
            source = cause.source();
        }
        TransportReason::Other(err.to_string())
    }
}

impl fmt::Display for TransportReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportReason::ConnectionRefused => f.write_str("connection refused"),
            TransportReason::Timeout => f.write_str("connect or read timeout"),
            TransportReason::ServiceUnavailable => f.write_str("service unavailable"),
            TransportReason::TooManyRequests => f.write_str("too many requests"),
            TransportReason::Other(reason) => f.write_str(reason),
        }
    }
}

/// Decides whether the request should be attempted again.
///
/// `attempts_made` counts attempts already performed; once it reaches
/// `config.max_attempts` the answer is `false` regardless of the outcome.
/// Unclassified transport reasons are logged and never retried, so an
/// unexpected failure mode is not masked behind a silent retry loop.
pub fn should_retry(outcome: &RawOutcome, attempts_made: u32, config: &RetryConfig) -> bool {
    if attempts_made >= config.max_attempts {
        return false;
    }
    match outcome {
        RawOutcome::Response { status, .. } => matches!(status.as_u16(), 409 | 429 | 503),
        RawOutcome::Transport { reason } => match reason {
            TransportReason::ConnectionRefused
            | TransportReason::Timeout
            | TransportReason::ServiceUnavailable
            | TransportReason::TooManyRequests => true,
            TransportReason::Other(reason) => {
                tracing::warn!(%reason, "unclassified transport error, failing fast");
                false
            }
        },
    }
}

/// Exponential backoff with jitter for the retry after 0-indexed `attempt`.
///
/// `raw = min(base * 2^attempt, max)`, scaled by a factor drawn uniformly
/// from `[0.5, 1.0)` and clamped so the result never drops below `base`.
/// The randomization keeps a fleet of clients from retrying in lockstep.
pub fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base = config.base_backoff.as_millis() as u64;
    let max = config.max_backoff.as_millis() as u64;
    let raw = base
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(max);
    let unit: f64 = rand::thread_rng().gen_range(0.0..1.0);
    let jittered = (raw as f64 * (0.5 + 0.5 * unit)) as u64;
    Duration::from_millis(jittered.max(base))
}

/// The wait before the retry following `attempt` (0-indexed).
///
/// Prefers a server-supplied `Retry-After` (capped at
/// `config.max_retry_after`) when the outcome carried one; otherwise falls
/// back to [`backoff_delay`].
pub fn retry_delay(outcome: &RawOutcome, attempt: u32, config: &RetryConfig) -> Duration {
    if config.respect_retry_after {
        if let RawOutcome::Response { headers, .. } = outcome {
            if let Some(wait) = parse_retry_after(headers) {
                return wait.min(config.max_retry_after);
            }
        }
    }
    backoff_delay(attempt, config)
}

/// Parses `Retry-After` in both delay-seconds and HTTP-date forms.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get(header::RETRY_AFTER)?.to_str().ok()?;
    if let Ok(seconds) = header.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    if let Ok(at) = httpdate::parse_http_date(header) {
        if let Ok(until) = at.duration_since(SystemTime::now()) {
            return Some(until);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn response(status: u16) -> RawOutcome {
        RawOutcome::Response {
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    fn transport(reason: TransportReason) -> RawOutcome {
        RawOutcome::Transport { reason }
    }

    #[test]
    fn transient_statuses_are_retried_below_the_attempt_cap() {
        let config = RetryConfig::default();
        for status in [409, 429, 503] {
            assert!(should_retry(&response(status), 0, &config), "{status}");
            assert!(should_retry(&response(status), 2, &config), "{status}");
        }
    }

    #[test]
    fn non_transient_statuses_are_never_retried() {
        let config = RetryConfig::default();
        for status in [200, 201, 204, 400, 401, 402, 404, 422, 500, 502, 504] {
            assert!(!should_retry(&response(status), 0, &config), "{status}");
        }
    }

    #[test]
    fn exhausted_attempts_resolve_every_outcome() {
        let config = RetryConfig::default();
        for attempts in [3, 4, 100] {
            assert!(!should_retry(&response(503), attempts, &config));
            assert!(!should_retry(
                &transport(TransportReason::ConnectionRefused),
                attempts,
                &config
            ));
        }
    }

    #[test]
    fn transient_transport_reasons_are_retried() {
        let config = RetryConfig::default();
        for reason in [
            TransportReason::ConnectionRefused,
            TransportReason::Timeout,
            TransportReason::ServiceUnavailable,
            TransportReason::TooManyRequests,
        ] {
            assert!(should_retry(&transport(reason), 1, &config));
        }
    }

    #[test]
    fn unclassified_transport_reasons_fail_fast() {
        let config = RetryConfig::default();
        let outcome = transport(TransportReason::Other("enoent".to_owned()));
        assert!(!should_retry(&outcome, 0, &config));
    }

    #[test]
    fn backoff_stays_within_configured_bounds() {
        let config = RetryConfig {
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1600),
            ..RetryConfig::default()
        };
        for attempt in 0..8 {
            for _ in 0..100 {
                let delay = backoff_delay(attempt, &config);
                assert!(delay >= config.base_backoff, "attempt {attempt}: {delay:?}");
                assert!(delay <= config.max_backoff, "attempt {attempt}: {delay:?}");
            }
        }
    }

    #[test]
    fn backoff_grows_toward_the_ceiling() {
        let config = RetryConfig {
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1600),
            ..RetryConfig::default()
        };
        // The raw delay saturates at max_backoff by attempt 4, so even the
        // smallest jitter draw stays at or above half the ceiling.
        for _ in 0..100 {
            let delay = backoff_delay(6, &config);
            assert!(delay >= Duration::from_millis(800), "{delay:?}");
        }
    }

    #[test]
    fn retry_after_seconds_overrides_backoff() {
        let config = RetryConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert(header::RETRY_AFTER, HeaderValue::from_static("7"));
        let outcome = RawOutcome::Response {
            status: StatusCode::TOO_MANY_REQUESTS,
            headers,
            body: Vec::new(),
        };
        assert_eq!(retry_delay(&outcome, 0, &config), Duration::from_secs(7));
    }

    #[test]
    fn retry_after_is_capped() {
        let config = RetryConfig {
            max_retry_after: Duration::from_secs(5),
            ..RetryConfig::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert(header::RETRY_AFTER, HeaderValue::from_static("600"));
        let outcome = RawOutcome::Response {
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers,
            body: Vec::new(),
        };
        assert_eq!(retry_delay(&outcome, 0, &config), Duration::from_secs(5));
    }

    #[test]
    fn retry_after_http_date_form_is_parsed() {
        let mut headers = HeaderMap::new();
        let at = SystemTime::now() + Duration::from_secs(60);
        headers.insert(
            header::RETRY_AFTER,
            HeaderValue::from_str(&httpdate::fmt_http_date(at)).unwrap(),
        );
        let wait = parse_retry_after(&headers).expect("date form should parse");
        assert!(wait > Duration::from_secs(50) && wait <= Duration::from_secs(60));
    }

    #[test]
    fn ignoring_retry_after_uses_the_backoff_schedule() {
        let config = RetryConfig {
            respect_retry_after: false,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(200),
            ..RetryConfig::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert(header::RETRY_AFTER, HeaderValue::from_static("600"));
        let outcome = RawOutcome::Response {
            status: StatusCode::TOO_MANY_REQUESTS,
            headers,
            body: Vec::new(),
        };
        assert!(retry_delay(&outcome, 0, &config) <= Duration::from_millis(200));
    }
}

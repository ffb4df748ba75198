//! # Recourse - a retry-aware JSON API client
//!
//! Recourse turns structured parameters into correctly-authenticated,
//! correctly-encoded HTTPS requests, executes them with bounded retries on
//! transient failure, and turns every HTTP or network outcome into a stable,
//! typed error taxonomy.
//!
//! ## Quick Start
//!
//! ```no_run
//! use recourse::{Client, Request};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), recourse::ApiError> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com")?
//!         .api_key("sk_live_1234")
//!         .build()?;
//!
//!     // Reads encode their parameters into the query string:
//!     // GET /v2/contacts?filter[status]=open
//!     let open = client
//!         .execute(Request::get("/v2/contacts").put_param("filter", json!({"status": "open"})))
//!         .await?;
//!     println!("contacts: {}", open.data);
//!
//!     // Writes carry an idempotency key so server-side deduplication makes
//!     // retried submissions safe.
//!     let created = client
//!         .execute(Request::post("/v2/contacts").put_param("email", "kit@example.com"))
//!         .await?;
//!     println!("created: {}", created["id"]);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **One pipeline** - every call goes through [`Client::execute`]: header
//!   composition, body/query encoding, the retry loop, response decoding.
//! - **Bounded retries** - HTTP 409/429/503, refused connections, and
//!   timeouts are retried with jittered exponential backoff; everything else
//!   fails fast. A server-supplied `Retry-After` is honored (and capped).
//! - **Idempotent writes** - every non-GET/HEAD request carries an
//!   `Idempotency-Key`, generated once per logical request and reused
//!   verbatim across retries; callers can pin their own.
//! - **Typed failures** - every failure is an [`ApiError`] with a source
//!   ([`ErrorSource`]), a symbolic code ([`ErrorCode`]), the server's
//!   request-tracing id, and any structured payload the server returned.
//! - **Transparent decompression** - gzip and deflate response bodies are
//!   decoded before JSON parsing.
//! - **Structured logging** - attempt dispatch, retry scheduling, and
//!   terminal failures are logged via `tracing`.
//!
//! ## Error Handling
//!
//! All failure paths converge on [`ApiError`]; retries are invisible except
//! as latency, and the caller only ever observes the terminal outcome:
//!
//! ```no_run
//! use recourse::{Client, ErrorSource, Request};
//!
//! # async fn example() -> Result<(), recourse::ApiError> {
//! # let client = Client::builder().base_url("https://api.example.com")?.api_key("key").build()?;
//! match client.execute(Request::get("/v2/contacts/42")).await {
//!     Ok(response) => println!("{}", response.data),
//!     Err(err) if err.source == ErrorSource::Remote => {
//!         eprintln!("server rejected the request [{}]: {}", err.code, err.message);
//!     }
//!     Err(err) if err.source == ErrorSource::Network => {
//!         eprintln!("gave up after retries: {}", err.message);
//!     }
//!     Err(err) => eprintln!("local failure: {err}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retry Behavior
//!
//! The policy lives in the public [`retry`] module. Tuning rides on
//! [`RetryConfig`], per client or per request:
//!
//! ```no_run
//! use recourse::{Client, RetryConfig};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), recourse::ApiError> {
//! let client = Client::builder()
//!     .base_url("https://api.example.com")?
//!     .api_key("sk_live_1234")
//!     .retry(RetryConfig {
//!         max_attempts: 5,
//!         base_backoff: Duration::from_millis(250),
//!         max_backoff: Duration::from_secs(4),
//!         ..RetryConfig::default()
//!     })
//!     .build()?;
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

mod client;
mod encode;
mod error;
mod idempotency;
mod request;
mod response;
pub mod retry;

pub use client::{Client, ClientBuilder};
pub use error::{ApiError, ErrorCode, ErrorSource, Result};
pub use request::{Params, Request, RequestOptions};
pub use response::ApiResponse;
pub use retry::RetryConfig;

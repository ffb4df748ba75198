//! Header composition and parameter encoding.

use http::{header, HeaderMap, HeaderValue};
use serde_json::Value;
use url::form_urlencoded;

use crate::error::{ApiError, ErrorCode};
use crate::request::Params;

/// Version header sent when the caller supplies none.
pub(crate) const DEFAULT_API_VERSION: &str = "2025-10";
pub(crate) const API_VERSION_HEADER: &str = "x-api-version";
pub(crate) const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

const USER_AGENT: &str = concat!("recourse/", env!("CARGO_PKG_VERSION"));

/// Builds the final header set for a request.
///
/// Later steps overwrite earlier defaults but never caller-explicit values
/// unless stated. The negotiation headers and `Authorization` are
/// non-negotiable and always overwrite; `Content-Type` is only defaulted;
/// the idempotency key is insert-if-absent so a caller can pin their own key
/// across manual retries.
pub(crate) fn compose_headers(
    caller: &HeaderMap,
    api_key: &str,
    api_version: Option<&str>,
    idempotency_key: Option<&str>,
) -> Result<HeaderMap, ApiError> {
    let mut headers = caller.clone();

    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/json; charset=utf8"),
    );
    headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
    }

    headers.insert(header::AUTHORIZATION, header_value(&format!("Bearer {api_key}"))?);
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(
        API_VERSION_HEADER,
        header_value(api_version.unwrap_or(DEFAULT_API_VERSION))?,
    );

    if let Some(key) = idempotency_key {
        if !headers.contains_key(IDEMPOTENCY_KEY_HEADER) {
            headers.insert(IDEMPOTENCY_KEY_HEADER, header_value(key)?);
        }
    }

    Ok(headers)
}

fn header_value(raw: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(raw).map_err(|_| {
        ApiError::internal(
            ErrorCode::EncodeError,
            format!("value {raw:?} contains characters that are not valid in a header"),
        )
    })
}

/// Serializes `params` for a write request under the resolved content type.
pub(crate) fn encode_body(params: &Params, content_type: &str) -> Result<Vec<u8>, ApiError> {
    if content_type.starts_with("application/json") {
        serde_json::to_vec(params).map_err(|err| {
            ApiError::internal(
                ErrorCode::EncodeError,
                format!("request parameters could not be encoded as JSON: {err}"),
            )
        })
    } else {
        Ok(query_string(params).into_bytes())
    }
}

/// Flattens `params` into a deterministic URL-encoded query string.
///
/// Nested maps and lists become bracketed path keys:
/// `{"a": {"b": [1]}}` → `a[b][0]=1`. Object keys iterate in sorted order,
/// so the output is stable for a given parameter map. Returns an empty
/// string for empty params.
pub(crate) fn query_string(params: &Params) -> String {
    let mut pairs = Vec::new();
    for (key, value) in params {
        flatten_into(escape(key), value, &mut pairs);
    }
    let mut out = String::new();
    for (key, value) in pairs {
        if !out.is_empty() {
            out.push('&');
        }
        out.push_str(&key);
        out.push('=');
        out.push_str(&value);
    }
    out
}

fn flatten_into(path: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(format!("{path}[{}]", escape(key)), nested, out);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten_into(format!("{path}[{index}]"), nested, out);
            }
        }
        Value::Null => out.push((path, String::new())),
        Value::String(text) => {
            let escaped = escape(text);
            out.push((path, escaped));
        }
        other => out.push((path, escape(&other.to_string()))),
    }
}

// Bracket characters in the assembled path stay literal; only the individual
// key segments and the values are escaped.
fn escape(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn nested_params_flatten_to_bracketed_paths() {
        let params = params(json!({
            "a": { "b": [1, 2] },
            "q": "hello world",
        }));
        assert_eq!(query_string(&params), "a[b][0]=1&a[b][1]=2&q=hello+world");
    }

    #[test]
    fn scalars_and_nulls_encode_predictably() {
        let params = params(json!({
            "active": true,
            "cursor": null,
            "limit": 25,
        }));
        assert_eq!(query_string(&params), "active=true&cursor=&limit=25");
    }

    #[test]
    fn reserved_characters_are_escaped_in_keys_and_values() {
        let params = params(json!({
            "email": "kit&co@example.com",
            "weird key": { "a=b": "c&d" },
        }));
        assert_eq!(
            query_string(&params),
            "email=kit%26co%40example.com&weird+key[a%3Db]=c%26d"
        );
    }

    #[test]
    fn empty_params_produce_an_empty_query() {
        assert_eq!(query_string(&Params::new()), "");
    }

    #[test]
    fn form_body_matches_the_query_encoding() {
        let params = params(json!({ "filter": { "status": "open" } }));
        let body = encode_body(&params, "application/x-www-form-urlencoded").unwrap();
        assert_eq!(body, b"filter[status]=open");
    }

    #[test]
    fn json_body_serializes_the_param_object() {
        let params = params(json!({ "name": "Kit", "tags": ["a", "b"] }));
        let body = encode_body(&params, "application/json").unwrap();
        let round: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(round, json!({ "name": "Kit", "tags": ["a", "b"] }));
    }

    #[test]
    fn negotiation_headers_overwrite_caller_values() {
        let mut caller = HeaderMap::new();
        caller.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        caller.insert(header::CONNECTION, HeaderValue::from_static("close"));
        let headers = compose_headers(&caller, "key", None, None).unwrap();
        assert_eq!(headers[header::ACCEPT], "application/json; charset=utf8");
        assert_eq!(headers[header::ACCEPT_ENCODING], "gzip");
        assert_eq!(headers[header::CONNECTION], "keep-alive");
        assert_eq!(headers[header::AUTHORIZATION], "Bearer key");
    }

    #[test]
    fn content_type_is_defaulted_but_not_overwritten() {
        let headers = compose_headers(&HeaderMap::new(), "key", None, None).unwrap();
        assert_eq!(
            headers[header::CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );

        let mut caller = HeaderMap::new();
        caller.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let headers = compose_headers(&caller, "key", None, None).unwrap();
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn api_version_defaults_to_the_pinned_version() {
        let headers = compose_headers(&HeaderMap::new(), "key", None, None).unwrap();
        assert_eq!(headers[API_VERSION_HEADER], DEFAULT_API_VERSION);

        let headers = compose_headers(&HeaderMap::new(), "key", Some("2024-01"), None).unwrap();
        assert_eq!(headers[API_VERSION_HEADER], "2024-01");
    }

    #[test]
    fn idempotency_key_is_insert_if_absent() {
        let headers =
            compose_headers(&HeaderMap::new(), "key", None, Some("generated")).unwrap();
        assert_eq!(headers[IDEMPOTENCY_KEY_HEADER], "generated");

        let mut caller = HeaderMap::new();
        caller.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static("pinned"));
        let headers = compose_headers(&caller, "key", None, Some("generated")).unwrap();
        assert_eq!(headers[IDEMPOTENCY_KEY_HEADER], "pinned");
    }
}

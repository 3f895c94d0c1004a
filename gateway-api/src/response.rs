//! Response encoding: plain JSON, `307` redirects, and streaming bodies.
//!
//! Every endpoint handler still returns a `serde_json::Value` — the fixed
//! `gateway_core::HandlerFn` contract the event gateway and `Invoke` also
//! rely on. A handler that wants a redirect or a streamed body returns it
//! wrapped via [`ResponseKind::into_value`] under a reserved top-level key;
//! this module is the only place that key is interpreted.

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use gateway_core::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The top-level key a handler's output is tagged with to request a
/// non-JSON response. Absent or unrecognized, the value is encoded as
/// plain JSON at the endpoint's declared success status.
const RESPONSE_ENVELOPE_KEY: &str = "__gateway_response__";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub size: u64,
}

/// A response that isn't a plain encoded value: a redirect, or a streamed
/// body carrying {content type, optional length, optional byte range,
/// optional filename}.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseKind {
    Redirect {
        location: String,
    },
    Stream {
        content_type: String,
        body: Vec<u8>,
        content_length: Option<u64>,
        range: Option<ByteRange>,
        filename: Option<String>,
    },
}

impl ResponseKind {
    /// Wrap this response kind as the `Value` a handler returns.
    pub fn into_value(self) -> Value {
        let mut envelope = Map::new();
        envelope.insert(RESPONSE_ENVELOPE_KEY.to_string(), serde_json::to_value(self).expect("ResponseKind always serializes"));
        Value::Object(envelope)
    }

    fn from_value(value: &Value) -> Option<Self> {
        let tagged = value.as_object()?.get(RESPONSE_ENVELOPE_KEY)?;
        serde_json::from_value(tagged.clone()).ok()
    }
}

/// Encode a successful handler output at `success_status`, dispatching on
/// whether it carries a [`ResponseKind`].
pub fn encode_success(output: Value, success_status: u16) -> Response {
    match ResponseKind::from_value(&output) {
        Some(ResponseKind::Redirect { location }) => redirect_response(&location),
        Some(ResponseKind::Stream { content_type, body, content_length, range, filename }) => {
            stream_response(content_type, body, content_length, range, filename)
        }
        None => {
            let status = StatusCode::from_u16(success_status).unwrap_or(StatusCode::OK);
            (status, axum::Json(output)).into_response()
        }
    }
}

fn redirect_response(location: &str) -> Response {
    let mut response = StatusCode::TEMPORARY_REDIRECT.into_response();
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(axum::http::header::LOCATION, value);
    }
    response
}

fn stream_response(
    content_type: String,
    body: Vec<u8>,
    content_length: Option<u64>,
    range: Option<ByteRange>,
    filename: Option<String>,
) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();

    if let Ok(value) = HeaderValue::from_str(&content_type) {
        headers.insert(axum::http::header::CONTENT_TYPE, value);
    }
    if let Some(length) = content_length {
        if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
            headers.insert(axum::http::header::CONTENT_LENGTH, value);
        }
    }
    if let Some(range) = &range {
        let rendered = format!("bytes {}-{}/{}", range.start, range.end, range.size);
        if let Ok(value) = HeaderValue::from_str(&rendered) {
            headers.insert(axum::http::header::CONTENT_RANGE, value);
        }
    }
    if let Some(filename) = &filename {
        let rendered = format!("attachment; filename=\"{filename}\"");
        if let Ok(value) = HeaderValue::from_str(&rendered) {
            headers.insert(axum::http::header::CONTENT_DISPOSITION, value);
        }
    }

    response
}

/// Map a `GatewayError` onto `{status, {"error": message}}`, the same
/// shape as the teacher's `AppError::IntoResponse`.
pub fn encode_error(err: &GatewayError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({ "error": err.message(), "kind": err.kind() });
    (status, axum::Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::json;

    async fn response_json(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn plain_value_is_encoded_at_the_declared_status() {
        let (status, body) = response_json(encode_success(json!({"Text": "HI"}), 201)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({"Text": "HI"}));
    }

    #[test]
    fn redirect_kind_produces_307_with_location() {
        let value = ResponseKind::Redirect { location: "/elsewhere".into() }.into_value();
        let response = encode_success(value, 200);
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers().get("location").unwrap(), "/elsewhere");
    }

    #[test]
    fn stream_kind_sets_content_headers() {
        let value = ResponseKind::Stream {
            content_type: "text/plain".into(),
            body: b"hello".to_vec(),
            content_length: Some(5),
            range: Some(ByteRange { start: 0, end: 4, size: 5 }),
            filename: Some("greeting.txt".into()),
        }
        .into_value();
        let response = encode_success(value, 200);
        assert_eq!(response.headers().get("content-type").unwrap(), "text/plain");
        assert_eq!(response.headers().get("content-length").unwrap(), "5");
        assert_eq!(response.headers().get("content-range").unwrap(), "bytes 0-4/5");
        assert_eq!(response.headers().get("content-disposition").unwrap(), "attachment; filename=\"greeting.txt\"");
    }

    #[tokio::test]
    async fn gateway_error_maps_to_its_status_code() {
        let (status, body) = response_json(encode_error(&GatewayError::NotFound("missing".into()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "missing");
        assert_eq!(body["kind"], "not-found");
    }
}

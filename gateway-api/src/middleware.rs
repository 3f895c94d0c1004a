//! Envelope assembly for one incoming request, in the order the envelope
//! is expected to come out: metadata decode, route set, authorization lift,
//! trace id resolution, header lift.
//!
//! Unlike [`gateway_core::middleware::PanicRecovery`] and
//! [`gateway_core::middleware::RoleResolution`], these steps need the raw
//! request headers, which aren't part of `InvocationContext` — so they run
//! as plain functions before an `Envelope` ever enters the composed
//! `MiddlewareStack`, rather than as `Middleware` impls themselves.

use axum::http::HeaderMap as AxumHeaderMap;
use gateway_core::envelope::{Envelope, RouteDescriptor};

const METADATA_HEADER: &str = "x-rpc-metadata";
const AUTHORIZATION_HEADER: &str = "authorization";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the envelope an endpoint handler will see, per the ordered steps:
/// decode `X-RPC-Metadata`, set the route to `route` (overwriting anything
/// inherited from the wire), lift `Authorization` (header wins over
/// whatever metadata carried), ensure a trace id (metadata > `X-Request-ID`
/// > newly minted), then lift every request header into the envelope.
pub fn build_envelope(headers: &AxumHeaderMap, route: RouteDescriptor) -> Envelope {
    let mut envelope = Envelope::blank();

    if let Some(metadata) = header_str(headers, METADATA_HEADER) {
        if let Ok(decoded) = Envelope::decode(&envelope, metadata.as_bytes()) {
            envelope = decoded;
        }
    }

    envelope = envelope.with_route(route);

    if let Some(authorization) = header_str(headers, AUTHORIZATION_HEADER) {
        envelope = envelope.with_authorization(authorization);
    }

    let fallback_trace_id = header_str(headers, REQUEST_ID_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    envelope = envelope.with_trace_id_if_absent(fallback_trace_id);

    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            envelope = envelope.with_header(name.as_str(), value);
        }
    }

    envelope
}

fn header_str<'a>(headers: &'a AxumHeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

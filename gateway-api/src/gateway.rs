//! `ApiGateway`: the HTTP surface implementing `gateway_core::Gateway`.
//!
//! Builds an `axum::Router` from a snapshot of `Registry::routes_for_gateway`
//! taken at construction time (registration is a one-shot builder path, so
//! the snapshot never needs to be refreshed), wires panic recovery, role
//! resolution and event-publish middleware around every matched endpoint,
//! and exposes `GET /healthz` from the shared `HealthRegistry`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use gateway_broker::{Broker, PublishMiddleware};
use gateway_core::envelope::{GatewayKind, RouteDescriptor};
use gateway_core::middleware::{InvocationContext, MiddlewareStack, PanicRecovery, RoleResolution};
use gateway_core::{ErrorHandler, Gateway, GatewayError, HealthRegistry};
use gateway_registry::{Endpoint, EndpointRoute, Registry, Service};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::decode::decode_input;
use crate::middleware::build_envelope;
use crate::path::PathTemplate;
use crate::response::{encode_error, encode_success};

/// A single gateway route resolved from the registry, with its path parsed
/// once rather than on every request.
struct ResolvedRoute {
    method: String,
    template: PathTemplate,
    endpoint: Arc<Endpoint>,
    route: EndpointRoute,
    service: Arc<Service>,
}

/// Request bodies larger than this are rejected as `bad-request` rather
/// than buffered in full.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

struct ApiGatewayState {
    routes: Vec<ResolvedRoute>,
    broker: Arc<dyn Broker>,
    on_error: ErrorHandler,
    health: Arc<HealthRegistry>,
}

pub struct ApiGateway {
    bind_addr: String,
    state: Arc<ApiGatewayState>,
    shutdown_token: CancellationToken,
    listen_finished: Arc<Notify>,
}

impl ApiGateway {
    /// Snapshot every API route currently in `registry`. Services must be
    /// fully registered before this is called — routes added afterwards are
    /// not picked up.
    pub fn new(
        bind_addr: impl Into<String>,
        registry: &Registry,
        broker: Arc<dyn Broker>,
        on_error: ErrorHandler,
        health: Arc<HealthRegistry>,
    ) -> Self {
        let routes = registry
            .routes_for_gateway(GatewayKind::Api)
            .into_iter()
            .map(|(endpoint, route)| {
                let service = registry
                    .service_for_endpoint(&endpoint.qualified_name())
                    .expect("a registered endpoint always has an owning service");
                ResolvedRoute {
                    method: route.method.to_ascii_uppercase(),
                    template: PathTemplate::parse(&route.path),
                    endpoint,
                    route,
                    service,
                }
            })
            .collect();

        Self {
            bind_addr: bind_addr.into(),
            state: Arc::new(ApiGatewayState { routes, broker, on_error, health }),
            shutdown_token: CancellationToken::new(),
            listen_finished: Arc::new(Notify::new()),
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(healthz))
            .fallback(dispatch)
            .with_state(self.state.clone())
    }
}

impl Gateway for ApiGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Api
    }

    fn listen(&self) -> gateway_core::middleware::BoxFuture<'_, Result<(), GatewayError>> {
        Box::pin(async move {
            let listener = tokio::net::TcpListener::bind(&self.bind_addr)
                .await
                .map_err(|err| GatewayError::Unexpected(format!("binding {}: {err}", self.bind_addr)))?;
            tracing::info!(addr = %self.bind_addr, "api gateway listening");

            let shutdown = self.shutdown_token.clone();
            let result = axum::serve(listener, self.router().into_make_service())
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .map_err(|err| GatewayError::Unexpected(format!("api gateway serve error: {err}")));

            self.listen_finished.notify_waiters();
            result
        })
    }

    fn shutdown(&self, ctx: gateway_core::ShutdownContext) -> gateway_core::middleware::BoxFuture<'_, ()> {
        Box::pin(async move {
            self.shutdown_token.cancel();
            tokio::select! {
                _ = self.listen_finished.notified() => {}
                _ = tokio::time::sleep(ctx.deadline) => {}
                _ = ctx.interrupt.cancelled() => {}
            }
        })
    }
}

async fn healthz(State(state): State<Arc<ApiGatewayState>>) -> Response {
    let report = state.health.aggregate_readiness().await;
    let status = if report.is_up() { 200 } else { 503 };
    encode_success(serde_json::to_value(&report).unwrap_or(serde_json::Value::Null), status)
}

async fn dispatch(State(state): State<Arc<ApiGatewayState>>, request: Request) -> Response {
    let method = request.method().as_str().to_ascii_uppercase();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();
    let headers = request.headers().clone();

    let Some((resolved, captures)) = state
        .routes
        .iter()
        .find_map(|resolved| {
            if resolved.method != method {
                return None;
            }
            resolved.template.matches(&path).map(|captures| (resolved, captures))
        })
    else {
        return encode_error(&GatewayError::NotFound(format!("no route for {method} {path}")));
    };

    let body = match to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => return encode_error(&GatewayError::BadRequest(format!("reading request body: {err}"))),
    };
    let body = if body.is_empty() { None } else { Some(body.as_ref()) };

    let input = match decode_input(&captures, &query, body) {
        Ok(input) => input,
        Err(err) => return encode_error(&err),
    };

    let route_descriptor = RouteDescriptor {
        service: resolved.endpoint.service.clone(),
        endpoint: resolved.endpoint.name.clone(),
        gateway: GatewayKind::Api,
        method: resolved.route.method.clone(),
        path: resolved.route.path.clone(),
        roles: resolved.endpoint.roles.clone(),
    };
    let envelope = build_envelope(&headers, route_descriptor);
    let trace_id = envelope.trace_id().to_string();

    let stack = MiddlewareStack::new()
        .push(Arc::new(PanicRecovery))
        .extend(&resolved.service.middleware)
        .push(Arc::new(RoleResolution::new(resolved.endpoint.roles.clone())))
        .push(Arc::new(PublishMiddleware::new(state.broker.clone(), state.on_error.clone())));
    let composed = stack.then(resolved.endpoint.handler.clone());

    let mut response = match composed(InvocationContext::new(envelope, input)).await {
        Ok(output) => encode_success(output, resolved.route.status),
        Err(err) => {
            (state.on_error)(err.clone());
            encode_error(&err)
        }
    };
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(HeaderName::from_static("x-request-id"), value);
    }
    response
}

//! The service/endpoint/route data model shared by every gateway.
//!
//! Every endpoint's input and output is a `serde_json::Value` rather than a
//! generated per-service struct: the source-interface parser and codec are
//! out of scope for this runtime, and a `Value` gives the registry, the role
//! resolver, and the event flattener a single uniform shape to operate on.

use std::sync::Arc;

use gateway_core::{GatewayKind, HandlerFn};
use serde_json::Value;

/// Produces a fresh, empty input value for an endpoint before decoding.
pub type InputFactory = Arc<dyn Fn() -> Value + Send + Sync>;

/// One exposed route for an endpoint: an HTTP method + path template for the
/// API gateway, or the literal method `"ON"` with a topic pattern as path
/// for the event gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRoute {
    pub gateway: GatewayKind,
    pub method: String,
    pub path: String,
    pub status: u16,
}

impl EndpointRoute {
    pub fn api(method: impl Into<String>, path: impl Into<String>, status: u16) -> Self {
        Self { gateway: GatewayKind::Api, method: method.into(), path: path.into(), status }
    }

    /// An event-gateway route: `path` is a topic pattern, method is always
    /// `"ON"`, and status is unused (events have no response status).
    pub fn event(topic: impl Into<String>) -> Self {
        Self { gateway: GatewayKind::Events, method: "ON".into(), path: topic.into(), status: 0 }
    }
}

/// {service name, endpoint name, input factory, post-middleware composed
/// handler, role templates, routes}. Immutable once registered.
pub struct Endpoint {
    pub service: String,
    pub name: String,
    pub input_factory: InputFactory,
    pub handler: HandlerFn,
    pub roles: Vec<String>,
    pub routes: Vec<EndpointRoute>,
}

impl Endpoint {
    /// The `service.endpoint` qualified name: unique across every endpoint
    /// registered in one server, and the broker topic/consumer-group key the
    /// event gateway derives its subscriptions from.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.service, self.name)
    }
}

/// {name, version, ordered endpoints, service-wide middleware}. Immutable
/// after registration; the middleware here sits between the gateway's own
/// middleware and each endpoint's handler.
pub struct Service {
    pub name: String,
    pub version: String,
    pub endpoints: Vec<Arc<Endpoint>>,
    pub middleware: gateway_core::MiddlewareStack,
}

impl Service {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            endpoints: Vec::new(),
            middleware: gateway_core::MiddlewareStack::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(Arc::new(endpoint));
        self
    }

    pub fn with_middleware(mut self, middleware: gateway_core::MiddlewareStack) -> Self {
        self.middleware = middleware;
        self
    }
}

use std::sync::Arc;

use gateway_core::GatewayKind;
use gateway_registry::{Endpoint, EndpointRoute, Registry, Service};
use serde_json::Value;

fn noop_handler() -> gateway_core::HandlerFn {
    Arc::new(|ctx| Box::pin(async move { Ok(ctx.input) }))
}

fn endpoint(service: &str, name: &str, routes: Vec<EndpointRoute>) -> Endpoint {
    Endpoint {
        service: service.into(),
        name: name.into(),
        input_factory: Arc::new(|| Value::Null),
        handler: noop_handler(),
        roles: vec![],
        routes,
    }
}

#[test]
fn an_endpoint_with_zero_routes_stays_reachable_by_qualified_name() {
    let registry = Registry::new();
    let service = Service::new("Accounts", "v1").with_endpoint(endpoint("Accounts", "Internal", vec![]));
    registry.register_service(service).unwrap();

    let found = registry.endpoint("Accounts.Internal").expect("endpoint retained despite no routes");
    assert!(found.routes.is_empty());
    assert!(registry.routes_for_gateway(GatewayKind::Api).is_empty());
    assert!(registry.routes_for_gateway(GatewayKind::Events).is_empty());
}

#[test]
fn routes_for_gateway_only_returns_that_gateway_s_routes() {
    let registry = Registry::new();
    let service = Service::new("Orders", "v1").with_endpoint(endpoint(
        "Orders",
        "Create",
        vec![EndpointRoute::api("POST", "/orders", 201), EndpointRoute::event("order.created")],
    ));
    registry.register_service(service).unwrap();

    let api_routes = registry.routes_for_gateway(GatewayKind::Api);
    let event_routes = registry.routes_for_gateway(GatewayKind::Events);

    assert_eq!(api_routes.len(), 1);
    assert_eq!(api_routes[0].1.path, "/orders");
    assert_eq!(event_routes.len(), 1);
    assert_eq!(event_routes[0].1.path, "order.created");
}

#[test]
fn qualified_name_joins_service_and_endpoint_names() {
    let registry = Registry::new();
    let service = Service::new("Orders", "v1").with_endpoint(endpoint("Orders", "Create", vec![]));
    registry.register_service(service).unwrap();

    assert!(registry.endpoint("Orders.Create").is_some());
    assert!(registry.endpoint("Orders.Missing").is_none());
}

#[test]
fn duplicate_path_with_distinct_method_on_the_same_gateway_is_allowed() {
    let registry = Registry::new();
    let service = Service::new("Orders", "v1").with_endpoint(endpoint(
        "Orders",
        "CreateOrGet",
        vec![EndpointRoute::api("POST", "/orders", 201), EndpointRoute::api("GET", "/orders", 200)],
    ));

    assert!(registry.register_service(service).is_ok());
    assert_eq!(registry.routes_for_gateway(GatewayKind::Api).len(), 2);
}

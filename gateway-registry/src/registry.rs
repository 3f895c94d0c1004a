//! The central registry: owns every registered service and endpoint, and
//! enforces the two registration-time invariants — qualified-name
//! uniqueness and per-gateway route non-collision.
//!
//! State lives behind one `std::sync::Mutex`, following the source's
//! registration-time registry (`r2e_grpc::registry::GrpcServiceRegistry`):
//! registration is a one-shot builder path, not a hot concurrent-access
//! surface, so a single lock over plain collections is simpler than a
//! sharded concurrent map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gateway_core::GatewayKind;

use crate::model::{Endpoint, EndpointRoute, Service};

#[derive(Debug)]
pub enum RegistryError {
    /// Two services registered an endpoint under the same qualified name.
    DuplicateQualifiedName(String),
    /// Two different (gateway, endpoint, route) registrations collide on
    /// the same (method, path) within one gateway.
    DuplicateRoute { gateway: GatewayKind, method: String, path: String },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateQualifiedName(name) => {
                write!(f, "endpoint qualified name {name:?} is already registered")
            }
            RegistryError::DuplicateRoute { gateway, method, path } => {
                write!(f, "route {method} {path:?} is already registered on gateway {gateway:?}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// The `(gateway, method, path)` key a route occupies, plus the qualified
/// name of the endpoint that claimed it — needed to tell a genuine
/// re-registration (same endpoint, same route: idempotent) from a real
/// collision (a different endpoint, or a second distinct route, landing on
/// the same method+path: a failure).
#[derive(Default)]
struct Inner {
    services: Vec<Arc<Service>>,
    endpoints: HashMap<String, Arc<Endpoint>>,
    endpoint_services: HashMap<String, Arc<Service>>,
    claimed_routes: HashMap<(GatewayKind, String, String), String>,
}

/// Builder-style registration target: `Registry::new()` followed by one
/// `register_service` call per service, mirroring the source's
/// `NewServer(Listen(gw1)…, Register(svc1)…)` construction.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every endpoint of `service`, and every route of every
    /// endpoint. An endpoint with zero routes is still retained so
    /// `Server.Invoke` can reach it by qualified name even though no
    /// gateway exposes it.
    pub fn register_service(&self, service: Service) -> Result<Arc<Service>, RegistryError> {
        let mut inner = self.inner.lock().unwrap();

        for endpoint in &service.endpoints {
            let qualified_name = endpoint.qualified_name();
            if inner.endpoints.contains_key(&qualified_name) {
                return Err(RegistryError::DuplicateQualifiedName(qualified_name));
            }
        }
        for endpoint in &service.endpoints {
            for route in &endpoint.routes {
                Self::check_route(&inner.claimed_routes, &endpoint.qualified_name(), route)?;
            }
        }

        let service = Arc::new(service);
        for endpoint in &service.endpoints {
            let qualified_name = endpoint.qualified_name();
            for route in &endpoint.routes {
                let key = (route.gateway, route.method.clone(), route.path.clone());
                inner.claimed_routes.insert(key, qualified_name.clone());
            }
            inner.endpoints.insert(qualified_name.clone(), endpoint.clone());
            inner.endpoint_services.insert(qualified_name, service.clone());
        }
        inner.services.push(service.clone());
        Ok(service)
    }

    /// Re-registering the exact same (gateway, endpoint, route) tuple is a
    /// no-op; a different endpoint — or the same endpoint via a second,
    /// distinct route — claiming the same (method, path) is a failure.
    fn check_route(
        claimed: &HashMap<(GatewayKind, String, String), String>,
        qualified_name: &str,
        route: &EndpointRoute,
    ) -> Result<(), RegistryError> {
        let key = (route.gateway, route.method.clone(), route.path.clone());
        match claimed.get(&key) {
            Some(existing) if existing == qualified_name => Ok(()),
            Some(_) => Err(RegistryError::DuplicateRoute {
                gateway: route.gateway,
                method: route.method.clone(),
                path: route.path.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn endpoint(&self, qualified_name: &str) -> Option<Arc<Endpoint>> {
        self.inner.lock().unwrap().endpoints.get(qualified_name).cloned()
    }

    pub fn services(&self) -> Vec<Arc<Service>> {
        self.inner.lock().unwrap().services.clone()
    }

    /// The service that owns `qualified_name`, whose service-wide middleware
    /// sits between the gateway's own middleware and the endpoint's handler.
    pub fn service_for_endpoint(&self, qualified_name: &str) -> Option<Arc<Service>> {
        self.inner.lock().unwrap().endpoint_services.get(qualified_name).cloned()
    }

    /// Every (endpoint, route) pair exposed on `gateway`, for that gateway
    /// to build its path tree or topic/group subscriptions from.
    pub fn routes_for_gateway(&self, gateway: GatewayKind) -> Vec<(Arc<Endpoint>, EndpointRoute)> {
        self.inner
            .lock()
            .unwrap()
            .endpoints
            .values()
            .flat_map(|endpoint| {
                endpoint
                    .routes
                    .iter()
                    .filter(|route| route.gateway == gateway)
                    .map(|route| (endpoint.clone(), route.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

//! `Server`: the facade that turns a set of registered services and a set
//! of gateways into one coordinated process with a single lifecycle.
//!
//! `ServerBuilder` mirrors the source's `NewServer(Listen(gw1)…,
//! Register(svc1)…)` construction: register every service first, then
//! declare which gateways to stand up, then `build()` snapshots the
//! registry into each gateway (the same one-shot-registration assumption
//! `ApiGateway`/`EventGateway` already make individually).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::select_all;
use gateway_broker::{Broker, LocalBroker, PublishMiddleware};
use gateway_core::envelope::{Envelope, GatewayKind, RouteDescriptor};
use gateway_core::error::log_error_handler;
use gateway_core::middleware::{HandlerResult, InvocationContext, MiddlewareStack, PanicRecovery, RoleResolution};
use gateway_core::{ErrorHandler, Gateway, GatewayConfig, GatewayError, HealthRegistry, ShutdownContext};
use gateway_events::EventGateway;
use gateway_registry::{Registry, RegistryError, Service};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// NEW → RUNNING → SHUTTING_DOWN → TERMINATED. Stored as an atomic so
/// `Server::state()` can be read from any task without locking; the
/// transitions themselves only ever happen from `run`/`shutdown`, which
/// take `&self` but are never called concurrently with each other by a
/// well-behaved caller (this is an in-process facade, not a multi-writer
/// resource).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    New,
    Running,
    ShuttingDown,
    Terminated,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ServerState::New,
            1 => ServerState::Running,
            2 => ServerState::ShuttingDown,
            _ => ServerState::Terminated,
        }
    }
}

enum GatewaySpec {
    Api { bind_addr: String },
    Events,
}

/// Builder-style registration target: register every service, declare every
/// gateway to stand up, then `build()`.
pub struct ServerBuilder {
    registry: Registry,
    specs: Vec<GatewaySpec>,
    broker: Arc<dyn Broker>,
    on_error: ErrorHandler,
    health: Arc<HealthRegistry>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            specs: Vec::new(),
            broker: Arc::new(LocalBroker::new()),
            on_error: log_error_handler(),
            health: Arc::new(HealthRegistry::empty()),
        }
    }

    /// Seed the default broker's dispatch capacity from `config`'s
    /// `broker.capacity` key. Leaves the broker unbounded if the key is
    /// absent; call `.broker(...)` afterwards to override it outright.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut builder = Self::new();
        if let Ok(capacity) = config.get::<i64>("broker.capacity") {
            builder.broker = Arc::new(LocalBroker::with_capacity(capacity.max(1) as usize, builder.on_error.clone()));
        }
        builder
    }

    /// Stand up an API gateway bound to `config`'s `api.bind_addr` key,
    /// falling back to `default_addr` if it is unset.
    pub fn listen_api_from_config(self, config: &GatewayConfig, default_addr: &str) -> Self {
        let addr = config.get_or("api.bind_addr", default_addr.to_string());
        self.listen_api(addr)
    }

    /// Register a service's endpoints and routes. Fails if any qualified
    /// name or route collides with one already registered.
    pub fn register(self, service: Service) -> Result<Self, RegistryError> {
        self.registry.register_service(service)?;
        Ok(self)
    }

    /// Stand up an API gateway bound to `addr` at `build()` time.
    pub fn listen_api(mut self, addr: impl Into<String>) -> Self {
        self.specs.push(GatewaySpec::Api { bind_addr: addr.into() });
        self
    }

    /// Stand up an event gateway at `build()` time.
    pub fn listen_events(mut self) -> Self {
        self.specs.push(GatewaySpec::Events);
        self
    }

    /// Replace the default in-process broker with a custom one (e.g. an
    /// external adapter implementing the same `Broker` trait).
    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = broker;
        self
    }

    /// Replace the default logging error handler.
    pub fn on_error(mut self, on_error: ErrorHandler) -> Self {
        self.on_error = on_error;
        self
    }

    /// Install the health registry exposed via the API gateway's
    /// `GET /healthz` and queryable in-process through `Server::health`.
    pub fn health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = health;
        self
    }

    /// Construct every declared gateway from the final registry snapshot
    /// and assemble the `Server`.
    pub fn build(self) -> Server {
        let gateways = self
            .specs
            .into_iter()
            .map(|spec| -> Arc<dyn Gateway> {
                match spec {
                    GatewaySpec::Api { bind_addr } => Arc::new(gateway_api::ApiGateway::new(
                        bind_addr,
                        &self.registry,
                        self.broker.clone(),
                        self.on_error.clone(),
                        self.health.clone(),
                    )),
                    GatewaySpec::Events => {
                        Arc::new(EventGateway::new(&self.registry, self.broker.clone(), self.on_error.clone()))
                    }
                }
            })
            .collect();

        Server {
            registry: self.registry,
            gateways,
            broker: self.broker,
            on_error: self.on_error,
            health: self.health,
            state: AtomicU8::new(0),
        }
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled server: a registry snapshot and the gateways built from
/// it. `run`/`shutdown` drive every gateway's lifecycle in lockstep;
/// `invoke` reaches a registered endpoint directly, bypassing every
/// gateway's transport decoding.
pub struct Server {
    registry: Registry,
    gateways: Vec<Arc<dyn Gateway>>,
    broker: Arc<dyn Broker>,
    on_error: ErrorHandler,
    health: Arc<HealthRegistry>,
    state: AtomicU8,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Read `events.shutdown_grace_seconds` from `config`, falling back to
    /// `default` — the grace period `shutdown_on_interrupt` and `shutdown`
    /// take directly.
    pub fn grace_from_config(config: &GatewayConfig, default: Duration) -> Duration {
        let secs = config.get_or("events.shutdown_grace_seconds", default.as_secs() as i64);
        Duration::from_secs(secs.max(0) as u64)
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// The health registry installed at `build()` time, for in-process
    /// queries that don't want to go through the API gateway's HTTP
    /// surface at all.
    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.health
    }

    /// Start every gateway's `listen()` on its own task and block until any
    /// one of them returns (an error, or a completed graceful shutdown) or
    /// `interrupt` fires.
    pub async fn run(&self, interrupt: CancellationToken) -> Result<(), GatewayError> {
        self.state.store(1, Ordering::SeqCst);

        if self.gateways.is_empty() {
            interrupt.cancelled().await;
            self.state.store(3, Ordering::SeqCst);
            return Ok(());
        }

        // Each gateway's Listen runs on its own task; dropping the losing
        // branch of the select below (the interrupt firing first) detaches
        // these handles without aborting the tasks — they keep running
        // until `shutdown` cancels each gateway's internal token.
        let handles: Vec<_> = self
            .gateways
            .iter()
            .map(|gateway| {
                let gateway = gateway.clone();
                tokio::spawn(async move { gateway.listen().await })
            })
            .collect();

        let result = tokio::select! {
            (joined, _index, _rest) = select_all(handles) => joined
                .unwrap_or_else(|err| Err(GatewayError::Unexpected(format!("gateway task panicked: {err}")))),
            _ = interrupt.cancelled() => Ok(()),
        };

        self.state.store(3, Ordering::SeqCst);
        result
    }

    /// Install the teacher's signal-handling pattern — `ctrl_c()` raced
    /// against `SIGTERM` on unix — and begin `shutdown(grace)` the moment
    /// either fires.
    pub async fn shutdown_on_interrupt(&self, grace: Duration) -> Result<(), GatewayError> {
        let interrupt = CancellationToken::new();

        let token = interrupt.clone();
        let wait_for_signal = async move {
            shutdown_signal().await;
            token.cancel();
        };

        tokio::select! {
            result = self.run(interrupt.clone()) => result?,
            _ = wait_for_signal => {}
        }

        self.shutdown(ShutdownContext::new(grace, CancellationToken::new())).await;
        Ok(())
    }

    /// Fan `Shutdown` out to every gateway in parallel. Each gateway stops
    /// accepting new work and drains in-flight calls, bounded by
    /// `ctx.deadline` or an early `ctx.interrupt`, whichever comes first.
    pub async fn shutdown(&self, ctx: ShutdownContext) {
        self.state.store(2, Ordering::SeqCst);

        let tasks = self.gateways.iter().map(|gateway| {
            let ctx = ctx.clone();
            async move { gateway.shutdown(ctx).await }
        });
        futures_util::future::join_all(tasks).await;

        self.state.store(3, Ordering::SeqCst);
    }

    /// The cross-gateway in-process call: look up `service.endpoint` in the
    /// registry and run its composed handler directly, bypassing every
    /// gateway's transport decoding. Still triggers the event-publish
    /// middleware, since that is attached to every handler regardless of
    /// which gateway (or no gateway at all) is driving the call.
    pub async fn invoke(&self, service: &str, endpoint: &str, input: Value) -> HandlerResult {
        let qualified_name = format!("{service}.{endpoint}");
        let endpoint_def = self
            .registry
            .endpoint(&qualified_name)
            .ok_or_else(|| GatewayError::NotFound(format!("no endpoint registered as {qualified_name:?}")))?;
        let owning_service = self
            .registry
            .service_for_endpoint(&qualified_name)
            .expect("a registered endpoint always has an owning service");

        let route = RouteDescriptor {
            service: service.to_string(),
            endpoint: endpoint.to_string(),
            gateway: GatewayKind::Api,
            method: "INVOKE".to_string(),
            path: qualified_name,
            roles: endpoint_def.roles.clone(),
        };
        let envelope = Envelope::new().with_route(route);

        let stack = MiddlewareStack::new()
            .push(Arc::new(PanicRecovery))
            .extend(&owning_service.middleware)
            .push(Arc::new(RoleResolution::new(endpoint_def.roles.clone())))
            .push(Arc::new(PublishMiddleware::new(self.broker.clone(), self.on_error.clone())));
        let composed = stack.then(endpoint_def.handler.clone());

        composed(InvocationContext::new(envelope, input)).await
    }
}

/// Wait for Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, starting graceful shutdown");
}

mod logging;
mod server;

pub use logging::init_tracing;
pub use server::{Server, ServerBuilder, ServerState};

pub use gateway_core::{
    ErrorHandler, GatewayConfig, GatewayError, HealthBuilder, HealthIndicator, HealthRegistry, ShutdownContext,
};
pub use gateway_registry::{Endpoint, EndpointRoute, RegistryError, Service};

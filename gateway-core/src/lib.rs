pub mod config;
pub mod envelope;
pub mod error;
pub mod fields;
pub mod gateway;
pub mod health;
pub mod middleware;

pub use config::{ConfigError, ConfigValidationError, ConfigValue, FromConfigValue, GatewayConfig, MissingKeyError};
pub use envelope::{Envelope, EnvelopeError, GatewayKind, HeaderMap, RouteDescriptor};
pub use error::{log_error_handler, ErrorHandler, GatewayError};
pub use gateway::{Gateway, ShutdownContext};
pub use health::{HealthBuilder, HealthCheck, HealthCheckStatus, HealthIndicator, HealthReport, HealthRegistry, HealthStatus};
pub use fields::{flatten, get_path, resolve_template, unflatten};
pub use middleware::{
    HandlerFn, HandlerResult, InvocationContext, Middleware, MiddlewareStack, Next, PanicRecovery,
    RoleResolution,
};

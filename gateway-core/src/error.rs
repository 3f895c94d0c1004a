//! Error kinds shared by every gateway.
//!
//! The runtime never talks about concrete HTTP status types or transport
//! error structs directly — each gateway maps a [`GatewayError`] onto its
//! own wire representation (status code for the API gateway, a call to the
//! configured error handler for the event gateway).

use std::fmt;

/// The closed set of error kinds a handler, middleware, or gateway can
/// surface. These are kinds, not types: every hop maps the same kind the
/// same way, regardless of which gateway produced it.
#[derive(Debug, Clone)]
pub enum GatewayError {
    BadRequest(String),
    BadCredentials(String),
    PermissionDenied(String),
    NotFound(String),
    AlreadyExists(String),
    BadGateway(String),
    NotImplemented(String),
    Unexpected(String),
}

impl GatewayError {
    /// The HTTP status the API gateway encodes this kind as.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::BadRequest(_) => 400,
            GatewayError::BadCredentials(_) => 401,
            GatewayError::PermissionDenied(_) => 403,
            GatewayError::NotFound(_) => 404,
            GatewayError::AlreadyExists(_) => 409,
            GatewayError::BadGateway(_) => 502,
            GatewayError::NotImplemented(_) => 501,
            GatewayError::Unexpected(_) => 500,
        }
    }

    /// Short machine-readable kind name, used in JSON error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "bad-request",
            GatewayError::BadCredentials(_) => "bad-credentials",
            GatewayError::PermissionDenied(_) => "permission-denied",
            GatewayError::NotFound(_) => "not-found",
            GatewayError::AlreadyExists(_) => "already-exists",
            GatewayError::BadGateway(_) => "bad-gateway",
            GatewayError::NotImplemented(_) => "not-implemented",
            GatewayError::Unexpected(_) => "unexpected",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            GatewayError::BadRequest(m)
            | GatewayError::BadCredentials(m)
            | GatewayError::PermissionDenied(m)
            | GatewayError::NotFound(m)
            | GatewayError::AlreadyExists(m)
            | GatewayError::BadGateway(m)
            | GatewayError::NotImplemented(m)
            | GatewayError::Unexpected(m) => m,
        }
    }

    /// Convert any unwind payload caught by panic-recovery middleware into
    /// an `Unexpected` error, per the panic -> error-kind mapping in the spec.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        GatewayError::Unexpected(msg)
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl std::error::Error for GatewayError {}

/// Callback invoked whenever a broker dispatch, event handler, or publish
/// side-effect fails asynchronously and there is no caller left to receive
/// the error. Mirrors the broker-wide error handler from the spec.
pub type ErrorHandler = std::sync::Arc<dyn Fn(GatewayError) + Send + Sync>;

/// The default error handler: logs at `error` level via `tracing`.
pub fn log_error_handler() -> ErrorHandler {
    std::sync::Arc::new(|err: GatewayError| {
        tracing::error!(kind = err.kind(), message = err.message(), "unhandled gateway error");
    })
}

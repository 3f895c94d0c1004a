//! The publish side-effect middleware: installed on every gateway so a
//! successful invocation, API or event, republishes its result on the
//! broker under the endpoint's qualified name.
//!
//! Deliberately lives alongside the broker, not inside the event gateway's
//! transport code — an API-only deployment still needs this middleware, so
//! coupling it to the event gateway's wire handling would be backwards.

use std::sync::Arc;
use std::time::Duration;

use gateway_core::middleware::{BoxFuture, HandlerResult, InvocationContext, Middleware, Next};
use gateway_core::{ErrorHandler, GatewayError};
use tokio_util::sync::CancellationToken;

use crate::event_envelope::EventEnvelope;
use crate::Broker;

/// Publishing is bounded by a fresh context independent of the caller's —
/// the HTTP request that triggered this may already be closed by the time
/// the publish would otherwise complete.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct PublishMiddleware {
    broker: Arc<dyn Broker>,
    on_error: ErrorHandler,
}

impl PublishMiddleware {
    pub fn new(broker: Arc<dyn Broker>, on_error: ErrorHandler) -> Self {
        Self { broker, on_error }
    }
}

impl Middleware for PublishMiddleware {
    fn handle(&self, ctx: InvocationContext, next: Next) -> BoxFuture<'static, HandlerResult> {
        let broker = self.broker.clone();
        let on_error = self.on_error.clone();
        let envelope = ctx.envelope.clone();

        Box::pin(async move {
            let result = next.call(ctx).await;
            if let Ok(output) = &result {
                let Some(route) = envelope.route() else {
                    return result;
                };
                let qualified_name = route.qualified_name();
                let metadata = match envelope.encode() {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        (on_error)(GatewayError::Unexpected(format!("encoding publish metadata: {err}")));
                        return result;
                    }
                };
                let event = EventEnvelope {
                    service_name: route.service.clone(),
                    name: route.endpoint.clone(),
                    metadata,
                    values: gateway_core::fields::flatten(output),
                };
                tokio::spawn(publish_with_timeout(broker, on_error, qualified_name, event));
            }
            result
        })
    }
}

async fn publish_with_timeout(
    broker: Arc<dyn Broker>,
    on_error: ErrorHandler,
    qualified_name: String,
    event: EventEnvelope,
) {
    let payload = match event.encode() {
        Ok(bytes) => bytes,
        Err(err) => {
            (on_error)(GatewayError::Unexpected(format!("encoding event envelope: {err}")));
            return;
        }
    };

    let cancellation = CancellationToken::new();
    let publish = broker.publish(&cancellation, &qualified_name, payload);
    match tokio::time::timeout(PUBLISH_TIMEOUT, publish).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => (on_error)(GatewayError::BadGateway(err.to_string())),
        Err(_elapsed) => (on_error)(GatewayError::BadGateway(format!(
            "publish to {qualified_name} timed out after {PUBLISH_TIMEOUT:?}"
        ))),
    }
}

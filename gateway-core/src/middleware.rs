//! The invocation middleware pipeline.
//!
//! A middleware wraps the call beneath it: `(ctx, next) -> result`, free to
//! inspect or replace the envelope before calling `next`, and free to
//! inspect or replace the result after. [`MiddlewareStack::then`] composes a
//! slice of middlewares around a terminal handler with index 0 outermost;
//! an empty stack is the identity composition.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;

use crate::envelope::Envelope;
use crate::error::GatewayError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type HandlerResult = Result<Value, GatewayError>;

/// Everything a handler or middleware needs: the current metadata envelope
/// and the decoded input value.
#[derive(Clone)]
pub struct InvocationContext {
    pub envelope: Envelope,
    pub input: Value,
}

impl InvocationContext {
    pub fn new(envelope: Envelope, input: Value) -> Self {
        Self { envelope, input }
    }

    /// Replace the envelope, keeping the same input.
    pub fn with_envelope(&self, envelope: Envelope) -> Self {
        Self { envelope, input: self.input.clone() }
    }
}

/// The terminal, or next-in-line, continuation a middleware invokes at most
/// once (zero or more times is allowed by the contract, but `Next` is
/// consumed by value so calling it twice requires cloning the context
/// first).
pub struct Next(Box<dyn FnOnce(InvocationContext) -> BoxFuture<'static, HandlerResult> + Send>);

impl Next {
    pub fn new(
        f: impl FnOnce(InvocationContext) -> BoxFuture<'static, HandlerResult> + Send + 'static,
    ) -> Self {
        Next(Box::new(f))
    }

    pub fn call(self, ctx: InvocationContext) -> BoxFuture<'static, HandlerResult> {
        (self.0)(ctx)
    }
}

/// A single invocation decorator. Implementations are shared across
/// concurrent invocations (`Arc<dyn Middleware>`), so they must be
/// `Send + Sync` and hold only immutable or internally-synchronized state.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: InvocationContext, next: Next) -> BoxFuture<'static, HandlerResult>;
}

/// The terminal handler a middleware stack wraps.
pub type HandlerFn = Arc<dyn Fn(InvocationContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// An ordered, immutable list of middlewares. Gateway-wide, service-wide,
/// and endpoint-local stacks are concatenated (in that order, outermost
/// first) before being composed around the handler.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self { middlewares: Arc::new(Vec::new()) }
    }

    pub fn push(&self, middleware: Arc<dyn Middleware>) -> Self {
        let mut middlewares = (*self.middlewares).clone();
        middlewares.push(middleware);
        Self { middlewares: Arc::new(middlewares) }
    }

    /// Concatenate `self` with `other`, `self`'s middlewares staying
    /// outermost.
    pub fn extend(&self, other: &MiddlewareStack) -> Self {
        let mut middlewares = (*self.middlewares).clone();
        middlewares.extend(other.middlewares.iter().cloned());
        Self { middlewares: Arc::new(middlewares) }
    }

    /// Compose this stack around `handler`, returning a single callable.
    pub fn then(&self, handler: HandlerFn) -> HandlerFn {
        let middlewares = self.middlewares.clone();
        Arc::new(move |ctx| run_from(0, middlewares.clone(), handler.clone(), ctx))
    }
}

fn run_from(
    index: usize,
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
    handler: HandlerFn,
    ctx: InvocationContext,
) -> BoxFuture<'static, HandlerResult> {
    match middlewares.get(index) {
        Some(middleware) => {
            let middleware = middleware.clone();
            let next = Next::new(move |ctx| run_from(index + 1, middlewares, handler, ctx));
            middleware.handle(ctx, next)
        }
        None => handler(ctx),
    }
}

/// Catches an unwind from anywhere beneath it and converts it into
/// [`GatewayError::Unexpected`]. Installed unconditionally, outermost, by
/// every gateway.
pub struct PanicRecovery;

impl Middleware for PanicRecovery {
    fn handle(&self, ctx: InvocationContext, next: Next) -> BoxFuture<'static, HandlerResult> {
        Box::pin(async move {
            match std::panic::AssertUnwindSafe(next.call(ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(GatewayError::from_panic(payload.as_ref())),
            }
        })
    }
}

/// Resolves an endpoint's role templates (`"group.{ID}.read"`) against the
/// decoded input and stores the resolved roles on the route metadata before
/// dispatch. Templates whose path variable cannot be resolved are dropped
/// rather than failing the call.
pub struct RoleResolution {
    templates: Vec<String>,
}

impl RoleResolution {
    pub fn new(templates: Vec<String>) -> Self {
        Self { templates }
    }
}

impl Middleware for RoleResolution {
    fn handle(&self, ctx: InvocationContext, next: Next) -> BoxFuture<'static, HandlerResult> {
        let resolved: Vec<String> = self
            .templates
            .iter()
            .filter_map(|template| crate::fields::resolve_template(template, &ctx.input))
            .collect();

        let envelope = match ctx.envelope.route() {
            Some(route) => {
                let mut updated = route.clone();
                updated.roles = resolved;
                ctx.envelope.with_route(updated)
            }
            None => ctx.envelope.clone(),
        };

        let ctx = ctx.with_envelope(envelope);
        Box::pin(async move { next.call(ctx).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Envelope, GatewayKind, RouteDescriptor};
    use serde_json::json;

    fn ok_handler() -> HandlerFn {
        Arc::new(|ctx| Box::pin(async move { Ok(ctx.input) }))
    }

    fn route() -> RouteDescriptor {
        RouteDescriptor {
            service: "Svc".into(),
            endpoint: "Op".into(),
            gateway: GatewayKind::Api,
            method: "POST".into(),
            path: "/Svc.Op".into(),
            roles: vec![],
        }
    }

    #[tokio::test]
    async fn empty_stack_is_identity() {
        let stack = MiddlewareStack::new();
        let composed = stack.then(ok_handler());
        let ctx = InvocationContext::new(Envelope::new(), json!({"x": 1}));
        let result = composed(ctx).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
    }

    #[tokio::test]
    async fn panic_recovery_converts_unwind_to_unexpected_error() {
        let panics: HandlerFn = Arc::new(|_| Box::pin(async move { panic!("boom") }));
        let stack = MiddlewareStack::new().push(Arc::new(PanicRecovery));
        let composed = stack.then(panics);
        let ctx = InvocationContext::new(Envelope::new(), Value::Null);
        let err = composed(ctx).await.unwrap_err();
        assert_eq!(err.kind(), "unexpected");
    }

    #[tokio::test]
    async fn role_resolution_substitutes_path_variables_into_route_roles() {
        let envelope = Envelope::new().with_route(route());
        let ctx = InvocationContext::new(envelope, json!({"ID": 123}));

        let captured: Arc<std::sync::Mutex<Option<Envelope>>> = Arc::new(std::sync::Mutex::new(None));
        let capture = captured.clone();
        let capturing_handler: HandlerFn = Arc::new(move |ctx| {
            *capture.lock().unwrap() = Some(ctx.envelope.clone());
            Box::pin(async move { Ok(ctx.input) })
        });
        let stack = MiddlewareStack::new()
            .push(Arc::new(RoleResolution::new(vec!["group.{ID}.read".into()])));
        stack.then(capturing_handler)(ctx).await.unwrap();

        let envelope = captured.lock().unwrap().clone().unwrap();
        assert_eq!(envelope.route().unwrap().roles, vec!["group.123.read".to_string()]);
    }
}

//! `EventGateway`: the pub/sub surface implementing `gateway_core::Gateway`.
//!
//! Registration already captured each route's pattern as the topic and the
//! endpoint's qualified name as the consumer-group key (`EndpointRoute`'s
//! `event()` constructor in `gateway-registry`); this module just drives
//! `Broker::subscribe_group` from that snapshot and decodes each delivered
//! payload back into an endpoint invocation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::join_all;
use gateway_broker::{Broker, EventEnvelope, PublishMiddleware, Subscription, SubscriptionHandler};
use gateway_core::envelope::{Envelope, GatewayKind, RouteDescriptor};
use gateway_core::middleware::{BoxFuture, InvocationContext, MiddlewareStack, PanicRecovery, RoleResolution};
use gateway_core::{unflatten, ErrorHandler, Gateway, GatewayError};
use gateway_registry::{Endpoint, EndpointRoute, Registry, Service};
use tokio_util::sync::CancellationToken;

use crate::wait_group::WaitGroup;

struct ResolvedRoute {
    endpoint: Arc<Endpoint>,
    route: EndpointRoute,
    service: Arc<Service>,
}

pub struct EventGateway {
    routes: Vec<ResolvedRoute>,
    broker: Arc<dyn Broker>,
    on_error: ErrorHandler,
    subscriptions: Mutex<Vec<Subscription>>,
    in_flight: Arc<WaitGroup>,
    shutdown_token: CancellationToken,
}

impl EventGateway {
    /// Snapshot every event route currently in `registry`, mirroring
    /// `ApiGateway::new`'s one-shot-registration assumption.
    pub fn new(registry: &Registry, broker: Arc<dyn Broker>, on_error: ErrorHandler) -> Self {
        let routes = registry
            .routes_for_gateway(GatewayKind::Events)
            .into_iter()
            .map(|(endpoint, route)| {
                let service = registry
                    .service_for_endpoint(&endpoint.qualified_name())
                    .expect("a registered endpoint always has an owning service");
                ResolvedRoute { endpoint, route, service }
            })
            .collect();

        Self {
            routes,
            broker,
            on_error,
            subscriptions: Mutex::new(Vec::new()),
            in_flight: WaitGroup::new(),
            shutdown_token: CancellationToken::new(),
        }
    }

    fn handler_for(&self, resolved: &ResolvedRoute) -> SubscriptionHandler {
        let endpoint = resolved.endpoint.clone();
        let route = resolved.route.clone();
        let service = resolved.service.clone();
        let broker = self.broker.clone();
        let on_error = self.on_error.clone();
        let in_flight = self.in_flight.clone();

        Arc::new(move |payload: Bytes| {
            let endpoint = endpoint.clone();
            let route = route.clone();
            let service = service.clone();
            let broker = broker.clone();
            let on_error = on_error.clone();
            let guard = in_flight.enter();

            Box::pin(async move {
                let _guard = guard;
                handle_event(payload, endpoint, route, service, broker, on_error).await;
                Ok(())
            })
        })
    }
}

/// The event handler pipeline from SPEC_FULL §4.6: decode the broker
/// payload, decode its flattened values into a fresh input, merge the
/// carried metadata, overwrite the route with THIS endpoint's descriptor,
/// run the handler, and swallow any error through `on_error` — the broker
/// always considers the message handled.
async fn handle_event(
    payload: Bytes,
    endpoint: Arc<Endpoint>,
    route: EndpointRoute,
    service: Arc<Service>,
    broker: Arc<dyn Broker>,
    on_error: ErrorHandler,
) {
    let event = match EventEnvelope::decode(&payload) {
        Ok(event) => event,
        Err(err) => {
            (on_error)(GatewayError::BadRequest(format!("decoding event payload: {err}")));
            return;
        }
    };

    let envelope = match Envelope::decode(&Envelope::blank(), &event.metadata) {
        Ok(envelope) => envelope,
        Err(err) => {
            (on_error)(GatewayError::Unexpected(format!("decoding event metadata: {err}")));
            Envelope::blank()
        }
    };

    let route_descriptor = RouteDescriptor {
        service: endpoint.service.clone(),
        endpoint: endpoint.name.clone(),
        gateway: GatewayKind::Events,
        method: route.method.clone(),
        path: route.path.clone(),
        roles: endpoint.roles.clone(),
    };
    let envelope = envelope.with_route(route_descriptor);
    let input = unflatten(&event.values);

    let stack = MiddlewareStack::new()
        .push(Arc::new(PanicRecovery))
        .extend(&service.middleware)
        .push(Arc::new(RoleResolution::new(endpoint.roles.clone())))
        .push(Arc::new(PublishMiddleware::new(broker, on_error.clone())));
    let composed = stack.then(endpoint.handler.clone());

    if let Err(err) = composed(InvocationContext::new(envelope, input)).await {
        (on_error)(err);
    }
}

impl Gateway for EventGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Events
    }

    fn listen(&self) -> BoxFuture<'_, Result<(), GatewayError>> {
        Box::pin(async move {
            let subscribed = join_all(self.routes.iter().map(|resolved| {
                let pattern = resolved.route.path.clone();
                let group = resolved.endpoint.qualified_name();
                let handler = self.handler_for(resolved);
                async move { self.broker.subscribe_group(&pattern, &group, handler).await }
            }))
            .await;

            tracing::info!(count = subscribed.len(), "event gateway subscribed");
            *self.subscriptions.lock().unwrap() = subscribed;

            self.shutdown_token.cancelled().await;
            Ok(())
        })
    }

    fn shutdown(&self, ctx: gateway_core::ShutdownContext) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.shutdown_token.cancel();

            let subscriptions = std::mem::take(&mut *self.subscriptions.lock().unwrap());
            join_all(subscriptions.into_iter().map(|subscription| {
                let broker = self.broker.clone();
                let on_error = self.on_error.clone();
                async move {
                    if let Err(err) = broker.unsubscribe(subscription.id()).await {
                        (on_error)(err);
                    }
                }
            }))
            .await;

            tokio::select! {
                _ = self.in_flight.drain(ctx.deadline) => {}
                _ = ctx.interrupt.cancelled() => {}
            }
        })
    }
}

//! The broker abstraction: topic pub/sub with consumer-group round-robin
//! dispatch and wildcard matching.
//!
//! [`Broker`] is the pluggable surface; [`local::LocalBroker`] is the
//! single-process reference implementation. An external adapter (a real
//! message queue) implements the same trait with identical consumer-group
//! and wildcard semantics.

pub mod event_envelope;
pub mod local;
pub mod publish_middleware;
pub mod topic;

use std::sync::Arc;

use bytes::Bytes;
use futures_core::future::BoxFuture;
use gateway_core::GatewayError;
use tokio_util::sync::CancellationToken;

pub use event_envelope::{EventEnvelope, EventEnvelopeError};
pub use local::LocalBroker;
pub use publish_middleware::PublishMiddleware;
pub use topic::{tokenize, TopicError};

/// A subscriber callback: receives the raw published payload and reports
/// failure through its own return value (panics are caught separately by
/// the broker's dispatch loop).
pub type SubscriptionHandler =
    Arc<dyn Fn(Bytes) -> BoxFuture<'static, Result<(), GatewayError>> + Send + Sync>;

/// Raised by [`Broker::publish`] when the caller's context was already
/// cancelled at entry. This is the only error `publish` can return — a
/// handler failing after dispatch is reported through the broker's
/// configured error handler instead, never through `publish`'s return.
#[derive(Debug)]
pub struct PublishCancelled;

impl std::fmt::Display for PublishCancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "publish context was already cancelled")
    }
}

impl std::error::Error for PublishCancelled {}

/// Topic pub/sub with consumer-group semantics.
///
/// Any implementation — the local reference broker or an external adapter —
/// must honor: fixed-arity bilateral wildcard matching of topic patterns,
/// and "exactly one member of a consumer group handles each matching
/// event, chosen round-robin".
pub trait Broker: Send + Sync {
    /// Deliver `payload` to every subscription group whose pattern matches
    /// `key`. Returns an error only if `cancellation` is already cancelled
    /// at entry; a key with no matching subscribers is not an error.
    /// Delivery is asynchronous — a successful return does not imply any
    /// handler has completed.
    fn publish<'a>(
        &'a self,
        cancellation: &'a CancellationToken,
        key: &'a str,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<(), PublishCancelled>>;

    /// Subscribe with an auto-generated, unique group — every matching
    /// event is delivered to this handler.
    fn subscribe<'a>(
        &'a self,
        pattern: &'a str,
        handler: SubscriptionHandler,
    ) -> BoxFuture<'a, Subscription>;

    /// Join a named consumer group on `pattern`. Within the group, exactly
    /// one subscription receives each matching event, chosen round-robin.
    fn subscribe_group<'a>(
        &'a self,
        pattern: &'a str,
        group: &'a str,
        handler: SubscriptionHandler,
    ) -> BoxFuture<'a, Subscription>;

    /// Remove a previously created subscription by id. Idempotent.
    fn unsubscribe(&self, subscription_id: u64) -> BoxFuture<'_, Result<(), GatewayError>>;
}

/// A handle returned by [`Broker::subscribe`]/[`Broker::subscribe_group`].
/// Dropping it does NOT unsubscribe — call `broker.unsubscribe(sub.id())`
/// explicitly, mirroring the source's "subscription.Unsubscribe() -> err".
/// Carries no handle back to the broker itself: `Broker::subscribe`/
/// `subscribe_group` take `&self`, not `self: &Arc<Self>`, so `Broker`
/// stays object-safe and usable as `Arc<dyn Broker>`.
pub struct Subscription {
    id: u64,
    pattern: String,
    group: String,
}

impl Subscription {
    pub fn new(id: u64, pattern: impl Into<String>, group: impl Into<String>) -> Self {
        Self { id, pattern: pattern.into(), group: group.into() }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn group(&self) -> &str {
        &self.group
    }
}

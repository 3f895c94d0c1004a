//! The single-process reference [`Broker`]: an in-memory registry of
//! consumer groups, dispatched under a single `tokio::sync::Mutex`.
//!
//! The lock is held for the whole match-and-dispatch path — walking the
//! group list, picking the round-robin member, advancing its cursor — but
//! is always released before the selected handler runs: handlers execute
//! on their own spawned task, never under the lock.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_core::future::BoxFuture;
use futures_util::FutureExt;
use gateway_core::{log_error_handler, ErrorHandler, GatewayError};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::topic::{self, TopicError};
use crate::{Broker, PublishCancelled, Subscription, SubscriptionHandler};

struct Member {
    id: u64,
    handler: SubscriptionHandler,
}

struct GroupEntry {
    pattern: String,
    group: String,
    members: Vec<Member>,
    cursor: usize,
}

struct State {
    groups: Vec<GroupEntry>,
}

/// An in-process broker. Subscriptions are held only for the broker's
/// lifetime; nothing is persisted or shared across processes.
pub struct LocalBroker {
    state: Mutex<State>,
    next_id: AtomicU64,
    on_error: ErrorHandler,
    /// Bounds the number of handler invocations running at once, configured
    /// from `broker.capacity`. `None` leaves dispatch unbounded.
    capacity: Option<Arc<Semaphore>>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::with_error_handler(log_error_handler())
    }

    pub fn with_error_handler(on_error: ErrorHandler) -> Self {
        Self { state: Mutex::new(State { groups: Vec::new() }), next_id: AtomicU64::new(1), on_error, capacity: None }
    }

    /// Bound concurrent in-flight handler invocations to `capacity`. A
    /// publish whose handlers would exceed it waits for a slot to free up
    /// before spawning the next one, rather than spawning unbounded tasks.
    pub fn with_capacity(capacity: usize, on_error: ErrorHandler) -> Self {
        Self {
            state: Mutex::new(State { groups: Vec::new() }),
            next_id: AtomicU64::new(1),
            on_error,
            capacity: Some(Arc::new(Semaphore::new(capacity.max(1)))),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers a handler under the exact `(pattern, group)` pair,
    /// creating the group entry if this is its first member. Groups are
    /// keyed by the literal pattern string, not by its token-equivalence
    /// class — `"order.*"` and `"order.*"` share a group, `"order.*"` and
    /// `"*.created"` do not, even though both could match the same key.
    async fn add_member(&self, pattern: &str, group: &str, handler: SubscriptionHandler) -> u64 {
        let id = self.next_id();
        let mut state = self.state.lock().await;
        match state.groups.iter_mut().find(|g| g.pattern == pattern && g.group == group) {
            Some(entry) => entry.members.push(Member { id, handler }),
            None => state.groups.push(GroupEntry {
                pattern: pattern.to_string(),
                group: group.to_string(),
                members: vec![Member { id, handler }],
                cursor: 0,
            }),
        }
        id
    }

    /// Select one handler per matching group, advancing each group's
    /// round-robin cursor. Returns the selected handlers; the registry lock
    /// is released before any of them run.
    async fn select_for_dispatch(&self, key_tokens: &[&str]) -> Vec<SubscriptionHandler> {
        let mut state = self.state.lock().await;
        let mut selected = Vec::new();
        for entry in state.groups.iter_mut() {
            let Ok(pattern_tokens) = topic::tokenize(&entry.pattern) else { continue };
            if !topic::matches(&pattern_tokens, key_tokens) || entry.members.is_empty() {
                continue;
            }
            if entry.cursor >= entry.members.len() {
                entry.cursor = 0;
            }
            let member = &entry.members[entry.cursor];
            selected.push(member.handler.clone());
            entry.cursor = (entry.cursor + 1) % entry.members.len();
        }
        selected
    }
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker for LocalBroker {
    fn publish<'a>(
        &'a self,
        cancellation: &'a CancellationToken,
        key: &'a str,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<(), PublishCancelled>> {
        Box::pin(async move {
            if cancellation.is_cancelled() {
                return Err(PublishCancelled);
            }
            let key_tokens: Vec<&str> = match topic::tokenize(key) {
                Ok(tokens) => tokens,
                Err(TopicError { .. }) => return Ok(()),
            };
            let handlers = self.select_for_dispatch(&key_tokens).await;
            for handler in handlers {
                let payload = payload.clone();
                let on_error = self.on_error.clone();
                let permit = match &self.capacity {
                    Some(semaphore) => Some(semaphore.clone().acquire_owned().await.expect("semaphore is never closed")),
                    None => None,
                };
                tokio::spawn(async move {
                    let result = AssertUnwindSafe(handler(payload)).catch_unwind().await;
                    drop(permit);
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => (on_error)(err),
                        Err(panic_payload) => (on_error)(GatewayError::from_panic(panic_payload.as_ref())),
                    }
                });
            }
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        pattern: &'a str,
        handler: SubscriptionHandler,
    ) -> BoxFuture<'a, Subscription> {
        Box::pin(async move {
            let group = uuid::Uuid::new_v4().to_string();
            self.subscribe_group(pattern, &group, handler).await
        })
    }

    fn subscribe_group<'a>(
        &'a self,
        pattern: &'a str,
        group: &'a str,
        handler: SubscriptionHandler,
    ) -> BoxFuture<'a, Subscription> {
        Box::pin(async move {
            let id = self.add_member(pattern, group, handler).await;
            Subscription::new(id, pattern, group)
        })
    }

    fn unsubscribe(&self, subscription_id: u64) -> BoxFuture<'_, Result<(), GatewayError>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            for entry in state.groups.iter_mut() {
                if let Some(pos) = entry.members.iter().position(|m| m.id == subscription_id) {
                    entry.members.remove(pos);
                    if entry.cursor >= entry.members.len() {
                        entry.cursor = 0;
                    }
                    break;
                }
            }
            state.groups.retain(|g| !g.members.is_empty());
            Ok(())
        })
    }
}

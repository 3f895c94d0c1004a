use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use gateway_broker::{Broker, LocalBroker, SubscriptionHandler};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

fn counting_handler(counter: Arc<AtomicUsize>, notify: Arc<Notify>) -> SubscriptionHandler {
    Arc::new(move |_payload| {
        let counter = counter.clone();
        let notify = notify.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            notify.notify_one();
            Ok(())
        })
    })
}

// --- Wildcard topic matching ---

#[tokio::test]
async fn wildcard_subscription_receives_matching_published_keys() {
    let broker = Arc::new(LocalBroker::new());
    let counter = Arc::new(AtomicUsize::new(0));
    let notify = Arc::new(Notify::new());
    let _sub = broker.subscribe("order.*.created", counting_handler(counter.clone(), notify.clone())).await;

    let token = CancellationToken::new();
    broker.publish(&token, "order.42.created", Bytes::from_static(b"{}")).await.unwrap();
    notify.notified().await;

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_matching_key_is_not_delivered() {
    let broker = Arc::new(LocalBroker::new());
    let counter = Arc::new(AtomicUsize::new(0));
    let notify = Arc::new(Notify::new());
    let _sub = broker.subscribe("order.*.created", counting_handler(counter.clone(), notify.clone())).await;

    let token = CancellationToken::new();
    broker.publish(&token, "order.42.shipped", Bytes::from_static(b"{}")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fixed_arity_rejects_shorter_or_longer_keys() {
    let broker = Arc::new(LocalBroker::new());
    let counter = Arc::new(AtomicUsize::new(0));
    let notify = Arc::new(Notify::new());
    let _sub = broker.subscribe("order.*", counting_handler(counter.clone(), notify.clone())).await;

    let token = CancellationToken::new();
    broker.publish(&token, "order.created.v1", Bytes::from_static(b"{}")).await.unwrap();
    broker.publish(&token, "order", Bytes::from_static(b"{}")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn exact_topic_with_no_wildcard_matches_itself() {
    let broker = Arc::new(LocalBroker::new());
    let counter = Arc::new(AtomicUsize::new(0));
    let notify = Arc::new(Notify::new());
    let _sub = broker.subscribe("order.created", counting_handler(counter.clone(), notify.clone())).await;

    let token = CancellationToken::new();
    broker.publish(&token, "order.created", Bytes::from_static(b"{}")).await.unwrap();
    notify.notified().await;

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

// --- Consumer-group round-robin dispatch ---

#[tokio::test]
async fn two_members_of_a_group_split_events_round_robin() {
    let broker = Arc::new(LocalBroker::new());
    let counter_a = Arc::new(AtomicUsize::new(0));
    let counter_b = Arc::new(AtomicUsize::new(0));
    let notify = Arc::new(Notify::new());
    let _a = broker.subscribe_group("order.created", "billing", counting_handler(counter_a.clone(), notify.clone())).await;
    let _b = broker.subscribe_group("order.created", "billing", counting_handler(counter_b.clone(), notify.clone())).await;

    let token = CancellationToken::new();
    for _ in 0..6 {
        broker.publish(&token, "order.created", Bytes::from_static(b"{}")).await.unwrap();
        notify.notified().await;
    }

    assert_eq!(counter_a.load(Ordering::SeqCst), 3);
    assert_eq!(counter_b.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn a_unique_subscriber_and_a_named_group_each_get_their_own_copy() {
    let broker = Arc::new(LocalBroker::new());
    let counter_group = Arc::new(AtomicUsize::new(0));
    let counter_unique_one = Arc::new(AtomicUsize::new(0));
    let counter_unique_two = Arc::new(AtomicUsize::new(0));
    let notify = Arc::new(Notify::new());

    let _grouped = broker.subscribe_group("order.created", "billing", counting_handler(counter_group.clone(), notify.clone())).await;
    let _unique_one = broker.subscribe("order.created", counting_handler(counter_unique_one.clone(), notify.clone())).await;
    let _unique_two = broker.subscribe("order.created", counting_handler(counter_unique_two.clone(), notify.clone())).await;

    let token = CancellationToken::new();
    broker.publish(&token, "order.created", Bytes::from_static(b"{}")).await.unwrap();
    for _ in 0..3 {
        notify.notified().await;
    }

    assert_eq!(counter_group.load(Ordering::SeqCst), 1);
    assert_eq!(counter_unique_one.load(Ordering::SeqCst), 1);
    assert_eq!(counter_unique_two.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn groups_on_token_equivalent_but_textually_distinct_patterns_stay_separate() {
    // "order.*" and "order.created" can both match "order.created", but they
    // are different literal patterns and so form different group keys even
    // when joined with the same group name.
    let broker = Arc::new(LocalBroker::new());
    let counter_wildcard = Arc::new(AtomicUsize::new(0));
    let counter_exact = Arc::new(AtomicUsize::new(0));
    let notify = Arc::new(Notify::new());

    let _wildcard = broker.subscribe_group("order.*", "billing", counting_handler(counter_wildcard.clone(), notify.clone())).await;
    let _exact = broker.subscribe_group("order.created", "billing", counting_handler(counter_exact.clone(), notify.clone())).await;

    let token = CancellationToken::new();
    broker.publish(&token, "order.created", Bytes::from_static(b"{}")).await.unwrap();
    notify.notified().await;
    notify.notified().await;

    assert_eq!(counter_wildcard.load(Ordering::SeqCst), 1);
    assert_eq!(counter_exact.load(Ordering::SeqCst), 1);
}

// --- Cancellation, panics, and unsubscribe ---

#[tokio::test]
async fn publish_on_an_already_cancelled_context_is_rejected() {
    let broker = LocalBroker::new();
    let token = CancellationToken::new();
    token.cancel();

    let result = broker.publish(&token, "order.created", Bytes::from_static(b"{}")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn publish_with_no_matching_subscribers_is_not_an_error() {
    let broker = LocalBroker::new();
    let token = CancellationToken::new();

    let result = broker.publish(&token, "order.created", Bytes::from_static(b"{}")).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn one_panicking_handler_does_not_affect_other_subscribers() {
    let broker = Arc::new(LocalBroker::new());
    let counter = Arc::new(AtomicUsize::new(0));
    let notify = Arc::new(Notify::new());

    let panicking: SubscriptionHandler = Arc::new(|_payload| Box::pin(async move { panic!("boom") }));
    let _panics = broker.subscribe("order.created", panicking).await;
    let _survives = broker.subscribe("order.created", counting_handler(counter.clone(), notify.clone())).await;

    let token = CancellationToken::new();
    broker.publish(&token, "order.created", Bytes::from_static(b"{}")).await.unwrap();
    notify.notified().await;

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn panicking_handler_is_reported_through_the_broker_error_handler() {
    let reports = Arc::new(AtomicUsize::new(0));
    let reports_clone = reports.clone();
    let broker = Arc::new(LocalBroker::with_error_handler(Arc::new(move |_err| {
        reports_clone.fetch_add(1, Ordering::SeqCst);
    })));
    let panicking: SubscriptionHandler = Arc::new(|_payload| Box::pin(async move { panic!("boom") }));
    let _sub = broker.subscribe("order.created", panicking).await;

    let token = CancellationToken::new();
    broker.publish(&token, "order.created", Bytes::from_static(b"{}")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(reports.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsubscribing_removes_the_subscription_from_dispatch() {
    let broker = Arc::new(LocalBroker::new());
    let counter = Arc::new(AtomicUsize::new(0));
    let notify = Arc::new(Notify::new());
    let sub = broker.subscribe("order.created", counting_handler(counter.clone(), notify.clone())).await;

    broker.unsubscribe(sub.id()).await.unwrap();

    let token = CancellationToken::new();
    broker.publish(&token, "order.created", Bytes::from_static(b"{}")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unsubscribing_one_group_member_leaves_the_other_receiving_every_event() {
    let broker = Arc::new(LocalBroker::new());
    let counter_a = Arc::new(AtomicUsize::new(0));
    let counter_b = Arc::new(AtomicUsize::new(0));
    let notify = Arc::new(Notify::new());
    let sub_a = broker.subscribe_group("order.created", "billing", counting_handler(counter_a.clone(), notify.clone())).await;
    let _sub_b = broker.subscribe_group("order.created", "billing", counting_handler(counter_b.clone(), notify.clone())).await;

    broker.unsubscribe(sub_a.id()).await.unwrap();

    let token = CancellationToken::new();
    for _ in 0..3 {
        broker.publish(&token, "order.created", Bytes::from_static(b"{}")).await.unwrap();
        notify.notified().await;
    }

    assert_eq!(counter_a.load(Ordering::SeqCst), 0);
    assert_eq!(counter_b.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn a_bounded_capacity_limits_concurrently_running_handlers() {
    let running = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let broker = Arc::new(LocalBroker::with_capacity(2, gateway_core::error::log_error_handler()));

    let handler: SubscriptionHandler = {
        let running = running.clone();
        let max_seen = max_seen.clone();
        Arc::new(move |_payload| {
            let running = running.clone();
            let max_seen = max_seen.clone();
            Box::pin(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        })
    };

    for _ in 0..5 {
        let _sub = broker.subscribe("order.created", handler.clone()).await;
    }

    let token = CancellationToken::new();
    broker.publish(&token, "order.created", Bytes::from_static(b"{}")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(max_seen.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn unsubscribe_is_idempotent() {
    let broker = Arc::new(LocalBroker::new());
    let counter = Arc::new(AtomicUsize::new(0));
    let notify = Arc::new(Notify::new());
    let sub = broker.subscribe("order.created", counting_handler(counter, notify)).await;
    let id = sub.id();

    broker.unsubscribe(id).await.unwrap();
    assert!(broker.unsubscribe(id).await.is_ok());
}

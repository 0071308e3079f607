mod support;

use outbound::batch::{FlushBarrierBuilder, flush_all, flush_proxy_batch};
use outbound::invocation::{CallMode, Invocation, RpcFailure};
use outbound::transport::{RequestHandler, RetryDecision};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use support::*;

#[test]
fn proxy_flush_drains_the_queued_requests() {
    let handler = MockHandler::new(1, vec![]);
    let provider = MockProvider::new(vec![Arc::clone(&handler)]);
    let harness = test_services();

    for entry in [b"first".as_slice(), b"second".as_slice()] {
        let append = Invocation::new(
            provider.clone(),
            harness.services.clone(),
            envelope("log", CallMode::BatchOneway),
            entry,
        );
        assert!(append.invoke(true));
    }
    assert_eq!(handler.batch.request_count(), 2);

    let flush = flush_proxy_batch(provider, harness.services.clone());
    assert_eq!(flush.blocking_wait(), Ok(true));
    assert_eq!(handler.batch_flushes.load(Ordering::SeqCst), 1);
    assert!(handler.batch.is_empty());
}

#[test]
fn flush_against_a_stale_handle_completes_as_a_noop() {
    let handler = MockHandler::new(1, vec![SendScript::Stale]);
    let provider = MockProvider::new(vec![Arc::clone(&handler)]);
    let harness = test_services();

    let flush = flush_proxy_batch(provider.clone(), harness.services.clone());
    assert_eq!(flush.blocking_wait(), Ok(true));
    assert_eq!(provider.cleared(), 1);
}

#[test]
fn flush_failures_are_never_retried() {
    let handler = MockHandler::new(1, vec![SendScript::Retryable("connection reset")]);
    let provider = MockProvider::new(vec![Arc::clone(&handler)]);
    let harness = services_with_policy(ScriptedRetryPolicy::new(vec![
        RetryDecision::Immediate,
        RetryDecision::Immediate,
    ]));

    let flush = flush_proxy_batch(provider, harness.services.clone());
    assert_eq!(handler.batch_flushes.load(Ordering::SeqCst), 1);
    assert_eq!(
        flush.blocking_wait(),
        Err(RpcFailure::RetryableTransport {
            reason: "connection reset".to_string()
        })
    );
}

#[test]
fn flush_all_fires_the_completion_once_after_every_handler() {
    let handlers: Vec<_> = (1..=3).map(|id| MockHandler::new(id, vec![])).collect();
    let harness = test_services();

    let fired = Arc::new(AtomicUsize::new(0));
    let all_synchronous = Arc::new(Mutex::new(None));
    let barrier = {
        let fired = Arc::clone(&fired);
        let all_synchronous = Arc::clone(&all_synchronous);
        flush_all(
            handlers
                .iter()
                .map(|h| Arc::clone(h) as Arc<dyn RequestHandler>),
            harness.services.clone(),
            move |synchronous| {
                fired.fetch_add(1, Ordering::SeqCst);
                *all_synchronous.lock().unwrap() = Some(synchronous);
            },
        )
    };

    assert!(barrier.wait_done());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(*all_synchronous.lock().unwrap(), Some(true));
    for handler in &handlers {
        assert_eq!(handler.batch_flushes.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn flush_all_waits_for_queued_flushes() {
    let fast = MockHandler::new(1, vec![]);
    let slow = MockHandler::new(2, vec![SendScript::Queued]);
    let harness = test_services();

    let barrier = flush_all(
        [
            Arc::clone(&fast) as Arc<dyn RequestHandler>,
            Arc::clone(&slow) as Arc<dyn RequestHandler>,
        ],
        harness.services.clone(),
        |_| {},
    );
    assert!(!barrier.is_done());

    // The transport finishes writing the queued flush later.
    let pending = slow.flushes_seen.lock().unwrap().pop().unwrap();
    pending.on_sent();

    // One participant completed asynchronously, so the aggregate did too.
    assert!(!barrier.wait_done());
}

#[test]
fn flush_all_with_no_handlers_completes_immediately() {
    let harness = test_services();
    let barrier = flush_all(
        Vec::<Arc<dyn RequestHandler>>::new(),
        harness.services.clone(),
        |_| {},
    );
    assert!(barrier.is_done());
    assert!(barrier.wait_done());
}

#[test]
fn a_failed_flush_still_counts_toward_the_gate() {
    let good = MockHandler::new(1, vec![]);
    let bad = MockHandler::new(2, vec![SendScript::Terminal("connection lost")]);
    let harness = test_services();

    let fired = Arc::new(AtomicUsize::new(0));
    let barrier = {
        let fired = Arc::clone(&fired);
        flush_all(
            [
                Arc::clone(&good) as Arc<dyn RequestHandler>,
                Arc::clone(&bad) as Arc<dyn RequestHandler>,
            ],
            harness.services.clone(),
            move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            },
        )
    };

    assert!(!barrier.wait_done());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn barrier_holds_until_enumeration_is_marked_ready() {
    let fired = Arc::new(AtomicUsize::new(0));
    let builder = {
        let fired = Arc::clone(&fired);
        FlushBarrierBuilder::new(move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    };

    let first = builder.register();
    let second = builder.register();
    first.complete(true);
    second.complete(true);
    // Both participants are done, but the initiation guard is still held.
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    let barrier = builder.ready();
    assert!(barrier.is_done());
    assert!(barrier.wait_done());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn dropped_ticket_counts_as_asynchronous_completion() {
    let builder = FlushBarrierBuilder::new(|_| {});
    let ticket = builder.register();
    drop(ticket);
    let barrier = builder.ready();
    assert!(barrier.is_done());
    assert!(!barrier.wait_done());
}

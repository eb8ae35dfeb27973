//! Queue integration tests.
//!
//! These tests run the dispatcher against the in-memory driver and check
//! the retry, dead-letter and routing behavior end to end.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use courier_queue::{
    DEAD_LETTER_QUEUE_NAME, DEFAULT_QUEUE_NAME, Dispatcher, HandlerRegistry, MemoryDriver,
    Message, QueueError, QueueRegistry, delivery,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn memory_registry(capacity: usize) -> QueueRegistry {
    QueueRegistry::new(
        Arc::new(MemoryDriver::new(capacity)),
        CancellationToken::new(),
    )
}

fn start_dispatcher(
    registry: &QueueRegistry,
    handlers: HandlerRegistry,
) -> JoinHandle<Result<(), QueueError>> {
    let dispatcher = Dispatcher::new(registry.clone(), DEFAULT_QUEUE_NAME, handlers);
    tokio::spawn(async move { dispatcher.run().await })
}

/// Drain the dead-letter queue into a channel.
fn watch_dead_letters(registry: &QueueRegistry) -> mpsc::UnboundedReceiver<Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    let registry = registry.clone();

    tokio::spawn(async move {
        let delivery = delivery(move |message| {
            let _ = tx.send(message);
            async { Ok(()) }
        });
        registry
            .driver()
            .consume(DEAD_LETTER_QUEUE_NAME, delivery, registry.shutdown_token())
            .await
    });

    rx
}

async fn shutdown(registry: &QueueRegistry, consumer: JoinHandle<Result<(), QueueError>>) {
    registry.shutdown_token().cancel();
    let result = timeout(WAIT, consumer)
        .await
        .expect("consumer did not stop")
        .expect("consumer panicked");
    assert!(result.is_err_and(|e| e.is_cancelled()));
}

#[tokio::test]
async fn test_always_failing_message_is_dead_lettered() {
    let registry = memory_registry(100);
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    let mut handlers = HandlerRegistry::new();
    handlers
        .register_fn("test", move |message: Message| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(message.retry_count);
                Err("always fails".into())
            }
        })
        .expect("register handler");

    let mut dead_letters = watch_dead_letters(&registry);
    let consumer = start_dispatcher(&registry, handlers);

    registry.push(Message::new("test")).await.expect("push");

    let dead = timeout(WAIT, dead_letters.recv())
        .await
        .expect("message was not dead-lettered")
        .expect("dead-letter watcher stopped");
    assert_eq!(dead.message_type, "test");
    assert_eq!(dead.retry_count, 4);

    let mut seen = Vec::new();
    while let Ok(retry_count) = seen_rx.try_recv() {
        seen.push(retry_count);
    }
    assert_eq!(seen, vec![0, 1, 2, 3]);

    // Never handed to a handler again once dead-lettered.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(seen_rx.try_recv().is_err());
    assert!(dead_letters.try_recv().is_err());
    assert_eq!(registry.pending(DEFAULT_QUEUE_NAME).await.expect("pending"), 0);

    shutdown(&registry, consumer).await;
}

#[tokio::test]
async fn test_message_recovers_after_transient_failures() {
    let registry = memory_registry(100);
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    let mut handlers = HandlerRegistry::new();
    handlers
        .register_fn("flaky", move |message: Message| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(message.retry_count);
                if message.retry_count < 2 {
                    Err("not yet".into())
                } else {
                    Ok(())
                }
            }
        })
        .expect("register handler");

    let mut dead_letters = watch_dead_letters(&registry);
    let consumer = start_dispatcher(&registry, handlers);

    registry.push(Message::new("flaky")).await.expect("push");

    for expected in 0..3 {
        let retry_count = timeout(WAIT, seen_rx.recv()).await.expect("handler not called");
        assert_eq!(retry_count, Some(expected));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(seen_rx.try_recv().is_err());
    assert!(dead_letters.try_recv().is_err());

    shutdown(&registry, consumer).await;
}

#[tokio::test]
async fn test_successful_message_consumed_once() {
    let registry = memory_registry(100);
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    let mut handlers = HandlerRegistry::new();
    handlers
        .register_fn("test", move |message: Message| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(message);
                Ok(())
            }
        })
        .expect("register handler");

    let consumer = start_dispatcher(&registry, handlers);

    let message = Message::new("test")
        .with_field("id", 7)
        .with_header("source", "integration");
    registry.push(message.clone()).await.expect("push");

    let received = timeout(WAIT, seen_rx.recv()).await.expect("handler not called");
    assert_eq!(received, Some(message));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(seen_rx.try_recv().is_err());
    assert_eq!(registry.pending(DEFAULT_QUEUE_NAME).await.expect("pending"), 0);
    assert_eq!(registry.pending(DEAD_LETTER_QUEUE_NAME).await.expect("pending"), 0);

    shutdown(&registry, consumer).await;
}

#[tokio::test]
async fn test_unknown_type_is_dropped() {
    let registry = memory_registry(100);
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    let mut handlers = HandlerRegistry::new();
    handlers
        .register_fn("test", move |message: Message| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(message.message_type);
                Ok(())
            }
        })
        .expect("register handler");

    let consumer = start_dispatcher(&registry, handlers);

    registry.push(Message::new("unregistered")).await.expect("push");
    registry.push(Message::new("test")).await.expect("push");

    let handled = timeout(WAIT, seen_rx.recv()).await.expect("handler not called");
    assert_eq!(handled.as_deref(), Some("test"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(seen_rx.try_recv().is_err());
    assert_eq!(registry.pending(DEFAULT_QUEUE_NAME).await.expect("pending"), 0);
    assert_eq!(registry.pending(DEAD_LETTER_QUEUE_NAME).await.expect("pending"), 0);

    shutdown(&registry, consumer).await;
}

#[tokio::test]
async fn test_concurrent_producers_no_loss_no_duplicates() {
    let registry = memory_registry(100);
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    let mut handlers = HandlerRegistry::new();
    handlers
        .register_fn("test", move |message: Message| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send((message.body["producer"].as_i64(), message.body["seq"].as_i64()));
                Ok(())
            }
        })
        .expect("register handler");

    let producers: Vec<_> = (0..2)
        .map(|producer| {
            let registry = registry.clone();
            tokio::spawn(async move {
                for seq in 0..50 {
                    let message = Message::new("test")
                        .with_field("producer", producer)
                        .with_field("seq", seq);
                    registry.push(message).await?;
                }
                Ok::<(), QueueError>(())
            })
        })
        .collect();

    let consumer = start_dispatcher(&registry, handlers);

    for producer in producers {
        producer.await.expect("producer panicked").expect("publish failed");
    }

    let mut delivered = HashSet::new();
    for _ in 0..100 {
        let item = timeout(WAIT, seen_rx.recv())
            .await
            .expect("missing deliveries")
            .expect("handler channel closed");
        assert!(delivered.insert(item), "duplicate delivery");
    }
    assert_eq!(delivered.len(), 100);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(seen_rx.try_recv().is_err());

    shutdown(&registry, consumer).await;
}

#[tokio::test]
async fn test_dead_letters_go_to_configured_queue() {
    let registry = memory_registry(100).with_queue_names("jobs", "jobs.failed");

    let mut handlers = HandlerRegistry::new();
    handlers
        .register_fn("test", |_| async { Err("always fails".into()) })
        .expect("register handler");

    let dispatcher = Dispatcher::new(registry.clone(), "jobs", handlers);
    let mut message = Message::new("test");
    message.retry_count = 4;

    dispatcher.process(message).await.expect("process");

    assert_eq!(registry.pending("jobs.failed").await.expect("pending"), 1);
    assert_eq!(registry.pending(DEAD_LETTER_QUEUE_NAME).await.expect("pending"), 0);
}

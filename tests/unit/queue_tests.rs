//! Unit tests for the abortable request queue.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use scanlink::queue::RequestQueue;

#[test]
fn pop_returns_items_in_push_order() {
    let queue = RequestQueue::new();
    for value in 0..32u32 {
        queue.push(value);
    }
    for expected in 0..32u32 {
        assert_eq!(queue.pop(), Some(expected));
    }
}

#[test]
fn pop_blocks_until_an_item_arrives() {
    let queue = Arc::new(RequestQueue::new());
    let (tx, rx) = mpsc::channel();
    let waiter = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            tx.send(queue.pop()).expect("deliver popped item");
        })
    };
    // Nothing queued yet, so the waiter must still be blocked.
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    queue.push(41u32);
    let popped = rx.recv_timeout(Duration::from_secs(2)).expect("pop completed");
    assert_eq!(popped, Some(41));
    waiter.join().expect("waiter join");
}

#[test]
fn abort_wakes_every_blocked_pop_with_none() {
    let queue = Arc::new(RequestQueue::<u32>::new());
    let (tx, rx) = mpsc::channel();
    let mut waiters = Vec::new();
    for _ in 0..4 {
        let queue = Arc::clone(&queue);
        let tx = tx.clone();
        waiters.push(thread::spawn(move || {
            tx.send(queue.pop()).expect("deliver pop result");
        }));
    }
    drop(tx);
    thread::sleep(Duration::from_millis(50));
    queue.abort();
    for _ in 0..4 {
        let result = rx.recv_timeout(Duration::from_secs(2)).expect("waiter woke up");
        assert_eq!(result, None);
    }
    for waiter in waiters {
        waiter.join().expect("waiter join");
    }
}

#[test]
fn pop_after_abort_returns_none_without_blocking() {
    let queue = RequestQueue::<u32>::new();
    queue.abort();
    assert_eq!(queue.pop(), None);
}

#[test]
fn push_after_abort_is_discarded() {
    let queue = RequestQueue::new();
    queue.abort();
    queue.push(7u32);
    assert_eq!(queue.pop(), None);
}

#[test]
fn abort_discards_items_already_queued() {
    let queue = RequestQueue::new();
    queue.push(1u32);
    queue.push(2u32);
    queue.abort();
    assert_eq!(queue.pop(), None);
}

#[test]
fn abort_is_idempotent() {
    let queue = RequestQueue::<u32>::new();
    queue.abort();
    queue.abort();
    assert_eq!(queue.pop(), None);
}

#[test]
fn each_item_is_delivered_to_exactly_one_consumer() {
    let queue = Arc::new(RequestQueue::new());
    for value in 0..200u32 {
        queue.push(value);
    }

    let (tx, rx) = mpsc::channel();
    let mut consumers = Vec::new();
    for _ in 0..4 {
        let queue = Arc::clone(&queue);
        let tx = tx.clone();
        consumers.push(thread::spawn(move || {
            while let Some(value) = queue.pop() {
                tx.send(value).expect("deliver consumed value");
            }
        }));
    }
    drop(tx);

    let mut seen = Vec::new();
    for _ in 0..200 {
        seen.push(rx.recv_timeout(Duration::from_secs(2)).expect("value consumed"));
    }
    queue.abort();
    for consumer in consumers {
        consumer.join().expect("consumer join");
    }

    seen.sort_unstable();
    let expected: Vec<u32> = (0..200).collect();
    assert_eq!(seen, expected, "every value delivered exactly once");
}

#[test]
fn per_producer_order_survives_concurrent_pushes() {
    let queue = Arc::new(RequestQueue::new());
    let mut producers = Vec::new();
    for producer in 0..4u32 {
        let queue = Arc::clone(&queue);
        producers.push(thread::spawn(move || {
            for sequence in 0..50u32 {
                queue.push((producer, sequence));
            }
        }));
    }
    for producer in producers {
        producer.join().expect("producer join");
    }

    let mut last_seen = [None::<u32>; 4];
    for _ in 0..200 {
        let (producer, sequence) = queue.pop().expect("item available");
        let slot = &mut last_seen[usize::try_from(producer).unwrap()];
        if let Some(previous) = *slot {
            assert!(sequence > previous, "producer {producer} items reordered");
        }
        *slot = Some(sequence);
    }
}

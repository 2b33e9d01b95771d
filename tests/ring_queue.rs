use colligo::{RingResizeError, SpscRing};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn delivers_in_fifo_order() {
    let ring = SpscRing::with_capacity(8);
    for value in 0..5 {
        ring.enqueue(value).expect("ring has room");
    }
    for expected in 0..5 {
        assert_eq!(ring.dequeue(), Some(expected));
    }
    assert_eq!(ring.dequeue(), None);
}

#[test]
fn accepts_exactly_capacity_items() {
    let ring = SpscRing::with_capacity(4);
    for value in 0..4 {
        assert!(ring.enqueue(value).is_ok());
    }
    assert_eq!(ring.enqueue(99), Err(99));
    assert_eq!(ring.len(), 4);

    // One dequeue frees exactly one slot.
    assert_eq!(ring.dequeue(), Some(0));
    assert!(ring.enqueue(4).is_ok());
    assert_eq!(ring.enqueue(100), Err(100));
}

#[test]
fn full_ring_returns_item_to_caller() {
    let ring = SpscRing::with_capacity(1);
    ring.enqueue(String::from("kept")).expect("ring has room");
    let bounced = ring.enqueue(String::from("bounced")).expect_err("ring is full");
    assert_eq!(bounced, "bounced");
    assert_eq!(ring.dequeue().as_deref(), Some("kept"));
}

#[test]
fn reports_len_and_capacity() {
    let ring = SpscRing::with_capacity(3);
    assert_eq!(ring.capacity(), 3);
    assert!(ring.is_empty());
    ring.enqueue(1).expect("ring has room");
    ring.enqueue(2).expect("ring has room");
    assert_eq!(ring.len(), 2);
    ring.dequeue();
    assert_eq!(ring.len(), 1);
}

#[test]
fn wraps_around_many_times() {
    let ring = SpscRing::with_capacity(3);
    for round in 0u64..100 {
        ring.enqueue(round).expect("ring has room");
        assert_eq!(ring.dequeue(), Some(round));
    }
    assert!(ring.is_empty());
}

#[test]
fn resize_requires_empty_ring() {
    let ring = SpscRing::with_capacity(2);
    ring.enqueue(7).expect("ring has room");
    assert_eq!(
        ring.resize(8),
        Err(RingResizeError::NotEmpty { len: 1 })
    );
    ring.dequeue();
    ring.resize(8).expect("empty ring resizes");
    assert_eq!(ring.capacity(), 8);
    for value in 0..8 {
        assert!(ring.enqueue(value).is_ok());
    }
    assert!(ring.enqueue(8).is_err());
}

#[test]
fn resize_rejects_zero_capacity() {
    let ring = SpscRing::<u32>::with_capacity(2);
    assert_eq!(ring.resize(0), Err(RingResizeError::ZeroCapacity));
}

#[test]
fn crosses_threads_in_order() {
    let ring = Arc::new(SpscRing::with_capacity(16));
    let producer_ring = ring.clone();
    let total = 10_000u64;
    let producer = thread::spawn(move || {
        for value in 0..total {
            let mut item = value;
            loop {
                match producer_ring.enqueue(item) {
                    Ok(()) => break,
                    Err(back) => {
                        item = back;
                        thread::sleep(Duration::from_micros(10));
                    }
                }
            }
        }
    });
    let consumer_ring = ring.clone();
    let consumer = thread::spawn(move || {
        let mut next = 0u64;
        while next < total {
            match consumer_ring.dequeue() {
                Some(value) => {
                    assert_eq!(value, next);
                    next += 1;
                }
                None => thread::sleep(Duration::from_micros(10)),
            }
        }
    });
    producer.join().expect("producer finished");
    consumer.join().expect("consumer finished");
    assert!(ring.is_empty());
}

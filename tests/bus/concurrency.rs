//! Concurrent registration, sending and consumption.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use microbus::{MessageBus, ServiceId};

use crate::support::{drain, drain_jobs, registered, Job, Tick};

#[test]
fn concurrent_registrations_are_not_lost() {
    let bus = Arc::new(MessageBus::new());
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                let id = ServiceId::new(format!("service-{}", i));
                bus.register(&id).unwrap();
                bus.subscribe_broadcast::<Tick>(&id).unwrap();
                id
            })
        })
        .collect();
    let ids: Vec<ServiceId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(ids.iter().all(|id| bus.is_registered(id)));
    assert_eq!(bus.send_broadcast(Tick { n: 1 }).unwrap(), 16);
}

#[test]
fn concurrent_senders_share_the_ring_evenly() {
    const SUBSCRIBERS: usize = 4;
    const SENDERS: usize = 8;
    const PER_SENDER: usize = 50;

    let bus = Arc::new(MessageBus::new());
    let ids: Vec<_> = (0..SUBSCRIBERS)
        .map(|i| registered(&bus, &format!("worker-{}", i)))
        .collect();
    for id in &ids {
        bus.subscribe_event::<Job>(id).unwrap();
    }

    let senders: Vec<_> = (0..SENDERS)
        .map(|s| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                for n in 0..PER_SENDER {
                    let job = Job((s * PER_SENDER + n) as u32);
                    assert!(bus.send_event(job).unwrap().is_some());
                }
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }

    let mut all: Vec<u32> = Vec::new();
    for id in &ids {
        let received = drain_jobs(&bus, id);
        assert_eq!(received.len(), SENDERS * PER_SENDER / SUBSCRIBERS);
        all.extend(received);
    }
    all.sort_unstable();
    let expected: Vec<u32> = (0..(SENDERS * PER_SENDER) as u32).collect();
    assert_eq!(all, expected);
}

#[test]
fn blocked_consumers_receive_everything_sent() {
    const JOBS: u32 = 200;

    let bus = Arc::new(MessageBus::new());
    let ids: Vec<_> = (0..2).map(|i| registered(&bus, &format!("consumer-{}", i))).collect();
    for id in &ids {
        bus.subscribe_event::<Job>(id).unwrap();
    }

    let consumers: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..JOBS / 2 {
                    let job = bus.await_message(&id).unwrap().into_event::<Job>().unwrap();
                    bus.complete(&job, job.0 * 2).unwrap();
                    seen.push(job.0);
                }
                seen
            })
        })
        .collect();

    let futures: Vec<_> = (0..JOBS)
        .map(|n| bus.send_event(Job(n)).unwrap().unwrap())
        .collect();

    for consumer in consumers {
        let seen = consumer.join().unwrap();
        assert_eq!(seen.len(), (JOBS / 2) as usize);
        // FIFO per mailbox: each consumer sees its share in send order.
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
    for (n, future) in futures.iter().enumerate() {
        assert_eq!(future.get_timeout(Duration::from_secs(5)), Some(n as u32 * 2));
    }
    assert_eq!(bus.pending_futures(), 0);
}

#[test]
fn sends_race_safely_with_subscriber_churn() {
    const SENDERS: u32 = 3;
    const PER_SENDER: u32 = 300;
    const STRIDE: u32 = 10_000;

    let bus = Arc::new(MessageBus::new());
    let stable: Vec<_> = (0..2).map(|i| registered(&bus, &format!("stable-{}", i))).collect();
    for id in &stable {
        bus.subscribe_event::<Job>(id).unwrap();
        bus.subscribe_broadcast::<Tick>(id).unwrap();
    }
    let churners: Vec<_> = (0..2).map(|i| ServiceId::new(format!("churn-{}", i))).collect();

    let running = Arc::new(AtomicBool::new(true));
    let churn = {
        let bus = Arc::clone(&bus);
        let running = Arc::clone(&running);
        let churners = churners.clone();
        thread::spawn(move || {
            let mut cycles = 0;
            while running.load(Ordering::SeqCst) {
                for id in &churners {
                    bus.register(id).unwrap();
                    bus.subscribe_event::<Job>(id).unwrap();
                    bus.subscribe_broadcast::<Tick>(id).unwrap();
                }
                thread::yield_now();
                for id in &churners {
                    bus.unregister(id).unwrap();
                }
                cycles += 1;
            }
            // Leave one churner registered so a surviving mailbox is checked too.
            bus.register(&churners[0]).unwrap();
            bus.subscribe_event::<Job>(&churners[0]).unwrap();
            cycles
        })
    };

    let senders: Vec<_> = (0..SENDERS)
        .map(|s| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                let mut futures = Vec::new();
                for seq in 0..PER_SENDER {
                    let future = bus.send_event(Job(s * STRIDE + seq)).unwrap();
                    futures.push(future.expect("stable subscribers are always in the ring"));
                    let reached = bus.send_broadcast(Tick { n: seq as u64 }).unwrap();
                    assert!((2..=4).contains(&reached));
                }
                futures
            })
        })
        .collect();
    let futures: Vec<_> = senders.into_iter().flat_map(|h| h.join().unwrap()).collect();
    running.store(false, Ordering::SeqCst);
    assert!(churn.join().unwrap() > 0);

    for _ in 0..3 {
        bus.send_event(Job(SENDERS * STRIDE)).unwrap().unwrap();
    }

    // Every pending future belongs to an event sitting in a live mailbox.
    let mut queued_events = 0;
    let mut live: Vec<&ServiceId> = stable.iter().collect();
    live.push(&churners[0]);
    for id in &live {
        for envelope in drain(&bus, id) {
            if let Some(event_id) = envelope.event_id() {
                assert!(bus.get_future::<Job>(event_id).is_some());
                queued_events += 1;
            }
        }
    }
    assert!(!bus.is_registered(&churners[1]));
    assert_eq!(bus.pending_futures(), queued_events);

    // The rest were routed to churners and dropped when they unregistered.
    let total_sent = futures.len() + 3;
    assert!(queued_events <= total_sent);
    assert!(futures.iter().all(|future| !future.is_done()));
}

#[test]
fn stable_subscribers_keep_fifo_order_under_churn() {
    const PER_SENDER: u32 = 200;
    const STRIDE: u32 = 10_000;

    let bus = Arc::new(MessageBus::new());
    let stable = registered(&bus, "stable");
    bus.subscribe_event::<Job>(&stable).unwrap();
    let churner = ServiceId::new("churner");

    let running = Arc::new(AtomicBool::new(true));
    let churn = {
        let bus = Arc::clone(&bus);
        let running = Arc::clone(&running);
        let churner = churner.clone();
        thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                bus.register(&churner).unwrap();
                bus.subscribe_event::<Job>(&churner).unwrap();
                thread::yield_now();
                bus.unregister(&churner).unwrap();
            }
        })
    };

    let senders: Vec<_> = (0..2u32)
        .map(|s| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                for seq in 0..PER_SENDER {
                    assert!(bus.send_event(Job(s * STRIDE + seq)).unwrap().is_some());
                }
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }
    running.store(false, Ordering::SeqCst);
    churn.join().unwrap();

    let received = drain_jobs(&bus, &stable);
    assert!(!received.is_empty());
    for s in 0..2u32 {
        let from_sender: Vec<u32> = received.iter().copied().filter(|n| n / STRIDE == s).collect();
        assert!(from_sender.windows(2).all(|w| w[0] < w[1]));
    }
}

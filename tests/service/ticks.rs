//! Broadcasts observed by several micro-services.

use std::sync::{Arc, Mutex};

use microbus::{Context, MessageBus, MicroService, ServiceError, ServiceThread, Terminate, Tick};

use crate::support::init_tracing;

struct Recorder {
    seen: Arc<Mutex<Vec<u64>>>,
}

impl MicroService for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn initialize(&mut self, ctx: &mut Context<Self>) -> Result<(), ServiceError> {
        ctx.subscribe_broadcast::<Tick, _>(|recorder, _, tick| {
            recorder.seen.lock().unwrap().push(tick.tick);
            Ok(())
        })?;
        ctx.terminate_on::<Terminate>()?;
        Ok(())
    }
}

type Recorded = Arc<Mutex<Vec<u64>>>;

fn spawn_recorders(bus: &Arc<MessageBus>, count: usize) -> Vec<(ServiceThread, Recorded)> {
    (0..count)
        .map(|_| {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let recorder = Recorder { seen: seen.clone() };
            (ServiceThread::spawn(bus.clone(), recorder).unwrap(), seen)
        })
        .collect()
}

#[test]
fn every_recorder_sees_each_tick_once() {
    init_tracing();
    let bus = Arc::new(MessageBus::new());
    let recorders = spawn_recorders(&bus, 3);

    assert_eq!(bus.send_broadcast(Tick { tick: 5 }).unwrap(), 3);
    assert_eq!(bus.send_broadcast(Terminate).unwrap(), 3);

    for (thread, seen) in recorders {
        let stats = thread.join().unwrap();
        assert_eq!(stats.messages_handled, 2);
        assert_eq!(*seen.lock().unwrap(), vec![5]);
    }
}

#[test]
fn ticks_arrive_in_broadcast_order() {
    let bus = Arc::new(MessageBus::new());
    let recorders = spawn_recorders(&bus, 2);

    for tick in 1..=20 {
        bus.send_broadcast(Tick { tick }).unwrap();
    }
    bus.send_broadcast(Terminate).unwrap();

    for (thread, seen) in recorders {
        thread.join().unwrap();
        assert_eq!(*seen.lock().unwrap(), (1..=20).collect::<Vec<_>>());
    }
}

#[test]
fn recorder_ids_are_distinct() {
    let bus = Arc::new(MessageBus::new());
    let recorders = spawn_recorders(&bus, 2);
    assert_ne!(recorders[0].0.id(), recorders[1].0.id());
    assert_eq!(recorders[0].0.id().name(), recorders[1].0.id().name());

    for (thread, _) in recorders {
        thread.stop().unwrap();
    }
}

//! Whole systems run by the runtime and driven by the clock.

use std::sync::{Arc, Mutex};

use microbus::{ClockConfig, Context, MicroService, Runtime, RuntimeConfig, ServiceError};

use crate::support::{init_tracing, Ping, Ponger, Student, Transcript, Worker};

fn config(duration: u64) -> RuntimeConfig {
    RuntimeConfig {
        clock: ClockConfig {
            tick_ms: 2,
            duration,
        },
        ..RuntimeConfig::default()
    }
}

#[test]
fn student_and_workers_run_until_terminate() {
    init_tracing();
    let transcript = Arc::new(Mutex::new(Transcript::default()));

    let mut runtime = Runtime::new(config(10));
    runtime.spawn(Worker::new("GPU 1")).unwrap();
    runtime.spawn(Worker::new("GPU 2")).unwrap();
    runtime.spawn(Student::new(transcript.clone())).unwrap();
    let report = runtime.run().unwrap();

    assert!(report.is_clean());
    assert_eq!(report.services.len(), 4);
    assert_eq!(report.service("clock").unwrap().stats.messages_handled, 10);
    // Ten ticks plus Terminate.
    assert_eq!(report.service("student").unwrap().stats.messages_handled, 11);

    let transcript = transcript.lock().unwrap();
    assert_eq!(transcript.ticks, (1..=10).collect::<Vec<_>>());
    assert!(transcript.answers.len() + transcript.unanswered <= 10);
    for (tick, result) in &transcript.answers {
        assert_eq!(*result, tick * 2);
    }
}

/// Never subscribes to `Terminate`; only the join timeout stops it.
struct Stubborn;

impl MicroService for Stubborn {
    fn name(&self) -> &str {
        "stubborn"
    }

    fn initialize(&mut self, ctx: &mut Context<Self>) -> Result<(), ServiceError> {
        ctx.subscribe_event::<Ping, _>(|_, ctx, ping| {
            ctx.complete(&ping, "still here".to_string())?;
            Ok(())
        })?;
        Ok(())
    }
}

#[test]
fn services_ignoring_terminate_are_stopped_after_timeout() {
    let mut runtime = Runtime::new(RuntimeConfig {
        join_timeout_ms: Some(20),
        ..config(3)
    });
    runtime.spawn(Stubborn).unwrap();
    let report = runtime.run().unwrap();

    assert!(report.is_clean());
    assert!(report.service("stubborn").is_some());
}

#[test]
fn shutdown_stops_services_without_a_clock() {
    let mut runtime = Runtime::new(RuntimeConfig::default());
    let ponger = runtime.spawn(Ponger).unwrap();
    assert!(runtime.bus().is_registered(&ponger));

    let bus = runtime.bus().clone();
    let report = runtime.shutdown();

    assert!(report.is_clean());
    assert!(report.service("clock").is_none());
    assert!(!bus.is_registered(&ponger));
}

#[test]
fn report_is_written_when_configured() {
    let path = std::env::temp_dir().join(format!("microbus-report-{}.json", std::process::id()));
    let runtime = Runtime::new(RuntimeConfig {
        report_path: Some(path.clone()),
        ..config(2)
    });
    let report = runtime.run().unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(parsed["services"][0]["name"], "clock");
    assert_eq!(parsed["services"].as_array().unwrap().len(), report.services.len());
}

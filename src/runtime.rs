//! Runtime: host bootstrap for a system of micro-services.
//!
//! The runtime owns the shared bus, starts one worker per micro-service,
//! starts the clock last, waits for every worker to finish and collects a
//! [`RunReport`]. Workers still running `join_timeout_ms` after the clock
//! ran out are terminated.
//!
//! ## Example
//!
//! ```ignore
//! let config = RuntimeConfig::from_path("system.json")?;
//! let mut runtime = Runtime::new(config);
//!
//! for gpu in gpus {
//!     runtime.spawn(GpuService::new(gpu))?;
//! }
//! runtime.spawn(StudentService::new(student))?;
//!
//! let report = runtime.run()?;
//! println!("{}", report.to_json()?);
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::bus::MessageBus;
use crate::clock::{Clock, ClockConfig};
use crate::service::{MicroService, ServiceError, ServiceId, ServiceStats, ServiceThread};

/// Runtime configuration, usually read from a JSON file.
///
/// ```json
/// {
///   "clock": { "tick_ms": 10, "duration": 100 },
///   "join_timeout_ms": 500,
///   "report_path": "output.json"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub clock: ClockConfig,
    /// How long `run` waits for workers once the clock is done. `None` waits
    /// forever.
    pub join_timeout_ms: Option<u64>,
    /// Where `run` writes the JSON report, if anywhere.
    pub report_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            clock: ClockConfig::default(),
            join_timeout_ms: Some(1000),
            report_path: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self, ServiceError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}

/// Outcome of one micro-service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub name: String,
    pub instance: u64,
    pub stats: ServiceStats,
    /// Set if the run loop ended with an error.
    pub error: Option<String>,
}

/// Per-service outcomes of a run, in spawn order (clock last).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub services: Vec<ServiceReport>,
}

impl RunReport {
    /// First service report with the given name.
    pub fn service(&self, name: &str) -> Option<&ServiceReport> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Whether every service exited cleanly.
    pub fn is_clean(&self) -> bool {
        self.services.iter().all(|s| s.error.is_none())
    }

    pub fn to_json(&self) -> Result<String, ServiceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ServiceError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Host for a system of micro-services sharing one bus.
pub struct Runtime {
    bus: Arc<MessageBus>,
    config: RuntimeConfig,
    services: Vec<ServiceThread>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_bus(Arc::new(MessageBus::new()), config)
    }

    /// Host services on an existing bus.
    pub fn with_bus(bus: Arc<MessageBus>, config: RuntimeConfig) -> Self {
        Self {
            bus,
            config,
            services: Vec::new(),
        }
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Register, initialize and start a micro-service.
    pub fn spawn<S: MicroService>(&mut self, service: S) -> Result<ServiceId, ServiceError> {
        let thread = ServiceThread::spawn(Arc::clone(&self.bus), service)?;
        let id = thread.id().clone();
        tracing::debug!(service = %id, "spawned");
        self.services.push(thread);
        Ok(id)
    }

    /// Start the clock and wait for every service to finish.
    ///
    /// Services subscribed to `Terminate` exit on their own; whatever is
    /// still running `join_timeout_ms` after the clock is done gets
    /// terminated. The report is written to `report_path` when configured.
    pub fn run(mut self) -> Result<RunReport, ServiceError> {
        let clock = ServiceThread::spawn(Arc::clone(&self.bus), Clock::new(self.config.clock))?;
        let clock_id = clock.id().clone();
        let clock_outcome = clock.join();

        let deadline = self
            .config
            .join_timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        self.wait_for_services(deadline);

        let mut report = self.shutdown_services();
        report.services.push(service_report(&clock_id, clock_outcome));

        if let Some(path) = &self.config.report_path {
            report.write_to(path)?;
        }
        Ok(report)
    }

    /// Terminate every spawned service and wait for all of them.
    pub fn shutdown(mut self) -> RunReport {
        self.shutdown_services()
    }

    fn wait_for_services(&self, deadline: Option<Instant>) {
        let running = self
            .services
            .iter()
            .filter(|service| !service.wait_finished(deadline))
            .count();
        if running > 0 {
            tracing::warn!(running, "services still running after join timeout, terminating");
        }
    }

    fn shutdown_services(&mut self) -> RunReport {
        let services = std::mem::take(&mut self.services);
        for service in &services {
            service.terminate();
        }
        let services = services
            .into_iter()
            .map(|service| {
                let id = service.id().clone();
                service_report(&id, service.join())
            })
            .collect();
        RunReport { services }
    }
}

fn service_report(id: &ServiceId, outcome: Result<ServiceStats, ServiceError>) -> ServiceReport {
    let (stats, error) = match outcome {
        Ok(stats) => (stats, None),
        Err(e) => {
            tracing::error!(service = %id, error = %e, "micro-service failed");
            (ServiceStats::default(), Some(e.to_string()))
        }
    };
    ServiceReport {
        name: id.name().to_string(),
        instance: id.instance(),
        stats,
        error,
    }
}

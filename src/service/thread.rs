//! Worker thread running a micro-service's run loop.
//!
//! `ServiceThread` registers a micro-service with the bus, runs its
//! `initialize` on the caller's thread, then spawns a dedicated thread that
//! waits on the service's mailbox and dispatches each message to the
//! reaction registered for its type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::context::{Context, Dispatch};
use super::error::ServiceError;
use super::id::ServiceId;
use super::micro_service::MicroService;
use crate::bus::{BusError, MessageBus};

/// Statistics from a micro-service's run loop.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Number of messages whose reaction succeeded.
    pub messages_handled: usize,
    /// Number of messages whose reaction returned an error.
    pub messages_failed: usize,
    /// Number of messages with no reaction registered for their type.
    pub messages_unhandled: usize,
}

/// A running micro-service: one dedicated thread per service.
///
/// `initialize` has already run when `spawn` returns, so the service's
/// subscriptions are in place before the caller sends anything.
///
/// ## Example
///
/// ```ignore
/// use std::sync::Arc;
/// use microbus::{MessageBus, ServiceThread};
///
/// let bus = Arc::new(MessageBus::new());
/// let worker = ServiceThread::spawn(bus.clone(), GpuService::new("GPU 1"))?;
///
/// // ... send events to the bus ...
///
/// let stats = worker.stop()?;
/// println!("Handled {} messages", stats.messages_handled);
/// ```
pub struct ServiceThread {
    id: ServiceId,
    bus: Arc<MessageBus>,
    terminated: Arc<AtomicBool>,
    exited: Arc<Exited>,
    handle: Option<JoinHandle<Result<ServiceStats, ServiceError>>>,
}

impl ServiceThread {
    /// Register `service`, run its `initialize`, and start its run loop.
    ///
    /// If initialization fails the service is unregistered again and no
    /// thread is started.
    pub fn spawn<S: MicroService>(
        bus: Arc<MessageBus>,
        mut service: S,
    ) -> Result<Self, ServiceError> {
        let id = ServiceId::new(service.name());
        let terminated = Arc::new(AtomicBool::new(false));

        bus.register(&id)?;
        let mut ctx = Context::new(id.clone(), Arc::clone(&bus), Arc::clone(&terminated));
        if let Err(e) = service.initialize(&mut ctx) {
            tracing::error!(service = %id, error = %e, "initialization failed");
            bus.unregister(&id)?;
            return Err(e);
        }

        let exited = Arc::new(Exited::default());
        let signal = ExitSignal(Arc::clone(&exited));
        let handle = thread::Builder::new().name(id.to_string()).spawn(move || {
            let _signal = signal;
            run(service, ctx)
        });
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                bus.unregister(&id)?;
                return Err(e.into());
            }
        };

        Ok(Self {
            id,
            bus,
            terminated,
            exited,
            handle: Some(handle),
        })
    }

    /// The service's identity on the bus.
    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    /// Whether the run loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Block until the run loop has exited or `deadline` passes.
    ///
    /// Returns whether the loop exited. `None` waits without a deadline.
    pub fn wait_finished(&self, deadline: Option<Instant>) -> bool {
        if self.handle.is_none() {
            return true;
        }
        let mut done = self.exited.done.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            done = match deadline {
                None => self.exited.cv.wait(done).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.exited
                        .cv
                        .wait_timeout(done, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        true
    }

    /// Signal the service to stop without waiting.
    ///
    /// The current reaction, if any, runs to completion; a wait on an empty
    /// mailbox is interrupted.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        // Not registered means the loop already exited.
        let _ = self.bus.interrupt(&self.id);
    }

    /// Wait for the run loop to exit on its own. Returns the statistics.
    pub fn join(mut self) -> Result<ServiceStats, ServiceError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ServiceError::Panicked(self.id.to_string()))?,
            None => Ok(ServiceStats::default()),
        }
    }

    /// Signal the service to stop and wait for it to finish.
    pub fn stop(self) -> Result<ServiceStats, ServiceError> {
        self.terminate();
        self.join()
    }
}

impl Drop for ServiceThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.terminate();
        }
    }
}

#[derive(Default)]
struct Exited {
    done: Mutex<bool>,
    cv: Condvar,
}

/// Marks the worker as exited when dropped, on return or unwind.
struct ExitSignal(Arc<Exited>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        *self.0.done.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.0.cv.notify_all();
    }
}

/// Unregisters the service when dropped, including while a panicking
/// reaction unwinds the worker thread.
struct Registration {
    id: ServiceId,
    bus: Arc<MessageBus>,
    released: bool,
}

impl Registration {
    fn release(&mut self) -> Result<(), BusError> {
        self.released = true;
        self.bus.unregister(&self.id)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if thread::panicking() {
            tracing::error!(service = %self.id, "reaction panicked, unregistering");
        }
        if let Err(e) = self.bus.unregister(&self.id) {
            tracing::error!(service = %self.id, error = %e, "unregister failed");
        }
    }
}

/// The run loop: wait, dispatch, repeat until terminated; then unregister.
fn run<S: MicroService>(mut service: S, mut ctx: Context<S>) -> Result<ServiceStats, ServiceError> {
    let mut registration = Registration {
        id: ctx.id().clone(),
        bus: Arc::clone(ctx.bus()),
        released: false,
    };
    let mut stats = ServiceStats::default();
    tracing::info!(service = %ctx.id(), "micro-service running");

    let outcome = loop {
        if ctx.is_terminated() {
            break Ok(());
        }

        let envelope = match ctx.bus().await_message(ctx.id()) {
            Ok(envelope) => envelope,
            Err(BusError::Interrupted) => {
                ctx.terminate();
                break Ok(());
            }
            Err(e) => break Err(ServiceError::from(e)),
        };

        let kind = envelope.kind();
        match ctx.dispatch(&mut service, envelope) {
            Dispatch::Handled => stats.messages_handled += 1,
            Dispatch::Failed(e) => {
                tracing::warn!(
                    service = %ctx.id(),
                    message = kind.name(),
                    error = %e,
                    "reaction failed"
                );
                stats.messages_failed += 1;
            }
            Dispatch::Unhandled => {
                tracing::error!(
                    service = %ctx.id(),
                    message = kind.name(),
                    "no reaction registered for message type"
                );
                stats.messages_unhandled += 1;
            }
        }
    };

    let unregistered = registration.release();
    tracing::info!(
        service = %ctx.id(),
        handled = stats.messages_handled,
        failed = stats.messages_failed,
        unhandled = stats.messages_unhandled,
        "micro-service terminated"
    );
    outcome?;
    unregistered?;
    Ok(stats)
}

//! Per-service FIFO mailbox with a blocking, interruptible take.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use super::BusError;
use crate::message::Envelope;
use crate::service::ServiceId;

#[derive(Default)]
struct State {
    queue: VecDeque<Envelope>,
    interrupted: bool,
    closed: bool,
}

/// Mailbox owned by exactly one registered micro-service.
///
/// Backed by `Mutex<State>` + `Condvar`. Every wait re-checks its guard, so
/// spurious wakeups never return an empty take.
pub(crate) struct Mailbox {
    state: Mutex<State>,
    ready: Condvar,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Mailbox {
            state: Mutex::new(State::default()),
            ready: Condvar::new(),
        }
    }

    fn state(&self, operation: &'static str) -> Result<MutexGuard<'_, State>, BusError> {
        self.state
            .lock()
            .map_err(|_| BusError::Poisoned(operation))
    }

    /// Append a message and wake the owner if it is waiting.
    pub(crate) fn push(&self, envelope: Envelope) -> Result<(), BusError> {
        let mut state = self.state("mailbox push")?;
        state.queue.push_back(envelope);
        self.ready.notify_all();
        Ok(())
    }

    /// Remove and return the oldest message, blocking while the mailbox is empty.
    ///
    /// Returns `Interrupted` if `interrupt` was called while (or before) the
    /// owner found the mailbox empty, and `NotRegistered` once the mailbox
    /// has been closed by unregistration.
    pub(crate) fn take(&self, owner: &ServiceId) -> Result<Envelope, BusError> {
        let mut state = self.state("await message")?;
        loop {
            if let Some(envelope) = state.queue.pop_front() {
                return Ok(envelope);
            }
            if state.closed {
                return Err(BusError::NotRegistered(owner.clone()));
            }
            if state.interrupted {
                state.interrupted = false;
                return Err(BusError::Interrupted);
            }
            state = self
                .ready
                .wait(state)
                .map_err(|_| BusError::Poisoned("await message"))?;
        }
    }

    /// Wake a blocked `take` with `Interrupted`.
    pub(crate) fn interrupt(&self) -> Result<(), BusError> {
        let mut state = self.state("interrupt")?;
        state.interrupted = true;
        self.ready.notify_all();
        Ok(())
    }

    /// Close the mailbox and hand back whatever was still queued.
    pub(crate) fn close(&self) -> Result<Vec<Envelope>, BusError> {
        let mut state = self.state("unregister")?;
        state.closed = true;
        self.ready.notify_all();
        Ok(state.queue.drain(..).collect())
    }

    pub(crate) fn len(&self) -> Result<usize, BusError> {
        Ok(self.state("mailbox length")?.queue.len())
    }
}

use std::fmt;

use crate::service::ServiceId;

/// Error type for message bus operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The service has no mailbox on this bus (never registered, or unregistered).
    NotRegistered(ServiceId),
    /// A blocking wait was interrupted; the waiting service should shut down.
    Interrupted,
    /// A bus lock was poisoned by a panicking thread. Not recoverable.
    Poisoned(&'static str),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::NotRegistered(id) => {
                write!(f, "micro-service {} is not registered to the message bus", id)
            }
            BusError::Interrupted => write!(f, "wait for message interrupted"),
            BusError::Poisoned(operation) => {
                write!(f, "message bus lock poisoned during {}", operation)
            }
        }
    }
}

impl std::error::Error for BusError {}

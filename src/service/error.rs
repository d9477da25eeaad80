//! Error types for micro-services and their reactions.

use std::error::Error;
use std::fmt;

use crate::bus::BusError;

/// Error type for micro-service lifecycle and reactions.
#[derive(Debug)]
pub enum ServiceError {
    /// A bus operation failed (not registered, interrupted, poisoned).
    Bus(BusError),
    /// A reaction refused the message (validation, invariant violation).
    Rejected(String),
    /// Configuration could not be read or parsed.
    Config(String),
    /// The service's worker thread panicked.
    Panicked(String),
    /// Other error.
    Other(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Bus(e) => write!(f, "bus error: {}", e),
            ServiceError::Rejected(msg) => write!(f, "rejected: {}", msg),
            ServiceError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            ServiceError::Panicked(name) => write!(f, "micro-service {} panicked", name),
            ServiceError::Other(e) => write!(f, "service error: {}", e),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ServiceError::Bus(e) => Some(e),
            ServiceError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<BusError> for ServiceError {
    fn from(err: BusError) -> Self {
        ServiceError::Bus(err)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Config(err.to_string())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Other(Box::new(err))
    }
}

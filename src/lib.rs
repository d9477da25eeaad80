//! microbus: an in-process, typed message bus for thread-per-service actors.
//!
//! Micro-services never hold references to each other. They exchange two
//! kinds of messages through a shared [`MessageBus`]:
//!
//! - **Events** are routed round-robin to exactly one subscriber of their
//!   type; the sender gets a [`Future`] the handler resolves.
//! - **Broadcasts** are delivered to every current subscriber of their type.
//!
//! Each [`MicroService`] runs on its own thread ([`ServiceThread`]), blocking
//! on its mailbox and dispatching messages to the reactions it subscribed in
//! `initialize`. A [`Clock`] and a [`Runtime`] host cover the usual system
//! bootstrap: start services, start the clock last, collect a report.

mod bus;
mod clock;
mod future;
mod message;
mod runtime;
mod service;

pub use bus::{BusError, MessageBus};
pub use clock::{Clock, ClockConfig, Terminate, Tick};
pub use future::Future;
pub use message::{Broadcast, Delivered, Envelope, Event, EventId, MessageKind};
pub use runtime::{RunReport, Runtime, RuntimeConfig, ServiceReport};
pub use service::{Context, MicroService, ServiceError, ServiceId, ServiceStats, ServiceThread};

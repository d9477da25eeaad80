//! Micro-services: actors running on top of the message bus.
//!
//! A micro-service is a plain struct implementing [`MicroService`]. Its
//! lifecycle is `Created → Initializing → Running → Terminated`:
//!
//! 1. [`ServiceThread::spawn`] registers it with the bus and calls
//!    `initialize`, where it subscribes reactions through its [`Context`].
//! 2. A dedicated thread then loops: block on the mailbox, dispatch the
//!    message to the reaction registered for its type.
//! 3. `Context::terminate` (from a reaction) or `ServiceThread::terminate`
//!    (from outside) ends the loop; the service is unregistered on exit.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use microbus::{Context, Event, MessageBus, MicroService, ServiceError, ServiceThread};
//!
//! struct Ping;
//! impl Event for Ping {
//!     type Output = String;
//! }
//!
//! struct Ponger;
//!
//! impl MicroService for Ponger {
//!     fn name(&self) -> &str {
//!         "ponger"
//!     }
//!
//!     fn initialize(&mut self, ctx: &mut Context<Self>) -> Result<(), ServiceError> {
//!         ctx.subscribe_event::<Ping, _>(|_, ctx, ping| {
//!             ctx.complete(&ping, "pong".to_string())?;
//!             Ok(())
//!         })?;
//!         Ok(())
//!     }
//! }
//!
//! let bus = Arc::new(MessageBus::new());
//! let ponger = ServiceThread::spawn(bus.clone(), Ponger).unwrap();
//!
//! let future = bus.send_event(Ping).unwrap().expect("ponger subscribes to Ping");
//! assert_eq!(future.get_timeout(Duration::from_secs(5)).as_deref(), Some("pong"));
//!
//! ponger.stop().unwrap();
//! ```

mod context;
mod error;
mod id;
mod micro_service;
mod thread;

pub use context::Context;
pub use error::ServiceError;
pub use id::ServiceId;
pub use micro_service::MicroService;
pub use thread::{ServiceStats, ServiceThread};

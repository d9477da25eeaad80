//! Message Bus: in-process routing between micro-services.
//!
//! The bus owns one mailbox per registered micro-service and routes
//! messages into them:
//!
//! ```text
//! ┌──────────────┐  send_event(e)        ┌──────────────────────────────┐
//! │ micro-service│ ────────────────────▶ │ ring[E]: A ▸ B ▸ C (rotates) │ ──▶ mailbox of A
//! │   (sender)   │ ◀──── Future<T> ───── └──────────────────────────────┘
//! │              │  send_broadcast(b)    ┌──────────────────────────────┐ ──▶ mailbox of A
//! │              │ ────────────────────▶ │ set[B]: {A, C, D}            │ ──▶ mailbox of C
//! └──────────────┘                       └──────────────────────────────┘ ──▶ mailbox of D
//! ```
//!
//! - Events go to exactly one subscriber, chosen round-robin per event type.
//!   The handler resolves the sender's future with `complete`.
//! - Broadcasts go to every current subscriber of their type.
//! - `await_message` blocks the owning service until its mailbox is
//!   non-empty, and can be interrupted for shutdown.
//!
//! Events and broadcasts are both messages; the distinction is in how
//! they are routed. `send_event` = point-to-point, `send_broadcast` = fan-out.

mod bus;
mod error;
mod mailbox;

pub use bus::MessageBus;
pub use error::BusError;

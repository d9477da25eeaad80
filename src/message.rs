//! Message taxonomy: events and broadcasts.
//!
//! Two kinds of messages travel over the bus:
//!
//! - [`Event`]: point-to-point. Exactly one subscriber handles each instance
//!   and reports a result of the declared `Output` type through a [`Future`].
//! - [`Broadcast`]: fan-out. Every current subscriber receives the instance.
//!   No result.
//!
//! Both are plain Rust types; the bus keys routing by their `TypeId`.
//!
//! ## Defining messages
//!
//! ```
//! use microbus::{Broadcast, Event};
//!
//! /// Ask a worker to train a model, answered with the final accuracy.
//! pub struct TrainModel {
//!     pub model: String,
//! }
//!
//! impl Event for TrainModel {
//!     type Output = f64;
//! }
//!
//! /// Published once per clock tick.
//! pub struct Tick(pub u64);
//!
//! impl Broadcast for Tick {}
//! ```
//!
//! [`Future`]: crate::Future

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A point-to-point message that expects a result of type `Output`.
pub trait Event: Send + 'static {
    /// The value the handling service reports through `complete`.
    type Output: Clone + Send + 'static;
}

/// A fan-out message delivered to every subscriber.
///
/// One instance is shared between all subscriber mailboxes, hence `Sync`.
pub trait Broadcast: Send + Sync + 'static {}

/// Identity of one routed event instance, stamped by the bus on send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event-{}", self.0)
    }
}

/// The discriminator the bus routes on: a message type's `TypeId` plus its
/// readable name.
#[derive(Debug, Clone, Copy)]
pub struct MessageKind {
    id: TypeId,
    name: &'static str,
}

impl MessageKind {
    /// The kind of message type `M`.
    pub fn of<M: 'static>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            name: type_name::<M>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for MessageKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageKind {}

impl std::hash::Hash for MessageKind {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

enum Payload {
    Event {
        id: EventId,
        body: Box<dyn Any + Send>,
    },
    Broadcast(Arc<dyn Any + Send + Sync>),
}

/// A message sitting in (or taken from) a service mailbox.
pub struct Envelope {
    kind: MessageKind,
    payload: Payload,
}

impl Envelope {
    pub(crate) fn event<E: Event>(id: EventId, event: E) -> Self {
        Self {
            kind: MessageKind::of::<E>(),
            payload: Payload::Event {
                id,
                body: Box::new(event),
            },
        }
    }

    pub(crate) fn broadcast(kind: MessageKind, body: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            kind,
            payload: Payload::Broadcast(body),
        }
    }

    /// The runtime type of the carried message.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn is_event(&self) -> bool {
        matches!(self.payload, Payload::Event { .. })
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self.payload, Payload::Broadcast(_))
    }

    /// The bus-assigned id, for events.
    pub fn event_id(&self) -> Option<EventId> {
        match &self.payload {
            Payload::Event { id, .. } => Some(*id),
            Payload::Broadcast(_) => None,
        }
    }

    /// Take the event out of the envelope if it carries an `E`.
    ///
    /// On a type mismatch the envelope is handed back unchanged.
    pub fn into_event<E: Event>(self) -> Result<Delivered<E>, Envelope> {
        match self.payload {
            Payload::Event { id, body } => match body.downcast::<E>() {
                Ok(event) => Ok(Delivered { id, event: *event }),
                Err(body) => Err(Envelope {
                    kind: self.kind,
                    payload: Payload::Event { id, body },
                }),
            },
            payload => Err(Envelope {
                kind: self.kind,
                payload,
            }),
        }
    }

    /// Borrow the broadcast if this envelope carries a `B`.
    pub fn broadcast_ref<B: Broadcast>(&self) -> Option<&B> {
        match &self.payload {
            Payload::Broadcast(body) => body.downcast_ref::<B>(),
            Payload::Event { .. } => None,
        }
    }

    /// Shared handle to the broadcast if this envelope carries a `B`.
    pub fn into_broadcast<B: Broadcast>(self) -> Option<Arc<B>> {
        match self.payload {
            Payload::Broadcast(body) => body.downcast::<B>().ok(),
            Payload::Event { .. } => None,
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Envelope");
        s.field("kind", &self.kind.name());
        if let Some(id) = self.event_id() {
            s.field("event_id", &id);
        }
        s.finish()
    }
}

/// An event as received by its handler: the value plus its bus identity.
///
/// Pass it back to `complete` to resolve the sender's future.
pub struct Delivered<E> {
    id: EventId,
    event: E,
}

impl<E> Delivered<E> {
    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn into_inner(self) -> E {
        self.event
    }
}

impl<E> Deref for Delivered<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.event
    }
}

impl<E: fmt::Debug> fmt::Debug for Delivered<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivered")
            .field("id", &self.id)
            .field("event", &self.event)
            .finish()
    }
}

//! Context handed to a micro-service's `initialize` and to every reaction.
//!
//! Carries the service identity, the shared bus, the termination flag and
//! the subscription table mapping message kinds to reactions. Sending,
//! broadcasting and completing are thin delegations to the bus.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::ServiceError;
use super::id::ServiceId;
use crate::bus::{BusError, MessageBus};
use crate::future::Future;
use crate::message::{Broadcast, Delivered, Envelope, Event};

type Reaction<S> =
    Arc<dyn Fn(&mut S, &mut Context<S>, Envelope) -> Result<(), ServiceError> + Send + Sync>;

/// Outcome of dispatching one mailbox message.
#[derive(Debug)]
pub(crate) enum Dispatch {
    Handled,
    Failed(ServiceError),
    /// No reaction registered for the message's type.
    Unhandled,
}

/// The context passed to `MicroService::initialize` and to every reaction.
///
/// Generic over `S`, the concrete service, so reactions get `&mut S` and
/// keep their state on the service itself.
///
/// ## Example
///
/// ```ignore
/// fn initialize(&mut self, ctx: &mut Context<Self>) -> Result<(), ServiceError> {
///     ctx.subscribe_event::<TrainModel, _>(|gpu, ctx, job| {
///         let accuracy = gpu.train(&job.model);
///         ctx.complete(&job, accuracy)?;
///         Ok(())
///     })?;
///     ctx.terminate_on::<Terminate>()?;
///     Ok(())
/// }
/// ```
pub struct Context<S> {
    id: ServiceId,
    bus: Arc<MessageBus>,
    terminated: Arc<AtomicBool>,
    reactions: HashMap<TypeId, Reaction<S>>,
}

impl<S: 'static> Context<S> {
    pub(crate) fn new(id: ServiceId, bus: Arc<MessageBus>, terminated: Arc<AtomicBool>) -> Self {
        Self {
            id,
            bus,
            terminated,
            reactions: HashMap::new(),
        }
    }

    /// This service's identity on the bus.
    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    /// The bus this service is registered to.
    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Subscribe to event type `E` and register the reaction that handles it.
    ///
    /// The reaction is expected to `complete` the delivered event.
    pub fn subscribe_event<E, F>(&mut self, reaction: F) -> Result<(), BusError>
    where
        E: Event,
        F: Fn(&mut S, &mut Context<S>, Delivered<E>) -> Result<(), ServiceError>
            + Send
            + Sync
            + 'static,
    {
        self.bus.subscribe_event::<E>(&self.id)?;
        let boxed: Reaction<S> = Arc::new(
            move |service: &mut S, ctx: &mut Context<S>, envelope: Envelope| {
                match envelope.into_event::<E>() {
                    Ok(delivered) => reaction(service, ctx, delivered),
                    Err(envelope) => Err(mismatch::<E>(&envelope)),
                }
            },
        );
        self.reactions.insert(TypeId::of::<E>(), boxed);
        Ok(())
    }

    /// Subscribe to broadcast type `B` and register the reaction that handles it.
    pub fn subscribe_broadcast<B, F>(&mut self, reaction: F) -> Result<(), BusError>
    where
        B: Broadcast,
        F: Fn(&mut S, &mut Context<S>, &B) -> Result<(), ServiceError> + Send + Sync + 'static,
    {
        self.bus.subscribe_broadcast::<B>(&self.id)?;
        let boxed: Reaction<S> = Arc::new(
            move |service: &mut S, ctx: &mut Context<S>, envelope: Envelope| {
                match envelope.broadcast_ref::<B>() {
                    Some(broadcast) => reaction(service, ctx, broadcast),
                    None => Err(mismatch::<B>(&envelope)),
                }
            },
        );
        self.reactions.insert(TypeId::of::<B>(), boxed);
        Ok(())
    }

    /// Terminate this service when a broadcast of type `B` arrives.
    pub fn terminate_on<B: Broadcast>(&mut self) -> Result<(), BusError> {
        self.subscribe_broadcast::<B, _>(|_, ctx, _| {
            ctx.terminate();
            Ok(())
        })
    }

    // ========================================================================
    // Delegations to the bus
    // ========================================================================

    /// Send an event; `None` means nobody subscribes to `E`.
    pub fn send_event<E: Event>(&self, event: E) -> Result<Option<Future<E::Output>>, BusError> {
        self.bus.send_event(event)
    }

    /// Send a broadcast; returns the number of recipients.
    pub fn send_broadcast<B: Broadcast>(&self, broadcast: B) -> Result<usize, BusError> {
        self.bus.send_broadcast(broadcast)
    }

    /// Resolve the sender's future for a delivered event.
    pub fn complete<E: Event>(
        &self,
        event: &Delivered<E>,
        result: E::Output,
    ) -> Result<bool, BusError> {
        self.bus.complete(event, result)
    }

    // ========================================================================
    // Termination
    // ========================================================================

    /// Ask the run loop to stop once the current message is processed.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Invoke the reaction registered for the envelope's runtime type.
    pub(crate) fn dispatch(&mut self, service: &mut S, envelope: Envelope) -> Dispatch {
        let Some(reaction) = self.reactions.get(&envelope.kind().type_id()).cloned() else {
            return Dispatch::Unhandled;
        };
        match reaction(service, self, envelope) {
            Ok(()) => Dispatch::Handled,
            Err(e) => Dispatch::Failed(e),
        }
    }
}

fn mismatch<M: 'static>(envelope: &Envelope) -> ServiceError {
    ServiceError::Rejected(format!(
        "reaction for {} received {}",
        std::any::type_name::<M>(),
        envelope.kind()
    ))
}

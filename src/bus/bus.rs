//! MessageBus: registration, subscription, routing and mailbox consumption.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::mailbox::Mailbox;
use super::BusError;
use crate::future::Future;
use crate::message::{Broadcast, Delivered, Envelope, Event, EventId, MessageKind};
use crate::service::ServiceId;

/// A future recorded for an in-flight event, with the service it was routed to.
struct Pending {
    future: Box<dyn Any + Send>,
    handler: ServiceId,
}

#[derive(Default)]
struct Tables {
    mailboxes: HashMap<ServiceId, Arc<Mailbox>>,
    /// Round-robin rings: the front is the next service to receive.
    events: HashMap<MessageKind, VecDeque<ServiceId>>,
    broadcasts: HashMap<MessageKind, Vec<ServiceId>>,
    futures: HashMap<EventId, Pending>,
}

/// In-process message bus shared by every micro-service of a system.
///
/// All routing tables sit behind one lock, so each public operation is
/// atomic with respect to the others: a send rotates its ring and enqueues
/// in the same critical section an unregister would need. Mailboxes carry
/// their own lock; `await_message` waits on the mailbox only, never while
/// holding the routing tables. Lock order is always tables, then mailbox.
///
/// Share it between services as `Arc<MessageBus>`. Separate instances are
/// fully independent.
///
/// ## Example
///
/// ```
/// use microbus::{Event, MessageBus, ServiceId};
///
/// struct Ping;
/// impl Event for Ping {
///     type Output = &'static str;
/// }
///
/// let bus = MessageBus::new();
/// let worker = ServiceId::new("worker");
/// bus.register(&worker).unwrap();
/// bus.subscribe_event::<Ping>(&worker).unwrap();
///
/// let future = bus.send_event(Ping).unwrap().expect("one subscriber");
///
/// let ping = bus.await_message(&worker).unwrap().into_event::<Ping>().unwrap();
/// bus.complete(&ping, "pong").unwrap();
/// assert_eq!(future.get(), "pong");
/// ```
pub struct MessageBus {
    tables: Mutex<Tables>,
    next_event: AtomicU64,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            next_event: AtomicU64::new(1),
        }
    }

    fn tables(&self, operation: &'static str) -> Result<MutexGuard<'_, Tables>, BusError> {
        self.tables
            .lock()
            .map_err(|_| BusError::Poisoned(operation))
    }

    fn mailbox(&self, id: &ServiceId, operation: &'static str) -> Result<Arc<Mailbox>, BusError> {
        self.tables(operation)?
            .mailboxes
            .get(id)
            .cloned()
            .ok_or_else(|| BusError::NotRegistered(id.clone()))
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Allocate an empty mailbox for `id`. No-op if already registered.
    pub fn register(&self, id: &ServiceId) -> Result<(), BusError> {
        let mut tables = self.tables("register")?;
        if !tables.mailboxes.contains_key(id) {
            tables.mailboxes.insert(id.clone(), Arc::new(Mailbox::new()));
            tracing::debug!(service = %id, "registered");
        }
        Ok(())
    }

    /// Remove `id`'s mailbox and purge it from every ring and set.
    ///
    /// Messages still queued in the mailbox are dropped, and the futures of
    /// events among them are forgotten (they stay unresolved). A service
    /// blocked in `await_message` wakes with `NotRegistered`. No-op if `id`
    /// is not registered.
    pub fn unregister(&self, id: &ServiceId) -> Result<(), BusError> {
        let mut tables = self.tables("unregister")?;
        let Some(mailbox) = tables.mailboxes.remove(id) else {
            return Ok(());
        };

        for ring in tables.events.values_mut() {
            ring.retain(|member| member != id);
        }
        for set in tables.broadcasts.values_mut() {
            set.retain(|member| member != id);
        }
        tables.futures.retain(|_, pending| pending.handler != *id);

        let stranded = mailbox.close()?;
        if stranded.is_empty() {
            tracing::debug!(service = %id, "unregistered");
        } else {
            tracing::warn!(
                service = %id,
                dropped = stranded.len(),
                "unregistered with unconsumed messages; dropping them"
            );
        }
        Ok(())
    }

    // ========================================================================
    // Subscription
    // ========================================================================

    /// Append `id` to the round-robin ring of event type `E`.
    pub fn subscribe_event<E: Event>(&self, id: &ServiceId) -> Result<(), BusError> {
        let kind = MessageKind::of::<E>();
        let mut tables = self.tables("subscribe event")?;
        if !tables.mailboxes.contains_key(id) {
            return Err(BusError::NotRegistered(id.clone()));
        }
        let ring = tables.events.entry(kind).or_default();
        if !ring.contains(id) {
            ring.push_back(id.clone());
            tracing::debug!(service = %id, event = kind.name(), "subscribed to event");
        }
        Ok(())
    }

    /// Add `id` to the fan-out set of broadcast type `B`.
    pub fn subscribe_broadcast<B: Broadcast>(&self, id: &ServiceId) -> Result<(), BusError> {
        let kind = MessageKind::of::<B>();
        let mut tables = self.tables("subscribe broadcast")?;
        if !tables.mailboxes.contains_key(id) {
            return Err(BusError::NotRegistered(id.clone()));
        }
        let set = tables.broadcasts.entry(kind).or_default();
        if !set.contains(id) {
            set.push(id.clone());
            tracing::debug!(service = %id, broadcast = kind.name(), "subscribed to broadcast");
        }
        Ok(())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn is_registered(&self, id: &ServiceId) -> bool {
        self.tables("is registered")
            .map(|tables| tables.mailboxes.contains_key(id))
            .unwrap_or(false)
    }

    pub fn is_subscribed_event<E: Event>(&self, id: &ServiceId) -> bool {
        self.tables("is subscribed event")
            .map(|tables| {
                tables
                    .events
                    .get(&MessageKind::of::<E>())
                    .is_some_and(|ring| ring.contains(id))
            })
            .unwrap_or(false)
    }

    pub fn is_subscribed_broadcast<B: Broadcast>(&self, id: &ServiceId) -> bool {
        self.tables("is subscribed broadcast")
            .map(|tables| {
                tables
                    .broadcasts
                    .get(&MessageKind::of::<B>())
                    .is_some_and(|set| set.contains(id))
            })
            .unwrap_or(false)
    }

    /// Number of messages waiting in `id`'s mailbox, if registered.
    pub fn mailbox_len(&self, id: &ServiceId) -> Option<usize> {
        self.mailbox(id, "mailbox length").ok()?.len().ok()
    }

    /// Number of routed events whose futures have not been completed yet.
    pub fn pending_futures(&self) -> usize {
        self.tables("pending futures")
            .map(|tables| tables.futures.len())
            .unwrap_or(0)
    }

    /// The future recorded for an in-flight event of type `E`.
    ///
    /// Keyed by the id the handler sees on [`Delivered::id`] or
    /// [`Envelope::event_id`]; senders already hold the future returned by
    /// `send_event`. `None` if no such event was routed, or it has already
    /// been completed.
    pub fn get_future<E: Event>(&self, id: EventId) -> Option<Future<E::Output>> {
        let tables = self.tables("get future").ok()?;
        tables
            .futures
            .get(&id)?
            .future
            .downcast_ref::<Future<E::Output>>()
            .cloned()
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Route `event` to the next subscriber of its type, round-robin.
    ///
    /// Returns `Ok(None)` if nobody subscribes to `E`; nothing is enqueued
    /// in that case. Otherwise returns the future the handler will resolve.
    /// Never waits for the event to be handled.
    pub fn send_event<E: Event>(&self, event: E) -> Result<Option<Future<E::Output>>, BusError> {
        let kind = MessageKind::of::<E>();
        let mut tables = self.tables("send event")?;

        let Some(target) = tables.events.get_mut(&kind).and_then(|ring| {
            let target = ring.pop_front()?;
            ring.push_back(target.clone());
            Some(target)
        }) else {
            tracing::debug!(event = kind.name(), "no subscriber; event not delivered");
            return Ok(None);
        };

        let mailbox = tables
            .mailboxes
            .get(&target)
            .cloned()
            .ok_or_else(|| BusError::NotRegistered(target.clone()))?;

        let id = EventId(self.next_event.fetch_add(1, Ordering::Relaxed));
        let future = Future::new();
        mailbox.push(Envelope::event(id, event))?;
        tables.futures.insert(
            id,
            Pending {
                future: Box::new(future.clone()),
                handler: target,
            },
        );
        Ok(Some(future))
    }

    /// Deliver `broadcast` to every current subscriber of its type.
    ///
    /// Returns the number of mailboxes it was placed in.
    pub fn send_broadcast<B: Broadcast>(&self, broadcast: B) -> Result<usize, BusError> {
        let kind = MessageKind::of::<B>();
        let tables = self.tables("send broadcast")?;
        let Some(set) = tables.broadcasts.get(&kind) else {
            return Ok(0);
        };

        let shared: Arc<dyn Any + Send + Sync> = Arc::new(broadcast);
        let mut delivered = 0;
        for member in set {
            if let Some(mailbox) = tables.mailboxes.get(member) {
                mailbox.push(Envelope::broadcast(kind, Arc::clone(&shared)))?;
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Resolve the future of a delivered event with `result`.
    ///
    /// Returns `true` if this call resolved it. Completing an event twice,
    /// or one whose future was dropped by unregistration, is a no-op.
    pub fn complete<E: Event>(
        &self,
        event: &Delivered<E>,
        result: E::Output,
    ) -> Result<bool, BusError> {
        let pending = self.tables("complete")?.futures.remove(&event.id());
        let resolved = pending
            .and_then(|pending| pending.future.downcast::<Future<E::Output>>().ok())
            .is_some_and(|future| future.resolve(result));
        Ok(resolved)
    }

    // ========================================================================
    // Consumption
    // ========================================================================

    /// Block until `id`'s mailbox holds a message, then take the oldest.
    ///
    /// Fails with `NotRegistered` if `id` has no mailbox (or loses it while
    /// waiting), and with `Interrupted` after `interrupt(id)`.
    pub fn await_message(&self, id: &ServiceId) -> Result<Envelope, BusError> {
        // The tables guard is released here; only the mailbox is waited on.
        let mailbox = self.mailbox(id, "await message")?;
        mailbox.take(id)
    }

    /// Interrupt `id`'s pending (or next) blocking wait on an empty mailbox.
    pub fn interrupt(&self, id: &ServiceId) -> Result<(), BusError> {
        self.mailbox(id, "interrupt")?.interrupt()
    }
}

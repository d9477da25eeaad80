use super::context::Context;
use super::error::ServiceError;

/// An actor that communicates with other services only through the bus.
///
/// Implementors declare their subscriptions (and may send initial
/// messages) in `initialize`. The worker started by
/// [`ServiceThread::spawn`](super::ServiceThread::spawn) then feeds every
/// mailbox message to the reaction registered for its type, until the
/// service is terminated.
///
/// ## Example
///
/// ```
/// use microbus::{Broadcast, Context, MicroService, ServiceError};
///
/// struct Tick(u64);
/// impl Broadcast for Tick {}
///
/// struct Shutdown;
/// impl Broadcast for Shutdown {}
///
/// #[derive(Default)]
/// struct TickCounter {
///     seen: u64,
/// }
///
/// impl MicroService for TickCounter {
///     fn name(&self) -> &str {
///         "tick-counter"
///     }
///
///     fn initialize(&mut self, ctx: &mut Context<Self>) -> Result<(), ServiceError> {
///         ctx.subscribe_broadcast::<Tick, _>(|counter, _, tick| {
///             counter.seen = tick.0;
///             Ok(())
///         })?;
///         ctx.terminate_on::<Shutdown>()?;
///         Ok(())
///     }
/// }
/// ```
pub trait MicroService: Send + Sized + 'static {
    /// Diagnostic name; the bus identity is derived from it.
    fn name(&self) -> &str;

    /// Declare subscriptions and send initial messages.
    ///
    /// Runs once, after registration and before the run loop starts.
    fn initialize(&mut self, ctx: &mut Context<Self>) -> Result<(), ServiceError>;
}

//! Clock: the system time source.
//!
//! The clock is an ordinary micro-service. It broadcasts [`Tick`] number 1
//! from `initialize`, then reacts to its own ticks: wait `tick_ms`, broadcast
//! the next one. After tick `duration` it broadcasts [`Terminate`] and stops.
//! Services that should run for the lifetime of the clock subscribe with
//! `ctx.terminate_on::<Terminate>()`.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::message::Broadcast;
use crate::service::{Context, MicroService, ServiceError};

/// One clock tick, numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub tick: u64,
}

impl Broadcast for Tick {}

/// The clock ran out of ticks; the system is shutting down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terminate;

impl Broadcast for Terminate {}

/// Clock configuration.
///
/// ```
/// use microbus::ClockConfig;
///
/// let config: ClockConfig = serde_json::from_str(r#"{ "tick_ms": 5, "duration": 20 }"#).unwrap();
/// assert_eq!(config.duration, 20);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Milliseconds between two ticks.
    pub tick_ms: u64,
    /// Number of ticks before `Terminate` is broadcast.
    pub duration: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1,
            duration: 50,
        }
    }
}

/// Micro-service broadcasting `Tick`s, then `Terminate`.
#[derive(Debug)]
pub struct Clock {
    config: ClockConfig,
    current: u64,
}

impl Clock {
    pub fn new(config: ClockConfig) -> Self {
        Self { config, current: 0 }
    }

    /// The last tick broadcast.
    pub fn current_tick(&self) -> u64 {
        self.current
    }

    pub fn is_time_over(&self) -> bool {
        self.current >= self.config.duration
    }

    fn advance(&mut self, ctx: &mut Context<Self>) -> Result<(), ServiceError> {
        if self.is_time_over() {
            let notified = ctx.send_broadcast(Terminate)?;
            tracing::info!(ticks = self.current, notified, "clock finished");
            ctx.terminate();
            return Ok(());
        }
        if self.current > 0 {
            thread::sleep(Duration::from_millis(self.config.tick_ms));
        }
        self.current += 1;
        ctx.send_broadcast(Tick { tick: self.current })?;
        Ok(())
    }
}

impl MicroService for Clock {
    fn name(&self) -> &str {
        "clock"
    }

    fn initialize(&mut self, ctx: &mut Context<Self>) -> Result<(), ServiceError> {
        ctx.subscribe_broadcast::<Tick, _>(|clock, ctx, _| clock.advance(ctx))?;
        self.advance(ctx)
    }
}

//! Sequencer transport capability.
//!
//! A [`Transport`] owns the bus connection and the virtual ports. It hands
//! inbound traffic to a [`PortHooks`] implementation one item at a time, and
//! gives the hooks an [`Outlet`] so they can re-emit events on the same ports.

use crate::address::Address;
use crate::error::{Error, Result};
use crate::event::SeqEvent;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Identifier of a port created by [`Transport::attach_port`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId(pub u32);

impl std::fmt::Display for PortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription direction, seen from our port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Somebody reads from us (we are the sender).
    Read,
    /// Somebody writes to us (we are the destination).
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortCaps {
    pub readable: bool,
    pub writable: bool,
}

impl PortCaps {
    pub const INPUT: Self = Self {
        readable: false,
        writable: true,
    };
    pub const DUPLEX: Self = Self {
        readable: true,
        writable: true,
    };
}

/// Subscription lifecycle signals delivered alongside events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    ReadSubscribed,
    ReadUnsubscribed,
    WriteUsed,
    WriteUnused,
}

impl Lifecycle {
    pub fn direction(self) -> Direction {
        match self {
            Lifecycle::ReadSubscribed | Lifecycle::ReadUnsubscribed => Direction::Read,
            Lifecycle::WriteUsed | Lifecycle::WriteUnused => Direction::Write,
        }
    }
}

/// One delivery from the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event { port: PortId, event: SeqEvent },
    Lifecycle { port: PortId, signal: Lifecycle },
}

/// The send half of a transport, handed to hooks during dispatch.
pub trait Outlet {
    /// Queues `event` on `port`. With `immediate`, the output buffer is
    /// flushed right away.
    fn send(&mut self, port: PortId, event: &SeqEvent, immediate: bool) -> Result<()>;

    fn flush(&mut self, port: PortId) -> Result<()>;

    /// Current number of subscriptions on `port` in `direction`.
    fn subscriber_count(&self, port: PortId, direction: Direction) -> usize;
}

/// Callbacks invoked by [`Transport::dispatch`]. Subscription counts are
/// already updated when a lifecycle hook runs.
pub trait PortHooks {
    fn on_read_subscribed(&mut self, _port: PortId, _out: &mut dyn Outlet) {}

    fn on_read_unsubscribed(&mut self, _port: PortId, _out: &mut dyn Outlet) {}

    fn on_write_used(&mut self, _port: PortId, _out: &mut dyn Outlet) {}

    fn on_write_unused(&mut self, _port: PortId, _out: &mut dyn Outlet) {}

    fn on_event(&mut self, port: PortId, event: &SeqEvent, out: &mut dyn Outlet);
}

pub trait Transport: Outlet + Send {
    fn client_id(&self) -> i32;

    fn attach_port(&mut self, name: &str, caps: PortCaps) -> Result<PortId>;

    /// Subscribes `port` to traffic coming from `addr`.
    fn connect_from(&mut self, port: PortId, addr: Address) -> Result<()>;

    /// Subscribes `addr` to traffic sent from `port`.
    fn connect_to(&mut self, port: PortId, addr: Address) -> Result<()>;

    /// Waits up to `timeout` for the next delivery.
    ///
    /// Returns `Err(Error::Closed)` once the transport can never deliver again.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Inbound>>;

    /// Flushes the output buffers of every port.
    fn drain_output(&mut self) -> Result<()>;

    /// Delivers at most one inbound item to `hooks`, then drains output.
    /// Returns whether anything was delivered.
    ///
    /// A failed drain is logged and does not fail the delivery. Only
    /// `Error::Closed` is passed on.
    fn dispatch(&mut self, hooks: &mut dyn PortHooks, timeout: Duration) -> Result<bool>
    where
        Self: Sized,
    {
        let Some(inbound) = self.receive(timeout)? else {
            return Ok(false);
        };
        match inbound {
            Inbound::Event { port, event } => hooks.on_event(port, &event, self),
            Inbound::Lifecycle { port, signal } => match signal {
                Lifecycle::ReadSubscribed => hooks.on_read_subscribed(port, self),
                Lifecycle::ReadUnsubscribed => hooks.on_read_unsubscribed(port, self),
                Lifecycle::WriteUsed => hooks.on_write_used(port, self),
                Lifecycle::WriteUnused => hooks.on_write_unused(port, self),
            },
        }
        self.drain_output_logged()?;
        Ok(true)
    }

    /// [`drain_output`](Self::drain_output), with every error except
    /// `Error::Closed` logged at `warn` and swallowed.
    fn drain_output_logged(&mut self) -> Result<()> {
        match self.drain_output() {
            Err(Error::Closed) => Err(Error::Closed),
            Err(e) => {
                warn!("Output drain failed: {}", e);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// Delivers everything that is ready without blocking.
    fn dispatch_pending(&mut self, hooks: &mut dyn PortHooks) -> Result<usize>
    where
        Self: Sized,
    {
        let mut delivered = 0;
        while self.dispatch(hooks, Duration::ZERO)? {
            delivered += 1;
        }
        Ok(delivered)
    }
}

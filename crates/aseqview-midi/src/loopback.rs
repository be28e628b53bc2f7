//! In-memory transport for embedding and tests.
//!
//! [`LoopbackTransport`] behaves like a sequencer client with an output
//! buffer: non-immediate sends stay pending until a flush. A cloneable
//! [`LoopbackHandle`] plays the rest of the bus, injecting events and
//! subscription changes and observing what reached the wire.
//!
//! The wire log keeps every flushed event until [`LoopbackHandle::take_wire`]
//! empties it. Long-running embedders must call it periodically.

use crate::address::Address;
use crate::error::{Error, Result};
use crate::event::SeqEvent;
use crate::port::PortTable;
use crate::transport::{Direction, Inbound, Lifecycle, Outlet, PortCaps, PortId, Transport};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CAPACITY: usize = 1024;

/// First client number handed out to user clients by the system sequencer.
const LOOPBACK_CLIENT_ID: i32 = 128;

/// An event that left the output buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct SentEvent {
    pub port: PortId,
    pub event: SeqEvent,
    pub immediate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    From { port: PortId, addr: Address },
    To { port: PortId, addr: Address },
}

#[derive(Default)]
struct Shared {
    ports: PortTable,
    wire: Vec<SentEvent>,
    connections: Vec<Connection>,
}

pub struct LoopbackTransport {
    duplex: bool,
    shared: Arc<Mutex<Shared>>,
    inbound_tx: Sender<Inbound>,
    inbound_rx: Receiver<Inbound>,
    closed: Arc<AtomicBool>,
    pending: Vec<(PortId, SeqEvent)>,
}

impl LoopbackTransport {
    /// Opens a client; without `duplex` every send fails with `OutputDisabled`.
    pub fn open(duplex: bool) -> Self {
        Self::with_capacity(duplex, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(duplex: bool, capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = bounded(capacity);
        tracing::debug!("Opened loopback client (duplex: {})", duplex);
        Self {
            duplex,
            shared: Arc::new(Mutex::new(Shared::default())),
            inbound_tx,
            inbound_rx,
            closed: Arc::new(AtomicBool::new(false)),
            pending: Vec::new(),
        }
    }

    pub fn handle(&self) -> LoopbackHandle {
        LoopbackHandle {
            inbound_tx: self.inbound_tx.clone(),
            shared: Arc::clone(&self.shared),
            closed: Arc::clone(&self.closed),
        }
    }

    pub fn is_duplex(&self) -> bool {
        self.duplex
    }

    fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut shared = self.shared.lock();
        for (port, event) in self.pending.drain(..) {
            shared.wire.push(SentEvent {
                port,
                event,
                immediate: false,
            });
        }
    }
}

impl Outlet for LoopbackTransport {
    fn send(&mut self, port: PortId, event: &SeqEvent, immediate: bool) -> Result<()> {
        if !self.duplex {
            return Err(Error::OutputDisabled);
        }
        self.shared.lock().ports.require(port)?;

        if immediate {
            self.flush_pending();
            self.shared.lock().wire.push(SentEvent {
                port,
                event: event.clone(),
                immediate: true,
            });
        } else {
            self.pending.push((port, event.clone()));
        }
        Ok(())
    }

    fn flush(&mut self, port: PortId) -> Result<()> {
        self.shared.lock().ports.require(port)?;
        self.flush_pending();
        Ok(())
    }

    fn subscriber_count(&self, port: PortId, direction: Direction) -> usize {
        self.shared.lock().ports.subscriber_count(port, direction)
    }
}

impl Transport for LoopbackTransport {
    fn client_id(&self) -> i32 {
        LOOPBACK_CLIENT_ID
    }

    fn attach_port(&mut self, name: &str, caps: PortCaps) -> Result<PortId> {
        if caps.readable && !self.duplex {
            return Err(Error::PortCreate(format!(
                "{}: readable port on an input-only client",
                name
            )));
        }
        Ok(self.shared.lock().ports.attach(name, caps))
    }

    fn connect_from(&mut self, port: PortId, addr: Address) -> Result<()> {
        self.shared.lock().ports.require(port)?;
        if addr.is_subscribers() {
            return Ok(());
        }
        self.shared
            .lock()
            .connections
            .push(Connection::From { port, addr });
        tracing::debug!("Connected {} -> port {}", addr, port);
        self.handle().signal(port, Lifecycle::WriteUsed);
        Ok(())
    }

    fn connect_to(&mut self, port: PortId, addr: Address) -> Result<()> {
        if !self.duplex {
            return Err(Error::OutputDisabled);
        }
        self.shared.lock().ports.require(port)?;
        if addr.is_subscribers() {
            return Ok(());
        }
        self.shared
            .lock()
            .connections
            .push(Connection::To { port, addr });
        tracing::debug!("Connected port {} -> {}", port, addr);
        self.handle().signal(port, Lifecycle::ReadSubscribed);
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Inbound>> {
        let inbound = if timeout.is_zero() {
            match self.inbound_rx.try_recv() {
                Ok(inbound) => inbound,
                Err(TryRecvError::Empty) => return self.idle_result(),
                Err(TryRecvError::Disconnected) => return Err(Error::Closed),
            }
        } else {
            match self.inbound_rx.recv_timeout(timeout) {
                Ok(inbound) => inbound,
                Err(RecvTimeoutError::Timeout) => return self.idle_result(),
                Err(RecvTimeoutError::Disconnected) => return Err(Error::Closed),
            }
        };

        if let Inbound::Lifecycle { port, signal } = inbound {
            self.shared.lock().ports.apply(port, signal);
        }
        Ok(Some(inbound))
    }

    fn drain_output(&mut self) -> Result<()> {
        self.flush_pending();
        Ok(())
    }
}

impl LoopbackTransport {
    fn idle_result(&self) -> Result<Option<Inbound>> {
        // sends made before close are visible once the flag is
        if self.closed.load(Ordering::Acquire) && self.inbound_rx.is_empty() {
            Err(Error::Closed)
        } else {
            Ok(None)
        }
    }
}

/// The bus side of a [`LoopbackTransport`].
#[derive(Clone)]
pub struct LoopbackHandle {
    inbound_tx: Sender<Inbound>,
    shared: Arc<Mutex<Shared>>,
    closed: Arc<AtomicBool>,
}

impl LoopbackHandle {
    /// Returns `false` if the inbound queue is full or closed.
    pub fn send_event(&self, port: PortId, event: SeqEvent) -> bool {
        self.inbound_tx
            .try_send(Inbound::Event { port, event })
            .is_ok()
    }

    pub fn signal(&self, port: PortId, signal: Lifecycle) -> bool {
        self.inbound_tx
            .try_send(Inbound::Lifecycle { port, signal })
            .is_ok()
    }

    pub fn subscribe_reader(&self, port: PortId) -> bool {
        self.signal(port, Lifecycle::ReadSubscribed)
    }

    pub fn unsubscribe_reader(&self, port: PortId) -> bool {
        self.signal(port, Lifecycle::ReadUnsubscribed)
    }

    pub fn use_writer(&self, port: PortId) -> bool {
        self.signal(port, Lifecycle::WriteUsed)
    }

    pub fn unuse_writer(&self, port: PortId) -> bool {
        self.signal(port, Lifecycle::WriteUnused)
    }

    /// Everything flushed so far, in wire order.
    pub fn wire(&self) -> Vec<SentEvent> {
        self.shared.lock().wire.clone()
    }

    /// Returns the wire log and clears it.
    pub fn take_wire(&self) -> Vec<SentEvent> {
        std::mem::take(&mut self.shared.lock().wire)
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.shared.lock().connections.clone()
    }

    pub fn subscriber_count(&self, port: PortId, direction: Direction) -> usize {
        self.shared.lock().ports.subscriber_count(port, direction)
    }

    pub fn port_names(&self) -> Vec<String> {
        self.shared
            .lock()
            .ports
            .iter()
            .map(|info| info.name.clone())
            .collect()
    }

    /// After the queue drains, `receive` fails with `Error::Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

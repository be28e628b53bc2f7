//! System MIDI transport over midir virtual ports.
//!
//! Each attached port becomes a virtual input (always) and a virtual output
//! (duplex clients only). midir cannot observe subscriptions, so an output
//! port reports one read subscriber as soon as it exists, and explicit
//! connections made through [`Transport::connect_to`] add one more.

use crate::address::Address;
use crate::error::{Error, Result};
use crate::event::{EventBytes, SeqEvent};
use crate::port::PortTable;
use crate::transport::{Direction, Inbound, Lifecycle, Outlet, PortCaps, PortId, Transport};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use midir::os::unix::{VirtualInput, VirtualOutput};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace, warn};

const INBOUND_CAPACITY: usize = 2048;

/// midir exposes no client numbers; callers see a fixed placeholder.
const UNKNOWN_CLIENT_ID: i32 = -1;

pub struct MidirTransport {
    client_name: String,
    duplex: bool,
    ports: PortTable,
    inputs: Vec<MidiInputConnection<PortId>>,
    outputs: Vec<(PortId, MidiOutputConnection)>,
    inbound_tx: Sender<Inbound>,
    inbound_rx: Receiver<Inbound>,
    /// Lifecycle signals raised by our own calls, delivered ahead of input.
    signals: VecDeque<(PortId, Lifecycle)>,
    pending: Vec<(PortId, EventBytes)>,
}

impl MidirTransport {
    pub fn open(client_name: &str, duplex: bool) -> Result<Self> {
        // Probe the backend once so an unusable system fails at open time.
        MidiInput::new(client_name)?;
        if duplex {
            MidiOutput::new(client_name)?;
        }
        let (inbound_tx, inbound_rx) = bounded(INBOUND_CAPACITY);
        debug!("Opened midir client '{}' (duplex: {})", client_name, duplex);
        Ok(Self {
            client_name: client_name.to_string(),
            duplex,
            ports: PortTable::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            inbound_tx,
            inbound_rx,
            signals: VecDeque::new(),
            pending: Vec::new(),
        })
    }

    fn input(&self) -> Result<MidiInput> {
        let mut input = MidiInput::new(&self.client_name)?;
        input.ignore(Ignore::None);
        Ok(input)
    }

    fn forward_to(&self) -> impl FnMut(u64, &[u8], &mut PortId) + Send + 'static {
        let tx = self.inbound_tx.clone();
        move |_stamp, bytes, port| match SeqEvent::from_bytes(bytes) {
            Ok(event) => {
                if tx.try_send(Inbound::Event { port: *port, event }).is_err() {
                    trace!("Inbound queue full, dropping event on port {}", port);
                }
            }
            Err(e) => trace!("Ignoring undecodable input on port {}: {}", port, e),
        }
    }

    fn queue_signal(&mut self, port: PortId, signal: Lifecycle) {
        self.signals.push_back((port, signal));
    }

    /// ALSA port names end with `client:port`.
    fn matches(name: &str, addr: Address) -> bool {
        match addr {
            Address::Port { client, port } => name.ends_with(&format!(" {}:{}", client, port)),
            Address::Subscribers => false,
        }
    }

    fn write_port(&mut self, port: PortId, bytes: &[u8]) -> Result<()> {
        for (_, conn) in self.outputs.iter_mut().filter(|(id, _)| *id == port) {
            conn.send(bytes)?;
        }
        Ok(())
    }
}

impl Outlet for MidirTransport {
    fn send(&mut self, port: PortId, event: &SeqEvent, immediate: bool) -> Result<()> {
        if !self.duplex {
            return Err(Error::OutputDisabled);
        }
        self.ports.require(port)?;
        let bytes = event.to_bytes();
        if bytes.is_empty() {
            return Ok(());
        }
        self.pending.push((port, bytes));
        if immediate {
            self.drain_output()?;
        }
        Ok(())
    }

    fn flush(&mut self, port: PortId) -> Result<()> {
        self.ports.require(port)?;
        self.drain_output()
    }

    fn subscriber_count(&self, port: PortId, direction: Direction) -> usize {
        self.ports.subscriber_count(port, direction)
    }
}

impl Transport for MidirTransport {
    fn client_id(&self) -> i32 {
        UNKNOWN_CLIENT_ID
    }

    fn attach_port(&mut self, name: &str, caps: PortCaps) -> Result<PortId> {
        let id = self.ports.attach(name, caps);

        if caps.writable {
            let conn = self.input()?.create_virtual(name, self.forward_to(), id)?;
            self.inputs.push(conn);
        }
        if caps.readable {
            if !self.duplex {
                return Err(Error::OutputDisabled);
            }
            let conn = MidiOutput::new(&self.client_name)?.create_virtual(name)?;
            self.outputs.push((id, conn));
            self.queue_signal(id, Lifecycle::ReadSubscribed);
        }
        Ok(id)
    }

    fn connect_from(&mut self, port: PortId, addr: Address) -> Result<()> {
        self.ports.require(port)?;
        if addr.is_subscribers() {
            return Ok(());
        }
        let input = self.input()?;
        let source = input
            .ports()
            .into_iter()
            .find(|p| {
                input
                    .port_name(p)
                    .map(|name| Self::matches(&name, addr))
                    .unwrap_or(false)
            })
            .ok_or_else(|| Error::Transport(format!("no source at {}", addr)))?;
        let name = format!("{} from {}", self.client_name, addr);
        let conn = input.connect(&source, &name, self.forward_to(), port)?;
        self.inputs.push(conn);
        self.queue_signal(port, Lifecycle::WriteUsed);
        debug!("Connected {} -> port {}", addr, port);
        Ok(())
    }

    fn connect_to(&mut self, port: PortId, addr: Address) -> Result<()> {
        if !self.duplex {
            return Err(Error::OutputDisabled);
        }
        self.ports.require(port)?;
        if addr.is_subscribers() {
            return Ok(());
        }
        let output = MidiOutput::new(&self.client_name)?;
        let dest = output
            .ports()
            .into_iter()
            .find(|p| {
                output
                    .port_name(p)
                    .map(|name| Self::matches(&name, addr))
                    .unwrap_or(false)
            })
            .ok_or_else(|| Error::Transport(format!("no destination at {}", addr)))?;
        let name = format!("{} to {}", self.client_name, addr);
        let conn = output.connect(&dest, &name)?;
        self.outputs.push((port, conn));
        self.queue_signal(port, Lifecycle::ReadSubscribed);
        debug!("Connected port {} -> {}", port, addr);
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Inbound>> {
        if let Some((port, signal)) = self.signals.pop_front() {
            self.ports.apply(port, signal);
            return Ok(Some(Inbound::Lifecycle { port, signal }));
        }
        let inbound = if timeout.is_zero() {
            match self.inbound_rx.try_recv() {
                Ok(inbound) => inbound,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(Error::Closed),
            }
        } else {
            match self.inbound_rx.recv_timeout(timeout) {
                Ok(inbound) => inbound,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(Error::Closed),
            }
        };
        if let Inbound::Lifecycle { port, signal } = inbound {
            self.ports.apply(port, signal);
        }
        Ok(Some(inbound))
    }

    fn drain_output(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        let mut result = Ok(());
        for (port, bytes) in pending {
            if let Err(e) = self.write_port(port, &bytes) {
                warn!("Failed to write to port {}: {}", port, e);
                result = Err(e);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached(duplex: bool) -> MidirTransport {
        let (inbound_tx, inbound_rx) = bounded(INBOUND_CAPACITY);
        MidirTransport {
            client_name: "test".to_string(),
            duplex,
            ports: PortTable::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            inbound_tx,
            inbound_rx,
            signals: VecDeque::new(),
            pending: Vec::new(),
        }
    }

    #[test]
    fn test_signal_survives_full_inbound_queue() {
        let mut transport = detached(true);
        let port = transport.ports.attach("Viewer Port 0", PortCaps::DUPLEX);
        for key in 0..INBOUND_CAPACITY {
            let event = SeqEvent::note_on(0, (key % 128) as u8, 1);
            transport
                .inbound_tx
                .try_send(Inbound::Event { port, event })
                .unwrap();
        }
        assert!(transport.inbound_tx.is_full());

        transport.queue_signal(port, Lifecycle::ReadSubscribed);
        assert_eq!(
            transport.receive(Duration::ZERO).unwrap(),
            Some(Inbound::Lifecycle {
                port,
                signal: Lifecycle::ReadSubscribed
            })
        );
        assert_eq!(transport.subscriber_count(port, Direction::Read), 1);
        assert!(matches!(
            transport.receive(Duration::ZERO).unwrap(),
            Some(Inbound::Event { .. })
        ));
    }

    #[test]
    fn test_matches_port_name_suffix() {
        let addr = Address::new(20, 0);
        assert!(MidirTransport::matches("Synth:Synth MIDI 1 20:0", addr));
        assert!(!MidirTransport::matches("Synth:Synth MIDI 1 120:0", addr));
        assert!(!MidirTransport::matches("anything", Address::Subscribers));
    }
}

//! Sequencer-facing half of aseqview.
//!
//! Provides the event model and byte codec, sequencer addresses, the
//! transport capability traits, port subscription bookkeeping and an
//! in-memory loopback transport.
//!
//! Feature gates: `midi-io` (system MIDI through midir virtual ports, unix only).

pub mod error;
pub use error::{Error, Result};

pub mod address;
pub use address::Address;

pub mod event;
pub use event::{EventBytes, EventKind, SeqEvent, SysExData};

pub mod transport;
pub use transport::{Direction, Inbound, Lifecycle, Outlet, PortCaps, PortHooks, PortId, Transport};

pub mod port;
pub use port::{PortInfo, PortTable};

pub mod loopback;
pub use loopback::{Connection, LoopbackHandle, LoopbackTransport, SentEvent};

#[cfg(all(feature = "midi-io", unix))]
pub(crate) mod io;

#[cfg(all(feature = "midi-io", unix))]
pub use io::MidirTransport;

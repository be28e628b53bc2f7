//! # aseqview - Real-time MIDI Event Viewer
//!
//! Watches sequencer ports, shows per-channel state, and can forward a
//! filtered copy of the traffic to its subscribers.
//!
//! ## Architecture
//!
//! aseqview is an umbrella crate that coordinates:
//! - **aseqview-midi** - Event model, byte codec, transport traits, loopback and midir transports
//! - **aseqview-core** - Channel state, event interpreter, SysEx recognizer, notification ring buffer
//!
//! ## Quick Start
//!
//! ```ignore
//! use aseqview::prelude::*;
//!
//! let viewer = ViewerBuilder::new()
//!     .ports(2)
//!     .source("20:0")
//!     .build_with(|duplex| Ok(LoopbackTransport::open(duplex)))?;
//!
//! let mut session = viewer.start(TracingDisplay)?;
//! session.idle()?;
//! session.control(Control::SetPitchAdjust(2))?;
//! session.stop()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Loopback transport only
//! - `midi-io` - System MIDI through midir virtual ports (unix)

pub use aseqview_core as core;
pub use aseqview_midi as midi;

pub use aseqview_core::{
    Control, Display, DisplayTarget, Engine, Layout, Notification, NoteTransform,
    RecordingDisplay, SynthMode, TracingDisplay, TuningMuteMask, ViewerConfig, MAX_PORTS,
};

pub use aseqview_midi::{
    Address, EventKind, LoopbackHandle, LoopbackTransport, PortId, SeqEvent, Transport,
};

#[cfg(all(feature = "midi-io", unix))]
pub use aseqview_midi::MidirTransport;

mod error;
pub use error::{Error, Result};

mod builder;
mod viewer;

pub use builder::ViewerBuilder;
pub use viewer::{Session, Viewer};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{Session, Viewer, ViewerBuilder};

    pub use crate::core::{Control, Display, Notification, RecordingDisplay, TracingDisplay};

    pub use crate::midi::{Address, LoopbackTransport, SeqEvent, Transport};

    #[cfg(all(feature = "midi-io", unix))]
    pub use crate::midi::MidirTransport;
}

//! Viewer core: channel state, event interpretation and redirection.
//!
//! The [`Engine`] consumes inbound sequencer traffic through
//! [`aseqview_midi::PortHooks`], keeps per-port channel state, recognizes
//! mode and tuning SysEx, optionally forwards a transformed copy of every
//! event, and reports display changes as [`Notification`]s.
//!
//! Notifications reach the display either synchronously through
//! [`Inline`] or across threads through the lock-free [`notify`] channel.

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::{ViewerConfig, DEFAULT_CLIENT_NAME, MAX_PORTS};

pub mod channel;
pub use channel::{ChannelState, DRUM_CHANNEL, MIDI_CHANNELS};

pub mod sysex;
pub use sysex::{GsCommand, SynthMode, SysExMacro};

pub mod tuning;
pub use tuning::{TuningMuteMask, TUNING_CATEGORIES, TUNING_LABELS};

pub mod redirect;
pub use redirect::NoteTransform;

pub mod display;
pub use display::{
    ChannelWidgets, Display, DisplayTarget, GlobalWidgets, Inline, Layout, Notification,
    NotificationSink, ProgramLabel, RecordingDisplay, TracingDisplay,
};

pub mod notify;
pub use notify::{notification_channel, notification_channel_with_capacity, NotifyConsumer, NotifyProducer};

pub mod control;
pub use control::Control;

pub mod engine;
pub use engine::{Engine, PortState};

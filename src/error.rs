//! Centralized error type for the aseqview umbrella crate.
//!
//! Wraps the member crate errors so `?` propagates across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] aseqview_core::Error),

    #[error("MIDI: {0}")]
    Midi(#[from] aseqview_midi::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("MIDI worker thread panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, Error>;

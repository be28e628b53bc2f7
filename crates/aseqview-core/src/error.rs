//! Error types for the viewer engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Midi(#[from] aseqview_midi::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

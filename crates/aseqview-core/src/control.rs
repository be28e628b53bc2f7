//! Commands from the display thread to the engine.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Control {
    SetMute {
        port: usize,
        channel: u8,
        muted: bool,
    },
    /// Semitones, clamped to -12..=12.
    SetPitchAdjust(i8),
    /// Percent, clamped to 0..=200.
    SetVelocityScale(u8),
    /// Flips one tuning-type category (0..8) in the mute mask.
    ToggleTuningTypeMute(u8),
    ResetAll,
}

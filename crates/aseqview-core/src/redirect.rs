//! Live note transform applied to redirected events.

use aseqview_midi::SeqEvent;
use serde::{Deserialize, Serialize};

pub const PITCH_ADJUST_MIN: i8 = -12;
pub const PITCH_ADJUST_MAX: i8 = 12;
pub const VELOCITY_SCALE_MAX: u8 = 200;
pub const VELOCITY_SCALE_DEFAULT: u8 = 100;

/// Semitone shift and velocity percentage applied to outgoing notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteTransform {
    pitch_adjust: i8,
    velocity_scale: u8,
}

impl Default for NoteTransform {
    fn default() -> Self {
        Self {
            pitch_adjust: 0,
            velocity_scale: VELOCITY_SCALE_DEFAULT,
        }
    }
}

impl NoteTransform {
    /// Both knobs are clamped to their ranges.
    pub fn new(pitch_adjust: i8, velocity_scale: u8) -> Self {
        Self {
            pitch_adjust: pitch_adjust.clamp(PITCH_ADJUST_MIN, PITCH_ADJUST_MAX),
            velocity_scale: velocity_scale.min(VELOCITY_SCALE_MAX),
        }
    }

    #[inline]
    pub fn pitch_adjust(&self) -> i8 {
        self.pitch_adjust
    }

    #[inline]
    pub fn velocity_scale(&self) -> u8 {
        self.velocity_scale
    }

    pub fn with_pitch_adjust(self, pitch_adjust: i8) -> Self {
        Self::new(pitch_adjust, self.velocity_scale)
    }

    pub fn with_velocity_scale(self, velocity_scale: u8) -> Self {
        Self::new(self.pitch_adjust, velocity_scale)
    }

    /// Drum keys select instruments and are never transposed.
    #[inline]
    pub fn key(&self, key: u8, is_drum: bool) -> u8 {
        let shift = if is_drum { 0 } else { self.pitch_adjust as i32 };
        (key as i32 + shift).clamp(0, 127) as u8
    }

    #[inline]
    pub fn velocity(&self, velocity: u8) -> u8 {
        (velocity as u32 * self.velocity_scale as u32 / 100).min(127) as u8
    }

    /// Transformed copy of a note-type event, marked for direct delivery to
    /// subscribers. Other kinds are copied verbatim with the same marking.
    pub fn apply(&self, event: &SeqEvent, is_drum: bool) -> SeqEvent {
        let mut out = event.clone().direct_to_subscribers();
        if let Some((key, velocity)) = event.note() {
            out.set_note(self.key(key, is_drum), self.velocity(velocity));
        }
        out
    }
}

//! Sequencer event model with delivery flags.
//!
//! Channel and data bytes are kept raw (`u8`) so that out-of-range values
//! arriving from the bus survive decoding and can be rejected by the consumer.

use crate::error::Result;
use midly::live::{LiveEvent, SystemCommon};
use midly::MidiMessage;
use smallvec::SmallVec;

/// SysEx payload including the leading `0xF0` and trailing `0xF7`.
pub type SysExData = SmallVec<[u8; 24]>;

/// Encoded wire bytes for one event.
pub type EventBytes = SmallVec<[u8; 24]>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8, velocity: u8 },
    KeyPressure { channel: u8, key: u8, velocity: u8 },
    ProgramChange { channel: u8, program: u8 },
    Controller { channel: u8, param: u8, value: u8 },
    ChannelPressure { channel: u8, value: u8 },
    /// Signed 14-bit (-8192 to 8191).
    PitchBend { channel: u8, value: i16 },
    /// Registered parameter number with a 14-bit data entry value.
    RegParam { channel: u8, param: u16, value: u16 },
    SysEx(SysExData),
    Other,
}

/// One event as delivered by, or handed to, a sequencer transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeqEvent {
    pub kind: EventKind,
    pub queue: u8,
    /// Scheduled time in queue ticks.
    pub timestamp: u32,
    /// Deliver immediately, bypassing queue scheduling.
    pub direct: bool,
    /// Deliver to every subscriber of the sending port.
    pub to_subscribers: bool,
}

impl SeqEvent {
    #[inline]
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            queue: 0,
            timestamp: 0,
            direct: false,
            to_subscribers: false,
        }
    }

    #[inline]
    pub fn note_on(channel: u8, key: u8, velocity: u8) -> Self {
        Self::new(EventKind::NoteOn {
            channel,
            key,
            velocity,
        })
    }

    #[inline]
    pub fn note_off(channel: u8, key: u8, velocity: u8) -> Self {
        Self::new(EventKind::NoteOff {
            channel,
            key,
            velocity,
        })
    }

    #[inline]
    pub fn key_pressure(channel: u8, key: u8, velocity: u8) -> Self {
        Self::new(EventKind::KeyPressure {
            channel,
            key,
            velocity,
        })
    }

    #[inline]
    pub fn program_change(channel: u8, program: u8) -> Self {
        Self::new(EventKind::ProgramChange { channel, program })
    }

    #[inline]
    pub fn controller(channel: u8, param: u8, value: u8) -> Self {
        Self::new(EventKind::Controller {
            channel,
            param,
            value,
        })
    }

    #[inline]
    pub fn pitch_bend(channel: u8, value: i16) -> Self {
        Self::new(EventKind::PitchBend { channel, value })
    }

    #[inline]
    pub fn reg_param(channel: u8, param: u16, value: u16) -> Self {
        Self::new(EventKind::RegParam {
            channel,
            param,
            value,
        })
    }

    pub fn sysex(bytes: &[u8]) -> Self {
        Self::new(EventKind::SysEx(SysExData::from_slice(bytes)))
    }

    pub fn on_queue(mut self, queue: u8, timestamp: u32) -> Self {
        self.queue = queue;
        self.timestamp = timestamp;
        self
    }

    /// Marks the event for immediate delivery to all subscribers.
    pub fn direct_to_subscribers(mut self) -> Self {
        self.direct = true;
        self.to_subscribers = true;
        self
    }

    /// Channel for channel-type events, `None` for SysEx and others.
    pub fn channel(&self) -> Option<u8> {
        match self.kind {
            EventKind::NoteOn { channel, .. }
            | EventKind::NoteOff { channel, .. }
            | EventKind::KeyPressure { channel, .. }
            | EventKind::ProgramChange { channel, .. }
            | EventKind::Controller { channel, .. }
            | EventKind::ChannelPressure { channel, .. }
            | EventKind::PitchBend { channel, .. }
            | EventKind::RegParam { channel, .. } => Some(channel),
            EventKind::SysEx(_) | EventKind::Other => None,
        }
    }

    #[inline]
    pub fn is_channel_type(&self) -> bool {
        self.channel().is_some()
    }

    /// Note-on, note-off and key pressure all carry a key and velocity.
    #[inline]
    pub fn is_note_type(&self) -> bool {
        self.note().is_some()
    }

    /// `(key, velocity)` for note-type events.
    pub fn note(&self) -> Option<(u8, u8)> {
        match self.kind {
            EventKind::NoteOn { key, velocity, .. }
            | EventKind::NoteOff { key, velocity, .. }
            | EventKind::KeyPressure { key, velocity, .. } => Some((key, velocity)),
            _ => None,
        }
    }

    /// Rewrites key and velocity of a note-type event; other kinds are left untouched.
    pub fn set_note(&mut self, new_key: u8, new_velocity: u8) {
        match &mut self.kind {
            EventKind::NoteOn { key, velocity, .. }
            | EventKind::NoteOff { key, velocity, .. }
            | EventKind::KeyPressure { key, velocity, .. } => {
                *key = new_key;
                *velocity = new_velocity;
            }
            _ => {}
        }
    }

    /// Decodes one complete MIDI message (channel voice or SysEx).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let kind = match LiveEvent::parse(bytes)? {
            LiveEvent::Midi { channel, message } => {
                let channel = channel.as_int();
                match message {
                    MidiMessage::NoteOff { key, vel } => EventKind::NoteOff {
                        channel,
                        key: key.as_int(),
                        velocity: vel.as_int(),
                    },
                    MidiMessage::NoteOn { key, vel } => EventKind::NoteOn {
                        channel,
                        key: key.as_int(),
                        velocity: vel.as_int(),
                    },
                    MidiMessage::Aftertouch { key, vel } => EventKind::KeyPressure {
                        channel,
                        key: key.as_int(),
                        velocity: vel.as_int(),
                    },
                    MidiMessage::Controller { controller, value } => EventKind::Controller {
                        channel,
                        param: controller.as_int(),
                        value: value.as_int(),
                    },
                    MidiMessage::ProgramChange { program } => EventKind::ProgramChange {
                        channel,
                        program: program.as_int(),
                    },
                    MidiMessage::ChannelAftertouch { vel } => EventKind::ChannelPressure {
                        channel,
                        value: vel.as_int(),
                    },
                    MidiMessage::PitchBend { bend } => EventKind::PitchBend {
                        channel,
                        value: bend.0.as_int() as i16 - 0x2000,
                    },
                }
            }
            LiveEvent::Common(SystemCommon::SysEx(data)) => {
                let mut sysex = SysExData::with_capacity(data.len() + 2);
                sysex.push(0xF0);
                sysex.extend(data.iter().map(|b| b.as_int()));
                sysex.push(0xF7);
                EventKind::SysEx(sysex)
            }
            _ => EventKind::Other,
        };
        Ok(Self::new(kind))
    }

    /// Encodes the event as wire bytes. SysEx payloads longer than the
    /// inline capacity spill to the heap; `Other` encodes to nothing.
    pub fn to_bytes(&self) -> EventBytes {
        let mut out = EventBytes::new();
        match &self.kind {
            EventKind::NoteOn {
                channel,
                key,
                velocity,
            } => out.extend_from_slice(&voice(0x90, *channel, *key, *velocity)),
            EventKind::NoteOff {
                channel,
                key,
                velocity,
            } => out.extend_from_slice(&voice(0x80, *channel, *key, *velocity)),
            EventKind::KeyPressure {
                channel,
                key,
                velocity,
            } => out.extend_from_slice(&voice(0xA0, *channel, *key, *velocity)),
            EventKind::Controller {
                channel,
                param,
                value,
            } => out.extend_from_slice(&voice(0xB0, *channel, *param, *value)),
            EventKind::ProgramChange { channel, program } => {
                out.extend_from_slice(&[0xC0 | (*channel).min(15), program & 0x7F])
            }
            EventKind::ChannelPressure { channel, value } => {
                out.extend_from_slice(&[0xD0 | (*channel).min(15), value & 0x7F])
            }
            EventKind::PitchBend { channel, value } => {
                // Signed (-8192 to 8191) to unsigned 14-bit (0 to 16383)
                let unsigned = (*value as i32 + 8192).clamp(0, 16383) as u16;
                out.extend_from_slice(&[
                    0xE0 | (*channel).min(15),
                    (unsigned & 0x7F) as u8,
                    ((unsigned >> 7) & 0x7F) as u8,
                ]);
            }
            EventKind::RegParam {
                channel,
                param,
                value,
            } => {
                out.extend_from_slice(&reg_param_bytes(*channel, *param, *value));
            }
            EventKind::SysEx(data) => out.extend_from_slice(data),
            EventKind::Other => {}
        }
        out
    }
}

#[inline]
fn voice(status: u8, channel: u8, data1: u8, data2: u8) -> [u8; 3] {
    [status | channel.min(15), data1 & 0x7F, data2 & 0x7F]
}

/// RPN select (CC101/CC100) followed by data entry (CC6/CC38).
fn reg_param_bytes(channel: u8, param: u16, value: u16) -> EventBytes {
    let status = 0xB0 | channel.min(15);
    let mut out = EventBytes::new();
    out.extend_from_slice(&[status, 101, ((param >> 7) & 0x7F) as u8]);
    out.extend_from_slice(&[status, 100, (param & 0x7F) as u8]);
    out.extend_from_slice(&[status, 6, ((value >> 7) & 0x7F) as u8]);
    out.extend_from_slice(&[status, 38, (value & 0x7F) as u8]);
    out
}

//! System-exclusive macro recognition.
//!
//! [`recognize`] is a pure classifier over the raw bytes; the engine decides
//! what each macro does to its state.

use serde::{Deserialize, Serialize};

/// Synthesizer compatibility mode announced on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SynthMode {
    #[default]
    Gm,
    Gs,
    Xg,
}

impl SynthMode {
    /// GS and XG outrank GM until a full reset.
    #[inline]
    pub fn is_latched(self) -> bool {
        matches!(self, SynthMode::Gs | SynthMode::Xg)
    }

    pub fn label(self) -> &'static str {
        match self {
            SynthMode::Gm => "GM",
            SynthMode::Gs => "GS",
            SynthMode::Xg => "XG",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GsCommand {
    /// Recognized, no state change.
    Reset,
    DrumPart { channel: u8, drum: bool },
    Program { channel: u8, program: u8 },
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysExMacro {
    GmOn,
    Gs(GsCommand),
    XgOn,
    /// MTS key signature.
    TuningKeysig(i32),
    /// MTS tuning-type assignment for a set of channels.
    TuningTypeAssign {
        /// OR-ed into the receiving port's index.
        port_offset: u8,
        /// Bit `i` selects channel `i`.
        channels: u16,
        tuning_type: u8,
    },
}

const GM_ON: [u8; 4] = [0x7e, 0x7f, 0x09, 0x01];
const GS_PREFIX: [u8; 5] = [0x41, 0x10, 0x42, 0x12, 0x40];
const XG_ON: [u8; 7] = [0x43, 0x10, 0x4c, 0x00, 0x00, 0x7e, 0x00];

const MTS_SUB_ID: u8 = 0x08;
const MTS_KEYSIG: u8 = 0x0a;
const MTS_TUNING_TYPE: u8 = 0x0b;

const GS_DRUM_PART: u8 = 0x15;
const GS_PROGRAM: u8 = 0x21;

/// Classifies a SysEx message. `data` must start with `0xF0`.
pub fn recognize(data: &[u8]) -> Option<SysExMacro> {
    let (&first, buf) = data.split_first()?;
    if first != 0xf0 {
        return None;
    }

    if buf.starts_with(&GM_ON) {
        return Some(SysExMacro::GmOn);
    }

    if buf.len() >= 8 && buf.starts_with(&GS_PREFIX) {
        return Some(SysExMacro::Gs(gs_command(buf[5], buf[6], buf[7])));
    }

    if buf.starts_with(&XG_ON) {
        return Some(SysExMacro::XgOn);
    }

    if buf.len() >= 7 && buf[0] >= 0x7e && buf[2] == MTS_SUB_ID {
        match buf[3] {
            MTS_KEYSIG => {
                let keysig = buf[4] as i32 - 0x40 + buf[5] as i32 * 16;
                return Some(SysExMacro::TuningKeysig(keysig));
            }
            MTS_TUNING_TYPE if buf.len() >= 8 => {
                let channels =
                    ((buf[4] as u16 & 0x03) << 14) | ((buf[5] as u16) << 7) | buf[6] as u16;
                return Some(SysExMacro::TuningTypeAssign {
                    port_offset: buf[4] >> 2,
                    channels,
                    tuning_type: buf[7],
                });
            }
            _ => {}
        }
    }

    None
}

fn gs_command(addr: u8, param: u8, value: u8) -> GsCommand {
    if addr == 0x00 && param == 0x7f && value == 0x00 {
        return GsCommand::Reset;
    }
    // Part addresses carry the part number in the low nibble; both the 0x
    // and 1x forms are seen on the wire.
    if addr & 0xe0 == 0 {
        match param {
            GS_DRUM_PART => {
                return GsCommand::DrumPart {
                    channel: part_channel(addr),
                    drum: value != 0,
                }
            }
            GS_PROGRAM => {
                return GsCommand::Program {
                    channel: part_channel(addr),
                    program: value,
                }
            }
            _ => {}
        }
    }
    GsCommand::Other
}

/// GS part number to MIDI channel: part 0 is the drum channel 9, parts 1-9
/// are channels 0-8, parts 10-15 map to themselves.
#[inline]
pub fn part_channel(addr: u8) -> u8 {
    match addr & 0x0f {
        0 => 9,
        p if p < 10 => p - 1,
        p => p,
    }
}

//! Display capability: opaque widget targets and redraw notifications.
//!
//! The engine never draws. Every state change becomes a [`Notification`]
//! addressed to a [`DisplayTarget`] that the display resolves on its own
//! thread. Targets are handed out once, when the engine builds its
//! [`Layout`].

use crate::channel::MIDI_CHANNELS;
use crate::sysex::SynthMode;
use crate::tuning::TUNING_CATEGORIES;
use serde::{Deserialize, Serialize};

/// Opaque widget handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DisplayTarget(u32);

impl DisplayTarget {
    #[inline]
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Right-aligned three-character program number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramLabel([u8; 3]);

impl ProgramLabel {
    pub fn new(program: u8) -> Self {
        let mut digits = [b' '; 3];
        let mut n = program;
        for slot in digits.iter_mut().rev() {
            *slot = b'0' + n % 10;
            n /= 10;
            if n == 0 {
                break;
            }
        }
        Self(digits)
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl std::fmt::Display for ProgramLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// Bar level: velocity, volume, expression, pan or pitch.
    Level { target: DisplayTarget, value: i32 },
    DrumColor { target: DisplayTarget, is_drum: bool },
    NoteOn { target: DisplayTarget, key: u8 },
    NoteOff { target: DisplayTarget, key: u8 },
    PianoReset { target: DisplayTarget },
    ProgramText { target: DisplayTarget, label: ProgramLabel },
    SynthMode { target: DisplayTarget, mode: SynthMode },
    TuningKeysig { target: DisplayTarget, keysig: Option<i32> },
    TuningType { target: DisplayTarget, tuning_type: u8 },
    MuteIndicator { target: DisplayTarget, muted: bool },
    TuningButton { target: DisplayTarget, visible: bool },
    /// Queue the elapsed-time clock follows.
    Clock { target: DisplayTarget, queue: u8 },
}

impl Notification {
    pub fn target(&self) -> DisplayTarget {
        match *self {
            Notification::Level { target, .. }
            | Notification::DrumColor { target, .. }
            | Notification::NoteOn { target, .. }
            | Notification::NoteOff { target, .. }
            | Notification::PianoReset { target }
            | Notification::ProgramText { target, .. }
            | Notification::SynthMode { target, .. }
            | Notification::TuningKeysig { target, .. }
            | Notification::TuningType { target, .. }
            | Notification::MuteIndicator { target, .. }
            | Notification::TuningButton { target, .. }
            | Notification::Clock { target, .. } => target,
        }
    }
}

/// Consumer of notifications, running on the display thread.
pub trait Display {
    fn apply(&mut self, notification: &Notification);
}

/// Where the engine sends its notifications.
pub trait NotificationSink {
    fn notify(&mut self, notification: Notification);
}

/// Sink that applies notifications to a display synchronously.
pub struct Inline<D>(pub D);

impl<D: Display> NotificationSink for Inline<D> {
    #[inline]
    fn notify(&mut self, notification: Notification) {
        self.0.apply(&notification);
    }
}

/// Display that keeps every notification, for headless use and tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingDisplay {
    pub notifications: Vec<Notification>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.notifications.clear();
    }

    pub fn for_target(&self, target: DisplayTarget) -> impl Iterator<Item = &Notification> {
        self.notifications
            .iter()
            .filter(move |n| n.target() == target)
    }

    pub fn last_for(&self, target: DisplayTarget) -> Option<&Notification> {
        self.for_target(target).last()
    }

    /// Every `Level` value sent to `target`, in order.
    pub fn levels(&self, target: DisplayTarget) -> Vec<i32> {
        self.for_target(target)
            .filter_map(|n| match n {
                Notification::Level { value, .. } => Some(*value),
                _ => None,
            })
            .collect()
    }
}

impl Display for RecordingDisplay {
    fn apply(&mut self, notification: &Notification) {
        self.notifications.push(*notification);
    }
}

/// Display that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDisplay;

impl Display for TracingDisplay {
    fn apply(&mut self, notification: &Notification) {
        tracing::trace!("{:?}", notification);
    }
}

#[derive(Debug, Default)]
struct TargetAllocator {
    next: u32,
}

impl TargetAllocator {
    fn next(&mut self) -> DisplayTarget {
        let target = DisplayTarget(self.next);
        self.next += 1;
        target
    }
}

/// Widget targets for one channel strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelWidgets {
    pub mute: DisplayTarget,
    pub program: DisplayTarget,
    pub velocity: DisplayTarget,
    pub volume: DisplayTarget,
    pub expression: DisplayTarget,
    pub pan: DisplayTarget,
    pub pitch: DisplayTarget,
    pub tuning_type: DisplayTarget,
    pub piano: DisplayTarget,
}

impl ChannelWidgets {
    fn allocate(alloc: &mut TargetAllocator) -> Self {
        Self {
            mute: alloc.next(),
            program: alloc.next(),
            velocity: alloc.next(),
            volume: alloc.next(),
            expression: alloc.next(),
            pan: alloc.next(),
            pitch: alloc.next(),
            tuning_type: alloc.next(),
            piano: alloc.next(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalWidgets {
    pub synth_mode: DisplayTarget,
    pub tuning_keysig: DisplayTarget,
    pub clock: DisplayTarget,
    pub tuning_buttons: [DisplayTarget; TUNING_CATEGORIES],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub global: GlobalWidgets,
    pub ports: Vec<[ChannelWidgets; MIDI_CHANNELS]>,
}

impl Layout {
    pub fn new(num_ports: usize) -> Self {
        let mut alloc = TargetAllocator::default();
        let global = GlobalWidgets {
            synth_mode: alloc.next(),
            tuning_keysig: alloc.next(),
            clock: alloc.next(),
            tuning_buttons: std::array::from_fn(|_| alloc.next()),
        };
        let ports = (0..num_ports)
            .map(|_| std::array::from_fn(|_| ChannelWidgets::allocate(&mut alloc)))
            .collect();
        Self { global, ports }
    }

    pub fn channel(&self, port: usize, channel: usize) -> Option<&ChannelWidgets> {
        self.ports.get(port).and_then(|p| p.get(channel))
    }
}

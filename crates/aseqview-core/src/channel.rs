//! Per-channel synthesizer state.
//!
//! Every mutation goes through a typed operation that updates the state and
//! then signals the display. Out-of-range data bytes are dropped silently.

use crate::display::{ChannelWidgets, DisplayTarget, Notification, NotificationSink, ProgramLabel};
use crate::sysex::SynthMode;

pub const MIDI_CHANNELS: usize = 16;
pub const NUM_KEYS: usize = 128;
pub const NUM_CONTROLLERS: usize = 128;

/// Channel 10 in user numbering.
pub const DRUM_CHANNEL: u8 = 9;

pub const PITCH_BEND_MIN: i16 = -8192;
pub const PITCH_BEND_MAX: i16 = 8191;

/// Controller numbers the store reacts to.
pub mod cc {
    pub const BANK_SELECT_MSB: u8 = 0;
    pub const MAIN_VOLUME: u8 = 7;
    pub const PAN: u8 = 10;
    pub const EXPRESSION: u8 = 11;
    pub const ALL_SOUNDS_OFF: u8 = 120;
    pub const RESET_CONTROLLERS: u8 = 121;
    pub const ALL_NOTES_OFF: u8 = 123;

    pub const DEFAULT_VOLUME: u8 = 100;
    pub const DEFAULT_PAN: u8 = 64;
    pub const DEFAULT_EXPRESSION: u8 = 127;

    /// XG drum-kit bank.
    pub const XG_DRUM_BANK: u8 = 127;
}

#[derive(Debug, Clone)]
pub struct ChannelState {
    index: u8,
    widgets: ChannelWidgets,
    muted: bool,
    is_drum: bool,
    program: u8,
    velocity: [u8; NUM_KEYS],
    max_velocity_key: u8,
    max_velocity: u8,
    controller: [u8; NUM_CONTROLLERS],
    pitch_bend: i16,
    tuning_type: u8,
}

impl ChannelState {
    pub fn new(index: u8, widgets: ChannelWidgets) -> Self {
        let mut controller = [0; NUM_CONTROLLERS];
        controller[cc::MAIN_VOLUME as usize] = cc::DEFAULT_VOLUME;
        controller[cc::PAN as usize] = cc::DEFAULT_PAN;
        controller[cc::EXPRESSION as usize] = cc::DEFAULT_EXPRESSION;
        Self {
            index,
            widgets,
            muted: false,
            is_drum: index == DRUM_CHANNEL,
            program: 0,
            velocity: [0; NUM_KEYS],
            max_velocity_key: 0,
            max_velocity: 0,
            controller,
            pitch_bend: 0,
            tuning_type: 0,
        }
    }

    #[inline]
    pub fn index(&self) -> u8 {
        self.index
    }

    #[inline]
    pub fn widgets(&self) -> &ChannelWidgets {
        &self.widgets
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    #[inline]
    pub fn is_drum(&self) -> bool {
        self.is_drum
    }

    #[inline]
    pub fn program(&self) -> u8 {
        self.program
    }

    #[inline]
    pub fn velocity(&self, key: u8) -> u8 {
        self.velocity.get(key as usize).copied().unwrap_or(0)
    }

    /// `(key, velocity)` of the loudest sounding key; velocity 0 when silent.
    #[inline]
    pub fn max_velocity(&self) -> (u8, u8) {
        (self.max_velocity_key, self.max_velocity)
    }

    #[inline]
    pub fn controller(&self, param: u8) -> u8 {
        self.controller.get(param as usize).copied().unwrap_or(0)
    }

    #[inline]
    pub fn pitch_bend(&self) -> i16 {
        self.pitch_bend
    }

    #[inline]
    pub fn tuning_type(&self) -> u8 {
        self.tuning_type
    }

    /// Sounding keys with their velocities, in key order.
    pub fn sounding(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.velocity
            .iter()
            .enumerate()
            .filter_map(|(k, &v)| (v > 0).then_some((k as u8, v)))
    }

    pub(crate) fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn note<S: NotificationSink + ?Sized>(
        &mut self,
        key: u8,
        velocity: u8,
        show_piano: bool,
        sink: &mut S,
    ) {
        if key as usize >= NUM_KEYS || velocity as usize >= NUM_KEYS {
            return;
        }
        self.velocity[key as usize] = velocity;

        if velocity >= self.max_velocity {
            self.max_velocity_key = key;
            self.max_velocity = velocity;
            self.notify_velocity(sink);
        } else if key == self.max_velocity_key {
            self.max_velocity = velocity;
            for (k, &v) in self.velocity.iter().enumerate() {
                if v > self.max_velocity {
                    self.max_velocity = v;
                    self.max_velocity_key = k as u8;
                }
            }
            self.notify_velocity(sink);
        }

        if show_piano {
            let target = self.widgets.piano;
            sink.notify(if velocity > 0 {
                Notification::NoteOn { target, key }
            } else {
                Notification::NoteOff { target, key }
            });
        }
    }

    pub fn program_change<S: NotificationSink + ?Sized>(&mut self, program: u8, sink: &mut S) {
        if program as usize >= NUM_KEYS {
            return;
        }
        self.program = program;
        sink.notify(Notification::ProgramText {
            target: self.widgets.program,
            label: ProgramLabel::new(program),
        });
    }

    pub fn controller_change<S: NotificationSink + ?Sized>(
        &mut self,
        param: u8,
        value: u8,
        mode: SynthMode,
        sink: &mut S,
    ) {
        if param as usize >= NUM_CONTROLLERS || value >= 128 {
            return;
        }
        self.controller[param as usize] = value;

        match param {
            cc::BANK_SELECT_MSB => {
                if mode == SynthMode::Xg {
                    self.set_drum(value == cc::XG_DRUM_BANK, sink);
                }
            }
            cc::MAIN_VOLUME => self.notify_level(self.widgets.volume, value as i32, sink),
            cc::PAN => self.notify_level(self.widgets.pan, value as i32, sink),
            cc::EXPRESSION => self.notify_level(self.widgets.expression, value as i32, sink),
            // All notes off is treated as all sounds off.
            cc::ALL_SOUNDS_OFF | cc::ALL_NOTES_OFF => self.all_sounds_off(sink),
            cc::RESET_CONTROLLERS => self.reset_controllers(sink),
            _ => {}
        }
    }

    pub fn pitch_bend_change<S: NotificationSink + ?Sized>(&mut self, value: i16, sink: &mut S) {
        if !(PITCH_BEND_MIN..=PITCH_BEND_MAX).contains(&value) {
            return;
        }
        self.pitch_bend = value;
        self.notify_level(self.widgets.pitch, value as i32, sink);
    }

    pub fn all_sounds_off<S: NotificationSink + ?Sized>(&mut self, sink: &mut S) {
        self.velocity = [0; NUM_KEYS];
        self.max_velocity = 0;
        self.notify_velocity(sink);
    }

    pub fn reset_controllers<S: NotificationSink + ?Sized>(&mut self, sink: &mut S) {
        self.controller = [0; NUM_CONTROLLERS];
        self.controller[cc::MAIN_VOLUME as usize] = cc::DEFAULT_VOLUME;
        self.controller[cc::PAN as usize] = cc::DEFAULT_PAN;
        self.controller[cc::EXPRESSION as usize] = cc::DEFAULT_EXPRESSION;
        self.notify_level(self.widgets.volume, cc::DEFAULT_VOLUME as i32, sink);
        self.notify_level(self.widgets.pan, cc::DEFAULT_PAN as i32, sink);
        self.notify_level(self.widgets.expression, cc::DEFAULT_EXPRESSION as i32, sink);
    }

    pub fn set_drum<S: NotificationSink + ?Sized>(&mut self, is_drum: bool, sink: &mut S) {
        self.is_drum = is_drum;
        sink.notify(Notification::DrumColor {
            target: self.widgets.velocity,
            is_drum,
        });
    }

    pub fn set_tuning_type<S: NotificationSink + ?Sized>(&mut self, tuning_type: u8, sink: &mut S) {
        self.tuning_type = tuning_type;
        self.notify_tuning_type(sink);
    }

    pub fn notify_tuning_type<S: NotificationSink + ?Sized>(&self, sink: &mut S) {
        sink.notify(Notification::TuningType {
            target: self.widgets.tuning_type,
            tuning_type: self.tuning_type,
        });
    }

    /// Clears every locally tracked value. Mute is left alone.
    pub fn reset<S: NotificationSink + ?Sized>(&mut self, show_piano: bool, sink: &mut S) {
        self.all_sounds_off(sink);
        self.set_drum(self.index == DRUM_CHANNEL, sink);
        self.program_change(0, sink);
        self.reset_controllers(sink);
        self.pitch_bend_change(0, sink);
        self.set_tuning_type(0, sink);
        if show_piano {
            sink.notify(Notification::PianoReset {
                target: self.widgets.piano,
            });
        }
    }

    fn notify_velocity<S: NotificationSink + ?Sized>(&self, sink: &mut S) {
        self.notify_level(self.widgets.velocity, self.max_velocity as i32, sink);
    }

    #[inline]
    fn notify_level<S: NotificationSink + ?Sized>(
        &self,
        target: DisplayTarget,
        value: i32,
        sink: &mut S,
    ) {
        sink.notify(Notification::Level { target, value });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{Inline, Layout, RecordingDisplay};

    fn channel(index: u8) -> (ChannelState, Inline<RecordingDisplay>) {
        let layout = Layout::new(1);
        let widgets = layout.ports[0][index as usize];
        (
            ChannelState::new(index, widgets),
            Inline(RecordingDisplay::new()),
        )
    }

    #[test]
    fn test_defaults() {
        let (ch, _) = channel(0);
        assert_eq!(ch.controller(cc::MAIN_VOLUME), 100);
        assert_eq!(ch.controller(cc::PAN), 64);
        assert_eq!(ch.controller(cc::EXPRESSION), 127);
        assert_eq!(ch.controller(1), 0);
        assert!(!ch.is_drum());
        assert!(channel(DRUM_CHANNEL).0.is_drum());
    }

    #[test]
    fn test_max_velocity_decay() {
        let (mut ch, mut sink) = channel(0);
        ch.note(10, 100, false, &mut sink);
        ch.note(20, 50, false, &mut sink);
        assert_eq!(ch.max_velocity(), (10, 100));

        ch.note(10, 0, false, &mut sink);
        assert_eq!(ch.max_velocity(), (20, 50));

        let velocity = ch.widgets().velocity;
        assert_eq!(sink.0.levels(velocity), vec![100, 50]);
    }

    #[test]
    fn test_note_off_of_quieter_key_keeps_peak() {
        let (mut ch, mut sink) = channel(0);
        ch.note(60, 90, false, &mut sink);
        ch.note(64, 40, false, &mut sink);
        ch.note(64, 0, false, &mut sink);
        assert_eq!(ch.max_velocity(), (60, 90));
        assert_eq!(sink.0.levels(ch.widgets().velocity), vec![90]);
    }

    #[test]
    fn test_out_of_range_note_is_dropped() {
        let (mut ch, mut sink) = channel(0);
        ch.note(128, 10, true, &mut sink);
        ch.note(10, 128, true, &mut sink);
        assert!(sink.0.notifications.is_empty());
        assert_eq!(ch.sounding().count(), 0);
    }

    #[test]
    fn test_piano_notifications() {
        let (mut ch, mut sink) = channel(0);
        let piano = ch.widgets().piano;
        ch.note(60, 100, true, &mut sink);
        ch.note(60, 0, true, &mut sink);
        let piano_events: Vec<_> = sink.0.for_target(piano).copied().collect();
        assert_eq!(
            piano_events,
            vec![
                Notification::NoteOn {
                    target: piano,
                    key: 60
                },
                Notification::NoteOff {
                    target: piano,
                    key: 60
                },
            ]
        );
    }

    #[test]
    fn test_program_label() {
        let (mut ch, mut sink) = channel(3);
        ch.program_change(5, &mut sink);
        ch.program_change(130, &mut sink);
        assert_eq!(ch.program(), 5);
        assert_eq!(
            sink.0.notifications,
            vec![Notification::ProgramText {
                target: ch.widgets().program,
                label: ProgramLabel::new(5),
            }]
        );
    }

    #[test]
    fn test_xg_bank_select_sets_drum() {
        let (mut ch, mut sink) = channel(0);
        ch.controller_change(cc::BANK_SELECT_MSB, 127, SynthMode::Gm, &mut sink);
        assert!(!ch.is_drum());
        ch.controller_change(cc::BANK_SELECT_MSB, 127, SynthMode::Xg, &mut sink);
        assert!(ch.is_drum());
        ch.controller_change(cc::BANK_SELECT_MSB, 0, SynthMode::Xg, &mut sink);
        assert!(!ch.is_drum());
    }

    #[test]
    fn test_all_notes_off_clears_like_all_sounds_off() {
        let (mut ch, mut sink) = channel(0);
        ch.note(60, 100, false, &mut sink);
        ch.note(61, 80, false, &mut sink);
        ch.controller_change(cc::ALL_NOTES_OFF, 0, SynthMode::Gm, &mut sink);
        assert_eq!(ch.sounding().count(), 0);
        assert_eq!(ch.max_velocity().1, 0);
        assert_eq!(sink.0.levels(ch.widgets().velocity).last(), Some(&0));
    }

    #[test]
    fn test_reset_controllers_restores_defaults() {
        let (mut ch, mut sink) = channel(0);
        ch.controller_change(cc::MAIN_VOLUME, 10, SynthMode::Gm, &mut sink);
        ch.controller_change(74, 33, SynthMode::Gm, &mut sink);
        ch.controller_change(cc::RESET_CONTROLLERS, 0, SynthMode::Gm, &mut sink);
        assert_eq!(ch.controller(cc::MAIN_VOLUME), 100);
        assert_eq!(ch.controller(74), 0);
        assert_eq!(ch.controller(cc::RESET_CONTROLLERS), 0);
        assert_eq!(sink.0.levels(ch.widgets().volume), vec![10, 100]);
    }

    #[test]
    fn test_controller_out_of_range_is_dropped() {
        let (mut ch, mut sink) = channel(0);
        ch.controller_change(128, 1, SynthMode::Gm, &mut sink);
        ch.controller_change(cc::MAIN_VOLUME, 200, SynthMode::Gm, &mut sink);
        assert_eq!(ch.controller(cc::MAIN_VOLUME), 100);
        assert!(sink.0.notifications.is_empty());
    }

    #[test]
    fn test_pitch_bend_is_stored() {
        let (mut ch, mut sink) = channel(0);
        ch.pitch_bend_change(-4096, &mut sink);
        assert_eq!(ch.pitch_bend(), -4096);
        ch.pitch_bend_change(9000, &mut sink);
        assert_eq!(ch.pitch_bend(), -4096);
        assert_eq!(sink.0.levels(ch.widgets().pitch), vec![-4096]);
    }

    #[test]
    fn test_reset_restores_index_default_drum() {
        let (mut ch, mut sink) = channel(DRUM_CHANNEL);
        ch.set_drum(false, &mut sink);
        ch.program_change(12, &mut sink);
        ch.set_tuning_type(0x41, &mut sink);
        ch.note(36, 100, false, &mut sink);
        ch.reset(true, &mut sink);
        assert!(ch.is_drum());
        assert_eq!(ch.program(), 0);
        assert_eq!(ch.tuning_type(), 0);
        assert_eq!(ch.sounding().count(), 0);
        assert_eq!(
            sink.0.notifications.last(),
            Some(&Notification::PianoReset {
                target: ch.widgets().piano
            })
        );
    }
}

//! Event interpreter and redirection engine.
//!
//! The engine owns every port's channel state and is driven one inbound item
//! at a time through [`PortHooks`]. Local tracking always sees the original
//! event; only the copy handed to subscribers is transformed.

use crate::channel::{cc, ChannelState, MIDI_CHANNELS};
use crate::config::ViewerConfig;
use crate::control::Control;
use crate::display::{Layout, Notification, NotificationSink};
use crate::redirect::NoteTransform;
use crate::sysex::{self, GsCommand, SynthMode, SysExMacro};
use crate::tuning::{self, TuningMuteMask};
use aseqview_midi::{Direction, EventKind, Outlet, PortHooks, PortId, SeqEvent};
use tracing::{debug, trace, warn};

const RPN_PITCH_BEND_SENSITIVITY: u16 = 0;

/// Two semitones, as a 14-bit data entry value.
const DEFAULT_BEND_SENSITIVITY: u16 = 2 << 7;

pub struct PortState {
    id: PortId,
    channels: [ChannelState; MIDI_CHANNELS],
}

impl PortState {
    #[inline]
    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn channel(&self, channel: u8) -> Option<&ChannelState> {
        self.channels.get(channel as usize)
    }

    pub fn channels(&self) -> &[ChannelState] {
        &self.channels
    }
}

pub struct Engine<S> {
    output_enabled: bool,
    show_piano: bool,
    ports: Vec<PortState>,
    layout: Layout,
    mode: SynthMode,
    keysig: Option<i32>,
    tuning_mute: TuningMuteMask,
    transform: NoteTransform,
    queue: u8,
    timer_update: bool,
    sink: S,
}

impl<S: NotificationSink> Engine<S> {
    /// One port state per attached port, in `ports` order.
    pub fn new(config: &ViewerConfig, ports: &[PortId], sink: S) -> Self {
        let layout = Layout::new(ports.len());
        let ports = ports
            .iter()
            .zip(&layout.ports)
            .map(|(&id, widgets)| PortState {
                id,
                channels: std::array::from_fn(|c| ChannelState::new(c as u8, widgets[c])),
            })
            .collect();

        Self {
            output_enabled: config.output,
            show_piano: config.show_piano,
            ports,
            layout,
            mode: SynthMode::Gm,
            keysig: None,
            tuning_mute: TuningMuteMask::default(),
            transform: NoteTransform::default(),
            queue: 0,
            timer_update: false,
            sink,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn ports(&self) -> &[PortState] {
        &self.ports
    }

    pub fn channel(&self, port: usize, channel: u8) -> Option<&ChannelState> {
        self.ports.get(port).and_then(|p| p.channel(channel))
    }

    pub fn mode(&self) -> SynthMode {
        self.mode
    }

    pub fn keysig(&self) -> Option<i32> {
        self.keysig
    }

    pub fn tuning_mute(&self) -> TuningMuteMask {
        self.tuning_mute
    }

    pub fn transform(&self) -> NoteTransform {
        self.transform
    }

    /// Queue of the most recent event.
    pub fn queue(&self) -> u8 {
        self.queue
    }

    /// Returns and clears the "clock needs refresh" flag.
    pub fn take_timer_update(&mut self) -> bool {
        std::mem::take(&mut self.timer_update)
    }

    fn port_index(&self, port: PortId) -> Option<usize> {
        self.ports.iter().position(|p| p.id == port)
    }

    fn redirects(&self, port: PortId, out: &dyn Outlet) -> bool {
        self.output_enabled && out.subscriber_count(port, Direction::Read) > 0
    }

    pub fn process_event(&mut self, port: PortId, event: &SeqEvent, out: &mut dyn Outlet) {
        let Some(idx) = self.port_index(port) else {
            trace!("Event on detached port {}", port);
            return;
        };
        if self.queue != event.queue {
            self.queue = event.queue;
            self.notify_clock();
        }
        self.timer_update = true;

        if self.redirects(port, out) {
            self.redirect(idx, event, out);
        }

        if let EventKind::SysEx(data) = &event.kind {
            self.apply_sysex(idx, data, out);
            return;
        }

        let Some(channel) = event.channel() else {
            return;
        };
        let (show_piano, mode) = (self.show_piano, self.mode);
        let Some(ch) = self.ports[idx].channels.get_mut(channel as usize) else {
            trace!("Ignoring event on channel {}", channel);
            return;
        };
        let sink = &mut self.sink;

        match event.kind {
            EventKind::NoteOn { key, velocity, .. } | EventKind::KeyPressure { key, velocity, .. } => {
                ch.note(key, velocity, show_piano, sink)
            }
            EventKind::NoteOff { key, .. } => ch.note(key, 0, show_piano, sink),
            EventKind::ProgramChange { program, .. } => ch.program_change(program, sink),
            EventKind::Controller { param, value, .. } => {
                ch.controller_change(param, value, mode, sink)
            }
            EventKind::PitchBend { value, .. } => ch.pitch_bend_change(value, sink),
            _ => {}
        }
    }

    fn redirect(&self, idx: usize, event: &SeqEvent, out: &mut dyn Outlet) {
        let port = &self.ports[idx];
        let is_drum = match event.channel() {
            Some(channel) => match port.channel(channel) {
                Some(ch) if ch.is_muted() => return,
                Some(ch) => ch.is_drum(),
                None => return,
            },
            None => false,
        };
        send(out, port.id, &self.transform.apply(event, is_drum), false);
    }

    fn apply_sysex(&mut self, idx: usize, data: &[u8], out: &mut dyn Outlet) {
        let Some(recognized) = sysex::recognize(data) else {
            trace!("Unrecognized SysEx ({} bytes)", data.len());
            return;
        };

        match recognized {
            SysExMacro::GmOn => {
                if !self.mode.is_latched() {
                    self.set_mode(SynthMode::Gm);
                }
            }
            SysExMacro::Gs(command) => {
                if !self.mode.is_latched() {
                    self.set_mode(SynthMode::Gs);
                }
                let channels = &mut self.ports[idx].channels;
                match command {
                    GsCommand::DrumPart { channel, drum } => {
                        if let Some(ch) = channels.get_mut(channel as usize) {
                            ch.set_drum(drum, &mut self.sink);
                        }
                    }
                    GsCommand::Program { channel, program } => {
                        if let Some(ch) = channels.get_mut(channel as usize) {
                            if !ch.is_drum() {
                                ch.program_change(program, &mut self.sink);
                            }
                        }
                    }
                    GsCommand::Reset | GsCommand::Other => {}
                }
            }
            SysExMacro::XgOn => self.set_mode(SynthMode::Xg),
            SysExMacro::TuningKeysig(keysig) => {
                let first = self.keysig.is_none();
                self.keysig = Some(keysig);
                self.sink.notify(Notification::TuningKeysig {
                    target: self.layout.global.tuning_keysig,
                    keysig: Some(keysig),
                });
                if first {
                    for port in &self.ports {
                        for ch in &port.channels {
                            ch.notify_tuning_type(&mut self.sink);
                        }
                    }
                    self.show_tuning_buttons(true);
                }
            }
            SysExMacro::TuningTypeAssign {
                port_offset,
                channels,
                tuning_type,
            } => {
                let target = idx | port_offset as usize;
                if target >= self.ports.len() {
                    trace!("Tuning assignment for missing port {}", target);
                    return;
                }
                let flagged: Vec<u8> = (0..MIDI_CHANNELS as u8)
                    .filter(|&c| channels & (1u16 << c) != 0)
                    .collect();
                for &c in &flagged {
                    self.ports[target].channels[c as usize]
                        .set_tuning_type(tuning_type, &mut self.sink);
                }
                if !self.tuning_mute.is_empty() {
                    let muted = self.tuning_mute.contains(tuning::category(tuning_type));
                    for &c in &flagged {
                        self.apply_tuning_mute(target, c, muted, out);
                    }
                }
            }
        }
    }

    fn set_mode(&mut self, mode: SynthMode) {
        if self.mode != mode {
            debug!("Synth mode {} -> {}", self.mode.label(), mode.label());
        }
        self.mode = mode;
        self.sink.notify(Notification::SynthMode {
            target: self.layout.global.synth_mode,
            mode,
        });
    }

    fn notify_clock(&mut self) {
        self.sink.notify(Notification::Clock {
            target: self.layout.global.clock,
            queue: self.queue,
        });
    }

    fn show_tuning_buttons(&mut self, visible: bool) {
        for target in self.layout.global.tuning_buttons {
            self.sink
                .notify(Notification::TuningButton { target, visible });
        }
    }

    /// Updates the mute indicator and, when it changes, the mute state.
    fn apply_tuning_mute(&mut self, port: usize, channel: u8, muted: bool, out: &mut dyn Outlet) {
        let ch = &self.ports[port].channels[channel as usize];
        let (target, current) = (ch.widgets().mute, ch.is_muted());
        self.sink
            .notify(Notification::MuteIndicator { target, muted });
        if current != muted {
            self.set_mute(port, channel, muted, out);
        }
    }

    /// Muting silences the channel downstream; unmuting resumes its sounding
    /// notes through the current transform. Both only while redirecting.
    pub fn set_mute(&mut self, port: usize, channel: u8, muted: bool, out: &mut dyn Outlet) {
        let Some(port_id) = self.ports.get(port).map(|p| p.id) else {
            return;
        };
        let redirect = self.redirects(port_id, out);
        let transform = self.transform;
        let Some(ch) = self.ports[port].channels.get_mut(channel as usize) else {
            return;
        };
        ch.set_muted(muted);
        debug!("Port {} channel {} muted: {}", port, channel, muted);

        if redirect {
            if muted {
                send_notes_off(out, port_id, channel);
            } else {
                resume_notes_on(out, port_id, ch, &transform);
            }
        }
    }

    pub fn set_pitch_adjust(&mut self, semitones: i8, out: &mut dyn Outlet) {
        self.set_transform(self.transform.with_pitch_adjust(semitones), out);
    }

    pub fn set_velocity_scale(&mut self, percent: u8, out: &mut dyn Outlet) {
        self.set_transform(self.transform.with_velocity_scale(percent), out);
    }

    fn set_transform(&mut self, transform: NoteTransform, out: &mut dyn Outlet) {
        if transform == self.transform {
            return;
        }
        debug!(
            "Note transform: pitch {:+}, velocity {}%",
            transform.pitch_adjust(),
            transform.velocity_scale()
        );
        self.transform = transform;
        self.restart_notes(out);
    }

    /// Silences every redirecting channel and replays its sounding notes
    /// with the current transform. Muted channels stay silent.
    fn restart_notes(&self, out: &mut dyn Outlet) {
        for port in &self.ports {
            if !self.redirects(port.id, out) {
                continue;
            }
            for ch in &port.channels {
                send_notes_off(out, port.id, ch.index());
                if !ch.is_muted() {
                    resume_notes_on(out, port.id, ch, &self.transform);
                }
            }
        }
    }

    pub fn toggle_tuning_type_mute(&mut self, category: u8, out: &mut dyn Outlet) {
        if self.tuning_mute.toggle(category).is_none() {
            return;
        }
        for port in 0..self.ports.len() {
            for channel in 0..MIDI_CHANNELS as u8 {
                let tuning_type = self.ports[port].channels[channel as usize].tuning_type();
                let muted = self.tuning_mute.contains(tuning::category(tuning_type));
                self.apply_tuning_mute(port, channel, muted, out);
            }
        }
    }

    pub fn reset_channel(&mut self, port: usize, channel: u8, out: &mut dyn Outlet) {
        let Some(port_id) = self.ports.get(port).map(|p| p.id) else {
            return;
        };
        if channel as usize >= MIDI_CHANNELS {
            return;
        }
        let redirect = self.redirects(port_id, out);
        self.reset_channel_at(port, channel as usize, redirect, out);
        if redirect {
            flush(out, port_id);
        }
    }

    fn reset_channel_at(&mut self, port: usize, channel: usize, redirect: bool, out: &mut dyn Outlet) {
        let (mask, show_piano) = (self.tuning_mute, self.show_piano);
        let port_id = self.ports[port].id;
        let ch = &mut self.ports[port].channels[channel];

        if !mask.is_empty() {
            let muted = mask.contains(0);
            ch.set_muted(muted);
            self.sink.notify(Notification::MuteIndicator {
                target: ch.widgets().mute,
                muted,
            });
        }
        if redirect {
            send_resets(out, port_id, ch.index());
        }
        ch.reset(show_piano, &mut self.sink);
    }

    /// Returns every port, channel and global mode to power-on state.
    pub fn reset_all(&mut self, out: &mut dyn Outlet) {
        debug!("Resetting {} port(s)", self.ports.len());
        for port in 0..self.ports.len() {
            let port_id = self.ports[port].id;
            let redirect = self.redirects(port_id, out);
            for channel in 0..MIDI_CHANNELS {
                self.reset_channel_at(port, channel, redirect, out);
            }
            if redirect {
                flush(out, port_id);
            }
        }

        self.set_mode(SynthMode::Gm);
        self.keysig = None;
        self.sink.notify(Notification::TuningKeysig {
            target: self.layout.global.tuning_keysig,
            keysig: None,
        });
        self.timer_update = true;
        self.notify_clock();
        self.show_tuning_buttons(false);
    }

    pub fn apply_control(&mut self, control: Control, out: &mut dyn Outlet) {
        trace!("Control {:?}", control);
        match control {
            Control::SetMute {
                port,
                channel,
                muted,
            } => self.set_mute(port, channel, muted, out),
            Control::SetPitchAdjust(semitones) => self.set_pitch_adjust(semitones, out),
            Control::SetVelocityScale(percent) => self.set_velocity_scale(percent, out),
            Control::ToggleTuningTypeMute(category) => self.toggle_tuning_type_mute(category, out),
            Control::ResetAll => self.reset_all(out),
        }
    }
}

impl<S: NotificationSink> PortHooks for Engine<S> {
    fn on_read_subscribed(&mut self, port: PortId, out: &mut dyn Outlet) {
        if out.subscriber_count(port, Direction::Read) == 1 {
            debug!("First subscriber on port {}", port);
            self.reset_all(out);
        }
    }

    fn on_write_unused(&mut self, port: PortId, out: &mut dyn Outlet) {
        if out.subscriber_count(port, Direction::Write) == 0 {
            debug!("Last writer left port {}", port);
            self.reset_all(out);
        }
    }

    fn on_event(&mut self, port: PortId, event: &SeqEvent, out: &mut dyn Outlet) {
        self.process_event(port, event, out);
    }
}

fn send(out: &mut dyn Outlet, port: PortId, event: &SeqEvent, immediate: bool) {
    if let Err(e) = out.send(port, event, immediate) {
        warn!("Failed to send on port {}: {}", port, e);
    }
}

fn flush(out: &mut dyn Outlet, port: PortId) {
    if let Err(e) = out.flush(port) {
        warn!("Failed to flush port {}: {}", port, e);
    }
}

fn send_notes_off(out: &mut dyn Outlet, port: PortId, channel: u8) {
    let event = SeqEvent::controller(channel, cc::ALL_SOUNDS_OFF, 0).direct_to_subscribers();
    send(out, port, &event, true);
}

fn resume_notes_on(out: &mut dyn Outlet, port: PortId, ch: &ChannelState, transform: &NoteTransform) {
    for (key, velocity) in ch.sounding() {
        let event = transform.apply(&SeqEvent::note_on(ch.index(), key, velocity), ch.is_drum());
        send(out, port, &event, false);
    }
    flush(out, port);
}

fn send_resets(out: &mut dyn Outlet, port: PortId, channel: u8) {
    let resets = [
        SeqEvent::controller(channel, cc::RESET_CONTROLLERS, 0),
        SeqEvent::controller(channel, cc::ALL_SOUNDS_OFF, 0),
        SeqEvent::reg_param(channel, RPN_PITCH_BEND_SENSITIVITY, DEFAULT_BEND_SENSITIVITY),
    ];
    for event in resets {
        send(out, port, &event.direct_to_subscribers(), false);
    }
}

//! Integration tests for the aseqview umbrella crate.
//!
//! These drive both session modes end to end through the loopback transport.

use aseqview::core::{Inline, MIDI_CHANNELS};
use aseqview::midi::{
    Connection, Direction, EventKind, Inbound, Outlet, PortCaps, PortId, SentEvent,
};
use aseqview::prelude::*;
use aseqview::{Engine, SynthMode, ViewerConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn open_loopback(duplex: bool) -> aseqview::Result<LoopbackTransport> {
    Ok(LoopbackTransport::open(duplex))
}

/// Polls `ready` for up to two seconds.
fn wait_until(mut ready: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if ready() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    ready()
}

/// Loopback transport whose next output drain can be made to fail.
struct FailingDrain {
    inner: LoopbackTransport,
    fail_next: Arc<AtomicBool>,
}

impl FailingDrain {
    fn open(duplex: bool) -> aseqview::Result<Self> {
        Ok(Self {
            inner: LoopbackTransport::open(duplex),
            fail_next: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl Outlet for FailingDrain {
    fn send(&mut self, port: PortId, event: &SeqEvent, immediate: bool) -> aseqview::midi::Result<()> {
        self.inner.send(port, event, immediate)
    }

    fn flush(&mut self, port: PortId) -> aseqview::midi::Result<()> {
        self.inner.flush(port)
    }

    fn subscriber_count(&self, port: PortId, direction: Direction) -> usize {
        self.inner.subscriber_count(port, direction)
    }
}

impl Transport for FailingDrain {
    fn client_id(&self) -> i32 {
        self.inner.client_id()
    }

    fn attach_port(&mut self, name: &str, caps: PortCaps) -> aseqview::midi::Result<PortId> {
        self.inner.attach_port(name, caps)
    }

    fn connect_from(&mut self, port: PortId, addr: Address) -> aseqview::midi::Result<()> {
        self.inner.connect_from(port, addr)
    }

    fn connect_to(&mut self, port: PortId, addr: Address) -> aseqview::midi::Result<()> {
        self.inner.connect_to(port, addr)
    }

    fn receive(&mut self, timeout: Duration) -> aseqview::midi::Result<Option<Inbound>> {
        self.inner.receive(timeout)
    }

    fn drain_output(&mut self) -> aseqview::midi::Result<()> {
        if self.fail_next.swap(false, Ordering::AcqRel) {
            return Err(aseqview::midi::Error::Transport("write failed".to_string()));
        }
        self.inner.drain_output()
    }
}

fn has_note(wire: &[SentEvent], key: u8, velocity: u8) -> bool {
    wire.iter().any(|s| s.event.note() == Some((key, velocity)))
}

fn inline_session(
    builder: ViewerBuilder,
) -> (
    Session<LoopbackTransport, RecordingDisplay>,
    aseqview::LoopbackHandle,
    PortId,
) {
    let viewer = builder.threaded(false).build_with(open_loopback).unwrap();
    let handle = viewer.transport().handle();
    let port = viewer.ports()[0];
    (viewer.start(RecordingDisplay::new()).unwrap(), handle, port)
}

// ---------------------------------------------------------------------------
// 1. Builder: configuration is validated before the transport opens
// ---------------------------------------------------------------------------

#[test]
fn test_builder_rejects_invalid_config() {
    init_tracing();
    let mut opened = 0;
    for builder in [
        ViewerBuilder::new().ports(0),
        ViewerBuilder::new().ports(21),
        ViewerBuilder::new().notify_capacity(100),
        ViewerBuilder::new().dest("x:1"),
    ] {
        let result = builder.build_with(|duplex| {
            opened += 1;
            open_loopback(duplex)
        });
        assert!(result.is_err());
    }
    assert_eq!(opened, 0);
}

#[test]
fn test_builder_from_config() {
    let config = ViewerConfig {
        ports: 4,
        show_piano: false,
        ..Default::default()
    };
    let viewer = ViewerBuilder::from_config(config.clone())
        .build_with(open_loopback)
        .unwrap();
    assert_eq!(viewer.config(), &config);
    assert_eq!(viewer.ports().len(), 4);
}

// ---------------------------------------------------------------------------
// 2. Threaded session: worker thread, ring buffer, control channel
// ---------------------------------------------------------------------------

#[test]
fn test_threaded_end_to_end() {
    init_tracing();
    let viewer = ViewerBuilder::new().build_with(open_loopback).unwrap();
    let handle = viewer.transport().handle();
    let port = viewer.ports()[0];
    let mut session = viewer.start(RecordingDisplay::new()).unwrap();
    assert!(session.is_threaded());
    let piano = session.layout().ports[0][0].piano;

    handle.send_event(port, SeqEvent::note_on(0, 60, 100));
    assert!(wait_until(|| {
        session.idle().unwrap();
        session.display().for_target(piano).any(|n| {
            *n == Notification::NoteOn {
                target: piano,
                key: 60,
            }
        })
    }));
    // no subscribers yet
    assert!(handle.wire().is_empty());

    handle.subscribe_reader(port);
    assert!(wait_until(|| handle.wire().len() >= 3 * MIDI_CHANNELS));
    handle.take_wire();

    handle.send_event(port, SeqEvent::note_on(1, 64, 90));
    assert!(wait_until(|| has_note(&handle.wire(), 64, 90)));
    handle.take_wire();

    session.control(Control::SetPitchAdjust(2)).unwrap();
    assert!(wait_until(|| has_note(&handle.wire(), 66, 90)));

    session.stop().unwrap();
    assert!(!session.is_running());
    // stopping again is harmless
    session.stop().unwrap();
}

#[test]
fn test_threaded_worker_exits_when_transport_closes() {
    init_tracing();
    let viewer = ViewerBuilder::new().build_with(open_loopback).unwrap();
    let handle = viewer.transport().handle();
    let mut session = viewer.start(RecordingDisplay::new()).unwrap();
    assert!(session.is_running());

    handle.close();
    assert!(wait_until(|| !session.is_running()));
    session.stop().unwrap();
}

#[test]
fn test_threaded_stop_drains_remaining_notifications() {
    init_tracing();
    let viewer = ViewerBuilder::new().build_with(open_loopback).unwrap();
    let handle = viewer.transport().handle();
    let port = viewer.ports()[0];
    let mut session = viewer.start(RecordingDisplay::new()).unwrap();
    let program = session.layout().ports[0][3].program;

    handle.send_event(port, SeqEvent::program_change(3, 42));
    handle.close();
    assert!(wait_until(|| !session.is_running()));
    session.stop().unwrap();

    assert!(session.display().last_for(program).is_some());
}

#[test]
fn test_threaded_worker_survives_failed_drain() {
    init_tracing();
    let viewer = ViewerBuilder::new().build_with(FailingDrain::open).unwrap();
    let handle = viewer.transport().inner.handle();
    let fail_next = viewer.transport().fail_next.clone();
    let port = viewer.ports()[0];
    let mut session = viewer.start(RecordingDisplay::new()).unwrap();
    let program = session.layout().ports[0][3].program;

    handle.subscribe_reader(port);
    assert!(wait_until(|| handle.wire().len() >= 3 * MIDI_CHANNELS));
    handle.take_wire();

    fail_next.store(true, Ordering::Release);
    handle.send_event(port, SeqEvent::note_on(0, 60, 100));
    assert!(wait_until(|| !fail_next.load(Ordering::Acquire)));
    thread::sleep(Duration::from_millis(20));
    assert!(session.is_running());

    // the held-back note goes out with the next delivery
    handle.send_event(port, SeqEvent::program_change(3, 42));
    assert!(wait_until(|| {
        session.idle().unwrap();
        session.display().last_for(program).is_some()
    }));
    assert!(wait_until(|| has_note(&handle.wire(), 60, 100)));
    assert!(session.is_running());
    session.stop().unwrap();
}

#[test]
fn test_threaded_control_queue_full_drops() {
    init_tracing();
    let viewer = ViewerBuilder::new().build_with(open_loopback).unwrap();
    let handle = viewer.transport().handle();
    let mut session = viewer.start(RecordingDisplay::new()).unwrap();

    // far more than the worker can hold; none of these calls may block or fail
    for _ in 0..1000 {
        session.control(Control::SetVelocityScale(50)).unwrap();
    }
    assert!(session.is_running());

    handle.close();
    assert!(wait_until(|| !session.is_running()));
    assert!(session.control(Control::ResetAll).is_err());
    session.stop().unwrap();
}

// ---------------------------------------------------------------------------
// 3. Inline session: engine on the calling thread
// ---------------------------------------------------------------------------

#[test]
fn test_inline_synth_mode_latch() {
    init_tracing();
    let (mut session, handle, port) = inline_session(ViewerBuilder::new());
    assert!(!session.is_threaded());

    handle.send_event(port, SeqEvent::sysex(&[0xf0, 0x7e, 0x7f, 0x09, 0x01, 0xf7]));
    handle.send_event(
        port,
        SeqEvent::sysex(&[0xf0, 0x41, 0x10, 0x42, 0x12, 0x40, 0x01, 0x15, 0x7f, 0xf7]),
    );
    handle.send_event(port, SeqEvent::sysex(&[0xf0, 0x7e, 0x7f, 0x09, 0x01, 0xf7]));
    assert_eq!(session.idle().unwrap(), 3);

    let engine: &Engine<Inline<RecordingDisplay>> = session.engine().unwrap();
    assert_eq!(engine.mode(), SynthMode::Gs);
    assert!(engine.channel(0, 0).unwrap().is_drum());

    let mode_target = session.layout().global.synth_mode;
    assert_eq!(
        session.display().last_for(mode_target),
        Some(&Notification::SynthMode {
            target: mode_target,
            mode: SynthMode::Gs,
        })
    );
}

#[test]
fn test_inline_connects_source_and_dest() {
    init_tracing();
    let (mut session, handle, port) =
        inline_session(ViewerBuilder::new().source("20:0").dest("24.1"));

    assert_eq!(
        handle.connections(),
        vec![
            Connection::From {
                port,
                addr: Address::new(20, 0),
            },
            Connection::To {
                port,
                addr: Address::new(24, 1),
            },
        ]
    );

    // the destination subscription triggers a full reset on the wire
    session.idle().unwrap();
    let wire = handle.take_wire();
    assert_eq!(wire.len(), 3 * MIDI_CHANNELS);
    assert!(wire.iter().all(|s| s.event.direct && s.event.to_subscribers));
}

#[test]
fn test_inline_subscribers_address_makes_no_connection() {
    let (_session, handle, _port) =
        inline_session(ViewerBuilder::new().source("subscribers").dest("S"));
    assert!(handle.connections().is_empty());
}

#[test]
fn test_inline_input_only_never_forwards() {
    init_tracing();
    let (mut session, handle, port) =
        inline_session(ViewerBuilder::new().output(false).dest("24:0"));
    assert!(handle.connections().is_empty());

    handle.send_event(port, SeqEvent::note_on(0, 60, 100));
    session.idle().unwrap();
    assert!(handle.wire().is_empty());
    assert_eq!(session.engine().unwrap().channel(0, 0).unwrap().velocity(60), 100);
}

#[test]
fn test_inline_mute_round_trip() {
    init_tracing();
    let (mut session, handle, port) = inline_session(ViewerBuilder::new());
    handle.subscribe_reader(port);
    session.idle().unwrap();
    handle.take_wire();

    handle.send_event(port, SeqEvent::note_on(2, 60, 100));
    handle.send_event(port, SeqEvent::note_on(2, 67, 70));
    session.idle().unwrap();
    handle.take_wire();

    session
        .control(Control::SetMute {
            port: 0,
            channel: 2,
            muted: true,
        })
        .unwrap();
    let wire = handle.take_wire();
    assert_eq!(wire.len(), 1);
    assert!(wire[0].immediate);
    assert_eq!(
        wire[0].event.kind,
        EventKind::Controller {
            channel: 2,
            param: 120,
            value: 0,
        }
    );

    // tracked while muted, not forwarded
    handle.send_event(port, SeqEvent::note_off(2, 67, 0));
    handle.send_event(port, SeqEvent::note_on(2, 72, 50));
    session.idle().unwrap();
    assert!(handle.wire().is_empty());

    session.control(Control::SetVelocityScale(50)).unwrap();
    handle.take_wire();
    session
        .control(Control::SetMute {
            port: 0,
            channel: 2,
            muted: false,
        })
        .unwrap();
    let resumed: Vec<_> = handle
        .take_wire()
        .iter()
        .filter_map(|s| s.event.note())
        .collect();
    assert_eq!(resumed, vec![(60, 50), (72, 25)]);
}

#[test]
fn test_inline_tuning_mute_control() {
    init_tracing();
    let (mut session, handle, port) = inline_session(ViewerBuilder::new().ports(2));
    // channels 0 and 1 of port 1 get preset 0x02 (category 2)
    handle.send_event(
        port,
        SeqEvent::sysex(&[0xf0, 0x7f, 0x7f, 0x08, 0x0b, 0x04, 0x00, 0x03, 0x02, 0xf7]),
    );
    session.idle().unwrap();

    session.control(Control::ToggleTuningTypeMute(2)).unwrap();
    let engine = session.engine().unwrap();
    assert!(engine.channel(1, 0).unwrap().is_muted());
    assert!(engine.channel(1, 1).unwrap().is_muted());
    assert!(!engine.channel(1, 2).unwrap().is_muted());
    assert!(!engine.channel(0, 0).unwrap().is_muted());

    // out-of-range category is ignored
    session.control(Control::ToggleTuningTypeMute(9)).unwrap();
    assert_eq!(session.engine().unwrap().tuning_mute().bits(), 1 << 2);

    // full reset applies category 0 to every channel
    session.control(Control::ResetAll).unwrap();
    let engine = session.engine().unwrap();
    assert!(!engine.channel(1, 0).unwrap().is_muted());
    assert_eq!(engine.channel(1, 0).unwrap().tuning_type(), 0);
}

#[test]
fn test_inline_idle_after_close() {
    let (mut session, handle, port) = inline_session(ViewerBuilder::new());
    handle.send_event(port, SeqEvent::note_on(0, 60, 100));
    handle.close();
    assert_eq!(session.idle().unwrap(), 0);
    assert!(!session.is_running());
    assert_eq!(session.idle().unwrap(), 0);
}

#[test]
fn test_inline_failed_drain_stays_local() {
    init_tracing();
    let viewer = ViewerBuilder::new()
        .threaded(false)
        .build_with(FailingDrain::open)
        .unwrap();
    let handle = viewer.transport().inner.handle();
    let fail_next = viewer.transport().fail_next.clone();
    let port = viewer.ports()[0];
    let mut session = viewer.start(RecordingDisplay::new()).unwrap();
    handle.subscribe_reader(port);
    session.idle().unwrap();
    handle.take_wire();

    fail_next.store(true, Ordering::Release);
    handle.send_event(port, SeqEvent::note_on(0, 60, 100));
    assert_eq!(session.idle().unwrap(), 1);
    assert!(handle.wire().is_empty());

    fail_next.store(true, Ordering::Release);
    session.control(Control::SetPitchAdjust(1)).unwrap();
    assert!(session.is_running());

    handle.send_event(port, SeqEvent::program_change(3, 42));
    assert_eq!(session.idle().unwrap(), 1);
    let wire = handle.take_wire();
    assert!(has_note(&wire, 60, 100));
    assert!(has_note(&wire, 61, 100));
}

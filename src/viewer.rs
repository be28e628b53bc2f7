//! Viewer runtime: the configured client and its running sessions.
//!
//! A [`Session`] runs in one of two modes. Threaded sessions move the
//! transport and engine onto a poll-loop worker and hand notifications back
//! through the lock-free ring buffer; inline sessions keep everything on the
//! caller's thread and apply notifications to the display directly. Either
//! way the display side calls [`Session::idle`] regularly.

use crate::error::{Error, Result};
use aseqview_core::{
    notification_channel_with_capacity, Control, Display, Engine, Inline, Layout,
    NotificationSink, NotifyConsumer, NotifyProducer, ViewerConfig,
};
use aseqview_midi::{PortId, Transport};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thread_priority::ThreadPriority;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

const CONTROL_CAPACITY: usize = 64;

const WORKER_NAME: &str = "aseqview-midi";

/// A configured client with its ports attached, not yet processing events.
pub struct Viewer<T> {
    config: ViewerConfig,
    transport: T,
    ports: Vec<PortId>,
}

impl<T: Transport + 'static> Viewer<T> {
    pub(crate) fn from_parts(config: ViewerConfig, transport: T, ports: Vec<PortId>) -> Self {
        Self {
            config,
            transport,
            ports,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn ports(&self) -> &[PortId] {
        &self.ports
    }

    /// Connects `source` and `dest` on the first port, then starts
    /// processing in the configured mode.
    pub fn start<D: Display>(self, display: D) -> Result<Session<T, D>> {
        let Viewer {
            config,
            mut transport,
            ports,
        } = self;
        info!(
            "Starting '{}' with {} port(s), {}",
            config.client_name,
            ports.len(),
            if config.threaded { "threaded" } else { "inline" }
        );

        if !config.threaded {
            if config.realtime {
                request_realtime();
            }
            let mut engine = Engine::new(&config, &ports, Inline(display));
            connect(&config, &mut transport, &ports, &mut engine)?;
            let layout = engine.layout().clone();
            return Ok(Session {
                layout,
                runner: Runner::Inline(InlineRunner {
                    transport,
                    engine,
                    closed: false,
                }),
            });
        }

        let (producer, consumer) = notification_channel_with_capacity(config.notify_capacity);
        let mut engine = Engine::new(&config, &ports, producer);
        connect(&config, &mut transport, &ports, &mut engine)?;
        let layout = engine.layout().clone();

        let (control_tx, control_rx) = bounded(CONTROL_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_shutdown = Arc::clone(&shutdown);
        let realtime = config.realtime;

        let handle = thread::Builder::new()
            .name(WORKER_NAME.into())
            .spawn(move || {
                if realtime {
                    request_realtime();
                }
                worker_loop(transport, engine, control_rx, worker_shutdown)
            })?;

        let mut threaded = Threaded {
            display,
            consumer,
            control_tx,
            shutdown,
            handle: Some(handle),
        };
        // initial reset output
        threaded.consumer.drain_into(&mut threaded.display);

        Ok(Session {
            layout,
            runner: Runner::Threaded(threaded),
        })
    }
}

fn connect<T: Transport, S: NotificationSink>(
    config: &ViewerConfig,
    transport: &mut T,
    ports: &[PortId],
    engine: &mut Engine<S>,
) -> Result<()> {
    let Some(&first) = ports.first() else {
        return Ok(());
    };
    if let Some(source) = config.source {
        debug!("Connecting {} -> port {}", source, first);
        transport.connect_from(first, source)?;
    }
    if config.output {
        if let Some(dest) = config.dest {
            debug!("Connecting port {} -> {}", first, dest);
            transport.connect_to(first, dest)?;
            engine.reset_all(transport);
            transport.drain_output()?;
        }
    }
    Ok(())
}

fn request_realtime() {
    if let Err(e) = thread_priority::set_current_thread_priority(ThreadPriority::Max) {
        warn!("Realtime priority request failed: {:?}", e);
    }
}

fn worker_loop<T: Transport>(
    mut transport: T,
    mut engine: Engine<NotifyProducer>,
    control_rx: Receiver<Control>,
    shutdown: Arc<AtomicBool>,
) -> aseqview_midi::Result<()> {
    debug!("MIDI worker started");
    while !shutdown.load(Ordering::Acquire) {
        let mut controlled = false;
        loop {
            match control_rx.try_recv() {
                Ok(control) => {
                    engine.apply_control(control, &mut transport);
                    controlled = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
        let drained = if controlled {
            transport.drain_output_logged()
        } else {
            Ok(())
        };

        // receive failures other than Closed end the worker
        match drained.and_then(|()| transport.dispatch(&mut engine, POLL_INTERVAL)) {
            Ok(_) => {}
            Err(aseqview_midi::Error::Closed) => {
                debug!("Transport closed");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    if engine.sink().dropped() > 0 {
        warn!(
            "{} notification(s) dropped on a full buffer",
            engine.sink().dropped()
        );
    }
    debug!("MIDI worker stopped");
    Ok(())
}

struct Threaded<D> {
    display: D,
    consumer: NotifyConsumer,
    control_tx: Sender<Control>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<aseqview_midi::Result<()>>>,
}

struct InlineRunner<T, D> {
    transport: T,
    engine: Engine<Inline<D>>,
    closed: bool,
}

enum Runner<T, D> {
    Threaded(Threaded<D>),
    Inline(InlineRunner<T, D>),
}

/// A running viewer.
///
/// Dropping the session stops it.
pub struct Session<T: Transport + 'static, D: Display> {
    layout: Layout,
    runner: Runner<T, D>,
}

impl<T: Transport + 'static, D: Display> Session<T, D> {
    /// The display-side tick. Applies pending notifications (threaded) or
    /// processes every ready delivery (inline). Never blocks.
    ///
    /// Returns the number of notifications applied or deliveries processed.
    pub fn idle(&mut self) -> Result<usize> {
        match &mut self.runner {
            Runner::Threaded(t) => Ok(t.consumer.drain_into(&mut t.display)),
            Runner::Inline(r) => {
                if r.closed {
                    return Ok(0);
                }
                match r.transport.dispatch_pending(&mut r.engine) {
                    Ok(n) => Ok(n),
                    Err(aseqview_midi::Error::Closed) => {
                        debug!("Transport closed");
                        r.closed = true;
                        Ok(0)
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Applies a live control. Threaded sessions queue it for the worker
    /// and drop it, with a warning, when the queue is full.
    pub fn control(&mut self, control: Control) -> Result<()> {
        match &mut self.runner {
            Runner::Threaded(t) => match t.control_tx.try_send(control) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(control)) => {
                    warn!("Control queue full, dropped {:?}", control);
                    Ok(())
                }
                Err(TrySendError::Disconnected(_)) => {
                    Err(Error::Midi(aseqview_midi::Error::Closed))
                }
            },
            Runner::Inline(r) => {
                r.engine.apply_control(control, &mut r.transport);
                if let Err(aseqview_midi::Error::Closed) = r.transport.drain_output_logged() {
                    debug!("Transport closed");
                    r.closed = true;
                }
                Ok(())
            }
        }
    }

    /// Whether events can still arrive.
    pub fn is_running(&self) -> bool {
        match &self.runner {
            Runner::Threaded(t) => t.handle.as_ref().is_some_and(|h| !h.is_finished()),
            Runner::Inline(r) => !r.closed,
        }
    }

    pub fn is_threaded(&self) -> bool {
        matches!(self.runner, Runner::Threaded(_))
    }

    /// Stops the worker, waits for it, and applies what it left behind.
    /// Calling it again is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        match &mut self.runner {
            Runner::Threaded(t) => {
                let Some(handle) = t.handle.take() else {
                    return Ok(());
                };
                t.shutdown.store(true, Ordering::Release);
                let joined = handle.join();
                t.consumer.drain_into(&mut t.display);
                info!("Session stopped");
                match joined {
                    Ok(result) => Ok(result?),
                    Err(_) => Err(Error::WorkerPanicked),
                }
            }
            Runner::Inline(r) => {
                if !r.closed {
                    r.closed = true;
                    info!("Session stopped");
                }
                Ok(())
            }
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn display(&self) -> &D {
        match &self.runner {
            Runner::Threaded(t) => &t.display,
            Runner::Inline(r) => &r.engine.sink().0,
        }
    }

    pub fn display_mut(&mut self) -> &mut D {
        match &mut self.runner {
            Runner::Threaded(t) => &mut t.display,
            Runner::Inline(r) => &mut r.engine.sink_mut().0,
        }
    }

    /// Engine state, available in inline mode only.
    pub fn engine(&self) -> Option<&Engine<Inline<D>>> {
        match &self.runner {
            Runner::Threaded(_) => None,
            Runner::Inline(r) => Some(&r.engine),
        }
    }
}

impl<T: Transport + 'static, D: Display> Drop for Session<T, D> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Error stopping session: {}", e);
        }
    }
}

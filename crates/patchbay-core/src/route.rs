//! Route worker: the per-route read → adapt → write loop.
//!
//! ## Lifecycle
//!
//! ```text
//! Starting ──streams open──▶ Running ──inactive / fatal──▶ Stopping ──▶ Terminated
//!     │                                                                  ▲
//!     └────────────────────────── open failed ───────────────────────────┘
//! ```
//!
//! The worker opens both streams, reports the outcome over the startup
//! channel, pumps chunks until its `active` flag or the router's `running`
//! flag drops, then stops and closes input and output in that order. Flags
//! are checked between chunks only, never in the middle of a transfer.

use crate::adapter::ChannelAdapter;
use crate::catalog::DeviceDescriptor;
use crate::error::RouteError;
use crate::RouteId;
use crossbeam_channel::Sender;
use patchbay_io::{AudioBackend, Direction, InputStream, OutputStream, OverflowPolicy, StreamParams};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

/// Where a route is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RouteState {
    /// Opening streams.
    Starting = 0,
    /// Pumping audio.
    Running = 1,
    /// Closing streams.
    Stopping = 2,
    /// Worker finished.
    Terminated = 3,
}

impl RouteState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RouteState::Starting,
            1 => RouteState::Running,
            2 => RouteState::Stopping,
            _ => RouteState::Terminated,
        }
    }
}

impl std::fmt::Display for RouteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RouteState::Starting => "starting",
            RouteState::Running => "running",
            RouteState::Stopping => "stopping",
            RouteState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Immutable description of a route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSpec {
    /// Route identifier.
    pub id: RouteId,
    /// Capture side.
    pub input: DeviceDescriptor,
    /// Playback side.
    pub output: DeviceDescriptor,
    /// Stream sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per chunk.
    pub chunk_size: u32,
}

impl RouteSpec {
    /// Adapter used between the two native layouts.
    pub fn adapter(&self) -> ChannelAdapter {
        ChannelAdapter::select(self.input.channels, self.output.channels)
    }

    fn params(&self, device: &DeviceDescriptor) -> StreamParams {
        StreamParams::new(
            device.catalog_index,
            device.channels,
            self.sample_rate,
            self.chunk_size,
        )
    }
}

/// State shared between a worker and the router.
#[derive(Debug)]
pub(crate) struct RouteControl {
    active: AtomicBool,
    state: AtomicU8,
    chunks: AtomicU64,
    faults: AtomicU64,
}

impl RouteControl {
    pub(crate) fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            state: AtomicU8::new(RouteState::Starting as u8),
            chunks: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Ask the worker to stop at the next chunk boundary.
    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub(crate) fn state(&self) -> RouteState {
        RouteState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: RouteState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub(crate) fn chunks(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }

    pub(crate) fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }
}

/// Everything a route worker needs, moved onto its thread.
pub(crate) struct Pump {
    pub(crate) spec: RouteSpec,
    pub(crate) backend: Arc<dyn AudioBackend>,
    pub(crate) control: Arc<RouteControl>,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) retry_backoff: Duration,
}

type Streams = (Box<dyn InputStream>, Box<dyn OutputStream>);

impl Pump {
    /// Run the route to completion on the current thread.
    ///
    /// `started` receives the stream-open outcome exactly once; `terminated`
    /// is signalled after both streams are closed.
    pub(crate) fn run(self, started: Sender<Result<(), RouteError>>, terminated: Sender<()>) {
        let id = self.spec.id;

        match self.open_streams() {
            Ok((mut input, mut output)) => {
                self.control.set_state(RouteState::Running);
                let _ = started.send(Ok(()));
                tracing::info!(
                    route = id,
                    adapter = %self.spec.adapter(),
                    "route running"
                );

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    self.pump(input.as_mut(), output.as_mut())
                }));
                let result = outcome.unwrap_or_else(|payload| {
                    Err(RouteError::Fatal {
                        route: id,
                        reason: panic_message(payload.as_ref()),
                    })
                });
                if let Err(e) = result {
                    tracing::error!(route = id, error = %e, "route aborted");
                }

                self.control.set_state(RouteState::Stopping);
                close_input(id, input);
                close_output(id, output);
            }
            Err(e) => {
                tracing::error!(route = id, error = %e, "route failed to start");
                let _ = started.send(Err(e));
            }
        }

        self.control.deactivate();
        self.control.set_state(RouteState::Terminated);
        tracing::info!(route = id, chunks = self.control.chunks(), "route stopped");
        let _ = terminated.send(());
    }

    fn open_streams(&self) -> Result<Streams, RouteError> {
        let id = self.spec.id;
        let input = self
            .backend
            .open_input_stream(&self.spec.params(&self.spec.input))
            .map_err(|source| RouteError::StreamOpen {
                route: id,
                direction: Direction::Input,
                source,
            })?;

        match self
            .backend
            .open_output_stream(&self.spec.params(&self.spec.output))
        {
            Ok(output) => Ok((input, output)),
            Err(source) => {
                close_input(id, input);
                Err(RouteError::StreamOpen {
                    route: id,
                    direction: Direction::Output,
                    source,
                })
            }
        }
    }

    fn should_continue(&self) -> bool {
        self.control.is_active() && self.running.load(Ordering::SeqCst)
    }

    fn pump(
        &self,
        input: &mut dyn InputStream,
        output: &mut dyn OutputStream,
    ) -> Result<(), RouteError> {
        let id = self.spec.id;
        let adapter = self.spec.adapter();
        let frames = self.spec.chunk_size as usize;

        while self.should_continue() {
            match transfer(input, output, adapter, frames) {
                Ok(()) => {
                    self.control.chunks.fetch_add(1, Ordering::Relaxed);
                }
                Err(source) if source.is_transient() => {
                    self.control.faults.fetch_add(1, Ordering::Relaxed);
                    let fault = RouteError::TransientIo { route: id, source };
                    tracing::warn!(route = id, error = %fault, "retrying after I/O fault");
                    std::thread::sleep(self.retry_backoff);
                }
                Err(source) => {
                    return Err(RouteError::Fatal {
                        route: id,
                        reason: source.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Move one chunk from input to output.
fn transfer(
    input: &mut dyn InputStream,
    output: &mut dyn OutputStream,
    adapter: ChannelAdapter,
    frames: usize,
) -> patchbay_io::Result<()> {
    let chunk = input.read(frames, OverflowPolicy::Discard)?;
    let adapted = adapter.apply(&chunk);
    output.write(&adapted)
}

fn close_input(route: RouteId, mut stream: Box<dyn InputStream>) {
    if let Err(e) = stream.stop() {
        tracing::warn!(route, error = %e, "failed to stop input stream");
    }
    if let Err(e) = stream.close() {
        tracing::warn!(route, error = %e, "failed to close input stream");
    }
}

fn close_output(route: RouteId, mut stream: Box<dyn OutputStream>) {
    if let Err(e) = stream.stop() {
        tracing::warn!(route, error = %e, "failed to stop output stream");
    }
    if let Err(e) = stream.close() {
        tracing::warn!(route, error = %e, "failed to close output stream");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use patchbay_io::{MockBackend, MockDevice};

    fn descriptor(index: usize, channels: u16) -> DeviceDescriptor {
        DeviceDescriptor {
            catalog_index: index,
            name: format!("dev{index}"),
            channels,
            default_sample_rate: 44100.0,
        }
    }

    fn spec(input_channels: u16, output_channels: u16) -> RouteSpec {
        RouteSpec {
            id: 1,
            input: descriptor(0, input_channels),
            output: descriptor(1, output_channels),
            sample_rate: 44100,
            chunk_size: 4,
        }
    }

    struct Harness {
        control: Arc<RouteControl>,
        started: crossbeam_channel::Receiver<Result<(), RouteError>>,
        terminated: crossbeam_channel::Receiver<()>,
        handle: std::thread::JoinHandle<()>,
    }

    fn launch(backend: Arc<MockBackend>, spec: RouteSpec) -> Harness {
        let control = Arc::new(RouteControl::new());
        let (started_tx, started) = bounded(1);
        let (terminated_tx, terminated) = bounded(1);
        let pump = Pump {
            spec,
            backend,
            control: Arc::clone(&control),
            running: Arc::new(AtomicBool::new(true)),
            retry_backoff: Duration::from_millis(1),
        };
        let handle = std::thread::spawn(move || pump.run(started_tx, terminated_tx));
        Harness {
            control,
            started,
            terminated,
            handle,
        }
    }

    fn wait_for_chunks(control: &RouteControl, n: u64) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while control.chunks() < n {
            assert!(std::time::Instant::now() < deadline, "pump made no progress");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn mono_input_reaches_stereo_output_duplicated() {
        let backend = Arc::new(
            MockBackend::new(vec![MockDevice::input("Mic", 1), MockDevice::output("Out", 2)])
                .with_read_delay(Duration::ZERO),
        );
        let h = launch(Arc::clone(&backend), spec(1, 2));
        assert!(h.started.recv().unwrap().is_ok());
        wait_for_chunks(&h.control, 2);

        h.control.deactivate();
        h.terminated.recv_timeout(Duration::from_secs(2)).unwrap();
        h.handle.join().unwrap();

        let written = backend.written(1);
        assert!(written.len() >= 16);
        assert_eq!(&written[..8], &[0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        assert_eq!(h.control.state(), RouteState::Terminated);
    }

    #[test]
    fn streams_closed_in_matched_pairs() {
        let backend = Arc::new(
            MockBackend::new(vec![MockDevice::input("Mic", 2), MockDevice::output("Out", 2)])
                .with_read_delay(Duration::ZERO),
        );
        let h = launch(Arc::clone(&backend), spec(2, 2));
        h.started.recv().unwrap().unwrap();
        h.control.deactivate();
        h.handle.join().unwrap();

        let stats = backend.stats();
        assert_eq!(stats.inputs_opened, 1);
        assert_eq!(stats.inputs_closed, 1);
        assert_eq!(stats.outputs_opened, 1);
        assert_eq!(stats.outputs_closed, 1);
    }

    #[test]
    fn output_open_failure_closes_input() {
        let backend = Arc::new(MockBackend::new(vec![
            MockDevice::input("Mic", 2),
            MockDevice::output("Busy", 2).fail_open("exclusive mode"),
        ]));
        let h = launch(Arc::clone(&backend), spec(2, 2));

        let err = h.started.recv().unwrap().unwrap_err();
        assert!(matches!(
            err,
            RouteError::StreamOpen {
                direction: Direction::Output,
                ..
            }
        ));
        h.handle.join().unwrap();

        assert_eq!(backend.stats().open_streams(), 0);
        assert_eq!(backend.stats().inputs_closed, 1);
        assert!(!h.control.is_active());
        assert_eq!(h.control.chunks(), 0);
    }

    #[test]
    fn transient_faults_are_survived() {
        let backend = Arc::new(
            MockBackend::new(vec![
                MockDevice::input("Flaky", 2).read_faults(3),
                MockDevice::output("Out", 2).write_faults(2),
            ])
            .with_read_delay(Duration::ZERO),
        );
        let h = launch(Arc::clone(&backend), spec(2, 2));
        h.started.recv().unwrap().unwrap();
        wait_for_chunks(&h.control, 3);

        assert_eq!(h.control.faults(), 5);
        assert!(h.control.is_active());
        assert_eq!(h.control.state(), RouteState::Running);

        h.control.deactivate();
        h.handle.join().unwrap();
    }

    #[test]
    fn input_overflow_is_discarded() {
        let backend = Arc::new(
            MockBackend::new(vec![
                MockDevice::input("Busy Mic", 2).overflow_every(2),
                MockDevice::output("Out", 2),
            ])
            .with_read_delay(Duration::ZERO),
        );
        let h = launch(Arc::clone(&backend), spec(2, 2));
        h.started.recv().unwrap().unwrap();
        wait_for_chunks(&h.control, 4);

        assert_eq!(h.control.faults(), 0);
        assert_eq!(h.control.state(), RouteState::Running);

        h.control.deactivate();
        h.handle.join().unwrap();

        // Second chunk was lost to the overflow; the third follows the first.
        let written = backend.written(1);
        assert_eq!(&written[..8], &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(written[8], 16.0);
    }

    #[test]
    fn panic_in_cycle_still_closes_streams() {
        let backend = Arc::new(
            MockBackend::new(vec![
                MockDevice::input("Cursed", 2).panic_after(2),
                MockDevice::output("Out", 2),
            ])
            .with_read_delay(Duration::ZERO),
        );
        let h = launch(Arc::clone(&backend), spec(2, 2));
        h.started.recv().unwrap().unwrap();

        h.terminated.recv_timeout(Duration::from_secs(2)).unwrap();
        // The panic is contained; the worker thread itself exits normally.
        h.handle.join().unwrap();

        assert_eq!(h.control.chunks(), 2);
        assert!(!h.control.is_active());
        assert_eq!(h.control.state(), RouteState::Terminated);
        assert_eq!(backend.stats().open_streams(), 0);
        assert_eq!(backend.stats().inputs_closed, 1);
        assert_eq!(backend.stats().outputs_closed, 1);
    }

    #[test]
    fn disconnect_terminates_route() {
        let backend = Arc::new(
            MockBackend::new(vec![
                MockDevice::input("Unplugged", 2).disconnect_after(2),
                MockDevice::output("Out", 2),
            ])
            .with_read_delay(Duration::ZERO),
        );
        let h = launch(Arc::clone(&backend), spec(2, 2));
        h.started.recv().unwrap().unwrap();

        h.terminated.recv_timeout(Duration::from_secs(2)).unwrap();
        h.handle.join().unwrap();

        assert_eq!(h.control.chunks(), 2);
        assert!(!h.control.is_active());
        assert_eq!(h.control.state(), RouteState::Terminated);
        assert_eq!(backend.stats().open_streams(), 0);
    }

    #[test]
    fn router_flag_stops_active_route() {
        let backend = Arc::new(
            MockBackend::new(vec![MockDevice::input("Mic", 2), MockDevice::output("Out", 2)])
                .with_read_delay(Duration::ZERO),
        );
        let control = Arc::new(RouteControl::new());
        let running = Arc::new(AtomicBool::new(true));
        let (started_tx, started) = bounded(1);
        let (terminated_tx, terminated) = bounded(1);
        let pump = Pump {
            spec: spec(2, 2),
            backend: backend.clone(),
            control: Arc::clone(&control),
            running: Arc::clone(&running),
            retry_backoff: Duration::from_millis(1),
        };
        let handle = std::thread::spawn(move || pump.run(started_tx, terminated_tx));
        started.recv().unwrap().unwrap();

        running.store(false, Ordering::SeqCst);
        terminated.recv_timeout(Duration::from_secs(2)).unwrap();
        handle.join().unwrap();
        assert_eq!(control.state(), RouteState::Terminated);
    }

    #[test]
    fn panic_payload_messages() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "worker panicked");
    }
}

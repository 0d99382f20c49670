//! Deterministic in-memory backend.
//!
//! [`MockBackend`] serves a fixed list of [`MockDevice`]s. Input streams
//! produce a ramp (`0.0, 1.0, 2.0, ...` per stream) so tests can check exactly
//! which samples reached an output, and output streams record what was
//! written. Devices can be scripted to fail or dawdle at open time, to fail a
//! number of reads or writes, to overflow, to disconnect, to panic, or to
//! stall inside `read`.
//!
//! ```rust,ignore
//! use patchbay_io::{MockBackend, MockDevice};
//!
//! let backend = MockBackend::new(vec![
//!     MockDevice::input("Mic", 1),
//!     MockDevice::output("Speakers", 2),
//! ]);
//! ```

use crate::backend::{
    AudioBackend, DeviceIndex, DeviceInfo, Direction, HostApiId, InputStream, OutputStream,
    OverflowPolicy, StreamParams,
};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Recorded samples kept per output device.
const RECORD_LIMIT: usize = 1 << 20;

/// Scripted device description.
#[derive(Debug, Clone)]
pub struct MockDevice {
    name: String,
    host_api: HostApiId,
    input_channels: u16,
    output_channels: u16,
    default_sample_rate: f64,
    open_error: Option<String>,
    read_faults: usize,
    write_faults: usize,
    disconnect_after: Option<usize>,
    panic_after: Option<usize>,
    overflow_every: Option<usize>,
    open_delay: Duration,
    stall_reads: bool,
}

impl MockDevice {
    /// A device with the given channel capabilities on host API 0.
    pub fn new(name: impl Into<String>, input_channels: u16, output_channels: u16) -> Self {
        Self {
            name: name.into(),
            host_api: 0,
            input_channels,
            output_channels,
            default_sample_rate: 44100.0,
            open_error: None,
            read_faults: 0,
            write_faults: 0,
            disconnect_after: None,
            panic_after: None,
            overflow_every: None,
            open_delay: Duration::ZERO,
            stall_reads: false,
        }
    }

    /// Capture-only device.
    pub fn input(name: impl Into<String>, channels: u16) -> Self {
        Self::new(name, channels, 0)
    }

    /// Playback-only device.
    pub fn output(name: impl Into<String>, channels: u16) -> Self {
        Self::new(name, 0, channels)
    }

    /// Place the device under another host API.
    pub fn host_api(mut self, host_api: HostApiId) -> Self {
        self.host_api = host_api;
        self
    }

    /// Set the reported default sample rate.
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.default_sample_rate = rate;
        self
    }

    /// Every open fails with [`Error::DeviceBusy`].
    pub fn fail_open(mut self, reason: impl Into<String>) -> Self {
        self.open_error = Some(reason.into());
        self
    }

    /// The first `count` reads of each stream fail transiently.
    pub fn read_faults(mut self, count: usize) -> Self {
        self.read_faults = count;
        self
    }

    /// The first `count` writes of each stream fail transiently.
    pub fn write_faults(mut self, count: usize) -> Self {
        self.write_faults = count;
        self
    }

    /// Reads fail with [`Error::Disconnected`] after `reads` successful reads.
    pub fn disconnect_after(mut self, reads: usize) -> Self {
        self.disconnect_after = Some(reads);
        self
    }

    /// Reads panic after `reads` successful reads.
    pub fn panic_after(mut self, reads: usize) -> Self {
        self.panic_after = Some(reads);
        self
    }

    /// Every `n`th read finds the capture queue overflowed.
    ///
    /// Under [`OverflowPolicy::Error`] that read fails with
    /// [`Error::InputOverflow`]; under [`OverflowPolicy::Discard`] the lost
    /// chunk is skipped and the read returns the next one.
    pub fn overflow_every(mut self, n: usize) -> Self {
        self.overflow_every = Some(n.max(1));
        self
    }

    /// Opening a stream on this device takes `delay`.
    pub fn open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Reads block until [`MockBackend::release_stalls`] is called.
    pub fn stall_reads(mut self) -> Self {
        self.stall_reads = true;
        self
    }
}

/// Stream open/close counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    /// Input streams opened.
    pub inputs_opened: usize,
    /// Input streams closed.
    pub inputs_closed: usize,
    /// Output streams opened.
    pub outputs_opened: usize,
    /// Output streams closed.
    pub outputs_closed: usize,
}

impl MockStats {
    /// Streams currently open in either direction.
    pub fn open_streams(&self) -> usize {
        (self.inputs_opened - self.inputs_closed) + (self.outputs_opened - self.outputs_closed)
    }
}

#[derive(Debug, Default)]
struct MockState {
    stats: HashMap<DeviceIndex, MockStats>,
    recorded: HashMap<DeviceIndex, Vec<f32>>,
    writes: HashMap<DeviceIndex, usize>,
}

/// In-memory [`AudioBackend`] for tests and dry runs.
pub struct MockBackend {
    devices: Vec<MockDevice>,
    default_host_api: HostApiId,
    read_delay: Duration,
    state: Arc<Mutex<MockState>>,
    release: Arc<AtomicBool>,
    terminated: AtomicBool,
}

impl MockBackend {
    /// Backend serving `devices` with host API 0 as default.
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            devices,
            default_host_api: 0,
            read_delay: Duration::from_millis(1),
            state: Arc::new(Mutex::new(MockState::default())),
            release: Arc::new(AtomicBool::new(false)),
            terminated: AtomicBool::new(false),
        }
    }

    /// A small fixed rig: a mono mic, a stereo interface, speakers and a
    /// device on a secondary host API.
    pub fn demo() -> Self {
        Self::new(vec![
            MockDevice::input("Built-in Microphone", 1),
            MockDevice::new("USB Audio Interface", 2, 2).sample_rate(48000.0),
            MockDevice::output("Built-in Speakers", 2),
            MockDevice::new("Virtual Cable", 2, 2).host_api(1),
        ])
        .with_read_delay(Duration::from_millis(10))
    }

    /// Change which host API counts as the default.
    pub fn with_default_host_api(mut self, host_api: HostApiId) -> Self {
        self.default_host_api = host_api;
        self
    }

    /// Pause inside every read, approximating device pacing.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Unblock every read stalled by [`MockDevice::stall_reads`].
    pub fn release_stalls(&self) {
        self.release.store(true, Ordering::SeqCst);
    }

    /// Open/close counters summed over all devices.
    pub fn stats(&self) -> MockStats {
        let state = self.state.lock();
        state
            .stats
            .values()
            .fold(MockStats::default(), |acc, s| MockStats {
                inputs_opened: acc.inputs_opened + s.inputs_opened,
                inputs_closed: acc.inputs_closed + s.inputs_closed,
                outputs_opened: acc.outputs_opened + s.outputs_opened,
                outputs_closed: acc.outputs_closed + s.outputs_closed,
            })
    }

    /// Open/close counters for one device.
    pub fn device_stats(&self, index: DeviceIndex) -> MockStats {
        self.state
            .lock()
            .stats
            .get(&index)
            .copied()
            .unwrap_or_default()
    }

    /// Samples written to an output device so far (capped).
    pub fn written(&self, index: DeviceIndex) -> Vec<f32> {
        self.state
            .lock()
            .recorded
            .get(&index)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of successful writes to an output device.
    pub fn write_count(&self, index: DeviceIndex) -> usize {
        self.state.lock().writes.get(&index).copied().unwrap_or(0)
    }

    /// Whether [`AudioBackend::terminate`] has been called.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_terminated() {
            return Err(Error::Terminated);
        }
        Ok(())
    }

    fn device(&self, index: DeviceIndex) -> Result<&MockDevice> {
        self.devices.get(index).ok_or_else(|| {
            Error::DeviceNotFound(format!(
                "device index {} (only {} devices available)",
                index,
                self.devices.len()
            ))
        })
    }

    fn check_open(&self, params: &StreamParams, direction: Direction) -> Result<&MockDevice> {
        self.ensure_open()?;
        let device = self.device(params.device)?;
        if !device.open_delay.is_zero() {
            std::thread::sleep(device.open_delay);
        }
        if let Some(reason) = &device.open_error {
            return Err(Error::DeviceBusy(reason.clone()));
        }
        let max = match direction {
            Direction::Input => device.input_channels,
            Direction::Output => device.output_channels,
        };
        if params.channels == 0 || params.channels > max {
            return Err(Error::UnsupportedConfig(format!(
                "{} channels on {} device '{}' (max {})",
                params.channels, direction, device.name, max
            )));
        }
        if params.sample_rate == 0 || params.frames_per_buffer == 0 {
            return Err(Error::UnsupportedConfig(format!(
                "sample rate {} / buffer {}",
                params.sample_rate, params.frames_per_buffer
            )));
        }
        Ok(device)
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn default_host_api(&self) -> HostApiId {
        self.default_host_api
    }

    fn device_count(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.devices.len())
    }

    fn device_info(&self, index: DeviceIndex) -> Result<DeviceInfo> {
        self.ensure_open()?;
        let device = self.device(index)?;
        Ok(DeviceInfo {
            index,
            name: device.name.clone(),
            host_api: device.host_api,
            max_input_channels: device.input_channels,
            max_output_channels: device.output_channels,
            default_sample_rate: device.default_sample_rate,
        })
    }

    fn open_input_stream(&self, params: &StreamParams) -> Result<Box<dyn InputStream>> {
        let device = self.check_open(params, Direction::Input)?;
        self.state
            .lock()
            .stats
            .entry(params.device)
            .or_default()
            .inputs_opened += 1;

        Ok(Box::new(MockInputStream {
            device: params.device,
            channels: params.channels as usize,
            next_sample: 0.0,
            reads: 0,
            polls: 0,
            faults_left: device.read_faults,
            disconnect_after: device.disconnect_after,
            panic_after: device.panic_after,
            overflow_every: device.overflow_every,
            stall: device.stall_reads,
            delay: self.read_delay,
            release: Arc::clone(&self.release),
            state: Arc::clone(&self.state),
            stopped: false,
        }))
    }

    fn open_output_stream(&self, params: &StreamParams) -> Result<Box<dyn OutputStream>> {
        let device = self.check_open(params, Direction::Output)?;
        self.state
            .lock()
            .stats
            .entry(params.device)
            .or_default()
            .outputs_opened += 1;

        Ok(Box::new(MockOutputStream {
            device: params.device,
            faults_left: device.write_faults,
            state: Arc::clone(&self.state),
            stopped: false,
        }))
    }

    fn terminate(&self) -> Result<()> {
        self.terminated.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockInputStream {
    device: DeviceIndex,
    channels: usize,
    next_sample: f32,
    reads: usize,
    polls: usize,
    faults_left: usize,
    disconnect_after: Option<usize>,
    panic_after: Option<usize>,
    overflow_every: Option<usize>,
    stall: bool,
    delay: Duration,
    release: Arc<AtomicBool>,
    state: Arc<Mutex<MockState>>,
    stopped: bool,
}

impl InputStream for MockInputStream {
    fn read(&mut self, frames: usize, overflow: OverflowPolicy) -> Result<Vec<f32>> {
        if self.stopped {
            return Err(Error::Closed);
        }
        if self.stall {
            while !self.release.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.faults_left > 0 {
            self.faults_left -= 1;
            return Err(Error::Stream("mock read fault".into()));
        }
        if self.disconnect_after.is_some_and(|limit| self.reads >= limit) {
            return Err(Error::Disconnected(format!("mock device {}", self.device)));
        }
        if self.panic_after.is_some_and(|limit| self.reads >= limit) {
            panic!("mock device {} panicked in read", self.device);
        }

        let len = frames * self.channels;
        self.polls += 1;
        if self.overflow_every.is_some_and(|n| self.polls % n == 0) {
            match overflow {
                OverflowPolicy::Error => return Err(Error::InputOverflow),
                OverflowPolicy::Discard => self.next_sample += len as f32,
            }
        }

        self.reads += 1;
        let samples = (0..len)
            .map(|_| {
                let s = self.next_sample;
                self.next_sample += 1.0;
                s
            })
            .collect();
        Ok(samples)
    }

    fn stop(&mut self) -> Result<()> {
        self.stopped = true;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.state
            .lock()
            .stats
            .entry(self.device)
            .or_default()
            .inputs_closed += 1;
        Ok(())
    }
}

struct MockOutputStream {
    device: DeviceIndex,
    faults_left: usize,
    state: Arc<Mutex<MockState>>,
    stopped: bool,
}

impl OutputStream for MockOutputStream {
    fn write(&mut self, samples: &[f32]) -> Result<()> {
        if self.stopped {
            return Err(Error::Closed);
        }
        if self.faults_left > 0 {
            self.faults_left -= 1;
            return Err(Error::Stream("mock write fault".into()));
        }

        let mut state = self.state.lock();
        *state.writes.entry(self.device).or_default() += 1;
        let recorded = state.recorded.entry(self.device).or_default();
        let room = RECORD_LIMIT.saturating_sub(recorded.len());
        recorded.extend_from_slice(&samples[..samples.len().min(room)]);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stopped = true;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.state
            .lock()
            .stats
            .entry(self.device)
            .or_default()
            .outputs_closed += 1;
        Ok(())
    }
}

//! cpal-based audio backend implementation.
//!
//! [`CpalBackend`] exposes every device of every cpal host as one flat
//! catalog and turns cpal's callback streams into blocking
//! [`InputStream`]/[`OutputStream`] handles.
//!
//! ## Catalog Layout
//!
//! Hosts are visited in `cpal::available_hosts()` order and each host's
//! devices are appended in the order cpal reports them. The host API id of a
//! device is the position of its host in that list. Only the host returned by
//! `cpal::default_host()` counts as the default host API.
//!
//! ## Callback Bridging
//!
//! ```text
//! cpal input callback ──try_send──▶ bounded queue ──recv_timeout──▶ read()
//! write() ──send_timeout──▶ bounded queue ──try_recv──▶ cpal output callback
//! ```
//!
//! The input callback never blocks: when the queue is full the chunk is
//! dropped and an overflow is recorded for the next [`InputStream::read`].
//! The output callback plays silence when the queue runs dry.

use crate::backend::{
    AudioBackend, DeviceIndex, DeviceInfo, Direction, HostApiId, InputStream, OutputStream,
    OverflowPolicy, StreamParams,
};
use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, HostId};
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Chunks buffered between a cpal callback and the blocking side.
const QUEUE_CHUNKS: usize = 8;

/// Longest a read or write waits before reporting [`Error::Timeout`].
const IO_TIMEOUT: Duration = Duration::from_secs(1);

/// Extract device name via `description()` (cpal 0.17+).
fn device_name(device: &Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

/// Query one device's capabilities.
fn describe(index: DeviceIndex, host_api: HostApiId, device: &Device) -> DeviceInfo {
    let name = device_name(device).unwrap_or_else(|_| "unknown".to_string());
    let max_input_channels = device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);
    let max_output_channels = device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);
    let default_sample_rate = device
        .default_input_config()
        .or_else(|_| device.default_output_config())
        .map(|c| c.sample_rate())
        .unwrap_or(44100);

    DeviceInfo {
        index,
        name,
        host_api,
        max_input_channels,
        max_output_channels,
        default_sample_rate: f64::from(default_sample_rate),
    }
}

fn build_error(err: cpal::BuildStreamError) -> Error {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => Error::DeviceBusy(err.to_string()),
        cpal::BuildStreamError::StreamConfigNotSupported
        | cpal::BuildStreamError::InvalidArgument => Error::UnsupportedConfig(err.to_string()),
        other => Error::Stream(other.to_string()),
    }
}

/// cpal-based audio backend.
///
/// Holds only host identifiers; devices are re-enumerated on every query, so
/// a catalog index names whatever device sits at that position right now.
pub struct CpalBackend {
    hosts: Vec<HostId>,
    default_host: HostId,
    terminated: AtomicBool,
}

impl CpalBackend {
    /// Create a backend over all hosts available on this platform.
    pub fn new() -> Self {
        let default_host = cpal::default_host().id();
        let hosts = cpal::available_hosts();
        tracing::info!(
            host = default_host.name(),
            hosts = hosts.len(),
            "cpal backend initialized"
        );
        Self {
            hosts,
            default_host,
            terminated: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(Error::Terminated);
        }
        Ok(())
    }

    /// Every device of every available host, tagged with its host API id.
    fn catalog(&self) -> Result<Vec<(HostApiId, Device)>> {
        self.ensure_open()?;
        let mut devices = Vec::new();
        for (host_api, id) in self.hosts.iter().enumerate() {
            let host = match cpal::host_from_id(*id) {
                Ok(host) => host,
                Err(e) => {
                    tracing::debug!(host = id.name(), error = %e, "host unavailable");
                    continue;
                }
            };
            match host.devices() {
                Ok(list) => devices.extend(list.map(|d| (host_api, d))),
                Err(e) => {
                    tracing::warn!(host = id.name(), error = %e, "device enumeration failed");
                }
            }
        }
        Ok(devices)
    }

    fn device_at(&self, index: DeviceIndex) -> Result<Device> {
        let mut catalog = self.catalog()?;
        let count = catalog.len();
        if index >= count {
            return Err(Error::DeviceNotFound(format!(
                "device index {} (only {} devices available)",
                index, count
            )));
        }
        Ok(catalog.swap_remove(index).1)
    }

    fn stream_config(params: &StreamParams) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: params.channels,
            sample_rate: params.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(params.frames_per_buffer),
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn default_host_api(&self) -> HostApiId {
        self.hosts
            .iter()
            .position(|id| *id == self.default_host)
            .unwrap_or(0)
    }

    fn device_count(&self) -> Result<usize> {
        Ok(self.catalog()?.len())
    }

    fn device_info(&self, index: DeviceIndex) -> Result<DeviceInfo> {
        let catalog = self.catalog()?;
        let (host_api, device) = catalog.get(index).ok_or_else(|| {
            Error::DeviceNotFound(format!(
                "device index {} (only {} devices available)",
                index,
                catalog.len()
            ))
        })?;
        Ok(describe(index, *host_api, device))
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        let catalog = self.catalog()?;
        Ok(catalog
            .iter()
            .enumerate()
            .map(|(index, (host_api, device))| describe(index, *host_api, device))
            .collect())
    }

    fn open_input_stream(&self, params: &StreamParams) -> Result<Box<dyn InputStream>> {
        let device = self.device_at(params.device)?;
        let (tx, rx) = bounded::<Vec<f32>>(QUEUE_CHUNKS);
        let overflowed = Arc::new(AtomicBool::new(false));
        let disconnected = Arc::new(AtomicBool::new(false));

        let stream = {
            let overflowed = Arc::clone(&overflowed);
            let disconnected = Arc::clone(&disconnected);
            device
                .build_input_stream(
                    &Self::stream_config(params),
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if tx.try_send(data.to_vec()).is_err() {
                            overflowed.store(true, Ordering::Relaxed);
                        }
                    },
                    move |err| {
                        if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                            disconnected.store(true, Ordering::SeqCst);
                        }
                        tracing::error!("Input stream error: {}", err);
                    },
                    None,
                )
                .map_err(build_error)?
        };

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            device = params.device,
            channels = params.channels,
            sample_rate = params.sample_rate,
            "input stream started"
        );

        Ok(Box::new(CpalInputStream {
            stream: Some(stream),
            rx,
            pending: Vec::with_capacity(params.samples_per_buffer() * 2),
            channels: params.channels as usize,
            overflowed,
            disconnected,
        }))
    }

    fn open_output_stream(&self, params: &StreamParams) -> Result<Box<dyn OutputStream>> {
        let device = self.device_at(params.device)?;
        let (tx, rx) = bounded::<Vec<f32>>(QUEUE_CHUNKS);
        let disconnected = Arc::new(AtomicBool::new(false));

        let stream = {
            let disconnected = Arc::clone(&disconnected);
            let mut pending: VecDeque<f32> = VecDeque::with_capacity(params.samples_per_buffer());
            device
                .build_output_stream(
                    &Self::stream_config(params),
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        while pending.len() < data.len() {
                            match rx.try_recv() {
                                Ok(chunk) => pending.extend(chunk),
                                Err(_) => break,
                            }
                        }
                        for sample in data.iter_mut() {
                            *sample = pending.pop_front().unwrap_or(0.0);
                        }
                    },
                    move |err| {
                        if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                            disconnected.store(true, Ordering::SeqCst);
                        }
                        tracing::error!("Output stream error: {}", err);
                    },
                    None,
                )
                .map_err(build_error)?
        };

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            device = params.device,
            channels = params.channels,
            sample_rate = params.sample_rate,
            "output stream started"
        );

        Ok(Box::new(CpalOutputStream {
            stream: Some(stream),
            tx,
            disconnected,
        }))
    }

    fn terminate(&self) -> Result<()> {
        if !self.terminated.swap(true, Ordering::SeqCst) {
            tracing::info!("cpal backend terminated");
        }
        Ok(())
    }
}

/// Blocking view over a cpal input stream.
struct CpalInputStream {
    stream: Option<cpal::Stream>,
    rx: Receiver<Vec<f32>>,
    pending: Vec<f32>,
    channels: usize,
    overflowed: Arc<AtomicBool>,
    disconnected: Arc<AtomicBool>,
}

impl InputStream for CpalInputStream {
    fn read(&mut self, frames: usize, overflow: OverflowPolicy) -> Result<Vec<f32>> {
        if self.stream.is_none() {
            return Err(Error::Closed);
        }
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(Error::Disconnected(Direction::Input.to_string()));
        }
        if self.overflowed.swap(false, Ordering::Relaxed) {
            match overflow {
                OverflowPolicy::Error => return Err(Error::InputOverflow),
                OverflowPolicy::Discard => tracing::trace!("input overflow discarded"),
            }
        }

        let needed = frames * self.channels;
        while self.pending.len() < needed {
            match self.rx.recv_timeout(IO_TIMEOUT) {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Timeout) => return Err(Error::Timeout),
                Err(RecvTimeoutError::Disconnected) => return Err(Error::Closed),
            }
        }
        Ok(self.pending.drain(..needed).collect())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_ref() {
            stream.pause().map_err(|e| Error::Stream(e.to_string()))?;
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.stream.take();
        Ok(())
    }
}

/// Blocking view over a cpal output stream.
struct CpalOutputStream {
    stream: Option<cpal::Stream>,
    tx: Sender<Vec<f32>>,
    disconnected: Arc<AtomicBool>,
}

impl OutputStream for CpalOutputStream {
    fn write(&mut self, samples: &[f32]) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::Closed);
        }
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(Error::Disconnected(Direction::Output.to_string()));
        }
        match self.tx.send_timeout(samples.to_vec(), IO_TIMEOUT) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(Error::Timeout),
            Err(SendTimeoutError::Disconnected(_)) => Err(Error::Closed),
        }
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_ref() {
            stream.pause().map_err(|e| Error::Stream(e.to_string()))?;
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.stream.take();
        Ok(())
    }
}

//! Pluggable audio backend abstraction.
//!
//! This module defines the [`AudioBackend`] trait, which decouples the routing
//! engine from any specific platform audio API. Two implementations ship with
//! the crate:
//!
//! - **Desktop**: [`CpalBackend`](crate::CpalBackend) (ALSA, CoreAudio, WASAPI, JACK)
//! - **Testing**: [`MockBackend`](crate::MockBackend), deterministic and in-memory
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │     Router / Device Catalog      │
//! └──────────────┬───────────────────┘
//!                │ Arc<dyn AudioBackend>
//!                ▼
//! ┌──────────────────────────────────┐
//! │        AudioBackend trait        │
//! │ device_info / open_*_stream      │
//! └──────────────┬───────────────────┘
//!        ┌───────┴────────┐
//!        ▼                ▼
//! ┌─────────────┐  ┌─────────────┐
//! │ CpalBackend │  │ MockBackend │
//! └─────────────┘  └─────────────┘
//! ```
//!
//! ## Stream Model
//!
//! Unlike callback-driven APIs, streams here are *blocking handles*: a route
//! worker calls [`InputStream::read`] for one chunk, then
//! [`OutputStream::write`] with the converted chunk. Streams are opened,
//! used, stopped and closed on the same thread, so the handles are not
//! required to be `Send`.

use crate::Result;

/// Native device handle in the backend catalog.
///
/// Catalog indices are dense within one backend session but do not match
/// positions in filtered input/output lists.
pub type DeviceIndex = usize;

/// Identifier of the host API (driver layer) a device belongs to.
pub type HostApiId = usize;

/// Snapshot of one catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    /// Catalog index of this device.
    pub index: DeviceIndex,
    /// Human-readable device name.
    pub name: String,
    /// Host API the device is exposed through.
    pub host_api: HostApiId,
    /// Maximum capture channels (0 for output-only devices).
    pub max_input_channels: u16,
    /// Maximum playback channels (0 for input-only devices).
    pub max_output_channels: u16,
    /// Default sample rate in Hz.
    pub default_sample_rate: f64,
}

impl DeviceInfo {
    /// Whether the device can capture audio.
    pub fn is_input(&self) -> bool {
        self.max_input_channels > 0
    }

    /// Whether the device can play audio.
    pub fn is_output(&self) -> bool {
        self.max_output_channels > 0
    }
}

/// Stream direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Capture.
    Input,
    /// Playback.
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Parameters for opening a blocking stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParams {
    /// Catalog index of the device.
    pub device: DeviceIndex,
    /// Interleaved channel count.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per read/write call.
    pub frames_per_buffer: u32,
}

impl StreamParams {
    /// Create stream parameters.
    pub fn new(device: DeviceIndex, channels: u16, sample_rate: u32, frames_per_buffer: u32) -> Self {
        Self {
            device,
            channels,
            sample_rate,
            frames_per_buffer,
        }
    }

    /// Number of interleaved samples in one buffer.
    pub fn samples_per_buffer(&self) -> usize {
        self.frames_per_buffer as usize * self.channels as usize
    }
}

/// What a read does when captured audio was dropped since the last read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Report [`Error::InputOverflow`](crate::Error::InputOverflow).
    Error,
    /// Forget the dropped audio and return the next available chunk.
    #[default]
    Discard,
}

/// Blocking capture stream.
pub trait InputStream {
    /// Read exactly `frames` frames of interleaved samples.
    ///
    /// Blocks until enough audio is captured. Returns `frames * channels`
    /// samples on success.
    fn read(&mut self, frames: usize, overflow: OverflowPolicy) -> Result<Vec<f32>>;

    /// Stop capturing. Further reads fail with [`Error::Closed`](crate::Error::Closed).
    fn stop(&mut self) -> Result<()>;

    /// Release the stream.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Blocking playback stream.
pub trait OutputStream {
    /// Queue interleaved samples for playback, blocking while the device
    /// buffer is full.
    fn write(&mut self, samples: &[f32]) -> Result<()>;

    /// Stop playback. Further writes fail with [`Error::Closed`](crate::Error::Closed).
    fn stop(&mut self) -> Result<()>;

    /// Release the stream.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Pluggable audio backend trait.
///
/// One backend value is one audio session. It is shared between the device
/// catalog and every route worker as `Arc<dyn AudioBackend>`, so queries and
/// stream opens must be callable concurrently.
pub trait AudioBackend: Send + Sync {
    /// Human-readable name of this backend (e.g., "cpal", "mock").
    fn name(&self) -> &str;

    /// Host API that counts as the system default.
    fn default_host_api(&self) -> HostApiId;

    /// Number of devices in the catalog, across all host APIs.
    fn device_count(&self) -> Result<usize>;

    /// Describe the device at `index`.
    fn device_info(&self, index: DeviceIndex) -> Result<DeviceInfo>;

    /// Snapshot of the whole catalog in index order.
    ///
    /// Devices whose info cannot be read are skipped with a warning. Backends
    /// with expensive per-device queries should override this to walk their
    /// devices once.
    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        let count = self.device_count()?;
        Ok((0..count)
            .filter_map(|index| match self.device_info(index) {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::warn!(device = index, error = %e, "skipping unreadable device");
                    None
                }
            })
            .collect())
    }

    /// Open and start a capture stream.
    fn open_input_stream(&self, params: &StreamParams) -> Result<Box<dyn InputStream>>;

    /// Open and start a playback stream.
    fn open_output_stream(&self, params: &StreamParams) -> Result<Box<dyn OutputStream>>;

    /// End the session. Later opens fail with
    /// [`Error::Terminated`](crate::Error::Terminated).
    fn terminate(&self) -> Result<()>;
}

//! Audio I/O layer for patchbay.
//!
//! This crate provides:
//!
//! - **Device enumeration**: [`AudioBackend::device_count`] and
//!   [`AudioBackend::device_info`] over a flat catalog of devices
//! - **Blocking streams**: [`InputStream`] and [`OutputStream`] handles that
//!   read and write whole chunks of interleaved `f32` samples
//! - **Backends**: [`CpalBackend`] for real hardware and [`MockBackend`] for
//!   tests and dry runs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use patchbay_io::{AudioBackend, CpalBackend, OverflowPolicy, StreamParams};
//!
//! let backend = CpalBackend::new();
//! for index in 0..backend.device_count()? {
//!     let info = backend.device_info(index)?;
//!     println!("{}: {} ({} in / {} out)", info.index, info.name,
//!         info.max_input_channels, info.max_output_channels);
//! }
//!
//! let mut input = backend.open_input_stream(&StreamParams::new(0, 2, 44100, 1024))?;
//! let chunk = input.read(1024, OverflowPolicy::Discard)?;
//! ```

pub mod backend;
pub mod cpal_backend;
pub mod mock;

pub use backend::{
    AudioBackend, DeviceIndex, DeviceInfo, Direction, HostApiId, InputStream, OutputStream,
    OverflowPolicy, StreamParams,
};
pub use cpal_backend::CpalBackend;
pub use mock::{MockBackend, MockDevice, MockStats};

/// Error types for audio I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Audio stream setup or runtime error reported by the backend.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// The requested device index is not in the catalog.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The device exists but cannot run the requested configuration.
    #[error("Unsupported stream configuration: {0}")]
    UnsupportedConfig(String),

    /// The device is held by another client.
    #[error("Device busy: {0}")]
    DeviceBusy(String),

    /// Captured audio was dropped because the reader fell behind.
    #[error("Input overflowed")]
    InputOverflow,

    /// No data arrived within the read window.
    #[error("Timed out waiting for audio data")]
    Timeout,

    /// The device went away; the stream cannot be used any more.
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    /// The stream was already stopped or closed.
    #[error("Stream closed")]
    Closed,

    /// The backend session has been terminated.
    #[error("Audio session terminated")]
    Terminated,
}

impl Error {
    /// Whether a pump may retry after this error.
    ///
    /// Transient errors are isolated read/write hiccups. Everything else means
    /// the stream or session is gone.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Stream(_) | Error::InputOverflow | Error::Timeout
        )
    }
}

/// Convenience result type for audio I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::Stream("xrun".into()).is_transient());
        assert!(Error::InputOverflow.is_transient());
        assert!(Error::Timeout.is_transient());

        assert!(!Error::Disconnected("usb".into()).is_transient());
        assert!(!Error::Closed.is_transient());
        assert!(!Error::Terminated.is_transient());
        assert!(!Error::DeviceBusy("hw:1".into()).is_transient());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            Error::DeviceNotFound("index 9".into()).to_string(),
            "Device not found: index 9"
        );
        assert_eq!(Error::InputOverflow.to_string(), "Input overflowed");
    }
}

//! Device catalog: input/output device discovery.
//!
//! The catalog walks the backend's device list, keeps only devices on the
//! default host API, and splits them into an input list and an output list.
//! A duplex device appears in both.
//!
//! Callers address devices by *position* in these lists. Catalog indices are
//! sparse once other host APIs are filtered out, so they make poor
//! user-facing handles.

use crate::error::RouteError;
use patchbay_io::{AudioBackend, DeviceIndex, DeviceInfo};
use std::fmt;
use std::sync::Arc;

/// One side of a device, captured at enumeration time.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    /// Backend handle, used to open streams.
    pub catalog_index: DeviceIndex,
    /// Human-readable device name.
    pub name: String,
    /// Native channel count for this direction.
    pub channels: u16,
    /// Default sample rate in Hz.
    pub default_sample_rate: f64,
}

/// Result of [`DeviceCatalog::enumerate`].
///
/// `Display` renders the summary printed by the `list` command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceListing {
    /// Capture-capable devices in catalog order.
    pub inputs: Vec<DeviceDescriptor>,
    /// Playback-capable devices in catalog order.
    pub outputs: Vec<DeviceDescriptor>,
}

impl DeviceListing {
    /// Resolve an input list position.
    pub fn input_at(&self, position: usize) -> Result<&DeviceDescriptor, RouteError> {
        self.inputs
            .get(position)
            .ok_or_else(RouteError::invalid_position)
    }

    /// Resolve an output list position.
    pub fn output_at(&self, position: usize) -> Result<&DeviceDescriptor, RouteError> {
        self.outputs
            .get(position)
            .ok_or_else(RouteError::invalid_position)
    }
}

fn write_section(f: &mut fmt::Formatter<'_>, title: &str, devices: &[DeviceDescriptor]) -> fmt::Result {
    writeln!(f, "{title}")?;
    if devices.is_empty() {
        return write!(f, "  None found");
    }
    for (position, device) in devices.iter().enumerate() {
        writeln!(
            f,
            "[{}] Device {}: {}",
            position, device.catalog_index, device.name
        )?;
        write!(
            f,
            "    Channels: {}, Sample Rate: {:.1}",
            device.channels, device.default_sample_rate
        )?;
        if position + 1 < devices.len() {
            writeln!(f)?;
        }
    }
    Ok(())
}

impl fmt::Display for DeviceListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_section(f, "Available Input Devices:", &self.inputs)?;
        writeln!(f)?;
        writeln!(f)?;
        write_section(f, "Available Output Devices:", &self.outputs)
    }
}

/// Read-only view of the backend's devices.
#[derive(Clone)]
pub struct DeviceCatalog {
    backend: Arc<dyn AudioBackend>,
}

impl DeviceCatalog {
    /// Create a catalog over a backend session.
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self { backend }
    }

    /// List input- and output-capable devices of the default host API.
    ///
    /// Devices whose info cannot be read are skipped with a warning.
    pub fn enumerate(&self) -> Result<DeviceListing, RouteError> {
        let default_api = self.backend.default_host_api();
        let devices = self
            .backend
            .devices()
            .map_err(|e| RouteError::device_lookup(format!("device enumeration failed: {e}")))?;

        let mut listing = DeviceListing::default();
        for info in devices.iter().filter(|d| d.host_api == default_api) {
            if info.is_input() {
                listing.inputs.push(descriptor(info, info.max_input_channels));
            }
            if info.is_output() {
                listing.outputs.push(descriptor(info, info.max_output_channels));
            }
        }

        tracing::debug!(
            inputs = listing.inputs.len(),
            outputs = listing.outputs.len(),
            "devices enumerated"
        );
        Ok(listing)
    }

    /// Look up one device by catalog index.
    pub fn device(&self, index: DeviceIndex) -> Result<DeviceInfo, RouteError> {
        self.backend
            .device_info(index)
            .map_err(|e| RouteError::device_lookup(format!("device {index}: {e}")))
    }

    /// Capture side of a device, failing if it has no input channels.
    pub fn input_device(&self, index: DeviceIndex) -> Result<DeviceDescriptor, RouteError> {
        let info = self.device(index)?;
        if !info.is_input() {
            return Err(RouteError::device_lookup(format!(
                "device {index} ({}) has no input channels",
                info.name
            )));
        }
        Ok(descriptor(&info, info.max_input_channels))
    }

    /// Playback side of a device, failing if it has no output channels.
    pub fn output_device(&self, index: DeviceIndex) -> Result<DeviceDescriptor, RouteError> {
        let info = self.device(index)?;
        if !info.is_output() {
            return Err(RouteError::device_lookup(format!(
                "device {index} ({}) has no output channels",
                info.name
            )));
        }
        Ok(descriptor(&info, info.max_output_channels))
    }
}

fn descriptor(info: &DeviceInfo, channels: u16) -> DeviceDescriptor {
    DeviceDescriptor {
        catalog_index: info.index,
        name: info.name.clone(),
        channels,
        default_sample_rate: info.default_sample_rate,
    }
}

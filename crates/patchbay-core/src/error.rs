//! Error types for the routing engine.

use crate::RouteId;
use patchbay_io::Direction;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the device catalog and the router.
///
/// Only [`DeviceLookup`](RouteError::DeviceLookup),
/// [`StreamOpen`](RouteError::StreamOpen), [`NotFound`](RouteError::NotFound)
/// and [`Closed`](RouteError::Closed) are ever returned to callers. The
/// runtime variants are what a pump logs about itself; they never leave the
/// route that raised them.
#[derive(Debug, Error)]
pub enum RouteError {
    /// A device position or catalog index could not be resolved.
    #[error("{reason}")]
    DeviceLookup {
        /// Human-readable explanation.
        reason: String,
    },

    /// A stream could not be opened, so the route never started.
    #[error("route {route}: failed to open {direction} stream: {source}")]
    StreamOpen {
        /// Route that failed to start.
        route: RouteId,
        /// Which side failed.
        direction: Direction,
        /// Backend error.
        #[source]
        source: patchbay_io::Error,
    },

    /// An isolated read/write fault; the route backs off and continues.
    #[error("route {route}: transient I/O fault: {source}")]
    TransientIo {
        /// Route that hit the fault.
        route: RouteId,
        /// Backend error.
        #[source]
        source: patchbay_io::Error,
    },

    /// The route hit a fault it cannot recover from and terminated.
    #[error("route {route}: fatal fault: {reason}")]
    Fatal {
        /// Route that terminated.
        route: RouteId,
        /// Human-readable explanation.
        reason: String,
    },

    /// No route with this identifier is registered.
    #[error("Route {0} doesn't exist")]
    NotFound(RouteId),

    /// The router has been closed.
    #[error("router is closed")]
    Closed,
}

impl RouteError {
    /// Create a device lookup error.
    pub fn device_lookup(reason: impl Into<String>) -> Self {
        RouteError::DeviceLookup {
            reason: reason.into(),
        }
    }

    /// The message shown when a list position is out of range.
    pub fn invalid_position() -> Self {
        Self::device_lookup(
            "Invalid device index. Please check available devices with 'list' command.",
        )
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A value is outside its allowed range
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }
}

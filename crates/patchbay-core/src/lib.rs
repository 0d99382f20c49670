//! Patchbay Core - device catalog and route engine
//!
//! This crate sits on top of [`patchbay_io`] and turns a flat list of audio
//! devices into a set of independently running input → output routes.
//!
//! # Core Abstractions
//!
//! - [`DeviceCatalog`] - Input/output device discovery on the default host API
//! - [`ChannelAdapter`] - Mono → stereo duplication between native layouts
//! - [`Router`] - Registry of routes, one worker thread per route
//! - [`RouterConfig`] - Tunables loaded from TOML
//!
//! # Example
//!
//! ```rust,ignore
//! use patchbay_core::{Router, RouterConfig};
//! use patchbay_io::MockBackend;
//! use std::sync::Arc;
//!
//! let router = Router::new(Arc::new(MockBackend::demo()), RouterConfig::default());
//! let listing = router.catalog().enumerate()?;
//! let input = listing.input_at(0)?.catalog_index;
//! let output = listing.output_at(0)?.catalog_index;
//!
//! let id = router.create_route(input, output)?;
//! println!("{}", router.list_active_routes());
//! router.stop_route(id)?;
//! router.close();
//! ```

pub mod adapter;
pub mod catalog;
pub mod config;
pub mod error;
pub mod route;
pub mod router;

pub use adapter::{ChannelAdapter, adapt};
pub use catalog::{DeviceCatalog, DeviceDescriptor, DeviceListing};
pub use config::{RouterConfig, default_config_path, user_config_dir};
pub use error::{ConfigError, RouteError};
pub use route::{RouteSpec, RouteState};
pub use router::{RouteInfo, RouteOptions, RouteSnapshot, Router};

/// Identifier handed out by [`Router::create_route`].
///
/// Starts at 1 and is never reused within a router's lifetime.
pub type RouteId = u64;

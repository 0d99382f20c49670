//! Route registry.
//!
//! [`Router`] owns the backend session, hands out route identifiers and keeps
//! one [`RouteEntry`] per live route. Each route runs on its own named thread
//! (`route-<id>`); the router talks to it only through atomics in the shared
//! control block and two bounded channels:
//!
//! - **started**: the worker reports whether both streams opened
//! - **terminated**: the worker signals once its streams are closed
//!
//! # Thread Safety
//!
//! - **Registry**: `Mutex<BTreeMap>`, held for map operations only, never
//!   across a stream call or a thread join.
//! - **Ids**: `AtomicU64`, strictly increasing, never reused.
//! - **Running flag**: `Arc<AtomicBool>` observed by every worker between
//!   chunks.
//!
//! A worker that does not terminate within the stop timeout is removed from
//! the registry but not forgotten: it moves to a lingering list that is
//! reaped as soon as the thread finishes and is waited on once more by
//! [`Router::close`].

use crate::catalog::{DeviceCatalog, DeviceDescriptor};
use crate::config::RouterConfig;
use crate::error::RouteError;
use crate::route::{Pump, RouteControl, RouteSpec, RouteState};
use crate::RouteId;
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use parking_lot::Mutex;
use patchbay_io::{AudioBackend, DeviceIndex};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Per-route stream settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteOptions {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per chunk.
    pub chunk_size: u32,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            chunk_size: 1024,
        }
    }
}

impl From<&RouterConfig> for RouteOptions {
    fn from(config: &RouterConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            chunk_size: config.chunk_size,
        }
    }
}

/// Point-in-time view of one registered route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteInfo {
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
    /// Lifecycle state at snapshot time.
    pub state: RouteState,
    /// Whether the route has not been asked to stop.
    pub active: bool,
    /// Chunks moved so far.
    pub chunks: u64,
    /// Transient faults survived so far.
    pub faults: u64,
}

impl fmt::Display for RouteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Route {}: Device {} ({} ch) → Device {} ({} ch)",
            self.id,
            self.input.catalog_index,
            self.input.channels,
            self.output.catalog_index,
            self.output.channels
        )
    }
}

/// Result of [`Router::list_active_routes`], ordered by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteSnapshot {
    routes: Vec<RouteInfo>,
}

impl RouteSnapshot {
    /// Routes in id order.
    pub fn routes(&self) -> &[RouteInfo] {
        &self.routes
    }

    /// Look up a route by id.
    pub fn get(&self, id: RouteId) -> Option<&RouteInfo> {
        self.routes.iter().find(|r| r.id == id)
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Display for RouteSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.routes.is_empty() {
            return f.write_str("No active routes");
        }
        f.write_str("Active Routes:")?;
        for route in &self.routes {
            write!(f, "\n{route}")?;
        }
        Ok(())
    }
}

/// Registry entry for a live route.
struct RouteEntry {
    spec: RouteSpec,
    control: Arc<RouteControl>,
    worker: JoinHandle<()>,
    terminated: Receiver<()>,
}

impl RouteEntry {
    fn info(&self) -> RouteInfo {
        RouteInfo {
            id: self.spec.id,
            input: self.spec.input.clone(),
            output: self.spec.output.clone(),
            sample_rate: self.spec.sample_rate,
            chunk_size: self.spec.chunk_size,
            state: self.control.state(),
            active: self.control.is_active(),
            chunks: self.control.chunks(),
            faults: self.control.faults(),
        }
    }
}

/// Worker that outlived its stop timeout.
struct Lingering {
    id: RouteId,
    worker: JoinHandle<()>,
}

/// Registry of running routes over one backend session.
pub struct Router {
    backend: Arc<dyn AudioBackend>,
    catalog: DeviceCatalog,
    config: RouterConfig,
    routes: Mutex<BTreeMap<RouteId, RouteEntry>>,
    lingering: Mutex<Vec<Lingering>>,
    running: Arc<AtomicBool>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Router {
    /// Create a router that owns `backend` for its lifetime.
    pub fn new(backend: Arc<dyn AudioBackend>, config: RouterConfig) -> Self {
        tracing::info!(backend = backend.name(), "router created");
        Self {
            catalog: DeviceCatalog::new(Arc::clone(&backend)),
            backend,
            config,
            routes: Mutex::new(BTreeMap::new()),
            lingering: Mutex::new(Vec::new()),
            running: Arc::new(AtomicBool::new(true)),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Device catalog over the router's backend.
    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    /// Active configuration.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Create a route with the configured sample rate and chunk size.
    pub fn create_route(&self, input: DeviceIndex, output: DeviceIndex) -> Result<RouteId, RouteError> {
        self.create_route_with(input, output, RouteOptions::from(&self.config))
    }

    /// Create a route between two catalog indices.
    ///
    /// Returns once the worker has opened both streams, or once the startup
    /// timeout has passed with the worker still opening them. A stream that
    /// fails to open is reported here and leaves nothing registered.
    pub fn create_route_with(
        &self,
        input: DeviceIndex,
        output: DeviceIndex,
        options: RouteOptions,
    ) -> Result<RouteId, RouteError> {
        if self.is_closed() {
            return Err(RouteError::Closed);
        }
        self.reap();

        let input = self.catalog.input_device(input)?;
        let output = self.catalog.output_device(output)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let spec = RouteSpec {
            id,
            input,
            output,
            sample_rate: options.sample_rate,
            chunk_size: options.chunk_size,
        };
        let control = Arc::new(RouteControl::new());
        let (started_tx, started_rx) = bounded(1);
        let (terminated_tx, terminated_rx) = bounded(1);

        let pump = Pump {
            spec: spec.clone(),
            backend: Arc::clone(&self.backend),
            control: Arc::clone(&control),
            running: Arc::clone(&self.running),
            retry_backoff: self.config.retry_backoff(),
        };
        let worker = std::thread::Builder::new()
            .name(format!("route-{id}"))
            .spawn(move || pump.run(started_tx, terminated_tx))
            .map_err(|e| RouteError::Fatal {
                route: id,
                reason: format!("failed to spawn worker: {e}"),
            })?;

        self.routes.lock().insert(
            id,
            RouteEntry {
                spec: spec.clone(),
                control,
                worker,
                terminated: terminated_rx,
            },
        );

        match started_rx.recv_timeout(self.config.startup_timeout()) {
            Ok(Ok(())) => {
                tracing::info!(
                    route = id,
                    input = spec.input.catalog_index,
                    output = spec.output.catalog_index,
                    sample_rate = spec.sample_rate,
                    "route created"
                );
                Ok(id)
            }
            Ok(Err(e)) => {
                self.discard(id);
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(route = id, "route still opening streams");
                Ok(id)
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.discard(id);
                Err(RouteError::Fatal {
                    route: id,
                    reason: "worker exited during startup".into(),
                })
            }
        }
    }

    /// Remove an entry whose worker is already finishing and join it.
    fn discard(&self, id: RouteId) {
        let entry = self.routes.lock().remove(&id);
        if let Some(entry) = entry {
            if entry.worker.join().is_err() {
                tracing::warn!(route = id, "route worker panicked");
            }
        }
    }

    /// Stop a route and remove it from the registry.
    ///
    /// Waits up to the stop timeout for the worker to close its streams. The
    /// entry is removed either way; a worker that is still running is kept
    /// on the lingering list.
    pub fn stop_route(&self, id: RouteId) -> Result<(), RouteError> {
        let (control, terminated) = {
            let routes = self.routes.lock();
            let entry = routes.get(&id).ok_or(RouteError::NotFound(id))?;
            (Arc::clone(&entry.control), entry.terminated.clone())
        };

        control.deactivate();
        let finished = match terminated.recv_timeout(self.config.stop_timeout()) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        };

        let Some(entry) = self.routes.lock().remove(&id) else {
            // Another caller removed it while we waited.
            return Ok(());
        };

        if finished {
            if entry.worker.join().is_err() {
                tracing::warn!(route = id, "route worker panicked");
            }
        } else {
            tracing::warn!(
                route = id,
                state = %control.state(),
                timeout_ms = self.config.stop_timeout_ms,
                "route did not stop in time; worker detached"
            );
            self.lingering.lock().push(Lingering {
                id,
                worker: entry.worker,
            });
        }

        tracing::info!(route = id, "route removed");
        self.reap();
        Ok(())
    }

    /// Snapshot of every registered route.
    pub fn list_active_routes(&self) -> RouteSnapshot {
        let routes = self.routes.lock();
        RouteSnapshot {
            routes: routes.values().map(RouteEntry::info).collect(),
        }
    }

    /// Number of registered routes.
    pub fn route_count(&self) -> usize {
        self.routes.lock().len()
    }

    /// Workers that missed their stop timeout and are still running.
    pub fn lingering(&self) -> usize {
        self.reap();
        self.lingering.lock().len()
    }

    /// Join lingering workers that have finished.
    fn reap(&self) {
        let finished: Vec<Lingering> = {
            let mut lingering = self.lingering.lock();
            let (finished, pending) = lingering
                .drain(..)
                .partition(|l: &Lingering| l.worker.is_finished());
            *lingering = pending;
            finished
        };
        for l in finished {
            let _ = l.worker.join();
            tracing::debug!(route = l.id, "lingering worker reaped");
        }
    }

    fn drain_lingering(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            self.reap();
            let left = self.lingering.lock().len();
            if left == 0 {
                return;
            }
            if Instant::now() >= deadline {
                tracing::warn!(workers = left, "route workers still running at shutdown");
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Stop every route and release the backend session.
    ///
    /// Calling this more than once is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.running.store(false, Ordering::SeqCst);

        let ids: Vec<RouteId> = self.routes.lock().keys().copied().collect();
        for id in ids {
            if let Err(e) = self.stop_route(id) {
                tracing::debug!(route = id, error = %e, "route already gone");
            }
        }
        self.drain_lingering(self.config.stop_timeout());

        if let Err(e) = self.backend.terminate() {
            tracing::warn!(error = %e, "failed to terminate audio session");
        }
        tracing::info!("Audio router closed");
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay_io::{MockBackend, MockDevice};

    fn fast_config() -> RouterConfig {
        RouterConfig {
            stop_timeout_ms: 500,
            startup_timeout_ms: 500,
            retry_backoff_ms: 1,
            ..RouterConfig::default()
        }
    }

    fn router(devices: Vec<MockDevice>) -> (Router, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::new(devices));
        (Router::new(backend.clone(), fast_config()), backend)
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let (router, _) = router(vec![MockDevice::input("Mic", 2), MockDevice::output("Out", 2)]);
        let a = router.create_route(0, 1).unwrap();
        let b = router.create_route(0, 1).unwrap();
        router.stop_route(a).unwrap();
        let c = router.create_route(0, 1).unwrap();
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn lookup_failure_registers_nothing() {
        let (router, backend) = router(vec![MockDevice::input("Mic", 2)]);
        let err = router.create_route(0, 9).unwrap_err();
        assert!(matches!(err, RouteError::DeviceLookup { .. }));
        assert_eq!(router.route_count(), 0);
        assert_eq!(backend.stats().inputs_opened, 0);

        // Output-only lookups reject capture devices.
        assert!(router.create_route(0, 0).is_err());
    }

    #[test]
    fn stream_open_failure_is_reported() {
        let (router, backend) = router(vec![
            MockDevice::input("Mic", 2),
            MockDevice::output("Busy", 2).fail_open("device busy"),
        ]);
        let err = router.create_route(0, 1).unwrap_err();
        assert!(matches!(err, RouteError::StreamOpen { .. }), "got: {err}");
        assert_eq!(router.route_count(), 0);
        assert_eq!(backend.stats().open_streams(), 0);
    }

    #[test]
    fn invalid_sample_rate_is_a_stream_open_failure() {
        let (router, _) = router(vec![MockDevice::input("Mic", 2), MockDevice::output("Out", 2)]);
        let err = router
            .create_route_with(
                0,
                1,
                RouteOptions {
                    sample_rate: 0,
                    chunk_size: 1024,
                },
            )
            .unwrap_err();
        assert!(matches!(err, RouteError::StreamOpen { .. }));
        assert!(router.list_active_routes().is_empty());
    }

    #[test]
    fn snapshot_reflects_running_route() {
        let (router, _) = router(vec![MockDevice::input("Mic", 1), MockDevice::output("Out", 2)]);
        let id = router.create_route(0, 1).unwrap();

        let snapshot = router.list_active_routes();
        let info = snapshot.get(id).unwrap();
        assert_eq!(info.state, RouteState::Running);
        assert!(info.active);
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.chunk_size, 1024);
        assert_eq!(info.to_string(), "Route 1: Device 0 (1 ch) → Device 1 (2 ch)");
    }

    #[test]
    fn close_is_idempotent() {
        let (router, backend) = router(vec![MockDevice::input("Mic", 2), MockDevice::output("Out", 2)]);
        router.create_route(0, 1).unwrap();
        router.close();
        router.close();
        assert!(backend.is_terminated());
        assert_eq!(router.route_count(), 0);
        assert!(matches!(router.create_route(0, 1), Err(RouteError::Closed)));
    }

    #[test]
    fn drop_closes_router() {
        let backend = Arc::new(MockBackend::new(vec![
            MockDevice::input("Mic", 2),
            MockDevice::output("Out", 2),
        ]));
        {
            let router = Router::new(backend.clone(), fast_config());
            router.create_route(0, 1).unwrap();
        }
        assert!(backend.is_terminated());
        assert_eq!(backend.stats().open_streams(), 0);
    }

    #[test]
    fn stuck_worker_lingers_until_released() {
        let backend = Arc::new(
            MockBackend::new(vec![
                MockDevice::input("Stuck", 2).stall_reads(),
                MockDevice::output("Out", 2),
            ])
            .with_read_delay(Duration::ZERO),
        );
        let config = RouterConfig {
            stop_timeout_ms: 50,
            ..fast_config()
        };
        let router = Router::new(backend.clone(), config);
        let id = router.create_route(0, 1).unwrap();

        router.stop_route(id).unwrap();
        assert_eq!(router.route_count(), 0);
        assert_eq!(router.lingering(), 1);

        backend.release_stalls();
        let deadline = Instant::now() + Duration::from_secs(5);
        while router.lingering() > 0 {
            assert!(Instant::now() < deadline, "worker never finished");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(backend.stats().open_streams(), 0);
    }

    #[test]
    fn snapshot_display_empty() {
        assert_eq!(RouteSnapshot::default().to_string(), "No active routes");
    }
}

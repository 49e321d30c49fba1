//! [`TelemetryService`] – lifecycle owner of the gateway core.
//!
//! `start` attaches a link, spawns its reader thread and the ingestion task.
//! `stop` signals the task and waits for it for at most `shutdown_timeout`.
//! Everything else is a read of the shared cache or a dispatcher call, and
//! is safe from any number of concurrent request handlers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rover_link::{LinkPump, VehicleLink, pump};
use rover_types::{GatewayError, ManualControlCommand};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::dispatch::CommandDispatcher;
use crate::handle::LinkHandle;
use crate::ingest::{IngestConfig, IngestionLoop};
use crate::snapshot::{self, Snapshot};
use crate::state::StateCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    pub ingest: IngestConfig,
    /// Upper bound on how long `stop` waits for the ingestion task.
    pub shutdown_timeout: Duration,
    /// Frames buffered between the link reader thread and the ingestion task.
    pub channel_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ingest: IngestConfig::default(),
            shutdown_timeout: Duration::from_secs(1),
            channel_capacity: pump::DEFAULT_CAPACITY,
        }
    }
}

/// Liveness summary served by the health endpoint.
///
/// Target ids are `None` while no link is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub ok: bool,
    pub connected: bool,
    pub target_system: Option<u8>,
    pub target_component: Option<u8>,
}

struct Running {
    link: LinkHandle,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct TelemetryService {
    cache: StateCache,
    config: ServiceConfig,
    running: Mutex<Option<Running>>,
}

impl TelemetryService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            cache: StateCache::new(),
            config,
            running: Mutex::new(None),
        }
    }

    /// Attach `link` and start ingesting from it.
    ///
    /// The cache is cleared first, so the new link starts disconnected and
    /// gets its own one-time stream request.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Link`] if the service is already running or the link
    /// reader thread cannot be spawned.
    pub fn start(&self, link: Arc<dyn VehicleLink>) -> Result<(), GatewayError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(GatewayError::Link("telemetry service already started".to_string()));
        }

        self.cache.reset();
        let handle = LinkHandle::new(link);
        let frames = LinkPump::spawn(handle.link(), self.config.channel_capacity)?;
        let (stop, stop_rx) = watch::channel(false);
        let ingest = IngestionLoop::new(
            self.cache.clone(),
            handle.clone(),
            frames,
            stop_rx,
            self.config.ingest,
        );
        let task = tokio::spawn(ingest.run());

        info!(endpoint = %handle.describe(), "telemetry service started");
        *running = Some(Running {
            link: handle,
            stop,
            task,
        });
        Ok(())
    }

    /// Signal the ingestion task and wait up to `shutdown_timeout` for it.
    ///
    /// A task that does not finish in time is abandoned, not aborted.  The
    /// link is detached either way.  Calling `stop` on a stopped service is a
    /// no-op.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(Running { link, stop, mut task }) = running else {
            return;
        };
        let _ = stop.send(true);
        match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
            Ok(Ok(())) => info!(endpoint = %link.describe(), "telemetry service stopped"),
            Ok(Err(e)) => warn!(error = %e, "ingestion task ended abnormally"),
            Err(_) => warn!(
                timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                "ingestion task did not stop in time; abandoning it"
            ),
        }
    }

    /// Current sanitized view of the vehicle.  Never fails.
    pub fn snapshot(&self) -> Snapshot {
        snapshot::take(&self.cache)
    }

    /// See [`CommandDispatcher::send_manual_control`].
    pub fn send_manual_control(&self, command: &ManualControlCommand) -> Result<(), GatewayError> {
        self.dispatcher().send_manual_control(command)
    }

    pub fn is_connected(&self) -> bool {
        self.cache.is_connected()
    }

    /// Link liveness and target ids, read under one cache lock.
    pub fn health(&self) -> Health {
        let attached = self.is_running();
        let (connected, target_system, target_component) = self
            .cache
            .read(|s| (s.link.connected, s.link.target_system, s.link.target_component));
        Health {
            ok: true,
            connected,
            target_system: attached.then_some(target_system),
            target_component: attached.then_some(target_component),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Shared cache, for readers that need more than a snapshot.
    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    fn dispatcher(&self) -> CommandDispatcher {
        let link = self.running.lock().as_ref().map(|r| r.link.clone());
        CommandDispatcher::new(self.cache.clone(), link)
    }
}

impl Default for TelemetryService {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}

//! `rover-core` – The Telemetry Gateway Core
//!
//! Keeps the latest known state of one MAVLink vehicle and exposes it to any
//! number of concurrent readers, while forwarding operator commands back.
//!
//! # Modules
//!
//! - [`state`] – [`StateCache`][state::StateCache]: link bookkeeping and
//!   the per-kind message cache behind a single lock.
//! - [`ingest`] – [`IngestionLoop`][ingest::IngestionLoop]: the one writer
//!   of the cache.  Waits for a heartbeat, requests the telemetry streams
//!   once, then folds every incoming frame into the cache.
//! - [`snapshot`] – [`Snapshot`][snapshot::Snapshot]: the unit-converted,
//!   sanitized view handed to clients.  Non-finite floats become `null`.
//! - [`dispatch`] – [`CommandDispatcher`][dispatch::CommandDispatcher]:
//!   validates a [`ManualControlCommand`][rover_types::ManualControlCommand]
//!   and sends it to the current target.
//! - [`handle`] – [`LinkHandle`][handle::LinkHandle]: serialized send side
//!   of the link, shared by the loop and the dispatcher.
//! - [`service`] – [`TelemetryService`]: start/stop lifecycle and the
//!   read/command surface used by the cockpit.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rover_core::{ServiceConfig, TelemetryService};
//! use rover_link::LoopbackLink;
//!
//! # async fn demo() -> Result<(), rover_types::GatewayError> {
//! let service = TelemetryService::new(ServiceConfig::default());
//! service.start(Arc::new(LoopbackLink::new()))?;
//! let snapshot = service.snapshot();
//! assert!(!snapshot.connected);
//! service.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod handle;
pub mod ingest;
pub mod service;
pub mod snapshot;
pub mod state;

pub use dispatch::CommandDispatcher;
pub use handle::LinkHandle;
pub use ingest::{IngestConfig, IngestionLoop};
pub use service::{Health, ServiceConfig, TelemetryService};
pub use snapshot::{Sanitize, Snapshot};
pub use state::StateCache;

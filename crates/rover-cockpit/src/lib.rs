//! `rover-cockpit` – The Ground-Station HTTP + WebSocket Facade
//!
//! Boots a lightweight server (default port `8000`) in front of a
//! [`TelemetryService`][rover_core::TelemetryService] that:
//!
//! 1. **Serves** JSON endpoints:
//!    - `GET /api/health` → liveness and target ids.
//!    - `GET /api/telemetry` → the current [`Snapshot`][rover_core::Snapshot].
//!    - `POST /api/manual-control` → forwards a
//!      [`ManualControlCommand`][rover_types::ManualControlCommand] to the
//!      vehicle.
//!
//! 2. **Streams** a snapshot to every WebSocket client on `/ws/telemetry`
//!    every push interval (200 ms by default).
//!
//! 3. **Accepts** upstream `"/manual_control"` frames on the same socket and
//!    answers each with a `"/manual_control/result"` frame.
//!
//! Routing is an axum [`Router`][axum::Router] (see [`router`]).  Every
//! response carries permissive CORS headers, and silent connections are
//! closed after an idle timeout.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rover_core::TelemetryService;
//! use rover_cockpit::CockpitServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = Arc::new(TelemetryService::default());
//!     CockpitServer::new(service)
//!         .run()
//!         .await
//!         .expect("cockpit server failed");
//! }
//! ```

pub mod listener;
pub mod server;

pub use listener::IdleTimeoutListener;
pub use server::{CockpitServer, DEFAULT_IDLE_TIMEOUT, DEFAULT_PORT, DEFAULT_PUSH_INTERVAL, router};

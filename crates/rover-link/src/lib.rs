//! `rover-link` – The Link Handle
//!
//! Owns the connection to the vehicle and nothing else.  The wire codec is
//! the [`mavlink`] crate; this crate only translates between its messages and
//! the typed [`rover_types`] model.
//!
//! # Modules
//!
//! - [`link`] – the [`VehicleLink`] trait every transport implements.
//! - [`mavlink_link`] – [`MavlinkLink`], a real MAVLink connection
//!   (`udpin:`, `udpout:`, `tcpin:`, `tcpout:`, `serial:` endpoints).
//! - [`loopback`] – [`LoopbackLink`], an in-process link for tests and demos.
//! - [`pump`] – [`LinkPump`], the reader thread that turns the blocking
//!   `recv` into a channel the async ingestion loop can await.
//! - [`check`] – [`run_check`][check::run_check], a heartbeat-then-position
//!   smoke check (see the `link_check` example).

pub mod check;
pub mod link;
pub mod loopback;
pub mod mavlink_link;
pub mod pump;

pub use link::VehicleLink;
pub use loopback::LoopbackLink;
pub use mavlink_link::MavlinkLink;
pub use pump::LinkPump;

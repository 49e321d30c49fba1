//! The [`VehicleLink`] trait.
//!
//! The gateway never speaks to a socket or serial port directly.  It holds an
//! `Arc<dyn VehicleLink>` and uses exactly two primitives: receive the next
//! watched frame, and send an [`OutboundCommand`].

use rover_types::{GatewayError, LinkFrame, OutboundCommand};

/// A bidirectional connection to a single vehicle.
///
/// # Contract
///
/// * `recv` – blocks until a frame arrives (or the transport's own read
///   timeout elapses).  Returns `Ok(None)` when nothing of interest was read:
///   a frame of an unwatched kind, or a timeout.  Implementations must not
///   block forever once the caller has lost interest if they can avoid it,
///   but callers tolerate links that do.
///
/// * `send` – encodes and writes one command.  Success means the bytes were
///   handed to the transport, not that the vehicle received them.
///
/// Both methods take `&self`; a receive and a send may run concurrently on
/// different threads.
pub trait VehicleLink: Send + Sync {
    /// Receive the next watched frame.
    fn recv(&self) -> Result<Option<LinkFrame>, GatewayError>;

    /// Encode and transmit `command`.
    fn send(&self, command: &OutboundCommand) -> Result<(), GatewayError>;

    /// Human-readable description of the endpoint, for logs.
    fn describe(&self) -> String;
}

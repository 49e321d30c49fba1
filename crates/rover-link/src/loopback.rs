//! In-process vehicle link for tests and headless demos.
//!
//! [`LoopbackLink`] stands in for a real vehicle: frames pushed with
//! [`LoopbackLink::inject`] come out of [`VehicleLink::recv`], and every
//! command passed to [`VehicleLink::send`] is recorded so tests can assert on
//! what the gateway transmitted.
//!
//! # Example
//!
//! ```rust
//! use rover_link::{LoopbackLink, VehicleLink};
//! use rover_types::{Heartbeat, LinkFrame, TelemetryMessage};
//!
//! let link = LoopbackLink::new();
//! link.inject(LinkFrame::new(1, 1, TelemetryMessage::Heartbeat(Heartbeat::default())));
//!
//! let frame = link.recv().unwrap().expect("frame was injected");
//! assert!(frame.is_heartbeat());
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rover_types::{GatewayError, LinkFrame, OutboundCommand};

use crate::link::VehicleLink;

/// How long `recv` waits for an injected frame before returning `Ok(None)`.
const RECV_WAIT: Duration = Duration::from_millis(50);

/// A simulated link that records sends and replays injected frames.
#[derive(Default)]
pub struct LoopbackLink {
    inbox: Mutex<VecDeque<LinkFrame>>,
    arrived: Condvar,
    sent: Mutex<Vec<OutboundCommand>>,
    fail_sends: AtomicBool,
}

impl LoopbackLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `frame` to be returned by a later `recv`.
    pub fn inject(&self, frame: LinkFrame) {
        self.inbox.lock().push_back(frame);
        self.arrived.notify_one();
    }

    /// Every command sent so far, oldest first.
    pub fn sent(&self) -> Vec<OutboundCommand> {
        self.sent.lock().clone()
    }

    /// Number of frames injected but not yet received.
    pub fn pending(&self) -> usize {
        self.inbox.lock().len()
    }

    /// When `true`, every subsequent `send` fails with [`GatewayError::Link`]
    /// and records nothing.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

impl VehicleLink for LoopbackLink {
    fn recv(&self) -> Result<Option<LinkFrame>, GatewayError> {
        let mut inbox = self.inbox.lock();
        if inbox.is_empty() {
            self.arrived.wait_for(&mut inbox, RECV_WAIT);
        }
        Ok(inbox.pop_front())
    }

    fn send(&self, command: &OutboundCommand) -> Result<(), GatewayError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(GatewayError::Link("loopback send failure".to_string()));
        }
        self.sent.lock().push(command.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "loopback".to_string()
    }
}

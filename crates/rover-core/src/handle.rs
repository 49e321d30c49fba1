//! [`LinkHandle`] – the send side of the vehicle link, shared between the
//! ingestion loop and the command dispatcher.
//!
//! Writes from both are serialized through one mutex so two commands never
//! interleave on the wire.  Receiving happens on the link pump thread and
//! does not take this lock.

use std::sync::Arc;

use parking_lot::Mutex;
use rover_link::VehicleLink;
use rover_types::{GatewayError, OutboundCommand};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct LinkHandle {
    link: Arc<dyn VehicleLink>,
    tx_lock: Arc<Mutex<()>>,
}

impl LinkHandle {
    pub fn new(link: Arc<dyn VehicleLink>) -> Self {
        Self {
            link,
            tx_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Transmit `command`, waiting for any in-flight send to finish first.
    ///
    /// # Errors
    ///
    /// Propagates the link's [`GatewayError::Link`] on write failure.
    pub fn send(&self, command: &OutboundCommand) -> Result<(), GatewayError> {
        let _tx = self.tx_lock.lock();
        self.link.send(command)
    }

    /// Fire-and-forget send.
    ///
    /// A failure is logged at `warn` and then discarded; the caller carries on
    /// with whatever the vehicle does or does not stream back.
    pub fn best_effort(&self, what: &'static str, command: &OutboundCommand) {
        match self.send(command) {
            Ok(()) => debug!(command = what, "sent"),
            Err(e) => warn!(command = what, error = %e, "best-effort send failed; not retrying"),
        }
    }

    /// Endpoint description of the underlying link.
    pub fn describe(&self) -> String {
        self.link.describe()
    }

    pub(crate) fn link(&self) -> Arc<dyn VehicleLink> {
        Arc::clone(&self.link)
    }
}

//! Command Dispatcher – validates operator input and hands it to the link.

use rover_types::{GatewayError, ManualControlCommand};
use tracing::debug;

use crate::handle::LinkHandle;
use crate::state::StateCache;

/// Sends operator commands to the current target.
///
/// Reads the target ids from the cache but never writes to it.
#[derive(Clone)]
pub struct CommandDispatcher {
    cache: StateCache,
    link: Option<LinkHandle>,
}

impl CommandDispatcher {
    /// `link` is `None` until the service has been started.
    pub fn new(cache: StateCache, link: Option<LinkHandle>) -> Self {
        Self { cache, link }
    }

    /// Validate `command` and transmit exactly one `MANUAL_CONTROL` frame.
    ///
    /// Success means the frame was handed to the transport; there is no
    /// acknowledgement from the vehicle.
    ///
    /// # Errors
    ///
    /// Checked in this order:
    /// * [`GatewayError::InvalidCommand`] – an axis is out of range.
    /// * [`GatewayError::LinkNotInitialized`] – no link attached.
    /// * [`GatewayError::TargetUnknown`] – no heartbeat has named a target.
    /// * [`GatewayError::Link`] – the transport rejected the write.
    pub fn send_manual_control(&self, command: &ManualControlCommand) -> Result<(), GatewayError> {
        command.validate()?;
        let link = self.link.as_ref().ok_or(GatewayError::LinkNotInitialized)?;
        let (target_system, _) = self.cache.target();
        if target_system == 0 {
            return Err(GatewayError::TargetUnknown);
        }
        link.send(&command.into_outbound(target_system))?;
        debug!(
            target_system,
            x = command.x,
            y = command.y,
            z = command.z,
            r = command.r,
            buttons = command.buttons,
            "manual control sent"
        );
        Ok(())
    }
}

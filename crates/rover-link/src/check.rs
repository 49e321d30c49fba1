//! Link smoke check: is a vehicle on the other end, and is it streaming?
//!
//! [`run_check`] consumes frames from a [`LinkPump`][crate::LinkPump]
//! channel.  It waits for a vehicle heartbeat, reports the sender ids, then
//! waits for one `GLOBAL_POSITION_INT`.  The `link_check` example wraps it
//! for use against real hardware.

use std::time::Duration;

use rover_types::{GatewayError, GlobalPositionInt, LinkFrame, TelemetryMessage};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::debug;

/// Default wait for each of the two stages.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// What the check observed.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub target_system: u8,
    pub target_component: u8,
    /// `None` if no position arrived in time after the heartbeat.
    pub position: Option<GlobalPositionInt>,
}

/// Run both stages, each bounded by `wait`.
///
/// # Errors
///
/// [`GatewayError::Link`] if no vehicle heartbeat arrives within `wait` or
/// the reader stops first.  A missing position is reported, not an error.
pub async fn run_check(
    frames: &mut mpsc::Receiver<LinkFrame>,
    wait: Duration,
) -> Result<CheckReport, GatewayError> {
    let heartbeat = next_matching(frames, wait, LinkFrame::is_vehicle_heartbeat)
        .await?
        .ok_or_else(|| {
            GatewayError::Link(format!("no vehicle heartbeat within {}s", wait.as_secs_f32()))
        })?;

    let position = next_matching(frames, wait, |f| {
        matches!(f.message, TelemetryMessage::GlobalPositionInt(_))
    })
    .await?
    .and_then(|frame| match frame.message {
        TelemetryMessage::GlobalPositionInt(p) => Some(p),
        _ => None,
    });

    Ok(CheckReport {
        target_system: heartbeat.system_id,
        target_component: heartbeat.component_id,
        position,
    })
}

/// First frame satisfying `wanted` before `wait` elapses; `Ok(None)` on
/// timeout.
async fn next_matching(
    frames: &mut mpsc::Receiver<LinkFrame>,
    wait: Duration,
    wanted: impl Fn(&LinkFrame) -> bool,
) -> Result<Option<LinkFrame>, GatewayError> {
    let deadline = Instant::now() + wait;
    loop {
        match timeout_at(deadline, frames.recv()).await {
            Err(_) => return Ok(None),
            Ok(None) => return Err(GatewayError::Link("link reader stopped".to_string())),
            Ok(Some(frame)) if wanted(&frame) => return Ok(Some(frame)),
            Ok(Some(frame)) => debug!(kind = %frame.message.kind(), "skipping frame"),
        }
    }
}

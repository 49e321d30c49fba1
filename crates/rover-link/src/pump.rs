//! [`LinkPump`] – dedicated reader thread for a blocking [`VehicleLink`].
//!
//! MAVLink transports block inside `recv`.  The pump owns that blocking call
//! on its own OS thread and forwards each watched frame into a bounded
//! [`tokio::sync::mpsc`] channel, so the ingestion loop can wait on the
//! channel with a timeout and a stop signal instead of polling the link.
//!
//! The thread exits once the receiving half of the channel is dropped and
//! the link next returns control.  A link that never returns from `recv`
//! keeps its thread parked; the thread is detached and does not hold up
//! process exit.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rover_types::{GatewayError, LinkFrame};
use tokio::sync::mpsc;
use tracing::debug;

use crate::link::VehicleLink;

/// Default channel capacity between the reader thread and the consumer.
pub const DEFAULT_CAPACITY: usize = 256;

/// Pause after a failed `recv` before trying again.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Spawns and names the link reader thread.
pub struct LinkPump;

impl LinkPump {
    /// Start a reader thread for `link` and return the frame channel.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Link`] if the OS refuses to spawn the thread.
    pub fn spawn(
        link: Arc<dyn VehicleLink>,
        capacity: usize,
    ) -> Result<mpsc::Receiver<LinkFrame>, GatewayError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        thread::Builder::new()
            .name("rover-link-rx".to_string())
            .spawn(move || pump(link.as_ref(), &tx))
            .map_err(|e| GatewayError::Link(format!("cannot spawn link reader: {e}")))?;
        Ok(rx)
    }
}

fn pump(link: &dyn VehicleLink, tx: &mpsc::Sender<LinkFrame>) {
    let endpoint = link.describe();
    debug!(endpoint = %endpoint, "link reader started");
    loop {
        match link.recv() {
            Ok(Some(frame)) => {
                if tx.blocking_send(frame).is_err() {
                    break;
                }
            }
            Ok(None) => {
                if tx.is_closed() {
                    break;
                }
            }
            Err(e) => {
                if tx.is_closed() {
                    break;
                }
                debug!(endpoint = %endpoint, error = %e, "link receive failed");
                thread::sleep(RECV_ERROR_BACKOFF);
            }
        }
    }
    debug!(endpoint = %endpoint, "link reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackLink;
    use rover_types::{Heartbeat, TelemetryMessage};

    #[tokio::test]
    async fn pump_forwards_injected_frames() {
        let link = Arc::new(LoopbackLink::new());
        let mut rx = LinkPump::spawn(link.clone(), 8).unwrap();

        link.inject(LinkFrame::new(1, 1, TelemetryMessage::Heartbeat(Heartbeat::default())));

        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("frame within timeout")
            .expect("channel open");
        assert!(frame.is_heartbeat());
        assert_eq!(frame.system_id, 1);
    }

    #[tokio::test]
    async fn pump_thread_exits_when_receiver_dropped() {
        let link = Arc::new(LoopbackLink::new());
        let rx = LinkPump::spawn(link.clone(), 8).unwrap();
        drop(rx);

        // Give the reader a few recv timeouts to notice the closed channel.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(Arc::strong_count(&link), 1, "reader thread must release the link");
    }
}

//! Ingestion Loop – the single writer of the [`StateCache`].
//!
//! The loop alternates between two phases:
//!
//! * **Disconnected** – wait up to `heartbeat_timeout` for a `HEARTBEAT`.
//!   Other frames arriving in the meantime are dropped.  On timeout, back off
//!   for `retry_backoff` and wait again.  Any heartbeat marks the link
//!   connected.
//! * **Connected** – fold every frame into the cache as it arrives.
//!
//! Vehicle heartbeats (see [`LinkFrame::is_vehicle_heartbeat`]) set the
//! target in either phase, and every later one refreshes it.  Heartbeats from
//! ground stations and peripherals never do.  The one-time stream and
//! home-position requests go out as soon as a target is known.
//!
//! Every wait races the stop signal, so [`IngestionLoop::run`] returns within
//! one scheduler tick of shutdown being requested.

use std::time::Duration;

use chrono::Utc;
use rover_types::{
    DATA_STREAM_ALL, DEFAULT_STREAM_RATE_HZ, LinkFrame, OutboundCommand, TelemetryMessage,
};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::handle::LinkHandle;
use crate::state::StateCache;

/// Timing knobs for [`IngestionLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestConfig {
    /// How long one heartbeat wait lasts before backing off.
    pub heartbeat_timeout: Duration,
    /// Pause between heartbeat waits.
    pub retry_backoff: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(1),
            retry_backoff: Duration::from_millis(100),
        }
    }
}

enum Step {
    Frame(LinkFrame),
    Timeout,
    Closed,
    Stop,
}

pub struct IngestionLoop {
    cache: StateCache,
    link: LinkHandle,
    frames: mpsc::Receiver<LinkFrame>,
    stop: watch::Receiver<bool>,
    config: IngestConfig,
}

impl IngestionLoop {
    pub fn new(
        cache: StateCache,
        link: LinkHandle,
        frames: mpsc::Receiver<LinkFrame>,
        stop: watch::Receiver<bool>,
        config: IngestConfig,
    ) -> Self {
        Self {
            cache,
            link,
            frames,
            stop,
            config,
        }
    }

    /// Drive the loop until the stop signal fires.
    pub async fn run(mut self) {
        info!(endpoint = %self.link.describe(), "ingestion loop started");
        while !self.stop_requested() {
            let step = if self.cache.is_connected() {
                self.next_frame(None).await
            } else {
                self.await_heartbeat().await
            };

            match step {
                Step::Frame(frame) => self.apply(frame),
                Step::Timeout => {
                    debug!(
                        timeout_ms = self.config.heartbeat_timeout.as_millis() as u64,
                        "no heartbeat yet; backing off"
                    );
                    let backoff = self.config.retry_backoff;
                    if self.pause(backoff).await {
                        break;
                    }
                }
                Step::Closed => {
                    warn!("link reader has stopped; idling until shutdown");
                    self.wait_for_stop().await;
                    break;
                }
                Step::Stop => break,
            }
        }
        info!("ingestion loop stopped");
    }

    /// Wait for a heartbeat, discarding anything else, until the deadline.
    async fn await_heartbeat(&mut self) -> Step {
        let deadline = Instant::now() + self.config.heartbeat_timeout;
        loop {
            match self.next_frame(Some(deadline)).await {
                Step::Frame(frame) if !frame.is_heartbeat() => {
                    debug!(kind = %frame.message.kind(), "dropping frame received before heartbeat");
                }
                step => return step,
            }
        }
    }

    async fn next_frame(&mut self, deadline: Option<Instant>) -> Step {
        let stop = &mut self.stop;
        let frames = &mut self.frames;
        let until = deadline.unwrap_or_else(Instant::now);
        tokio::select! {
            biased;
            _ = stop.changed() => Step::Stop,
            frame = frames.recv() => match frame {
                Some(frame) => Step::Frame(frame),
                None => Step::Closed,
            },
            _ = sleep_until(until), if deadline.is_some() => Step::Timeout,
        }
    }

    fn apply(&self, frame: LinkFrame) {
        let was_connected = self.cache.is_connected();
        let (system_id, component_id) = (frame.system_id, frame.component_id);
        let vehicle_type = match &frame.message {
            TelemetryMessage::Heartbeat(hb) => hb.vehicle_type,
            _ => None,
        };

        if let Some((target_system, target_component)) = self.cache.record(frame, Utc::now()) {
            info!(target_system, target_component, "vehicle heartbeat received; target set");
        } else if !was_connected {
            info!(
                system_id,
                component_id,
                vehicle_type,
                "heartbeat from a non-vehicle sender; link up, target still unknown"
            );
        }

        if let Some((target_system, target_component)) = self.cache.claim_stream_request() {
            self.link.best_effort(
                "request data stream",
                &OutboundCommand::RequestDataStream {
                    target_system,
                    target_component,
                    stream_id: DATA_STREAM_ALL,
                    rate_hz: DEFAULT_STREAM_RATE_HZ,
                    start: true,
                },
            );
            self.link.best_effort(
                "get home position",
                &OutboundCommand::GetHomePosition {
                    target_system,
                    target_component,
                },
            );
        }
    }

    /// Sleep for `duration`; returns `true` if stop fired first.
    async fn pause(&mut self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.stop.changed() => true,
            _ = sleep(duration) => false,
        }
    }

    async fn wait_for_stop(&mut self) {
        while !self.stop_requested() {
            if self.stop.changed().await.is_err() {
                return;
            }
        }
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use rover_link::LoopbackLink;
    use rover_types::{GlobalPositionInt, Heartbeat, MessageKind};
    use tokio::task::JoinHandle;

    struct Harness {
        cache: StateCache,
        link: Arc<LoopbackLink>,
        frames: mpsc::Sender<LinkFrame>,
        stop: watch::Sender<bool>,
        task: JoinHandle<()>,
    }

    fn fast() -> IngestConfig {
        IngestConfig {
            heartbeat_timeout: Duration::from_millis(50),
            retry_backoff: Duration::from_millis(10),
        }
    }

    fn start(config: IngestConfig) -> Harness {
        let cache = StateCache::new();
        let link = Arc::new(LoopbackLink::new());
        let (frames, rx) = mpsc::channel(16);
        let (stop, stop_rx) = watch::channel(false);
        let ingest = IngestionLoop::new(cache.clone(), LinkHandle::new(link.clone()), rx, stop_rx, config);
        let task = tokio::spawn(ingest.run());
        Harness {
            cache,
            link,
            frames,
            stop,
            task,
        }
    }

    fn heartbeat(system: u8, component: u8) -> LinkFrame {
        LinkFrame::new(system, component, TelemetryMessage::Heartbeat(Heartbeat::default()))
    }

    fn position(lat: i32) -> LinkFrame {
        LinkFrame::new(
            1,
            1,
            TelemetryMessage::GlobalPositionInt(GlobalPositionInt {
                lat: Some(lat),
                ..Default::default()
            }),
        )
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met within 2s");
    }

    async fn shut_down(stop: watch::Sender<bool>, task: JoinHandle<()>) {
        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop stops promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn first_heartbeat_connects_and_requests_streams_once() {
        let h = start(fast());
        h.frames.send(heartbeat(7, 1)).await.unwrap();
        h.frames.send(heartbeat(7, 1)).await.unwrap();
        h.frames.send(heartbeat(7, 1)).await.unwrap();

        let cache = h.cache.clone();
        eventually(|| cache.is_connected()).await;
        assert_eq!(h.cache.target(), (7, 1));

        sleep(Duration::from_millis(50)).await;
        let sent = h.link.sent();
        assert_eq!(
            sent,
            vec![
                OutboundCommand::RequestDataStream {
                    target_system: 7,
                    target_component: 1,
                    stream_id: DATA_STREAM_ALL,
                    rate_hz: DEFAULT_STREAM_RATE_HZ,
                    start: true,
                },
                OutboundCommand::GetHomePosition {
                    target_system: 7,
                    target_component: 1,
                },
            ]
        );
        shut_down(h.stop, h.task).await;
    }

    #[tokio::test]
    async fn frames_before_heartbeat_are_discarded() {
        let h = start(fast());
        h.frames.send(position(111)).await.unwrap();
        h.frames.send(heartbeat(1, 1)).await.unwrap();
        h.frames.send(position(222)).await.unwrap();

        let cache = h.cache.clone();
        eventually(|| cache.read(|s| s.messages.contains(MessageKind::GlobalPositionInt))).await;
        assert_eq!(
            h.cache.read(|s| s.messages.global_position_int().and_then(|p| p.lat)),
            Some(222)
        );
        shut_down(h.stop, h.task).await;
    }

    fn ground_station_heartbeat() -> LinkFrame {
        LinkFrame::new(
            255,
            190,
            TelemetryMessage::Heartbeat(Heartbeat {
                vehicle_type: Some(6),
                ..Default::default()
            }),
        )
    }

    #[tokio::test]
    async fn later_vehicle_heartbeats_retarget() {
        let h = start(fast());
        h.frames.send(heartbeat(3, 1)).await.unwrap();
        let cache = h.cache.clone();
        eventually(|| cache.is_connected()).await;

        h.frames.send(heartbeat(9, 4)).await.unwrap();
        eventually(|| cache.target() == (9, 4)).await;

        // A ground station on the same bus does not steal the target.
        h.frames.send(ground_station_heartbeat()).await.unwrap();
        h.frames.send(position(5)).await.unwrap();
        eventually(|| cache.read(|s| s.messages.contains(MessageKind::GlobalPositionInt))).await;
        assert_eq!(h.cache.target(), (9, 4));
        shut_down(h.stop, h.task).await;
    }

    #[tokio::test]
    async fn ground_station_heartbeat_connects_without_target() {
        let h = start(fast());
        h.frames.send(ground_station_heartbeat()).await.unwrap();
        let cache = h.cache.clone();
        eventually(|| cache.is_connected()).await;

        sleep(Duration::from_millis(30)).await;
        assert_eq!(h.cache.target(), (0, 0));
        assert!(h.link.sent().is_empty(), "no stream request without a vehicle");
        let dispatcher = crate::dispatch::CommandDispatcher::new(
            h.cache.clone(),
            Some(LinkHandle::new(h.link.clone())),
        );
        assert_eq!(
            dispatcher.send_manual_control(&rover_types::ManualControlCommand::default()),
            Err(rover_types::GatewayError::TargetUnknown)
        );

        h.frames.send(heartbeat(1, 1)).await.unwrap();
        eventually(|| cache.target() == (1, 1)).await;
        eventually(|| h.link.sent().len() == 2).await;
        assert!(matches!(
            h.link.sent()[0],
            OutboundCommand::RequestDataStream { target_system: 1, target_component: 1, .. }
        ));
        shut_down(h.stop, h.task).await;
    }

    #[tokio::test]
    async fn stays_disconnected_without_heartbeat() {
        let h = start(fast());
        // Several timeout/backoff cycles.
        sleep(Duration::from_millis(200)).await;
        assert!(!h.cache.is_connected());
        assert!(h.link.sent().is_empty());
        assert!(!h.task.is_finished());
        shut_down(h.stop, h.task).await;
    }

    #[tokio::test]
    async fn failed_best_effort_sends_do_not_stop_ingestion() {
        let h = start(fast());
        h.link.fail_sends(true);
        h.frames.send(heartbeat(1, 1)).await.unwrap();
        h.frames.send(position(42)).await.unwrap();

        let cache = h.cache.clone();
        eventually(|| cache.read(|s| s.messages.contains(MessageKind::GlobalPositionInt))).await;
        assert!(h.link.sent().is_empty());
        // Still only claimed once even though the sends failed.
        assert_eq!(h.cache.claim_stream_request(), None);
        shut_down(h.stop, h.task).await;
    }

    #[tokio::test]
    async fn stop_interrupts_a_long_heartbeat_wait() {
        let h = start(IngestConfig {
            heartbeat_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(30),
        });
        sleep(Duration::from_millis(20)).await;
        shut_down(h.stop, h.task).await;
    }

    #[tokio::test]
    async fn closed_channel_idles_until_stop() {
        let h = start(fast());
        h.frames.send(heartbeat(1, 1)).await.unwrap();
        let cache = h.cache.clone();
        eventually(|| cache.is_connected()).await;

        drop(h.frames);
        sleep(Duration::from_millis(50)).await;
        assert!(!h.task.is_finished(), "loop waits for stop after the reader ends");
        shut_down(h.stop, h.task).await;
    }

    #[tokio::test]
    async fn dropped_stop_sender_ends_the_loop() {
        let h = start(fast());
        drop(h.stop);
        tokio::time::timeout(Duration::from_secs(1), h.task)
            .await
            .expect("loop ends when its stop sender disappears")
            .unwrap();
    }
}

//! [`StateCache`] – the shared "latest known state" of the vehicle.
//!
//! Link bookkeeping ([`LinkState`]) and the per-kind message slots
//! ([`MessageCache`]) live together in one [`CacheState`] behind a single
//! mutex, so every reader observes both halves as they were at one instant.
//!
//! Readers go through [`StateCache::read`].  Mutation is crate-private and
//! performed only by the ingestion loop.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rover_types::{
    Attitude, GlobalPositionInt, GpsRawInt, Heartbeat, HomePosition, LinkFrame, MessageKind,
    SysStatus, TelemetryMessage,
};

/// Connection bookkeeping for the single vehicle link.
///
/// Starts disconnected with target ids `0`.  There is no transition back to
/// disconnected once a heartbeat has been seen; `last_seen_at` is the only
/// staleness signal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkState {
    pub connected: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub target_system: u8,
    pub target_component: u8,
    pub streaming_requested: bool,
}

/// Most recent payload per watched [`MessageKind`].
///
/// One slot per kind: inserting a message replaces whatever its kind held
/// before.  Slots are never cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageCache {
    heartbeat: Option<Heartbeat>,
    global_position_int: Option<GlobalPositionInt>,
    attitude: Option<Attitude>,
    sys_status: Option<SysStatus>,
    gps_raw_int: Option<GpsRawInt>,
    home_position: Option<HomePosition>,
}

impl MessageCache {
    /// Store `message` in the slot for its kind, replacing the previous one.
    pub fn insert(&mut self, message: TelemetryMessage) {
        match message {
            TelemetryMessage::Heartbeat(m) => self.heartbeat = Some(m),
            TelemetryMessage::GlobalPositionInt(m) => self.global_position_int = Some(m),
            TelemetryMessage::Attitude(m) => self.attitude = Some(m),
            TelemetryMessage::SysStatus(m) => self.sys_status = Some(m),
            TelemetryMessage::GpsRawInt(m) => self.gps_raw_int = Some(m),
            TelemetryMessage::HomePosition(m) => self.home_position = Some(m),
        }
    }

    /// The cached message of `kind`, if one has been observed.
    pub fn get(&self, kind: MessageKind) -> Option<TelemetryMessage> {
        match kind {
            MessageKind::Heartbeat => self.heartbeat.clone().map(TelemetryMessage::Heartbeat),
            MessageKind::GlobalPositionInt => self
                .global_position_int
                .clone()
                .map(TelemetryMessage::GlobalPositionInt),
            MessageKind::Attitude => self.attitude.clone().map(TelemetryMessage::Attitude),
            MessageKind::SysStatus => self.sys_status.clone().map(TelemetryMessage::SysStatus),
            MessageKind::GpsRawInt => self.gps_raw_int.clone().map(TelemetryMessage::GpsRawInt),
            MessageKind::HomePosition => {
                self.home_position.clone().map(TelemetryMessage::HomePosition)
            }
        }
    }

    /// Number of kinds observed so far (at most six).
    pub fn len(&self) -> usize {
        MessageKind::ALL
            .iter()
            .filter(|kind| self.contains(**kind))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, kind: MessageKind) -> bool {
        match kind {
            MessageKind::Heartbeat => self.heartbeat.is_some(),
            MessageKind::GlobalPositionInt => self.global_position_int.is_some(),
            MessageKind::Attitude => self.attitude.is_some(),
            MessageKind::SysStatus => self.sys_status.is_some(),
            MessageKind::GpsRawInt => self.gps_raw_int.is_some(),
            MessageKind::HomePosition => self.home_position.is_some(),
        }
    }

    pub fn heartbeat(&self) -> Option<&Heartbeat> {
        self.heartbeat.as_ref()
    }

    pub fn global_position_int(&self) -> Option<&GlobalPositionInt> {
        self.global_position_int.as_ref()
    }

    pub fn attitude(&self) -> Option<&Attitude> {
        self.attitude.as_ref()
    }

    pub fn sys_status(&self) -> Option<&SysStatus> {
        self.sys_status.as_ref()
    }

    pub fn gps_raw_int(&self) -> Option<&GpsRawInt> {
        self.gps_raw_int.as_ref()
    }

    pub fn home_position(&self) -> Option<&HomePosition> {
        self.home_position.as_ref()
    }
}

/// Everything guarded by the cache lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheState {
    pub link: LinkState,
    pub messages: MessageCache,
}

/// Cheaply clonable handle to the shared [`CacheState`].
#[derive(Clone, Default)]
pub struct StateCache {
    inner: Arc<Mutex<CacheState>>,
}

impl StateCache {
    /// Create a cache in the initial disconnected, empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against a consistent view of the whole state.
    ///
    /// Keep `f` short: the ingestion loop waits on the same lock.
    pub fn read<R>(&self, f: impl FnOnce(&CacheState) -> R) -> R {
        f(&*self.inner.lock())
    }

    pub fn is_connected(&self) -> bool {
        self.read(|s| s.link.connected)
    }

    /// `(target_system, target_component)`; `(0, 0)` until a vehicle heartbeat.
    pub fn target(&self) -> (u8, u8) {
        self.read(|s| (s.link.target_system, s.link.target_component))
    }

    // ── Writer side (ingestion loop only) ──────────────────────────────────

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut CacheState) -> R) -> R {
        f(&mut *self.inner.lock())
    }

    /// Forget everything; used when a new link is attached.
    pub(crate) fn reset(&self) {
        self.write(|s| *s = CacheState::default());
    }

    /// Fold one received frame into the cache.
    ///
    /// Any heartbeat marks the link connected.  Only a vehicle heartbeat
    /// adopts its sender as the target and fills the `HEARTBEAT` slot; other
    /// heartbeats on the bus refresh liveness and are otherwise dropped.
    ///
    /// Returns the new target when this frame changed it.
    pub(crate) fn record(&self, frame: LinkFrame, now: DateTime<Utc>) -> Option<(u8, u8)> {
        self.write(|s| {
            s.link.last_seen_at = Some(now);
            if !frame.is_heartbeat() {
                s.messages.insert(frame.message);
                return None;
            }

            s.link.connected = true;
            if !frame.is_vehicle_heartbeat() {
                return None;
            }
            let target = (frame.system_id, frame.component_id);
            let previous = (s.link.target_system, s.link.target_component);
            (s.link.target_system, s.link.target_component) = target;
            s.messages.insert(frame.message);
            (target != previous).then_some(target)
        })
    }

    /// Claim the once-per-connection stream request.
    ///
    /// Returns the target ids the first time it is called once a vehicle
    /// target is known and `None` on every later call.
    pub(crate) fn claim_stream_request(&self) -> Option<(u8, u8)> {
        self.write(|s| {
            if s.link.streaming_requested || s.link.target_system == 0 {
                None
            } else {
                s.link.streaming_requested = true;
                Some((s.link.target_system, s.link.target_component))
            }
        })
    }
}

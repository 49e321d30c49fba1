//! Snapshot Builder – the client-facing, unit-converted view of the cache.
//!
//! [`build`] is a pure function of a [`CacheState`]; [`take`] runs it under
//! the cache lock and then applies [`Sanitize`], so every float in the result
//! is either finite or `None` and the whole structure serializes to JSON.
//!
//! | Field | Source | Conversion |
//! |---|---|---|
//! | `position.lat_deg` / `lon_deg` | `GLOBAL_POSITION_INT.lat` / `lon` | ÷ 1e7 |
//! | `position.relative_alt_m` | `GLOBAL_POSITION_INT.relative_alt` | mm → m |
//! | `home.lat_deg` / `lon_deg` | `HOME_POSITION.latitude` / `longitude` | ÷ 1e7 |
//! | `home.alt_m` | `HOME_POSITION.altitude` | mm → m |
//! | `attitude.*_rad` | `ATTITUDE.roll` / `pitch` / `yaw` | none |
//! | `gps.*` | `GPS_RAW_INT.fix_type` / `satellites_visible` | none |
//! | `battery.voltage_v` | `SYS_STATUS.voltage_battery` | mV → V |
//! | `battery.remaining_pct` | `SYS_STATUS.battery_remaining` | none |
//!
//! A field whose source was never observed is `None`, never zero.

use chrono::{DateTime, Utc};
use rover_types::{Attitude, GlobalPositionInt, GpsRawInt, Heartbeat, HomePosition, SysStatus};
use serde::{Deserialize, Serialize};

use crate::state::{CacheState, StateCache};

const DEG_E7: f64 = 1e7;
const MILLI: f64 = 1000.0;

/// Point-in-time view of the vehicle, safe to hand to any JSON encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub connected: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub target_system: u8,
    pub target_component: u8,
    pub position: PositionView,
    pub home: HomeView,
    pub attitude: AttitudeView,
    pub gps: GpsView,
    pub battery: BatteryView,
    pub raw: RawMessages,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub lat_deg: Option<f64>,
    pub lon_deg: Option<f64>,
    pub relative_alt_m: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HomeView {
    pub lat_deg: Option<f64>,
    pub lon_deg: Option<f64>,
    pub alt_m: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttitudeView {
    pub roll_rad: Option<f64>,
    pub pitch_rad: Option<f64>,
    pub yaw_rad: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsView {
    pub fix_type: Option<u8>,
    pub satellites_visible: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryView {
    pub voltage_v: Option<f64>,
    pub remaining_pct: Option<i8>,
}

/// Unconverted payloads of the six watched kinds, keyed by MAVLink name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessages {
    #[serde(rename = "HEARTBEAT")]
    pub heartbeat: Option<Heartbeat>,
    #[serde(rename = "GLOBAL_POSITION_INT")]
    pub global_position_int: Option<GlobalPositionInt>,
    #[serde(rename = "ATTITUDE")]
    pub attitude: Option<Attitude>,
    #[serde(rename = "GPS_RAW_INT")]
    pub gps_raw_int: Option<GpsRawInt>,
    #[serde(rename = "SYS_STATUS")]
    pub sys_status: Option<SysStatus>,
    #[serde(rename = "HOME_POSITION")]
    pub home_position: Option<HomePosition>,
}

// ────────────────────────────────────────────────────────────────────────────
// Building
// ────────────────────────────────────────────────────────────────────────────

/// Read the cache under its lock and return a sanitized [`Snapshot`].
pub fn take(cache: &StateCache) -> Snapshot {
    let mut snapshot = cache.read(build);
    snapshot.sanitize();
    snapshot
}

/// Derive a [`Snapshot`] from `state` without sanitizing it.
pub fn build(state: &CacheState) -> Snapshot {
    let messages = &state.messages;
    let pos = messages.global_position_int();
    let home = messages.home_position();
    let att = messages.attitude();
    let gps = messages.gps_raw_int();
    let sys = messages.sys_status();

    Snapshot {
        connected: state.link.connected,
        last_seen_at: state.link.last_seen_at,
        target_system: state.link.target_system,
        target_component: state.link.target_component,
        position: PositionView {
            lat_deg: scaled(pos.and_then(|p| p.lat), DEG_E7),
            lon_deg: scaled(pos.and_then(|p| p.lon), DEG_E7),
            relative_alt_m: scaled(pos.and_then(|p| p.relative_alt), MILLI),
        },
        home: HomeView {
            lat_deg: scaled(home.and_then(|h| h.latitude), DEG_E7),
            lon_deg: scaled(home.and_then(|h| h.longitude), DEG_E7),
            alt_m: scaled(home.and_then(|h| h.altitude), MILLI),
        },
        attitude: AttitudeView {
            roll_rad: att.and_then(|a| a.roll).map(f64::from),
            pitch_rad: att.and_then(|a| a.pitch).map(f64::from),
            yaw_rad: att.and_then(|a| a.yaw).map(f64::from),
        },
        gps: GpsView {
            fix_type: gps.and_then(|g| g.fix_type),
            satellites_visible: gps.and_then(|g| g.satellites_visible),
        },
        battery: BatteryView {
            voltage_v: scaled(sys.and_then(|s| s.voltage_battery), MILLI),
            remaining_pct: sys.and_then(|s| s.battery_remaining),
        },
        raw: RawMessages {
            heartbeat: messages.heartbeat().cloned(),
            global_position_int: pos.cloned(),
            attitude: att.cloned(),
            gps_raw_int: gps.cloned(),
            sys_status: sys.cloned(),
            home_position: home.cloned(),
        },
    }
}

fn scaled<T: Into<f64>>(raw: Option<T>, divisor: f64) -> Option<f64> {
    raw.map(|v| v.into() / divisor)
}

// ────────────────────────────────────────────────────────────────────────────
// Sanitizing
// ────────────────────────────────────────────────────────────────────────────

/// Replace every non-finite float reachable from `self` with `None`.
pub trait Sanitize {
    fn sanitize(&mut self);
}

impl Sanitize for Option<f64> {
    fn sanitize(&mut self) {
        if self.is_some_and(|v| !v.is_finite()) {
            *self = None;
        }
    }
}

impl Sanitize for Option<f32> {
    fn sanitize(&mut self) {
        if self.is_some_and(|v| !v.is_finite()) {
            *self = None;
        }
    }
}

impl<T: Sanitize, const N: usize> Sanitize for [T; N] {
    fn sanitize(&mut self) {
        self.iter_mut().for_each(Sanitize::sanitize);
    }
}

impl<T: Sanitize> Sanitize for Vec<T> {
    fn sanitize(&mut self) {
        self.iter_mut().for_each(Sanitize::sanitize);
    }
}

impl Sanitize for Snapshot {
    fn sanitize(&mut self) {
        self.position.sanitize();
        self.home.sanitize();
        self.attitude.sanitize();
        self.battery.voltage_v.sanitize();
        self.raw.sanitize();
    }
}

impl Sanitize for PositionView {
    fn sanitize(&mut self) {
        self.lat_deg.sanitize();
        self.lon_deg.sanitize();
        self.relative_alt_m.sanitize();
    }
}

impl Sanitize for HomeView {
    fn sanitize(&mut self) {
        self.lat_deg.sanitize();
        self.lon_deg.sanitize();
        self.alt_m.sanitize();
    }
}

impl Sanitize for AttitudeView {
    fn sanitize(&mut self) {
        self.roll_rad.sanitize();
        self.pitch_rad.sanitize();
        self.yaw_rad.sanitize();
    }
}

// Heartbeat, GLOBAL_POSITION_INT, SYS_STATUS and GPS_RAW_INT are all-integer.
impl Sanitize for RawMessages {
    fn sanitize(&mut self) {
        if let Some(att) = self.attitude.as_mut() {
            att.sanitize();
        }
        if let Some(home) = self.home_position.as_mut() {
            home.sanitize();
        }
    }
}

impl Sanitize for Attitude {
    fn sanitize(&mut self) {
        self.roll.sanitize();
        self.pitch.sanitize();
        self.yaw.sanitize();
        self.rollspeed.sanitize();
        self.pitchspeed.sanitize();
        self.yawspeed.sanitize();
    }
}

impl Sanitize for HomePosition {
    fn sanitize(&mut self) {
        self.x.sanitize();
        self.y.sanitize();
        self.z.sanitize();
        self.q.sanitize();
        self.approach_x.sanitize();
        self.approach_y.sanitize();
        self.approach_z.sanitize();
    }
}

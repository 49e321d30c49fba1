//! `rover-types` – shared data model for the rover ground-control gateway.
//!
//! Every other crate in the workspace speaks in these types:
//!
//! - [`TelemetryMessage`] – a decoded inbound message of one of the six
//!   watched kinds, each carrying a typed payload with explicit optional
//!   fields.
//! - [`LinkFrame`] – a [`TelemetryMessage`] plus the sender identifiers
//!   taken from the frame header.
//! - [`OutboundCommand`] – everything the gateway ever sends to the vehicle.
//! - [`ManualControlCommand`] – operator joystick input, validated before
//!   it is turned into an [`OutboundCommand::ManualControl`].
//! - [`GatewayError`] – the workspace-wide error type.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Message kinds
// ────────────────────────────────────────────────────────────────────────────

/// The fixed set of inbound message kinds the gateway tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Heartbeat,
    GlobalPositionInt,
    Attitude,
    SysStatus,
    GpsRawInt,
    HomePosition,
}

impl MessageKind {
    /// All watched kinds, in snapshot order.
    pub const ALL: [MessageKind; 6] = [
        MessageKind::Heartbeat,
        MessageKind::GlobalPositionInt,
        MessageKind::Attitude,
        MessageKind::SysStatus,
        MessageKind::GpsRawInt,
        MessageKind::HomePosition,
    ];

    /// MAVLink message name, e.g. `"GLOBAL_POSITION_INT"`.
    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Heartbeat => "HEARTBEAT",
            MessageKind::GlobalPositionInt => "GLOBAL_POSITION_INT",
            MessageKind::Attitude => "ATTITUDE",
            MessageKind::SysStatus => "SYS_STATUS",
            MessageKind::GpsRawInt => "GPS_RAW_INT",
            MessageKind::HomePosition => "HOME_POSITION",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Payloads
// ────────────────────────────────────────────────────────────────────────────

/// `HEARTBEAT` payload.  Enum and bitmask fields are carried as raw numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Heartbeat {
    pub custom_mode: Option<u32>,
    #[serde(rename = "type")]
    pub vehicle_type: Option<u8>,
    pub autopilot: Option<u8>,
    pub base_mode: Option<u8>,
    pub system_status: Option<u8>,
    pub mavlink_version: Option<u8>,
}

/// `GLOBAL_POSITION_INT` payload.
///
/// `lat`/`lon` are degrees × 1e7, `alt`/`relative_alt` are millimetres.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalPositionInt {
    pub time_boot_ms: Option<u32>,
    pub lat: Option<i32>,
    pub lon: Option<i32>,
    pub alt: Option<i32>,
    pub relative_alt: Option<i32>,
    pub vx: Option<i16>,
    pub vy: Option<i16>,
    pub vz: Option<i16>,
    pub hdg: Option<u16>,
}

/// `ATTITUDE` payload.  Angles in radians, rates in rad/s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attitude {
    pub time_boot_ms: Option<u32>,
    pub roll: Option<f32>,
    pub pitch: Option<f32>,
    pub yaw: Option<f32>,
    pub rollspeed: Option<f32>,
    pub pitchspeed: Option<f32>,
    pub yawspeed: Option<f32>,
}

/// `SYS_STATUS` payload (battery and link-quality subset).
///
/// `voltage_battery` is millivolts, `battery_remaining` is a percentage
/// (`-1` when the autopilot does not estimate it).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysStatus {
    pub load: Option<u16>,
    pub voltage_battery: Option<u16>,
    pub current_battery: Option<i16>,
    pub battery_remaining: Option<i8>,
    pub drop_rate_comm: Option<u16>,
    pub errors_comm: Option<u16>,
}

/// `GPS_RAW_INT` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsRawInt {
    pub time_usec: Option<u64>,
    pub fix_type: Option<u8>,
    pub lat: Option<i32>,
    pub lon: Option<i32>,
    pub alt: Option<i32>,
    pub eph: Option<u16>,
    pub epv: Option<u16>,
    pub vel: Option<u16>,
    pub cog: Option<u16>,
    pub satellites_visible: Option<u8>,
}

/// `HOME_POSITION` payload.
///
/// `latitude`/`longitude` are degrees × 1e7, `altitude` is millimetres.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomePosition {
    pub latitude: Option<i32>,
    pub longitude: Option<i32>,
    pub altitude: Option<i32>,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
    pub q: [Option<f32>; 4],
    pub approach_x: Option<f32>,
    pub approach_y: Option<f32>,
    pub approach_z: Option<f32>,
}

/// A decoded inbound message of one of the watched kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mavpackettype", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TelemetryMessage {
    Heartbeat(Heartbeat),
    GlobalPositionInt(GlobalPositionInt),
    Attitude(Attitude),
    SysStatus(SysStatus),
    GpsRawInt(GpsRawInt),
    HomePosition(HomePosition),
}

impl TelemetryMessage {
    /// The [`MessageKind`] of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            TelemetryMessage::Heartbeat(_) => MessageKind::Heartbeat,
            TelemetryMessage::GlobalPositionInt(_) => MessageKind::GlobalPositionInt,
            TelemetryMessage::Attitude(_) => MessageKind::Attitude,
            TelemetryMessage::SysStatus(_) => MessageKind::SysStatus,
            TelemetryMessage::GpsRawInt(_) => MessageKind::GpsRawInt,
            TelemetryMessage::HomePosition(_) => MessageKind::HomePosition,
        }
    }
}

/// A watched message as it arrived on the link, with the header identifiers
/// of the sender.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkFrame {
    pub system_id: u8,
    pub component_id: u8,
    pub message: TelemetryMessage,
}

impl LinkFrame {
    pub fn new(system_id: u8, component_id: u8, message: TelemetryMessage) -> Self {
        Self {
            system_id,
            component_id,
            message,
        }
    }

    /// `true` when the frame carries a `HEARTBEAT`.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self.message, TelemetryMessage::Heartbeat(_))
    }

    /// `true` for a `HEARTBEAT` that a vehicle could have sent.
    ///
    /// Ground stations, onboard computers, gimbals and ADS-B receivers share
    /// the bus but are never command targets.  A heartbeat without a type is
    /// given the benefit of the doubt.
    pub fn is_vehicle_heartbeat(&self) -> bool {
        let TelemetryMessage::Heartbeat(hb) = &self.message else {
            return false;
        };
        if self.component_id == COMP_ID_GIMBAL {
            return false;
        }
        !hb.vehicle_type.is_some_and(|t| NON_VEHICLE_TYPES.contains(&t))
    }
}

/// `MAV_COMP_ID_GIMBAL`.
pub const COMP_ID_GIMBAL: u8 = 154;

/// `MAV_TYPE` values of heartbeat senders that are not vehicles:
/// `GCS`, `ONBOARD_CONTROLLER`, `GIMBAL`, `ADSB`.
pub const NON_VEHICLE_TYPES: [u8; 4] = [6, 18, 26, 27];

// ────────────────────────────────────────────────────────────────────────────
// Outbound
// ────────────────────────────────────────────────────────────────────────────

/// `MAV_DATA_STREAM_ALL`.
pub const DATA_STREAM_ALL: u8 = 0;

/// Stream rate requested from the vehicle after the first heartbeat.
pub const DEFAULT_STREAM_RATE_HZ: u16 = 5;

/// Every message the gateway sends to the vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Legacy `REQUEST_DATA_STREAM` asking the autopilot to stream telemetry.
    RequestDataStream {
        target_system: u8,
        target_component: u8,
        stream_id: u8,
        rate_hz: u16,
        start: bool,
    },
    /// `COMMAND_LONG` carrying `MAV_CMD_GET_HOME_POSITION`.
    GetHomePosition {
        target_system: u8,
        target_component: u8,
    },
    /// `MANUAL_CONTROL` joystick frame.
    ManualControl {
        target_system: u8,
        x: i16,
        y: i16,
        z: i16,
        r: i16,
        buttons: u16,
    },
}

/// Operator control input: pitch/roll/throttle/yaw-equivalent axes plus a
/// button bitmask.
///
/// `x`, `y` and `r` range over `[-1000, 1000]`; `z` (throttle) over
/// `[0, 1000]`.  Missing JSON fields take the neutral stick position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualControlCommand {
    #[serde(default)]
    pub x: i16,
    #[serde(default)]
    pub y: i16,
    #[serde(default = "default_throttle")]
    pub z: i16,
    #[serde(default)]
    pub r: i16,
    #[serde(default)]
    pub buttons: u16,
}

fn default_throttle() -> i16 {
    500
}

impl Default for ManualControlCommand {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            z: default_throttle(),
            r: 0,
            buttons: 0,
        }
    }
}

impl ManualControlCommand {
    /// Check every axis against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidCommand`] naming the first axis that is
    /// out of range.
    pub fn validate(&self) -> Result<(), GatewayError> {
        check_axis("x", self.x, -1000, 1000)?;
        check_axis("y", self.y, -1000, 1000)?;
        check_axis("z", self.z, 0, 1000)?;
        check_axis("r", self.r, -1000, 1000)?;
        Ok(())
    }

    /// Address the command to `target_system`.
    pub fn into_outbound(self, target_system: u8) -> OutboundCommand {
        OutboundCommand::ManualControl {
            target_system,
            x: self.x,
            y: self.y,
            z: self.z,
            r: self.r,
            buttons: self.buttons,
        }
    }
}

fn check_axis(field: &str, value: i16, min: i16, max: i16) -> Result<(), GatewayError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(GatewayError::InvalidCommand {
            field: field.to_string(),
            value: value.into(),
            min: min.into(),
            max: max.into(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GatewayError {
    #[error("MAVLink connection is not initialized")]
    LinkNotInitialized,

    #[error("Target system is unknown. Wait for heartbeat first")]
    TargetUnknown,

    #[error("{field} = {value} is out of range [{min}, {max}]")]
    InvalidCommand {
        field: String,
        value: i32,
        min: i32,
        max: i32,
    },

    #[error("Link Error: {0}")]
    Link(String),

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Config Error: {0}")]
    Config(String),
}

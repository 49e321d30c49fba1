//! [`MavlinkLink`] – a [`VehicleLink`] backed by the `mavlink` crate.
//!
//! Inbound frames are decoded from [`MavMessage`] into
//! [`TelemetryMessage`]; anything outside the six watched kinds is dropped
//! here.  Outbound [`OutboundCommand`]s are encoded into `REQUEST_DATA_STREAM`,
//! `COMMAND_LONG` and `MANUAL_CONTROL` frames.

use std::sync::atomic::{AtomicU8, Ordering};

use mavlink::common::{self, MavCmd, MavMessage};
use mavlink::{MavConnection, MavHeader};
use rover_types::{
    Attitude, GatewayError, GlobalPositionInt, GpsRawInt, Heartbeat, HomePosition, LinkFrame,
    OutboundCommand, SysStatus, TelemetryMessage,
};
use tracing::info;

use crate::link::VehicleLink;

/// System id the gateway uses as a ground station.
pub const GCS_SYSTEM_ID: u8 = 255;

/// Component id the gateway uses as a ground station.
pub const GCS_COMPONENT_ID: u8 = 0;

/// A live MAVLink connection to one vehicle.
pub struct MavlinkLink {
    endpoint: String,
    conn: Box<dyn MavConnection<MavMessage> + Sync + Send>,
    sequence: AtomicU8,
}

impl MavlinkLink {
    /// Open `endpoint` (e.g. `"udpin:127.0.0.1:14550"`, `"tcpout:10.0.0.2:5760"`,
    /// `"serial:/dev/ttyACM0:57600"`).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Link`] when the endpoint string is malformed or
    /// the socket / port cannot be opened.
    pub fn connect(endpoint: &str) -> Result<Self, GatewayError> {
        let conn = mavlink::connect::<MavMessage>(endpoint)
            .map_err(|e| GatewayError::Link(format!("cannot open {endpoint}: {e}")))?;
        info!(endpoint, "MAVLink connection opened");
        Ok(Self {
            endpoint: endpoint.to_string(),
            conn,
            sequence: AtomicU8::new(0),
        })
    }

    fn next_header(&self) -> MavHeader {
        MavHeader {
            system_id: GCS_SYSTEM_ID,
            component_id: GCS_COMPONENT_ID,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl VehicleLink for MavlinkLink {
    fn recv(&self) -> Result<Option<LinkFrame>, GatewayError> {
        let (header, msg) = self
            .conn
            .recv()
            .map_err(|e| GatewayError::Link(format!("receive on {}: {e}", self.endpoint)))?;
        Ok(decode(&msg).map(|message| LinkFrame::new(header.system_id, header.component_id, message)))
    }

    fn send(&self, command: &OutboundCommand) -> Result<(), GatewayError> {
        let msg = encode(command);
        self.conn
            .send(&self.next_header(), &msg)
            .map(|_| ())
            .map_err(|e| GatewayError::Link(format!("send on {}: {e}", self.endpoint)))
    }

    fn describe(&self) -> String {
        self.endpoint.clone()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Codec translation
// ────────────────────────────────────────────────────────────────────────────

/// Translate a decoded MAVLink message into a [`TelemetryMessage`].
///
/// Returns `None` for every message kind the gateway does not watch.
pub fn decode(msg: &MavMessage) -> Option<TelemetryMessage> {
    let message = match msg {
        MavMessage::HEARTBEAT(d) => TelemetryMessage::Heartbeat(Heartbeat {
            custom_mode: Some(d.custom_mode),
            vehicle_type: Some(d.mavtype as u8),
            autopilot: Some(d.autopilot as u8),
            base_mode: Some(d.base_mode.bits()),
            system_status: Some(d.system_status as u8),
            mavlink_version: Some(d.mavlink_version),
        }),
        MavMessage::GLOBAL_POSITION_INT(d) => TelemetryMessage::GlobalPositionInt(GlobalPositionInt {
            time_boot_ms: Some(d.time_boot_ms),
            lat: Some(d.lat),
            lon: Some(d.lon),
            alt: Some(d.alt),
            relative_alt: Some(d.relative_alt),
            vx: Some(d.vx),
            vy: Some(d.vy),
            vz: Some(d.vz),
            hdg: Some(d.hdg),
        }),
        MavMessage::ATTITUDE(d) => TelemetryMessage::Attitude(Attitude {
            time_boot_ms: Some(d.time_boot_ms),
            roll: Some(d.roll),
            pitch: Some(d.pitch),
            yaw: Some(d.yaw),
            rollspeed: Some(d.rollspeed),
            pitchspeed: Some(d.pitchspeed),
            yawspeed: Some(d.yawspeed),
        }),
        MavMessage::SYS_STATUS(d) => TelemetryMessage::SysStatus(SysStatus {
            load: Some(d.load),
            voltage_battery: Some(d.voltage_battery),
            current_battery: Some(d.current_battery),
            battery_remaining: Some(d.battery_remaining),
            drop_rate_comm: Some(d.drop_rate_comm),
            errors_comm: Some(d.errors_comm),
        }),
        MavMessage::GPS_RAW_INT(d) => TelemetryMessage::GpsRawInt(GpsRawInt {
            time_usec: Some(d.time_usec),
            fix_type: Some(d.fix_type as u8),
            lat: Some(d.lat),
            lon: Some(d.lon),
            alt: Some(d.alt),
            eph: Some(d.eph),
            epv: Some(d.epv),
            vel: Some(d.vel),
            cog: Some(d.cog),
            satellites_visible: Some(d.satellites_visible),
        }),
        MavMessage::HOME_POSITION(d) => TelemetryMessage::HomePosition(HomePosition {
            latitude: Some(d.latitude),
            longitude: Some(d.longitude),
            altitude: Some(d.altitude),
            x: Some(d.x),
            y: Some(d.y),
            z: Some(d.z),
            q: d.q.map(Some),
            approach_x: Some(d.approach_x),
            approach_y: Some(d.approach_y),
            approach_z: Some(d.approach_z),
        }),
        _ => return None,
    };
    Some(message)
}

/// Translate an [`OutboundCommand`] into the MAVLink message that carries it.
#[allow(deprecated)]
pub fn encode(command: &OutboundCommand) -> MavMessage {
    match *command {
        OutboundCommand::RequestDataStream {
            target_system,
            target_component,
            stream_id,
            rate_hz,
            start,
        } => MavMessage::REQUEST_DATA_STREAM(common::REQUEST_DATA_STREAM_DATA {
            req_message_rate: rate_hz,
            target_system,
            target_component,
            req_stream_id: stream_id,
            start_stop: u8::from(start),
        }),
        OutboundCommand::GetHomePosition {
            target_system,
            target_component,
        } => MavMessage::COMMAND_LONG(common::COMMAND_LONG_DATA {
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            param5: 0.0,
            param6: 0.0,
            param7: 0.0,
            command: MavCmd::MAV_CMD_GET_HOME_POSITION,
            target_system,
            target_component,
            confirmation: 0,
        }),
        OutboundCommand::ManualControl {
            target_system,
            x,
            y,
            z,
            r,
            buttons,
        } => MavMessage::MANUAL_CONTROL(common::MANUAL_CONTROL_DATA {
            x,
            y,
            z,
            r,
            buttons,
            target: target_system,
            ..Default::default()
        }),
    }
}

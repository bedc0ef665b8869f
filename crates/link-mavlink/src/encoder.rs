//! [`OutboundCommand`] → MAVLink v2 bytes

use crate::error::LinkError;
use core_types::{CommandId, OutboundCommand};
use mavlink::ardupilotmega::{MavCmd, MavMessage, MavSeverity, COMMAND_LONG_DATA, STATUSTEXT_DATA};
use mavlink::MavHeader;

/// Conventional ground station identity (MAV_COMP_ID_MISSIONPLANNER)
pub const GCS_SYSTEM_ID: u8 = 255;
pub const GCS_COMPONENT_ID: u8 = 190;

/// Default autopilot identity (MAV_COMP_ID_AUTOPILOT1)
pub const VEHICLE_SYSTEM_ID: u8 = 1;
pub const VEHICLE_COMPONENT_ID: u8 = 1;

/// Frames messages under one sender identity with a running sequence number
#[derive(Debug, Clone)]
pub struct MavlinkEncoder {
    system_id: u8,
    component_id: u8,
    sequence: u8,
    target_system: u8,
    target_component: u8,
}

impl MavlinkEncoder {
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id,
            sequence: 0,
            target_system: VEHICLE_SYSTEM_ID,
            target_component: VEHICLE_COMPONENT_ID,
        }
    }

    pub fn ground_station() -> Self {
        Self::new(GCS_SYSTEM_ID, GCS_COMPONENT_ID)
    }

    pub fn vehicle() -> Self {
        Self::new(VEHICLE_SYSTEM_ID, VEHICLE_COMPONENT_ID).with_target(GCS_SYSTEM_ID, GCS_COMPONENT_ID)
    }

    /// Address commands to a specific autopilot
    pub fn with_target(mut self, system: u8, component: u8) -> Self {
        self.target_system = system;
        self.target_component = component;
        self
    }

    pub fn encode(&mut self, message: &MavMessage) -> Result<Vec<u8>, LinkError> {
        let header = MavHeader {
            system_id: self.system_id,
            component_id: self.component_id,
            sequence: self.sequence,
        };
        self.sequence = self.sequence.wrapping_add(1);

        let mut bytes = Vec::with_capacity(64);
        mavlink::write_v2_msg(&mut bytes, header, message)
            .map_err(|e| LinkError::Encode(format!("{:?}", e)))?;
        Ok(bytes)
    }

    pub fn encode_command(&mut self, command: &OutboundCommand) -> Result<Vec<u8>, LinkError> {
        let message = self.command_long(mav_cmd(command.command_id())?, command.params());
        self.encode(&message)
    }

    /// COMMAND_LONG addressed to the configured target
    pub fn command_long(&self, command: MavCmd, params: [f32; 7]) -> MavMessage {
        let [param1, param2, param3, param4, param5, param6, param7] = params;
        MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            param1,
            param2,
            param3,
            param4,
            param5,
            param6,
            param7,
            command,
            target_system: self.target_system,
            target_component: self.target_component,
            confirmation: 0,
        })
    }
}

/// Only the commands the engine actually issues have an encoding
pub fn mav_cmd(id: CommandId) -> Result<MavCmd, LinkError> {
    match id {
        CommandId::PreflightCalibration => Ok(MavCmd::MAV_CMD_PREFLIGHT_CALIBRATION),
        CommandId::AccelcalVehiclePos => Ok(MavCmd::MAV_CMD_ACCELCAL_VEHICLE_POS),
        CommandId::RebootShutdown => Ok(MavCmd::MAV_CMD_PREFLIGHT_REBOOT_SHUTDOWN),
        CommandId::Other(raw) => Err(LinkError::UnsupportedCommand(raw)),
    }
}

/// STATUSTEXT with `text` truncated to the 50 byte field
pub fn statustext(severity: MavSeverity, text: &str) -> MavMessage {
    let mut field = [0u8; 50];
    for (slot, byte) in field.iter_mut().zip(text.bytes()) {
        *slot = byte;
    }
    MavMessage::STATUSTEXT(STATUSTEXT_DATA {
        severity,
        text: field,
    })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::decoder::MavlinkDecoder;

    fn decode_one(bytes: &[u8]) -> (MavHeader, MavMessage) {
        let mut decoder = MavlinkDecoder::new();
        decoder.feed(bytes);
        decoder.next_message().unwrap()
    }

    #[test]
    fn test_start_command_layout() {
        let mut encoder = MavlinkEncoder::ground_station();
        let bytes = encoder
            .encode_command(&OutboundCommand::PreflightCalibration([
                0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0,
            ]))
            .unwrap();

        let (header, message) = decode_one(&bytes);
        assert_eq!(header.system_id, GCS_SYSTEM_ID);
        assert_eq!(header.component_id, GCS_COMPONENT_ID);
        let MavMessage::COMMAND_LONG(cmd) = message else {
            panic!("Expected COMMAND_LONG");
        };
        assert_eq!(cmd.command, MavCmd::MAV_CMD_PREFLIGHT_CALIBRATION);
        assert_eq!(cmd.param5, 1.0);
        assert_eq!(cmd.target_system, VEHICLE_SYSTEM_ID);
        assert_eq!(cmd.target_component, VEHICLE_COMPONENT_ID);
    }

    #[test]
    fn test_position_and_reboot_commands() {
        let mut encoder = MavlinkEncoder::ground_station().with_target(3, 1);

        let bytes = encoder
            .encode_command(&OutboundCommand::AccelPosition { position: 6 })
            .unwrap();
        let MavMessage::COMMAND_LONG(cmd) = decode_one(&bytes).1 else {
            panic!("Expected COMMAND_LONG");
        };
        assert_eq!(cmd.command, MavCmd::MAV_CMD_ACCELCAL_VEHICLE_POS);
        assert_eq!(cmd.param1, 6.0);
        assert_eq!(cmd.target_system, 3);

        let bytes = encoder.encode_command(&OutboundCommand::Reboot).unwrap();
        let MavMessage::COMMAND_LONG(cmd) = decode_one(&bytes).1 else {
            panic!("Expected COMMAND_LONG");
        };
        assert_eq!(cmd.command, MavCmd::MAV_CMD_PREFLIGHT_REBOOT_SHUTDOWN);
        assert_eq!(cmd.param1, 1.0);
    }

    #[test]
    fn test_sequence_increments() {
        let mut encoder = MavlinkEncoder::ground_station();
        let first = encoder.encode_command(&OutboundCommand::CancelCalibration).unwrap();
        let second = encoder.encode_command(&OutboundCommand::CancelCalibration).unwrap();
        assert_eq!(decode_one(&first).0.sequence, 0);
        assert_eq!(decode_one(&second).0.sequence, 1);
    }

    #[test]
    fn test_unsupported_command() {
        assert!(matches!(
            mav_cmd(CommandId::Other(400)),
            Err(LinkError::UnsupportedCommand(400))
        ));
    }

    #[test]
    fn test_statustext_truncated() {
        let long = "x".repeat(80);
        let MavMessage::STATUSTEXT(st) = statustext(MavSeverity::MAV_SEVERITY_INFO, &long) else {
            panic!("Expected STATUSTEXT");
        };
        assert!(st.text.iter().all(|&b| b == b'x'));
    }
}

//! MAVLink byte stream → [`VehicleEvent`]
//!
//! Chunks from the transport are buffered until a whole v1 or v2 frame is
//! present, then parsed with the ardupilotmega dialect. Garbage before a
//! start byte is skipped, a frame that fails to parse costs one byte and
//! the scan resumes.

use core_types::{AckResult, CommandId, Frame, ImuSample, Severity, StatusLine, VehicleEvent};
use mavlink::ardupilotmega::{MavCmd, MavMessage, MavModeFlag, MavType};
use mavlink::MavHeader;

pub const MAV_STX_V1: u8 = 0xFE;
pub const MAV_STX_V2: u8 = 0xFD;

/// SCALED_IMU reports milli-g
const MG_TO_MS2: f64 = 9.80665 / 1000.0;

/// v2 incompat flag: frame carries a 13 byte signature
const MAVLINK_IFLAG_SIGNED: u8 = 0x01;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames: u64,
    pub parse_errors: u64,
    pub skipped_bytes: u64,
}

pub struct MavlinkDecoder {
    buffer: Vec<u8>,
    stats: DecoderStats,
}

impl MavlinkDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(1024),
            stats: DecoderStats::default(),
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Append raw bytes without parsing
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Translate every complete frame in `frame` (plus buffered leftovers)
    pub fn ingest(&mut self, frame: &Frame, events: &mut Vec<VehicleEvent>) {
        self.feed(&frame.bytes);
        while let Some((_header, message)) = self.next_message() {
            if let Some(event) = translate(&message, frame.timestamp_us) {
                events.push(event);
            }
        }
    }

    /// Next complete message, or None when more bytes are needed
    pub fn next_message(&mut self) -> Option<(MavHeader, MavMessage)> {
        loop {
            let Some(start) = self
                .buffer
                .iter()
                .position(|&b| b == MAV_STX_V1 || b == MAV_STX_V2)
            else {
                self.stats.skipped_bytes += self.buffer.len() as u64;
                self.buffer.clear();
                return None;
            };
            if start > 0 {
                self.stats.skipped_bytes += start as u64;
                self.buffer.drain(..start);
            }

            let (Some(&magic), Some(&payload_len)) = (self.buffer.first(), self.buffer.get(1))
            else {
                return None;
            };
            let payload_len = usize::from(payload_len);
            let total_len = if magic == MAV_STX_V1 {
                8 + payload_len
            } else {
                let Some(&incompat_flags) = self.buffer.get(2) else {
                    return None;
                };
                let signature = if incompat_flags & MAVLINK_IFLAG_SIGNED != 0 {
                    13
                } else {
                    0
                };
                12 + payload_len + signature
            };

            let Some(mut reader) = self.buffer.get(..total_len) else {
                return None;
            };

            let parsed = if magic == MAV_STX_V1 {
                mavlink::read_v1_msg::<MavMessage, _>(&mut reader)
            } else {
                mavlink::read_v2_msg::<MavMessage, _>(&mut reader)
            };

            match parsed {
                Ok(message) => {
                    self.buffer.drain(..total_len);
                    self.stats.frames += 1;
                    return Some(message);
                }
                Err(_) => {
                    // CRC failure, unknown message id or a false start byte
                    self.buffer.drain(..1);
                    self.stats.parse_errors += 1;
                }
            }
        }
    }
}

impl Default for MavlinkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Map one MAVLink message to the engine's vocabulary
///
/// Everything the calibration engine has no use for maps to None.
pub fn translate(message: &MavMessage, timestamp_us: u64) -> Option<VehicleEvent> {
    match message {
        MavMessage::HEARTBEAT(hb) => {
            // Other ground stations on the link are not the vehicle
            if hb.mavtype == MavType::MAV_TYPE_GCS {
                return None;
            }
            Some(VehicleEvent::Heartbeat {
                armed: hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED),
            })
        }
        MavMessage::STATUSTEXT(st) => Some(VehicleEvent::StatusText(StatusLine::new(
            Severity::from_u8(st.severity as u8),
            decode_text(st.text.iter().map(|&c| c as u8)),
        ))),
        MavMessage::COMMAND_ACK(ack) => Some(VehicleEvent::CommandAck {
            command: CommandId::from_wire_id(ack.command as u32),
            result: AckResult::from_u8(ack.result as u8),
        }),
        MavMessage::COMMAND_LONG(cmd) if cmd.command == MavCmd::MAV_CMD_ACCELCAL_VEHICLE_POS => {
            Some(VehicleEvent::PositionRequest {
                code: cmd.param1 as u32,
            })
        }
        MavMessage::SCALED_IMU(imu) => Some(VehicleEvent::RawImu(ImuSample {
            accel: [
                f64::from(imu.xacc) * MG_TO_MS2,
                f64::from(imu.yacc) * MG_TO_MS2,
                f64::from(imu.zacc) * MG_TO_MS2,
            ],
            gyro: [
                f64::from(imu.xgyro) / 1000.0,
                f64::from(imu.ygyro) / 1000.0,
                f64::from(imu.zgyro) / 1000.0,
            ],
            temperature_c: None,
            time_us: u64::from(imu.time_boot_ms) * 1000,
        })),
        MavMessage::HIGHRES_IMU(imu) => Some(VehicleEvent::RawImu(ImuSample {
            accel: [
                f64::from(imu.xacc),
                f64::from(imu.yacc),
                f64::from(imu.zacc),
            ],
            gyro: [
                f64::from(imu.xgyro),
                f64::from(imu.ygyro),
                f64::from(imu.zgyro),
            ],
            temperature_c: Some(f64::from(imu.temperature)),
            time_us: if imu.time_usec > 0 {
                imu.time_usec
            } else {
                timestamp_us
            },
        })),
        _ => None,
    }
}

/// NUL-terminated, possibly non-UTF-8 STATUSTEXT payload
fn decode_text(bytes: impl Iterator<Item = u8>) -> String {
    let raw: Vec<u8> = bytes.take_while(|&b| b != 0).collect();
    String::from_utf8_lossy(&raw).trim().to_string()
}

use crate::decoder::MavlinkDecoder;
use crate::encoder::MavlinkEncoder;
use actor_protocol::CalibrationError;
use actor_runtime::{
    actor_debug, actor_info, actor_warn, race_with_cancellation, Actor, CancelFlag, LinkMessage,
    OrchestratorMessage,
};
use core_types::{Frame, Transport, VehicleEvent};
use futures::SinkExt;
use futures_channel::mpsc;
use std::sync::Arc;

/// LinkActor writes engine commands to the vehicle
///
/// Responsibilities:
/// - Encode each `OutboundCommand` as a MAVLink COMMAND_LONG
/// - Write it through the shared transport
/// - Close the transport on request
///
/// Inbound traffic is handled by [`pump_inbound`], which shares the same
/// transport.
pub struct LinkActor<T: Transport> {
    transport: Arc<T>,
    encoder: MavlinkEncoder,
    sent: u64,
}

impl<T: Transport> LinkActor<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_encoder(transport, MavlinkEncoder::ground_station())
    }

    pub fn with_encoder(transport: Arc<T>, encoder: MavlinkEncoder) -> Self {
        Self {
            transport,
            encoder,
            sent: 0,
        }
    }
}

impl<T: Transport + 'static> Actor for LinkActor<T> {
    type Message = LinkMessage;

    fn name(&self) -> &'static str {
        "LinkActor"
    }

    async fn handle(&mut self, msg: LinkMessage) -> Result<(), CalibrationError> {
        match msg {
            LinkMessage::Send { command } => {
                let bytes = self.encoder.encode_command(&command)?;
                self.transport.write(&bytes).await?;
                self.sent += 1;
                actor_debug!("LinkActor: sent {:?} ({} bytes)", command, bytes.len());
                Ok(())
            }
            LinkMessage::Close => {
                actor_info!("LinkActor: closing transport after {} commands", self.sent);
                self.transport.close().await?;
                Ok(())
            }
        }
    }
}

/// Read the transport until it fails or `cancel` is set, forwarding every
/// decoded vehicle event to the orchestrator
///
/// Posts `Connected` before the first read and `Disconnected` when the
/// transport fails. A deliberate cancel ends quietly. Returns the number of
/// events forwarded.
pub async fn pump_inbound<T: Transport>(
    transport: Arc<T>,
    mut tx: mpsc::Sender<OrchestratorMessage>,
    cancel: CancelFlag,
) -> u64 {
    let mut decoder = MavlinkDecoder::new();
    let mut events = Vec::new();
    let mut forwarded = 0u64;

    if tx
        .send(OrchestratorMessage::Vehicle(VehicleEvent::Connected))
        .await
        .is_err()
    {
        return forwarded;
    }

    loop {
        let chunk = match race_with_cancellation(transport.read_chunk(), cancel.clone()).await {
            None => {
                actor_debug!("Inbound pump cancelled");
                break;
            }
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                actor_warn!("Transport read failed: {}", e);
                let _ = tx
                    .send(OrchestratorMessage::Vehicle(VehicleEvent::Disconnected))
                    .await;
                break;
            }
        };

        let (bytes, timestamp_us) = chunk;
        decoder.ingest(&Frame::new_rx(bytes, timestamp_us), &mut events);
        for event in events.drain(..) {
            if tx.send(OrchestratorMessage::Vehicle(event)).await.is_err() {
                actor_debug!("Orchestrator gone, inbound pump stopping");
                return forwarded;
            }
            forwarded += 1;
        }
    }

    let stats = decoder.stats();
    actor_info!(
        "Inbound pump stopped: {} frames, {} parse errors, {} bytes skipped",
        stats.frames,
        stats.parse_errors,
        stats.skipped_bytes
    );
    forwarded
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use core_types::{OutboundCommand, TransportError};
    use futures::stream::StreamExt;
    use mavlink::ardupilotmega::{MavCmd, MavMessage};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Transport that replays canned chunks and records writes
    #[derive(Default)]
    struct ScriptedTransport {
        inbound: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
        written: Mutex<Vec<Vec<u8>>>,
        closed: Mutex<bool>,
    }

    impl Transport for ScriptedTransport {
        async fn read_chunk(&self) -> Result<(Vec<u8>, u64), TransportError> {
            let next = self.inbound.lock().pop_front();
            match next {
                Some(chunk) => chunk.map(|bytes| (bytes, 0)),
                None => {
                    // Nothing scripted: behave like an idle link
                    std::future::pending::<()>().await;
                    Err(TransportError::NotConnected)
                }
            }
        }

        async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
            if *self.closed.lock() {
                return Err(TransportError::NotConnected);
            }
            self.written.lock().push(data.to_vec());
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            *self.closed.lock() = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_send_encodes_command_long() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut actor = LinkActor::new(transport.clone());

        actor
            .handle(LinkMessage::Send {
                command: OutboundCommand::AccelPosition { position: 2 },
            })
            .await
            .unwrap();

        let written = transport.written.lock().clone();
        assert_eq!(written.len(), 1);
        let mut decoder = MavlinkDecoder::new();
        decoder.feed(&written[0]);
        let (_, message) = decoder.next_message().unwrap();
        let MavMessage::COMMAND_LONG(cmd) = message else {
            panic!("Expected COMMAND_LONG");
        };
        assert_eq!(cmd.command, MavCmd::MAV_CMD_ACCELCAL_VEHICLE_POS);
        assert_eq!(cmd.param1, 2.0);
    }

    #[tokio::test]
    async fn test_write_after_close_is_an_error() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut actor = LinkActor::new(transport.clone());

        actor.handle(LinkMessage::Close).await.unwrap();
        let err = actor
            .handle(LinkMessage::Send {
                command: OutboundCommand::Reboot,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CalibrationError::Transport(_)));
    }

    #[tokio::test]
    async fn test_pump_forwards_events_then_reports_disconnect() {
        let mut encoder = MavlinkEncoder::vehicle();
        let status = encoder
            .encode(&crate::encoder::statustext(
                mavlink::ardupilotmega::MavSeverity::MAV_SEVERITY_INFO,
                "Calibrating gyros",
            ))
            .unwrap();

        let transport = Arc::new(ScriptedTransport::default());
        transport.inbound.lock().push_back(Ok(status));
        transport
            .inbound
            .lock()
            .push_back(Err(TransportError::Io("cable pulled".into())));

        let (tx, mut rx) = mpsc::channel(16);
        let forwarded = pump_inbound(transport, tx, CancelFlag::new()).await;
        assert_eq!(forwarded, 1);

        let mut received = Vec::new();
        while let Some(OrchestratorMessage::Vehicle(event)) = rx.next().await {
            received.push(event);
        }
        assert_eq!(received.len(), 3);
        assert_eq!(received[0], VehicleEvent::Connected);
        assert!(matches!(received[1], VehicleEvent::StatusText(_)));
        assert_eq!(received[2], VehicleEvent::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_cancel_is_quiet() {
        let transport = Arc::new(ScriptedTransport::default());
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancelFlag::new();

        let pump = tokio::spawn(pump_inbound(transport, tx, cancel.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        cancel.cancel();
        assert_eq!(pump.await.unwrap(), 0);

        let mut received = Vec::new();
        while let Some(OrchestratorMessage::Vehicle(event)) = rx.next().await {
            received.push(event);
        }
        assert_eq!(received, vec![VehicleEvent::Connected]);
    }
}

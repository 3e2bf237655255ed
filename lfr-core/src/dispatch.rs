//! Command dispatcher.
//!
//! The dispatcher is an exhaustive match on [`Command`]: every id the parser
//! accepts has exactly one handler, checked at compile time. Frames reach it
//! only after the parser has validated id, length and checksum.

use crate::device::Device;
use crate::error::CoreError;
use crate::settings::RadioSettings;
use crate::transmitter::Transmitter;
use bytes::Bytes;
use lfr_protocol::{Command, CommandFrame, Reply};

/// Length of the TX_PSR test transmission.
pub const PSR_LEN: usize = 64;

/// Outcome of dispatching one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Send this reply, stamped with the device status.
    Reply(Reply),
    /// Send nothing (RESET).
    NoReply,
}

/// Runs handlers for validated command frames.
pub struct Dispatcher {
    psr: [u8; PSR_LEN],
}

impl Dispatcher {
    pub fn new() -> Self {
        Self { psr: pn9() }
    }

    /// Executes `frame` against `device`, queueing any transmission on `tx`.
    ///
    /// The device status register is updated before returning, so the
    /// caller encodes the reply with `device.status()` as it stands.
    pub fn dispatch<T: Transmitter + ?Sized>(
        &self,
        device: &mut Device,
        tx: &mut T,
        frame: &CommandFrame,
    ) -> Response {
        let command = frame.command;
        tracing::debug!("Dispatch {} ({} bytes)", command, frame.payload.len());

        let result = match command {
            Command::Reset => {
                let dropped = tx.abort();
                device.reboot();
                tracing::info!("RESET: {} queued frames dropped", dropped);
                return Response::NoReply;
            }
            Command::Nop => Ok(Bytes::new()),
            Command::ReadTxPwr => Ok(be_bytes(&device.settings().tx_power.to_be_bytes())),
            Command::SetTxPwr => {
                array::<2>(&frame.payload).map(|b| {
                    device.set_tx_power(u16::from_be_bytes(b));
                    Bytes::new()
                })
            }
            Command::TxData => self.transmit(tx, &frame.payload),
            Command::TxAbort => {
                let dropped = tx.abort();
                tracing::info!("TX_ABORT: {} queued frames dropped", dropped);
                Ok(Bytes::new())
            }
            Command::TxPsr => self.transmit(tx, &self.psr),
            Command::GetCfg => Ok(be_bytes(&device.settings().to_blob())),
            Command::SetCfg => RadioSettings::from_blob(&frame.payload).map(|settings| {
                device.apply_settings(settings);
                Bytes::new()
            }),
            Command::SaveCfg => device.save().map(|()| Bytes::new()),
            Command::CfgDefault => {
                device.load_defaults();
                Ok(Bytes::new())
            }
            Command::SetFreq => array::<4>(&frame.payload).map(|b| {
                device.set_frequency(u32::from_be_bytes(b));
                Bytes::new()
            }),
            Command::GetQueueDepth => Ok(be_bytes(&tx.queue_depth().to_be_bytes())),
        };

        let reply = match result {
            Ok(payload) => Reply::with_payload(command.id(), payload),
            Err(e) => {
                tracing::warn!("{} failed: {}", command, e);
                Reply::Error(e.error_code())
            }
        };

        device.finish_command(!reply.is_error(), tx.queue_depth());
        Response::Reply(reply)
    }

    /// The pseudo-random sequence sent by TX_PSR.
    pub fn psr(&self) -> &[u8] {
        &self.psr
    }

    fn transmit<T: Transmitter + ?Sized>(
        &self,
        tx: &mut T,
        payload: &[u8],
    ) -> Result<Bytes, CoreError> {
        tx.send(payload)?;
        tracing::debug!("Queued {} bytes for transmit", payload.len());
        Ok(Bytes::new())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn be_bytes(bytes: &[u8]) -> Bytes {
    Bytes::copy_from_slice(bytes)
}

fn array<const N: usize>(payload: &[u8]) -> Result<[u8; N], CoreError> {
    payload
        .try_into()
        .map_err(|_| CoreError::PayloadLength { len: payload.len() })
}

/// PN9 sequence (x^9 + x^5 + 1, all-ones seed), least significant bit first.
fn pn9() -> [u8; PSR_LEN] {
    let mut lfsr: u16 = 0x1FF;
    let mut out = [0u8; PSR_LEN];
    for byte in out.iter_mut() {
        for bit in 0..8 {
            *byte |= ((lfsr & 1) as u8) << bit;
            let feedback = (lfsr ^ (lfsr >> 5)) & 1;
            lfsr = (lfsr >> 1) | (feedback << 8);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::SystemStatus;
    use crate::store::NullStore;
    use crate::transmitter::{LoopbackTransmitter, TransmitError};
    use lfr_protocol::ErrorCode;

    fn run(
        device: &mut Device,
        tx: &mut LoopbackTransmitter,
        command: Command,
        payload: &[u8],
    ) -> Response {
        let frame = CommandFrame::new(command, payload.to_vec());
        Dispatcher::new().dispatch(device, tx, &frame)
    }

    fn payload_of(response: Response) -> Bytes {
        match response {
            Response::Reply(Reply::Success { payload, .. }) => payload,
            other => panic!("expected success reply, got {:?}", other),
        }
    }

    fn code_of(response: Response) -> ErrorCode {
        match response {
            Response::Reply(Reply::Error(code)) => code,
            other => panic!("expected error reply, got {:?}", other),
        }
    }

    #[test]
    fn test_nop() {
        let mut device = Device::default();
        let mut tx = LoopbackTransmitter::new();
        let response = run(&mut device, &mut tx, Command::Nop, &[]);
        assert_eq!(response, Response::Reply(Reply::ok(0x00)));
        assert!(device.status().contains(SystemStatus::LAST_CMD_OK));
    }

    #[test]
    fn test_set_then_read_txpwr() {
        let mut device = Device::default();
        let mut tx = LoopbackTransmitter::new();

        let response = run(&mut device, &mut tx, Command::SetTxPwr, &[0x01, 0x2C]);
        assert!(payload_of(response).is_empty());

        let response = run(&mut device, &mut tx, Command::ReadTxPwr, &[]);
        assert_eq!(&payload_of(response)[..], &[0x01, 0x2C]);
    }

    #[test]
    fn test_reset_sends_no_reply() {
        let mut device = Device::default();
        let mut tx = LoopbackTransmitter::new();
        tx.send(b"pending").unwrap();
        device.set_tx_power(0x0300);

        let response = run(&mut device, &mut tx, Command::Reset, &[]);
        assert_eq!(response, Response::NoReply);
        assert_eq!(device.settings().tx_power, RadioSettings::DEFAULT.tx_power);
        assert_eq!(tx.queue_depth(), 0);
        assert_eq!(device.boot_count(), 2);
    }

    #[test]
    fn test_txdata_queues_payload() {
        let mut device = Device::default();
        let mut tx = LoopbackTransmitter::new();

        let response = run(&mut device, &mut tx, Command::TxData, b"KC2QOL 1");
        assert!(payload_of(response).is_empty());
        assert_eq!(tx.queue, vec![b"KC2QOL 1".to_vec()]);
        assert!(device.status().contains(SystemStatus::TX_BUSY));
    }

    #[test]
    fn test_txdata_busy() {
        let mut device = Device::default();
        let mut tx = LoopbackTransmitter::with_capacity(1);
        run(&mut device, &mut tx, Command::TxData, b"a");

        let response = run(&mut device, &mut tx, Command::TxData, b"b");
        assert_eq!(code_of(response), ErrorCode::Busy);
        assert!(!device.status().contains(SystemStatus::LAST_CMD_OK));
        assert!(device.status().contains(SystemStatus::TX_BUSY));
    }

    #[test]
    fn test_txdata_closed() {
        let mut device = Device::default();
        let mut tx = LoopbackTransmitter {
            closed: true,
            ..Default::default()
        };
        let response = run(&mut device, &mut tx, Command::TxData, b"a");
        assert_eq!(code_of(response), TransmitError::Closed.error_code());
    }

    #[test]
    fn test_abort_clears_busy() {
        let mut device = Device::default();
        let mut tx = LoopbackTransmitter::new();
        run(&mut device, &mut tx, Command::TxData, b"a");
        run(&mut device, &mut tx, Command::TxData, b"b");

        let response = run(&mut device, &mut tx, Command::GetQueueDepth, &[]);
        assert_eq!(&payload_of(response)[..], &[0x00, 0x02]);

        run(&mut device, &mut tx, Command::TxAbort, &[]);
        assert!(!device.status().contains(SystemStatus::TX_BUSY));

        let response = run(&mut device, &mut tx, Command::GetQueueDepth, &[]);
        assert_eq!(&payload_of(response)[..], &[0x00, 0x00]);
    }

    #[test]
    fn test_tx_psr() {
        let mut device = Device::default();
        let mut tx = LoopbackTransmitter::new();
        run(&mut device, &mut tx, Command::TxPsr, &[]);

        let sent = tx.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), PSR_LEN);
        assert_eq!(&sent[0][..4], &[0xFF, 0xE1, 0x1D, 0x9A]);
    }

    #[test]
    fn test_get_and_set_cfg() {
        let mut device = Device::default();
        let mut tx = LoopbackTransmitter::new();

        let blob = payload_of(run(&mut device, &mut tx, Command::GetCfg, &[]));
        assert_eq!(&blob[..], &RadioSettings::DEFAULT.to_blob());

        let new = RadioSettings {
            frequency_hz: 437_250_000,
            tx_power: 0x0042,
        };
        run(&mut device, &mut tx, Command::SetCfg, &new.to_blob());
        assert_eq!(*device.settings(), new);
        assert!(device.status().contains(SystemStatus::CONFIG_DIRTY));

        let response = run(&mut device, &mut tx, Command::SetCfg, &[0x09]);
        assert_eq!(code_of(response), ErrorCode::InvalidParam);

        let response = run(&mut device, &mut tx, Command::SetCfg, &[0x01, 0x00]);
        assert_eq!(code_of(response), ErrorCode::InvalidLength);
    }

    #[test]
    fn test_save_and_default_cfg() {
        let mut device = Device::default();
        let mut tx = LoopbackTransmitter::new();

        run(&mut device, &mut tx, Command::SetFreq, &[0x1A, 0x0F, 0x20, 0x90]);
        assert_eq!(device.settings().frequency_hz, 0x1A0F_2090);

        let response = run(&mut device, &mut tx, Command::SaveCfg, &[]);
        assert_eq!(response, Response::Reply(Reply::ok(Command::SaveCfg.id())));
        assert!(!device.status().contains(SystemStatus::CONFIG_DIRTY));

        run(&mut device, &mut tx, Command::CfgDefault, &[]);
        assert_eq!(*device.settings(), RadioSettings::DEFAULT);
        assert!(device.status().contains(SystemStatus::CONFIG_DIRTY));

        device.reboot();
        assert_eq!(device.settings().frequency_hz, 0x1A0F_2090);
    }

    #[test]
    fn test_save_without_store() {
        let mut device = Device::new(Box::new(NullStore));
        let mut tx = LoopbackTransmitter::new();
        let response = run(&mut device, &mut tx, Command::SaveCfg, &[]);
        assert_eq!(code_of(response), ErrorCode::NotImplemented);
    }

    #[test]
    fn test_hand_built_frame_with_bad_length() {
        let mut device = Device::default();
        let mut tx = LoopbackTransmitter::new();
        let response = run(&mut device, &mut tx, Command::SetFreq, &[0x01]);
        assert_eq!(code_of(response), ErrorCode::InvalidLength);
    }

    #[test]
    fn test_every_command_is_handled() {
        for command in Command::ALL {
            let mut device = Device::default();
            let mut tx = LoopbackTransmitter::new();
            let payload: Vec<u8> = match command {
                Command::SetTxPwr => vec![0, 1],
                Command::SetFreq => vec![0, 0, 0, 1],
                Command::SetCfg => RadioSettings::DEFAULT.to_blob().to_vec(),
                Command::TxData => vec![0xAA],
                _ => Vec::new(),
            };
            let response = run(&mut device, &mut tx, command, &payload);
            match command {
                Command::Reset => assert_eq!(response, Response::NoReply),
                _ => {
                    let succeeded = matches!(
                        response,
                        Response::Reply(Reply::Success { command: id, .. }) if id == command.id()
                    );
                    assert!(succeeded, "{} did not succeed", command);
                }
            }
        }
    }
}

//! Sans-IO glue between the byte streams and the dispatcher.
//!
//! [`CommandLink`] turns uplink bytes into replies; [`RxPath`] turns KISS
//! bytes from the modem into RXDATA replies. Both run to completion per
//! byte and write replies into a caller-provided [`ByteSink`].

use crate::device::Device;
use crate::dispatch::{Dispatcher, Response};
use crate::status::SystemStatus;
use crate::transmitter::Transmitter;
use lfr_protocol::command::RXDATA;
use lfr_protocol::{
    encode_error, encode_reply, ByteSink, Command, CommandParser, EncodeError, KissDecoder,
    KissError, ParseError,
};

/// What one uplink byte caused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The byte was absorbed; no frame completed.
    Pending,
    /// A frame was dispatched and its reply written.
    Replied { command: Command, ok: bool },
    /// A frame was dispatched and deliberately left unanswered.
    Silent { command: Command },
    /// The frame was rejected and an error reply written.
    Rejected(ParseError),
}

/// One uplink stream: parser, dispatcher and reply encoder.
///
/// Create a fresh link per connection so no partial frame crosses over.
pub struct CommandLink {
    parser: CommandParser,
    dispatcher: Dispatcher,
}

impl CommandLink {
    pub fn new() -> Self {
        Self {
            parser: CommandParser::new(),
            dispatcher: Dispatcher::new(),
        }
    }

    /// Consumes one uplink byte, writing any reply into `sink`.
    pub fn process<T, S>(
        &mut self,
        byte: u8,
        device: &mut Device,
        tx: &mut T,
        sink: &mut S,
    ) -> Result<LinkEvent, EncodeError<S::Error>>
    where
        T: Transmitter + ?Sized,
        S: ByteSink,
    {
        let frame = match self.parser.push(byte) {
            Ok(None) => return Ok(LinkEvent::Pending),
            Ok(Some(frame)) => frame,
            Err(err) => {
                tracing::warn!("Rejected frame: {}", err);
                device.finish_command(false, tx.queue_depth());
                let status = device.take_status(tx.queue_depth());
                encode_error(sink, status, err.error_code())?;
                return Ok(LinkEvent::Rejected(err));
            }
        };

        let command = frame.command;
        match self.dispatcher.dispatch(device, tx, &frame) {
            Response::NoReply => Ok(LinkEvent::Silent { command }),
            Response::Reply(reply) => {
                let status = device.take_status(tx.queue_depth());
                reply.encode_into(sink, status)?;
                Ok(LinkEvent::Replied {
                    command,
                    ok: !reply.is_error(),
                })
            }
        }
    }

    /// Feeds a buffer and returns every non-pending event, in order.
    pub fn process_slice<T, S>(
        &mut self,
        data: &[u8],
        device: &mut Device,
        tx: &mut T,
        sink: &mut S,
    ) -> Result<Vec<LinkEvent>, EncodeError<S::Error>>
    where
        T: Transmitter + ?Sized,
        S: ByteSink,
    {
        let mut events = Vec::new();
        for &byte in data {
            match self.process(byte, device, tx, sink)? {
                LinkEvent::Pending => {}
                event => events.push(event),
            }
        }
        Ok(events)
    }

    /// Drops any partial frame. Used by the transport's idle timeout.
    pub fn reset(&mut self) {
        self.parser.reset();
    }

    /// Returns true when no frame is in progress.
    pub fn is_idle(&self) -> bool {
        self.parser.is_idle()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl Default for CommandLink {
    fn default() -> Self {
        Self::new()
    }
}

/// What one modem byte caused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxEvent {
    Pending,
    /// A packet of this many bytes was forwarded as RXDATA.
    Delivered(usize),
    /// The current KISS frame was dropped.
    Dropped(KissError),
}

/// Receive path: KISS frames from the modem become RXDATA replies.
pub struct RxPath {
    decoder: KissDecoder,
}

impl RxPath {
    pub fn new() -> Self {
        Self {
            decoder: KissDecoder::new(),
        }
    }

    /// Consumes one modem byte, writing any RXDATA reply into `sink`.
    ///
    /// Dropped frames are never reported to the peer directly; they raise
    /// `RX_OVERRUN` in the next reply's status byte instead.
    pub fn process<T, S>(
        &mut self,
        byte: u8,
        device: &mut Device,
        tx: &T,
        sink: &mut S,
    ) -> Result<RxEvent, EncodeError<S::Error>>
    where
        T: Transmitter + ?Sized,
        S: ByteSink,
    {
        match self.decoder.push(byte) {
            Ok(None) => Ok(RxEvent::Pending),
            Ok(Some(packet)) => {
                tracing::debug!("RX {} bytes", packet.len());
                let status = device.take_status(tx.queue_depth());
                encode_reply(sink, status, RXDATA, &packet)?;
                Ok(RxEvent::Delivered(packet.len()))
            }
            Err(err) => {
                tracing::warn!("Dropped KISS frame: {}", err);
                device.status_mut().set(SystemStatus::RX_OVERRUN);
                Ok(RxEvent::Dropped(err))
            }
        }
    }

    /// Feeds a buffer and returns every non-pending event, in order.
    pub fn process_slice<T, S>(
        &mut self,
        data: &[u8],
        device: &mut Device,
        tx: &T,
        sink: &mut S,
    ) -> Result<Vec<RxEvent>, EncodeError<S::Error>>
    where
        T: Transmitter + ?Sized,
        S: ByteSink,
    {
        let mut events = Vec::new();
        for &byte in data {
            match self.process(byte, device, tx, sink)? {
                RxEvent::Pending => {}
                event => events.push(event),
            }
        }
        Ok(events)
    }
}

impl Default for RxPath {
    fn default() -> Self {
        Self::new()
    }
}

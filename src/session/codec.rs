use std::io::{Error, ErrorKind};

use bytes::{BufMut, BytesMut};
use log::warn;
use tokio::net::UnixStream;
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::message::Envelope;

pub type MessageProtocol = Framed<UnixStream, MessageCodec>;

/// Newline-delimited JSON framing for the neighbor channels
#[derive(Debug, Default)]
pub struct MessageCodec;

impl MessageCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for MessageCodec {
    type Item = Envelope;
    type Error = Error;

    // One line per message. Bad frames are logged and skipped so a single
    // malformed message cannot poison the channel.
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Error> {
        while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            let frame = buf.split_to(pos + 1);
            let line = &frame[..pos];
            if line.is_empty() {
                continue;
            }
            match Envelope::from_slice(line) {
                Ok(envelope) => return Ok(Some(envelope)),
                Err(err) => warn!("Dropping frame: {}", err),
            }
        }
        Ok(None)
    }
}

impl Encoder<Envelope> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, envelope: Envelope, buf: &mut BytesMut) -> Result<(), Error> {
        let data = serde_json::to_vec(&envelope)
            .map_err(|err| Error::new(ErrorKind::InvalidData, err))?;
        buf.reserve(data.len() + 1);
        buf.put_slice(&data);
        buf.put_u8(b'\n');
        Ok(())
    }
}

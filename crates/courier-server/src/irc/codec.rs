use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use super::message::{Message, ParseError};

/// Longest line accepted from the server, terminator included.
const MAX_LINE_LENGTH: usize = 8191;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("line exceeds {MAX_LINE_LENGTH} bytes")]
    LineTooLong,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Frames a TCP stream into [`Message`]s. Lines end in `\n`, optionally
/// preceded by `\r`. Blank and malformed lines are skipped rather than
/// ending the stream, and invalid UTF-8 is replaced.
#[derive(Debug)]
pub struct IrcCodec;

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(pos) = src.iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_LINE_LENGTH {
                    return Err(CodecError::LineTooLong);
                }
                return Ok(None);
            };

            let line = src.split_to(pos + 1);
            let text = String::from_utf8_lossy(&line);
            match Message::parse(&text) {
                Ok(msg) => return Ok(Some(msg)),
                Err(ParseError::Empty) => continue,
                Err(e) => debug!("Skipping malformed line {:?}: {}", text, e),
            }
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let wire = item.to_wire();
        dst.reserve(wire.len() + 2);
        dst.put_slice(wire.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

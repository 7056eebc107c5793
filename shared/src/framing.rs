//! Length-prefixed framing over a byte stream
//!
//! Every message travels as a 4-byte big-endian length followed by that many
//! payload bytes. [`FrameDecoder`] reassembles messages from arbitrarily
//! fragmented reads; [`OutboundBuffer`] holds an encoded response until the
//! socket has accepted all of it.

use crate::LENGTH_PREFIX_SIZE;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("declared message length {declared} exceeds the limit of {limit} bytes")]
    TooLarge { declared: usize, limit: usize },

    #[error("message payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Where the decoder is inside the current message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Fewer than four prefix bytes have arrived
    AwaitingLength,
    /// Prefix consumed, waiting for `length` payload bytes
    AwaitingBody { length: usize },
}

/// Incremental decoder for one connection's inbound stream
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    state: FrameState,
    max_message_size: usize,
}

impl FrameDecoder {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            state: FrameState::AwaitingLength,
            max_message_size,
        }
    }

    /// Appends freshly read bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Bytes received but not yet handed out as part of a message
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pops the next complete payload, if one has fully arrived.
    ///
    /// The length prefix is consumed exactly once per message; a partial body
    /// leaves the decoder in [`FrameState::AwaitingBody`] until the rest shows up.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        loop {
            match self.state {
                FrameState::AwaitingLength => {
                    if self.buffer.len() < LENGTH_PREFIX_SIZE {
                        return Ok(None);
                    }
                    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
                    prefix.copy_from_slice(&self.buffer[..LENGTH_PREFIX_SIZE]);
                    let length = u32::from_be_bytes(prefix) as usize;
                    if length > self.max_message_size {
                        return Err(FrameError::TooLarge {
                            declared: length,
                            limit: self.max_message_size,
                        });
                    }
                    self.buffer.drain(..LENGTH_PREFIX_SIZE);
                    self.state = FrameState::AwaitingBody { length };
                }
                FrameState::AwaitingBody { length } => {
                    if self.buffer.len() < length {
                        return Ok(None);
                    }
                    let payload: Vec<u8> = self.buffer.drain(..length).collect();
                    self.state = FrameState::AwaitingLength;
                    return Ok(Some(payload));
                }
            }
        }
    }

    /// Like [`next_frame`](Self::next_frame) but decodes the payload as UTF-8 text
    pub fn next_message(&mut self) -> Result<Option<String>, FrameError> {
        match self.next_frame()? {
            Some(payload) => String::from_utf8(payload)
                .map(Some)
                .map_err(|_| FrameError::InvalidUtf8),
            None => Ok(None),
        }
    }
}

/// Prefixes `payload` with its big-endian length
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let length = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        declared: payload.len(),
        limit: u32::MAX as usize,
    })?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Encoded response bytes still waiting to be written to the socket
#[derive(Debug, Default)]
pub struct OutboundBuffer {
    bytes: Vec<u8>,
}

impl OutboundBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames `payload` and appends it behind anything still pending
    pub fn queue(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let frame = encode_frame(payload)?;
        self.bytes.extend_from_slice(&frame);
        Ok(())
    }

    pub fn pending(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Drops the first `written` bytes after a (possibly partial) write,
    /// compacting whatever is left to the front of the buffer.
    pub fn advance(&mut self, written: usize) {
        if written >= self.bytes.len() {
            self.bytes.clear();
        } else {
            self.bytes.drain(..written);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn split_randomly(bytes: &[u8], rng: &mut impl Rng) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let size = rng.gen_range(1..=(bytes.len() - offset).min(7));
            chunks.push(bytes[offset..offset + size].to_vec());
            offset += size;
        }
        chunks
    }

    #[test]
    fn test_encode_prefixes_big_endian_length() {
        let frame = encode_frame(b"login,bob,Secret123").unwrap();
        assert_eq!(&frame[..4], &[0, 0, 0, 19]);
        assert_eq!(&frame[4..], b"login,bob,Secret123");
    }

    #[test]
    fn test_single_complete_message() {
        let mut decoder = FrameDecoder::new(1024);
        decoder.extend(&encode_frame(b"searchAllHotels,Rome").unwrap());

        let message = decoder.next_message().unwrap();
        assert_eq!(message.as_deref(), Some("searchAllHotels,Rome"));
        assert_eq!(decoder.state(), FrameState::AwaitingLength);
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.next_message().unwrap(), None);
    }

    #[test]
    fn test_states_across_partial_reads() {
        let frame = encode_frame(b"logout,bob").unwrap();
        let mut decoder = FrameDecoder::new(1024);

        decoder.extend(&frame[..2]);
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert_eq!(decoder.state(), FrameState::AwaitingLength);

        decoder.extend(&frame[2..6]);
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert_eq!(decoder.state(), FrameState::AwaitingBody { length: 10 });

        decoder.extend(&frame[6..]);
        assert_eq!(decoder.next_frame().unwrap(), Some(b"logout,bob".to_vec()));
        assert_eq!(decoder.state(), FrameState::AwaitingLength);
    }

    #[test]
    fn test_empty_payload() {
        let mut decoder = FrameDecoder::new(16);
        decoder.extend(&encode_frame(b"").unwrap());
        assert_eq!(decoder.next_frame().unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_random_chunking_yields_each_payload_once() {
        let mut rng = rand::thread_rng();

        for length in 0..200usize {
            let payload: Vec<u8> = (0..length).map(|_| rng.gen()).collect();
            let frame = encode_frame(&payload).unwrap();

            let mut decoder = FrameDecoder::new(1024);
            let mut decoded = Vec::new();
            for chunk in split_randomly(&frame, &mut rng) {
                decoder.extend(&chunk);
                while let Some(message) = decoder.next_frame().unwrap() {
                    decoded.push(message);
                }
            }

            assert_eq!(decoded, vec![payload]);
            assert_eq!(decoder.buffered(), 0);
        }
    }

    #[test]
    fn test_pipelined_messages_come_out_in_order() {
        let mut stream = Vec::new();
        for text in ["register,a,Valid123", "login,a,Valid123", "showMyBadge,a"] {
            stream.extend(encode_frame(text.as_bytes()).unwrap());
        }

        let mut decoder = FrameDecoder::new(1024);
        decoder.extend(&stream);

        assert_eq!(
            decoder.next_message().unwrap().as_deref(),
            Some("register,a,Valid123")
        );
        assert_eq!(
            decoder.next_message().unwrap().as_deref(),
            Some("login,a,Valid123")
        );
        assert_eq!(decoder.next_message().unwrap().as_deref(), Some("showMyBadge,a"));
        assert_eq!(decoder.next_message().unwrap(), None);
    }

    #[test]
    fn test_oversized_declared_length_is_rejected() {
        let mut decoder = FrameDecoder::new(8);
        decoder.extend(&9u32.to_be_bytes());

        assert_eq!(
            decoder.next_frame(),
            Err(FrameError::TooLarge {
                declared: 9,
                limit: 8
            })
        );
    }

    #[test]
    fn test_invalid_utf8_payload() {
        let mut decoder = FrameDecoder::new(8);
        decoder.extend(&encode_frame(&[0xff, 0xfe]).unwrap());
        assert_eq!(decoder.next_message(), Err(FrameError::InvalidUtf8));
    }

    #[test]
    fn test_outbound_partial_flush_compacts() {
        let mut outbound = OutboundBuffer::new();
        outbound.queue(b"{\"Status-code\":200}").unwrap();
        let total = outbound.pending().len();
        assert_eq!(total, 4 + 19);

        outbound.advance(5);
        assert_eq!(outbound.pending().len(), total - 5);
        assert_eq!(outbound.pending()[0], b'"');
        assert_eq!(outbound.pending()[1], b'S');

        outbound.advance(total - 5);
        assert!(outbound.is_empty());
    }
}

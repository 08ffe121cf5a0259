use bytes::{BufMut, Bytes, BytesMut};

use netmux::{Framer, HeaderDecoder, Result};

/// Decode a big-endian unsigned header of `hdr.len()` bytes.
fn big_endian_len(hdr: &[u8]) -> usize {
    hdr.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize)
}

/// Prefix `body` with a big-endian length header of `hdr_size` bytes.
///
/// The body length must fit the header width; this is the encode half of
/// the wire format [`VariableFramer::big_endian`] decodes.
pub fn encode_with_len_header(body: &[u8], hdr_size: usize) -> Bytes {
    debug_assert!(hdr_size > 0 && hdr_size <= std::mem::size_of::<usize>());
    debug_assert!(hdr_size == std::mem::size_of::<usize>() || body.len() < 1 << (8 * hdr_size));
    let mut msg = BytesMut::with_capacity(hdr_size + body.len());
    for shift in (0..hdr_size).rev() {
        msg.put_u8((body.len() >> (8 * shift)) as u8);
    }
    msg.put_slice(body);
    msg.freeze()
}

/// Strip the length header off a complete frame, returning the body.
pub fn decode_len_header(frame: &Bytes, hdr_size: usize) -> Bytes {
    frame.slice(hdr_size..)
}

#[derive(Clone, Copy)]
enum ReadState {
    Header,
    Body(usize),
}

/// Variable-length framer: a fixed-size header decoded into the length of
/// the body that follows.
///
/// The read state machine alternates `Header -> Body(n) -> Header`;
/// delivered frames include the header bytes, so a message handler can
/// re-send a frame verbatim. A decoded body length of zero is legal and
/// conventionally treated as the end-of-flow sentinel by the message
/// handler.
pub struct VariableFramer {
    hdr_size: usize,
    decode_len: HeaderDecoder,
    state: ReadState,
}

impl VariableFramer {
    /// A framer with a user-supplied header decoder.
    ///
    /// `decode_len` receives exactly `hdr_size` bytes and returns the
    /// length of the body that follows.
    pub fn new<F>(hdr_size: usize, decode_len: F) -> Self
    where
        F: Fn(&[u8]) -> usize + Send + 'static,
    {
        assert!(hdr_size > 0, "header size must be non-zero");
        Self {
            hdr_size,
            decode_len: Box::new(decode_len),
            state: ReadState::Header,
        }
    }

    /// A framer for big-endian unsigned length headers of `hdr_size`
    /// bytes (2 is the conventional width).
    pub fn big_endian(hdr_size: usize) -> Self {
        Self::new(hdr_size, big_endian_len)
    }
}

impl Framer for VariableFramer {
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        if let ReadState::Header = self.state {
            if buf.len() < self.hdr_size {
                return Ok(None);
            }
            self.state = ReadState::Body((self.decode_len)(&buf[..self.hdr_size]));
        }
        let ReadState::Body(body_len) = self.state else {
            unreachable!()
        };
        if buf.len() < self.hdr_size + body_len {
            return Ok(None);
        }
        self.state = ReadState::Header;
        Ok(Some(buf.split_to(self.hdr_size + body_len).freeze()))
    }
}

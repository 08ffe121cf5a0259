use bytes::{Bytes, BytesMut};

use crate::error::Result;

/// Decodes a user-supplied header into the length of the body that follows.
pub type HeaderDecoder = Box<dyn Fn(&[u8]) -> usize + Send>;

/// Turns an accumulated byte stream into discrete messages.
///
/// A framer is driven incrementally by a TCP handler's read loop: every
/// completed socket read appends to `buf`, then `decode` is called until it
/// returns `Ok(None)`. A returned frame must be split off the front of
/// `buf` and must include its own header or delimiter bytes, so that the
/// concatenation of all delivered frames reproduces the wire stream.
///
/// Implementations may keep state between calls (e.g. a parsed-but-not-yet-
/// satisfied body length); they are owned by a single read loop and never
/// shared.
pub trait Framer: Send {
    /// Extract the next complete frame, or `Ok(None)` if more bytes are
    /// needed. Errors terminate the handler.
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>>;
}

use bytes::{Bytes, BytesMut};

use netmux::{Error, Framer, Result};

/// Default bound on the bytes accumulated while searching for a delimiter.
pub const DEFAULT_MAX_FRAME: usize = 8192;

/// Delimiter-based text framer.
///
/// Accumulated bytes are scanned for the first occurrence of a non-empty
/// delimiter (e.g. `\r\n` or `\n`); the delivered frame includes the
/// delimiter, and the tail is retained for the next scan. If the buffer
/// grows past the configured maximum without a delimiter the framer fails
/// with [`Error::FramingBufferOverflow`] and the handler terminates.
pub struct DelimiterFramer {
    delim: Vec<u8>,
    max_len: usize,
    // Bytes already scanned without a match; rescans resume past them.
    scanned: usize,
}

impl DelimiterFramer {
    /// A framer splitting on `delim`, buffering at most `max_len` bytes.
    pub fn new(delim: impl Into<Vec<u8>>, max_len: usize) -> Self {
        let delim = delim.into();
        assert!(!delim.is_empty(), "delimiter must be non-empty");
        assert!(max_len >= delim.len(), "max frame below delimiter length");
        Self {
            delim,
            max_len,
            scanned: 0,
        }
    }

    /// CR/LF line framing with the default bound.
    pub fn crlf() -> Self {
        Self::new(&b"\r\n"[..], DEFAULT_MAX_FRAME)
    }

    /// LF line framing with the default bound.
    pub fn lf() -> Self {
        Self::new(&b"\n"[..], DEFAULT_MAX_FRAME)
    }

    fn find_delim(&self, buf: &[u8]) -> Option<usize> {
        let start = self.scanned.saturating_sub(self.delim.len() - 1);
        buf[start..]
            .windows(self.delim.len())
            .position(|w| w == self.delim)
            .map(|pos| start + pos)
    }
}

impl Framer for DelimiterFramer {
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        if buf.len() < self.delim.len() {
            self.scanned = buf.len();
            return Ok(None);
        }
        match self.find_delim(buf) {
            Some(pos) => {
                self.scanned = 0;
                Ok(Some(buf.split_to(pos + self.delim.len()).freeze()))
            }
            None => {
                self.scanned = buf.len();
                if buf.len() > self.max_len {
                    return Err(Error::FramingBufferOverflow(self.max_len));
                }
                Ok(None)
            }
        }
    }
}

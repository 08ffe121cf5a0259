//! # netmux-codec - Framing Strategies for netmux
//!
//! Built-in implementations of the [`netmux::Framer`] trait, plus the
//! encode-side helpers for the variable-length wire format.
//!
//! ## Framers
//!
//! - [`VariableFramer`]: two-phase fixed-header → variable-body framing.
//!   The header width and decoder are pluggable;
//!   [`VariableFramer::big_endian`] covers the conventional big-endian
//!   unsigned header (default width 2). A zero-length body is legal and
//!   serves as the end-of-flow sentinel by convention.
//! - [`DelimiterFramer`]: splits on a non-empty byte delimiter such as
//!   `\r\n` or `\n`, delimiter included in the delivered frame, with a
//!   configurable bound on the accumulated buffer.
//!
//! Both deliver frames verbatim, header and delimiter bytes included,
//! so the concatenation of delivered frames reproduces the wire stream
//! and a handler can forward frames unchanged.
//!
//! ## Building a message
//!
//! ```rust
//! use netmux_codec::{encode_with_len_header, decode_len_header};
//!
//! let msg = encode_with_len_header(b"HappyNewYear!QQQQQQQQQQ", 2);
//! assert_eq!(msg.len(), 25);
//! assert_eq!(&msg[..2], &[0x00, 0x17]);
//! assert_eq!(decode_len_header(&msg, 2).as_ref(), b"HappyNewYear!QQQQQQQQQQ");
//! ```

#![warn(rust_2018_idioms)]
#![warn(missing_docs)]

mod delimiter;
mod variable;

pub use delimiter::{DelimiterFramer, DEFAULT_MAX_FRAME};
pub use variable::{decode_len_header, encode_with_len_header, VariableFramer};

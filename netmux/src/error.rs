use std::io;

use thiserror::Error;

/// Convenience alias used throughout the netmux crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the I/O handler runtime.
///
/// Invariant violations (`InvalidHandle`, `AlreadyStarted`, `NotStarted`)
/// are returned synchronously from the offending call. Everything else is
/// a termination reason delivered to a supervisor's error callback when a
/// handler shuts down; it is never raised out of a reactor task.
#[derive(Debug, Error)]
pub enum Error {
    /// The weak handle no longer refers to a live I/O handler.
    #[error("io handle does not refer to a live io handler")]
    InvalidHandle,

    /// `start_io` was called on a handler that has already been started
    /// (or already ran and stopped; handlers are single-use).
    #[error("io handler already started")]
    AlreadyStarted,

    /// An operation that requires a started handler, such as `send`, was
    /// called before `start_io` or after shutdown began.
    #[error("io handler not started")]
    NotStarted,

    /// The installed message handler returned `false`, requesting the
    /// connection be closed after pending writes drain.
    #[error("message handler requested termination")]
    MessageHandlerTerminated,

    /// A delimiter framer accumulated more than its configured maximum
    /// without finding the delimiter.
    #[error("framing buffer exceeded {0} bytes without a complete message")]
    FramingBufferOverflow(usize),

    /// The peer closed the connection (TCP read returned end of stream).
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The handler was stopped cooperatively, either by `stop_io` or by
    /// its supervisor's `stop`.
    #[error("io operation cancelled")]
    IoCancelled,

    /// Passthrough of an operating system network error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// True for the cooperative-shutdown reason (`stop_io` / supervisor stop).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::IoCancelled)
    }

    /// True for reasons that end a handler without any fault: cancellation,
    /// peer close, or a message handler that asked to terminate.
    pub fn is_graceful(&self) -> bool {
        matches!(
            self,
            Error::IoCancelled | Error::ConnectionClosed | Error::MessageHandlerTerminated
        )
    }
}

//! Typed error taxonomy shared by the session engine, the sample pipeline,
//! and the worker supervisor. Control flow in the supervisor branches on
//! error *kind*, so this is a `thiserror` enum rather than an opaque
//! `anyhow::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KiwiError {
    /// Server reported `too busy`: all receiver channels are in use.
    #[error("server too busy")]
    TooBusy,

    /// Server rejected the supplied password.
    #[error("bad password")]
    BadPassword,

    /// Server is shutting down (`down` control message).
    #[error("server is down")]
    ServerDown,

    /// The recorder's configured time limit (`--tlimit`) elapsed.
    #[error("recording time limit reached")]
    TimeLimit,

    /// The connection closed without a local request to do so.
    #[error("server terminated the connection")]
    ServerTerminated,

    /// Failed to establish or upgrade the WebSocket connection.
    #[error("connection failed: {0}")]
    Connect(String),

    /// A frame or control message violated the expected wire format.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying socket I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The recording sink (WAV file, GNSS log) failed to write.
    #[error("sink error: {0}")]
    Sink(String),
}

pub type Result<T> = std::result::Result<T, KiwiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err: KiwiError = io_err.into();
        assert!(matches!(err, KiwiError::Io(_)));
    }

    #[test]
    fn variants_carry_useful_display_text() {
        assert_eq!(KiwiError::TooBusy.to_string(), "server too busy");
        assert_eq!(
            KiwiError::Connect("refused".into()).to_string(),
            "connection failed: refused"
        );
    }
}

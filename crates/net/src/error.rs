//! Network error types
//!
//! The split between `Frame` and `Protocol` matters: a framing violation
//! (torn stream, bad length prefix) is fatal to its connection, while a
//! well-framed but unrecognized message is answered and survived.

use std::io;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    /// Framing violation; the connection cannot be trusted afterwards
    #[error("Frame error: {0}")]
    Frame(String),

    /// Well-framed but non-conforming message; the connection stays open
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection rejected: {0}")]
    Rejected(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Session full")]
    SessionFull,

    #[error("Not connected")]
    NotConnected,

    #[error("Failed to bind port {port}: {source}")]
    Bind { port: u16, source: io::Error },

    #[error("Session error: {0}")]
    Session(#[from] turncoat_core::Error),
}

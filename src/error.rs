//! Error types for the listener, the per-connection exchange and the client.
//!
//! Startup errors are fatal. Accept, receive and send errors only ever
//! affect a single connection.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors raised while bringing the listening endpoint up.
#[derive(Debug)]
pub enum StartError {
    /// The socket itself could not be created.
    SocketCreate(io::Error),
    /// The path is already bound or inaccessible.
    Bind { path: PathBuf, source: io::Error },
    /// The bound socket could not enter the listening state.
    Listen(io::Error),
    /// A stale endpoint was found but could not be removed.
    StaleCleanup { path: PathBuf, source: io::Error },
}

impl StartError {
    /// True for the bind class of failures (path in use or inaccessible).
    pub fn is_bind(&self) -> bool {
        matches!(self, StartError::Bind { .. } | StartError::StaleCleanup { .. })
    }
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::SocketCreate(e) => write!(f, "Failed to create socket: {e}"),
            StartError::Bind { path, source } => {
                write!(f, "Failed to bind socket to '{}': {}", path.display(), source)
            }
            StartError::Listen(e) => write!(f, "Failed to listen on socket: {e}"),
            StartError::StaleCleanup { path, source } => write!(
                f,
                "Failed to remove stale socket '{}': {}",
                path.display(),
                source
            ),
        }
    }
}

impl std::error::Error for StartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartError::SocketCreate(e) | StartError::Listen(e) => Some(e),
            StartError::Bind { source, .. } | StartError::StaleCleanup { source, .. } => {
                Some(source)
            }
        }
    }
}

/// A failed accept. The listener logs it and keeps accepting.
#[derive(Debug)]
pub struct AcceptError(pub io::Error);

impl fmt::Display for AcceptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to accept connection: {}", self.0)
    }
}

impl std::error::Error for AcceptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Errors that end a single exchange early.
#[derive(Debug)]
pub enum SessionError {
    Receive(io::Error),
    Send(io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Receive(e) => write!(f, "Failed to receive data from client: {e}"),
            SessionError::Send(e) => write!(f, "Failed to send data to client: {e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Receive(e) | SessionError::Send(e) => Some(e),
        }
    }
}

/// Errors seen by the companion client.
#[derive(Debug)]
pub enum ClientError {
    /// No server is reachable at the path (missing file or refused).
    Connect { path: PathBuf, source: io::Error },
    Send(io::Error),
    Receive(io::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Connect { path, source } => match source.kind() {
                io::ErrorKind::NotFound => write!(
                    f,
                    "Socket '{}' not found; is the server running?",
                    path.display()
                ),
                io::ErrorKind::ConnectionRefused => write!(
                    f,
                    "Connection to '{}' refused; is the server listening?",
                    path.display()
                ),
                _ => write!(f, "Failed to connect to '{}': {}", path.display(), source),
            },
            ClientError::Send(e) => write!(f, "Failed to send message: {e}"),
            ClientError::Receive(e) => write!(f, "Failed to receive response: {e}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Connect { source, .. } => Some(source),
            ClientError::Send(e) | ClientError::Receive(e) => Some(e),
        }
    }
}

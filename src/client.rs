//! Companion client: send one message, read the server's reply.

use crate::error::ClientError;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const READ_CHUNK: usize = 1024;

/// Connect to `path`, send `message`, and collect the reply until the
/// server closes the connection.
pub fn exchange(path: &Path, message: &[u8]) -> Result<Vec<u8>, ClientError> {
    exchange_with_timeout(path, message, None)
}

/// Like [`exchange`], but each read of the reply gives up after `timeout`.
pub fn exchange_with_timeout(
    path: &Path,
    message: &[u8],
    timeout: Option<Duration>,
) -> Result<Vec<u8>, ClientError> {
    let mut stream = UnixStream::connect(path).map_err(|source| ClientError::Connect {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "Connected to server");
    stream
        .set_read_timeout(timeout)
        .map_err(ClientError::Receive)?;

    stream.write_all(message).map_err(ClientError::Send)?;
    // Half-close so the server's receive returns even for an empty message.
    match stream.shutdown(Shutdown::Write) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
        Err(e) => return Err(ClientError::Send(e)),
    }
    debug!(bytes = message.len(), "Message sent");

    let mut response = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => response.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // The server closed with part of an oversized message unread.
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset && !response.is_empty() => {
                break
            }
            Err(e) => return Err(ClientError::Receive(e)),
        }
    }

    debug!(bytes = response.len(), "Response received");
    Ok(response)
}

//! Single request/response exchange on an accepted connection.
//!
//! The handler performs exactly one receive into a fixed 256-byte buffer,
//! terminates the received bytes, and answers with `ACK Server`:
//!
//! ```text
//! Request:  <up to 255 opaque bytes>
//! Response: ACK Server
//! ```
//!
//! There is no framing. Whatever a single receive returns is the message,
//! and anything beyond 255 bytes is dropped.

use crate::error::SessionError;
use std::borrow::Cow;
use std::ffi::CStr;
use std::io::{Read, Write};
use tracing::{debug, info, warn};

/// Capacity of the per-connection message buffer, terminator included.
pub const BUFFER_CAPACITY: usize = 256;

/// Largest message a single exchange can carry.
pub const MAX_MESSAGE_LEN: usize = BUFFER_CAPACITY - 1;

/// Fixed acknowledgment sent back on every successful receive.
pub const RESPONSE: &[u8] = b"ACK Server";

/// Fixed-capacity receive buffer owned by one exchange.
///
/// The contents only become readable as text once `terminate` has written
/// the NUL right after the received bytes.
pub struct MessageBuffer {
    data: [u8; BUFFER_CAPACITY],
    len: Option<usize>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self {
            data: [0u8; BUFFER_CAPACITY],
            len: None,
        }
    }

    /// Region handed to the receive call; the last byte is reserved.
    fn receive_region(&mut self) -> &mut [u8] {
        &mut self.data[..MAX_MESSAGE_LEN]
    }

    fn terminate(&mut self, received: usize) {
        debug_assert!(received <= MAX_MESSAGE_LEN);
        self.data[received] = 0;
        self.len = Some(received);
    }

    /// Received bytes, empty until terminated.
    pub fn bytes(&self) -> &[u8] {
        match self.len {
            Some(n) => &self.data[..n],
            None => &[],
        }
    }

    /// The message read as a C string: up to the first NUL.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        let n = self.len?;
        CStr::from_bytes_until_nul(&self.data[..=n])
            .ok()
            .map(CStr::to_string_lossy)
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Bytes delivered by the single receive (at most 255).
    pub received: Vec<u8>,
}

/// Run one exchange on `stream`.
///
/// Errors are logged here and returned so the caller can still close the
/// connection. Nothing is retried.
pub fn handle<S: Read + Write>(stream: &mut S) -> Result<Exchange, SessionError> {
    let mut buffer = MessageBuffer::new();

    let received = match stream.read(buffer.receive_region()) {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "Failed to receive data from client");
            return Err(SessionError::Receive(e));
        }
    };
    buffer.terminate(received);

    if let Some(text) = buffer.as_text() {
        info!(bytes = received, text = %text, "Client message");
    }

    if let Err(e) = stream.write_all(RESPONSE).and_then(|()| stream.flush()) {
        warn!(error = %e, "Failed to send data to client");
        return Err(SessionError::Send(e));
    }

    info!("Response sent");
    debug!(bytes = RESPONSE.len(), "Acknowledged");

    Ok(Exchange {
        received: buffer.bytes().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use std::os::unix::net::UnixStream;

    /// In-memory connection: reads from `input`, records writes.
    struct FakeStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
        fail_read: bool,
        fail_write: bool,
    }

    impl FakeStream {
        fn new(input: &[u8]) -> Self {
            Self {
                input: Cursor::new(input.to_vec()),
                output: Vec::new(),
                fail_read: false,
                fail_write: false,
            }
        }
    }

    impl Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.fail_read {
                return Err(io::Error::from(io::ErrorKind::ConnectionReset));
            }
            self.input.read(buf)
        }
    }

    impl Write for FakeStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_write {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_acknowledges_message() {
        let mut stream = FakeStream::new(b"Init Connection");
        let exchange = handle(&mut stream).unwrap();
        assert_eq!(exchange.received, b"Init Connection");
        assert_eq!(stream.output, b"ACK Server");
    }

    #[test]
    fn test_empty_message_still_acknowledged() {
        let mut stream = FakeStream::new(b"");
        let exchange = handle(&mut stream).unwrap();
        assert!(exchange.received.is_empty());
        assert_eq!(stream.output, RESPONSE);
    }

    #[test]
    fn test_max_length_message() {
        let message = vec![b'a'; MAX_MESSAGE_LEN];
        let mut stream = FakeStream::new(&message);
        let exchange = handle(&mut stream).unwrap();
        assert_eq!(exchange.received, message);
        assert_eq!(stream.output, RESPONSE);
    }

    #[test]
    fn test_oversized_message_truncated() {
        let message: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8 + 1).collect();
        let mut stream = FakeStream::new(&message);
        let exchange = handle(&mut stream).unwrap();
        assert_eq!(exchange.received.len(), 255);
        assert_eq!(exchange.received[..], message[..255]);
        assert_eq!(stream.output, RESPONSE);
    }

    #[test]
    fn test_receive_error_sends_nothing() {
        let mut stream = FakeStream::new(b"hello");
        stream.fail_read = true;
        match handle(&mut stream) {
            Err(SessionError::Receive(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(stream.output.is_empty());
    }

    #[test]
    fn test_send_error() {
        let mut stream = FakeStream::new(b"hello");
        stream.fail_write = true;
        match handle(&mut stream) {
            Err(SessionError::Send(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_buffer_text_requires_terminator() {
        let mut buffer = MessageBuffer::new();
        assert!(buffer.as_text().is_none());
        assert!(buffer.bytes().is_empty());

        buffer.receive_region()[..5].copy_from_slice(b"hello");
        buffer.terminate(5);
        assert_eq!(buffer.as_text().unwrap(), "hello");
        assert_eq!(buffer.bytes(), b"hello");
    }

    #[test]
    fn test_buffer_text_stops_at_embedded_nul() {
        let mut buffer = MessageBuffer::new();
        buffer.receive_region()[..7].copy_from_slice(b"abc\0def");
        buffer.terminate(7);
        assert_eq!(buffer.as_text().unwrap(), "abc");
        assert_eq!(buffer.bytes(), b"abc\0def");
    }

    #[test]
    fn test_fresh_buffer_per_exchange() {
        let mut first = FakeStream::new(b"a much longer first message");
        handle(&mut first).unwrap();

        let mut second = FakeStream::new(b"short");
        let exchange = handle(&mut second).unwrap();
        assert_eq!(exchange.received, b"short");
    }

    #[test]
    fn test_over_unix_socket_pair() {
        let (mut client, mut server) = UnixStream::pair().unwrap();
        let message = vec![b'x'; 300];
        client.write_all(&message).unwrap();

        let exchange = handle(&mut server).unwrap();
        assert_eq!(exchange.received, &message[..255]);

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"ACK Server");
    }
}

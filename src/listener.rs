//! Listening endpoint and the sequential accept loop.
//!
//! The listener owns the bound Unix socket. Each iteration accepts one
//! client, runs the session handler to completion on the calling thread,
//! then closes the connection before accepting the next:
//!
//! ```text
//! Created -> Bound -> Listening -> Accepting <-> Accepting
//! Created | Bound -> Failed   (socket, bind or listen error)
//! ```
//!
//! A client that connects and never sends stalls every client queued
//! behind it. There is no receive timeout; this is the main scalability
//! limit of the server.

use crate::backoff::AcceptBackoff;
use crate::config::Config;
use crate::error::{AcceptError, SessionError, StartError};
use crate::session::{self, Exchange};
use socket2::{Domain, SockAddr, Socket, Type};
use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, error, info, warn};

/// What happened during one accept/handle/close iteration.
#[derive(Debug)]
pub enum Outcome {
    /// The client was acknowledged.
    Served(Exchange),
    /// The connection was accepted but the exchange failed part way.
    Abandoned(SessionError),
    /// No connection was accepted.
    AcceptFailed(AcceptError),
}

/// Owner of the bound, listening endpoint.
#[derive(Debug)]
pub struct Listener {
    listener: UnixListener,
    path: PathBuf,
    backoff: AcceptBackoff,
}

impl Listener {
    /// Create, bind and listen on the configured socket path.
    pub fn start(config: &Config) -> Result<Self, StartError> {
        let path = config.socket_path.clone();

        if config.remove_stale {
            remove_stale_endpoint(&path)?;
        }

        let socket = Socket::new(Domain::UNIX, Type::STREAM, None).map_err(|e| {
            error!(error = %e, "Failed to create socket");
            StartError::SocketCreate(e)
        })?;

        let addr = SockAddr::unix(&path).map_err(|e| bind_error(&path, e))?;
        socket.bind(&addr).map_err(|e| bind_error(&path, e))?;
        debug!(path = %path.display(), "Socket bound");

        if let Err(e) = socket.listen(config.backlog) {
            error!(error = %e, "Failed to listen on socket");
            // Bound but not listening; the file is ours to remove.
            let _ = fs::remove_file(&path);
            return Err(StartError::Listen(e));
        }

        info!(
            path = %path.display(),
            backlog = config.backlog,
            "Server started and listening"
        );

        Ok(Listener {
            listener: socket.into(),
            path,
            backoff: config.accept_backoff(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept one client, run its exchange, and close the connection.
    pub fn serve_next(&mut self) -> Outcome {
        info!("Waiting for client connection");

        let mut stream = match self.listener.accept() {
            Ok((stream, _addr)) => {
                self.backoff.on_success();
                stream
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
                let delay = self.backoff.on_failure();
                if !delay.is_zero() {
                    debug!(
                        ?delay,
                        failures = self.backoff.consecutive_failures(),
                        "Backing off before next accept"
                    );
                    thread::sleep(delay);
                }
                return Outcome::AcceptFailed(AcceptError(e));
            }
        };

        info!("Client connected");
        let result = session::handle(&mut stream);

        drop(stream);
        info!("Connection closed");

        match result {
            Ok(exchange) => Outcome::Served(exchange),
            Err(e) => Outcome::Abandoned(e),
        }
    }

    /// Serve clients one at a time until the process is stopped.
    pub fn run(&mut self) -> ! {
        loop {
            match self.serve_next() {
                Outcome::Served(exchange) => {
                    debug!(bytes = exchange.received.len(), "Exchange complete")
                }
                Outcome::Abandoned(e) => debug!(error = %e, "Exchange abandoned"),
                Outcome::AcceptFailed(e) => debug!(error = %e, "No connection accepted"),
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed socket file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove socket file"),
        }
    }
}

fn bind_error(path: &Path, source: io::Error) -> StartError {
    error!(path = %path.display(), error = %source, "Failed to bind socket");
    StartError::Bind {
        path: path.to_path_buf(),
        source,
    }
}

/// Remove a socket file left behind by a dead server.
///
/// The path is only removed if it is a socket and nothing accepts
/// connections on it. A live endpoint or a non-socket file is left alone
/// and bind reports the conflict.
fn remove_stale_endpoint(path: &Path) -> Result<(), StartError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return Ok(()),
    };

    if !metadata.file_type().is_socket() {
        return Ok(());
    }

    if endpoint_is_live(path) {
        debug!(path = %path.display(), "Socket path is owned by a live server");
        return Ok(());
    }

    info!(path = %path.display(), "Removing stale socket");
    fs::remove_file(path).map_err(|source| {
        error!(path = %path.display(), error = %source, "Failed to remove stale socket");
        StartError::StaleCleanup {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Probe with a non-blocking connect so a full backlog cannot stall startup.
///
/// A live server accepts the probe as an ordinary client: it sees one empty
/// exchange, acknowledges it, and keeps serving. Nothing else about the
/// running instance changes.
fn endpoint_is_live(path: &Path) -> bool {
    let probe = match Socket::new(Domain::UNIX, Type::STREAM, None) {
        Ok(socket) => socket,
        Err(_) => return true,
    };
    if probe.set_nonblocking(true).is_err() {
        return true;
    }
    let addr = match SockAddr::unix(path) {
        Ok(addr) => addr,
        Err(_) => return true,
    };

    match probe.connect(&addr) {
        Ok(()) => true,
        Err(e) => e.kind() != io::ErrorKind::ConnectionRefused,
    }
}

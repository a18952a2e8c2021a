//! arq-server: a local acknowledgment server on a Unix domain socket.
//!
//! Each client connection carries exactly one exchange:
//! - the client sends up to 255 bytes
//! - the server answers `ACK Server` and closes the connection
//!
//! Connections are served strictly one at a time on a single thread.
//! Configuration via CLI arguments or TOML file.

mod backoff;
mod client;
mod config;
mod error;
mod listener;
mod session;

use clap::Parser;
use config::{CliArgs, Command, Config};
use listener::Listener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliArgs::parse();
    let config = Config::load(&cli)?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config),
        Command::Send { message } => send(&config, &message),
    }
}

/// Bind the endpoint and serve clients until the process is stopped.
fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        socket = %config.socket_path.display(),
        backlog = config.backlog,
        remove_stale = config.remove_stale,
        "Starting arq-server"
    );

    let mut listener = match Listener::start(&config) {
        Ok(listener) => listener,
        Err(e) => {
            if e.is_bind() {
                error!(error = %e, "Server startup failed; is another instance running?");
            } else {
                error!(error = %e, "Server startup failed");
            }
            return Err(e.into());
        }
    };

    info!(socket = %listener.path().display(), "Serving one client at a time");
    listener.run()
}

/// Send one message and print the server's reply.
fn send(config: &Config, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!(socket = %config.socket_path.display(), "Sending message");
    let reply = client::exchange(&config.socket_path, message.as_bytes())?;
    println!("{}", String::from_utf8_lossy(&reply));
    Ok(())
}

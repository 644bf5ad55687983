//! Terminal frontend for the bioreactor backend.
//!
//! Opens the link on launch, logs every change of the link observables,
//! sends each stdin line to the backend, and closes the link on Ctrl-C or
//! end of input.

mod config;

use std::path::PathBuf;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use bioreactor_link::{ConnectionManager, LinkObservers};
use bioreactor_protocol::{ProgramCommand, ProtocolError};

use config::MonitorConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bioreactor=debug")),
        )
        .init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path);
    match MonitorConfig::write_default_if_missing(&path) {
        Ok(true) => info!(path = %path.display(), "wrote default config"),
        Ok(false) => {}
        Err(e) => warn!(path = %path.display(), "failed to write default config: {e}"),
    }
    let cfg = MonitorConfig::load(&path)?;
    info!(url = %cfg.url, config = %path.display(), "starting monitor");

    let manager = ConnectionManager::new(cfg.link_config());
    spawn_observers(manager.observe());
    manager.start();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&manager, &line),
                Ok(None) => {
                    debug!("end of input");
                    break;
                }
                Err(e) => {
                    warn!("failed to read stdin: {e}");
                    break;
                }
            },
        }
    }

    manager.stop();
    info!("monitor stopped");
    Ok(())
}

/// Logs every published value of the three observables.
fn spawn_observers(observers: LinkObservers) {
    let LinkObservers {
        last_message,
        connection_status,
        is_connected,
    } = observers;

    tokio::spawn(log_changes(connection_status, |status| {
        info!(%status, "connection status changed");
    }));
    tokio::spawn(log_changes(is_connected, |connected| {
        debug!(connected = *connected, "connected flag changed");
    }));
    tokio::spawn(log_changes(last_message, |message| {
        if let Some(message) = message {
            info!(%message, "last message");
        }
    }));
}

async fn log_changes<T, F>(mut rx: watch::Receiver<T>, log: F)
where
    T: Send + Sync + 'static,
    F: Fn(&T) + Send + 'static,
{
    while rx.changed().await.is_ok() {
        log(&rx.borrow_and_update());
    }
}

fn handle_line(manager: &ConnectionManager, line: &str) {
    match parse_line(line) {
        Ok(Some(message)) => {
            manager.send(&message);
        }
        Ok(None) => {}
        Err(e) => warn!("{e}"),
    }
}

/// Turns an input line into an outbound message.
///
/// JSON is sent as is; anything else must be a program command in short
/// form (`mix 120`, `drain 10 60`, `stop`). Blank lines yield nothing.
fn parse_line(line: &str) -> Result<Option<Value>, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if let Ok(value) = serde_json::from_str::<Value>(line) {
        return Ok(Some(value));
    }
    let command: ProgramCommand = line.parse()?;
    Ok(Some(serde_json::to_value(command)?))
}

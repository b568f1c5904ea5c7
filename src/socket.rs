//! Socket helpers shared by the command and event channels.

use std::path::Path;
use std::time::Duration;

use tokio::net::UnixStream;

use crate::error::{BridgeError, Result};

/// Connect to a Unix stream socket, giving up after `timeout`.
pub async fn connect_with_timeout(path: &Path, timeout: Duration) -> Result<UnixStream> {
    match tokio::time::timeout(timeout, UnixStream::connect(path)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(BridgeError::ConnectFailed(format!(
            "{}: {}",
            path.display(),
            e
        ))),
        Err(_) => Err(BridgeError::ConnectFailed(format!(
            "{}: timed out after {:?}",
            path.display(),
            timeout
        ))),
    }
}

/// Where the daemon keeps its sockets: `$HOME/.dropbox`.
pub fn daemon_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".dropbox")
}

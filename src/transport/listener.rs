//! Unix-socket JSON-lines listener.
//!
//! Each message is a single line of JSON followed by `\n`. Stale socket
//! files from previous runs are removed on bind.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;

use super::handler::TransportCore;
use super::messages::{ClientCommand, ServerEvent};

const MAX_LINE_BYTES: usize = 1_048_576;

/// Bind the listener, cleaning up a stale socket file.
pub fn create_listener(socket_path: &Path) -> Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create socket directory")?;
    }

    if socket_path.exists() {
        debug!(path = %socket_path.display(), "create_listener: removing stale socket");
        std::fs::remove_file(socket_path).context("Failed to remove stale socket")?;
    }

    let listener = UnixListener::bind(socket_path).context("Failed to bind transport socket")?;
    info!(path = %socket_path.display(), "transport: listening");
    Ok(listener)
}

/// Remove the socket file on shutdown.
pub fn cleanup_socket(socket_path: &Path) {
    if socket_path.exists() {
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!(path = %socket_path.display(), error = %e, "Failed to remove socket file");
        }
    }
}

/// Accept loop. Runs until cancelled.
pub async fn run_listener(core: TransportCore, socket_path: PathBuf, cancel: CancelToken) -> Result<()> {
    let listener = create_listener(&socket_path)?;

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    debug!("transport: connection accepted");
                    let core = core.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(core, stream, cancel).await {
                            debug!(error = %e, "transport: connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "transport: accept failed");
                }
            },
            _ = cancel.cancelled() => {
                cleanup_socket(&socket_path);
                info!("transport: listener stopped");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(core: TransportCore, stream: UnixStream, cancel: CancelToken) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();

    // Writer task: serialize outgoing events, one JSON object per line.
    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(256);
    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let line = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "transport: failed to serialize event");
                    continue;
                }
            };
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if write_half.write_all(b"\n").await.is_err() {
                break;
            }
            let _ = write_half.flush().await;
        }
    });

    // Reader loop: parse commands, hand them to the core.
    let mut reader = BufReader::new(read_half);
    let mut sessions_touched: HashSet<String> = HashSet::new();
    let mut line = String::new();

    loop {
        line.clear();
        let read = tokio::select! {
            r = reader.read_line(&mut line) => r,
            _ = cancel.cancelled() => break,
        };

        match read {
            Ok(0) => break,
            Ok(n) if n > MAX_LINE_BYTES => {
                let _ = out_tx
                    .send(ServerEvent::Error {
                        agent_id: None,
                        message: format!("Message too large: {} bytes", n),
                    })
                    .await;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                match serde_json::from_str::<ClientCommand>(trimmed) {
                    Ok(cmd) => {
                        if let Some(session_id) = core.handle(cmd, out_tx.clone()).await {
                            sessions_touched.insert(session_id);
                        }
                    }
                    Err(e) => {
                        let _ = out_tx
                            .send(ServerEvent::Error {
                                agent_id: None,
                                message: format!("Unparseable command: {}", e),
                            })
                            .await;
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "transport: read failed");
                break;
            }
        }
    }

    // Sessions this connection served linger for the configured window
    // before garbage collection.
    for session_id in sessions_touched {
        if let Some(entry) = core.sessions.get(&session_id).await {
            entry.mark_disconnected().await;
        }
    }

    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pipeline::AttachmentRegistry;
    use crate::store::ProjectStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_listener_accepts_and_answers_list() {
        let temp = tempdir().unwrap();
        let store = ProjectStore::open(temp.path().join("store")).await.unwrap();

        let mut config = Config::default();
        config
            .providers
            .insert("main".to_string(), crate::config::ProviderConfig::default());

        let cancel = CancelToken::new();
        let core = TransportCore::new(config, store, AttachmentRegistry::new(), cancel.clone());

        let socket_path = temp.path().join("dracode.sock");
        let listener_task = tokio::spawn(run_listener(core, socket_path.clone(), cancel.clone()));

        // Wait for the socket to appear.
        for _ in 0..100 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        stream.write_all(b"{\"command\":\"list\"}\n").await.unwrap();

        let mut reader = BufReader::new(&mut stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();

        let event: ServerEvent = serde_json::from_str(line.trim()).unwrap();
        assert!(matches!(event, ServerEvent::Success { .. }));

        cancel.cancel();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(2), listener_task)
            .await
            .expect("listener should stop on cancel");
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_unparseable_command_reports_error() {
        let temp = tempdir().unwrap();
        let store = ProjectStore::open(temp.path().join("store")).await.unwrap();
        let cancel = CancelToken::new();
        let core = TransportCore::new(Config::default(), store, AttachmentRegistry::new(), cancel.clone());

        let socket_path = temp.path().join("dracode.sock");
        let listener_task = tokio::spawn(run_listener(core, socket_path.clone(), cancel.clone()));

        for _ in 0..100 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        stream.write_all(b"this is not json\n").await.unwrap();

        let mut reader = BufReader::new(&mut stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();

        let event: ServerEvent = serde_json::from_str(line.trim()).unwrap();
        assert!(matches!(event, ServerEvent::Error { .. }));

        cancel.cancel();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(2), listener_task).await;
    }
}

use crate::router::{self, DaemonContext};
use attd_core::ipc::MAX_REQUEST_BYTES;
use attd_core::AttdError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

/// A bound daemon socket.
pub struct BoundSocket {
    pub listener: UnixListener,
    pub path: PathBuf,
    /// Whether a leftover socket file from a previous run was removed first.
    pub removed_stale: bool,
}

/// Remove any stale socket file at `socket_path`, then bind it.
pub fn bind_socket(socket_path: impl AsRef<Path>) -> Result<BoundSocket, AttdError> {
    let path = socket_path.as_ref().to_path_buf();
    let removed_stale = path.exists();
    if removed_stale {
        tracing::warn!("Pipe file already exists, removing: {}", path.display());
        std::fs::remove_file(&path)?;
    }

    let listener = UnixListener::bind(&path).map_err(|source| AttdError::Bind {
        path: path.display().to_string(),
        source,
    })?;
    tracing::info!("IPC Server listening on {}", path.display());

    Ok(BoundSocket {
        listener,
        path,
        removed_stale,
    })
}

/// Accept connections until shutdown, handling each on its own task.
pub async fn serve(
    socket: BoundSocket,
    ctx: Arc<DaemonContext>,
    linger: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let BoundSocket { listener, path, .. } = socket;

    loop {
        tokio::select! {
            res = listener.accept() => {
                match res {
                    Ok((stream, _)) => {
                        tracing::debug!("New connection accepted");
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &ctx, linger).await {
                                tracing::warn!(error = %e, "Connection error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                        // Avoid a hot loop on persistent errors such as fd exhaustion
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }

    drop(listener);
    if path.exists() {
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(error = %e, "Failed to remove socket file {}", path.display());
        }
    }
}

/// Read one request, answer it, and close the connection.
pub async fn handle_connection(
    mut stream: UnixStream,
    ctx: &DaemonContext,
    linger: Duration,
) -> std::io::Result<()> {
    let mut buf = [0u8; MAX_REQUEST_BYTES];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        tracing::debug!("Connection closed before sending a request");
        return Ok(());
    }

    let reply = router::handle_request(&buf[..n], ctx).await;
    stream.write_all(reply.to_string().as_bytes()).await?;
    stream.flush().await?;

    // Give the client time to read the reply before the socket goes away
    if !linger.is_zero() {
        tokio::time::sleep(linger).await;
    }
    stream.shutdown().await
}

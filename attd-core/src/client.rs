use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::ipc::Command;

/// Send one command to the daemon and return its full text reply.
///
/// The daemon closes the connection after replying, so the reply is read to EOF.
pub async fn send_command(
    socket_path: impl AsRef<Path>,
    command: &Command,
) -> std::io::Result<String> {
    send_raw(socket_path, &command.encode()).await
}

/// Send arbitrary bytes as a request. Useful for exercising protocol errors.
pub async fn send_raw(
    socket_path: impl AsRef<Path>,
    request: &[u8],
) -> std::io::Result<String> {
    let mut stream = UnixStream::connect(socket_path).await?;
    stream.write_all(request).await?;
    stream.flush().await?;

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;
    Ok(String::from_utf8_lossy(&reply).into_owned())
}

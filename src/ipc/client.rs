use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use super::protocol::{IpcRequest, IpcResponse};

/// Connection from a launching process to the primary's socket
#[derive(Debug)]
pub struct IpcClient {
    reader: BufReader<UnixStream>,
}

impl IpcClient {
    pub async fn connect(socket_path: impl AsRef<Path>) -> io::Result<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        Ok(Self {
            reader: BufReader::new(stream),
        })
    }

    /// Connect, retrying while the socket is missing or refusing.
    ///
    /// A primary holds its lock a moment before its socket is bound, so a
    /// launch racing it can briefly see nothing to connect to.
    pub async fn connect_with_retry(
        socket_path: impl AsRef<Path>,
        attempts: u32,
        delay: Duration,
    ) -> io::Result<Self> {
        let socket_path = socket_path.as_ref();
        let mut attempt = 1;
        loop {
            match Self::connect(socket_path).await {
                Ok(client) => return Ok(client),
                Err(e) if attempt < attempts && is_not_listening(&e) => {
                    tracing::debug!(
                        "Socket {} not ready (attempt {}): {}",
                        socket_path.display(),
                        attempt,
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn send_request(&mut self, request: &IpcRequest) -> io::Result<()> {
        let mut json = serde_json::to_string(request)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        json.push('\n');

        self.reader.get_mut().write_all(json.as_bytes()).await?;
        self.reader.get_mut().flush().await?;

        Ok(())
    }

    pub async fn recv_response(&mut self) -> io::Result<IpcResponse> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;

        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "primary closed connection",
            ));
        }

        serde_json::from_str(&line).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub async fn call(&mut self, request: &IpcRequest) -> io::Result<IpcResponse> {
        self.send_request(request).await?;
        self.recv_response().await
    }

    /// `call` bounded by `limit`; a primary that stops reading must not hang the launch
    pub async fn call_with_timeout(
        &mut self,
        request: &IpcRequest,
        limit: Duration,
    ) -> io::Result<IpcResponse> {
        tokio::time::timeout(limit, self.call(request))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no reply to '{}' within {:?}", request.command, limit),
                )
            })?
    }
}

fn is_not_listening(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
    )
}

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::task::{Context, Poll, Waker};

use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};

use super::protocol::{IpcRequest, IpcResponse};

/// Longest request line accepted before the connection is dropped
const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

struct ClientConnection {
    stream: UnixStream,
    /// Raw bytes, so a character split across reads survives until its line is complete
    buffer: Vec<u8>,
}

/// Listening side of the primary's notification socket.
///
/// Never blocks: the owner loop calls `accept_pending` and `poll_commands`
/// on a timer and answers with `send_response`.
pub struct IpcServer {
    listener: UnixListener,
    connections: HashMap<ConnectionId, ClientConnection>,
    socket_path: PathBuf,
    next_conn_id: u64,
    owner_uid: u32,
}

impl IpcServer {
    /// Bind `socket_path`, replacing a socket left behind by a crashed primary.
    /// Only call this while holding the instance lock.
    pub fn new(socket_path: impl AsRef<Path>) -> io::Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();

        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }

        let listener = UnixListener::bind(&socket_path)?;

        Ok(Self {
            listener,
            connections: HashMap::new(),
            socket_path,
            next_conn_id: 0,
            owner_uid: nix::unistd::getuid().as_raw(),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept waiting connections. Peers running as another user are refused.
    pub fn accept_pending(&mut self) -> io::Result<usize> {
        let mut accepted = 0;
        let mut cx = Context::from_waker(Waker::noop());

        loop {
            match self.listener.poll_accept(&mut cx) {
                Poll::Ready(Ok((stream, _addr))) => {
                    if !self.same_user(&stream) {
                        continue;
                    }
                    let conn_id = ConnectionId(self.next_conn_id);
                    self.next_conn_id += 1;
                    self.connections.insert(
                        conn_id,
                        ClientConnection {
                            stream,
                            buffer: Vec::new(),
                        },
                    );
                    accepted += 1;
                }
                Poll::Ready(Err(e)) => return Err(e),
                Poll::Pending => break,
            }
        }

        Ok(accepted)
    }

    fn same_user(&self, stream: &UnixStream) -> bool {
        match stream.peer_cred() {
            Ok(cred) if cred.uid() == self.owner_uid => true,
            Ok(cred) => {
                tracing::warn!("Refused notification from uid {}", cred.uid());
                false
            }
            Err(e) => {
                tracing::warn!("Could not read peer credentials: {}", e);
                false
            }
        }
    }

    /// Complete request lines from every connection, tagged with their origin.
    /// Closed, misbehaving or oversized connections are dropped.
    pub fn poll_commands(&mut self) -> io::Result<Vec<(ConnectionId, IpcRequest)>> {
        let mut requests = Vec::new();
        let mut disconnected = Vec::new();

        for (&conn_id, client) in &mut self.connections {
            let mut buf = [0u8; 4096];
            loop {
                match client.stream.try_read(&mut buf) {
                    Ok(0) => {
                        disconnected.push(conn_id);
                        break;
                    }
                    Ok(n) => client.buffer.extend_from_slice(&buf[..n]),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(_) => {
                        disconnected.push(conn_id);
                        break;
                    }
                }
            }

            while let Some(newline_pos) = client.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = client.buffer.drain(..=newline_pos).collect();
                let line = line.trim_ascii();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_slice::<IpcRequest>(line) {
                    Ok(request) => requests.push((conn_id, request)),
                    Err(e) => tracing::debug!("Ignoring malformed request: {}", e),
                }
            }

            if client.buffer.len() > MAX_LINE_BYTES {
                tracing::warn!("Dropping connection with oversized request");
                disconnected.push(conn_id);
            }
        }

        for conn_id in disconnected {
            self.connections.remove(&conn_id);
        }

        Ok(requests)
    }

    pub async fn send_response(
        &mut self,
        conn_id: ConnectionId,
        response: IpcResponse,
    ) -> io::Result<()> {
        let client = self
            .connections
            .get_mut(&conn_id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection not found"))?;

        let mut json = serde_json::to_string(&response)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        json.push('\n');

        client.stream.write_all(json.as_bytes()).await?;
        client.stream.flush().await?;

        Ok(())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn cleanup(&self) -> io::Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        Ok(())
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

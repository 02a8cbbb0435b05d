use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::controller::Event;
use crate::transport::{ConnectionId, NetworkSession};

/// Upper bound on a header block; a sink exceeding it is treated as broken.
const MAX_HEADER_BYTES: usize = 64 * 1024;
/// Upper bound on a `Content-Length` body.
const MAX_BODY_BYTES: usize = 64 * 1024;
/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// tokio TCP implementation of [`NetworkSession`].
///
/// Cloning is cheap; clones share the connection table. The accept loop
/// registers connections, the controller sends and closes through its own
/// clone.
#[derive(Clone)]
pub struct TcpTransport {
    connections: Arc<Mutex<HashMap<ConnectionId, ConnectionHandle>>>,
    next_id: Arc<AtomicU32>,
}

struct ConnectionHandle {
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    alive: Arc<AtomicBool>,
    reader: Option<AbortHandle>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Accept connections until the event inbox is gone.
    ///
    /// Every accepted connection is reported; the controller decides
    /// whether to keep it.
    pub async fn accept_loop(self, listener: TcpListener, events: mpsc::UnboundedSender<Event>) {
        loop {
            match listener.accept().await {
                Ok((stream, remote_addr)) => {
                    if !self.register(stream, remote_addr, &events) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "TCP accept error");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
        tracing::debug!("accept loop exited");
    }

    /// Close every connection, e.g. when the source stops.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.connections.lock().drain().collect();
        for (conn, handle) in drained {
            Self::release(conn, handle);
        }
    }

    /// Returns `false` once the controller is gone.
    fn register(
        &self,
        stream: TcpStream,
        remote_addr: SocketAddr,
        events: &mpsc::UnboundedSender<Event>,
    ) -> bool {
        let local_addr = match stream.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                tracing::warn!(%remote_addr, error = %e, "dropping connection without local address");
                return true;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%remote_addr, error = %e, "could not disable Nagle");
        }

        let conn = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (read_half, write_half) = stream.into_split();
        let alive = Arc::new(AtomicBool::new(true));
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(conn, write_half, outgoing_rx, alive.clone()));
        self.connections.lock().insert(
            conn,
            ConnectionHandle {
                outgoing,
                alive: alive.clone(),
                reader: None,
            },
        );

        tracing::info!(%conn, %remote_addr, "client connected");

        // The accept event must precede any data event for this connection,
        // so the reader only starts once it is queued.
        if events
            .send(Event::ConnectionAccepted {
                conn,
                remote_addr,
                local_addr,
            })
            .is_err()
        {
            self.close_connection(conn);
            return false;
        }

        let reader = tokio::spawn(read_loop(conn, read_half, alive, events.clone()));
        match self.connections.lock().get_mut(&conn) {
            Some(handle) => handle.reader = Some(reader.abort_handle()),
            // Already closed by the controller (e.g. single-client rejection).
            None => reader.abort(),
        }
        true
    }

    fn close_connection(&self, conn: ConnectionId) {
        let removed = self.connections.lock().remove(&conn);
        if let Some(handle) = removed {
            Self::release(conn, handle);
        }
    }

    fn release(conn: ConnectionId, handle: ConnectionHandle) {
        if let Some(reader) = handle.reader {
            reader.abort();
        }
        // Dropping `outgoing` lets the writer flush what is queued and shut down.
        drop(handle.outgoing);
        tracing::debug!(%conn, "connection closed");
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSession for TcpTransport {
    fn send(&mut self, conn: ConnectionId, data: &[u8]) -> io::Result<()> {
        let connections = self.connections.lock();
        let handle = connections
            .get(&conn)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "unknown connection"))?;
        if !handle.alive.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        handle
            .outgoing
            .send(data.to_vec())
            .map_err(|_| io::ErrorKind::BrokenPipe.into())
    }

    fn close(&mut self, conn: ConnectionId) {
        self.close_connection(conn);
    }

    fn is_alive(&self, conn: ConnectionId) -> bool {
        self.connections
            .lock()
            .get(&conn)
            .is_some_and(|handle| handle.alive.load(Ordering::SeqCst))
    }
}

async fn write_loop(
    conn: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    alive: Arc<AtomicBool>,
) {
    while let Some(data) = outgoing.recv().await {
        if let Err(e) = writer.write_all(&data).await {
            tracing::warn!(%conn, error = %e, "write error");
            alive.store(false, Ordering::SeqCst);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(
    conn: ConnectionId,
    read_half: OwnedReadHalf,
    alive: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<Event>,
) {
    let mut reader = BufReader::new(read_half);
    loop {
        let error = match read_message(&mut reader).await {
            Ok(Some(data)) => {
                if events.send(Event::DataReceived { conn, data }).is_err() {
                    return;
                }
                continue;
            }
            Ok(None) => None,
            Err(e) => Some(e),
        };

        alive.store(false, Ordering::SeqCst);
        let _ = events.send(Event::ConnectionClosed { conn, error });
        return;
    }
}

/// Read one RTSP message: header block up to the empty line, then
/// `Content-Length` bytes of body.
///
/// Returns `Ok(None)` on a clean EOF between messages. Empty lines between
/// messages are skipped.
pub async fn read_message<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut message = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        // At most one byte past the remaining header budget is buffered.
        let budget = MAX_HEADER_BYTES - message.len();
        let read = (&mut *reader)
            .take(budget as u64 + 1)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 {
            if message.is_empty() {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-message",
            ));
        }
        if line.len() > budget {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "RTSP header block too large",
            ));
        }
        if !line.ends_with(b"\n") {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-line",
            ));
        }

        let blank = line == b"\r\n" || line == b"\n";
        if blank && message.is_empty() {
            continue;
        }
        message.extend_from_slice(&line);
        if blank {
            break;
        }
    }

    let body_len = content_length(&message)?;
    if body_len > MAX_BODY_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "RTSP body too large",
        ));
    }
    let head_len = message.len();
    message.resize(head_len + body_len, 0);
    reader.read_exact(&mut message[head_len..]).await?;

    Ok(Some(message))
}

fn content_length(head: &[u8]) -> io::Result<usize> {
    let head = String::from_utf8_lossy(head);
    let Some(value) = head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("Content-Length")
            .then(|| value.trim().to_string())
    }) else {
        return Ok(0);
    };
    value
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid Content-Length"))
}

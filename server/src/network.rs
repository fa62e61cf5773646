//! TCP accept loop and per-connection browse sessions.
//!
//! One task accepts connections forever; each accepted socket gets its own
//! session task, so acceptance is never held up by a slow client. A
//! session owns its socket and receive buffer outright and releases both
//! through a single teardown path no matter how it exits.

use crate::filter::normalize_filter;
use crate::packet::pack_server_list;
use crate::query::filter_servers;
use crate::registry::ServerRegistry;
use crate::request::parse_request;
use log::{debug, error, info};
use shared::{cipher, CIPHER_KEY};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// Fixed capacity of a session's receive buffer.
pub const RECV_BUFFER_SIZE: usize = 8192;
/// Pending-connection backlog for the listening socket.
pub const LISTEN_BACKLOG: i32 = 10;
/// Deadline for any single receive or send.
pub const IO_TIMEOUT: Duration = Duration::from_millis(5000);

/// The server-list retrieval listener.
pub struct RetrieveServer {
    listener: TcpListener,
    registry: Arc<ServerRegistry>,
}

impl RetrieveServer {
    /// Binds the listening socket. A bind failure is fatal to this
    /// listener only; the caller decides what it means for the process.
    pub async fn bind(addr: SocketAddr, registry: Arc<ServerRegistry>) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;

        let listener = TcpListener::from_std(socket.into())?;
        info!("Server list retrieval listening on {}", listener.local_addr()?);

        Ok(Self { listener, registry })
    }

    /// Address the listener actually bound to (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, spawning a session per socket.
    pub async fn run(self) -> io::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        run_session(stream, peer, registry).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

/// Drives one connection: receive, parse, query, pack, send, repeat.
///
/// Framing is non-reassembling: every receive event is parsed as one
/// complete request, and a rejected or unparseable request produces no
/// response while the session keeps listening.
async fn run_session(mut stream: TcpStream, peer: SocketAddr, registry: Arc<ServerRegistry>) {
    debug!("Session opened for {}", peer);
    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        let received = match timeout(IO_TIMEOUT, stream.read(&mut buffer)).await {
            // Zero bytes means the peer shut down in an orderly way.
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                if !is_expected_disconnect(&e) {
                    error!("Error receiving data from {}: {}", peer, e);
                }
                break;
            }
            Err(_) => {
                error!("Receive from {} timed out", peer);
                break;
            }
        };

        let message = String::from_utf8_lossy(&buffer[..received]).into_owned();
        debug!("Received {} bytes from {}", received, peer);

        let request = match parse_request(&message) {
            Some(request) => request,
            None => continue,
        };

        let filter = normalize_filter(&request.filter);
        let servers = filter_servers(registry.snapshot().await, &filter);
        let payload = pack_server_list(peer, &servers, &request.fields);
        let response = cipher::encode(CIPHER_KEY, request.validate.as_bytes(), &payload);

        match timeout(IO_TIMEOUT, stream.write_all(&response)).await {
            Ok(Ok(())) => {
                info!(
                    "Sent {} byte response ({} servers) to {}",
                    response.len(),
                    servers.len(),
                    peer
                );
            }
            Ok(Err(e)) => {
                if !is_expected_disconnect(&e) {
                    error!("Error sending data to {}: {}", peer, e);
                }
                break;
            }
            Err(_) => {
                error!("Send to {} timed out", peer);
                break;
            }
        }
    }

    // Single teardown path for every exit above; shutdown failures on an
    // already-dead socket are expected and ignored.
    let _ = stream.shutdown().await;
    debug!("Session closed for {}", peer);
}

/// Ordinary resets and disconnects terminate a session without noise.
fn is_expected_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}

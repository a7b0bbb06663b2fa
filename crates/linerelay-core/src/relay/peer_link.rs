//! The single connection to the peer process.
//!
//! Two background tasks own the connection. The read loop splits the inbound
//! stream into lines, routes replies to the [`PendingReplyQueue`] and
//! notifications to the [`NotificationSink`], and stops for good on EOF or
//! the first read error. The writer task drains an unbounded channel of
//! outgoing lines with one `write_all` per line, so concurrent callers of
//! [`PeerLink::send`] never interleave bytes.
//!
//! There is no reconnection. Once the read loop stops, every later request
//! times out.

use super::classify::{classify, LineKind};
use super::queue::PendingReplyQueue;
use super::sink::NotificationSink;
use crate::config::{PeerEndpoint, RelayConfig};
use crate::{RelayError, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Handle to the running peer connection. Dropping it stops both tasks.
pub struct PeerLink {
    outbound: mpsc::UnboundedSender<String>,
    connected: watch::Receiver<bool>,
    shutdown_tx: watch::Sender<bool>,
    reader_handle: Option<JoinHandle<()>>,
    writer_handle: Option<JoinHandle<()>>,
}

impl PeerLink {
    /// Connect to the peer and start the background tasks.
    ///
    /// Failing to connect is a fatal startup error.
    pub async fn connect(
        endpoint: &PeerEndpoint,
        replies: Arc<PendingReplyQueue>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let connect_error = |e: std::io::Error| RelayError::PeerConnect {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
            source: Some(e),
        };
        let connect_timeout = || RelayError::PeerConnect {
            endpoint: endpoint.to_string(),
            message: format!("timed out after {:?}", RelayConfig::PEER_CONNECT_TIMEOUT),
            source: None,
        };

        match endpoint {
            PeerEndpoint::Tcp(addr) => {
                let stream = tokio::time::timeout(
                    RelayConfig::PEER_CONNECT_TIMEOUT,
                    TcpStream::connect(addr.as_str()),
                )
                .await
                .map_err(|_| connect_timeout())?
                .map_err(connect_error)?;

                info!("Connected to peer at {}", endpoint);
                Ok(Self::spawn(stream, replies, sink))
            }
            #[cfg(unix)]
            PeerEndpoint::Unix(path) => {
                let stream = tokio::time::timeout(
                    RelayConfig::PEER_CONNECT_TIMEOUT,
                    tokio::net::UnixStream::connect(path),
                )
                .await
                .map_err(|_| connect_timeout())?
                .map_err(connect_error)?;

                info!("Connected to peer at {}", endpoint);
                Ok(Self::spawn(stream, replies, sink))
            }
            #[cfg(not(unix))]
            PeerEndpoint::Unix(_) => Err(RelayError::InvalidEndpoint(format!(
                "Unix domain sockets are not available on this platform: {}",
                endpoint
            ))),
        }
    }

    /// Start the read loop and writer task over an already-open stream.
    pub fn spawn<S>(
        stream: S,
        replies: Arc<PendingReplyQueue>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected) = watch::channel(true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reader_handle = tokio::spawn(read_loop(
            reader,
            replies,
            sink,
            shutdown_rx.clone(),
            connected_tx,
        ));
        let writer_handle = tokio::spawn(write_loop(writer, outbound_rx, shutdown_rx));

        Self {
            outbound,
            connected,
            shutdown_tx,
            reader_handle: Some(reader_handle),
            writer_handle: Some(writer_handle),
        }
    }

    /// Queue one line for the peer.
    ///
    /// Never fails. If the connection is gone the line is dropped and the
    /// caller finds out through its timeout.
    pub fn send(&self, line: &str) {
        if self.outbound.send(line.to_string()).is_err() {
            debug!("Peer writer has stopped, dropping outgoing line");
        }
    }

    /// Whether the read loop is still running.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Wait until the read loop has stopped.
    pub async fn closed(&self) {
        let mut connected = self.connected.clone();
        let _ = connected.wait_for(|up| !*up).await;
    }

    /// Stop both background tasks.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for PeerLink {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.reader_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.writer_handle.take() {
            handle.abort();
        }
    }
}

async fn read_loop<R>(
    reader: R,
    replies: Arc<PendingReplyQueue>,
    sink: Arc<dyn NotificationSink>,
    mut shutdown_rx: watch::Receiver<bool>,
    connected_tx: watch::Sender<bool>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        let next = tokio::select! {
            result = lines.next_line() => result,
            _ = shutdown_rx.changed() => {
                debug!("Peer read loop shutting down");
                break;
            }
        };

        match next {
            Ok(Some(line)) => match classify(&line) {
                LineKind::Reply => {
                    if !replies.push(line) {
                        debug!("Discarding peer reply for an abandoned or unknown request");
                    }
                }
                LineKind::Notification => sink.accept(line),
            },
            Ok(None) => {
                error!("Peer closed the connection; further requests will time out");
                break;
            }
            Err(e) => {
                error!("Peer read failed: {}; further requests will time out", e);
                break;
            }
        }
    }

    replies.close();
    connected_tx.send_replace(false);
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let line = tokio::select! {
            next = outbound.recv() => match next {
                Some(line) => line,
                None => break,
            },
            _ = shutdown_rx.changed() => break,
        };

        let mut frame = line.into_bytes();
        frame.push(b'\n');

        let written = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            warn!("Peer write failed: {}; dropping outgoing lines", e);
            break;
        }
    }
}

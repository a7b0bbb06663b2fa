//! Client-facing TCP listener.
//!
//! Each accepted connection is served in its own spawned task by
//! [`handle_session`]. There is no cap on concurrent clients; every one of
//! them gets its single response line. Session failures are logged at debug
//! level and never affect other sessions or the peer link.

use super::correlator::{Correlator, Outcome};
use super::peer_link::PeerLink;
use super::queue::PendingReplyQueue;
use super::session::handle_session;
use super::sink::NotificationSink;
use crate::config::RelaySettings;
use crate::{RelayError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

/// Handle to a running relay. Dropping it stops accepting clients.
pub struct RelayHandle {
    pub addr: SocketAddr,
    link: Arc<PeerLink>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl RelayHandle {
    /// Address the client listener is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The peer connection behind this relay.
    pub fn link(&self) -> &PeerLink {
        &self.link
    }

    /// Stop accepting clients and close the peer link.
    ///
    /// Sessions already in progress run until they time out or get a reply.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.link.shutdown();
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// The relay service.
pub struct RelayServer;

impl RelayServer {
    /// Connect to the peer, bind the client listener and start serving.
    ///
    /// Both steps are fatal on failure; nothing is retried.
    pub async fn start(
        settings: &RelaySettings,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<RelayHandle> {
        let replies = Arc::new(PendingReplyQueue::new());
        let link = PeerLink::connect(&settings.peer, replies.clone(), sink).await?;
        Self::serve(link, replies, settings).await
    }

    /// Serve clients over an existing peer link.
    ///
    /// `replies` must be the queue the link was created with.
    pub async fn serve(
        link: PeerLink,
        replies: Arc<PendingReplyQueue>,
        settings: &RelaySettings,
    ) -> Result<RelayHandle> {
        let listener = TcpListener::bind(settings.listen.as_str())
            .await
            .map_err(|source| RelayError::Bind {
                addr: settings.listen.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;

        info!(
            "Relay listening on {} (timeout {:?}, {:?} correlation)",
            addr, settings.timeout, settings.mode
        );

        let link = Arc::new(link);
        let correlator = Arc::new(Correlator::new(link.clone(), replies, settings.mode));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            correlator,
            settings.timeout,
            shutdown_rx,
        ));

        Ok(RelayHandle {
            addr,
            link,
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        correlator: Arc<Correlator>,
        timeout: Duration,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Relay shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, client_addr)) => {
                            let correlator = correlator.clone();

                            tokio::spawn(async move {
                                debug!("Client connected from {}", client_addr);
                                match handle_session(stream, Some(client_addr), &correlator, timeout).await {
                                    Ok(Some(Outcome::Reply(_))) => {
                                        debug!("Client {} answered", client_addr);
                                    }
                                    Ok(Some(Outcome::TimedOut)) => {
                                        debug!("Client {} timed out waiting for peer", client_addr);
                                    }
                                    Ok(None) => {}
                                    Err(e) => {
                                        debug!("Client session {} ended: {}", client_addr, e);
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            error!("Client accept error: {}", e);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorrelationMode, PeerEndpoint};
    use crate::relay::sink::ChannelSink;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn settings(timeout: Duration) -> RelaySettings {
        RelaySettings {
            peer: PeerEndpoint::Tcp("127.0.0.1:1".to_string()),
            listen: "127.0.0.1:0".to_string(),
            timeout,
            mode: CorrelationMode::Shared,
        }
    }

    #[tokio::test]
    async fn test_serve_binds_ephemeral_port() {
        let (relay_side, _peer_side) = tokio::io::duplex(1024);
        let replies = Arc::new(PendingReplyQueue::new());
        let (sink, _rx) = ChannelSink::new();
        let link = PeerLink::spawn(relay_side, replies.clone(), Arc::new(sink));

        let mut handle = RelayServer::serve(link, replies, &settings(Duration::from_millis(100)))
            .await
            .unwrap();

        assert!(handle.addr().port() > 0);
        assert_eq!(handle.addr().ip(), std::net::Ipv4Addr::LOCALHOST);
        assert!(handle.link().is_connected());

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut busy = settings(Duration::from_millis(100));
        busy.listen = taken.local_addr().unwrap().to_string();

        let (relay_side, _peer_side) = tokio::io::duplex(1024);
        let replies = Arc::new(PendingReplyQueue::new());
        let (sink, _rx) = ChannelSink::new();
        let link = PeerLink::spawn(relay_side, replies.clone(), Arc::new(sink));

        match RelayServer::serve(link, replies, &busy).await {
            Err(e @ RelayError::Bind { .. }) => assert!(e.is_fatal()),
            Err(other) => panic!("Expected Bind, got: {:?}", other),
            Ok(_) => panic!("Expected bind to fail"),
        }
    }

    #[tokio::test]
    async fn test_start_without_peer_is_fatal() {
        let (sink, _rx) = ChannelSink::new();
        let result = RelayServer::start(&settings(Duration::from_millis(100)), Arc::new(sink)).await;
        assert!(matches!(result, Err(RelayError::PeerConnect { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_stops_link() {
        let (relay_side, _peer_side) = tokio::io::duplex(1024);
        let replies = Arc::new(PendingReplyQueue::new());
        let (sink, _rx) = ChannelSink::new();
        let link = PeerLink::spawn(relay_side, replies.clone(), Arc::new(sink));

        let mut handle = RelayServer::serve(link, replies, &settings(Duration::from_millis(100)))
            .await
            .unwrap();
        handle.shutdown();
        handle.link().closed().await;

        assert!(!handle.link().is_connected());
    }

    #[tokio::test]
    async fn test_many_idle_clients_do_not_starve_a_new_one() {
        let (relay_side, _peer_side) = tokio::io::duplex(1024);
        let replies = Arc::new(PendingReplyQueue::new());
        let (sink, _rx) = ChannelSink::new();
        let link = PeerLink::spawn(relay_side, replies.clone(), Arc::new(sink));

        let mut handle = RelayServer::serve(link, replies, &settings(Duration::from_millis(100)))
            .await
            .unwrap();

        // Connections that never send their request line.
        let mut idle = Vec::new();
        for _ in 0..300 {
            idle.push(TcpStream::connect(handle.addr()).await.unwrap());
        }

        let mut client = TcpStream::connect(handle.addr()).await.unwrap();
        client.write_all(b"{\"id\":1}\n").await.unwrap();
        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert_eq!(response, "Timed out\n");

        drop(idle);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_degraded_relay_still_answers_with_timeout() {
        let (relay_side, peer_side) = tokio::io::duplex(1024);
        let replies = Arc::new(PendingReplyQueue::new());
        let (sink, _rx) = ChannelSink::new();
        let link = PeerLink::spawn(relay_side, replies.clone(), Arc::new(sink));

        let mut handle = RelayServer::serve(link, replies, &settings(Duration::from_millis(100)))
            .await
            .unwrap();

        drop(peer_side);
        handle.link().closed().await;

        for _ in 0..2 {
            let mut client = TcpStream::connect(handle.addr()).await.unwrap();
            client.write_all(b"{\"id\":7}\n").await.unwrap();
            let mut response = String::new();
            client.read_to_string(&mut response).await.unwrap();
            assert_eq!(response, "Timed out\n");
        }

        handle.shutdown();
    }
}

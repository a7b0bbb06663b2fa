//! Linerelay Bridge - TCP front end for a single long-lived line peer.
//!
//! Accepts one request line per TCP connection, forwards it to the peer over
//! its Unix (or TCP) socket, and answers with the peer's reply or a timeout
//! marker. Notifications pushed by the peer are written to the log.
//!
//! Follow incoming notifications of a running service with, for example:
//!
//! ```text
//! journalctl -fu linerelay-bridge --no-tail
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use linerelay_core::{
    CorrelationMode, PeerEndpoint, RelayConfig, RelayServer, RelaySettings, TracingSink,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "linerelay-bridge")]
#[command(about = "Relay one-line TCP requests to a single long-lived line peer")]
struct Args {
    /// Peer socket: a Unix socket path, `unix://PATH`, or `tcp://HOST:PORT`
    #[arg(long, default_value = RelayConfig::DEFAULT_PEER_SOCKET)]
    peer: String,

    /// Address to accept client connections on
    #[arg(short, long, default_value = RelayConfig::DEFAULT_LISTEN_ADDR)]
    listen: String,

    /// Milliseconds to wait for a peer reply before answering "Timed out"
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Allow only one request in flight to the peer at a time
    #[arg(long)]
    serialize: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Log subscriber for the bridge.
///
/// Targets stay visible so notification lines (target
/// `linerelay::notification`) can be told apart from service messages.
fn log_subscriber<W>(level: Level, writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(writer)
        .compact()
        .finish()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    tracing::subscriber::set_global_default(log_subscriber(log_level, std::io::stdout))
        .context("failed to install log subscriber")?;

    info!("Starting Linerelay Bridge");

    let peer: PeerEndpoint = args
        .peer
        .parse()
        .with_context(|| format!("invalid --peer value {:?}", args.peer))?;

    let settings = RelaySettings {
        peer,
        listen: args.listen,
        timeout: Duration::from_millis(args.timeout_ms),
        mode: if args.serialize {
            CorrelationMode::Serialized
        } else {
            CorrelationMode::Shared
        },
    };

    // Peer and listener failures are fatal here.
    let mut handle = RelayServer::start(&settings, Arc::new(TracingSink)).await?;

    info!("Bridge running on {}, peer {}", handle.addr(), settings.peer);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    handle.shutdown();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["linerelay-bridge"]);
        assert_eq!(args.peer, "/tmp/signal-cli/socket");
        assert_eq!(args.listen, "0.0.0.0:5780");
        assert_eq!(args.timeout_ms, 2000);
        assert!(!args.serialize);
        assert!(!args.debug);
    }

    #[test]
    fn test_custom_args() {
        let args = Args::parse_from([
            "linerelay-bridge",
            "--peer",
            "tcp://127.0.0.1:7583",
            "-l",
            "127.0.0.1:6000",
            "--timeout-ms",
            "500",
            "--serialize",
            "-d",
        ]);
        assert_eq!(args.peer, "tcp://127.0.0.1:7583");
        assert_eq!(args.listen, "127.0.0.1:6000");
        assert_eq!(args.timeout_ms, 500);
        assert!(args.serialize);
        assert!(args.debug);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_notification_log_keeps_target() {
        use linerelay_core::NotificationSink;

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = log_subscriber(Level::INFO, move || writer.clone());

        let line = r#"{"jsonrpc":"2.0","method":"receive","params":{}}"#;
        tracing::subscriber::with_default(subscriber, || {
            TracingSink.accept(line.to_string());
            info!("Bridge running");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let notification = output
            .lines()
            .find(|l| l.contains("\"method\":\"receive\""))
            .expect("notification was not logged");
        assert!(notification.contains("linerelay::notification"));

        let service = output
            .lines()
            .find(|l| l.contains("Bridge running"))
            .expect("service message was not logged");
        assert!(!service.contains("linerelay::notification"));
    }

    #[test]
    fn test_args_definition_is_valid() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}

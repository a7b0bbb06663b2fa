//! One client connection: one request line in, one response line out.

use super::correlator::{Correlator, Outcome};
use crate::config::RelayConfig;
use crate::{RelayError, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

/// Serve one client session and close it.
///
/// Returns `Ok(None)` when the client sent nothing usable (EOF before a full
/// line, or an empty line); the correlator is not touched in that case and
/// nothing is written back.
pub async fn handle_session<S>(
    mut stream: S,
    client: Option<SocketAddr>,
    correlator: &Correlator,
    timeout: Duration,
) -> Result<Option<Outcome>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match read_request(&mut stream, client).await? {
        Some(request) => request,
        None => {
            debug!("Client {:?} sent no request, closing", client);
            return Ok(None);
        }
    };

    let outcome = correlator.execute(&request, timeout).await;

    let response = match &outcome {
        Outcome::Reply(reply) => reply.as_str(),
        Outcome::TimedOut => RelayConfig::TIMEOUT_MARKER,
    };
    let mut frame = Vec::with_capacity(response.len() + 1);
    frame.extend_from_slice(response.as_bytes());
    frame.push(b'\n');

    stream.write_all(&frame).await?;
    stream.flush().await?;
    stream.shutdown().await?;

    Ok(Some(outcome))
}

/// Read the single request line, without its `\n`.
///
/// Everything before the `\n` is forwarded untouched, including a trailing
/// `\r`.
async fn read_request<R>(stream: &mut R, client: Option<SocketAddr>) -> Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let limit = RelayConfig::MAX_REQUEST_LINE_BYTES;
    // Room for the line plus its "\n".
    let mut reader = BufReader::new(stream.take((limit + 1) as u64));
    let mut buf = Vec::new();
    reader.read_until(b'\n', &mut buf).await?;

    if buf.last() != Some(&b'\n') {
        if buf.len() > limit {
            return Err(RelayError::RequestTooLong { limit });
        }
        // Disconnected mid-line.
        return Ok(None);
    }

    buf.pop();
    if buf.is_empty() {
        return Ok(None);
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| RelayError::InvalidUtf8 { peer: client })
}

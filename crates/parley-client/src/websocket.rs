//! WebSocket transport.
//!
//! Each link is a task that connects, pumps text frames until the socket
//! closes, then reconnects with exponential backoff. Every successful connect
//! reports [`TransportSignal::Open`], so the session sees a reconnect as a
//! fresh connection.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::transport::{LINK_CAPACITY, Transport, TransportError, TransportLink, TransportSignal};

/// Reconnection policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub initial_backoff: Duration,
    /// Upper bound on the delay between attempts.
    pub max_backoff: Duration,
    /// Consecutive failed attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

/// Transport over a WebSocket endpoint (`ws://` or `wss://`).
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: Url,
    reconnect: ReconnectConfig,
}

impl WebSocketTransport {
    /// Transport for `url`.
    ///
    /// # Errors
    ///
    /// - `TransportError::InvalidEndpoint` if the URL does not parse or is not
    ///   a WebSocket URL
    pub fn new(url: &str, reconnect: ReconnectConfig) -> Result<Self, TransportError> {
        let url = Url::parse(url).map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidEndpoint(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }
        Ok(Self { url, reconnect })
    }

    /// Endpoint this transport connects to.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self) -> TransportLink {
        let (outgoing, from_client) = mpsc::channel(LINK_CAPACITY);
        let (to_client, signals) = mpsc::channel(LINK_CAPACITY);
        let task = tokio::spawn(run_connection(
            self.url.clone(),
            self.reconnect.clone(),
            from_client,
            to_client,
        ));
        TransportLink::new(outgoing, signals, Some(task))
    }
}

async fn run_connection(
    url: Url,
    reconnect: ReconnectConfig,
    mut from_client: mpsc::Receiver<String>,
    to_client: mpsc::Sender<TransportSignal>,
) {
    let mut backoff = reconnect.initial_backoff;
    let mut failures = 0u32;

    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!(%url, "websocket connected");
                failures = 0;
                backoff = reconnect.initial_backoff;
                if to_client.send(TransportSignal::Open).await.is_err() {
                    return;
                }

                let reason = pump(stream, &mut from_client, &to_client).await;
                match reason {
                    Some(reason) => {
                        warn!(%reason, "websocket closed");
                        if to_client.send(TransportSignal::Closed { reason }).await.is_err() {
                            return;
                        }
                    },
                    // Client side went away.
                    None => return,
                }
            },
            Err(error) => {
                failures += 1;
                warn!(%url, %error, failures, "websocket connect failed");
                let signal = TransportSignal::OpenFailed { reason: error.to_string() };
                if to_client.send(signal).await.is_err() {
                    return;
                }
                if reconnect.max_attempts.is_some_and(|max| failures >= max) {
                    warn!(failures, "giving up on reconnecting");
                    return;
                }
            },
        }

        debug!(?backoff, "reconnecting after backoff");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(reconnect.max_backoff);
    }
}

/// Move frames until the socket closes. Returns the close reason, or `None`
/// once the client end of the link is gone and its queued frames are written.
async fn pump<S>(
    stream: tokio_tungstenite::WebSocketStream<S>,
    from_client: &mut mpsc::Receiver<String>,
    to_client: &mpsc::Sender<TransportSignal>,
) -> Option<String>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            outgoing = from_client.recv() => {
                let Some(text) = outgoing else {
                    let _ = sink.close().await;
                    return None;
                };
                if let Err(error) = sink.send(Message::Text(text)).await {
                    return Some(error.to_string());
                }
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    // A closing link still drains its outgoing queue.
                    if to_client.send(TransportSignal::Frame(text)).await.is_err() {
                        debug!("link closing, dropping inbound frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    return Some(frame.map_or_else(|| "closed by server".into(), |f| f.reason.to_string()));
                },
                Some(Ok(other)) => debug!(kind = ?other, "ignoring non-text websocket message"),
                Some(Err(error)) => return Some(error.to_string()),
                None => return Some("stream ended".into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_websocket_urls() {
        let transport = WebSocketTransport::new("ws://localhost:3000/chat", ReconnectConfig::default())
            .expect("valid url");
        assert_eq!(transport.url().scheme(), "ws");
        assert!(WebSocketTransport::new("wss://chat.example.com", ReconnectConfig::default()).is_ok());
    }

    #[test]
    fn rejects_other_endpoints() {
        assert!(matches!(
            WebSocketTransport::new("http://localhost", ReconnectConfig::default()),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            WebSocketTransport::new("not a url", ReconnectConfig::default()),
            Err(TransportError::InvalidEndpoint(_))
        ));
    }
}

/// Update channel connection: reconnect state machine, backoff policy and the
/// WebSocket transport

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ChannelError;

/// Text frames received on one connection. The stream ends when the peer closes.
pub type FrameStream = BoxStream<'static, Result<String, ChannelError>>;

/// Opens one connection of the update channel per call
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'_, Result<FrameStream, ChannelError>>;
}

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    /// Waiting to retry; `attempt` counts failures since the last open connection
    Reconnecting { attempt: u32 },
    /// Retries exhausted or the store was closed
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    ConnectSucceeded,
    Message,
    Dropped,
    GaveUp,
}

impl ChannelState {
    pub fn on(self, event: ChannelEvent) -> ChannelState {
        match (self, event) {
            (ChannelState::Closed, _) | (_, ChannelEvent::GaveUp) => ChannelState::Closed,
            (_, ChannelEvent::ConnectSucceeded) => ChannelState::Open,
            (ChannelState::Connecting | ChannelState::Open, ChannelEvent::Dropped) => {
                ChannelState::Reconnecting { attempt: 1 }
            }
            (ChannelState::Reconnecting { attempt }, ChannelEvent::Dropped) => {
                ChannelState::Reconnecting {
                    attempt: attempt.saturating_add(1),
                }
            }
            (state, ChannelEvent::Message) => state,
        }
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Bounded exponential backoff between reconnect attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (starting at 1)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

/// Keep the channel connected until retries run out, handing every text frame to
/// `on_frame` in arrival order.
pub(crate) async fn drive<C, F>(
    connector: &C,
    policy: &ReconnectPolicy,
    state_tx: &watch::Sender<ChannelState>,
    mut on_frame: F,
) where
    C: Connector + ?Sized,
    F: FnMut(String),
{
    let mut state = ChannelState::Connecting;
    state_tx.send_replace(state);

    loop {
        match connector.connect().await {
            Ok(mut frames) => {
                state = state.on(ChannelEvent::ConnectSucceeded);
                state_tx.send_replace(state);
                tracing::info!("Update channel open");

                while let Some(frame) = frames.next().await {
                    match frame {
                        Ok(text) => {
                            state = state.on(ChannelEvent::Message);
                            on_frame(text);
                        }
                        Err(e) => {
                            tracing::warn!("Update channel error: {}", e);
                            break;
                        }
                    }
                }
                tracing::info!("Update channel dropped");
            }
            Err(e) => {
                tracing::warn!("Update channel {}", e);
            }
        }

        state = state.on(ChannelEvent::Dropped);
        let attempt = match state {
            ChannelState::Reconnecting { attempt } => attempt,
            _ => break,
        };

        if !policy.allows(attempt) {
            tracing::error!("Giving up on update channel after {} attempts", attempt - 1);
            state = state.on(ChannelEvent::GaveUp);
            state_tx.send_replace(state);
            break;
        }

        state_tx.send_replace(state);
        let delay = policy.delay(attempt);
        tracing::debug!("Reconnecting update channel in {:?} (attempt {})", delay, attempt);
        tokio::time::sleep(delay).await;
    }
}

// ============================================================================
// WebSocket transport
// ============================================================================

pub struct WebSocketConnector {
    url: String,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self) -> BoxFuture<'_, Result<FrameStream, ChannelError>> {
        Box::pin(async move {
            tracing::debug!("Connecting to {}", self.url);

            let connecting = tokio_tungstenite::connect_async(self.url.as_str());
            let (socket, _response) = tokio::time::timeout(self.connect_timeout, connecting)
                .await
                .map_err(|_| {
                    ChannelError::Connect(format!("timed out after {:?}", self.connect_timeout))
                })?
                .map_err(|e| ChannelError::Connect(e.to_string()))?;

            // Pings are answered by tungstenite while reading
            let frames = socket.filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => Some(Ok(text)),
                        Err(_) => {
                            tracing::warn!("Dropping non UTF-8 binary frame");
                            None
                        }
                    },
                    Ok(_) => None,
                    Err(e) => Some(Err(ChannelError::from(e))),
                }
            });

            Ok(frames.boxed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use ChannelState::{Closed, Connecting, Open, Reconnecting};

        assert_eq!(Connecting.on(ChannelEvent::ConnectSucceeded), Open);
        assert_eq!(Connecting.on(ChannelEvent::Dropped), Reconnecting { attempt: 1 });
        assert_eq!(Open.on(ChannelEvent::Message), Open);
        assert_eq!(Open.on(ChannelEvent::Dropped), Reconnecting { attempt: 1 });
        assert_eq!(
            Reconnecting { attempt: 3 }.on(ChannelEvent::Dropped),
            Reconnecting { attempt: 4 }
        );
        assert_eq!(Reconnecting { attempt: 3 }.on(ChannelEvent::ConnectSucceeded), Open);
        assert_eq!(Open.on(ChannelEvent::GaveUp), Closed);
        assert_eq!(Reconnecting { attempt: 2 }.on(ChannelEvent::GaveUp), Closed);
        assert_eq!(Closed.on(ChannelEvent::ConnectSucceeded), Closed);
        assert_eq!(Closed.on(ChannelEvent::Dropped), Closed);
    }

    #[test]
    fn test_backoff_is_bounded() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
        assert_eq!(policy.delay(4), Duration::from_millis(4000));
        assert_eq!(policy.delay(6), Duration::from_secs(10));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(10));
        assert!(policy.allows(1_000_000));
    }

    #[test]
    fn test_attempt_limit() {
        let policy = ReconnectPolicy {
            max_attempts: Some(3),
            ..ReconnectPolicy::default()
        };
        assert!(policy.allows(3));
        assert!(!policy.allows(4));
    }

    #[tokio::test]
    async fn test_websocket_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WebSocketConnector::new(format!("ws://{}/updates", addr));
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, ChannelError::Connect(_)));
    }

    #[tokio::test]
    async fn test_wss_reaches_the_tls_handshake() {
        // Accepts and hangs up, so the handshake fails after TLS has been attempted
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let connector = WebSocketConnector::new(format!("wss://{}/updates", addr))
            .with_connect_timeout(Duration::from_secs(2));
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, ChannelError::Connect(_)));
        assert!(
            !err.to_string().contains("TLS support not compiled in"),
            "unexpected error: {err}"
        );
    }
}

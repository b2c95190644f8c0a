/// Test fixtures: sample payloads, an in-memory channel and in-process servers

use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::channel::{Connector, FrameStream, ReconnectPolicy};
use crate::error::ChannelError;

pub type SessionTx = mpsc::UnboundedSender<Result<String, ChannelError>>;

pub fn sample_state_json() -> serde_json::Value {
    json!({
        "id": "w1",
        "name": "worker1",
        "ip": "10.0.0.2",
        "port": 8001,
        "tempfolder": "/tmp/w1",
        "nodes": {
            "n1": {
                "id": "n1",
                "name": "camera",
                "port": 9001,
                "fsm": "PREVIEWING",
                "registered_methods": {
                    "set_fps": {
                        "name": "set_fps",
                        "style": "concurrent",
                        "params": { "fps": "int" }
                    }
                },
                "logdir": "/tmp/w1/camera",
                "diagonostics": {
                    "timestamp": "2024-01-01T00:00:00",
                    "latency": 1.5,
                    "payload_size": 2048.0,
                    "memory_usage": 12.0,
                    "cpu_usage": 3.25,
                    "num_of_steps": 40
                }
            }
        }
    })
}

pub fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        multiplier: 2,
        max_attempts: None,
    }
}

/// Poll `check` until it holds, failing the test after a few seconds
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Connector that hands out pre-made sessions in order. Dropping a session's sender
/// ends that connection; once all sessions are used, connects fail.
pub struct ScriptedConnector {
    sessions: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<String, ChannelError>>>>,
    connects: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(count: usize) -> (Self, Vec<SessionTx>) {
        let (senders, receivers): (Vec<_>, VecDeque<_>) =
            (0..count).map(|_| mpsc::unbounded_channel()).unzip();
        let connector = Self {
            sessions: Mutex::new(receivers),
            connects: Arc::new(AtomicUsize::new(0)),
        };
        (connector, senders)
    }

    /// Number of connect calls so far
    pub fn connects(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.connects)
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self) -> BoxFuture<'_, Result<FrameStream, ChannelError>> {
        Box::pin(async move {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let rx = self
                .sessions
                .lock()
                .pop_front()
                .ok_or_else(|| ChannelError::Connect("no session left".to_string()))?;

            let frames = futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|frame| (frame, rx))
            });
            Ok(frames.boxed())
        })
    }
}

/// Serve `app` on an ephemeral local port and return its http address
pub async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

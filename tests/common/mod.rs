#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for quiz live client integration tests.
//!
//! [`TestConnector`] hands every accepted connection to the test as a
//! [`ServerConn`], which plays the server side: it pushes frames to the
//! client and inspects what the client sent.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use quiz_live_client::{Connector, QuizClientConfig, QuizClientError, QuizEvent, Transport};

/// What `recv()` yields: a frame, an abnormal close, or a clean close.
pub type Frame = Option<Result<String, QuizClientError>>;

const WAIT: Duration = Duration::from_secs(2);

// ── Transport ───────────────────────────────────────────────────────

/// Client side of an in-process connection.
pub struct ChannelTransport {
    inbound: mpsc::UnboundedReceiver<Frame>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: String) -> Result<(), QuizClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QuizClientError::TransportClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, QuizClientError>> {
        match self.inbound.recv().await {
            Some(frame) => frame,
            // The test dropped its ServerConn; stay quiet until shutdown.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), QuizClientError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Server side of an in-process connection.
pub struct ServerConn {
    tx: mpsc::UnboundedSender<Frame>,
    pub url: String,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl ServerConn {
    /// Deliver one JSON frame to the client.
    pub fn push(&self, frame: Value) {
        self.push_raw(&frame.to_string());
    }

    pub fn push_raw(&self, text: &str) {
        self.tx.send(Some(Ok(text.to_string()))).unwrap();
    }

    /// Simulate the network dropping (close code 1006).
    pub fn drop_abnormally(&self) {
        self.tx
            .send(Some(Err(QuizClientError::AbnormalClose {
                code: 1006,
                reason: None,
            })))
            .unwrap();
    }

    /// Simulate the server closing with code 1000.
    pub fn close_cleanly(&self) {
        self.tx.send(None).unwrap();
    }

    /// Everything the client has sent so far, parsed.
    pub fn sent_messages(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    /// Wait until the client has sent at least `count` messages.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<Value> {
        tokio::time::timeout(WAIT, async {
            loop {
                let messages = self.sent_messages();
                if messages.len() >= count {
                    return messages;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {count} sent messages, got {:?}",
                self.sent_messages()
            )
        })
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Connector that accepts connections unless told to refuse them.
pub struct TestConnector {
    calls: Arc<AtomicUsize>,
    refuse_next: Arc<AtomicUsize>,
    refuse_all: Arc<AtomicBool>,
    accepted: mpsc::UnboundedSender<ServerConn>,
}

/// Test-side view of a [`TestConnector`].
pub struct ConnectorProbe {
    calls: Arc<AtomicUsize>,
    refuse_next: Arc<AtomicUsize>,
    refuse_all: Arc<AtomicBool>,
    accepted: mpsc::UnboundedReceiver<ServerConn>,
}

pub fn test_connector() -> (TestConnector, ConnectorProbe) {
    let calls = Arc::new(AtomicUsize::new(0));
    let refuse_next = Arc::new(AtomicUsize::new(0));
    let refuse_all = Arc::new(AtomicBool::new(false));
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
    let connector = TestConnector {
        calls: Arc::clone(&calls),
        refuse_next: Arc::clone(&refuse_next),
        refuse_all: Arc::clone(&refuse_all),
        accepted: accepted_tx,
    };
    let probe = ConnectorProbe {
        calls,
        refuse_next,
        refuse_all,
        accepted: accepted_rx,
    };
    (connector, probe)
}

#[async_trait]
impl Connector for TestConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, QuizClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_all.load(Ordering::SeqCst) {
            return Err(QuizClientError::ConnectionFailed("connection refused".into()));
        }
        let refused = self
            .refuse_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(QuizClientError::ConnectionFailed("connection refused".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let server = ServerConn {
            tx,
            url: url.to_string(),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        self.accepted
            .send(server)
            .map_err(|_| QuizClientError::ConnectionFailed("test dropped its probe".into()))?;
        Ok(Box::new(ChannelTransport {
            inbound: rx,
            sent,
            closed,
        }))
    }
}

impl ConnectorProbe {
    /// Number of `connect` calls so far, refused ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: usize) {
        self.refuse_next.store(n, Ordering::SeqCst);
    }

    /// Refuse every connection attempt from now on.
    pub fn refuse_all(&self) {
        self.refuse_all.store(true, Ordering::SeqCst);
    }

    /// Wait for the client to open its next connection.
    pub async fn next_connection(&mut self) -> ServerConn {
        tokio::time::timeout(WAIT, self.accepted.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }
}

// ── Client helpers ──────────────────────────────────────────────────

/// Config with short delays so reconnect tests run quickly.
pub fn test_config() -> QuizClientConfig {
    QuizClientConfig::new("ws://quiz.test/ws", "u1")
        .with_reconnect_delay(Duration::from_millis(10))
        .with_shutdown_timeout(Duration::from_millis(200))
}

pub async fn next_event(events: &mut mpsc::Receiver<QuizEvent>) -> QuizEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Skip events until one matches `pred`, and return it.
pub async fn wait_for(
    events: &mut mpsc::Receiver<QuizEvent>,
    pred: impl Fn(&QuizEvent) -> bool,
) -> QuizEvent {
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return event;
        }
    }
}

// ── Server frames ───────────────────────────────────────────────────

pub fn users_in_room(users: &[(&str, &str)]) -> Value {
    let users: Vec<Value> = users
        .iter()
        .map(|(id, name)| json!({ "id": id, "name": name, "email": format!("{id}@example.com") }))
        .collect();
    json!({ "type": "USERS_IN_ROOM", "payload": { "users": users } })
}

pub fn user_joined(id: &str, name: &str) -> Value {
    json!({
        "type": "USER_JOINED",
        "payload": { "user": { "id": id, "name": name, "email": format!("{id}@example.com") } }
    })
}

pub fn user_left(id: &str) -> Value {
    json!({ "type": "USER_LEFT", "payload": { "userId": id } })
}

pub fn quiz_started(attempt_id: &str) -> Value {
    json!({ "type": "QUIZ_STARTED", "payload": { "attemptId": attempt_id } })
}

pub fn new_question(id: &str, options: usize) -> Value {
    let options: Vec<String> = (0..options).map(|i| format!("option {i}")).collect();
    json!({
        "type": "NEW_QUESTION",
        "payload": {
            "id": id,
            "question": format!("Question {id}?"),
            "options": options,
            "marks": 5,
            "timeLimit": 1
        }
    })
}

pub fn quiz_ended() -> Value {
    json!({ "type": "QUIZ_ENDED", "payload": {} })
}

pub fn leaderboard(entries: &[(&str, u64)], own: Option<(u64, u32)>) -> Value {
    let top: Vec<Value> = entries
        .iter()
        .map(|(user_id, score)| json!({ "userId": user_id, "score": score }))
        .collect();
    let mut payload = json!({ "topPlayers": top });
    if let Some((score, rank)) = own {
        payload["selfScore"] = json!({ "score": score, "rank": rank });
    }
    json!({ "type": "Leaderboard", "payload": payload })
}

pub fn server_error(message: &str, code: Option<&str>) -> Value {
    let mut payload = json!({ "message": message });
    if let Some(code) = code {
        payload["code"] = json!(code);
    }
    json!({ "type": "ERROR", "payload": payload })
}

//! # Loopback Session Example
//!
//! Runs a whole quiz against an in-process fake server by implementing
//! [`Connector`] and [`Transport`] over channels. Useful for:
//!
//! - **Testing**: exercise UI logic without a real session server
//! - **Custom backends**: adapt any I/O layer (TCP, QUIC, a browser bridge)
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_session
//! ```

use async_trait::async_trait;
use quiz_live_client::{
    Connector, QuizClient, QuizClientConfig, QuizClientError, QuizEvent, SessionRole, Transport,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-based transport
// ─────────────────────────────────────────────────────────────────────

/// Client half of a loopback connection.
struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// Server half: read what the client sent, push frames back.
struct LoopbackServer {
    rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
}

impl LoopbackServer {
    fn push(&self, frame: Value) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.tx.send(frame.to_string())?;
        Ok(())
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), QuizClientError> {
        self.tx
            .send(message)
            .map_err(|e| QuizClientError::TransportSend(e.to_string()))
    }

    /// Dropping the server half reads as a clean close, so the client does
    /// not try to reconnect. `mpsc` receivers are cancel-safe.
    async fn recv(&mut self) -> Option<Result<String, QuizClientError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), QuizClientError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A connector that hands each server half to `main`
// ─────────────────────────────────────────────────────────────────────

struct LoopbackConnector {
    accepted: mpsc::UnboundedSender<LoopbackServer>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, QuizClientError> {
        tracing::info!("loopback connect to {url}");
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        self.accepted
            .send(LoopbackServer {
                rx: server_rx,
                tx: server_tx,
            })
            .map_err(|e| QuizClientError::ConnectionFailed(e.to_string()))?;
        Ok(Box::new(LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Play host on the server side, participant on the client side
// ─────────────────────────────────────────────────────────────────────

/// Answer the client's `JOIN_ROOM`, serve one question, score the answer,
/// then end the quiz and hang up.
async fn fake_server(mut server: LoopbackServer) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    while let Some(text) = server.rx.recv().await {
        tracing::info!("server received: {text}");
        let frame: Value = serde_json::from_str(&text)?;
        match frame["type"].as_str() {
            Some("JOIN_ROOM") => {
                let user_id = frame["payload"]["userId"].clone();
                server.push(json!({
                    "type": "USERS_IN_ROOM",
                    "payload": { "users": [
                        { "id": "host-1", "name": "Ms. Park", "email": "park@example.com", "isHost": true },
                        { "id": user_id, "name": "Demo Student", "email": "demo@example.com" }
                    ]}
                }))?;
                server.push(json!({ "type": "QUIZ_STARTED", "payload": { "attemptId": "attempt-1" } }))?;
                server.push(json!({
                    "type": "NEW_QUESTION",
                    "payload": {
                        "id": "q-1",
                        "question": "Which planet is known as the Red Planet?",
                        "options": ["Venus", "Mars", "Jupiter"],
                        "marks": 10,
                        "timeLimit": 1
                    }
                }))?;
            }
            Some("ANSWER") => {
                let correct = frame["payload"]["answer"] == 1;
                let score = if correct { 10 } else { 0 };
                let user_id = frame["payload"]["userId"].clone();
                server.push(json!({
                    "type": "Leaderboard",
                    "payload": {
                        "topPlayers": [{ "userId": user_id, "score": score }],
                        "selfScore": { "score": score, "rank": 1 }
                    }
                }))?;
                server.push(json!({ "type": "QUIZ_ENDED", "payload": {} }))?;
                // Dropping `server` closes the connection cleanly.
                return Ok(());
            }
            _ => {}
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel();
    let connector = LoopbackConnector {
        accepted: accepted_tx,
    };
    let config = QuizClientConfig::new("ws://loopback.invalid/ws", "student-1");
    let (mut client, mut events) = QuizClient::new(connector, config);
    client.connect("demo-token").await?;

    let Some(server) = accepted_rx.recv().await else {
        return Err("connector dropped before a connection was made".into());
    };
    let server_task = tokio::spawn(fake_server(server));

    while let Some(event) = events.recv().await {
        match event {
            QuizEvent::Connected => {
                client.join_room("quiz-demo", SessionRole::Participant).await?;
            }
            QuizEvent::RoomJoined { participants, .. } => {
                tracing::info!("joined with {} participant(s)", participants.len());
            }
            QuizEvent::QuestionChanged { question } => {
                tracing::info!("question: {}", question.prompt);
                let mars = question
                    .options
                    .iter()
                    .position(|o| o == "Mars")
                    .unwrap_or(0);
                client.select_answer(mars).await?;
            }
            QuizEvent::LeaderboardUpdated { snapshot } => {
                tracing::info!(
                    "rank {:?}, score {}",
                    snapshot.rank(),
                    snapshot.own_score().unwrap_or(0)
                );
            }
            QuizEvent::Disconnected { reason } => {
                tracing::info!("disconnected: {}", reason.as_deref().unwrap_or("clean close"));
                break;
            }
            other => tracing::info!("event: {other:?}"),
        }
    }

    if let Err(e) = server_task.await? {
        tracing::error!("fake server failed: {e}");
    }
    client.disconnect().await;
    Ok(())
}

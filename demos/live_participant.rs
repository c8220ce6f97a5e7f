//! # Live Participant Example
//!
//! Joins a running quiz as a participant over WebSocket:
//!
//! 1. Connect with a bearer token (the client reconnects on its own)
//! 2. Join the quiz room once connected
//! 3. Answer each question as it arrives
//! 4. Print leaderboard updates
//! 5. Disconnect on Ctrl+C or when the quiz ends
//!
//! ## Running
//!
//! ```sh
//! QUIZ_TOKEN=eyJhbGciOi... QUIZ_ID=quiz-42 QUIZ_USER_ID=user-7 \
//!     cargo run --example live_participant
//!
//! # Override the server URL:
//! QUIZ_SERVER_URL=wss://quiz.example.com/ws ... cargo run --example live_participant
//! ```

use quiz_live_client::{
    QuizClient, QuizClientConfig, QuizEvent, SessionRole, WebSocketConnector,
};

/// Default server URL when `QUIZ_SERVER_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8080/ws";

fn required_env(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    std::env::var(name).map_err(|_| format!("{name} must be set").into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("QUIZ_SERVER_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let token = required_env("QUIZ_TOKEN")?;
    let quiz_id = required_env("QUIZ_ID")?;
    let user_id = required_env("QUIZ_USER_ID")?;
    tracing::info!("Connecting to {url} as {user_id}");

    let config = QuizClientConfig::new(url, user_id);
    let (mut client, mut events) = QuizClient::new(WebSocketConnector::new(), config);
    client.connect(&token).await?;

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };

                match event {
                    QuizEvent::Connected => {
                        // After a reconnect the client rejoins by itself and
                        // this is skipped as already joining.
                        let outcome = client.join_room(quiz_id.as_str(), SessionRole::Participant).await?;
                        tracing::info!("Join request: {outcome:?}");
                    }

                    QuizEvent::RoomJoined { quiz_id, participants } => {
                        tracing::info!("In room {quiz_id} with {} participant(s)", participants.len());
                    }

                    QuizEvent::ParticipantJoined { participant } => {
                        tracing::info!("{} joined", participant.name);
                    }

                    QuizEvent::QuestionChanged { question } => {
                        tracing::info!(
                            "Q: {} ({} marks, {:?} to answer)",
                            question.prompt,
                            question.marks,
                            question.time_limit()
                        );
                        for (i, option) in question.options.iter().enumerate() {
                            tracing::info!("  [{i}] {option}");
                        }
                        // A real UI would wait for input and call `time_out`
                        // when the countdown ends. Pick the first option.
                        let outcome = client.select_answer(0).await?;
                        tracing::info!("Answer: {outcome:?}");
                    }

                    QuizEvent::LeaderboardUpdated { snapshot } => {
                        for row in client.standings(10).await {
                            tracing::info!("#{} {} ({})", row.position, row.name, row.score);
                        }
                        if let Some(rank) = snapshot.rank() {
                            tracing::info!("You are #{rank} with {} points", client.total_score().await);
                        }
                    }

                    QuizEvent::QuizEnded => {
                        tracing::info!("Quiz over");
                        break;
                    }

                    QuizEvent::Reconnecting { attempt, max_attempts, delay } => {
                        tracing::warn!("Connection lost, retry {attempt}/{max_attempts} in {delay:?}");
                    }

                    QuizEvent::ServerError { message, code } => {
                        tracing::error!("Server error [{code:?}]: {message}");
                    }

                    QuizEvent::Disconnected { reason } => {
                        tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("closed by server"));
                        break;
                    }

                    other => {
                        tracing::debug!("Event: {other:?}");
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, disconnecting…");
                break;
            }
        }
    }

    client.disconnect().await;
    Ok(())
}

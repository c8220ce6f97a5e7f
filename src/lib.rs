//! # Quiz Live Client
//!
//! Transport-agnostic Rust client for live quiz sessions: a host runs a quiz,
//! participants join its room, answer timed multiple-choice questions, and
//! watch a leaderboard update as scores come in.
//!
//! The crate is split into two layers:
//!
//! - **Session state** ([`session`], [`room`], [`question`], [`leaderboard`])
//!   is plain synchronous Rust with no I/O. Server messages go in, events
//!   and outbound messages come out.
//! - **Connection management** ([`client`], behind `tokio-runtime`) owns the
//!   transport, reconnects with a bounded budget, and drives the session
//!   state from a background task.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **Validated wire format**: every inbound frame is checked against its
//!   message schema before it touches state
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   [`WebSocketConnector`]
//! - **Event-driven**: typed [`QuizEvent`]s arrive on a channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "transport-websocket")]
//! # async fn run() -> Result<(), quiz_live_client::QuizClientError> {
//! use quiz_live_client::{
//!     QuizClient, QuizClientConfig, QuizEvent, SessionRole, WebSocketConnector,
//! };
//!
//! let config = QuizClientConfig::new("wss://quiz.example.com/ws", "user-7");
//! let (mut client, mut events) = QuizClient::new(WebSocketConnector::new(), config);
//! client.connect("bearer-token").await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         QuizEvent::Connected => {
//!             client.join_room("quiz-42", SessionRole::Participant).await?;
//!         }
//!         QuizEvent::QuestionChanged { question } => {
//!             println!("{} ({} options)", question.prompt, question.options.len());
//!             client.select_answer(0).await?;
//!         }
//!         QuizEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "tokio-runtime")]
pub mod client;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod leaderboard;
pub mod protocol;
pub mod question;
pub mod room;
pub mod session;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
#[cfg(feature = "tokio-runtime")]
pub use client::{ConnectionStatus, Outcome, QuizClient, QuizClientConfig};
pub use error::{ProtocolError, QuizClientError};
pub use error_codes::ErrorCode;
pub use event::QuizEvent;
pub use leaderboard::{LeaderboardProjector, ScoreboardSnapshot, Standing};
pub use protocol::{ClientMessage, LiveParticipant, ServerMessage, SessionRole};
pub use question::{ActiveQuestion, QuestionCycle, QuizPhase};
pub use room::{RoomState, RoomStatus};
pub use session::{QuizSession, SkipReason};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};

//! Transport implementations for live quiz sessions.
//!
//! This module provides concrete [`Transport`](crate::Transport) and
//! [`Connector`](crate::Connector) implementations behind feature gates:
//!
//! | Feature                | Transport              | Connector              |
//! |------------------------|------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] | [`WebSocketConnector`] |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), quiz_live_client::QuizClientError> {
//! use quiz_live_client::{Transport, WebSocketTransport};
//!
//! let mut ws = WebSocketTransport::connect("ws://localhost:8080/ws?token=abc").await?;
//! ws.send(r#"{"type":"JOIN_ROOM","payload":{"quizId":"q","userId":"u","isHost":false}}"#.to_string()).await?;
//!
//! if let Some(Ok(msg)) = ws.recv().await {
//!     println!("server said: {msg}");
//! }
//!
//! ws.close().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};

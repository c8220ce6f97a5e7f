//! Transport abstraction for live quiz sessions.
//!
//! The [`Transport`] trait defines a bidirectional text message channel between
//! the client and the session server. Every message is one JSON text frame, so
//! implementations handle framing internally (WebSocket frames, length-prefixed
//! TCP, in-process channels for tests).
//!
//! Because the client reconnects on its own, it cannot be handed a single
//! pre-built transport. A [`Connector`] opens a fresh transport for a given URL
//! each time the connection manager needs one.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use quiz_live_client::error::QuizClientError;
//! use quiz_live_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), QuizClientError> {
//!         // Send the JSON text frame over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, QuizClientError>> {
//!         // Receive the next JSON text frame.
//!         // Return None only on a clean (code 1000) close.
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), QuizClientError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, QuizClientError> {
//!         Ok(Box::new(MyTransport { /* ... */ }))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::QuizClientError;

/// A bidirectional text message transport.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON message.
/// Each call to [`recv`](Transport::recv) returns one complete JSON message.
///
/// # Object Safety
///
/// This trait is object-safe; the client drives `Box<dyn Transport>` values
/// produced by a [`Connector`].
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is used
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling it
/// again must not lose data. Channel-based implementations (e.g., wrapping
/// `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`QuizClientError::TransportSend`] if the message could not be sent
    /// or [`QuizClientError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, message: String) -> Result<(), QuizClientError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete message was received
    /// - `Some(Err(e))` — the connection failed or was closed abnormally
    ///   (e.g. [`QuizClientError::AbnormalClose`]); the client will reconnect
    /// - `None` — the server closed the connection cleanly (code 1000); the
    ///   client will not reconnect
    async fn recv(&mut self) -> Option<Result<String, QuizClientError>>;

    /// Close the transport connection cleanly.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources even if it does.
    async fn close(&mut self) -> Result<(), QuizClientError>;
}

/// Opens transports for the connection manager.
///
/// The URL passed to [`connect`](Connector::connect) already carries the
/// bearer token as its `token` query parameter.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection to `url`.
    ///
    /// # Errors
    ///
    /// Any error is treated as a failed attempt and counts against the
    /// reconnect budget.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, QuizClientError>;
}

/// Strip the query string (which carries the bearer token) from a URL so it
/// can be logged.
#[cfg_attr(not(feature = "tokio-runtime"), allow(dead_code))]
pub(crate) fn redact_query(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(_) => url.split('?').next().unwrap_or_default().to_string(),
    }
}

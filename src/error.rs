//! Error types for the quiz live client.

use thiserror::Error;

/// Errors that can occur when using the quiz live client.
#[derive(Debug, Error)]
pub enum QuizClientError {
    /// `connect` was called without a bearer token.
    ///
    /// This is fatal to the connect attempt and is never retried; the caller
    /// must re-authenticate first.
    #[error("missing authentication token")]
    MissingCredential,

    /// The configured server URL could not be parsed.
    #[error("invalid server URL `{url}`: {reason}")]
    InvalidUrl {
        /// The URL as configured.
        url: String,
        /// Why the URL was rejected.
        reason: String,
    },

    /// Failed to open a connection to the session server.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport was closed with a status other than a clean close.
    #[error("connection closed abnormally (code {code}){}", format_reason(.reason))]
    AbnormalClose {
        /// WebSocket close code (1005 when the peer sent no status).
        code: u16,
        /// Close reason supplied by the peer, if any.
        reason: Option<String>,
    },

    /// The transport connection was already closed locally.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An inbound frame did not decode into a known message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection is not open; the message was dropped.
    #[error("not connected to server")]
    NotConnected,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,
}

fn format_reason(reason: &Option<String>) -> String {
    match reason {
        Some(reason) if !reason.is_empty() => format!(": {reason}"),
        _ => String::new(),
    }
}

/// Reasons an inbound frame is rejected by [`ServerMessage::decode`].
///
/// None of these end the session: the transport loop logs and drops the frame.
///
/// [`ServerMessage::decode`]: crate::protocol::ServerMessage::decode
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not a JSON object with a string `type` field.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The `type` discriminator is not one this client understands.
    #[error("unknown message type `{0}`")]
    UnknownType(String),

    /// The `type` is known but the payload does not match its schema.
    #[error("invalid `{kind}` payload: {source}")]
    InvalidPayload {
        /// The message type whose payload failed validation.
        kind: String,
        /// The underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
}

/// A specialized [`Result`] type for quiz client operations.
pub type Result<T> = std::result::Result<T, QuizClientError>;

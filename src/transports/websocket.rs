//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! This module provides [`WebSocketTransport`], a [`Transport`] implementation
//! that communicates over a WebSocket connection, and [`WebSocketConnector`],
//! the [`Connector`] the client uses to open (and re-open) it. Both `ws://`
//! and `wss://` URLs are supported.
//!
//! # Close codes
//!
//! A close frame with code 1000 (normal closure) ends the stream cleanly and
//! [`recv`](Transport::recv) returns `None`. Any other close, a close frame
//! without a status, or the stream ending without a close frame is reported
//! as [`QuizClientError::AbnormalClose`] so the client reconnects.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), quiz_live_client::QuizClientError> {
//! use quiz_live_client::{Transport, WebSocketTransport};
//!
//! let mut transport = WebSocketTransport::connect("ws://localhost:8080/ws?token=abc").await?;
//! transport.send("hello".to_string()).await?;
//!
//! if let Some(Ok(msg)) = transport.recv().await {
//!     println!("received: {msg}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};

use crate::error::QuizClientError;
use crate::transport::{redact_query, Connector, Transport};

/// Close code reported when the peer sent a close frame without a status.
const CLOSE_NO_STATUS: u16 = 1005;

/// Close code reported when the stream ended without a close frame.
const CLOSE_ABNORMAL: u16 = 1006;

/// Default time allowed for the WebSocket handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Type alias for the underlying WebSocket stream.
///
/// Made public so that callers can construct a [`WebSocketTransport`] from an
/// existing stream via [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] implementation backed by a WebSocket connection.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method is cancel-safe. Dropping the future
/// returned by `recv` before it completes will not consume or lose any messages,
/// making it safe to use inside `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to the given URL.
    ///
    /// # Errors
    ///
    /// Returns [`QuizClientError::ConnectionFailed`] if the URL is invalid,
    /// the server is unreachable, or the handshake is rejected (for example
    /// with HTTP 401 for a revoked token).
    pub async fn connect(url: &str) -> Result<Self, QuizClientError> {
        let redacted = redact_query(url);
        tracing::debug!(url = %redacted, "connecting to WebSocket server");

        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| QuizClientError::ConnectionFailed(e.to_string()))?;

        tracing::info!(url = %redacted, "WebSocket connection established");

        Ok(Self {
            stream,
            closed: false,
        })
    }

    /// Create a [`WebSocketTransport`] from an already-established WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Establish a new WebSocket connection with a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`QuizClientError::Timeout`] if the deadline elapses, or any
    /// error that [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: Duration,
    ) -> Result<Self, QuizClientError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| QuizClientError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), QuizClientError> {
        if self.closed {
            return Err(QuizClientError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| QuizClientError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, QuizClientError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(QuizClientError::TransportReceive(e.to_string())));
                }
                None if self.closed => return None,
                None => {
                    return Some(Err(QuizClientError::AbnormalClose {
                        code: CLOSE_ABNORMAL,
                        reason: None,
                    }));
                }
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(Some(frame)) if frame.code == CloseCode::Normal => {
                    tracing::debug!(reason = %frame.reason, "received normal WebSocket close");
                    return None;
                }
                Message::Close(Some(frame)) => {
                    tracing::debug!(?frame, "received abnormal WebSocket close");
                    let reason = frame.reason.to_string();
                    return Some(Err(QuizClientError::AbnormalClose {
                        code: u16::from(frame.code),
                        reason: (!reason.is_empty()).then_some(reason),
                    }));
                }
                Message::Close(None) => {
                    tracing::debug!("received WebSocket close without status");
                    return Some(Err(QuizClientError::AbnormalClose {
                        code: CLOSE_NO_STATUS,
                        reason: None,
                    }));
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // tungstenite answers pings itself.
                }
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    // Never produced by the read half; kept for exhaustiveness.
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), QuizClientError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "client closed".into(),
        };
        self.stream
            .close(Some(frame))
            .await
            .map_err(|e| QuizClientError::TransportSend(e.to_string()))
    }
}

/// Opens [`WebSocketTransport`]s with a handshake timeout.
///
/// ```
/// use quiz_live_client::WebSocketConnector;
/// use std::time::Duration;
///
/// let connector = WebSocketConnector::new().with_connect_timeout(Duration::from_secs(5));
/// assert_eq!(connector.connect_timeout(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Create a connector with the default 10 second handshake timeout.
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the handshake timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The configured handshake timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, QuizClientError> {
        let transport = WebSocketTransport::connect_with_timeout(url, self.connect_timeout).await?;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
        assert_send::<WebSocketConnector>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, QuizClientError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, QuizClientError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Non-routable address (TEST-NET-1) so the handshake never completes.
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QuizClientError::Timeout));
    }

    // ── Mock-server helpers ─────────────────────────────────────────

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns the address to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    fn close_frame(code: CloseCode, reason: &str) -> Option<CloseFrame> {
        Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })
    }

    // ── Close-code semantics ────────────────────────────────────────

    #[tokio::test]
    async fn recv_returns_none_on_normal_close() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text("hello".into())).await.unwrap();
            ws.close(close_frame(CloseCode::Normal, "bye")).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "hello");
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_reports_going_away_as_abnormal() {
        let url = start_mock_server(|mut ws| async move {
            ws.close(close_frame(CloseCode::Away, "restarting"))
                .await
                .unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let err = transport.recv().await.unwrap().unwrap_err();
        match err {
            QuizClientError::AbnormalClose { code, reason } => {
                assert_eq!(code, 1001);
                assert_eq!(reason.as_deref(), Some("restarting"));
            }
            other => panic!("expected AbnormalClose, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recv_reports_close_without_status_as_abnormal() {
        let url = start_mock_server(|mut ws| async move {
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let err = transport.recv().await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            QuizClientError::AbnormalClose {
                code: CLOSE_NO_STATUS,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn recv_skips_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after_binary".into())).await.unwrap();
            ws.close(close_frame(CloseCode::Normal, "")).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, "after_binary");
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        // Closing twice is fine.
        transport.close().await.unwrap();

        let err = transport.send("oops".to_string()).await.unwrap_err();
        assert!(matches!(err, QuizClientError::TransportClosed));
    }

    #[tokio::test]
    async fn connector_passes_token_query_to_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (uri_tx, uri_rx) = tokio::sync::oneshot::channel::<String>();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let _ = uri_tx.send(req.uri().to_string());
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
                .await
                .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let connector = WebSocketConnector::new();
        let mut transport = connector
            .connect(&format!("ws://{addr}/ws?token=abc.def"))
            .await
            .unwrap();

        let uri = uri_rx.await.unwrap();
        assert_eq!(uri, "/ws?token=abc.def");
        transport.close().await.unwrap();
    }
}

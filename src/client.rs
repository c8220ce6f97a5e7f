//! Async connection manager for live quiz sessions.
//!
//! [`QuizClient`] is a thin handle over a background supervisor task. The
//! supervisor opens a transport through the configured [`Connector`], runs
//! the send/receive loop, and on an abnormal close waits a fixed delay and
//! tries again until the reconnect budget is spent. Server messages are
//! applied to a shared [`QuizSession`] and surfaced as [`QuizEvent`]s on the
//! bounded channel returned from [`QuizClient::new`].
//!
//! # Example
//!
//! ```rust,ignore
//! let config = QuizClientConfig::new("wss://quiz.example.com/ws", "user-7");
//! let (mut client, mut events) = QuizClient::new(WebSocketConnector::new(), config);
//! client.connect(&token).await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         QuizEvent::Connected => {
//!             client.join_room("quiz-42", SessionRole::Participant).await?;
//!         }
//!         QuizEvent::QuestionChanged { question } => { /* render it */ }
//!         QuizEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ProtocolError, QuizClientError, Result};
use crate::event::QuizEvent;
use crate::leaderboard::Standing;
use crate::protocol::{ClientMessage, LiveParticipant, ServerMessage, SessionRole, UserId};
use crate::question::ActiveQuestion;
use crate::room::RoomStatus;
use crate::session::{QuizSession, SkipReason};
use crate::transport::{redact_query, Connector, Transport};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful disconnect.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default wait between reconnect attempts.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Default reconnect budget per connection.
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`QuizClient`].
///
/// # Example
///
/// ```
/// use quiz_live_client::QuizClientConfig;
/// use std::time::Duration;
///
/// let config = QuizClientConfig::new("wss://quiz.example.com/ws", "user-7")
///     .with_reconnect_delay(Duration::from_secs(1))
///     .with_max_reconnect_attempts(10);
/// assert_eq!(config.max_reconnect_attempts, 10);
/// assert!(config.rejoin_on_reconnect);
/// ```
#[derive(Debug, Clone)]
pub struct QuizClientConfig {
    /// Session server endpoint. The bearer token is appended as a `token`
    /// query parameter on every connection attempt.
    pub server_url: String,
    /// The authenticated user this client acts for.
    pub user_id: UserId,
    /// Fixed wait before each reconnect attempt. Defaults to **3 seconds**.
    pub reconnect_delay: Duration,
    /// Reconnect attempts allowed after a connection is lost. The counter
    /// resets whenever a connection opens. Defaults to **5**.
    pub max_reconnect_attempts: u32,
    /// Resend `JOIN_ROOM` for the previous room after a reconnect.
    /// Defaults to **true**.
    pub rejoin_on_reconnect: bool,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer falls behind, events are dropped with a warning so
    /// the connection loop never blocks. `Disconnected` is always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`QuizClient::disconnect`] waits for the background task
    /// before aborting it. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl QuizClientConfig {
    /// Create a configuration with default tuning.
    pub fn new(server_url: impl Into<String>, user_id: impl Into<UserId>) -> Self {
        Self {
            server_url: server_url.into(),
            user_id: user_id.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            rejoin_on_reconnect: true,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the fixed wait before each reconnect attempt.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the reconnect budget. Zero disables reconnecting.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Choose whether to resend `JOIN_ROOM` for the previous room after a
    /// reconnect.
    #[must_use]
    pub fn with_rejoin_on_reconnect(mut self, rejoin: bool) -> Self {
        self.rejoin_on_reconnect = rejoin;
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful disconnect. A zero timeout aborts the
    /// background task immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The endpoint URL with `token` attached as a query parameter.
    ///
    /// # Errors
    ///
    /// Returns [`QuizClientError::InvalidUrl`] if `server_url` does not parse.
    pub fn connection_url(&self, token: &str) -> Result<String> {
        let mut url =
            url::Url::parse(&self.server_url).map_err(|e| QuizClientError::InvalidUrl {
                url: self.server_url.clone(),
                reason: e.to_string(),
            })?;
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != "token")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("token", token);
        Ok(url.into())
    }
}

// ── Connection status ───────────────────────────────────────────────

/// Lifecycle of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionStatus {
    /// `connect` has not been called yet.
    Idle = 0,
    /// First connection attempt in flight.
    Connecting = 1,
    /// Transport open.
    Open = 2,
    /// Connection lost; waiting for or running a reconnect attempt.
    Reconnecting = 3,
    /// Stopped: disconnected on request, closed cleanly by the server, or
    /// reconnect budget spent.
    Closed = 4,
}

impl ConnectionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Reconnecting,
            4 => Self::Closed,
            _ => Self::Idle,
        }
    }

    /// Whether a connection is open or being established.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Open | Self::Reconnecting)
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the client handle and the supervisor task.
struct ClientState {
    status: AtomicU8,
    reconnect_attempts: AtomicU32,
    connection_error: Mutex<Option<String>>,
    session: Mutex<QuizSession>,
}

impl ClientState {
    fn new(user_id: UserId) -> Self {
        Self {
            status: AtomicU8::new(ConnectionStatus::Idle as u8),
            reconnect_attempts: AtomicU32::new(0),
            connection_error: Mutex::new(None),
            session: Mutex::new(QuizSession::new(user_id)),
        }
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status as u8, Ordering::Release);
    }
}

/// Result of a user action that may or may not put a message on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The message was queued for sending.
    Sent,
    /// Nothing was sent, for the given reason.
    Skipped(SkipReason),
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a managed quiz session connection.
///
/// Created with [`QuizClient::new`], which also returns the event receiver.
/// Nothing touches the network until [`connect`](QuizClient::connect).
///
/// Action methods queue their message for the background task and return
/// once it is queued; they never wait for a server round trip.
pub struct QuizClient {
    connector: Arc<dyn Connector>,
    config: QuizClientConfig,
    state: Arc<ClientState>,
    event_tx: mpsc::Sender<QuizEvent>,
    /// Command channel into the current supervisor, if one was started.
    cmd_tx: Option<mpsc::UnboundedSender<ClientMessage>>,
    task: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl QuizClient {
    /// Create an idle client and its event receiver.
    ///
    /// The receiver yields [`QuizEvent`]s for as long as the client handle
    /// lives, across any number of connections.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn new(
        connector: impl Connector,
        config: QuizClientConfig,
    ) -> (Self, mpsc::Receiver<QuizEvent>) {
        // tokio panics on a zero-capacity channel.
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<QuizEvent>(capacity);
        let state = Arc::new(ClientState::new(config.user_id.clone()));

        let client = Self {
            connector: Arc::new(connector),
            config,
            state,
            event_tx,
            cmd_tx: None,
            task: None,
            shutdown_tx: None,
        };
        (client, event_rx)
    }

    /// Open the connection using `token` and keep it open.
    ///
    /// Returns as soon as the background task is started; watch for
    /// [`QuizEvent::Connected`]. Calling this while a connection is open or
    /// being established does nothing, so at most one socket exists.
    ///
    /// # Errors
    ///
    /// - [`QuizClientError::MissingCredential`] if `token` is blank
    /// - [`QuizClientError::InvalidUrl`] if the configured URL does not parse
    ///
    /// Both are also recorded as the [`connection_error`](Self::connection_error)
    /// and reported as [`QuizEvent::ConnectionError`]; no connection is
    /// attempted.
    pub async fn connect(&mut self, token: &str) -> Result<()> {
        let status = self.status();
        if status.is_active() {
            debug!("connect ignored: connection already {status:?}");
            return Ok(());
        }

        let url = if token.trim().is_empty() {
            Err(QuizClientError::MissingCredential)
        } else {
            self.config.connection_url(token)
        };
        let url = match url {
            Ok(url) => url,
            Err(e) => {
                error!("cannot connect: {e}");
                *self.state.connection_error.lock().await = Some(e.to_string());
                emit_event(
                    &self.event_tx,
                    QuizEvent::ConnectionError {
                        message: e.to_string(),
                    },
                )
                .await;
                return Err(e);
            }
        };

        // A previous supervisor has finished (status is not active); drop it.
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        self.state.reconnect_attempts.store(0, Ordering::Release);
        self.state.set_status(ConnectionStatus::Connecting);

        let task = tokio::spawn(supervise(
            Arc::clone(&self.connector),
            url,
            self.config.clone(),
            cmd_rx,
            self.event_tx.clone(),
            Arc::clone(&self.state),
            shutdown_rx,
        ));

        self.cmd_tx = Some(cmd_tx);
        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(task);
        Ok(())
    }

    /// Close the connection on purpose and stop reconnecting.
    ///
    /// Session state is cleared entirely, including the room to rejoin.
    /// [`connect`](Self::connect) may be called again afterwards.
    pub async fn disconnect(&mut self) {
        debug!("QuizClient: disconnect requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Give the supervisor time to close the transport, then abort it so
        // the task cannot outlive the request.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("connection task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("connection task did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("connection task aborted: {join_err}");
                    }
                }
            }
        }

        self.cmd_tx = None;
        self.state.session.lock().await.clear();
        if self.status() != ConnectionStatus::Idle {
            self.state.set_status(ConnectionStatus::Closed);
        }
    }

    /// Disconnect and consume the handle.
    ///
    /// Use this when the session is over for good (for example on logout).
    /// The event receiver still yields the final `Disconnected`.
    pub async fn shutdown(mut self) {
        debug!("QuizClient: shutdown requested");
        self.disconnect().await;
    }

    // ── Room and quiz actions ───────────────────────────────────────

    /// Join the room for `quiz_id`.
    ///
    /// A repeat request for the room being joined is skipped. Joining a
    /// different room switches to it.
    ///
    /// # Errors
    ///
    /// Returns [`QuizClientError::NotConnected`] if no connection is open.
    /// Room state is left as it was, so the join can be retried.
    pub async fn join_room(&self, quiz_id: impl Into<String>, role: SessionRole) -> Result<Outcome> {
        if !self.is_connected() {
            self.drop_message("JOIN_ROOM").await;
            return Err(QuizClientError::NotConnected);
        }
        // Hold the session across the send so a connection loss cannot reset
        // the room between entering `Joining` and queueing the message.
        let mut session = self.state.session.lock().await;
        let message = match session.join_room(quiz_id, role) {
            Ok(message) => message,
            Err(reason) => {
                debug!("join skipped: {reason}");
                return Ok(Outcome::Skipped(reason));
            }
        };
        if let Err(e) = self.send_message(message).await {
            session.abandon_join();
            return Err(e);
        }
        Ok(Outcome::Sent)
    }

    /// Answer the active question with option `index` (0-based).
    ///
    /// The question counts as answered from this call on, even if the
    /// message then fails to send.
    ///
    /// # Errors
    ///
    /// Returns [`QuizClientError::NotConnected`] if the answer could not be
    /// queued.
    pub async fn select_answer(&self, index: usize) -> Result<Outcome> {
        let message = self.state.session.lock().await.select_answer(index);
        self.dispatch(message).await
    }

    /// Report that the active question's countdown expired unanswered.
    ///
    /// # Errors
    ///
    /// Returns [`QuizClientError::NotConnected`] if the timeout could not be
    /// queued.
    pub async fn time_out(&self) -> Result<Outcome> {
        let message = self.state.session.lock().await.time_out();
        self.dispatch(message).await
    }

    /// Host: start the quiz.
    ///
    /// # Errors
    ///
    /// Returns [`QuizClientError::NotConnected`] if no connection is open.
    pub async fn start_quiz(&self) -> Result<Outcome> {
        let message = self.state.session.lock().await.start_quiz();
        self.dispatch(message).await
    }

    /// Host: advance to the next question.
    ///
    /// # Errors
    ///
    /// Returns [`QuizClientError::NotConnected`] if no connection is open.
    pub async fn next_question(&self) -> Result<Outcome> {
        let message = self.state.session.lock().await.next_question();
        self.dispatch(message).await
    }

    /// Host: end the quiz.
    ///
    /// # Errors
    ///
    /// Returns [`QuizClientError::NotConnected`] if no connection is open.
    pub async fn end_quiz(&self) -> Result<Outcome> {
        let message = self.state.session.lock().await.end_quiz();
        self.dispatch(message).await
    }

    /// Send a raw message.
    ///
    /// Messages are never buffered while disconnected: if no connection is
    /// open the message is discarded, [`QuizEvent::MessageDropped`] is
    /// emitted, and this returns an error.
    ///
    /// # Errors
    ///
    /// Returns [`QuizClientError::NotConnected`] if no connection is open.
    pub async fn send_message(&self, message: ClientMessage) -> Result<()> {
        let kind = message.kind();
        let queued = self.is_connected()
            && self
                .cmd_tx
                .as_ref()
                .is_some_and(|tx| tx.send(message).is_ok());
        if queued {
            Ok(())
        } else {
            self.drop_message(kind).await;
            Err(QuizClientError::NotConnected)
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Current connection lifecycle status.
    pub fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    /// Returns `true` while the transport is open.
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    /// Returns `true` while a connection attempt is in flight or scheduled.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self.status(),
            ConnectionStatus::Connecting | ConnectionStatus::Reconnecting
        )
    }

    /// Reconnect attempts made since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.state.reconnect_attempts.load(Ordering::Acquire)
    }

    /// The configured reconnect budget.
    pub fn max_reconnect_attempts(&self) -> u32 {
        self.config.max_reconnect_attempts
    }

    /// Reconnect attempts left before the client gives up.
    pub fn attempts_remaining(&self) -> u32 {
        self.config
            .max_reconnect_attempts
            .saturating_sub(self.reconnect_attempts())
    }

    /// The most recent connection failure, cleared when a connection opens.
    pub async fn connection_error(&self) -> Option<String> {
        self.state.connection_error.lock().await.clone()
    }

    /// Membership phase of the room slice.
    pub async fn room_status(&self) -> RoomStatus {
        self.state.session.lock().await.room().status()
    }

    /// Participants currently in the room, ordered by id.
    pub async fn participants(&self) -> Vec<LiveParticipant> {
        self.state
            .session
            .lock()
            .await
            .room()
            .participants()
            .cloned()
            .collect()
    }

    /// A copy of the question currently live, if any.
    pub async fn active_question(&self) -> Option<ActiveQuestion> {
        self.state
            .session
            .lock()
            .await
            .question_cycle()
            .active_question()
            .cloned()
    }

    /// Whether the live question was already answered or timed out.
    pub async fn has_answered(&self) -> bool {
        self.state.session.lock().await.question_cycle().has_answered()
    }

    /// The caller's rank from the latest leaderboard snapshot.
    pub async fn rank(&self) -> Option<u32> {
        self.state.session.lock().await.leaderboard().rank()
    }

    /// The caller's score from the latest leaderboard snapshot.
    pub async fn total_score(&self) -> u64 {
        self.state.session.lock().await.leaderboard().total_score()
    }

    /// The top `n` leaderboard rows joined with participant names.
    pub async fn standings(&self, n: usize) -> Vec<Standing> {
        let session = self.state.session.lock().await;
        session.leaderboard().standings(session.room(), n)
    }

    /// Read the full session state under its lock.
    pub async fn with_session<R>(&self, f: impl FnOnce(&QuizSession) -> R) -> R {
        let session = self.state.session.lock().await;
        f(&*session)
    }

    // ── Internal helpers ────────────────────────────────────────────

    async fn dispatch(&self, message: std::result::Result<ClientMessage, SkipReason>) -> Result<Outcome> {
        match message {
            Ok(message) => {
                self.send_message(message).await?;
                Ok(Outcome::Sent)
            }
            Err(reason) => {
                debug!("action skipped: {reason}");
                Ok(Outcome::Skipped(reason))
            }
        }
    }

    async fn drop_message(&self, kind: &'static str) {
        warn!("connection not open, dropping {kind} message");
        emit_event(&self.event_tx, QuizEvent::MessageDropped { kind }).await;
    }
}

impl std::fmt::Debug for QuizClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuizClient")
            .field("status", &self.status())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for QuizClient {
    fn drop(&mut self) {
        // No executor is available here to drive a graceful close, so the
        // only option is to abort the task and drop the transport with it.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Supervisor ──────────────────────────────────────────────────────

/// How a single open connection ended.
enum ConnectionEnd {
    /// Disconnect requested through the handle.
    Shutdown,
    /// The handle's command sender is gone.
    HandleDropped,
    /// The server closed with code 1000.
    ClosedCleanly,
    /// Abnormal close or I/O failure; eligible for reconnect.
    Lost(String),
}

/// Connect, run, and reconnect until stopped or out of attempts.
async fn supervise(
    connector: Arc<dyn Connector>,
    url: String,
    config: QuizClientConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::Sender<QuizEvent>,
    state: Arc<ClientState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let endpoint = redact_query(&url);
    debug!("connection supervisor started for {endpoint}");

    loop {
        let attempt = tokio::select! {
            result = connector.connect(&url) => result,
            _ = &mut shutdown_rx => {
                debug!("disconnect requested while connecting");
                emit_disconnected(&event_tx, &state, Some("client disconnected".into())).await;
                return;
            }
        };

        match attempt {
            Ok(mut transport) => {
                info!("connected to {endpoint}");
                discard_stale_commands(&mut cmd_rx);
                state.reconnect_attempts.store(0, Ordering::Release);
                state.set_status(ConnectionStatus::Open);
                *state.connection_error.lock().await = None;
                emit_event(&event_tx, QuizEvent::Connected).await;

                let end = run_connection(
                    transport.as_mut(),
                    &config,
                    &mut cmd_rx,
                    &event_tx,
                    &state,
                    &mut shutdown_rx,
                )
                .await;

                match end {
                    ConnectionEnd::Shutdown | ConnectionEnd::HandleDropped => {
                        if let Err(e) = transport.close().await {
                            debug!("error closing transport: {e}");
                        }
                        emit_disconnected(&event_tx, &state, Some("client disconnected".into()))
                            .await;
                        return;
                    }
                    ConnectionEnd::ClosedCleanly => {
                        info!("server closed the connection");
                        emit_disconnected(&event_tx, &state, None).await;
                        return;
                    }
                    ConnectionEnd::Lost(reason) => {
                        warn!("connection lost: {reason}");
                        // Leave `Open` first so the handle stops queueing.
                        state.set_status(ConnectionStatus::Reconnecting);
                        state.session.lock().await.on_disconnect();
                        discard_stale_commands(&mut cmd_rx);
                        *state.connection_error.lock().await = Some(reason.clone());
                        emit_event(&event_tx, QuizEvent::ConnectionLost { reason }).await;
                    }
                }
            }
            Err(e) => {
                warn!("connection attempt to {endpoint} failed: {e}");
                *state.connection_error.lock().await = Some(e.to_string());
                emit_event(
                    &event_tx,
                    QuizEvent::ConnectionError {
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }

        let made = state.reconnect_attempts.load(Ordering::Acquire);
        if made >= config.max_reconnect_attempts {
            error!("giving up after {made} reconnect attempts");
            emit_event(&event_tx, QuizEvent::ReconnectAbandoned { attempts: made }).await;
            emit_disconnected(
                &event_tx,
                &state,
                Some(format!("reconnect abandoned after {made} attempts")),
            )
            .await;
            return;
        }

        let attempt = made + 1;
        state.reconnect_attempts.store(attempt, Ordering::Release);
        state.set_status(ConnectionStatus::Reconnecting);
        info!(
            "reconnecting in {:?} (attempt {attempt}/{})",
            config.reconnect_delay, config.max_reconnect_attempts
        );
        emit_event(
            &event_tx,
            QuizEvent::Reconnecting {
                attempt,
                max_attempts: config.max_reconnect_attempts,
                delay: config.reconnect_delay,
            },
        )
        .await;

        tokio::select! {
            () = tokio::time::sleep(config.reconnect_delay) => {}
            _ = &mut shutdown_rx => {
                debug!("disconnect requested while waiting to reconnect");
                emit_disconnected(&event_tx, &state, Some("client disconnected".into())).await;
                return;
            }
        }
    }
}

/// Multiplex outbound commands, inbound frames and the shutdown signal over
/// one open transport.
async fn run_connection(
    transport: &mut dyn Transport,
    config: &QuizClientConfig,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: &mpsc::Sender<QuizEvent>,
    state: &ClientState,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> ConnectionEnd {
    if config.rejoin_on_reconnect {
        let rejoin = state.session.lock().await.rejoin();
        if let Some(message) = rejoin {
            if let Err(end) = send_to(transport, &message).await {
                return end;
            }
        }
    }

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(message) => {
                        if let Err(end) = send_to(transport, &message).await {
                            return end;
                        }
                    }
                    None => {
                        debug!("command channel closed, stopping connection");
                        return ConnectionEnd::HandleDropped;
                    }
                }
            }

            _ = &mut *shutdown_rx => {
                debug!("disconnect signal received");
                return ConnectionEnd::Shutdown;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => handle_frame(&text, state, event_tx).await,
                    Some(Err(e)) => return ConnectionEnd::Lost(e.to_string()),
                    None => return ConnectionEnd::ClosedCleanly,
                }
            }
        }
    }
}

async fn send_to(
    transport: &mut dyn Transport,
    message: &ClientMessage,
) -> std::result::Result<(), ConnectionEnd> {
    debug!("sending {} message", message.kind());
    match message.encode() {
        Ok(json) => transport
            .send(json)
            .await
            .map_err(|e| ConnectionEnd::Lost(format!("transport send error: {e}"))),
        Err(e) => {
            // Our own types always serialize; keep the connection.
            error!("failed to serialize {} message: {e}", message.kind());
            Ok(())
        }
    }
}

/// Decode one frame and apply it to the session.
async fn handle_frame(text: &str, state: &ClientState, event_tx: &mpsc::Sender<QuizEvent>) {
    let message = match ServerMessage::decode(text) {
        Ok(message) => message,
        Err(ProtocolError::UnknownType(kind)) => {
            debug!("ignoring unrecognized message type {kind:?}");
            return;
        }
        Err(e) => {
            warn!("discarding invalid server message: {e}; raw: {text}");
            return;
        }
    };
    debug!("received {} message", message.kind());
    let events = state.session.lock().await.apply(message);
    for event in events {
        emit_event(event_tx, event).await;
    }
}

/// Messages queued for a connection that has since dropped are not replayed.
fn discard_stale_commands(cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>) {
    while let Ok(message) = cmd_rx.try_recv() {
        warn!("discarding {} message queued before connection loss", message.kind());
    }
}

/// Emit an event. If the channel is full, log a warning and drop the event
/// rather than stall the connection loop.
async fn emit_event(event_tx: &mpsc::Sender<QuizEvent>, event: QuizEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Final event of a supervisor run. Uses `send().await` so it is never
/// dropped for lack of capacity.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<QuizEvent>,
    state: &ClientState,
    reason: Option<String>,
) {
    state.set_status(ConnectionStatus::Closed);
    state.session.lock().await.on_disconnect();
    if event_tx.send(QuizEvent::Disconnected { reason }).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex as StdMutex;

    type Script = Vec<Option<std::result::Result<String, QuizClientError>>>;

    /// Records sent frames and replays scripted inbound ones, then hangs.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, QuizClientError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), QuizClientError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, QuizClientError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), QuizClientError> {
            self.closed.store(true, Ordering::Release);
            Ok(())
        }
    }

    /// Hands out one scripted transport per `connect` call; fails once the
    /// scripts run out.
    struct MockConnector {
        scripts: StdMutex<VecDeque<Script>>,
        calls: Arc<AtomicUsize>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    struct Probe {
        calls: Arc<AtomicUsize>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockConnector {
        fn new(scripts: Vec<Script>) -> (Self, Probe) {
            let calls = Arc::new(AtomicUsize::new(0));
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let probe = Probe {
                calls: Arc::clone(&calls),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            let connector = Self {
                scripts: StdMutex::new(scripts.into()),
                calls,
                sent,
                closed,
            };
            (connector, probe)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(
            &self,
            _url: &str,
        ) -> std::result::Result<Box<dyn Transport>, QuizClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().unwrap().pop_front();
            match script {
                Some(incoming) => Ok(Box::new(MockTransport {
                    incoming: incoming.into(),
                    sent: Arc::clone(&self.sent),
                    closed: Arc::clone(&self.closed),
                })),
                None => Err(QuizClientError::ConnectionFailed("connection refused".into())),
            }
        }
    }

    fn config() -> QuizClientConfig {
        QuizClientConfig::new("ws://quiz.test/ws", "u1")
            .with_reconnect_delay(Duration::from_millis(10))
            .with_shutdown_timeout(Duration::from_millis(200))
    }

    fn frame(value: serde_json::Value) -> Option<std::result::Result<String, QuizClientError>> {
        Some(Ok(value.to_string()))
    }

    fn abnormal() -> Option<std::result::Result<String, QuizClientError>> {
        Some(Err(QuizClientError::AbnormalClose {
            code: 1006,
            reason: None,
        }))
    }

    async fn next_event(events: &mut mpsc::Receiver<QuizEvent>) -> QuizEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    fn sent_kinds(probe: &Probe) -> Vec<String> {
        probe
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| {
                let value: serde_json::Value = serde_json::from_str(text).unwrap();
                value["type"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn config_defaults() {
        let config = QuizClientConfig::new("wss://quiz.example.com/ws", "u1");
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert!(config.rejoin_on_reconnect);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = config().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn connection_url_appends_token() {
        let config = QuizClientConfig::new("wss://quiz.example.com/ws?v=2&token=stale", "u1");
        assert_eq!(
            config.connection_url("abc").unwrap(),
            "wss://quiz.example.com/ws?v=2&token=abc"
        );
    }

    #[test]
    fn connection_url_rejects_garbage() {
        let config = QuizClientConfig::new("not a url", "u1");
        assert!(matches!(
            config.connection_url("abc"),
            Err(QuizClientError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn status_round_trips_through_atomic() {
        let state = ClientState::new("u1".into());
        for status in [
            ConnectionStatus::Idle,
            ConnectionStatus::Connecting,
            ConnectionStatus::Open,
            ConnectionStatus::Reconnecting,
            ConnectionStatus::Closed,
        ] {
            state.set_status(status);
            assert_eq!(state.status(), status);
        }
    }

    #[tokio::test]
    async fn blank_token_never_connects() {
        let (connector, probe) = MockConnector::new(vec![vec![]]);
        let (mut client, mut events) = QuizClient::new(connector, config());

        let err = client.connect("   ").await.unwrap_err();
        assert!(matches!(err, QuizClientError::MissingCredential));
        assert_eq!(client.status(), ConnectionStatus::Idle);
        assert!(client.connection_error().await.is_some());
        assert!(matches!(
            next_event(&mut events).await,
            QuizEvent::ConnectionError { .. }
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn connect_is_idempotent_while_active() {
        let (connector, probe) = MockConnector::new(vec![vec![]]);
        let (mut client, mut events) = QuizClient::new(connector, config());

        client.connect("token").await.unwrap();
        client.connect("token").await.unwrap();
        assert_eq!(next_event(&mut events).await, QuizEvent::Connected);
        client.connect("token").await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert!(client.is_connected());

        client.disconnect().await;
        assert!(probe.closed.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn reconnects_after_abnormal_close_and_resets_counter() {
        let (connector, probe) = MockConnector::new(vec![vec![abnormal()], vec![]]);
        let (mut client, mut events) = QuizClient::new(connector, config());
        client.connect("token").await.unwrap();

        assert_eq!(next_event(&mut events).await, QuizEvent::Connected);
        assert!(matches!(
            next_event(&mut events).await,
            QuizEvent::ConnectionLost { .. }
        ));
        assert!(matches!(
            next_event(&mut events).await,
            QuizEvent::Reconnecting { attempt: 1, max_attempts: 5, .. }
        ));
        assert_eq!(next_event(&mut events).await, QuizEvent::Connected);
        assert_eq!(client.reconnect_attempts(), 0);
        assert_eq!(client.attempts_remaining(), 5);
        assert_eq!(client.connection_error().await, None);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);

        client.disconnect().await;
    }

    #[tokio::test]
    async fn clean_close_does_not_reconnect() {
        let (connector, probe) = MockConnector::new(vec![vec![None], vec![]]);
        let (mut client, mut events) = QuizClient::new(connector, config());
        client.connect("token").await.unwrap();

        assert_eq!(next_event(&mut events).await, QuizEvent::Connected);
        assert_eq!(
            next_event(&mut events).await,
            QuizEvent::Disconnected { reason: None }
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.status(), ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (connector, probe) = MockConnector::new(vec![]);
        let (mut client, mut events) =
            QuizClient::new(connector, config().with_max_reconnect_attempts(3));
        client.connect("token").await.unwrap();

        let mut reconnecting = 0;
        loop {
            match next_event(&mut events).await {
                QuizEvent::Reconnecting { .. } => reconnecting += 1,
                QuizEvent::ReconnectAbandoned { attempts } => {
                    assert_eq!(attempts, 3);
                    break;
                }
                QuizEvent::ConnectionError { .. } => {}
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(matches!(
            next_event(&mut events).await,
            QuizEvent::Disconnected { reason: Some(_) }
        ));
        assert_eq!(reconnecting, 3);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
        assert_eq!(client.status(), ConnectionStatus::Closed);
        assert_eq!(client.attempts_remaining(), 0);
        assert!(client.connection_error().await.is_some());

        client.disconnect().await;
    }

    #[tokio::test]
    async fn send_while_disconnected_is_dropped() {
        let (connector, _probe) = MockConnector::new(vec![]);
        let (client, mut events) = QuizClient::new(connector, config());

        let err = client
            .join_room("quiz-42", SessionRole::Participant)
            .await
            .unwrap_err();
        assert!(matches!(err, QuizClientError::NotConnected));
        assert_eq!(
            next_event(&mut events).await,
            QuizEvent::MessageDropped { kind: "JOIN_ROOM" }
        );
        assert_eq!(client.room_status().await, RoomStatus::NotJoined);
    }

    #[tokio::test]
    async fn join_that_fails_to_queue_leaves_room_retryable() {
        let (connector, _probe) = MockConnector::new(vec![]);
        let (client, mut events) = QuizClient::new(connector, config());
        // Status still reads `Open` but the command channel is gone, as when
        // the connection drops between the status check and the send.
        client.state.set_status(ConnectionStatus::Open);

        for _ in 0..2 {
            let err = client
                .join_room("quiz-42", SessionRole::Participant)
                .await
                .unwrap_err();
            assert!(matches!(err, QuizClientError::NotConnected));
            assert_eq!(
                next_event(&mut events).await,
                QuizEvent::MessageDropped { kind: "JOIN_ROOM" }
            );
            assert_eq!(client.room_status().await, RoomStatus::NotJoined);
        }
        assert!(client.state.session.lock().await.rejoin().is_none());
    }

    #[tokio::test]
    async fn join_sends_once_and_roster_joins() {
        let roster = serde_json::json!({
            "type": "USERS_IN_ROOM",
            "payload": { "users": [{ "id": "u1", "name": "Ann", "email": "ann@example.com" }] }
        });
        let (connector, probe) = MockConnector::new(vec![vec![]]);
        let (mut client, mut events) = QuizClient::new(connector, config());
        client.connect("token").await.unwrap();
        assert_eq!(next_event(&mut events).await, QuizEvent::Connected);

        assert_eq!(
            client.join_room("quiz-42", SessionRole::Participant).await.unwrap(),
            Outcome::Sent
        );
        assert_eq!(
            client.join_room("quiz-42", SessionRole::Participant).await.unwrap(),
            Outcome::Skipped(SkipReason::AlreadyJoining)
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(sent_kinds(&probe), ["JOIN_ROOM"]);

        // Feed the roster through the session the same way the loop does.
        handle_frame(&roster.to_string(), &client.state, &client.event_tx).await;
        assert!(matches!(
            next_event(&mut events).await,
            QuizEvent::RoomJoined { ref quiz_id, .. } if quiz_id == "quiz-42"
        ));
        assert_eq!(client.room_status().await, RoomStatus::Joined);
        assert_eq!(client.participants().await.len(), 1);

        client.disconnect().await;
        assert_eq!(client.room_status().await, RoomStatus::NotJoined);
    }

    #[tokio::test]
    async fn invalid_frames_do_not_kill_connection() {
        let (connector, _probe) = MockConnector::new(vec![vec![
            Some(Ok("not json".into())),
            frame(serde_json::json!({ "type": "PING" })),
            frame(serde_json::json!({ "type": "ERROR", "payload": { "message": "slow down", "code": "RATE_LIMIT_EXCEEDED" } })),
        ]]);
        let (mut client, mut events) = QuizClient::new(connector, config());
        client.connect("token").await.unwrap();

        assert_eq!(next_event(&mut events).await, QuizEvent::Connected);
        assert!(matches!(
            next_event(&mut events).await,
            QuizEvent::ServerError { code: Some(crate::ErrorCode::RateLimitExceeded), .. }
        ));
        assert!(client.is_connected());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_emits_disconnected_and_stops() {
        let (connector, probe) = MockConnector::new(vec![vec![]]);
        let (mut client, mut events) = QuizClient::new(connector, config());
        client.connect("token").await.unwrap();
        assert_eq!(next_event(&mut events).await, QuizEvent::Connected);

        client.disconnect().await;
        assert!(matches!(
            next_event(&mut events).await,
            QuizEvent::Disconnected { reason: Some(_) }
        ));
        assert_eq!(client.status(), ConnectionStatus::Closed);
        assert!(probe.closed.load(Ordering::Acquire));

        // Double disconnect is harmless.
        client.disconnect().await;
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (connector, _probe) = MockConnector::new(vec![]);
        let (client, _events) = QuizClient::new(connector, config());
        let debug = format!("{client:?}");
        assert!(debug.contains("QuizClient"));
        assert!(debug.contains("Idle"));
    }
}

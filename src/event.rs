//! Events surfaced to the application.

use std::time::Duration;

use crate::error_codes::ErrorCode;
use crate::leaderboard::ScoreboardSnapshot;
use crate::protocol::{AttemptId, LiveParticipant, QuizId, UserId};
use crate::question::ActiveQuestion;

/// Everything the client reports on its event channel.
///
/// Connection lifecycle events come from the connection manager; the rest
/// are produced by applying server messages to the session state. Each
/// event is emitted after the state change it describes, so reading the
/// client's accessors while handling an event sees the new state.
#[derive(Debug, Clone, PartialEq)]
pub enum QuizEvent {
    // ── Connection lifecycle ────────────────────────────────────────
    /// The transport opened. Reconnect attempts were reset to zero.
    Connected,
    /// A connection attempt failed, or `connect` was refused.
    ConnectionError { message: String },
    /// An open connection dropped. Room, question and leaderboard state
    /// has been reset.
    ConnectionLost { reason: String },
    /// Waiting `delay` before reconnect attempt `attempt` of `max_attempts`.
    Reconnecting {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
    /// The reconnect budget is spent; the client stays disconnected until
    /// `connect` is called again.
    ReconnectAbandoned { attempts: u32 },
    /// The connection manager stopped. Always the last lifecycle event.
    Disconnected { reason: Option<String> },
    /// An outbound message was discarded because no connection was open.
    MessageDropped { kind: &'static str },

    // ── Room ────────────────────────────────────────────────────────
    /// The first roster sync after `JOIN_ROOM` arrived.
    RoomJoined {
        quiz_id: QuizId,
        participants: Vec<LiveParticipant>,
    },
    /// A later roster sync replaced the participant list.
    RosterSynced { participants: Vec<LiveParticipant> },
    /// One participant joined or updated their details.
    ParticipantJoined { participant: LiveParticipant },
    /// One participant left.
    ParticipantLeft { user_id: UserId },

    // ── Quiz ────────────────────────────────────────────────────────
    /// The quiz started, or was already running when we joined.
    QuizStarted { attempt_id: AttemptId },
    /// A new question is live; the answered latch is open again.
    QuestionChanged { question: ActiveQuestion },
    /// The quiz is over.
    QuizEnded,
    /// A leaderboard snapshot replaced the previous one.
    LeaderboardUpdated { snapshot: ScoreboardSnapshot },
    /// The server reported an error for something this client did.
    ServerError {
        message: String,
        code: Option<ErrorCode>,
    },
}

//! Wire protocol types for live quiz sessions.
//!
//! Every message travels as one JSON text frame shaped as a tagged envelope:
//!
//! ```json
//! { "type": "JOIN_ROOM", "payload": { "quizId": "quiz-42", "userId": "u1", "isHost": false } }
//! ```
//!
//! The `type` discriminator selects the variant and `payload` carries its
//! camelCase fields. Inbound frames are validated against the variant schema
//! in [`ServerMessage::decode`]; anything that does not fit is rejected with a
//! [`ProtocolError`] rather than trusted.
//!
//! The flatter `{type, data}` envelope and the flat `{userId: score}`
//! leaderboard map seen in older servers are not accepted here. See
//! [`ScoreboardSnapshot::from_scores`](crate::leaderboard::ScoreboardSnapshot::from_scores)
//! for migrating code that still holds the flat map.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, QuizClientError};
use crate::error_codes::ErrorCode;

// ── Type aliases ────────────────────────────────────────────────────

/// Externally assigned quiz (room) identifier.
pub type QuizId = String;

/// Identifier of an authenticated user.
pub type UserId = String;

/// Server-issued identifier scoping one participant's run through a quiz.
pub type AttemptId = String;

/// Identifier of a single question.
pub type QuestionId = String;

// ── Enums ───────────────────────────────────────────────────────────

/// The acting client's role inside a quiz room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionRole {
    /// The instructor running the quiz; may start it and advance questions.
    Host,
    /// A student answering questions.
    #[default]
    Participant,
}

impl SessionRole {
    /// Returns `true` for [`SessionRole::Host`].
    pub fn is_host(self) -> bool {
        matches!(self, Self::Host)
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// A member currently present in a quiz room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveParticipant {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub is_host: bool,
    /// Running total as last reported with the roster; eventually consistent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,
}

/// One row of a leaderboard broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub user_id: UserId,
    pub score: u64,
}

/// The caller's own standing, computed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfScore {
    pub score: u64,
    /// 1-based rank; 1 is the leader.
    pub rank: u32,
}

// ── Outbound payloads ───────────────────────────────────────────────

/// Payload for [`ClientMessage::JoinRoom`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    pub quiz_id: QuizId,
    pub user_id: UserId,
    pub is_host: bool,
}

/// Payload for [`ClientMessage::Answer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub quiz_id: QuizId,
    pub attempt_id: AttemptId,
    pub user_id: UserId,
    pub question_id: QuestionId,
    /// 0-based index into the question's options.
    pub answer: usize,
}

/// Payload for [`ClientMessage::Timeout`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutPayload {
    pub quiz_id: QuizId,
    pub attempt_id: AttemptId,
    pub user_id: UserId,
    pub question_id: QuestionId,
}

/// Payload for the host control messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRef {
    pub quiz_id: QuizId,
}

// ── Inbound payloads ────────────────────────────────────────────────

/// Payload for [`ServerMessage::UsersInRoom`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersInRoomPayload {
    pub users: Vec<LiveParticipant>,
}

/// Payload for [`ServerMessage::UserJoined`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserJoinedPayload {
    pub user: LiveParticipant,
}

/// Payload for [`ServerMessage::UserLeft`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftPayload {
    pub user_id: UserId,
}

/// Payload for [`ServerMessage::QuizStarted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizStartedPayload {
    pub attempt_id: AttemptId,
}

/// Payload for [`ServerMessage::NewQuestion`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestionPayload {
    /// Stable question id. Some servers omit it; the client then mints one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<QuestionId>,
    /// The prompt text.
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub marks: u32,
    /// Time allowed for this question, in minutes. May be fractional.
    #[serde(deserialize_with = "non_negative_minutes")]
    pub time_limit: f64,
}

fn non_negative_minutes<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let minutes = f64::deserialize(deserializer)?;
    if minutes.is_finite() && minutes >= 0.0 {
        Ok(minutes)
    } else {
        Err(serde::de::Error::custom(format!(
            "timeLimit must be a non-negative number of minutes, got {minutes}"
        )))
    }
}

/// Payload for [`ServerMessage::QuizEnded`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuizEndedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_id: Option<QuizId>,
}

/// Payload for [`ServerMessage::Leaderboard`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPayload {
    /// Entries already sorted by descending score.
    pub top_players: Vec<ScoreEntry>,
    /// The caller's own standing; absent for hosts, who do not play.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_score: Option<SelfScore>,
}

/// Payload for [`ServerMessage::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Join a quiz room.
    #[serde(rename = "JOIN_ROOM")]
    JoinRoom(JoinRoomPayload),
    /// Answer the active question.
    #[serde(rename = "ANSWER")]
    Answer(AnswerPayload),
    /// The countdown for the active question ran out without an answer.
    #[serde(rename = "timeout")]
    Timeout(TimeoutPayload),
    /// Host: start the quiz.
    #[serde(rename = "START_QUIZ")]
    StartQuiz(QuizRef),
    /// Host: advance to the next question.
    #[serde(rename = "NEXT_QUESTION")]
    NextQuestion(QuizRef),
    /// Host: end the quiz.
    #[serde(rename = "END_QUIZ")]
    EndQuiz(QuizRef),
}

impl ClientMessage {
    /// The wire `type` discriminator of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "JOIN_ROOM",
            Self::Answer(_) => "ANSWER",
            Self::Timeout(_) => "timeout",
            Self::StartQuiz(_) => "START_QUIZ",
            Self::NextQuestion(_) => "NEXT_QUESTION",
            Self::EndQuiz(_) => "END_QUIZ",
        }
    }

    /// Serialize into a single text frame.
    ///
    /// # Errors
    ///
    /// Returns [`QuizClientError::Serialization`] if serde rejects the message.
    pub fn encode(&self) -> Result<String, QuizClientError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Message types sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Everyone currently present in the room (bulk roster sync).
    #[serde(rename = "USERS_IN_ROOM")]
    UsersInRoom(UsersInRoomPayload),
    /// One participant joined or updated their details.
    #[serde(rename = "USER_JOINED", alias = "NEW_USER")]
    UserJoined(UserJoinedPayload),
    /// One participant left.
    #[serde(rename = "USER_LEFT")]
    UserLeft(UserLeftPayload),
    /// The quiz started (or was already running when we joined).
    #[serde(rename = "QUIZ_STARTED", alias = "QUIZ_ONGOING")]
    QuizStarted(QuizStartedPayload),
    /// The active question changed.
    #[serde(rename = "NEW_QUESTION")]
    NewQuestion(NewQuestionPayload),
    /// The quiz is over.
    #[serde(rename = "QUIZ_ENDED")]
    QuizEnded(QuizEndedPayload),
    /// A scoreboard snapshot.
    #[serde(rename = "Leaderboard")]
    Leaderboard(LeaderboardPayload),
    /// The server rejected something this client did.
    #[serde(rename = "ERROR")]
    Error(ErrorPayload),
}

/// Every inbound `type` value [`ServerMessage`] accepts, aliases included.
const INBOUND_TYPES: &[&str] = &[
    "USERS_IN_ROOM",
    "USER_JOINED",
    "NEW_USER",
    "USER_LEFT",
    "QUIZ_STARTED",
    "QUIZ_ONGOING",
    "NEW_QUESTION",
    "QUIZ_ENDED",
    "Leaderboard",
    "ERROR",
];

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

impl ServerMessage {
    /// Decode one inbound text frame.
    ///
    /// A missing or `null` payload is treated as an empty object, so
    /// payload-less messages such as `{"type":"QUIZ_ENDED"}` decode.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Malformed`] if the frame is not an envelope object
    /// - [`ProtocolError::UnknownType`] if `type` is not recognized
    /// - [`ProtocolError::InvalidPayload`] if the payload fails validation
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawEnvelope = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
        if !INBOUND_TYPES.contains(&raw.kind.as_str()) {
            return Err(ProtocolError::UnknownType(raw.kind));
        }
        let payload = raw
            .payload
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
        let envelope = serde_json::json!({ "type": raw.kind.as_str(), "payload": payload });
        serde_json::from_value(envelope)
            .map_err(|source| ProtocolError::InvalidPayload { kind: raw.kind, source })
    }

    /// The canonical wire `type` discriminator of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UsersInRoom(_) => "USERS_IN_ROOM",
            Self::UserJoined(_) => "USER_JOINED",
            Self::UserLeft(_) => "USER_LEFT",
            Self::QuizStarted(_) => "QUIZ_STARTED",
            Self::NewQuestion(_) => "NEW_QUESTION",
            Self::QuizEnded(_) => "QUIZ_ENDED",
            Self::Leaderboard(_) => "Leaderboard",
            Self::Error(_) => "ERROR",
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_room_wire_shape() {
        let msg = ClientMessage::JoinRoom(JoinRoomPayload {
            quiz_id: "quiz-42".into(),
            user_id: "u1".into(),
            is_host: false,
        });
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "JOIN_ROOM",
                "payload": { "quizId": "quiz-42", "userId": "u1", "isHost": false }
            })
        );
    }

    #[test]
    fn timeout_uses_lowercase_type() {
        let msg = ClientMessage::Timeout(TimeoutPayload {
            quiz_id: "quiz-42".into(),
            attempt_id: "a1".into(),
            user_id: "u1".into(),
            question_id: "q1".into(),
        });
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "timeout");
        assert_eq!(value["payload"]["attemptId"], "a1");
        assert_eq!(msg.kind(), "timeout");
    }

    #[test]
    fn decode_accepts_new_user_alias() {
        let text = r#"{"type":"NEW_USER","payload":{"user":{"id":"u2","name":"Bea","email":"bea@example.com","isHost":false}}}"#;
        let msg = ServerMessage::decode(text).unwrap();
        let ServerMessage::UserJoined(payload) = msg else {
            panic!("expected UserJoined, got {msg:?}");
        };
        assert_eq!(payload.user.id, "u2");
        assert_eq!(payload.user.avatar, None);
        assert_eq!(payload.user.score, None);
    }

    #[test]
    fn decode_accepts_quiz_ongoing_alias() {
        let msg = ServerMessage::decode(r#"{"type":"QUIZ_ONGOING","payload":{"attemptId":"a9"}}"#)
            .unwrap();
        assert_eq!(
            msg,
            ServerMessage::QuizStarted(QuizStartedPayload {
                attempt_id: "a9".into()
            })
        );
    }

    #[test]
    fn decode_payloadless_quiz_ended() {
        let msg = ServerMessage::decode(r#"{"type":"QUIZ_ENDED"}"#).unwrap();
        assert_eq!(msg, ServerMessage::QuizEnded(QuizEndedPayload::default()));

        let msg = ServerMessage::decode(r#"{"type":"QUIZ_ENDED","payload":null}"#).unwrap();
        assert!(matches!(msg, ServerMessage::QuizEnded(_)));
    }

    #[test]
    fn decode_new_question_without_id() {
        let text = r#"{"type":"NEW_QUESTION","payload":{"question":"2+2?","options":["1","2","3","4"],"marks":5,"timeLimit":1}}"#;
        let ServerMessage::NewQuestion(q) = ServerMessage::decode(text).unwrap() else {
            panic!("expected NewQuestion");
        };
        assert_eq!(q.id, None);
        assert_eq!(q.options.len(), 4);
        assert_eq!(q.marks, 5);
        assert_eq!(q.time_limit, 1.0);
    }

    #[test]
    fn decode_rejects_negative_time_limit() {
        let text = r#"{"type":"NEW_QUESTION","payload":{"question":"2+2?","options":["4"],"timeLimit":-1}}"#;
        let err = ServerMessage::decode(text).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { ref kind, .. } if kind == "NEW_QUESTION"));
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let err = ServerMessage::decode(r#"{"type":"PING","payload":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(ref t) if t == "PING"));
    }

    #[test]
    fn decode_rejects_legacy_data_envelope() {
        // The payload lives under `data`, so the required `users` field is missing.
        let err = ServerMessage::decode(r#"{"type":"USERS_IN_ROOM","data":{"users":[]}}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { ref kind, .. } if kind == "USERS_IN_ROOM"));
    }

    #[test]
    fn decode_rejects_non_json() {
        let err = ServerMessage::decode("not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn decode_rejects_mistyped_payload() {
        let err = ServerMessage::decode(r#"{"type":"USER_LEFT","payload":{"userId":7}}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[test]
    fn leaderboard_self_score_is_optional() {
        let text = r#"{"type":"Leaderboard","payload":{"topPlayers":[{"userId":"u2","score":80}]}}"#;
        let ServerMessage::Leaderboard(board) = ServerMessage::decode(text).unwrap() else {
            panic!("expected Leaderboard");
        };
        assert_eq!(board.top_players.len(), 1);
        assert_eq!(board.self_score, None);
    }

    #[test]
    fn kind_matches_serialized_type() {
        let msg = ServerMessage::Leaderboard(LeaderboardPayload {
            top_players: vec![],
            self_score: Some(SelfScore { score: 10, rank: 1 }),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], msg.kind());
    }

    #[test]
    fn session_role_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&SessionRole::Participant).unwrap(),
            "\"PARTICIPANT\""
        );
        assert!(SessionRole::Host.is_host());
        assert!(!SessionRole::default().is_host());
    }
}

//! Session state for one connected client.
//!
//! [`QuizSession`] composes the room, question cycle and leaderboard slices.
//! It does no I/O: server messages go in through [`QuizSession::apply`] and
//! come back out as [`QuizEvent`]s, and user actions come back as the
//! [`ClientMessage`] to send (or the reason nothing should be sent). The
//! connection manager owns one behind a lock and feeds it serially, which is
//! what keeps the roster and the answered latch consistent.

use std::fmt;

use tracing::{debug, warn};

use crate::event::QuizEvent;
use crate::leaderboard::LeaderboardProjector;
use crate::protocol::{
    ClientMessage, JoinRoomPayload, QuizId, QuizRef, ServerMessage, SessionRole, UserId,
};
use crate::question::QuestionCycle;
use crate::room::{RoomState, RoomStatus};

/// Why a user action produced no outbound message.
///
/// These are normal outcomes of the state machine, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `JOIN_ROOM` for this room is already outstanding.
    AlreadyJoining,
    /// Already a member of this room.
    AlreadyJoined,
    /// The action needs room membership.
    NotInRoom,
    /// The action is reserved for the host.
    NotHost,
    /// The current question was already answered or timed out.
    AlreadyAnswered,
    /// No question is live.
    NoActiveQuestion,
    /// The quiz has not issued an attempt id yet.
    NoAttempt,
    /// The chosen option does not exist on the active question.
    OptionOutOfRange { index: usize, option_count: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyJoining => f.write_str("already joining this room"),
            Self::AlreadyJoined => f.write_str("already in this room"),
            Self::NotInRoom => f.write_str("not in a room"),
            Self::NotHost => f.write_str("only the host can do that"),
            Self::AlreadyAnswered => f.write_str("question already answered"),
            Self::NoActiveQuestion => f.write_str("no active question"),
            Self::NoAttempt => f.write_str("quiz has not started"),
            Self::OptionOutOfRange {
                index,
                option_count,
            } => write!(f, "option {index} out of range ({option_count} options)"),
        }
    }
}

/// Room, question and leaderboard state of one client.
#[derive(Debug, Clone)]
pub struct QuizSession {
    user_id: UserId,
    room: RoomState,
    cycle: QuestionCycle,
    leaderboard: LeaderboardProjector,
}

impl QuizSession {
    /// Create an empty session acting as `user_id`.
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            room: RoomState::new(),
            cycle: QuestionCycle::new(),
            leaderboard: LeaderboardProjector::new(),
        }
    }

    /// The acting user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Room membership and roster.
    pub fn room(&self) -> &RoomState {
        &self.room
    }

    /// Quiz phase, active question and answered latch.
    pub fn question_cycle(&self) -> &QuestionCycle {
        &self.cycle
    }

    /// Latest leaderboard snapshot.
    pub fn leaderboard(&self) -> &LeaderboardProjector {
        &self.leaderboard
    }

    // ── User actions ────────────────────────────────────────────────

    /// Ask to join `quiz_id`.
    pub fn join_room(
        &mut self,
        quiz_id: impl Into<QuizId>,
        role: SessionRole,
    ) -> Result<ClientMessage, SkipReason> {
        let quiz_id = quiz_id.into();
        self.room.begin_join(quiz_id.clone(), role)?;
        Ok(self.join_message(quiz_id, role))
    }

    /// The `JOIN_ROOM` returned by [`join_room`](Self::join_room) could not be
    /// sent. Undo the pending join so a later call sends it again.
    pub fn abandon_join(&mut self) {
        self.room.abandon_join();
    }

    /// After a reconnect, the `JOIN_ROOM` for the room we were in (if any).
    pub fn rejoin(&mut self) -> Option<ClientMessage> {
        let (quiz_id, role) = self.room.begin_rejoin()?;
        debug!(%quiz_id, "rejoining room after reconnect");
        Some(self.join_message(quiz_id, role))
    }

    /// Answer the active question with option `index`.
    pub fn select_answer(&mut self, index: usize) -> Result<ClientMessage, SkipReason> {
        self.cycle
            .submit_answer(index, self.room.quiz_id(), &self.user_id)
            .map(ClientMessage::Answer)
    }

    /// The active question's countdown expired.
    pub fn time_out(&mut self) -> Result<ClientMessage, SkipReason> {
        self.cycle
            .submit_timeout(self.room.quiz_id(), &self.user_id)
            .map(ClientMessage::Timeout)
    }

    /// Host: start the quiz.
    pub fn start_quiz(&self) -> Result<ClientMessage, SkipReason> {
        self.host_ref().map(ClientMessage::StartQuiz)
    }

    /// Host: advance to the next question.
    pub fn next_question(&self) -> Result<ClientMessage, SkipReason> {
        self.host_ref().map(ClientMessage::NextQuestion)
    }

    /// Host: end the quiz.
    pub fn end_quiz(&self) -> Result<ClientMessage, SkipReason> {
        self.host_ref().map(ClientMessage::EndQuiz)
    }

    fn host_ref(&self) -> Result<QuizRef, SkipReason> {
        let quiz_id = self.room.quiz_id().ok_or(SkipReason::NotInRoom)?;
        if !self.room.role().is_some_and(SessionRole::is_host) {
            return Err(SkipReason::NotHost);
        }
        Ok(QuizRef {
            quiz_id: quiz_id.to_string(),
        })
    }

    fn join_message(&self, quiz_id: QuizId, role: SessionRole) -> ClientMessage {
        ClientMessage::JoinRoom(JoinRoomPayload {
            quiz_id,
            user_id: self.user_id.clone(),
            is_host: role.is_host(),
        })
    }

    // ── Server messages ─────────────────────────────────────────────

    /// Apply one server message, returning the events it produced.
    ///
    /// Room and quiz messages that arrive while not in a room are stale
    /// (sent for a room we have since left) and are dropped.
    pub fn apply(&mut self, message: ServerMessage) -> Vec<QuizEvent> {
        let in_room = self.room.status() != RoomStatus::NotJoined;
        match message {
            ServerMessage::Error(payload) => {
                warn!(code = ?payload.code, message = %payload.message, "server reported an error");
                vec![QuizEvent::ServerError {
                    message: payload.message,
                    code: payload.code,
                }]
            }
            other if !in_room => {
                debug!(kind = other.kind(), "ignoring room message while not in a room");
                Vec::new()
            }
            ServerMessage::UsersInRoom(payload) => {
                let joined_now = self.room.sync_roster(payload.users);
                let participants: Vec<_> = self.room.participants().cloned().collect();
                match (joined_now, self.room.quiz_id()) {
                    (true, Some(quiz_id)) => vec![QuizEvent::RoomJoined {
                        quiz_id: quiz_id.to_string(),
                        participants,
                    }],
                    _ => vec![QuizEvent::RosterSynced { participants }],
                }
            }
            ServerMessage::UserJoined(payload) => {
                self.room.upsert(payload.user.clone());
                vec![QuizEvent::ParticipantJoined {
                    participant: payload.user,
                }]
            }
            ServerMessage::UserLeft(payload) => match self.room.remove(&payload.user_id) {
                Some(_) => vec![QuizEvent::ParticipantLeft {
                    user_id: payload.user_id,
                }],
                None => {
                    debug!(user_id = %payload.user_id, "departure of unknown participant");
                    Vec::new()
                }
            },
            ServerMessage::QuizStarted(payload) => {
                self.cycle.start(payload.attempt_id.clone());
                vec![QuizEvent::QuizStarted {
                    attempt_id: payload.attempt_id,
                }]
            }
            ServerMessage::NewQuestion(payload) => match self.cycle.advance(payload) {
                Some(question) => vec![QuizEvent::QuestionChanged {
                    question: question.clone(),
                }],
                None => Vec::new(),
            },
            ServerMessage::QuizEnded(_) => {
                self.cycle.end();
                vec![QuizEvent::QuizEnded]
            }
            ServerMessage::Leaderboard(payload) => {
                let snapshot = self.leaderboard.apply(payload).clone();
                vec![QuizEvent::LeaderboardUpdated { snapshot }]
            }
        }
    }

    // ── Connection lifecycle ────────────────────────────────────────

    /// The transport closed: drop everything tied to the old connection,
    /// remembering only which room to rejoin.
    pub fn on_disconnect(&mut self) {
        self.room.on_disconnect();
        self.cycle.reset();
        self.leaderboard.clear();
    }

    /// Forget everything, including the rejoin target.
    pub fn clear(&mut self) {
        self.room.clear();
        self.cycle.reset();
        self.leaderboard.clear();
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
    use crate::protocol::{
        LeaderboardPayload, LiveParticipant, NewQuestionPayload, QuizEndedPayload,
        QuizStartedPayload, ScoreEntry, SelfScore, UserJoinedPayload, UserLeftPayload,
        UsersInRoomPayload,
    };
    use crate::question::QuizPhase;

    fn user(id: &str) -> LiveParticipant {
        LiveParticipant {
            id: id.into(),
            name: format!("user {id}"),
            email: String::new(),
            avatar: None,
            is_host: false,
            score: None,
        }
    }

    fn roster(ids: &[&str]) -> ServerMessage {
        ServerMessage::UsersInRoom(UsersInRoomPayload {
            users: ids.iter().map(|id| user(id)).collect(),
        })
    }

    fn question(id: &str) -> ServerMessage {
        ServerMessage::NewQuestion(NewQuestionPayload {
            id: Some(id.into()),
            question: "Capital of France?".into(),
            options: vec!["Lyon".into(), "Paris".into(), "Nice".into()],
            marks: 5,
            time_limit: 1.0,
        })
    }

    fn started(attempt: &str) -> ServerMessage {
        ServerMessage::QuizStarted(QuizStartedPayload {
            attempt_id: attempt.into(),
        })
    }

    fn joined_session(role: SessionRole) -> QuizSession {
        let mut session = QuizSession::new("u1");
        session.join_room("quiz-42", role).unwrap();
        session.apply(roster(&["u1"]));
        session
    }

    #[test]
    fn join_emits_join_room_once() {
        let mut session = QuizSession::new("u1");
        let msg = session.join_room("quiz-42", SessionRole::Participant).unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom(JoinRoomPayload {
                quiz_id: "quiz-42".into(),
                user_id: "u1".into(),
                is_host: false,
            })
        );
        assert_eq!(
            session.join_room("quiz-42", SessionRole::Participant),
            Err(SkipReason::AlreadyJoining)
        );
    }

    #[test]
    fn first_roster_sync_joins() {
        let mut session = QuizSession::new("u1");
        session.join_room("quiz-42", SessionRole::Participant).unwrap();

        let events = session.apply(roster(&["u1", "u2"]));
        assert!(matches!(
            &events[..],
            [QuizEvent::RoomJoined { quiz_id, participants }]
                if quiz_id == "quiz-42" && participants.len() == 2
        ));

        let events = session.apply(roster(&["u1"]));
        assert!(matches!(&events[..], [QuizEvent::RosterSynced { .. }]));
    }

    #[test]
    fn roster_converges_after_deltas() {
        let mut session = joined_session(SessionRole::Participant);
        session.apply(ServerMessage::UserJoined(UserJoinedPayload { user: user("u2") }));
        session.apply(ServerMessage::UserJoined(UserJoinedPayload { user: user("u3") }));
        session.apply(ServerMessage::UserJoined(UserJoinedPayload { user: user("u2") }));
        let events = session.apply(ServerMessage::UserLeft(UserLeftPayload {
            user_id: "u3".into(),
        }));
        assert_eq!(
            events,
            vec![QuizEvent::ParticipantLeft {
                user_id: "u3".into()
            }]
        );

        let ids: Vec<&str> = session.room().participants().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["u1", "u2"]);

        // Unknown departures are ignored.
        let events = session.apply(ServerMessage::UserLeft(UserLeftPayload {
            user_id: "ghost".into(),
        }));
        assert!(events.is_empty());
    }

    #[test]
    fn room_messages_ignored_when_not_in_room() {
        let mut session = QuizSession::new("u1");
        assert!(session.apply(roster(&["u1"])).is_empty());
        assert!(session.apply(started("a1")).is_empty());
        assert_eq!(session.room().participant_count(), 0);
        assert_eq!(session.question_cycle().attempt_id(), None);

        // Errors are always surfaced.
        let events = session.apply(ServerMessage::Error(crate::protocol::ErrorPayload {
            message: "Invalid token".into(),
            code: Some(crate::ErrorCode::InvalidToken),
        }));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn answer_flow_latches_per_question() {
        let mut session = joined_session(SessionRole::Participant);
        session.apply(started("a1"));
        session.apply(question("q1"));

        let ClientMessage::Answer(answer) = session.select_answer(1).unwrap() else {
            panic!("expected an answer");
        };
        assert_eq!(answer.quiz_id, "quiz-42");
        assert_eq!(answer.attempt_id, "a1");
        assert_eq!(answer.user_id, "u1");
        assert_eq!(answer.question_id, "q1");
        assert_eq!(answer.answer, 1);

        assert_eq!(session.select_answer(2), Err(SkipReason::AlreadyAnswered));
        assert_eq!(session.time_out(), Err(SkipReason::AlreadyAnswered));

        session.apply(question("q2"));
        assert!(matches!(session.time_out(), Ok(ClientMessage::Timeout(_))));
    }

    #[test]
    fn quiz_ended_completes() {
        let mut session = joined_session(SessionRole::Participant);
        session.apply(started("a1"));
        session.apply(question("q1"));
        let events = session.apply(ServerMessage::QuizEnded(QuizEndedPayload::default()));
        assert_eq!(events, vec![QuizEvent::QuizEnded]);
        assert_eq!(session.question_cycle().phase(), QuizPhase::Completed);
        assert!(session.apply(question("q2")).is_empty());
    }

    #[test]
    fn host_controls_require_host_role() {
        let participant = joined_session(SessionRole::Participant);
        assert_eq!(participant.start_quiz(), Err(SkipReason::NotHost));

        let lobby = QuizSession::new("t1");
        assert_eq!(lobby.next_question(), Err(SkipReason::NotInRoom));

        let host = joined_session(SessionRole::Host);
        let quiz = QuizRef {
            quiz_id: "quiz-42".into(),
        };
        assert_eq!(host.start_quiz(), Ok(ClientMessage::StartQuiz(quiz.clone())));
        assert_eq!(
            host.next_question(),
            Ok(ClientMessage::NextQuestion(quiz.clone()))
        );
        assert_eq!(host.end_quiz(), Ok(ClientMessage::EndQuiz(quiz)));
    }

    #[test]
    fn leaderboard_event_carries_snapshot() {
        let mut session = joined_session(SessionRole::Participant);
        let events = session.apply(ServerMessage::Leaderboard(LeaderboardPayload {
            top_players: vec![ScoreEntry {
                user_id: "u1".into(),
                score: 30,
            }],
            self_score: Some(SelfScore { score: 30, rank: 1 }),
        }));
        let [QuizEvent::LeaderboardUpdated { snapshot }] = &events[..] else {
            panic!("expected LeaderboardUpdated, got {events:?}");
        };
        assert_eq!(snapshot.rank(), Some(1));
        assert_eq!(session.leaderboard().total_score(), 30);
    }

    #[test]
    fn disconnect_resets_and_rejoin_restores_target() {
        let mut session = joined_session(SessionRole::Participant);
        session.apply(started("a1"));
        session.apply(question("q1"));
        session.select_answer(0).unwrap();

        session.on_disconnect();
        assert_eq!(session.room().status(), RoomStatus::NotJoined);
        assert_eq!(session.question_cycle().attempt_id(), None);
        assert!(!session.question_cycle().has_answered());
        assert!(session.leaderboard().snapshot().is_none());

        let Some(ClientMessage::JoinRoom(join)) = session.rejoin() else {
            panic!("expected a rejoin message");
        };
        assert_eq!(join.quiz_id, "quiz-42");
        assert!(session.rejoin().is_none());

        session.clear();
        session.on_disconnect();
        assert!(session.rejoin().is_none());
    }

    #[test]
    fn join_lost_to_a_dropped_connection_is_retryable() {
        let mut session = QuizSession::new("u1");
        session.join_room("quiz-42", SessionRole::Participant).unwrap();
        session.on_disconnect();

        // Issued while the connection was going down; the send fails.
        session.join_room("quiz-42", SessionRole::Participant).unwrap();
        assert_eq!(session.room().status(), RoomStatus::Joining);
        session.abandon_join();

        assert_eq!(session.room().status(), RoomStatus::NotJoined);
        assert!(session.rejoin().is_none());
        assert!(matches!(
            session.join_room("quiz-42", SessionRole::Participant),
            Ok(ClientMessage::JoinRoom(_))
        ));
    }
}

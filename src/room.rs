//! Room membership: am I in a room, and who else is.
//!
//! ```text
//! NotJoined --begin_join()--> Joining --(USERS_IN_ROOM)--> Joined
//! Joining | Joined --(transport closes)--> NotJoined
//! ```
//!
//! The roster is keyed by participant id. A `USERS_IN_ROOM` sync replaces it
//! wholesale; `USER_JOINED` / `USER_LEFT` deltas touch exactly one entry.

use std::collections::BTreeMap;

use tracing::debug;

use crate::protocol::{LiveParticipant, QuizId, SessionRole, UserId};
use crate::session::SkipReason;

/// Membership phase of the acting client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomStatus {
    /// Not attached to any room.
    #[default]
    NotJoined,
    /// `JOIN_ROOM` sent, waiting for the first roster sync.
    Joining,
    /// Roster received; the client is live in the room.
    Joined,
}

/// Room slice of a [`QuizSession`](crate::session::QuizSession).
#[derive(Debug, Clone, Default)]
pub struct RoomState {
    status: RoomStatus,
    /// Room the client last asked to join, kept across a lost connection so
    /// it can be rejoined.
    target: Option<(QuizId, SessionRole)>,
    participants: BTreeMap<UserId, LiveParticipant>,
}

impl RoomState {
    /// Create an empty, unjoined room state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current membership phase.
    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// Returns `true` once the first roster sync has been received.
    pub fn is_joined(&self) -> bool {
        self.status == RoomStatus::Joined
    }

    /// The room being joined or joined, if any.
    pub fn quiz_id(&self) -> Option<&str> {
        match self.status {
            RoomStatus::NotJoined => None,
            RoomStatus::Joining | RoomStatus::Joined => {
                self.target.as_ref().map(|(quiz_id, _)| quiz_id.as_str())
            }
        }
    }

    /// The acting client's role in the current room, if any.
    pub fn role(&self) -> Option<SessionRole> {
        match self.status {
            RoomStatus::NotJoined => None,
            RoomStatus::Joining | RoomStatus::Joined => self.target.as_ref().map(|(_, role)| *role),
        }
    }

    /// Look up one participant.
    pub fn participant(&self, user_id: &str) -> Option<&LiveParticipant> {
        self.participants.get(user_id)
    }

    /// All live participants, ordered by id.
    pub fn participants(&self) -> impl Iterator<Item = &LiveParticipant> {
        self.participants.values()
    }

    /// Number of live participants.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// The participant flagged as host, if present.
    pub fn host(&self) -> Option<&LiveParticipant> {
        self.participants.values().find(|p| p.is_host)
    }

    /// Start joining `quiz_id`.
    ///
    /// A second request for the room already being joined (or joined) is
    /// refused so only one `JOIN_ROOM` is outstanding. Asking for a different
    /// room switches the target and drops the old roster.
    pub(crate) fn begin_join(
        &mut self,
        quiz_id: QuizId,
        role: SessionRole,
    ) -> Result<(), SkipReason> {
        if self.quiz_id() == Some(quiz_id.as_str()) {
            return Err(match self.status {
                RoomStatus::Joined => SkipReason::AlreadyJoined,
                RoomStatus::Joining | RoomStatus::NotJoined => SkipReason::AlreadyJoining,
            });
        }
        if self.status != RoomStatus::NotJoined {
            debug!(from = ?self.quiz_id(), to = %quiz_id, "switching rooms");
        }
        self.participants.clear();
        self.target = Some((quiz_id, role));
        self.status = RoomStatus::Joining;
        Ok(())
    }

    /// Re-enter `Joining` for the remembered room after a reconnect.
    pub(crate) fn begin_rejoin(&mut self) -> Option<(QuizId, SessionRole)> {
        if self.status != RoomStatus::NotJoined {
            return None;
        }
        let target = self.target.clone()?;
        self.status = RoomStatus::Joining;
        Some(target)
    }

    /// The `JOIN_ROOM` from the last [`begin_join`](Self::begin_join) never
    /// reached a connection: back out of `Joining` and forget the target.
    pub(crate) fn abandon_join(&mut self) {
        if self.status != RoomStatus::Joining {
            return;
        }
        debug!(quiz_id = ?self.quiz_id(), "join was not sent; leaving Joining");
        *self = Self::default();
    }

    /// Replace the roster wholesale. Returns `true` when this sync completed
    /// the join.
    pub(crate) fn sync_roster(&mut self, users: Vec<LiveParticipant>) -> bool {
        self.participants = users.into_iter().map(|p| (p.id.clone(), p)).collect();
        let joined_now = self.status == RoomStatus::Joining;
        self.status = RoomStatus::Joined;
        joined_now
    }

    /// Add or update one participant. Returns `true` if it was not present.
    pub(crate) fn upsert(&mut self, participant: LiveParticipant) -> bool {
        self.participants
            .insert(participant.id.clone(), participant)
            .is_none()
    }

    /// Remove one participant.
    pub(crate) fn remove(&mut self, user_id: &str) -> Option<LiveParticipant> {
        self.participants.remove(user_id)
    }

    /// The connection dropped: membership is gone, the target is remembered.
    pub(crate) fn on_disconnect(&mut self) {
        self.status = RoomStatus::NotJoined;
        self.participants.clear();
    }

    /// Forget everything, including the rejoin target.
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

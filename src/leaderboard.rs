//! Leaderboard projection.
//!
//! The server broadcasts a full snapshot after each scoring event. The
//! projector keeps only the latest one; it never derives scores locally.

use crate::protocol::{LeaderboardPayload, ScoreEntry, SelfScore, UserId};
use crate::room::RoomState;

/// Shown for leaderboard rows whose user is not in the live roster.
pub const UNKNOWN_PARTICIPANT_NAME: &str = "Unknown User";

/// One leaderboard broadcast, entries sorted by descending score.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScoreboardSnapshot {
    entries: Vec<ScoreEntry>,
    own: Option<SelfScore>,
}

impl ScoreboardSnapshot {
    /// Take a snapshot as delivered by the server.
    pub fn from_payload(payload: LeaderboardPayload) -> Self {
        Self {
            entries: payload.top_players,
            own: payload.self_score,
        }
    }

    /// Build a snapshot from a flat `userId -> score` listing.
    ///
    /// Older servers broadcast the scoreboard as a JSON object keyed by user.
    /// Feed its entries here in delivery order: they are sorted by descending
    /// score, ties keep delivery order, and `self_id`'s rank is its 1-based
    /// position in the result.
    ///
    /// ```
    /// use quiz_live_client::ScoreboardSnapshot;
    ///
    /// let board = ScoreboardSnapshot::from_scores([("u1", 50), ("u2", 80), ("u3", 80)], "u1");
    /// assert_eq!(board.rank(), Some(3));
    /// assert_eq!(board.own_score(), Some(50));
    /// ```
    pub fn from_scores<I, K>(scores: I, self_id: &str) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<UserId>,
    {
        let mut entries: Vec<ScoreEntry> = scores
            .into_iter()
            .map(|(user_id, score)| ScoreEntry {
                user_id: user_id.into(),
                score,
            })
            .collect();
        // `sort_by` is stable, so equal scores keep delivery order.
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        let own = entries
            .iter()
            .zip(1u32..)
            .find(|(entry, _)| entry.user_id == self_id)
            .map(|(entry, rank)| SelfScore {
                score: entry.score,
                rank,
            });
        Self { entries, own }
    }

    /// All rows, highest score first.
    pub fn entries(&self) -> &[ScoreEntry] {
        &self.entries
    }

    /// The caller's standing, if the server reported one.
    pub fn own(&self) -> Option<SelfScore> {
        self.own
    }

    /// The caller's 1-based rank.
    pub fn rank(&self) -> Option<u32> {
        self.own.map(|own| own.rank)
    }

    /// The caller's score.
    pub fn own_score(&self) -> Option<u64> {
        self.own.map(|own| own.score)
    }

    /// The first `n` entries.
    pub fn top(&self, n: usize) -> &[ScoreEntry] {
        self.entries.get(..n).unwrap_or(&self.entries)
    }
}

/// A leaderboard row joined with roster details for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    /// 1-based position in the snapshot.
    pub position: usize,
    pub user_id: UserId,
    pub name: String,
    pub avatar: Option<String>,
    pub score: u64,
}

/// Holds the latest [`ScoreboardSnapshot`].
#[derive(Debug, Clone, Default)]
pub struct LeaderboardProjector {
    latest: Option<ScoreboardSnapshot>,
}

impl LeaderboardProjector {
    /// A projector with no snapshot yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored snapshot.
    pub(crate) fn apply(&mut self, payload: LeaderboardPayload) -> &ScoreboardSnapshot {
        self.latest.insert(ScoreboardSnapshot::from_payload(payload))
    }

    /// The most recent snapshot, if any has arrived.
    pub fn snapshot(&self) -> Option<&ScoreboardSnapshot> {
        self.latest.as_ref()
    }

    /// The caller's rank from the latest snapshot.
    pub fn rank(&self) -> Option<u32> {
        self.latest.as_ref().and_then(ScoreboardSnapshot::rank)
    }

    /// The caller's score from the latest snapshot, `0` before any arrives.
    pub fn total_score(&self) -> u64 {
        self.latest
            .as_ref()
            .and_then(ScoreboardSnapshot::own_score)
            .unwrap_or(0)
    }

    /// Rows of the latest snapshot, empty before any arrives.
    pub fn entries(&self) -> &[ScoreEntry] {
        self.latest
            .as_ref()
            .map(ScoreboardSnapshot::entries)
            .unwrap_or_default()
    }

    /// The first `n` rows joined with the roster.
    pub fn standings(&self, room: &RoomState, n: usize) -> Vec<Standing> {
        let Some(snapshot) = self.latest.as_ref() else {
            return Vec::new();
        };
        snapshot
            .top(n)
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let participant = room.participant(&entry.user_id);
                Standing {
                    position: i + 1,
                    user_id: entry.user_id.clone(),
                    name: participant
                        .map_or(UNKNOWN_PARTICIPANT_NAME, |p| p.name.as_str())
                        .to_string(),
                    avatar: participant.and_then(|p| p.avatar.clone()),
                    score: entry.score,
                }
            })
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.latest = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::protocol::{LiveParticipant, SessionRole};

    fn entry(user_id: &str, score: u64) -> ScoreEntry {
        ScoreEntry {
            user_id: user_id.into(),
            score,
        }
    }

    fn payload(entries: Vec<ScoreEntry>, own: Option<SelfScore>) -> LeaderboardPayload {
        LeaderboardPayload {
            top_players: entries,
            self_score: own,
        }
    }

    #[test]
    fn flat_scores_rank_by_position_with_stable_ties() {
        let board = ScoreboardSnapshot::from_scores([("u1", 50), ("u2", 80), ("u3", 80)], "u1");
        let order: Vec<&str> = board.entries().iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(order, ["u2", "u3", "u1"]);
        assert_eq!(board.rank(), Some(3));
        assert_eq!(board.own_score(), Some(50));

        let board = ScoreboardSnapshot::from_scores([("u1", 50), ("u2", 80), ("u3", 80)], "u3");
        assert_eq!(board.rank(), Some(2));
    }

    #[test]
    fn flat_scores_without_self() {
        let board = ScoreboardSnapshot::from_scores([("u1".to_string(), 10)], "host");
        assert_eq!(board.own(), None);
        assert_eq!(board.entries().len(), 1);
    }

    #[test]
    fn latest_snapshot_wins() {
        let mut projector = LeaderboardProjector::new();
        assert_eq!(projector.total_score(), 0);
        assert_eq!(projector.rank(), None);
        assert!(projector.entries().is_empty());

        projector.apply(payload(
            vec![entry("u2", 80), entry("u1", 50)],
            Some(SelfScore { score: 50, rank: 2 }),
        ));
        projector.apply(payload(
            vec![entry("u1", 90), entry("u2", 80)],
            Some(SelfScore { score: 90, rank: 1 }),
        ));
        assert_eq!(projector.rank(), Some(1));
        assert_eq!(projector.total_score(), 90);
        assert_eq!(projector.entries()[0].user_id, "u1");

        projector.clear();
        assert!(projector.snapshot().is_none());
    }

    #[test]
    fn top_is_bounded() {
        let board = ScoreboardSnapshot::from_payload(payload(
            vec![entry("a", 3), entry("b", 2), entry("c", 1)],
            None,
        ));
        assert_eq!(board.top(2).len(), 2);
        assert_eq!(board.top(10).len(), 3);
        assert!(board.top(0).is_empty());
    }

    #[test]
    fn standings_join_roster_names() {
        let mut room = RoomState::new();
        room.begin_join("quiz-42".into(), SessionRole::Participant)
            .unwrap();
        room.sync_roster(vec![LiveParticipant {
            id: "u1".into(),
            name: "Ann".into(),
            email: String::new(),
            avatar: Some("https://cdn.example.com/ann.png".into()),
            is_host: false,
            score: None,
        }]);

        let mut projector = LeaderboardProjector::new();
        projector.apply(payload(vec![entry("u1", 90), entry("gone", 40)], None));

        let rows = projector.standings(&room, 10);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].position, 1);
        assert_eq!(rows[0].name, "Ann");
        assert!(rows[0].avatar.is_some());
        assert_eq!(rows[1].name, UNKNOWN_PARTICIPANT_NAME);
        assert_eq!(rows[1].avatar, None);
    }
}

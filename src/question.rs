//! The question cycle: which question is live, and whether it has been
//! answered.
//!
//! Each participant gets exactly one submission per question. The
//! "answered" latch is set the moment a submission is built, before any
//! network I/O, and only a new `NEW_QUESTION` clears it. A submission that
//! later fails to reach the server therefore still counts; the user is
//! never offered a second try at the same question.

use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::protocol::{
    AnswerPayload, AttemptId, NewQuestionPayload, QuestionId, TimeoutPayload,
};
use crate::session::SkipReason;

/// Where the quiz stands from this client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuizPhase {
    /// In the room, quiz not started yet.
    #[default]
    WaitingRoom,
    /// Questions are being served.
    InProgress,
    /// The quiz is over; further questions are ignored.
    Completed,
}

/// The question currently on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveQuestion {
    pub id: QuestionId,
    pub prompt: String,
    pub options: Vec<String>,
    pub marks: u32,
    pub time_limit_minutes: f64,
    /// `true` when the server omitted the id and one was generated locally.
    pub id_generated: bool,
}

impl ActiveQuestion {
    fn from_payload(payload: NewQuestionPayload) -> Self {
        let (id, id_generated) = match payload.id {
            Some(id) => (id, false),
            None => (Uuid::new_v4().to_string(), true),
        };
        Self {
            id,
            prompt: payload.question,
            options: payload.options,
            marks: payload.marks,
            time_limit_minutes: payload.time_limit,
            id_generated,
        }
    }

    /// The countdown length for this question.
    ///
    /// Limits too large for a [`Duration`] saturate to [`Duration::MAX`].
    pub fn time_limit(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_limit_minutes * 60.0).unwrap_or(Duration::MAX)
    }
}

/// Question slice of a [`QuizSession`](crate::session::QuizSession).
#[derive(Debug, Clone, Default)]
pub struct QuestionCycle {
    phase: QuizPhase,
    attempt_id: Option<AttemptId>,
    question: Option<ActiveQuestion>,
    answered: bool,
    selected: Option<usize>,
}

impl QuestionCycle {
    /// A cycle waiting for the quiz to start.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current quiz phase.
    pub fn phase(&self) -> QuizPhase {
        self.phase
    }

    /// Server-issued attempt id, once the quiz has started.
    pub fn attempt_id(&self) -> Option<&str> {
        self.attempt_id.as_deref()
    }

    /// The live question, if any.
    pub fn active_question(&self) -> Option<&ActiveQuestion> {
        self.question.as_ref()
    }

    /// Whether the current question has already been answered (or timed out).
    pub fn has_answered(&self) -> bool {
        self.answered
    }

    /// Option index picked for the current question, if an answer was sent.
    pub fn selected_answer(&self) -> Option<usize> {
        self.selected
    }

    /// `QUIZ_STARTED` / `QUIZ_ONGOING`: record the attempt.
    pub(crate) fn start(&mut self, attempt_id: AttemptId) {
        if self.phase == QuizPhase::Completed {
            debug!(%attempt_id, "quiz restarted after completion");
            self.question = None;
        }
        self.attempt_id = Some(attempt_id);
        self.phase = QuizPhase::InProgress;
    }

    /// `NEW_QUESTION`: replace the active question and reopen the latch.
    ///
    /// Returns `None` when the quiz has already completed.
    pub(crate) fn advance(&mut self, payload: NewQuestionPayload) -> Option<&ActiveQuestion> {
        if self.phase == QuizPhase::Completed {
            debug!("ignoring question after quiz end");
            return None;
        }
        let question = ActiveQuestion::from_payload(payload);
        if question.id_generated {
            debug!(question_id = %question.id, "question arrived without id; generated one");
        }
        self.phase = QuizPhase::InProgress;
        self.answered = false;
        self.selected = None;
        Some(&*self.question.insert(question))
    }

    /// `QUIZ_ENDED`.
    pub(crate) fn end(&mut self) {
        self.phase = QuizPhase::Completed;
        self.question = None;
    }

    /// Build an `ANSWER` for option `index`, latching the question.
    pub(crate) fn submit_answer(
        &mut self,
        index: usize,
        quiz_id: Option<&str>,
        user_id: &str,
    ) -> Result<AnswerPayload, SkipReason> {
        let (quiz_id, attempt_id, question) = self.submission_target(quiz_id)?;
        let option_count = question.options.len();
        if index >= option_count {
            return Err(SkipReason::OptionOutOfRange {
                index,
                option_count,
            });
        }
        let payload = AnswerPayload {
            quiz_id: quiz_id.to_string(),
            attempt_id: attempt_id.clone(),
            user_id: user_id.to_string(),
            question_id: question.id.clone(),
            answer: index,
        };
        self.answered = true;
        self.selected = Some(index);
        Ok(payload)
    }

    /// Build a `timeout` for the current question, latching it.
    pub(crate) fn submit_timeout(
        &mut self,
        quiz_id: Option<&str>,
        user_id: &str,
    ) -> Result<TimeoutPayload, SkipReason> {
        let (quiz_id, attempt_id, question) = self.submission_target(quiz_id)?;
        let payload = TimeoutPayload {
            quiz_id: quiz_id.to_string(),
            attempt_id: attempt_id.clone(),
            user_id: user_id.to_string(),
            question_id: question.id.clone(),
        };
        self.answered = true;
        Ok(payload)
    }

    fn submission_target<'a>(
        &'a self,
        quiz_id: Option<&'a str>,
    ) -> Result<(&'a str, &'a AttemptId, &'a ActiveQuestion), SkipReason> {
        if self.answered {
            return Err(SkipReason::AlreadyAnswered);
        }
        let question = self.question.as_ref().ok_or(SkipReason::NoActiveQuestion)?;
        let attempt_id = self.attempt_id.as_ref().ok_or(SkipReason::NoAttempt)?;
        let quiz_id = quiz_id.ok_or(SkipReason::NotInRoom)?;
        Ok((quiz_id, attempt_id, question))
    }

    /// Forget the quiz entirely.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

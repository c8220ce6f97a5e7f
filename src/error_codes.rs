//! Error codes carried by the session server's `ERROR` messages.
//!
//! Codes travel as `SCREAMING_SNAKE_CASE` strings (e.g. `"QUIZ_NOT_FOUND"`).
//! Codes this client does not know deserialize as [`ErrorCode::Unknown`] so a
//! newer server never breaks decoding of the surrounding message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error codes returned by the session server.
///
/// Use [`description()`](ErrorCode::description) for a human-readable explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication errors
    Unauthorized,
    InvalidToken,

    // Room errors
    QuizNotFound,
    NotInRoom,
    NotHost,

    // Quiz lifecycle errors
    QuizNotStarted,
    QuizAlreadyStarted,
    QuizEnded,
    NoMoreQuestions,

    // Answer errors
    AttemptNotFound,
    QuestionNotActive,
    DuplicateAnswer,
    InvalidAnswer,

    // Validation errors
    InvalidPayload,

    // Server errors
    RateLimitExceeded,
    InternalError,

    /// Any code not listed above.
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unauthorized => {
                "Access denied. The connection is not authorized for this action."
            }
            Self::InvalidToken => {
                "The authentication token is invalid or has expired. Sign in again to obtain a new token."
            }
            Self::QuizNotFound => {
                "The requested quiz could not be found. Check the quiz id or ask the host to open the room."
            }
            Self::NotInRoom => "You have not joined this quiz room yet.",
            Self::NotHost => "Only the host of this quiz can perform this action.",
            Self::QuizNotStarted => "The quiz has not started yet. Wait for the host to start it.",
            Self::QuizAlreadyStarted => "The quiz has already started.",
            Self::QuizEnded => "The quiz has ended. No further answers are accepted.",
            Self::NoMoreQuestions => "There are no more questions in this quiz.",
            Self::AttemptNotFound => {
                "The quiz attempt could not be found. Rejoin the room to start a new attempt."
            }
            Self::QuestionNotActive => {
                "The question is no longer active. Answers are only accepted for the current question."
            }
            Self::DuplicateAnswer => "An answer for this question has already been recorded.",
            Self::InvalidAnswer => "The selected answer is not one of the question's options.",
            Self::InvalidPayload => {
                "The message payload is invalid or malformed. Check the message fields."
            }
            Self::RateLimitExceeded => {
                "Too many messages in a short time. Please slow down and try again."
            }
            Self::InternalError => {
                "An internal server error occurred. Please try again or contact support if the issue persists."
            }
            Self::Unknown => "The server reported an unrecognized error.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

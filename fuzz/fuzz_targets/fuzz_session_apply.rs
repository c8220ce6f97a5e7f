#![no_main]

use libfuzzer_sys::fuzz_target;
use quiz_live_client::protocol::ServerMessage;
use quiz_live_client::{QuizSession, SessionRole};

// Feed newline-separated frames into a joined session, interleaved with
// answer attempts, and check the one-answer-per-question latch holds.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut session = QuizSession::new("fuzz-user");
    let _ = session.join_room("fuzz-quiz", SessionRole::Participant);

    for (i, line) in text.lines().enumerate() {
        if let Ok(msg) = ServerMessage::decode(line) {
            let _ = session.apply(msg);
        }
        let first = session.select_answer(i % 4);
        if first.is_ok() {
            assert!(session.select_answer(0).is_err());
            assert!(session.time_out().is_err());
        }
    }
});
